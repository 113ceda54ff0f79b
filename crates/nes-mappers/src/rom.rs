//! NES ROM file format parsing (iNES and NES 2.0).
//!
//! This module handles loading and parsing NES ROM files. Only the iNES 1.0
//! header layout is decoded; the NES 2.0 identifier bits are recognized so
//! callers can tell the two apart, but extended NES 2.0 fields (12-bit mapper,
//! exponent-multiplier ROM sizes) are not read.

use crate::Mirroring;

/// Errors that can occur when parsing or using NES ROM files.
#[derive(Debug, thiserror::Error)]
pub enum RomError {
    /// ROM file is too small to contain a valid header.
    #[error("ROM file too small: expected at least 16 bytes, got {0}")]
    FileTooSmall(usize),

    /// Invalid iNES magic number in header.
    #[error("Invalid iNES magic number: expected [4E 45 53 1A], got {0:02X?}")]
    InvalidMagic([u8; 4]),

    /// Invalid PRG-ROM size.
    #[error("Invalid PRG-ROM size: {0}")]
    InvalidPrgSize(String),

    /// ROM file size doesn't match header specifications.
    #[error("ROM file size mismatch: expected {expected} bytes, got {actual} bytes")]
    SizeMismatch {
        /// Expected file size in bytes.
        expected: usize,
        /// Actual file size in bytes.
        actual: usize,
    },

    /// Mapper number not implemented by this crate.
    #[error("Unsupported mapper: {0}")]
    UnsupportedMapper(u16),
}

/// Which header layout a ROM file was parsed as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RomFormat {
    /// Legacy iNES 1.0 header.
    INes,
    /// NES 2.0 header identifier bits detected; decoded as iNES 1.0.
    Nes20,
}

/// iNES/NES 2.0 ROM header.
///
/// Represents the 16-byte header found at the start of all iNES format ROM files.
///
/// # Format
///
/// ```text
/// Byte 0-3:  Magic number "NES" followed by MS-DOS EOF (0x4E 0x45 0x53 0x1A)
/// Byte 4:    PRG-ROM size in 16KB units
/// Byte 5:    CHR-ROM size in 8KB units (0 = CHR-RAM)
/// Byte 6:    Flags 6 (mirroring, battery, trainer, four-screen, mapper low nibble)
/// Byte 7:    Flags 7 (VS System, PlayChoice-10, NES 2.0 identifier, mapper high nibble)
/// Byte 8:    PRG-RAM size in 8KB units (0 is treated as one 8KB bank)
/// Byte 9:    Flags 9 (TV system low bit)
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RomHeader {
    /// Which header layout this was parsed as.
    pub format: RomFormat,

    /// Mapper number (iNES mapper ID).
    pub mapper: u16,

    /// PRG-ROM size, in 16KB units.
    pub prg_rom_size: u16,

    /// CHR-ROM size, in 8KB units (0 indicates CHR-RAM).
    pub chr_rom_size: u16,

    /// PRG-RAM size in bytes.
    pub prg_ram_size: usize,

    /// CHR-RAM size in bytes (0 when the cartridge uses CHR-ROM).
    pub chr_ram_size: usize,

    /// Nametable mirroring mode.
    pub mirroring: Mirroring,

    /// Battery-backed PRG-RAM present.
    pub has_battery: bool,

    /// 512-byte trainer present before PRG-ROM.
    pub has_trainer: bool,

    /// TV system (0 = NTSC, 1 = PAL).
    pub tv_system: u8,
}

impl RomHeader {
    /// iNES magic number: "NES" followed by MS-DOS EOF.
    const MAGIC: [u8; 4] = [0x4E, 0x45, 0x53, 0x1A];

    /// Parse ROM header from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the data is shorter than 16 bytes, the magic
    /// number doesn't match, or the header reports a zero-size PRG-ROM.
    pub fn parse(data: &[u8]) -> Result<Self, RomError> {
        if data.len() < 16 {
            return Err(RomError::FileTooSmall(data.len()));
        }

        let magic = [data[0], data[1], data[2], data[3]];
        if magic != Self::MAGIC {
            return Err(RomError::InvalidMagic(magic));
        }

        let format = if (data[7] & 0x0C) == 0x08 {
            RomFormat::Nes20
        } else {
            RomFormat::INes
        };

        let mapper = Self::parse_mapper(data);
        let prg_rom_size = u16::from(data[4]);
        let chr_rom_size = u16::from(data[5]);

        if prg_rom_size == 0 {
            return Err(RomError::InvalidPrgSize(
                "PRG-ROM size cannot be 0".to_string(),
            ));
        }

        let mirroring = Self::parse_mirroring(data);
        let has_battery = (data[6] & 0x02) != 0;
        let has_trainer = (data[6] & 0x04) != 0;

        let prg_ram_size = if data[8] == 0 {
            8192
        } else {
            data[8] as usize * 8192
        };
        let chr_ram_size = if chr_rom_size == 0 { 8192 } else { 0 };
        let tv_system = data[9] & 0x01;

        Ok(Self {
            format,
            mapper,
            prg_rom_size,
            chr_rom_size,
            prg_ram_size,
            chr_ram_size,
            mirroring,
            has_battery,
            has_trainer,
            tv_system,
        })
    }

    /// Parse the 8-bit mapper number from flags 6/7.
    fn parse_mapper(data: &[u8]) -> u16 {
        let low = (data[6] & 0xF0) >> 4;
        let high = data[7] & 0xF0;
        u16::from(high | low)
    }

    /// Parse mirroring mode from flags 6.
    fn parse_mirroring(data: &[u8]) -> Mirroring {
        if (data[6] & 0x08) != 0 {
            Mirroring::FourScreen
        } else if (data[6] & 0x01) != 0 {
            Mirroring::Vertical
        } else {
            Mirroring::Horizontal
        }
    }
}

/// Parsed NES ROM file.
#[derive(Debug, Clone)]
pub struct Rom {
    /// ROM header information.
    pub header: RomHeader,

    /// 512-byte trainer data (if present).
    pub trainer: Option<Vec<u8>>,

    /// PRG-ROM data (program code).
    pub prg_rom: Vec<u8>,

    /// CHR-ROM data (graphics), or empty if CHR-RAM.
    pub chr_rom: Vec<u8>,
}

impl Rom {
    /// Load a ROM from raw file bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the header is invalid or the file is truncated
    /// relative to what the header declares.
    pub fn load(data: &[u8]) -> Result<Self, RomError> {
        let header = RomHeader::parse(data)?;

        let mut offset = 16;

        let trainer = if header.has_trainer {
            if data.len() < offset + 512 {
                return Err(RomError::FileTooSmall(data.len()));
            }
            let trainer_data = data[offset..offset + 512].to_vec();
            offset += 512;
            Some(trainer_data)
        } else {
            None
        };

        let prg_bytes = header.prg_rom_size as usize * 16384;
        if data.len() < offset + prg_bytes {
            return Err(RomError::SizeMismatch {
                expected: offset + prg_bytes,
                actual: data.len(),
            });
        }
        let prg_rom = data[offset..offset + prg_bytes].to_vec();
        offset += prg_bytes;

        let chr_bytes = header.chr_rom_size as usize * 8192;
        let chr_rom = if chr_bytes > 0 {
            if data.len() < offset + chr_bytes {
                return Err(RomError::SizeMismatch {
                    expected: offset + chr_bytes,
                    actual: data.len(),
                });
            }
            data[offset..offset + chr_bytes].to_vec()
        } else {
            Vec::new()
        };

        Ok(Self {
            header,
            trainer,
            prg_rom,
            chr_rom,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_header(
        prg_size: u8,
        chr_size: u8,
        mapper: u8,
        mirroring: u8,
        battery: bool,
    ) -> Vec<u8> {
        let mut header = vec![0x4E, 0x45, 0x53, 0x1A]; // Magic
        header.push(prg_size);
        header.push(chr_size);
        header.push(((mapper & 0x0F) << 4) | mirroring | if battery { 0x02 } else { 0x00 });
        header.push(mapper & 0xF0);
        header.extend_from_slice(&[0; 8]); // Padding
        header
    }

    #[test]
    fn test_valid_ines_header() {
        let header = create_test_header(2, 1, 0, 0, false);
        let result = RomHeader::parse(&header);
        assert!(result.is_ok());

        let parsed = result.unwrap();
        assert_eq!(parsed.prg_rom_size, 2);
        assert_eq!(parsed.chr_rom_size, 1);
        assert_eq!(parsed.mapper, 0);
        assert_eq!(parsed.mirroring, Mirroring::Horizontal);
        assert!(!parsed.has_battery);
        assert_eq!(parsed.format, RomFormat::INes);
    }

    #[test]
    fn test_invalid_magic() {
        let mut header = create_test_header(1, 1, 0, 0, false);
        header[0] = 0x00; // Corrupt magic
        let result = RomHeader::parse(&header);
        assert!(matches!(result, Err(RomError::InvalidMagic(_))));
    }

    #[test]
    fn test_file_too_small() {
        let result = RomHeader::parse(&[0x4E, 0x45, 0x53]);
        assert!(matches!(result, Err(RomError::FileTooSmall(3))));
    }

    #[test]
    fn test_mapper_number_parsing() {
        let header = create_test_header(1, 1, 0x42, 0, false);
        let parsed = RomHeader::parse(&header).unwrap();
        assert_eq!(parsed.mapper, 0x42);
    }

    #[test]
    fn test_mirroring_modes() {
        let header = create_test_header(1, 1, 0, 0x00, false);
        assert_eq!(
            RomHeader::parse(&header).unwrap().mirroring,
            Mirroring::Horizontal
        );

        let header = create_test_header(1, 1, 0, 0x01, false);
        assert_eq!(
            RomHeader::parse(&header).unwrap().mirroring,
            Mirroring::Vertical
        );

        let header = create_test_header(1, 1, 0, 0x08, false);
        assert_eq!(
            RomHeader::parse(&header).unwrap().mirroring,
            Mirroring::FourScreen
        );
    }

    #[test]
    fn test_battery_flag() {
        let header = create_test_header(1, 1, 0, 0, true);
        let parsed = RomHeader::parse(&header).unwrap();
        assert!(parsed.has_battery);
    }

    #[test]
    fn test_rom_loading() {
        let mut rom_data = create_test_header(1, 1, 0, 0, false);
        rom_data.extend_from_slice(&[0x42; 16384]); // PRG-ROM
        rom_data.extend_from_slice(&[0x55; 8192]); // CHR-ROM

        let rom = Rom::load(&rom_data).unwrap();
        assert_eq!(rom.header.prg_rom_size, 1);
        assert_eq!(rom.header.chr_rom_size, 1);
        assert_eq!(rom.prg_rom.len(), 16384);
        assert_eq!(rom.chr_rom.len(), 8192);
        assert_eq!(rom.prg_rom[0], 0x42);
        assert_eq!(rom.chr_rom[0], 0x55);
    }

    #[test]
    fn test_rom_with_trainer() {
        let mut header = create_test_header(1, 0, 0, 0, false);
        header[6] |= 0x04; // Set trainer flag

        let mut rom_data = header;
        rom_data.extend_from_slice(&[0xFF; 512]); // Trainer
        rom_data.extend_from_slice(&[0x42; 16384]); // PRG-ROM

        let rom = Rom::load(&rom_data).unwrap();
        assert!(rom.header.has_trainer);
        assert!(rom.trainer.is_some());
        assert_eq!(rom.trainer.unwrap().len(), 512);
    }

    #[test]
    fn test_rom_size_mismatch() {
        let mut rom_data = create_test_header(2, 1, 0, 0, false);
        rom_data.extend_from_slice(&[0x42; 1024]); // Too small
        let result = Rom::load(&rom_data);
        assert!(matches!(result, Err(RomError::SizeMismatch { .. })));
    }

    #[test]
    fn test_nes20_format_detected() {
        let mut header = create_test_header(1, 1, 0, 0, false);
        header[7] |= 0x08; // NES 2.0 identifier bits
        let parsed = RomHeader::parse(&header).unwrap();
        assert_eq!(parsed.format, RomFormat::Nes20);
    }
}
