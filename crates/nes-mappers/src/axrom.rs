//! AxROM Mapper (Mapper 7).
//!
//! A simple mapper with 32KB PRG-ROM banking and single-screen mirroring control.
//! Used by games like Battletoads, Wizards & Warriors, and Marble Madness.
//!
//! Memory layout:
//! - PRG-ROM: 32KB switchable bank at $8000-$FFFF
//! - CHR-RAM: 8KB (no CHR-ROM banking)
//! - No PRG-RAM
//!
//! Bank selection: Write to $8000-$FFFF
//! - Bits 0-2: Select 32KB PRG bank
//! - Bit 4: Select single-screen mirroring (0 = lower, 1 = upper)

use crate::mapper::{Mapper, Mirroring};
use crate::rom::Rom;

#[cfg(not(feature = "std"))]
use alloc::vec::Vec;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// AxROM mapper implementation.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Axrom {
    /// PRG-ROM data.
    prg_rom: Vec<u8>,
    /// CHR-RAM data (8KB).
    chr_ram: Vec<u8>,
    /// Number of PRG-ROM banks (32KB each).
    prg_banks: usize,
    /// Currently selected PRG bank.
    prg_bank: u8,
    /// Current mirroring mode.
    mirroring: Mirroring,
}

impl Axrom {
    /// Create a new AxROM mapper from ROM data.
    #[must_use]
    pub fn new(rom: &Rom) -> Self {
        let prg_banks = rom.prg_rom.len() / 32768;
        let chr_ram = if rom.chr_rom.is_empty() {
            vec![0u8; 8192]
        } else {
            rom.chr_rom.clone()
        };

        Self {
            prg_rom: rom.prg_rom.clone(),
            chr_ram,
            prg_banks: prg_banks.max(1),
            prg_bank: 0,
            mirroring: Mirroring::SingleScreenLower,
        }
    }
}

impl Mapper for Axrom {
    fn read_prg(&self, addr: u16) -> u8 {
        match addr {
            0x6000..=0x7FFF => {
                // No PRG-RAM on AxROM
                0
            }
            0x8000..=0xFFFF => {
                // 32KB switchable bank
                let bank = (self.prg_bank as usize) % self.prg_banks;
                let offset = (addr - 0x8000) as usize;
                self.prg_rom
                    .get(bank * 32768 + offset)
                    .copied()
                    .unwrap_or(0)
            }
            _ => 0,
        }
    }

    fn write_prg(&mut self, addr: u16, val: u8, _cycle: u64) {
        if (0x8000..=0xFFFF).contains(&addr) {
            // Bits 0-2: PRG bank select
            self.prg_bank = val & 0x07;
            // Bit 4: Mirroring select
            self.mirroring = if val & 0x10 != 0 {
                Mirroring::SingleScreenUpper
            } else {
                Mirroring::SingleScreenLower
            };
            log::debug!(
                "axrom bank commit: prg_bank={} mirroring={:?}",
                self.prg_bank,
                self.mirroring
            );
        }
    }

    fn read_chr(&self, addr: u16) -> u8 {
        let offset = (addr & 0x1FFF) as usize;
        self.chr_ram.get(offset).copied().unwrap_or(0)
    }

    fn write_chr(&mut self, addr: u16, val: u8) {
        let offset = (addr & 0x1FFF) as usize;
        if let Some(byte) = self.chr_ram.get_mut(offset) {
            *byte = val;
        }
    }

    fn mirroring(&self) -> Mirroring {
        self.mirroring
    }

    fn mapper_number(&self) -> u16 {
        7
    }

    fn mapper_name(&self) -> &'static str {
        "AxROM"
    }

    fn reset(&mut self) {
        self.prg_bank = 0;
        self.mirroring = Mirroring::SingleScreenLower;
    }
}
