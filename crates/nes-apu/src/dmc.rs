//! APU DMC (Delta Modulation Channel).
//!
//! The DMC channel plays 1-bit delta-encoded samples fetched from PRG-ROM via
//! the mapper. Sample fetches are driven externally (by the bus, which owns
//! the mapper): the channel exposes [`Dmc::needs_sample`] /
//! [`Dmc::sample_addr`] / [`Dmc::fill_sample_buffer`] instead of reading
//! memory itself, since CPU-stalling DMA does not belong to the APU.
//!
//! # Registers
//!
//! - `$4010`: IRQ enable, loop flag, rate index
//! - `$4011`: Direct load (7-bit output level)
//! - `$4012`: Sample address = $C000 + (A x $40)
//! - `$4013`: Sample length = (L x $10) + 1 bytes

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// DMC rate table for NTSC (CPU cycles per timer tick).
const DMC_RATE_NTSC: [u16; 16] = [
    428, 380, 340, 320, 286, 254, 226, 214, 190, 160, 142, 128, 106, 84, 72, 54,
];

/// DMC channel.
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Dmc {
    irq_enabled: bool,
    loop_enabled: bool,
    rate_index: u8,

    sample_address: u8, // Register value ($4012)
    sample_length: u8,  // Register value ($4013)

    current_address: u16,
    bytes_remaining: u16,

    sample_buffer: u8,
    sample_buffer_empty: bool,
    bits_remaining: u8,
    output_level: u8,

    timer: u16,
    timer_counter: u16,

    /// Set when the output unit has emptied its buffer and a new byte
    /// should be fetched via DMA.
    needs_sample: bool,

    irq_flag: bool,

    enabled: bool,
}

impl Dmc {
    /// Create a new DMC channel.
    #[must_use]
    pub fn new() -> Self {
        let initial_timer = DMC_RATE_NTSC[0];

        Self {
            irq_enabled: false,
            loop_enabled: false,
            rate_index: 0,
            sample_address: 0,
            sample_length: 0,
            current_address: 0xC000,
            bytes_remaining: 0,
            sample_buffer: 0,
            sample_buffer_empty: true,
            bits_remaining: 0,
            output_level: 0,
            timer: initial_timer,
            timer_counter: initial_timer,
            needs_sample: false,
            irq_flag: false,
            enabled: false,
        }
    }

    /// Write to register $4010 (IRQ enable, loop, rate index).
    pub fn write_ctrl(&mut self, value: u8) {
        self.irq_enabled = (value & 0x80) != 0;
        self.loop_enabled = (value & 0x40) != 0;
        self.rate_index = value & 0x0F;
        self.timer = DMC_RATE_NTSC[self.rate_index as usize];

        if !self.irq_enabled {
            self.irq_flag = false;
        }
    }

    /// Write to register $4011 (direct load, 7-bit output level).
    pub fn write_direct_load(&mut self, value: u8) {
        self.output_level = value & 0x7F;
    }

    /// Write to register $4012 (sample address).
    pub fn write_sample_address(&mut self, value: u8) {
        self.sample_address = value;
    }

    /// Write to register $4013 (sample length).
    pub fn write_sample_length(&mut self, value: u8) {
        self.sample_length = value;
    }

    /// Set channel enable state (called from $4015 write).
    ///
    /// Enabling starts sample playback if no bytes remain.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;

        if enabled {
            if self.bytes_remaining == 0 {
                self.restart_sample();
            }
        } else {
            self.bytes_remaining = 0;
        }
    }

    /// Clock the timer. Should be called every other CPU cycle.
    ///
    /// When the timer reaches 0, clocks the output shifter and, if the
    /// sample buffer has run dry and bytes remain, raises
    /// [`Dmc::needs_sample`] for the bus to service.
    pub fn clock_timer(&mut self) {
        if self.timer_counter == 0 {
            self.timer_counter = self.timer;

            if self.bits_remaining > 0 {
                self.clock_output_shifter();
            }

            if self.sample_buffer_empty && self.bytes_remaining > 0 {
                self.needs_sample = true;
            }
        } else {
            self.timer_counter -= 1;
        }
    }

    /// Clock the output shifter.
    ///
    /// Processes one bit from the sample buffer: a 1 bit increments the
    /// output level by 2 (clamped to 127), a 0 bit decrements it by 2
    /// (clamped to 0). An empty buffer uses a silent 0 bit.
    fn clock_output_shifter(&mut self) {
        if self.sample_buffer_empty {
            if self.output_level >= 2 {
                self.output_level -= 2;
            }
        } else {
            if (self.sample_buffer & 1) == 1 {
                if self.output_level <= 125 {
                    self.output_level += 2;
                }
            } else if self.output_level >= 2 {
                self.output_level -= 2;
            }

            self.sample_buffer >>= 1;
        }

        self.bits_remaining -= 1;

        if self.bits_remaining == 0 {
            self.sample_buffer_empty = true;
        }
    }

    /// Check whether a sample byte needs to be fetched via DMA.
    #[must_use]
    pub fn needs_sample(&self) -> bool {
        self.needs_sample
    }

    /// Get the current DMA sample address.
    #[must_use]
    pub fn sample_addr(&self) -> u16 {
        self.current_address
    }

    /// Supply a fetched sample byte, completing the pending DMA request.
    ///
    /// Advances the read address (wrapping $FFFF -> $8000, not $0000),
    /// decrements the remaining byte count, and restarts or raises IRQ on
    /// sample completion.
    pub fn fill_sample_buffer(&mut self, sample: u8) {
        self.sample_buffer = sample;
        self.sample_buffer_empty = false;
        self.bits_remaining = 8;
        self.needs_sample = false;

        if self.current_address == 0xFFFF {
            self.current_address = 0x8000;
        } else {
            self.current_address += 1;
        }

        self.bytes_remaining -= 1;

        if self.bytes_remaining == 0 {
            if self.loop_enabled {
                self.restart_sample();
            } else if self.irq_enabled {
                self.irq_flag = true;
            }
        }
    }

    /// Get the number of sample bytes left to read.
    #[must_use]
    pub fn bytes_remaining(&self) -> u16 {
        self.bytes_remaining
    }

    /// Restart sample playback from the registers.
    fn restart_sample(&mut self) {
        self.current_address = 0xC000 | (u16::from(self.sample_address) << 6);
        self.bytes_remaining = (u16::from(self.sample_length) << 4) | 1;
    }

    /// Get the current output value (0-127). Returns 0 if disabled.
    #[must_use]
    pub fn output(&self) -> u8 {
        if self.enabled {
            self.output_level
        } else {
            0
        }
    }

    /// Check if the DMC IRQ flag is set.
    #[must_use]
    pub fn irq_pending(&self) -> bool {
        self.irq_flag
    }

    /// Clear the DMC IRQ flag (called when $4015 is read).
    pub fn clear_irq(&mut self) {
        self.irq_flag = false;
    }

    /// Check if bytes remain (for $4015 status read).
    #[must_use]
    pub fn active(&self) -> bool {
        self.bytes_remaining > 0
    }
}

impl Default for Dmc {
    fn default() -> Self {
        Self::new()
    }
}
