//! nesverge Core - NES Emulation Integration Layer.
//!
//! This crate provides the high-level NES emulation API, integrating the CPU,
//! PPU, APU, and mapper components into a complete console emulator.
//!
//! # Architecture
//!
//! The core crate connects all NES components through a central bus:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Console                              │
//! │  ┌─────────────────────────────────────────────────────┐   │
//! │  │                      NesBus                          │   │
//! │  │  ┌─────┐  ┌─────┐  ┌─────┐  ┌────────┐  ┌────────┐ │   │
//! │  │  │ RAM │  │ PPU │  │ APU │  │ Mapper │  │ Input  │ │   │
//! │  │  │ 2KB │  │     │  │     │  │        │  │        │ │   │
//! │  │  └─────┘  └─────┘  └─────┘  └────────┘  └────────┘ │   │
//! │  └─────────────────────────────────────────────────────┘   │
//! │                          ▲                                  │
//! │                          │                                  │
//! │                     ┌────┴────┐                             │
//! │                     │   CPU   │                             │
//! │                     │  6502   │                             │
//! │                     └─────────┘                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use nes_core::{Console, ControllerState};
//!
//! // Load a ROM file
//! let rom_data = std::fs::read("game.nes").expect("Failed to read ROM");
//! let mut console = Console::new(&rom_data).expect("Failed to create console");
//!
//! // Power on and run
//! console.power_on();
//!
//! let mut frame = [0u32; 256 * 240];
//! let mut audio = [0u8; 4096];
//!
//! loop {
//!     // Set controller input
//!     console.set_button(0, true); // A
//!     console.set_button(3, true); // Start
//!
//!     // Run one frame
//!     console.run_one_frame();
//!
//!     // Get framebuffer for display, packed as 0xAARRGGBB
//!     console.render_frame_into(&mut frame);
//!
//!     // Drain buffered audio (8-bit PCM, 44.1 kHz mono)
//!     let _n = console.read_audio(&mut audio);
//! }
//! ```
//!
//! # Features
//!
//! - `std` (default): Enable standard library support
//! - `serde`: Enable serialization for save states

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(not(feature = "std"))]
extern crate alloc;

mod bus;
mod console;
pub mod palette;

// Re-export main types
pub use bus::{ControllerState, NesBus};
pub use console::{Console, ConsoleError, timing};

// Re-export commonly used types from dependencies
pub use nes_apu::Apu;
pub use nes_cpu::Cpu;
pub use nes_mappers::{Mapper, Mirroring, Rom, RomError, RomFormat, RomHeader, create_mapper};
pub use nes_ppu::Ppu;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// NES screen dimensions.
pub mod screen {
    /// Screen width in pixels.
    pub const WIDTH: u32 = 256;
    /// Screen height in pixels.
    pub const HEIGHT: u32 = 240;
    /// Total pixels per frame.
    pub const PIXELS: u32 = WIDTH * HEIGHT;
    /// Bytes per frame (RGBA).
    pub const FRAMEBUFFER_SIZE: usize = (PIXELS * 4) as usize;
}
