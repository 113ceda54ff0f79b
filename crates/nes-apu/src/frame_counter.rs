//! APU Frame Counter.
//!
//! The frame counter is responsible for clocking the envelope, length counter,
//! and sweep units at specific cycle intervals. It operates in two modes:
//!
//! - 4-step mode: quarter-frame clocks at CPU cycles 3729, 7457, 11186, and
//!   14915; 7457 and 14915 also clock a half frame. 14915 additionally sets
//!   the frame IRQ (when not inhibited) and wraps back to cycle 0.
//!
//! - 5-step mode: quarter-frame clocks at 3729, 7457, 11186, and 18641; 7457
//!   and 18641 also clock a half frame. Never sets the frame IRQ. Writing
//!   $4017 with bit 7 set clocks quarter and half frame immediately.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Frame counter mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum FrameCounterMode {
    /// 4-step mode (NTSC: 14915 cycles per frame).
    #[default]
    FourStep,
    /// 5-step mode (NTSC: 18641 cycles per frame).
    FiveStep,
}

/// Frame counter events that occur on specific cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameEvent {
    /// Quarter frame (clock envelope and linear counter).
    QuarterFrame,
    /// Half frame (clock length counter and sweep).
    HalfFrame,
    /// IRQ (only in 4-step mode with IRQ enabled).
    Irq,
}

/// Frame counter.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FrameCounter {
    /// Current cycle within the frame.
    cycle: u16,
    /// Frame counter mode.
    mode: FrameCounterMode,
    /// IRQ inhibit flag.
    irq_inhibit: bool,
    /// IRQ pending flag.
    irq_pending: bool,
    /// Reset delay (cycles until mode change takes effect).
    reset_delay: u8,
    /// Pending mode to set after reset delay.
    pending_mode: Option<FrameCounterMode>,
}

/// 4-step mode cycle points: quarter, quarter+half, quarter, quarter+half+irq.
const FOUR_STEP_CYCLES: [u16; 4] = [3729, 7457, 11186, 14915];

/// 5-step mode cycle points: quarter, quarter+half, quarter, quarter+half.
const FIVE_STEP_CYCLES: [u16; 4] = [3729, 7457, 11186, 18641];

impl FrameCounter {
    /// Create a new frame counter.
    #[must_use]
    pub fn new() -> Self {
        Self {
            cycle: 0,
            mode: FrameCounterMode::FourStep,
            irq_inhibit: false,
            irq_pending: false,
            reset_delay: 0,
            pending_mode: None,
        }
    }

    /// Write to the frame counter register ($4017).
    /// Bits: MI-- ----
    /// - M: Mode (0 = 4-step, 1 = 5-step)
    /// - I: IRQ inhibit
    pub fn write(&mut self, value: u8) {
        self.irq_inhibit = value & 0x40 != 0;

        if self.irq_inhibit {
            self.irq_pending = false;
        }

        let new_mode = if value & 0x80 != 0 {
            FrameCounterMode::FiveStep
        } else {
            FrameCounterMode::FourStep
        };

        // Mode change takes effect after a delay
        self.pending_mode = Some(new_mode);
        self.reset_delay = if self.cycle.is_multiple_of(2) { 4 } else { 3 };
    }

    /// Clock the frame counter. Returns any events that occurred.
    pub fn clock(&mut self) -> [Option<FrameEvent>; 3] {
        let mut events = [None; 3];
        let mut event_idx = 0;

        // Handle pending mode change
        if self.reset_delay > 0 {
            self.reset_delay -= 1;
            if self.reset_delay == 0
                && let Some(mode) = self.pending_mode.take()
            {
                log::debug!("frame counter mode change: {:?} -> {mode:?}", self.mode);
                self.mode = mode;
                self.cycle = 0;

                // 5-step mode immediately clocks half frame on mode set
                if self.mode == FrameCounterMode::FiveStep {
                    events[event_idx] = Some(FrameEvent::QuarterFrame);
                    event_idx += 1;
                    events[event_idx] = Some(FrameEvent::HalfFrame);
                    return events;
                }
            }
        }

        self.cycle += 1;

        match self.mode {
            FrameCounterMode::FourStep => {
                self.clock_four_step(&mut events);
            }
            FrameCounterMode::FiveStep => {
                self.clock_five_step(&mut events);
            }
        }

        events
    }

    /// Clock in 4-step mode.
    fn clock_four_step(&mut self, events: &mut [Option<FrameEvent>; 3]) {
        match self.cycle {
            c if c == FOUR_STEP_CYCLES[0] => {
                events[0] = Some(FrameEvent::QuarterFrame);
            }
            c if c == FOUR_STEP_CYCLES[1] => {
                events[0] = Some(FrameEvent::QuarterFrame);
                events[1] = Some(FrameEvent::HalfFrame);
            }
            c if c == FOUR_STEP_CYCLES[2] => {
                events[0] = Some(FrameEvent::QuarterFrame);
            }
            c if c == FOUR_STEP_CYCLES[3] => {
                events[0] = Some(FrameEvent::QuarterFrame);
                events[1] = Some(FrameEvent::HalfFrame);
                if !self.irq_inhibit {
                    self.irq_pending = true;
                    events[2] = Some(FrameEvent::Irq);
                }
                // Frame complete, reset
                self.cycle = 0;
            }
            _ => {}
        }
    }

    /// Clock in 5-step mode.
    fn clock_five_step(&mut self, events: &mut [Option<FrameEvent>; 3]) {
        match self.cycle {
            c if c == FIVE_STEP_CYCLES[0] => {
                events[0] = Some(FrameEvent::QuarterFrame);
            }
            c if c == FIVE_STEP_CYCLES[1] => {
                events[0] = Some(FrameEvent::QuarterFrame);
                events[1] = Some(FrameEvent::HalfFrame);
            }
            c if c == FIVE_STEP_CYCLES[2] => {
                events[0] = Some(FrameEvent::QuarterFrame);
            }
            c if c == FIVE_STEP_CYCLES[3] => {
                events[0] = Some(FrameEvent::QuarterFrame);
                events[1] = Some(FrameEvent::HalfFrame);
                // Frame complete, reset
                self.cycle = 0;
            }
            _ => {}
        }
    }

    /// Check if an IRQ is pending.
    #[must_use]
    pub fn irq_pending(&self) -> bool {
        self.irq_pending
    }

    /// Clear the IRQ pending flag (called when status is read).
    pub fn clear_irq(&mut self) {
        self.irq_pending = false;
    }

    /// Get the current cycle.
    #[must_use]
    pub fn cycle(&self) -> u16 {
        self.cycle
    }

    /// Get the current mode.
    #[must_use]
    pub fn mode(&self) -> FrameCounterMode {
        self.mode
    }
}

impl Default for FrameCounter {
    fn default() -> Self {
        Self::new()
    }
}
