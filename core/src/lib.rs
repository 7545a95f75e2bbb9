//! Core traits for cycle-accurate peripheral emulation.

mod clock;
mod registers;
mod tickable;
mod ticks;

pub use clock::{ClockMode, MasterClock};
pub use registers::{write_masked, AccessMode, Registers, REGISTER_WINDOW_SIZE};
pub use tickable::Tickable;
pub use ticks::Ticks;
