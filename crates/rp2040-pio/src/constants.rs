//! Hardware configuration constants, as reported by DBG_CFGINFO.

/// Number of PIO blocks on the chip.
pub const PIO_NUM: usize = 2;

/// Instruction memory size in half-words, shared by all state machines.
pub const MEMORY_SIZE: usize = 32;

/// State machines per PIO block.
pub const SM_COUNT: usize = 4;

/// Depth of one unjoined FIFO.
pub const FIFO_DEPTH: usize = 4;

/// Block-level IRQ flags.
pub const IRQ_COUNT: usize = 8;

/// GPIO pins visible to a PIO block.
pub const GPIO_NUM: usize = 32;
