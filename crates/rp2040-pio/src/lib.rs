//! RP2040 Programmable I/O (PIO) block.
//!
//! A PIO block contains four state machines sharing a 32-instruction memory,
//! eight IRQ flags and a 32-pin GPIO view. The state machines execute a
//! nine-opcode ISA in lockstep with a two-phase master clock: inputs are
//! sampled and instructions evaluated at phase 0, pin outputs commit at
//! phase 1. Behavior follows the RP2040 datasheet, Sect. 3.

pub mod constants;
mod fifo;
mod gpio;
mod instruction;
mod irq;
mod memory;
mod pio;
mod shifter;
mod sm;

pub mod asm;

pub use fifo::{Fifo, FifoJoin};
pub use gpio::{Bit, Direction, GpioFabric, MaskedValue, PinCommand};
pub use instruction::{
    DecodeError, Instruction, InSource, JmpCondition, MovDestination, MovOperation, MovSource,
    OutDestination, SetDestination, SideSet, WaitSource,
};
pub use irq::IrqUnit;
pub use memory::InstructionMemory;
pub use pio::Pio;
pub use sm::StateMachine;
