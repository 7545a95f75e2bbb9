//! Headless RP2040 PIO emulator.
//!
//! Assembles two PIO blocks behind a master clock, exposes them through the
//! datasheet register facade plus an emulator-only extended facade, routes
//! both through an address bus, and serves the whole address space over a
//! line-oriented TCP bridge so out-of-process SDK bindings can drive the
//! emulator as if it were silicon.

use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::Duration;

use emu_core::{ClockMode, MasterClock, Tickable};
use rp2040_pio::constants::PIO_NUM;
use rp2040_pio::Pio;

pub mod bus;
pub mod client;
pub mod emu_registers;
pub mod hex;
pub mod registers;
pub mod server;
pub mod snapshot;

pub use bus::{AddressBus, BusError};
pub use client::RegisterClient;
pub use server::RegisterServer;

/// Base address of the PIO0 user register window.
pub const PIO0_BASE: u32 = 0x5020_0000;
/// Base address of the PIO1 user register window.
pub const PIO1_BASE: u32 = 0x5030_0000;
/// Base address of the PIO0 extended emulator window.
pub const PIO0_EMU_BASE: u32 = 0x5820_0000;
/// Base address of the PIO1 extended emulator window.
pub const PIO1_EMU_BASE: u32 = 0x5830_0000;

/// The emulated machine: two PIO blocks on one two-phase master clock.
#[derive(Debug, Clone)]
pub struct Emulator {
    clock: MasterClock,
    pios: [Pio; PIO_NUM],
}

impl Emulator {
    #[must_use]
    pub fn new() -> Self {
        Self {
            clock: MasterClock::new(),
            pios: [Pio::new(0), Pio::new(1)],
        }
    }

    #[must_use]
    pub fn pio(&self, pio_num: usize) -> &Pio {
        &self.pios[pio_num]
    }

    pub fn pio_mut(&mut self, pio_num: usize) -> &mut Pio {
        &mut self.pios[pio_num]
    }

    #[must_use]
    pub fn clock(&self) -> &MasterClock {
        &self.clock
    }

    pub fn clock_mut(&mut self) -> &mut MasterClock {
        &mut self.clock
    }
}

impl Default for Emulator {
    fn default() -> Self {
        Self::new()
    }
}

impl Tickable for Emulator {
    fn tick_phase0(&mut self) {
        if self.clock.advance_phase0() {
            for pio in &mut self.pios {
                pio.tick_phase0();
            }
        }
    }

    fn tick_phase1(&mut self) {
        if self.clock.advance_phase1() {
            for pio in &mut self.pios {
                pio.tick_phase1();
            }
        }
    }
}

/// The emulator behind its single serialization lock, plus the condition
/// variable bus waiters park on. Every register access path and every clock
/// phase transition goes through this lock; phase-1 commits notify the
/// waiters.
pub struct EmulatorShared {
    state: Mutex<Emulator>,
    phase_edge: Condvar,
}

/// Shared handle used by facades, the bridge and clock drivers.
pub type EmulatorHandle = Arc<EmulatorShared>;

impl EmulatorShared {
    #[must_use]
    pub fn new() -> EmulatorHandle {
        Arc::new(Self {
            state: Mutex::new(Emulator::new()),
            phase_edge: Condvar::new(),
        })
    }

    /// Acquire the emulator lock. A poisoned lock is recovered: the
    /// emulator state itself is always consistent between mutations.
    pub fn lock(&self) -> MutexGuard<'_, Emulator> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Run phase 0 under the lock. Returns after the phase has quiesced.
    pub fn trigger_phase0(&self) {
        let mut emulator = self.lock();
        emulator.tick_phase0();
    }

    /// Run phase 1 under the lock and wake any bus waiters.
    pub fn trigger_phase1(&self) {
        let mut emulator = self.lock();
        emulator.tick_phase1();
        drop(emulator);
        self.phase_edge.notify_all();
    }

    /// Run one complete cycle.
    pub fn tick(&self) {
        self.trigger_phase0();
        self.trigger_phase1();
    }

    /// Completed cycles since power-on.
    #[must_use]
    pub fn ticks(&self) -> u64 {
        self.lock().clock().ticks().get()
    }

    #[must_use]
    pub fn clock_mode(&self) -> ClockMode {
        self.lock().clock().mode()
    }

    pub fn set_clock_mode(&self, mode: ClockMode) {
        self.lock().clock_mut().set_mode(mode);
    }

    /// Park until the next phase-1 commit or until `timeout` elapses.
    pub fn wait_phase_edge(&self, timeout: Duration) {
        let guard = self.lock();
        let _ = self
            .phase_edge
            .wait_timeout(guard, timeout)
            .unwrap_or_else(|poisoned| poisoned.into_inner());
    }
}

/// Build an address bus with all four facades of this machine registered
/// in their canonical order. Each consumer (in-process monitor, bridge
/// client thread) gets its own bus over the shared emulator.
#[must_use]
pub fn make_address_bus(handle: &EmulatorHandle) -> AddressBus {
    let mut bus = AddressBus::new(handle.clone());
    bus.add_facade(Box::new(registers::PioRegisters::new(
        handle.clone(),
        0,
        PIO0_BASE,
    )));
    bus.add_facade(Box::new(registers::PioRegisters::new(
        handle.clone(),
        1,
        PIO1_BASE,
    )));
    bus.add_facade(Box::new(emu_registers::PioEmuRegisters::new(
        handle.clone(),
        0,
        PIO0_EMU_BASE,
    )));
    bus.add_facade(Box::new(emu_registers::PioEmuRegisters::new(
        handle.clone(),
        1,
        PIO1_EMU_BASE,
    )));
    bus
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_pairs_complete_one_tick() {
        let handle = EmulatorShared::new();
        assert_eq!(handle.ticks(), 0);
        handle.trigger_phase0();
        assert_eq!(handle.ticks(), 0);
        handle.trigger_phase1();
        assert_eq!(handle.ticks(), 1);
        // a stray phase 1 without a phase 0 is ignored
        handle.trigger_phase1();
        assert_eq!(handle.ticks(), 1);
    }
}
