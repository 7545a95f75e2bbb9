//! Address bus: routes 32-bit addresses to the registered facades.
//!
//! Facades are consulted in registration order; the first one that provides
//! an address handles the access. Unmapped reads return 0, unmapped writes
//! are discarded, unmapped waits fail. `wait` parks the calling thread on
//! the emulator's phase edge until the masked comparison holds or a cycle
//! or wall-clock budget runs out.

use std::error::Error;
use std::fmt;
use std::time::{Duration, Instant};

use emu_core::Registers;

use crate::EmulatorHandle;

/// Bus access failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusError {
    /// No facade provides the address.
    UnmappedAddress(u32),
    /// A wait exhausted its cycle or wall-clock budget.
    Timeout,
    /// A wait was abandoned because its client went away.
    Disconnected,
}

impl fmt::Display for BusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnmappedAddress(address) => write!(f, "unmapped address {address:#010x}"),
            Self::Timeout => write!(f, "wait timed out"),
            Self::Disconnected => write!(f, "client disconnected"),
        }
    }
}

impl Error for BusError {}

/// How long a waiter sleeps between re-checks when no phase edge arrives.
const WAIT_SLICE: Duration = Duration::from_millis(10);

/// Ordered collection of register facades over one emulator.
pub struct AddressBus {
    facades: Vec<Box<dyn Registers + Send>>,
    handle: EmulatorHandle,
}

impl AddressBus {
    #[must_use]
    pub fn new(handle: EmulatorHandle) -> Self {
        Self {
            facades: Vec::new(),
            handle,
        }
    }

    /// Register a facade. Later facades never shadow earlier ones; bases
    /// are expected to be disjoint.
    pub fn add_facade(&mut self, facade: Box<dyn Registers + Send>) {
        self.facades.push(facade);
    }

    #[must_use]
    pub fn provides(&self, address: u32) -> bool {
        self.facades.iter().any(|f| f.provides(address))
    }

    /// Read the register at `address`; unmapped addresses read as 0.
    pub fn read(&mut self, address: u32) -> u32 {
        for facade in &mut self.facades {
            if facade.provides(address) {
                return facade.read(address);
            }
        }
        0
    }

    /// Write the register at `address`; unmapped writes are discarded.
    pub fn write(&mut self, address: u32, value: u32) {
        for facade in &mut self.facades {
            if facade.provides(address) {
                facade.write(address, value);
                return;
            }
        }
    }

    /// Diagnostic name of the register at `address`.
    #[must_use]
    pub fn label(&self, address: u32) -> Option<String> {
        self.facades.iter().find_map(|f| f.label(address))
    }

    /// Block until `(read(address) & mask) == (expected & mask)`.
    ///
    /// A zero `cycles_timeout` / `millis_timeout` leaves that axis
    /// unbounded; both may apply. Returns the observed value.
    pub fn wait(
        &mut self,
        address: u32,
        expected: u32,
        mask: u32,
        cycles_timeout: u64,
        millis_timeout: u64,
    ) -> Result<u32, BusError> {
        self.wait_cancellable(address, expected, mask, cycles_timeout, millis_timeout, || {
            false
        })
    }

    /// `wait`, giving up with `BusError::Disconnected` once `cancelled`
    /// reports true (checked between re-reads, never under the lock).
    pub fn wait_cancellable(
        &mut self,
        address: u32,
        expected: u32,
        mask: u32,
        cycles_timeout: u64,
        millis_timeout: u64,
        cancelled: impl Fn() -> bool,
    ) -> Result<u32, BusError> {
        if !self.provides(address) {
            return Err(BusError::UnmappedAddress(address));
        }
        let start_tick = self.handle.ticks();
        let deadline = if millis_timeout > 0 {
            Some(Instant::now() + Duration::from_millis(millis_timeout))
        } else {
            None
        };
        loop {
            let value = self.read(address);
            if value & mask == expected & mask {
                return Ok(value);
            }
            if cycles_timeout > 0 && self.handle.ticks() - start_tick >= cycles_timeout {
                return Err(BusError::Timeout);
            }
            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    return Err(BusError::Timeout);
                }
            }
            if cancelled() {
                return Err(BusError::Disconnected);
            }
            self.handle.wait_phase_edge(WAIT_SLICE);
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{make_address_bus, EmulatorShared, PIO0_BASE, PIO1_BASE};

    use super::*;

    #[test]
    fn unmapped_addresses_read_zero_and_fail_wait() {
        let handle = EmulatorShared::new();
        let mut bus = make_address_bus(&handle);
        assert!(!bus.provides(0x4000_0000));
        assert_eq!(bus.read(0x4000_0000), 0);
        bus.write(0x4000_0000, 0xFFFF_FFFF);
        assert_eq!(
            bus.wait(0x4000_0000, 0, 0, 1, 0),
            Err(BusError::UnmappedAddress(0x4000_0000))
        );
    }

    #[test]
    fn dispatch_separates_the_two_blocks() {
        let handle = EmulatorShared::new();
        let mut bus = make_address_bus(&handle);
        bus.write(PIO0_BASE + 0x48, 0xE021); // PIO0 INSTR_MEM0
        bus.write(PIO1_BASE + 0x48, 0xE042); // PIO1 INSTR_MEM0
        let emulator = handle.lock();
        assert_eq!(emulator.pio(0).memory().fetch(0), 0xE021);
        assert_eq!(emulator.pio(1).memory().fetch(0), 0xE042);
    }

    #[test]
    fn wait_observes_a_value_already_in_place() {
        let handle = EmulatorShared::new();
        let mut bus = make_address_bus(&handle);
        bus.write(PIO0_BASE + 0x48, 0xE025); // set x, 5
        // SM0_ADDR == 0 already holds
        let observed = bus.wait(PIO0_BASE + 0xD4, 0, 0x1F, 10, 0);
        assert_eq!(observed, Ok(0));
    }

    #[test]
    fn wait_times_out_after_the_cycle_budget() {
        let handle = EmulatorShared::new();
        // nothing drives SM0_ADDR to 5; burn the cycle budget
        let waiter = {
            let handle = handle.clone();
            std::thread::spawn(move || {
                let mut bus = make_address_bus(&handle);
                bus.wait(PIO0_BASE + 0xD4, 5, 0x1F, 100, 0)
            })
        };
        for _ in 0..120 {
            handle.tick();
        }
        assert_eq!(waiter.join().expect("waiter panicked"), Err(BusError::Timeout));
    }

    #[test]
    fn wait_resolves_when_the_machine_reaches_the_state() {
        let handle = EmulatorShared::new();
        let mut bus = make_address_bus(&handle);
        // five nops then a spin: PC reaches 5 and stays
        bus.write(PIO0_BASE + 0x48, 0xA042);
        bus.write(PIO0_BASE + 0x4C, 0xA042);
        bus.write(PIO0_BASE + 0x50, 0xA042);
        bus.write(PIO0_BASE + 0x54, 0xA042);
        bus.write(PIO0_BASE + 0x58, 0xA042);
        bus.write(PIO0_BASE + 0x5C, 0x0005); // jmp 5
        bus.write(PIO0_BASE, 0x1); // CTRL: enable SM0

        let waiter = {
            let handle = handle.clone();
            std::thread::spawn(move || {
                let mut bus = make_address_bus(&handle);
                bus.wait(PIO0_BASE + 0xD4, 5, 0x1F, 0, 2_000)
            })
        };
        for _ in 0..8 {
            handle.tick();
            std::thread::sleep(Duration::from_millis(1));
        }
        let observed = waiter.join().expect("waiter panicked");
        assert_eq!(observed, Ok(5));
    }
}
