//! Extended emulator-only register facade.
//!
//! Exposes internal state the real silicon keeps hidden (scratch registers,
//! shift counters, delay and stall state, latched decode faults) plus
//! emulator controls: external pin injection and the single-step clock
//! phase triggers. Monitors and timing front-ends drive the emulator
//! exclusively through this window.

use emu_core::{ClockMode, Registers};

use crate::EmulatorHandle;

/// Registers per SMx_* group.
const SM_REGS: usize = 10;

const SM0_REGX: usize = 0x00;
const GPIO_PINS: usize = 4 * SM_REGS;
const GPIO_PINDIRS: usize = GPIO_PINS + 1;
const MASTERCLK_MODE: usize = GPIO_PINS + 2;
const MASTERCLK_FREQ: usize = GPIO_PINS + 3;
const MASTERCLK_TRIGGER_PHASE0: usize = GPIO_PINS + 4;
const MASTERCLK_TRIGGER_PHASE1: usize = GPIO_PINS + 5;

const REG_COUNT: u16 = (GPIO_PINS + 6) as u16;

/// The DECODE_FAULT register carries the faulting word with this flag bit.
const DECODE_FAULT_VALID: u32 = 1 << 16;

/// Extended facade of one PIO block.
pub struct PioEmuRegisters {
    handle: EmulatorHandle,
    pio_num: usize,
    base: u32,
}

impl PioEmuRegisters {
    #[must_use]
    pub fn new(handle: EmulatorHandle, pio_num: usize, base: u32) -> Self {
        Self {
            handle,
            pio_num,
            base,
        }
    }
}

impl Registers for PioEmuRegisters {
    fn base_address(&self) -> u32 {
        self.base
    }

    fn reg_count(&self) -> u16 {
        REG_COUNT
    }

    fn label_for_register(&self, reg: usize) -> String {
        match reg {
            SM0_REGX..=0x27 => {
                let sm_num = reg / SM_REGS;
                let field = match reg % SM_REGS {
                    0 => "REGX",
                    1 => "REGY",
                    2 => "PC",
                    3 => "ISR",
                    4 => "ISR_SHIFT_COUNT",
                    5 => "OSR",
                    6 => "OSR_SHIFT_COUNT",
                    7 => "DELAY",
                    8 => "STALLED",
                    _ => "DECODE_FAULT",
                };
                format!("SM{sm_num}_{field}")
            }
            GPIO_PINS => "GPIO_PINS".into(),
            GPIO_PINDIRS => "GPIO_PINDIRS".into(),
            MASTERCLK_MODE => "MASTERCLK_MODE".into(),
            MASTERCLK_FREQ => "MASTERCLK_FREQ".into(),
            MASTERCLK_TRIGGER_PHASE0 => "MASTERCLK_TRIGGER_PHASE0".into(),
            MASTERCLK_TRIGGER_PHASE1 => "MASTERCLK_TRIGGER_PHASE1".into(),
            _ => format!("PIO{}_EMU+{:#x}", self.pio_num, reg * 4),
        }
    }

    fn read_register(&mut self, reg: usize) -> u32 {
        let mut guard = self.handle.lock();
        let emulator = &mut *guard;
        match reg {
            SM0_REGX..=0x27 => {
                let sm = emulator.pio(self.pio_num).sm(reg / SM_REGS);
                match reg % SM_REGS {
                    0 => sm.x(),
                    1 => sm.y(),
                    2 => sm.pc(),
                    3 => sm.isr_value(),
                    4 => sm.isr_count(),
                    5 => sm.osr_value(),
                    6 => sm.osr_count(),
                    7 => sm.delay_remaining(),
                    8 => u32::from(sm.is_stalled()),
                    _ => sm
                        .decode_fault()
                        .map_or(0, |word| DECODE_FAULT_VALID | u32::from(word)),
                }
            }
            GPIO_PINS => emulator.pio(self.pio_num).gpio().pins_value(),
            GPIO_PINDIRS => emulator.pio(self.pio_num).gpio().pin_dirs_value(),
            MASTERCLK_MODE => match emulator.clock().mode() {
                ClockMode::SingleStep => 0,
                ClockMode::FreeRunning => 1,
            },
            MASTERCLK_FREQ => emulator.clock().frequency_hz(),
            // the phase triggers are write-only pulses
            _ => 0,
        }
    }

    fn write_register(&mut self, reg: usize, value: u32, mask: u32, xor: bool) {
        match reg {
            GPIO_PINS => {
                let mut emulator = self.handle.lock();
                let gpio = emulator.pio_mut(self.pio_num).gpio_mut();
                let levels = if xor {
                    gpio.pins_value() ^ (value & mask)
                } else {
                    (gpio.pins_value() & !mask) | (value & mask)
                };
                gpio.set_pins_value(levels);
            }
            MASTERCLK_MODE => {
                let mode = if value & mask & 1 != 0 {
                    ClockMode::FreeRunning
                } else {
                    ClockMode::SingleStep
                };
                self.handle.set_clock_mode(mode);
            }
            MASTERCLK_FREQ => {
                let mut emulator = self.handle.lock();
                let hz = emu_core::write_masked(emulator.clock().frequency_hz(), value, mask, xor);
                emulator.clock_mut().set_frequency_hz(hz);
            }
            // The triggers run the phase synchronously; the caller observes
            // a quiesced block once the write returns.
            MASTERCLK_TRIGGER_PHASE0 => {
                if value & mask != 0 {
                    self.handle.trigger_phase0();
                }
            }
            MASTERCLK_TRIGGER_PHASE1 => {
                if value & mask != 0 {
                    self.handle.trigger_phase1();
                }
            }
            // everything else in this window is read-only
            _ => {}
        }
    }
}
