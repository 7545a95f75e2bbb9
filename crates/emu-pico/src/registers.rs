//! Datasheet register facade of one PIO block.
//!
//! Register layout and bit placement follow RP2040 datasheet Sect. 3.7.
//! The facade holds a handle to the shared emulator and resolves each
//! access under the serialization lock; it keeps no state of its own.

use emu_core::Registers;
use rp2040_pio::Pio;

use crate::EmulatorHandle;

// Register numbers (word offsets from the window base).
const CTRL: usize = 0x00;
const FSTAT: usize = 0x01;
const FDEBUG: usize = 0x02;
const FLEVEL: usize = 0x03;
const TXF0: usize = 0x04;
const RXF0: usize = 0x08;
const IRQ: usize = 0x0C;
const IRQ_FORCE: usize = 0x0D;
const INPUT_SYNC_BYPASS: usize = 0x0E;
const DBG_PADOUT: usize = 0x0F;
const DBG_PADOE: usize = 0x10;
const DBG_CFGINFO: usize = 0x11;
const INSTR_MEM0: usize = 0x12;
const SM0_CLKDIV: usize = 0x32;
const INTR: usize = 0x4A;
const IRQ0_INTE: usize = 0x4B;
const IRQ0_INTF: usize = 0x4C;
const IRQ0_INTS: usize = 0x4D;
const IRQ1_INTE: usize = 0x4E;
const IRQ1_INTF: usize = 0x4F;
const IRQ1_INTS: usize = 0x50;

const REG_COUNT: u16 = 0x51;

/// Registers per SMx_* group.
const SM_REGS: usize = 6;

/// User-visible MMR facade of one PIO block.
pub struct PioRegisters {
    handle: EmulatorHandle,
    pio_num: usize,
    base: u32,
}

impl PioRegisters {
    #[must_use]
    pub fn new(handle: EmulatorHandle, pio_num: usize, base: u32) -> Self {
        Self {
            handle,
            pio_num,
            base,
        }
    }

    fn with_pio<T>(&self, f: impl FnOnce(&mut Pio) -> T) -> T {
        let mut emulator = self.handle.lock();
        f(emulator.pio_mut(self.pio_num))
    }
}

impl Registers for PioRegisters {
    fn base_address(&self) -> u32 {
        self.base
    }

    fn reg_count(&self) -> u16 {
        REG_COUNT
    }

    fn label_for_register(&self, reg: usize) -> String {
        match reg {
            CTRL => "CTRL".into(),
            FSTAT => "FSTAT".into(),
            FDEBUG => "FDEBUG".into(),
            FLEVEL => "FLEVEL".into(),
            TXF0..=0x07 => format!("TXF{}", reg - TXF0),
            RXF0..=0x0B => format!("RXF{}", reg - RXF0),
            IRQ => "IRQ".into(),
            IRQ_FORCE => "IRQ_FORCE".into(),
            INPUT_SYNC_BYPASS => "INPUT_SYNC_BYPASS".into(),
            DBG_PADOUT => "DBG_PADOUT".into(),
            DBG_PADOE => "DBG_PADOE".into(),
            DBG_CFGINFO => "DBG_CFGINFO".into(),
            INSTR_MEM0..=0x31 => format!("INSTR_MEM{}", reg - INSTR_MEM0),
            SM0_CLKDIV..=0x49 => {
                let sm_num = (reg - SM0_CLKDIV) / SM_REGS;
                let field = match (reg - SM0_CLKDIV) % SM_REGS {
                    0 => "CLKDIV",
                    1 => "EXECCTRL",
                    2 => "SHIFTCTRL",
                    3 => "ADDR",
                    4 => "INSTR",
                    _ => "PINCTRL",
                };
                format!("SM{sm_num}_{field}")
            }
            INTR => "INTR".into(),
            IRQ0_INTE => "IRQ0_INTE".into(),
            IRQ0_INTF => "IRQ0_INTF".into(),
            IRQ0_INTS => "IRQ0_INTS".into(),
            IRQ1_INTE => "IRQ1_INTE".into(),
            IRQ1_INTF => "IRQ1_INTF".into(),
            IRQ1_INTS => "IRQ1_INTS".into(),
            _ => format!("PIO{}+{:#x}", self.pio_num, reg * 4),
        }
    }

    fn read_register(&mut self, reg: usize) -> u32 {
        self.with_pio(|pio| match reg {
            CTRL => pio.sm_enabled(),
            FSTAT => pio.fstat(),
            FDEBUG => pio.fdebug(),
            FLEVEL => pio.flevel(),
            // TXFx and INSTR_MEMx are write-only
            TXF0..=0x07 | INSTR_MEM0..=0x31 => 0,
            RXF0..=0x0B => {
                let sm_num = reg - RXF0;
                pio.sm_mut(sm_num).fifo_mut().rx_pop().unwrap_or(0)
            }
            IRQ => pio.irq().read_irq(),
            IRQ_FORCE => 0,
            INPUT_SYNC_BYPASS => pio.gpio().input_sync_bypass(),
            DBG_PADOUT => pio.gpio().pins_value(),
            DBG_PADOE => pio.gpio().pin_dirs_value(),
            DBG_CFGINFO => Pio::cfginfo(),
            SM0_CLKDIV..=0x49 => {
                let sm_num = (reg - SM0_CLKDIV) / SM_REGS;
                let sm = pio.sm(sm_num);
                match (reg - SM0_CLKDIV) % SM_REGS {
                    0 => sm.clkdiv(),
                    1 => sm.execctrl(),
                    2 => sm.shiftctrl(),
                    3 => sm.pc(),
                    4 => u32::from(sm.exec_word()),
                    _ => sm.pinctrl(),
                }
            }
            INTR => pio.intr(),
            IRQ0_INTE => pio.irq().inte(0),
            IRQ0_INTF => pio.irq().intf(0),
            IRQ0_INTS => {
                let intr = pio.intr();
                pio.irq().ints(0, intr)
            }
            IRQ1_INTE => pio.irq().inte(1),
            IRQ1_INTF => pio.irq().intf(1),
            IRQ1_INTS => {
                let intr = pio.intr();
                pio.irq().ints(1, intr)
            }
            _ => 0,
        })
    }

    fn write_register(&mut self, reg: usize, value: u32, mask: u32, xor: bool) {
        self.with_pio(|pio| match reg {
            CTRL => pio.write_ctrl(value, mask),
            FDEBUG => pio.write_fdebug(value, mask),
            TXF0..=0x07 => {
                let sm_num = reg - TXF0;
                pio.sm_mut(sm_num).fifo_mut().tx_push(value & mask);
            }
            IRQ => pio.irq_mut().write_irq(value & mask),
            IRQ_FORCE => pio.irq_mut().write_irq_force(value & mask),
            INPUT_SYNC_BYPASS => pio.gpio_mut().set_input_sync_bypass(value, mask, xor),
            INSTR_MEM0..=0x31 => pio.memory_mut().write_word(reg - INSTR_MEM0, value, mask, xor),
            SM0_CLKDIV..=0x49 => {
                let sm_num = (reg - SM0_CLKDIV) / SM_REGS;
                let sm = pio.sm_mut(sm_num);
                match (reg - SM0_CLKDIV) % SM_REGS {
                    0 => sm.set_clkdiv(value, mask, xor),
                    1 => sm.set_execctrl(value, mask, xor),
                    2 => sm.set_shiftctrl(value, mask, xor),
                    3 => {} // ADDR is read-only
                    4 => sm.force_instruction((value & mask) as u16),
                    _ => sm.set_pinctrl(value, mask, xor),
                }
            }
            IRQ0_INTE => pio.irq_mut().set_inte(0, value, mask, xor),
            IRQ0_INTF => pio.irq_mut().set_intf(0, value, mask, xor),
            IRQ1_INTE => pio.irq_mut().set_inte(1, value, mask, xor),
            IRQ1_INTF => pio.irq_mut().set_intf(1, value, mask, xor),
            // FSTAT, FLEVEL, RXFx, DBG_*, ADDR, INTR, INTS are read-only
            _ => {}
        })
    }
}
