//! The PIO block: four state machines, shared memory, IRQ unit and GPIO.
//!
//! Per cycle: phase 0 advances the input synchronizers and steps the
//! enabled machines in index order (every machine sees the pin state
//! committed at the previous phase 1); phase 1 commits the staged pin
//! writes under driver arbitration, higher-numbered machines overriding
//! lower on conflicting pins.

use emu_core::Tickable;

use crate::constants::{FIFO_DEPTH, MEMORY_SIZE, SM_COUNT};
use crate::gpio::GpioFabric;
use crate::irq::IrqUnit;
use crate::memory::InstructionMemory;
use crate::sm::StateMachine;

/// One PIO block.
#[derive(Debug, Clone)]
pub struct Pio {
    index: usize,
    memory: InstructionMemory,
    sms: [StateMachine; SM_COUNT],
    irq: IrqUnit,
    gpio: GpioFabric,
    sm_enabled: u32,
}

impl Pio {
    #[must_use]
    pub fn new(index: usize) -> Self {
        Self {
            index,
            memory: InstructionMemory::new(),
            sms: [
                StateMachine::new(0),
                StateMachine::new(1),
                StateMachine::new(2),
                StateMachine::new(3),
            ],
            irq: IrqUnit::new(),
            gpio: GpioFabric::new(),
            sm_enabled: 0,
        }
    }

    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    #[must_use]
    pub fn sm(&self, sm_num: usize) -> &StateMachine {
        &self.sms[sm_num]
    }

    pub fn sm_mut(&mut self, sm_num: usize) -> &mut StateMachine {
        &mut self.sms[sm_num]
    }

    #[must_use]
    pub fn memory(&self) -> &InstructionMemory {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut InstructionMemory {
        &mut self.memory
    }

    #[must_use]
    pub fn irq(&self) -> &IrqUnit {
        &self.irq
    }

    pub fn irq_mut(&mut self) -> &mut IrqUnit {
        &mut self.irq
    }

    #[must_use]
    pub fn gpio(&self) -> &GpioFabric {
        &self.gpio
    }

    pub fn gpio_mut(&mut self) -> &mut GpioFabric {
        &mut self.gpio
    }

    /// CTRL read: the enable mask (the restart strobes read back as 0).
    #[must_use]
    pub fn sm_enabled(&self) -> u32 {
        self.sm_enabled
    }

    /// CTRL write: bits 3:0 enable, 7:4 machine restart strobes,
    /// 11:8 clock divider restart strobes.
    pub fn write_ctrl(&mut self, value: u32, mask: u32) {
        let value = value & mask;
        self.sm_enabled = (self.sm_enabled & !(mask & 0xF)) | (value & 0xF);
        for sm_num in 0..SM_COUNT {
            if value >> (4 + sm_num) & 1 != 0 {
                self.sms[sm_num].restart();
            }
            if value >> (8 + sm_num) & 1 != 0 {
                self.sms[sm_num].restart_clkdiv();
            }
        }
    }

    #[must_use]
    pub fn is_sm_enabled(&self, sm_num: usize) -> bool {
        self.sm_enabled >> sm_num & 1 != 0
    }

    // --- register assembly helpers ----------------------------------------

    /// FSTAT: TXEMPTY 27:24, TXFULL 19:16, RXEMPTY 11:8, RXFULL 3:0.
    #[must_use]
    pub fn fstat(&self) -> u32 {
        let mut value = 0;
        for (sm_num, sm) in self.sms.iter().enumerate() {
            let fifo = sm.fifo();
            if fifo.tx_is_empty() {
                value |= 1 << (24 + sm_num);
            }
            if fifo.tx_is_full() {
                value |= 1 << (16 + sm_num);
            }
            if fifo.rx_is_empty() {
                value |= 1 << (8 + sm_num);
            }
            if fifo.rx_is_full() {
                value |= 1 << sm_num;
            }
        }
        value
    }

    /// FDEBUG: TXSTALL 27:24, TXOVER 19:16, RXUNDER 11:8, RXSTALL 3:0.
    #[must_use]
    pub fn fdebug(&self) -> u32 {
        let mut value = 0;
        for (sm_num, sm) in self.sms.iter().enumerate() {
            let fifo = sm.fifo();
            if fifo.tx_stall() {
                value |= 1 << (24 + sm_num);
            }
            if fifo.tx_over() {
                value |= 1 << (16 + sm_num);
            }
            if fifo.rx_under() {
                value |= 1 << (8 + sm_num);
            }
            if fifo.rx_stall() {
                value |= 1 << sm_num;
            }
        }
        value
    }

    /// FDEBUG write-one-to-clear.
    pub fn write_fdebug(&mut self, value: u32, mask: u32) {
        let value = value & mask;
        for (sm_num, sm) in self.sms.iter_mut().enumerate() {
            let fifo = sm.fifo_mut();
            if value >> (24 + sm_num) & 1 != 0 {
                fifo.clear_tx_stall();
            }
            if value >> (16 + sm_num) & 1 != 0 {
                fifo.clear_tx_over();
            }
            if value >> (8 + sm_num) & 1 != 0 {
                fifo.clear_rx_under();
            }
            if value >> sm_num & 1 != 0 {
                fifo.clear_rx_stall();
            }
        }
    }

    /// FLEVEL: one byte per machine, RX level in the high nibble.
    #[must_use]
    pub fn flevel(&self) -> u32 {
        let mut value = 0;
        for (sm_num, sm) in self.sms.iter().enumerate() {
            let fifo = sm.fifo();
            value |= (fifo.rx_level() as u32 & 0xF) << (8 * sm_num + 4);
            value |= (fifo.tx_level() as u32 & 0xF) << (8 * sm_num);
        }
        value
    }

    /// Raw INTR vector: RXNEMPTY 3:0, TXNFULL 7:4, IRQ flags 0..3 at 11:8.
    #[must_use]
    pub fn intr(&self) -> u32 {
        let mut value = 0;
        for (sm_num, sm) in self.sms.iter().enumerate() {
            let fifo = sm.fifo();
            if !fifo.rx_is_empty() {
                value |= 1 << sm_num;
            }
            if !fifo.tx_is_full() {
                value |= 1 << (4 + sm_num);
            }
        }
        value | ((self.irq.read_irq() & 0xF) << 8)
    }

    /// DBG_CFGINFO: memory size, machine count, FIFO depth.
    #[must_use]
    pub fn cfginfo() -> u32 {
        (MEMORY_SIZE as u32) << 16 | (SM_COUNT as u32) << 8 | FIFO_DEPTH as u32
    }
}

impl Tickable for Pio {
    fn tick_phase0(&mut self) {
        self.gpio.sample_inputs();
        for sm_num in 0..SM_COUNT {
            if self.is_sm_enabled(sm_num) {
                self.sms[sm_num].tick(&self.memory, &self.gpio, &mut self.irq);
            }
        }
    }

    fn tick_phase1(&mut self) {
        for sm_num in 0..SM_COUNT {
            let command = self.sms[sm_num].take_pin_command();
            self.gpio.commit(&command);
        }
    }
}
