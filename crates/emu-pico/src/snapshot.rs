//! JSON state snapshots.
//!
//! Captures the complete observable machine state for debugging sessions,
//! regression fixtures and reproducible bug reports. The format is plain
//! JSON so external tooling can diff and inspect it.

use serde::{Deserialize, Serialize};

use rp2040_pio::constants::{PIO_NUM, SM_COUNT};
use rp2040_pio::{Pio, StateMachine};

use crate::Emulator;

/// State of one state machine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmState {
    pub pc: u32,
    pub x: u32,
    pub y: u32,
    pub isr: u32,
    pub isr_count: u32,
    pub osr: u32,
    pub osr_count: u32,
    pub delay: u32,
    pub stalled: bool,
    pub decode_fault: Option<u16>,
    pub clkdiv: u32,
    pub execctrl: u32,
    pub shiftctrl: u32,
    pub pinctrl: u32,
    pub tx_fifo: Vec<u32>,
    pub rx_fifo: Vec<u32>,
    pub fdebug_tx_stall: bool,
    pub fdebug_tx_over: bool,
    pub fdebug_rx_under: bool,
    pub fdebug_rx_stall: bool,
}

impl SmState {
    fn capture(sm: &StateMachine) -> Self {
        let fifo = sm.fifo();
        Self {
            pc: sm.pc(),
            x: sm.x(),
            y: sm.y(),
            isr: sm.isr_value(),
            isr_count: sm.isr_count(),
            osr: sm.osr_value(),
            osr_count: sm.osr_count(),
            delay: sm.delay_remaining(),
            stalled: sm.is_stalled(),
            decode_fault: sm.decode_fault(),
            clkdiv: sm.clkdiv(),
            execctrl: sm.execctrl(),
            shiftctrl: sm.shiftctrl(),
            pinctrl: sm.pinctrl(),
            tx_fifo: fifo.tx_contents(),
            rx_fifo: fifo.rx_contents(),
            fdebug_tx_stall: fifo.tx_stall(),
            fdebug_tx_over: fifo.tx_over(),
            fdebug_rx_under: fifo.rx_under(),
            fdebug_rx_stall: fifo.rx_stall(),
        }
    }
}

/// State of one PIO block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PioState {
    pub sm_enabled: u32,
    pub instruction_memory: Vec<u16>,
    pub irq_flags: u32,
    pub irq0_inte: u32,
    pub irq0_intf: u32,
    pub irq1_inte: u32,
    pub irq1_intf: u32,
    pub gpio_pins: u32,
    pub gpio_pindirs: u32,
    pub input_sync_bypass: u32,
    pub sms: Vec<SmState>,
}

impl PioState {
    fn capture(pio: &Pio) -> Self {
        Self {
            sm_enabled: pio.sm_enabled(),
            instruction_memory: pio.memory().words().to_vec(),
            irq_flags: pio.irq().read_irq(),
            irq0_inte: pio.irq().inte(0),
            irq0_intf: pio.irq().intf(0),
            irq1_inte: pio.irq().inte(1),
            irq1_intf: pio.irq().intf(1),
            gpio_pins: pio.gpio().pins_value(),
            gpio_pindirs: pio.gpio().pin_dirs_value(),
            input_sync_bypass: pio.gpio().input_sync_bypass(),
            sms: (0..SM_COUNT).map(|i| SmState::capture(pio.sm(i))).collect(),
        }
    }
}

/// Complete machine snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmulatorSnapshot {
    /// Completed master clock cycles at capture time.
    pub ticks: u64,
    pub pios: Vec<PioState>,
}

impl EmulatorSnapshot {
    /// Capture the current machine state.
    #[must_use]
    pub fn capture(emulator: &Emulator) -> Self {
        Self {
            ticks: emulator.clock().ticks().get(),
            pios: (0..PIO_NUM).map(|i| PioState::capture(emulator.pio(i))).collect(),
        }
    }

    /// Serialize to pretty-printed JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Parse a snapshot back from JSON.
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use emu_core::Tickable;

    #[test]
    fn snapshot_round_trips_through_json() {
        let mut emulator = Emulator::new();
        emulator.pio_mut(0).memory_mut().load(0, &[0xE043, 0x0081]);
        emulator.pio_mut(0).write_ctrl(0x1, 0xF);
        emulator.pio_mut(1).sm_mut(2).fifo_mut().tx_push(0xAA55_AA55);
        for _ in 0..3 {
            emulator.tick();
        }

        let snapshot = EmulatorSnapshot::capture(&emulator);
        assert_eq!(snapshot.ticks, 3);
        assert_eq!(snapshot.pios[0].sms[0].y, 1);
        assert_eq!(snapshot.pios[1].sms[2].tx_fifo, vec![0xAA55_AA55]);

        let json = snapshot.to_json().expect("serialize");
        let parsed = EmulatorSnapshot::from_json(&json).expect("parse");
        assert_eq!(parsed.ticks, 3);
        assert_eq!(parsed.pios[0].instruction_memory[0], 0xE043);
        assert_eq!(parsed.pios[0].sms[0].pc, 1);
    }
}
