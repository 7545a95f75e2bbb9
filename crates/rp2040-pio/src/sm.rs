//! One PIO state machine.
//!
//! Ties the shift registers, scratch registers, FIFO pair and instruction
//! executor together with the per-machine control registers (CLKDIV,
//! EXECCTRL, SHIFTCTRL, PINCTRL). The machine advances on master ticks for
//! which its fractional clock divider fires; each advance runs the per-cycle
//! algorithm: delay countdown, instruction selection (forced word or fetch),
//! decode, side-set staging, execute with stall semantics.

use crate::fifo::{Fifo, FifoJoin};
use crate::gpio::{GpioFabric, MaskedValue, PinCommand};
use crate::instruction::{
    irq_number, InSource, Instruction, JmpCondition, MovDestination, MovOperation, MovSource,
    OutDestination, SetDestination, SideSet, WaitSource,
};
use crate::irq::IrqUnit;
use crate::memory::InstructionMemory;
use crate::shifter::{InputShiftRegister, OutputShiftRegister};

const CLKDIV_RESET: u32 = 0x0001_0000;
const EXECCTRL_RESET: u32 = 0x0001_F000;
const SHIFTCTRL_RESET: u32 = 0x000C_0000;
const PINCTRL_RESET: u32 = 0x1400_0000;

/// Result of executing one instruction.
enum Exec {
    Done { pc_set: bool, arm_delay: bool },
    Stalled,
}

impl Exec {
    const COMPLETE: Self = Self::Done {
        pc_set: false,
        arm_delay: true,
    };
}

/// Execution context of one state machine.
#[derive(Debug, Clone)]
pub struct StateMachine {
    sm_num: u32,
    pc: u32,
    x: u32,
    y: u32,
    isr: InputShiftRegister,
    osr: OutputShiftRegister,
    fifo: Fifo,

    clkdiv: u32,
    execctrl: u32,
    shiftctrl: u32,
    pinctrl: u32,

    clkdiv_acc: u32,
    delay_remaining: u32,
    stalled: bool,
    exec_word: u16,
    forced_instr: Option<u16>,
    decode_fault: Option<u16>,
    // Autopush met a full RX FIFO: the shift already happened, only the
    // push is retried.
    pending_push: bool,
    // IRQ-wait flag already set, waiting for another agent to clear it.
    irq_wait: Option<u32>,
    pending_delay: u8,
    held_side: Option<u8>,
    pin_command: PinCommand,
}

impl StateMachine {
    #[must_use]
    pub fn new(sm_num: u32) -> Self {
        Self {
            sm_num,
            pc: 0,
            x: 0,
            y: 0,
            isr: InputShiftRegister::default(),
            osr: OutputShiftRegister::default(),
            fifo: Fifo::new(),
            clkdiv: CLKDIV_RESET,
            execctrl: EXECCTRL_RESET,
            shiftctrl: SHIFTCTRL_RESET,
            pinctrl: PINCTRL_RESET,
            clkdiv_acc: 0,
            delay_remaining: 0,
            stalled: false,
            exec_word: 0,
            forced_instr: None,
            decode_fault: None,
            pending_push: false,
            irq_wait: None,
            pending_delay: 0,
            held_side: None,
            pin_command: PinCommand::default(),
        }
    }

    // --- control register views -------------------------------------------

    #[must_use]
    pub fn clkdiv(&self) -> u32 {
        self.clkdiv
    }

    pub fn set_clkdiv(&mut self, value: u32, mask: u32, xor: bool) {
        self.clkdiv = emu_core::write_masked(self.clkdiv, value, mask, xor) & 0xFFFF_FF00;
    }

    /// EXECCTRL with the live stall flag in bit 31.
    #[must_use]
    pub fn execctrl(&self) -> u32 {
        let base = self.execctrl & 0x7FFF_FFFF;
        if self.stalled {
            base | 0x8000_0000
        } else {
            base
        }
    }

    pub fn set_execctrl(&mut self, value: u32, mask: u32, xor: bool) {
        // bit 31 is the read-only EXEC_STALLED flag
        let writable = mask & 0x7FFF_FFFF;
        self.execctrl = emu_core::write_masked(self.execctrl, value, writable, xor);
    }

    #[must_use]
    pub fn shiftctrl(&self) -> u32 {
        self.shiftctrl
    }

    pub fn set_shiftctrl(&mut self, value: u32, mask: u32, xor: bool) {
        self.shiftctrl = emu_core::write_masked(self.shiftctrl, value, mask, xor);
        self.fifo.set_join(match (self.shiftctrl >> 30) & 0x3 {
            0b10 => FifoJoin::Tx,
            0b00 => FifoJoin::None,
            // FJOIN_RX wins if both bits are set
            _ => FifoJoin::Rx,
        });
    }

    #[must_use]
    pub fn pinctrl(&self) -> u32 {
        self.pinctrl
    }

    pub fn set_pinctrl(&mut self, value: u32, mask: u32, xor: bool) {
        self.pinctrl = emu_core::write_masked(self.pinctrl, value, mask, xor);
    }

    fn wrap_top(&self) -> u32 {
        self.execctrl >> 12 & 0x1F
    }

    fn wrap_bottom(&self) -> u32 {
        self.execctrl >> 7 & 0x1F
    }

    fn jmp_pin(&self) -> u32 {
        self.execctrl >> 24 & 0x1F
    }

    fn status_value(&self) -> u32 {
        let level = if self.execctrl & 0x10 != 0 {
            self.fifo.rx_level()
        } else {
            self.fifo.tx_level()
        };
        if (level as u32) < (self.execctrl & 0xF) {
            0xFFFF_FFFF
        } else {
            0
        }
    }

    fn autopush(&self) -> bool {
        self.shiftctrl & 1 << 16 != 0
    }

    fn autopull(&self) -> bool {
        self.shiftctrl & 1 << 17 != 0
    }

    fn in_shift_right(&self) -> bool {
        self.shiftctrl & 1 << 18 != 0
    }

    fn out_shift_right(&self) -> bool {
        self.shiftctrl & 1 << 19 != 0
    }

    fn push_thresh(&self) -> u32 {
        match self.shiftctrl >> 20 & 0x1F {
            0 => 32,
            n => n,
        }
    }

    fn pull_thresh(&self) -> u32 {
        match self.shiftctrl >> 25 & 0x1F {
            0 => 32,
            n => n,
        }
    }

    fn out_base(&self) -> u32 {
        self.pinctrl & 0x1F
    }

    fn set_base(&self) -> u32 {
        self.pinctrl >> 5 & 0x1F
    }

    fn side_base(&self) -> u32 {
        self.pinctrl >> 10 & 0x1F
    }

    fn in_base(&self) -> u32 {
        self.pinctrl >> 15 & 0x1F
    }

    fn out_count(&self) -> u32 {
        self.pinctrl >> 20 & 0x3F
    }

    fn set_count(&self) -> u32 {
        self.pinctrl >> 26 & 0x7
    }

    /// Side-set slot partition from PINCTRL.SIDESET_COUNT and the EXECCTRL
    /// enable/pindir flags.
    #[must_use]
    pub fn side_set_config(&self) -> SideSet {
        SideSet::new(
            self.pinctrl >> 29 & 0x7,
            self.execctrl & 1 << 30 != 0,
            self.execctrl & 1 << 29 != 0,
        )
    }

    fn side_pindir(&self) -> bool {
        self.execctrl & 1 << 29 != 0
    }

    // --- state accessors ---------------------------------------------------

    #[must_use]
    pub fn sm_num(&self) -> u32 {
        self.sm_num
    }

    #[must_use]
    pub fn pc(&self) -> u32 {
        self.pc
    }

    #[must_use]
    pub fn x(&self) -> u32 {
        self.x
    }

    #[must_use]
    pub fn y(&self) -> u32 {
        self.y
    }

    #[must_use]
    pub fn isr_value(&self) -> u32 {
        self.isr.value()
    }

    #[must_use]
    pub fn isr_count(&self) -> u32 {
        self.isr.count()
    }

    #[must_use]
    pub fn osr_value(&self) -> u32 {
        self.osr.value()
    }

    #[must_use]
    pub fn osr_count(&self) -> u32 {
        self.osr.count()
    }

    #[must_use]
    pub fn delay_remaining(&self) -> u32 {
        self.delay_remaining
    }

    #[must_use]
    pub fn is_stalled(&self) -> bool {
        self.stalled
    }

    /// The word a decode fault latched, if the machine is fatally parked.
    #[must_use]
    pub fn decode_fault(&self) -> Option<u16> {
        self.decode_fault
    }

    #[must_use]
    pub fn fifo(&self) -> &Fifo {
        &self.fifo
    }

    pub fn fifo_mut(&mut self) -> &mut Fifo {
        &mut self.fifo
    }

    /// SMx_INSTR write: latch a word to execute in place of the next fetch.
    pub fn force_instruction(&mut self, word: u16) {
        self.forced_instr = Some(word);
    }

    /// SMx_INSTR read: the pending forced word, else the instruction
    /// currently latched in the execution slot.
    #[must_use]
    pub fn exec_word(&self) -> u16 {
        self.forced_instr.unwrap_or(self.exec_word)
    }

    /// CTRL.SM_RESTART strobe.
    pub fn restart(&mut self) {
        self.isr.clear();
        self.osr.drain();
        self.delay_remaining = 0;
        self.stalled = false;
        self.forced_instr = None;
        self.decode_fault = None;
        self.pending_push = false;
        self.irq_wait = None;
        self.held_side = None;
        self.pin_command = PinCommand::default();
    }

    /// CTRL.CLKDIV_RESTART strobe.
    pub fn restart_clkdiv(&mut self) {
        self.clkdiv_acc = 0;
    }

    /// Pin writes staged during this cycle, consumed by the block at the
    /// phase-1 commit.
    pub fn take_pin_command(&mut self) -> PinCommand {
        std::mem::take(&mut self.pin_command)
    }

    // --- execution ---------------------------------------------------------

    fn clkdiv_divider(&self) -> u32 {
        let int = self.clkdiv >> 16;
        let frac = self.clkdiv >> 8 & 0xFF;
        if int == 0 {
            65_536 * 256
        } else {
            (int << 8) | frac
        }
    }

    /// Advance one master tick: run an SM cycle when the divider fires.
    pub fn tick(&mut self, memory: &InstructionMemory, gpio: &GpioFabric, irq: &mut IrqUnit) {
        self.clkdiv_acc += 256;
        let divider = self.clkdiv_divider();
        if self.clkdiv_acc >= divider {
            self.clkdiv_acc -= divider;
            self.sm_cycle(memory, gpio, irq);
        }
    }

    fn wrap_next(&self, pc: u32) -> u32 {
        if pc == self.wrap_top() {
            self.wrap_bottom()
        } else {
            (pc + 1) & 0x1F
        }
    }

    fn stage_side(&mut self, side: Option<u8>) {
        let Some(value) = side else { return };
        let bits = self.side_set_config().data_bits();
        let mv = MaskedValue::spanning(self.side_base(), bits, u32::from(value));
        if self.side_pindir() {
            self.pin_command.side_dirs = mv;
        } else {
            self.pin_command.side_levels = mv;
        }
    }

    /// Complete a deferred instruction: advance PC, arm its delay.
    fn finish_deferred(&mut self) {
        self.stalled = false;
        self.pc = self.wrap_next(self.pc);
        self.delay_remaining = u32::from(self.pending_delay);
    }

    fn sm_cycle(&mut self, memory: &InstructionMemory, gpio: &GpioFabric, irq: &mut IrqUnit) {
        // A decode fault parks the machine until restart.
        if self.decode_fault.is_some() {
            return;
        }

        if self.delay_remaining > 0 && !self.stalled {
            self.delay_remaining -= 1;
            self.stage_side(self.held_side);
            return;
        }

        if self.pending_push {
            self.stage_side(self.held_side);
            if self.fifo.rx_push(self.isr.value()) {
                self.isr.clear();
                self.pending_push = false;
                self.finish_deferred();
            }
            return;
        }

        if let Some(flag) = self.irq_wait {
            self.stage_side(self.held_side);
            if !irq.get(flag) {
                self.irq_wait = None;
                self.finish_deferred();
            }
            return;
        }

        let word = if let Some(forced) = self.forced_instr.take() {
            // a forced word replaces whatever was stalled
            self.stalled = false;
            forced
        } else if self.stalled {
            self.exec_word
        } else {
            memory.fetch(self.pc)
        };
        self.exec_word = word;

        let inst = match Instruction::decode(word) {
            Ok(inst) => inst,
            Err(_) => {
                self.decode_fault = Some(word);
                self.stalled = true;
                return;
            }
        };
        let (delay, side) = self.side_set_config().split(word);
        self.pending_delay = delay;
        self.held_side = side;
        self.stage_side(side);

        match self.execute(&inst, gpio, irq) {
            Exec::Stalled => self.stalled = true,
            Exec::Done { pc_set, arm_delay } => {
                self.stalled = false;
                if !pc_set {
                    self.pc = self.wrap_next(self.pc);
                }
                if arm_delay {
                    self.delay_remaining = u32::from(delay);
                }
            }
        }
    }

    fn execute(&mut self, inst: &Instruction, gpio: &GpioFabric, irq: &mut IrqUnit) -> Exec {
        match *inst {
            Instruction::Jmp { condition, address } => {
                let take = match condition {
                    JmpCondition::Always => true,
                    JmpCondition::XZero => self.x == 0,
                    JmpCondition::XNonZeroDec => {
                        let take = self.x != 0;
                        self.x = self.x.wrapping_sub(1);
                        take
                    }
                    JmpCondition::YZero => self.y == 0,
                    JmpCondition::YNonZeroDec => {
                        let take = self.y != 0;
                        self.y = self.y.wrapping_sub(1);
                        take
                    }
                    JmpCondition::XNotEqualY => self.x != self.y,
                    JmpCondition::Pin => gpio.read_input(self.jmp_pin()).is_high(),
                    JmpCondition::OsrNotEmpty => self.osr.count() < self.pull_thresh(),
                };
                if take {
                    self.pc = u32::from(address);
                }
                Exec::Done {
                    pc_set: take,
                    arm_delay: true,
                }
            }

            Instruction::Wait {
                polarity,
                source,
                index,
            } => {
                let observed = match source {
                    WaitSource::Gpio => gpio.read_input(u32::from(index)).is_high(),
                    WaitSource::Pin => gpio
                        .read_input((self.in_base() + u32::from(index)) & 0x1F)
                        .is_high(),
                    WaitSource::Irq => {
                        let flag = irq_number(self.sm_num, index);
                        let set = irq.get(flag);
                        if polarity && set {
                            // the releasing wait consumes the flag
                            irq.clear(flag);
                        }
                        set
                    }
                };
                if observed == polarity {
                    Exec::COMPLETE
                } else {
                    Exec::Stalled
                }
            }

            Instruction::In { source, bit_count } => {
                let data = match source {
                    InSource::Pins => gpio.read_inputs(self.in_base()),
                    InSource::X => self.x,
                    InSource::Y => self.y,
                    InSource::Null => 0,
                    InSource::Isr => self.isr.value(),
                    InSource::Osr => self.osr.value(),
                };
                if self.in_shift_right() {
                    self.isr.shift_in_right(bit_count, data);
                } else {
                    self.isr.shift_in_left(bit_count, data);
                }
                if self.autopush() && self.isr.count() >= self.push_thresh() {
                    if self.fifo.rx_push(self.isr.value()) {
                        self.isr.clear();
                    } else {
                        self.pending_push = true;
                        return Exec::Stalled;
                    }
                }
                Exec::COMPLETE
            }

            Instruction::Out {
                destination,
                bit_count,
            } => {
                if self.autopull() && self.osr.count() >= self.pull_thresh() {
                    match self.fifo.tx_pop() {
                        Some(word) => self.osr.refill(word),
                        None => {
                            self.fifo.latch_tx_stall();
                            return Exec::Stalled;
                        }
                    }
                }
                let value = if self.out_shift_right() {
                    self.osr.shift_out_right(bit_count)
                } else {
                    self.osr.shift_out_left(bit_count)
                };
                let outcome = match destination {
                    OutDestination::Pins => {
                        self.pin_command.out_levels =
                            MaskedValue::spanning(self.out_base(), self.out_count(), value);
                        Exec::COMPLETE
                    }
                    OutDestination::X => {
                        self.x = value;
                        Exec::COMPLETE
                    }
                    OutDestination::Y => {
                        self.y = value;
                        Exec::COMPLETE
                    }
                    OutDestination::Null => Exec::COMPLETE,
                    OutDestination::PinDirs => {
                        self.pin_command.out_dirs =
                            MaskedValue::spanning(self.out_base(), self.out_count(), value);
                        Exec::COMPLETE
                    }
                    OutDestination::Pc => {
                        self.pc = value & 0x1F;
                        Exec::Done {
                            pc_set: true,
                            arm_delay: true,
                        }
                    }
                    OutDestination::Isr => {
                        self.isr.set_value_with_count(value, bit_count);
                        Exec::COMPLETE
                    }
                    OutDestination::Exec => {
                        self.forced_instr = Some(value as u16);
                        Exec::Done {
                            pc_set: false,
                            arm_delay: false,
                        }
                    }
                };
                // Background refill once the OSR runs dry; never stalls.
                if self.autopull() && self.osr.count() >= self.pull_thresh() {
                    if let Some(word) = self.fifo.tx_pop() {
                        self.osr.refill(word);
                    }
                }
                outcome
            }

            Instruction::Push { if_full, block } => {
                if if_full && self.isr.count() < self.push_thresh() {
                    return Exec::COMPLETE;
                }
                if self.fifo.rx_push(self.isr.value()) {
                    self.isr.clear();
                    Exec::COMPLETE
                } else if block {
                    Exec::Stalled
                } else {
                    // nonblocking push to a full FIFO drops the word
                    self.isr.clear();
                    Exec::COMPLETE
                }
            }

            Instruction::Pull { if_empty, block } => {
                if if_empty && self.osr.count() < self.pull_thresh() {
                    return Exec::COMPLETE;
                }
                match self.fifo.tx_pop() {
                    Some(word) => {
                        self.osr.refill(word);
                        Exec::COMPLETE
                    }
                    None if block => {
                        self.fifo.latch_tx_stall();
                        Exec::Stalled
                    }
                    None => {
                        // nonblocking pull of an empty FIFO loads scratch X
                        self.osr.refill(self.x);
                        Exec::COMPLETE
                    }
                }
            }

            Instruction::Mov {
                destination,
                operation,
                source,
            } => {
                let raw = match source {
                    MovSource::Pins => gpio.read_inputs(self.in_base()),
                    MovSource::X => self.x,
                    MovSource::Y => self.y,
                    MovSource::Null => 0,
                    MovSource::Status => self.status_value(),
                    MovSource::Isr => self.isr.value(),
                    MovSource::Osr => self.osr.value(),
                };
                let value = match operation {
                    MovOperation::None => raw,
                    MovOperation::Invert => !raw,
                    MovOperation::Reverse => raw.reverse_bits(),
                };
                match destination {
                    MovDestination::Pins => {
                        self.pin_command.out_levels =
                            MaskedValue::spanning(self.out_base(), self.out_count(), value);
                        Exec::COMPLETE
                    }
                    MovDestination::X => {
                        self.x = value;
                        Exec::COMPLETE
                    }
                    MovDestination::Y => {
                        self.y = value;
                        Exec::COMPLETE
                    }
                    MovDestination::Exec => {
                        self.forced_instr = Some(value as u16);
                        Exec::Done {
                            pc_set: false,
                            arm_delay: false,
                        }
                    }
                    MovDestination::Pc => {
                        self.pc = value & 0x1F;
                        Exec::Done {
                            pc_set: true,
                            arm_delay: true,
                        }
                    }
                    MovDestination::Isr => {
                        self.isr.set_value(value);
                        Exec::COMPLETE
                    }
                    MovDestination::Osr => {
                        self.osr.set_value(value);
                        Exec::COMPLETE
                    }
                }
            }

            Instruction::Irq { clear, wait, index } => {
                let flag = irq_number(self.sm_num, index);
                if clear {
                    irq.clear(flag);
                    Exec::COMPLETE
                } else {
                    irq.set(flag);
                    if wait {
                        self.irq_wait = Some(flag);
                        Exec::Stalled
                    } else {
                        Exec::COMPLETE
                    }
                }
            }

            Instruction::Set { destination, data } => {
                let data = u32::from(data);
                match destination {
                    SetDestination::Pins => {
                        self.pin_command.set_levels =
                            MaskedValue::spanning(self.set_base(), self.set_count(), data);
                    }
                    SetDestination::X => self.x = data,
                    SetDestination::Y => self.y = data,
                    SetDestination::PinDirs => {
                        self.pin_command.set_dirs =
                            MaskedValue::spanning(self.set_base(), self.set_count(), data);
                    }
                }
                Exec::COMPLETE
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> (StateMachine, InstructionMemory, GpioFabric, IrqUnit) {
        (
            StateMachine::new(0),
            InstructionMemory::new(),
            GpioFabric::new(),
            IrqUnit::new(),
        )
    }

    fn run_cycles(
        sm: &mut StateMachine,
        memory: &InstructionMemory,
        gpio: &mut GpioFabric,
        irq: &mut IrqUnit,
        n: usize,
    ) {
        for _ in 0..n {
            gpio.sample_inputs();
            sm.tick(memory, gpio, irq);
            let cmd = sm.take_pin_command();
            gpio.commit(&cmd);
        }
    }

    #[test]
    fn divider_gates_sm_cycles() {
        let (mut sm, mut memory, gpio, mut irq) = fixture();
        memory.load(0, &[0xE021]); // set x, 1
        // int = 3: one SM cycle every three master ticks
        sm.set_clkdiv(3 << 16, 0xFFFF_FFFF, false);
        sm.tick(&memory, &gpio, &mut irq);
        sm.tick(&memory, &gpio, &mut irq);
        assert_eq!(sm.x(), 0);
        sm.tick(&memory, &gpio, &mut irq);
        assert_eq!(sm.x(), 1);
    }

    #[test]
    fn delay_counts_down_after_completion() {
        let (mut sm, mut memory, mut gpio, mut irq) = fixture();
        // set x, 5 [2]; set y, 1
        memory.load(0, &[0xE225, 0xE041]);
        run_cycles(&mut sm, &memory, &mut gpio, &mut irq, 1);
        assert_eq!(sm.x(), 5);
        assert_eq!(sm.delay_remaining(), 2);
        run_cycles(&mut sm, &memory, &mut gpio, &mut irq, 2);
        assert_eq!(sm.y(), 0, "delay cycles must not execute instructions");
        run_cycles(&mut sm, &memory, &mut gpio, &mut irq, 1);
        assert_eq!(sm.y(), 1);
    }

    #[test]
    fn jmp_decrement_applies_even_when_not_taken() {
        let (mut sm, mut memory, mut gpio, mut irq) = fixture();
        // set y, 3; jmp y--, 1
        memory.load(0, &[0xE043, 0x0081]);
        run_cycles(&mut sm, &memory, &mut gpio, &mut irq, 1);
        assert_eq!(sm.y(), 3);
        // y: 3 -> 2 -> 1 -> 0, branch taken each time
        for expected in [2u32, 1, 0] {
            run_cycles(&mut sm, &memory, &mut gpio, &mut irq, 1);
            assert_eq!(sm.y(), expected);
            assert_eq!(sm.pc(), 1);
        }
        // y == 0: branch not taken, decrement still wraps
        run_cycles(&mut sm, &memory, &mut gpio, &mut irq, 1);
        assert_eq!(sm.y(), 0xFFFF_FFFF);
        assert_eq!(sm.pc(), 2);
    }

    #[test]
    fn blocking_pull_stalls_until_data_arrives() {
        let (mut sm, mut memory, mut gpio, mut irq) = fixture();
        memory.load(0, &[0x80A0]); // pull block
        run_cycles(&mut sm, &memory, &mut gpio, &mut irq, 3);
        assert!(sm.is_stalled());
        assert!(sm.fifo().tx_stall());
        assert_eq!(sm.pc(), 0);

        sm.fifo_mut().tx_push(0xDEAD_BEEF);
        run_cycles(&mut sm, &memory, &mut gpio, &mut irq, 1);
        assert!(!sm.is_stalled());
        assert_eq!(sm.osr_value(), 0xDEAD_BEEF);
        assert_eq!(sm.osr_count(), 0);
        assert_eq!(sm.pc(), 1);
    }

    #[test]
    fn nonblocking_pull_of_empty_fifo_loads_x() {
        let (mut sm, mut memory, mut gpio, mut irq) = fixture();
        memory.load(0, &[0xE03F, 0x8080]); // set x, 31; pull noblock
        run_cycles(&mut sm, &memory, &mut gpio, &mut irq, 2);
        assert_eq!(sm.osr_value(), 31);
        assert!(!sm.is_stalled());
    }

    #[test]
    fn autopush_defers_on_full_rx_without_double_shifting() {
        let (mut sm, mut memory, mut gpio, mut irq) = fixture();
        memory.load(0, &[0x4008]); // in pins, 8
        // autopush, push threshold 8, shift left
        sm.set_shiftctrl((1 << 16) | (8 << 20), 0xFFFF_FFFF, false);
        gpio.set_pins_value(0xA5);
        // let the level propagate through the input synchronizer
        gpio.sample_inputs();
        gpio.sample_inputs();
        // fill RX
        for i in 0..4 {
            assert!(sm.fifo_mut().rx_push(i));
        }
        run_cycles(&mut sm, &memory, &mut gpio, &mut irq, 3);
        assert!(sm.is_stalled());
        assert!(sm.fifo().rx_stall());
        assert_eq!(sm.isr_value(), 0xA5, "stall must not re-shift");
        assert_eq!(sm.pc(), 0);

        sm.fifo_mut().rx_pop();
        run_cycles(&mut sm, &memory, &mut gpio, &mut irq, 1);
        assert!(!sm.is_stalled());
        assert_eq!(sm.isr_count(), 0);
        assert_eq!(sm.fifo().rx_level(), 4);
        assert_eq!(sm.pc(), 1);
    }

    #[test]
    fn out_exec_injects_the_next_instruction() {
        let (mut sm, mut memory, mut gpio, mut irq) = fixture();
        // pull block; out exec, 16 -- TX carries "set x, 21"
        memory.load(0, &[0x80A0, 0x60F0]);
        sm.fifo_mut().tx_push(0xE035);
        run_cycles(&mut sm, &memory, &mut gpio, &mut irq, 3);
        assert_eq!(sm.x(), 21);
        // the injected word executed in place of memory[2]
        assert_eq!(sm.pc(), 3);
    }

    #[test]
    fn irq_wait_stalls_until_cleared_by_another_agent() {
        let (mut sm, mut memory, mut gpio, mut irq) = fixture();
        memory.load(0, &[0xC020]); // irq wait 0
        run_cycles(&mut sm, &memory, &mut gpio, &mut irq, 2);
        assert!(sm.is_stalled());
        assert!(irq.get(0), "flag is set exactly once while waiting");
        irq.clear(0);
        run_cycles(&mut sm, &memory, &mut gpio, &mut irq, 1);
        assert!(!sm.is_stalled());
        assert_eq!(sm.pc(), 1);
    }

    #[test]
    fn wait_irq_high_consumes_the_flag() {
        let (mut sm, mut memory, mut gpio, mut irq) = fixture();
        memory.load(0, &[0x20C3]); // wait 1 irq 3
        run_cycles(&mut sm, &memory, &mut gpio, &mut irq, 1);
        assert!(sm.is_stalled());
        irq.set(3);
        run_cycles(&mut sm, &memory, &mut gpio, &mut irq, 1);
        assert!(!sm.is_stalled());
        assert!(!irq.get(3));
    }

    #[test]
    fn mov_status_reflects_the_selected_fifo_level() {
        let (mut sm, mut memory, mut gpio, mut irq) = fixture();
        memory.load(0, &[0xA025, 0xA025]); // mov x, status
        // STATUS_N = 2, TX level selected
        sm.set_execctrl(2, 0x1F, false);
        run_cycles(&mut sm, &memory, &mut gpio, &mut irq, 1);
        assert_eq!(sm.x(), 0xFFFF_FFFF);
        sm.fifo_mut().tx_push(1);
        sm.fifo_mut().tx_push(2);
        run_cycles(&mut sm, &memory, &mut gpio, &mut irq, 1);
        assert_eq!(sm.x(), 0);
    }

    #[test]
    fn decode_fault_parks_the_machine_until_restart(){
        let (mut sm, mut memory, mut gpio, mut irq) = fixture();
        memory.load(0, &[0xA0E4]); // mov osr, <reserved src 100>
        run_cycles(&mut sm, &memory, &mut gpio, &mut irq, 3);
        assert!(sm.is_stalled());
        assert!(sm.decode_fault().is_some());
        assert_eq!(sm.pc(), 0);

        sm.restart();
        assert!(sm.decode_fault().is_none());
        assert!(!sm.is_stalled());
    }

    #[test]
    fn wrap_returns_to_wrap_bottom() {
        let (mut sm, mut memory, mut gpio, mut irq) = fixture();
        memory.load(0, &[0xA042, 0xA042, 0xA042, 0xA042]); // nop (mov y, y)
        // wrap_bottom = 1, wrap_top = 2
        sm.set_execctrl((2 << 12) | (1 << 7), 0x0001_FF80, false);
        run_cycles(&mut sm, &memory, &mut gpio, &mut irq, 1);
        assert_eq!(sm.pc(), 1);
        run_cycles(&mut sm, &memory, &mut gpio, &mut irq, 1);
        assert_eq!(sm.pc(), 2);
        run_cycles(&mut sm, &memory, &mut gpio, &mut irq, 1);
        assert_eq!(sm.pc(), 1);
    }
}
