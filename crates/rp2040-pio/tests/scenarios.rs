//! End-to-end state machine scenarios on one PIO block.

use emu_core::Tickable;
use rp2040_pio::Pio;

/// Run complete cycles, asserting the PC invariant after each commit.
fn run_ticks(pio: &mut Pio, n: usize) {
    for _ in 0..n {
        pio.tick();
        for sm_num in 0..4 {
            assert!(pio.sm(sm_num).pc() < 32);
        }
    }
}

#[test]
fn squarewave_shifts_until_tx_runs_dry() {
    let mut pio = Pio::new(0);
    // pull block; loop: out pins, 1; jmp loop
    pio.memory_mut().load(0, &[0x80A0, 0x6001, 0x0001]);

    let sm = pio.sm_mut(0);
    // shift right, autopull, pull threshold 4
    sm.set_shiftctrl((1 << 19) | (1 << 17) | (4 << 25), 0xFFFF_FFFF, false);
    // out_base 0, out_count 1
    sm.set_pinctrl(1 << 20, 0xFFFF_FFFF, false);
    sm.fifo_mut().tx_push(0x5);

    pio.write_ctrl(0x1, 0xF);

    // t1 pull, then out/jmp pairs: the pin follows 0x5's low bits
    run_ticks(&mut pio, 2);
    assert!(pio.gpio().pin(0).is_high());
    run_ticks(&mut pio, 2);
    assert!(!pio.gpio().pin(0).is_high());
    run_ticks(&mut pio, 2);
    assert!(pio.gpio().pin(0).is_high());

    run_ticks(&mut pio, 6);
    // OSR exhausted its 4-bit threshold and TX is empty: the machine
    // parks on the out with the stall latched.
    assert!(pio.sm(0).is_stalled());
    assert_eq!(pio.fdebug() & 0x0F00_0000, 0x0100_0000);
    assert_eq!(pio.sm(0).pc(), 1);
}

#[test]
fn jmp_decrement_loop_falls_through_at_zero() {
    let mut pio = Pio::new(0);
    // set y, 3; mark: jmp y--, mark; nop; spin: jmp spin
    pio.memory_mut().load(0, &[0xE043, 0x0081, 0xA042, 0x0003]);
    pio.write_ctrl(0x1, 0xF);

    // set + three taken branches: y observed 3, 2, 1 before decrement
    run_ticks(&mut pio, 4);
    assert_eq!(pio.sm(0).pc(), 1);
    assert_eq!(pio.sm(0).y(), 0);

    // y == 0: the branch falls through, the decrement still applies
    run_ticks(&mut pio, 1);
    assert_eq!(pio.sm(0).pc(), 2);
    assert_eq!(pio.sm(0).y(), 0xFFFF_FFFF);

    run_ticks(&mut pio, 3);
    assert_eq!(pio.sm(0).pc(), 3);
}

#[test]
fn cross_machine_irq_handshake() {
    let mut pio = Pio::new(0);
    // SM0 waits for flag 0; SM1 raises it via a forced instruction.
    pio.memory_mut().load(0, &[0x20C0]); // wait 1 irq 0
    pio.sm_mut(1).force_instruction(0xC000); // irq set 0
    pio.write_ctrl(0x3, 0xF);

    // tick 1: SM0 samples the flag before SM1 raises it
    run_ticks(&mut pio, 1);
    assert!(pio.sm(0).is_stalled());
    assert!(pio.irq().get(0));

    // tick 2: the wait releases and consumes the flag
    run_ticks(&mut pio, 1);
    assert!(!pio.sm(0).is_stalled());
    assert!(!pio.irq().get(0));
    assert_eq!(pio.sm(0).pc(), 1);

    run_ticks(&mut pio, 2);
}

#[test]
fn autopush_transfers_a_byte_to_rx() {
    let mut pio = Pio::new(0);
    pio.memory_mut().load(0, &[0x4008, 0x0000]); // in pins, 8; jmp 0
    let sm = pio.sm_mut(0);
    // autopush, push threshold 8, shift left
    sm.set_shiftctrl((1 << 16) | (8 << 20), 0xFFFF_FFFF, false);
    pio.gpio_mut().set_pins_value(0xA5);

    // two idle ticks let the level cross the input synchronizer
    run_ticks(&mut pio, 2);
    pio.write_ctrl(0x1, 0xF);
    run_ticks(&mut pio, 1);

    let sm = pio.sm(0);
    assert_eq!(sm.isr_value(), 0);
    assert_eq!(sm.isr_count(), 0);
    assert_eq!(sm.fifo().rx_level(), 1);
    assert_eq!(
        pio.sm_mut(0).fifo_mut().rx_pop().map(|w| w & 0xFF),
        Some(0xA5)
    );
}

#[test]
fn fifo_levels_stay_inside_their_depth() {
    let mut pio = Pio::new(0);
    let fifo = pio.sm_mut(2).fifo_mut();
    for word in 0..10 {
        fifo.tx_push(word);
        assert!(fifo.tx_level() <= 4);
        assert_eq!(fifo.tx_is_empty(), fifo.tx_level() == 0);
        assert_eq!(fifo.tx_is_full(), fifo.tx_level() == 4);
    }
    assert!(fifo.tx_over());
}

#[test]
fn delay_holds_pins_while_counting() {
    let mut pio = Pio::new(0);
    // set pins, 1 [3]; set pins, 0; spin: jmp spin
    pio.memory_mut().load(0, &[0xE301, 0xE000, 0x0002]);
    pio.sm_mut(0).set_pinctrl(1 << 26, 0xFFFF_FFFF, false);
    pio.write_ctrl(0x1, 0xF);

    run_ticks(&mut pio, 1);
    assert!(pio.gpio().pin(0).is_high());
    assert_eq!(pio.sm(0).delay_remaining(), 3);

    // delay cycles: the pin holds, the second set has not run
    run_ticks(&mut pio, 3);
    assert!(pio.gpio().pin(0).is_high());
    assert_eq!(pio.sm(0).pc(), 1);

    run_ticks(&mut pio, 1);
    assert!(!pio.gpio().pin(0).is_high());
}
