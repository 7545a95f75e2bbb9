//! TCP bridge loopback tests: a client drives the emulator end to end.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use emu_pico::server::{RegisterServer, SERVER_VERSION};
use emu_pico::{EmulatorHandle, EmulatorShared, RegisterClient, PIO0_BASE, PIO0_EMU_BASE};

const CTRL: u32 = PIO0_BASE;
const FSTAT: u32 = PIO0_BASE + 0x04;
const TXF0: u32 = PIO0_BASE + 0x10;
const RXF0: u32 = PIO0_BASE + 0x24;
const INSTR_MEM0: u32 = PIO0_BASE + 0x48;
const SM0_ADDR: u32 = PIO0_BASE + 0xD4;

fn spawn_clock(handle: EmulatorHandle, stop: Arc<AtomicBool>) -> JoinHandle<()> {
    thread::spawn(move || {
        while !stop.load(Ordering::Relaxed) {
            handle.tick();
            thread::sleep(Duration::from_micros(100));
        }
    })
}

#[test]
fn mirror_program_round_trips_a_word() {
    let handle = EmulatorShared::new();
    let port = RegisterServer::spawn(handle.clone(), 0).expect("bind");
    let stop = Arc::new(AtomicBool::new(false));
    let clock = spawn_clock(handle.clone(), stop.clone());

    let mut client = RegisterClient::connect("127.0.0.1", port).expect("connect");
    assert_eq!(client.version().expect("version"), SERVER_VERSION);

    // pull block; in osr, 32; push block; jmp 0
    for (i, word) in [0x80A0u32, 0x40E0, 0x8020, 0x0000].iter().enumerate() {
        client.write(INSTR_MEM0 + 4 * i as u32, *word).expect("load");
    }
    client.write(CTRL, 0x1).expect("enable");

    client.write(TXF0, 0xDEAD_BEEF).expect("write TXF0");
    // RXEMPTY0 (FSTAT bit 8) clears once the word crossed the machine
    client.wait(FSTAT, 0, 1 << 8, 0, 5_000).expect("wait");

    let response = client.request("r 0x50200024").expect("read RXF0");
    assert!(response.is_ok());
    assert_eq!(response.payload.as_deref(), Some("3735928559"));

    stop.store(true, Ordering::Relaxed);
    clock.join().expect("clock thread");
    client.quit().expect("quit");
}

#[test]
fn wait_resolves_against_the_program_counter() {
    let handle = EmulatorShared::new();
    let port = RegisterServer::spawn(handle.clone(), 0).expect("bind");
    let stop = Arc::new(AtomicBool::new(false));
    let clock = spawn_clock(handle.clone(), stop.clone());

    let mut client = RegisterClient::connect("127.0.0.1", port).expect("connect");
    // five nops, then spin at 5
    for i in 0..5u32 {
        client.write(INSTR_MEM0 + 4 * i, 0xA042).expect("load");
    }
    client.write(INSTR_MEM0 + 4 * 5, 0x0005).expect("load");
    client.write(CTRL, 0x1).expect("enable");

    let observed = client.wait(SM0_ADDR, 5, 0x1F, 0, 5_000).expect("wait");
    assert_eq!(observed & 0x1F, 5);

    stop.store(true, Ordering::Relaxed);
    clock.join().expect("clock thread");
}

#[test]
fn wait_reports_cycle_timeouts() {
    let handle = EmulatorShared::new();
    let port = RegisterServer::spawn(handle.clone(), 0).expect("bind");
    let stop = Arc::new(AtomicBool::new(false));
    let clock = spawn_clock(handle.clone(), stop.clone());

    let mut client = RegisterClient::connect("127.0.0.1", port).expect("connect");
    // nothing ever drives SM0_ADDR to 9
    let response = client
        .request(&format!("i {SM0_ADDR:#010x} 9 0x1f 50 0"))
        .expect("request");
    assert_eq!(response.code, 404);
    assert!(response.payload.unwrap_or_default().contains("timed out"));

    stop.store(true, Ordering::Relaxed);
    clock.join().expect("clock thread");
}

#[test]
fn single_stepping_over_the_wire() {
    let handle = EmulatorShared::new();
    let port = RegisterServer::spawn(handle.clone(), 0).expect("bind");
    let mut client = RegisterClient::connect("127.0.0.1", port).expect("connect");

    client.write(INSTR_MEM0, 0xE043).expect("load"); // set y, 3
    client.write(CTRL, 0x1).expect("enable");

    let trigger_phase0 = PIO0_EMU_BASE + 4 * 44;
    let trigger_phase1 = PIO0_EMU_BASE + 4 * 45;
    let sm0_regy = PIO0_EMU_BASE + 4;

    assert_eq!(client.read(sm0_regy).expect("read y"), 0);
    client.write(trigger_phase0, 1).expect("phase 0");
    client.write(trigger_phase1, 1).expect("phase 1");
    assert_eq!(client.read(sm0_regy).expect("read y"), 3);
    assert_eq!(client.read(SM0_ADDR).expect("read pc"), 1);
}

#[test]
fn protocol_errors_use_the_documented_codes() {
    let handle = EmulatorShared::new();
    let port = RegisterServer::spawn(handle, 0).expect("bind");
    let mut client = RegisterClient::connect("127.0.0.1", port).expect("connect");

    assert_eq!(client.request("x").expect("request").code, 400);
    assert_eq!(client.request("r").expect("request").code, 401);
    assert_eq!(client.request("v extra").expect("request").code, 402);
    assert_eq!(client.request("r zz").expect("request").code, 403);
    assert_eq!(client.request("l 0x40000000").expect("request").code, 404);

    assert!(client.provides(PIO0_BASE).expect("provides"));
    assert!(!client.provides(0x4000_0000).expect("provides"));
    assert_eq!(client.label(PIO0_BASE).expect("label"), "CTRL");

    client.quit().expect("quit");
}
