//! Headless PIO emulator binary.
//!
//! Starts the TCP register bridge over a freshly powered machine,
//! optionally preloading a `.hex` program and driving the clock. Without
//! `--free-running` the clock only advances when a client pulses the
//! extended facade's phase triggers.

use std::fs;
use std::path::PathBuf;
use std::process;
use std::thread;
use std::time::Duration;

use emu_core::ClockMode;
use emu_pico::hex::load_hex_program;
use emu_pico::server::{RegisterServer, DEFAULT_PORT};
use emu_pico::snapshot::EmulatorSnapshot;
use emu_pico::EmulatorShared;

struct CliArgs {
    port: u16,
    program_path: Option<PathBuf>,
    origin: u32,
    pio_num: usize,
    enable_mask: u32,
    free_running: bool,
    khz: u32,
    cycles: Option<u64>,
    snapshot_path: Option<PathBuf>,
}

fn parse_args() -> CliArgs {
    let args: Vec<String> = std::env::args().collect();
    let mut cli = CliArgs {
        port: DEFAULT_PORT,
        program_path: None,
        origin: 0,
        pio_num: 0,
        enable_mask: 0,
        free_running: false,
        khz: 1000,
        cycles: None,
        snapshot_path: None,
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--port" => {
                i += 1;
                if let Some(s) = args.get(i) {
                    cli.port = s.parse().unwrap_or(DEFAULT_PORT);
                }
            }
            "--program" => {
                i += 1;
                cli.program_path = args.get(i).map(PathBuf::from);
            }
            "--origin" => {
                i += 1;
                if let Some(s) = args.get(i) {
                    cli.origin = s.parse().unwrap_or(0);
                }
            }
            "--pio" => {
                i += 1;
                if let Some(s) = args.get(i) {
                    cli.pio_num = s.parse().unwrap_or(0).min(1);
                }
            }
            "--enable" => {
                i += 1;
                if let Some(s) = args.get(i) {
                    cli.enable_mask = s.parse().unwrap_or(0) & 0xF;
                }
            }
            "--free-running" => {
                cli.free_running = true;
            }
            "--khz" => {
                i += 1;
                if let Some(s) = args.get(i) {
                    cli.khz = s.parse().unwrap_or(1000).max(1);
                }
            }
            "--cycles" => {
                i += 1;
                if let Some(s) = args.get(i) {
                    cli.cycles = s.parse().ok();
                }
            }
            "--snapshot" => {
                i += 1;
                cli.snapshot_path = args.get(i).map(PathBuf::from);
            }
            "--help" | "-h" => {
                eprintln!("Usage: emu-pico [OPTIONS]");
                eprintln!();
                eprintln!("Options:");
                eprintln!("  --port <n>        Bridge TCP port [default: 1088]");
                eprintln!("  --program <file>  Load a .hex program listing");
                eprintln!("  --origin <n>      Load address for the program [default: 0]");
                eprintln!("  --pio <n>         Block to load the program into (0 or 1)");
                eprintln!("  --enable <mask>   Enable state machines (CTRL bits 3:0)");
                eprintln!("  --free-running    Drive the clock continuously");
                eprintln!("  --khz <n>         Free-running clock rate [default: 1000]");
                eprintln!("  --cycles <n>      Run n cycles, then exit (headless)");
                eprintln!("  --snapshot <file> Write a JSON state snapshot on exit");
                process::exit(0);
            }
            other => {
                eprintln!("Unknown argument: {other}");
                process::exit(1);
            }
        }
        i += 1;
    }

    cli
}

fn main() {
    let cli = parse_args();
    let handle = EmulatorShared::new();

    if let Some(path) = &cli.program_path {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) => {
                eprintln!("Failed reading {}: {e}", path.display());
                process::exit(1);
            }
        };
        let mut emulator = handle.lock();
        match load_hex_program(emulator.pio_mut(cli.pio_num), cli.origin, &text) {
            Ok(words) => eprintln!(
                "Loaded {words} instruction(s) at {:#04x} into PIO{}",
                cli.origin, cli.pio_num
            ),
            Err(e) => {
                eprintln!("Failed loading {}: {e}", path.display());
                process::exit(1);
            }
        }
    }

    if cli.enable_mask != 0 {
        handle
            .lock()
            .pio_mut(cli.pio_num)
            .write_ctrl(cli.enable_mask, 0xF);
    }

    // Headless batch mode: run, snapshot, exit.
    if let Some(cycles) = cli.cycles {
        for _ in 0..cycles {
            handle.tick();
        }
        eprintln!("Executed {cycles} clock cycle(s)");
        write_snapshot(&handle, cli.snapshot_path.as_deref());
        return;
    }

    let port = match RegisterServer::spawn(handle.clone(), cli.port) {
        Ok(port) => port,
        Err(e) => {
            eprintln!("Failed binding port {}: {e}", cli.port);
            process::exit(1);
        }
    };
    eprintln!("Register bridge listening on 127.0.0.1:{port}");

    if cli.free_running {
        handle.set_clock_mode(ClockMode::FreeRunning);
        let period = Duration::from_micros((1_000 / u64::from(cli.khz)).max(1));
        eprintln!("Clock free-running at ~{} kHz", cli.khz);
        loop {
            // a client may drop the clock back to single-step
            if handle.clock_mode() == ClockMode::FreeRunning {
                handle.tick();
            }
            thread::sleep(period);
        }
    } else {
        eprintln!("Clock in single-step mode; waiting for phase triggers");
        loop {
            thread::sleep(Duration::from_secs(3600));
        }
    }
}

fn write_snapshot(handle: &EmulatorShared, path: Option<&std::path::Path>) {
    let Some(path) = path else { return };
    let snapshot = EmulatorSnapshot::capture(&handle.lock());
    match snapshot.to_json() {
        Ok(json) => {
            if let Err(e) = fs::write(path, json) {
                eprintln!("Failed writing snapshot {}: {e}", path.display());
            }
        }
        Err(e) => eprintln!("Failed serializing snapshot: {e}"),
    }
}
