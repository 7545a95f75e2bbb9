//! Line-oriented TCP register server.
//!
//! Exposes the whole bus address space to out-of-process clients so that
//! replacement SDK bindings (C, Python, anything with a socket) can drive
//! the emulator as if it were real silicon. One request per line, one
//! response per line:
//!
//! ```text
//! v                       -> 101 OK: RP PIO EMULATION V0.1
//! r 0x50200010            -> 101 OK: 0
//! w 0x50200010 0xdeadbeef -> 101 OK
//! i 0x502000d4 5 0x1f     -> 101 OK: 5
//! q                       -> (connection closes, no response)
//! ```

use std::io::{self, BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::thread;

use crate::bus::AddressBus;
use crate::{make_address_bus, EmulatorHandle};

/// Default bridge port.
pub const DEFAULT_PORT: u16 = 1088;

/// Version banner reported by the `v` command.
pub const SERVER_VERSION: &str = "RP PIO EMULATION V0.1";

const HELP_TEXT: &str = "available commands: ?, h, i, l, p, q, r, v, w";

/// Response status line prefixes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Ok,
    ErrUnknownCommand,
    ErrMissingOperand,
    ErrUnparsedInput,
    ErrNumberExpected,
    ErrUnexpected,
}

impl Status {
    fn display(self) -> &'static str {
        match self {
            Self::Ok => "101 OK",
            Self::ErrUnknownCommand => "400 UNKNOWN COMMAND",
            Self::ErrMissingOperand => "401 MISSING OPERAND",
            Self::ErrUnparsedInput => "402 UNPARSED INPUT",
            Self::ErrNumberExpected => "403 NUMBER EXPECTED",
            Self::ErrUnexpected => "404 UNEXPECTED",
        }
    }
}

fn response(status: Status, payload: Option<&str>) -> String {
    match payload {
        Some(payload) => format!("{}: {payload}", status.display()),
        None => status.display().to_string(),
    }
}

/// Parse an unsigned 32-bit operand, decimal or `0x` hex.
fn parse_u32(token: &str) -> Option<u32> {
    if let Some(hex) = token.strip_prefix("0x").or_else(|| token.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).ok()
    } else {
        token.parse().ok()
    }
}

fn parse_u64(token: &str) -> Option<u64> {
    if let Some(hex) = token.strip_prefix("0x").or_else(|| token.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16).ok()
    } else {
        token.parse().ok()
    }
}

/// TCP bridge over one emulator.
pub struct RegisterServer {
    listener: TcpListener,
    handle: EmulatorHandle,
}

impl RegisterServer {
    /// Bind the listener. Port 0 picks an ephemeral port.
    pub fn bind(handle: EmulatorHandle, port: u16) -> io::Result<Self> {
        let listener = TcpListener::bind(("127.0.0.1", port))?;
        Ok(Self { listener, handle })
    }

    /// The port actually bound.
    pub fn port(&self) -> io::Result<u16> {
        Ok(self.listener.local_addr()?.port())
    }

    /// Accept connections forever, one thread per client.
    pub fn serve(&self) {
        let mut connection_counter = 0usize;
        for stream in self.listener.incoming() {
            match stream {
                Ok(stream) => {
                    let id = connection_counter;
                    connection_counter += 1;
                    let handle = self.handle.clone();
                    thread::spawn(move || {
                        eprintln!("bridge: connection #{id} opened");
                        if let Err(e) = serve_client(&handle, &stream) {
                            eprintln!("bridge: connection #{id} aborted: {e}");
                        } else {
                            eprintln!("bridge: connection #{id} closed");
                        }
                    });
                }
                Err(e) => {
                    // accept failures affect one connection attempt only
                    eprintln!("bridge: accept failed: {e}");
                }
            }
        }
    }

    /// Bind and serve on a background thread; returns the bound port.
    pub fn spawn(handle: EmulatorHandle, port: u16) -> io::Result<u16> {
        let server = Self::bind(handle, port)?;
        let port = server.port()?;
        thread::spawn(move || server.serve());
        Ok(port)
    }
}

fn serve_client(handle: &EmulatorHandle, stream: &TcpStream) -> io::Result<()> {
    // Each client gets its own bus; only the emulator behind it is shared.
    let mut bus = make_address_bus(handle);
    // A nonblocking clone lets a parked wait notice the peer going away.
    let probe = stream.try_clone()?;
    probe.set_nonblocking(true)?;
    let mut writer = stream.try_clone()?;
    let reader = BufReader::new(stream);

    for line in reader.lines() {
        let line = line?;
        let request = line.trim();
        if request.is_empty() {
            continue;
        }
        match handle_request(&mut bus, &probe, request) {
            Some(reply) => {
                writer.write_all(reply.as_bytes())?;
                writer.write_all(b"\n")?;
                writer.flush()?;
            }
            // quit: close without a response
            None => break,
        }
    }
    Ok(())
}

/// Peer-closed probe used to cancel parked waits.
fn peer_gone(probe: &TcpStream) -> bool {
    let mut buf = [0u8; 1];
    match probe.peek(&mut buf) {
        Ok(0) => true,
        Ok(_) => false,
        Err(e) => e.kind() != io::ErrorKind::WouldBlock,
    }
}

fn handle_request(bus: &mut AddressBus, probe: &TcpStream, request: &str) -> Option<String> {
    let command = request.chars().next().unwrap_or(' ');
    let args: Vec<&str> = request[command.len_utf8()..]
        .split_whitespace()
        .collect();
    let reply = match command {
        'v' => match args.as_slice() {
            [] => response(Status::Ok, Some(SERVER_VERSION)),
            [extra, ..] => response(Status::ErrUnparsedInput, Some(extra)),
        },
        'h' | '?' => match args.as_slice() {
            [] => response(Status::Ok, Some(HELP_TEXT)),
            [extra, ..] => response(Status::ErrUnparsedInput, Some(extra)),
        },
        'q' => match args.as_slice() {
            [] => return None,
            [extra, ..] => response(Status::ErrUnparsedInput, Some(extra)),
        },
        'p' => handle_provides(bus, &args),
        'l' => handle_label(bus, &args),
        'r' => handle_read(bus, &args),
        'w' => handle_write(bus, &args),
        'i' => handle_wait(bus, probe, &args),
        other => response(Status::ErrUnknownCommand, Some(&other.to_string())),
    };
    Some(reply)
}

fn handle_provides(bus: &AddressBus, args: &[&str]) -> String {
    match args {
        [] => response(Status::ErrMissingOperand, None),
        [address] => match parse_u32(address) {
            Some(address) => response(
                Status::Ok,
                Some(if bus.provides(address) { "true" } else { "false" }),
            ),
            None => response(Status::ErrNumberExpected, Some(address)),
        },
        [_, extra, ..] => response(Status::ErrUnparsedInput, Some(extra)),
    }
}

fn handle_label(bus: &AddressBus, args: &[&str]) -> String {
    match args {
        [] => response(Status::ErrMissingOperand, None),
        [address] => match parse_u32(address) {
            Some(address) => match bus.label(address) {
                Some(label) => response(Status::Ok, Some(&label)),
                None => response(
                    Status::ErrUnexpected,
                    Some(&format!("unmapped address {address:#010x}")),
                ),
            },
            None => response(Status::ErrNumberExpected, Some(address)),
        },
        [_, extra, ..] => response(Status::ErrUnparsedInput, Some(extra)),
    }
}

fn handle_read(bus: &mut AddressBus, args: &[&str]) -> String {
    match args {
        [] => response(Status::ErrMissingOperand, None),
        [address] => match parse_u32(address) {
            Some(address) => response(Status::Ok, Some(&bus.read(address).to_string())),
            None => response(Status::ErrNumberExpected, Some(address)),
        },
        [_, extra, ..] => response(Status::ErrUnparsedInput, Some(extra)),
    }
}

fn handle_write(bus: &mut AddressBus, args: &[&str]) -> String {
    match args {
        [] | [_] => response(Status::ErrMissingOperand, None),
        [address, value] => {
            let Some(address) = parse_u32(address) else {
                return response(Status::ErrNumberExpected, Some(address));
            };
            let Some(value) = parse_u32(value) else {
                return response(Status::ErrNumberExpected, Some(value));
            };
            bus.write(address, value);
            response(Status::Ok, None)
        }
        [_, _, extra, ..] => response(Status::ErrUnparsedInput, Some(extra)),
    }
}

fn handle_wait(bus: &mut AddressBus, probe: &TcpStream, args: &[&str]) -> String {
    if args.len() < 2 {
        return response(Status::ErrMissingOperand, None);
    }
    if args.len() > 5 {
        return response(Status::ErrUnparsedInput, Some(args[5]));
    }
    let Some(address) = parse_u32(args[0]) else {
        return response(Status::ErrNumberExpected, Some(args[0]));
    };
    let Some(expected) = parse_u32(args[1]) else {
        return response(Status::ErrNumberExpected, Some(args[1]));
    };
    let mask = match args.get(2) {
        Some(token) => match parse_u32(token) {
            Some(mask) => mask,
            None => return response(Status::ErrNumberExpected, Some(token)),
        },
        None => 0xFFFF_FFFF,
    };
    let cycles = match args.get(3) {
        Some(token) => match parse_u64(token) {
            Some(cycles) => cycles,
            None => return response(Status::ErrNumberExpected, Some(token)),
        },
        None => 0,
    };
    let millis = match args.get(4) {
        Some(token) => match parse_u64(token) {
            Some(millis) => millis,
            None => return response(Status::ErrNumberExpected, Some(token)),
        },
        None => 0,
    };
    match bus.wait_cancellable(address, expected, mask, cycles, millis, || peer_gone(probe)) {
        Ok(value) => response(Status::Ok, Some(&value.to_string())),
        Err(e) => response(Status::ErrUnexpected, Some(&e.to_string())),
    }
}
