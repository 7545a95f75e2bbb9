//! Blocking TCP client for the register bridge.
//!
//! Speaks the line protocol of `server`: one request out, one status line
//! back, `<code> <tag>[: <payload>]`. Used by the integration tests and by
//! host-side SDK shims that want typed access instead of raw sockets.

use std::io::{self, BufRead, BufReader, Write};
use std::net::TcpStream;

use crate::server::DEFAULT_PORT;

/// A parsed response line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub code: u16,
    pub tag: String,
    pub payload: Option<String>,
}

impl Response {
    fn parse(line: &str) -> io::Result<Self> {
        let (status, payload) = match line.split_once(':') {
            Some((status, payload)) => (status, Some(payload.trim().to_string())),
            None => (line, None),
        };
        let (code, tag) = status
            .trim()
            .split_once(' ')
            .ok_or_else(|| bad_response(line))?;
        let code = code.parse().map_err(|_| bad_response(line))?;
        Ok(Self {
            code,
            tag: tag.trim().to_string(),
            payload,
        })
    }

    /// Whether the server reported success.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.code == 101
    }
}

fn bad_response(line: &str) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidData,
        format!("malformed server response: {line:?}"),
    )
}

fn server_error(context: &str, response: &Response) -> io::Error {
    io::Error::other(format!(
        "{context}: {} {}{}",
        response.code,
        response.tag,
        response
            .payload
            .as_deref()
            .map(|p| format!(": {p}"))
            .unwrap_or_default()
    ))
}

/// Client connection to a register server.
pub struct RegisterClient {
    writer: TcpStream,
    reader: BufReader<TcpStream>,
}

impl RegisterClient {
    /// Connect to `host:port`.
    pub fn connect(host: &str, port: u16) -> io::Result<Self> {
        let stream = TcpStream::connect((host, port))?;
        let reader = BufReader::new(stream.try_clone()?);
        Ok(Self {
            writer: stream,
            reader,
        })
    }

    /// Connect to the default port on localhost.
    pub fn connect_local() -> io::Result<Self> {
        Self::connect("127.0.0.1", DEFAULT_PORT)
    }

    /// Send one request line and read the response line.
    pub fn request(&mut self, request: &str) -> io::Result<Response> {
        self.writer.write_all(request.as_bytes())?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        let mut line = String::new();
        if self.reader.read_line(&mut line)? == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "server closed the connection",
            ));
        }
        Response::parse(line.trim_end())
    }

    fn expect_payload(&mut self, request: &str, context: &str) -> io::Result<String> {
        let response = self.request(request)?;
        if !response.is_ok() {
            return Err(server_error(context, &response));
        }
        response
            .payload
            .ok_or_else(|| io::Error::other(format!("{context}: missing payload")))
    }

    /// Server version banner.
    pub fn version(&mut self) -> io::Result<String> {
        self.expect_payload("v", "failed retrieving version")
    }

    /// Server help text.
    pub fn help(&mut self) -> io::Result<String> {
        self.expect_payload("h", "failed retrieving help")
    }

    /// Close the connection. The server answers with silence.
    pub fn quit(mut self) -> io::Result<()> {
        self.writer.write_all(b"q\n")?;
        self.writer.flush()?;
        let mut line = String::new();
        if self.reader.read_line(&mut line)? != 0 {
            return Err(io::Error::other(format!(
                "unexpected response on quit: {}",
                line.trim_end()
            )));
        }
        Ok(())
    }

    /// Whether any facade provides `address`.
    pub fn provides(&mut self, address: u32) -> io::Result<bool> {
        let payload =
            self.expect_payload(&format!("p {address:#010x}"), "failed retrieving provision")?;
        match payload.as_str() {
            "true" => Ok(true),
            "false" => Ok(false),
            other => Err(io::Error::other(format!(
                "failed parsing provision info: {other}"
            ))),
        }
    }

    /// Diagnostic label of the register at `address`.
    pub fn label(&mut self, address: u32) -> io::Result<String> {
        self.expect_payload(&format!("l {address:#010x}"), "failed retrieving label")
    }

    /// Read the register at `address`.
    pub fn read(&mut self, address: u32) -> io::Result<u32> {
        let payload = self.expect_payload(&format!("r {address:#010x}"), "failed reading")?;
        payload
            .parse()
            .map_err(|_| io::Error::other(format!("failed parsing value: {payload}")))
    }

    /// Write the register at `address`.
    pub fn write(&mut self, address: u32, value: u32) -> io::Result<()> {
        let response = self.request(&format!("w {address:#010x} {value:#010x}"))?;
        if !response.is_ok() {
            return Err(server_error("failed writing", &response));
        }
        Ok(())
    }

    /// Block until the masked register value matches; returns the observed
    /// value. Zero timeouts mean unbounded.
    pub fn wait(
        &mut self,
        address: u32,
        expected: u32,
        mask: u32,
        cycles_timeout: u64,
        millis_timeout: u64,
    ) -> io::Result<u32> {
        let request = format!(
            "i {address:#010x} {expected:#010x} {mask:#010x} {cycles_timeout} {millis_timeout}"
        );
        let payload = self.expect_payload(&request, "failed waiting")?;
        payload
            .parse()
            .map_err(|_| io::Error::other(format!("failed parsing value: {payload}")))
    }
}
