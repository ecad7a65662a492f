use std::io::{self, Read, Write};
use std::time::{Duration, Instant};

use serialport::{ClearBuffer, SerialPort};

use crate::error::{Error, Result};
use crate::logger;
use super::LineLink;

pub const DEFAULT_BAUD: u32 = 9600;
const IO_TIMEOUT: Duration = Duration::from_secs(1);
const REOPEN_DELAY: Duration = Duration::from_millis(200);
const READ_POLL: Duration = Duration::from_millis(10);

/// Serial line to the microcontroller. Reopens once after a permission
/// error; a second failure surfaces to the caller.
pub struct SerialLink {
    name: String,
    baud: u32,
    port: Option<Box<dyn SerialPort>>,
    pending: Vec<u8>,
}

fn open_port(name: &str, baud: u32) -> Result<Box<dyn SerialPort>> {
    let mut port = serialport::new(name, baud)
        .timeout(IO_TIMEOUT)
        .open()
        .map_err(|e| Error::Transport(format!("open {}: {}", name, e)))?;
    // Some boards only answer with DTR/RTS raised.
    port.write_data_terminal_ready(true).ok();
    port.write_request_to_send(true).ok();
    port.clear(ClearBuffer::All).ok();
    Ok(port)
}

impl SerialLink {
    pub fn open(name: &str, baud: u32) -> Result<Self> {
        let port = open_port(name, baud)?;
        logger::info_p("serial", &format!("opened {} @ {}", name, baud));
        Ok(Self { name: name.to_string(), baud, port: Some(port), pending: Vec::new() })
    }

    fn reopen(&mut self) -> Result<()> {
        self.port = None;
        std::thread::sleep(REOPEN_DELAY);
        self.port = Some(open_port(&self.name, self.baud)?);
        Ok(())
    }

    fn write_raw(&mut self, bytes: &[u8]) -> io::Result<()> {
        match self.port.as_mut() {
            Some(port) => {
                port.write_all(bytes)?;
                port.flush()
            }
            None => Err(io::Error::new(io::ErrorKind::NotConnected, "port closed")),
        }
    }
}

impl LineLink for SerialLink {
    fn name(&self) -> &str {
        &self.name
    }

    fn write_line(&mut self, line: &str) -> Result<()> {
        let mut bytes = line.as_bytes().to_vec();
        if !line.ends_with('\n') {
            bytes.push(b'\n');
        }
        match self.write_raw(&bytes) {
            Ok(()) => Ok(()),
            Err(e) if matches!(e.kind(), io::ErrorKind::PermissionDenied | io::ErrorKind::NotConnected) => {
                logger::warn_p("serial", &format!("write failed ({}), reconnecting", e));
                self.reopen()?;
                self.write_raw(&bytes).map_err(|e| Error::Transport(format!("rewrite failed: {}", e)))
            }
            Err(e) => Err(Error::Transport(e.to_string())),
        }
    }

    fn read_line(&mut self, timeout: Duration) -> Result<Option<String>> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = self.pending.drain(..=pos).collect();
                return Ok(Some(String::from_utf8_lossy(&line).trim().to_string()));
            }
            let Some(port) = self.port.as_mut() else { return Ok(None) };
            let waiting = port.bytes_to_read().map_err(|e| Error::Transport(e.to_string()))?;
            if waiting > 0 {
                let mut buf = vec![0u8; waiting as usize];
                match port.read(&mut buf) {
                    Ok(n) => self.pending.extend_from_slice(&buf[..n]),
                    Err(e) if e.kind() == io::ErrorKind::TimedOut => {}
                    Err(e) => {
                        self.port = None;
                        return Err(Error::Transport(e.to_string()));
                    }
                }
                continue;
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            std::thread::sleep(READ_POLL);
        }
    }
}
