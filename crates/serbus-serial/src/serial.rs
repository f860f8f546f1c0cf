use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, FromRawFd, IntoRawFd, OwnedFd};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, info};

use crate::baud::BaudRate;
use crate::error::{Result, SerialError};
use crate::waitable::{wait_writable, Waitable};

const READ_CHUNK_SIZE: usize = 4096;

/// Device settings applied at open time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SerialConfig {
    /// Line speed for both directions.
    pub baud_rate: BaudRate,
    /// Leave the device's existing termios settings untouched.
    pub preserve_termios: bool,
}

/// A serial device moving raw bytes, with no protocol knowledge.
///
/// The descriptor is non-blocking: reads return whatever is available and
/// writes wait for writability internally. The device closes on drop.
pub struct SerialChannel {
    file: File,
    name: String,
}

impl SerialChannel {
    /// Open and (unless preserved) configure a serial device in raw mode.
    pub fn open(path: impl AsRef<Path>, config: &SerialConfig) -> Result<Self> {
        let path = path.as_ref();
        let file = if config.preserve_termios {
            debug!(?path, "preserving existing termios settings");
            OpenOptions::new()
                .read(true)
                .write(true)
                .custom_flags(libc::O_NOCTTY | libc::O_NONBLOCK)
                .open(path)
                .map_err(|source| SerialError::Open {
                    path: path.to_path_buf(),
                    source,
                })?
        } else {
            open_raw(path, config.baud_rate)?
        };

        info!(?path, baud = %config.baud_rate, "opened serial device");
        Ok(Self {
            file,
            name: path.display().to_string(),
        })
    }

    /// Adopt an already-open descriptor (pipe, socket, pseudo terminal).
    pub fn from_fd(fd: OwnedFd, name: impl Into<String>) -> Result<Self> {
        set_nonblocking(fd.as_fd()).map_err(|source| SerialError::Open {
            path: PathBuf::from(format!("fd:{}", fd.as_raw_fd())),
            source,
        })?;
        Ok(Self {
            file: File::from(fd),
            name: name.into(),
        })
    }

    /// Read whatever is immediately available; empty means no data yet.
    pub fn read_available(&mut self) -> Result<Bytes> {
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        loop {
            match self.file.read(&mut chunk) {
                Ok(n) => return Ok(Bytes::copy_from_slice(&chunk[..n])),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => return Ok(Bytes::new()),
                Err(err) => return Err(SerialError::Read(err)),
            }
        }
    }

    /// Write all of `data`, retrying partial and interrupted writes.
    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        let mut offset = 0usize;
        while offset < data.len() {
            match self.file.write(&data[offset..]) {
                Ok(0) => return Err(SerialError::Write(ErrorKind::WriteZero.into())),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => {
                    loop {
                        match wait_writable(self.file.as_fd(), None) {
                            Ok(_) => break,
                            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                            Err(err) => return Err(SerialError::Write(err)),
                        }
                    }
                }
                Err(err) => return Err(SerialError::Write(err)),
            }
        }
        Ok(())
    }

    /// Device name for diagnostics.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Waitable for SerialChannel {
    fn readiness_fd(&self) -> BorrowedFd<'_> {
        self.file.as_fd()
    }
}

impl AsFd for SerialChannel {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.file.as_fd()
    }
}

impl std::fmt::Debug for SerialChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialChannel")
            .field("name", &self.name)
            .field("fd", &self.file.as_raw_fd())
            .finish()
    }
}

fn set_nonblocking(fd: BorrowedFd<'_>) -> std::io::Result<()> {
    let raw = fd.as_raw_fd();
    // SAFETY: `raw` is an open descriptor borrowed for the duration of both calls.
    let flags = unsafe { libc::fcntl(raw, libc::F_GETFL) };
    if flags < 0 {
        return Err(std::io::Error::last_os_error());
    }
    // SAFETY: as above; only the O_NONBLOCK status flag is added.
    let rc = unsafe { libc::fcntl(raw, libc::F_SETFL, flags | libc::O_NONBLOCK) };
    if rc < 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

/// 8N1 raw mode, no flow control, receiver enabled and modem lines ignored.
fn open_raw(path: &Path, baud_rate: BaudRate) -> Result<File> {
    let port = serialport::new(path.to_string_lossy(), baud_rate.bits_per_second())
        .data_bits(serialport::DataBits::Eight)
        .parity(serialport::Parity::None)
        .stop_bits(serialport::StopBits::One)
        .flow_control(serialport::FlowControl::None)
        .timeout(Duration::from_millis(100))
        .open_native()
        .map_err(|err| open_error(path, err))?;

    // SAFETY: `into_raw_fd` hands over sole ownership of the open descriptor
    // without running the port's destructor.
    let fd = unsafe { OwnedFd::from_raw_fd(port.into_raw_fd()) };
    // The port leaves the descriptor blocking; reads here must not be.
    set_nonblocking(fd.as_fd()).map_err(|err| SerialError::Config {
        path: path.to_path_buf(),
        reason: format!("fcntl: {err}"),
    })?;

    debug!(?path, baud = %baud_rate, "applied raw line settings");
    Ok(File::from(fd))
}

/// A device that cannot be reached is an open failure; anything the port
/// rejects after that is a configuration failure.
fn open_error(path: &Path, err: serialport::Error) -> SerialError {
    match err.kind() {
        serialport::ErrorKind::Io(kind) => SerialError::Open {
            path: path.to_path_buf(),
            source: std::io::Error::new(kind, err.description),
        },
        _ => match std::fs::metadata(path) {
            Err(source) => SerialError::Open {
                path: path.to_path_buf(),
                source,
            },
            Ok(_) => SerialError::Config {
                path: path.to_path_buf(),
                reason: err.description,
            },
        },
    }
}
