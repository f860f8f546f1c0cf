//! Readiness waiting over file-descriptor sources.
//!
//! Everything the bridge waits on (the serial device, the bus socket) exposes
//! a descriptor through [`Waitable`]; [`wait`] multiplexes them with `poll(2)`.

use std::io;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd};
use std::os::unix::net::{UnixDatagram, UnixStream};
use std::time::Duration;

/// A source with a readiness signal the event loop can block on.
pub trait Waitable {
    /// Descriptor that becomes readable when the source has work.
    fn readiness_fd(&self) -> BorrowedFd<'_>;
}

impl Waitable for UnixStream {
    fn readiness_fd(&self) -> BorrowedFd<'_> {
        self.as_fd()
    }
}

impl Waitable for UnixDatagram {
    fn readiness_fd(&self) -> BorrowedFd<'_> {
        self.as_fd()
    }
}

impl Waitable for std::net::UdpSocket {
    fn readiness_fd(&self) -> BorrowedFd<'_> {
        self.as_fd()
    }
}

/// Per-source result of a wait.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Readiness {
    /// Data can be read without blocking.
    pub readable: bool,
    /// The peer hung up or the descriptor is in an error state.
    pub hangup: bool,
}

impl Readiness {
    /// Whether the source needs servicing this cycle.
    pub fn is_ready(&self) -> bool {
        self.readable || self.hangup
    }
}

/// Result of [`wait`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitOutcome {
    /// At least one source is ready; entries follow the order of `sources`.
    Ready(Vec<Readiness>),
    /// The timeout expired with nothing ready.
    TimedOut,
}

/// Block until at least one source is readable or hung up.
///
/// `timeout = None` waits indefinitely. An interrupting signal is returned as
/// an `ErrorKind::Interrupted` error so the caller decides whether to retry.
pub fn wait(sources: &[&dyn Waitable], timeout: Option<Duration>) -> io::Result<WaitOutcome> {
    let mut fds: Vec<libc::pollfd> = sources
        .iter()
        .map(|source| libc::pollfd {
            fd: source.readiness_fd().as_raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        })
        .collect();

    let ready = poll(&mut fds, timeout)?;
    if ready == 0 {
        return Ok(WaitOutcome::TimedOut);
    }

    Ok(WaitOutcome::Ready(
        fds.iter()
            .map(|pfd| Readiness {
                readable: pfd.revents & libc::POLLIN != 0,
                hangup: pfd.revents & (libc::POLLHUP | libc::POLLERR | libc::POLLNVAL) != 0,
            })
            .collect(),
    ))
}

/// Block until `source` accepts writes. Returns `false` on timeout.
pub fn wait_writable(source: BorrowedFd<'_>, timeout: Option<Duration>) -> io::Result<bool> {
    let mut fds = [libc::pollfd {
        fd: source.as_raw_fd(),
        events: libc::POLLOUT,
        revents: 0,
    }];
    Ok(poll(&mut fds, timeout)? > 0)
}

fn poll(fds: &mut [libc::pollfd], timeout: Option<Duration>) -> io::Result<usize> {
    let timeout_ms: libc::c_int = match timeout {
        None => -1,
        Some(t) => t.as_millis().min(libc::c_int::MAX as u128) as libc::c_int,
    };

    // SAFETY: `fds` is a valid, exclusively borrowed slice of `pollfd` for the
    // duration of the call, and its length is passed alongside it.
    let rc = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, timeout_ms) };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(rc as usize)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn times_out_when_idle() {
        let (a, _b) = UnixStream::pair().unwrap();
        let outcome = wait(&[&a], Some(Duration::from_millis(10))).unwrap();
        assert_eq!(outcome, WaitOutcome::TimedOut);
    }

    #[test]
    fn reports_readable_source_in_order() {
        let (a, _a_peer) = UnixStream::pair().unwrap();
        let (b, mut b_peer) = UnixStream::pair().unwrap();
        b_peer.write_all(b"x").unwrap();

        let outcome = wait(&[&a, &b], Some(Duration::from_secs(1))).unwrap();

        match outcome {
            WaitOutcome::Ready(ready) => {
                assert_eq!(ready.len(), 2);
                assert!(!ready[0].is_ready());
                assert!(ready[1].readable);
            }
            WaitOutcome::TimedOut => panic!("expected readiness"),
        }
    }

    #[test]
    fn reports_both_sources_ready() {
        let (a, mut a_peer) = UnixStream::pair().unwrap();
        let (b, b_peer) = UnixDatagram::pair().unwrap();
        a_peer.write_all(b"x").unwrap();
        b_peer.send(b"y").unwrap();

        let outcome = wait(&[&a, &b], None).unwrap();

        assert_eq!(
            outcome,
            WaitOutcome::Ready(vec![
                Readiness {
                    readable: true,
                    hangup: false
                },
                Readiness {
                    readable: true,
                    hangup: false
                },
            ])
        );
    }

    #[test]
    fn reports_hangup() {
        let (a, a_peer) = UnixStream::pair().unwrap();
        drop(a_peer);

        let outcome = wait(&[&a], Some(Duration::from_secs(1))).unwrap();

        match outcome {
            WaitOutcome::Ready(ready) => assert!(ready[0].is_ready()),
            WaitOutcome::TimedOut => panic!("expected hangup"),
        }
    }

    #[test]
    fn socket_is_writable() {
        let (a, _b) = UnixStream::pair().unwrap();
        assert!(wait_writable(a.as_fd(), Some(Duration::from_secs(1))).unwrap());
    }
}
