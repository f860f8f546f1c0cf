use std::io::ErrorKind;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};
use std::os::fd::{AsFd, BorrowedFd, FromRawFd, OwnedFd};

use bytes::Bytes;
use serbus_frame::Frame;
use serbus_serial::Waitable;
use tracing::{debug, info, trace, warn};

use crate::channel::validate_channel;
use crate::error::{BusError, Result};
use crate::packet::{encode_message, parse_packet, Packet, Reassembler};
use crate::raw_bytes;
use crate::traits::MessageBus;
use crate::url::LcmUrl;

const RECV_BUFFER_SIZE: usize = 65536;

/// Datagrams read per dispatch, so a busy bus cannot starve the device.
pub const MAX_DISPATCH_BATCH: usize = 256;

/// LCM client over UDP multicast, carrying frames as `raw_bytes_t`.
pub struct LcmBus {
    recv: UdpSocket,
    send: UdpSocket,
    destination: SocketAddr,
    seqno: u32,
    subscriptions: Vec<String>,
    reassembler: Reassembler<SocketAddr>,
    recv_buf: Vec<u8>,
    dispatch_batch: usize,
}

impl LcmBus {
    /// Join the multicast group described by `url`.
    pub fn connect(url: &LcmUrl) -> Result<Self> {
        let connect_err = |source: std::io::Error| BusError::Connect {
            url: url.to_string(),
            source,
        };

        let recv = bind_reusable(url.port).map_err(connect_err)?;
        recv.join_multicast_v4(&url.group, &Ipv4Addr::UNSPECIFIED)
            .map_err(connect_err)?;

        let send = UdpSocket::bind(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0)).map_err(connect_err)?;
        send.set_multicast_ttl_v4(url.ttl).map_err(connect_err)?;
        send.set_multicast_loop_v4(true).map_err(connect_err)?;

        info!(%url, "connected to lcm bus");
        Self::from_sockets(recv, send, SocketAddr::V4(url.destination())).map_err(connect_err)
    }

    /// Build a bus from already-bound sockets; `destination` receives publishes.
    pub fn from_sockets(
        recv: UdpSocket,
        send: UdpSocket,
        destination: SocketAddr,
    ) -> std::io::Result<Self> {
        recv.set_nonblocking(true)?;
        Ok(Self {
            recv,
            send,
            destination,
            seqno: 0,
            subscriptions: Vec::new(),
            reassembler: Reassembler::new(),
            recv_buf: vec![0u8; RECV_BUFFER_SIZE],
            dispatch_batch: MAX_DISPATCH_BATCH,
        })
    }

    /// Cap the datagrams read by one dispatch (at least one).
    pub fn set_dispatch_batch(&mut self, datagrams: usize) {
        self.dispatch_batch = datagrams.max(1);
    }

    /// Subscribed channel names.
    pub fn subscriptions(&self) -> &[String] {
        &self.subscriptions
    }

    fn is_subscribed(&self, channel: &str) -> bool {
        self.subscriptions.iter().any(|c| c == channel)
    }

    /// Turn one datagram into a complete `(channel, body)` message, if any.
    fn absorb(&mut self, sender: SocketAddr, datagram: Bytes) -> Option<(String, Bytes)> {
        match parse_packet(datagram) {
            Ok(Packet::Short {
                channel, payload, ..
            }) => Some((channel, payload)),
            Ok(Packet::Fragment {
                header,
                channel,
                data,
            }) => self.reassembler.accept(sender, header, channel, data),
            Err(err) => {
                warn!(%sender, error = %err, "dropping malformed datagram");
                None
            }
        }
    }
}

impl MessageBus for LcmBus {
    fn subscribe(&mut self, channel: &str) -> Result<()> {
        validate_channel(channel)?;
        if !self.is_subscribed(channel) {
            self.subscriptions.push(channel.to_string());
            debug!(channel, "subscribed");
        }
        Ok(())
    }

    fn publish(&mut self, channel: &str, frame: &Frame) -> Result<()> {
        let body = raw_bytes::encode(frame)?;
        let datagrams = encode_message(channel, self.seqno, &body)?;
        self.seqno = self.seqno.wrapping_add(1);

        for datagram in &datagrams {
            loop {
                match self.send.send_to(datagram, self.destination) {
                    Ok(_) => break,
                    Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                    Err(source) => {
                        return Err(BusError::Publish {
                            channel: channel.to_string(),
                            source,
                        })
                    }
                }
            }
        }

        trace!(channel, size = frame.len(), datagrams = datagrams.len(), "published frame");
        Ok(())
    }

    fn dispatch_pending<F, E>(&mut self, mut on_message: F) -> std::result::Result<usize, E>
    where
        F: FnMut(&str, Frame) -> std::result::Result<(), E>,
        E: From<BusError>,
    {
        let mut delivered = 0usize;
        let mut read = 0usize;
        while read < self.dispatch_batch {
            let (n, sender) = match self.recv.recv_from(&mut self.recv_buf) {
                Ok(received) => received,
                Err(err) if err.kind() == ErrorKind::WouldBlock => break,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(BusError::Dispatch(err).into()),
            };

            read += 1;
            let datagram = Bytes::copy_from_slice(&self.recv_buf[..n]);
            let Some((channel, body)) = self.absorb(sender, datagram) else {
                continue;
            };
            if !self.is_subscribed(&channel) {
                trace!(channel, "ignoring message on unsubscribed channel");
                continue;
            }

            match raw_bytes::decode(body) {
                Ok(frame) => {
                    on_message(&channel, frame)?;
                    delivered += 1;
                }
                Err(err) => warn!(channel, error = %err, "skipping undecodable message"),
            }
        }
        if read == self.dispatch_batch {
            trace!(read, "dispatch batch full, rest stays queued");
        }
        Ok(delivered)
    }
}

impl Waitable for LcmBus {
    fn readiness_fd(&self) -> BorrowedFd<'_> {
        self.recv.as_fd()
    }
}

/// UDP socket on `0.0.0.0:port` that other bus clients on this host can share.
fn bind_reusable(port: u16) -> std::io::Result<UdpSocket> {
    // SAFETY: plain socket(2) call; the result is checked before use.
    let fd = unsafe { libc::socket(libc::AF_INET, libc::SOCK_DGRAM, 0) };
    if fd < 0 {
        return Err(std::io::Error::last_os_error());
    }
    // SAFETY: `fd` was just returned by socket(2) and is owned by nobody else.
    let owned = unsafe { OwnedFd::from_raw_fd(fd) };

    set_flag(&owned, libc::SO_REUSEADDR)?;
    #[cfg(any(target_os = "macos", target_os = "freebsd", target_os = "openbsd"))]
    set_flag(&owned, libc::SO_REUSEPORT)?;

    // SAFETY: sockaddr_in is a plain C struct; all-zero is valid before the
    // fields below are filled in.
    let mut addr: libc::sockaddr_in = unsafe { std::mem::zeroed() };
    addr.sin_family = libc::AF_INET as libc::sa_family_t;
    addr.sin_port = port.to_be();
    addr.sin_addr = libc::in_addr {
        s_addr: u32::from(Ipv4Addr::UNSPECIFIED).to_be(),
    };

    // SAFETY: `addr` is a valid sockaddr_in and its exact size is passed.
    let rc = unsafe {
        libc::bind(
            fd,
            (&addr as *const libc::sockaddr_in).cast::<libc::sockaddr>(),
            std::mem::size_of::<libc::sockaddr_in>() as libc::socklen_t,
        )
    };
    if rc < 0 {
        return Err(std::io::Error::last_os_error());
    }

    Ok(UdpSocket::from(owned))
}

fn set_flag(fd: &OwnedFd, option: libc::c_int) -> std::io::Result<()> {
    use std::os::fd::AsRawFd;

    let one: libc::c_int = 1;
    // SAFETY: `fd` is an open socket; `one` is a valid c_int whose size is passed.
    let rc = unsafe {
        libc::setsockopt(
            fd.as_raw_fd(),
            libc::SOL_SOCKET,
            option,
            (&one as *const libc::c_int).cast::<libc::c_void>(),
            std::mem::size_of::<libc::c_int>() as libc::socklen_t,
        )
    };
    if rc < 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

impl std::fmt::Debug for LcmBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LcmBus")
            .field("destination", &self.destination)
            .field("subscriptions", &self.subscriptions)
            .finish()
    }
}
