//! LCM UDP datagram format.
//!
//! Short message:
//! ```text
//! ┌──────────────┬─────────────┬──────────────────┬─────────┐
//! │ Magic (4B BE)│ Seqno (4B BE)│ Channel + NUL   │ Payload │
//! │ "LC02"       │             │                  │         │
//! └──────────────┴─────────────┴──────────────────┴─────────┘
//! ```
//!
//! Fragment (messages that do not fit a short datagram):
//! ```text
//! ┌──────────────┬────────────┬────────────┬──────────────┬────────────┬────────────┬──────┐
//! │ Magic "LC03" │ Seqno (4B) │ Size (4B)  │ Offset (4B)  │ Frag # (2B)│ Count (2B) │ Data │
//! └──────────────┴────────────┴────────────┴──────────────┴────────────┴────────────┴──────┘
//! ```
//! Fragment 0 carries the channel name and NUL at the start of its data.

use std::collections::HashMap;
use std::hash::Hash;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tracing::debug;

use crate::channel::validate_channel;
use crate::error::{BusError, Result};

pub const SHORT_MAGIC: u32 = 0x4c43_3032;
pub const FRAGMENT_MAGIC: u32 = 0x4c43_3033;

pub const SHORT_HEADER_SIZE: usize = 8;
pub const FRAGMENT_HEADER_SIZE: usize = 20;

/// Short datagrams must stay below this many bytes in total.
pub const SHORT_MESSAGE_MAX_SIZE: usize = 1435;

/// Body bytes carried by one fragment (channel name included for fragment 0).
pub const FRAGMENT_MAX_PAYLOAD: usize = 1423;

/// Largest payload a fragmented message can carry.
pub const MAX_MESSAGE_SIZE: usize = 256 * 1024 * 1024;

/// Header fields of one fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FragmentHeader {
    pub seqno: u32,
    pub message_size: u32,
    pub offset: u32,
    pub fragment_no: u16,
    pub fragment_count: u16,
}

/// A parsed datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Short {
        seqno: u32,
        channel: String,
        payload: Bytes,
    },
    Fragment {
        header: FragmentHeader,
        /// Present on fragment 0 only.
        channel: Option<String>,
        data: Bytes,
    },
}

/// Encode one message into the datagrams that carry it.
pub fn encode_message(channel: &str, seqno: u32, payload: &[u8]) -> Result<Vec<Bytes>> {
    validate_channel(channel)?;
    let channel_size = channel.len() + 1;

    if SHORT_HEADER_SIZE + channel_size + payload.len() < SHORT_MESSAGE_MAX_SIZE {
        let mut buf = BytesMut::with_capacity(SHORT_HEADER_SIZE + channel_size + payload.len());
        buf.put_u32(SHORT_MAGIC);
        buf.put_u32(seqno);
        put_channel(&mut buf, channel);
        buf.put_slice(payload);
        return Ok(vec![buf.freeze()]);
    }

    if payload.len() > MAX_MESSAGE_SIZE {
        return Err(BusError::MessageTooLarge {
            size: payload.len(),
            max: MAX_MESSAGE_SIZE,
        });
    }

    let first_data = (FRAGMENT_MAX_PAYLOAD - channel_size).min(payload.len());
    let rest = payload.len() - first_data;
    let fragment_count = 1 + rest.div_ceil(FRAGMENT_MAX_PAYLOAD);
    let fragment_count = u16::try_from(fragment_count).map_err(|_| BusError::MessageTooLarge {
        size: payload.len(),
        max: MAX_MESSAGE_SIZE,
    })?;

    let mut datagrams = Vec::with_capacity(fragment_count as usize);
    let mut offset = 0usize;
    for fragment_no in 0..fragment_count {
        let chunk = if fragment_no == 0 {
            first_data
        } else {
            FRAGMENT_MAX_PAYLOAD.min(payload.len() - offset)
        };
        let mut buf = BytesMut::with_capacity(FRAGMENT_HEADER_SIZE + FRAGMENT_MAX_PAYLOAD);
        buf.put_u32(FRAGMENT_MAGIC);
        buf.put_u32(seqno);
        buf.put_u32(payload.len() as u32);
        buf.put_u32(offset as u32);
        buf.put_u16(fragment_no);
        buf.put_u16(fragment_count);
        if fragment_no == 0 {
            put_channel(&mut buf, channel);
        }
        buf.put_slice(&payload[offset..offset + chunk]);
        datagrams.push(buf.freeze());
        offset += chunk;
    }

    Ok(datagrams)
}

fn put_channel(buf: &mut BytesMut, channel: &str) {
    buf.put_slice(channel.as_bytes());
    buf.put_u8(0);
}

/// Parse one received datagram.
pub fn parse_packet(mut datagram: Bytes) -> Result<Packet> {
    if datagram.len() < SHORT_HEADER_SIZE {
        return Err(BusError::Decode(format!(
            "datagram too short ({} bytes)",
            datagram.len()
        )));
    }

    match datagram.get_u32() {
        SHORT_MAGIC => {
            let seqno = datagram.get_u32();
            let channel = take_channel(&mut datagram)?;
            Ok(Packet::Short {
                seqno,
                channel,
                payload: datagram,
            })
        }
        FRAGMENT_MAGIC => {
            if datagram.len() < FRAGMENT_HEADER_SIZE - 4 {
                return Err(BusError::Decode("fragment header truncated".to_string()));
            }
            let header = FragmentHeader {
                seqno: datagram.get_u32(),
                message_size: datagram.get_u32(),
                offset: datagram.get_u32(),
                fragment_no: datagram.get_u16(),
                fragment_count: datagram.get_u16(),
            };
            let channel = if header.fragment_no == 0 {
                Some(take_channel(&mut datagram)?)
            } else {
                None
            };
            Ok(Packet::Fragment {
                header,
                channel,
                data: datagram,
            })
        }
        magic => Err(BusError::Decode(format!("unknown magic {magic:#010x}"))),
    }
}

fn take_channel(buf: &mut Bytes) -> Result<String> {
    let nul = buf
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| BusError::Decode("channel name not terminated".to_string()))?;
    let name = buf.split_to(nul);
    buf.advance(1);
    String::from_utf8(name.to_vec())
        .map_err(|_| BusError::Decode("channel name is not utf-8".to_string()))
}

/// Incomplete messages held at once, across all senders.
pub const MAX_PARTIAL_MESSAGES: usize = 1000;

/// Buffer bytes held at once for incomplete messages, across all senders.
pub const MAX_PARTIAL_BYTES: usize = 1 << 24;

struct PartialMessage {
    seqno: u32,
    channel: String,
    data: BytesMut,
    fragments_left: u16,
    started: u64,
}

/// Reassembles fragmented messages, one in flight per sender.
///
/// A new sequence number from a sender abandons that sender's partial message.
/// The store is bounded by message count and buffered bytes; starting a
/// message that would exceed either bound drops the oldest partial messages
/// first, and a message larger than the byte bound is never started.
pub struct Reassembler<K> {
    partial: HashMap<K, PartialMessage>,
    max_messages: usize,
    max_bytes: usize,
    held_bytes: usize,
    next_start: u64,
}

impl<K: Hash + Eq + Clone + std::fmt::Debug> Reassembler<K> {
    pub fn new() -> Self {
        Self::with_limits(MAX_PARTIAL_MESSAGES, MAX_PARTIAL_BYTES)
    }

    pub fn with_limits(max_messages: usize, max_bytes: usize) -> Self {
        Self {
            partial: HashMap::new(),
            max_messages: max_messages.max(1),
            max_bytes,
            held_bytes: 0,
            next_start: 0,
        }
    }

    /// Incomplete messages currently held.
    pub fn pending_messages(&self) -> usize {
        self.partial.len()
    }

    /// Buffer bytes currently held for incomplete messages.
    pub fn pending_bytes(&self) -> usize {
        self.held_bytes
    }

    /// Add a fragment; returns `(channel, payload)` once the message is complete.
    pub fn accept(
        &mut self,
        sender: K,
        header: FragmentHeader,
        channel: Option<String>,
        data: Bytes,
    ) -> Option<(String, Bytes)> {
        let size = header.message_size as usize;
        let offset = header.offset as usize;
        if size > MAX_MESSAGE_SIZE
            || header.fragment_no >= header.fragment_count
            || offset.checked_add(data.len()).is_none_or(|end| end > size)
        {
            debug!(?sender, ?header, "dropping out-of-bounds fragment");
            return None;
        }

        let stale = self
            .partial
            .get(&sender)
            .is_some_and(|p| p.seqno != header.seqno || p.data.len() != size);
        if stale {
            debug!(?sender, seqno = header.seqno, "abandoning incomplete message");
            self.remove(&sender);
        }

        if !self.partial.contains_key(&sender) {
            // Only fragment 0 names the channel, so a message must start there.
            let Some(channel) = channel else {
                debug!(?sender, ?header, "dropping fragment of unknown message");
                return None;
            };
            if size > self.max_bytes {
                debug!(?sender, size, max = self.max_bytes, "dropping oversized message");
                return None;
            }
            self.make_room(size);
            self.held_bytes += size;
            self.next_start += 1;
            self.partial.insert(
                sender.clone(),
                PartialMessage {
                    seqno: header.seqno,
                    channel,
                    data: BytesMut::zeroed(size),
                    fragments_left: header.fragment_count,
                    started: self.next_start,
                },
            );
        }

        let partial = self.partial.get_mut(&sender)?;
        partial.data[offset..offset + data.len()].copy_from_slice(&data);
        partial.fragments_left = partial.fragments_left.saturating_sub(1);
        if partial.fragments_left > 0 {
            return None;
        }

        self.remove(&sender).map(|p| (p.channel, p.data.freeze()))
    }

    /// Drop the oldest partial messages until one more of `size` bytes fits.
    fn make_room(&mut self, size: usize) {
        while self.partial.len() >= self.max_messages || self.held_bytes + size > self.max_bytes {
            let Some(oldest) = self
                .partial
                .iter()
                .min_by_key(|(_, p)| p.started)
                .map(|(sender, _)| sender.clone())
            else {
                break;
            };
            debug!(sender = ?oldest, "evicting oldest incomplete message");
            self.remove(&oldest);
        }
    }

    fn remove(&mut self, sender: &K) -> Option<PartialMessage> {
        let partial = self.partial.remove(sender)?;
        self.held_bytes -= partial.data.len();
        Some(partial)
    }
}

impl<K: Hash + Eq + Clone + std::fmt::Debug> Default for Reassembler<K> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reassemble(datagrams: Vec<Bytes>) -> Option<(String, Bytes)> {
        let mut reassembler = Reassembler::new();
        let mut out = None;
        for datagram in datagrams {
            match parse_packet(datagram).unwrap() {
                Packet::Fragment {
                    header,
                    channel,
                    data,
                } => {
                    out = reassembler.accept("peer", header, channel, data);
                }
                Packet::Short { .. } => panic!("expected fragments"),
            }
        }
        out
    }

    #[test]
    fn small_message_is_one_short_datagram() {
        let datagrams = encode_message("ttyUSB0o", 7, b"hello").unwrap();
        assert_eq!(datagrams.len(), 1);

        let d = &datagrams[0];
        assert_eq!(&d[0..4], b"LC02");
        assert_eq!(&d[4..8], &[0, 0, 0, 7]);
        assert_eq!(&d[8..17], b"ttyUSB0o\0");
        assert_eq!(&d[17..], b"hello");

        let packet = parse_packet(d.clone()).unwrap();
        assert_eq!(
            packet,
            Packet::Short {
                seqno: 7,
                channel: "ttyUSB0o".to_string(),
                payload: Bytes::from_static(b"hello"),
            }
        );
    }

    #[test]
    fn large_message_fragments_and_reassembles() {
        let payload: Vec<u8> = (0..5000).map(|i| (i % 256) as u8).collect();
        let datagrams = encode_message("big", 1, &payload).unwrap();

        assert_eq!(datagrams.len(), 4);
        assert!(datagrams
            .iter()
            .all(|d| d.len() <= FRAGMENT_HEADER_SIZE + FRAGMENT_MAX_PAYLOAD));
        assert_eq!(&datagrams[0][0..4], b"LC03");

        let (channel, data) = reassemble(datagrams).unwrap();
        assert_eq!(channel, "big");
        assert_eq!(data.as_ref(), payload.as_slice());
    }

    #[test]
    fn fragments_reassemble_out_of_order() {
        let payload = vec![0x5a; 4000];
        let mut datagrams = encode_message("ooo", 3, &payload).unwrap();
        let first = datagrams.remove(0);
        datagrams.reverse();
        datagrams.insert(0, first);

        let (_, data) = reassemble(datagrams).unwrap();
        assert_eq!(data.len(), 4000);
    }

    #[test]
    fn message_without_first_fragment_is_dropped() {
        let payload = vec![1u8; 3000];
        let mut datagrams = encode_message("lost", 9, &payload).unwrap();
        datagrams.remove(0);

        assert!(reassemble(datagrams).is_none());
    }

    #[test]
    fn new_seqno_abandons_partial() {
        let a = encode_message("c", 1, &vec![1u8; 3000]).unwrap();
        let b = encode_message("c", 2, &vec![2u8; 3000]).unwrap();

        let mut stream = vec![a[0].clone()];
        stream.extend(b.iter().cloned());
        stream.extend(a[1..].iter().cloned());

        let mut reassembler = Reassembler::new();
        let mut completed = Vec::new();
        for datagram in stream {
            if let Packet::Fragment {
                header,
                channel,
                data,
            } = parse_packet(datagram).unwrap()
            {
                if let Some(done) = reassembler.accept(1u8, header, channel, data) {
                    completed.push(done);
                }
            }
        }

        assert_eq!(completed.len(), 1);
        assert!(completed[0].1.iter().all(|&b| b == 2));
    }

    #[test]
    fn threshold_between_short_and_fragmented() {
        let channel = "t";
        let fits = SHORT_MESSAGE_MAX_SIZE - SHORT_HEADER_SIZE - channel.len() - 2;
        assert_eq!(encode_message(channel, 0, &vec![0; fits]).unwrap().len(), 1);
        let short = &encode_message(channel, 0, &vec![0; fits]).unwrap()[0];
        assert_eq!(&short[0..4], b"LC02");

        let fragmented = encode_message(channel, 0, &vec![0; fits + 1]).unwrap();
        assert_eq!(&fragmented[0][0..4], b"LC03");
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_packet(Bytes::from_static(b"xx")).is_err());
        assert!(parse_packet(Bytes::from_static(b"NOPE\0\0\0\0")).is_err());
        assert!(parse_packet(Bytes::from_static(b"LC02\0\0\0\x01nonul")).is_err());
    }

    #[test]
    fn rejects_invalid_channel() {
        assert!(encode_message("", 0, b"x").is_err());
        assert!(encode_message(&"c".repeat(64), 0, b"x").is_err());
    }

    /// Start a two-fragment message of `size` bytes without completing it.
    fn start(reassembler: &mut Reassembler<u32>, sender: u32, size: u32) {
        let header = FragmentHeader {
            seqno: 1,
            message_size: size,
            offset: 0,
            fragment_no: 0,
            fragment_count: 2,
        };
        let data = Bytes::from_static(b"x");
        assert!(reassembler
            .accept(sender, header, Some("c".to_string()), data)
            .is_none());
    }

    fn finish(
        reassembler: &mut Reassembler<u32>,
        sender: u32,
        size: u32,
    ) -> Option<(String, Bytes)> {
        let header = FragmentHeader {
            seqno: 1,
            message_size: size,
            offset: size - 1,
            fragment_no: 1,
            fragment_count: 2,
        };
        reassembler.accept(sender, header, None, Bytes::from_static(b"y"))
    }

    #[test]
    fn message_count_bound_evicts_oldest() {
        let mut reassembler = Reassembler::with_limits(3, 1 << 20);
        for sender in 0..10 {
            start(&mut reassembler, sender, 100);
            assert!(reassembler.pending_messages() <= 3);
        }
        assert_eq!(reassembler.pending_messages(), 3);
        assert_eq!(reassembler.pending_bytes(), 300);

        // Senders 0 through 6 were evicted; their second fragments go nowhere.
        assert!(finish(&mut reassembler, 0, 100).is_none());
        assert!(finish(&mut reassembler, 6, 100).is_none());

        let (channel, data) = finish(&mut reassembler, 9, 100).unwrap();
        assert_eq!(channel, "c");
        assert_eq!(data.len(), 100);
        assert_eq!(data[0], b'x');
        assert_eq!(data[99], b'y');
        assert_eq!(reassembler.pending_messages(), 2);
        assert_eq!(reassembler.pending_bytes(), 200);
    }

    #[test]
    fn byte_bound_evicts_oldest() {
        let mut reassembler = Reassembler::with_limits(100, 10_000);
        start(&mut reassembler, 1, 4000);
        start(&mut reassembler, 2, 4000);
        start(&mut reassembler, 3, 4000);

        assert_eq!(reassembler.pending_messages(), 2);
        assert_eq!(reassembler.pending_bytes(), 8000);
        assert!(finish(&mut reassembler, 1, 4000).is_none());
        assert!(finish(&mut reassembler, 2, 4000).is_some());
        assert!(finish(&mut reassembler, 3, 4000).is_some());
        assert_eq!(reassembler.pending_bytes(), 0);
    }

    #[test]
    fn spoofed_huge_fragments_stay_bounded() {
        let mut reassembler = Reassembler::new();
        for sender in 0..64 {
            start(&mut reassembler, sender, MAX_MESSAGE_SIZE as u32);
            start(&mut reassembler, 1000 + sender, (MAX_PARTIAL_BYTES / 4) as u32);
        }
        assert!(reassembler.pending_bytes() <= MAX_PARTIAL_BYTES);
        assert_eq!(reassembler.pending_messages(), 4);
    }

    #[test]
    fn abandoned_partial_releases_its_bytes() {
        let mut reassembler = Reassembler::new();
        start(&mut reassembler, 7, 3000);
        assert_eq!(reassembler.pending_bytes(), 3000);

        let header = FragmentHeader {
            seqno: 2,
            message_size: 500,
            offset: 0,
            fragment_no: 0,
            fragment_count: 2,
        };
        reassembler.accept(7, header, Some("c".to_string()), Bytes::from_static(b"z"));
        assert_eq!(reassembler.pending_messages(), 1);
        assert_eq!(reassembler.pending_bytes(), 500);
    }
}
