use bytes::{BufMut, BytesMut};
use tracing::trace;

use crate::codec::{now_micros, Frame, FrameEnd, FramingConfig};

/// Where the decoder is in the byte stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    /// Discarding bytes until the initiator shows up.
    SeekingInitiator,
    /// Appending bytes until a terminator or the length limit.
    Accumulating,
}

/// Incremental byte-stream-to-frame state machine.
///
/// Feed bytes in arrival order; a frame comes back whenever one completes.
/// The accumulation buffer never exceeds the configured maximum length.
#[derive(Debug)]
pub struct FrameDecoder {
    config: FramingConfig,
    buf: BytesMut,
    mode: SearchMode,
    first_utime: i64,
}

impl FrameDecoder {
    pub fn new(config: FramingConfig) -> Self {
        Self {
            buf: BytesMut::with_capacity(config.max_frame_length()),
            mode: Self::initial_mode(&config),
            config,
            first_utime: 0,
        }
    }

    fn initial_mode(config: &FramingConfig) -> SearchMode {
        if config.seeks_initiator() {
            SearchMode::SeekingInitiator
        } else {
            SearchMode::Accumulating
        }
    }

    /// Feed one byte, stamping a new frame with the current wall clock.
    pub fn feed(&mut self, byte: u8) -> Option<Frame> {
        self.feed_at(byte, now_micros())
    }

    /// Feed one byte captured at `utime` (microseconds since the epoch).
    ///
    /// A frame's timestamp is the capture time of its first byte.
    pub fn feed_at(&mut self, byte: u8, utime: i64) -> Option<Frame> {
        if self.mode == SearchMode::SeekingInitiator {
            if byte != self.config.initiator() {
                trace!(byte, "discarding byte before initiator");
                return None;
            }
            self.mode = SearchMode::Accumulating;
        }

        if self.buf.is_empty() {
            self.first_utime = utime;
        }
        self.buf.put_u8(byte);

        if byte == self.config.terminator() {
            let frame = self.emit(FrameEnd::Terminator);
            if self.config.seeks_initiator() {
                self.mode = SearchMode::SeekingInitiator;
            }
            return Some(frame);
        }

        if self.buf.len() >= self.config.max_frame_length() {
            // Partial emission; framing carries on in Accumulating.
            return Some(self.emit(FrameEnd::Overflow));
        }

        None
    }

    /// Feed a whole burst captured at `utime`, collecting completed frames in order.
    pub fn feed_slice(&mut self, bytes: &[u8], utime: i64) -> Vec<Frame> {
        bytes
            .iter()
            .filter_map(|&byte| self.feed_at(byte, utime))
            .collect()
    }

    fn emit(&mut self, end: FrameEnd) -> Frame {
        let payload = self.buf.split().freeze();
        Frame {
            utime: self.first_utime,
            payload,
            end,
        }
    }

    /// Drop any buffered bytes and return to the initial search mode.
    pub fn reset(&mut self) {
        self.buf.clear();
        self.mode = Self::initial_mode(&self.config);
    }

    /// Bytes accumulated since the last emission.
    pub fn pending(&self) -> &[u8] {
        &self.buf
    }

    pub fn mode(&self) -> SearchMode {
        self.mode
    }

    pub fn config(&self) -> &FramingConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(decoder: &mut FrameDecoder, bytes: &[u8]) -> Vec<Frame> {
        bytes
            .iter()
            .enumerate()
            .filter_map(|(i, &b)| decoder.feed_at(b, i as i64))
            .collect()
    }

    fn payloads(frames: &[Frame]) -> Vec<Vec<u8>> {
        frames.iter().map(|f| f.payload.to_vec()).collect()
    }

    #[test]
    fn newline_delimited_single_frame() {
        let cfg = FramingConfig::new(0x0a, 0x0a, 4096).unwrap();
        let mut decoder = FrameDecoder::new(cfg);

        let frames = decode_all(&mut decoder, &[0x41, 0x42, 0x0a]);

        assert_eq!(payloads(&frames), vec![vec![0x41, 0x42, 0x0a]]);
        assert_eq!(frames[0].len(), 3);
        assert_eq!(frames[0].end, FrameEnd::Terminator);
        assert!(decoder.pending().is_empty());
    }

    #[test]
    fn leading_garbage_discarded_before_initiator() {
        let cfg = FramingConfig::new(0x02, 0x0a, 4096).unwrap();
        let mut decoder = FrameDecoder::new(cfg);

        let frames = decode_all(&mut decoder, &[0xff, 0x02, 0x48, 0x49, 0x0a]);

        assert_eq!(payloads(&frames), vec![vec![0x02, 0x48, 0x49, 0x0a]]);
        assert_eq!(decoder.mode(), SearchMode::SeekingInitiator);
    }

    #[test]
    fn overflow_then_terminator() {
        let cfg = FramingConfig::delimited(0x0a, 4).unwrap();
        let mut decoder = FrameDecoder::new(cfg);

        let frames = decode_all(&mut decoder, &[0x01, 0x02, 0x03, 0x04, 0x05, 0x0a]);

        assert_eq!(
            payloads(&frames),
            vec![vec![0x01, 0x02, 0x03, 0x04], vec![0x05, 0x0a]]
        );
        assert_eq!(frames[0].end, FrameEnd::Overflow);
        assert_eq!(frames[1].end, FrameEnd::Terminator);
    }

    #[test]
    fn terminator_on_length_limit_emits_once() {
        let cfg = FramingConfig::delimited(0x0a, 3).unwrap();
        let mut decoder = FrameDecoder::new(cfg);

        let frames = decode_all(&mut decoder, &[0x01, 0x02, 0x0a, 0x03]);

        assert_eq!(payloads(&frames), vec![vec![0x01, 0x02, 0x0a]]);
        assert_eq!(frames[0].end, FrameEnd::Terminator);
        assert_eq!(decoder.pending(), &[0x03]);
    }

    #[test]
    fn overflow_keeps_accumulating_without_initiator() {
        let cfg = FramingConfig::new(0x02, 0x03, 2).unwrap();
        let mut decoder = FrameDecoder::new(cfg);

        // 0x11 after the overflow must not be discarded: still Accumulating.
        let frames = decode_all(&mut decoder, &[0x02, 0x10, 0x11, 0x03, 0x12]);

        assert_eq!(payloads(&frames), vec![vec![0x02, 0x10], vec![0x11, 0x03]]);
        assert_eq!(decoder.mode(), SearchMode::SeekingInitiator);
        assert!(decoder.pending().is_empty());
    }

    #[test]
    fn single_byte_limit_emits_initiator_alone() {
        let cfg = FramingConfig::new(0x02, 0x03, 1).unwrap();
        let mut decoder = FrameDecoder::new(cfg);

        let frames = decode_all(&mut decoder, &[0x02, 0x05, 0x03]);

        assert_eq!(payloads(&frames), vec![vec![0x02], vec![0x05], vec![0x03]]);
        assert_eq!(frames[0].end, FrameEnd::Overflow);
        assert_eq!(frames[2].end, FrameEnd::Terminator);
    }

    #[test]
    fn timestamp_is_first_byte_capture_time() {
        let cfg = FramingConfig::default();
        let mut decoder = FrameDecoder::new(cfg);

        assert!(decoder.feed_at(b'a', 100).is_none());
        assert!(decoder.feed_at(b'b', 200).is_none());
        let frame = decoder.feed_at(b'\n', 300).unwrap();
        assert_eq!(frame.utime, 100);

        let next = decoder.feed_at(b'\n', 400).unwrap();
        assert_eq!(next.utime, 400);
    }

    #[test]
    fn round_trip_of_complete_frames() {
        for &(initiator, terminator) in &[(0x0a, 0x0a), (0x7e, 0x0d)] {
            let cfg = FramingConfig::new(initiator, terminator, 64).unwrap();
            let mut decoder = FrameDecoder::new(cfg);

            let mut originals = Vec::new();
            for n in 0..40usize {
                let mut frame = Vec::new();
                if initiator != terminator {
                    frame.push(initiator);
                }
                // Body avoids framing bytes; lengths cycle through 0..=62.
                let body_len = (n * 7) % 63;
                frame.extend((0..body_len).map(|i| 0x20 + ((i + n) % 64) as u8));
                frame.push(terminator);
                assert!(frame.len() <= 64);
                originals.push(frame);
            }

            let stream: Vec<u8> = originals.concat();
            let frames = decode_all(&mut decoder, &stream);

            assert_eq!(frames.len(), originals.len());
            assert_eq!(payloads(&frames), originals);
        }
    }

    #[test]
    fn overflow_reconstructs_long_runs() {
        for max in [1usize, 3, 4, 7, 16] {
            for len in [5usize, 16, 17, 33, 100] {
                if len <= max {
                    continue;
                }
                let cfg = FramingConfig::delimited(0x0a, max).unwrap();
                let mut decoder = FrameDecoder::new(cfg);
                let run: Vec<u8> = (0..len).map(|i| (i % 200) as u8 + 0x20).collect();

                let mut frames = decode_all(&mut decoder, &run);
                assert_eq!(frames.len(), len / max, "max={max} len={len}");
                assert!(frames.iter().all(|f| f.len() == max && f.is_overflow()));

                // Whatever did not fill a frame is still held, in order.
                assert_eq!(decoder.pending().len(), len % max, "max={max} len={len}");
                let mut rebuilt: Vec<u8> = frames.iter().flat_map(|f| f.payload.to_vec()).collect();
                rebuilt.extend_from_slice(decoder.pending());
                assert_eq!(rebuilt, run);

                // A terminator closes the remainder as an ordinary frame.
                if let Some(tail) = decoder.feed_at(0x0a, 0) {
                    assert!(!tail.is_overflow());
                    assert_eq!(tail.len(), len % max + 1);
                    frames.push(tail);
                }
                assert_eq!(frames.len(), len / max + 1, "max={max} len={len}");
            }
        }
    }

    #[test]
    fn delimiter_mode_never_discards() {
        let cfg = FramingConfig::delimited(b';', 5).unwrap();
        let mut decoder = FrameDecoder::new(cfg);
        let stream = b"garbage;x;;longer-than-five;tail;";

        let frames = decode_all(&mut decoder, stream);
        let rebuilt: Vec<u8> = frames.iter().flat_map(|f| f.payload.to_vec()).collect();

        assert_eq!(rebuilt, stream.to_vec());
        assert_eq!(decoder.mode(), SearchMode::Accumulating);
    }

    #[test]
    fn bytes_before_initiator_never_emitted() {
        let cfg = FramingConfig::new(b'$', b'\n', 32).unwrap();
        let mut decoder = FrameDecoder::new(cfg);
        let stream = b"noise$GPGGA,1\nmore noise\n$GPRMC,2\n";

        let frames = decode_all(&mut decoder, stream);

        assert_eq!(
            payloads(&frames),
            vec![b"$GPGGA,1\n".to_vec(), b"$GPRMC,2\n".to_vec()]
        );
        assert!(frames.iter().all(|f| f.payload[0] == b'$'));
    }

    #[test]
    fn feed_slice_preserves_order() {
        let mut decoder = FrameDecoder::new(FramingConfig::default());

        let frames = decoder.feed_slice(b"one\ntwo\nthr", 7);

        assert_eq!(payloads(&frames), vec![b"one\n".to_vec(), b"two\n".to_vec()]);
        assert!(frames.iter().all(|f| f.utime == 7));
        assert_eq!(decoder.pending(), b"thr");
    }

    #[test]
    fn reset_drops_partial_frame() {
        let cfg = FramingConfig::new(0x02, 0x03, 16).unwrap();
        let mut decoder = FrameDecoder::new(cfg);

        assert!(decoder.feed(0x02).is_none());
        assert!(decoder.feed(0x41).is_none());
        assert_eq!(decoder.mode(), SearchMode::Accumulating);

        decoder.reset();

        assert!(decoder.pending().is_empty());
        assert_eq!(decoder.mode(), SearchMode::SeekingInitiator);
        assert!(decoder.feed(0x03).is_none());
    }
}
