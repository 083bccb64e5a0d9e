//! Incremental decoding of live MIDI wire bytes
//!
//! Transports deliver bytes in whatever chunks the driver produced. A chunk
//! can stop in the middle of a note message or a sysex dump. The decoder
//! keeps the unfinished tail and completes it from the next chunk.

use smallvec::SmallVec;

use crate::message::{channel_data_len, status, Message, SystemRealtime};
use crate::traits::InputSource;
use crate::Result;

/// MIDI time code quarter frame, one data byte
const MTC_QUARTER_FRAME: u8 = 0xF1;

/// Size of the buffer [`StreamDecoder::pump`] reads into
const PUMP_CHUNK: usize = 256;

/// Default limit on a sysex body being assembled, `0xF0` and `0xF7` included
pub const DEFAULT_MAX_SYSEX_LEN: usize = 64 * 1024;

/// Stateful wire decoder
///
/// Handles channel running status, real-time bytes interleaved anywhere
/// (they are delivered at once and disturb nothing), sysex reassembly
/// across chunks and skipping of system common messages.
///
/// A sysex cut short by any status byte other than `0xF7` or a real-time
/// byte is dropped and the interrupting status is decoded normally. A sysex
/// growing past [`max_sysex_len`](Self::with_max_sysex_len) is dropped too,
/// and its remaining data bytes are discarded up to the next status byte.
///
/// # Examples
///
/// ```
/// use midiseq::{Message, StreamDecoder};
///
/// let mut decoder = StreamDecoder::new();
/// let mut out = Vec::new();
/// decoder.feed(&[0x90, 60], &mut out);
/// assert!(out.is_empty());
/// decoder.feed(&[100, 64, 100], &mut out);
/// assert_eq!(out, vec![Message::note_on(1, 60, 100), Message::note_on(1, 64, 100)]);
/// ```
#[derive(Debug)]
pub struct StreamDecoder {
    running_status: Option<u8>,
    /// Status and data bytes of the channel message being assembled
    pending: SmallVec<[u8; 3]>,
    /// Sysex body being assembled, leading `0xF0` included
    sysex: Option<Vec<u8>>,
    /// Data bytes of a system common message still to skip
    skip: usize,
    /// Data bytes of an oversized sysex are discarded until the next status
    discarding: bool,
    max_sysex_len: usize,
}

impl Default for StreamDecoder {
    fn default() -> Self {
        Self {
            running_status: None,
            pending: SmallVec::new(),
            sysex: None,
            skip: 0,
            discarding: false,
            max_sysex_len: DEFAULT_MAX_SYSEX_LEN,
        }
    }
}

impl StreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the longest sysex dump to reassemble, terminator included
    ///
    /// Longer dumps are dropped with a warning. Lengths below 2 are raised
    /// to 2, the size of an empty dump.
    pub fn with_max_sysex_len(mut self, len: usize) -> Self {
        self.max_sysex_len = len.max(2);
        self
    }

    /// Decode one chunk, appending every completed message to `out`
    pub fn feed(&mut self, bytes: &[u8], out: &mut Vec<Message>) {
        for &byte in bytes {
            self.push_byte(byte, out);
        }
    }

    /// Decode one chunk into a fresh vector
    pub fn decode(&mut self, bytes: &[u8]) -> Vec<Message> {
        let mut out = Vec::new();
        self.feed(bytes, &mut out);
        out
    }

    /// Read `source` until it is exhausted, decoding as bytes arrive
    ///
    /// Returns the number of messages appended to `out`. An incomplete
    /// message left at the end stays buffered in the decoder.
    pub fn pump<S: InputSource + ?Sized>(
        &mut self,
        source: &mut S,
        out: &mut Vec<Message>,
    ) -> Result<usize> {
        let before = out.len();
        let mut buf = [0u8; PUMP_CHUNK];
        loop {
            let n = source.read_chunk(&mut buf)?;
            if n == 0 {
                break;
            }
            self.feed(&buf[..n], out);
        }
        Ok(out.len() - before)
    }

    /// True when a message is partially assembled
    pub fn has_partial(&self) -> bool {
        !self.pending.is_empty() || self.sysex.is_some() || self.skip > 0
    }

    /// Forget running status and any partial message
    pub fn reset(&mut self) {
        *self = Self::default().with_max_sysex_len(self.max_sysex_len);
    }

    fn push_byte(&mut self, byte: u8, out: &mut Vec<Message>) {
        if byte >= status::TIMING_CLOCK {
            // Undefined real-time bytes and system reset are ignored
            if let Some(rt) = SystemRealtime::from_status(byte) {
                out.push(Message::Realtime(rt));
            }
            return;
        }

        if byte & 0x80 != 0 {
            self.push_status(byte, out);
        } else {
            self.push_data(byte, out);
        }
    }

    fn push_status(&mut self, byte: u8, out: &mut Vec<Message>) {
        self.discarding = false;
        if byte == status::END_OF_SYSEX {
            match self.sysex.take() {
                Some(mut body) => {
                    body.push(status::END_OF_SYSEX);
                    out.push(Message::Sysex(body));
                }
                None => log::debug!("stray end of sysex ignored"),
            }
            return;
        }

        if let Some(body) = self.sysex.take() {
            log::warn!(
                "sysex interrupted by status 0x{:02X}, dropping {} bytes",
                byte,
                body.len()
            );
        }
        if self.pending.len() > 1 {
            log::debug!(
                "incomplete message 0x{:02X} dropped by status 0x{:02X}",
                self.pending[0],
                byte
            );
        }
        self.pending.clear();
        self.skip = 0;

        match byte {
            0x80..=0xEF => {
                self.running_status = Some(byte);
                self.pending.push(byte);
            }
            status::SYSEX => {
                self.running_status = None;
                self.sysex = Some(vec![status::SYSEX]);
            }
            MTC_QUARTER_FRAME | status::SONG_SELECT => {
                self.running_status = None;
                self.skip = 1;
            }
            status::SONG_POSITION => {
                self.running_status = None;
                self.skip = 2;
            }
            _ => self.running_status = None,
        }
    }

    fn push_data(&mut self, byte: u8, out: &mut Vec<Message>) {
        if self.discarding {
            return;
        }
        if let Some(body) = self.sysex.as_mut() {
            // Room must remain for the terminator
            if body.len() + 1 >= self.max_sysex_len {
                log::warn!(
                    "sysex longer than {} bytes, dropping {} bytes",
                    self.max_sysex_len,
                    body.len() + 1
                );
                self.sysex = None;
                self.discarding = true;
                return;
            }
            body.push(byte);
            return;
        }
        if self.skip > 0 {
            self.skip -= 1;
            return;
        }

        if self.pending.is_empty() {
            match self.running_status {
                Some(running) => self.pending.push(running),
                None => {
                    log::debug!("data byte 0x{:02X} with no running status ignored", byte);
                    return;
                }
            }
        }
        self.pending.push(byte);

        let status_byte = self.pending[0];
        if self.pending.len() == 1 + channel_data_len(status_byte) {
            let d2 = self.pending.get(2).copied().unwrap_or(0);
            out.push(Message::from_channel_parts(status_byte, self.pending[1], d2));
            self.pending.clear();
        }
    }
}
