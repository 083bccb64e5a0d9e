//! Standard MIDI File decoding

use std::io::Read;
use std::path::Path;

use super::cursor::ByteReader;
use super::{FILE_MARKER, HEADER_LENGTH, TRACK_MARKER};
use crate::event::{Event, Format, Sequence, Timing, Track};
use crate::message::{channel_data_len, meta_type, status, Message, MetaMessage, TextKind};
use crate::{Error, Result};

/// Decode a complete SMF image
///
/// # Errors
///
/// [`Error::Format`] for any structural problem: bad chunk markers, a header
/// length other than 6, a track whose events do not exactly fill its declared
/// length, a sysex without its `0xF7` terminator, an unknown meta type, or a
/// status byte that has no meaning inside a file. Nothing is salvaged from a
/// malformed file.
///
/// # Examples
///
/// ```
/// let bytes = [
///     b'M', b'T', b'h', b'd', 0, 0, 0, 6, 0, 1, 0, 1, 0x01, 0xE0,
///     b'M', b'T', b'r', b'k', 0, 0, 0, 4, 0x00, 0xFF, 0x2F, 0x00,
/// ];
/// let seq = midiseq::smf::read(&bytes)?;
/// assert_eq!(seq.ppqn(), Some(480));
/// assert_eq!(seq.tracks.len(), 1);
/// # Ok::<(), midiseq::Error>(())
/// ```
pub fn read(data: &[u8]) -> Result<Sequence> {
    let mut cursor = ByteReader::new(data);

    let (format, track_count, timing) = read_header(&mut cursor)?;
    log::debug!(
        "SMF header: format {}, {} tracks, {:?}",
        format.as_u16(),
        track_count,
        timing
    );

    let mut sequence = Sequence::with_header(format, timing);
    sequence.tracks.reserve(usize::from(track_count));
    for index in 0..usize::from(track_count) {
        let track = read_track(&mut cursor, index)?;
        sequence.tracks.push(track);
    }

    if !cursor.is_empty() {
        log::debug!(
            "ignoring {} trailing bytes after the last track",
            cursor.remaining()
        );
    }
    Ok(sequence)
}

/// Read everything from `reader` and decode it
pub fn read_from<R: Read>(mut reader: R) -> Result<Sequence> {
    let mut data = Vec::new();
    reader.read_to_end(&mut data)?;
    read(&data)
}

/// Load and decode a `.mid` file
pub fn read_file(path: impl AsRef<Path>) -> Result<Sequence> {
    let path = path.as_ref();
    let data = std::fs::read(path)?;
    log::debug!("read {} bytes from {}", data.len(), path.display());
    read(&data)
}

fn read_header(cursor: &mut ByteReader<'_>) -> Result<(Format, u16, Timing)> {
    expect_marker(cursor, FILE_MARKER)?;

    let length = cursor.read_u32()?;
    if length != HEADER_LENGTH {
        return Err(Error::format(format!(
            "invalid header length, expected {} found {}",
            HEADER_LENGTH, length
        )));
    }

    let raw_format = cursor.read_u16()?;
    let format = Format::from_u16(raw_format)
        .ok_or_else(|| Error::format(format!("unknown SMF format {}", raw_format)))?;
    let track_count = cursor.read_u16()?;
    let timing = Timing::from_division(cursor.read_u16()?);

    Ok((format, track_count, timing))
}

fn read_track(cursor: &mut ByteReader<'_>, index: usize) -> Result<Track> {
    expect_marker(cursor, TRACK_MARKER).map_err(|e| in_track(e, index))?;

    let length = cursor.read_u32().map_err(|e| in_track(e, index))? as usize;
    if cursor.remaining() < length {
        return Err(Error::format(format!(
            "track {}: declares {} bytes but only {} remain",
            index,
            length,
            cursor.remaining()
        )));
    }
    let body = cursor.read_bytes(length)?;

    // Byte accounting: events are decoded until the declared body is used up
    // exactly. An event running past the end surfaces as an end-of-data
    // error from the body cursor.
    let mut body = ByteReader::new(body);
    let mut state = TrackState::default();
    let mut track = Track::new();
    while !body.is_empty() {
        let event = state
            .read_event(&mut body, index)
            .map_err(|e| in_track(e, index))?;
        track.push(event);
    }

    log::debug!(
        "track {}: {} events in {} bytes",
        index,
        track.len(),
        length
    );
    Ok(track)
}

/// Decoder-local state for one track chunk
#[derive(Debug, Default)]
struct TrackState {
    tick: u32,
    /// Last channel status byte seen in this track
    running_status: Option<u8>,
}

impl TrackState {
    fn read_event(&mut self, cursor: &mut ByteReader<'_>, track: usize) -> Result<Event> {
        let offset = cursor.position();
        let delta = cursor.read_vlq()?;
        self.tick = self.tick.checked_add(delta).ok_or_else(|| {
            Error::format(format!("absolute tick overflows at body offset {}", offset))
        })?;
        let message = self.read_message(cursor)?;
        Ok(Event::with_delta(message, track, self.tick, delta))
    }

    fn read_message(&mut self, cursor: &mut ByteReader<'_>) -> Result<Message> {
        let offset = cursor.position();
        let first = cursor.read_u8()?;

        // A byte with the high bit clear is the first data byte of a channel
        // message reusing the previous status
        let (status_byte, first_data) = if first & 0x80 != 0 {
            (first, None)
        } else {
            let running = self.running_status.ok_or_else(|| {
                Error::format(format!(
                    "data byte 0x{:02X} at body offset {} with no running status",
                    first, offset
                ))
            })?;
            (running, Some(first))
        };

        match status_byte {
            0x80..=0xEF => {
                self.running_status = Some(status_byte);
                let d1 = match first_data {
                    Some(d1) => d1,
                    None => read_data_byte(cursor)?,
                };
                let d2 = if channel_data_len(status_byte) == 2 {
                    read_data_byte(cursor)?
                } else {
                    0
                };
                Ok(Message::from_channel_parts(status_byte, d1, d2))
            }
            status::SYSEX => read_sysex(cursor),
            status::META => read_meta(cursor).map(Message::Meta),
            status::END_OF_SYSEX => Err(Error::format(format!(
                "sysex continuation event at body offset {} is not supported",
                offset
            ))),
            other => Err(Error::format(format!(
                "status byte 0x{:02X} at body offset {} is not allowed in a file",
                other, offset
            ))),
        }
    }
}

fn read_data_byte(cursor: &mut ByteReader<'_>) -> Result<u8> {
    let offset = cursor.position();
    let byte = cursor.read_u8()?;
    if byte & 0x80 != 0 {
        return Err(Error::format(format!(
            "expected a data byte at body offset {}, found status 0x{:02X}",
            offset, byte
        )));
    }
    Ok(byte)
}

/// Sysex after its `0xF0`: VLQ length, then a payload ending in `0xF7`
fn read_sysex(cursor: &mut ByteReader<'_>) -> Result<Message> {
    let length = cursor.read_vlq()? as usize;
    let payload = cursor.read_bytes(length)?;

    match payload.last() {
        Some(&status::END_OF_SYSEX) => {}
        Some(&last) => {
            return Err(Error::format(format!(
                "sysex of length {} ends with 0x{:02X} instead of 0xF7",
                length, last
            )));
        }
        None => return Err(Error::format("empty sysex without 0xF7 terminator")),
    }

    let mut body = Vec::with_capacity(length + 1);
    body.push(status::SYSEX);
    body.extend_from_slice(payload);
    Ok(Message::Sysex(body))
}

/// Meta event after its `0xFF`: type byte, VLQ length, payload
fn read_meta(cursor: &mut ByteReader<'_>) -> Result<MetaMessage> {
    let kind = cursor.read_u8()?;
    let length = cursor.read_vlq()? as usize;

    if let Some(text_kind) = TextKind::from_type_byte(kind) {
        return Ok(MetaMessage::Text {
            kind: text_kind,
            text: cursor.read_string(length)?,
        });
    }
    let payload = cursor.read_bytes(length)?;

    let meta = match kind {
        meta_type::SEQUENCE_NUMBER => {
            expect_len(kind, payload, 2)?;
            MetaMessage::SequenceNumber(u16::from_be_bytes([payload[0], payload[1]]))
        }
        meta_type::CHANNEL_PREFIX => {
            expect_len(kind, payload, 1)?;
            MetaMessage::ChannelPrefix(payload[0])
        }
        meta_type::MIDI_PORT => {
            expect_len(kind, payload, 1)?;
            MetaMessage::MidiPort(payload[0])
        }
        meta_type::END_OF_TRACK => {
            expect_len(kind, payload, 0)?;
            MetaMessage::EndOfTrack
        }
        meta_type::TEMPO => {
            expect_len(kind, payload, 3)?;
            MetaMessage::Tempo(ByteReader::new(payload).read_u24()?)
        }
        meta_type::SMPTE_OFFSET => {
            expect_len(kind, payload, 5)?;
            MetaMessage::SmpteOffset {
                hours: payload[0],
                minutes: payload[1],
                seconds: payload[2],
                frames: payload[3],
                subframes: payload[4],
            }
        }
        meta_type::TIME_SIGNATURE => {
            expect_len(kind, payload, 4)?;
            MetaMessage::TimeSignature {
                numerator: payload[0],
                denominator: payload[1],
                clocks_per_click: payload[2],
                thirty_seconds_per_quarter: payload[3],
            }
        }
        meta_type::KEY_SIGNATURE => {
            expect_len(kind, payload, 2)?;
            MetaMessage::KeySignature {
                sharps_flats: payload[0] as i8,
                minor: payload[1] != 0,
            }
        }
        meta_type::SEQUENCER_SPECIFIC => MetaMessage::SequencerSpecific(payload.to_vec()),
        other => {
            return Err(Error::format(format!(
                "unknown or unsupported meta event type 0x{:02X}",
                other
            )));
        }
    };
    Ok(meta)
}

fn expect_len(kind: u8, payload: &[u8], expected: usize) -> Result<()> {
    if payload.len() != expected {
        return Err(Error::format(format!(
            "meta event 0x{:02X} has length {}, expected {}",
            kind,
            payload.len(),
            expected
        )));
    }
    Ok(())
}

fn expect_marker(cursor: &mut ByteReader<'_>, marker: &[u8; 4]) -> Result<()> {
    let found = cursor.read_bytes(4)?;
    if found != marker {
        return Err(Error::format(format!(
            "invalid marker, expected {} found {}",
            String::from_utf8_lossy(marker),
            found.escape_ascii()
        )));
    }
    Ok(())
}

fn in_track(err: Error, index: usize) -> Error {
    match err {
        Error::Format(msg) => Error::Format(format!("track {}: {}", index, msg)),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file_with_track(body: &[u8]) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(b"MThd");
        data.extend_from_slice(&[0, 0, 0, 6, 0, 1, 0, 1, 0x01, 0xE0]);
        data.extend_from_slice(b"MTrk");
        data.extend_from_slice(&(body.len() as u32).to_be_bytes());
        data.extend_from_slice(body);
        data
    }

    fn single_track(body: &[u8]) -> Result<Track> {
        let mut seq = read(&file_with_track(body))?;
        Ok(seq.tracks.remove(0))
    }

    #[test]
    fn test_header_fields() {
        let seq = read(&file_with_track(&[0x00, 0xFF, 0x2F, 0x00])).unwrap();
        assert_eq!(seq.format, Format::MultiTrack);
        assert_eq!(seq.timing, Timing::Ppqn(480));
        assert_eq!(seq.tracks.len(), 1);
        assert_eq!(seq.tracks[0].len(), 1);
    }

    #[test]
    fn test_smpte_division() {
        let mut data = file_with_track(&[0x00, 0xFF, 0x2F, 0x00]);
        data[12] = 0xE7;
        data[13] = 0x28;
        let seq = read(&data).unwrap();
        assert_eq!(seq.timing, Timing::Smpte(0x6728));
        assert_eq!(seq.ppqn(), None);
    }

    #[test]
    fn test_bad_file_marker() {
        let mut data = file_with_track(&[0x00, 0xFF, 0x2F, 0x00]);
        data[0] = b'X';
        let err = read(&data).unwrap_err();
        assert!(err.is_format());
        assert!(err.to_string().contains("MThd"));
    }

    #[test]
    fn test_bad_header_length() {
        let mut data = file_with_track(&[0x00, 0xFF, 0x2F, 0x00]);
        data[7] = 7;
        assert!(read(&data).unwrap_err().is_format());
    }

    #[test]
    fn test_bad_track_marker() {
        let mut data = file_with_track(&[0x00, 0xFF, 0x2F, 0x00]);
        data[14..18].copy_from_slice(b"MTrx");
        let err = read(&data).unwrap_err();
        assert!(err.is_format());
        assert!(err.to_string().starts_with("Invalid MIDI data: track 0:"));
    }

    #[test]
    fn test_missing_track() {
        let mut data = file_with_track(&[0x00, 0xFF, 0x2F, 0x00]);
        data[11] = 2; // declares two tracks
        assert!(read(&data).unwrap_err().is_format());
    }

    #[test]
    fn test_running_status() {
        // Note on, then two more notes reusing the 0x91 status
        let track = single_track(&[
            0x00, 0x91, 60, 100, //
            0x10, 64, 90, //
            0x10, 67, 80, //
            0x00, 0xFF, 0x2F, 0x00,
        ])
        .unwrap();
        let notes: Vec<_> = track.iter().take(3).map(|e| (e.tick, e.message.clone())).collect();
        assert_eq!(
            notes,
            vec![
                (0, Message::note_on(2, 60, 100)),
                (16, Message::note_on(2, 64, 90)),
                (32, Message::note_on(2, 67, 80)),
            ]
        );
        assert_eq!(track.events()[2].delta, Some(16));
    }

    #[test]
    fn test_running_status_one_data_byte() {
        let track = single_track(&[
            0x00, 0xC0, 5, //
            0x00, 6, //
            0x00, 0xFF, 0x2F, 0x00,
        ])
        .unwrap();
        assert_eq!(track.events()[1].message, Message::program_change(1, 6));
    }

    #[test]
    fn test_data_byte_without_running_status() {
        let err = single_track(&[0x00, 60, 100, 0x00, 0xFF, 0x2F, 0x00]).unwrap_err();
        assert!(err.is_format());
    }

    #[test]
    fn test_running_status_survives_meta() {
        let track = single_track(&[
            0x00, 0x90, 60, 100, //
            0x00, 0xFF, 0x06, 0x01, b'A', //
            0x60, 60, 0, //
            0x00, 0xFF, 0x2F, 0x00,
        ])
        .unwrap();
        assert_eq!(track.events()[2].message, Message::note_on(1, 60, 0));
        assert_eq!(track.events()[2].tick, 0x60);
    }

    #[test]
    fn test_sysex() {
        let track = single_track(&[
            0x00, 0xF0, 0x05, 0x7E, 0x7F, 0x09, 0x01, 0xF7, //
            0x00, 0xFF, 0x2F, 0x00,
        ])
        .unwrap();
        assert_eq!(
            track.events()[0].message,
            Message::Sysex(vec![0xF0, 0x7E, 0x7F, 0x09, 0x01, 0xF7])
        );
    }

    #[test]
    fn test_sysex_missing_terminator() {
        let err = single_track(&[
            0x00, 0xF0, 0x04, 0x7E, 0x7F, 0x09, 0x01, //
            0x00, 0xFF, 0x2F, 0x00,
        ])
        .unwrap_err();
        assert!(err.is_format());
        assert!(err.to_string().contains("0xF7"));
    }

    #[test]
    fn test_meta_messages() {
        let track = single_track(&[
            0x00, 0xFF, 0x00, 0x02, 0x00, 0x07, // sequence number 7
            0x00, 0xFF, 0x03, 0x05, b'P', b'i', b'a', b'n', b'o', //
            0x00, 0xFF, 0x20, 0x01, 0x09, // channel prefix
            0x00, 0xFF, 0x21, 0x01, 0x02, // port
            0x00, 0xFF, 0x51, 0x03, 0x07, 0xA1, 0x20, // 500000
            0x00, 0xFF, 0x54, 0x05, 1, 2, 3, 4, 5, //
            0x00, 0xFF, 0x58, 0x04, 6, 3, 36, 8, // 6/8
            0x00, 0xFF, 0x59, 0x02, 0xFD, 0x01, // 3 flats, minor
            0x00, 0xFF, 0x7F, 0x03, 0x00, 0x00, 0x41, //
            0x00, 0xFF, 0x2F, 0x00,
        ])
        .unwrap();

        let metas: Vec<_> = track
            .iter()
            .map(|e| match &e.message {
                Message::Meta(meta) => meta.clone(),
                _ => panic!("Expected meta message"),
            })
            .collect();
        assert_eq!(
            metas,
            vec![
                MetaMessage::SequenceNumber(7),
                MetaMessage::Text {
                    kind: TextKind::TrackName,
                    text: "Piano".to_string()
                },
                MetaMessage::ChannelPrefix(9),
                MetaMessage::MidiPort(2),
                MetaMessage::Tempo(500_000),
                MetaMessage::SmpteOffset {
                    hours: 1,
                    minutes: 2,
                    seconds: 3,
                    frames: 4,
                    subframes: 5
                },
                MetaMessage::TimeSignature {
                    numerator: 6,
                    denominator: 3,
                    clocks_per_click: 36,
                    thirty_seconds_per_quarter: 8
                },
                MetaMessage::KeySignature {
                    sharps_flats: -3,
                    minor: true
                },
                MetaMessage::SequencerSpecific(vec![0x00, 0x00, 0x41]),
                MetaMessage::EndOfTrack,
            ]
        );
    }

    #[test]
    fn test_text_meta_invalid_utf8_replaced() {
        let track = single_track(&[
            0x00, 0xFF, 0x05, 0x03, b'l', 0xFF, b'a', // lyric with a stray byte
            0x00, 0xFF, 0x2F, 0x00,
        ])
        .unwrap();
        match &track.events()[0].message {
            Message::Meta(MetaMessage::Text { kind, text }) => {
                assert_eq!(*kind, TextKind::Lyric);
                assert_eq!(text, "l\u{FFFD}a");
            }
            _ => panic!("Expected text meta"),
        }
    }

    #[test]
    fn test_text_meta_overruns_chunk() {
        let err = single_track(&[0x00, 0xFF, 0x01, 0x09, b'h', b'i']).unwrap_err();
        assert!(err.is_format());
    }

    #[test]
    fn test_unknown_meta_type() {
        let err = single_track(&[0x00, 0xFF, 0x60, 0x00, 0x00, 0xFF, 0x2F, 0x00]).unwrap_err();
        assert!(err.is_format());
    }

    #[test]
    fn test_meta_wrong_length() {
        let err = single_track(&[0x00, 0xFF, 0x51, 0x02, 0x07, 0xA1, 0x00, 0xFF, 0x2F, 0x00])
            .unwrap_err();
        assert!(err.is_format());
    }

    #[test]
    fn test_event_overruns_chunk() {
        // The note's velocity byte lies outside the declared 3-byte body
        let mut data = file_with_track(&[0x00, 0x90, 60]);
        data.push(100);
        assert!(read(&data).unwrap_err().is_format());
    }

    #[test]
    fn test_chunk_longer_than_file() {
        let mut data = file_with_track(&[0x00, 0xFF, 0x2F, 0x00]);
        data[21] = 40;
        assert!(read(&data).unwrap_err().is_format());
    }

    #[test]
    fn test_realtime_in_file_rejected() {
        let err = single_track(&[0x00, 0xF8, 0x00, 0xFF, 0x2F, 0x00]).unwrap_err();
        assert!(err.is_format());
    }

    #[test]
    fn test_pitch_bend_decoding() {
        let track = single_track(&[0x00, 0xE3, 0x00, 0x60, 0x00, 0xFF, 0x2F, 0x00]).unwrap();
        assert_eq!(
            track.events()[0].message,
            Message::PitchBend {
                channel: 4,
                value: 0x3000 - 0x2000
            }
        );
    }
}
