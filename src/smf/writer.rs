//! Standard MIDI File encoding

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use super::cursor::{payload_len, ByteWriter};
use super::{FILE_MARKER, HEADER_LENGTH, TRACK_MARKER};
use crate::event::{check_ordered, Event, Sequence, Track};
use crate::message::{status, validate_sysex, Message, MetaMessage};
use crate::{Error, Result};

/// Encode a sequence into a complete SMF image
///
/// Delta times are derived from the events' absolute ticks. The stored
/// `delta` fields are not consulted.
///
/// # Errors
///
/// [`Error::Argument`] when a track is not ordered by tick, a message cannot
/// appear in a file (real-time), a field is out of range, or a sysex body
/// byte has its high bit set. Nothing useful is left in the output on error.
pub fn write(sequence: &Sequence) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    write_to(sequence, &mut buf)?;
    Ok(buf)
}

/// Encode a sequence into any [`Write`] sink
pub fn write_to<W: Write>(sequence: &Sequence, sink: W) -> Result<()> {
    let mut writer = ByteWriter::new(sink);

    let track_count = u16::try_from(sequence.tracks.len()).map_err(|_| {
        Error::argument(format!(
            "{} tracks do not fit in an SMF header",
            sequence.tracks.len()
        ))
    })?;

    writer.write_bytes(FILE_MARKER)?;
    writer.write_u32(HEADER_LENGTH)?;
    writer.write_u16(sequence.format.as_u16())?;
    writer.write_u16(track_count)?;
    writer.write_u16(sequence.timing.to_division()?)?;

    for (index, track) in sequence.tracks.iter().enumerate() {
        write_track(&mut writer, track, index)?;
    }
    Ok(())
}

/// Encode a sequence into a `.mid` file, replacing any existing file
pub fn write_file(sequence: &Sequence, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let mut sink = BufWriter::new(File::create(path)?);
    write_to(sequence, &mut sink)?;
    sink.flush()?;
    log::debug!("wrote {} tracks to {}", sequence.tracks.len(), path.display());
    Ok(())
}

fn write_track<W: Write>(writer: &mut ByteWriter<W>, track: &Track, index: usize) -> Result<()> {
    let events = track.events();
    check_ordered(events).map_err(|e| match e {
        Error::Argument(msg) => Error::Argument(format!("track {}: {}", index, msg)),
        other => other,
    })?;

    writer.write_bytes(TRACK_MARKER)?;

    // Counting pass first to learn the body length
    writer.set_counting(true);
    writer.reset_count();
    let counted = write_events(writer, events);
    writer.set_counting(false);
    counted?;
    let length = writer.bytes_written();

    writer.write_u32(length)?;
    writer.reset_count();
    write_events(writer, events)?;
    debug_assert_eq!(writer.bytes_written(), length);

    log::debug!(
        "track {}: wrote {} events in {} bytes",
        index,
        events.len(),
        length
    );
    Ok(())
}

/// One pass over a track body
///
/// Each pass gets its own encoder so both passes omit exactly the same
/// status bytes.
fn write_events<W: Write>(writer: &mut ByteWriter<W>, events: &[Event]) -> Result<()> {
    let mut encoder = TrackEncoder::default();
    let mut previous_tick = 0;
    for event in events {
        writer.write_vlq(event.tick - previous_tick)?;
        previous_tick = event.tick;
        encoder.write_message(writer, &event.message)?;
    }
    Ok(())
}

#[derive(Debug, Default)]
struct TrackEncoder {
    /// Last channel status byte emitted; cleared by meta and sysex events
    running_status: Option<u8>,
}

impl TrackEncoder {
    fn write_message<W: Write>(&mut self, writer: &mut ByteWriter<W>, message: &Message) -> Result<()> {
        match message {
            Message::Realtime(rt) => Err(Error::argument(format!(
                "real-time message {:?} cannot be stored in a file",
                rt
            ))),
            Message::Sysex(body) => {
                validate_sysex(body)?;
                self.running_status = None;
                writer.write_u8(status::SYSEX)?;
                writer.write_vlq(payload_len(body.len() - 1)?)?;
                writer.write_bytes(&body[1..body.len() - 1])?;
                writer.write_u8(status::END_OF_SYSEX)
            }
            Message::Meta(meta) => {
                self.running_status = None;
                writer.write_u8(status::META)?;
                writer.write_u8(meta.type_byte())?;
                write_meta_payload(writer, meta)
            }
            _ => {
                let data = message.channel_data()?;
                let status_byte = message.status_byte();
                if self.running_status != Some(status_byte) {
                    writer.write_u8(status_byte)?;
                    self.running_status = Some(status_byte);
                }
                writer.write_bytes(&data)
            }
        }
    }
}

/// VLQ length followed by the meta payload
fn write_meta_payload<W: Write>(writer: &mut ByteWriter<W>, meta: &MetaMessage) -> Result<()> {
    match meta {
        MetaMessage::SequenceNumber(number) => {
            writer.write_vlq(2)?;
            writer.write_u16(*number)
        }
        MetaMessage::Text { text, .. } => writer.write_string(text, true),
        MetaMessage::ChannelPrefix(value) | MetaMessage::MidiPort(value) => {
            writer.write_vlq(1)?;
            writer.write_u8(*value)
        }
        MetaMessage::EndOfTrack => writer.write_vlq(0),
        MetaMessage::Tempo(tempo) => {
            writer.write_vlq(3)?;
            writer.write_u24(*tempo)
        }
        MetaMessage::SmpteOffset {
            hours,
            minutes,
            seconds,
            frames,
            subframes,
        } => {
            writer.write_vlq(5)?;
            writer.write_bytes(&[*hours, *minutes, *seconds, *frames, *subframes])
        }
        MetaMessage::TimeSignature {
            numerator,
            denominator,
            clocks_per_click,
            thirty_seconds_per_quarter,
        } => {
            writer.write_vlq(4)?;
            writer.write_bytes(&[
                *numerator,
                *denominator,
                *clocks_per_click,
                *thirty_seconds_per_quarter,
            ])
        }
        MetaMessage::KeySignature {
            sharps_flats,
            minor,
        } => {
            writer.write_vlq(2)?;
            writer.write_bytes(&[*sharps_flats as u8, u8::from(*minor)])
        }
        MetaMessage::SequencerSpecific(data) => {
            writer.write_vlq(payload_len(data.len())?)?;
            writer.write_bytes(data)
        }
    }
}
