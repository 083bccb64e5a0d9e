//! MIDI message types and utilities
//!
//! Every message kind the crate understands is a variant of the closed
//! [`Message`] sum type. Consumers match on it exhaustively instead of
//! inspecting runtime types.
//!
//! ## Supported Messages
//!
//! ### Channel Voice Messages
//! - **Note On/Off** - Trigger and release notes with velocity
//! - **Polyphonic Pressure** - Per-key aftertouch
//! - **Control Change (CC)** - Modulation, expression, pedals, etc.
//! - **Program Change** - Switch between instrument patches
//! - **Channel Pressure** - Channel-wide aftertouch
//! - **Pitch Bend** - Signed 14-bit value in `-8192..=8191`
//!
//! ### System Messages
//! - **System Real-Time** - Timing clock, start, continue, stop, active sensing
//! - **System Exclusive** - Vendor payload framed by `0xF0` / `0xF7`
//!
//! ### Meta Messages
//! File-only messages carrying tempo, signatures, text and markers. They are
//! never sent on a MIDI wire.
//!
//! ## Channels
//!
//! Channel messages carry a channel in `1..=16`. Every other kind reports
//! channel 0 through [`Message::channel`].

use std::fmt;

use smallvec::SmallVec;

use crate::{Error, Result};

/// Status byte values
pub mod status {
    pub const NOTE_OFF: u8 = 0x80;
    pub const NOTE_ON: u8 = 0x90;
    pub const POLY_PRESSURE: u8 = 0xA0;
    pub const CONTROL_CHANGE: u8 = 0xB0;
    pub const PROGRAM_CHANGE: u8 = 0xC0;
    pub const CHANNEL_PRESSURE: u8 = 0xD0;
    pub const PITCH_BEND: u8 = 0xE0;

    pub const SYSEX: u8 = 0xF0;
    pub const SONG_POSITION: u8 = 0xF2;
    pub const SONG_SELECT: u8 = 0xF3;
    pub const TUNE_REQUEST: u8 = 0xF6;
    pub const END_OF_SYSEX: u8 = 0xF7;

    pub const TIMING_CLOCK: u8 = 0xF8;
    pub const START: u8 = 0xFA;
    pub const CONTINUE: u8 = 0xFB;
    pub const STOP: u8 = 0xFC;
    pub const ACTIVE_SENSING: u8 = 0xFE;

    /// System reset on a wire, meta event marker inside a file
    pub const META: u8 = 0xFF;

    /// Mask selecting the command nibble of a channel status byte
    pub const COMMAND_MASK: u8 = 0xF0;
}

/// Well-known controller numbers for [`Message::ControlChange`]
pub mod controller {
    // Continuous controllers
    pub const BANK_SELECT_MSB: u8 = 0;
    pub const MODULATION: u8 = 1;
    pub const BREATH: u8 = 2;
    pub const FOOT: u8 = 4;
    pub const PORTAMENTO_TIME: u8 = 5;
    pub const DATA_ENTRY_MSB: u8 = 6;
    pub const MAIN_VOLUME: u8 = 7;
    pub const BALANCE: u8 = 8;
    pub const PAN: u8 = 10;
    pub const EXPRESSION: u8 = 11;
    pub const EFFECT_CONTROL_1: u8 = 12;
    pub const EFFECT_CONTROL_2: u8 = 13;
    pub const BANK_SELECT_LSB: u8 = 32;
    pub const DATA_ENTRY_LSB: u8 = 38;

    // Switches
    pub const SUSTAIN: u8 = 64;
    pub const PORTAMENTO: u8 = 65;
    pub const SOSTENUTO: u8 = 66;
    pub const SOFT_PEDAL: u8 = 67;
    pub const LEGATO_FOOTSWITCH: u8 = 68;

    pub const REVERB: u8 = 91;
    pub const TREMOLO: u8 = 92;
    pub const CHORUS: u8 = 93;
    pub const DETUNE: u8 = 94;
    pub const PHASER: u8 = 95;
    pub const DATA_INCREMENT: u8 = 96;
    pub const DATA_DECREMENT: u8 = 97;

    // Parameter numbers: send the MSB/LSB pair, then DATA_ENTRY_MSB (and
    // optionally DATA_ENTRY_LSB)
    pub const NRPN_LSB: u8 = 98;
    pub const NRPN_MSB: u8 = 99;
    pub const RPN_LSB: u8 = 100;
    pub const RPN_MSB: u8 = 101;

    // Channel mode
    pub const ALL_SOUND_OFF: u8 = 120;
    pub const RESET_ALL_CONTROLLERS: u8 = 121;
    pub const LOCAL_CONTROL: u8 = 122;
    pub const ALL_NOTES_OFF: u8 = 123;
    pub const OMNI_MODE_OFF: u8 = 124;
    pub const OMNI_MODE_ON: u8 = 125;
    pub const MONO_MODE_ON: u8 = 126;
    pub const POLY_MODE_ON: u8 = 127;
}

/// Meta event type bytes, as they appear after `0xFF` in a file
pub mod meta_type {
    pub const SEQUENCE_NUMBER: u8 = 0x00;
    pub const TEXT: u8 = 0x01;
    pub const COPYRIGHT: u8 = 0x02;
    pub const TRACK_NAME: u8 = 0x03;
    pub const INSTRUMENT_NAME: u8 = 0x04;
    pub const LYRIC: u8 = 0x05;
    pub const MARKER: u8 = 0x06;
    pub const CUE_POINT: u8 = 0x07;
    pub const PROGRAM_NAME: u8 = 0x08;
    pub const DEVICE_NAME: u8 = 0x09;
    pub const CHANNEL_PREFIX: u8 = 0x20;
    pub const MIDI_PORT: u8 = 0x21;
    pub const END_OF_TRACK: u8 = 0x2F;
    pub const TEMPO: u8 = 0x51;
    pub const SMPTE_OFFSET: u8 = 0x54;
    pub const TIME_SIGNATURE: u8 = 0x58;
    pub const KEY_SIGNATURE: u8 = 0x59;
    pub const SEQUENCER_SPECIFIC: u8 = 0x7F;
}

/// Largest tempo representable in the 24-bit tempo meta event
pub const MAX_TEMPO: u32 = 0x00FF_FFFF;

/// System real-time messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SystemRealtime {
    /// Timing clock, 24 pulses per quarter note
    TimingClock,
    /// Start sequencer playback
    Start,
    /// Resume sequencer playback
    Continue,
    /// Stop sequencer playback
    Stop,
    /// Connection status monitoring
    ActiveSensing,
}

impl SystemRealtime {
    /// The status byte of this message on a wire
    pub fn status(self) -> u8 {
        match self {
            SystemRealtime::TimingClock => status::TIMING_CLOCK,
            SystemRealtime::Start => status::START,
            SystemRealtime::Continue => status::CONTINUE,
            SystemRealtime::Stop => status::STOP,
            SystemRealtime::ActiveSensing => status::ACTIVE_SENSING,
        }
    }

    /// Look up a real-time message by status byte
    pub fn from_status(byte: u8) -> Option<Self> {
        match byte {
            status::TIMING_CLOCK => Some(SystemRealtime::TimingClock),
            status::START => Some(SystemRealtime::Start),
            status::CONTINUE => Some(SystemRealtime::Continue),
            status::STOP => Some(SystemRealtime::Stop),
            status::ACTIVE_SENSING => Some(SystemRealtime::ActiveSensing),
            _ => None,
        }
    }
}

/// Flavour of a text meta event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TextKind {
    Text,
    Copyright,
    TrackName,
    InstrumentName,
    Lyric,
    Marker,
    CuePoint,
    ProgramName,
    DeviceName,
}

impl TextKind {
    /// Meta type byte for this text flavour
    pub fn type_byte(self) -> u8 {
        match self {
            TextKind::Text => meta_type::TEXT,
            TextKind::Copyright => meta_type::COPYRIGHT,
            TextKind::TrackName => meta_type::TRACK_NAME,
            TextKind::InstrumentName => meta_type::INSTRUMENT_NAME,
            TextKind::Lyric => meta_type::LYRIC,
            TextKind::Marker => meta_type::MARKER,
            TextKind::CuePoint => meta_type::CUE_POINT,
            TextKind::ProgramName => meta_type::PROGRAM_NAME,
            TextKind::DeviceName => meta_type::DEVICE_NAME,
        }
    }

    /// Look up a text flavour by meta type byte
    pub fn from_type_byte(byte: u8) -> Option<Self> {
        match byte {
            meta_type::TEXT => Some(TextKind::Text),
            meta_type::COPYRIGHT => Some(TextKind::Copyright),
            meta_type::TRACK_NAME => Some(TextKind::TrackName),
            meta_type::INSTRUMENT_NAME => Some(TextKind::InstrumentName),
            meta_type::LYRIC => Some(TextKind::Lyric),
            meta_type::MARKER => Some(TextKind::Marker),
            meta_type::CUE_POINT => Some(TextKind::CuePoint),
            meta_type::PROGRAM_NAME => Some(TextKind::ProgramName),
            meta_type::DEVICE_NAME => Some(TextKind::DeviceName),
            _ => None,
        }
    }
}

/// Meta message payloads
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MetaMessage {
    /// Track sequence number (16-bit)
    SequenceNumber(u16),
    /// Any of the text flavours, UTF-8
    Text {
        kind: TextKind,
        text: String,
    },
    /// Channel the following meta events apply to (0-15)
    ChannelPrefix(u8),
    /// Output port the track is routed to
    MidiPort(u8),
    /// Mandatory last event of a track
    EndOfTrack,
    /// Microseconds per quarter note (24-bit)
    Tempo(u32),
    /// SMPTE time at which the track starts
    SmpteOffset {
        hours: u8,
        minutes: u8,
        seconds: u8,
        frames: u8,
        /// Hundredths of a frame
        subframes: u8,
    },
    /// Time signature, four raw bytes
    TimeSignature {
        numerator: u8,
        /// Power of two: 2 means a quarter note, 3 an eighth note
        denominator: u8,
        /// MIDI clocks per metronome click
        clocks_per_click: u8,
        /// Number of notated 32nd notes per quarter note
        thirty_seconds_per_quarter: u8,
    },
    /// Key signature
    KeySignature {
        /// Negative for flats, positive for sharps, 0 for C
        sharps_flats: i8,
        minor: bool,
    },
    /// Opaque vendor blob
    SequencerSpecific(Vec<u8>),
}

impl MetaMessage {
    /// The meta type byte written after `0xFF`
    pub fn type_byte(&self) -> u8 {
        match self {
            MetaMessage::SequenceNumber(_) => meta_type::SEQUENCE_NUMBER,
            MetaMessage::Text { kind, .. } => kind.type_byte(),
            MetaMessage::ChannelPrefix(_) => meta_type::CHANNEL_PREFIX,
            MetaMessage::MidiPort(_) => meta_type::MIDI_PORT,
            MetaMessage::EndOfTrack => meta_type::END_OF_TRACK,
            MetaMessage::Tempo(_) => meta_type::TEMPO,
            MetaMessage::SmpteOffset { .. } => meta_type::SMPTE_OFFSET,
            MetaMessage::TimeSignature { .. } => meta_type::TIME_SIGNATURE,
            MetaMessage::KeySignature { .. } => meta_type::KEY_SIGNATURE,
            MetaMessage::SequencerSpecific(_) => meta_type::SEQUENCER_SPECIFIC,
        }
    }
}

/// A MIDI message
///
/// Channel fields hold `1..=16`. The constructors clamp out-of-range input;
/// the encoder rejects out-of-range values written directly into the fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Message {
    /// Note Off
    NoteOff {
        /// MIDI channel (1-16)
        channel: u8,
        /// MIDI note number (0-127)
        note: u8,
        /// Release velocity (0-127)
        velocity: u8,
    },
    /// Note On (velocity 0 is treated as a note off by receivers)
    NoteOn {
        /// MIDI channel (1-16)
        channel: u8,
        /// MIDI note number (0-127, where 60 = middle C)
        note: u8,
        /// Velocity (0-127)
        velocity: u8,
    },
    /// Polyphonic key pressure
    PolyPressure {
        channel: u8,
        note: u8,
        pressure: u8,
    },
    /// Control Change
    ControlChange {
        channel: u8,
        /// Controller number (0-127), see [`controller`]
        controller: u8,
        value: u8,
    },
    /// Program Change
    ProgramChange {
        channel: u8,
        program: u8,
    },
    /// Channel pressure
    ChannelPressure {
        channel: u8,
        pressure: u8,
    },
    /// Pitch Bend
    PitchBend {
        channel: u8,
        /// Signed bend in `-8192..=8191`, 0 = centre
        ///
        /// Sent on the wire biased by `0x2000`.
        value: i16,
    },
    /// System real-time message
    Realtime(SystemRealtime),
    /// System exclusive, raw body including the leading `0xF0` and trailing `0xF7`
    Sysex(Vec<u8>),
    /// File-only meta message
    Meta(MetaMessage),
}

impl Message {
    /// Smallest pitch bend value
    pub const PITCH_BEND_MIN: i16 = -8192;
    /// Largest pitch bend value
    pub const PITCH_BEND_MAX: i16 = 8191;
    /// Offset applied to pitch bend values on the wire
    pub const PITCH_BEND_BIAS: i16 = 0x2000;

    /// Create a Note On message
    ///
    /// # Examples
    ///
    /// ```
    /// use midiseq::Message;
    ///
    /// // Middle C on channel 1
    /// let msg = Message::note_on(1, 60, 100);
    /// assert_eq!(msg.channel(), 1);
    /// ```
    pub fn note_on(channel: u8, note: u8, velocity: u8) -> Self {
        Message::NoteOn {
            channel: clamp_channel(channel),
            note: note.min(127),
            velocity: velocity.min(127),
        }
    }

    /// Create a Note Off message
    pub fn note_off(channel: u8, note: u8, velocity: u8) -> Self {
        Message::NoteOff {
            channel: clamp_channel(channel),
            note: note.min(127),
            velocity: velocity.min(127),
        }
    }

    /// Create a polyphonic pressure message
    pub fn poly_pressure(channel: u8, note: u8, pressure: u8) -> Self {
        Message::PolyPressure {
            channel: clamp_channel(channel),
            note: note.min(127),
            pressure: pressure.min(127),
        }
    }

    /// Create a Control Change message
    ///
    /// ```
    /// use midiseq::message::{controller, Message};
    ///
    /// let msg = Message::control_change(1, controller::SUSTAIN, 127);
    /// ```
    pub fn control_change(channel: u8, controller: u8, value: u8) -> Self {
        Message::ControlChange {
            channel: clamp_channel(channel),
            controller: controller.min(127),
            value: value.min(127),
        }
    }

    /// Create a Program Change message
    pub fn program_change(channel: u8, program: u8) -> Self {
        Message::ProgramChange {
            channel: clamp_channel(channel),
            program: program.min(127),
        }
    }

    /// Create a channel pressure message
    pub fn channel_pressure(channel: u8, pressure: u8) -> Self {
        Message::ChannelPressure {
            channel: clamp_channel(channel),
            pressure: pressure.min(127),
        }
    }

    /// Create a Pitch Bend message, `value` clamped to `-8192..=8191`
    pub fn pitch_bend(channel: u8, value: i16) -> Self {
        Message::PitchBend {
            channel: clamp_channel(channel),
            value: value.clamp(Self::PITCH_BEND_MIN, Self::PITCH_BEND_MAX),
        }
    }

    /// Create a system exclusive message
    ///
    /// The `0xF0` / `0xF7` framing bytes are added when missing. Body bytes
    /// are not validated here; the encoder rejects bytes with the high bit
    /// set.
    pub fn sysex(payload: &[u8]) -> Self {
        let mut body = Vec::with_capacity(payload.len() + 2);
        if payload.first() != Some(&status::SYSEX) {
            body.push(status::SYSEX);
        }
        body.extend_from_slice(payload);
        if body.len() < 2 || body.last() != Some(&status::END_OF_SYSEX) {
            body.push(status::END_OF_SYSEX);
        }
        Message::Sysex(body)
    }

    /// Create a tempo meta message (microseconds per quarter note, clamped to 24 bits)
    pub fn tempo(micros_per_quarter: u32) -> Self {
        Message::Meta(MetaMessage::Tempo(micros_per_quarter.min(MAX_TEMPO)))
    }

    /// Create a text meta message
    pub fn text(kind: TextKind, text: impl Into<String>) -> Self {
        Message::Meta(MetaMessage::Text {
            kind,
            text: text.into(),
        })
    }

    /// Create an end-of-track meta message
    pub fn end_of_track() -> Self {
        Message::Meta(MetaMessage::EndOfTrack)
    }

    /// Create a time signature meta message
    pub fn time_signature(
        numerator: u8,
        denominator: u8,
        clocks_per_click: u8,
        thirty_seconds_per_quarter: u8,
    ) -> Self {
        Message::Meta(MetaMessage::TimeSignature {
            numerator,
            denominator,
            clocks_per_click,
            thirty_seconds_per_quarter,
        })
    }

    /// Create a key signature meta message
    pub fn key_signature(sharps_flats: i8, minor: bool) -> Self {
        Message::Meta(MetaMessage::KeySignature {
            sharps_flats,
            minor,
        })
    }

    /// Channel (1-16) for channel messages, 0 otherwise
    pub fn channel(&self) -> u8 {
        match *self {
            Message::NoteOff { channel, .. }
            | Message::NoteOn { channel, .. }
            | Message::PolyPressure { channel, .. }
            | Message::ControlChange { channel, .. }
            | Message::ProgramChange { channel, .. }
            | Message::ChannelPressure { channel, .. }
            | Message::PitchBend { channel, .. } => channel,
            Message::Realtime(_) | Message::Sysex(_) | Message::Meta(_) => 0,
        }
    }

    /// True for the seven channel voice kinds
    pub fn is_channel_message(&self) -> bool {
        !matches!(
            self,
            Message::Realtime(_) | Message::Sysex(_) | Message::Meta(_)
        )
    }

    /// True for messages that can be sent on a MIDI wire (everything but meta)
    pub fn is_transmittable(&self) -> bool {
        !matches!(self, Message::Meta(_))
    }

    /// The status byte this message starts with
    ///
    /// For channel messages the low nibble holds `channel - 1`.
    pub fn status_byte(&self) -> u8 {
        let command = match self {
            Message::NoteOff { .. } => status::NOTE_OFF,
            Message::NoteOn { .. } => status::NOTE_ON,
            Message::PolyPressure { .. } => status::POLY_PRESSURE,
            Message::ControlChange { .. } => status::CONTROL_CHANGE,
            Message::ProgramChange { .. } => status::PROGRAM_CHANGE,
            Message::ChannelPressure { .. } => status::CHANNEL_PRESSURE,
            Message::PitchBend { .. } => status::PITCH_BEND,
            Message::Realtime(rt) => return rt.status(),
            Message::Sysex(_) => return status::SYSEX,
            Message::Meta(_) => return status::META,
        };
        command | (self.channel().wrapping_sub(1) & 0x0F)
    }

    /// Copy of this message moved to another channel
    ///
    /// Non-channel messages are returned unchanged.
    pub fn with_channel(&self, channel: u8) -> Self {
        let channel = clamp_channel(channel);
        let mut copy = self.clone();
        match &mut copy {
            Message::NoteOff { channel: c, .. }
            | Message::NoteOn { channel: c, .. }
            | Message::PolyPressure { channel: c, .. }
            | Message::ControlChange { channel: c, .. }
            | Message::ProgramChange { channel: c, .. }
            | Message::ChannelPressure { channel: c, .. }
            | Message::PitchBend { channel: c, .. } => *c = channel,
            Message::Realtime(_) | Message::Sysex(_) | Message::Meta(_) => {}
        }
        copy
    }

    /// Note On with a non-zero velocity
    pub fn is_note_on(&self) -> bool {
        matches!(self, Message::NoteOn { velocity, .. } if *velocity > 0)
    }

    /// Note Off, or Note On with velocity 0
    pub fn is_note_off(&self) -> bool {
        matches!(
            self,
            Message::NoteOff { .. } | Message::NoteOn { velocity: 0, .. }
        )
    }

    /// Velocity of a note message scaled to `0.0..=1.0`
    pub fn level(&self) -> Option<f64> {
        match *self {
            Message::NoteOn { velocity, .. }
            | Message::NoteOff { velocity, .. }
            | Message::PolyPressure {
                pressure: velocity, ..
            } => Some(f64::from(velocity) / 127.0),
            _ => None,
        }
    }

    /// Tempo carried by a tempo meta message
    pub fn as_tempo(&self) -> Option<u32> {
        match self {
            Message::Meta(MetaMessage::Tempo(tempo)) => Some(*tempo),
            _ => None,
        }
    }

    /// True for the end-of-track meta message
    pub fn is_end_of_track(&self) -> bool {
        matches!(self, Message::Meta(MetaMessage::EndOfTrack))
    }

    /// Encode this message as it would travel on a MIDI wire
    ///
    /// # Errors
    ///
    /// - [`Error::Argument`] for meta messages, which exist only in files
    /// - [`Error::Argument`] for out-of-range fields or a malformed sysex body
    pub fn to_wire(&self) -> Result<SmallVec<[u8; 3]>> {
        let mut bytes = SmallVec::new();
        match self {
            Message::Realtime(rt) => bytes.push(rt.status()),
            Message::Sysex(body) => {
                validate_sysex(body)?;
                bytes.extend_from_slice(body);
            }
            Message::Meta(meta) => {
                return Err(Error::argument(format!(
                    "meta message 0x{:02X} cannot be sent on a MIDI wire",
                    meta.type_byte()
                )));
            }
            _ => {
                bytes.push(self.status_byte());
                bytes.extend_from_slice(&self.channel_data()?);
            }
        }
        Ok(bytes)
    }

    /// Decode one complete wire message
    ///
    /// `bytes` must start with a status byte and hold exactly one message.
    /// Use [`StreamDecoder`](crate::StreamDecoder) for chunked input or
    /// running status.
    pub fn from_wire(bytes: &[u8]) -> Result<Self> {
        let (&first, rest) = bytes
            .split_first()
            .ok_or_else(|| Error::argument("empty MIDI message"))?;

        if let Some(rt) = SystemRealtime::from_status(first) {
            if !rest.is_empty() {
                return Err(Error::argument("real-time message carries no data"));
            }
            return Ok(Message::Realtime(rt));
        }

        if first == status::SYSEX {
            validate_sysex(bytes)?;
            return Ok(Message::Sysex(bytes.to_vec()));
        }

        if !is_channel_status(first) {
            return Err(Error::argument(format!(
                "unsupported status byte 0x{:02X}",
                first
            )));
        }

        let expected = channel_data_len(first);
        if rest.len() != expected {
            return Err(Error::argument(format!(
                "status 0x{:02X} expects {} data bytes, got {}",
                first,
                expected,
                rest.len()
            )));
        }
        if rest.iter().any(|b| b & 0x80 != 0) {
            return Err(Error::argument("data byte with high bit set"));
        }
        let d1 = rest[0];
        let d2 = rest.get(1).copied().unwrap_or(0);
        Ok(Message::from_channel_parts(first, d1, d2))
    }

    /// Data bytes following the status byte of a channel message
    pub(crate) fn channel_data(&self) -> Result<SmallVec<[u8; 2]>> {
        let channel = self.channel();
        if !(1..=16).contains(&channel) {
            return Err(Error::argument(format!(
                "channel {} out of range 1-16",
                channel
            )));
        }

        let data: SmallVec<[u8; 2]> = match *self {
            Message::NoteOff { note, velocity, .. } | Message::NoteOn { note, velocity, .. } => {
                smallvec::smallvec![note, velocity]
            }
            Message::PolyPressure { note, pressure, .. } => smallvec::smallvec![note, pressure],
            Message::ControlChange {
                controller, value, ..
            } => smallvec::smallvec![controller, value],
            Message::ProgramChange { program, .. } => smallvec::smallvec![program],
            Message::ChannelPressure { pressure, .. } => smallvec::smallvec![pressure],
            Message::PitchBend { value, .. } => {
                if !(Self::PITCH_BEND_MIN..=Self::PITCH_BEND_MAX).contains(&value) {
                    return Err(Error::argument(format!(
                        "pitch bend {} out of range -8192..8191",
                        value
                    )));
                }
                let raw = (value + Self::PITCH_BEND_BIAS) as u16;
                smallvec::smallvec![(raw & 0x7F) as u8, ((raw >> 7) & 0x7F) as u8]
            }
            Message::Realtime(_) | Message::Sysex(_) | Message::Meta(_) => {
                return Err(Error::argument("not a channel message"));
            }
        };

        if data.iter().any(|b| b & 0x80 != 0) {
            return Err(Error::argument(format!(
                "data byte with high bit set in {}",
                self.kind_name()
            )));
        }
        Ok(data)
    }

    /// Build a channel message from its status byte and data bytes
    ///
    /// `status` must satisfy [`is_channel_status`]. `d2` is ignored for
    /// single data byte kinds.
    pub(crate) fn from_channel_parts(status: u8, d1: u8, d2: u8) -> Self {
        let channel = (status & 0x0F) + 1;
        match status & status::COMMAND_MASK {
            status::NOTE_OFF => Message::NoteOff {
                channel,
                note: d1,
                velocity: d2,
            },
            status::NOTE_ON => Message::NoteOn {
                channel,
                note: d1,
                velocity: d2,
            },
            status::POLY_PRESSURE => Message::PolyPressure {
                channel,
                note: d1,
                pressure: d2,
            },
            status::CONTROL_CHANGE => Message::ControlChange {
                channel,
                controller: d1,
                value: d2,
            },
            status::PROGRAM_CHANGE => Message::ProgramChange {
                channel,
                program: d1,
            },
            status::CHANNEL_PRESSURE => Message::ChannelPressure {
                channel,
                pressure: d1,
            },
            _ => {
                let raw = (u16::from(d2) << 7) | u16::from(d1);
                Message::PitchBend {
                    channel,
                    value: raw as i16 - Self::PITCH_BEND_BIAS,
                }
            }
        }
    }

    /// Short human-readable kind name
    pub fn kind_name(&self) -> &'static str {
        match self {
            Message::NoteOff { .. } => "NoteOff",
            Message::NoteOn { .. } => "NoteOn",
            Message::PolyPressure { .. } => "PolyPressure",
            Message::ControlChange { .. } => "ControlChange",
            Message::ProgramChange { .. } => "ProgramChange",
            Message::ChannelPressure { .. } => "ChannelPressure",
            Message::PitchBend { .. } => "PitchBend",
            Message::Realtime(_) => "Realtime",
            Message::Sysex(_) => "Sysex",
            Message::Meta(_) => "Meta",
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Message::NoteOff {
                channel,
                note,
                velocity,
            }
            | Message::NoteOn {
                channel,
                note,
                velocity,
            } => write!(
                f,
                "{} ch {}, Note {}, Vel {}",
                self.kind_name(),
                channel,
                note,
                velocity
            ),
            Message::PolyPressure {
                channel,
                note,
                pressure,
            } => write!(f, "PolyPressure ch {}, Note {}, Pressure {}", channel, note, pressure),
            Message::ControlChange {
                channel,
                controller,
                value,
            } => write!(f, "ControlChange ch {}, Controller {}, Value {}", channel, controller, value),
            Message::ProgramChange { channel, program } => {
                write!(f, "ProgramChange ch {}, Program {}", channel, program)
            }
            Message::ChannelPressure { channel, pressure } => {
                write!(f, "ChannelPressure ch {}, Pressure {}", channel, pressure)
            }
            Message::PitchBend { channel, value } => {
                write!(f, "PitchBend ch {}, Pitch {}", channel, value)
            }
            Message::Realtime(rt) => write!(f, "{:?}", rt),
            Message::Sysex(body) => write!(f, "Sysex, {} bytes", body.len()),
            Message::Meta(meta) => match meta {
                MetaMessage::Text { kind, text } => write!(f, "Meta {:?} \"{}\"", kind, text),
                MetaMessage::Tempo(tempo) => write!(f, "Meta Tempo {} us/quarter", tempo),
                MetaMessage::KeySignature {
                    sharps_flats,
                    minor,
                } => write!(f, "Meta KeySignature, #/b {}, minor {}", sharps_flats, minor),
                other => write!(f, "Meta {:?}", other),
            },
        }
    }
}

/// True for status bytes `0x80..=0xEF`
pub fn is_channel_status(byte: u8) -> bool {
    (0x80..0xF0).contains(&byte)
}

/// Number of data bytes following a channel status byte
pub fn channel_data_len(status: u8) -> usize {
    match status & status::COMMAND_MASK {
        status::PROGRAM_CHANGE | status::CHANNEL_PRESSURE => 1,
        _ => 2,
    }
}

fn clamp_channel(channel: u8) -> u8 {
    channel.clamp(1, 16)
}

/// Check a sysex body is framed by `0xF0` / `0xF7` with 7-bit data in between
pub(crate) fn validate_sysex(body: &[u8]) -> Result<()> {
    if body.len() < 2 || body[0] != status::SYSEX || body[body.len() - 1] != status::END_OF_SYSEX {
        return Err(Error::argument(
            "sysex body must start with 0xF0 and end with 0xF7",
        ));
    }
    if let Some(pos) = body[1..body.len() - 1].iter().position(|b| b & 0x80 != 0) {
        return Err(Error::argument(format!(
            "sysex body byte {} has its high bit set (0x{:02X})",
            pos + 1,
            body[pos + 1]
        )));
    }
    Ok(())
}
