//! Timestamped events and the track / sequence containers

use std::fmt;

use crate::message::{Message, MetaMessage};
use crate::{Error, Result};

/// A message placed in musical time
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Event {
    /// The message carried by this event
    pub message: Message,
    /// Index of the track this event belongs to
    pub track: usize,
    /// Absolute position in ticks since the start of the track
    pub tick: u32,
    /// Ticks since the previous event of the same track
    ///
    /// `None` for events built by hand until [`Track::build_delta_times`]
    /// runs. The decoder always fills it in.
    pub delta: Option<u32>,
}

impl Event {
    /// Create an event at an absolute tick, delta left unset
    pub fn new(message: Message, track: usize, tick: u32) -> Self {
        Self {
            message,
            track,
            tick,
            delta: None,
        }
    }

    /// Create an event with a known delta, as produced by the decoder
    pub fn with_delta(message: Message, track: usize, tick: u32, delta: u32) -> Self {
        Self {
            message,
            track,
            tick,
            delta: Some(delta),
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Time {:08}: {}", self.tick, self.message)
    }
}

/// Ordered list of events; insertion order is playback order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Track {
    events: Vec<Event>,
}

impl Track {
    /// Create an empty track
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a track from already ordered events
    pub fn from_events(events: Vec<Event>) -> Self {
        Self { events }
    }

    /// Append an event
    pub fn push(&mut self, event: Event) {
        self.events.push(event);
    }

    /// Events in playback order
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Mutable access to the events
    pub fn events_mut(&mut self) -> &mut Vec<Event> {
        &mut self.events
    }

    /// Consume the track, returning its events
    pub fn into_events(self) -> Vec<Event> {
        self.events
    }

    /// Iterate over events in playback order
    pub fn iter(&self) -> std::slice::Iter<'_, Event> {
        self.events.iter()
    }

    /// Number of events
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// True if the track holds no events
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Recompute every delta from the absolute ticks
    ///
    /// # Errors
    ///
    /// [`Error::Argument`] if the ticks decrease anywhere in the track. The
    /// track is left untouched in that case.
    pub fn build_delta_times(&mut self) -> Result<()> {
        check_ordered(&self.events)?;
        let mut last = 0;
        for event in &mut self.events {
            event.delta = Some(event.tick - last);
            last = event.tick;
        }
        Ok(())
    }

    /// Tick of the last event (0 for an empty track)
    pub fn duration(&self) -> u32 {
        self.events.last().map_or(0, |e| e.tick)
    }

    /// Append an end-of-track meta event at the last tick when it is missing
    pub fn ensure_end_of_track(&mut self, track_index: usize) {
        if self.events.last().is_some_and(|e| e.message.is_end_of_track()) {
            return;
        }
        let tick = self.duration();
        let delta = self.events.last().map_or(Some(0), |e| e.delta.map(|_| 0));
        self.events.push(Event {
            message: Message::end_of_track(),
            track: track_index,
            tick,
            delta,
        });
    }

    /// First event in `start..end` whose message satisfies `predicate`
    pub fn next_matching<F>(&self, start: u32, end: u32, predicate: F) -> Option<&Event>
    where
        F: Fn(&Message) -> bool,
    {
        self.events
            .iter()
            .skip_while(|e| e.tick < start)
            .take_while(|e| e.tick < end)
            .find(|e| predicate(&e.message))
    }
}

impl<'a> IntoIterator for &'a Track {
    type Item = &'a Event;
    type IntoIter = std::slice::Iter<'a, Event>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.iter()
    }
}

/// Check that absolute ticks never decrease
pub(crate) fn check_ordered(events: &[Event]) -> Result<()> {
    if let Some(pair) = events.windows(2).find(|w| w[1].tick < w[0].tick) {
        return Err(Error::argument(format!(
            "track is not ordered: tick {} follows tick {}",
            pair[1].tick, pair[0].tick
        )));
    }
    Ok(())
}

/// SMF file format, from the header chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Format {
    /// Format 0: one multi-channel track
    SingleTrack,
    /// Format 1: simultaneous tracks
    #[default]
    MultiTrack,
    /// Format 2: independent single-track patterns
    MultiSequence,
}

impl Format {
    /// Header value of this format
    pub fn as_u16(self) -> u16 {
        match self {
            Format::SingleTrack => 0,
            Format::MultiTrack => 1,
            Format::MultiSequence => 2,
        }
    }

    /// Parse a header value
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            0 => Some(Format::SingleTrack),
            1 => Some(Format::MultiTrack),
            2 => Some(Format::MultiSequence),
            _ => None,
        }
    }
}

/// Resolution of musical time, from the header's 16-bit division field
///
/// The two modes are mutually exclusive and selected by the top bit of the
/// division field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Timing {
    /// Ticks per quarter note (top bit clear)
    Ppqn(u16),
    /// SMPTE-frame based tempo, the low 15 bits of the division field (top bit set)
    Smpte(u16),
}

impl Timing {
    /// Decode the header division field
    pub fn from_division(division: u16) -> Self {
        if division & 0x8000 != 0 {
            Timing::Smpte(division & 0x7FFF)
        } else {
            Timing::Ppqn(division)
        }
    }

    /// Encode as a header division field
    ///
    /// # Errors
    ///
    /// [`Error::Argument`] if the value does not fit in 15 bits.
    pub fn to_division(self) -> Result<u16> {
        match self {
            Timing::Ppqn(ppqn) if ppqn & 0x8000 == 0 => Ok(ppqn),
            Timing::Smpte(value) if value & 0x8000 == 0 => Ok(value | 0x8000),
            other => Err(Error::argument(format!(
                "{:?} does not fit the 15-bit division field",
                other
            ))),
        }
    }

    /// Ticks per quarter note, if in PPQN mode
    pub fn ppqn(self) -> Option<u16> {
        match self {
            Timing::Ppqn(ppqn) => Some(ppqn),
            Timing::Smpte(_) => None,
        }
    }

    /// Frames per second for SMPTE timing (24, 25, 29 or 30)
    pub fn smpte_frames_per_second(self) -> Option<u8> {
        match self {
            // The high byte is the negated frame rate in two's complement
            Timing::Smpte(value) => Some(((value >> 8) as u8 | 0x80).wrapping_neg()),
            Timing::Ppqn(_) => None,
        }
    }

    /// Ticks per SMPTE frame
    pub fn smpte_ticks_per_frame(self) -> Option<u8> {
        match self {
            Timing::Smpte(value) => Some((value & 0xFF) as u8),
            Timing::Ppqn(_) => None,
        }
    }
}

impl Default for Timing {
    fn default() -> Self {
        Timing::Ppqn(480)
    }
}

/// A complete MIDI sequence: header fields plus tracks
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Sequence {
    /// File format (0, 1 or 2)
    pub format: Format,
    /// Tick resolution
    pub timing: Timing,
    /// Tracks in file order
    pub tracks: Vec<Track>,
}

impl Sequence {
    /// Create an empty format 1 sequence with the given PPQN
    pub fn new(ppqn: u16) -> Self {
        Self {
            format: Format::MultiTrack,
            timing: Timing::Ppqn(ppqn),
            tracks: Vec::new(),
        }
    }

    /// Create an empty sequence with explicit header fields
    pub fn with_header(format: Format, timing: Timing) -> Self {
        Self {
            format,
            timing,
            tracks: Vec::new(),
        }
    }

    /// Ticks per quarter note, if in PPQN mode
    pub fn ppqn(&self) -> Option<u16> {
        self.timing.ppqn()
    }

    /// Duration of the longest track, in ticks
    pub fn duration(&self) -> u32 {
        self.tracks.iter().map(Track::duration).max().unwrap_or(0)
    }

    /// Earliest event at or after `from` whose message satisfies `predicate`, across all tracks
    pub fn next_matching<F>(&self, from: u32, predicate: F) -> Option<&Event>
    where
        F: Fn(&Message) -> bool,
    {
        let mut best: Option<&Event> = None;
        for track in &self.tracks {
            let end = best.map_or(u32::MAX, |e| e.tick);
            if let Some(found) = track.next_matching(from, end, &predicate) {
                best = Some(found);
            }
        }
        best
    }

    /// Next tempo change at or after `from`
    pub fn next_tempo(&self, from: u32) -> Option<&Event> {
        self.next_matching(from, |m| matches!(m, Message::Meta(MetaMessage::Tempo(_))))
    }

    /// Next time signature at or after `from`
    pub fn next_time_signature(&self, from: u32) -> Option<&Event> {
        self.next_matching(from, |m| {
            matches!(m, Message::Meta(MetaMessage::TimeSignature { .. }))
        })
    }

    /// Next key signature at or after `from`
    pub fn next_key_signature(&self, from: u32) -> Option<&Event> {
        self.next_matching(from, |m| {
            matches!(m, Message::Meta(MetaMessage::KeySignature { .. }))
        })
    }

    /// Total number of events across tracks
    pub fn event_count(&self) -> usize {
        self.tracks.iter().map(Track::len).sum()
    }
}

impl fmt::Display for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Format {}, {:?}, {} tracks",
            self.format.as_u16(),
            self.timing,
            self.tracks.len()
        )?;
        for (index, track) in self.tracks.iter().enumerate() {
            writeln!(f, "Track {}:", index)?;
            for event in track {
                writeln!(f, "  {}", event)?;
            }
        }
        Ok(())
    }
}
