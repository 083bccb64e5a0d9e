//! # midiseq - MIDI Files and Playback for Rust
//!
//! midiseq models MIDI messages, reads and writes Standard MIDI Files, and
//! plays a sequence back in real time against an output of your choice.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use midiseq::prelude::*;
//!
//! # fn main() -> midiseq::Result<()> {
//! // Load a file
//! let sequence = midiseq::smf::read_file("song.mid")?;
//! println!("{} tracks at {:?}", sequence.tracks.len(), sequence.timing);
//!
//! // Play it into a sink (anything implementing OutputSink)
//! let sink: Vec<Message> = Vec::new();
//! let sequencer = Sequencer::from_sequence(&sequence, SinkListener::new(sink))?;
//! sequencer.position_to_time(0)?;
//! sequencer.play()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Features
//!
//! - **Message model** - every channel voice, real-time, sysex and meta message
//! - **SMF codec** - formats 0, 1 and 2 with running status on both sides
//! - **Sequencer** - dedicated playback thread with tempo tracking, pause and seek
//! - **Stream decoding** - reassembles live wire bytes delivered in arbitrary chunks
//! - **serde** - optional, enable with the `serde` feature
//!
//! ## Logging
//!
//! The crate logs through the [`log`](https://docs.rs/log) facade and never
//! installs a logger itself.

pub mod error;
pub mod event;
pub mod message;
pub mod sequencer;
pub mod smf;
pub mod stream;
pub mod traits;

pub use error::{Error, Result};
pub use event::{Event, Format, Sequence, Timing, Track};
pub use message::{MetaMessage, Message, SystemRealtime, TextKind};
pub use sequencer::{
    Listener, Notification, Sequencer, SequencerConfig, SequencerState, SinkListener, Timeline,
};
pub use stream::StreamDecoder;
pub use traits::{Clock, InputSource, MonotonicClock, OutputSink, ReadSource};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        Error, Event, Format, InputSource, Listener, Message, MetaMessage, Notification,
        OutputSink, Result, Sequence, Sequencer, SequencerConfig, SequencerState, SinkListener,
        StreamDecoder, Timeline, Timing, Track,
    };
}
