//! Standard MIDI File codec
//!
//! [`read`] decodes an SMF image into a [`Sequence`](crate::Sequence) and
//! [`write`] encodes one back. Decoding is strict: a malformed file is
//! rejected with [`Error::Format`](crate::Error::Format) and no partial
//! result. Re-encoding is semantically faithful (same tracks, ticks and
//! messages) but not necessarily byte-identical, since the writer makes its
//! own running status choices.
//!
//! # Example
//!
//! ```no_run
//! use midiseq::smf;
//!
//! let sequence = smf::read_file("song.mid")?;
//! println!("{} tracks, {} ticks", sequence.tracks.len(), sequence.duration());
//! smf::write_file(&sequence, "copy.mid")?;
//! # Ok::<(), midiseq::Error>(())
//! ```

pub mod cursor;
mod reader;
mod writer;

pub use reader::{read, read_file, read_from};
pub use writer::{write, write_file, write_to};

/// Header chunk marker
pub(crate) const FILE_MARKER: &[u8; 4] = b"MThd";
/// Track chunk marker
pub(crate) const TRACK_MARKER: &[u8; 4] = b"MTrk";
/// Header body length; always 6
pub(crate) const HEADER_LENGTH: u32 = 6;
