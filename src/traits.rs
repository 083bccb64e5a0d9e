use std::io::{ErrorKind, Read};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;

use crate::{Message, Result};

/// Destination for messages dispatched by the sequencer
///
/// Implemented by whatever actually reaches a synthesizer: a hardware port,
/// a virtual port, a software instrument. The crate itself never opens a
/// port; the composition root picks the sink.
///
/// # Thread Safety
///
/// Sinks are moved onto the sequencer's playback thread and called from
/// there only, hence the `Send` bound. Calls are synchronous: a sink that
/// blocks delays every later event by the same amount.
///
/// # Examples
///
/// ```
/// use midiseq::prelude::*;
///
/// struct Printer;
///
/// impl OutputSink for Printer {
///     fn send(&mut self, message: &Message) -> Result<()> {
///         println!("{}", message);
///         Ok(())
///     }
///
///     fn reset(&mut self) -> Result<()> {
///         println!("all notes off");
///         Ok(())
///     }
/// }
/// ```
pub trait OutputSink: Send {
    /// Transmit one message
    ///
    /// Only transmittable messages are handed to a sink; meta messages are
    /// filtered out before this point by [`SinkListener`](crate::SinkListener).
    fn send(&mut self, message: &Message) -> Result<()>;

    /// Silence all sounding notes
    ///
    /// Called whenever playback stops, whether paused or finished.
    fn reset(&mut self) -> Result<()>;
}

/// Recording sink, mostly useful in tests
impl OutputSink for Vec<Message> {
    fn send(&mut self, message: &Message) -> Result<()> {
        self.push(message.clone());
        Ok(())
    }

    fn reset(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<S: OutputSink + ?Sized> OutputSink for Box<S> {
    fn send(&mut self, message: &Message) -> Result<()> {
        (**self).send(message)
    }

    fn reset(&mut self) -> Result<()> {
        (**self).reset()
    }
}

/// Sink shared with another thread, e.g. to inspect what was played
impl<S: OutputSink> OutputSink for Arc<Mutex<S>> {
    fn send(&mut self, message: &Message) -> Result<()> {
        self.lock().send(message)
    }

    fn reset(&mut self) -> Result<()> {
        self.lock().reset()
    }
}

/// Producer of raw wire bytes in arbitrary chunks
///
/// A chunk may end in the middle of a message or even hold less than one
/// message. [`StreamDecoder`](crate::StreamDecoder) carries the incomplete
/// tail over to the next chunk.
pub trait InputSource {
    /// Fill `buf` with the next bytes and return how many were written
    ///
    /// Returns `Ok(0)` once the source is exhausted.
    fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize>;
}

/// Adapts any [`Read`] (a serial device, a pipe, a byte slice) into an [`InputSource`]
#[derive(Debug)]
pub struct ReadSource<R>(pub R);

impl<R: Read> InputSource for ReadSource<R> {
    fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize> {
        loop {
            match self.0.read(buf) {
                Ok(n) => return Ok(n),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }
}

/// Monotonic microsecond time source used by the sequencer
pub trait Clock: Send + Sync {
    /// Microseconds since an arbitrary fixed origin; never decreases
    fn now_micros(&self) -> u64;
}

/// [`Clock`] backed by [`Instant`]
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_micros(&self) -> u64 {
        self.origin.elapsed().as_micros() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monotonic_clock_advances() {
        let clock = MonotonicClock::new();
        let a = clock.now_micros();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = clock.now_micros();
        assert!(b >= a + 1_000);
    }

    #[test]
    fn test_read_source_chunks() {
        let data = [0x90u8, 60, 100, 0x80, 60];
        let mut source = ReadSource(&data[..]);
        let mut buf = [0u8; 3];
        assert_eq!(source.read_chunk(&mut buf).unwrap(), 3);
        assert_eq!(buf, [0x90, 60, 100]);
        assert_eq!(source.read_chunk(&mut buf).unwrap(), 2);
        assert_eq!(source.read_chunk(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_vec_sink_records() {
        let mut sink: Vec<Message> = Vec::new();
        sink.send(&Message::note_on(1, 60, 100)).unwrap();
        sink.reset().unwrap();
        assert_eq!(sink, vec![Message::note_on(1, 60, 100)]);
    }
}
