use std::time::Duration;

use crate::message::MAX_TEMPO;
use crate::{Error, Result};

/// Tempo the sequencer starts with until a tempo event says otherwise
///
/// One quarter note per second (60 BPM).
pub const DEFAULT_TEMPO: u32 = 1_000_000;

/// Playback thread tuning
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use midiseq::SequencerConfig;
///
/// let config = SequencerConfig::default()
///     .with_initial_tempo(500_000)
///     .with_max_sleep(Duration::from_millis(5));
/// assert_eq!(config.initial_tempo, 500_000);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SequencerConfig {
    /// Microseconds per quarter note before the first tempo event
    pub initial_tempo: u32,
    /// Waits longer than this sleep; shorter waits only yield
    pub coarse_sleep_threshold: Duration,
    /// Upper bound on a single sleep, which bounds pause and shutdown latency
    pub max_sleep: Duration,
    /// Name given to the playback thread
    pub thread_name: String,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            initial_tempo: DEFAULT_TEMPO,
            coarse_sleep_threshold: Duration::from_millis(2),
            max_sleep: Duration::from_millis(10),
            thread_name: "midiseq-player".to_string(),
        }
    }
}

impl SequencerConfig {
    pub fn with_initial_tempo(mut self, tempo: u32) -> Self {
        self.initial_tempo = tempo;
        self
    }

    pub fn with_coarse_sleep_threshold(mut self, threshold: Duration) -> Self {
        self.coarse_sleep_threshold = threshold;
        self
    }

    pub fn with_max_sleep(mut self, max_sleep: Duration) -> Self {
        self.max_sleep = max_sleep;
        self
    }

    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    /// Check the values before a sequencer is built from them
    pub fn validate(&self) -> Result<()> {
        check_tempo(self.initial_tempo)
    }
}

/// A tempo must be a non-zero 24-bit value
pub(crate) fn check_tempo(tempo: u32) -> Result<()> {
    if tempo == 0 || tempo > MAX_TEMPO {
        return Err(Error::argument(format!(
            "tempo {} outside 1..={} microseconds per quarter note",
            tempo, MAX_TEMPO
        )));
    }
    Ok(())
}
