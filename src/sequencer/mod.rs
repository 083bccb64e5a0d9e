//! Real-time playback of a flattened event timeline
//!
//! A [`Sequencer`] owns one playback thread. The thread maps ticks to wall
//! clock time under the current tempo and hands every event to a
//! [`Listener`] at the moment it is due. The caller controls it with
//! [`play`](Sequencer::play), [`pause`](Sequencer::pause) and
//! [`position_to_time`](Sequencer::position_to_time).
//!
//! # States
//!
//! - **Idle** - not playing; seek and update are allowed
//! - **Playing** - the thread is dispatching events
//! - **Seeking** - transient, while a reposition is carried out
//! - **Ended** - the timeline ran out; behaves like Idle
//!
//! # Example
//!
//! ```no_run
//! use midiseq::prelude::*;
//!
//! # fn main() -> midiseq::Result<()> {
//! let sequence = midiseq::smf::read_file("song.mid")?;
//! let sequencer = Sequencer::from_sequence(&sequence, |n: Notification<'_>| {
//!     if let Notification::Play(event) = n {
//!         println!("{}", event);
//!     }
//! })?;
//!
//! // Apply tick-0 tempo and patch changes, then start
//! sequencer.position_to_time(0)?;
//! sequencer.play()?;
//! std::thread::sleep(std::time::Duration::from_secs(5));
//! sequencer.pause()?;
//! # Ok(())
//! # }
//! ```

mod config;
mod player;
pub mod timing;

use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};

use crate::event::{Event, Sequence, Timing};
use crate::traits::{Clock, MonotonicClock, OutputSink};
use crate::{Error, Result};

pub use config::{SequencerConfig, DEFAULT_TEMPO};
pub use timing::{micros_to_ticks, ticks_to_micros, TimeReference};

use config::check_tempo;
use player::{Player, Shared};

/// What the playback thread reports to its listener
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notification<'a> {
    /// An event is due now
    Play(&'a Event),
    /// Playback stopped (pause or end); silence hanging notes
    Reset,
    /// The last event of the timeline has been dispatched
    End,
}

/// Receives notifications on the playback thread
///
/// Implemented for every `FnMut(Notification<'_>) + Send` closure.
///
/// The listener must not call the control methods that wait for the
/// playback thread, which is busy calling the listener: [`Sequencer::pause`],
/// [`Sequencer::position_to_time`], [`Sequencer::update_sequence`] and
/// [`Sequencer::shutdown`] fail with [`Error::State`] when called from it.
/// [`Sequencer::play`], [`Sequencer::set_tempo`] and the queries do not wait
/// and may be called from the listener.
pub trait Listener: Send {
    fn notify(&mut self, notification: Notification<'_>);
}

impl<F> Listener for F
where
    F: FnMut(Notification<'_>) + Send,
{
    fn notify(&mut self, notification: Notification<'_>) {
        self(notification)
    }
}

/// Listener forwarding playback to an [`OutputSink`]
///
/// Transmittable messages go to [`OutputSink::send`], meta messages are
/// skipped, and [`Notification::Reset`] calls [`OutputSink::reset`]. Sink
/// failures are logged and playback carries on.
#[derive(Debug)]
pub struct SinkListener<S> {
    sink: S,
}

impl<S: OutputSink> SinkListener<S> {
    pub fn new(sink: S) -> Self {
        Self { sink }
    }
}

impl<S: OutputSink> Listener for SinkListener<S> {
    fn notify(&mut self, notification: Notification<'_>) {
        match notification {
            Notification::Play(event) => {
                if !event.message.is_transmittable() {
                    return;
                }
                if let Err(e) = self.sink.send(&event.message) {
                    log::warn!("sink rejected {} at tick {}: {}", event.message, event.tick, e);
                }
            }
            Notification::Reset => {
                if let Err(e) = self.sink.reset() {
                    log::warn!("sink reset failed: {}", e);
                }
            }
            Notification::End => {}
        }
    }
}

/// Observable sequencer state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SequencerState {
    Idle,
    Playing,
    Seeking,
    Ended,
}

/// Events of every track merged into one tick-ordered list
///
/// Events sharing a tick keep their relative order (track order first, then
/// order within the track).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timeline {
    events: Vec<Event>,
    ppqn: u16,
}

impl Timeline {
    /// Sort `events` by tick and pair them with a resolution
    ///
    /// # Errors
    ///
    /// [`Error::Argument`] if `ppqn` is 0.
    pub fn new(mut events: Vec<Event>, ppqn: u16) -> Result<Self> {
        if ppqn == 0 {
            return Err(Error::argument("PPQN must be greater than 0"));
        }
        events.sort_by_key(|e| e.tick);
        Ok(Self { events, ppqn })
    }

    /// Flatten a sequence
    ///
    /// # Errors
    ///
    /// [`Error::Argument`] for SMPTE-timed sequences and a PPQN of 0.
    pub fn from_sequence(sequence: &Sequence) -> Result<Self> {
        let ppqn = match sequence.timing {
            Timing::Ppqn(ppqn) => ppqn,
            Timing::Smpte(_) => {
                return Err(Error::argument(
                    "SMPTE-timed sequences cannot be played, PPQN timing required",
                ));
            }
        };
        let events = sequence
            .tracks
            .iter()
            .flat_map(|t| t.iter().cloned())
            .collect();
        Self::new(events, ppqn)
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn ppqn(&self) -> u16 {
        self.ppqn
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Tick of the last event
    pub fn duration(&self) -> u32 {
        self.events.last().map_or(0, |e| e.tick)
    }
}

/// Handle to a playback thread
///
/// The thread starts in [`new`](Self::new) and waits, Idle, at tick 0. Tick-0
/// events are not dispatched until [`position_to_time(0)`](Self::position_to_time)
/// or [`play`](Self::play).
///
/// # Thread Safety
///
/// Control methods may be called from any thread but are meant to be
/// serialized by the caller. None of them may be called from the listener.
/// Dropping the handle shuts the thread down.
pub struct Sequencer {
    shared: Arc<Shared>,
    thread: Option<JoinHandle<()>>,
    player_id: ThreadId,
}

impl Sequencer {
    /// Start a sequencer with the default configuration
    pub fn new<L>(timeline: Timeline, listener: L) -> Result<Self>
    where
        L: Listener + 'static,
    {
        Self::with_config(timeline, listener, SequencerConfig::default())
    }

    /// Flatten `sequence` and start a sequencer over it
    pub fn from_sequence<L>(sequence: &Sequence, listener: L) -> Result<Self>
    where
        L: Listener + 'static,
    {
        Self::new(Timeline::from_sequence(sequence)?, listener)
    }

    pub fn with_config<L>(timeline: Timeline, listener: L, config: SequencerConfig) -> Result<Self>
    where
        L: Listener + 'static,
    {
        Self::with_clock(timeline, listener, config, MonotonicClock::new())
    }

    /// Start a sequencer measuring time with a custom clock
    pub fn with_clock<L, C>(
        timeline: Timeline,
        listener: L,
        config: SequencerConfig,
        clock: C,
    ) -> Result<Self>
    where
        L: Listener + 'static,
        C: Clock + 'static,
    {
        config.validate()?;

        let shared = Arc::new(Shared::new(config.initial_tempo));
        let thread_name = config.thread_name.clone();
        let player = Player::new(
            Arc::clone(&shared),
            Box::new(listener),
            Box::new(clock),
            config,
            timeline,
        );

        let thread = thread::Builder::new()
            .name(thread_name)
            .spawn(move || player.run())?;
        let player_id = thread.thread().id();

        log::debug!("sequencer thread started");
        Ok(Self {
            shared,
            thread: Some(thread),
            player_id,
        })
    }

    /// Start or resume playback from the current position
    ///
    /// Playing an ended timeline reports [`Notification::End`] again at once;
    /// reposition first to replay it. Calling play while playing does nothing.
    pub fn play(&self) -> Result<()> {
        let mut control = self.shared.lock();
        self.check_running(control.closing, control.alive)?;
        if !control.playing {
            control.playing = true;
            log::info!("play");
            self.shared.cond.notify_all();
        }
        Ok(())
    }

    /// Stop playback
    ///
    /// Returns once the playback thread has left its dispatch loop, so no
    /// event is dispatched after this returns. The listener has also
    /// received [`Notification::Reset`] by then.
    pub fn pause(&self) -> Result<()> {
        self.check_not_player()?;
        let mut control = self.shared.lock();
        control.playing = false;
        self.shared.cond.notify_all();
        while control.in_loop && control.alive {
            self.shared.cond.wait(&mut control);
        }
        log::info!("pause");
        Ok(())
    }

    /// Reposition to `tick`
    ///
    /// The next play starts from the first event at or after `tick`. Seeking
    /// to 0 also dispatches every tick-0 event before returning.
    ///
    /// # Errors
    ///
    /// [`Error::State`] while playing.
    pub fn position_to_time(&self, tick: u32) -> Result<()> {
        self.check_not_player()?;
        let mut control = self.shared.lock();
        self.check_running(control.closing, control.alive)?;
        if control.playing {
            return Err(Error::state("cannot reposition while playing"));
        }

        control.seek_target = Some(tick);
        self.shared.cond.notify_all();
        while control.seek_target.is_some() && control.alive {
            self.shared.cond.wait(&mut control);
        }
        self.check_running(control.closing, control.alive)
    }

    /// Replace the timeline and PPQN
    ///
    /// Playback position returns to where it last stopped, or to tick 0 if
    /// the old timeline had ended.
    ///
    /// # Errors
    ///
    /// [`Error::State`] while playing.
    pub fn update_sequence(&self, timeline: Timeline) -> Result<()> {
        self.check_not_player()?;
        let mut control = self.shared.lock();
        self.check_running(control.closing, control.alive)?;
        if control.playing {
            return Err(Error::state("cannot replace the timeline while playing"));
        }

        control.pending_timeline = Some(timeline);
        self.shared.cond.notify_all();
        while control.update_pending() && control.alive {
            self.shared.cond.wait(&mut control);
        }
        self.check_running(control.closing, control.alive)
    }

    /// Current tempo in microseconds per quarter note
    pub fn tempo(&self) -> u32 {
        self.shared.lock().tempo
    }

    /// Override the tempo
    ///
    /// During playback the time reference is re-anchored at the current tick,
    /// so the change applies from now on. A later tempo event in the
    /// timeline overrides it again.
    pub fn set_tempo(&self, tempo: u32) -> Result<()> {
        check_tempo(tempo)?;
        let mut control = self.shared.lock();
        control.tempo = tempo;
        if control.playing {
            control.tempo_changed = true;
        }
        Ok(())
    }

    pub fn state(&self) -> SequencerState {
        self.shared.lock().state()
    }

    /// Playhead tick, updated after every dispatch
    pub fn position(&self) -> u32 {
        self.shared.lock().position
    }

    /// Stop the playback thread and wait for it to exit
    ///
    /// Safe to call more than once and whether or not playback ever started.
    pub fn shutdown(&mut self) -> Result<()> {
        let Some(thread) = self.thread.take() else {
            return Ok(());
        };
        if thread::current().id() == self.player_id {
            return Err(Error::state("cannot shut down from the playback thread"));
        }

        {
            let mut control = self.shared.lock();
            control.closing = true;
            control.playing = false;
            self.shared.cond.notify_all();
        }

        thread
            .join()
            .map_err(|_| Error::Other("playback thread panicked".to_string()))?;
        log::info!("sequencer shut down");
        Ok(())
    }

    fn check_not_player(&self) -> Result<()> {
        if thread::current().id() == self.player_id {
            return Err(Error::state(
                "sequencer controls cannot be used from the listener",
            ));
        }
        Ok(())
    }

    fn check_running(&self, closing: bool, alive: bool) -> Result<()> {
        if closing {
            Err(Error::state("sequencer has been shut down"))
        } else if !alive {
            Err(Error::state("playback thread is not running"))
        } else {
            Ok(())
        }
    }
}

impl Drop for Sequencer {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            log::warn!("sequencer shutdown failed: {}", e);
        }
    }
}

impl std::fmt::Debug for Sequencer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sequencer")
            .field("state", &self.state())
            .field("position", &self.position())
            .field("tempo", &self.tempo())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Track;
    use crate::message::Message;
    use parking_lot::Mutex;
    use std::time::Duration;

    type Log = Arc<Mutex<Vec<String>>>;

    fn recorder() -> (Log, impl Listener + 'static) {
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&log);
        let listener = move |n: Notification<'_>| {
            let entry = match n {
                Notification::Play(event) => format!("{}", event),
                Notification::Reset => "reset".to_string(),
                Notification::End => "end".to_string(),
            };
            sink.lock().push(entry);
        };
        (log, listener)
    }

    fn timeline(ticks: &[u32]) -> Timeline {
        let events = ticks
            .iter()
            .enumerate()
            .map(|(i, &tick)| Event::new(Message::note_on(1, 60 + i as u8, 100), 0, tick))
            .collect();
        Timeline::new(events, 480).unwrap()
    }

    #[test]
    fn test_timeline_merges_tracks_stably() {
        let mut seq = Sequence::new(96);
        seq.tracks.push(Track::from_events(vec![
            Event::new(Message::program_change(1, 1), 0, 0),
            Event::new(Message::note_on(1, 60, 100), 0, 10),
        ]));
        seq.tracks.push(Track::from_events(vec![
            Event::new(Message::program_change(2, 2), 1, 0),
            Event::new(Message::note_on(2, 62, 100), 1, 5),
        ]));
        let timeline = Timeline::from_sequence(&seq).unwrap();
        let order: Vec<(usize, u32)> = timeline.events().iter().map(|e| (e.track, e.tick)).collect();
        assert_eq!(order, vec![(0, 0), (1, 0), (1, 5), (0, 10)]);
        assert_eq!(timeline.ppqn(), 96);
        assert_eq!(timeline.duration(), 10);
    }

    #[test]
    fn test_timeline_rejects_bad_timing() {
        let seq = Sequence::with_header(crate::event::Format::MultiTrack, Timing::Smpte(0x6728));
        assert!(Timeline::from_sequence(&seq).unwrap_err().is_argument());
        assert!(Timeline::new(Vec::new(), 0).unwrap_err().is_argument());
    }

    #[test]
    fn test_seek_to_zero_dispatches_tick_zero_once() {
        let (log, listener) = recorder();
        let sequencer = Sequencer::new(timeline(&[0, 0, 480]), listener).unwrap();
        sequencer.position_to_time(0).unwrap();
        assert_eq!(log.lock().len(), 2);
        assert_eq!(sequencer.state(), SequencerState::Idle);
    }

    #[test]
    fn test_seek_while_playing_is_state_error() {
        let (_log, listener) = recorder();
        let sequencer = Sequencer::new(timeline(&[0, 48_000]), listener).unwrap();
        sequencer.play().unwrap();
        let err = sequencer.position_to_time(0).unwrap_err();
        assert!(err.is_state());
        let err = sequencer.update_sequence(timeline(&[0])).unwrap_err();
        assert!(err.is_state());
        sequencer.pause().unwrap();
    }

    #[test]
    fn test_empty_timeline_ends_immediately() {
        let (log, listener) = recorder();
        let sequencer = Sequencer::new(timeline(&[]), listener).unwrap();
        sequencer.play().unwrap();
        for _ in 0..200 {
            if sequencer.state() == SequencerState::Ended {
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(sequencer.state(), SequencerState::Ended);
        assert_eq!(*log.lock(), vec!["end".to_string(), "reset".to_string()]);
    }

    #[test]
    fn test_controls_from_listener() {
        let slot: Arc<Mutex<Option<Arc<Sequencer>>>> = Arc::new(Mutex::new(None));
        let results = Arc::new(Mutex::new(Vec::new()));
        let listener = {
            let slot = Arc::clone(&slot);
            let results = Arc::clone(&results);
            move |n: Notification<'_>| {
                if let Notification::Play(_) = n {
                    let Some(sequencer) = slot.lock().take() else {
                        return;
                    };
                    let mut results = results.lock();
                    results.push(sequencer.pause().unwrap_err().is_state());
                    results.push(sequencer.position_to_time(0).unwrap_err().is_state());
                    results.push(sequencer.update_sequence(timeline(&[0])).unwrap_err().is_state());
                    results.push(sequencer.play().is_ok());
                    results.push(sequencer.set_tempo(500_000).is_ok());
                    results.push(sequencer.state() == SequencerState::Playing);
                }
            }
        };

        let sequencer = Arc::new(Sequencer::new(timeline(&[0, 10]), listener).unwrap());
        *slot.lock() = Some(Arc::clone(&sequencer));
        sequencer.play().unwrap();
        for _ in 0..200 {
            if sequencer.state() == SequencerState::Ended {
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(sequencer.state(), SequencerState::Ended);
        assert_eq!(*results.lock(), vec![true; 6]);
        assert_eq!(sequencer.tempo(), 500_000);
    }

    #[test]
    fn test_set_tempo_validates() {
        let (_log, listener) = recorder();
        let sequencer = Sequencer::new(timeline(&[0]), listener).unwrap();
        assert_eq!(sequencer.tempo(), DEFAULT_TEMPO);
        assert!(sequencer.set_tempo(0).unwrap_err().is_argument());
        sequencer.set_tempo(500_000).unwrap();
        assert_eq!(sequencer.tempo(), 500_000);
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let (_log, listener) = recorder();
        let mut sequencer = Sequencer::new(timeline(&[0]), listener).unwrap();
        sequencer.shutdown().unwrap();
        sequencer.shutdown().unwrap();
        assert!(sequencer.play().unwrap_err().is_state());
    }

    #[test]
    fn test_sink_listener_skips_meta() {
        let mut listener = SinkListener::new(Vec::<Message>::new());
        let tempo = Event::new(Message::tempo(500_000), 0, 0);
        let note = Event::new(Message::note_on(1, 60, 100), 0, 0);
        listener.notify(Notification::Play(&tempo));
        listener.notify(Notification::Play(&note));
        listener.notify(Notification::Reset);
        assert_eq!(listener.sink, vec![Message::note_on(1, 60, 100)]);
    }
}
