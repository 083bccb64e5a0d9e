//! The playback thread
//!
//! Callers and the player share one [`Control`] block behind a mutex, with a
//! condition variable for both directions: callers wake the player with
//! requests, and the player wakes callers when a request has been carried out.
//! The listener is owned by the player and always called without the lock.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::{Condvar, Mutex, MutexGuard};

use super::config::SequencerConfig;
use super::timing::TimeReference;
use super::{Listener, Notification, SequencerState, Timeline};
use crate::traits::Clock;

/// State shared between the [`Sequencer`](super::Sequencer) handle and the player
pub(super) struct Shared {
    pub control: Mutex<Control>,
    pub cond: Condvar,
}

impl Shared {
    pub fn new(tempo: u32) -> Self {
        Self {
            control: Mutex::new(Control {
                playing: false,
                closing: false,
                in_loop: false,
                alive: true,
                ended: false,
                seek_target: None,
                pending_timeline: None,
                installing: false,
                tempo,
                tempo_changed: false,
                position: 0,
                time_when_stopped: 0,
            }),
            cond: Condvar::new(),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, Control> {
        self.control.lock()
    }
}

pub(super) struct Control {
    /// Set by play, cleared by pause and at the end of the timeline
    pub playing: bool,
    /// Set once on shutdown; the player exits
    pub closing: bool,
    /// Set by the player while inside the timed dispatch loop
    pub in_loop: bool,
    /// Cleared when the player thread exits, normally or not
    pub alive: bool,
    /// The cursor ran off the end of the timeline
    pub ended: bool,
    /// Reposition request; cleared by the player once done
    pub seek_target: Option<u32>,
    /// Replacement timeline, taken by the player
    pub pending_timeline: Option<Timeline>,
    /// Set while the player installs a taken timeline
    pub installing: bool,
    /// Microseconds per quarter note
    pub tempo: u32,
    /// Tempo set by a caller during playback, player must re-anchor
    pub tempo_changed: bool,
    /// Playhead tick
    pub position: u32,
    /// Tick of the next undispatched event when playback last stopped
    pub time_when_stopped: u32,
}

impl Control {
    pub fn state(&self) -> SequencerState {
        if self.seek_target.is_some() || self.update_pending() {
            SequencerState::Seeking
        } else if self.playing {
            SequencerState::Playing
        } else if self.ended {
            SequencerState::Ended
        } else {
            SequencerState::Idle
        }
    }

    /// An update has been requested and not yet fully installed
    pub fn update_pending(&self) -> bool {
        self.pending_timeline.is_some() || self.installing
    }

    fn has_request(&self) -> bool {
        self.playing || self.closing || self.seek_target.is_some() || self.pending_timeline.is_some()
    }
}

enum Request {
    Update(Timeline),
    Seek(u32),
    Play,
}

pub(super) struct Player {
    shared: Arc<Shared>,
    listener: Box<dyn Listener>,
    clock: Box<dyn Clock>,
    config: SequencerConfig,
    timeline: Timeline,
    /// Index of the next event to dispatch
    cursor: usize,
    /// Playhead tick the next play starts from
    position: u32,
    reference: TimeReference,
}

impl Player {
    pub fn new(
        shared: Arc<Shared>,
        listener: Box<dyn Listener>,
        clock: Box<dyn Clock>,
        config: SequencerConfig,
        timeline: Timeline,
    ) -> Self {
        Self {
            shared,
            listener,
            clock,
            config,
            timeline,
            cursor: 0,
            position: 0,
            reference: TimeReference::new(0, 0),
        }
    }

    /// Thread body
    pub fn run(mut self) {
        let _exit = ExitGuard(Arc::clone(&self.shared));

        loop {
            let request = {
                let mut control = self.shared.lock();
                while !control.has_request() {
                    self.shared.cond.wait(&mut control);
                }
                if control.closing {
                    break;
                }
                if let Some(timeline) = control.pending_timeline.take() {
                    control.installing = true;
                    Request::Update(timeline)
                } else if let Some(target) = control.seek_target {
                    Request::Seek(target)
                } else {
                    control.in_loop = true;
                    Request::Play
                }
            };

            match request {
                Request::Update(timeline) => self.install(timeline),
                Request::Seek(target) => {
                    self.seek(target);
                    let mut control = self.shared.lock();
                    control.seek_target = None;
                    self.shared.cond.notify_all();
                }
                Request::Play => self.play(),
            }
        }

        log::debug!("playback thread exiting");
    }

    /// Swap in a new timeline and return to where playback last stopped
    fn install(&mut self, timeline: Timeline) {
        let target = {
            let control = self.shared.lock();
            if control.ended {
                0
            } else {
                control.time_when_stopped
            }
        };
        log::debug!(
            "installing timeline of {} events at {} PPQN",
            timeline.len(),
            timeline.ppqn()
        );
        self.timeline = timeline;
        self.seek(target);

        let mut control = self.shared.lock();
        control.installing = false;
        self.shared.cond.notify_all();
    }

    /// Move the cursor to the first event at or after `target`
    ///
    /// Seeking to tick 0 dispatches every tick-0 event right away so initial
    /// tempo, patch and controller state is applied before play.
    fn seek(&mut self, target: u32) {
        self.cursor = self
            .timeline
            .events()
            .iter()
            .position(|e| e.tick >= target)
            .unwrap_or(self.timeline.len());
        self.position = target;

        let mut tempo = self.shared.lock().tempo;
        if target == 0 {
            self.reference = TimeReference::new(self.clock.now_micros(), 0);
            self.dispatch_through(0, &mut tempo);
        }

        let mut control = self.shared.lock();
        control.ended = false;
        control.position = target;
        control.time_when_stopped = target;
        log::info!("positioned at tick {}", target);
    }

    fn play(&mut self) {
        let ppqn = self.timeline.ppqn();
        let threshold = self.config.coarse_sleep_threshold.as_micros() as u64;
        let mut tempo = self.shared.lock().tempo;
        let mut ended = false;

        self.reference = TimeReference::new(self.clock.now_micros(), self.position);
        log::info!("playing from tick {}", self.position);

        loop {
            let Some(next_tick) = self.next_tick() else {
                ended = true;
                break;
            };

            {
                let mut control = self.shared.lock();
                if !control.playing || control.closing {
                    break;
                }
                if control.tempo_changed {
                    control.tempo_changed = false;
                    let now = self.clock.now_micros();
                    let tick = self.reference.tick_at(now, tempo, ppqn);
                    self.reference = TimeReference::new(now, tick);
                    tempo = control.tempo;
                }
            }

            let now = self.clock.now_micros();
            let due = self.reference.micros_at(next_tick, tempo, ppqn);
            let wait = due.saturating_sub(now);
            if wait > threshold {
                let sleep = Duration::from_micros(wait / 2).min(self.config.max_sleep);
                thread::sleep(sleep);
                continue;
            }
            if wait > 0 {
                thread::yield_now();
                continue;
            }

            // Integer rounding can put the computed tick just short of an
            // event that is already due
            let current = self.reference.tick_at(now, tempo, ppqn).max(next_tick);
            self.dispatch_through(current, &mut tempo);
            self.position = current;
            self.shared.lock().position = current;
        }

        if ended {
            log::info!("end of timeline");
            self.listener.notify(Notification::End);
            self.position = self.timeline.duration();
        } else {
            let now = self.clock.now_micros();
            let stopped_at = self.reference.tick_at(now, tempo, ppqn);
            self.position = self
                .next_tick()
                .map_or(stopped_at, |next| stopped_at.min(next))
                .max(self.position);
            log::info!("paused at tick {}", self.position);
        }

        self.listener.notify(Notification::Reset);

        let mut control = self.shared.lock();
        if ended {
            control.playing = false;
            control.ended = true;
            control.time_when_stopped = 0;
        } else {
            control.time_when_stopped = self.next_tick().unwrap_or(0);
        }
        control.position = self.position;
        control.in_loop = false;
        self.shared.cond.notify_all();
    }

    /// Dispatch every event up to and including `tick`, in timeline order
    fn dispatch_through(&mut self, tick: u32, tempo: &mut u32) {
        let ppqn = self.timeline.ppqn();
        while let Some(event) = self.timeline.events().get(self.cursor) {
            if event.tick > tick {
                break;
            }
            if let Some(new_tempo) = event.message.as_tempo().filter(|&t| t > 0) {
                *tempo = new_tempo;
                self.reference = TimeReference::new(self.clock.now_micros(), event.tick);
                self.shared.lock().tempo = new_tempo;
                log::debug!(
                    "tempo {} us/quarter at tick {} ({} PPQN)",
                    new_tempo,
                    event.tick,
                    ppqn
                );
            }
            self.listener.notify(Notification::Play(event));
            self.cursor += 1;
        }
    }

    fn next_tick(&self) -> Option<u32> {
        self.timeline.events().get(self.cursor).map(|e| e.tick)
    }
}

/// Marks the player gone when the thread exits, even by panic, so callers
/// waiting on an acknowledgement do not hang
struct ExitGuard(Arc<Shared>);

impl Drop for ExitGuard {
    fn drop(&mut self) {
        let mut control = self.0.lock();
        control.alive = false;
        control.playing = false;
        control.in_loop = false;
        self.0.cond.notify_all();
    }
}
