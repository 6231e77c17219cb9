//! Playback clock - drives the sequencer from a timer thread
use std::io;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use log::{error, info};

use super::pattern::{GeneratedPattern, Pattern};
use super::{dispatch, Sequencer, SequencerState, TickReport, Warned};
use crate::error::ValidationError;
use crate::instrument::InstrumentId;
use crate::samples::SampleBank;

const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackEvent {
    StepAdvanced(usize),
    Triggered(InstrumentId),
}

struct Inner {
    sequencer: Sequencer,
    // bumped on every start so the worker knows to fire immediately
    run: u64,
    shutdown: bool,
}

struct Shared {
    inner: Mutex<Inner>,
    wake: Condvar,
    // held while a step's triggers fire; always taken before `inner`
    dispatch: Mutex<()>,
}

impl Shared {
    // Every mutation is a single assignment under the lock, so a poisoned
    // guard still holds consistent state.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn dispatch_gate(&self) -> MutexGuard<'_, ()> {
        self.dispatch.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wait<'a>(&self, guard: MutexGuard<'a, Inner>) -> MutexGuard<'a, Inner> {
        self.wake.wait(guard).unwrap_or_else(PoisonError::into_inner)
    }

    fn wait_timeout<'a>(
        &self,
        guard: MutexGuard<'a, Inner>,
        timeout: Duration,
    ) -> MutexGuard<'a, Inner> {
        self.wake
            .wait_timeout(guard, timeout)
            .unwrap_or_else(PoisonError::into_inner)
            .0
    }
}

/// One timer thread ticking a [`Sequencer`] against a [`SampleBank`].
///
/// A step is advanced under the state lock, then its triggers fire under a
/// separate dispatch gate. `stop`, `reset` and `clear` take the gate first, so
/// once they return no further trigger can fire, while reads and pattern edits
/// never wait on a slow [`SampleBank`]. The worker is joined on drop.
pub struct SequencerClock {
    shared: Arc<Shared>,
    events: Receiver<PlaybackEvent>,
    worker: Option<JoinHandle<()>>,
}

impl SequencerClock {
    pub fn new(pattern: Pattern, bank: impl SampleBank + 'static) -> io::Result<Self> {
        let shared = Arc::new(Shared {
            inner: Mutex::new(Inner {
                sequencer: Sequencer::new(pattern),
                run: 0,
                shutdown: false,
            }),
            wake: Condvar::new(),
            dispatch: Mutex::new(()),
        });
        let (sender, events) = bounded(EVENT_CAPACITY);

        let worker = thread::Builder::new().name("drumgrid-clock".into()).spawn({
            let shared = Arc::clone(&shared);
            move || run(&shared, &bank, &sender)
        })?;

        Ok(Self {
            shared,
            events,
            worker: Some(worker),
        })
    }

    /// Returns `false` if already running.
    pub fn start(&self) -> bool {
        let mut inner = self.shared.lock();
        if !inner.sequencer.start() {
            return false;
        }
        inner.run = inner.run.wrapping_add(1);
        self.shared.wake.notify_all();
        true
    }

    /// Waits for the triggers of a step in flight.
    pub fn stop(&self) {
        let _gate = self.shared.dispatch_gate();
        self.shared.lock().sequencer.stop();
        self.shared.wake.notify_all();
    }

    pub fn reset(&self) {
        let _gate = self.shared.dispatch_gate();
        self.shared.lock().sequencer.reset();
        self.shared.wake.notify_all();
    }

    pub fn clear(&self) {
        let _gate = self.shared.dispatch_gate();
        self.shared.lock().sequencer.clear();
        self.shared.wake.notify_all();
    }

    pub fn state(&self) -> SequencerState {
        self.shared.lock().sequencer.state()
    }

    pub fn is_running(&self) -> bool {
        self.state().is_running
    }

    /// Snapshot of the live pattern.
    pub fn pattern(&self) -> Pattern {
        self.shared.lock().sequencer.pattern().clone()
    }

    /// Read the live pattern without cloning it.
    pub fn with_pattern<R>(&self, f: impl FnOnce(&Pattern) -> R) -> R {
        f(self.shared.lock().sequencer.pattern())
    }

    pub fn step_interval(&self) -> Duration {
        self.shared.lock().sequencer.step_interval()
    }

    pub fn toggle_step(
        &self,
        instrument: InstrumentId,
        step: usize,
    ) -> Result<bool, ValidationError> {
        self.shared.lock().sequencer.toggle_step(instrument, step)
    }

    /// A new tempo also reschedules the pending tick.
    pub fn set_bpm(&self, bpm: u16) -> Result<(), ValidationError> {
        self.shared.lock().sequencer.set_bpm(bpm)?;
        self.shared.wake.notify_all();
        Ok(())
    }

    pub fn replace_pattern(&self, incoming: &GeneratedPattern) -> Result<(), ValidationError> {
        self.shared.lock().sequencer.replace_pattern(incoming)?;
        self.shared.wake.notify_all();
        Ok(())
    }

    pub fn poll_events(&self) -> Vec<PlaybackEvent> {
        self.events.try_iter().collect()
    }
}

impl Drop for SequencerClock {
    fn drop(&mut self) {
        {
            let _gate = self.shared.dispatch_gate();
            let mut inner = self.shared.lock();
            inner.sequencer.stop();
            inner.shutdown = true;
        }
        self.shared.wake.notify_all();

        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("clock thread panicked");
            }
        }
    }
}

impl std::fmt::Debug for SequencerClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SequencerClock")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

fn run(shared: &Shared, bank: &dyn SampleBank, events: &Sender<PlaybackEvent>) {
    let mut inner = shared.lock();
    let mut run = inner.run;
    let mut last_tick: Option<Instant> = None;
    let mut warned = Warned::default();

    loop {
        if inner.shutdown {
            break;
        }

        if !inner.sequencer.is_running() {
            last_tick = None;
            inner = shared.wait(inner);
            continue;
        }

        if inner.run != run {
            run = inner.run;
            last_tick = None;
            warned = Warned::default();
        }

        // re-read every time so tempo changes hit the pending tick
        let interval = inner.sequencer.step_interval();
        let now = Instant::now();
        let due = last_tick.map(|last| last + interval);
        if let Some(due) = due {
            if now < due {
                inner = shared.wait_timeout(inner, due - now);
                continue;
            }
        }

        // gate before state, then check nobody stopped us in between
        drop(inner);
        let gate = shared.dispatch_gate();
        inner = shared.lock();
        if inner.shutdown || inner.run != run {
            continue;
        }
        let Some(step) = inner.sequencer.advance() else {
            continue;
        };
        drop(inner);

        let report = dispatch(bank, step, &mut warned);
        publish(events, &report);
        drop(gate);

        // stay on the grid unless we fell a whole step behind
        last_tick = Some(match due {
            Some(due) if now.duration_since(due) < interval => due,
            _ => now,
        });
        inner = shared.lock();
    }

    info!("clock thread exiting");
}

fn publish(events: &Sender<PlaybackEvent>, report: &TickReport) {
    let step = std::iter::once(PlaybackEvent::StepAdvanced(report.step));
    let hits = report.triggered.iter().copied().map(PlaybackEvent::Triggered);
    for event in step.chain(hits) {
        // nobody polling is fine, the clock never waits on the UI
        if let Err(TrySendError::Disconnected(_)) = events.try_send(event) {
            return;
        }
    }
}
