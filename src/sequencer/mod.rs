//! Core sequencer logic - pattern state and step management
//! Timing lives in `playback`, this module only knows what one tick does.
use std::time::Duration;

use log::{debug, info, trace, warn};
use strum::EnumCount;

use crate::error::ValidationError;
use crate::instrument::InstrumentId;
use crate::samples::SampleBank;

pub mod controller;
pub mod pattern;
pub mod playback;

use pattern::{step_interval, GeneratedPattern, Pattern, STEPS};

/// Read-only projection of the sequencer for rendering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SequencerState {
    pub is_running: bool,
    /// `None` while stopped, the step last played while running.
    pub current_step: Option<usize>,
}

/// What a single tick did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub step: usize,
    pub triggered: Vec<InstrumentId>,
    pub failed: Vec<InstrumentId>,
}

#[derive(Debug, Default)]
pub struct Sequencer {
    pattern: Pattern,
    is_running: bool,
    current_step: Option<usize>,
    // one warning per instrument per run, repeats go to debug
    warned: Warned,
}

impl Sequencer {
    pub fn new(pattern: Pattern) -> Self {
        Self {
            pattern,
            ..Self::default()
        }
    }

    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    pub fn state(&self) -> SequencerState {
        SequencerState {
            is_running: self.is_running,
            current_step: self.current_step,
        }
    }

    pub fn is_running(&self) -> bool {
        self.is_running
    }

    pub fn current_step(&self) -> Option<usize> {
        self.current_step
    }

    /// Interval until the next tick, derived from the live tempo.
    pub fn step_interval(&self) -> Duration {
        step_interval(self.pattern.bpm())
    }

    /// Returns `false` if already running.
    pub fn start(&mut self) -> bool {
        if self.is_running {
            return false;
        }
        info!("sequencer started at {} bpm", self.pattern.bpm());
        self.is_running = true;
        // the first tick lands on step 0
        self.current_step = None;
        self.warned = [false; InstrumentId::COUNT];
        true
    }

    pub fn stop(&mut self) {
        if self.is_running {
            info!("sequencer stopped");
        }
        self.is_running = false;
        self.current_step = None;
    }

    /// Stop, but leave the step display parked on the first step.
    pub fn reset(&mut self) {
        self.stop();
        self.current_step = Some(0);
    }

    /// Stop and empty every track.
    pub fn clear(&mut self) {
        self.stop();
        self.pattern.clear();
    }

    pub fn toggle_step(
        &mut self,
        instrument: InstrumentId,
        step: usize,
    ) -> Result<bool, ValidationError> {
        self.pattern.toggle_step(instrument, step)
    }

    pub fn set_bpm(&mut self, bpm: u16) -> Result<(), ValidationError> {
        self.pattern.set_bpm(bpm)
    }

    pub fn replace_pattern(&mut self, incoming: &GeneratedPattern) -> Result<(), ValidationError> {
        self.pattern.replace(incoming)
    }

    /// Move to the next step and collect the instruments due on it, without
    /// triggering anything. Returns `None` when stopped.
    pub fn advance(&mut self) -> Option<Step> {
        if !self.is_running {
            return None;
        }

        let index = self.current_step.map_or(0, |step| (step + 1) % STEPS);
        self.current_step = Some(index);
        trace!("tick {index}");

        Some(Step {
            index,
            hits: self.pattern.active_at(index).collect(),
        })
    }

    /// Advance one step and trigger every instrument active on it.
    pub fn tick(&mut self, bank: &dyn SampleBank) -> Option<TickReport> {
        let step = self.advance()?;
        Some(dispatch(bank, step, &mut self.warned))
    }
}

/// A step the sequencer moved to, with the instruments active on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub index: usize,
    pub hits: Vec<InstrumentId>,
}

/// Per-instrument "already warned" flags, reset at the start of every run.
pub(crate) type Warned = [bool; InstrumentId::COUNT];

/// Trigger every hit of `step` on `bank`.
///
/// Trigger failures are logged and swallowed so one bad sample cannot stall the
/// beat.
pub(crate) fn dispatch(bank: &dyn SampleBank, step: Step, warned: &mut Warned) -> TickReport {
    let mut report = TickReport {
        step: step.index,
        ..TickReport::default()
    };
    for instrument in step.hits {
        match bank.trigger(instrument) {
            Ok(()) => report.triggered.push(instrument),
            Err(err) => {
                let warned = &mut warned[instrument.index()];
                if *warned {
                    debug!("failed to trigger {instrument}: {err}");
                } else {
                    warn!("failed to trigger {instrument}: {err}");
                    *warned = true;
                }
                report.failed.push(instrument);
            }
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PlaybackError;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        hits: Mutex<Vec<InstrumentId>>,
        broken: Option<InstrumentId>,
    }

    impl SampleBank for Recorder {
        fn trigger(&self, instrument: InstrumentId) -> Result<(), PlaybackError> {
            self.hits.lock().unwrap().push(instrument);
            if self.broken == Some(instrument) {
                return Err(PlaybackError::SampleNotLoaded(instrument));
            }
            Ok(())
        }
    }

    #[test]
    fn test_stopped_sequencer_does_not_tick() {
        let mut seq = Sequencer::default();
        let bank = Recorder::default();
        assert_eq!(seq.tick(&bank), None);
        assert_eq!(seq.state(), SequencerState::default());
    }

    #[test]
    fn test_first_tick_is_step_zero() {
        let mut seq = Sequencer::default();
        seq.toggle_step(InstrumentId::Kick, 0).unwrap();
        let bank = Recorder::default();

        assert!(seq.start());
        assert_eq!(seq.current_step(), None);
        let report = seq.tick(&bank).unwrap();
        assert_eq!(report.step, 0);
        assert_eq!(report.triggered, [InstrumentId::Kick]);
        assert_eq!(*bank.hits.lock().unwrap(), [InstrumentId::Kick]);
    }

    #[test]
    fn test_steps_wrap() {
        let mut seq = Sequencer::default();
        let bank = Recorder::default();
        seq.start();
        let steps: Vec<usize> = (0..40).map(|_| seq.tick(&bank).unwrap().step).collect();
        let expected: Vec<usize> = (0..40).map(|i| i % STEPS).collect();
        assert_eq!(steps, expected);
    }

    #[test]
    fn test_start_twice_is_noop() {
        let mut seq = Sequencer::default();
        let bank = Recorder::default();
        assert!(seq.start());
        seq.tick(&bank);
        seq.tick(&bank);
        assert!(!seq.start());
        assert_eq!(seq.current_step(), Some(1));
    }

    #[test]
    fn test_stop_and_reset_sentinels() {
        let mut seq = Sequencer::default();
        let bank = Recorder::default();
        seq.start();
        seq.tick(&bank);
        seq.tick(&bank);

        seq.stop();
        assert_eq!(
            seq.state(),
            SequencerState {
                is_running: false,
                current_step: None
            }
        );

        seq.start();
        seq.tick(&bank);
        seq.reset();
        assert_eq!(
            seq.state(),
            SequencerState {
                is_running: false,
                current_step: Some(0)
            }
        );
        assert_eq!(seq.tick(&bank), None);

        // a run after reset still begins on step 0
        seq.start();
        assert_eq!(seq.tick(&bank).unwrap().step, 0);
    }

    #[test]
    fn test_clear_stops_and_empties() {
        let mut seq = Sequencer::default();
        seq.toggle_step(InstrumentId::Snare, 4).unwrap();
        seq.set_bpm(150).unwrap();
        seq.start();
        seq.clear();
        assert!(!seq.is_running());
        assert!(seq.pattern().is_empty());
        assert_eq!(seq.pattern().bpm(), 150);
    }

    #[test]
    fn test_failed_trigger_does_not_block_others() {
        let mut seq = Sequencer::default();
        for instrument in InstrumentId::all() {
            seq.toggle_step(instrument, 0).unwrap();
        }
        let bank = Recorder {
            broken: Some(InstrumentId::Snare),
            ..Recorder::default()
        };
        seq.start();
        let report = seq.tick(&bank).unwrap();
        assert_eq!(report.failed, [InstrumentId::Snare]);
        assert_eq!(report.triggered.len(), InstrumentId::COUNT - 1);
        assert_eq!(bank.hits.lock().unwrap().len(), InstrumentId::COUNT);
        // the clock keeps going
        assert_eq!(seq.tick(&bank).unwrap().step, 1);
    }

    #[test]
    fn test_pattern_edits_visible_on_next_tick() {
        let mut seq = Sequencer::default();
        let bank = Recorder::default();
        seq.start();
        seq.tick(&bank);
        seq.toggle_step(InstrumentId::Openhat, 1).unwrap();
        assert_eq!(seq.tick(&bank).unwrap().triggered, [InstrumentId::Openhat]);
    }

    #[test]
    fn test_tempo_change_applies_to_next_interval() {
        let mut seq = Sequencer::default();
        let bank = Recorder::default();
        seq.start();
        seq.tick(&bank);
        assert_eq!(seq.step_interval(), Duration::from_millis(125));
        seq.set_bpm(180).unwrap();
        seq.tick(&bank);
        assert_eq!(seq.step_interval(), step_interval(180));
        assert!(seq.is_running());
    }

    #[test]
    fn test_advance_collects_hits_without_triggering() {
        let mut seq = Sequencer::default();
        seq.toggle_step(InstrumentId::Kick, 0).unwrap();
        seq.toggle_step(InstrumentId::Clap, 0).unwrap();
        assert_eq!(seq.advance(), None);

        seq.start();
        let step = seq.advance().unwrap();
        assert_eq!(step.index, 0);
        assert_eq!(step.hits, [InstrumentId::Kick, InstrumentId::Clap]);
        assert_eq!(seq.current_step(), Some(0));

        let bank = Recorder {
            broken: Some(InstrumentId::Clap),
            ..Recorder::default()
        };
        let mut warned = Warned::default();
        let report = dispatch(&bank, step, &mut warned);
        assert_eq!(report.triggered, [InstrumentId::Kick]);
        assert_eq!(report.failed, [InstrumentId::Clap]);
        assert!(warned[InstrumentId::Clap.index()]);
    }
}
