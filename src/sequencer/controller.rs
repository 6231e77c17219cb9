//! Transport façade for the UI: play/pause, stop, clear and pattern edits
use std::io;

use log::{info, warn};

use super::pattern::{GeneratedPattern, Pattern};
use super::playback::{PlaybackEvent, SequencerClock};
use super::SequencerState;
use crate::error::{GenerationError, ValidationError};
use crate::generate::{normalize_prompt, PatternGenerator};
use crate::instrument::InstrumentId;
use crate::samples::SampleBank;

/// What the UI talks to. It never sees the clock's scheduling primitives.
#[derive(Debug)]
pub struct PlaybackController {
    clock: SequencerClock,
}

impl PlaybackController {
    pub fn new(bank: impl SampleBank + 'static) -> io::Result<Self> {
        Self::with_pattern(Pattern::new(), bank)
    }

    pub fn with_pattern(pattern: Pattern, bank: impl SampleBank + 'static) -> io::Result<Self> {
        Ok(Self {
            clock: SequencerClock::new(pattern, bank)?,
        })
    }

    pub fn play(&self) {
        self.clock.start();
    }

    pub fn pause(&self) {
        self.clock.stop();
    }

    /// The Play/Pause button.
    pub fn toggle_play(&self) {
        if self.clock.is_running() {
            self.pause();
        } else {
            self.play();
        }
    }

    /// The Stop button: halts playback and parks the step display on step 0.
    pub fn stop(&self) {
        self.clock.reset();
    }

    /// The Clear button: halts playback and empties the grid.
    pub fn clear(&self) {
        self.clock.clear();
    }

    pub fn snapshot(&self) -> SequencerState {
        self.clock.state()
    }

    pub fn is_playing(&self) -> bool {
        self.clock.is_running()
    }

    pub fn pattern(&self) -> Pattern {
        self.clock.pattern()
    }

    pub fn bpm(&self) -> u16 {
        self.clock.with_pattern(Pattern::bpm)
    }

    pub fn toggle_step(
        &self,
        instrument: InstrumentId,
        step: usize,
    ) -> Result<bool, ValidationError> {
        self.clock.toggle_step(instrument, step)
    }

    pub fn set_bpm(&self, bpm: u16) -> Result<(), ValidationError> {
        self.clock.set_bpm(bpm)
    }

    /// Install a pattern from the generation collaborator, keeping the current
    /// one if it does not validate.
    pub fn load_generated(&self, incoming: &GeneratedPattern) -> Result<(), ValidationError> {
        match self.clock.replace_pattern(incoming) {
            Ok(()) => {
                let description = self.clock.with_pattern(|p| p.description().to_owned());
                info!("loaded generated pattern {description:?}");
                Ok(())
            }
            Err(err) => {
                warn!("rejected generated pattern: {err}");
                Err(err)
            }
        }
    }

    /// Ask `generator` for a pattern and load it. Blocks for as long as the
    /// generator takes; playback keeps running meanwhile.
    pub fn generate(
        &self,
        prompt: &str,
        generator: &dyn PatternGenerator,
    ) -> Result<(), GenerationError> {
        let prompt = normalize_prompt(prompt)?;
        let incoming = generator.generate(prompt).inspect_err(|err| {
            warn!("pattern generation failed: {err}");
        })?;
        Ok(self.load_generated(&incoming)?)
    }

    pub fn poll_events(&self) -> Vec<PlaybackEvent> {
        self.clock.poll_events()
    }
}
