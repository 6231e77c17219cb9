//! Drum pattern: one 16-step track per instrument, plus tempo and description
use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum::EnumCount;

use crate::error::ValidationError;
use crate::instrument::InstrumentId;

pub const STEPS: usize = 16;
pub const MIN_BPM: u16 = 60;
pub const MAX_BPM: u16 = 200;
pub const DEFAULT_BPM: u16 = 120;

/// One-click tempo choices offered next to the tempo slider.
pub const BPM_PRESETS: [u16; 5] = [60, 90, 120, 140, 180];

/// Length of one sixteenth-note step at `bpm`, i.e. `60000 / bpm / 4` ms.
pub fn step_interval(bpm: u16) -> Duration {
    // 60s / 4 steps per beat, in nanoseconds
    Duration::from_nanos(15_000_000_000 / u64::from(bpm.max(1)))
}

pub type Track = [bool; STEPS];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    tracks: [Track; InstrumentId::COUNT],
    bpm: u16,
    description: String,
}

impl Default for Pattern {
    fn default() -> Self {
        Self::new()
    }
}

impl Pattern {
    /// Empty grid at the default tempo.
    pub fn new() -> Self {
        Self {
            tracks: [[false; STEPS]; InstrumentId::COUNT],
            bpm: DEFAULT_BPM,
            description: String::new(),
        }
    }

    pub fn bpm(&self) -> u16 {
        self.bpm
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn track(&self, instrument: InstrumentId) -> &Track {
        &self.tracks[instrument.index()]
    }

    /// Out-of-range steps read as inactive.
    pub fn is_active(&self, instrument: InstrumentId, step: usize) -> bool {
        self.track(instrument).get(step).copied().unwrap_or(false)
    }

    /// Instruments that have a hit on `step`.
    pub fn active_at(&self, step: usize) -> impl Iterator<Item = InstrumentId> + '_ {
        InstrumentId::all().filter(move |&instrument| self.is_active(instrument, step))
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.iter().flatten().all(|active| !active)
    }

    /// Flip one cell, returning its new value.
    pub fn toggle_step(
        &mut self,
        instrument: InstrumentId,
        step: usize,
    ) -> Result<bool, ValidationError> {
        let cell = self.tracks[instrument.index()]
            .get_mut(step)
            .ok_or(ValidationError::StepOutOfRange { step })?;
        *cell = !*cell;
        Ok(*cell)
    }

    /// Same as [`Pattern::toggle_step`] for an instrument named by the caller.
    pub fn toggle_named_step(
        &mut self,
        instrument: &str,
        step: usize,
    ) -> Result<bool, ValidationError> {
        let instrument = InstrumentId::parse(instrument)?;
        self.toggle_step(instrument, step)
    }

    pub fn set_bpm(&mut self, bpm: u16) -> Result<(), ValidationError> {
        if !(MIN_BPM..=MAX_BPM).contains(&bpm) {
            return Err(ValidationError::BpmOutOfRange(f64::from(bpm)));
        }
        self.bpm = bpm;
        Ok(())
    }

    /// Silence every track. Tempo and description are kept.
    pub fn clear(&mut self) {
        for track in &mut self.tracks {
            *track = [false; STEPS];
        }
    }

    /// Swap in a generated pattern wholesale. Nothing changes if it does not validate.
    pub fn replace(&mut self, incoming: &GeneratedPattern) -> Result<(), ValidationError> {
        *self = incoming.validate()?;
        Ok(())
    }
}

/// Pattern as delivered by the generation collaborator, before validation.
///
/// Every field is optional so a missing track is reported by name instead of as a
/// generic deserialization failure. Unknown keys are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratedPattern {
    pub kick: Option<Vec<bool>>,
    pub snare: Option<Vec<bool>>,
    pub hihat: Option<Vec<bool>>,
    pub openhat: Option<Vec<bool>>,
    pub clap: Option<Vec<bool>>,
    pub bpm: Option<f64>,
    pub description: Option<String>,
}

impl GeneratedPattern {
    pub fn from_json(json: &str) -> Result<Self, ValidationError> {
        serde_json::from_str(json).map_err(|e| ValidationError::Malformed(e.to_string()))
    }

    pub fn track(&self, instrument: InstrumentId) -> Option<&[bool]> {
        match instrument {
            InstrumentId::Kick => self.kick.as_deref(),
            InstrumentId::Snare => self.snare.as_deref(),
            InstrumentId::Hihat => self.hihat.as_deref(),
            InstrumentId::Openhat => self.openhat.as_deref(),
            InstrumentId::Clap => self.clap.as_deref(),
        }
    }

    /// Check the shape and build a [`Pattern`] from it.
    pub fn validate(&self) -> Result<Pattern, ValidationError> {
        let mut pattern = Pattern::new();

        for instrument in InstrumentId::all() {
            let steps = self
                .track(instrument)
                .ok_or(ValidationError::MissingTrack(instrument))?;
            let track: Track = steps
                .try_into()
                .map_err(|_| ValidationError::WrongTrackLength {
                    instrument,
                    len: steps.len(),
                })?;
            pattern.tracks[instrument.index()] = track;
        }

        let bpm = self
            .bpm
            .ok_or_else(|| ValidationError::Malformed("missing bpm".into()))?;
        if !bpm.is_finite() || bpm < f64::from(MIN_BPM) || bpm > f64::from(MAX_BPM) {
            return Err(ValidationError::BpmOutOfRange(bpm));
        }
        pattern.bpm = bpm.round() as u16;
        pattern.description = self.description.clone().unwrap_or_default();

        Ok(pattern)
    }
}

impl From<&Pattern> for GeneratedPattern {
    fn from(pattern: &Pattern) -> Self {
        let track = |instrument| Some(pattern.track(instrument).to_vec());
        Self {
            kick: track(InstrumentId::Kick),
            snare: track(InstrumentId::Snare),
            hihat: track(InstrumentId::Hihat),
            openhat: track(InstrumentId::Openhat),
            clap: track(InstrumentId::Clap),
            bpm: Some(f64::from(pattern.bpm)),
            description: Some(pattern.description.clone()),
        }
    }
}
