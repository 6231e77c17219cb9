//! drumgrid - the engine of a 16-step drum machine
//!
//! This library provides the pieces behind the drum machine UI:
//! - A five-instrument pattern grid with tempo validation
//! - A sequencer clock that fires sample triggers on a timer thread
//! - A playback controller the UI drives (play/pause, stop, clear)
//! - Audio output for decoded samples, MIDI output as a mirror
//! - The seam to the text-to-pattern generator

pub mod audio;
pub mod config;
pub mod error;
pub mod generate;
pub mod instrument;
pub mod midi;
pub mod samples;
pub mod sequencer;

// Re-export commonly used types
pub use audio::{AudioOutput, AudioSampleBank, Sample};
pub use config::Config;
pub use error::{
    DeviceError, GenerationError, MidiError, PlaybackError, RubatoError, ValidationError,
};
pub use generate::{CommandGenerator, PatternGenerator};
pub use instrument::InstrumentId;
pub use midi::{MidiOutputDevice, MidiSampleBank};
pub use samples::{Layered, SampleBank, SilentBank};
pub use sequencer::controller::PlaybackController;
pub use sequencer::pattern::{step_interval, GeneratedPattern, Pattern, STEPS};
pub use sequencer::playback::{PlaybackEvent, SequencerClock};
pub use sequencer::{Sequencer, SequencerState, Step, TickReport};
