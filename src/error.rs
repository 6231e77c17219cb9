use std::{
    error::Error,
    fmt::{Display, Formatter},
    path::PathBuf,
};

use rubato::{ResampleError, ResamplerConstructionError};
use symphonia::core::errors::Error as SymphoniaError;

use crate::instrument::InstrumentId;
use crate::sequencer::pattern::{MAX_BPM, MIN_BPM, STEPS};

/// A pattern mutation or an incoming pattern was rejected before any state changed.
#[derive(Clone, Debug, PartialEq)]
pub enum ValidationError {
    StepOutOfRange { step: usize },
    UnknownInstrument(String),
    BpmOutOfRange(f64),
    MissingTrack(InstrumentId),
    WrongTrackLength { instrument: InstrumentId, len: usize },
    Malformed(String),
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StepOutOfRange { step } => {
                write!(f, "step {step} is outside 0..{STEPS}")
            }
            Self::UnknownInstrument(name) => write!(f, "unknown instrument {name:?}"),
            Self::BpmOutOfRange(bpm) => {
                write!(f, "bpm {bpm} is outside {MIN_BPM}..={MAX_BPM}")
            }
            Self::MissingTrack(instrument) => write!(f, "pattern has no {instrument} track"),
            Self::WrongTrackLength { instrument, len } => {
                write!(f, "{instrument} track has {len} steps, expected {STEPS}")
            }
            Self::Malformed(reason) => write!(f, "malformed pattern: {reason}"),
        }
    }
}

impl Error for ValidationError {}

#[derive(Debug)]
pub enum RubatoError {
    ResamplerConstructionError(ResamplerConstructionError),
    ResampleError(ResampleError),
}

impl Display for RubatoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ResamplerConstructionError(err) => err.fmt(f),
            Self::ResampleError(err) => err.fmt(f),
        }
    }
}

impl Error for RubatoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(match self {
            Self::ResamplerConstructionError(err) => err,
            Self::ResampleError(err) => err,
        })
    }
}

impl From<ResamplerConstructionError> for RubatoError {
    fn from(value: ResamplerConstructionError) -> Self {
        Self::ResamplerConstructionError(value)
    }
}

impl From<ResampleError> for RubatoError {
    fn from(value: ResampleError) -> Self {
        Self::ResampleError(value)
    }
}

/// Opening or running the cpal output stream failed.
#[derive(Debug)]
pub enum DeviceError {
    NoDevice,
    Devices(cpal::DevicesError),
    Config(cpal::DefaultStreamConfigError),
    Build(cpal::BuildStreamError),
    Play(cpal::PlayStreamError),
}

impl Display for DeviceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoDevice => f.write_str("no output device"),
            Self::Devices(err) => err.fmt(f),
            Self::Config(err) => err.fmt(f),
            Self::Build(err) => err.fmt(f),
            Self::Play(err) => err.fmt(f),
        }
    }
}

impl Error for DeviceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::NoDevice => None,
            Self::Devices(err) => Some(err),
            Self::Config(err) => Some(err),
            Self::Build(err) => Some(err),
            Self::Play(err) => Some(err),
        }
    }
}

impl From<cpal::DevicesError> for DeviceError {
    fn from(value: cpal::DevicesError) -> Self {
        Self::Devices(value)
    }
}

impl From<cpal::DefaultStreamConfigError> for DeviceError {
    fn from(value: cpal::DefaultStreamConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<cpal::BuildStreamError> for DeviceError {
    fn from(value: cpal::BuildStreamError) -> Self {
        Self::Build(value)
    }
}

impl From<cpal::PlayStreamError> for DeviceError {
    fn from(value: cpal::PlayStreamError) -> Self {
        Self::Play(value)
    }
}

#[derive(Debug)]
pub enum MidiError {
    NoSuchPort(String),
    Init(midir::InitError),
    Connect(midir::ConnectErrorKind),
    Send(midir::SendError),
}

impl Display for MidiError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoSuchPort(port) => write!(f, "no MIDI port {port}"),
            Self::Init(err) => err.fmt(f),
            Self::Connect(err) => err.fmt(f),
            Self::Send(err) => err.fmt(f),
        }
    }
}

impl Error for MidiError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::NoSuchPort(_) | Self::Connect(_) => None,
            Self::Init(err) => Some(err),
            Self::Send(err) => Some(err),
        }
    }
}

impl From<midir::InitError> for MidiError {
    fn from(value: midir::InitError) -> Self {
        Self::Init(value)
    }
}

impl<T> From<midir::ConnectError<T>> for MidiError {
    fn from(value: midir::ConnectError<T>) -> Self {
        Self::Connect(value.kind())
    }
}

impl From<midir::SendError> for MidiError {
    fn from(value: midir::SendError) -> Self {
        Self::Send(value)
    }
}

/// A sample could not be loaded or started. Contained inside the trigger path.
#[derive(Debug)]
pub enum PlaybackError {
    SampleNotLoaded(InstrumentId),
    Decode { path: PathBuf, source: SymphoniaError },
    Resample(RubatoError),
    Device(DeviceError),
    UnsupportedFormat(cpal::SampleFormat),
    Disconnected,
    Midi(MidiError),
}

impl Display for PlaybackError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SampleNotLoaded(instrument) => write!(f, "no sample loaded for {instrument}"),
            Self::Decode { path, source } => {
                write!(f, "failed to decode {}: {source}", path.display())
            }
            Self::Resample(err) => write!(f, "failed to resample: {err}"),
            Self::Device(err) => write!(f, "audio device error: {err}"),
            Self::UnsupportedFormat(format) => write!(f, "unsupported sample format {format:?}"),
            Self::Disconnected => f.write_str("audio output is closed"),
            Self::Midi(err) => write!(f, "MIDI error: {err}"),
        }
    }
}

impl Error for PlaybackError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Decode { source, .. } => Some(source),
            Self::Resample(err) => Some(err),
            Self::Device(err) => Some(err),
            Self::Midi(err) => Some(err),
            Self::SampleNotLoaded(_) | Self::UnsupportedFormat(_) | Self::Disconnected => None,
        }
    }
}

impl From<RubatoError> for PlaybackError {
    fn from(value: RubatoError) -> Self {
        Self::Resample(value)
    }
}

impl From<DeviceError> for PlaybackError {
    fn from(value: DeviceError) -> Self {
        Self::Device(value)
    }
}

impl From<MidiError> for PlaybackError {
    fn from(value: MidiError) -> Self {
        Self::Midi(value)
    }
}

/// The pattern-generation collaborator did not produce a usable pattern.
#[derive(Debug)]
pub enum GenerationError {
    EmptyPrompt,
    Collaborator(String),
    Invalid(ValidationError),
}

impl Display for GenerationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyPrompt => f.write_str("prompt is empty"),
            Self::Collaborator(reason) => write!(f, "pattern generation failed: {reason}"),
            Self::Invalid(err) => err.fmt(f),
        }
    }
}

impl Error for GenerationError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Invalid(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ValidationError> for GenerationError {
    fn from(value: ValidationError) -> Self {
        Self::Invalid(value)
    }
}
