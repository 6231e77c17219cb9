use std::{
    error::Error,
    fmt::{Display, Formatter},
    fs::{create_dir_all, read_to_string, write},
    io,
    path::{Path, PathBuf},
    sync::LazyLock,
};

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::audio::DEFAULT_VOLUME;
use crate::instrument::InstrumentId;
use crate::sequencer::pattern::{DEFAULT_BPM, MAX_BPM, MIN_BPM};

pub static CONFIG_PATH: LazyLock<Option<PathBuf>> =
    LazyLock::new(|| dirs::config_dir().map(|dir| dir.join("drumgrid.toml")));

#[derive(Debug)]
pub enum ConfigError {
    Io(io::Error),
    Parse(toml::de::Error),
    Serialize(toml::ser::Error),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => err.fmt(f),
            Self::Parse(err) => err.fmt(f),
            Self::Serialize(err) => err.fmt(f),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(match self {
            Self::Io(err) => err,
            Self::Parse(err) => err,
            Self::Serialize(err) => err,
        })
    }
}

impl From<io::Error> for ConfigError {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(value: toml::de::Error) -> Self {
        Self::Parse(value)
    }
}

impl From<toml::ser::Error> for ConfigError {
    fn from(value: toml::ser::Error) -> Self {
        Self::Serialize(value)
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Master volume in percent.
    pub volume: u8,
    /// Tempo the grid starts with.
    pub bpm: u16,
    pub output_device: Option<String>,
    pub midi_port: Option<String>,
    /// `[program, args...]` that answers a prompt with pattern JSON on stdout.
    pub generator_command: Vec<String>,
    pub samples: SamplePaths,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            volume: DEFAULT_VOLUME,
            bpm: DEFAULT_BPM,
            output_device: None,
            midi_port: None,
            generator_command: Vec::new(),
            samples: SamplePaths::default(),
        }
    }
}

/// One sample file per instrument.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SamplePaths {
    pub kick: PathBuf,
    pub snare: PathBuf,
    pub hihat: PathBuf,
    pub openhat: PathBuf,
    pub clap: PathBuf,
}

impl Default for SamplePaths {
    fn default() -> Self {
        let dir = default_sample_dir();
        let path = |instrument: InstrumentId| dir.join(format!("{instrument}.wav"));
        Self {
            kick: path(InstrumentId::Kick),
            snare: path(InstrumentId::Snare),
            hihat: path(InstrumentId::Hihat),
            openhat: path(InstrumentId::Openhat),
            clap: path(InstrumentId::Clap),
        }
    }
}

impl SamplePaths {
    pub fn get(&self, instrument: InstrumentId) -> &Path {
        match instrument {
            InstrumentId::Kick => &self.kick,
            InstrumentId::Snare => &self.snare,
            InstrumentId::Hihat => &self.hihat,
            InstrumentId::Openhat => &self.openhat,
            InstrumentId::Clap => &self.clap,
        }
    }
}

fn default_sample_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("drumgrid")
        .join("samples")
}

impl Config {
    /// Read the user config, falling back to defaults. A missing file is created.
    #[must_use]
    pub fn read() -> Self {
        let Some(path) = &*CONFIG_PATH else {
            warn!("can't find the system's config dir!");
            return Self::default();
        };

        match Self::read_from(path) {
            Ok(config) => config,
            Err(ConfigError::Io(err)) if err.kind() == io::ErrorKind::NotFound => {
                let config = Self::default();
                if let Err(err) = config.write_to(path) {
                    warn!("failed to write {path:?}: {err}");
                } else {
                    info!("wrote default config to {path:?}");
                }
                config
            }
            Err(err) => {
                warn!("ignoring {path:?}: {err}");
                Self::default()
            }
        }
    }

    pub fn read_from(path: &Path) -> Result<Self, ConfigError> {
        Self::parse(&read_to_string(path)?)
    }

    pub fn parse(toml: &str) -> Result<Self, ConfigError> {
        let mut config: Self = toml::from_str(toml)?;
        config.volume = config.volume.min(100);
        config.bpm = config.bpm.clamp(MIN_BPM, MAX_BPM);
        Ok(config)
    }

    pub fn write_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(dir) = path.parent() {
            create_dir_all(dir)?;
        }
        write(path, toml::to_string(self)?)?;
        Ok(())
    }
}
