//! MIDI output using midir
//!
//! Mirrors drum hits as General MIDI percussion notes on channel 10.
use std::sync::{Mutex, PoisonError};

use log::info;
use midir::{MidiOutput, MidiOutputConnection};

use crate::error::{MidiError, PlaybackError};
use crate::instrument::InstrumentId;
use crate::samples::SampleBank;

const CLIENT_NAME: &str = "drumgrid MIDI Output";

/// Channel 10, zero-based.
pub const DRUM_CHANNEL: u8 = 9;
pub const HIT_VELOCITY: u8 = 100;

/// General MIDI percussion key for an instrument.
pub fn gm_drum_note(instrument: InstrumentId) -> u8 {
    match instrument {
        InstrumentId::Kick => 36,
        InstrumentId::Snare => 38,
        InstrumentId::Clap => 39,
        InstrumentId::Hihat => 42,
        InstrumentId::Openhat => 46,
    }
}

pub fn note_on(note: u8, velocity: u8) -> [u8; 3] {
    [0x90 | DRUM_CHANNEL, note, velocity]
}

pub fn note_off(note: u8) -> [u8; 3] {
    [0x80 | DRUM_CHANNEL, note, 0]
}

pub struct MidiOutputDevice {
    connection: Option<MidiOutputConnection>,
}

impl MidiOutputDevice {
    pub fn new() -> Self {
        Self { connection: None }
    }

    pub fn available_ports() -> Vec<String> {
        if let Ok(midi_out) = MidiOutput::new(CLIENT_NAME) {
            midi_out
                .ports()
                .iter()
                .filter_map(|p| midi_out.port_name(p).ok())
                .collect()
        } else {
            vec![]
        }
    }

    /// Open port `port_index` without touching any existing connection.
    fn open(port_index: usize) -> Result<MidiOutputConnection, MidiError> {
        let midi_out = MidiOutput::new(CLIENT_NAME)?;

        let ports = midi_out.ports();
        let port = ports
            .get(port_index)
            .ok_or_else(|| MidiError::NoSuchPort(port_index.to_string()))?;
        let name = midi_out.port_name(port).unwrap_or_default();

        let connection = midi_out.connect(port, "drumgrid")?;

        info!("connected to MIDI port {name:?}");
        Ok(connection)
    }

    fn port_index(port_name: &str) -> Result<usize, MidiError> {
        Self::available_ports()
            .iter()
            .position(|name| name == port_name)
            .ok_or_else(|| MidiError::NoSuchPort(format!("{port_name:?}")))
    }

    pub fn connect(&mut self, port_index: usize) -> Result<(), PlaybackError> {
        self.replace(Self::open(port_index)?);
        Ok(())
    }

    pub fn connect_named(&mut self, port_name: &str) -> Result<(), PlaybackError> {
        self.connect(Self::port_index(port_name)?)
    }

    fn replace(&mut self, connection: MidiOutputConnection) {
        if let Some(previous) = self.connection.replace(connection) {
            previous.close();
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    pub fn send(&mut self, message: &[u8]) -> Result<(), PlaybackError> {
        if let Some(ref mut conn) = self.connection {
            conn.send(message).map_err(MidiError::from)?;
        }
        Ok(())
    }

    /// One-shot hit: note-on immediately followed by note-off.
    pub fn send_hit(&mut self, instrument: InstrumentId) -> Result<(), PlaybackError> {
        let note = gm_drum_note(instrument);
        self.send(&note_on(note, HIT_VELOCITY))?;
        self.send(&note_off(note))
    }

    pub fn disconnect(&mut self) {
        if let Some(connection) = self.connection.take() {
            connection.close();
            info!("disconnected MIDI output");
        }
    }
}

impl Default for MidiOutputDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MidiOutputDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MidiOutputDevice")
            .field("connected", &self.is_connected())
            .finish()
    }
}

/// Sample bank that plays hits on a MIDI device. While unconnected every trigger
/// is a no-op, so it can always sit next to the audio bank.
#[derive(Debug, Default)]
pub struct MidiSampleBank {
    device: Mutex<MidiOutputDevice>,
}

impl MidiSampleBank {
    pub fn new() -> Self {
        Self::default()
    }

    fn device(&self) -> std::sync::MutexGuard<'_, MidiOutputDevice> {
        self.device.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The port is opened before the device lock is taken, so hits keep
    /// playing while a connection is being set up.
    pub fn connect(&self, port_index: usize) -> Result<(), PlaybackError> {
        let connection = MidiOutputDevice::open(port_index)?;
        let previous = self.device().connection.replace(connection);
        if let Some(previous) = previous {
            previous.close();
        }
        Ok(())
    }

    pub fn connect_named(&self, port_name: &str) -> Result<(), PlaybackError> {
        self.connect(MidiOutputDevice::port_index(port_name)?)
    }

    pub fn disconnect(&self) {
        self.device().disconnect();
    }

    pub fn is_connected(&self) -> bool {
        self.device().is_connected()
    }
}

impl SampleBank for MidiSampleBank {
    fn trigger(&self, instrument: InstrumentId) -> Result<(), PlaybackError> {
        self.device().send_hit(instrument)
    }
}
