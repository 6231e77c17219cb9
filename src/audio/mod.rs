//! Audio output using cpal
//!
//! [`AudioOutput`] owns the device stream and is released when dropped. The
//! cloneable [`AudioSampleBank`] is what the clock thread triggers: each hit
//! pushes a fresh voice to the stream callback, so hits never cut each other off.
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{error, info, warn};
use strum::EnumCount;

use crate::config::SamplePaths;
use crate::error::{DeviceError, PlaybackError};
use crate::instrument::InstrumentId;
use crate::samples::SampleBank;

pub mod decode;

pub use decode::Sample;

/// Hard bound on simultaneous voices; the oldest is dropped beyond it. Five
/// instruments at 200 bpm start at most 67 voices a second, so only tails
/// longer than about 7.5 s can be cut.
pub const MAX_VOICES: usize = 512;

pub const DEFAULT_VOLUME: u8 = 70;

type SampleTable = [Option<Sample>; InstrumentId::COUNT];

struct Voice {
    sample: Sample,
    // in frames
    position: usize,
    gain: f32,
}

/// Sums the active voices into the output buffer. Runs on the audio thread.
struct Mixer {
    voices: Vec<Voice>,
    incoming: Receiver<Voice>,
}

impl Mixer {
    fn new(incoming: Receiver<Voice>) -> Self {
        Self {
            voices: Vec::with_capacity(MAX_VOICES),
            incoming,
        }
    }

    fn render(&mut self, data: &mut [f32], channels: usize) {
        self.voices.extend(self.incoming.try_iter());
        if self.voices.len() > MAX_VOICES {
            let excess = self.voices.len() - MAX_VOICES;
            self.voices.drain(..excess);
        }

        data.fill(0.0);
        let channels = channels.max(1);
        for voice in &mut self.voices {
            let mut played = 0;
            for (out, frame) in data
                .chunks_mut(channels)
                .zip(voice.sample.frames_from(voice.position))
            {
                mix_frame(out, frame, voice.gain);
                played += 1;
            }
            voice.position += played;
        }
        self.voices.retain(|voice| voice.position < voice.sample.len());

        for out in data {
            *out = out.clamp(-1.0, 1.0);
        }
    }
}

/// Add one sample frame onto one output frame. Output channel `c` plays sample
/// channel `c % n`, so mono fills every channel and stereo maps to L/R; a mono
/// device gets the average.
fn mix_frame(out: &mut [f32], frame: &[f32], gain: f32) {
    if out.len() == 1 && frame.len() > 1 {
        out[0] += frame.iter().sum::<f32>() / frame.len() as f32 * gain;
        return;
    }
    for (channel, out) in out.iter_mut().enumerate() {
        *out += frame[channel % frame.len()] * gain;
    }
}

/// Send + Sync trigger handle for decoded samples.
#[derive(Clone)]
pub struct AudioSampleBank {
    samples: Arc<RwLock<SampleTable>>,
    voices: Sender<Voice>,
    // f32 gain stored as bits
    gain: Arc<AtomicU32>,
    sample_rate: u32,
}

impl AudioSampleBank {
    fn new(sample_rate: u32) -> (Self, Mixer) {
        let (voices, incoming) = unbounded();
        let bank = Self {
            samples: Arc::new(RwLock::new(Default::default())),
            voices,
            gain: Arc::new(AtomicU32::new(volume_to_gain(DEFAULT_VOLUME).to_bits())),
            sample_rate,
        };
        (bank, Mixer::new(incoming))
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Decode `path` and make it the sound of `instrument`.
    pub fn load(&self, instrument: InstrumentId, path: &Path) -> Result<(), PlaybackError> {
        let sample = decode::load_sample(path, self.sample_rate)?;
        self.insert(instrument, sample);
        Ok(())
    }

    /// Load every configured sample. Failures leave that instrument silent and are
    /// returned for reporting.
    pub fn load_all(&self, paths: &SamplePaths) -> Vec<(InstrumentId, PlaybackError)> {
        InstrumentId::all()
            .filter_map(|instrument| {
                let path = paths.get(instrument);
                self.load(instrument, path).err().map(|err| {
                    warn!("{instrument} stays silent: {err}");
                    (instrument, err)
                })
            })
            .collect()
    }

    pub fn insert(&self, instrument: InstrumentId, sample: Sample) {
        let mut table = self.samples.write().unwrap_or_else(PoisonError::into_inner);
        table[instrument.index()] = Some(sample);
    }

    pub fn is_loaded(&self, instrument: InstrumentId) -> bool {
        let table = self.samples.read().unwrap_or_else(PoisonError::into_inner);
        table[instrument.index()].is_some()
    }

    /// Volume in percent, applied to hits triggered from now on.
    pub fn set_volume(&self, percent: u8) {
        self.gain
            .store(volume_to_gain(percent).to_bits(), Ordering::Relaxed);
    }

    pub fn volume(&self) -> u8 {
        let gain = f32::from_bits(self.gain.load(Ordering::Relaxed));
        (gain * 100.0).round() as u8
    }
}

impl SampleBank for AudioSampleBank {
    fn trigger(&self, instrument: InstrumentId) -> Result<(), PlaybackError> {
        let sample = {
            let table = self.samples.read().unwrap_or_else(PoisonError::into_inner);
            table[instrument.index()]
                .clone()
                .ok_or(PlaybackError::SampleNotLoaded(instrument))?
        };

        let voice = Voice {
            sample,
            position: 0,
            gain: f32::from_bits(self.gain.load(Ordering::Relaxed)),
        };
        self.voices
            .send(voice)
            .map_err(|_| PlaybackError::Disconnected)
    }
}

impl std::fmt::Debug for AudioSampleBank {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioSampleBank")
            .field("sample_rate", &self.sample_rate)
            .field("volume", &self.volume())
            .finish_non_exhaustive()
    }
}

fn volume_to_gain(percent: u8) -> f32 {
    f32::from(percent.min(100)) / 100.0
}

/// An open output stream. Dropping it closes the device.
pub struct AudioOutput {
    _stream: cpal::Stream,
    bank: AudioSampleBank,
    channels: u16,
}

impl AudioOutput {
    /// Open the named output device, or the default one.
    pub fn open(device_name: Option<&str>) -> Result<Self, PlaybackError> {
        let host = cpal::default_host();
        let device = match device_name {
            Some(name) => host
                .output_devices()
                .map_err(DeviceError::from)?
                .find(|device| device.name().is_ok_and(|n| n == name))
                .or_else(|| {
                    warn!("output device {name:?} not found, using the default");
                    host.default_output_device()
                }),
            None => host.default_output_device(),
        }
        .ok_or(DeviceError::NoDevice)?;

        let supported = device
            .default_output_config()
            .map_err(DeviceError::from)?;
        if supported.sample_format() != cpal::SampleFormat::F32 {
            return Err(PlaybackError::UnsupportedFormat(supported.sample_format()));
        }

        let config = supported.config();
        let channels = config.channels;
        let (bank, mut mixer) = AudioSampleBank::new(config.sample_rate.0);

        info!(
            "opening {} at {} Hz, {channels} channels",
            device.name().unwrap_or_else(|_| "output device".into()),
            config.sample_rate.0
        );

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    mixer.render(data, usize::from(channels));
                },
                |err| error!("audio stream error: {err}"),
                None,
            )
            .map_err(DeviceError::from)?;
        stream.play().map_err(DeviceError::from)?;

        Ok(Self {
            _stream: stream,
            bank,
            channels,
        })
    }

    /// Handle for the clock thread.
    pub fn bank(&self) -> AudioSampleBank {
        self.bank.clone()
    }

    pub fn sample_rate(&self) -> u32 {
        self.bank.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }
}

impl std::fmt::Debug for AudioOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioOutput")
            .field("bank", &self.bank)
            .field("channels", &self.channels)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn click() -> Sample {
        Sample::mono([0.5_f32, 0.25, 0.125])
    }

    #[test]
    fn test_unloaded_instrument_fails() {
        let (bank, _mixer) = AudioSampleBank::new(48_000);
        assert!(matches!(
            bank.trigger(InstrumentId::Clap),
            Err(PlaybackError::SampleNotLoaded(InstrumentId::Clap))
        ));
        assert!(!bank.is_loaded(InstrumentId::Clap));
    }

    #[test]
    fn test_overlapping_hits_both_sound() {
        let (bank, mut mixer) = AudioSampleBank::new(48_000);
        bank.set_volume(100);
        bank.insert(InstrumentId::Hihat, click());

        bank.trigger(InstrumentId::Hihat).unwrap();
        let mut out = [0.0; 2];
        mixer.render(&mut out, 1);
        assert_eq!(out, [0.5, 0.25]);

        // second hit starts while the first is still ringing
        bank.trigger(InstrumentId::Hihat).unwrap();
        let mut out = [0.0; 2];
        mixer.render(&mut out, 1);
        assert_eq!(out, [0.125 + 0.5, 0.25]);
        assert_eq!(mixer.voices.len(), 1);
    }

    #[test]
    fn test_voices_fill_every_channel() {
        let (bank, mut mixer) = AudioSampleBank::new(48_000);
        bank.set_volume(50);
        bank.insert(InstrumentId::Kick, click());
        bank.trigger(InstrumentId::Kick).unwrap();

        let mut out = [1.0; 8];
        mixer.render(&mut out, 2);
        assert_eq!(out, [0.25, 0.25, 0.125, 0.125, 0.0625, 0.0625, 0.0, 0.0]);
        assert!(mixer.voices.is_empty());
    }

    #[test]
    fn test_output_is_clamped() {
        let (bank, mut mixer) = AudioSampleBank::new(48_000);
        bank.set_volume(100);
        bank.insert(InstrumentId::Kick, Sample::mono([0.9_f32]));
        for _ in 0..3 {
            bank.trigger(InstrumentId::Kick).unwrap();
        }
        let mut out = [0.0; 1];
        mixer.render(&mut out, 1);
        assert_eq!(out, [1.0]);
    }

    #[test]
    fn test_volume() {
        let (bank, _mixer) = AudioSampleBank::new(48_000);
        assert_eq!(bank.volume(), DEFAULT_VOLUME);
        bank.set_volume(250);
        assert_eq!(bank.volume(), 100);
    }

    #[test]
    fn test_closed_stream_reports_disconnect() {
        let (bank, mixer) = AudioSampleBank::new(48_000);
        bank.insert(InstrumentId::Snare, click());
        drop(mixer);
        assert!(matches!(
            bank.trigger(InstrumentId::Snare),
            Err(PlaybackError::Disconnected)
        ));
    }

    #[test]
    fn test_stereo_sample_keeps_its_channels() {
        let (bank, mut mixer) = AudioSampleBank::new(48_000);
        bank.set_volume(100);
        bank.insert(InstrumentId::Openhat, Sample::new([0.5_f32, -0.5, 0.25, 0.0], 2));

        bank.trigger(InstrumentId::Openhat).unwrap();
        let mut out = [0.0; 6];
        mixer.render(&mut out, 2);
        assert_eq!(out, [0.5, -0.5, 0.25, 0.0, 0.0, 0.0]);

        // a mono device hears both channels
        bank.trigger(InstrumentId::Openhat).unwrap();
        let mut out = [0.0; 2];
        mixer.render(&mut out, 1);
        assert_eq!(out, [0.0, 0.125]);
    }

    #[test]
    fn test_dense_hits_keep_ringing() {
        let (bank, mut mixer) = AudioSampleBank::new(48_000);
        bank.set_volume(100);
        bank.insert(InstrumentId::Openhat, Sample::mono(vec![0.001_f32; 48_000]));

        // 5 s of all five instruments on every step at 200 bpm
        let hits = 5 * 67;
        for _ in 0..hits {
            bank.trigger(InstrumentId::Openhat).unwrap();
        }
        let mut out = [0.0; 1];
        mixer.render(&mut out, 1);
        assert_eq!(mixer.voices.len(), hits);
        assert!(hits <= MAX_VOICES);
    }
}
