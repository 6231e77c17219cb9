//! Sample file loading: decode with symphonia, resample every channel to the
//! output rate with rubato.

use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use log::info;
use rubato::{FftFixedIn, Resampler as _};
use symphonia::core::{
    audio::SampleBuffer,
    codecs::DecoderOptions,
    errors::Error as SymphoniaError,
    formats::FormatOptions,
    io::{MediaSourceStream, MediaSourceStreamOptions},
    meta::MetadataOptions,
    probe::Hint,
};

use crate::error::{PlaybackError, RubatoError};

const RESAMPLER_CHUNK: usize = 1024;

/// Decoded interleaved audio at the output rate, shared between voices.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    samples: Arc<[f32]>,
    channels: usize,
}

impl Sample {
    /// `samples` is interleaved; a trailing partial frame is dropped.
    pub fn new(samples: impl Into<Arc<[f32]>>, channels: usize) -> Self {
        let channels = channels.max(1);
        let mut samples: Arc<[f32]> = samples.into();
        if samples.len() % channels != 0 {
            let whole = samples.len() - samples.len() % channels;
            samples = samples[..whole].into();
        }
        Self { samples, channels }
    }

    pub fn mono(samples: impl Into<Arc<[f32]>>) -> Self {
        Self::new(samples, 1)
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Length in frames.
    pub fn len(&self) -> usize {
        self.samples.len() / self.channels
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Frames from `frame` to the end.
    pub fn frames_from(&self, frame: usize) -> impl Iterator<Item = &[f32]> {
        let start = (frame * self.channels).min(self.samples.len());
        self.samples[start..].chunks_exact(self.channels)
    }
}

/// Decoded sample at `sample_rate`, channels as in the file.
pub fn load_sample(path: &Path, sample_rate: u32) -> Result<Sample, PlaybackError> {
    info!("loading sample {path:?}");

    let decode_error = |source| PlaybackError::Decode {
        path: path.to_path_buf(),
        source,
    };
    let (interleaved, channels, file_rate) = read_audio_file(path).map_err(decode_error)?;
    let resampled = interleave(&resample(
        &deinterleave(&interleaved, channels),
        file_rate,
        sample_rate,
    )?);

    let sample = Sample::new(resampled, channels);
    info!(
        "loaded sample {path:?} ({} frames, {channels} channels)",
        sample.len()
    );
    Ok(sample)
}

fn read_audio_file(path: &Path) -> Result<(Vec<f32>, usize, u32), SymphoniaError> {
    let file = File::open(path)?;
    let mut hint = Hint::new();
    if let Some(extension) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(extension);
    }

    let mut format = symphonia::default::get_probe()
        .format(
            &hint,
            MediaSourceStream::new(Box::new(file), MediaSourceStreamOptions::default()),
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )?
        .format;

    let track = format
        .default_track()
        .ok_or(SymphoniaError::Unsupported("no audio track"))?;
    let track_id = track.id;

    let mut decoder =
        symphonia::default::get_codecs().make(&track.codec_params, &DecoderOptions::default())?;

    let mut samples = Vec::new();
    let mut channels = 0;
    let mut sample_rate = track.codec_params.sample_rate.unwrap_or_default();
    let mut sample_buf = None;

    while let Ok(packet) = format.next_packet() {
        if packet.track_id() != track_id {
            continue;
        }

        let audio_buf = match decoder.decode(&packet) {
            Ok(audio_buf) => audio_buf,
            // a corrupt frame is skipped, anything else ends the file
            Err(SymphoniaError::DecodeError(_)) => continue,
            Err(e) => return Err(e),
        };

        let sample_buf = sample_buf.get_or_insert_with(|| {
            let signal = *audio_buf.spec();
            channels = signal.channels.count();
            sample_rate = signal.rate;
            SampleBuffer::<f32>::new(audio_buf.capacity() as u64, signal)
        });

        sample_buf.copy_interleaved_ref(audio_buf);
        samples.extend_from_slice(sample_buf.samples());
    }

    if channels == 0 || sample_rate == 0 {
        return Err(SymphoniaError::DecodeError("no decodable audio"));
    }

    Ok((samples, channels, sample_rate))
}

/// Split interleaved frames into one buffer per channel.
pub fn deinterleave(interleaved: &[f32], channels: usize) -> Vec<Vec<f32>> {
    let channels = channels.max(1);
    (0..channels)
        .map(|channel| {
            interleaved
                .chunks_exact(channels)
                .map(|frame| frame[channel])
                .collect()
        })
        .collect()
}

pub fn interleave(planar: &[Vec<f32>]) -> Vec<f32> {
    let frames = planar.iter().map(Vec::len).min().unwrap_or(0);
    (0..frames)
        .flat_map(|frame| planar.iter().map(move |channel| channel[frame]))
        .collect()
}

/// Resample planar audio, keeping its duration.
pub fn resample(planar: &[Vec<f32>], from: u32, to: u32) -> Result<Vec<Vec<f32>>, RubatoError> {
    let frames = planar.first().map_or(0, Vec::len);
    if from == to || frames == 0 {
        return Ok(planar.to_vec());
    }

    let mut fft = FftFixedIn::<f32>::new(
        from as usize,
        to as usize,
        RESAMPLER_CHUNK,
        2,
        planar.len(),
    )?;

    let delay = fft.output_delay();
    let expected = (frames as f64 * f64::from(to) / f64::from(from)).ceil() as usize;
    let mut output =
        vec![Vec::with_capacity(expected + delay + fft.output_frames_max()); planar.len()];

    let mut position = 0;
    let mut blocks = vec![vec![0.0; fft.input_frames_next()]; planar.len()];
    while output[0].len() < expected + delay {
        let take = frames.saturating_sub(position).min(blocks[0].len());
        for (block, channel) in blocks.iter_mut().zip(planar) {
            block[..take].copy_from_slice(&channel[position..position + take]);
            // the tail is flushed with silence
            block[take..].fill(0.0);
        }
        position += take;

        let resampled = fft.process(&blocks, None)?;
        for (out, channel) in output.iter_mut().zip(resampled) {
            out.extend_from_slice(&channel);
        }
    }

    for channel in &mut output {
        channel.drain(..delay);
        channel.truncate(expected);
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;
    use std::path::PathBuf;

    #[test]
    fn test_planar_conversion_keeps_channels() {
        let planar = deinterleave(&[1.0, -1.0, 0.5, -0.5], 2);
        assert_eq!(planar, [vec![1.0, 0.5], vec![-1.0, -0.5]]);
        assert_eq!(interleave(&planar), [1.0, -1.0, 0.5, -0.5]);
        assert_eq!(deinterleave(&[0.25, -0.25], 1), [vec![0.25, -0.25]]);
    }

    #[test]
    fn test_sample_frames() {
        let sample = Sample::new(vec![0.1, 0.2, 0.3, 0.4, 0.5], 2);
        assert_eq!(sample.channels(), 2);
        assert_eq!(sample.len(), 2);
        let frames: Vec<&[f32]> = sample.frames_from(1).collect();
        assert_eq!(frames, [&[0.3, 0.4][..]]);
        assert_eq!(sample.frames_from(5).count(), 0);
    }

    #[test]
    fn test_resample_keeps_duration_per_channel() {
        let one_second = vec![vec![0.0; 44_100]; 2];
        let resampled = resample(&one_second, 44_100, 48_000).unwrap();
        assert_eq!(resampled.len(), 2);
        assert!(resampled.iter().all(|channel| channel.len() == 48_000));
    }

    #[test]
    fn test_resample_same_rate_is_identity() {
        let samples = vec![vec![0.1, 0.2, 0.3]];
        assert_eq!(resample(&samples, 48_000, 48_000).unwrap(), samples);
    }

    #[test]
    fn test_missing_file_keeps_io_error() {
        let path = PathBuf::from("/nonexistent/kick.wav");
        let err = load_sample(&path, 48_000).unwrap_err();
        match &err {
            PlaybackError::Decode {
                path: failed,
                source: SymphoniaError::IoError(_),
            } => assert_eq!(failed, &path),
            other => panic!("unexpected {other:?}"),
        }
        assert!(err.source().is_some());
    }
}
