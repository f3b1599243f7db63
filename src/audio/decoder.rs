// Clip decoder using Symphonia
// Decodes one audio file to raw interleaved PCM samples

use std::fs::File;
use std::path::Path;

use symphonia::core::audio::{AudioBufferRef, AudioPlanes, Signal};
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::sample::Sample;
use symphonia::core::units::{Time, TimeBase};
use tracing::warn;

use crate::error::{Error, Result};

pub struct ClipDecoder {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    sample_rate: u32,
    channels: usize,
    time_base: Option<TimeBase>,
    duration_us: Option<u64>,
}

impl std::fmt::Debug for ClipDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClipDecoder")
            .field("track_id", &self.track_id)
            .field("sample_rate", &self.sample_rate)
            .field("channels", &self.channels)
            .field("time_base", &self.time_base)
            .field("duration_us", &self.duration_us)
            .finish_non_exhaustive()
    }
}

impl ClipDecoder {
    /// Open an audio file and prepare for decoding
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;

        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        // Give the probe a hint from the file extension
        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| Error::Probe(e.to_string()))?;

        let format = probed.format;

        // First audio track wins
        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or(Error::NoAudioTrack)?;

        let track_id = track.id;
        let sample_rate = track.codec_params.sample_rate.unwrap_or(44100);
        let channels = track.codec_params.channels.map(|c| c.count()).unwrap_or(2);
        let time_base = track.codec_params.time_base;

        let duration_us = track.codec_params.n_frames.map(|frames| match time_base {
            Some(tb) => time_to_us(tb.calc_time(frames)),
            None => frames * 1_000_000 / sample_rate as u64,
        });

        let decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| Error::Decode(e.to_string()))?;

        Ok(Self {
            format,
            decoder,
            track_id,
            sample_rate,
            channels,
            time_base,
            duration_us,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Total clip length in microseconds, when the container declares it
    pub fn duration_us(&self) -> Option<u64> {
        self.duration_us
    }

    /// Decode the next packet into interleaved f32 samples.
    /// Returns None at end of stream.
    pub fn decode_next(&mut self) -> Result<Option<Vec<f32>>> {
        loop {
            let packet = match self.format.next_packet() {
                Ok(p) => p,
                Err(SymphoniaError::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    return Ok(None);
                }
                Err(SymphoniaError::ResetRequired) => {
                    self.decoder.reset();
                    continue;
                }
                Err(e) => return Err(Error::Decode(e.to_string())),
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            match self.decoder.decode(&packet) {
                Ok(decoded) => {
                    return Ok(Some(audio_buf_to_f32(&decoded)));
                }
                Err(SymphoniaError::DecodeError(e)) => {
                    // Bad packet; skip it and keep going
                    warn!("decode error (skipping packet): {}", e);
                    continue;
                }
                Err(e) => return Err(Error::Decode(e.to_string())),
            }
        }
    }

    /// Seek to a position in microseconds.
    /// Returns the position actually reached, which may differ for coarse
    /// container seeks.
    pub fn seek(&mut self, position_us: u64) -> Result<u64> {
        let seconds = position_us as f64 / 1_000_000.0;
        let time = Time::new(seconds as u64, seconds.fract());

        let seeked_to = self
            .format
            .seek(
                SeekMode::Coarse,
                SeekTo::Time {
                    time,
                    track_id: Some(self.track_id),
                },
            )
            .map_err(|e| Error::Seek(e.to_string()))?;

        // Decoder state is stale after a format-level seek
        self.decoder.reset();

        Ok(self.ts_to_us(seeked_to.actual_ts))
    }

    fn ts_to_us(&self, ts: u64) -> u64 {
        match self.time_base {
            Some(tb) => time_to_us(tb.calc_time(ts)),
            None => ts * 1_000_000 / self.sample_rate as u64,
        }
    }
}

fn time_to_us(time: Time) -> u64 {
    time.seconds * 1_000_000 + (time.frac * 1_000_000.0) as u64
}

/// Convert any AudioBufferRef to interleaved f32 samples
fn audio_buf_to_f32(buf: &AudioBufferRef) -> Vec<f32> {
    match buf {
        AudioBufferRef::F32(b) => interleave(b.planes(), b.frames(), |s: f32| s),
        AudioBufferRef::F64(b) => interleave(b.planes(), b.frames(), |s: f64| s as f32),
        AudioBufferRef::S8(b) => interleave(b.planes(), b.frames(), |s: i8| s as f32 / 128.0),
        AudioBufferRef::S16(b) => interleave(b.planes(), b.frames(), |s: i16| s as f32 / 32768.0),
        AudioBufferRef::S24(b) => {
            interleave(b.planes(), b.frames(), |s| s.inner() as f32 / 8388608.0)
        }
        AudioBufferRef::S32(b) => {
            interleave(b.planes(), b.frames(), |s: i32| s as f32 / 2147483648.0)
        }
        AudioBufferRef::U8(b) => {
            interleave(b.planes(), b.frames(), |s: u8| (s as f32 - 128.0) / 128.0)
        }
        AudioBufferRef::U16(b) => interleave(b.planes(), b.frames(), |s: u16| {
            (s as f32 - 32768.0) / 32768.0
        }),
        AudioBufferRef::U24(b) => interleave(b.planes(), b.frames(), |s| {
            (s.inner() as f32 - 8388608.0) / 8388608.0
        }),
        AudioBufferRef::U32(b) => interleave(b.planes(), b.frames(), |s: u32| {
            ((s as f64 - 2147483648.0) / 2147483648.0) as f32
        }),
    }
}

fn interleave<T: Sample + Copy, F: Fn(T) -> f32>(
    planes: AudioPlanes<T>,
    frames: usize,
    convert: F,
) -> Vec<f32> {
    let channels = planes.planes().len();
    if channels == 0 || frames == 0 {
        return vec![];
    }

    let mut interleaved = Vec::with_capacity(frames * channels);

    for frame in 0..frames {
        for ch in 0..channels {
            interleaved.push(convert(planes.planes()[ch][frame]));
        }
    }

    interleaved
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;
    use std::io::Write;

    fn write_sine_wav(path: &Path, seconds: f64, sample_rate: u32) {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        let total = (seconds * sample_rate as f64) as u32;
        for i in 0..total {
            let t = i as f32 / sample_rate as f32;
            let sample = (2.0 * PI * 440.0 * t).sin() * 0.4;
            writer
                .write_sample((sample * i16::MAX as f32) as i16)
                .unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_open_reports_duration_and_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        write_sine_wav(&path, 1.0, 44100);

        let decoder = ClipDecoder::open(&path).unwrap();
        assert_eq!(decoder.sample_rate(), 44100);
        assert_eq!(decoder.channels(), 1);

        let duration = decoder.duration_us().expect("wav duration is known");
        assert!(
            (999_000..=1_001_000).contains(&duration),
            "duration {} should be about 1s",
            duration
        );
    }

    #[test]
    fn test_decode_yields_all_samples() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        write_sine_wav(&path, 0.5, 22050);

        let mut decoder = ClipDecoder::open(&path).unwrap();
        let mut total = 0usize;
        while let Some(samples) = decoder.decode_next().unwrap() {
            assert!(samples.iter().all(|s| s.abs() <= 1.0));
            total += samples.len();
        }
        assert_eq!(total, (22050.0 * 0.5) as usize);

        // Stream stays exhausted
        assert!(decoder.decode_next().unwrap().is_none());
    }

    #[test]
    fn test_seek_lands_near_target() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        write_sine_wav(&path, 2.0, 44100);

        let mut decoder = ClipDecoder::open(&path).unwrap();
        let actual = decoder.seek(1_000_000).unwrap();
        assert!(
            (900_000..=1_000_000).contains(&actual),
            "coarse seek landed at {}",
            actual
        );

        // Remaining samples should cover roughly the back half of the clip
        let mut remaining = 0usize;
        while let Some(samples) = decoder.decode_next().unwrap() {
            remaining += samples.len();
        }
        assert!(
            remaining <= 44100 + 4410,
            "too many samples left: {}",
            remaining
        );
    }

    #[test]
    fn test_open_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("noise.wav");
        let mut file = File::create(&path).unwrap();
        file.write_all(&[0x13, 0x37, 0x00, 0xFF, 0x42, 0x00, 0x99])
            .unwrap();

        assert!(ClipDecoder::open(&path).is_err());
    }

    #[test]
    fn test_open_missing_file_is_io_error() {
        let err = ClipDecoder::open(Path::new("/nonexistent/clip.wav")).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
