// Sample rate conversion using rubato, plus channel-count mapping
// Decoded packets are converted to whatever the output device expects

use rubato::{FastFixedIn, PolynomialDegree, Resampler as RubatoResampler};

use crate::error::{Error, Result};

pub struct Resampler;

impl Resampler {
    /// Resample interleaved audio from `input_rate` to `output_rate`.
    ///
    /// Returns the input unchanged when the rates already match.
    pub fn resample(
        input: &[f32],
        input_rate: u32,
        output_rate: u32,
        channels: u16,
    ) -> Result<Vec<f32>> {
        if input_rate == output_rate || input.is_empty() {
            return Ok(input.to_vec());
        }

        let planar_input = Self::deinterleave(input, channels);
        let input_frames = planar_input[0].len();
        if input_frames == 0 {
            return Ok(Vec::new());
        }

        // FastFixedIn trades a little quality for not stalling the feed loop;
        // the chunk size is pinned to this packet so one process call suffices
        let mut resampler = FastFixedIn::<f32>::new(
            output_rate as f64 / input_rate as f64,
            1.0,
            PolynomialDegree::Septic,
            input_frames,
            channels as usize,
        )
        .map_err(|e| Error::Resample(format!("failed to create resampler: {}", e)))?;

        let planar_output = resampler
            .process(&planar_input, None)
            .map_err(|e| Error::Resample(e.to_string()))?;

        Ok(Self::interleave(planar_output))
    }

    /// Map interleaved audio between channel counts.
    ///
    /// Mono is duplicated across all output channels, mixing down to mono
    /// averages, and anything else copies the first channels across.
    pub fn map_channels(input: &[f32], from: usize, to: usize) -> Vec<f32> {
        if from == to || from == 0 || to == 0 {
            return input.to_vec();
        }

        let frames = input.len() / from;
        let mut output = Vec::with_capacity(frames * to);

        if to == 1 {
            for frame in input.chunks_exact(from) {
                output.push(frame.iter().sum::<f32>() / from as f32);
            }
        } else {
            for frame in input.chunks_exact(from) {
                for ch in 0..to {
                    output.push(frame[ch % from]);
                }
            }
        }

        output
    }

    /// Convert interleaved samples to planar format
    fn deinterleave(samples: &[f32], channels: u16) -> Vec<Vec<f32>> {
        let channels = channels.max(1) as usize;
        let frames = samples.len() / channels;

        let mut planar = vec![Vec::with_capacity(frames); channels];

        for frame in 0..frames {
            for ch in 0..channels {
                planar[ch].push(samples[frame * channels + ch]);
            }
        }

        planar
    }

    /// Convert planar samples back to interleaved format
    fn interleave(planar: Vec<Vec<f32>>) -> Vec<f32> {
        if planar.is_empty() {
            return Vec::new();
        }

        let channels = planar.len();
        let frames = planar[0].len();
        let mut interleaved = Vec::with_capacity(frames * channels);

        for frame in 0..frames {
            for ch in 0..channels {
                interleaved.push(planar[ch][frame]);
            }
        }

        interleaved
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_rate_passthrough() {
        let input = vec![0.1, 0.2, 0.3, 0.4];
        let output = Resampler::resample(&input, 44100, 44100, 2).unwrap();
        assert_eq!(output, input);
    }

    #[test]
    fn test_resample_ratio() {
        let frames = 1000;
        let mut input = Vec::with_capacity(frames * 2);
        for i in 0..frames {
            let t = i as f32 / 48000.0;
            let sample = (2.0 * std::f32::consts::PI * 440.0 * t).sin() * 0.5;
            input.push(sample);
            input.push(sample);
        }

        let output = Resampler::resample(&input, 48000, 44100, 2).unwrap();
        let output_frames = output.len() / 2;
        let expected = (frames as f64 * 44100.0 / 48000.0) as usize;

        assert!(
            output_frames.abs_diff(expected) <= 10,
            "expected ~{} frames, got {}",
            expected,
            output_frames
        );
    }

    #[test]
    fn test_map_mono_to_stereo() {
        let mono = vec![0.1, 0.2, 0.3];
        let stereo = Resampler::map_channels(&mono, 1, 2);
        assert_eq!(stereo, vec![0.1, 0.1, 0.2, 0.2, 0.3, 0.3]);
    }

    #[test]
    fn test_map_stereo_to_mono_averages() {
        let stereo = vec![0.2, 0.4, -0.5, 0.5];
        let mono = Resampler::map_channels(&stereo, 2, 1);
        assert_eq!(mono.len(), 2);
        assert!((mono[0] - 0.3).abs() < 1e-6);
        assert!(mono[1].abs() < 1e-6);
    }

    #[test]
    fn test_map_surround_to_stereo_takes_first_channels() {
        let surround: Vec<f32> = (0..12).map(|i| i as f32).collect(); // 2 frames of 5.1
        let stereo = Resampler::map_channels(&surround, 6, 2);
        assert_eq!(stereo, vec![0.0, 1.0, 6.0, 7.0]);
    }

    #[test]
    fn test_map_same_channels_is_copy() {
        let input = vec![0.5, -0.5];
        assert_eq!(Resampler::map_channels(&input, 2, 2), input);
    }

    #[test]
    fn test_resample_empty_input() {
        let output = Resampler::resample(&[], 48000, 44100, 2).unwrap();
        assert!(output.is_empty());
    }
}
