// Audio output using cpal
// A dedicated thread owns the output stream (cpal streams are not Send);
// samples reach the audio callback through a ring buffer.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Stream, StreamConfig};
use parking_lot::Mutex;
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::HeapRb;
use tracing::error;

use crate::error::{Error, Result};

const RING_BUFFER_SIZE: usize = 48000 * 2 / 4; // ~250ms of stereo audio at 48kHz

type RingProducer = ringbuf::HeapProd<f32>;
type RingConsumer = ringbuf::HeapCons<f32>;

pub struct AudioOutput {
    producer: Mutex<RingProducer>,
    sample_rate: u32,
    channels: u16,
    volume: Arc<Mutex<f32>>,
    clear_flag: Arc<AtomicBool>,
    paused: Arc<AtomicBool>,
    frames_played: Arc<AtomicU64>,
    shutdown: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl AudioOutput {
    /// Create a new audio output on the default device
    pub fn new() -> Result<Self> {
        let rb = HeapRb::<f32>::new(RING_BUFFER_SIZE);
        let (producer, consumer) = rb.split();

        let volume = Arc::new(Mutex::new(1.0f32));
        let clear_flag = Arc::new(AtomicBool::new(false));
        let paused = Arc::new(AtomicBool::new(false));
        let frames_played = Arc::new(AtomicU64::new(0));
        let shutdown = Arc::new(AtomicBool::new(false));

        let (init_tx, init_rx) = mpsc::channel();

        let thread = {
            let volume = volume.clone();
            let clear_flag = clear_flag.clone();
            let paused = paused.clone();
            let frames_played = frames_played.clone();
            let shutdown = shutdown.clone();

            thread::Builder::new()
                .name("audio-output".to_string())
                .spawn(move || {
                    run_output(
                        consumer,
                        volume,
                        clear_flag,
                        paused,
                        frames_played,
                        shutdown,
                        init_tx,
                    );
                })
                .map_err(|e| Error::Stream(format!("failed to spawn output thread: {}", e)))?
        };

        let (sample_rate, channels) = init_rx
            .recv()
            .map_err(|_| Error::Stream("output thread exited during init".to_string()))??;

        Ok(Self {
            producer: Mutex::new(producer),
            sample_rate,
            channels,
            volume,
            clear_flag,
            paused,
            frames_played,
            shutdown,
            thread: Some(thread),
        })
    }

    /// Write samples to the output buffer.
    /// Returns the number of samples actually written.
    pub fn write(&self, samples: &[f32]) -> usize {
        let mut producer = self.producer.lock();
        let mut written = 0;

        for &sample in samples {
            if producer.try_push(sample).is_ok() {
                written += 1;
            } else {
                // Buffer full, caller retries later
                break;
            }
        }

        written
    }

    /// Drop everything still queued (used on seek and stop).
    /// The drain happens inside the audio callback on its next invocation.
    pub fn clear(&self) {
        self.clear_flag.store(true, Ordering::SeqCst);
    }

    /// While paused the callback emits silence without consuming samples,
    /// so the played-frame counter freezes along with the audio.
    pub fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::SeqCst);
    }

    /// Frames the device has consumed since the last reset
    pub fn frames_played(&self) -> u64 {
        self.frames_played.load(Ordering::SeqCst)
    }

    /// Zero the played-frame counter (on clip load and after seeks)
    pub fn reset_frames(&self) {
        self.frames_played.store(0, Ordering::SeqCst);
    }

    /// True when no queued samples remain
    pub fn buffer_is_empty(&self) -> bool {
        self.producer.lock().is_empty()
    }

    /// Get the output sample rate
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Get the number of output channels
    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Set the output volume (0.0 to 1.0)
    pub fn set_volume(&self, vol: f32) {
        *self.volume.lock() = vol.clamp(0.0, 1.0);
    }

    /// Get the current volume
    pub fn volume(&self) -> f32 {
        *self.volume.lock()
    }
}

impl Drop for AudioOutput {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

fn run_output(
    consumer: RingConsumer,
    volume: Arc<Mutex<f32>>,
    clear_flag: Arc<AtomicBool>,
    paused: Arc<AtomicBool>,
    frames_played: Arc<AtomicU64>,
    shutdown: Arc<AtomicBool>,
    init_tx: mpsc::Sender<Result<(u32, u16)>>,
) {
    let stream = match open_stream(consumer, volume, clear_flag, paused, frames_played) {
        Ok((stream, sample_rate, channels)) => {
            let _ = init_tx.send(Ok((sample_rate, channels)));
            stream
        }
        Err(e) => {
            let _ = init_tx.send(Err(e));
            return;
        }
    };

    // Keep the stream alive until the owner drops us
    while !shutdown.load(Ordering::SeqCst) {
        thread::sleep(Duration::from_millis(50));
    }

    drop(stream);
}

fn open_stream(
    consumer: RingConsumer,
    volume: Arc<Mutex<f32>>,
    clear_flag: Arc<AtomicBool>,
    paused: Arc<AtomicBool>,
    frames_played: Arc<AtomicU64>,
) -> Result<(Stream, u32, u16)> {
    let host = cpal::default_host();

    let device = host.default_output_device().ok_or(Error::NoOutputDevice)?;

    let config = device
        .default_output_config()
        .map_err(|e| Error::Stream(format!("failed to get default output config: {}", e)))?;

    let sample_rate = config.sample_rate().0;
    let channels = config.channels();

    let stream = match config.sample_format() {
        cpal::SampleFormat::F32 => build_stream::<f32>(
            &device,
            &config.into(),
            consumer,
            volume,
            clear_flag,
            paused,
            frames_played,
        ),
        cpal::SampleFormat::I16 => build_stream::<i16>(
            &device,
            &config.into(),
            consumer,
            volume,
            clear_flag,
            paused,
            frames_played,
        ),
        cpal::SampleFormat::U16 => build_stream::<u16>(
            &device,
            &config.into(),
            consumer,
            volume,
            clear_flag,
            paused,
            frames_played,
        ),
        format => return Err(Error::UnsupportedFormat(format!("{:?}", format))),
    }?;

    stream
        .play()
        .map_err(|e| Error::Stream(format!("failed to start stream: {}", e)))?;

    Ok((stream, sample_rate, channels))
}

fn build_stream<T: cpal::SizedSample + cpal::FromSample<f32>>(
    device: &cpal::Device,
    config: &StreamConfig,
    mut consumer: RingConsumer,
    volume: Arc<Mutex<f32>>,
    clear_flag: Arc<AtomicBool>,
    paused: Arc<AtomicBool>,
    frames_played: Arc<AtomicU64>,
) -> Result<Stream> {
    let channels = config.channels.max(1) as usize;

    let stream = device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                // If clear flag is set, drain the buffer and start fresh
                if clear_flag.swap(false, Ordering::SeqCst) {
                    while consumer.try_pop().is_some() {}
                }

                if paused.load(Ordering::SeqCst) {
                    for sample in data.iter_mut() {
                        *sample = T::from_sample(0.0f32);
                    }
                    return;
                }

                let vol = *volume.lock();
                let mut popped = 0usize;

                for sample in data.iter_mut() {
                    match consumer.try_pop() {
                        Some(value) => {
                            *sample = T::from_sample(value * vol);
                            popped += 1;
                        }
                        None => *sample = T::from_sample(0.0f32),
                    }
                }

                if popped > 0 {
                    frames_played.fetch_add((popped / channels) as u64, Ordering::SeqCst);
                }
            },
            move |err| {
                error!("audio output error: {}", err);
            },
            None,
        )
        .map_err(|e| Error::Stream(format!("failed to build output stream: {}", e)))?;

    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    // Needs real audio hardware; skips cleanly on machines without a device.

    #[test]
    fn test_output_controls_do_not_panic() {
        let output = match AudioOutput::new() {
            Ok(o) => o,
            Err(_) => return, // No audio device available
        };

        assert!(output.sample_rate() > 0);
        assert!(output.channels() > 0);
        assert!(output.buffer_is_empty());

        output.set_volume(0.5);
        assert!((output.volume() - 0.5).abs() < f32::EPSILON);
        output.set_volume(2.0);
        assert!((output.volume() - 1.0).abs() < f32::EPSILON);
        output.set_volume(-1.0);
        assert!((output.volume() - 0.0).abs() < f32::EPSILON);

        let written = output.write(&[0.0f32; 64]);
        assert!(written <= 64);

        output.set_paused(true);
        output.set_paused(false);
        output.clear();
        output.reset_frames();
        assert_eq!(output.frames_played(), 0);
    }
}
