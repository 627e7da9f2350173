//! Audio capture for the voicekey pipeline.
//!
//! Captures microphone input on a dedicated thread (the cpal stream is not
//! `Send`) and hands back the full take as mono samples when the hold ends.
//! Resampling to the fixed 16kHz capture rate happens after `stop()`.

use std::sync::mpsc;
use std::time::Duration;

use anyhow::{Context, Result};
use audioadapter_buffers::direct::SequentialSliceOfVecs;
use rubato::audioadapter::Adapter;
use rubato::{Fft, FixedSync, Resampler};

use crate::error::TranscribeError;

/// Fixed sample rate for uploaded captures.
pub const TARGET_SAMPLE_RATE: u32 = 16000;

/// Poll interval for the capture thread's stop signal.
const CAPTURE_POLL: Duration = Duration::from_millis(10);

/// Audio buffer containing mono f32 samples at a known sample rate.
#[derive(Debug, Clone)]
pub struct AudioBuffer {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl AudioBuffer {
    /// Create a new audio buffer.
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Duration of the buffer in seconds.
    pub fn duration_secs(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f32 / self.sample_rate as f32
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Convert multi-channel interleaved samples to mono by averaging all channels.
pub fn to_mono(samples: &[f32], channels: u16) -> Vec<f32> {
    if channels == 1 {
        return samples.to_vec();
    }

    let channels = channels as usize;
    samples
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Resampler for converting audio between sample rates.
pub struct AudioResampler {
    resampler: Fft<f32>,
    chunk_size_in: usize,
}

impl AudioResampler {
    /// Create a new resampler.
    ///
    /// # Arguments
    /// * `input_rate` - Input sample rate in Hz
    /// * `output_rate` - Output sample rate in Hz
    /// * `chunk_size` - Number of input samples per processing chunk
    pub fn new(input_rate: u32, output_rate: u32, chunk_size: usize) -> Result<Self> {
        let resampler = Fft::new(
            input_rate as usize,
            output_rate as usize,
            chunk_size,
            1, // sub_chunks
            1, // channels
            FixedSync::Input,
        )
        .context("Failed to create resampler")?;

        Ok(Self {
            resampler,
            chunk_size_in: chunk_size,
        })
    }

    /// Resample audio data. Input length must be a multiple of chunk_size.
    pub fn process(&mut self, input: &[f32]) -> Result<Vec<f32>> {
        if input.is_empty() {
            return Ok(Vec::new());
        }

        let mut output = Vec::new();
        let input_chunks = input.chunks_exact(self.chunk_size_in);

        for chunk in input_chunks {
            let input_vecs = vec![chunk.to_vec()];
            let input_adapter =
                SequentialSliceOfVecs::new(&input_vecs, 1, chunk.len()).expect("valid input");
            let resampled = self
                .resampler
                .process(&input_adapter, 0, None)
                .context("Resampling failed")?;

            for frame_idx in 0..resampled.frames() {
                output.push(resampled.read_sample(0, frame_idx).unwrap_or(0.0));
            }
        }

        Ok(output)
    }

    /// Get the required input chunk size.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size_in
    }
}

/// Resample a finished capture to the fixed 16kHz upload rate.
///
/// The tail is zero-padded to a full resampler chunk so no audio at the end
/// of the hold is dropped.
pub fn resample_capture(buffer: &AudioBuffer) -> Result<AudioBuffer> {
    if buffer.sample_rate == TARGET_SAMPLE_RATE || buffer.is_empty() {
        return Ok(AudioBuffer::new(buffer.samples.clone(), TARGET_SAMPLE_RATE));
    }

    let mut resampler = AudioResampler::new(buffer.sample_rate, TARGET_SAMPLE_RATE, 1024)?;
    let chunk = resampler.chunk_size();

    let mut padded = buffer.samples.clone();
    let remainder = padded.len() % chunk;
    if remainder != 0 {
        padded.resize(padded.len() + chunk - remainder, 0.0);
    }

    let samples = resampler.process(&padded)?;
    Ok(AudioBuffer::new(samples, TARGET_SAMPLE_RATE))
}

/// Source of captured audio.
///
/// `start()` takes exclusive ownership of the input device; `stop()` finalizes
/// the take and returns it. The trait exists so the controller can be driven
/// by a fake source in tests.
pub trait AudioSource: Send {
    /// Begin capturing. Fails with `DeviceUnavailable` if capture cannot be
    /// initialized or is already in progress.
    fn start(&mut self) -> std::result::Result<(), TranscribeError>;

    /// Stop capturing and return the take as mono samples at the device rate.
    /// Fails with `NoActiveSession` if `start()` was not called first.
    fn stop(&mut self) -> std::result::Result<AudioBuffer, TranscribeError>;
}

struct CaptureWorker {
    stop_tx: mpsc::Sender<()>,
    done_rx: mpsc::Receiver<AudioBuffer>,
    handle: std::thread::JoinHandle<()>,
}

/// Microphone capture from the default input device.
#[derive(Default)]
pub struct MicSource {
    worker: Option<CaptureWorker>,
}

impl MicSource {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AudioSource for MicSource {
    fn start(&mut self) -> std::result::Result<(), TranscribeError> {
        if self.worker.is_some() {
            return Err(TranscribeError::DeviceUnavailable(
                "capture already in progress".to_string(),
            ));
        }

        let (ready_tx, ready_rx) = mpsc::channel();
        let (stop_tx, stop_rx) = mpsc::channel();
        let (done_tx, done_rx) = mpsc::channel();

        let handle = std::thread::spawn(move || capture_thread(&ready_tx, &stop_rx, &done_tx));

        match ready_rx.recv() {
            Ok(Ok(())) => {
                self.worker = Some(CaptureWorker {
                    stop_tx,
                    done_rx,
                    handle,
                });
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => Err(TranscribeError::DeviceUnavailable(
                "capture thread exited before starting".to_string(),
            )),
        }
    }

    fn stop(&mut self) -> std::result::Result<AudioBuffer, TranscribeError> {
        let worker = self.worker.take().ok_or(TranscribeError::NoActiveSession)?;

        let _ = worker.stop_tx.send(());
        let buffer = worker.done_rx.recv().map_err(|_| {
            TranscribeError::DeviceUnavailable(
                "capture thread stopped without producing audio".to_string(),
            )
        })?;
        let _ = worker.handle.join();

        Ok(buffer)
    }
}

/// Body of the capture thread: owns the cpal stream for its whole lifetime.
fn capture_thread(
    ready_tx: &mpsc::Sender<std::result::Result<(), TranscribeError>>,
    stop_rx: &mpsc::Receiver<()>,
    done_tx: &mpsc::Sender<AudioBuffer>,
) {
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

    let host = cpal::default_host();
    let Some(device) = host.default_input_device() else {
        let _ = ready_tx.send(Err(TranscribeError::DeviceUnavailable(
            "no input device available".to_string(),
        )));
        return;
    };

    let config = match device.default_input_config() {
        Ok(config) => config,
        Err(e) => {
            let _ = ready_tx.send(Err(TranscribeError::DeviceUnavailable(format!(
                "failed to get default input config: {e}"
            ))));
            return;
        }
    };

    let sample_rate = config.sample_rate();
    let channels = config.channels();

    let (sender, receiver) = mpsc::channel::<Vec<f32>>();

    let err_fn = |err| tracing::warn!(error = %err, "audio stream error");

    let stream = match config.sample_format() {
        cpal::SampleFormat::F32 => device.build_input_stream(
            &config.into(),
            move |data: &[f32], _| {
                let _ = sender.send(data.to_vec());
            },
            err_fn,
            None,
        ),
        cpal::SampleFormat::I16 => device.build_input_stream(
            &config.into(),
            move |data: &[i16], _| {
                let samples: Vec<f32> = data.iter().map(|&s| s as f32 / 32768.0).collect();
                let _ = sender.send(samples);
            },
            err_fn,
            None,
        ),
        cpal::SampleFormat::U16 => device.build_input_stream(
            &config.into(),
            move |data: &[u16], _| {
                let samples: Vec<f32> = data
                    .iter()
                    .map(|&s| (s as f32 - 32768.0) / 32768.0)
                    .collect();
                let _ = sender.send(samples);
            },
            err_fn,
            None,
        ),
        format => {
            let _ = ready_tx.send(Err(TranscribeError::DeviceUnavailable(format!(
                "unsupported sample format: {format:?}"
            ))));
            return;
        }
    };

    let stream = match stream {
        Ok(stream) => stream,
        Err(e) => {
            let _ = ready_tx.send(Err(TranscribeError::DeviceUnavailable(format!(
                "failed to build input stream: {e}"
            ))));
            return;
        }
    };

    if let Err(e) = stream.play() {
        let _ = ready_tx.send(Err(TranscribeError::DeviceUnavailable(format!(
            "failed to start audio stream: {e}"
        ))));
        return;
    }

    let _ = ready_tx.send(Ok(()));

    // Accumulate samples until the stop signal arrives (or the source is dropped).
    let mut samples: Vec<f32> = Vec::new();
    loop {
        match stop_rx.recv_timeout(CAPTURE_POLL) {
            Err(mpsc::RecvTimeoutError::Timeout) => {
                while let Ok(chunk) = receiver.try_recv() {
                    samples.extend(chunk);
                }
            }
            Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }

    let _ = stream.pause();
    drop(stream);

    // Drain whatever the callback delivered before the stream paused.
    while let Ok(chunk) = receiver.try_recv() {
        samples.extend(chunk);
    }

    let mono = to_mono(&samples, channels);
    let _ = done_tx.send(AudioBuffer::new(mono, sample_rate));
}

#[cfg(test)]
#[path = "audio_test.rs"]
mod tests;
