//! Caller-side audio frame encoding
//!
//! Takes raw capture samples, downmixes to mono, resamples to the 24 kHz
//! rate the transcription providers expect, converts to 16-bit signed PCM
//! and slices the result into fixed-size frames for transport. The capture
//! device itself is an external collaborator; this module starts at the
//! sample buffer it hands over.

use base64::Engine;
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

/// Sample rate expected by both transcription providers (24 kHz)
pub const TARGET_SAMPLE_RATE: u32 = 24_000;

/// Samples per transport frame (100 ms of audio at 24 kHz)
pub const FRAME_SAMPLES: usize = 2400;

/// One bounded frame of mono PCM16 audio
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    /// PCM 16-bit signed samples (mono, 24 kHz)
    pub samples: Vec<i16>,
}

impl AudioFrame {
    /// Little-endian PCM16 byte representation
    pub fn pcm_bytes(&self) -> Vec<u8> {
        self.samples.iter().flat_map(|&s| s.to_le_bytes()).collect()
    }

    /// Rebuild a frame from little-endian PCM16 bytes
    ///
    /// Fails on an odd byte count - half a sample is a framing error.
    pub fn from_pcm_bytes(bytes: &[u8]) -> Result<Self, EncoderError> {
        if bytes.len() % 2 != 0 {
            return Err(EncoderError::TruncatedFrame(bytes.len()));
        }
        let samples = bytes
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        Ok(Self { samples })
    }

    /// Base64 transport encoding used on the client channel
    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(self.pcm_bytes())
    }

    pub fn from_base64(encoded: &str) -> Result<Self, EncoderError> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| EncoderError::InvalidEncoding(e.to_string()))?;
        Self::from_pcm_bytes(&bytes)
    }

    pub fn duration_ms(&self) -> f64 {
        self.samples.len() as f64 / TARGET_SAMPLE_RATE as f64 * 1000.0
    }
}

/// Errors from frame encoding and decoding
#[derive(Debug, thiserror::Error)]
pub enum EncoderError {
    #[error("No audio channels configured")]
    NoChannels,

    #[error("Failed to construct resampler: {0}")]
    ResamplerInit(String),

    #[error("Resampling failed: {0}")]
    ResampleFailed(String),

    #[error("Invalid frame encoding: {0}")]
    InvalidEncoding(String),

    #[error("Truncated PCM16 frame: {0} bytes")]
    TruncatedFrame(usize),
}

/// Streaming encoder from capture samples to bounded transport frames
pub struct FrameEncoder {
    channels: usize,
    resampler: Option<SincFixedIn<f32>>,
    /// Mono input awaiting a full resampler chunk
    input_buffer: Vec<f32>,
    input_chunk_size: usize,
    /// Converted PCM16 awaiting frame boundaries
    output_buffer: Vec<i16>,
}

impl FrameEncoder {
    /// Create an encoder for a capture stream at the given rate and layout
    pub fn new(input_rate: u32, channels: usize) -> Result<Self, EncoderError> {
        if channels == 0 {
            return Err(EncoderError::NoChannels);
        }

        let (resampler, input_chunk_size) = if input_rate != TARGET_SAMPLE_RATE {
            let params = SincInterpolationParameters {
                sinc_len: 256,
                f_cutoff: 0.95,
                interpolation: SincInterpolationType::Linear,
                oversampling_factor: 256,
                window: WindowFunction::BlackmanHarris2,
            };
            // Input chunk sized so each resampler pass yields one frame
            let input_frames = (FRAME_SAMPLES as f64 * input_rate as f64
                / TARGET_SAMPLE_RATE as f64)
                .ceil() as usize;
            let resampler = SincFixedIn::<f32>::new(
                TARGET_SAMPLE_RATE as f64 / input_rate as f64,
                2.0,
                params,
                input_frames,
                1, // mono
            )
            .map_err(|e| EncoderError::ResamplerInit(e.to_string()))?;
            (Some(resampler), input_frames)
        } else {
            (None, FRAME_SAMPLES)
        };

        Ok(Self {
            channels,
            resampler,
            input_buffer: Vec::with_capacity(input_chunk_size * 2),
            input_chunk_size,
            output_buffer: Vec::with_capacity(FRAME_SAMPLES * 2),
        })
    }

    /// Feed interleaved capture samples; returns every completed frame
    pub fn push(&mut self, samples: &[f32]) -> Result<Vec<AudioFrame>, EncoderError> {
        // Downmix to mono by averaging channels
        if self.channels > 1 {
            let channels = self.channels;
            self.input_buffer.extend(
                samples
                    .chunks(channels)
                    .map(|frame| frame.iter().sum::<f32>() / channels as f32),
            );
        } else {
            self.input_buffer.extend_from_slice(samples);
        }

        if let Some(resampler) = self.resampler.as_mut() {
            while self.input_buffer.len() >= self.input_chunk_size {
                let chunk: Vec<f32> = self.input_buffer.drain(..self.input_chunk_size).collect();
                let resampled = resampler
                    .process(&[chunk], None)
                    .map_err(|e| EncoderError::ResampleFailed(e.to_string()))?;
                self.output_buffer
                    .extend(resampled[0].iter().map(|&s| to_pcm16(s)));
            }
        } else {
            let converted: Vec<i16> = self.input_buffer.drain(..).map(to_pcm16).collect();
            self.output_buffer.extend(converted);
        }

        Ok(self.drain_frames())
    }

    /// Drain any residual samples as one final short frame
    pub fn flush(&mut self) -> Option<AudioFrame> {
        if self.resampler.is_none() {
            let converted: Vec<i16> = self.input_buffer.drain(..).map(to_pcm16).collect();
            self.output_buffer.extend(converted);
        }
        // Residual input shorter than a resampler chunk is abandoned; it is
        // below the provider's endpointing resolution anyway.
        self.input_buffer.clear();

        if self.output_buffer.is_empty() {
            return None;
        }
        let samples = std::mem::take(&mut self.output_buffer);
        Some(AudioFrame { samples })
    }

    fn drain_frames(&mut self) -> Vec<AudioFrame> {
        let mut frames = Vec::new();
        while self.output_buffer.len() >= FRAME_SAMPLES {
            let samples: Vec<i16> = self.output_buffer.drain(..FRAME_SAMPLES).collect();
            frames.push(AudioFrame { samples });
        }
        frames
    }
}

/// Clamp and scale one float sample to PCM16
fn to_pcm16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * 32767.0) as i16
}
