//! Suppression engine adapter.
//!
//! The pipeline only depends on the numeric contract of a denoiser: 480
//! normalized samples in, 480 samples plus a voice decision out. Any backend
//! satisfying [`SuppressionEngine`] can be plugged in through an
//! [`EngineFactory`]; [`RnnoiseEngine`] is the default one.

use crate::constants::FRAME_SIZE;
use anyhow::{ensure, Result};
use nnnoiseless::DenoiseState;

/// nnnoiseless works on samples in the i16 range rather than `[-1, 1]`.
const RNNOISE_SCALE: f32 = 32768.0;

/// Result of processing one frame.
#[derive(Clone, Debug)]
pub struct EngineOutput {
    /// Denoised samples, normalized like the input.
    pub samples: [f32; FRAME_SIZE],
    /// Raw speech probability reported by the engine.
    pub vad_probability: f32,
    /// Whether the probability reached the caller's threshold.
    pub voice_detected: bool,
}

/// One denoiser instance. Owned by a single stream and never shared.
///
/// Calls are expected to finish well within the 10ms frame period; the
/// caller enforces no timeout.
pub trait SuppressionEngine: Send {
    fn process(&mut self, frame: &[f32; FRAME_SIZE], threshold: f32) -> Result<EngineOutput>;
}

/// Creates engines lazily, one per bound stream.
pub trait EngineFactory: Send + Sync {
    fn create(&self) -> Result<Box<dyn SuppressionEngine>>;
}

/// RNNoise denoiser backed by the pure Rust nnnoiseless port.
pub struct RnnoiseEngine {
    state: Box<DenoiseState<'static>>,
    input: [f32; FRAME_SIZE],
    output: [f32; FRAME_SIZE],
}

impl RnnoiseEngine {
    pub fn new() -> Result<Self> {
        ensure!(
            DenoiseState::FRAME_SIZE == FRAME_SIZE,
            "RNNoise frame size {} does not match pipeline frame size {}",
            DenoiseState::FRAME_SIZE,
            FRAME_SIZE
        );
        Ok(Self {
            state: DenoiseState::new(),
            input: [0.0; FRAME_SIZE],
            output: [0.0; FRAME_SIZE],
        })
    }
}

impl SuppressionEngine for RnnoiseEngine {
    fn process(&mut self, frame: &[f32; FRAME_SIZE], threshold: f32) -> Result<EngineOutput> {
        for (dst, &src) in self.input.iter_mut().zip(frame) {
            *dst = src * RNNOISE_SCALE;
        }

        let vad_probability = self.state.process_frame(&mut self.output, &self.input);
        ensure!(
            vad_probability.is_finite(),
            "RNNoise returned a non-finite VAD probability"
        );

        let mut samples = [0.0f32; FRAME_SIZE];
        for (dst, &src) in samples.iter_mut().zip(&self.output) {
            *dst = src / RNNOISE_SCALE;
        }

        Ok(EngineOutput {
            samples,
            vad_probability,
            voice_detected: vad_probability >= threshold,
        })
    }
}

/// Default factory producing [`RnnoiseEngine`] instances.
#[derive(Clone, Copy, Debug, Default)]
pub struct RnnoiseFactory;

impl EngineFactory for RnnoiseFactory {
    fn create(&self) -> Result<Box<dyn SuppressionEngine>> {
        Ok(Box::new(RnnoiseEngine::new()?))
    }
}
