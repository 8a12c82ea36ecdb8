//! Conversion between wire PCM (16-bit signed LE) and the normalized `f32`
//! samples the suppression engine works with.

use crate::constants::{BYTES_PER_SAMPLE, FRAME_BYTES, FRAME_SIZE};

const I16_SCALE: f32 = 32768.0;

/// Decodes one wire frame into normalized samples in `[-1.0, 1.0)`.
///
/// `bytes` must hold exactly `FRAME_BYTES`; shorter input leaves the tail silent.
pub fn decode_frame(bytes: &[u8]) -> [f32; FRAME_SIZE] {
    debug_assert_eq!(bytes.len(), FRAME_BYTES);
    let mut samples = [0.0f32; FRAME_SIZE];
    for (sample, raw) in samples.iter_mut().zip(bytes.chunks_exact(BYTES_PER_SAMPLE)) {
        *sample = i16::from_le_bytes([raw[0], raw[1]]) as f32 / I16_SCALE;
    }
    samples
}

/// Re-quantizes a normalized sample to the nearest `i16`. Out of range values
/// clamp, never wrap.
pub fn quantize(sample: f32) -> i16 {
    let scaled = (sample * I16_SCALE).round();
    if scaled.is_nan() {
        return 0;
    }
    scaled.clamp(i16::MIN as f32, i16::MAX as f32) as i16
}

/// Appends the wire encoding of `samples` to `out`.
pub fn encode_frame(samples: &[f32; FRAME_SIZE], out: &mut Vec<u8>) {
    out.reserve(FRAME_BYTES);
    for &sample in samples {
        out.extend_from_slice(&quantize(sample).to_le_bytes());
    }
}

/// Scales every sample in place.
pub fn apply_gain(samples: &mut [f32], gain: f32) {
    for sample in samples.iter_mut() {
        *sample *= gain;
    }
}
