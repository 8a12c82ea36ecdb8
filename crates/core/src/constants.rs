//! Shared constants for the suppression pipeline.

/// Sample rate the suppression engine runs at (48kHz)
pub const SAMPLE_RATE: u32 = 48000;

/// Frame size in samples (10ms at 48kHz = 480 samples)
pub const FRAME_SIZE: usize = 480;

/// Wire encoding is 16-bit signed little-endian PCM
pub const BYTES_PER_SAMPLE: usize = 2;

/// Bytes needed on the wire for one complete frame
pub const FRAME_BYTES: usize = FRAME_SIZE * BYTES_PER_SAMPLE;

/// Gain applied to frames the engine classifies as non-speech
pub const NOISE_FRAME_GAIN: f32 = 0.1;

/// Header extension whose presence marks a stream as audio
pub const AUDIO_LEVEL_URI: &str = "urn:ietf:params:rtp-hdrext:ssrc-audio-level";
