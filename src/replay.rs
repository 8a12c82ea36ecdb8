//! Offline replay: packetizes raw PCM into RTP, pushes it through the noise
//! filter exactly like a live inbound stream, and collects the payloads.

use anyhow::{Context, Result};
use bytes::Bytes;
use log::{debug, info};
use parking_lot::Mutex;
use rtp::header::Header;
use rtp::packet::Packet;
use rtpdenoise_core::constants::AUDIO_LEVEL_URI;
use rtpdenoise_core::{
    Attributes, HeaderExtension, NoiseFilterFactory, PacketReader, StatsSnapshot, StreamInfo,
    TransportError,
};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;
use webrtc_util::marshal::{Marshal, Unmarshal};

use crate::config::AppConfig;

/// Extension id the generated stream negotiates for audio levels.
pub const AUDIO_LEVEL_EXT_ID: u8 = 1;

struct Cursor {
    offset: usize,
    sequence_number: u16,
    timestamp: u32,
}

/// Packet source producing one RTP packet per `payload_bytes` of PCM.
pub struct PcmPacketizer {
    pcm: Bytes,
    payload_bytes: usize,
    payload_type: u8,
    ssrc: u32,
    cursor: Mutex<Cursor>,
}

impl PcmPacketizer {
    pub fn new(pcm: Bytes, payload_bytes: usize, payload_type: u8, ssrc: u32) -> Self {
        Self {
            pcm,
            payload_bytes: payload_bytes.max(2),
            payload_type,
            ssrc,
            cursor: Mutex::new(Cursor {
                offset: 0,
                sequence_number: 0,
                timestamp: 0,
            }),
        }
    }

    fn build_packet(&self, cursor: &Cursor, payload: &[u8]) -> Result<Bytes> {
        let mut header = Header {
            version: 2,
            payload_type: self.payload_type,
            sequence_number: cursor.sequence_number,
            timestamp: cursor.timestamp,
            ssrc: self.ssrc,
            ..Default::default()
        };
        header
            .set_extension(AUDIO_LEVEL_EXT_ID, Bytes::from(vec![audio_level(payload)]))
            .map_err(|e| anyhow::anyhow!("Failed to set audio level extension: {}", e))?;

        let mut packet = header
            .marshal()
            .map_err(|e| anyhow::anyhow!("Failed to marshal RTP header: {}", e))?
            .to_vec();
        packet.extend_from_slice(payload);
        Ok(packet.into())
    }
}

impl PacketReader for PcmPacketizer {
    fn read(
        &self,
        buf: &mut [u8],
        attributes: Attributes,
    ) -> Result<(usize, Attributes), TransportError> {
        let mut cursor = self.cursor.lock();
        if cursor.offset >= self.pcm.len() {
            return Err(TransportError::Closed);
        }

        let end = (cursor.offset + self.payload_bytes).min(self.pcm.len());
        let payload = &self.pcm[cursor.offset..end];
        let packet = self.build_packet(&cursor, payload)?;
        if packet.len() > buf.len() {
            return Err(TransportError::Other(anyhow::anyhow!(
                "Packet of {} bytes does not fit read buffer of {}",
                packet.len(),
                buf.len()
            )));
        }
        buf[..packet.len()].copy_from_slice(&packet);

        cursor.offset = end;
        cursor.sequence_number = cursor.sequence_number.wrapping_add(1);
        cursor.timestamp = cursor.timestamp.wrapping_add((payload.len() / 2) as u32);
        Ok((packet.len(), attributes))
    }
}

/// Audio level in -dBov (0 loudest, 127 silence) for a PCM chunk.
pub fn audio_level(payload: &[u8]) -> u8 {
    let samples = payload.len() / 2;
    if samples == 0 {
        return 127;
    }
    let sum_sq: f64 = payload
        .chunks_exact(2)
        .map(|raw| {
            let s = i16::from_le_bytes([raw[0], raw[1]]) as f64 / 32768.0;
            s * s
        })
        .sum();
    let rms = (sum_sq / samples as f64).sqrt();
    if rms <= 0.0 {
        return 127;
    }
    (-20.0 * rms.log10()).clamp(0.0, 127.0) as u8
}

/// Outcome of a replay run.
#[derive(Debug, Default)]
pub struct ReplaySummary {
    pub packets: u64,
    pub bytes_in: usize,
    pub bytes_out: usize,
    pub filtered: bool,
    pub stats: StatsSnapshot,
}

/// Runs `pcm` through a freshly bound stream and writes the resulting
/// payloads to `out`.
pub fn replay<W: Write>(pcm: Bytes, config: &AppConfig, out: &mut W) -> Result<ReplaySummary> {
    let factory = NoiseFilterFactory::new(config.noise_filter.clone());
    let interceptor = factory.new_interceptor("replay");
    let info = StreamInfo {
        ssrc: config.ssrc,
        payload_type: config.payload_type,
        header_extensions: vec![HeaderExtension::new(AUDIO_LEVEL_EXT_ID, AUDIO_LEVEL_URI)],
    };

    let bytes_in = pcm.len();
    let payload_bytes = config.payload_bytes();
    let source = PcmPacketizer::new(pcm, payload_bytes, config.payload_type, config.ssrc);
    let reader = interceptor.bind_remote_stream(&info, source);

    let mut summary = ReplaySummary {
        bytes_in,
        filtered: reader.is_filtered(),
        ..Default::default()
    };
    // Room for the header, extensions and a payload that absorbed a carried frame.
    let mut buf = vec![0u8; payload_bytes * 2 + 256];

    loop {
        let n = match reader.read(&mut buf, Attributes::new()) {
            Ok((n, _)) => n,
            Err(TransportError::Closed) => break,
            Err(e) => return Err(e).context("Packet source failed"),
        };
        let packet = Packet::unmarshal(&mut &buf[..n])
            .map_err(|e| anyhow::anyhow!("Filter produced an invalid packet: {}", e))?;
        debug!(
            "seq {} ts {}: {} payload bytes",
            packet.header.sequence_number,
            packet.header.timestamp,
            packet.payload.len()
        );
        out.write_all(&packet.payload)?;
        summary.packets += 1;
        summary.bytes_out += packet.payload.len();
    }

    if let Some(filter) = reader.as_filter() {
        let tail = filter.drain_pending();
        out.write_all(&tail)?;
        summary.bytes_out += tail.len();
        summary.stats = filter.stats().snapshot();
    }
    interceptor.unbind_remote_stream(&info);

    Ok(summary)
}

/// File-to-file wrapper around [`replay`].
pub fn replay_file(input: &Path, output: &Path, config: &AppConfig) -> Result<ReplaySummary> {
    let pcm = fs::read(input).with_context(|| format!("Failed to read {}", input.display()))?;
    info!("Replaying {} ({} bytes)", input.display(), pcm.len());

    let file = fs::File::create(output)
        .with_context(|| format!("Failed to create {}", output.display()))?;
    let mut writer = BufWriter::new(file);
    let summary = replay(pcm.into(), config, &mut writer)?;
    writer.flush()?;
    Ok(summary)
}
