//! Per-stream noise filter sitting in front of an RTP packet reader.
//!
//! Every failure inside the filter degrades to "forward the packet as it
//! arrived". Only errors from the upstream reader are returned to the caller.

use crate::config::NoiseFilterConfig;
use crate::constants::{FRAME_BYTES, NOISE_FRAME_GAIN};
use crate::frame_adapter::FrameAdapter;
use crate::pcm;
use crate::processor::{EngineFactory, SuppressionEngine};
use crate::stats::FilterStats;
use crate::transport::{Attributes, PacketReader, TransportError};
use bytes::{Bytes, BytesMut};
use log::{debug, error, warn};
use parking_lot::Mutex;
use rtp::packet::Packet;
use std::sync::Arc;
use webrtc_util::marshal::{Marshal, MarshalSize, Unmarshal};

/// Lifecycle of the stream's engine handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterStatus {
    /// No packet has arrived yet.
    Uninitialized,
    /// Engine created, frames are being suppressed.
    Active,
    /// Engine creation failed; the stream passes through until it is rebound.
    Degraded,
}

enum EngineState {
    Uninitialized,
    Active(Box<dyn SuppressionEngine>),
    Degraded,
}

impl EngineState {
    /// Creates the engine on first use. Creation is attempted exactly once.
    fn ensure(
        &mut self,
        factory: &dyn EngineFactory,
        ssrc: u32,
    ) -> Option<&mut (dyn SuppressionEngine + 'static)> {
        if let EngineState::Uninitialized = self {
            *self = match factory.create() {
                Ok(engine) => {
                    debug!("Initialized suppression engine for ssrc {}", ssrc);
                    EngineState::Active(engine)
                }
                Err(e) => {
                    error!(
                        "Failed to initialize suppression engine for ssrc {}: {:#}",
                        ssrc, e
                    );
                    EngineState::Degraded
                }
            };
        }

        match self {
            EngineState::Active(engine) => Some(engine.as_mut()),
            _ => None,
        }
    }

    fn status(&self) -> FilterStatus {
        match self {
            EngineState::Uninitialized => FilterStatus::Uninitialized,
            EngineState::Active(_) => FilterStatus::Active,
            EngineState::Degraded => FilterStatus::Degraded,
        }
    }
}

struct FilterState {
    engine: EngineState,
    adapter: FrameAdapter,
}

/// Wraps an upstream reader and suppresses noise in the PCM payload of every
/// packet it yields.
pub struct NoiseFilterReader<R> {
    reader: R,
    ssrc: u32,
    config: Arc<NoiseFilterConfig>,
    engines: Arc<dyn EngineFactory>,
    state: Mutex<FilterState>,
    stats: Arc<FilterStats>,
}

impl<R: PacketReader> NoiseFilterReader<R> {
    pub fn new(
        reader: R,
        ssrc: u32,
        config: Arc<NoiseFilterConfig>,
        engines: Arc<dyn EngineFactory>,
    ) -> Self {
        Self {
            reader,
            ssrc,
            config,
            engines,
            state: Mutex::new(FilterState {
                engine: EngineState::Uninitialized,
                adapter: FrameAdapter::new(),
            }),
            stats: Arc::new(FilterStats::default()),
        }
    }

    /// Configuration snapshot taken when the stream was bound.
    pub fn config(&self) -> &NoiseFilterConfig {
        &self.config
    }

    pub fn ssrc(&self) -> u32 {
        self.ssrc
    }

    pub fn status(&self) -> FilterStatus {
        self.state.lock().engine.status()
    }

    pub fn stats(&self) -> Arc<FilterStats> {
        self.stats.clone()
    }

    /// Bytes of an incomplete frame waiting for the next packet.
    pub fn pending_len(&self) -> usize {
        self.state.lock().adapter.pending_len()
    }

    /// Removes the buffered partial frame, e.g. when the stream ends and the
    /// last few samples should still be delivered.
    pub fn drain_pending(&self) -> Bytes {
        self.state.lock().adapter.take_remainder()
    }

    fn pass_through(&self, n: usize, attributes: Attributes) -> (usize, Attributes) {
        self.stats.packet_passed();
        (n, attributes)
    }

    /// Runs every complete frame through the engine and returns the new payload.
    fn suppress(
        &self,
        engine: &mut dyn SuppressionEngine,
        adapter: &mut FrameAdapter,
        payload: &[u8],
    ) -> Vec<u8> {
        let frames = adapter.consume(payload);
        let mut out = Vec::with_capacity(frames.len() * FRAME_BYTES + adapter.pending_len());

        for frame in &frames {
            let mut samples = pcm::decode_frame(frame);
            match engine.process(&samples, self.config.threshold) {
                Ok(result) if result.voice_detected => {
                    samples = result.samples;
                    self.stats.frame_voiced();
                }
                Ok(_) => {
                    pcm::apply_gain(&mut samples, NOISE_FRAME_GAIN);
                    self.stats.frame_attenuated();
                }
                Err(e) => {
                    // Keep the unsuppressed frame; the engine stays in use.
                    debug!("Engine failed on frame for ssrc {}: {:#}", self.ssrc, e);
                    self.stats.frame_error();
                }
            }
            pcm::encode_frame(&samples, &mut out);
        }

        // In carry mode a packet that completes no frame still releases what
        // is buffered, so nothing waits behind a run of short packets.
        if !self.config.carry_remainder || frames.is_empty() {
            out.extend_from_slice(&adapter.take_remainder());
        }
        out
    }
}

impl<R: PacketReader> PacketReader for NoiseFilterReader<R> {
    fn read(
        &self,
        buf: &mut [u8],
        attributes: Attributes,
    ) -> Result<(usize, Attributes), TransportError> {
        let (n, attributes) = self.reader.read(buf, attributes)?;

        let mut guard = self.state.lock();
        let state = &mut *guard;

        let Some(engine) = state.engine.ensure(self.engines.as_ref(), self.ssrc) else {
            return Ok(self.pass_through(n, attributes));
        };

        let Some(mut raw) = buf.get(..n) else {
            return Ok(self.pass_through(n, attributes));
        };
        let mut packet = match Packet::unmarshal(&mut raw) {
            Ok(packet) => packet,
            Err(e) => {
                debug!("Passing through unparseable packet on ssrc {}: {}", self.ssrc, e);
                return Ok(self.pass_through(n, attributes));
            }
        };

        let carry = self.config.carry_remainder;
        if packet.payload.len() < FRAME_BYTES && (!carry || state.adapter.pending_len() == 0) {
            return Ok(self.pass_through(n, attributes));
        }

        let original = packet.payload.clone();
        let carried = Bytes::copy_from_slice(state.adapter.remainder());
        let processed = self.suppress(engine, &mut state.adapter, &original);
        packet.payload = Bytes::from(processed);

        match packet.marshal() {
            Ok(data) if data.len() <= buf.len() => {
                buf[..data.len()].copy_from_slice(&data);
                self.stats.packet_suppressed();
                return Ok((data.len(), attributes));
            }
            Ok(data) => warn!(
                "Processed packet on ssrc {} too large for buffer ({} > {})",
                self.ssrc,
                data.len(),
                buf.len()
            ),
            Err(e) => {
                error!("Failed to marshal processed packet on ssrc {}: {}", self.ssrc, e);
            }
        }

        self.stats.fallback();
        state.adapter.clear();
        if carried.is_empty() {
            return Ok(self.pass_through(n, attributes));
        }

        packet.payload = original;
        Ok(self.pass_through_carried(packet, &carried, &mut state.adapter, buf, n, attributes))
    }
}

impl<R> NoiseFilterReader<R> {
    /// Carry-mode fallback. The bytes carried from earlier packets go out
    /// first, unprocessed, followed by as much of this packet's payload as
    /// fits; the rest is carried again. When no packet can be built the
    /// carried bytes are dropped and the packet goes out as it arrived.
    fn pass_through_carried(
        &self,
        mut packet: Packet,
        carried: &[u8],
        adapter: &mut FrameAdapter,
        buf: &mut [u8],
        n: usize,
        attributes: Attributes,
    ) -> (usize, Attributes) {
        let mut stream = BytesMut::with_capacity(carried.len() + packet.payload.len());
        stream.extend_from_slice(carried);
        stream.extend_from_slice(&packet.payload);

        let room = buf.len().saturating_sub(packet.header.marshal_size());
        let emit = stream.len().min(room);
        let tail = stream.split_off(emit);
        packet.payload = stream.freeze();

        self.stats.packet_passed();
        match packet.marshal() {
            Ok(data) if data.len() <= buf.len() => {
                adapter.restore(&tail);
                buf[..data.len()].copy_from_slice(&data);
                (data.len(), attributes)
            }
            _ => {
                warn!(
                    "Dropping {} carried bytes on ssrc {} to keep packet order",
                    carried.len(),
                    self.ssrc
                );
                (n, attributes)
            }
        }
    }
}
