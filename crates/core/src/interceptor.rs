//! Stream classification and binding.
//!
//! Each stream is inspected once when it is bound. Audio streams get a
//! [`NoiseFilterReader`] in front of their reader when suppression is enabled;
//! everything else, including RTCP and locally sent streams, is left alone.

use crate::config::{NoiseFilterConfig, SharedConfig};
use crate::constants::AUDIO_LEVEL_URI;
use crate::filter::NoiseFilterReader;
use crate::processor::{EngineFactory, RnnoiseFactory};
use crate::transport::{Attributes, PacketReader, PacketWriter, StreamInfo, TransportError};
use log::debug;
use std::sync::Arc;

/// Routing decision for a bound stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamRoute {
    Suppress,
    PassThrough,
}

/// Decides whether a stream gets noise suppression.
///
/// A stream qualifies only when suppression is enabled and it negotiated the
/// audio level header extension. Missing or empty extension metadata is a
/// pass-through, not an error.
pub fn classify(info: &StreamInfo, config: &NoiseFilterConfig) -> StreamRoute {
    if !config.enabled {
        return StreamRoute::PassThrough;
    }
    match info.extension_id(AUDIO_LEVEL_URI) {
        Some(id) if id != 0 => StreamRoute::Suppress,
        _ => StreamRoute::PassThrough,
    }
}

/// Holds the process-wide configuration and hands out interceptors.
pub struct NoiseFilterFactory {
    config: SharedConfig,
    engines: Arc<dyn EngineFactory>,
}

impl NoiseFilterFactory {
    /// Factory using the default RNNoise engine.
    pub fn new(config: NoiseFilterConfig) -> Self {
        Self::with_engines(config, Arc::new(RnnoiseFactory))
    }

    pub fn with_engines(config: NoiseFilterConfig, engines: Arc<dyn EngineFactory>) -> Self {
        Self {
            config: SharedConfig::new(config),
            engines,
        }
    }

    /// Replaces the configuration. Only streams bound afterwards see it.
    pub fn update_config(&self, config: NoiseFilterConfig) {
        self.config.publish(config);
    }

    pub fn config(&self) -> NoiseFilterConfig {
        self.config.snapshot().as_ref().clone()
    }

    pub fn new_interceptor(&self, id: &str) -> NoiseFilterInterceptor {
        NoiseFilterInterceptor {
            id: id.to_string(),
            config: self.config.clone(),
            engines: self.engines.clone(),
        }
    }
}

/// Binds streams of one peer connection.
pub struct NoiseFilterInterceptor {
    id: String,
    config: SharedConfig,
    engines: Arc<dyn EngineFactory>,
}

/// Reader returned for a bound remote stream.
pub enum BoundReader<R> {
    Filtered(NoiseFilterReader<R>),
    PassThrough(R),
}

impl<R: PacketReader> BoundReader<R> {
    pub fn is_filtered(&self) -> bool {
        matches!(self, BoundReader::Filtered(_))
    }

    pub fn as_filter(&self) -> Option<&NoiseFilterReader<R>> {
        match self {
            BoundReader::Filtered(filter) => Some(filter),
            BoundReader::PassThrough(_) => None,
        }
    }
}

impl<R: PacketReader> PacketReader for BoundReader<R> {
    fn read(
        &self,
        buf: &mut [u8],
        attributes: Attributes,
    ) -> Result<(usize, Attributes), TransportError> {
        match self {
            BoundReader::Filtered(filter) => filter.read(buf, attributes),
            BoundReader::PassThrough(reader) => reader.read(buf, attributes),
        }
    }
}

impl NoiseFilterInterceptor {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Binds an incoming stream, attaching a filter when [`classify`] says so.
    pub fn bind_remote_stream<R: PacketReader>(
        &self,
        info: &StreamInfo,
        reader: R,
    ) -> BoundReader<R> {
        let config = self.config.snapshot();
        match classify(info, &config) {
            StreamRoute::Suppress => {
                debug!(
                    "[{}] applying noise filter to ssrc {} (pt {}, {:?})",
                    self.id, info.ssrc, info.payload_type, config
                );
                BoundReader::Filtered(NoiseFilterReader::new(
                    reader,
                    info.ssrc,
                    config,
                    self.engines.clone(),
                ))
            }
            StreamRoute::PassThrough => {
                debug!(
                    "[{}] passing through ssrc {} (pt {})",
                    self.id, info.ssrc, info.payload_type
                );
                BoundReader::PassThrough(reader)
            }
        }
    }

    /// Per-stream state lives in the reader returned by
    /// [`bind_remote_stream`](Self::bind_remote_stream) and is dropped with it.
    pub fn unbind_remote_stream(&self, info: &StreamInfo) {
        debug!("[{}] unbound ssrc {}", self.id, info.ssrc);
    }

    /// Locally originated streams are forwarded untouched.
    pub fn bind_local_stream<W: PacketWriter>(&self, _info: &StreamInfo, writer: W) -> W {
        writer
    }

    /// RTCP is never touched.
    pub fn bind_rtcp_reader<R: PacketReader>(&self, reader: R) -> R {
        reader
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::FRAME_SIZE;
    use crate::processor::{EngineOutput, SuppressionEngine};
    use crate::transport::{HeaderExtension, ReaderFn, WriterFn};
    use rtp::header::Header;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use webrtc_util::marshal::Marshal;

    /// Engine that zeroes everything, so any processing is visible.
    struct Silencer;

    impl SuppressionEngine for Silencer {
        fn process(
            &mut self,
            _frame: &[f32; FRAME_SIZE],
            _threshold: f32,
        ) -> anyhow::Result<EngineOutput> {
            Ok(EngineOutput {
                samples: [0.0; FRAME_SIZE],
                vad_probability: 1.0,
                voice_detected: true,
            })
        }
    }

    struct SilencerFactory;

    impl EngineFactory for SilencerFactory {
        fn create(&self) -> anyhow::Result<Box<dyn SuppressionEngine>> {
            Ok(Box::new(Silencer))
        }
    }

    fn enabled() -> NoiseFilterConfig {
        NoiseFilterConfig {
            enabled: true,
            ..Default::default()
        }
    }

    fn silencing_interceptor() -> NoiseFilterInterceptor {
        NoiseFilterFactory::with_engines(enabled(), Arc::new(SilencerFactory))
            .new_interceptor("")
    }

    fn audio_stream() -> StreamInfo {
        StreamInfo {
            ssrc: 12345,
            payload_type: 111,
            header_extensions: vec![HeaderExtension::new(1, AUDIO_LEVEL_URI)],
        }
    }

    fn video_stream() -> StreamInfo {
        StreamInfo {
            ssrc: 12345,
            payload_type: 96,
            header_extensions: vec![],
        }
    }

    /// Upstream that writes a fixed RTP packet with a loud PCM payload.
    struct LoudReader;

    impl PacketReader for LoudReader {
        fn read(
            &self,
            buf: &mut [u8],
            attributes: Attributes,
        ) -> Result<(usize, Attributes), TransportError> {
            let header = Header {
                version: 2,
                payload_type: 111,
                ssrc: 12345,
                ..Default::default()
            };
            let mut packet = header
                .marshal()
                .map_err(|e| TransportError::Other(anyhow::anyhow!("{e}")))?
                .to_vec();
            packet.extend((0..FRAME_SIZE).flat_map(|_| 8000i16.to_le_bytes()));
            buf[..packet.len()].copy_from_slice(&packet);
            Ok((packet.len(), attributes))
        }
    }

    #[test]
    fn test_factory_stores_config() {
        for config in [enabled(), NoiseFilterConfig::default()] {
            let factory = NoiseFilterFactory::new(config.clone());
            assert_eq!(factory.config(), config);
            assert_eq!(factory.new_interceptor("pc-1").id(), "pc-1");
        }
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify(&audio_stream(), &enabled()), StreamRoute::Suppress);
        assert_eq!(classify(&video_stream(), &enabled()), StreamRoute::PassThrough);
        assert_eq!(
            classify(&audio_stream(), &NoiseFilterConfig::default()),
            StreamRoute::PassThrough
        );

        let unrelated = StreamInfo {
            header_extensions: vec![HeaderExtension::new(2, "urn:ietf:params:rtp-hdrext:toffset")],
            ..audio_stream()
        };
        assert_eq!(classify(&unrelated, &enabled()), StreamRoute::PassThrough);
    }

    #[test]
    fn test_bind_remote_audio_stream_attaches_filter() {
        let config = enabled();
        let interceptor = NoiseFilterFactory::new(config.clone()).new_interceptor("");
        let reader = interceptor.bind_remote_stream(&audio_stream(), LoudReader);

        assert!(reader.is_filtered());
        assert_eq!(reader.as_filter().map(|f| f.config().clone()), Some(config));
    }

    #[test]
    fn test_non_audio_stream_is_untouched() {
        let interceptor = silencing_interceptor();
        let reader = interceptor.bind_remote_stream(&video_stream(), LoudReader);
        assert!(!reader.is_filtered());

        let mut expected = [0u8; 1500];
        let (n_expected, _) = LoudReader.read(&mut expected, Attributes::new()).unwrap();
        let mut buf = [0u8; 1500];
        let (n, _) = reader.read(&mut buf, Attributes::new()).unwrap();
        assert_eq!(&buf[..n], &expected[..n_expected]);
    }

    #[test]
    fn test_disabled_config_is_untouched() {
        let interceptor = NoiseFilterFactory::with_engines(
            NoiseFilterConfig::default(),
            Arc::new(SilencerFactory),
        )
        .new_interceptor("");
        let reader = interceptor.bind_remote_stream(&audio_stream(), LoudReader);
        assert!(!reader.is_filtered());
    }

    #[test]
    fn test_filtered_stream_is_processed() {
        let interceptor = silencing_interceptor();
        let reader = interceptor.bind_remote_stream(&audio_stream(), LoudReader);

        let mut buf = [0u8; 1500];
        let (n, _) = reader.read(&mut buf, Attributes::new()).unwrap();
        assert!(buf[12..n].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_update_config_only_affects_new_binds() {
        let factory = NoiseFilterFactory::with_engines(enabled(), Arc::new(SilencerFactory));
        let interceptor = factory.new_interceptor("");
        let before = interceptor.bind_remote_stream(&audio_stream(), LoudReader);

        factory.update_config(NoiseFilterConfig::default());
        let after = interceptor.bind_remote_stream(&audio_stream(), LoudReader);

        assert!(before.is_filtered());
        assert!(!after.is_filtered());
        assert!(!factory.config().enabled);
    }

    #[test]
    fn test_rtcp_reader_passes_through() {
        let interceptor = NoiseFilterFactory::new(enabled()).new_interceptor("");
        let reader = interceptor.bind_rtcp_reader(ReaderFn(|buf: &mut [u8], attrs: Attributes| {
            Ok::<_, TransportError>((buf.len(), attrs))
        }));

        let mut data = [0x80, 0xc8, 0x00, 0x06];
        let (n, attrs) = reader.read(&mut data, Attributes::new()).unwrap();
        assert_eq!(n, 4);
        assert!(attrs.is_empty());
        assert_eq!(data, [0x80, 0xc8, 0x00, 0x06]);
    }

    #[test]
    fn test_local_stream_passes_through() {
        let interceptor = NoiseFilterFactory::new(enabled()).new_interceptor("");
        let writes = Arc::new(AtomicUsize::new(0));
        let counter = writes.clone();
        let writer = interceptor.bind_local_stream(
            &audio_stream(),
            WriterFn(move |_header: &Header, payload: &[u8], _attrs: &Attributes| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, TransportError>(payload.len())
            }),
        );

        let header = Header {
            version: 2,
            payload_type: 111,
            ssrc: 12345,
            timestamp: 1000,
            ..Default::default()
        };
        let payload = [0u8; 160];
        let n = writer.write(&header, &payload, &Attributes::new()).unwrap();
        assert_eq!(n, 160);
        assert_eq!(writes.load(Ordering::SeqCst), 1);
    }

    /// Engine factory whose engines each hold a clone of `token`.
    struct TrackedFactory {
        token: Arc<()>,
    }

    struct Tracked {
        _token: Arc<()>,
    }

    impl SuppressionEngine for Tracked {
        fn process(
            &mut self,
            frame: &[f32; FRAME_SIZE],
            _threshold: f32,
        ) -> anyhow::Result<EngineOutput> {
            Ok(EngineOutput {
                samples: *frame,
                vad_probability: 1.0,
                voice_detected: true,
            })
        }
    }

    impl EngineFactory for TrackedFactory {
        fn create(&self) -> anyhow::Result<Box<dyn SuppressionEngine>> {
            Ok(Box::new(Tracked {
                _token: self.token.clone(),
            }))
        }
    }

    #[test]
    fn test_unbind_drops_filter_state() {
        let token = Arc::new(());
        let factory = TrackedFactory {
            token: token.clone(),
        };
        let interceptor = NoiseFilterFactory::with_engines(enabled(), Arc::new(factory))
            .new_interceptor("");
        let info = audio_stream();
        let reader = interceptor.bind_remote_stream(&info, LoudReader);

        let mut buf = [0u8; 1500];
        reader.read(&mut buf, Attributes::new()).unwrap();
        // Test, factory and the stream's engine.
        assert_eq!(Arc::strong_count(&token), 3);

        interceptor.unbind_remote_stream(&info);
        drop(reader);
        assert_eq!(Arc::strong_count(&token), 2);
    }
}
