pub mod config;
pub mod constants;
pub mod filter;
pub mod frame_adapter;
pub mod interceptor;
pub mod pcm;
pub mod processor;
pub mod stats;
pub mod transport;

pub use config::{ConfigError, NoiseFilterConfig, SharedConfig};
pub use filter::{FilterStatus, NoiseFilterReader};
pub use frame_adapter::FrameAdapter;
pub use interceptor::{
    classify, BoundReader, NoiseFilterFactory, NoiseFilterInterceptor, StreamRoute,
};
pub use processor::{
    EngineFactory, EngineOutput, RnnoiseEngine, RnnoiseFactory, SuppressionEngine,
};
pub use stats::{FilterStats, StatsSnapshot};
pub use transport::{
    Attributes, HeaderExtension, PacketReader, PacketWriter, ReaderFn, StreamInfo, TransportError,
    WriterFn,
};
