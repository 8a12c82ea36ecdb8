//! Contracts with the packet transport that delivers and forwards packets.

use rtp::header::Header;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Side-channel values travelling with a packet.
pub type Attributes = HashMap<String, String>;

/// Failures of the transport itself. These are the only errors a read can
/// surface; suppression problems never show up here.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("transport closed")]
    Closed,
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// A negotiated RTP header extension.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeaderExtension {
    pub id: u8,
    pub uri: String,
}

impl HeaderExtension {
    pub fn new(id: u8, uri: impl Into<String>) -> Self {
        Self { id, uri: uri.into() }
    }
}

/// Bind-time metadata for one stream.
#[derive(Clone, Debug, Default)]
pub struct StreamInfo {
    pub ssrc: u32,
    pub payload_type: u8,
    pub header_extensions: Vec<HeaderExtension>,
}

impl StreamInfo {
    /// Negotiated id for `uri`, if the stream carries that extension.
    pub fn extension_id(&self, uri: &str) -> Option<u8> {
        self.header_extensions
            .iter()
            .find(|ext| ext.uri == uri)
            .map(|ext| ext.id)
    }
}

/// Source of raw packets. `read` fills `buf` and returns the packet length.
pub trait PacketReader: Send + Sync {
    fn read(&self, buf: &mut [u8], attributes: Attributes)
        -> Result<(usize, Attributes), TransportError>;
}

/// Sink for locally originated packets.
pub trait PacketWriter: Send + Sync {
    fn write(
        &self,
        header: &Header,
        payload: &[u8],
        attributes: &Attributes,
    ) -> Result<usize, TransportError>;
}

/// Adapts a closure into a [`PacketReader`].
pub struct ReaderFn<F>(pub F);

impl<F> PacketReader for ReaderFn<F>
where
    F: Fn(&mut [u8], Attributes) -> Result<(usize, Attributes), TransportError> + Send + Sync,
{
    fn read(
        &self,
        buf: &mut [u8],
        attributes: Attributes,
    ) -> Result<(usize, Attributes), TransportError> {
        (self.0)(buf, attributes)
    }
}

/// Adapts a closure into a [`PacketWriter`].
pub struct WriterFn<F>(pub F);

impl<F> PacketWriter for WriterFn<F>
where
    F: Fn(&Header, &[u8], &Attributes) -> Result<usize, TransportError> + Send + Sync,
{
    fn write(
        &self,
        header: &Header,
        payload: &[u8],
        attributes: &Attributes,
    ) -> Result<usize, TransportError> {
        (self.0)(header, payload, attributes)
    }
}

impl PacketReader for Box<dyn PacketReader> {
    fn read(
        &self,
        buf: &mut [u8],
        attributes: Attributes,
    ) -> Result<(usize, Attributes), TransportError> {
        (**self).read(buf, attributes)
    }
}

impl<R: PacketReader + ?Sized> PacketReader for Arc<R> {
    fn read(
        &self,
        buf: &mut [u8],
        attributes: Attributes,
    ) -> Result<(usize, Attributes), TransportError> {
        (**self).read(buf, attributes)
    }
}

impl PacketWriter for Box<dyn PacketWriter> {
    fn write(
        &self,
        header: &Header,
        payload: &[u8],
        attributes: &Attributes,
    ) -> Result<usize, TransportError> {
        (**self).write(header, payload, attributes)
    }
}
