//! Incremental gzip compression for artifacts.
//!
//! Both directions work one chunk at a time: the caller hands in a chunk and
//! gets back whatever output the codec produced for it, so neither side ever
//! holds more than one chunk plus the deflate window.

use flate2::write::{GzDecoder, GzEncoder};
use flate2::Compression;
use std::io::Write;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::SnapshotError;

pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;
pub const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStats {
    pub bytes_in: u64,
    pub bytes_out: u64,
}

pub struct ChunkCompressor {
    encoder: GzEncoder<Vec<u8>>,
    stats: StreamStats,
}

impl ChunkCompressor {
    pub fn new(level: u32) -> Self {
        Self {
            encoder: GzEncoder::new(Vec::new(), Compression::new(level.min(9))),
            stats: StreamStats::default(),
        }
    }

    /// Open a compressor, or report that compression is switched off so the
    /// caller can fall back to a plain artifact.
    pub fn open(enabled: bool, level: u32) -> Result<Self, SnapshotError> {
        if !enabled {
            return Err(SnapshotError::CompressionUnavailable);
        }
        Ok(Self::new(level))
    }

    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<u8>, SnapshotError> {
        self.encoder.write_all(chunk)?;
        self.stats.bytes_in += chunk.len() as u64;
        let out = std::mem::take(self.encoder.get_mut());
        self.stats.bytes_out += out.len() as u64;
        Ok(out)
    }

    pub fn finish(mut self) -> Result<(Vec<u8>, StreamStats), SnapshotError> {
        self.encoder.try_finish()?;
        let out = std::mem::take(self.encoder.get_mut());
        self.stats.bytes_out += out.len() as u64;
        Ok((out, self.stats))
    }
}

pub struct ChunkDecompressor {
    decoder: GzDecoder<Vec<u8>>,
    stats: StreamStats,
}

impl Default for ChunkDecompressor {
    fn default() -> Self {
        Self::new()
    }
}

impl ChunkDecompressor {
    pub fn new() -> Self {
        Self {
            decoder: GzDecoder::new(Vec::new()),
            stats: StreamStats::default(),
        }
    }

    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<u8>, SnapshotError> {
        self.decoder
            .write_all(chunk)
            .map_err(|e| SnapshotError::Decompression(e.to_string()))?;
        self.stats.bytes_in += chunk.len() as u64;
        let out = std::mem::take(self.decoder.get_mut());
        self.stats.bytes_out += out.len() as u64;
        Ok(out)
    }

    /// Verifies the gzip trailer (CRC32 and length). A stream cut short
    /// anywhere, header included, fails here.
    pub fn finish(mut self) -> Result<(Vec<u8>, StreamStats), SnapshotError> {
        if self.stats.bytes_in == 0 {
            return Err(SnapshotError::Decompression("empty stream".into()));
        }
        self.decoder
            .try_finish()
            .map_err(|e| SnapshotError::Decompression(format!("truncated or corrupt stream: {e}")))?;
        let out = std::mem::take(self.decoder.get_mut());
        self.stats.bytes_out += out.len() as u64;
        Ok((out, self.stats))
    }
}

pub fn is_gzip(bytes: &[u8]) -> bool {
    bytes.starts_with(&GZIP_MAGIC)
}

pub fn compress(data: &[u8], level: u32, chunk_size: usize) -> Result<Vec<u8>, SnapshotError> {
    let mut compressor = ChunkCompressor::new(level);
    let mut out = Vec::new();
    for chunk in data.chunks(chunk_size.max(1)) {
        out.extend_from_slice(&compressor.push(chunk)?);
    }
    let (tail, _) = compressor.finish()?;
    out.extend_from_slice(&tail);
    Ok(out)
}

pub fn decompress(data: &[u8], chunk_size: usize) -> Result<Vec<u8>, SnapshotError> {
    let mut decompressor = ChunkDecompressor::new();
    let mut out = Vec::new();
    for chunk in data.chunks(chunk_size.max(1)) {
        out.extend_from_slice(&decompressor.push(chunk)?);
    }
    let (tail, _) = decompressor.finish()?;
    out.extend_from_slice(&tail);
    Ok(out)
}

/// Pump `reader` through the compressor into `writer`. The next chunk is not
/// read until the previous output has been written, so a slow consumer
/// throttles the producer.
pub async fn compress_stream<R, W>(
    mut compressor: ChunkCompressor,
    mut reader: R,
    mut writer: W,
    chunk_size: usize,
) -> Result<StreamStats, SnapshotError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; chunk_size.max(1)];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        let out = compressor.push(&buf[..n])?;
        if !out.is_empty() {
            writer.write_all(&out).await?;
        }
    }
    let (tail, stats) = compressor.finish()?;
    writer.write_all(&tail).await?;
    writer.shutdown().await?;
    Ok(stats)
}

pub async fn decompress_stream<R, W>(
    mut reader: R,
    mut writer: W,
    chunk_size: usize,
) -> Result<StreamStats, SnapshotError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut decompressor = ChunkDecompressor::new();
    let mut buf = vec![0u8; chunk_size.max(1)];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        let out = decompressor.push(&buf[..n])?;
        if !out.is_empty() {
            writer.write_all(&out).await?;
        }
    }
    let (tail, stats) = decompressor.finish()?;
    writer.write_all(&tail).await?;
    writer.shutdown().await?;
    Ok(stats)
}
