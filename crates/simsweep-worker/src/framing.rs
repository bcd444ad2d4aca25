//! Length-prefixed framing for the worker protocol.
//!
//! Frame layout: `[4-byte big-endian length][payload]`. Control messages are
//! JSON payloads; netlists and outputs travel as raw binary frames.

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Upper bound on a single frame. Waveform files of long stepped runs can be
/// large, but never this large.
pub const MAX_FRAME_SIZE: usize = 1024 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
  #[error("frame I/O error: {0}")]
  Io(#[from] std::io::Error),

  #[error("frame of {0} bytes exceeds the limit")]
  TooLarge(usize),

  #[error("malformed message: {0}")]
  Json(#[from] serde_json::Error),
}

pub async fn write_frame<S>(stream: &mut S, data: &[u8]) -> Result<(), FrameError>
where
  S: AsyncWrite + Unpin,
{
  if data.len() > MAX_FRAME_SIZE {
    return Err(FrameError::TooLarge(data.len()));
  }
  stream.write_all(&(data.len() as u32).to_be_bytes()).await?;
  stream.write_all(data).await?;
  stream.flush().await?;
  Ok(())
}

pub async fn read_frame_len<S>(stream: &mut S, max_size: usize) -> Result<usize, FrameError>
where
  S: AsyncRead + Unpin,
{
  let mut len_buf = [0u8; 4];
  stream.read_exact(&mut len_buf).await?;
  let len = u32::from_be_bytes(len_buf) as usize;
  if len > max_size {
    return Err(FrameError::TooLarge(len));
  }
  Ok(len)
}

pub async fn read_frame<S>(stream: &mut S, max_size: usize) -> Result<Vec<u8>, FrameError>
where
  S: AsyncRead + Unpin,
{
  let len = read_frame_len(stream, max_size).await?;
  let mut buf = vec![0u8; len];
  stream.read_exact(&mut buf).await?;
  Ok(buf)
}

pub async fn write_message<S, T>(stream: &mut S, message: &T) -> Result<(), FrameError>
where
  S: AsyncWrite + Unpin,
  T: Serialize,
{
  let payload = serde_json::to_vec(message)?;
  write_frame(stream, &payload).await
}

/// Control messages are small; anything over 1 MiB is rejected.
pub async fn read_message<S, T>(stream: &mut S) -> Result<T, FrameError>
where
  S: AsyncRead + Unpin,
  T: DeserializeOwned,
{
  let payload = read_frame(stream, 1024 * 1024).await?;
  Ok(serde_json::from_slice(&payload)?)
}
