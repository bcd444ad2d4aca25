//! Codec error types.

/// Errors produced while reading or writing raw waveform data.
#[derive(Debug, thiserror::Error)]
pub enum RawError {
  /// The input is malformed: missing keys, inconsistent sizes, bad text.
  #[error("format error: {message}")]
  Format { message: String },

  /// The input is well formed but uses a variant this codec does not handle.
  #[error("unsupported format: {message}")]
  UnsupportedFormat { message: String },

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
}

impl RawError {
  pub(crate) fn format(message: impl Into<String>) -> Self {
    Self::Format {
      message: message.into(),
    }
  }

  pub(crate) fn unsupported(message: impl Into<String>) -> Self {
    Self::UnsupportedFormat {
      message: message.into(),
    }
  }
}
