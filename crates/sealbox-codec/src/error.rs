use thiserror::Error;

/// Errors produced by the codec.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Nothing to encrypt or decrypt.
    #[error("input is empty")]
    EmptyInput,
    /// The key cannot be normalized to the cipher key size.
    #[error("invalid key: {reason}")]
    InvalidKey { reason: String },
    /// The decoded payload cannot hold a nonce and an authentication tag.
    #[error("encrypted payload too short: {len} bytes, need at least {min}")]
    PayloadTooShort { len: usize, min: usize },
    /// Tag mismatch under every key interpretation tried.
    #[error("authentication failed: wrong key or tampered payload")]
    AuthenticationFailure,
    #[error("encode failure: {reason}")]
    Encode { reason: String },
    #[error("decode failure: {reason}")]
    Decode { reason: String },
    /// The OS random source failed.
    #[error("random source failure: {reason}")]
    Random { reason: String },
}

pub type Result<T> = std::result::Result<T, CodecError>;
