//! Authenticated encryption for secrets, with Base64 plumbing on both sides.
//! Payloads are sealed with XChaCha20-Poly1305 (or AES-256-GCM) inside a small
//! versioned envelope; headerless payloads from older releases still open.

pub mod codec;
pub mod encoding;
pub mod envelope;
pub mod error;
pub mod keys;

pub use codec::{Codec, CodecConfig, Opened, Sealed};
pub use encoding::{detect_base64_in_string, is_base64_string};
pub use envelope::Algorithm;
pub use error::CodecError;
pub use keys::{generate_key, generate_key_with_length, is_key_valid, KEY_SIZE};
