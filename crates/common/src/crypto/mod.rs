//! Cryptographic primitives for strongbox
//!
//! - **Encryption**: AES-256-GCM under one process-wide data key, fresh
//!   96-bit random nonce per blob, 128-bit tag
//! - **Key at rest**: the data key is stored AES-KW wrapped under an
//!   Argon2id-derived key-encryption key, in a PEM file
//! - **Key loading**: [`Codec`] pulls the key from a [`KeyProvider`] once,
//!   on first use
//!
//! Key bytes are zeroised on drop and never formatted.

mod codec;
mod keystore;
mod provider;
mod secret;

pub use codec::Codec;
pub use keystore::{open_key_file, seal_key_file, KdfParams, PEM_TAG};
pub use provider::{KeyError, KeyProvider, KeystoreProvider};
pub use secret::{CodecError, DataKey, KEY_SIZE, NONCE_SIZE, TAG_SIZE};
