/// Password-derived encryption for identity payloads
///
/// All persisted and published identity data passes through `CipherBox`;
/// nothing outside this module inspects an `EncryptedBlob`.

pub mod cipher_box;

pub use cipher_box::{CipherBox, EncryptedBlob};
