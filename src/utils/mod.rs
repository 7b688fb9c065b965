pub mod hash;

pub use hash::{finalize_with_nonce, hash, header_hasher};
