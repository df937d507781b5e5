//! Shared utilities for `gitlab_transfer`.
//!
//! - Content hashing (SHA256) for the staging manifest
//! - Progress indicators for note pull and replay

mod hash;
pub mod progress;

pub use hash::sha256_hex;
