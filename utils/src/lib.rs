//! Shared infrastructure utilities for Warden.
//!
//! - **`atomic_write`**: Crash-safe file persistence (temp + rename)

pub mod atomic_write;

pub use atomic_write::{atomic_write, recover_bak_file};
