//! Utility functions and helpers.
//!
//! Common functionality used across multiple Husk crates.

pub mod clock;
pub mod path;

// Re-export commonly used utilities
pub use clock::{format_timestamp, Clock, ManualClock, SharedClock, SystemClock};
pub use path::{
    is_safe_key, meta_key, package_prefix, sidecar_key, tarball_file_name, tarball_key,
};
