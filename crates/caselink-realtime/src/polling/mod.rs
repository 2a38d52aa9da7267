//! Polling fallback for when the hub is unavailable.

pub mod fallback;
pub mod probe;

pub use fallback::PollingFallback;
pub use probe::{HttpVersionProbe, VersionProbe, version_from_body};
