//! Compile-time revision metadata, surfaced to callers with no runtime
//! cost and no persisted state.

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// A short human-readable banner, used by the CLI's `--version` output.
pub fn banner() -> String {
    format!("tdm-core {VERSION}")
}
