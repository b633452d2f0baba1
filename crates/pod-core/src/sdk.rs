//! Active SDK version detection.
//!
//! Packages may constrain the SDK they run on. The active version is
//! detected once at startup and passed through the command context
//! rather than read from a global.

use crate::error::PodResult;
use crate::version::Version;

/// Test override for the detected SDK version
pub const SDK_VERSION_OVERRIDE: &str = "_PUB_TEST_SDK_VERSION";

/// Determine the active SDK version: the override variable when set,
/// otherwise the toolchain version this binary was built against.
pub fn active_version() -> PodResult<Version> {
    if let Ok(text) = std::env::var(SDK_VERSION_OVERRIDE) {
        return text.parse();
    }
    env!("CARGO_PKG_VERSION").parse()
}
