//! Process-level run ID for renumbering passes.
//!
//! Every process gets one ULID at first access. The date-range driver records
//! it on its tracing span and in the run summary, so log lines and summaries
//! from the same pass can be correlated.

use once_cell::sync::Lazy;
use ulid::Ulid;

static RUN_ID: Lazy<String> = Lazy::new(|| Ulid::new().to_string());

/// Returns the process-level run ID (26 characters, time-ordered).
#[inline]
pub fn get() -> &'static str {
    &RUN_ID
}

/// Generates a fresh ULID, e.g. to name a scratch schema.
#[inline]
pub fn generate() -> String {
    Ulid::new().to_string()
}
