//! Per-attempt deadline selection.
//!
//! A pure function of the target filename and the zero-based attempt index.
//! Source files are expected to be small, so their first attempts get tight
//! deadlines and a stalled read is retried quickly; likely-large asset files
//! get more slack. From the third attempt on, every file gets the same
//! generous default.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use once_cell::sync::Lazy;

/// Deadlines for attempts 0 and 1 of source-classified files.
pub const SOURCE_TIMEOUTS: [Duration; 2] = [Duration::from_secs(1), Duration::from_secs(2)];

/// Deadlines for attempts 0 and 1 of everything else.
pub const NOT_SOURCE_TIMEOUTS: [Duration; 2] = [Duration::from_secs(5), Duration::from_secs(10)];

/// Deadline for attempt 2 and beyond, regardless of classification.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

static SOURCE_EXTENSIONS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "js", "ts", "py", "go", "java", "c", "cc", "cpp", "h", "rb", "sh", "html", "css", "json",
        "yaml", "xml", "md",
    ]
    .into_iter()
    .collect()
});

/// Select the deadline for `filename`'s attempt number `attempt`.
pub fn for_attempt(filename: &str, attempt: u32) -> Duration {
    let pair = if is_source_file(filename) {
        &SOURCE_TIMEOUTS
    } else {
        &NOT_SOURCE_TIMEOUTS
    };
    match attempt {
        0 | 1 => pair[attempt as usize],
        _ => DEFAULT_TIMEOUT,
    }
}

/// A file is source-classified when its extension is in the enumerated set.
/// No extension means non-source.
fn is_source_file(filename: &str) -> bool {
    Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| SOURCE_EXTENSIONS.contains(ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}
