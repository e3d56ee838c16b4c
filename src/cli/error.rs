//! Exit-status mapping for the binary.

use crate::fetcher::FetchError;

/// Exit status when the storage backend denied access to the source. The
/// dedicated code lets CI infrastructure distinguish a misconfigured service
/// account from a transient failure.
pub const PERMISSION_DENIED_EXIT_STATUS: i32 = 3;

/// Map a run-terminating error to the process exit status.
pub fn exit_code(err: &FetchError) -> i32 {
    match err {
        FetchError::Permission(_) => PERMISSION_DENIED_EXIT_STATUS,
        _ => 1,
    }
}
