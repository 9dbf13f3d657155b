//! Process exit codes.

/// The job completed.
pub const SUCCESS: i32 = 0;

/// The job failed, or the command could not run.
pub const FAILED: i32 = 1;

/// The job was cancelled, or the user pressed Ctrl-C.
pub const CANCELLED: i32 = 2;
