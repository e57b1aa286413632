//! Process exit codes.
//!
//! 2 is left to clap, which uses it for usage errors.

pub const SUCCESS: u8 = 0;
pub const GENERAL_ERROR: u8 = 1;
pub const NOT_FOUND: u8 = 3;
pub const PERMISSION_DENIED: u8 = 5;
/// A handle buffer or pre-append hold buffer could not be allocated
pub const ALLOCATION_FAILED: u8 = 6;
