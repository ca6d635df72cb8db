//! Command status codes and their printable names.
//!
//! Handlers return `0` for success. Non-zero codes are reported to the
//! user with the name from [`name`].

/// Generic failure.
pub const FAIL: i32 = -1;
/// Out of memory.
pub const NO_MEM: i32 = 0x101;
/// Invalid argument.
pub const INVALID_ARG: i32 = 0x102;
/// Operation not valid in the current state.
pub const INVALID_STATE: i32 = 0x103;
/// Invalid size.
pub const INVALID_SIZE: i32 = 0x104;
/// Requested resource not found.
pub const NOT_FOUND: i32 = 0x105;
/// Operation not supported.
pub const NOT_SUPPORTED: i32 = 0x106;
/// Operation timed out.
pub const TIMEOUT: i32 = 0x107;

/// Printable name of a status code.
#[must_use]
pub const fn name(code: i32) -> &'static str {
    match code {
        0 => "OK",
        FAIL => "FAIL",
        NO_MEM => "NO_MEM",
        INVALID_ARG => "INVALID_ARG",
        INVALID_STATE => "INVALID_STATE",
        INVALID_SIZE => "INVALID_SIZE",
        NOT_FOUND => "NOT_FOUND",
        NOT_SUPPORTED => "NOT_SUPPORTED",
        TIMEOUT => "TIMEOUT",
        _ => "UNKNOWN_ERROR",
    }
}
