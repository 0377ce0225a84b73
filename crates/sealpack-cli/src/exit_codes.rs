//! Exit codes for the sealpack CLI
//!
//! Follows common Unix conventions:
//! - 0: Success
//! - 1: General error
//! - 2-63: Application-specific errors
//! - 64-78: Standard BSD exit codes (sysexits.h)
//! - 130: Interrupted

#![allow(dead_code)]

/// Successful execution
pub const SUCCESS: i32 = 0;

/// General error
pub const ERROR: i32 = 1;

/// Invalid input: malformed event, reference or tag
pub const INPUT_ERROR: i32 = 2;

/// Key store or decryption failure
pub const CRYPTO_ERROR: i32 = 3;

/// Registry could not resolve or deliver the package
pub const REGISTRY_ERROR: i32 = 4;

/// IO error (file not found, permissions, etc.)
pub const IO_ERROR: i32 = 5;

/// Run exceeded its deadline
pub const TIMEOUT: i32 = 6;

/// Loader rejected the repackaged archive
pub const LOAD_ERROR: i32 = 7;

/// Usage error (bad arguments)
pub const USAGE_ERROR: i32 = 64;

/// Configuration error
pub const CONFIG_ERROR: i32 = 78;

/// Interrupted by the user
pub const INTERRUPTED: i32 = 130;
