//! Error handling utilities
//!
//! This module provides centralized fatal error handling for the binary.

use crate::error::RosterError;
use tracing::error;

/// Exit code for errors that are not a [`RosterError`]
const GENERAL_ERROR: i32 = 1;

/// Resolve the message to print and the exit code for an error
///
/// In verbose mode the full cause chain is appended.
pub fn describe_fatal_error(error: &anyhow::Error, verbose: u8) -> (String, i32) {
    if let Some(roster_err) = error.downcast_ref::<RosterError>() {
        let mut message = roster_err.user_message();
        if verbose >= 1 {
            message.push_str("\n\nContext Chain:\n");
            message.push_str(&roster_err.developer_message());
        }
        return (message, roster_err.exit_code());
    }

    let mut message = format!("Error: {error}");
    if verbose >= 1 {
        message.push_str("\n\nError chain:");
        for (i, cause) in error.chain().enumerate() {
            message.push_str(&format!("\n  {}: {}", i, cause));
        }
    }
    (message, GENERAL_ERROR)
}

/// Handle fatal errors and exit with appropriate status code
///
/// - `verbose = 0`: User-friendly messages only
/// - `verbose >= 1`: Includes the full error chain
pub fn handle_fatal_error(error: anyhow::Error, verbose: u8) -> ! {
    error!("Fatal error: {}", error);

    let (message, exit_code) = describe_fatal_error(&error, verbose);
    eprintln!("{}", message);

    std::process::exit(exit_code)
}
