/// Error code registry for Roster
///
/// Error codes are organized by category:
/// - 1000-1999: Configuration errors
/// - 2000-2999: Aggregation errors
/// - 3000-3999: Record source errors
/// - 4000-4999: Server errors
/// - 9000-9999: Other errors
pub struct ErrorCode;

impl ErrorCode {
    // Configuration errors (1000-1999)
    pub const CONFIG_GENERIC: u16 = 1000;
    pub const CONFIG_NOT_FOUND: u16 = 1001;
    pub const CONFIG_PARSE_ERROR: u16 = 1002;
    pub const CONFIG_INVALID_VALUE: u16 = 1003;
    pub const CONFIG_INVALID_ENV: u16 = 1004;

    // Aggregation errors (2000-2999)
    pub const AGGREGATION_GENERIC: u16 = 2000;
    pub const AGGREGATION_INVALID_ARGUMENT: u16 = 2001;
    pub const AGGREGATION_LIMIT_EXCEEDED: u16 = 2002;
    pub const AGGREGATION_BARRIER_VIOLATION: u16 = 2003;

    // Record source errors (3000-3999)
    pub const SOURCE_GENERIC: u16 = 3000;
    pub const SOURCE_CLIENT_BUILD_FAILED: u16 = 3001;
    pub const SOURCE_INVALID_URL: u16 = 3002;

    // Server errors (4000-4999)
    pub const SERVER_GENERIC: u16 = 4000;
    pub const SERVER_BIND_FAILED: u16 = 4001;
    pub const SERVER_SERIALIZATION_FAILED: u16 = 4002;

    // Other errors (9000-9999)
    pub const OTHER_GENERIC: u16 = 9000;
    pub const OTHER_INTERNAL_ERROR: u16 = 9001;
}

/// Get a human-readable description for an error code
pub fn describe_error_code(code: u16) -> &'static str {
    match code {
        1000 => "Generic configuration error",
        1001 => "Configuration file not found",
        1002 => "Failed to parse configuration",
        1003 => "Invalid value in configuration",
        1004 => "Invalid value in environment override",

        2000 => "Generic aggregation error",
        2001 => "Invalid aggregation argument",
        2002 => "Aggregation argument exceeds configured limit",
        2003 => "Completion barrier transition out of order",

        3000 => "Generic record source error",
        3001 => "Failed to build HTTP client for record source",
        3002 => "Invalid record source URL",

        4000 => "Generic server error",
        4001 => "Failed to bind listener",
        4002 => "Failed to serialize response",

        9000 => "Generic error",
        9001 => "Internal error",

        _ => "Unknown error code",
    }
}
