//! # Status Codes
//!
//! Static code → description table for response status codes.
//! Code 0 is success; anything not listed is reported as unknown.

/// Success.
pub const SUCCESS: i32 = 0;

/// Status code constants, grouped by where the failure happened.
pub mod codes {
    // Client side
    pub const UNKNOWN_ERROR: i32 = 3001;
    pub const REQUEST_SEND_ERROR: i32 = 3102;
    pub const API_NOT_REGISTERED: i32 = 3103;
    pub const REQUEST_TIMEOUT: i32 = 3104;
    pub const REQUEST_RESPONSE_MISMATCH: i32 = 3105;
    pub const INVALID_RESPONSE_DATA: i32 = 3106;
    pub const INVALID_LEASE_CLIENT: i32 = 3107;

    // Server side
    pub const RESPONSE_SEND_ERROR: i32 = 3201;
    pub const INTERNAL_SERVER_ERROR: i32 = 3202;
    pub const API_NOT_IMPLEMENTED: i32 = 3203;
    pub const API_PARAMETER_ERROR: i32 = 3204;
    pub const REQUEST_REJECTED: i32 = 3205;
    pub const INVALID_LEASE_SERVER: i32 = 3206;
    pub const LEASE_ALREADY_EXISTS: i32 = 3207;

    // Service specific
    pub const WRONG_TRAJECTORY_POINTS: i32 = 4101;
    pub const SERVICE_SWITCH_ERROR: i32 = 5201;
    pub const SERVICE_PROTECTED: i32 = 5202;
}

const TABLE: &[(i32, &str)] = &[
    (codes::UNKNOWN_ERROR, "Unknown error"),
    (codes::REQUEST_SEND_ERROR, "Request sending error"),
    (codes::API_NOT_REGISTERED, "API not registered"),
    (codes::REQUEST_TIMEOUT, "Request timeout"),
    (codes::REQUEST_RESPONSE_MISMATCH, "Request and response data do not match"),
    (codes::INVALID_RESPONSE_DATA, "Invalid response data"),
    (codes::INVALID_LEASE_CLIENT, "Invalid lease"),
    (codes::RESPONSE_SEND_ERROR, "Response sending error"),
    (codes::INTERNAL_SERVER_ERROR, "Internal server error"),
    (codes::API_NOT_IMPLEMENTED, "API not implemented on the server"),
    (codes::API_PARAMETER_ERROR, "API parameter error"),
    (codes::REQUEST_REJECTED, "Request rejected"),
    (codes::INVALID_LEASE_SERVER, "Invalid lease"),
    (codes::LEASE_ALREADY_EXISTS, "Lease already exists"),
    (codes::WRONG_TRAJECTORY_POINTS, "Wrong number of trajectory points"),
    (codes::SERVICE_SWITCH_ERROR, "Service switch execution error"),
    (
        codes::SERVICE_PROTECTED,
        "The service is protected and cannot be turned on or off",
    ),
];

/// Look up the description of a status code.
pub fn describe_status(code: i32) -> &'static str {
    if code == SUCCESS {
        return "Success";
    }
    TABLE
        .iter()
        .find(|(c, _)| *c == code)
        .map_or("Unrecognised status code", |(_, d)| d)
}

/// True if the code appears in the table (or is success).
pub fn is_known(code: i32) -> bool {
    code == SUCCESS || TABLE.iter().any(|(c, _)| *c == code)
}
