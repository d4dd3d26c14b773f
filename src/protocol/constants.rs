//! Wire constants for the file transfer protocol

/// Command and response lines carry a 2-byte length prefix.
pub const MAX_LINE_LEN: usize = u16::MAX as usize;

/// Default ceiling for a single blob payload.
pub const DEFAULT_MAX_BLOB: usize = 1024 * 1024 * 1024; // 1GB

/// Verbs
pub const VERB_GET: &str = "GET";
pub const VERB_PUT: &str = "PUT";
pub const VERB_DELETE: &str = "DELETE";
pub const VERB_EXIT: &str = "exit";

/// Addressing modes
pub const BY_NAME: &str = "BY_NAME";
pub const BY_ID: &str = "BY_ID";

/// PUT target asking the server to pick the file name
pub const WILDCARD: &str = "*";

/// Response codes
pub const STATUS_OK: &str = "200";
pub const STATUS_FORBIDDEN: &str = "403";
pub const STATUS_NOT_FOUND: &str = "404";

pub const INVALID_COMMAND: &str = "Invalid command!";
