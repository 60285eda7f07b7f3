//! Shared constants.

pub const KIB: usize = 1024;

/// Read buffer used by the block scanner when the config does not set one.
pub const DEFAULT_READ_BUFFER_KIB: usize = 64;

/// Buffer size used while hashing files for catalog authoring.
pub const AUTHOR_READ_BUFFER: usize = 64 * KIB;

/// Destination directory name format (local time).
pub const DESTINATION_TIME_FORMAT: &str = "%y%m%d_%H%M%S";

pub const MANIFEST_FILE_NAME: &str = "extraction.jsonl";

pub const PROGRESS_RULE: &str = "===============================";

/// Number of distinct fingerprint values.
pub const FINGERPRINT_SPACE: usize = 1 << 16;

/// Largest block a catalog may describe. The scanner keeps a ring buffer as
/// long as the largest block.
pub const MAX_BLOCK_SIZE: u64 = 1 << 30;
