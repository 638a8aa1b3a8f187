//! Random identifiers

use rand::distributions::Alphanumeric;
use rand::Rng;

/// Length of keys handed out for uploaded content
pub const CONTENT_KEY_LEN: usize = 6;

/// Length of the generated instance id when `SERVICE_ID` is unset
pub const SERVICE_ID_LEN: usize = 4;

/// Alphanumeric string of `len` characters
pub fn random_key(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

pub fn content_key() -> String {
    random_key(CONTENT_KEY_LEN)
}
