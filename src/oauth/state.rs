//! State parameter generation
//!
//! The state parameter binds an authorization request to its callback and
//! doubles as the key of the correlation cache.

use rand::RngExt;

/// Length of every generated state parameter
pub const STATE_LEN: usize = 15;

/// Symbols a state parameter is drawn from (62 symbols, ~5.95 bits each)
pub const STATE_ALPHABET: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Generate a fresh random state parameter
#[must_use]
pub fn generate_state() -> String {
    random_alphanumeric(STATE_LEN)
}

/// Uniformly sample `len` symbols from [`STATE_ALPHABET`]
fn random_alphanumeric(len: usize) -> String {
    let mut rng = rand::rng();
    (0..len)
        .map(|_| char::from(STATE_ALPHABET[rng.random_range(0..STATE_ALPHABET.len())]))
        .collect()
}
