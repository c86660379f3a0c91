//! ID generation utilities.

/// Length of a minted correlation id (hex characters).
pub const CORRELATION_ID_LEN: usize = 12;

/// Generate a correlation id: 48 random bits as uppercase hex.
///
/// Short enough to read aloud from a message footer. Uniqueness is
/// additionally enforced by the store's unique index on `cc_id`.
pub fn correlation_id() -> String {
    let bytes: [u8; CORRELATION_ID_LEN / 2] = rand::random();
    hex::encode_upper(bytes)
}
