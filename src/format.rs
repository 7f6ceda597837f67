//! Reply formatting for display.
//!
//! Purely cosmetic: the client itself never inspects or alters replies.

/// Re-indent a JSON reply for readability.
///
/// Key order and values are preserved. Anything that does not parse as JSON
/// is returned unchanged.
pub fn pretty_json(reply: &[u8]) -> Vec<u8> {
    match serde_json::from_slice::<serde_json::Value>(reply) {
        Ok(value) => serde_json::to_vec_pretty(&value).unwrap_or_else(|_| reply.to_vec()),
        Err(_) => reply.to_vec(),
    }
}
