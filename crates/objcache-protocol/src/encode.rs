//! The writing side of the batch protocol.
//!
//! Requests are what the engine sends; the response encoders produce what a
//! batch server answers and are what a stand-in server needs.

use objcache_store::TreeEntry;
use objcache_types::{ObjectId, ObjectKind};

/// Append the request line for `id` to `out`.
pub fn encode_request(id: &ObjectId, out: &mut Vec<u8>) {
    out.extend_from_slice(id.to_hex().as_bytes());
    out.push(b'\n');
}

/// Append a full object response: header, payload and trailing newline.
pub fn encode_response(id: &ObjectId, kind: ObjectKind, payload: &[u8], out: &mut Vec<u8>) {
    out.extend_from_slice(format!("{id} {kind} {}\n", payload.len()).as_bytes());
    out.extend_from_slice(payload);
    out.push(b'\n');
}

/// Append the response for an id the store does not have.
pub fn encode_missing(id: &ObjectId, out: &mut Vec<u8>) {
    out.extend_from_slice(format!("{id} missing\n").as_bytes());
}

/// Encode tree entries as a binary tree payload.
pub fn encode_tree<'a>(entries: impl IntoIterator<Item = &'a TreeEntry>) -> Vec<u8> {
    let mut out = Vec::new();
    for entry in entries {
        out.extend_from_slice(format!("{:o} {}\0", entry.mode.mode_bits(), entry.name).as_bytes());
        out.extend_from_slice(entry.id.as_bytes());
    }
    out
}
