//! Contract of the ordered, strongly consistent key-value substrate that the
//! metadata service is built on: serializable read-write transactions,
//! snapshot reads and ordered range scans.

mod engine;
mod transaction;

pub use engine::KvEngine;
pub use transaction::*;

/// Return the key immediately after the given key (for range queries).
///
/// This appends a zero byte, making the result strictly greater than the input
/// in lexicographic order.
pub fn key_after(key: &[u8]) -> Vec<u8> {
    let mut result = key.to_vec();
    result.push(0);
    result
}

/// Return the end key for a prefix range scan.
///
/// Increments the last non-0xFF byte of the prefix. If the prefix is all 0xFF
/// bytes (or empty), returns an empty vec to indicate "no upper bound".
pub fn prefix_list_end_key(prefix: &[u8]) -> Vec<u8> {
    let mut end = prefix.to_vec();
    while let Some(last) = end.last_mut() {
        if *last < 0xFF {
            *last += 1;
            return end;
        }
        end.pop();
    }
    end
}

/// Whether `key` falls inside the half-open range `[begin, end)`, where an
/// empty `end` means "no upper bound".
pub fn range_contains(begin: &[u8], end: &[u8], key: &[u8]) -> bool {
    key >= begin && (end.is_empty() || key < end)
}
