// Bounded request/response body reading.
//
// HTTP bodies on both sides of the bridge (XML-RPC from the host, JSON from the
// upstream) are read through `read_body`, which refuses anything over
// `MAX_BODY_SIZE` instead of growing without bound. Snapshots of long songs
// are the largest expected bodies.

use std::io::{self, Read};

/// Maximum accepted body size (16 MB).
pub const MAX_BODY_SIZE: u64 = 16 * 1024 * 1024;

/// Read an entire UTF-8 body of at most `limit` bytes.
///
/// Returns `InvalidData` if the body is longer than `limit` or is not UTF-8.
pub fn read_body<R: Read>(reader: R, limit: u64) -> io::Result<String> {
    let mut buf = Vec::new();
    reader.take(limit.saturating_add(1)).read_to_end(&mut buf)?;
    if buf.len() as u64 > limit {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("body too large (max {limit} bytes)"),
        ));
    }
    String::from_utf8(buf).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}
