// Request normalization for the single-entry result cache.
//
// Two requests that differ only in placeholder numbering or in absolute
// measure indices ask the model for the same thing, so they share a cache
// key: every `<extra_id_N>` becomes `<e>`, and every `;M:<n>` (up to but not
// including the next `;`) becomes `<M>`.

use crate::token::{PLACEHOLDER_PREFIX, PLACEHOLDER_SUFFIX, SEPARATOR};

const MEASURE_MARKER: &str = ";M:";

pub fn normalize_request(stream: &str) -> String {
    collapse_measures(&collapse_placeholders(stream))
}

fn collapse_placeholders(stream: &str) -> String {
    let mut out = String::with_capacity(stream.len());
    let mut rest = stream;
    while let Some(start) = rest.find(PLACEHOLDER_PREFIX) {
        let Some(len) = rest[start..].find(PLACEHOLDER_SUFFIX) else {
            break;
        };
        out.push_str(&rest[..start]);
        out.push_str("<e>");
        rest = &rest[start + len + 1..];
    }
    out.push_str(rest);
    out
}

fn collapse_measures(stream: &str) -> String {
    let mut out = String::with_capacity(stream.len());
    let mut rest = stream;
    while let Some(start) = rest.find(MEASURE_MARKER) {
        out.push_str(&rest[..start]);
        out.push_str("<M>");
        let after = &rest[start + MEASURE_MARKER.len()..];
        rest = match after.find(SEPARATOR) {
            Some(end) => &after[end..],
            None => "",
        };
    }
    out.push_str(rest);
    out
}
