// Single-entry result cache.
//
// Holds the last normalized request, the result produced for it, and the
// normalized forms of every output produced for that request. A request that
// normalizes differently evicts the entry wholesale. The cache is a plain
// value owned by `InfillService`; there is no shared state.

use std::collections::BTreeSet;

use notefill_codec::{GenerationResult, normalize_request};

#[derive(Debug)]
struct CacheEntry {
    request: String,
    result: GenerationResult,
    outputs: BTreeSet<String>,
}

#[derive(Debug, Default)]
pub struct ResultCache {
    entry: Option<CacheEntry>,
}

impl ResultCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The stored result, if `normalized` is exactly the cached request.
    pub fn lookup(&self, normalized: &str) -> Option<&GenerationResult> {
        self.entry
            .as_ref()
            .filter(|e| e.request == normalized)
            .map(|e| &e.result)
    }

    /// Record `result` for `normalized`. Returns false when the same request
    /// already produced an output that normalizes identically.
    pub fn store(&mut self, normalized: &str, result: GenerationResult) -> bool {
        let output = normalize_request(&result.notation);
        match &mut self.entry {
            Some(entry) if entry.request == normalized => {
                entry.result = result;
                entry.outputs.insert(output)
            }
            _ => {
                self.entry = Some(CacheEntry {
                    request: normalized.to_string(),
                    result,
                    outputs: BTreeSet::from([output]),
                });
                true
            }
        }
    }

    /// Number of distinct outputs seen for the cached request.
    pub fn outputs_seen(&self) -> usize {
        self.entry.as_ref().map_or(0, |e| e.outputs.len())
    }

    pub fn clear(&mut self) {
        self.entry = None;
    }
}
