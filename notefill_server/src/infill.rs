// The host-facing infill operation.
//
// `InfillService::handle` is the single recovery boundary of the bridge. It
// takes a decoded `call_nn_infill`, asks the backend for content, and always
// returns notation: on any backend failure the requested placeholders get the
// fallback phrase instead. The host never sees an error from here.
//
// Per request:
// 1. Normalize the notation into the cache key.
// 2. Serve from the cache unless sampling is on (sampling asks for a fresh
//    draw every time).
// 3. Bind placeholders to (track, measure) and call the backend. With no
//    target left (the selection or the song's reach excludes them all) the
//    backend is skipped.
// 4. Re-key the result onto the requested ids, filling gaps with fallback.
// 5. Store the raw result under the normalized request.

use std::collections::BTreeMap;

use notefill_codec::{
    GenerationResult, MaskLocation, PlaceholderId, fallback_notation, mask_locations,
    measure_contexts, normalize_request, placeholder_ids, realign, summarize, target_measures,
};
use notefill_protocol::{InfillCall, SamplingParams, XmlRpcValue};
use notefill_song::{GlobalOptions, SongSnapshot, TrackOptions};

use crate::backend::GenerationBackend;
use crate::cache::ResultCache;

/// One generation request, built once from the host call.
#[derive(Clone, Debug, PartialEq)]
pub struct GenerationRequest {
    pub notation: String,
    pub snapshot: SongSnapshot,
    pub sampling: SamplingParams,
    /// Options sent with the call; these win over the configured ones.
    pub options: Option<GlobalOptions>,
    pub track_options: BTreeMap<u32, TrackOptions>,
    /// Distinct placeholder ids of `notation`, in first-seen order.
    pub placeholders: Vec<PlaceholderId>,
    /// Cache key; see `normalize_request`.
    pub normalized: String,
}

impl GenerationRequest {
    pub fn new(call: InfillCall) -> Self {
        let placeholders = placeholder_ids(&call.notation);
        let normalized = normalize_request(&call.notation);
        Self {
            notation: call.notation,
            snapshot: call.snapshot,
            sampling: call.sampling,
            options: call.options,
            track_options: call.track_options,
            placeholders,
            normalized,
        }
    }

    /// Placeholder locations inside the requested measure selection and
    /// within the snapshot's reach. Without a selection every reachable
    /// placeholder is a target.
    pub fn target_locations(&self) -> Vec<MaskLocation> {
        let contexts = measure_contexts(&self.notation);
        let targets = target_measures(&contexts, self.sampling.selection());
        mask_locations(&self.notation, &BTreeMap::new())
            .into_iter()
            .filter(|loc| targets.contains(&loc.measure))
            .filter(|loc| {
                let reachable = self.snapshot.within_reach(loc.track, loc.measure);
                if !reachable {
                    log::debug!(
                        "{} at track {} measure {} is beyond the song",
                        loc.placeholder,
                        loc.track,
                        loc.measure
                    );
                }
                reachable
            })
            .collect()
    }

    pub fn to_call(&self) -> InfillCall {
        InfillCall {
            notation: self.notation.clone(),
            snapshot: self.snapshot.clone(),
            sampling: self.sampling.clone(),
            options: self.options.clone(),
            track_options: self.track_options.clone(),
        }
    }
}

pub struct InfillService {
    backend: Box<dyn GenerationBackend>,
    cache: ResultCache,
    cache_enabled: bool,
}

impl InfillService {
    pub fn new(backend: Box<dyn GenerationBackend>, cache_enabled: bool) -> Self {
        Self {
            backend,
            cache: ResultCache::new(),
            cache_enabled,
        }
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn handle(&mut self, call: InfillCall) -> String {
        let request = GenerationRequest::new(call);
        let ids = &request.placeholders;
        let summary = summarize(&request.notation);
        log::debug!(
            "infill request: {} placeholder(s) {:?}, {} note(s), {} measure marker(s)",
            ids.len(),
            summary.placeholder_ids,
            summary.note_count,
            summary.measure_count
        );

        if self.cache_enabled
            && !request.sampling.use_sampling
            && let Some(hit) = self.cache.lookup(&request.normalized)
        {
            log::info!("serving cached result for {} placeholder(s)", ids.len());
            return realign(hit, ids);
        }

        let locations = request.target_locations();
        log::debug!(
            "target measures: {:?}",
            locations.iter().map(|l| l.measure).collect::<Vec<_>>()
        );
        if locations.is_empty() && !ids.is_empty() {
            log::info!(
                "no placeholder is a generation target, returning fallback for {} placeholder(s)",
                ids.len()
            );
            return fallback_notation(ids);
        }

        let result: GenerationResult = match self.backend.generate(&request, &locations) {
            Ok(result) => result,
            Err(e) => {
                log::warn!(
                    "{} backend failed, returning fallback for {} placeholder(s): {e}",
                    self.backend.name(),
                    ids.len()
                );
                return fallback_notation(ids);
            }
        };

        let notation = realign(&result, ids);
        if self.cache_enabled && !self.cache.store(&request.normalized, result) {
            log::debug!("backend repeated an earlier output for this request");
        }

        let out = summarize(&notation);
        log::debug!(
            "infill result: {} span(s), {} note(s)",
            out.placeholder_ids.len(),
            out.note_count
        );
        notation
    }

    /// Answer for the host's `check_libraries` call.
    pub fn check_libraries(&self) -> XmlRpcValue {
        XmlRpcValue::Struct(BTreeMap::from([
            ("backend".to_string(), XmlRpcValue::from(self.backend.name())),
            ("midi_available".to_string(), XmlRpcValue::Bool(true)),
            (
                "model_available".to_string(),
                XmlRpcValue::Bool(self.backend.model_available()),
            ),
        ]))
    }

    pub fn model_available(&self) -> bool {
        self.backend.model_available()
    }
}
