// notefill_server: XML-RPC bridge between a DAW host and a generation model.
//
// The host script calls `call_nn_infill` with a notation string full of
// `<extra_id_N>` placeholders plus a snapshot of the song. The bridge binds the
// placeholders to (track, measure) pairs, asks an upstream model service for
// content, and answers with notation that has one non-empty span per
// placeholder. When the upstream is missing or misbehaves, the host still gets
// fallback content rather than an error.
//
// Module overview:
// - `infill.rs`:  `GenerationRequest` and `InfillService`, the recovery
//                 boundary that owns the result cache.
// - `cache.rs`:   `ResultCache`, the single-entry cache keyed by the
//                 normalized request.
// - `backend.rs`: the `GenerationBackend` trait and the piece-JSON, MIDI-file
//                 and XML-RPC-forwarding upstream clients (blocking reqwest).
// - `server.rs`:  tiny_http front end: XML-RPC and JSON routes, `ServerHandle`.
// - `stub.rs`:    a deterministic stand-in for the upstream service.
// - `config.rs`:  `ServiceConfig`, loaded from JSON and overridden by flags.
// - `error.rs`:   `ServerError`.
//
// The bridge runs as the `notefill` binary or embedded via `start_server`.
// `notefill-stub` runs the stub upstream on its own.

pub mod backend;
pub mod cache;
pub mod config;
pub mod error;
pub mod infill;
pub mod server;
pub mod stub;

pub use backend::{GenerationBackend, backend_from_config};
pub use cache::ResultCache;
pub use config::{ServiceConfig, UpstreamConfig, UpstreamKind};
pub use error::ServerError;
pub use infill::{GenerationRequest, InfillService};
pub use server::{ServerHandle, start_server};
pub use stub::start_stub_service;
