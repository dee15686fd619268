// notefill_protocol: wire formats spoken by the notefill bridge.
//
// The bridge sits between two peers. The DAW host calls it with XML-RPC
// (`call_nn_infill`, `check_libraries`), and it calls the upstream generation
// service with JSON over HTTP. This crate holds both vocabularies and has no
// networking of its own; the server crate does the HTTP.
//
// Module overview:
// - `value.rs`:   `XmlRpcValue`, with conversions to and from `serde_json::Value`.
// - `xmlrpc.rs`:  `methodCall` / `methodResponse` / fault documents (quick-xml).
// - `call.rs`:    `InfillCall` and `SamplingParams`, decoded from positional
//                 `call_nn_infill` arguments.
// - `message.rs`: upstream JSON bodies and the JSON form of the host call.
// - `body.rs`:    bounded HTTP body reading.
// - `error.rs`:   `ProtocolError`.
//
// Design decisions:
// - **Structured values go through serde.** The snapshot struct is converted
//   to a `serde_json::Value` and deserialized, so the host's JSON-string form
//   and its XML-RPC struct form share one decoder.
// - **No async runtime.** Body reading works on any `std::io::Read`.

pub mod body;
pub mod call;
pub mod error;
pub mod message;
pub mod value;
pub mod xmlrpc;

pub use body::{MAX_BODY_SIZE, read_body};
pub use call::{InfillCall, SamplingParams};
pub use error::ProtocolError;
pub use message::{
    GenerateRequest, GenerateResponse, HealthResponse, InfillRequest, InfillResponse, LegacyParams,
    MidiGenerateRequest,
};
pub use value::XmlRpcValue;
pub use xmlrpc::{
    MethodCall, parse_method_call, parse_method_response, write_fault, write_method_call,
    write_response,
};
