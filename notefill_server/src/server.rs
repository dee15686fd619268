// HTTP front end of the bridge.
//
// One tiny_http server on a background thread; requests are handled one at a
// time on that thread, so the `InfillService` (and its cache) is owned by the
// loop and borrowed mutably per request with no locking.
//
// Routes:
// - `POST /`, `POST /RPC2`: XML-RPC. Methods `call_nn_infill` and
//   `check_libraries`. Malformed documents, bad arguments and unknown methods
//   get a fault response (HTTP 200, as XML-RPC requires).
// - `POST /infill`: the same infill operation with JSON bodies.
// - `GET /health`: bridge status and whether the upstream has a model.
// - anything else: 404 with a JSON error body.
//
// Shutdown: the loop polls with `recv_timeout` and checks a `keep_running`
// flag, cleared by `ServerHandle::stop`.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use serde::Serialize;
use tiny_http::{Header, Method, Request, Response, Server};

use notefill_codec::placeholder_ids;
use notefill_protocol::{
    HealthResponse, InfillCall, InfillRequest, InfillResponse, MAX_BODY_SIZE, XmlRpcValue,
    parse_method_call, read_body, write_fault, write_response,
};

use crate::backend::GenerationBackend;
use crate::config::ServiceConfig;
use crate::infill::InfillService;

/// Fault codes, following the XML-RPC interoperability conventions.
pub const FAULT_PARSE_ERROR: i64 = -32700;
pub const FAULT_METHOD_NOT_FOUND: i64 = -32601;
pub const FAULT_INVALID_PARAMS: i64 = -32602;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Handle returned by `start_server` to control the running server.
pub struct ServerHandle {
    keep_running: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<()>>,
}

impl ServerHandle {
    /// Signal the server to stop and wait for it to shut down.
    pub fn stop(mut self) {
        self.keep_running.store(false, Ordering::SeqCst);
        self.join_thread();
    }

    /// Block until the server thread exits.
    pub fn wait(mut self) {
        self.join_thread();
    }

    fn join_thread(&mut self) {
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

/// Bind `addr` and run `handler` for every request on a background thread.
/// Returns the handle and the actual bound address (port 0 lets the OS pick).
pub(crate) fn spawn_http<F>(addr: &str, mut handler: F) -> io::Result<(ServerHandle, SocketAddr)>
where
    F: FnMut(Request) + Send + 'static,
{
    let server = Server::http(addr).map_err(io::Error::other)?;
    let local = server
        .server_addr()
        .to_ip()
        .ok_or_else(|| io::Error::other("server is not bound to an IP address"))?;

    let keep_running = Arc::new(AtomicBool::new(true));
    let keep_running_loop = keep_running.clone();
    let thread = thread::spawn(move || {
        while keep_running_loop.load(Ordering::SeqCst) {
            match server.recv_timeout(POLL_INTERVAL) {
                Ok(Some(request)) => handler(request),
                Ok(None) => {}
                Err(e) => {
                    log::warn!("accept failed: {e}");
                    break;
                }
            }
        }
    });

    Ok((
        ServerHandle {
            keep_running,
            thread: Some(thread),
        },
        local,
    ))
}

/// Start the bridge on `config.bind_addr:config.port`.
pub fn start_server(
    config: &ServiceConfig,
    backend: Box<dyn GenerationBackend>,
) -> io::Result<(ServerHandle, SocketAddr)> {
    let mut service = InfillService::new(backend, config.cache_enabled);
    log::info!(
        "starting bridge with {} backend, cache {}",
        service.backend_name(),
        if config.cache_enabled { "on" } else { "off" }
    );
    spawn_http(&config.listen_addr(), move |request| {
        handle_request(&mut service, request)
    })
}

fn handle_request(service: &mut InfillService, mut request: Request) {
    let path = request.url().split('?').next().unwrap_or("").to_string();
    let method = request.method().clone();
    log::info!("{method} {path}");

    match (&method, path.as_str()) {
        (Method::Post, "/" | "/RPC2") => {
            let reply = match read_body(request.as_reader(), MAX_BODY_SIZE) {
                Ok(body) => dispatch_xmlrpc(service, &body),
                Err(e) => write_fault(FAULT_PARSE_ERROR, &e.to_string()),
            };
            respond(request, 200, "text/xml", reply);
        }
        (Method::Post, "/infill") => {
            let (status, reply) = match read_body(request.as_reader(), MAX_BODY_SIZE)
                .map_err(|e| e.to_string())
                .and_then(|body| serde_json::from_str::<InfillRequest>(&body).map_err(|e| e.to_string()))
            {
                Ok(req) => {
                    let notation = service.handle(InfillCall::from(req));
                    let placeholders = placeholder_ids(&notation);
                    (200, json_body(&InfillResponse { notation, placeholders }))
                }
                Err(e) => (400, error_body(&e)),
            };
            respond(request, status, "application/json", reply);
        }
        (Method::Get, "/health") => {
            let health = HealthResponse::ok(service.model_available());
            respond(request, 200, "application/json", json_body(&health));
        }
        _ => {
            let reply = error_body(&format!("no route for {method} {path}"));
            respond(request, 404, "application/json", reply);
        }
    }
}

/// Decode an XML-RPC call and produce the response document.
pub fn dispatch_xmlrpc(service: &mut InfillService, body: &str) -> String {
    let call = match parse_method_call(body) {
        Ok(call) => call,
        Err(e) => {
            log::warn!("rejecting XML-RPC request: {e}");
            return write_fault(FAULT_PARSE_ERROR, &e.to_string());
        }
    };

    match call.name.as_str() {
        "call_nn_infill" => match InfillCall::from_params(&call.params) {
            Ok(infill) => write_response(&XmlRpcValue::String(service.handle(infill))),
            Err(e) => {
                log::warn!("bad call_nn_infill arguments: {e}");
                write_fault(FAULT_INVALID_PARAMS, &e.to_string())
            }
        },
        "check_libraries" => write_response(&service.check_libraries()),
        other => write_fault(
            FAULT_METHOD_NOT_FOUND,
            &format!("method {other:?} is not supported"),
        ),
    }
}

pub(crate) fn json_body<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|e| error_body(&e.to_string()))
}

pub(crate) fn error_body(message: &str) -> String {
    serde_json::json!({ "error": message }).to_string()
}

pub(crate) fn respond(request: Request, status: u16, content_type: &str, body: String) {
    let mut response = Response::from_string(body).with_status_code(status);
    if let Ok(header) = Header::from_bytes(&b"Content-Type"[..], content_type.as_bytes()) {
        response.add_header(header);
    }
    if let Err(e) = request.respond(response) {
        log::warn!("failed to send response: {e}");
    }
}
