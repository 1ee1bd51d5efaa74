// Callback listener
//
// The hub pushes `event` and `system.multicall` calls to the URL passed in
// `init`. Each request body is decoded once into an `InboundCall`, events are
// handed to an `EventSink` on the serving task, and the hub always gets a
// void response back. Undecodable bodies are answered with a -32700 fault.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use tokio::net::{TcpListener, UdpSocket};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::error::Error;
use crate::xmlrpc::{EventNotification, InboundCall, MethodResponse, ProtocolViolation, Value};

/// XML-RPC fault code for a request body that is not a valid `methodCall`.
pub const FAULT_PARSE_ERROR: i32 = -32700;

/// Receiver of decoded hub calls.
///
/// Called synchronously on the connection's serving task, once per event.
pub trait EventSink: Send + Sync + 'static {
    fn deliver(&self, event: EventNotification);

    /// A call (or nested multicall entry) that did not have the required shape.
    fn reject(&self, _violation: &ProtocolViolation) {}
}

impl<F> EventSink for F
where
    F: Fn(EventNotification) + Send + Sync + 'static,
{
    fn deliver(&self, event: EventNotification) {
        self(event);
    }
}

/// A running callback listener. Dropping it stops accepting connections.
#[derive(Debug)]
pub struct CallbackServer {
    local_addr: SocketAddr,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl CallbackServer {
    /// Bind `addr` (port 0 picks an ephemeral port) and start serving.
    ///
    /// Returns once the socket is accepting.
    pub async fn bind(addr: SocketAddr, sink: Arc<dyn EventSink>) -> Result<Self, Error> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| Error::Bind { addr, source })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| Error::Bind { addr, source })?;

        let app = Router::new().fallback(handle_call).with_state(sink);

        let cancel = CancellationToken::new();
        let shutdown = cancel.clone();
        let task = tokio::spawn(async move {
            let served = axum::serve(listener, app)
                .with_graceful_shutdown(async move { shutdown.cancelled().await })
                .await;
            if let Err(e) = served {
                warn!(error = %e, "callback listener terminated");
            }
        });

        info!(addr = %local_addr, "callback listener bound");
        Ok(Self {
            local_addr,
            cancel,
            task: Some(task),
        })
    }

    /// The address actually bound (resolves port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting, let in-flight requests finish, and wait for the
    /// serving task to exit.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "callback listener task failed");
            }
        }
        info!(addr = %self.local_addr, "callback listener stopped");
    }
}

impl Drop for CallbackServer {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// ── Request handling ─────────────────────────────────────────────────

async fn handle_call(State(sink): State<Arc<dyn EventSink>>, body: Bytes) -> Response {
    let text = String::from_utf8_lossy(&body);
    trace!(body = %text, "inbound call");

    let response = match InboundCall::parse(&text) {
        Ok(call) => {
            route(sink.as_ref(), call);
            MethodResponse::Success(Value::void())
        }
        Err(e) => {
            let violation = ProtocolViolation::Undecodable(e.to_string());
            warn!(error = %violation, "rejecting inbound request");
            sink.reject(&violation);
            MethodResponse::Fault {
                code: FAULT_PARSE_ERROR,
                message: violation.to_string(),
            }
        }
    };

    match response.encode() {
        Ok(body) => ([(header::CONTENT_TYPE, "text/xml")], body).into_response(),
        Err(e) => {
            warn!(error = %e, "cannot encode response");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

fn route(sink: &dyn EventSink, call: Result<InboundCall, ProtocolViolation>) {
    match call {
        Ok(InboundCall::Event(event)) => {
            debug!(
                address = %event.address,
                attribute = %event.attribute,
                value = %event.value,
                "event"
            );
            sink.deliver(event);
        }
        Ok(InboundCall::Multicall(calls)) => {
            debug!(count = calls.len(), "multicall");
            for nested in calls {
                route(sink, nested);
            }
        }
        Ok(InboundCall::Other { method }) => {
            debug!(method = %method, "ignoring inbound call");
        }
        Err(violation) => {
            warn!(error = %violation, "dropping malformed inbound call");
            sink.reject(&violation);
        }
    }
}

// ── Callback address discovery ───────────────────────────────────────

/// The local interface address that routes to `host:port`.
///
/// Connects an unbound UDP socket toward the hub and reads back its local
/// address. No datagram is sent.
pub async fn discover_local_ip(host: &str, port: u16) -> Result<IpAddr, Error> {
    let target = tokio::net::lookup_host((host, port))
        .await
        .map_err(|e| Error::Discovery(format!("cannot resolve {host}: {e}")))?
        .next()
        .ok_or_else(|| Error::Discovery(format!("{host} resolved to no addresses")))?;

    let any: SocketAddr = if target.is_ipv4() {
        (IpAddr::from([0, 0, 0, 0]), 0).into()
    } else {
        (IpAddr::from([0u16; 8]), 0).into()
    };

    let socket = UdpSocket::bind(any)
        .await
        .map_err(|e| Error::Discovery(format!("cannot open probe socket: {e}")))?;
    socket
        .connect(target)
        .await
        .map_err(|e| Error::Discovery(format!("no route to {target}: {e}")))?;
    let local = socket
        .local_addr()
        .map_err(|e| Error::Discovery(e.to_string()))?;

    debug!(hub = %target, local = %local.ip(), "discovered callback address");
    Ok(local.ip())
}
