// ── Hub channel ──
//
// Subscription lifecycle for one hub: bring up the callback listener,
// register its URL with `init`, fan pushed events out to handlers, and
// reverse all of it on disconnect. Transitions are serialized by one async
// mutex held for their full duration; readers use a separate watch flag.

use std::collections::BTreeMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::net::SocketAddr;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, watch};
use tracing::{Instrument, Span, debug, info, info_span, warn};

use hmccu_api::transport::{BasicAuth, TlsMode, TransportConfig};
use hmccu_api::{
    CallbackServer, EventNotification, EventSink, ProtocolViolation, RpcClient, Value,
};

use crate::config::{HubConfig, TlsVerification, bracket_host};
use crate::error::CoreError;
use crate::handler::{DeviceEvent, EventHandler, handler_key};
use crate::monitor::ViolationMonitor;

// ── ConnectionState ──────────────────────────────────────────────

/// Connection state observable by consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connected,
}

// ── Channel ──────────────────────────────────────────────────────

/// Event channel to one hub.
///
/// Cheaply cloneable via `Arc<ChannelInner>`. The callback listener is
/// bound exactly while the state is [`Connected`](ConnectionState::Connected).
#[derive(Clone)]
pub struct Channel {
    inner: Arc<ChannelInner>,
}

struct ChannelInner {
    config: HubConfig,
    client: Arc<RpcClient>,
    fanout: Arc<Fanout>,
    state: watch::Sender<ConnectionState>,
    lifecycle: Mutex<Option<Registration>>,
    span: Span,
}

/// What exists only while connected.
struct Registration {
    server: CallbackServer,
    callback_url: String,
}

impl Channel {
    /// Create a channel. Does NOT connect.
    pub fn new(config: HubConfig) -> Result<Self, CoreError> {
        let span = info_span!("hub", host = %config.address.host);
        Self::with_span(config, span)
    }

    /// Create a channel whose logging is attached to `span`.
    pub fn with_span(config: HubConfig, span: Span) -> Result<Self, CoreError> {
        let client = RpcClient::new(config.rpc_url()?, &build_transport(&config))?;
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let fanout = Arc::new(Fanout {
            handlers: DashMap::new(),
            monitor: ViolationMonitor::new(config.violation_alarm_threshold),
            span: span.clone(),
        });

        Ok(Self {
            inner: Arc::new(ChannelInner {
                config,
                client: Arc::new(client),
                fanout,
                state,
                lifecycle: Mutex::new(None),
                span,
            }),
        })
    }

    pub fn config(&self) -> &HubConfig {
        &self.inner.config
    }

    pub fn span(&self) -> &Span {
        &self.inner.span
    }

    // ── Connection lifecycle ─────────────────────────────────────

    /// Bind the callback listener and register it with the hub.
    ///
    /// A no-op (with a warning) when already connected. If registration
    /// fails the listener is shut down before the error is returned.
    pub async fn connect(&self) -> Result<(), CoreError> {
        self.connect_locked()
            .instrument(self.inner.span.clone())
            .await
    }

    async fn connect_locked(&self) -> Result<(), CoreError> {
        let mut lifecycle = self.inner.lifecycle.lock().await;
        if lifecycle.is_some() {
            warn!("connect requested while already connected");
            return Ok(());
        }

        let config = &self.inner.config;
        let host = match &config.callback_host {
            Some(host) => host.clone(),
            None => hmccu_api::discover_local_ip(&config.address.host, config.address.request_port)
                .await?
                .to_string(),
        };

        let sink: Arc<dyn EventSink> = self.inner.fanout.clone();
        let server = CallbackServer::bind(config.callback_bind_addr(), sink).await?;
        let callback_url = format!("http://{}:{}", bracket_host(&host), server.local_addr().port());

        if let Err(e) = self
            .inner
            .client
            .init(&callback_url, &config.interface_id)
            .await
        {
            warn!(error = %e, callback = %callback_url, "registration failed, releasing listener");
            server.shutdown().await;
            return Err(e.into());
        }

        info!(
            callback = %callback_url,
            interface_id = %config.interface_id,
            "registered with hub"
        );
        *lifecycle = Some(Registration {
            server,
            callback_url,
        });
        self.inner.state.send_replace(ConnectionState::Connected);
        Ok(())
    }

    /// De-register from the hub and shut the callback listener down.
    ///
    /// The listener is released even when de-registration fails; that
    /// error is returned afterwards.
    pub async fn disconnect(&self) -> Result<(), CoreError> {
        self.disconnect_locked()
            .instrument(self.inner.span.clone())
            .await
    }

    async fn disconnect_locked(&self) -> Result<(), CoreError> {
        let mut lifecycle = self.inner.lifecycle.lock().await;
        let Some(registration) = lifecycle.take() else {
            warn!("disconnect requested while not connected");
            return Ok(());
        };

        // An empty interface id is the hub's unsubscribe.
        let deregistered = self.inner.client.init(&registration.callback_url, "").await;
        if let Err(ref e) = deregistered {
            warn!(error = %e, "de-registration failed, shutting listener down anyway");
        }

        registration.server.shutdown().await;
        self.inner.state.send_replace(ConnectionState::Disconnected);
        info!("disconnected from hub");

        deregistered.map_err(CoreError::from)
    }

    /// Current state; never blocks on a running transition.
    pub fn is_connected(&self) -> bool {
        *self.inner.state.borrow() == ConnectionState::Connected
    }

    /// Subscribe to connection state changes.
    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    /// Address the callback listener is bound to, while connected.
    pub async fn callback_addr(&self) -> Option<SocketAddr> {
        self.inner
            .lifecycle
            .lock()
            .await
            .as_ref()
            .map(|r| r.server.local_addr())
    }

    // ── Handlers ─────────────────────────────────────────────────

    /// Register a handler. Returns `false` if this exact handler is
    /// already registered.
    pub fn add_event_handler(&self, handler: Arc<dyn EventHandler>) -> bool {
        let key = handler_key(&handler);
        self.inner.fanout.handlers.insert(key, handler).is_none()
    }

    /// Unregister a handler. Returns `false` if it was not registered.
    pub fn remove_event_handler(&self, handler: &Arc<dyn EventHandler>) -> bool {
        self.inner
            .fanout
            .handlers
            .remove(&handler_key(handler))
            .is_some()
    }

    pub fn handler_count(&self) -> usize {
        self.inner.fanout.handlers.len()
    }

    /// (total, consecutive) protocol violations seen from the hub.
    pub fn protocol_violations(&self) -> (u64, u64) {
        let monitor = &self.inner.fanout.monitor;
        (monitor.total(), monitor.consecutive())
    }

    // ── Outbound calls ───────────────────────────────────────────

    /// A handle for outbound calls that does not keep the channel alive.
    pub fn remote(&self) -> Remote {
        Remote {
            client: Arc::clone(&self.inner.client),
            state: self.inner.state.subscribe(),
        }
    }

    pub async fn get_value(&self, address: &str, key: &str) -> Result<Value, CoreError> {
        self.remote().get_value(address, key).await
    }

    pub async fn set_value(&self, address: &str, key: &str, value: Value) -> Result<(), CoreError> {
        self.remote().set_value(address, key, value).await
    }

    pub async fn get_paramset(
        &self,
        address: &str,
        paramset_key: &str,
    ) -> Result<BTreeMap<String, Value>, CoreError> {
        self.remote().get_paramset(address, paramset_key).await
    }
}

// ── Remote ───────────────────────────────────────────────────────

/// Outbound-call handle held by devices.
///
/// Calls fail with [`CoreError::NotConnected`] while the channel is
/// disconnected.
#[derive(Clone)]
pub struct Remote {
    client: Arc<RpcClient>,
    state: watch::Receiver<ConnectionState>,
}

impl Remote {
    fn ensure_connected(&self) -> Result<(), CoreError> {
        if *self.state.borrow() == ConnectionState::Connected {
            Ok(())
        } else {
            Err(CoreError::NotConnected)
        }
    }

    pub async fn get_value(&self, address: &str, key: &str) -> Result<Value, CoreError> {
        self.ensure_connected()?;
        Ok(self.client.get_value(address, key).await?)
    }

    pub async fn set_value(&self, address: &str, key: &str, value: Value) -> Result<(), CoreError> {
        self.ensure_connected()?;
        debug!(address, key, value = %value, "setValue");
        Ok(self.client.set_value(address, key, value).await?)
    }

    pub async fn get_paramset(
        &self,
        address: &str,
        paramset_key: &str,
    ) -> Result<BTreeMap<String, Value>, CoreError> {
        self.ensure_connected()?;
        Ok(self.client.get_paramset(address, paramset_key).await?)
    }
}

// ── Fan-out ──────────────────────────────────────────────────────

struct Fanout {
    handlers: DashMap<usize, Arc<dyn EventHandler>>,
    monitor: ViolationMonitor,
    span: Span,
}

impl EventSink for Fanout {
    fn deliver(&self, event: EventNotification) {
        let _entered = self.span.enter();
        self.monitor.reset();

        let event = DeviceEvent {
            address: event.address,
            attribute: event.attribute,
            raw_value: event.value.to_string(),
        };

        // Snapshot so handlers can (un)register while we iterate.
        let handlers: Vec<Arc<dyn EventHandler>> = self
            .handlers
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        for handler in handlers {
            match catch_unwind(AssertUnwindSafe(|| handler.on_event(&event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(
                    error = %e,
                    address = %event.address,
                    attribute = %event.attribute,
                    "event handler failed"
                ),
                Err(_) => warn!(
                    address = %event.address,
                    attribute = %event.attribute,
                    "event handler panicked"
                ),
            }
        }
    }

    fn reject(&self, violation: &ProtocolViolation) {
        let _entered = self.span.enter();
        self.monitor.record(violation);
    }
}

// ── Helpers ──────────────────────────────────────────────────────

pub(crate) fn build_transport(config: &HubConfig) -> TransportConfig {
    TransportConfig {
        tls: tls_to_transport(&config.tls),
        timeout: config.timeout,
        connect_timeout: config.connect_timeout,
        credentials: config.credentials.as_ref().map(|c| BasicAuth {
            username: c.username.clone(),
            password: c.password.clone(),
        }),
    }
}

pub(crate) fn tls_to_transport(tls: &TlsVerification) -> TlsMode {
    match tls {
        TlsVerification::SystemDefaults => TlsMode::System,
        TlsVerification::CustomCa(path) => TlsMode::CustomCa(path.clone()),
        TlsVerification::DangerAcceptInvalid => TlsMode::DangerAcceptInvalid,
    }
}
