// ── CCU aggregate ──
//
// The facade host code talks to: connect/disconnect the channel, enumerate
// devices from the catalog on connect, and serve read-only device
// snapshots until the next disconnect.

use std::sync::Arc;

use arc_swap::ArcSwap;
use tokio::sync::{Mutex, watch};
use tracing::{Instrument, Span, info, info_span, warn};

use hmccu_api::XmlApiClient;

use crate::catalog::DeviceCatalog;
use crate::channel::{Channel, ConnectionState, build_transport};
use crate::config::HubConfig;
use crate::device::{Dimmer, HubDevice, Switch, plan_devices};
use crate::error::CoreError;
use crate::handler::EventHandler;

/// Connection to one CCU and the devices it exposes.
pub struct Ccu<C: DeviceCatalog = XmlApiClient> {
    channel: Channel,
    catalog: C,
    /// Serializes transitions; `true` while devices are enumerated.
    attached: Mutex<bool>,
    dimmers: ArcSwap<Vec<Arc<Dimmer>>>,
    switches: ArcSwap<Vec<Arc<Switch>>>,
    span: Span,
}

impl Ccu<XmlApiClient> {
    /// A CCU whose devices come from the hub's XML-API add-on.
    pub fn new(config: HubConfig) -> Result<Self, CoreError> {
        let span = info_span!("ccu", host = %config.address.host);
        Self::with_span(config, span)
    }

    /// As [`new`](Self::new), logging under `span`.
    pub fn with_span(config: HubConfig, span: Span) -> Result<Self, CoreError> {
        let catalog = XmlApiClient::new(
            config.xml_api_url()?,
            config.xml_api_token.clone(),
            &build_transport(&config),
        )?;
        let channel = Channel::with_span(config, span)?;
        Ok(Self::with_catalog(channel, catalog))
    }
}

impl<C: DeviceCatalog> Ccu<C> {
    /// A CCU over an existing channel and an arbitrary device source.
    pub fn with_catalog(channel: Channel, catalog: C) -> Self {
        let span = channel.span().clone();
        Self {
            channel,
            catalog,
            attached: Mutex::new(false),
            dimmers: ArcSwap::from_pointee(Vec::new()),
            switches: ArcSwap::from_pointee(Vec::new()),
            span,
        }
    }

    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    // ── Connection lifecycle ─────────────────────────────────────

    /// Connect the channel and enumerate devices. A no-op when connected.
    ///
    /// A channel that is already up (connected through [`channel`](Self::channel))
    /// is reused. Devices left over from a channel that went down are dropped
    /// and enumerated again.
    ///
    /// If the device query fails the channel is disconnected again. Devices
    /// whose initial read fails are skipped.
    pub async fn connect(&self) -> Result<(), CoreError> {
        self.connect_locked().instrument(self.span.clone()).await
    }

    async fn connect_locked(&self) -> Result<(), CoreError> {
        let mut attached = self.attached.lock().await;
        if *attached {
            if self.channel.is_connected() {
                warn!("CCU already connected");
                return Ok(());
            }
            warn!("channel went down underneath the CCU, enumerating again");
            self.detach_devices();
            *attached = false;
        }

        if !self.channel.is_connected() {
            self.channel.connect().await?;
        }

        let records = match self.catalog.devices().await {
            Ok(records) => records,
            Err(e) => {
                warn!(error = %e, "device query failed, rolling back connection");
                if let Err(rollback) = self.channel.disconnect().await {
                    warn!(error = %rollback, "rollback disconnect failed");
                }
                return Err(e);
            }
        };

        let mut dimmers = Vec::new();
        let mut switches = Vec::new();
        for plan in records.iter().flat_map(plan_devices) {
            let name = plan.info.name.clone();
            match HubDevice::attach(plan.kind, plan.info, &self.channel).await {
                Ok(device) => {
                    if let Some(dimmer) = device.as_dimmer() {
                        dimmers.push(Arc::clone(dimmer));
                    } else if let Some(switch) = device.as_switch() {
                        switches.push(Arc::clone(switch));
                    }
                }
                Err(e) => warn!(device = %name, error = %e, "skipping device, initial read failed"),
            }
        }

        info!(
            dimmers = dimmers.len(),
            switches = switches.len(),
            "CCU connected"
        );
        self.dimmers.store(Arc::new(dimmers));
        self.switches.store(Arc::new(switches));
        *attached = true;
        Ok(())
    }

    /// Disconnect the channel and drop all devices. A no-op when disconnected.
    ///
    /// Devices are dropped even when the channel was already disconnected
    /// directly, or when de-registration fails; that error is returned
    /// afterwards.
    pub async fn disconnect(&self) -> Result<(), CoreError> {
        self.disconnect_locked().instrument(self.span.clone()).await
    }

    async fn disconnect_locked(&self) -> Result<(), CoreError> {
        let mut attached = self.attached.lock().await;
        if !*attached && !self.channel.is_connected() {
            warn!("CCU already disconnected");
            return Ok(());
        }

        let result = if self.channel.is_connected() {
            self.channel.disconnect().await
        } else {
            Ok(())
        };

        self.detach_devices();
        *attached = false;
        info!("CCU disconnected");
        result
    }

    /// Unregister every device handler and empty both snapshots.
    fn detach_devices(&self) {
        for dimmer in self.dimmers.swap(Arc::new(Vec::new())).iter() {
            self.channel
                .remove_event_handler(&(Arc::clone(dimmer) as Arc<dyn EventHandler>));
        }
        for switch in self.switches.swap(Arc::new(Vec::new())).iter() {
            self.channel
                .remove_event_handler(&(Arc::clone(switch) as Arc<dyn EventHandler>));
        }
    }

    pub fn is_connected(&self) -> bool {
        self.channel.is_connected()
    }

    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.channel.connection_state()
    }

    // ── Device access ────────────────────────────────────────────

    /// Snapshot of all dimmers. Empty while disconnected.
    pub fn dimmers(&self) -> Arc<Vec<Arc<Dimmer>>> {
        self.dimmers.load_full()
    }

    /// Snapshot of all switches. Empty while disconnected.
    pub fn switches(&self) -> Arc<Vec<Arc<Switch>>> {
        self.switches.load_full()
    }

    pub fn dimmer(&self, name: &str) -> Option<Arc<Dimmer>> {
        self.dimmers.load().iter().find(|d| d.name() == name).cloned()
    }

    pub fn switch(&self, name: &str) -> Option<Arc<Switch>> {
        self.switches.load().iter().find(|s| s.name() == name).cloned()
    }
}
