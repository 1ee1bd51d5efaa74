use std::sync::Arc;

use tokio::sync::watch;
use tracing::debug;

use hmccu_api::Value;

use super::DeviceInfo;
use super::listeners::{ListenerId, ListenerSet};
use crate::channel::{Channel, Remote};
use crate::error::CoreError;
use crate::handler::{DeviceEvent, EventHandler};

const DATAPOINT: &str = "LEVEL";

/// A dimmer channel. The cached level is a percentage, 0..=100.
pub struct Dimmer {
    info: DeviceInfo,
    remote: Remote,
    level: watch::Sender<u8>,
    listeners: ListenerSet<u8>,
}

impl Dimmer {
    /// Subscribe to `channel`, then read the current level.
    pub async fn attach(info: DeviceInfo, channel: &Channel) -> Result<Arc<Self>, CoreError> {
        let dimmer = Arc::new(Self {
            info,
            remote: channel.remote(),
            level: watch::channel(0).0,
            listeners: ListenerSet::new(),
        });

        // Subscribed before the read: an event that lands meanwhile wins over it.
        let updates = dimmer.level.subscribe();
        let handler = Arc::clone(&dimmer) as Arc<dyn EventHandler>;
        channel.add_event_handler(Arc::clone(&handler));

        let level = match dimmer.read_initial().await {
            Ok(level) => level,
            Err(e) => {
                channel.remove_event_handler(&handler);
                return Err(e);
            }
        };
        if !updates.has_changed().unwrap_or(false) {
            dimmer.level.send_replace(level);
        }

        debug!(name = %dimmer.info.name, address = %dimmer.info.address, level = dimmer.value(), "dimmer attached");
        Ok(dimmer)
    }

    async fn read_initial(&self) -> Result<u8, CoreError> {
        let initial = self.remote.get_value(&self.info.address, DATAPOINT).await?;
        parse_level(&initial.to_string())
    }

    pub fn info(&self) -> &DeviceInfo {
        &self.info
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    /// Last level reported by the hub.
    pub fn value(&self) -> u8 {
        *self.level.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<u8> {
        self.level.subscribe()
    }

    /// Ask the hub for a new level (clamped to 100). The cached value
    /// changes when the hub echoes the event.
    pub async fn set_value(&self, percent: u8) -> Result<(), CoreError> {
        let fraction = f64::from(percent.min(100)) / 100.0;
        self.remote
            .set_value(&self.info.address, DATAPOINT, Value::Double(fraction))
            .await
    }

    pub fn add_listener(&self, listener: impl Fn(u8) + Send + Sync + 'static) -> ListenerId {
        self.listeners.add(listener)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }
}

impl EventHandler for Dimmer {
    fn on_event(&self, event: &DeviceEvent) -> Result<(), CoreError> {
        if event.address != self.info.address || event.attribute != DATAPOINT {
            return Ok(());
        }
        let level = parse_level(&event.raw_value)?;
        self.level.send_replace(level);
        self.listeners.notify(level);
        Ok(())
    }
}

/// `"0.5"` → 50. Rounded, clamped to 0..=100.
fn parse_level(raw: &str) -> Result<u8, CoreError> {
    let fraction: f64 = raw
        .trim()
        .parse()
        .ok()
        .filter(|f: &f64| f.is_finite())
        .ok_or_else(|| CoreError::InvalidValue {
            attribute: DATAPOINT.into(),
            value: raw.into(),
        })?;

    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::as_conversions
    )]
    let percent = (fraction * 100.0).round().clamp(0.0, 100.0) as u8;
    Ok(percent)
}
