use std::sync::Arc;

use tokio::sync::watch;
use tracing::debug;

use hmccu_api::Value;

use super::DeviceInfo;
use super::listeners::{ListenerId, ListenerSet};
use crate::channel::{Channel, Remote};
use crate::error::CoreError;
use crate::handler::{DeviceEvent, EventHandler};

const DATAPOINT: &str = "STATE";

/// A switch (actuator) channel.
pub struct Switch {
    info: DeviceInfo,
    remote: Remote,
    state: watch::Sender<bool>,
    listeners: ListenerSet<bool>,
}

impl Switch {
    /// Subscribe to `channel`, then read the current state.
    pub async fn attach(info: DeviceInfo, channel: &Channel) -> Result<Arc<Self>, CoreError> {
        let switch = Arc::new(Self {
            info,
            remote: channel.remote(),
            state: watch::channel(false).0,
            listeners: ListenerSet::new(),
        });

        // Subscribed before the read: an event that lands meanwhile wins over it.
        let updates = switch.state.subscribe();
        let handler = Arc::clone(&switch) as Arc<dyn EventHandler>;
        channel.add_event_handler(Arc::clone(&handler));

        let on = match switch.read_initial().await {
            Ok(on) => on,
            Err(e) => {
                channel.remove_event_handler(&handler);
                return Err(e);
            }
        };
        if !updates.has_changed().unwrap_or(false) {
            switch.state.send_replace(on);
        }

        debug!(name = %switch.info.name, address = %switch.info.address, on = switch.is_on(), "switch attached");
        Ok(switch)
    }

    async fn read_initial(&self) -> Result<bool, CoreError> {
        let initial = self.remote.get_value(&self.info.address, DATAPOINT).await?;
        Ok(parse_state(&initial.to_string()))
    }

    pub fn info(&self) -> &DeviceInfo {
        &self.info
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn is_on(&self) -> bool {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.state.subscribe()
    }

    pub async fn set_on(&self, on: bool) -> Result<(), CoreError> {
        self.remote
            .set_value(&self.info.address, DATAPOINT, Value::Bool(on))
            .await
    }

    pub fn add_listener(&self, listener: impl Fn(bool) + Send + Sync + 'static) -> ListenerId {
        self.listeners.add(listener)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }
}

impl EventHandler for Switch {
    fn on_event(&self, event: &DeviceEvent) -> Result<(), CoreError> {
        if event.address != self.info.address || event.attribute != DATAPOINT {
            return Ok(());
        }
        let on = parse_state(&event.raw_value);
        self.state.send_replace(on);
        self.listeners.notify(on);
        Ok(())
    }
}

/// Anything other than `true` or `1` is off.
fn parse_state(raw: &str) -> bool {
    let raw = raw.trim();
    raw.eq_ignore_ascii_case("true") || raw == "1"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_literals() {
        assert!(parse_state("true"));
        assert!(parse_state("TRUE"));
        assert!(parse_state("1"));
        assert!(!parse_state("false"));
        assert!(!parse_state("0"));
        assert!(!parse_state(""));
    }
}
