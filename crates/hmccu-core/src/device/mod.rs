// ── Device state bridge ──
//
// Dimmers and switches subscribe themselves to the channel at construction,
// cache the value of the one datapoint they track, and notify their own
// listeners when a matching event arrives.

mod dimmer;
mod listeners;
mod model;
mod switch;

use std::fmt;
use std::sync::Arc;

pub use dimmer::Dimmer;
pub use listeners::ListenerId;
pub use model::{ChannelSelector, DeviceKind, DeviceModel, DevicePlan, plan_devices};
pub use switch::Switch;

use crate::channel::Channel;
use crate::error::CoreError;
use crate::handler::EventHandler;

/// The hub's `ise_id` of a device channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(pub u32);

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Immutable identity of a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Channel name as configured on the hub.
    pub name: String,
    /// Serial of the physical device.
    pub serial_number: String,
    /// Hub-channel address events are matched against, e.g. `"ABC123:3"`.
    pub address: String,
    pub channel_id: ChannelId,
    pub device_type: String,
}

/// A device attached to a channel, tagged by capability.
#[derive(Clone)]
pub enum HubDevice {
    Dimmer(Arc<Dimmer>),
    Switch(Arc<Switch>),
}

impl HubDevice {
    /// Read the initial value and subscribe the device to `channel`.
    pub async fn attach(
        kind: DeviceKind,
        info: DeviceInfo,
        channel: &Channel,
    ) -> Result<Self, CoreError> {
        Ok(match kind {
            DeviceKind::Dimmer => Self::Dimmer(Dimmer::attach(info, channel).await?),
            DeviceKind::Switch => Self::Switch(Switch::attach(info, channel).await?),
        })
    }

    pub fn info(&self) -> &DeviceInfo {
        match self {
            Self::Dimmer(d) => d.info(),
            Self::Switch(s) => s.info(),
        }
    }

    pub fn kind(&self) -> DeviceKind {
        match self {
            Self::Dimmer(_) => DeviceKind::Dimmer,
            Self::Switch(_) => DeviceKind::Switch,
        }
    }

    pub fn as_dimmer(&self) -> Option<&Arc<Dimmer>> {
        match self {
            Self::Dimmer(d) => Some(d),
            Self::Switch(_) => None,
        }
    }

    pub fn as_switch(&self) -> Option<&Arc<Switch>> {
        match self {
            Self::Switch(s) => Some(s),
            Self::Dimmer(_) => None,
        }
    }

    /// The handler registered with the channel for this device.
    pub fn handler(&self) -> Arc<dyn EventHandler> {
        match self {
            Self::Dimmer(d) => Arc::clone(d) as Arc<dyn EventHandler>,
            Self::Switch(s) => Arc::clone(s) as Arc<dyn EventHandler>,
        }
    }
}

impl fmt::Debug for HubDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HubDevice")
            .field("kind", &self.kind())
            .field("name", &self.info().name)
            .field("address", &self.info().address)
            .finish()
    }
}
