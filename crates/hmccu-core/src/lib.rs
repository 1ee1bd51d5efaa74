// hmccu-core: Channel/event subsystem and device model between hmccu-api and host applications.

pub mod catalog;
pub mod ccu;
pub mod channel;
pub mod config;
pub mod convert;
pub mod device;
pub mod error;
pub mod handler;
mod monitor;

// ── Primary re-exports ──────────────────────────────────────────────
pub use catalog::{ChannelRecord, DeviceCatalog, DeviceRecord, StaticCatalog};
pub use ccu::Ccu;
pub use channel::{Channel, ConnectionState, Remote};
pub use config::{HubAddress, HubConfig, HubCredentials, TlsVerification};
pub use device::{ChannelId, DeviceInfo, DeviceKind, Dimmer, HubDevice, ListenerId, Switch};
pub use error::CoreError;
pub use handler::{DeviceEvent, EventHandler};

pub use hmccu_api::Value;
