// ── Device catalog ──
//
// Where the CCU aggregate gets its device inventory from. The hub's
// XML-API add-on is the production source; `StaticCatalog` serves a
// fixed list.

use std::future::Future;

use hmccu_api::XmlApiClient;

use crate::error::CoreError;

/// A physical device as listed by the hub.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRecord {
    pub name: String,
    pub serial_number: String,
    pub ise_id: u32,
    pub device_type: String,
    pub channels: Vec<ChannelRecord>,
}

/// One channel of a listed device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelRecord {
    pub name: String,
    pub address: String,
    pub ise_id: u32,
    pub index: u32,
}

/// Source of the device inventory queried on connect.
pub trait DeviceCatalog: Send + Sync {
    fn devices(&self) -> impl Future<Output = Result<Vec<DeviceRecord>, CoreError>> + Send;
}

impl DeviceCatalog for XmlApiClient {
    async fn devices(&self) -> Result<Vec<DeviceRecord>, CoreError> {
        let entries = self.device_list().await?;
        Ok(entries.into_iter().map(DeviceRecord::from).collect())
    }
}

/// A fixed device list.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    records: Vec<DeviceRecord>,
}

impl StaticCatalog {
    pub fn new(records: Vec<DeviceRecord>) -> Self {
        Self { records }
    }
}

impl DeviceCatalog for StaticCatalog {
    async fn devices(&self) -> Result<Vec<DeviceRecord>, CoreError> {
        Ok(self.records.clone())
    }
}
