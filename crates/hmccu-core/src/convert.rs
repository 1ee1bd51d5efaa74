// ── API-to-domain type conversions ──
//
// Bridges raw `hmccu_api` device-list entries into catalog records.

use hmccu_api::{ChannelEntry, DeviceListEntry};

use crate::catalog::{ChannelRecord, DeviceRecord};

impl From<DeviceListEntry> for DeviceRecord {
    fn from(entry: DeviceListEntry) -> Self {
        Self {
            name: entry.name,
            serial_number: entry.address,
            ise_id: entry.ise_id,
            device_type: entry.device_type,
            channels: entry.channels.into_iter().map(ChannelRecord::from).collect(),
        }
    }
}

impl From<ChannelEntry> for ChannelRecord {
    fn from(entry: ChannelEntry) -> Self {
        Self {
            name: entry.name,
            address: entry.address,
            ise_id: entry.ise_id,
            index: entry.index,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_address_becomes_serial_number() {
        let record = DeviceRecord::from(DeviceListEntry {
            name: "Kitchen dimmer".into(),
            address: "LEQ0000001".into(),
            ise_id: 1200,
            device_type: "HMW-LC-Dim1L-DR".into(),
            channels: vec![ChannelEntry {
                name: "Kitchen".into(),
                address: "LEQ0000001:3".into(),
                ise_id: 1204,
                index: 3,
            }],
        });

        assert_eq!(record.serial_number, "LEQ0000001");
        assert_eq!(record.channels[0].ise_id, 1204);
        assert_eq!(record.channels[0].index, 3);
    }
}
