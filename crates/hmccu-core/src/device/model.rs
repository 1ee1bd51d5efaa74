// Device model table: which hub device types become which local devices,
// and from which of their channels.

use std::str::FromStr;

use crate::catalog::{ChannelRecord, DeviceRecord};

use super::{ChannelId, DeviceInfo};

/// The capability a local device offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum DeviceKind {
    Dimmer,
    Switch,
}

/// Which channels of a hub device carry the datapoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelSelector {
    Indices(&'static [u32]),
    /// Channels whose name starts with the prefix (wired IO modules).
    NamePrefix(&'static str),
}

impl ChannelSelector {
    fn matches(self, channel: &ChannelRecord) -> bool {
        match self {
            Self::Indices(indices) => indices.contains(&channel.index),
            Self::NamePrefix(prefix) => channel.name.starts_with(prefix),
        }
    }
}

/// Hub device types the driver knows, by their `device_type` string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::EnumString, strum::IntoStaticStr, strum::EnumIter)]
pub enum DeviceModel {
    #[strum(serialize = "HMW-LC-Dim1L-DR")]
    WiredDimmer,
    #[strum(serialize = "HM-LC-Dim1T-Pl")]
    PlugDimmerTrailing,
    #[strum(serialize = "HM-LC-Dim1L-Pl")]
    PlugDimmerLeading,
    #[strum(serialize = "HM-LC-Sw1-Pl")]
    PlugSwitch,
    #[strum(serialize = "HM-LC-Sw4-DR")]
    RailSwitch4,
    #[strum(serialize = "HMW-LC-Sw2-DR")]
    WiredSwitch2,
    #[strum(serialize = "HMW-IO-12-Sw7-DR")]
    WiredIoModule,
}

impl DeviceModel {
    pub fn lookup(device_type: &str) -> Option<Self> {
        Self::from_str(device_type).ok()
    }

    pub fn kind(self) -> DeviceKind {
        match self {
            Self::WiredDimmer | Self::PlugDimmerTrailing | Self::PlugDimmerLeading => {
                DeviceKind::Dimmer
            }
            Self::PlugSwitch | Self::RailSwitch4 | Self::WiredSwitch2 | Self::WiredIoModule => {
                DeviceKind::Switch
            }
        }
    }

    pub fn channels(self) -> ChannelSelector {
        match self {
            Self::WiredDimmer => ChannelSelector::Indices(&[3]),
            Self::PlugDimmerTrailing | Self::PlugDimmerLeading | Self::PlugSwitch => {
                ChannelSelector::Indices(&[1])
            }
            Self::RailSwitch4 => ChannelSelector::Indices(&[1, 2, 3, 4]),
            Self::WiredSwitch2 => ChannelSelector::Indices(&[3, 4]),
            Self::WiredIoModule => ChannelSelector::NamePrefix("O_"),
        }
    }

    pub fn device_type(self) -> &'static str {
        self.into()
    }
}

/// One local device to create from a catalog record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DevicePlan {
    pub kind: DeviceKind,
    pub info: DeviceInfo,
}

/// Classify a catalog record. Unknown device types yield nothing.
pub fn plan_devices(record: &DeviceRecord) -> Vec<DevicePlan> {
    let Some(model) = DeviceModel::lookup(&record.device_type) else {
        return Vec::new();
    };
    let selector = model.channels();

    record
        .channels
        .iter()
        .filter(|channel| selector.matches(channel))
        .map(|channel| DevicePlan {
            kind: model.kind(),
            info: DeviceInfo {
                name: channel.name.clone(),
                serial_number: record.serial_number.clone(),
                address: channel.address.clone(),
                channel_id: ChannelId(channel.ise_id),
                device_type: record.device_type.clone(),
            },
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use strum::IntoEnumIterator;

    use super::*;

    fn channel(name: &str, serial: &str, index: u32) -> ChannelRecord {
        ChannelRecord {
            name: name.into(),
            address: format!("{serial}:{index}"),
            ise_id: 1000 + index,
            index,
        }
    }

    fn record(device_type: &str, channels: Vec<ChannelRecord>) -> DeviceRecord {
        DeviceRecord {
            name: "device".into(),
            serial_number: "LEQ1".into(),
            ise_id: 1000,
            device_type: device_type.into(),
            channels,
        }
    }

    #[test]
    fn every_model_round_trips_its_type_string() {
        for model in DeviceModel::iter() {
            assert_eq!(DeviceModel::lookup(model.device_type()), Some(model));
        }
        assert_eq!(DeviceModel::lookup("HM-Sec-SC"), None);
    }

    #[test]
    fn wired_dimmer_uses_channel_three() {
        let plans = plan_devices(&record(
            "HMW-LC-Dim1L-DR",
            vec![channel("dimmer:0", "LEQ1", 0), channel("Kitchen", "LEQ1", 3)],
        ));

        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].kind, DeviceKind::Dimmer);
        assert_eq!(plans[0].info.name, "Kitchen");
        assert_eq!(plans[0].info.address, "LEQ1:3");
        assert_eq!(plans[0].info.serial_number, "LEQ1");
        assert_eq!(plans[0].info.channel_id, ChannelId(1003));
    }

    #[test]
    fn io_module_switches_are_selected_by_name() {
        let plans = plan_devices(&record(
            "HMW-IO-12-Sw7-DR",
            vec![
                channel("I_Button", "LEQ1", 1),
                channel("O_Hall", "LEQ1", 13),
                channel("O_Porch", "LEQ1", 14),
            ],
        ));

        let names: Vec<_> = plans.iter().map(|p| p.info.name.as_str()).collect();
        assert_eq!(names, vec!["O_Hall", "O_Porch"]);
        assert!(plans.iter().all(|p| p.kind == DeviceKind::Switch));
    }

    #[test]
    fn unknown_types_are_ignored() {
        assert!(plan_devices(&record("HM-Sec-SC", vec![channel("door", "LEQ1", 1)])).is_empty());
    }
}
