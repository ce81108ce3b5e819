use std::fmt;

/// The entity types the ingestion pipeline can target, keyed the way the
/// transform maps name them (`dcim.device` etc). Using an enum instead of
/// string dispatch keeps the supported set checked at compile time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityKind {
    Manufacturer,
    DeviceRole,
    DeviceType,
    Site,
    Location,
    Device,
    Interface,
}

impl EntityKind {
    /// Sync order for one ingestion run. A device cannot be created before
    /// its device type and role; an interface not before its device. Sites
    /// are resolved, never synced, so they do not appear here.
    pub const NQE_SEQUENCE: [EntityKind; 6] = [
        EntityKind::Manufacturer,
        EntityKind::DeviceRole,
        EntityKind::DeviceType,
        EntityKind::Location,
        EntityKind::Device,
        EntityKind::Interface,
    ];

    #[must_use]
    pub fn model_key(self) -> &'static str {
        match self {
            Self::Manufacturer => "dcim.manufacturer",
            Self::DeviceRole => "dcim.devicerole",
            Self::DeviceType => "dcim.devicetype",
            Self::Site => "dcim.site",
            Self::Location => "dcim.location",
            Self::Device => "dcim.device",
            Self::Interface => "dcim.interface",
        }
    }

    /// Key used in sync parameters to enable or disable the type.
    #[must_use]
    pub fn short_name(self) -> &'static str {
        match self {
            Self::Manufacturer => "manufacturer",
            Self::DeviceRole => "devicerole",
            Self::DeviceType => "devicetype",
            Self::Site => "site",
            Self::Location => "location",
            Self::Device => "device",
            Self::Interface => "interface",
        }
    }

    #[must_use]
    pub fn parse(key: &str) -> Option<Self> {
        let short = key.strip_prefix("dcim.").unwrap_or(key);
        match short {
            "manufacturer" => Some(Self::Manufacturer),
            "devicerole" => Some(Self::DeviceRole),
            "devicetype" => Some(Self::DeviceType),
            "site" => Some(Self::Site),
            "location" => Some(Self::Location),
            "device" => Some(Self::Device),
            "interface" => Some(Self::Interface),
            _ => None,
        }
    }

    /// Types that must be covered by transform maps (and enabled) before
    /// this one can be ingested.
    #[must_use]
    pub fn prerequisites(self) -> &'static [EntityKind] {
        match self {
            Self::DeviceType => &[EntityKind::Manufacturer],
            Self::Device => &[
                EntityKind::Manufacturer,
                EntityKind::DeviceRole,
                EntityKind::DeviceType,
            ],
            Self::Interface => &[
                EntityKind::Manufacturer,
                EntityKind::DeviceRole,
                EntityKind::DeviceType,
                EntityKind::Device,
            ],
            _ => &[],
        }
    }

    /// Target attributes with an integer column type; rendered strings
    /// aimed at these are coerced before classification.
    #[must_use]
    pub fn integer_fields(self) -> &'static [&'static str] {
        match self {
            Self::DeviceType => &["u_height"],
            Self::Interface => &["mtu", "speed_kbps"],
            _ => &[],
        }
    }

    /// Built-in NQE query for the type, used when the sync parameters do
    /// not override it.
    #[must_use]
    pub fn default_query_id(self) -> &'static str {
        match self {
            Self::Manufacturer => "FQ_device_manufacturers",
            Self::DeviceRole => "FQ_device_roles",
            Self::DeviceType => "FQ_device_models",
            Self::Site => "FQ_sites",
            Self::Location => "FQ_site_locations",
            Self::Device => "FQ_device_basic_info",
            Self::Interface => "FQ_device_interfaces",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.model_key())
    }
}

#[cfg(test)]
mod tests {
    use super::EntityKind;

    #[test]
    fn parse_accepts_both_key_forms() {
        assert_eq!(EntityKind::parse("dcim.device"), Some(EntityKind::Device));
        assert_eq!(EntityKind::parse("device"), Some(EntityKind::Device));
        assert_eq!(EntityKind::parse("dcim.vlan"), None);
    }

    #[test]
    fn sequence_respects_prerequisites() {
        let position = |kind: EntityKind| {
            EntityKind::NQE_SEQUENCE
                .iter()
                .position(|k| *k == kind)
                .expect("kind missing from sequence")
        };
        for kind in EntityKind::NQE_SEQUENCE {
            for prereq in kind.prerequisites() {
                assert!(
                    position(*prereq) < position(kind),
                    "{prereq} must come before {kind}"
                );
            }
        }
    }
}
