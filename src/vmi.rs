use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct VirtualMachineInstance {
    #[serde(default)]
    pub spec: VmiSpec,
}

impl VirtualMachineInstance {
    pub fn from_json(value: &[u8]) -> Result<Self> {
        serde_json::from_slice(value).map_err(|e| Error::MalformedInput {
            what: "VMI spec",
            details: e.to_string(),
        })
    }
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VmiSpec {
    #[serde(default)]
    pub domain: DomainSpec,
    #[serde(default)]
    pub networks: Vec<Network>,
    #[serde(default)]
    pub hostname: String,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct DomainSpec {
    #[serde(default)]
    pub devices: Devices,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct Devices {
    #[serde(default)]
    pub interfaces: Vec<Interface>,
}

/// A domain interface. Exactly one binding method is expected to be set; the
/// name refers to the network backing it.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct Interface {
    pub name: String,
    pub bridge: Option<Empty>,
    pub masquerade: Option<Empty>,
    pub slirp: Option<Empty>,
    pub sriov: Option<Empty>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InterfaceKind {
    Sriov,
    Bridge,
    Masquerade,
    Other,
}

impl Interface {
    pub fn kind(&self) -> InterfaceKind {
        if self.sriov.is_some() {
            InterfaceKind::Sriov
        } else if self.bridge.is_some() {
            InterfaceKind::Bridge
        } else if self.masquerade.is_some() {
            InterfaceKind::Masquerade
        } else {
            InterfaceKind::Other
        }
    }

    /// Bridge and masquerade interfaces get their addressing and resolver
    /// configuration from the DHCP server in the compute container.
    pub fn is_dhcp_managed(&self) -> bool {
        matches!(self.kind(), InterfaceKind::Bridge | InterfaceKind::Masquerade)
    }
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct Network {
    pub name: String,
    pub pod: Option<PodNetwork>,
    pub multus: Option<MultusNetwork>,
    pub genie: Option<GenieNetwork>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Attachment {
    MultusDefault,
    Multus,
    Genie,
    Pod,
}

impl Network {
    pub fn attachment(&self) -> Attachment {
        match (&self.multus, &self.genie) {
            (Some(multus), _) if multus.default => Attachment::MultusDefault,
            (Some(_), _) => Attachment::Multus,
            (None, Some(_)) => Attachment::Genie,
            (None, None) => Attachment::Pod,
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PodNetwork {
    #[serde(rename = "vmNetworkCIDR", default)]
    pub vm_network_cidr: String,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MultusNetwork {
    #[serde(default)]
    pub network_name: String,
    #[serde(default)]
    pub default: bool,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GenieNetwork {
    #[serde(default)]
    pub network_name: String,
}

/// Marker for binding methods that carry no settings of interest.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct Empty {}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct LocalObjectReference {
    #[serde(default)]
    pub name: String,
}

/// The NoCloud datasource handed to the hook. Fields this crate does not
/// touch are carried through untouched.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CloudInitNoCloudSource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_ref: Option<LocalObjectReference>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub user_data_base64: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub user_data: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_data_secret_ref: Option<LocalObjectReference>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub network_data_base64: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub network_data: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CloudInitNoCloudSource {
    pub fn from_json(value: &[u8]) -> Result<Self> {
        serde_json::from_slice(value).map_err(|e| Error::MalformedInput {
            what: "CloudInitNoCloudSource",
            details: e.to_string(),
        })
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| Error::Serialize {
            what: "CloudInitNoCloudSource",
            details: e.to_string(),
        })
    }

    pub fn has_network_data(&self) -> bool {
        !self.network_data.is_empty()
            || !self.network_data_base64.is_empty()
            || self.network_data_secret_ref.is_some()
    }
}
