//! Cloud-init network config version 1 and the `manage_resolv_conf`
//! user-data fragment.
//!
//! Reference: https://cloudinit.readthedocs.io/en/latest/reference/network-config-format-v1.html

use std::net::Ipv4Addr;

use ipnetwork::Ipv4Network;
use log::debug;
use yaml_rust2::yaml::Hash as YamlHash;
use yaml_rust2::{Yaml, YamlEmitter};

use crate::constants::NETWORK_CONFIG_VERSION;
use crate::discovery::InterfaceState;
use crate::error::{Error, Result};
use crate::link::{Route, mac_to_string};
use crate::resolv::ResolvConfDetails;

#[derive(Clone, Debug, PartialEq)]
pub struct NetworkConfig {
    pub version: u8,
    pub config: Vec<NetworkInterface>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InterfaceType {
    Physical,
}

impl InterfaceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Physical => "physical",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct NetworkInterface {
    pub network_type: InterfaceType,
    pub name: String,
    pub mac_address: String,
    pub mtu: u32,
    pub subnets: Vec<Subnet>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubnetType {
    Manual,
    Static,
}

impl SubnetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Static => "static",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Subnet {
    pub subnet_type: SubnetType,
    pub address: Option<String>,
    pub gateway: Option<String>,
    pub routes: Vec<SubnetRoute>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SubnetRoute {
    pub network: String,
    pub netmask: String,
    pub gateway: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ManageResolv {
    pub manage_resolv_conf: bool,
    pub resolv_conf: ResolvConf,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResolvConf {
    pub nameservers: Vec<String>,
    pub searchdomains: Vec<String>,
}

/// Block mapping builder. Keys keep insertion order; empty strings, empty
/// lists and zero MTUs are left out the way cloud-init expects.
#[derive(Default)]
struct Mapping(YamlHash);

impl Mapping {
    fn value(mut self, key: &str, value: Yaml) -> Self {
        self.0.insert(Yaml::String(key.into()), value);
        self
    }

    fn string(self, key: &str, value: &str) -> Self {
        if value.is_empty() {
            return self;
        }
        self.value(key, Yaml::String(value.into()))
    }

    fn optional(self, key: &str, value: Option<&str>) -> Self {
        match value {
            Some(value) => self.string(key, value),
            None => self,
        }
    }

    fn list(self, key: &str, items: Vec<Yaml>) -> Self {
        if items.is_empty() {
            return self;
        }
        self.value(key, Yaml::Array(items))
    }

    fn build(self) -> Yaml {
        Yaml::Hash(self.0)
    }
}

fn strings(values: &[String]) -> Vec<Yaml> {
    values.iter().map(|v| Yaml::String(v.clone())).collect()
}

impl NetworkConfig {
    pub fn from_interfaces(interfaces: &[InterfaceState]) -> Self {
        Self {
            version: NETWORK_CONFIG_VERSION,
            config: interfaces.iter().map(convert_interface).collect(),
        }
    }

    pub fn to_node(&self) -> Yaml {
        Mapping::default()
            .value("version", Yaml::Integer(i64::from(self.version)))
            .value(
                "config",
                Yaml::Array(self.config.iter().map(NetworkInterface::to_node).collect()),
            )
            .build()
    }

    pub fn to_yaml(&self) -> Result<Vec<u8>> {
        to_yaml("network config", &self.to_node())
    }
}

impl NetworkInterface {
    fn to_node(&self) -> Yaml {
        let mut mapping = Mapping::default()
            .string("type", self.network_type.as_str())
            .string("name", &self.name)
            .string("mac_address", &self.mac_address);
        if self.mtu != 0 {
            mapping = mapping.value("mtu", Yaml::Integer(i64::from(self.mtu)));
        }
        mapping
            .list("subnets", self.subnets.iter().map(Subnet::to_node).collect())
            .build()
    }
}

impl Subnet {
    fn to_node(&self) -> Yaml {
        Mapping::default()
            .string("type", self.subnet_type.as_str())
            .optional("address", self.address.as_deref())
            .optional("gateway", self.gateway.as_deref())
            .list("routes", self.routes.iter().map(SubnetRoute::to_node).collect())
            .build()
    }
}

impl SubnetRoute {
    fn to_node(&self) -> Yaml {
        Mapping::default()
            .string("network", &self.network)
            .string("netmask", &self.netmask)
            .optional("gateway", self.gateway.as_deref())
            .build()
    }
}

impl ManageResolv {
    pub fn from_details(details: ResolvConfDetails) -> Self {
        Self {
            manage_resolv_conf: true,
            resolv_conf: ResolvConf {
                nameservers: details.nameservers.iter().map(|ip| ip.to_string()).collect(),
                searchdomains: details.search_domains,
            },
        }
    }

    pub fn to_node(&self) -> Yaml {
        let resolv_conf = Mapping::default()
            .list("nameservers", strings(&self.resolv_conf.nameservers))
            .list("searchdomains", strings(&self.resolv_conf.searchdomains))
            .build();
        Mapping::default()
            .value("manage_resolv_conf", Yaml::Boolean(self.manage_resolv_conf))
            .value("resolv_conf", resolv_conf)
            .build()
    }

    pub fn to_yaml(&self) -> Result<Vec<u8>> {
        to_yaml("resolv configuration", &self.to_node())
    }
}

/// Emits a top-level YAML mapping so it can be appended to another
/// document: no document start marker, always newline terminated.
fn to_yaml(what: &'static str, node: &Yaml) -> Result<Vec<u8>> {
    let mut yaml = String::new();
    YamlEmitter::new(&mut yaml)
        .dump(node)
        .map_err(|e| Error::Serialize {
            what,
            details: e.to_string(),
        })?;
    let body = yaml.strip_prefix("---").map(str::trim_start).unwrap_or(&yaml);
    let mut out = body.as_bytes().to_vec();
    if !out.ends_with(b"\n") {
        out.push(b'\n');
    }
    Ok(out)
}

fn convert_interface(state: &InterfaceState) -> NetworkInterface {
    let subnet = match state.address {
        None => Subnet {
            subnet_type: SubnetType::Manual,
            address: None,
            gateway: None,
            routes: Vec::new(),
        },
        Some(address) => {
            let (gateway, routes) = convert_routes(address, &state.routes);
            Subnet {
                subnet_type: SubnetType::Static,
                address: Some(address.to_string()),
                gateway: gateway.map(|gw| gw.to_string()),
                routes,
            }
        }
    };

    NetworkInterface {
        network_type: InterfaceType::Physical,
        name: state.name.clone(),
        mac_address: mac_to_string(state.mac),
        mtu: state.mtu,
        subnets: vec![subnet],
    }
}

// A default route becomes the subnet gateway. With several default routes
// the last one wins and the others are dropped.
fn convert_routes(
    address: Ipv4Network,
    routes: &[Route],
) -> (Option<Ipv4Addr>, Vec<SubnetRoute>) {
    let mut gateway = None;
    let mut subnet_routes = Vec::new();

    for route in routes {
        if route.is_empty() {
            continue;
        }
        if route.source == Some(address.ip()) {
            debug!("Skipping route sourced from {}: {:?}", address.ip(), route);
            continue;
        }
        match route.destination {
            None => gateway = route.gateway,
            Some(destination) => subnet_routes.push(SubnetRoute {
                network: destination.network().to_string(),
                netmask: destination.mask().to_string(),
                gateway: route.gateway.map(|gw| gw.to_string()),
            }),
        }
    }

    (gateway, subnet_routes)
}
