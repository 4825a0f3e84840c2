//! Discovery of SR-IOV interfaces attached to a VMI.
//!
//! Bridge and masquerade interfaces are configured inside the guest by a DHCP
//! server bound to the bridge in the compute container. SR-IOV virtual
//! functions are passed straight through, so there is nothing in the
//! container to bind a DHCP server to; their live state is read from the
//! host links instead and turned into a cloud-init network config.

use std::collections::HashMap;

use ipnetwork::Ipv4Network;
use log::{debug, error, info};

use crate::constants::{LINK_PREFIX_DEFAULT, LINK_PREFIX_MULTUS};
use crate::error::{Error, Result};
use crate::link::{LinkInspector, MacAddr, Route};
use crate::netconf::{ManageResolv, NetworkConfig};
use crate::resolv::ResolverSource;
use crate::vmi::{Attachment, InterfaceKind, Network, VirtualMachineInstance};

#[derive(Clone, Debug, PartialEq)]
pub struct SriovInterface {
    pub link_name: String,
    pub network: Network,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct SriovMatch {
    pub interfaces: Vec<SriovInterface>,
    /// Set when a bridge or masquerade interface will configure the guest
    /// resolver over DHCP.
    pub has_dhcp_interface: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct InterfaceState {
    pub name: String,
    pub mac: MacAddr,
    pub mtu: u32,
    pub address: Option<Ipv4Network>,
    pub routes: Vec<Route>,
}

/// The two YAML documents produced for a VMI. `resolv_data` is empty when
/// the guest resolver is left alone.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NetworkData {
    pub network_data: Vec<u8>,
    pub resolv_data: Vec<u8>,
}

/// Assigns each CNI network the index of the pod interface it is plugged
/// into. The default multus network is `eth0`, other multus networks are
/// `net1`, `net2`, ... in declaration order and genie networks take the
/// number of networks indexed so far.
pub fn network_indices(networks: &[Network]) -> HashMap<String, u32> {
    let mut indices = HashMap::new();
    let mut multus_index = 1;

    for network in networks {
        match network.attachment() {
            Attachment::MultusDefault => {
                indices.insert(network.name.clone(), 0);
            }
            Attachment::Multus => {
                indices.insert(network.name.clone(), multus_index);
                multus_index += 1;
            }
            Attachment::Genie => {
                let index = indices.len() as u32;
                indices.insert(network.name.clone(), index);
            }
            Attachment::Pod => {}
        }
    }
    indices
}

pub fn link_name(network: &Network, index: u32) -> String {
    let prefix = match network.attachment() {
        Attachment::Multus => LINK_PREFIX_MULTUS,
        Attachment::MultusDefault | Attachment::Genie | Attachment::Pod => LINK_PREFIX_DEFAULT,
    };
    format!("{}{}", prefix, index)
}

pub fn match_sriov_interfaces(vmi: &VirtualMachineInstance) -> Result<SriovMatch> {
    let networks: HashMap<&str, &Network> = vmi
        .spec
        .networks
        .iter()
        .map(|n| (n.name.as_str(), n))
        .collect();
    let indices = network_indices(&vmi.spec.networks);
    let mut sriov_match = SriovMatch::default();

    for iface in &vmi.spec.domain.devices.interfaces {
        let network = networks
            .get(iface.name.as_str())
            .ok_or_else(|| Error::NetworkNotFound(iface.name.clone()))?;

        if iface.is_dhcp_managed() {
            sriov_match.has_dhcp_interface = true;
        }

        if iface.kind() != InterfaceKind::Sriov {
            continue;
        }
        match indices.get(iface.name.as_str()) {
            Some(index) => sriov_match.interfaces.push(SriovInterface {
                link_name: link_name(network, *index),
                network: (*network).clone(),
            }),
            None => debug!(
                "Skipping SR-IOV interface {}: network is not a CNI network",
                iface.name
            ),
        }
    }

    if sriov_match.interfaces.is_empty() {
        return Err(Error::NoSriovInterfaces);
    }
    Ok(sriov_match)
}

pub fn extract_interface_state(
    inspector: &dyn LinkInspector,
    link_name: &str,
) -> Result<InterfaceState> {
    debug!("Starting discovery for: {}", link_name);

    let link = inspector
        .link_by_name(link_name)
        .map_err(|e| Error::link_query(link_name, e))?;
    let addresses = inspector
        .addr_list(&link)
        .map_err(|e| Error::link_query(link_name, e))?;
    let mac = match link.mac {
        Some(mac) => mac,
        None => inspector
            .mac_details(link_name)
            .map_err(|e| Error::link_query(link_name, e))?,
    };
    let routes = inspector
        .route_list(&link)
        .map_err(|e| Error::link_query(link_name, e))?;

    Ok(InterfaceState {
        name: link_name.into(),
        mac,
        mtu: link.mtu,
        address: addresses.first().copied(),
        routes,
    })
}

/// Returns `None` when a DHCP interface takes care of the guest resolver.
pub fn discover_resolver(
    resolver: &dyn ResolverSource,
    has_dhcp_interface: bool,
) -> Result<Option<ManageResolv>> {
    if has_dhcp_interface {
        debug!("Found DHCP interface: skipping resolv discovery");
        return Ok(None);
    }
    let details = resolver
        .resolv_conf_details()
        .map_err(|e| Error::ResolverQuery(format!("{:#}", e)))?;
    Ok(Some(ManageResolv::from_details(details)))
}

pub fn discover_network_data(
    vmi: &VirtualMachineInstance,
    inspector: &dyn LinkInspector,
    resolver: &dyn ResolverSource,
) -> Result<NetworkData> {
    let sriov_match = match_sriov_interfaces(vmi)?;
    info!(
        "Found {} SR-IOV interfaces: {:?}",
        sriov_match.interfaces.len(),
        sriov_match
            .interfaces
            .iter()
            .map(|i| i.link_name.as_str())
            .collect::<Vec<_>>()
    );

    let mut states = Vec::with_capacity(sriov_match.interfaces.len());
    for iface in &sriov_match.interfaces {
        let state = extract_interface_state(inspector, &iface.link_name).inspect_err(|e| {
            error!("{}", e);
        })?;
        states.push(state);
    }

    let network_data = NetworkConfig::from_interfaces(&states).to_yaml()?;
    let resolv_data = match discover_resolver(resolver, sriov_match.has_dhcp_interface)? {
        Some(manage_resolv) => manage_resolv.to_yaml()?,
        None => Vec::new(),
    };

    Ok(NetworkData {
        network_data,
        resolv_data,
    })
}
