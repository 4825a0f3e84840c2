use std::net::{IpAddr, Ipv4Addr};

use anyhow::{Context, Result, anyhow};
use futures::TryStreamExt;
use ipnetwork::Ipv4Network;
use log::debug;
use netlink_packet_route::AddressFamily;
use netlink_packet_route::address::{AddressAttribute, AddressMessage};
use netlink_packet_route::link::{LinkAttribute, LinkMessage};
use netlink_packet_route::route::{RouteAddress, RouteAttribute, RouteMessage};
use rtnetlink::{Handle as NlHandle, RouteMessageBuilder, new_connection};
use tokio::runtime::Handle as RtHandle;

const RT_TABLE_MAIN: u32 = 254;

pub type MacAddr = [u8; 6];

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Link {
    pub name: String,
    pub index: u32,
    pub mtu: u32,
    pub mac: Option<MacAddr>,
}

/// An IPv4 route as seen on a link. A route without destination is a
/// default route.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Route {
    pub destination: Option<Ipv4Network>,
    pub source: Option<Ipv4Addr>,
    pub gateway: Option<Ipv4Addr>,
}

impl Route {
    pub fn is_empty(&self) -> bool {
        self.destination.is_none() && self.source.is_none() && self.gateway.is_none()
    }
}

/// Read-only view of the host network links. Only the IPv4 family is
/// queried.
pub trait LinkInspector: Send + Sync {
    fn link_by_name(&self, name: &str) -> Result<Link>;
    fn addr_list(&self, link: &Link) -> Result<Vec<Ipv4Network>>;
    fn mac_details(&self, name: &str) -> Result<MacAddr>;
    fn route_list(&self, link: &Link) -> Result<Vec<Route>>;
}

pub(crate) struct NetlinkConnection {
    handle: NlHandle,
}

impl NetlinkConnection {
    pub(crate) fn new() -> Result<Self> {
        let rt = RtHandle::try_current().map_err(|_| anyhow!("tokio is not running"))?;
        let (connection, handle, _) =
            new_connection().map_err(|e| anyhow!("unable to create netlink socket: {}", e))?;
        rt.spawn(connection);
        Ok(Self { handle })
    }

    pub(crate) async fn get_link(&self, name: &str) -> Result<Link> {
        let mut links = self.handle.link().get().match_name(name.into()).execute();
        let link = links
            .try_next()
            .await
            .with_context(|| format!("failed to get a link for interface {}", name))?
            .ok_or_else(|| anyhow!("no link found for interface {}", name))?;
        Ok(extract_link(link))
    }

    pub(crate) async fn get_ipv4_addresses(&self, ifindex: u32) -> Result<Vec<Ipv4Network>> {
        let mut addresses = Vec::new();
        let mut stream = self
            .handle
            .address()
            .get()
            .set_link_index_filter(ifindex)
            .execute();
        while let Some(msg) = stream.try_next().await? {
            if let Some(address) = extract_ipv4_address(&msg)? {
                addresses.push(address);
            }
        }
        Ok(addresses)
    }

    pub(crate) async fn get_ipv4_routes(&self, ifindex: u32) -> Result<Vec<Route>> {
        let route_msg = RouteMessageBuilder::<Ipv4Addr>::default().build();
        let mut stream = self.handle.route().get(route_msg).execute();
        let mut routes = Vec::new();
        while let Some(msg) = stream.try_next().await? {
            if let Some(route) = extract_route(&msg, ifindex)? {
                routes.push(route);
            }
        }
        Ok(routes)
    }
}

/// Blocking `LinkInspector` over rtnetlink. Calls must not be made from
/// within an async task; run them on the blocking pool.
pub struct NetlinkInspector {
    rt: RtHandle,
    nl: NetlinkConnection,
}

impl NetlinkInspector {
    pub fn new(rt: RtHandle) -> Result<Self> {
        let nl = {
            let _guard = rt.enter();
            NetlinkConnection::new().context("failed to create netlink connection")?
        };
        Ok(Self { rt, nl })
    }
}

impl LinkInspector for NetlinkInspector {
    fn link_by_name(&self, name: &str) -> Result<Link> {
        self.rt.block_on(self.nl.get_link(name))
    }

    fn addr_list(&self, link: &Link) -> Result<Vec<Ipv4Network>> {
        self.rt
            .block_on(self.nl.get_ipv4_addresses(link.index))
            .with_context(|| format!("failed to get an ip address for {}", link.name))
    }

    fn mac_details(&self, name: &str) -> Result<MacAddr> {
        let link = self.rt.block_on(self.nl.get_link(name))?;
        link.mac.ok_or_else(|| anyhow!("no hardware address on link {}", name))
    }

    fn route_list(&self, link: &Link) -> Result<Vec<Route>> {
        self.rt
            .block_on(self.nl.get_ipv4_routes(link.index))
            .with_context(|| format!("failed to get routes for {}", link.name))
    }
}

fn extract_link(link: LinkMessage) -> Link {
    let mut name: String = "".into();
    let mut mac = None;
    let mut mtu = 0;
    let index = link.header.index;

    for nla in &link.attributes {
        match nla {
            LinkAttribute::IfName(n) => name = n.clone(),
            LinkAttribute::Address(addr) if addr.len() == 6 => {
                let mut mac_arr = [0u8; 6];
                mac_arr.copy_from_slice(&addr[..6]);
                mac = Some(mac_arr);
            }
            LinkAttribute::Mtu(m) => mtu = *m,
            _ => {}
        }
    }

    Link {
        name,
        index,
        mtu,
        mac,
    }
}

// The local address wins over the peer address on point-to-point links.
fn extract_ipv4_address(msg: &AddressMessage) -> Result<Option<Ipv4Network>> {
    if msg.header.family != AddressFamily::Inet {
        return Ok(None);
    }
    let mut address = None;
    for attr in &msg.attributes {
        match attr {
            AddressAttribute::Local(IpAddr::V4(v4)) => {
                address = Some(*v4);
                break;
            }
            AddressAttribute::Address(IpAddr::V4(v4)) => address = Some(*v4),
            _ => {}
        }
    }
    address
        .map(|a| {
            Ipv4Network::new(a, msg.header.prefix_len)
                .map_err(|e| anyhow!("invalid address {}/{}: {}", a, msg.header.prefix_len, e))
        })
        .transpose()
}

fn extract_route(msg: &RouteMessage, ifindex: u32) -> Result<Option<Route>> {
    let mut oif = None;
    let mut table = msg.header.table as u32;
    let mut destination = None;
    let mut route = Route::default();

    for attr in &msg.attributes {
        match attr {
            RouteAttribute::Oif(idx) => oif = Some(*idx),
            RouteAttribute::Table(t) => table = *t,
            RouteAttribute::Destination(RouteAddress::Inet(v4)) => destination = Some(*v4),
            RouteAttribute::PrefSource(RouteAddress::Inet(v4)) => route.source = Some(*v4),
            RouteAttribute::Gateway(RouteAddress::Inet(v4)) => route.gateway = Some(*v4),
            _ => {}
        }
    }

    if oif != Some(ifindex) || table != RT_TABLE_MAIN {
        return Ok(None);
    }

    if let Some(dst) = destination {
        let prefix = msg.header.destination_prefix_length;
        route.destination = Some(
            Ipv4Network::new(dst, prefix)
                .map_err(|e| anyhow!("invalid route destination {}/{}: {}", dst, prefix, e))?,
        );
    }
    debug!("Found route on link index {}: {:?}", ifindex, route);

    Ok(Some(route))
}

pub fn mac_to_string(mac: MacAddr) -> String {
    format!(
        "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
        mac[0], mac[1], mac[2], mac[3], mac[4], mac[5]
    )
}
