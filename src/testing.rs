use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Result, anyhow};
use ipnetwork::Ipv4Network;

use crate::link::{Link, LinkInspector, MacAddr, Route};
use crate::resolv::{ResolvConfDetails, ResolverSource};

#[derive(Clone, Debug, Default)]
pub(crate) struct FakeLink {
    pub(crate) link: Link,
    pub(crate) addresses: Vec<Ipv4Network>,
    pub(crate) routes: Vec<Route>,
    pub(crate) fail_routes: bool,
}

/// In-memory host links, counting every query made against them.
#[derive(Debug, Default)]
pub(crate) struct FakeLinks {
    links: HashMap<String, FakeLink>,
    queries: AtomicUsize,
}

impl FakeLinks {
    pub(crate) fn with(mut self, link: FakeLink) -> Self {
        self.links.insert(link.link.name.clone(), link);
        self
    }

    pub(crate) fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    fn get(&self, name: &str) -> Result<&FakeLink> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.links
            .get(name)
            .ok_or_else(|| anyhow!("Link not found: {}", name))
    }
}

impl LinkInspector for FakeLinks {
    fn link_by_name(&self, name: &str) -> Result<Link> {
        self.get(name).map(|l| l.link.clone())
    }

    fn addr_list(&self, link: &Link) -> Result<Vec<Ipv4Network>> {
        self.get(&link.name).map(|l| l.addresses.clone())
    }

    fn mac_details(&self, name: &str) -> Result<MacAddr> {
        self.get(name)?
            .link
            .mac
            .ok_or_else(|| anyhow!("no hardware address on link {}", name))
    }

    fn route_list(&self, link: &Link) -> Result<Vec<Route>> {
        let fake = self.get(&link.name)?;
        if fake.fail_routes {
            return Err(anyhow!("netlink receive error"));
        }
        Ok(fake.routes.clone())
    }
}

#[derive(Debug, Default)]
pub(crate) struct FakeResolver {
    pub(crate) details: Option<ResolvConfDetails>,
    queries: AtomicUsize,
}

impl FakeResolver {
    pub(crate) fn new(details: Option<ResolvConfDetails>) -> Self {
        Self {
            details,
            queries: AtomicUsize::new(0),
        }
    }

    pub(crate) fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

impl ResolverSource for FakeResolver {
    fn resolv_conf_details(&self) -> Result<ResolvConfDetails> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.details
            .clone()
            .ok_or_else(|| anyhow!("open /etc/resolv.conf: no such file or directory"))
    }
}

/// `eth0`-style link with one address, a connected route and a default
/// route through `.1` of the same subnet.
pub(crate) fn fake_link(name: &str, index: u32, address: &str) -> FakeLink {
    let address: Ipv4Network = address.parse().unwrap();
    let octets = address.network().octets();
    FakeLink {
        link: Link {
            name: name.into(),
            index,
            mtu: 1500,
            mac: Some([0xaa, 0xbb, 0xcc, 0xdd, 0xee, index as u8]),
        },
        addresses: vec![address],
        routes: vec![
            Route {
                destination: Some(Ipv4Network::new(address.network(), address.prefix()).unwrap()),
                source: Some(address.ip()),
                gateway: None,
            },
            Route {
                destination: None,
                source: None,
                gateway: Some(Ipv4Addr::new(octets[0], octets[1], octets[2], 1)),
            },
        ],
        fail_routes: false,
    }
}
