use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::net::IpAddr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::debug;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResolvConfDetails {
    pub nameservers: Vec<IpAddr>,
    pub search_domains: Vec<String>,
}

/// Source of the resolver configuration handed to the guest.
pub trait ResolverSource: Send + Sync {
    fn resolv_conf_details(&self) -> Result<ResolvConfDetails>;
}

/// Reads the resolver configuration of the pod the hook runs in.
#[derive(Clone, Debug)]
pub struct ResolvConfFile {
    path: PathBuf,
}

impl ResolvConfFile {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl ResolverSource for ResolvConfFile {
    fn resolv_conf_details(&self) -> Result<ResolvConfDetails> {
        let file = File::open(&self.path)
            .with_context(|| format!("unable to open {:?}", &self.path))?;
        parse_resolv_conf(file).with_context(|| format!("unable to read {:?}", &self.path))
    }
}

/// Parses `nameserver` and `search` lines. Only IPv4 nameservers are kept
/// and, as in the resolver itself, the last `search` line wins.
pub fn parse_resolv_conf<R: Read>(reader: R) -> Result<ResolvConfDetails> {
    let mut details = ResolvConfDetails::default();

    for line in BufReader::new(reader).lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        let mut fields = line.split_whitespace();
        match fields.next() {
            Some("nameserver") => match fields.next().map(str::parse::<IpAddr>) {
                Some(Ok(ip @ IpAddr::V4(_))) => details.nameservers.push(ip),
                Some(Ok(ip)) => debug!("Skipping non-IPv4 nameserver {}", ip),
                Some(Err(e)) => debug!("Skipping invalid nameserver line {:?}: {}", line, e),
                None => debug!("Skipping empty nameserver line"),
            },
            Some("search") => {
                details.search_domains = fields.map(String::from).collect();
            }
            _ => {}
        }
    }

    Ok(details)
}
