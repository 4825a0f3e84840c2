use base64::prelude::*;
use log::debug;

use crate::constants::{CLOUD_CONFIG_DEFAULT, CLOUD_CONFIG_HEADER, MARKER_MANAGE_RESOLV_CONF};
use crate::error::{Error, Result};
use crate::vmi::CloudInitNoCloudSource;

/// Literal user data wins over the base64 field. A source without any user
/// data gets a bare `#cloud-config` document so it can be augmented.
pub fn decode_user_data(source: &CloudInitNoCloudSource) -> Result<Vec<u8>> {
    let user_data = if !source.user_data.is_empty() {
        debug!("Found UserData");
        source.user_data.as_bytes().to_vec()
    } else if !source.user_data_base64.is_empty() {
        debug!("Found UserDataBase64");
        BASE64_STANDARD
            .decode(&source.user_data_base64)
            .map_err(|e| Error::UserData(e.to_string()))?
    } else {
        Vec::new()
    };

    if user_data.is_empty() {
        debug!("No userData found: adding {} header", CLOUD_CONFIG_HEADER);
        return Ok(CLOUD_CONFIG_DEFAULT.as_bytes().to_vec());
    }
    Ok(user_data)
}

fn is_cloud_config(user_data: &[u8]) -> bool {
    user_data.starts_with(CLOUD_CONFIG_HEADER.as_bytes())
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

/// Appends the resolver block unless the user data is not a cloud-config
/// document or already manages the resolver itself.
pub fn append_resolv_data(mut user_data: Vec<u8>, resolv_data: &[u8]) -> Vec<u8> {
    if resolv_data.is_empty() {
        return user_data;
    }
    debug!("Attempting to append resolvData to userData");
    if !is_cloud_config(&user_data) {
        debug!(
            "Skipping append for resolvData: {} header not in userData",
            CLOUD_CONFIG_HEADER
        );
        return user_data;
    }
    if contains(&user_data, MARKER_MANAGE_RESOLV_CONF.as_bytes()) {
        debug!("Skipping append: manage_resolv_conf found in userData");
        return user_data;
    }
    debug!("Appending resolv configuration to userData");
    user_data.push(b'\n');
    user_data.extend_from_slice(resolv_data);
    user_data
}

pub fn hosts_bootcmd(hosts_ip_address: &str, hostname: &str) -> String {
    format!(
        "bootcmd:\n  - cloud-init-per instance etcHosts sh -c \"echo {} {} >> /etc/hosts\"\n",
        hosts_ip_address, hostname
    )
}

/// Appends a boot command mapping the hostname in the guest `/etc/hosts`.
pub fn append_hosts_bootcmd(mut user_data: Vec<u8>, hosts_ip_address: &str, hostname: &str) -> Vec<u8> {
    if hosts_ip_address.is_empty() {
        return user_data;
    }
    debug!("Attempting to append bootcmd for /etc/hosts to userData");
    if !is_cloud_config(&user_data) {
        debug!(
            "Skipping append for bootcmd: {} header not in userData",
            CLOUD_CONFIG_HEADER
        );
        return user_data;
    }
    debug!("Appending bootcmd for /etc/hosts to userData");
    user_data.extend_from_slice(hosts_bootcmd(hosts_ip_address, hostname).as_bytes());
    user_data
}

pub fn merge_user_data(
    user_data: Vec<u8>,
    resolv_data: &[u8],
    hostname: &str,
    hosts_ip_address: Option<&str>,
) -> Vec<u8> {
    let user_data = append_resolv_data(user_data, resolv_data);
    append_hosts_bootcmd(user_data, hosts_ip_address.unwrap_or_default(), hostname)
}
