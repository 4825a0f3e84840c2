use std::sync::Arc;

use base64::prelude::*;
use log::{error, info, warn};
use serde::{Deserialize, Serialize};

use crate::constants::{HOOK_NAME, HOOK_POINT_PRE_CLOUD_INIT_ISO, HOOK_VERSION_V1ALPHA2};
use crate::discovery::discover_network_data;
use crate::error::Result;
use crate::link::LinkInspector;
use crate::resolv::ResolverSource;
use crate::userdata::{decode_user_data, merge_user_data};
use crate::vmi::{CloudInitNoCloudSource, VirtualMachineInstance};

/// Settings read once at startup and shared by every request.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct HookConfig {
    /// Address written next to the VM hostname in the guest `/etc/hosts`.
    pub hosts_ip_address: Option<String>,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HookPoint {
    pub name: String,
    pub priority: i32,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InfoResult {
    pub name: String,
    pub versions: Vec<String>,
    pub hook_points: Vec<HookPoint>,
}

pub struct Hooks {
    config: HookConfig,
    inspector: Arc<dyn LinkInspector>,
    resolver: Arc<dyn ResolverSource>,
}

impl Hooks {
    pub fn new(
        config: HookConfig,
        inspector: Arc<dyn LinkInspector>,
        resolver: Arc<dyn ResolverSource>,
    ) -> Self {
        Self {
            config,
            inspector,
            resolver,
        }
    }

    pub fn info(&self) -> InfoResult {
        info!("Hook's Info method has been called");
        InfoResult {
            name: HOOK_NAME.into(),
            versions: vec![HOOK_VERSION_V1ALPHA2.into()],
            hook_points: vec![HookPoint {
                name: HOOK_POINT_PRE_CLOUD_INIT_ISO.into(),
                priority: 0,
            }],
        }
    }

    /// Returns the cloud-init source with discovered network data and the
    /// augmented user data. A source that already carries network data is
    /// returned as given.
    pub fn pre_cloud_init_iso(&self, vmi: &[u8], cloud_init_data: &[u8]) -> Result<Vec<u8>> {
        info!("Hook's PreCloudInitIso callback method has been called");

        let mut source = CloudInitNoCloudSource::from_json(cloud_init_data)?;
        let vmi = VirtualMachineInstance::from_json(vmi)?;

        if source.has_network_data() {
            warn!("Skipping SR-IOV network discovery: cloud-init networkData is already defined");
            return Ok(cloud_init_data.to_vec());
        }

        let network_data =
            discover_network_data(&vmi, self.inspector.as_ref(), self.resolver.as_ref())
                .inspect_err(|e| {
                    if !e.is_no_sriov_interfaces() {
                        error!("Network data discovery failed: {}", e);
                    }
                })?;

        let user_data = decode_user_data(&source)?;
        let user_data = merge_user_data(
            user_data,
            &network_data.resolv_data,
            &vmi.spec.hostname,
            self.config.hosts_ip_address.as_deref(),
        );

        source.user_data_base64 = BASE64_STANDARD.encode(&user_data);
        source.network_data_base64 = BASE64_STANDARD.encode(&network_data.network_data);
        source.user_data.clear();

        source.to_json()
    }

    pub fn on_define_domain(&self, domain_xml: &[u8]) -> Vec<u8> {
        warn!("Hook's OnDefineDomain callback method has been called which should never happen");
        domain_xml.to_vec()
    }
}

#[cfg(test)]
mod test {
    use std::net::{IpAddr, Ipv4Addr};

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::error::Error;
    use crate::resolv::ResolvConfDetails;
    use crate::testing::{FakeLinks, FakeResolver, fake_link};

    const VMI_SRIOV: &str = r#"{
        "spec": {
            "hostname": "testvmi",
            "domain": {"devices": {"interfaces": [{"name": "sriov", "sriov": {}}]}},
            "networks": [
                {"name": "sriov", "multus": {"networkName": "sriov-net", "default": true}}
            ]
        }
    }"#;

    const VMI_BRIDGE: &str = r#"{
        "spec": {
            "hostname": "testvmi",
            "domain": {"devices": {"interfaces": [{"name": "default", "bridge": {}}]}},
            "networks": [{"name": "default", "pod": {}}]
        }
    }"#;

    fn resolver_details() -> ResolvConfDetails {
        ResolvConfDetails {
            nameservers: vec![IpAddr::V4(Ipv4Addr::new(8, 8, 8, 8))],
            search_domains: vec!["example.com".into()],
        }
    }

    fn hooks(hosts_ip_address: Option<&str>, links: FakeLinks, resolver: FakeResolver) -> Hooks {
        Hooks::new(
            HookConfig {
                hosts_ip_address: hosts_ip_address.map(String::from),
            },
            Arc::new(links),
            Arc::new(resolver),
        )
    }

    fn eth0() -> FakeLinks {
        let mut link = fake_link("eth0", 2, "10.0.0.5/24");
        link.link.mac = Some([0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff]);
        FakeLinks::default().with(link)
    }

    fn decode(value: &str) -> String {
        String::from_utf8(BASE64_STANDARD.decode(value).unwrap()).unwrap()
    }

    #[test]
    fn test_info() {
        let hooks = hooks(None, FakeLinks::default(), FakeResolver::new(None));
        let info = hooks.info();
        assert_eq!(
            InfoResult {
                name: "cloudinit".into(),
                versions: vec!["v1alpha2".into()],
                hook_points: vec![HookPoint {
                    name: "preCloudInitIso".into(),
                    priority: 0,
                }],
            },
            info
        );
    }

    #[test]
    fn test_pre_cloud_init_iso() {
        let hooks = hooks(
            Some("10.0.0.5"),
            eth0(),
            FakeResolver::new(Some(resolver_details())),
        );
        let cloud_init_data = br##"{"userData": "#cloud-config\n"}"##;

        let output = hooks
            .pre_cloud_init_iso(VMI_SRIOV.as_bytes(), cloud_init_data)
            .unwrap();
        let source = CloudInitNoCloudSource::from_json(&output).unwrap();

        assert_eq!("", source.user_data);

        assert_eq!(
            concat!(
                "version: 1\n",
                "config:\n",
                "  - type: physical\n",
                "    name: eth0\n",
                "    mac_address: \"aa:bb:cc:dd:ee:ff\"\n",
                "    mtu: 1500\n",
                "    subnets:\n",
                "      - type: static\n",
                "        address: 10.0.0.5/24\n",
                "        gateway: 10.0.0.1\n",
            ),
            decode(&source.network_data_base64)
        );
        assert_eq!(
            concat!(
                "#cloud-config\n",
                "\n",
                "manage_resolv_conf: true\n",
                "resolv_conf:\n",
                "  nameservers:\n",
                "    - 8.8.8.8\n",
                "  searchdomains:\n",
                "    - example.com\n",
                "bootcmd:\n",
                "  - cloud-init-per instance etcHosts sh -c \"echo 10.0.0.5 testvmi >> /etc/hosts\"\n",
            ),
            decode(&source.user_data_base64)
        );
    }

    #[test]
    fn test_pre_cloud_init_iso_resolver_already_managed() {
        let hooks = hooks(None, eth0(), FakeResolver::new(Some(resolver_details())));
        let user_data = "#cloud-config\nmanage_resolv_conf: false\n";
        let cloud_init_data = serde_json::json!({ "userData": user_data }).to_string();

        let output = hooks
            .pre_cloud_init_iso(VMI_SRIOV.as_bytes(), cloud_init_data.as_bytes())
            .unwrap();
        let source = CloudInitNoCloudSource::from_json(&output).unwrap();
        assert_eq!(user_data, decode(&source.user_data_base64));
    }

    #[test]
    fn test_pre_cloud_init_iso_keeps_extra_fields() {
        let hooks = hooks(None, eth0(), FakeResolver::new(Some(resolver_details())));
        let cloud_init_data = br#"{"userDataBase64": "", "someFutureField": {"a": 1}}"#;

        let output = hooks
            .pre_cloud_init_iso(VMI_SRIOV.as_bytes(), cloud_init_data)
            .unwrap();
        let value: serde_json::Value = serde_json::from_slice(&output).unwrap();

        assert_eq!(serde_json::json!({"a": 1}), value["someFutureField"]);
        assert!(decode(value["userDataBase64"].as_str().unwrap()).starts_with("#cloud-config\n"));
    }

    #[test]
    fn test_pre_cloud_init_iso_network_data_defined() {
        let links = eth0();
        let hooks = hooks(None, links, FakeResolver::new(Some(resolver_details())));
        let inputs: [&[u8]; 3] = [
            br#"{"networkData": "version: 1\n"}"#,
            br#"{"networkDataBase64": "dmVyc2lvbjogMQo="}"#,
            br#"{"networkDataSecretRef": {"name": "netdata"}}"#,
        ];
        for input in inputs {
            let output = hooks.pre_cloud_init_iso(VMI_SRIOV.as_bytes(), input).unwrap();
            assert_eq!(input.to_vec(), output);
        }
    }

    #[test]
    fn test_pre_cloud_init_iso_no_sriov() {
        let hooks = hooks(None, eth0(), FakeResolver::new(Some(resolver_details())));
        let err = hooks
            .pre_cloud_init_iso(VMI_BRIDGE.as_bytes(), b"{}")
            .unwrap_err();
        assert!(err.is_no_sriov_interfaces());
    }

    #[test]
    fn test_pre_cloud_init_iso_malformed() {
        let hooks = hooks(None, eth0(), FakeResolver::new(Some(resolver_details())));

        let err = hooks.pre_cloud_init_iso(b"{not json", b"{}").unwrap_err();
        assert!(err.is_malformed_input());

        let err = hooks
            .pre_cloud_init_iso(VMI_SRIOV.as_bytes(), b"[]")
            .unwrap_err();
        assert!(err.is_malformed_input());
    }

    #[test]
    fn test_pre_cloud_init_iso_bad_user_data() {
        let hooks = hooks(None, eth0(), FakeResolver::new(Some(resolver_details())));
        let err = hooks
            .pre_cloud_init_iso(VMI_SRIOV.as_bytes(), br#"{"userDataBase64": "%%%"}"#)
            .unwrap_err();
        assert!(matches!(err, Error::UserData(_)));
    }

    #[test]
    fn test_pre_cloud_init_iso_link_missing() {
        let hooks = hooks(
            None,
            FakeLinks::default(),
            FakeResolver::new(Some(resolver_details())),
        );
        let err = hooks
            .pre_cloud_init_iso(VMI_SRIOV.as_bytes(), b"{}")
            .unwrap_err();
        assert!(matches!(err, Error::LinkQuery { ref link, .. } if link == "eth0"));
    }

    #[test]
    fn test_on_define_domain() {
        let hooks = hooks(None, FakeLinks::default(), FakeResolver::new(None));
        let xml = b"<domain type='kvm'><name>testvmi</name></domain>";
        assert_eq!(xml.to_vec(), hooks.on_define_domain(xml));
    }
}
