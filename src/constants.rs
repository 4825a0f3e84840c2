pub const DIR_HOOK_SOCKETS: &str = "/var/run/kubevirt-hooks";
pub const FILE_HOOK_SOCKET: &str = "sriov-discovery.sock";
pub const FILE_ETC_RESOLV_CONF: &str = "/etc/resolv.conf";

pub const HOOK_NAME: &str = "cloudinit";
pub const HOOK_VERSION_V1ALPHA2: &str = "v1alpha2";
pub const HOOK_POINT_PRE_CLOUD_INIT_ISO: &str = "preCloudInitIso";

pub const CLOUD_CONFIG_HEADER: &str = "#cloud-config";
pub const CLOUD_CONFIG_DEFAULT: &str = "#cloud-config\n";
pub const MARKER_MANAGE_RESOLV_CONF: &str = "manage_resolv_conf:";

pub const LINK_PREFIX_DEFAULT: &str = "eth";
pub const LINK_PREFIX_MULTUS: &str = "net";

pub const NETWORK_CONFIG_VERSION: u8 = 1;
