use std::net::Ipv4Addr;

pub const DEFAULT_INTERFACE: &str = "eth0";
pub const DEFAULT_TIMEOUT_SECONDS: i64 = 30;
pub const DEFAULT_FALLBACK_IP: Ipv4Addr = Ipv4Addr::new(192, 168, 10, 1);
pub const DEFAULT_SUBNET_PREFIX: u8 = 24;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

pub const ENV_PATH: &str = "/usr/local/bin:/usr/local/sbin:/usr/bin:/usr/sbin:/bin:/sbin";
pub const ENV_SETTINGS_FILE: &str = "LINK_FALLBACK_SETTINGS";

pub const FILE_SETTINGS: &str = "/etc/link-fallback/settings.env";
pub const FILE_STATUS: &str = "/run/link-fallback/status.json";

pub const KEY_INTERFACE: &str = "ETH0_INTERFACE";
pub const KEY_TIMEOUT: &str = "ETH0_TIMEOUT";
pub const KEY_FALLBACK_IP: &str = "ETH0_FALLBACK_IP";
pub const KEY_SUBNET: &str = "ETH0_SUBNET";
pub const KEY_FALLBACK_CIDR: &str = "ETH0_FALLBACK_CIDR";
pub const KEY_POLL_INTERVAL_MS: &str = "POLL_INTERVAL_MS";
pub const KEY_LINK_BACKEND: &str = "LINK_BACKEND";
pub const KEY_STATUS_FILE: &str = "STATUS_FILE";
pub const KEY_LOG_LEVEL: &str = "LOG_LEVEL";

// Linux IFNAMSIZ includes the trailing NUL.
pub const MAX_INTERFACE_NAME_LEN: usize = 15;
