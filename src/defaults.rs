/// Compile-time constants for the localization engine.
///
/// Capacities and timeouts match the gateway firmware this tag is paired
/// with; changing the name or payload sizes breaks interop with deployed
/// gateways.

/// Maximum number of gateways tracked in one localization cycle.
pub const MAX_GATEWAYS: usize = 5;

/// Samples collected per gateway before its window counts as ready.
pub const REQUIRED_SAMPLE_COUNT: usize = 10;

/// Fixed width of an advertised device name ("IPGW_XXXX" / "IPAS_XXXX").
pub const DEVICE_NAME_LEN: usize = 9;

/// Fixed width of a room name, zero padded.
pub const ROOM_NAME_LEN: usize = 10;

/// Every gateway's device name starts with this prefix.
pub const GATEWAY_NAME_PREFIX: &[u8] = b"IPGW_";

/// Prefix of the tag's own device name.
pub const ASSET_NAME_PREFIX: &str = "IPAS_";

/// Bluetooth SIG company identifier carried in the position advertisement.
pub const COMPANY_ID: u16 = 0x0047;

/// Length of the gateway discovery phase.
pub const GATEWAY_FINDER_TIMEOUT_MS: u64 = 5_000;

/// Configuration mode resets the device after this much inactivity.
pub const CONFIG_MODE_TIMEOUT_MS: u64 = 120_000;

/// How long one position advertisement burst stays on air.
pub const ADVERTISER_TIMEOUT_MS: u64 = 3_000;

/// Lower bound on the reporting interval. Discovery alone takes
/// `GATEWAY_FINDER_TIMEOUT_MS`; sampling ten adverts per gateway at the
/// gateways' 100-160 ms advertising interval needs a few more seconds.
pub const MIN_REPORTING_INTERVAL_S: u16 = 10;

/// Reporting interval used until the host configures one.
pub const DEFAULT_REPORTING_INTERVAL_S: u16 = 30;

/// Network id used until the host configures one.
pub const DEFAULT_NETWORK_ID: u32 = 0;
