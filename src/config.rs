/// Runtime configuration of the asset tag.
///
/// Changed by the host in configuration mode. Out-of-range writes are
/// clamped rather than rejected. Persistence is the platform's concern.
use core::fmt::Write;

use crate::defaults::{
    ASSET_NAME_PREFIX, DEFAULT_NETWORK_ID, DEFAULT_REPORTING_INTERVAL_S, MIN_REPORTING_INTERVAL_S,
};
use crate::scanner::{fixed_str, to_fixed, DeviceName};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssetConfig {
    device_name: DeviceName,
    network_id: u32,
    /// Seconds between localization cycles
    reporting_interval_s: u16,
}

impl AssetConfig {
    pub const fn new() -> Self {
        Self {
            device_name: *b"IPAS_0000",
            network_id: DEFAULT_NETWORK_ID,
            reporting_interval_s: DEFAULT_REPORTING_INTERVAL_S,
        }
    }

    pub fn network_id(&self) -> u32 {
        self.network_id
    }

    pub fn set_network_id(&mut self, network_id: u32) {
        self.network_id = network_id;
    }

    pub fn reporting_interval_s(&self) -> u16 {
        self.reporting_interval_s
    }

    pub fn reporting_interval_ms(&self) -> u64 {
        self.reporting_interval_s as u64 * 1000
    }

    /// Set the reporting interval, raising it to
    /// [`MIN_REPORTING_INTERVAL_S`] if too short. Returns the applied value.
    pub fn set_reporting_interval(&mut self, seconds: u16) -> u16 {
        let applied = seconds.max(MIN_REPORTING_INTERVAL_S);
        if applied != seconds {
            log::warn!(
                "Reporting interval {}s below minimum, using {}s",
                seconds,
                applied
            );
        }
        self.reporting_interval_s = applied;
        applied
    }

    pub fn device_name(&self) -> &str {
        fixed_str(&self.device_name)
    }

    pub fn device_name_bytes(&self) -> &DeviceName {
        &self.device_name
    }

    /// Derive the device name from the radio's identity address.
    pub fn set_identity_address(&mut self, addr: &[u8; 6]) {
        self.device_name = device_name_from_address(addr);
    }
}

impl Default for AssetConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// "IPAS_" followed by the two most significant address bytes in hex.
///
/// `addr` is little-endian, as the controller reports it.
pub fn device_name_from_address(addr: &[u8; 6]) -> DeviceName {
    let mut name = heapless::String::<16>::new();
    let _ = write!(name, "{}{:02X}{:02X}", ASSET_NAME_PREFIX, addr[5], addr[4]);
    to_fixed(&name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = AssetConfig::new();
        assert_eq!(config.network_id(), DEFAULT_NETWORK_ID);
        assert_eq!(config.reporting_interval_s(), DEFAULT_REPORTING_INTERVAL_S);
        assert_eq!(config.device_name(), "IPAS_0000");
    }

    #[test]
    fn short_interval_is_clamped() {
        let mut config = AssetConfig::new();
        assert_eq!(config.set_reporting_interval(2), MIN_REPORTING_INTERVAL_S);
        assert_eq!(config.reporting_interval_s(), MIN_REPORTING_INTERVAL_S);
        assert_eq!(config.reporting_interval_ms(), MIN_REPORTING_INTERVAL_S as u64 * 1000);
    }

    #[test]
    fn valid_interval_is_kept() {
        let mut config = AssetConfig::new();
        assert_eq!(config.set_reporting_interval(60), 60);
        assert_eq!(config.set_reporting_interval(MIN_REPORTING_INTERVAL_S), MIN_REPORTING_INTERVAL_S);
    }

    #[test]
    fn network_id_round_trips() {
        let mut config = AssetConfig::new();
        config.set_network_id(0x1234_5678);
        assert_eq!(config.network_id(), 0x1234_5678);
    }

    #[test]
    fn name_from_address_uses_msb_bytes() {
        let addr = [0xAB, 0xE4, 0x05, 0x1A, 0x8F, 0xFF];
        assert_eq!(fixed_str(&device_name_from_address(&addr)), "IPAS_FF8F");

        let mut config = AssetConfig::new();
        config.set_identity_address(&addr);
        assert_eq!(config.device_name(), "IPAS_FF8F");
    }
}
