/// BLE scan reports and gateway advertisement parsing.
///
/// Gateways broadcast a fixed-layout legacy advertisement. The fields this
/// engine consumes sit at fixed byte offsets into the raw AD payload:
///
/// ```text
///  0..3    flags AD structure
///  3..7    manufacturer AD header + company id
///  7..11   network id (u32, little-endian)
/// 11       room id
/// 13..23   room name (zero padded)
/// 23..     device name ("IPGW_XXXX"), cut short by the 31-byte PDU limit
/// ```
///
/// Parsing never allocates and is safe to call from the BLE runner.
use heapless::Vec;

use crate::defaults::{DEVICE_NAME_LEN, GATEWAY_NAME_PREFIX, ROOM_NAME_LEN};

/// Maximum legacy advertising payload length.
pub const MAX_ADV_LEN: usize = 31;

pub const NETWORK_ID_OFFSET: usize = 7;
pub const ROOM_ID_OFFSET: usize = 11;
pub const ROOM_NAME_OFFSET: usize = 13;
pub const DEVICE_NAME_OFFSET: usize = 23;

/// Shortest payload that carries every gateway field.
pub const MIN_GATEWAY_ADV_LEN: usize = ROOM_NAME_OFFSET + ROOM_NAME_LEN;

/// Fixed-width, zero-padded device name.
pub type DeviceName = [u8; DEVICE_NAME_LEN];

/// Fixed-width, zero-padded room name.
pub type RoomName = [u8; ROOM_NAME_LEN];

/// An advertisement report as delivered by the BLE stack.
#[derive(Debug, Clone)]
pub struct ScanReport {
    pub device_name: DeviceName,
    pub rssi: i8,
    pub data: Vec<u8, MAX_ADV_LEN>,
}

impl ScanReport {
    /// Copy a report out of the stack's buffer, resolving the advertised
    /// name. Returns `None` for payloads that exceed the legacy PDU size.
    pub fn new(rssi: i8, data: &[u8]) -> Option<Self> {
        Self::with_name(advertised_name(data), rssi, data)
    }

    pub fn with_name(device_name: DeviceName, rssi: i8, data: &[u8]) -> Option<Self> {
        let data = Vec::from_slice(data).ok()?;
        Some(Self {
            device_name,
            rssi,
            data,
        })
    }
}

/// Gateway identity read from one advertisement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GatewayAdvert {
    pub network_id: u32,
    pub room_id: u8,
    pub room_name: RoomName,
    pub device_name: DeviceName,
}

impl GatewayAdvert {
    /// Read the gateway fields from a raw advertising payload.
    ///
    /// Does not check the network id or the name prefix, see [`qualify`].
    pub fn parse(device_name: &DeviceName, data: &[u8]) -> Option<Self> {
        if data.len() > MAX_ADV_LEN || data.len() < MIN_GATEWAY_ADV_LEN {
            return None;
        }

        let network_id = u32::from_le_bytes(
            data[NETWORK_ID_OFFSET..NETWORK_ID_OFFSET + 4]
                .try_into()
                .ok()?,
        );

        let mut room_name = [0u8; ROOM_NAME_LEN];
        room_name.copy_from_slice(&data[ROOM_NAME_OFFSET..ROOM_NAME_OFFSET + ROOM_NAME_LEN]);

        Some(Self {
            network_id,
            room_id: data[ROOM_ID_OFFSET],
            room_name,
            device_name: *device_name,
        })
    }

    /// Whether this advertisement comes from a gateway of `network_id`.
    pub fn is_gateway_of(&self, network_id: u32) -> bool {
        self.network_id == network_id && self.device_name.starts_with(GATEWAY_NAME_PREFIX)
    }
}

/// Parse a report and keep it only if it is a gateway of our network.
pub fn qualify(report: &ScanReport, network_id: u32) -> Option<GatewayAdvert> {
    GatewayAdvert::parse(&report.device_name, &report.data)
        .filter(|adv| adv.is_gateway_of(network_id))
}

/// Resolve the advertised device name.
///
/// Walks the AD structures for a Shortened/Complete Local Name (0x08/0x09).
/// Gateway payloads carry no name AD structure; for those the name bytes at
/// [`DEVICE_NAME_OFFSET`] are used.
pub fn advertised_name(data: &[u8]) -> DeviceName {
    let mut name = [0u8; DEVICE_NAME_LEN];

    let mut pos = 0;
    while pos < data.len() {
        let len = data[pos] as usize;
        if len == 0 || pos + 1 + len > data.len() {
            break;
        }

        let ad_type = data[pos + 1];
        if ad_type == 0x08 || ad_type == 0x09 {
            let value = &data[pos + 2..pos + 1 + len];
            let n = value.len().min(DEVICE_NAME_LEN);
            name[..n].copy_from_slice(&value[..n]);
            return name;
        }

        pos += 1 + len;
    }

    if data.len() > DEVICE_NAME_OFFSET {
        let end = data.len().min(DEVICE_NAME_OFFSET + DEVICE_NAME_LEN);
        name[..end - DEVICE_NAME_OFFSET].copy_from_slice(&data[DEVICE_NAME_OFFSET..end]);
    }
    name
}

/// View a zero-padded fixed-width field as a string.
///
/// Stops at the first NUL. Invalid UTF-8 yields the longest valid prefix.
pub fn fixed_str(field: &[u8]) -> &str {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    match core::str::from_utf8(&field[..end]) {
        Ok(s) => s,
        Err(e) => core::str::from_utf8(&field[..e.valid_up_to()]).unwrap_or(""),
    }
}

/// Copy `s` into a zero-padded fixed-width field, truncating if needed.
pub fn to_fixed<const N: usize>(s: &str) -> [u8; N] {
    let mut field = [0u8; N];
    let len = s.len().min(N);
    field[..len].copy_from_slice(&s.as_bytes()[..len]);
    field
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Build a 31-byte gateway advertisement the way gateways send it.
    pub fn gateway_adv(network_id: u32, room_id: u8, room_name: &str, device_name: &str) -> [u8; 31] {
        let mut adv = [0u8; 31];
        adv[0..3].copy_from_slice(&[0x02, 0x01, 0x06]);
        adv[3] = 0x13;
        adv[4] = 0xFF;
        adv[5..7].copy_from_slice(&crate::defaults::COMPANY_ID.to_le_bytes());
        adv[NETWORK_ID_OFFSET..NETWORK_ID_OFFSET + 4].copy_from_slice(&network_id.to_le_bytes());
        adv[ROOM_ID_OFFSET] = room_id;
        let room: RoomName = to_fixed(room_name);
        adv[ROOM_NAME_OFFSET..ROOM_NAME_OFFSET + ROOM_NAME_LEN].copy_from_slice(&room);
        let name: DeviceName = to_fixed(device_name);
        adv[DEVICE_NAME_OFFSET..].copy_from_slice(&name[..MAX_ADV_LEN - DEVICE_NAME_OFFSET]);
        adv
    }

    /// A scan report from a gateway, with the full name resolved.
    pub fn gateway_report(
        network_id: u32,
        room_id: u8,
        room_name: &str,
        device_name: &str,
        rssi: i8,
    ) -> ScanReport {
        let adv = gateway_adv(network_id, room_id, room_name, device_name);
        ScanReport::with_name(to_fixed(device_name), rssi, &adv).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::{gateway_adv, gateway_report};
    use super::*;

    #[test]
    fn parse_reads_fixed_offsets() {
        let report = gateway_report(0xDEAD_BEEF, 3, "Kitchen", "IPGW_A1B2", -60);
        let gw = GatewayAdvert::parse(&report.device_name, &report.data).unwrap();
        assert_eq!(gw.network_id, 0xDEAD_BEEF);
        assert_eq!(gw.room_id, 3);
        assert_eq!(fixed_str(&gw.room_name), "Kitchen");
        assert_eq!(fixed_str(&gw.device_name), "IPGW_A1B2");
    }

    #[test]
    fn parse_rejects_short_payload() {
        let adv = gateway_adv(1, 1, "Hall", "IPGW_0001");
        let name = to_fixed("IPGW_0001");
        assert!(GatewayAdvert::parse(&name, &adv[..MIN_GATEWAY_ADV_LEN - 1]).is_none());
        assert!(GatewayAdvert::parse(&name, &adv[..MIN_GATEWAY_ADV_LEN]).is_some());
    }

    #[test]
    fn parse_rejects_oversized_payload() {
        let mut long = [0u8; 40];
        long[..31].copy_from_slice(&gateway_adv(1, 1, "Hall", "IPGW_0001"));
        assert!(GatewayAdvert::parse(&to_fixed("IPGW_0001"), &long).is_none());
    }

    #[test]
    fn qualify_checks_network_and_prefix() {
        let report = gateway_report(42, 1, "Hall", "IPGW_0001", -70);
        assert!(qualify(&report, 42).is_some());
        assert!(qualify(&report, 43).is_none());

        let asset = gateway_report(42, 1, "Hall", "IPAS_0001", -70);
        assert!(qualify(&asset, 42).is_none());
    }

    #[test]
    fn advertised_name_falls_back_to_fixed_offset() {
        let adv = gateway_adv(1, 1, "Hall", "IPGW_A1B2");
        // Only eight name bytes fit in the PDU
        assert_eq!(fixed_str(&advertised_name(&adv)), "IPGW_A1B");
    }

    #[test]
    fn advertised_name_prefers_local_name_ad() {
        // Flags + Complete Local Name "IPGW_C0DE"
        let adv = [
            0x02, 0x01, 0x06, 0x0A, 0x09, b'I', b'P', b'G', b'W', b'_', b'C', b'0', b'D', b'E',
        ];
        assert_eq!(fixed_str(&advertised_name(&adv)), "IPGW_C0DE");
    }

    #[test]
    fn advertised_name_empty_for_short_unnamed_payload() {
        assert_eq!(advertised_name(&[0x02, 0x01, 0x06]), [0u8; DEVICE_NAME_LEN]);
    }

    #[test]
    fn scan_report_rejects_extended_payload() {
        assert!(ScanReport::new(-50, &[0u8; 31]).is_some());
        assert!(ScanReport::new(-50, &[0u8; 32]).is_none());
    }

    #[test]
    fn fixed_str_stops_at_nul() {
        assert_eq!(fixed_str(b"Lab\0\0\0"), "Lab");
        assert_eq!(fixed_str(b"Lobby"), "Lobby");
        assert_eq!(fixed_str(&[b'o', b'k', 0xFF, b'x']), "ok");
    }

    #[test]
    fn to_fixed_truncates_and_pads() {
        let f: [u8; 4] = to_fixed("ab");
        assert_eq!(f, [b'a', b'b', 0, 0]);
        let f: [u8; 4] = to_fixed("abcdef");
        assert_eq!(&f, b"abcd");
    }
}
