/// Fixed-capacity table of gateways discovered in the current cycle.
///
/// Records are deduplicated by advertised device name. The table never
/// grows past [`MAX_GATEWAYS`]; further new gateways are ignored until the
/// next [`GatewayRegistry::clear_all`].
use heapless::Vec;

use crate::defaults::{MAX_GATEWAYS, REQUIRED_SAMPLE_COUNT};
use crate::scanner::{fixed_str, DeviceName, GatewayAdvert, RoomName};

/// Position of a record in registry (discovery) order.
pub type SlotIndex = usize;

/// One discovered gateway plus its sample window for the current cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayRecord {
    pub network_id: u32,
    pub room_id: u8,
    pub room_name: RoomName,
    /// Dedup key
    pub device_name: DeviceName,
    /// Raw RSSI readings in dBm
    pub samples: [i8; REQUIRED_SAMPLE_COUNT],
    /// Next write position into `samples`
    pub sample_count: usize,
    /// Set once a full window has been collected since the last reset
    pub ready: bool,
    /// Only meaningful after the outlier filter has run
    pub filtered_rssi: f32,
}

impl GatewayRecord {
    pub fn new(adv: &GatewayAdvert) -> Self {
        Self {
            network_id: adv.network_id,
            room_id: adv.room_id,
            room_name: adv.room_name,
            device_name: adv.device_name,
            samples: [0; REQUIRED_SAMPLE_COUNT],
            sample_count: 0,
            ready: false,
            filtered_rssi: 0.0,
        }
    }

    /// Clear per-cycle measurement state, keeping identity.
    pub fn reset_samples(&mut self) {
        self.sample_count = 0;
        self.filtered_rssi = 0.0;
        self.ready = false;
    }

    pub fn name(&self) -> &str {
        fixed_str(&self.device_name)
    }

    pub fn room(&self) -> &str {
        fixed_str(&self.room_name)
    }
}

/// Why a gateway was not added.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterError {
    /// Already registered at this slot; metadata is not relearned.
    AlreadyKnown(SlotIndex),
    /// All [`MAX_GATEWAYS`] slots are taken.
    Full,
}

impl core::fmt::Display for RegisterError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            RegisterError::AlreadyKnown(slot) => write!(f, "gateway already in slot {}", slot),
            RegisterError::Full => write!(f, "gateway table full ({} slots)", MAX_GATEWAYS),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct GatewayRegistry {
    records: Vec<GatewayRecord, MAX_GATEWAYS>,
}

impl GatewayRegistry {
    pub const fn new() -> Self {
        Self {
            records: Vec::new(),
        }
    }

    /// Slot of the gateway advertising `device_name`, if registered.
    pub fn find(&self, device_name: &DeviceName) -> Option<SlotIndex> {
        self.records
            .iter()
            .position(|r| r.device_name == *device_name)
    }

    /// Append a gateway unless it is already known or the table is full.
    pub fn try_register(&mut self, adv: &GatewayAdvert) -> Result<SlotIndex, RegisterError> {
        if let Some(slot) = self.find(&adv.device_name) {
            return Err(RegisterError::AlreadyKnown(slot));
        }
        let slot = self.records.len();
        self.records
            .push(GatewayRecord::new(adv))
            .map_err(|_| RegisterError::Full)?;
        Ok(slot)
    }

    /// Register a newly seen gateway. Returns its slot only when a record
    /// was created; known gateways and a full table are silent no-ops.
    pub fn register_or_ignore(&mut self, adv: &GatewayAdvert) -> Option<SlotIndex> {
        match self.try_register(adv) {
            Ok(slot) => {
                log::info!(
                    "Gateway {} registered in slot {} (room {} '{}')",
                    fixed_str(&adv.device_name),
                    slot,
                    adv.room_id,
                    fixed_str(&adv.room_name),
                );
                Some(slot)
            }
            Err(RegisterError::AlreadyKnown(_)) => None,
            Err(e @ RegisterError::Full) => {
                log::debug!("Ignoring gateway {}: {}", fixed_str(&adv.device_name), e);
                None
            }
        }
    }

    /// Clear per-cycle fields on every record without discarding identity.
    pub fn reset_all(&mut self) {
        for record in self.records.iter_mut() {
            record.reset_samples();
        }
    }

    /// Drop every record.
    pub fn clear_all(&mut self) {
        self.records.clear();
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.records.is_full()
    }

    pub fn get(&self, slot: SlotIndex) -> Option<&GatewayRecord> {
        self.records.get(slot)
    }

    /// Records in registry order.
    pub fn records(&self) -> &[GatewayRecord] {
        &self.records
    }

    pub fn records_mut(&mut self) -> &mut [GatewayRecord] {
        &mut self.records
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::test_support::gateway_adv;
    use crate::scanner::to_fixed;

    fn adv(name: &str, room_id: u8, room: &str) -> GatewayAdvert {
        GatewayAdvert::parse(&to_fixed(name), &gateway_adv(7, room_id, room, name)).unwrap()
    }

    #[test]
    fn register_same_name_twice_keeps_one_record() {
        let mut reg = GatewayRegistry::new();
        assert_eq!(reg.register_or_ignore(&adv("IPGW_0001", 1, "Hall")), Some(0));
        assert_eq!(reg.register_or_ignore(&adv("IPGW_0001", 1, "Hall")), None);
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn unnamed_gateways_sharing_eight_name_bytes_merge() {
        use crate::scanner::{qualify, ScanReport};
        // Without a local-name AD only the fixed-offset name bytes fit
        let a = ScanReport::new(-60, &gateway_adv(7, 1, "Hall", "IPGW_A1B2")).unwrap();
        let b = ScanReport::new(-70, &gateway_adv(7, 2, "Lab", "IPGW_A1B3")).unwrap();
        assert_eq!(a.device_name, b.device_name);

        let mut reg = GatewayRegistry::new();
        assert_eq!(reg.register_or_ignore(&qualify(&a, 7).unwrap()), Some(0));
        assert_eq!(reg.register_or_ignore(&qualify(&b, 7).unwrap()), None);
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.get(0).unwrap().room(), "Hall");
    }

    #[test]
    fn known_gateway_metadata_is_not_relearned() {
        let mut reg = GatewayRegistry::new();
        reg.register_or_ignore(&adv("IPGW_0001", 1, "Hall"));
        assert_eq!(
            reg.try_register(&adv("IPGW_0001", 9, "Attic")),
            Err(RegisterError::AlreadyKnown(0))
        );
        let rec = reg.get(0).unwrap();
        assert_eq!(rec.room_id, 1);
        assert_eq!(rec.room(), "Hall");
    }

    #[test]
    fn fills_to_capacity_then_ignores() {
        let mut reg = GatewayRegistry::new();
        let names = ["IPGW_0001", "IPGW_0002", "IPGW_0003", "IPGW_0004", "IPGW_0005"];
        for (i, name) in names.iter().enumerate() {
            assert_eq!(reg.register_or_ignore(&adv(name, i as u8, "Room")), Some(i));
        }
        assert!(reg.is_full());

        assert_eq!(reg.try_register(&adv("IPGW_0006", 6, "Room")), Err(RegisterError::Full));
        assert_eq!(reg.register_or_ignore(&adv("IPGW_0007", 7, "Room")), None);
        assert_eq!(reg.len(), MAX_GATEWAYS);
        assert!(reg.find(&adv("IPGW_0006", 6, "Room").device_name).is_none());
    }

    #[test]
    fn known_gateway_reported_before_full() {
        let mut reg = GatewayRegistry::new();
        for i in 0..MAX_GATEWAYS {
            let mut name = heapless::String::<9>::new();
            let _ = core::fmt::write(&mut name, format_args!("IPGW_{:04}", i));
            reg.register_or_ignore(&adv(&name, i as u8, "Room"));
        }
        assert_eq!(
            reg.try_register(&adv("IPGW_0002", 2, "Room")),
            Err(RegisterError::AlreadyKnown(2))
        );
    }

    #[test]
    fn reset_all_keeps_identity() {
        let mut reg = GatewayRegistry::new();
        reg.register_or_ignore(&adv("IPGW_0001", 4, "Lab"));
        {
            let rec = &mut reg.records_mut()[0];
            rec.sample_count = 3;
            rec.ready = true;
            rec.filtered_rssi = -61.5;
        }
        reg.reset_all();

        let rec = reg.get(0).unwrap();
        assert_eq!(rec.sample_count, 0);
        assert!(!rec.ready);
        assert_eq!(rec.filtered_rssi, 0.0);
        assert_eq!(rec.name(), "IPGW_0001");
        assert_eq!(rec.room_id, 4);
    }

    #[test]
    fn clear_all_empties_table() {
        let mut reg = GatewayRegistry::new();
        reg.register_or_ignore(&adv("IPGW_0001", 1, "Hall"));
        reg.register_or_ignore(&adv("IPGW_0002", 2, "Lab"));
        reg.clear_all();
        assert!(reg.is_empty());
        assert_eq!(reg.register_or_ignore(&adv("IPGW_0002", 2, "Lab")), Some(0));
    }
}
