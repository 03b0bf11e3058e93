/// RSSI sample collection into each gateway's window.
///
/// A record accepts exactly [`REQUIRED_SAMPLE_COUNT`] samples per cycle.
/// Once its window is full it is marked ready and ignores further samples
/// until [`GatewayRegistry::reset_all`].
use crate::defaults::REQUIRED_SAMPLE_COUNT;
use crate::registry::{GatewayRegistry, SlotIndex};
use crate::scanner::DeviceName;

/// Result of feeding one sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ingest {
    /// No registered gateway has this name.
    Unknown,
    /// Sample stored; the window is not full yet.
    Stored(SlotIndex),
    /// Sample stored and completed the window.
    BecameReady(SlotIndex),
    /// Window was already complete; sample dropped.
    AlreadyReady(SlotIndex),
}

/// Store `rssi_dbm` for the gateway advertising `device_name`.
pub fn ingest(registry: &mut GatewayRegistry, device_name: &DeviceName, rssi_dbm: i8) -> Ingest {
    let Some(slot) = registry.find(device_name) else {
        return Ingest::Unknown;
    };
    let record = &mut registry.records_mut()[slot];

    if record.ready {
        return Ingest::AlreadyReady(slot);
    }

    record.samples[record.sample_count] = rssi_dbm;
    record.sample_count += 1;

    if record.sample_count >= REQUIRED_SAMPLE_COUNT {
        record.sample_count = 0;
        record.ready = true;
        log::debug!("Gateway {} sample window complete", record.name());
        Ingest::BecameReady(slot)
    } else {
        Ingest::Stored(slot)
    }
}

/// True when at least one gateway is registered and every one is ready.
pub fn all_ready(registry: &GatewayRegistry) -> bool {
    !registry.is_empty() && registry.records().iter().all(|r| r.ready)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::test_support::gateway_adv;
    use crate::scanner::{to_fixed, GatewayAdvert};

    fn registry_with(names: &[&str]) -> GatewayRegistry {
        let mut reg = GatewayRegistry::new();
        for (i, name) in names.iter().enumerate() {
            let adv = GatewayAdvert::parse(&to_fixed(name), &gateway_adv(1, i as u8, "Room", name))
                .unwrap();
            reg.register_or_ignore(&adv);
        }
        reg
    }

    #[test]
    fn ready_exactly_after_required_samples() {
        let mut reg = registry_with(&["IPGW_0001"]);
        let name = to_fixed("IPGW_0001");

        for i in 0..REQUIRED_SAMPLE_COUNT - 1 {
            assert_eq!(ingest(&mut reg, &name, -60 - i as i8), Ingest::Stored(0));
            assert!(!reg.get(0).unwrap().ready);
        }
        assert_eq!(ingest(&mut reg, &name, -70), Ingest::BecameReady(0));

        let rec = reg.get(0).unwrap();
        assert!(rec.ready);
        assert_eq!(rec.sample_count, 0);
        assert_eq!(rec.samples[0], -60);
        assert_eq!(rec.samples[REQUIRED_SAMPLE_COUNT - 1], -70);
    }

    #[test]
    fn ready_window_rejects_late_samples() {
        let mut reg = registry_with(&["IPGW_0001"]);
        let name = to_fixed("IPGW_0001");
        for _ in 0..REQUIRED_SAMPLE_COUNT {
            ingest(&mut reg, &name, -55);
        }
        assert_eq!(ingest(&mut reg, &name, -99), Ingest::AlreadyReady(0));
        assert_eq!(reg.get(0).unwrap().samples[0], -55);
    }

    #[test]
    fn unknown_device_is_noop() {
        let mut reg = registry_with(&["IPGW_0001"]);
        assert_eq!(ingest(&mut reg, &to_fixed("IPGW_9999"), -40), Ingest::Unknown);
        assert_eq!(reg.get(0).unwrap().sample_count, 0);
    }

    #[test]
    fn all_ready_false_while_any_gateway_short() {
        let mut reg = registry_with(&["IPGW_0001", "IPGW_0002"]);
        let a = to_fixed("IPGW_0001");
        let b = to_fixed("IPGW_0002");

        for _ in 0..REQUIRED_SAMPLE_COUNT {
            ingest(&mut reg, &a, -50);
        }
        assert!(!all_ready(&reg));

        for _ in 0..REQUIRED_SAMPLE_COUNT - 1 {
            ingest(&mut reg, &b, -65);
        }
        assert!(!all_ready(&reg));

        ingest(&mut reg, &b, -65);
        assert!(all_ready(&reg));
    }

    #[test]
    fn all_ready_false_for_empty_registry() {
        assert!(!all_ready(&GatewayRegistry::new()));
    }

    #[test]
    fn reset_all_reopens_windows() {
        let mut reg = registry_with(&["IPGW_0001"]);
        let name = to_fixed("IPGW_0001");
        for _ in 0..REQUIRED_SAMPLE_COUNT {
            ingest(&mut reg, &name, -50);
        }
        reg.reset_all();
        assert!(!all_ready(&reg));
        assert_eq!(ingest(&mut reg, &name, -51), Ingest::Stored(0));
    }
}
