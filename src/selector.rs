/// Nearest-room selection from filtered gateway strengths.
use crate::registry::GatewayRecord;
use crate::scanner::{fixed_str, RoomName};

/// The room a localization cycle resolved to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoomResult {
    pub room_id: u8,
    pub room_name: RoomName,
    /// Filtered RSSI of the winning gateway
    pub rssi: f32,
}

impl RoomResult {
    pub fn name(&self) -> &str {
        fixed_str(&self.room_name)
    }
}

/// Room of the record with the strongest (numerically greatest) filtered
/// RSSI. The earliest record in registry order wins ties.
///
/// Returns `None` for an empty slice.
pub fn select_room(records: &[GatewayRecord]) -> Option<RoomResult> {
    let mut best: Option<&GatewayRecord> = None;
    for record in records {
        match best {
            Some(b) if record.filtered_rssi <= b.filtered_rssi => {}
            _ => best = Some(record),
        }
    }

    best.map(|r| RoomResult {
        room_id: r.room_id,
        room_name: r.room_name,
        rssi: r.filtered_rssi,
    })
}
