/// JSON message protocol between the asset tag and a host.
///
/// All messages are newline-delimited JSON (NDJSON), sent over serial and
/// as BLE notifications. Uses `heapless` types for no_std/no-alloc operation.
use heapless::Vec;
use serde::{Deserialize, Serialize};

use crate::defaults::ROOM_NAME_LEN;
use crate::selector::RoomResult;

/// Messages sent from the device to the host
#[derive(Debug, Serialize)]
#[serde(tag = "type")]
pub enum DeviceMessage<'a> {
    /// A localization cycle resolved to a room
    #[serde(rename = "room")]
    Room {
        room_id: u8,
        room: &'a str,
        /// Filtered RSSI of the nearest gateway, truncated to whole dBm
        rssi: i16,
        /// Gateways that took part in the cycle
        gateways: u8,
        /// Uptime in milliseconds when resolved
        ts: u32,
    },
    /// A discovery phase found no gateways
    #[serde(rename = "unavailable")]
    Unavailable { ts: u32 },
    /// Current configuration
    #[serde(rename = "config")]
    Config {
        name: &'a str,
        network_id: u32,
        /// Reporting interval in seconds
        interval: u16,
    },
    /// Device status report
    #[serde(rename = "status")]
    Status {
        /// "unselected", "config" or "normal"
        mode: &'static str,
        /// Normal-mode phase, "-" outside normal mode
        phase: &'static str,
        gateways: u8,
        /// Last resolved room, if any
        #[serde(skip_serializing_if = "Option::is_none")]
        room: Option<&'a str>,
        service: bool,
        /// Uptime in seconds
        uptime: u32,
        /// Free heap in bytes
        heap_free: u32,
        /// Board identifier
        board: &'static str,
        /// Firmware version
        version: &'static str,
    },
}

/// Commands sent from the host to the device.
///
/// Deserialized via [`RawCommand`] in `comm::parse_command()` because
/// `serde_json_core` does not support internally tagged enums.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostCommand {
    /// Enable the localization service (periodic cycles)
    Start,
    /// Disable the localization service
    Stop,
    /// Request current status
    GetStatus,
    /// Request current configuration
    GetConfig,
    /// Join a localization network
    SetNetwork { network_id: u32 },
    /// Change the reporting interval (clamped to the minimum)
    SetInterval { seconds: u16 },
}

/// Wire format for host commands: flat struct that `serde_json_core` can
/// deserialize without `deserialize_any`.
#[derive(Deserialize)]
pub(crate) struct RawCommand {
    pub cmd: heapless::String<16>,
    #[serde(default)]
    pub network_id: Option<u32>,
    #[serde(default)]
    pub seconds: Option<u16>,
}

impl RawCommand {
    pub(crate) fn into_command(self) -> Option<HostCommand> {
        match self.cmd.as_str() {
            "start" => Some(HostCommand::Start),
            "stop" => Some(HostCommand::Stop),
            "get_status" => Some(HostCommand::GetStatus),
            "get_config" => Some(HostCommand::GetConfig),
            "set_network" => self
                .network_id
                .map(|network_id| HostCommand::SetNetwork { network_id }),
            "set_interval" => self.seconds.map(|seconds| HostCommand::SetInterval { seconds }),
            _ => None,
        }
    }
}

/// Firmware version string
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Maximum size of a serialized JSON message
pub const MAX_MSG_LEN: usize = 256;

/// Buffer type for serialized JSON messages
pub type MsgBuffer = Vec<u8, MAX_MSG_LEN>;

/// Manufacturer-specific payload of the position advertisement:
/// network id (LE u32), room id, room name.
pub const POSITION_PAYLOAD_LEN: usize = 4 + 1 + ROOM_NAME_LEN;

pub fn position_payload(network_id: u32, room: &RoomResult) -> [u8; POSITION_PAYLOAD_LEN] {
    let mut payload = [0u8; POSITION_PAYLOAD_LEN];
    payload[0..4].copy_from_slice(&network_id.to_le_bytes());
    payload[4] = room.room_id;
    payload[5..].copy_from_slice(&room.room_name);
    payload
}
