/// Communication layer: NDJSON framing for serial and BLE GATT transports.
///
/// The tag reports room results and answers configuration commands as
/// newline-delimited JSON. Commands can arrive over either transport.
use crate::config::AssetConfig;
use crate::protocol::{DeviceMessage, HostCommand, RawCommand, MAX_MSG_LEN};

/// BLE GATT service UUIDs for the configuration service.
///
/// These duplicate the string literals in the `#[gatt_service]` and
/// `#[characteristic]` attributes in the firmware binary. Proc macros
/// require string literals, so the constants cannot be referenced there.
#[allow(dead_code)]
pub mod ble_uuids {
    /// Configuration service
    pub const SERVICE: &str = "7e2a0001-5c1b-4f7e-9d3a-1b6c2e8f4a10";
    /// TX characteristic: replies and reports, notify
    pub const TX_CHAR: &str = "7e2a0002-5c1b-4f7e-9d3a-1b6c2e8f4a10";
    /// RX characteristic: host commands, write
    pub const RX_CHAR: &str = "7e2a0003-5c1b-4f7e-9d3a-1b6c2e8f4a10";
}

/// Maximum BLE notification payload (MTU-3)
pub const BLE_MAX_NOTIFY: usize = 20;

/// Serialize a DeviceMessage to JSON bytes followed by a newline.
/// Returns the number of bytes written, or None if the buffer is too small.
pub fn serialize_message(msg: &DeviceMessage, buf: &mut [u8]) -> Option<usize> {
    let len = serde_json_core::to_slice(msg, buf).ok()?;
    if len < buf.len() {
        buf[len] = b'\n';
        Some(len + 1)
    } else {
        None
    }
}

/// Deserialize a HostCommand from one NDJSON line.
pub fn parse_command(data: &[u8]) -> Option<HostCommand> {
    let trimmed = trim_trailing_whitespace(data);
    if trimmed.is_empty() {
        return None;
    }
    let (raw, _) = serde_json_core::from_slice::<RawCommand>(trimmed).ok()?;
    raw.into_command()
}

/// Apply the configuration part of a host command.
///
/// Returns true if `config` changed. Service control and queries are the
/// state machine's business and leave the configuration untouched.
pub fn apply_config_command(cmd: &HostCommand, config: &mut AssetConfig) -> bool {
    match *cmd {
        HostCommand::SetNetwork { network_id } => {
            let changed = config.network_id() != network_id;
            config.set_network_id(network_id);
            log::info!("Network id set to {}", network_id);
            changed
        }
        HostCommand::SetInterval { seconds } => {
            let before = config.reporting_interval_s();
            let applied = config.set_reporting_interval(seconds);
            log::info!("Reporting interval set to {}s", applied);
            before != applied
        }
        HostCommand::Start | HostCommand::Stop | HostCommand::GetStatus | HostCommand::GetConfig => {
            false
        }
    }
}

/// NDJSON line accumulator.
/// Collects bytes until a newline is found, then yields the line.
pub struct LineReader {
    buf: [u8; MAX_MSG_LEN],
    pos: usize,
    overflowed: bool,
}

impl LineReader {
    pub const fn new() -> Self {
        Self {
            buf: [0; MAX_MSG_LEN],
            pos: 0,
            overflowed: false,
        }
    }

    /// Feed a byte into the reader. Returns a complete line (without newline)
    /// when one is detected. An overlong line is dropped whole.
    pub fn feed(&mut self, byte: u8) -> Option<&[u8]> {
        if byte == b'\n' || byte == b'\r' {
            let pos = core::mem::replace(&mut self.pos, 0);
            if core::mem::replace(&mut self.overflowed, false) {
                log::warn!("Discarded overlong command line");
                return None;
            }
            if pos > 0 {
                Some(&self.buf[..pos])
            } else {
                None
            }
        } else if self.overflowed {
            None
        } else if self.pos < self.buf.len() {
            self.buf[self.pos] = byte;
            self.pos += 1;
            None
        } else {
            self.overflowed = true;
            None
        }
    }
}

impl Default for LineReader {
    fn default() -> Self {
        Self::new()
    }
}

fn trim_trailing_whitespace(data: &[u8]) -> &[u8] {
    let mut end = data.len();
    while end > 0 && matches!(data[end - 1], b' ' | b'\n' | b'\r' | b'\t') {
        end -= 1;
    }
    &data[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defaults::MIN_REPORTING_INTERVAL_S;

    #[test]
    fn parse_simple_commands() {
        assert_eq!(parse_command(br#"{"cmd":"start"}"#), Some(HostCommand::Start));
        assert_eq!(parse_command(br#"{"cmd":"stop"}"#), Some(HostCommand::Stop));
        assert_eq!(parse_command(br#"{"cmd":"get_status"}"#), Some(HostCommand::GetStatus));
        assert_eq!(
            parse_command(br#"{"cmd":"get_config"}"#),
            Some(HostCommand::GetConfig)
        );
    }

    #[test]
    fn parse_commands_with_arguments() {
        assert_eq!(
            parse_command(br#"{"cmd":"set_network","network_id":4660}"#),
            Some(HostCommand::SetNetwork { network_id: 4660 })
        );
        assert_eq!(
            parse_command(b"{\"cmd\":\"set_interval\",\"seconds\":45}\r\n"),
            Some(HostCommand::SetInterval { seconds: 45 })
        );
    }

    #[test]
    fn parse_rejects_garbage() {
        assert_eq!(parse_command(b""), None);
        assert_eq!(parse_command(b"   \n"), None);
        assert_eq!(parse_command(b"not json"), None);
        assert_eq!(parse_command(br#"{"cmd":"reboot"}"#), None);
        assert_eq!(parse_command(br#"{"cmd":"set_interval"}"#), None);
    }

    #[test]
    fn serialize_appends_newline() {
        let msg = DeviceMessage::Unavailable { ts: 5 };
        let mut buf = [0u8; 64];
        let len = serialize_message(&msg, &mut buf).unwrap();
        assert_eq!(buf[len - 1], b'\n');
        assert_eq!(&buf[..len - 1], br#"{"type":"unavailable","ts":5}"#);
    }

    #[test]
    fn serialize_fails_when_buffer_too_small() {
        let msg = DeviceMessage::Unavailable { ts: 5 };
        let mut buf = [0u8; 8];
        assert_eq!(serialize_message(&msg, &mut buf), None);
    }

    #[test]
    fn config_commands_update_config() {
        let mut config = AssetConfig::new();
        assert!(apply_config_command(
            &HostCommand::SetNetwork { network_id: 9 },
            &mut config
        ));
        assert_eq!(config.network_id(), 9);
        assert!(!apply_config_command(
            &HostCommand::SetNetwork { network_id: 9 },
            &mut config
        ));

        assert!(apply_config_command(
            &HostCommand::SetInterval { seconds: 1 },
            &mut config
        ));
        assert_eq!(config.reporting_interval_s(), MIN_REPORTING_INTERVAL_S);
    }

    #[test]
    fn service_commands_leave_config_alone() {
        let mut config = AssetConfig::new();
        for cmd in [
            HostCommand::Start,
            HostCommand::Stop,
            HostCommand::GetStatus,
            HostCommand::GetConfig,
        ] {
            assert!(!apply_config_command(&cmd, &mut config));
        }
        assert_eq!(config, AssetConfig::new());
    }

    #[test]
    fn line_reader_splits_on_newline() {
        let mut reader = LineReader::new();
        let mut lines = 0;
        for &b in b"{\"cmd\":\"start\"}\n\n{\"cmd\":\"stop\"}\r\n" {
            if let Some(line) = reader.feed(b) {
                assert!(parse_command(line).is_some());
                lines += 1;
            }
        }
        assert_eq!(lines, 2);
    }

    #[test]
    fn line_reader_drops_overlong_line() {
        let mut reader = LineReader::new();
        for _ in 0..MAX_MSG_LEN + 10 {
            assert!(reader.feed(b'x').is_none());
        }
        assert!(reader.feed(b'\n').is_none());

        for &b in br#"{"cmd":"get_status"}"# {
            assert!(reader.feed(b).is_none());
        }
        let line = reader.feed(b'\n').unwrap();
        assert_eq!(parse_command(line), Some(HostCommand::GetStatus));
    }
}
