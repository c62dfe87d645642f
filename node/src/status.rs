//! # Board Status Record
//!
//! Fixed-layout binary record exchanged between boards in answer to `GET_INFO`.
//! The receiver tells it apart from command text purely by length.
//!
//! ## Layout (little-endian, no padding)
//!
//! ```text
//! Offset  Size  Field
//! 0       10    device class, NUL padded
//! 10      15    board name, NUL padded
//! 25      6     hardware address
//! 31      16    network address text, NUL padded
//! 47      4     battery level (i32, 0..=100)
//! 51      4     battery voltage x100 (i32)
//! ──────────────
//! 55 bytes total
//! ```

use core::fmt::Write;

use crate::peers::PeerAddress;
use crate::protocol::Role;
use crate::{bounded, Message, Text};

const DEVICE_LEN: usize = 10;
const NAME_LEN: usize = 15;
const IP_LEN: usize = 16;

/// Device class tag every board reports
pub const DEVICE_CLASS: &str = "ESP32";

/// Errors while decoding a status record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StatusError {
    /// Received length differs from [`BoardStatus::SIZE`]
    WrongLength(usize),
    /// A text field is not valid UTF-8
    InvalidText,
}

/// Status of one board as exchanged over the radio link
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardStatus {
    pub device: Text<DEVICE_LEN>,
    pub name: Text<NAME_LEN>,
    pub mac: PeerAddress,
    pub ip: Text<IP_LEN>,
    pub battery_level: i32,
    pub battery_centivolts: i32,
}

impl BoardStatus {
    /// Encoded size in bytes
    pub const SIZE: usize = DEVICE_LEN + NAME_LEN + 6 + IP_LEN + 4 + 4;

    /// Build a record, truncating text fields so one NUL always remains
    pub fn new(name: &str, mac: PeerAddress, ip: &str, battery_raw: u16) -> Self {
        let centivolts = battery_centivolts(battery_raw);
        Self {
            device: bounded(truncate(DEVICE_CLASS, DEVICE_LEN - 1)),
            name: bounded(truncate(name, NAME_LEN - 1)),
            mac,
            ip: bounded(truncate(ip, IP_LEN - 1)),
            battery_level: battery_level(centivolts),
            battery_centivolts: centivolts,
        }
    }

    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        let mut at = 0;
        for (field, len) in [
            (self.device.as_bytes(), DEVICE_LEN),
            (self.name.as_bytes(), NAME_LEN),
        ] {
            let n = field.len().min(len - 1);
            out[at..at + n].copy_from_slice(&field[..n]);
            at += len;
        }
        out[at..at + 6].copy_from_slice(&self.mac.octets());
        at += 6;
        let ip = self.ip.as_bytes();
        let n = ip.len().min(IP_LEN - 1);
        out[at..at + n].copy_from_slice(&ip[..n]);
        at += IP_LEN;
        out[at..at + 4].copy_from_slice(&self.battery_level.to_le_bytes());
        at += 4;
        out[at..at + 4].copy_from_slice(&self.battery_centivolts.to_le_bytes());
        out
    }

    /// Decode a record; any length other than [`BoardStatus::SIZE`] is rejected
    pub fn decode(bytes: &[u8]) -> Result<Self, StatusError> {
        if bytes.len() != Self::SIZE {
            return Err(StatusError::WrongLength(bytes.len()));
        }
        let (device, rest) = bytes.split_at(DEVICE_LEN);
        let (name, rest) = rest.split_at(NAME_LEN);
        let (mac, rest) = rest.split_at(6);
        let (ip, rest) = rest.split_at(IP_LEN);
        let (level, centivolts) = rest.split_at(4);

        let mut octets = [0u8; 6];
        octets.copy_from_slice(mac);

        Ok(Self {
            device: bounded(c_str(device)?),
            name: bounded(c_str(name)?),
            mac: PeerAddress::new(octets),
            ip: bounded(c_str(ip)?),
            battery_level: i32::from_le_bytes(le4(level)),
            battery_centivolts: i32::from_le_bytes(le4(centivolts)),
        })
    }

    /// Render as the role-tagged status line, e.g. `r2:SECONDARY;n2:...;v2:398`
    pub fn status_line(&self, role: Role) -> Message {
        let i = role.board_index();
        let mut out = Message::new();
        let _ = write!(
            out,
            "r{i}:{role};n{i}:{};m{i}:{};i{i}:{};l{i}:{};v{i}:{}",
            self.name,
            self.mac.lower_hex(),
            self.ip,
            self.battery_level,
            self.battery_centivolts,
        );
        out
    }
}

/// Battery voltage x100 from a raw 12-bit ADC reading behind a 10k/3.9k divider
pub fn battery_centivolts(raw: u16) -> i32 {
    // v_adc = raw * 3.3 / 4095; v_bat = v_adc * (10k + 3.9k) / 3.9k
    let scaled = raw as i64 * 330 * 13_900 / (4095 * 3900);
    scaled as i32
}

/// Battery level in percent, mapping 0..=12.00 V onto 0..=100
pub fn battery_level(centivolts: i32) -> i32 {
    (centivolts * 100 / 1200).clamp(0, 100)
}

fn truncate(text: &str, max: usize) -> &str {
    let mut end = text.len().min(max);
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

fn c_str(field: &[u8]) -> Result<&str, StatusError> {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    core::str::from_utf8(&field[..end]).map_err(|_| StatusError::InvalidText)
}

fn le4(bytes: &[u8]) -> [u8; 4] {
    let mut out = [0u8; 4];
    out.copy_from_slice(bytes);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> BoardStatus {
        BoardStatus::new(
            "Back Yard Board",
            PeerAddress::new([0x24, 0x6F, 0x28, 0xAA, 0xBB, 0xCC]),
            "192.168.4.2",
            4095,
        )
    }

    #[test]
    fn test_record_size() {
        assert_eq!(BoardStatus::SIZE, 55);
        assert_eq!(sample().encode().len(), 55);
    }

    #[test]
    fn test_name_truncation_keeps_terminator() {
        let status = sample();
        assert_eq!(status.name.as_str(), "Back Yard Boar");
        let bytes = status.encode();
        assert_eq!(bytes[DEVICE_LEN + NAME_LEN - 1], 0);
    }

    #[test]
    fn test_decode_restores_fields() {
        let decoded = BoardStatus::decode(&sample().encode()).unwrap();
        assert_eq!(decoded, sample());
        assert_eq!(decoded.device.as_str(), "ESP32");
    }

    #[test]
    fn test_decode_rejects_wrong_length() {
        let bytes = sample().encode();
        assert_eq!(
            BoardStatus::decode(&bytes[..54]),
            Err(StatusError::WrongLength(54))
        );
    }

    #[test]
    fn test_decode_rejects_invalid_text() {
        let mut bytes = sample().encode();
        bytes[0] = 0xFF;
        assert_eq!(BoardStatus::decode(&bytes), Err(StatusError::InvalidText));
    }

    #[test]
    fn test_battery_conversion() {
        // Full scale: 3.3 V at the pin is ~11.76 V at the battery
        assert_eq!(battery_centivolts(4095), 1176);
        assert_eq!(battery_level(1176), 98);
        assert_eq!(battery_level(1500), 100);
        assert_eq!(battery_level(-3), 0);
    }

    #[test]
    fn test_status_line() {
        let line = sample().status_line(Role::Secondary);
        assert_eq!(
            line.as_str(),
            "r2:SECONDARY;n2:Back Yard Boar;m2:24:6f:28:aa:bb:cc;i2:192.168.4.2;l2:98;v2:1176"
        );
    }
}
