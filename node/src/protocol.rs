//! # Message Codec
//!
//! This module defines the line-oriented command language spoken over both the
//! radio link and the companion link, plus the role-election literals.
//!
//! ## Wire Format
//!
//! ```text
//! KEY:payload;KEY:payload;KEY
//! └─┬─┘ └──┬──┘
//!  key   payload (optional)
//! ```
//!
//! Radio frames carry exactly one `KEY:payload` message (or a role literal, or a
//! binary status record). The companion link carries `;`-terminated commands
//! inbound and `KEY:payload;` / bare `KEY` outbound.
//!
//! ## Role Protocol Literals
//!
//! - `ROLE: <role>`: a node announcing its persisted role
//! - `We are both: <role>`: a conflict was detected
//! - `We are different roles`: roles already differ

use core::fmt::{self, Write};
use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::settings::{Effect, Rgb, PALETTE};
use crate::{bounded, Text, MAX_RADIO_PAYLOAD};

/// Longest accepted board name
pub const NAME_LEN: usize = 32;

/// Longest accepted network name
pub const SSID_LEN: usize = 32;

/// Longest accepted network password
pub const PASSWORD_LEN: usize = 64;

/// The two complementary roles a node can hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    /// Owns the companion link and is authoritative for it
    Primary,
    /// Satellite mirroring effects and reporting status
    Secondary,
}

impl Role {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Role::Primary => "PRIMARY",
            Role::Secondary => "SECONDARY",
        }
    }

    /// The role the partner should hold
    pub const fn complement(&self) -> Role {
        match self {
            Role::Primary => Role::Secondary,
            Role::Secondary => Role::Primary,
        }
    }

    /// Index used in status-line tags (`r1`, `r2`)
    pub const fn board_index(&self) -> u8 {
        match self {
            Role::Primary => 1,
            Role::Secondary => 2,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "PRIMARY" => Ok(Role::Primary),
            "SECONDARY" => Ok(Role::Secondary),
            _ => Err(ParseError::InvalidValue),
        }
    }
}

/// Errors while decoding a command line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ParseError {
    /// Nothing but whitespace and terminators
    Empty,
    /// Key is not part of the command vocabulary
    UnknownKey,
    /// Key requires a payload but none was given
    MissingPayload,
    /// Numeric payload failed to parse
    InvalidNumber,
    /// Payload is not one of the accepted values
    InvalidValue,
    /// Payload exceeds the field capacity
    TooLong,
}

/// Messages of the role-election protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RoleMessage {
    /// `ROLE: <role>`
    Announce(Role),
    /// `We are both: <role>`
    Conflict(Role),
    /// `We are different roles`
    Resolved,
}

const ANNOUNCE_PREFIX: &str = "ROLE:";
const CONFLICT_PREFIX: &str = "We are both:";
const RESOLVED_PREFIX: &str = "We are different roles";
const ROLE_MESSAGE_LEN: usize = 32;

const _: () = assert!(
    RESOLVED_PREFIX.len() <= ROLE_MESSAGE_LEN
        && CONFLICT_PREFIX.len() + " SECONDARY".len() <= ROLE_MESSAGE_LEN
        && ANNOUNCE_PREFIX.len() + " SECONDARY".len() <= ROLE_MESSAGE_LEN
);

impl RoleMessage {
    /// Classify a radio text as a role message
    ///
    /// Returns `None` for anything that is not one of the three literals,
    /// including an announcement naming an unknown role.
    pub fn parse(text: &str) -> Option<Self> {
        if let Some(rest) = text.strip_prefix(ANNOUNCE_PREFIX) {
            rest.parse().ok().map(RoleMessage::Announce)
        } else if let Some(rest) = text.strip_prefix(CONFLICT_PREFIX) {
            rest.parse().ok().map(RoleMessage::Conflict)
        } else if text.starts_with(RESOLVED_PREFIX) {
            Some(RoleMessage::Resolved)
        } else {
            None
        }
    }

    pub fn encode(&self) -> Text<ROLE_MESSAGE_LEN> {
        let mut out = Text::new();
        let written = match self {
            RoleMessage::Announce(role) => write!(out, "{} {}", ANNOUNCE_PREFIX, role),
            RoleMessage::Conflict(role) => write!(out, "{} {}", CONFLICT_PREFIX, role),
            RoleMessage::Resolved => out.push_str(RESOLVED_PREFIX).map_err(|_| fmt::Error),
        };
        debug_assert!(written.is_ok(), "role message truncated: {}", out);
        out
    }
}

/// A decoded command of the shared command language
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `SSID:<name>`
    Ssid(Text<SSID_LEN>),
    /// `PW:<password>`
    Password(Text<PASSWORD_LEN>),
    /// `IC:r,g,b`
    InitialColor(Rgb),
    /// `SC1:r,g,b`
    SportsColor1(Rgb),
    /// `SC2:r,g,b`
    SportsColor2(Rgb),
    /// `B1:<name>`
    Board1Name(Text<NAME_LEN>),
    /// `B2:<name>`
    Board2Name(Text<NAME_LEN>),
    /// `BRIGHT:<0-255>`
    Brightness(u8),
    /// `SIZE:<n>`
    BlockSize(u32),
    /// `SPEED:<n>`
    EffectSpeed(u32),
    /// `CELEB:<ms>`
    Celebration(u32),
    /// `TIMEOUT:<n>`
    InactivityTimeout(u32),
    /// `Effect:<name>`
    Effect(Effect),
    /// `ColorIndex:<palette index>`
    ColorIndex(u8),
    /// `toggleWiFi:on|off`
    ToggleWifi(bool),
    /// `toggleLights:on|off`
    ToggleLights(bool),
    /// `toggleEspNow:on|off`
    ToggleRadio(bool),
    /// `Restart`
    Restart,
    /// `GET_SETTINGS`
    GetSettings,
    /// `GET_INFO`
    GetInfo,
    /// `SET_ROLE:PRIMARY|SECONDARY`
    SetRole(Role),
    /// `CLEAR_ALL`
    ClearAll,
    /// `UPDATE`
    Update,
    /// A peer's `r1:`/`r2:`... status line, kept verbatim
    StatusReport(Text<MAX_RADIO_PAYLOAD>),
}

const STATUS_KEYS: [&str; 12] = [
    "r1", "n1", "m1", "i1", "l1", "v1", "r2", "n2", "m2", "i2", "l2", "v2",
];

impl Command {
    /// Decode one command line
    ///
    /// A trailing `;` and surrounding whitespace are ignored. Failure never
    /// yields a partially decoded command.
    pub fn parse(line: &str) -> Result<Self, ParseError> {
        let line = line.trim().trim_end_matches(';').trim_end();
        if line.is_empty() {
            return Err(ParseError::Empty);
        }

        let (key, payload) = match line.split_once(':') {
            Some((key, payload)) => (key.trim(), Some(payload)),
            None => (line, None),
        };

        if STATUS_KEYS.contains(&key) {
            if line.len() > MAX_RADIO_PAYLOAD {
                return Err(ParseError::TooLong);
            }
            return Ok(Command::StatusReport(bounded(line)));
        }

        match key {
            "SSID" => Ok(Command::Ssid(text_field(payload)?)),
            "PW" => Ok(Command::Password(text_field(payload)?)),
            "IC" => Ok(Command::InitialColor(Rgb::parse_clamped(required(payload)?)?)),
            "SC1" => Ok(Command::SportsColor1(Rgb::parse_clamped(required(payload)?)?)),
            "SC2" => Ok(Command::SportsColor2(Rgb::parse_clamped(required(payload)?)?)),
            "B1" => Ok(Command::Board1Name(text_field(payload)?)),
            "B2" => Ok(Command::Board2Name(text_field(payload)?)),
            "BRIGHT" | "brightness" => Ok(Command::Brightness(clamped_u8(required(payload)?)?)),
            "SIZE" => Ok(Command::BlockSize(unsigned(required(payload)?)?)),
            "SPEED" => Ok(Command::EffectSpeed(unsigned(required(payload)?)?)),
            "CELEB" => Ok(Command::Celebration(unsigned(required(payload)?)?)),
            "TIMEOUT" => Ok(Command::InactivityTimeout(unsigned(required(payload)?)?)),
            "Effect" => Effect::from_name(required(payload)?.trim())
                .map(Command::Effect)
                .ok_or(ParseError::InvalidValue),
            "ColorIndex" => {
                let index = unsigned(required(payload)?)?;
                if (index as usize) < PALETTE.len() {
                    Ok(Command::ColorIndex(index as u8))
                } else {
                    Err(ParseError::InvalidValue)
                }
            }
            "toggleWiFi" => Ok(Command::ToggleWifi(switch(required(payload)?)?)),
            "toggleLights" => Ok(Command::ToggleLights(switch(required(payload)?)?)),
            "toggleEspNow" => Ok(Command::ToggleRadio(switch(required(payload)?)?)),
            "Restart" => Ok(Command::Restart),
            "GET_SETTINGS" => Ok(Command::GetSettings),
            "GET_INFO" => Ok(Command::GetInfo),
            "SET_ROLE" => required(payload)?.parse().map(Command::SetRole),
            "CLEAR_ALL" => Ok(Command::ClearAll),
            "UPDATE" => Ok(Command::Update),
            _ => Err(ParseError::UnknownKey),
        }
    }

    /// Protocol key of this command
    pub fn key(&self) -> &str {
        match self {
            Command::Ssid(_) => "SSID",
            Command::Password(_) => "PW",
            Command::InitialColor(_) => "IC",
            Command::SportsColor1(_) => "SC1",
            Command::SportsColor2(_) => "SC2",
            Command::Board1Name(_) => "B1",
            Command::Board2Name(_) => "B2",
            Command::Brightness(_) => "BRIGHT",
            Command::BlockSize(_) => "SIZE",
            Command::EffectSpeed(_) => "SPEED",
            Command::Celebration(_) => "CELEB",
            Command::InactivityTimeout(_) => "TIMEOUT",
            Command::Effect(_) => "Effect",
            Command::ColorIndex(_) => "ColorIndex",
            Command::ToggleWifi(_) => "toggleWiFi",
            Command::ToggleLights(_) => "toggleLights",
            Command::ToggleRadio(_) => "toggleEspNow",
            Command::Restart => "Restart",
            Command::GetSettings => "GET_SETTINGS",
            Command::GetInfo => "GET_INFO",
            Command::SetRole(_) => "SET_ROLE",
            Command::ClearAll => "CLEAR_ALL",
            Command::Update => "UPDATE",
            Command::StatusReport(line) => STATUS_KEYS
                .iter()
                .copied()
                .find(|key| line.starts_with(*key))
                .unwrap_or(STATUS_KEYS[0]),
        }
    }

    /// Canonical payload of this command (empty for bare keys)
    pub fn payload(&self) -> Text<MAX_RADIO_PAYLOAD> {
        let mut out = Text::new();
        let written = match self {
            Command::Ssid(text) => write!(out, "{}", text),
            Command::Password(text) => write!(out, "{}", text),
            Command::InitialColor(rgb) | Command::SportsColor1(rgb) | Command::SportsColor2(rgb) => {
                write!(out, "{}", rgb)
            }
            Command::Board1Name(name) | Command::Board2Name(name) => write!(out, "{}", name),
            Command::Brightness(value) => write!(out, "{}", value),
            Command::BlockSize(value)
            | Command::EffectSpeed(value)
            | Command::Celebration(value)
            | Command::InactivityTimeout(value) => write!(out, "{}", value),
            Command::Effect(effect) => write!(out, "{}", effect.name()),
            Command::ColorIndex(index) => write!(out, "{}", index),
            Command::ToggleWifi(on) | Command::ToggleLights(on) | Command::ToggleRadio(on) => {
                write!(out, "{}", if *on { "on" } else { "off" })
            }
            Command::SetRole(role) => write!(out, "{}", role),
            Command::Restart
            | Command::GetSettings
            | Command::GetInfo
            | Command::ClearAll
            | Command::Update => Ok(()),
            Command::StatusReport(line) => {
                let rest = line.split_once(':').map_or("", |(_, rest)| rest);
                out.push_str(rest).map_err(|_| fmt::Error)
            }
        };
        debug_assert!(written.is_ok(), "{} payload truncated", self.key());
        out
    }

    /// Requests ask a node to do something now; they carry no state to dedup
    pub fn is_request(&self) -> bool {
        matches!(
            self,
            Command::Restart | Command::GetSettings | Command::GetInfo | Command::Update
        )
    }
}

/// Split a buffer fill into its `;`-terminated commands
///
/// Each non-empty line is yielded with its decode result so callers can log
/// failures and keep going.
pub fn split_commands(fill: &str) -> impl Iterator<Item = (&str, Result<Command, ParseError>)> {
    fill.split(';')
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| (line, Command::parse(line)))
}

fn required(payload: Option<&str>) -> Result<&str, ParseError> {
    match payload {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ParseError::MissingPayload),
    }
}

fn text_field<const N: usize>(payload: Option<&str>) -> Result<Text<N>, ParseError> {
    let value = required(payload)?;
    if value.len() > N {
        return Err(ParseError::TooLong);
    }
    Ok(bounded(value))
}

fn clamped_u8(value: &str) -> Result<u8, ParseError> {
    let parsed: i64 = value.trim().parse().map_err(|_| ParseError::InvalidNumber)?;
    Ok(parsed.clamp(0, 255) as u8)
}

fn unsigned(value: &str) -> Result<u32, ParseError> {
    value.trim().parse().map_err(|_| ParseError::InvalidNumber)
}

fn switch(value: &str) -> Result<bool, ParseError> {
    match value.trim() {
        "on" => Ok(true),
        "off" => Ok(false),
        _ => Err(ParseError::InvalidValue),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_brightness_is_clamped() {
        assert_eq!(Command::parse("BRIGHT:999"), Ok(Command::Brightness(255)));
        assert_eq!(Command::parse("BRIGHT:-4;"), Ok(Command::Brightness(0)));
        assert_eq!(Command::parse("BRIGHT:abc"), Err(ParseError::InvalidNumber));
    }

    #[test]
    fn test_color_channels_are_clamped() {
        assert_eq!(
            Command::parse("IC:-5,300,10"),
            Ok(Command::InitialColor(Rgb::new(0, 255, 10)))
        );
        assert_eq!(Command::parse("SC1:1,2"), Err(ParseError::InvalidValue));
    }

    #[test]
    fn test_timing_fields_reject_negative_values() {
        assert_eq!(Command::parse("SIZE:40"), Ok(Command::BlockSize(40)));
        assert_eq!(Command::parse("SPEED:-1"), Err(ParseError::InvalidNumber));
        assert_eq!(Command::parse("CELEB:4000000000"), Ok(Command::Celebration(4_000_000_000)));
        assert_eq!(Command::parse("TIMEOUT:"), Err(ParseError::MissingPayload));
    }

    #[test]
    fn test_bare_and_colon_suffixed_keys() {
        assert_eq!(Command::parse("Restart"), Ok(Command::Restart));
        assert_eq!(Command::parse("Restart:"), Ok(Command::Restart));
        assert_eq!(Command::parse("CLEAR_ALL:"), Ok(Command::ClearAll));
        assert_eq!(Command::parse("GET_INFO;"), Ok(Command::GetInfo));
    }

    #[test]
    fn test_role_assignment() {
        assert_eq!(Command::parse("SET_ROLE:SECONDARY"), Ok(Command::SetRole(Role::Secondary)));
        assert_eq!(Command::parse("SET_ROLE:BOSS"), Err(ParseError::InvalidValue));
    }

    #[test]
    fn test_toggles() {
        assert_eq!(Command::parse("toggleLights:off"), Ok(Command::ToggleLights(false)));
        assert_eq!(Command::parse("toggleWiFi:on"), Ok(Command::ToggleWifi(true)));
        assert_eq!(Command::parse("toggleEspNow:maybe"), Err(ParseError::InvalidValue));
    }

    #[test]
    fn test_effect_and_color_index() {
        assert_eq!(Command::parse("Effect:Rainbow"), Ok(Command::Effect(Effect::Rainbow)));
        assert_eq!(Command::parse("Effect:Disco"), Err(ParseError::InvalidValue));
        assert_eq!(Command::parse("ColorIndex:7"), Ok(Command::ColorIndex(7)));
        assert_eq!(Command::parse("ColorIndex:8"), Err(ParseError::InvalidValue));
    }

    #[test]
    fn test_status_lines_are_kept_verbatim() {
        let line = "r2:SECONDARY;n2:Board 2;l2:80";
        match Command::parse(line) {
            Ok(Command::StatusReport(text)) => assert_eq!(text.as_str(), "r2:SECONDARY;n2:Board 2;l2:80"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_status_line_key_is_a_protocol_key() {
        let cmd = Command::parse("r2:SECONDARY;n2:Board 2;l2:80").unwrap();
        assert_eq!(cmd.key(), "r2");
        assert_eq!(cmd.payload().as_str(), "SECONDARY;n2:Board 2;l2:80");
        assert_eq!(Command::parse("n1:Left").unwrap().key(), "n1");
    }

    #[test]
    fn test_unknown_and_empty() {
        assert_eq!(Command::parse("FOO:1"), Err(ParseError::UnknownKey));
        assert_eq!(Command::parse(" ; "), Err(ParseError::Empty));
    }

    #[test]
    fn test_canonical_encoding() {
        let cmd = Command::parse("IC: 1, 2 ,3").unwrap();
        assert_eq!(cmd.key(), "IC");
        assert_eq!(cmd.payload().as_str(), "1,2,3");
        assert_eq!(Command::ToggleLights(true).payload().as_str(), "on");
        assert_eq!(Command::GetInfo.payload().as_str(), "");
    }

    #[test]
    fn test_split_commands_from_one_fill() {
        let parsed: std::vec::Vec<_> = split_commands("BRIGHT:10;Effect:Chase;bogus;")
            .map(|(_, result)| result)
            .collect();
        assert_eq!(
            parsed,
            std::vec![
                Ok(Command::Brightness(10)),
                Ok(Command::Effect(Effect::Chase)),
                Err(ParseError::UnknownKey),
            ]
        );
    }

    #[test]
    fn test_role_messages() {
        assert_eq!(RoleMessage::parse("ROLE: PRIMARY"), Some(RoleMessage::Announce(Role::Primary)));
        assert_eq!(
            RoleMessage::parse("We are both: SECONDARY"),
            Some(RoleMessage::Conflict(Role::Secondary))
        );
        assert_eq!(RoleMessage::parse("We are different roles: "), Some(RoleMessage::Resolved));
        assert_eq!(RoleMessage::parse("ROLE: KING"), None);
        assert_eq!(RoleMessage::parse("BRIGHT:3"), None);

        assert_eq!(RoleMessage::Announce(Role::Secondary).encode().as_str(), "ROLE: SECONDARY");
        assert_eq!(RoleMessage::Conflict(Role::Primary).encode().as_str(), "We are both: PRIMARY");
        assert_eq!(RoleMessage::Resolved.encode().as_str(), "We are different roles");
    }
}
