//! # Board Configuration
//!
//! User-visible settings owned by the dispatcher, persisted through the
//! [`PreferenceStore`] collaborator one key at a time.
//!
//! ## First Boot
//!
//! ```text
//! nvsInit set? ──no──► write factory defaults ──► nvsInit = true
//!      │
//!     yes
//!      ▼
//! load every key (missing keys fall back to the factory default)
//! ```

use core::fmt::{self, Write};

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::protocol::{Command, ParseError, Role, NAME_LEN, PASSWORD_LEN, SSID_LEN};
use crate::traits::{PreferenceStore, StoreError};
use crate::{bounded, Message, Text};

/// Persisted key names
pub mod keys {
    pub const ROLE: &str = "deviceRole";
    pub const SSID: &str = "ssid";
    pub const PASSWORD: &str = "password";
    pub const BOARD1_NAME: &str = "board1Name";
    pub const BOARD2_NAME: &str = "board2Name";
    pub const INITIAL_COLOR: [&str; 3] = ["initialColorR", "initialColorG", "initialColorB"];
    pub const SPORTS_COLOR1: [&str; 3] = ["sportsColor1R", "sportsColor1G", "sportsColor1B"];
    pub const SPORTS_COLOR2: [&str; 3] = ["sportsColor2R", "sportsColor2G", "sportsColor2B"];
    pub const BRIGHTNESS: &str = "brightness";
    pub const BLOCK_SIZE: &str = "blockSize";
    pub const EFFECT_SPEED: &str = "effectSpeed";
    pub const INACTIVITY_TIMEOUT: &str = "inactivityTimeout";
    pub const CELEBRATION: &str = "irTriggerDuration";
    pub const STORE_INITIALIZED: &str = "nvsInit";
}

/// 8-bit RGB color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parse `r,g,b`, clamping every channel into 0..=255
    pub fn parse_clamped(text: &str) -> Result<Self, ParseError> {
        let mut channels = [0u8; 3];
        let mut parts = text.split(',');
        for channel in channels.iter_mut() {
            let part = parts.next().ok_or(ParseError::InvalidValue)?;
            let value: i64 = part.trim().parse().map_err(|_| ParseError::InvalidNumber)?;
            *channel = value.clamp(0, 255) as u8;
        }
        if parts.next().is_some() {
            return Err(ParseError::InvalidValue);
        }
        let [r, g, b] = channels;
        Ok(Self::new(r, g, b))
    }

    fn load<S: PreferenceStore>(store: &S, keys: [&str; 3], default: Rgb) -> Rgb {
        let channel = |key: &str, fallback: u8| {
            store
                .get_i32(key)
                .map(|v| v.clamp(0, 255) as u8)
                .unwrap_or(fallback)
        };
        Rgb::new(
            channel(keys[0], default.r),
            channel(keys[1], default.g),
            channel(keys[2], default.b),
        )
    }

    fn save<S: PreferenceStore>(&self, store: &mut S, keys: [&str; 3]) -> Result<(), StoreError> {
        store.put_i32(keys[0], self.r as i32)?;
        store.put_i32(keys[1], self.g as i32)?;
        store.put_i32(keys[2], self.b as i32)
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{}", self.r, self.g, self.b)
    }
}

/// Named lighting effects understood by the renderer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Effect {
    #[default]
    Solid,
    Twinkle,
    Chase,
    Wipe,
    Bounce,
    Breathing,
    Gradient,
    Rainbow,
    America,
    Sports,
}

impl Effect {
    /// Cycling order used by the double-click gesture
    pub const ALL: [Effect; 10] = [
        Effect::Solid,
        Effect::Twinkle,
        Effect::Chase,
        Effect::Wipe,
        Effect::Bounce,
        Effect::Breathing,
        Effect::Gradient,
        Effect::Rainbow,
        Effect::America,
        Effect::Sports,
    ];

    pub const fn name(&self) -> &'static str {
        match self {
            Effect::Solid => "Solid",
            Effect::Twinkle => "Twinkle",
            Effect::Chase => "Chase",
            Effect::Wipe => "Wipe",
            Effect::Bounce => "Bounce",
            Effect::Breathing => "Breathing",
            Effect::Gradient => "Gradient",
            Effect::Rainbow => "Rainbow",
            Effect::America => "America",
            Effect::Sports => "Sports",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|e| e.name() == name)
    }

    /// The effect after this one, wrapping around
    pub fn next(&self) -> Self {
        let index = Self::ALL.iter().position(|e| e == self).unwrap_or(0);
        Self::ALL[(index + 1) % Self::ALL.len()]
    }
}

impl fmt::Display for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Colors selectable through `ColorIndex` and the single-click gesture
pub const PALETTE: [Rgb; 8] = [
    Rgb::new(0, 0, 255),     // Blue
    Rgb::new(0, 128, 0),     // Green
    Rgb::new(255, 0, 0),     // Red
    Rgb::new(255, 255, 255), // White
    Rgb::new(191, 87, 0),    // Burnt orange
    Rgb::new(0, 255, 255),   // Aqua
    Rgb::new(128, 0, 128),   // Purple
    Rgb::new(255, 192, 203), // Pink
];

/// Persisted, user-visible configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub ssid: Text<SSID_LEN>,
    pub password: Text<PASSWORD_LEN>,
    pub board1_name: Text<NAME_LEN>,
    pub board2_name: Text<NAME_LEN>,
    pub initial_color: Rgb,
    pub sports_color1: Rgb,
    pub sports_color2: Rgb,
    pub brightness: u8,
    pub block_size: u32,
    pub effect_speed: u32,
    pub inactivity_timeout: u32,
    /// Duration of the presence-triggered celebration, in milliseconds
    pub celebration_ms: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            ssid: bounded("CornholeAP"),
            password: bounded("Funforall"),
            board1_name: bounded("Board 1"),
            board2_name: bounded("Board 2"),
            initial_color: Rgb::new(0, 0, 255),
            sports_color1: Rgb::new(191, 87, 0),
            sports_color2: Rgb::new(255, 255, 255),
            brightness: 50,
            block_size: 15,
            effect_speed: 25,
            inactivity_timeout: 30,
            celebration_ms: 4000,
        }
    }
}

impl Settings {
    /// Write factory defaults on first boot
    ///
    /// Returns `true` when the store was (re)initialized.
    pub fn initialize_store<S: PreferenceStore>(store: &mut S) -> bool {
        if store.get_bool(keys::STORE_INITIALIZED) == Some(true) {
            return false;
        }

        info!("First boot, writing factory defaults");
        let defaults = Settings::default();
        let result = save_role(store, Role::Primary)
            .and_then(|_| defaults.save_all(store))
            .and_then(|_| store.put_bool(keys::STORE_INITIALIZED, true));
        if let Err(e) = result {
            warn!("Failed to write factory defaults: {:?}", e);
        }
        true
    }

    /// Load every field, falling back to the factory default per key
    pub fn load<S: PreferenceStore>(store: &S) -> Self {
        let defaults = Settings::default();
        Self {
            ssid: store.get_str(keys::SSID).unwrap_or(defaults.ssid),
            password: store.get_str(keys::PASSWORD).unwrap_or(defaults.password),
            board1_name: store.get_str(keys::BOARD1_NAME).unwrap_or(defaults.board1_name),
            board2_name: store.get_str(keys::BOARD2_NAME).unwrap_or(defaults.board2_name),
            initial_color: Rgb::load(store, keys::INITIAL_COLOR, defaults.initial_color),
            sports_color1: Rgb::load(store, keys::SPORTS_COLOR1, defaults.sports_color1),
            sports_color2: Rgb::load(store, keys::SPORTS_COLOR2, defaults.sports_color2),
            brightness: store
                .get_i32(keys::BRIGHTNESS)
                .map(|v| v.clamp(0, 255) as u8)
                .unwrap_or(defaults.brightness),
            block_size: store.get_u32(keys::BLOCK_SIZE).unwrap_or(defaults.block_size),
            effect_speed: store.get_u32(keys::EFFECT_SPEED).unwrap_or(defaults.effect_speed),
            inactivity_timeout: store
                .get_u32(keys::INACTIVITY_TIMEOUT)
                .unwrap_or(defaults.inactivity_timeout),
            celebration_ms: store.get_u32(keys::CELEBRATION).unwrap_or(defaults.celebration_ms),
        }
    }

    fn save_all<S: PreferenceStore>(&self, store: &mut S) -> Result<(), StoreError> {
        store.put_str(keys::SSID, &self.ssid)?;
        store.put_str(keys::PASSWORD, &self.password)?;
        store.put_str(keys::BOARD1_NAME, &self.board1_name)?;
        store.put_str(keys::BOARD2_NAME, &self.board2_name)?;
        self.initial_color.save(store, keys::INITIAL_COLOR)?;
        self.sports_color1.save(store, keys::SPORTS_COLOR1)?;
        self.sports_color2.save(store, keys::SPORTS_COLOR2)?;
        store.put_i32(keys::BRIGHTNESS, self.brightness as i32)?;
        store.put_u32(keys::BLOCK_SIZE, self.block_size)?;
        store.put_u32(keys::EFFECT_SPEED, self.effect_speed)?;
        store.put_u32(keys::INACTIVITY_TIMEOUT, self.inactivity_timeout)?;
        store.put_u32(keys::CELEBRATION, self.celebration_ms)
    }

    /// Apply a configuration command in memory, then persist the changed field
    ///
    /// Returns `Ok(false)` for commands that do not touch the configuration.
    /// The in-memory value is updated even when persisting fails.
    pub fn apply<S: PreferenceStore>(&mut self, cmd: &Command, store: &mut S) -> Result<bool, StoreError> {
        match cmd {
            Command::Ssid(value) => {
                self.ssid = value.clone();
                store.put_str(keys::SSID, value)?;
            }
            Command::Password(value) => {
                self.password = value.clone();
                store.put_str(keys::PASSWORD, value)?;
            }
            Command::Board1Name(value) => {
                self.board1_name = value.clone();
                store.put_str(keys::BOARD1_NAME, value)?;
            }
            Command::Board2Name(value) => {
                self.board2_name = value.clone();
                store.put_str(keys::BOARD2_NAME, value)?;
            }
            Command::InitialColor(rgb) => {
                self.initial_color = *rgb;
                rgb.save(store, keys::INITIAL_COLOR)?;
            }
            Command::SportsColor1(rgb) => {
                self.sports_color1 = *rgb;
                rgb.save(store, keys::SPORTS_COLOR1)?;
            }
            Command::SportsColor2(rgb) => {
                self.sports_color2 = *rgb;
                rgb.save(store, keys::SPORTS_COLOR2)?;
            }
            Command::Brightness(value) => {
                self.brightness = *value;
                store.put_i32(keys::BRIGHTNESS, *value as i32)?;
            }
            Command::BlockSize(value) => {
                self.block_size = *value;
                store.put_u32(keys::BLOCK_SIZE, *value)?;
            }
            Command::EffectSpeed(value) => {
                self.effect_speed = *value;
                store.put_u32(keys::EFFECT_SPEED, *value)?;
            }
            Command::InactivityTimeout(value) => {
                self.inactivity_timeout = *value;
                store.put_u32(keys::INACTIVITY_TIMEOUT, *value)?;
            }
            Command::Celebration(value) => {
                self.celebration_ms = *value;
                store.put_u32(keys::CELEBRATION, *value)?;
            }
            _ => return Ok(false),
        }
        Ok(true)
    }

    /// One-line settings snapshot sent in answer to `GET_SETTINGS`
    pub fn snapshot(&self, color_index: u8) -> Message {
        let mut out = Message::new();
        // Worst case is well under the message capacity
        let _ = write!(
            out,
            "S:SSID:{};PW:{};B1:{};B2:{};COLORINDEX:{};SPORTCOLOR1:{};SPORTCOLOR2:{};BRIGHT:{};SIZE:{};SPEED:{};CELEB:{};TIMEOUT:{}",
            self.ssid,
            self.password,
            self.board1_name,
            self.board2_name,
            color_index,
            self.sports_color1,
            self.sports_color2,
            self.brightness,
            self.block_size,
            self.effect_speed,
            self.celebration_ms,
            self.inactivity_timeout,
        );
        out
    }
}

/// Persisted role, `PRIMARY` when missing or unreadable
pub fn load_role<S: PreferenceStore>(store: &S) -> Role {
    store
        .get_str::<16>(keys::ROLE)
        .and_then(|text| text.parse().ok())
        .unwrap_or(Role::Primary)
}

pub fn save_role<S: PreferenceStore>(store: &mut S, role: Role) -> Result<(), StoreError> {
    store.put_str(keys::ROLE, role.as_str())
}
