//! Renderer that logs what the LED strips would show

use cornhole_node::{Effect, Renderer, Rgb};
use log::{info, trace};

/// Current strip state, as the effect engine would hold it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StripState {
    pub effect: Effect,
    pub color: Rgb,
    pub initial_color: Rgb,
    pub sports_colors: (Rgb, Rgb),
    pub brightness: u8,
    pub block_size: u32,
    pub effect_speed: u32,
    pub powered: bool,
}

pub struct LogRenderer {
    name: String,
    state: StripState,
    celebrations: u32,
    frames: u64,
}

impl LogRenderer {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            state: StripState {
                powered: true,
                ..StripState::default()
            },
            celebrations: 0,
            frames: 0,
        }
    }

    pub fn state(&self) -> &StripState {
        &self.state
    }

    pub fn celebrations(&self) -> u32 {
        self.celebrations
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }
}

impl Renderer for LogRenderer {
    fn apply_effect(&mut self, effect: Effect) {
        self.state.effect = effect;
        info!("{}: effect {}", self.name, effect);
    }

    fn set_color(&mut self, color: Rgb) {
        self.state.color = color;
        info!("{}: color {}", self.name, color);
    }

    fn set_initial_color(&mut self, color: Rgb) {
        self.state.initial_color = color;
        info!("{}: initial color {}", self.name, color);
    }

    fn set_sports_colors(&mut self, first: Rgb, second: Rgb) {
        self.state.sports_colors = (first, second);
        info!("{}: sports colors {} / {}", self.name, first, second);
    }

    fn set_brightness(&mut self, brightness: u8) {
        self.state.brightness = brightness;
        info!("{}: brightness {}", self.name, brightness);
    }

    fn set_block_size(&mut self, size: u32) {
        self.state.block_size = size;
        info!("{}: block size {}", self.name, size);
    }

    fn set_effect_speed(&mut self, speed: u32) {
        self.state.effect_speed = speed;
        info!("{}: effect speed {}", self.name, speed);
    }

    fn celebrate(&mut self) {
        self.celebrations += 1;
        info!("{}: celebrating!", self.name);
    }

    fn power(&mut self, on: bool) {
        if self.state.powered != on {
            info!("{}: lights {}", self.name, if on { "on" } else { "off" });
        }
        self.state.powered = on;
    }

    fn tick(&mut self) {
        self.frames += 1;
        trace!("{}: frame {} of {}", self.name, self.frames, self.state.effect);
    }
}
