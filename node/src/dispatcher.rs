//! # Command Dispatcher
//!
//! Applies one decoded [`Command`] to the board: validate, update the in-memory
//! configuration, persist, mirror into the renderer, then describe what has to
//! go out as a list of [`Action`]s. The run loop executes the actions, so the
//! dispatcher itself never touches a transport.
//!
//! ## Propagation
//!
//! ```text
//! origin      radio peers     companion (PRIMARY only)
//! ─────────   ────────────    ────────────────────────
//! Companion   Broadcast       -
//! Radio       -               Notify
//! Local       Broadcast       Notify
//! ```
//!
//! What is propagated is the resulting state (the canonical command), never the
//! raw text that was received.

use heapless::Vec;
use log::{debug, info, warn};

use crate::inbox::SensorEvent;
use crate::protocol::{Command, Role};
use crate::settings::{self, Effect, Rgb, Settings, PALETTE};
use crate::traits::{PreferenceStore, Renderer};
use crate::{Message, Text, MAX_RADIO_PAYLOAD};

/// Where a command came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Origin {
    /// Written by the companion app
    Companion,
    /// Received from a radio peer
    Radio,
    /// Raised on this board (button gestures)
    Local,
}

/// Side effect requested by the dispatcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Send to every registered peer through the radio dedup slot
    Broadcast(Command),
    /// Send to the companion through the companion dedup slot
    Notify(Command),
    /// Send pre-formatted text to the companion
    NotifyText(Message),
    /// Send straight to the current peer, bypassing dedup
    NotifyPeer(Command),
    /// Send to every registered peer, bypassing dedup
    Forward(Command),
    /// Answer the current peer with this board's binary status record
    SendStatus,
    /// Send this board's status line to the companion
    NotifyInfo,
    ResetDedup,
    Restart,
    BeginUpdates,
    SetWifi(bool),
}

/// Actions produced by one command
pub type Actions = Vec<Action, 4>;

/// Runtime state that is not persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoardState {
    pub color_index: u8,
    /// Color currently shown, restored after a celebration
    pub color: Rgb,
    pub effect: Effect,
    pub lights_on: bool,
    pub wifi_enabled: bool,
    pub radio_enabled: bool,
}

/// Owner of the configuration and the runtime board state
#[derive(Debug)]
pub struct Dispatcher {
    settings: Settings,
    state: BoardState,
}

impl Dispatcher {
    pub fn new(settings: Settings) -> Self {
        let state = BoardState {
            color_index: 0,
            color: settings.initial_color,
            effect: Effect::Solid,
            lights_on: true,
            wifi_enabled: true,
            radio_enabled: true,
        };
        Self { settings, state }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn state(&self) -> &BoardState {
        &self.state
    }

    /// Push the whole configuration into the renderer and light the board
    pub fn apply_settings<R: Renderer>(&self, renderer: &mut R) {
        let s = &self.settings;
        renderer.set_brightness(s.brightness);
        renderer.set_block_size(s.block_size);
        renderer.set_effect_speed(s.effect_speed);
        renderer.set_initial_color(s.initial_color);
        renderer.set_sports_colors(s.sports_color1, s.sports_color2);
        renderer.set_color(self.state.color);
        renderer.power(self.state.lights_on);
        renderer.apply_effect(self.state.effect);
    }

    /// Translate a button gesture into the command it stands for
    ///
    /// Color and effect gestures are ignored while the lights are off.
    /// Presence is not a command and yields `None`.
    pub fn gesture(&self, event: SensorEvent) -> Option<Command> {
        match event {
            SensorEvent::SingleClick if self.state.lights_on => {
                let next = (self.state.color_index as usize + 1) % PALETTE.len();
                Some(Command::ColorIndex(next as u8))
            }
            SensorEvent::DoubleClick if self.state.lights_on => {
                Some(Command::Effect(self.state.effect.next()))
            }
            SensorEvent::SingleClick | SensorEvent::DoubleClick => {
                debug!("Lights are off, gesture ignored");
                None
            }
            SensorEvent::LongPress => Some(Command::ToggleLights(!self.state.lights_on)),
            SensorEvent::Presence => None,
        }
    }

    pub fn dispatch<S, R>(
        &mut self,
        cmd: Command,
        origin: Origin,
        role: Role,
        store: &mut S,
        renderer: &mut R,
    ) -> Actions
    where
        S: PreferenceStore,
        R: Renderer,
    {
        let mut actions = Actions::new();
        debug!("Dispatching {} from {:?}", cmd.key(), origin);

        match &cmd {
            Command::Ssid(_)
            | Command::Password(_)
            | Command::Board1Name(_)
            | Command::Board2Name(_)
            | Command::InitialColor(_)
            | Command::SportsColor1(_)
            | Command::SportsColor2(_)
            | Command::Brightness(_)
            | Command::BlockSize(_)
            | Command::EffectSpeed(_)
            | Command::Celebration(_)
            | Command::InactivityTimeout(_) => {
                if let Err(e) = self.settings.apply(&cmd, store) {
                    warn!("Failed to persist {}: {:?}", cmd.key(), e);
                }
                self.render_setting(&cmd, renderer);
                propagate(&mut actions, cmd, origin, role);
            }
            Command::Effect(effect) => {
                self.state.effect = *effect;
                renderer.apply_effect(*effect);
                info!("Effect set to {}", effect);
                propagate(&mut actions, cmd, origin, role);
            }
            Command::ColorIndex(index) => {
                let Some(color) = PALETTE.get(*index as usize).copied() else {
                    warn!("Invalid color index {}", index);
                    return actions;
                };
                self.state.color_index = *index;
                self.state.color = color;
                renderer.set_color(color);
                propagate(&mut actions, cmd, origin, role);
            }
            Command::ToggleLights(on) => {
                self.state.lights_on = *on;
                renderer.power(*on);
                info!("Lights {}", if *on { "on" } else { "off" });
                propagate(&mut actions, cmd, origin, role);
            }
            Command::ToggleWifi(on) => {
                self.state.wifi_enabled = *on;
                let _ = actions.push(Action::SetWifi(*on));
                propagate(&mut actions, cmd, origin, role);
            }
            Command::ToggleRadio(on) => {
                self.state.radio_enabled = *on;
                info!("Radio sync {}", if *on { "enabled" } else { "disabled" });
                propagate(&mut actions, cmd, origin, role);
            }
            Command::Restart => {
                if origin != Origin::Radio {
                    let _ = actions.push(Action::Broadcast(Command::Restart));
                }
                let _ = actions.push(Action::Restart);
            }
            Command::GetSettings => {
                if role == Role::Primary {
                    let snapshot = self.settings.snapshot(self.state.color_index);
                    let _ = actions.push(Action::NotifyText(snapshot));
                }
            }
            Command::GetInfo => match role {
                Role::Primary => {
                    let _ = actions.push(Action::NotifyInfo);
                    if origin == Origin::Companion {
                        let _ = actions.push(Action::Forward(Command::GetInfo));
                    }
                }
                Role::Secondary => {
                    let _ = actions.push(Action::SendStatus);
                }
            },
            Command::SetRole(new_role) => {
                if let Err(e) = settings::save_role(store, *new_role) {
                    warn!("Failed to persist role: {:?}", e);
                }
                info!("Role set to {}, restarting", new_role);
                if origin != Origin::Radio {
                    let _ = actions.push(Action::NotifyPeer(Command::SetRole(new_role.complement())));
                }
                let _ = actions.push(Action::Restart);
            }
            Command::ClearAll => {
                if let Err(e) = store.clear() {
                    warn!("Failed to clear store: {:?}", e);
                }
                info!("All saved settings cleared");
                if origin != Origin::Radio {
                    let _ = actions.push(Action::Broadcast(Command::ClearAll));
                }
                let _ = actions.push(Action::ResetDedup);
                let _ = actions.push(Action::Restart);
            }
            Command::Update => {
                let _ = actions.push(Action::BeginUpdates);
                if origin == Origin::Companion {
                    let _ = actions.push(Action::Broadcast(Command::Update));
                }
            }
            Command::StatusReport(line) => {
                if origin == Origin::Radio && role == Role::Primary {
                    let _ = actions.push(Action::NotifyText(relay(line)));
                } else {
                    debug!("Status line ignored: {}", line);
                }
            }
        }
        actions
    }

    fn render_setting<R: Renderer>(&mut self, cmd: &Command, renderer: &mut R) {
        let s = &self.settings;
        match cmd {
            Command::InitialColor(rgb) => {
                self.state.color = *rgb;
                renderer.set_color(*rgb);
                renderer.set_initial_color(*rgb);
            }
            Command::SportsColor1(_) | Command::SportsColor2(_) => {
                renderer.set_sports_colors(s.sports_color1, s.sports_color2);
            }
            Command::Brightness(value) => renderer.set_brightness(*value),
            Command::BlockSize(value) => renderer.set_block_size(*value),
            Command::EffectSpeed(value) => renderer.set_effect_speed(*value),
            _ => {}
        }
    }
}

fn propagate(actions: &mut Actions, cmd: Command, origin: Origin, role: Role) {
    let notify = origin != Origin::Companion && role == Role::Primary;
    if origin != Origin::Radio {
        let _ = actions.push(Action::Broadcast(cmd.clone()));
    }
    if notify {
        let _ = actions.push(Action::Notify(cmd));
    }
}

fn relay(line: &Text<MAX_RADIO_PAYLOAD>) -> Message {
    crate::bounded(line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MemoryStore, RecordingRenderer, RenderCall};
    use crate::settings::keys;

    fn setup() -> (Dispatcher, MemoryStore, RecordingRenderer) {
        (
            Dispatcher::new(Settings::default()),
            MemoryStore::new(),
            RecordingRenderer::default(),
        )
    }

    #[test]
    fn test_companion_change_goes_to_radio_only() {
        let (mut d, mut store, mut r) = setup();
        let actions = d.dispatch(Command::Brightness(255), Origin::Companion, Role::Primary, &mut store, &mut r);
        assert_eq!(actions.as_slice(), &[Action::Broadcast(Command::Brightness(255))]);
        assert_eq!(store.get_i32(keys::BRIGHTNESS), Some(255));
        assert_eq!(r.calls.last(), Some(&RenderCall::Brightness(255)));
    }

    #[test]
    fn test_radio_change_notifies_companion_on_primary_only() {
        let (mut d, mut store, mut r) = setup();
        let cmd = Command::Effect(Effect::Rainbow);
        let actions = d.dispatch(cmd.clone(), Origin::Radio, Role::Primary, &mut store, &mut r);
        assert_eq!(actions.as_slice(), &[Action::Notify(cmd.clone())]);

        let actions = d.dispatch(cmd, Origin::Radio, Role::Secondary, &mut store, &mut r);
        assert!(actions.is_empty());
        assert_eq!(d.state().effect, Effect::Rainbow);
    }

    #[test]
    fn test_local_change_goes_everywhere() {
        let (mut d, mut store, mut r) = setup();
        let cmd = d.gesture(SensorEvent::SingleClick).unwrap();
        assert_eq!(cmd, Command::ColorIndex(1));
        let actions = d.dispatch(cmd.clone(), Origin::Local, Role::Primary, &mut store, &mut r);
        assert_eq!(actions.as_slice(), &[Action::Broadcast(cmd.clone()), Action::Notify(cmd)]);
        assert_eq!(d.state().color, PALETTE[1]);
    }

    #[test]
    fn test_gestures_ignored_while_lights_off() {
        let (mut d, mut store, mut r) = setup();
        let off = d.gesture(SensorEvent::LongPress).unwrap();
        assert_eq!(off, Command::ToggleLights(false));
        d.dispatch(off, Origin::Local, Role::Secondary, &mut store, &mut r);
        assert_eq!(d.gesture(SensorEvent::SingleClick), None);
        assert_eq!(d.gesture(SensorEvent::DoubleClick), None);
        assert_eq!(d.gesture(SensorEvent::LongPress), Some(Command::ToggleLights(true)));
    }

    #[test]
    fn test_clear_all_wipes_and_restarts() {
        let (mut d, mut store, mut r) = setup();
        Settings::initialize_store(&mut store);
        let actions = d.dispatch(Command::ClearAll, Origin::Companion, Role::Primary, &mut store, &mut r);
        assert_eq!(
            actions.as_slice(),
            &[Action::Broadcast(Command::ClearAll), Action::ResetDedup, Action::Restart]
        );
        assert_eq!(store.get_bool(keys::STORE_INITIALIZED), None);

        let actions = d.dispatch(Command::ClearAll, Origin::Radio, Role::Secondary, &mut store, &mut r);
        assert_eq!(actions.as_slice(), &[Action::ResetDedup, Action::Restart]);
    }

    #[test]
    fn test_set_role_notifies_peer_with_complement() {
        let (mut d, mut store, mut r) = setup();
        let actions = d.dispatch(
            Command::SetRole(Role::Secondary),
            Origin::Companion,
            Role::Primary,
            &mut store,
            &mut r,
        );
        assert_eq!(
            actions.as_slice(),
            &[Action::NotifyPeer(Command::SetRole(Role::Primary)), Action::Restart]
        );
        assert_eq!(settings::load_role(&store), Role::Secondary);

        let actions = d.dispatch(Command::SetRole(Role::Primary), Origin::Radio, Role::Secondary, &mut store, &mut r);
        assert_eq!(actions.as_slice(), &[Action::Restart]);
    }

    #[test]
    fn test_get_info_by_role() {
        let (mut d, mut store, mut r) = setup();
        let actions = d.dispatch(Command::GetInfo, Origin::Companion, Role::Primary, &mut store, &mut r);
        assert_eq!(actions.as_slice(), &[Action::NotifyInfo, Action::Forward(Command::GetInfo)]);

        let actions = d.dispatch(Command::GetInfo, Origin::Radio, Role::Secondary, &mut store, &mut r);
        assert_eq!(actions.as_slice(), &[Action::SendStatus]);
    }

    #[test]
    fn test_get_settings_only_answered_by_primary() {
        let (mut d, mut store, mut r) = setup();
        let actions = d.dispatch(Command::GetSettings, Origin::Companion, Role::Primary, &mut store, &mut r);
        match actions.as_slice() {
            [Action::NotifyText(text)] => assert!(text.starts_with("S:SSID:CornholeAP;")),
            other => panic!("unexpected {:?}", other),
        }
        let actions = d.dispatch(Command::GetSettings, Origin::Companion, Role::Secondary, &mut store, &mut r);
        assert!(actions.is_empty());
    }

    #[test]
    fn test_status_lines_relayed_by_primary() {
        let (mut d, mut store, mut r) = setup();
        let cmd = Command::parse("r2:SECONDARY;n2:Board 2").unwrap();
        let actions = d.dispatch(cmd, Origin::Radio, Role::Primary, &mut store, &mut r);
        match actions.as_slice() {
            [Action::NotifyText(text)] => assert_eq!(text.as_str(), "r2:SECONDARY;n2:Board 2"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_sports_colors_rendered_together() {
        let (mut d, mut store, mut r) = setup();
        d.dispatch(Command::SportsColor2(Rgb::new(1, 2, 3)), Origin::Companion, Role::Primary, &mut store, &mut r);
        assert_eq!(
            r.calls.last(),
            Some(&RenderCall::SportsColors(Rgb::new(191, 87, 0), Rgb::new(1, 2, 3)))
        );
    }
}
