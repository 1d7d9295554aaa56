//! Keyboard snapshot consumed by locomotion.
//!
//! The host translates its key events into [`Key`]s (or passes raw DOM-style
//! key codes to [`Key::from_key_code`]) and feeds them to the entity's
//! [`CharacterInput`]. The controller reads the snapshot once per update.

use atrium_ecs::prelude::Component;
use serde::{Deserialize, Serialize};

/// Logical keys the character reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Key {
    Forward,
    Backward,
    Left,
    Right,
    Action,
    Shift,
    Dance,
}

impl Key {
    /// Map a key code: W/Up, S/Down, A/Left, D/Right, Space, Shift, P.
    pub fn from_key_code(code: u32) -> Option<Self> {
        match code {
            87 | 38 => Some(Self::Forward),
            83 | 40 => Some(Self::Backward),
            65 | 37 => Some(Self::Left),
            68 | 39 => Some(Self::Right),
            32 => Some(Self::Action),
            16 => Some(Self::Shift),
            80 => Some(Self::Dance),
            _ => None,
        }
    }
}

/// Which keys are currently held.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputState {
    pub forward: bool,
    pub backward: bool,
    pub left: bool,
    pub right: bool,
    pub shift: bool,
    pub action: bool,
    pub dance: bool,
}

impl InputState {
    pub fn apply_key(&mut self, key: Key, pressed: bool) {
        let flag = match key {
            Key::Forward => &mut self.forward,
            Key::Backward => &mut self.backward,
            Key::Left => &mut self.left,
            Key::Right => &mut self.right,
            Key::Action => &mut self.action,
            Key::Shift => &mut self.shift,
            Key::Dance => &mut self.dance,
        };
        *flag = pressed;
    }

    /// Forward or backward held. Turning alone does not count.
    pub fn is_moving(&self) -> bool {
        self.forward || self.backward
    }
}

/// Per-entity input snapshot.
#[derive(Debug, Clone, Default)]
pub struct CharacterInput {
    state: InputState,
}

impl CharacterInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn press(&mut self, key: Key) {
        self.state.apply_key(key, true);
    }

    pub fn release(&mut self, key: Key) {
        self.state.apply_key(key, false);
    }

    /// Apply a raw key event. Returns `false` for unmapped codes.
    pub fn handle_key_code(&mut self, code: u32, pressed: bool) -> bool {
        match Key::from_key_code(code) {
            Some(key) => {
                self.state.apply_key(key, pressed);
                true
            }
            None => false,
        }
    }

    pub fn state(&self) -> &InputState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut InputState {
        &mut self.state
    }
}

impl Component for CharacterInput {
    fn name(&self) -> &'static str {
        "CharacterInput"
    }
}
