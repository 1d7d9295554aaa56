//! Generic finite state machine with externally triggered transitions.
//!
//! A [`FiniteStateMachine`] owns a fixed set of named [`State`]s, built once
//! and reused; only the "current" pointer moves. The type parameter `C` is
//! the data every state works on (the owning component's proxy: loaded
//! animation clips, the input snapshot, a scene node, ...).
//!
//! Transitions happen in two ways:
//!
//! - the owner calls [`set_state`](FiniteStateMachine::set_state), or
//! - the current state's [`update`](State::update) returns the name of the
//!   next state, which the machine enters right after the update.
//!
//! Every transition calls `exit` on the outgoing state before `enter` on the
//! incoming one. The machine itself permits any transition; owners that
//! need terminal states must refuse to leave them.

use std::collections::HashMap;

use crate::EcsError;

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// One state of a [`FiniteStateMachine`].
pub trait State<C> {
    /// Unique name within the machine.
    fn name(&self) -> &'static str;

    /// Whether the data this state depends on is available. Entering a state
    /// that is not ready fails with [`EcsError::StateNotReady`].
    fn is_ready(&self, _ctx: &C) -> bool {
        true
    }

    /// Called when the state becomes current. `previous` is the state that
    /// was just exited, if any.
    fn enter(&mut self, _ctx: &mut C, _previous: Option<&'static str>) {}

    /// Called when the state stops being current.
    fn exit(&mut self, _ctx: &mut C) {}

    /// Per-frame update while current. Return `Some(name)` to request a
    /// transition.
    fn update(&mut self, _ctx: &mut C, _dt: f32) -> Option<&'static str> {
        None
    }
}

// ---------------------------------------------------------------------------
// FiniteStateMachine
// ---------------------------------------------------------------------------

/// Named-state container with at most one current state.
pub struct FiniteStateMachine<C> {
    states: HashMap<&'static str, Box<dyn State<C>>>,
    current: Option<&'static str>,
    transitions: u64,
}

impl<C> FiniteStateMachine<C> {
    /// Create a machine with no states and no current state.
    pub fn new() -> Self {
        Self {
            states: HashMap::new(),
            current: None,
            transitions: 0,
        }
    }

    /// Register a state under its [`State::name`].
    ///
    /// # Errors
    ///
    /// [`EcsError::DuplicateState`] if the name is taken.
    pub fn add_state<S>(&mut self, state: S) -> Result<(), EcsError>
    where
        S: State<C> + 'static,
    {
        let name = state.name();
        if self.states.contains_key(name) {
            return Err(EcsError::DuplicateState {
                state: name.to_owned(),
            });
        }
        self.states.insert(name, Box::new(state));
        Ok(())
    }

    /// Builder-style [`add_state`](Self::add_state).
    pub fn with_state<S>(mut self, state: S) -> Result<Self, EcsError>
    where
        S: State<C> + 'static,
    {
        self.add_state(state)?;
        Ok(self)
    }

    /// Make `name` the current state.
    ///
    /// Re-entering the current state is a no-op. Otherwise the current state
    /// (if any) is exited, then the target is entered with the previous
    /// state's name.
    ///
    /// # Errors
    ///
    /// - [`EcsError::UnknownState`] if `name` was never added.
    /// - [`EcsError::StateNotReady`] if the target reports it is not ready.
    ///
    /// On error the machine is unchanged.
    pub fn set_state(&mut self, name: &str, ctx: &mut C) -> Result<(), EcsError> {
        let (&key, target) = self
            .states
            .get_key_value(name)
            .ok_or_else(|| EcsError::UnknownState {
                state: name.to_owned(),
                registered: self.state_names().join(", "),
            })?;
        if self.current == Some(key) {
            return Ok(());
        }
        if !target.is_ready(ctx) {
            return Err(EcsError::StateNotReady {
                state: key.to_owned(),
            });
        }

        let previous = self.current.take();
        if let Some(prev) = previous.and_then(|p| self.states.get_mut(p)) {
            prev.exit(ctx);
        }
        if let Some(next) = self.states.get_mut(key) {
            next.enter(ctx, previous);
        }
        self.current = Some(key);
        self.transitions += 1;
        tracing::trace!(from = ?previous, to = key, "state transition");
        Ok(())
    }

    /// Deliver a frame to the current state and apply the transition it
    /// requests, if any. Without a current state this is a no-op.
    pub fn update(&mut self, dt: f32, ctx: &mut C) -> Result<(), EcsError> {
        let Some(state) = self.current.and_then(|name| self.states.get_mut(name)) else {
            return Ok(());
        };
        match state.update(ctx, dt) {
            Some(next) => self.set_state(next, ctx),
            None => Ok(()),
        }
    }

    /// Name of the current state.
    pub fn current_state(&self) -> Option<&'static str> {
        self.current
    }

    /// Whether the current state is `name`.
    pub fn is_in(&self, name: &str) -> bool {
        self.current == Some(name)
    }

    /// Whether a state named `name` was added.
    pub fn has_state(&self, name: &str) -> bool {
        self.states.contains_key(name)
    }

    /// Names of all added states, sorted.
    pub fn state_names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.states.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Number of transitions performed so far.
    pub fn transition_count(&self) -> u64 {
        self.transitions
    }
}

impl<C> Default for FiniteStateMachine<C> {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
