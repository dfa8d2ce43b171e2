//! Marker activation state machine
//!
//! At most one marker is active at a time. Activating another marker
//! implicitly deactivates the previous one.

use serde::{Deserialize, Serialize};

/// How markers are opened and closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InteractionMode {
    /// Hover opens, leaving closes; clicks also open
    #[default]
    Hover,
    /// Clicks toggle; hover is ignored
    Click,
}

/// Pointer events delivered to the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerEvent {
    HoverEnter(usize),
    HoverLeave(usize),
    Click(usize),
    /// Click that hit neither a marker nor the open card
    ClickOutside,
    /// Explicit close button on the card
    Close,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MarkerInteraction {
    #[default]
    Idle,
    Active(usize),
}

impl MarkerInteraction {
    pub fn active(&self) -> Option<usize> {
        match self {
            MarkerInteraction::Idle => None,
            MarkerInteraction::Active(i) => Some(*i),
        }
    }

    pub fn is_active(&self, index: usize) -> bool {
        self.active() == Some(index)
    }

    /// Apply an event; returns whether the state changed
    pub fn handle(&mut self, event: MarkerEvent, mode: InteractionMode) -> bool {
        let next = match (mode, event, *self) {
            (InteractionMode::Hover, MarkerEvent::HoverEnter(i), _) => MarkerInteraction::Active(i),
            (InteractionMode::Hover, MarkerEvent::HoverLeave(i), MarkerInteraction::Active(a))
                if a == i =>
            {
                MarkerInteraction::Idle
            }
            (InteractionMode::Hover, MarkerEvent::Click(i), _) => MarkerInteraction::Active(i),
            (InteractionMode::Click, MarkerEvent::Click(i), MarkerInteraction::Active(a))
                if a == i =>
            {
                MarkerInteraction::Idle
            }
            (InteractionMode::Click, MarkerEvent::Click(i), _) => MarkerInteraction::Active(i),
            (_, MarkerEvent::ClickOutside | MarkerEvent::Close, _) => MarkerInteraction::Idle,
            (_, _, current) => current,
        };
        let changed = next != *self;
        *self = next;
        changed
    }

    /// Drop the active marker if it is gone after a marker set recompute
    pub fn retain<F>(&mut self, exists: F) -> bool
    where
        F: Fn(usize) -> bool,
    {
        match *self {
            MarkerInteraction::Active(i) if !exists(i) => {
                *self = MarkerInteraction::Idle;
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use MarkerEvent::*;

    const HOVER: InteractionMode = InteractionMode::Hover;
    const CLICK: InteractionMode = InteractionMode::Click;

    #[test]
    fn test_exclusive_activation() {
        let mut state = MarkerInteraction::default();
        assert!(state.handle(HoverEnter(0), HOVER));
        assert!(state.handle(HoverEnter(2), HOVER));
        assert_eq!(state.active(), Some(2));
        assert!(!state.is_active(0));

        let mut clicked = MarkerInteraction::default();
        clicked.handle(Click(0), CLICK);
        clicked.handle(Click(2), CLICK);
        assert_eq!(clicked, MarkerInteraction::Active(2));
    }

    #[test]
    fn test_hover_leave_only_closes_active() {
        let mut state = MarkerInteraction::Active(1);
        assert!(!state.handle(HoverLeave(3), HOVER));
        assert_eq!(state.active(), Some(1));
        assert!(state.handle(HoverLeave(1), HOVER));
        assert_eq!(state, MarkerInteraction::Idle);
    }

    #[test]
    fn test_click_mode_ignores_hover() {
        let mut state = MarkerInteraction::default();
        assert!(!state.handle(HoverEnter(0), CLICK));
        state.handle(Click(0), CLICK);
        assert!(!state.handle(HoverLeave(0), CLICK));
        assert_eq!(state.active(), Some(0));
    }

    #[test]
    fn test_click_mode_close_paths() {
        let mut state = MarkerInteraction::Active(4);
        assert!(state.handle(Click(4), CLICK));
        assert_eq!(state, MarkerInteraction::Idle);

        state = MarkerInteraction::Active(4);
        assert!(state.handle(ClickOutside, CLICK));
        state = MarkerInteraction::Active(4);
        assert!(state.handle(Close, CLICK));
        assert!(!state.handle(Close, CLICK));
    }

    #[test]
    fn test_retain_after_recompute() {
        let mut state = MarkerInteraction::Active(5);
        assert!(!state.retain(|i| i == 5));
        assert!(state.retain(|i| i < 3));
        assert_eq!(state, MarkerInteraction::Idle);
    }
}
