//! Asset load state machine
//!
//! `Idle -> Loading -> Ready | Failed`. Every `begin` hands out a fresh
//! [`LoadTicket`]; completions carrying an older ticket are ignored, so a
//! slow load that finishes after the user switched models cannot overwrite
//! the newer one.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LoadTicket(u64);

impl LoadTicket {
    pub fn id(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for LoadTicket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "load#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum LoadPhase<T> {
    #[default]
    Idle,
    Loading,
    Ready(T),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoadState<T> {
    phase: LoadPhase<T>,
    issued: u64,
}

impl<T> Default for LoadState<T> {
    fn default() -> Self {
        Self {
            phase: LoadPhase::Idle,
            issued: 0,
        }
    }
}

impl<T> LoadState<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> &LoadPhase<T> {
        &self.phase
    }

    /// Start a new load, superseding any in flight
    pub fn begin(&mut self) -> LoadTicket {
        self.issued += 1;
        self.phase = LoadPhase::Loading;
        LoadTicket(self.issued)
    }

    fn is_current(&self, ticket: LoadTicket) -> bool {
        ticket.0 == self.issued && matches!(self.phase, LoadPhase::Loading)
    }

    /// Complete a load; returns false if the ticket is stale
    pub fn resolve(&mut self, ticket: LoadTicket, value: T) -> bool {
        if !self.is_current(ticket) {
            tracing::debug!(%ticket, current = self.issued, "Dropping stale load result");
            return false;
        }
        self.phase = LoadPhase::Ready(value);
        true
    }

    /// Fail a load; returns false if the ticket is stale
    pub fn fail(&mut self, ticket: LoadTicket, reason: impl Into<String>) -> bool {
        if !self.is_current(ticket) {
            tracing::debug!(%ticket, current = self.issued, "Dropping stale load failure");
            return false;
        }
        let reason = reason.into();
        tracing::warn!(%ticket, %reason, "Asset load failed");
        self.phase = LoadPhase::Failed(reason);
        true
    }

    /// Back to idle; outstanding tickets become stale
    pub fn reset(&mut self) {
        self.issued += 1;
        self.phase = LoadPhase::Idle;
    }

    pub fn ready(&self) -> Option<&T> {
        match &self.phase {
            LoadPhase::Ready(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self.phase, LoadPhase::Loading)
    }

    pub fn failure(&self) -> Option<&str> {
        match &self.phase {
            LoadPhase::Failed(reason) => Some(reason),
            _ => None,
        }
    }
}
