//! Persisted client state
//!
//! Holds the gating flags, the local wallet, and the time the free analysis
//! was used. Stored as pretty JSON next to the config.

use chrono::{DateTime, Utc};
use fengshui_core::GateFlags;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StateError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// Local stand-in for a micropayment account
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WalletState {
    #[serde(default)]
    pub connected: bool,
    #[serde(default)]
    pub balance: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ClientState {
    #[serde(flatten)]
    pub flags: GateFlags,
    #[serde(default)]
    pub wallet: WalletState,
    /// When the free analysis was consumed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub free_analysis_used_at: Option<DateTime<Utc>>,
}

impl ClientState {
    pub fn new(paywall_enabled: bool) -> Self {
        Self {
            flags: GateFlags {
                free_analysis_used: false,
                paywall_enabled,
            },
            ..Default::default()
        }
    }

    /// Load state from a file
    pub fn from_file(path: &Path) -> Result<Self, StateError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Load state, or start fresh with the given paywall setting
    pub fn load_or_create(path: &Path, paywall_enabled: bool) -> Result<Self, StateError> {
        if path.exists() {
            Self::from_file(path)
        } else {
            Ok(Self::new(paywall_enabled))
        }
    }

    /// Save state to a file
    pub fn save(&self, path: &Path) -> Result<(), StateError> {
        let content = serde_json::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Record the flags after a committed analysis
    pub fn update_flags(&mut self, flags: GateFlags) {
        if flags.free_analysis_used && !self.flags.free_analysis_used {
            self.free_analysis_used_at = Some(Utc::now());
        }
        self.flags = flags;
    }

    /// Forget the free analysis and wallet
    pub fn reset(&mut self) {
        let paywall_enabled = self.flags.paywall_enabled;
        *self = Self::new(paywall_enabled);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_or_create_and_save() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("state.json");

        let mut state = ClientState::load_or_create(&path, true).unwrap();
        assert!(state.flags.paywall_enabled);
        assert!(!state.flags.free_analysis_used);

        state.update_flags(GateFlags {
            free_analysis_used: true,
            paywall_enabled: true,
        });
        state.wallet.balance = 1.5;
        state.save(&path).unwrap();

        let loaded = ClientState::load_or_create(&path, false).unwrap();
        assert_eq!(loaded, state);
        assert!(loaded.free_analysis_used_at.is_some());
    }

    #[test]
    fn test_flat_flag_layout() {
        let json = r#"{"free_analysis_used": true, "paywall_enabled": false}"#;
        let state: ClientState = serde_json::from_str(json).unwrap();
        assert!(state.flags.free_analysis_used);
        assert_eq!(state.wallet, WalletState::default());
    }

    #[test]
    fn test_reset_keeps_paywall() {
        let mut state = ClientState::new(true);
        state.flags.free_analysis_used = true;
        state.wallet.balance = 3.0;
        state.reset();
        assert_eq!(state, ClientState::new(true));
    }
}
