//! Local auth and billing providers for the CLI

use fengshui_core::gating::UserProfile;
use fengshui_core::{AuthProvider, BillingProvider, GateError};
use tracing::info;

use crate::state::WalletState;

/// Environment variable holding the API token
pub const AUTH_TOKEN_ENV: &str = "FENGSHUI_AUTH_TOKEN";

/// Identity backed by a bearer token from the environment
#[derive(Debug, Clone, Default)]
pub struct TokenAuth {
    token: Option<String>,
    user: Option<UserProfile>,
}

impl TokenAuth {
    pub fn new(token: Option<String>) -> Self {
        let mut auth = Self {
            token: token.filter(|t| !t.is_empty()),
            user: None,
        };
        auth.user = auth.token.as_deref().map(profile_for);
        auth
    }

    pub fn from_env() -> Self {
        Self::new(std::env::var(AUTH_TOKEN_ENV).ok())
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }
}

fn profile_for(token: &str) -> UserProfile {
    UserProfile {
        id: format!("token-{}", token.chars().take(8).collect::<String>()),
        name: None,
        email: None,
    }
}

impl AuthProvider for TokenAuth {
    fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }

    fn user(&self) -> Option<UserProfile> {
        self.user.clone()
    }

    fn sign_in(&mut self) -> Result<UserProfile, GateError> {
        let token = self
            .token
            .as_deref()
            .ok_or_else(|| GateError::Provider(format!("{} is not set", AUTH_TOKEN_ENV)))?;
        let user = profile_for(token);
        self.user = Some(user.clone());
        info!(user = %user.id, "Signed in");
        Ok(user)
    }

    fn sign_out(&mut self) {
        self.user = None;
    }
}

/// Wallet kept in the client state file
#[derive(Debug, Clone)]
pub struct LocalWallet {
    state: WalletState,
    payment_url: String,
}

impl LocalWallet {
    pub fn new(state: WalletState, payment_url: impl Into<String>) -> Self {
        Self {
            state,
            payment_url: payment_url.into(),
        }
    }

    pub fn into_state(self) -> WalletState {
        self.state
    }
}

impl BillingProvider for LocalWallet {
    fn is_authenticated(&self) -> bool {
        self.state.connected
    }

    fn balance(&self) -> f64 {
        self.state.balance
    }

    fn deduct(&mut self, amount: f64) -> Result<f64, GateError> {
        if !self.state.connected {
            return Err(GateError::SignInRequired);
        }
        if amount > self.state.balance {
            return Err(GateError::InsufficientBalance {
                balance: self.state.balance,
                cost: amount,
            });
        }
        self.state.balance -= amount;
        Ok(self.state.balance)
    }

    fn create_payment_link(&self, amount: f64) -> Result<String, GateError> {
        if self.payment_url.is_empty() {
            return Err(GateError::Provider("No payment URL configured".to_string()));
        }
        let sep = if self.payment_url.contains('?') { '&' } else { '?' };
        Ok(format!("{}{}amount={:.2}", self.payment_url, sep, amount))
    }
}
