//! Access gating for analysis requests
//!
//! Whether an analysis may run depends on two persisted flags and on two
//! independent capabilities: an identity provider and a billing provider.
//! Both are injected as traits so the gate can be driven by real SDK
//! adapters, local stand-ins, or test fakes.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GateError {
    #[error("Sign-in required")]
    SignInRequired,

    #[error("Insufficient balance: have {balance:.2}, need {cost:.2}")]
    InsufficientBalance { balance: f64, cost: f64 },

    #[error("Provider error: {0}")]
    Provider(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub name: Option<String>,
    pub email: Option<String>,
}

/// Identity capability
pub trait AuthProvider {
    fn is_authenticated(&self) -> bool;
    fn user(&self) -> Option<UserProfile>;
    fn sign_in(&mut self) -> Result<UserProfile, GateError>;
    fn sign_out(&mut self);
}

/// Micropayment capability
pub trait BillingProvider {
    fn is_authenticated(&self) -> bool;
    fn balance(&self) -> f64;
    /// Deduct `amount`, returning the new balance
    fn deduct(&mut self, amount: f64) -> Result<f64, GateError>;
    /// Link the user can follow to top up `amount`
    fn create_payment_link(&self, amount: f64) -> Result<String, GateError>;
}

/// Persisted client flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GateFlags {
    #[serde(default)]
    pub free_analysis_used: bool,
    #[serde(default)]
    pub paywall_enabled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AccessDecision {
    /// Consumes the one free analysis (or paywall is off)
    FreeTier,
    /// Charged `cost` against the billing provider
    Paid { cost: f64 },
    SignInRequired,
    InsufficientBalance { balance: f64, cost: f64 },
}

impl AccessDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, AccessDecision::FreeTier | AccessDecision::Paid { .. })
    }
}

pub struct AccessGate<A, B> {
    auth: A,
    billing: B,
    cost: f64,
}

impl<A: AuthProvider, B: BillingProvider> AccessGate<A, B> {
    pub fn new(auth: A, billing: B, cost: f64) -> Self {
        Self { auth, billing, cost }
    }

    pub fn auth(&self) -> &A {
        &self.auth
    }

    pub fn auth_mut(&mut self) -> &mut A {
        &mut self.auth
    }

    pub fn billing(&self) -> &B {
        &self.billing
    }

    pub fn billing_mut(&mut self) -> &mut B {
        &mut self.billing
    }

    pub fn cost(&self) -> f64 {
        self.cost
    }

    pub fn into_parts(self) -> (A, B) {
        (self.auth, self.billing)
    }

    /// Decide whether the next analysis may run
    ///
    /// With the paywall off every analysis is free. Otherwise the first
    /// analysis is free, and later ones need a signed-in user with enough
    /// balance.
    pub fn decide(&self, flags: &GateFlags) -> AccessDecision {
        if !flags.paywall_enabled || !flags.free_analysis_used {
            return AccessDecision::FreeTier;
        }
        if !self.auth.is_authenticated() || !self.billing.is_authenticated() {
            return AccessDecision::SignInRequired;
        }
        let balance = self.billing.balance();
        if balance < self.cost {
            return AccessDecision::InsufficientBalance {
                balance,
                cost: self.cost,
            };
        }
        AccessDecision::Paid { cost: self.cost }
    }

    /// Apply a decision after the analysis succeeded
    pub fn commit(
        &mut self,
        decision: AccessDecision,
        flags: &mut GateFlags,
    ) -> Result<(), GateError> {
        match decision {
            AccessDecision::FreeTier => {
                if flags.paywall_enabled && !flags.free_analysis_used {
                    tracing::info!("Free analysis consumed");
                }
                flags.free_analysis_used = true;
                Ok(())
            }
            AccessDecision::Paid { cost } => {
                let remaining = self.billing.deduct(cost)?;
                tracing::info!(cost, remaining, "Analysis charged");
                Ok(())
            }
            AccessDecision::SignInRequired => Err(GateError::SignInRequired),
            AccessDecision::InsufficientBalance { balance, cost } => {
                Err(GateError::InsufficientBalance { balance, cost })
            }
        }
    }
}
