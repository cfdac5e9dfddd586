//! Per-provider health tracking.
//!
//! A provider that fails `failure_threshold` times in a row is skipped for
//! `cooldown` before a single trial call is let through again. Over a long
//! keyword list this stops a blocked scraper from burning its timeout on
//! every keyword.
//!
//! # State Machine
//!
//! ```text
//! ┌────────┐  N failures   ┌────────┐  cooldown   ┌──────────┐
//! │ Closed ├──────────────►│  Open  ├────────────►│ HalfOpen │
//! └───▲────┘               └───▲────┘             └────┬─────┘
//!     │                        │      failure          │
//!     │                        └───────────────────────┤
//!     │                   success                      │
//!     └────────────────────────────────────────────────┘
//! ```
//!
//! The breaker is owned by one [`crate::FallbackCoordinator`]; there is no
//! process-wide instance.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::config::SearchConfig;
use crate::types::Provider;

/// Circuit state for a single provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Healthy; calls go through.
    Closed,
    /// Too many consecutive failures; calls are skipped until cooldown expires.
    Open,
    /// Cooldown elapsed; the next call is a trial.
    HalfOpen,
}

#[derive(Debug, Clone)]
struct ProviderHealth {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

impl Default for ProviderHealth {
    fn default() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            opened_at: None,
        }
    }
}

/// Health tracker keyed by [`Provider`].
#[derive(Debug)]
pub struct CircuitBreaker {
    failure_threshold: u32,
    cooldown: Duration,
    providers: HashMap<Provider, ProviderHealth>,
}

impl CircuitBreaker {
    /// Create a breaker that opens after `failure_threshold` consecutive
    /// failures and stays open for `cooldown`.
    pub fn new(failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            failure_threshold: failure_threshold.max(1),
            cooldown,
            providers: HashMap::new(),
        }
    }

    /// Create a breaker from the circuit settings in `config`.
    pub fn from_config(config: &SearchConfig) -> Self {
        Self::new(
            config.circuit_failure_threshold,
            Duration::from_secs(config.circuit_cooldown_secs),
        )
    }

    /// Record a successful call. Closes the circuit.
    pub fn record_success(&mut self, provider: Provider) {
        let health = self.providers.entry(provider).or_default();
        if health.state != CircuitState::Closed {
            tracing::info!(%provider, "provider recovered, circuit closed");
        }
        *health = ProviderHealth::default();
    }

    /// Record a failed call. Opens the circuit at the threshold, or
    /// immediately when a half-open trial fails.
    pub fn record_failure(&mut self, provider: Provider) {
        let threshold = self.failure_threshold;
        let health = self.providers.entry(provider).or_default();
        health.consecutive_failures = health.consecutive_failures.saturating_add(1);

        let trip = health.state == CircuitState::HalfOpen || health.consecutive_failures >= threshold;
        if trip && health.state != CircuitState::Open {
            tracing::warn!(
                %provider,
                failures = health.consecutive_failures,
                "provider circuit opened"
            );
            health.state = CircuitState::Open;
        }
        if trip {
            health.opened_at = Some(Instant::now());
        }
    }

    /// Whether `provider` should be called now.
    ///
    /// An open circuit whose cooldown has elapsed moves to half-open and
    /// allows the call.
    pub fn should_attempt(&mut self, provider: Provider) -> bool {
        let cooldown = self.cooldown;
        let health = self.providers.entry(provider).or_default();
        match health.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let elapsed = health.opened_at.is_none_or(|t| t.elapsed() >= cooldown);
                if elapsed {
                    tracing::debug!(%provider, "cooldown elapsed, trying provider again");
                    health.state = CircuitState::HalfOpen;
                }
                elapsed
            }
        }
    }

    /// Human-readable reason a provider is being skipped.
    pub fn skip_reason(&self, provider: Provider) -> String {
        let failures = self
            .providers
            .get(&provider)
            .map_or(0, |h| h.consecutive_failures);
        format!(
            "circuit open after {failures} consecutive failures (cooldown {}s)",
            self.cooldown.as_secs()
        )
    }

    /// Current state for `provider`. Unseen providers are closed.
    pub fn state(&self, provider: Provider) -> CircuitState {
        self.providers
            .get(&provider)
            .map_or(CircuitState::Closed, |h| h.state)
    }

    /// Consecutive failures recorded for `provider`.
    pub fn consecutive_failures(&self, provider: Provider) -> u32 {
        self.providers
            .get(&provider)
            .map_or(0, |h| h.consecutive_failures)
    }
}
