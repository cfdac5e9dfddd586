//! Fallback coordinator: ordered provider chain with circuit breaking.
//!
//! Providers are tried one at a time in the configured priority order. The
//! first to answer with a non-empty, well-formed result set serves the
//! keyword. Failures and empty answers move on to the next provider; the
//! order itself never changes during a run.
//!
//! # Pipeline
//!
//! 1. Skip providers whose circuit is open (recorded as `Skipped`)
//! 2. Sleep a jittered delay before every call except the first of the run
//! 3. Call the adapter, timing it
//! 4. Record the outcome in the attempt log and the circuit breaker
//! 5. Stop at the first non-empty result set

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::circuit_breaker::{CircuitBreaker, CircuitState};
use crate::config::SearchConfig;
use crate::error::{Result, SearchError};
use crate::provider::{adapter_for, SearchProvider};
use crate::types::{AttemptOutcome, Provider, ProviderAttempt, RawResult};

/// What the coordinator produced for one keyword.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchOutcome {
    /// Results from the serving provider, in its order. Empty only when
    /// every provider that answered had nothing for this keyword.
    pub results: Vec<RawResult>,
    /// The provider whose answer was used.
    pub provider_used: Provider,
    /// Whether `provider_used` is not the first provider in priority order.
    pub fallback_taken: bool,
    /// One entry per provider considered, in priority order.
    pub attempts: Vec<ProviderAttempt>,
}

impl SearchOutcome {
    /// True when no provider had results for the keyword.
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

/// Queries providers in priority order until one serves the keyword.
///
/// Holds the adapters, an immutable copy of the search configuration, and
/// the circuit breaker for this run. Calls are sequential; the breaker
/// mutex is never held across an await.
pub struct FallbackCoordinator {
    providers: Vec<Arc<dyn SearchProvider>>,
    config: SearchConfig,
    breaker: Mutex<CircuitBreaker>,
    called_before: AtomicBool,
}

impl FallbackCoordinator {
    /// Build a coordinator over the built-in adapters for
    /// `config.providers`.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Config`] if the configuration is invalid.
    pub fn new(config: SearchConfig) -> Result<Self> {
        let providers = config.providers.iter().map(|p| adapter_for(*p)).collect();
        Self::with_providers(config, providers)
    }

    /// Build a coordinator over explicit adapters, tried in the given order.
    ///
    /// `config.providers` is ignored for ordering; the rest of `config`
    /// (timeouts, delays, circuit settings) still applies.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Config`] if the configuration is invalid or
    /// `providers` is empty.
    pub fn with_providers(
        config: SearchConfig,
        providers: Vec<Arc<dyn SearchProvider>>,
    ) -> Result<Self> {
        config.validate()?;
        if providers.is_empty() {
            return Err(SearchError::Config(
                "at least one provider adapter is required".into(),
            ));
        }
        let breaker = Mutex::new(CircuitBreaker::from_config(&config));
        Ok(Self {
            providers,
            config,
            breaker,
            called_before: AtomicBool::new(false),
        })
    }

    /// The provider priority order this coordinator uses.
    pub fn priority(&self) -> Vec<Provider> {
        self.providers.iter().map(|p| p.provider()).collect()
    }

    /// The configuration this coordinator was built with.
    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Current circuit state of `provider`.
    pub fn circuit_state(&self, provider: Provider) -> CircuitState {
        self.lock_breaker().state(provider)
    }

    /// Search `keyword`, falling back through the provider chain.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::AllProvidersFailed`] with the full attempt log
    /// when every provider failed or was skipped.
    pub async fn search(&self, keyword: &str, top_n: usize) -> Result<SearchOutcome> {
        let first = self.providers[0].provider();
        let mut attempts = Vec::with_capacity(self.providers.len());
        let mut first_empty: Option<Provider> = None;

        for adapter in &self.providers {
            let provider = adapter.provider();

            let skip = {
                let mut breaker = self.lock_breaker();
                if breaker.should_attempt(provider) {
                    None
                } else {
                    Some(breaker.skip_reason(provider))
                }
            };
            if let Some(reason) = skip {
                tracing::info!(%provider, keyword, %reason, "skipping provider");
                attempts.push(ProviderAttempt {
                    provider,
                    outcome: AttemptOutcome::Skipped { reason },
                    elapsed_ms: 0,
                });
                continue;
            }

            self.pace().await;

            let started = Instant::now();
            let result = adapter.fetch(keyword, top_n, &self.config).await;
            let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

            match result {
                Ok(results) if !results.is_empty() => {
                    self.lock_breaker().record_success(provider);
                    tracing::debug!(%provider, keyword, count = results.len(), elapsed_ms, "provider served query");
                    attempts.push(ProviderAttempt {
                        provider,
                        outcome: AttemptOutcome::Served {
                            results: results.len(),
                        },
                        elapsed_ms,
                    });
                    return Ok(SearchOutcome {
                        results,
                        provider_used: provider,
                        fallback_taken: provider != first,
                        attempts,
                    });
                }
                Ok(_) => {
                    self.lock_breaker().record_success(provider);
                    tracing::info!(%provider, keyword, "provider returned no results, falling back");
                    first_empty.get_or_insert(provider);
                    attempts.push(ProviderAttempt {
                        provider,
                        outcome: AttemptOutcome::Empty,
                        elapsed_ms,
                    });
                }
                Err(err) => {
                    self.lock_breaker().record_failure(provider);
                    tracing::warn!(%provider, keyword, error = %err, "provider failed, falling back");
                    attempts.push(ProviderAttempt {
                        provider,
                        outcome: AttemptOutcome::Failed {
                            kind: err.kind,
                            message: err.message,
                        },
                        elapsed_ms,
                    });
                }
            }
        }

        match first_empty {
            Some(provider) => {
                tracing::warn!(keyword, "no provider had results");
                Ok(SearchOutcome {
                    results: Vec::new(),
                    provider_used: provider,
                    fallback_taken: provider != first,
                    attempts,
                })
            }
            None => Err(SearchError::AllProvidersFailed(attempts)),
        }
    }

    /// Sleep the configured jittered delay, except before the first call.
    async fn pace(&self) {
        if !self.called_before.swap(true, Ordering::SeqCst) {
            return;
        }
        let (min, max) = self.config.request_delay_ms;
        if max == 0 {
            return;
        }
        let delay = rand::thread_rng().gen_range(min..=max);
        tracing::trace!(delay_ms = delay, "pacing before provider call");
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }

    fn lock_breaker(&self) -> MutexGuard<'_, CircuitBreaker> {
        // Breaker updates are single assignments, so a poisoned lock still
        // holds consistent state.
        self.breaker.lock().unwrap_or_else(|e| e.into_inner())
    }
}
