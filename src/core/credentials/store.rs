//! Credential store with single-flight refresh
//!
//! One store serves every dispatch task. Reads go through an
//! [`ArcSwapOption`] so the hot path never takes a lock; refresh for a
//! given provider is serialized behind a per-provider async mutex, and
//! every waiter that queued behind an in-flight refresh re-checks the
//! cache after acquiring the lock instead of issuing its own refresh.
//! Providers rate-limit (and can revoke tokens on) concurrent refreshes,
//! so exactly one in-flight refresh per provider is a hard requirement.

use super::source::CredentialSource;
use super::types::{Credential, ProviderKind};
use crate::utils::error::{GatewayError, Result};
use arc_swap::ArcSwapOption;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Default validity margin: a returned credential is good for at least
/// this long from "now".
pub const DEFAULT_SAFETY_MARGIN: Duration = Duration::from_secs(30);

/// Default bound on how long an `acquire` will wait on a refresh.
pub const DEFAULT_REFRESH_TIMEOUT: Duration = Duration::from_secs(30);

struct ProviderEntry {
    source: Arc<dyn CredentialSource>,
    cached: ArcSwapOption<Credential>,
    refresh_lock: Mutex<()>,
}

/// Per-provider cache of OAuth credentials with refresh capability.
pub struct CredentialStore {
    entries: HashMap<ProviderKind, ProviderEntry>,
    safety_margin: Duration,
    refresh_timeout: Duration,
}

impl CredentialStore {
    /// Create a store over the given sources.
    pub fn new(sources: HashMap<ProviderKind, Arc<dyn CredentialSource>>) -> Self {
        Self::with_margins(sources, DEFAULT_SAFETY_MARGIN, DEFAULT_REFRESH_TIMEOUT)
    }

    /// Create a store with explicit safety margin and refresh timeout.
    pub fn with_margins(
        sources: HashMap<ProviderKind, Arc<dyn CredentialSource>>,
        safety_margin: Duration,
        refresh_timeout: Duration,
    ) -> Self {
        let entries = sources
            .into_iter()
            .map(|(kind, source)| {
                (
                    kind,
                    ProviderEntry {
                        source,
                        cached: ArcSwapOption::empty(),
                        refresh_lock: Mutex::new(()),
                    },
                )
            })
            .collect();

        Self {
            entries,
            safety_margin,
            refresh_timeout,
        }
    }

    /// Acquire a credential valid for at least the safety margin from now.
    ///
    /// The returned `Arc<Credential>` is a snapshot for exactly one
    /// provider call; retries must re-acquire.
    pub async fn acquire(&self, kind: ProviderKind) -> Result<Arc<Credential>> {
        let entry = self.entries.get(&kind).ok_or_else(|| {
            GatewayError::CredentialUnavailable {
                provider: kind.to_string(),
                message: "no credential source configured".to_string(),
            }
        })?;

        // Fast path: cached credential still comfortably valid.
        if let Some(cached) = entry.cached.load_full() {
            if cached.valid_for(self.safety_margin) {
                return Ok(cached);
            }
        }

        // Slow path: serialize refresh per provider. Whoever queued behind
        // an in-flight refresh finds a fresh credential on the re-check.
        let _guard = entry.refresh_lock.lock().await;

        if let Some(cached) = entry.cached.load_full() {
            if cached.valid_for(self.safety_margin) {
                debug!(provider = %kind, "credential refreshed by concurrent caller");
                return Ok(cached);
            }
        }

        // The CLI may have re-logged-in behind our back; always re-read the
        // cache before deciding a refresh is needed.
        let loaded = entry.source.load_cached().await?;
        let stale = match loaded {
            Some(cred) if cred.valid_for(self.safety_margin) => {
                let cred = Arc::new(cred);
                entry.cached.store(Some(cred.clone()));
                return Ok(cred);
            }
            Some(cred) => cred,
            None => {
                return Err(GatewayError::CredentialUnavailable {
                    provider: kind.to_string(),
                    message: "no cached credential and no automatic login flow configured"
                        .to_string(),
                });
            }
        };

        info!(provider = %kind, "credential expired or inside safety margin, refreshing");

        let refreshed =
            match tokio::time::timeout(self.refresh_timeout, entry.source.refresh(&stale)).await {
                Ok(result) => result?,
                Err(_) => {
                    warn!(provider = %kind, timeout = ?self.refresh_timeout, "credential refresh timed out");
                    return Err(GatewayError::CredentialRefreshFailed {
                        provider: kind.to_string(),
                        message: format!(
                            "refresh did not complete within {} seconds",
                            self.refresh_timeout.as_secs()
                        ),
                    });
                }
            };

        let refreshed = Arc::new(refreshed);
        // Atomic replacement: stale Arcs held by in-flight calls stay alive
        // until those calls finish, but every new acquire sees the fresh one.
        entry.cached.store(Some(refreshed.clone()));
        Ok(refreshed)
    }

    /// Drop any cached credential for a provider, forcing the next
    /// `acquire` back through the source.
    pub fn invalidate(&self, kind: ProviderKind) {
        if let Some(entry) = self.entries.get(&kind) {
            entry.cached.store(None);
        }
    }
}
