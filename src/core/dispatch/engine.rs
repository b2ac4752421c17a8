//! Dispatch engine
//!
//! Orchestrates one logical request through the state machine
//! `Routing -> Trying(deployment) -> {Succeeded | Trying(next) | Exhausted
//! | Fatal}`. Candidate attempts are strictly sequential: speculative
//! fan-out to several deployments would double-spend budget for the same
//! request. The provider call plus its ledger resolution runs in a spawned
//! task so caller cancellation can never strand a pending reservation.

use super::attempt::{AttemptOutcome, CallAttempt, DispatchOutcome, DispatchStatus};
use crate::audit::AuditSink;
use crate::core::credentials::CredentialStore;
use crate::core::ledger::{Ledger, LedgerKind, LimitScope, Reservation, ScopeClass};
use crate::core::models::{ChatRequest, DispatchResponse, Usage};
use crate::core::providers::{AdapterError, AdapterRegistry};
use crate::core::registry::{Deployment, DeploymentId, DeploymentRegistry};
use crate::core::router::Router;
use crate::utils::error::{GatewayError, Result};
use crate::utils::tokens;
use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// The dispatch orchestrator. One instance serves every concurrent
/// request; all shared components are owned here and passed by reference,
/// never looked up ambiently.
pub struct DispatchEngine {
    router: Arc<Router>,
    registry: Arc<DeploymentRegistry>,
    credentials: Arc<CredentialStore>,
    ledger: Arc<Ledger>,
    adapters: Arc<AdapterRegistry>,
    audit: Arc<dyn AuditSink>,
}

impl DispatchEngine {
    /// Wire up the engine over its collaborators.
    pub fn new(
        router: Arc<Router>,
        registry: Arc<DeploymentRegistry>,
        credentials: Arc<CredentialStore>,
        ledger: Arc<Ledger>,
        adapters: Arc<AdapterRegistry>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            router,
            registry,
            credentials,
            ledger,
            adapters,
            audit,
        }
    }

    /// Dispatch one logical request to completion.
    ///
    /// Returns the first successful response, or the terminal error after
    /// the candidate list (plus one re-route pass) is exhausted or a fatal
    /// error short-circuits. The outcome, attempts included, is emitted to
    /// the audit sink exactly once either way.
    pub async fn dispatch(&self, request: &ChatRequest) -> Result<DispatchResponse> {
        let started = Instant::now();
        let mut outcome = DispatchOutcome::start(request);

        let result = self.run(request, &mut outcome).await;

        outcome.total_latency_us = started.elapsed().as_micros() as u64;
        outcome.completed_at = Utc::now();
        match &result {
            Ok(response) => {
                outcome.status = DispatchStatus::Succeeded;
                outcome.winning_deployment = Some(response.deployment_id.clone());
            }
            Err(err) => {
                outcome.status = if matches!(err, GatewayError::DeploymentsExhausted { .. }) {
                    DispatchStatus::Exhausted
                } else {
                    DispatchStatus::Fatal
                };
                outcome.error = Some(err.to_string());
            }
        }
        self.audit.record(&outcome);

        result.map(|mut response| {
            response.latency = started.elapsed();
            response
        })
    }

    async fn run(
        &self,
        request: &ChatRequest,
        outcome: &mut DispatchOutcome,
    ) -> Result<DispatchResponse> {
        let mut tried: HashSet<DeploymentId> = HashSet::new();
        let mut candidates = self.router.route(&request.model, &tried)?;
        if candidates.is_empty() {
            return Err(GatewayError::NoAvailableDeployment(request.model.clone()));
        }

        // Pass 0 walks the initial candidate list; pass 1 is the single
        // re-route excluding everything already tried, which picks up
        // deployments the first routing pass could not offer.
        for pass in 0..2 {
            for deployment in &candidates {
                if tried.contains(&deployment.id) {
                    continue;
                }
                tried.insert(deployment.id.clone());

                match self.try_candidate(request, deployment, outcome).await {
                    Ok(response) => return Ok(response),
                    Err(err) if err.is_recoverable() => {
                        debug!(
                            deployment_id = %deployment.id,
                            error = %err,
                            "candidate failed recoverably, advancing"
                        );
                    }
                    Err(err) => return Err(err),
                }
            }

            if pass == 0 {
                candidates = self.router.route(&request.model, &tried)?;
                if candidates.is_empty() {
                    break;
                }
            }
        }

        Err(GatewayError::DeploymentsExhausted {
            model: request.model.clone(),
            attempts: outcome.attempts.len() as u32,
        })
    }

    /// One `Trying(deployment)` step: credential, reservations, call.
    async fn try_candidate(
        &self,
        request: &ChatRequest,
        deployment: &Arc<Deployment>,
        outcome: &mut DispatchOutcome,
    ) -> Result<DispatchResponse> {
        let attempt_started = Instant::now();

        let adapter = match self.adapters.get(deployment.provider) {
            Some(adapter) => adapter,
            None => {
                // Misconfiguration, not a transient failure.
                return Err(GatewayError::Config(format!(
                    "no adapter registered for provider {}",
                    deployment.provider
                )));
            }
        };

        // (a) Credential. Failure is retriable and does not touch the
        // deployment's health: it says nothing about the backend itself.
        let credential = match self.credentials.acquire(deployment.provider).await {
            Ok(credential) => credential,
            Err(err) => {
                outcome.attempts.push(CallAttempt {
                    deployment_id: deployment.id.clone(),
                    provider: deployment.provider,
                    outcome: AttemptOutcome::RetriableFailure,
                    latency_us: attempt_started.elapsed().as_micros() as u64,
                    error: Some(err.to_string()),
                    credential_expiry: None,
                });
                return Err(err);
            }
        };

        // (b) Reserve every configured ledger key for this call. Any
        // failure releases what was already reserved; recoverability is
        // decided by the exceeded limit's scope.
        let mut reservations: Vec<Reservation> = Vec::with_capacity(self.ledger.rules().len());
        for rule in self.ledger.rules() {
            let scope = match rule.scope {
                ScopeClass::PerApiKey => LimitScope::ApiKey(request.caller.api_key.clone()),
                ScopeClass::PerDeployment => LimitScope::Deployment(deployment.id.clone()),
            };
            let amount = reserve_amount(rule.kind, request, deployment);
            match self.ledger.reserve(rule, scope, amount) {
                Ok(reservation) => reservations.push(reservation),
                Err(err) => {
                    for mut held in reservations {
                        if let Err(rollback_err) = self.ledger.rollback(&mut held) {
                            warn!(error = %rollback_err, "rollback after failed reserve");
                        }
                    }
                    let attempt_outcome = if err.is_recoverable() {
                        AttemptOutcome::RetriableFailure
                    } else {
                        AttemptOutcome::FatalFailure
                    };
                    outcome.attempts.push(CallAttempt {
                        deployment_id: deployment.id.clone(),
                        provider: deployment.provider,
                        outcome: attempt_outcome,
                        latency_us: attempt_started.elapsed().as_micros() as u64,
                        error: Some(err.to_string()),
                        credential_expiry: credential.expires_at,
                    });
                    return Err(err);
                }
            }
        }

        // (c) The call itself, spawned so that dropping the dispatch
        // future (caller disconnect) lets the call finish or time out
        // normally and resolve its reservations either way.
        let call_result = {
            let ledger = self.ledger.clone();
            let deployment = deployment.clone();
            let request = request.clone();
            let credential = credential.clone();
            let timeout = Duration::from_secs(deployment.config.timeout_secs);

            tokio::spawn(async move {
                let result = adapter
                    .invoke(
                        &credential,
                        &deployment.endpoint,
                        &deployment.model,
                        &request,
                        timeout,
                    )
                    .await;

                match result {
                    Ok(response) => {
                        for mut reservation in reservations {
                            let actual = actual_amount(
                                reservation.key.kind,
                                response.usage,
                                reservation.amount,
                                deployment.config.cost_per_1k_tokens,
                            );
                            if let Err(err) = ledger.commit(&mut reservation, actual) {
                                warn!(error = %err, "ledger commit failed");
                            }
                        }
                        Ok(response)
                    }
                    Err(err) => {
                        for mut reservation in reservations {
                            if let Err(rollback_err) = ledger.rollback(&mut reservation) {
                                warn!(error = %rollback_err, "ledger rollback failed");
                            }
                        }
                        Err(err)
                    }
                }
            })
            .await
            .map_err(|err| GatewayError::Internal(format!("provider call task failed: {err}")))?
        };

        let latency_us = attempt_started.elapsed().as_micros() as u64;
        match call_result {
            Ok(response) => {
                self.registry.report_outcome(&deployment.id, true);
                outcome.attempts.push(CallAttempt {
                    deployment_id: deployment.id.clone(),
                    provider: deployment.provider,
                    outcome: AttemptOutcome::Success,
                    latency_us,
                    error: None,
                    credential_expiry: credential.expires_at,
                });
                Ok(DispatchResponse {
                    payload: response.payload,
                    usage: response.usage,
                    deployment_id: deployment.id.clone(),
                    latency: attempt_started.elapsed(),
                })
            }
            Err(adapter_err) => {
                let err = map_adapter_error(adapter_err);
                let attempt_outcome = if err.is_recoverable() {
                    // Transport, timeout, and 5xx-class failures count
                    // against the deployment's health. Fatal errors are
                    // the request's fault, not the backend's.
                    self.registry.report_outcome(&deployment.id, false);
                    AttemptOutcome::RetriableFailure
                } else {
                    AttemptOutcome::FatalFailure
                };
                outcome.attempts.push(CallAttempt {
                    deployment_id: deployment.id.clone(),
                    provider: deployment.provider,
                    outcome: attempt_outcome,
                    latency_us,
                    error: Some(err.to_string()),
                    credential_expiry: credential.expires_at,
                });
                Err(err)
            }
        }
    }
}

/// Pre-call reservation amount for one ledger kind.
fn reserve_amount(kind: LedgerKind, request: &ChatRequest, deployment: &Deployment) -> u64 {
    match kind {
        LedgerKind::Requests => 1,
        LedgerKind::Tokens => tokens::estimate_total_tokens(request),
        LedgerKind::Spend => {
            tokens::estimate_total_tokens(request) * deployment.config.cost_per_1k_tokens / 1000
        }
    }
}

/// Post-call committed amount: measured usage when available, otherwise
/// the pre-call estimate.
fn actual_amount(
    kind: LedgerKind,
    usage: Option<Usage>,
    estimate: u64,
    cost_per_1k_tokens: u64,
) -> u64 {
    match (kind, usage) {
        (LedgerKind::Requests, _) => 1,
        (LedgerKind::Tokens, Some(usage)) => usage.total_tokens,
        (LedgerKind::Spend, Some(usage)) => usage.total_tokens * cost_per_1k_tokens / 1000,
        // No usage in the response: commit at the estimate.
        (_, None) => estimate,
    }
}

/// Map an adapter error into the gateway taxonomy.
fn map_adapter_error(err: AdapterError) -> GatewayError {
    match err {
        AdapterError::Transport(message) => GatewayError::Transport(message),
        AdapterError::Timeout(duration) => GatewayError::Timeout(duration.as_secs()),
        AdapterError::Auth { status, message } => GatewayError::Provider {
            status,
            message,
            retriable: false,
        },
        AdapterError::Provider {
            status: 400,
            message,
            ..
        } => GatewayError::InvalidRequest {
            status: 400,
            message,
        },
        AdapterError::Provider {
            status,
            message,
            retriable,
        } => GatewayError::Provider {
            status,
            message,
            retriable,
        },
    }
}
