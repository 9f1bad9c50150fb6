//! Request-scoped permission guard
//!
//! The guard resolves the principal, evaluates the permission through the
//! cache, applies the current enforcement mode and writes exactly one audit
//! entry per invocation (none when disabled).

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use axum::http::Request;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tracing::{debug, error, field, info, info_span, warn, Instrument, Span};
use warden_audit::{
    AuditDecision, AuditLogger, PermissionUsageRecord, SecurityEvent, SecurityEventType,
};
use warden_cache::PermissionCache;
use warden_permissions::{Decision, Permission};

use crate::error::{GuardError, Result};
use crate::mode::{EnforcementMode, EnforcementModeHandle};
use crate::principal::{Principal, PrincipalResolver, RequestContext};

/// Terminal state of one guard invocation
#[derive(Debug)]
pub enum GuardOutcome {
    /// The guard is disabled; nothing was resolved, evaluated or audited
    Bypassed,
    /// The request may proceed.
    ///
    /// In dry-run the decision may be a denial. `None` means evaluation failed
    /// in dry-run and the request was let through.
    Continue { decision: Option<Decision> },
    /// No principal could be resolved
    Unauthenticated,
    /// Enforced denial
    Forbidden(Decision),
    /// Evaluation could not complete under enforce
    Failed(GuardError),
}

impl GuardOutcome {
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            GuardOutcome::Unauthenticated | GuardOutcome::Forbidden(_) | GuardOutcome::Failed(_)
        )
    }

    pub fn decision(&self) -> Option<&Decision> {
        match self {
            GuardOutcome::Continue { decision } => decision.as_ref(),
            GuardOutcome::Forbidden(decision) => Some(decision),
            _ => None,
        }
    }

    /// `None` to continue, otherwise the rejection to send
    pub fn into_response(self) -> Option<Response> {
        match self {
            GuardOutcome::Bypassed | GuardOutcome::Continue { .. } => None,
            GuardOutcome::Unauthenticated => Some(GuardError::Unauthenticated.into_response()),
            GuardOutcome::Forbidden(decision) => Some(
                GuardError::Forbidden {
                    permission: decision.required_permission.to_string(),
                }
                .into_response(),
            ),
            GuardOutcome::Failed(err) => Some(err.into_response()),
        }
    }
}

/// Composes principal resolution, cached evaluation, enforcement mode and audit.
///
/// Cheap to clone; clones share the cache, audit queue and mode handle.
#[derive(Clone)]
pub struct Guard {
    mode: EnforcementModeHandle,
    resolver: Arc<dyn PrincipalResolver>,
    cache: PermissionCache,
    audit: AuditLogger,
}

impl Guard {
    pub fn new(
        mode: EnforcementModeHandle,
        resolver: Arc<dyn PrincipalResolver>,
        cache: PermissionCache,
        audit: AuditLogger,
    ) -> Self {
        Self {
            mode,
            resolver,
            cache,
            audit,
        }
    }

    pub fn mode(&self) -> &EnforcementModeHandle {
        &self.mode
    }

    pub fn cache(&self) -> &PermissionCache {
        &self.cache
    }

    pub fn audit(&self) -> &AuditLogger {
        &self.audit
    }

    /// Guard an HTTP request: `None` to continue, or the rejection response.
    ///
    /// Request metadata is copied out before the first await so the request
    /// body type does not need to be `Sync`.
    pub fn guard_permission<'a, B>(
        &'a self,
        permission: &'a str,
        request: &Request<B>,
    ) -> impl Future<Output = Option<Response>> + Send + 'a {
        let ctx = match self.mode.get() {
            EnforcementMode::Disabled => None,
            _ => Some(RequestContext::from_request(request)),
        };

        async move {
            let ctx = ctx?;
            self.guard(permission, &ctx).await.into_response()
        }
    }

    /// Run the guard against already-extracted request metadata
    pub async fn guard(&self, permission: &str, ctx: &RequestContext) -> GuardOutcome {
        let mode = self.mode.get();
        if mode == EnforcementMode::Disabled {
            return GuardOutcome::Bypassed;
        }

        let span = info_span!(
            "guard",
            request_id = %ctx.request_id,
            permission,
            mode = %mode,
            user = field::Empty,
        );
        self.run(mode, permission, ctx).instrument(span).await
    }

    /// Evaluate for a non-HTTP caller. Goes through the cache; not audited.
    pub async fn check_permission(&self, user_id: &str, permission: &str) -> Result<Decision> {
        let permission = Permission::parse(permission).map_err(GuardError::MalformedPermission)?;
        self.cache
            .check(user_id, &permission)
            .await
            .map_err(|e| GuardError::Evaluation(e.to_string()))
    }

    async fn run(
        &self,
        mode: EnforcementMode,
        permission: &str,
        ctx: &RequestContext,
    ) -> GuardOutcome {
        let started = Instant::now();

        let principal = match self.resolver.current_principal(ctx).await {
            Some(principal) => principal,
            None => {
                warn!(path = %ctx.path, ip = ?ctx.ip, "Rejected request without principal");
                self.audit.log_security_event(
                    SecurityEvent::new(SecurityEventType::UnauthorizedAccessAttempt)
                        .with_request(
                            ctx.ip.clone(),
                            ctx.user_agent.clone(),
                            Some(ctx.path.clone()),
                        )
                        .with_details(json!({
                            "request_id": ctx.request_id,
                            "permission": permission,
                        })),
                );
                return GuardOutcome::Unauthenticated;
            }
        };
        Span::current().record("user", principal.user_id.as_str());

        let evaluated = match Permission::parse(permission) {
            Ok(parsed) => self
                .cache
                .check(&principal.user_id, &parsed)
                .await
                .map_err(|e| GuardError::Evaluation(e.to_string())),
            Err(e) => Err(GuardError::MalformedPermission(e)),
        };
        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;

        match evaluated {
            Ok(decision) if !decision.allowed && mode == EnforcementMode::Enforce => {
                warn!(reason = %decision.reason, "Permission denied");
                self.audit.log_security_event(
                    SecurityEvent::new(SecurityEventType::InsufficientPermissions)
                        .with_user(principal.user_id.as_str())
                        .with_request(
                            principal.ip.clone().or_else(|| ctx.ip.clone()),
                            principal.user_agent.clone().or_else(|| ctx.user_agent.clone()),
                            Some(ctx.path.clone()),
                        )
                        .with_details(json!({
                            "request_id": ctx.request_id,
                            "permission": permission,
                            "reason": decision.reason.to_string(),
                            "latency_ms": latency_ms,
                        })),
                );
                GuardOutcome::Forbidden(decision)
            }
            Ok(decision) => {
                let audit_decision = if decision.allowed {
                    debug!(reason = %decision.reason, "Permission granted");
                    AuditDecision::Allowed
                } else {
                    info!(reason = %decision.reason, "Dry run: request would have been denied");
                    AuditDecision::Denied
                };
                self.record_usage(
                    mode,
                    ctx,
                    &principal,
                    permission,
                    audit_decision,
                    decision.reason.to_string(),
                    latency_ms,
                );
                GuardOutcome::Continue {
                    decision: Some(decision),
                }
            }
            Err(err) => {
                error!(error = %err, "Permission check failed");
                self.record_usage(
                    mode,
                    ctx,
                    &principal,
                    permission,
                    AuditDecision::Error,
                    err.to_string(),
                    latency_ms,
                );
                match mode {
                    EnforcementMode::Enforce => GuardOutcome::Failed(err),
                    _ => GuardOutcome::Continue { decision: None },
                }
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn record_usage(
        &self,
        mode: EnforcementMode,
        ctx: &RequestContext,
        principal: &Principal,
        permission: &str,
        decision: AuditDecision,
        reason: String,
        latency_ms: f64,
    ) {
        self.audit.log_permission_usage(
            PermissionUsageRecord::new(
                ctx.request_id.as_str(),
                principal.user_id.as_str(),
                permission,
                decision,
                reason,
                latency_ms,
            )
            .with_enforcement_mode(mode.as_str()),
        );
    }
}

impl std::fmt::Debug for Guard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Guard")
            .field("mode", &self.mode.get())
            .field("audit", &self.audit)
            .finish_non_exhaustive()
    }
}
