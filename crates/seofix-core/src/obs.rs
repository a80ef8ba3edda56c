//! Structured observability hooks for the fix pipeline.
//!
//! This module provides:
//! - A fix-scoped tracing span, `fix_span`
//! - Emission functions for lifecycle events: access, safety, execution, billing
//!
//! Events are emitted at `info!` level, failures at `warn!`, and unconfirmed
//! rollbacks at `error!`. Filter with `RUST_LOG`.

use tracing::{error, info, warn};

/// Span covering one fix attempt. Attach it with `Instrument` so it follows
/// the future across awaits.
///
/// ```ignore
/// orchestrate().instrument(obs::fix_span("fix-1", "tenant_a", "/menu")).await
/// ```
pub fn fix_span(fix_id: &str, tenant_id: &str, page_url: &str) -> tracing::Span {
    tracing::info_span!(
        "seofix.fix",
        fix_id = %fix_id,
        tenant_id = %tenant_id,
        page_url = %page_url,
    )
}

pub fn emit_fix_started(tenant_id: &str, issue_type: &str, page_url: &str) {
    info!(
        event = "fix.started",
        tenant_id = %tenant_id,
        issue_type = %issue_type,
        page_url = %page_url,
    );
}

pub fn emit_fix_finished(tenant_id: &str, success: bool, kind: Option<&str>, duration_ms: u64) {
    info!(
        event = "fix.finished",
        tenant_id = %tenant_id,
        success = success,
        kind = kind.unwrap_or("none"),
        duration_ms = duration_ms,
    );
}

pub fn emit_access_denied(tenant_id: &str, operation: &str, reason: &str) {
    info!(
        event = "tenant.access_denied",
        tenant_id = %tenant_id,
        operation = %operation,
        reason = %reason,
    );
}

/// Emit event: a usage record was written. `remaining` is the quota after
/// spending, or `"n/a"` for unmetered operations.
pub fn emit_usage_recorded(tenant_id: &str, operation: &str, cost: f64, remaining: &str) {
    info!(
        event = "tenant.usage_recorded",
        tenant_id = %tenant_id,
        operation = %operation,
        cost = cost,
        remaining = %remaining,
    );
}

pub fn emit_safety_evaluated(page_url: &str, is_safe: bool, confidence: f64, validators: usize) {
    info!(
        event = "safety.evaluated",
        page_url = %page_url,
        is_safe = is_safe,
        confidence = confidence,
        validators = validators,
    );
}

/// Emit event: a validator errored, panicked or timed out and was counted unsafe.
pub fn emit_validator_failed(validator: &str, error: &dyn std::fmt::Display) {
    warn!(event = "safety.validator_failed", validator = %validator, error = %error);
}

pub fn emit_state_transition(checkpoint_id: &str, from: &str, to: &str) {
    info!(
        event = "execution.transition",
        checkpoint_id = %checkpoint_id,
        from = %from,
        to = %to,
    );
}

pub fn emit_rollback(checkpoint_id: &str, reason: &str) {
    warn!(event = "execution.rolled_back", checkpoint_id = %checkpoint_id, reason = %reason);
}

/// Emit event: a rollback could not be confirmed. Needs a human.
pub fn emit_rollback_failed(checkpoint_id: &str, page_url: &str, error: &dyn std::fmt::Display) {
    error!(
        event = "execution.rollback_failed",
        checkpoint_id = %checkpoint_id,
        page_url = %page_url,
        error = %error,
    );
}
