//! Fix orchestrator: the single entry point that applies one fix to one page.
//!
//! ```text
//! reserve(fix) -> resolve strategy -> lock page -> safety chain
//!     -> plan -> execution monitor -> bill -> unlock
//! ```
//!
//! Only an unconfirmed rollback, or a tenant store that cannot be reached,
//! is returned as `Err`. Every other outcome is a `FixResult`.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::OwnedMutexGuard;
use tracing::{error, Instrument};
use uuid::Uuid;

use seofix_state::{Quota, TenantId};

use crate::cms::{page_path, CmsError, CmsProvider};
use crate::config::{SeofixConfig, UsagePolicy};
use crate::domain::{AppliedChange, SeofixError};
use crate::generator::ContentGenerator;
use crate::metrics::Metrics;
use crate::monitor::{CheckpointStore, ExecutionMonitor, ExecutionState, MonitorError, RollbackCause};
use crate::obs;
use crate::safety::{SafetyReport, SafetyValidatorChain};
use crate::strategy::{Customizations, FixPlan, FixStrategy, PlanContext, StrategyError};
use crate::tenant::{Operation, TenantRegistry};

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Why a fix did not succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixErrorKind {
    AccessDenied,
    SafetyBlocked,
    StrategyNotFound,
    /// A change could not be applied; the page was rolled back.
    ExecutionFailure,
    /// The changed page failed post-change validation; the page was rolled back.
    ValidationFailure,
    /// The plan could not be built or was stale. Nothing was written.
    PlanFailure,
}

impl FixErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AccessDenied => "access_denied",
            Self::SafetyBlocked => "safety_blocked",
            Self::StrategyNotFound => "strategy_not_found",
            Self::ExecutionFailure => "execution_failure",
            Self::ValidationFailure => "validation_failure",
            Self::PlanFailure => "plan_failure",
        }
    }
}

impl fmt::Display for FixErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one `apply_fix` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixResult {
    pub fix_id: String,
    pub success: bool,
    pub kind: Option<FixErrorKind>,
    pub message: String,
    pub applied_changes: Vec<AppliedChange>,
    pub safety_report: Option<SafetyReport>,
    pub rollback_performed: bool,
    pub checkpoint_id: Option<String>,
    /// Execution states entered, when the monitor ran.
    pub transitions: Vec<ExecutionState>,
    /// Fix quota left after an access denial.
    pub remaining_quota: Option<Quota>,
}

impl FixResult {
    fn failed(fix_id: &str, kind: FixErrorKind, message: impl Into<String>) -> Self {
        Self {
            fix_id: fix_id.to_string(),
            success: false,
            kind: Some(kind),
            message: message.into(),
            applied_changes: Vec::new(),
            safety_report: None,
            rollback_performed: false,
            checkpoint_id: None,
            transitions: Vec::new(),
            remaining_quota: None,
        }
    }

    fn succeeded(fix_id: &str, message: impl Into<String>) -> Self {
        Self {
            success: true,
            kind: None,
            ..Self::failed(fix_id, FixErrorKind::PlanFailure, message)
        }
    }

    fn with_safety(mut self, report: SafetyReport) -> Self {
        self.safety_report = Some(report);
        self
    }

    /// True when changes were committed to the CMS.
    pub fn committed(&self) -> bool {
        self.success && self.checkpoint_id.is_some()
    }
}

/// Outcomes that need a human.
#[derive(Debug, thiserror::Error)]
pub enum FatalError {
    #[error("fix {fix_id}: rollback of checkpoint {checkpoint_id} for {page_url} could not be confirmed: {detail}")]
    RollbackFailed {
        fix_id: String,
        checkpoint_id: String,
        page_url: String,
        detail: String,
        cause: RollbackCause,
        applied_changes: Vec<AppliedChange>,
    },

    #[error("tenant registry failed: {0}")]
    Registry(#[from] SeofixError),
}

/// Errors from a dry-run `preview`.
#[derive(Debug, thiserror::Error)]
pub enum PreviewError {
    #[error(transparent)]
    Tenant(#[from] SeofixError),

    #[error(transparent)]
    Strategy(#[from] StrategyError),

    #[error("cms unavailable: {0}")]
    Cms(#[from] CmsError),
}

/// What `apply_fix` would do, without writing or billing.
#[derive(Debug, Clone, Serialize)]
pub struct FixPreview {
    pub strategy: FixStrategy,
    pub safety_report: SafetyReport,
    /// Present only when the page is safe to change.
    pub plan: Option<FixPlan>,
}

// ---------------------------------------------------------------------------
// Context
// ---------------------------------------------------------------------------

/// Everything a fix needs, built once at process start.
pub struct FixContext {
    pub registry: Arc<TenantRegistry>,
    pub cms: Arc<dyn CmsProvider>,
    pub generator: Arc<dyn ContentGenerator>,
    pub safety: SafetyValidatorChain,
    pub monitor: ExecutionMonitor,
    pub config: SeofixConfig,
}

impl FixContext {
    /// Context with the standard validator chain and a fresh checkpoint store.
    pub fn new(
        registry: Arc<TenantRegistry>,
        cms: Arc<dyn CmsProvider>,
        generator: Arc<dyn ContentGenerator>,
        config: SeofixConfig,
    ) -> Self {
        Self {
            registry,
            cms,
            generator,
            safety: SafetyValidatorChain::standard(&config),
            monitor: ExecutionMonitor::new(config.cms_timeout())
                .with_page_budget(config.page_weight_budget_bytes),
            config,
        }
    }

    pub fn with_safety_chain(mut self, safety: SafetyValidatorChain) -> Self {
        self.safety = safety;
        self
    }

    pub fn with_monitor(mut self, monitor: ExecutionMonitor) -> Self {
        self.monitor = monitor;
        self
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

type PageKey = (TenantId, String);

pub struct FixOrchestrator {
    ctx: FixContext,
    page_locks: Mutex<HashMap<PageKey, Arc<tokio::sync::Mutex<()>>>>,
    metrics: Metrics,
}

impl FixOrchestrator {
    pub fn new(ctx: FixContext) -> Self {
        Self {
            ctx,
            page_locks: Mutex::new(HashMap::new()),
            metrics: Metrics::new(),
        }
    }

    pub fn context(&self) -> &FixContext {
        &self.ctx
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn checkpoints(&self) -> &Arc<CheckpointStore> {
        self.ctx.monitor.checkpoints()
    }

    /// Serialises fixes on one page. Waits rather than rejecting.
    async fn lock_page(&self, tenant_id: &TenantId, page_url: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.page_locks.lock().unwrap_or_else(|e| e.into_inner());
            let key = (tenant_id.clone(), page_path(page_url));
            Arc::clone(locks.entry(key).or_default())
        };
        lock.lock_owned().await
    }

    /// Apply the fix for `issue_type` to `page_url` on behalf of `tenant_id`.
    pub async fn apply_fix(
        &self,
        tenant_id: &TenantId,
        issue_type: &str,
        page_url: &str,
        customizations: Option<Customizations>,
    ) -> Result<FixResult, FatalError> {
        let fix_id = format!("fix_{}", Uuid::new_v4().simple());
        let span = obs::fix_span(&fix_id, tenant_id.as_str(), page_url);
        self.run(&fix_id, tenant_id, issue_type, page_url, customizations.unwrap_or_default())
            .instrument(span)
            .await
    }

    async fn run(
        &self,
        fix_id: &str,
        tenant_id: &TenantId,
        issue_type: &str,
        page_url: &str,
        customizations: Customizations,
    ) -> Result<FixResult, FatalError> {
        let started = Instant::now();
        self.metrics.inc_attempted();
        obs::emit_fix_started(tenant_id.as_str(), issue_type, page_url);

        let decision = self.ctx.registry.reserve(tenant_id, Operation::Fix).await?;
        if !decision.allowed {
            self.metrics.inc_denied();
            let mut result = FixResult::failed(
                fix_id,
                FixErrorKind::AccessDenied,
                decision.reason.unwrap_or_else(|| "access denied".to_string()),
            );
            result.remaining_quota = decision.remaining_quota;
            self.finished(tenant_id, &result, started);
            return Ok(result);
        }

        let (outcome, page_guard) = match FixStrategy::resolve(issue_type) {
            Err(e) => {
                self.metrics.inc_blocked();
                let result = FixResult::failed(fix_id, FixErrorKind::StrategyNotFound, e.to_string());
                (Ok(result), None)
            }
            Ok(strategy) => {
                let guard = self.lock_page(tenant_id, page_url).await;
                let outcome = self
                    .locked(fix_id, tenant_id, strategy, page_url, &customizations)
                    .await;
                (outcome, Some(guard))
            }
        };

        self.bill(fix_id, tenant_id, issue_type, page_url, &outcome).await;
        drop(page_guard);

        match &outcome {
            Ok(result) => self.finished(tenant_id, result, started),
            Err(e) => {
                self.metrics.inc_fatal();
                error!(event = "fix.fatal", fix_id = %fix_id, error = %e);
            }
        }
        outcome
    }

    /// Steps that run while the page lock is held.
    async fn locked(
        &self,
        fix_id: &str,
        tenant_id: &TenantId,
        strategy: FixStrategy,
        page_url: &str,
        customizations: &Customizations,
    ) -> Result<FixResult, FatalError> {
        let tenant = self.ctx.registry.resolve(tenant_id).await?;
        let cms = match self.ctx.cms.sink_for(&tenant).await {
            Ok(cms) => cms,
            Err(e) => {
                return Ok(FixResult::failed(
                    fix_id,
                    FixErrorKind::PlanFailure,
                    format!("no cms for tenant: {e}"),
                ))
            }
        };

        let report = self
            .ctx
            .safety
            .run(tenant_id, Arc::clone(&cms), page_url, strategy.issue_type())
            .await;
        if !report.is_safe {
            self.metrics.inc_blocked();
            let reason = report
                .reason
                .clone()
                .unwrap_or_else(|| "page failed safety validation".to_string());
            return Ok(FixResult::failed(fix_id, FixErrorKind::SafetyBlocked, reason).with_safety(report));
        }

        let plan_ctx = PlanContext {
            cms: cms.as_ref(),
            generator: self.ctx.generator.as_ref(),
            config: &self.ctx.config,
        };
        let plan = match strategy.generate_fix_plan(&plan_ctx, page_url, customizations).await {
            Ok(plan) => plan,
            Err(e) => {
                return Ok(FixResult::failed(fix_id, FixErrorKind::PlanFailure, e.to_string())
                    .with_safety(report))
            }
        };
        if plan.is_empty() {
            let message = format!("page already satisfies {strategy}; nothing to change");
            return Ok(FixResult::succeeded(fix_id, message).with_safety(report));
        }

        match self.ctx.monitor.run(tenant_id, cms.as_ref(), plan).await {
            Ok(exec) if exec.committed() => {
                self.metrics.inc_committed();
                let mut result = FixResult::succeeded(
                    fix_id,
                    format!("{} change(s) committed", exec.applied_changes.len()),
                );
                result.applied_changes = exec.applied_changes;
                result.checkpoint_id = Some(exec.checkpoint_id);
                result.transitions = exec.transitions;
                Ok(result.with_safety(report))
            }
            Ok(exec) => {
                self.metrics.inc_rolled_back();
                let (kind, message) = match &exec.rollback_cause {
                    Some(cause @ RollbackCause::ApplyFailed(_)) => {
                        (FixErrorKind::ExecutionFailure, cause.to_string())
                    }
                    Some(cause) => (FixErrorKind::ValidationFailure, cause.to_string()),
                    None => (FixErrorKind::ExecutionFailure, "rolled back".to_string()),
                };
                let mut result = FixResult::failed(fix_id, kind, message);
                result.applied_changes = exec.applied_changes;
                result.rollback_performed = exec.rollback_performed;
                result.checkpoint_id = Some(exec.checkpoint_id);
                result.transitions = exec.transitions;
                Ok(result.with_safety(report))
            }
            Err(MonitorError::RollbackFailed {
                checkpoint_id,
                page_url,
                detail,
                cause,
                applied_changes,
                ..
            }) => Err(FatalError::RollbackFailed {
                fix_id: fix_id.to_string(),
                checkpoint_id,
                page_url,
                detail,
                cause,
                applied_changes,
            }),
            Err(e @ MonitorError::StalePlan { .. }) => {
                Ok(FixResult::failed(fix_id, FixErrorKind::PlanFailure, e.to_string()).with_safety(report))
            }
            Err(e) => Ok(
                FixResult::failed(fix_id, FixErrorKind::ExecutionFailure, e.to_string())
                    .with_safety(report),
            ),
        }
    }

    /// Settle the fix reservation according to the usage policy.
    ///
    /// A ledger write failure is logged and does not change the outcome.
    async fn bill(
        &self,
        fix_id: &str,
        tenant_id: &TenantId,
        issue_type: &str,
        page_url: &str,
        outcome: &Result<FixResult, FatalError>,
    ) {
        let billable = match self.ctx.config.usage_policy {
            UsagePolicy::EveryAttempt => true,
            UsagePolicy::SuccessOnly => matches!(outcome, Ok(r) if r.committed()),
        };
        if !billable {
            self.ctx.registry.release(tenant_id, Operation::Fix).await;
            return;
        }
        let (success, kind) = match outcome {
            Ok(r) => (r.success, r.kind.map(FixErrorKind::as_str)),
            Err(_) => (false, Some("fatal")),
        };
        let details = json!({
            "fix_id": fix_id,
            "issue_type": issue_type,
            "page_url": page_url,
            "success": success,
            "kind": kind,
        });
        if let Err(e) = self.ctx.registry.record_usage(tenant_id, Operation::Fix, details).await {
            error!(event = "usage.record_failed", fix_id = %fix_id, tenant_id = %tenant_id, error = %e);
            self.ctx.registry.release(tenant_id, Operation::Fix).await;
        }
    }

    fn finished(&self, tenant_id: &TenantId, result: &FixResult, started: Instant) {
        obs::emit_fix_finished(
            tenant_id.as_str(),
            result.success,
            result.kind.map(FixErrorKind::as_str),
            started.elapsed().as_millis() as u64,
        );
    }

    /// Dry run: resolve the strategy, run the safety chain and, if safe, build
    /// the plan. Writes nothing and bills nothing.
    pub async fn preview(
        &self,
        tenant_id: &TenantId,
        issue_type: &str,
        page_url: &str,
        customizations: Option<Customizations>,
    ) -> Result<FixPreview, PreviewError> {
        let strategy = FixStrategy::resolve(issue_type)?;
        let tenant = self.ctx.registry.resolve(tenant_id).await?;
        let cms = self.ctx.cms.sink_for(&tenant).await?;
        let safety_report = self
            .ctx
            .safety
            .run(tenant_id, Arc::clone(&cms), page_url, strategy.issue_type())
            .await;
        let plan = if safety_report.is_safe {
            let plan_ctx = PlanContext {
                cms: cms.as_ref(),
                generator: self.ctx.generator.as_ref(),
                config: &self.ctx.config,
            };
            let customizations = customizations.unwrap_or_default();
            Some(strategy.generate_fix_plan(&plan_ctx, page_url, &customizations).await?)
        } else {
            None
        };
        Ok(FixPreview {
            strategy,
            safety_report,
            plan,
        })
    }
}
