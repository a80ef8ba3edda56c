//! Checkpointed execution of a fix plan.
//!
//! ```text
//! Checkpointed -> Applied -> Validated -> Committed
//!        \            \           \
//!         +------------+-----------+--> RolledBack | Failed
//! ```
//!
//! Once a checkpoint exists the monitor always reaches `Committed`,
//! `RolledBack` or `Failed`. `Failed` means the rollback could not be
//! confirmed; the checkpoint is kept for manual recovery.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use seofix_state::{ContentDigest, TenantId};

use super::checkpoint::{Checkpoint, CheckpointStore};
use crate::cms::{bounded, CmsError, ContentSink};
use crate::domain::AppliedChange;
use crate::obs;
use crate::safety::performance::weight_check;
use crate::safety::structural::structural_checks;
use crate::safety::SafetyCheck;
use crate::strategy::FixPlan;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionState {
    Checkpointed,
    Applied,
    Validated,
    Committed,
    RolledBack,
    Failed,
}

impl ExecutionState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Checkpointed => "checkpointed",
            Self::Applied => "applied",
            Self::Validated => "validated",
            Self::Committed => "committed",
            Self::RolledBack => "rolled_back",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Committed | Self::RolledBack | Self::Failed)
    }
}

impl fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a run was rolled back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cause", content = "detail", rename_all = "snake_case")]
pub enum RollbackCause {
    /// A change could not be applied.
    ApplyFailed(String),
    /// The page could not be re-read or checked after the change.
    ValidationError(String),
    /// The changed page failed post-change validation.
    ValidationFailed(String),
}

impl fmt::Display for RollbackCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ApplyFailed(d) => write!(f, "apply failed: {d}"),
            Self::ValidationError(d) => write!(f, "post-change validation errored: {d}"),
            Self::ValidationFailed(d) => write!(f, "post-change validation failed: {d}"),
        }
    }
}

/// Evidence captured for the audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionEvidence {
    pub before_digest: ContentDigest,
    pub after_digest: Option<ContentDigest>,
    pub checks: Vec<SafetyCheck>,
}

/// Outcome of a run that reached `Committed` or a confirmed `RolledBack`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub checkpoint_id: String,
    pub final_state: ExecutionState,
    /// Every state entered, in order.
    pub transitions: Vec<ExecutionState>,
    pub applied_changes: Vec<AppliedChange>,
    pub rollback_performed: bool,
    pub rollback_cause: Option<RollbackCause>,
    pub evidence: ExecutionEvidence,
}

impl ExecutionReport {
    pub fn committed(&self) -> bool {
        self.final_state == ExecutionState::Committed
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error("checkpoint {checkpoint_id} is already live for this page")]
    CheckpointExists { checkpoint_id: String },

    #[error("could not snapshot page before change: {0}")]
    Snapshot(#[source] CmsError),

    #[error("page changed since the plan was made (expected {expected}, found {actual})")]
    StalePlan {
        expected: ContentDigest,
        actual: ContentDigest,
    },

    /// The page may be left modified. Needs a human.
    #[error("rollback of checkpoint {checkpoint_id} for {page_url} could not be confirmed: {detail}")]
    RollbackFailed {
        checkpoint_id: String,
        page_url: String,
        detail: String,
        cause: RollbackCause,
        transitions: Vec<ExecutionState>,
        applied_changes: Vec<AppliedChange>,
    },
}

// ---------------------------------------------------------------------------
// Monitor
// ---------------------------------------------------------------------------

/// Runs plans under checkpoint/rollback discipline.
pub struct ExecutionMonitor {
    checkpoints: Arc<CheckpointStore>,
    cms_timeout: Duration,
    /// Post-change page weight limit. `None` skips the weight check.
    page_budget_bytes: Option<u64>,
}

/// Per-run transition log.
struct Trail<'a> {
    checkpoint_id: &'a str,
    states: Vec<ExecutionState>,
}

impl Trail<'_> {
    fn enter(&mut self, next: ExecutionState) {
        let from = self.states.last().map_or("none", |s| s.as_str());
        obs::emit_state_transition(self.checkpoint_id, from, next.as_str());
        self.states.push(next);
    }
}

impl ExecutionMonitor {
    pub fn new(cms_timeout: Duration) -> Self {
        Self::with_store(Arc::new(CheckpointStore::new()), cms_timeout)
    }

    pub fn with_store(checkpoints: Arc<CheckpointStore>, cms_timeout: Duration) -> Self {
        Self {
            checkpoints,
            cms_timeout,
            page_budget_bytes: None,
        }
    }

    /// Roll back changes that leave the page heavier than `budget_bytes`.
    pub fn with_page_budget(mut self, budget_bytes: u64) -> Self {
        self.page_budget_bytes = Some(budget_bytes);
        self
    }

    pub fn checkpoints(&self) -> &Arc<CheckpointStore> {
        &self.checkpoints
    }

    /// Execute `plan` against `cms` for `tenant_id`.
    ///
    /// Errors before the first write (`CheckpointExists`, `Snapshot`,
    /// `StalePlan`) leave the page untouched. A rollback that cannot be
    /// confirmed is `RollbackFailed`. Everything else is an `ExecutionReport`.
    pub async fn run(
        &self,
        tenant_id: &TenantId,
        cms: &dyn ContentSink,
        plan: FixPlan,
    ) -> Result<ExecutionReport, MonitorError> {
        let snapshot = bounded("read_page", self.cms_timeout, cms.read_page(&plan.page_url))
            .await
            .map_err(MonitorError::Snapshot)?;
        let checkpoint = self
            .checkpoints
            .create(tenant_id, &plan.page_url, snapshot)
            .map_err(|checkpoint_id| MonitorError::CheckpointExists { checkpoint_id })?;

        let mut trail = Trail {
            checkpoint_id: &checkpoint.checkpoint_id,
            states: Vec::with_capacity(4),
        };
        trail.enter(ExecutionState::Checkpointed);

        if checkpoint.digest != plan.base_digest {
            self.checkpoints.discard(&checkpoint);
            return Err(MonitorError::StalePlan {
                expected: plan.base_digest,
                actual: checkpoint.digest,
            });
        }

        let page_id = checkpoint.snapshot.page_id.clone();
        let applied = match plan.execute(cms, self.cms_timeout).await {
            Ok(applied) => applied,
            Err(e) => {
                let cause = RollbackCause::ApplyFailed(e.to_string());
                return self
                    .roll_back(cms, &checkpoint, trail.states, e.applied, cause, None)
                    .await;
            }
        };
        trail.enter(ExecutionState::Applied);

        let after = match bounded("read_page", self.cms_timeout, cms.read_page(&checkpoint.page_url)).await
        {
            Ok(page) if page.page_id == page_id => page,
            Ok(page) => {
                let cause = RollbackCause::ValidationError(format!(
                    "page id changed from {page_id} to {}",
                    page.page_id
                ));
                return self
                    .roll_back(cms, &checkpoint, trail.states, applied, cause, None)
                    .await;
            }
            Err(e) => {
                let cause = RollbackCause::ValidationError(e.to_string());
                return self
                    .roll_back(cms, &checkpoint, trail.states, applied, cause, None)
                    .await;
            }
        };

        let after_digest = after.digest();
        let mut checks = structural_checks(&after.html);
        let all_noops = applied.iter().all(|c| c.before == c.after);
        checks.push(if all_noops || after_digest != checkpoint.digest {
            SafetyCheck::pass("changes_landed", format!("{} change(s) applied", applied.len()))
        } else {
            SafetyCheck::fail("changes_landed", "page is unchanged after applying the plan")
        });
        if let Some(budget) = self.page_budget_bytes {
            checks.push(weight_check(after.byte_len() as u64, budget));
        }

        if let Some(failed) = checks.iter().find(|c| !c.passed) {
            let cause = RollbackCause::ValidationFailed(format!("{}: {}", failed.name, failed.detail));
            let evidence = ExecutionEvidence {
                before_digest: checkpoint.digest.clone(),
                after_digest: Some(after_digest),
                checks,
            };
            return self
                .roll_back(cms, &checkpoint, trail.states, applied, cause, Some(evidence))
                .await;
        }
        trail.enter(ExecutionState::Validated);

        self.checkpoints.discard(&checkpoint);
        trail.enter(ExecutionState::Committed);

        Ok(ExecutionReport {
            checkpoint_id: checkpoint.checkpoint_id.clone(),
            final_state: ExecutionState::Committed,
            transitions: trail.states,
            applied_changes: applied,
            rollback_performed: false,
            rollback_cause: None,
            evidence: ExecutionEvidence {
                before_digest: checkpoint.digest.clone(),
                after_digest: Some(after_digest),
                checks,
            },
        })
    }

    /// Restore the checkpoint and prove it by digest. Reaches `RolledBack` or
    /// `Failed`.
    async fn roll_back(
        &self,
        cms: &dyn ContentSink,
        checkpoint: &Checkpoint,
        states: Vec<ExecutionState>,
        applied_changes: Vec<AppliedChange>,
        cause: RollbackCause,
        evidence: Option<ExecutionEvidence>,
    ) -> Result<ExecutionReport, MonitorError> {
        let mut trail = Trail {
            checkpoint_id: &checkpoint.checkpoint_id,
            states,
        };
        obs::emit_rollback(&checkpoint.checkpoint_id, &cause.to_string());

        match self.restore(cms, checkpoint).await {
            Ok(()) => {
                self.checkpoints.discard(checkpoint);
                trail.enter(ExecutionState::RolledBack);
                let evidence = evidence.unwrap_or_else(|| ExecutionEvidence {
                    before_digest: checkpoint.digest.clone(),
                    after_digest: None,
                    checks: Vec::new(),
                });
                Ok(ExecutionReport {
                    checkpoint_id: checkpoint.checkpoint_id.clone(),
                    final_state: ExecutionState::RolledBack,
                    transitions: trail.states,
                    applied_changes,
                    rollback_performed: true,
                    rollback_cause: Some(cause),
                    evidence,
                })
            }
            Err(detail) => {
                trail.enter(ExecutionState::Failed);
                obs::emit_rollback_failed(&checkpoint.checkpoint_id, &checkpoint.page_url, &detail);
                Err(MonitorError::RollbackFailed {
                    checkpoint_id: checkpoint.checkpoint_id.clone(),
                    page_url: checkpoint.page_url.clone(),
                    detail,
                    cause,
                    transitions: trail.states,
                    applied_changes,
                })
            }
        }
    }

    async fn restore(&self, cms: &dyn ContentSink, checkpoint: &Checkpoint) -> Result<(), String> {
        let snapshot = &checkpoint.snapshot;
        let confirmed = bounded("revert", self.cms_timeout, cms.revert(&snapshot.page_id, snapshot))
            .await
            .map_err(|e| format!("revert failed: {e}"))?;
        if !confirmed {
            return Err("cms did not confirm the revert".to_string());
        }
        let restored = bounded("read_page", self.cms_timeout, cms.read_page(&checkpoint.page_url))
            .await
            .map_err(|e| format!("could not re-read page after revert: {e}"))?;
        let digest = restored.digest();
        if digest != checkpoint.digest {
            return Err(format!(
                "page digest after revert is {}, checkpoint is {}",
                digest.short(),
                checkpoint.digest.short()
            ));
        }
        Ok(())
    }
}
