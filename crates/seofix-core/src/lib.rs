//! SEOFIX Core Library
//!
//! Safety-gated, checkpointed and metered application of SEO fixes to live
//! CMS content. [`FixOrchestrator::apply_fix`] is the entry point.

pub mod cms;
pub mod config;
pub mod domain;
pub mod fakes;
pub mod generator;
pub mod metrics;
pub mod monitor;
pub mod obs;
pub mod orchestrator;
pub mod safety;
pub mod strategy;
pub mod telemetry;
pub mod tenant;
pub mod text;

pub use cms::{
    CmsError, CmsProvider, ContentSink, DirectoryCmsProvider, FsCms, MemoryCms, StaticCmsProvider,
};
pub use config::{SeofixConfig, UsagePolicy};
pub use domain::{
    AppliedChange, ChangeAction, ChangeSet, IssueType, PageSnapshot, Result, SeofixError,
    ValidationRule,
};
pub use generator::{
    ContentGenerator, GeneratorError, HttpContentGenerator, HttpGeneratorConfig,
    UnconfiguredGenerator,
};
pub use metrics::{Metrics, MetricsSnapshot};
pub use monitor::{
    Checkpoint, CheckpointStore, ExecutionMonitor, ExecutionReport, ExecutionState, MonitorError,
    RollbackCause,
};
pub use orchestrator::{
    FatalError, FixContext, FixErrorKind, FixOrchestrator, FixPreview, FixResult, PreviewError,
};
pub use safety::{
    SafetyCheck, SafetyError, SafetyReport, SafetyValidationResult, SafetyValidator,
    SafetyValidatorChain,
};
pub use strategy::{Customizations, FixPlan, FixStrategy, LinkTarget, StrategyError};
pub use tenant::{AccessDecision, Operation, TenantRegistration, TenantRegistry};

/// Crate version, as reported by the CLI.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
