//! Domain models for SEOFIX.
//!
//! - `IssueType`: the closed set of fixable SEO issues
//! - `PageSnapshot`, `ChangeSet`, `AppliedChange`: what is read, planned and written
//! - `SeofixError`: domain error taxonomy

pub mod error;
pub mod issue;
pub mod page;

pub use error::{Result, SeofixError};
pub use issue::IssueType;
pub use page::{AppliedChange, ChangeAction, ChangeSet, PageSnapshot, ValidationRule};
