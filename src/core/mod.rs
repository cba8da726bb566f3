mod action;
pub mod catalog;
mod format;
mod issue;
mod report;
mod reporter;

pub use action::Action;
pub use format::ReportFormat;
pub use issue::{Issue, JsonPathRef, MAX_CONFIDENCE, MAX_IMPACT, SupportData};
pub use report::{ReportDocument, ReportOptions, ReportStore, SourceReport};
pub use reporter::IssueReporter;
