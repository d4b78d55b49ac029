//! Rate-control strategies and orchestration for the Skylink ADR control
//! plane.
//!
//! Two interchangeable strategies share one device-state model:
//! - [`StepwiseMarginController`]: SNR-margin-based incremental adjustment
//! - [`SearchOptimizingController`]: joint grid search minimizing airtime
//!   under a PER constraint
//!
//! [`NetworkService`] ties the pipeline together: aggregation, statistics,
//! evaluation, and command staging.

pub mod airtime;
pub mod margin;
pub mod optimizer;
pub mod per;
pub mod service;
pub mod strategy;

// Re-exports for convenience
pub use airtime::AirtimeModel;
pub use margin::StepwiseMarginController;
pub use optimizer::SearchOptimizingController;
pub use service::NetworkService;
pub use strategy::{EvaluationContext, RateStrategy, build_strategy};
