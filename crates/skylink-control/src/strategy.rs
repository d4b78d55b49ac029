//! Rate-control strategy interface.
//!
//! Both controllers share one seam: given the device's reception history
//! and current parameters, produce a decision or decline. The concrete
//! strategy is chosen per device at registration time from configuration;
//! nothing ever switches strategies by inspecting state at runtime.

use std::collections::VecDeque;
use std::sync::Arc;

use skylink_core::config::{AdrConfig, StrategyKind};
use skylink_network::model::{RateDecision, TxParams, UplinkReception};

use crate::margin::StepwiseMarginController;
use crate::optimizer::SearchOptimizingController;

/// Everything a strategy sees about a device when evaluating.
pub struct EvaluationContext<'a> {
    /// Reception history, oldest first.
    pub history: &'a VecDeque<UplinkReception>,
    /// Parameters the device currently uses.
    pub params: TxParams,
    /// Samples required before an evaluation may run.
    pub history_range: usize,
}

impl EvaluationContext<'_> {
    /// Whether the history window holds enough samples to evaluate.
    pub fn history_full(&self) -> bool {
        self.history.len() >= self.history_range
    }
}

/// A rate-control strategy.
///
/// Returning `None` is the explicit no-change outcome: either the history
/// is not yet full, or no candidate improves on the current parameters.
pub trait RateStrategy: Send + Sync {
    /// Strategy name for logs and telemetry.
    fn name(&self) -> &'static str;

    /// Evaluate the device and propose new parameters, or decline.
    fn evaluate(&self, ctx: &EvaluationContext<'_>) -> Option<RateDecision>;
}

/// Build the strategy instance for a configured kind.
pub fn build_strategy(kind: StrategyKind, config: &AdrConfig) -> Arc<dyn RateStrategy> {
    match kind {
        StrategyKind::StepwiseMargin => Arc::new(StepwiseMarginController::from_config(config)),
        StrategyKind::SearchOptimizing => {
            Arc::new(SearchOptimizingController::from_config(config))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factory_builds_configured_kind() {
        let config = AdrConfig::default();
        let stepwise = build_strategy(StrategyKind::StepwiseMargin, &config);
        let optimizing = build_strategy(StrategyKind::SearchOptimizing, &config);
        assert_eq!(stepwise.name(), "stepwise_margin");
        assert_eq!(optimizing.name(), "search_optimizing");
    }
}
