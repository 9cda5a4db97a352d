/*!
 * Bounded Evaluation
 * Time budget around an arbitrary condition evaluator
 */

use super::{ConditionContext, ConditionError, ConditionEvaluator};
use crate::core::limits::MAX_CONDITION_TIMEOUT;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::warn;

/// Runs an evaluator under a wall-clock budget
///
/// Evaluators that report `is_bounded()` run inline. Any other evaluator runs
/// on a dedicated thread; if no result arrives within the budget the condition
/// fails with `ConditionError::Timeout` and the worker is abandoned. Its result,
/// if it ever produces one, is dropped.
#[derive(Clone)]
pub struct BoundedEvaluator {
    inner: Arc<dyn ConditionEvaluator>,
    budget: Duration,
}

impl BoundedEvaluator {
    pub fn new(inner: Arc<dyn ConditionEvaluator>, budget: Duration) -> Self {
        Self {
            inner,
            budget: budget.min(MAX_CONDITION_TIMEOUT),
        }
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    fn evaluate_on_worker(
        &self,
        expression: &str,
        context: &ConditionContext,
    ) -> Result<bool, ConditionError> {
        let (tx, rx) = flume::bounded(1);
        let inner = Arc::clone(&self.inner);
        let expression_owned = expression.to_string();
        let context_owned = context.clone();

        thread::Builder::new()
            .name("uma-condition".into())
            .spawn(move || {
                let result = inner.evaluate(&expression_owned, &context_owned);
                // Receiver is gone once the budget expired
                let _ = tx.send(result);
            })
            .map_err(|e| ConditionError::Evaluation(format!("failed to spawn evaluator: {}", e)))?;

        match rx.recv_timeout(self.budget) {
            Ok(result) => result,
            Err(flume::RecvTimeoutError::Timeout) => {
                warn!(
                    budget_ms = self.budget.as_millis() as u64,
                    resource = %context.resource_id,
                    "Condition evaluation exceeded its budget"
                );
                Err(ConditionError::Timeout(self.budget))
            }
            Err(flume::RecvTimeoutError::Disconnected) => Err(ConditionError::Evaluation(
                "evaluator terminated without a result".into(),
            )),
        }
    }
}

impl ConditionEvaluator for BoundedEvaluator {
    fn evaluate(&self, expression: &str, context: &ConditionContext) -> Result<bool, ConditionError> {
        if self.inner.is_bounded() {
            return self.inner.evaluate(expression, context);
        }
        self.evaluate_on_worker(expression, context)
    }

    fn validate(&self, expression: &str) -> Result<(), ConditionError> {
        self.inner.validate(expression)
    }

    fn is_bounded(&self) -> bool {
        true
    }
}
