//! Individual Step Execution
//!
//! Runs the attempt loop of a single step:
//! - Context placeholder substitution
//! - Provider call
//! - Criterion evaluation
//! - Fixed delay between attempts
//!
//! Provider failures and criterion failures share one attempt budget.

use std::time::Duration;

use log::{debug, info, warn};

use super::criteria::{evaluate, Judge};
use crate::monitoring::{EventBus, EventKind, RunEvent};
use crate::provider::CompletionProvider;
use crate::workflow::{CriterionKind, Step, CONTEXT_PLACEHOLDER};

/// Collaborators shared by every attempt of a run.
pub(crate) struct StepEnv<'a> {
    pub run_id: &'a str,
    pub provider: &'a dyn CompletionProvider,
    pub judge: &'a dyn Judge,
    pub events: &'a EventBus,
    pub retry_delay: Duration,
}

impl StepEnv<'_> {
    fn emit(&self, kind: EventKind) {
        self.events.publish(RunEvent::new(self.run_id, kind));
    }
}

/// Terminal result of one step's attempt loop.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct StepOutcome {
    pub passed: bool,
    pub attempts: u32,
    /// Text of the last attempt that produced output
    pub output: Option<String>,
    /// Last failure reason; `None` when passed
    pub error: Option<String>,
    pub tokens: u64,
    pub cost: f64,
}

/// Substitutes every context placeholder in `template`.
///
/// Returns the rendered prompt and whether the context was folded into it.
pub fn render_prompt(template: &str, context: &str) -> (String, bool) {
    if template.contains(CONTEXT_PLACEHOLDER) {
        (template.replace(CONTEXT_PLACEHOLDER, context), true)
    } else {
        (template.to_string(), false)
    }
}

/// Executes a single step until it passes or its attempts run out.
pub(crate) async fn execute_step(step: &Step, context: &str, env: &StepEnv<'_>) -> StepOutcome {
    let max_attempts = step.retry_limit.max(1);

    let mut outcome = StepOutcome {
        passed: false,
        attempts: 0,
        output: None,
        error: None,
        tokens: 0,
        cost: 0.0,
    };

    for attempt in 1..=max_attempts {
        outcome.attempts = attempt;

        env.emit(EventKind::StepAttempt {
            step_id: step.id.clone(),
            attempt,
            max_attempts,
        });

        let (prompt, folded) = render_prompt(&step.prompt, context);
        let side_context = if folded || context.is_empty() {
            None
        } else {
            Some(context)
        };

        debug!(
            "Step '{}' attempt {}/{}: {} prompt chars, context {}",
            step.name,
            attempt,
            max_attempts,
            prompt.len(),
            if folded { "inline" } else if side_context.is_some() { "separate" } else { "none" }
        );

        match env.provider.call(&prompt, &step.model, side_context).await {
            Ok(completion) => {
                outcome.tokens += completion.tokens.total;
                outcome.cost += completion.cost;

                env.emit(EventKind::StepResponse {
                    step_id: step.id.clone(),
                    attempt,
                    output: completion.content.clone(),
                    tokens: completion.tokens,
                    cost: completion.cost,
                });

                let judge = (step.criteria_type == CriterionKind::Llm).then_some(env.judge);
                let verdict =
                    evaluate(&completion.content, step.criteria_type, &step.criteria_value, judge)
                        .await;
                outcome.output = Some(completion.content);

                env.emit(EventKind::StepEvaluated {
                    step_id: step.id.clone(),
                    attempt,
                    passed: verdict.passed,
                    reason: verdict.reason.clone(),
                });

                if verdict.passed {
                    info!("Step '{}' passed on attempt {}", step.name, attempt);
                    outcome.passed = true;
                    outcome.error = None;
                    return outcome;
                }

                warn!(
                    "Step '{}' attempt {}/{} failed: {}",
                    step.name, attempt, max_attempts, verdict.reason
                );
                outcome.error = Some(verdict.reason);
            }
            Err(e) => {
                let message = e.to_string();
                warn!(
                    "Step '{}' attempt {}/{} provider error: {}",
                    step.name, attempt, max_attempts, message
                );

                env.emit(EventKind::StepError {
                    step_id: step.id.clone(),
                    attempt,
                    error: message.clone(),
                });
                outcome.error = Some(message);
            }
        }

        if attempt < max_attempts && !env.retry_delay.is_zero() {
            tokio::time::sleep(env.retry_delay).await;
        }
    }

    outcome
}
