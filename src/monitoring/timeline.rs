//! Execution Timeline
//!
//! Rebuilds the step spans of one run from its event stream. Steps run
//! one after another, so spans are kept in arrival order and the chart
//! reads as a staircase, annotated with each step's attempts and spend.

use std::time::{Duration, Instant};

use super::events::{EventKind, RunEvent};

/// Width of the bar area in the chart.
const CHART_WIDTH: usize = 40;

/// Width of the step name column in the chart.
const NAME_WIDTH: usize = 14;

/// One step as observed through its events.
#[derive(Debug, Clone)]
pub struct StepSpan {
    pub index: usize,
    pub name: String,
    pub started: Instant,
    pub finished: Option<Instant>,
    /// `None` while the step is still running
    pub passed: Option<bool>,
    pub attempts: u32,
    pub tokens: u64,
    pub cost: f64,
}

impl StepSpan {
    /// Time from start to finish, or to now while still running.
    pub fn duration(&self) -> Duration {
        self.finished
            .unwrap_or_else(Instant::now)
            .duration_since(self.started)
    }

    fn marker(&self) -> &'static str {
        match self.passed {
            Some(true) => "ok",
            Some(false) => "FAILED",
            None => "running",
        }
    }
}

/// Step spans of a single run.
#[derive(Debug, Clone)]
pub struct ExecutionTimeline {
    start_time: Instant,
    spans: Vec<StepSpan>,
}

impl ExecutionTimeline {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            spans: Vec::new(),
        }
    }

    /// Applies a run event. Only step start and completion matter here.
    pub fn record(&mut self, event: &RunEvent) {
        match &event.kind {
            EventKind::StepStarted {
                step_name,
                step_index,
                ..
            } => {
                self.spans.push(StepSpan {
                    index: *step_index,
                    name: step_name.clone(),
                    started: Instant::now(),
                    finished: None,
                    passed: None,
                    attempts: 0,
                    tokens: 0,
                    cost: 0.0,
                });
            }
            EventKind::StepCompleted {
                passed,
                attempts,
                tokens,
                cost,
                ..
            } => {
                // Only the most recent step can be open
                if let Some(span) = self.spans.last_mut().filter(|s| s.finished.is_none()) {
                    span.finished = Some(Instant::now());
                    span.passed = Some(*passed);
                    span.attempts = *attempts;
                    span.tokens = *tokens;
                    span.cost = *cost;
                }
            }
            _ => {}
        }
    }

    pub fn spans(&self) -> &[StepSpan] {
        &self.spans
    }

    /// Time since the timeline was created.
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Renders an ASCII chart with one row per step.
    pub fn gantt_chart(&self) -> String {
        let mut output = String::from("\nExecution Timeline:\n\n");

        let total = self.elapsed().as_millis().max(1);
        let scale = CHART_WIDTH as f64 / total as f64;

        for span in &self.spans {
            let offset = span.started.duration_since(self.start_time).as_millis();
            let millis = span.duration().as_millis();

            let start_pos = ((offset as f64 * scale) as usize).min(CHART_WIDTH - 1);
            let length = ((millis as f64 * scale).round() as usize).clamp(1, CHART_WIDTH - start_pos);

            output.push_str(&format!(
                "{:>2} {} |{}{}{}| {:>6} ms  {}x  ${:.4}  {}\n",
                span.index + 1,
                fit(&span.name, NAME_WIDTH),
                " ".repeat(start_pos),
                "#".repeat(length),
                " ".repeat(CHART_WIDTH - start_pos - length),
                millis,
                span.attempts,
                span.cost,
                span.marker()
            ));
        }

        let tokens: u64 = self.spans.iter().map(|s| s.tokens).sum();
        let cost: f64 = self.spans.iter().map(|s| s.cost).sum();
        output.push_str(&format!(
            "\nTotal: {} ms, {} tokens, ${:.4}\n",
            self.elapsed().as_millis(),
            tokens,
            cost
        ));
        output
    }
}

impl Default for ExecutionTimeline {
    fn default() -> Self {
        Self::new()
    }
}

/// Pads or cuts a name to exactly `width` characters.
fn fit(name: &str, width: usize) -> String {
    if name.chars().count() <= width {
        format!("{:width$}", name, width = width)
    } else {
        let head: String = name.chars().take(width - 1).collect();
        format!("{}~", head)
    }
}
