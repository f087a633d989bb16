//! The step flow engine.
//!
//! A flow is an ordered list of [`Step`]s; the engine drives a
//! [`StepRunner`] over them with per-index attempt counters and the
//! `repeat`/`prev`/`restart` retry semantics. The engine is synchronous
//! and deterministic given the runner's outcomes: it never mutates the
//! step list, and a runner panic is caught and treated as a failure.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Duration;

use tracing::{debug, warn};

use crate::ports::AbortFlag;
use crate::step::{RetryAction, Step};

/// Outcome of a single step execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepResult {
    Ok,
    Fail,
    Aborted,
}

/// Outcome of a whole flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowResult {
    Completed,
    Failed,
    Aborted,
}

impl FlowResult {
    pub fn is_completed(&self) -> bool {
        matches!(self, FlowResult::Completed)
    }
}

/// Executes one step. The production implementation is
/// [`crate::exec::Executor`]; tests substitute scripted doubles.
pub trait StepRunner {
    fn run_step(&mut self, step: &Step) -> StepResult;
}

/// Sleep in small slices so an abort takes effect promptly.
/// Returns `false` if the flag was raised during the sleep.
pub(crate) fn sleep_checked(total: Duration, abort: &AbortFlag) -> bool {
    const SLICE: Duration = Duration::from_millis(50);
    let mut remaining = total;
    while !remaining.is_zero() {
        if abort.is_raised() {
            return false;
        }
        let chunk = remaining.min(SLICE);
        std::thread::sleep(chunk);
        remaining -= chunk;
    }
    !abort.is_raised()
}

/// Run `steps` to completion under the retry policy.
pub fn run_flow(
    name: &str,
    steps: &[Step],
    runner: &mut dyn StepRunner,
    abort: &AbortFlag,
) -> FlowResult {
    let mut attempts = vec![0u32; steps.len()];
    let mut i = 0usize;

    while i < steps.len() {
        if abort.is_raised() {
            return FlowResult::Aborted;
        }
        let step = &steps[i];

        let result = catch_unwind(AssertUnwindSafe(|| runner.run_step(step))).unwrap_or_else(|_| {
            warn!(flow = name, index = i, op = step.op.name(), "step panicked");
            StepResult::Fail
        });

        match result {
            StepResult::Ok => {
                attempts[i] = 0;
                if step.wait_ms > 0
                    && !sleep_checked(Duration::from_millis(step.wait_ms), abort)
                {
                    return FlowResult::Aborted;
                }
                i += 1;
            }
            StepResult::Aborted => return FlowResult::Aborted,
            StepResult::Fail => {
                if step.is_optional() {
                    // Optional ops report success by contract; tolerate a
                    // misbehaving runner rather than retrying them.
                    debug!(flow = name, index = i, "optional step reported Fail; advancing");
                    attempts[i] = 0;
                    i += 1;
                    continue;
                }

                attempts[i] += 1;
                debug!(
                    flow = name,
                    index = i,
                    op = step.op.name(),
                    attempt = attempts[i],
                    budget = step.retry.count + 1,
                    "step failed"
                );

                if attempts[i] <= step.retry.count {
                    if step.retry.delay_ms > 0
                        && !sleep_checked(Duration::from_millis(step.retry.delay_ms), abort)
                    {
                        return FlowResult::Aborted;
                    }
                    match step.retry.action {
                        RetryAction::Repeat => {}
                        RetryAction::Prev => {
                            attempts[i] = 0;
                            i = i.saturating_sub(1);
                        }
                        RetryAction::Restart => {
                            attempts.fill(0);
                            i = 0;
                        }
                    }
                } else {
                    warn!(flow = name, index = i, op = step.op.name(), "retries exhausted");
                    return FlowResult::Failed;
                }
            }
        }
    }
    FlowResult::Completed
}
