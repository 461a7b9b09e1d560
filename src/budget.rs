//! Token-budget guard and timeout wrapper.
//!
//! Every provider call inside the worker goes through [`guarded_generate`]:
//! reserve a conservative estimate against the job's ledger, run the call
//! under the phase's wall-clock timeout, then correct the ledger once real
//! usage is known. An over-budget reservation aborts *before* the call.

use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::model::JobId;
use crate::provider::{ChatMessage, Completion, ResponseFormat, TextGenerator};
use crate::service::JobService;

/// Rough chars-per-token ratio for pre-flight estimation.
pub const CHARS_PER_TOKEN: u32 = 4;

/// Expected output size as a multiple of input — the pre-flight reservation
/// is input × (1 + ratio).
pub const OUTPUT_BUDGET_RATIO: u32 = 1;

/// Conservative token estimate for a request: input at 4 chars/token plus
/// output budgeted at [`OUTPUT_BUDGET_RATIO`] × input.
pub fn estimate_request_tokens(messages: &[ChatMessage]) -> u32 {
    let chars: usize = messages.iter().map(|m| m.content.len()).sum();
    let input = (chars as u32).div_ceil(CHARS_PER_TOKEN).max(1);
    input + input * OUTPUT_BUDGET_RATIO
}

/// Run one budgeted, timed provider call for `job_id`.
///
/// Failure modes, all fatal to the job:
/// - [`Error::BudgetExceeded`] if the reservation is rejected (no call is
///   made), or if real usage turns out to exceed the budget after the fact;
/// - [`Error::PhaseTimeout`] if the call outlives `timeout`;
/// - provider errors, passed through.
pub async fn guarded_generate(
    service: &JobService,
    job_id: JobId,
    provider: &dyn TextGenerator,
    phase: &str,
    messages: &[ChatMessage],
    format: ResponseFormat,
    timeout: Duration,
) -> Result<Completion> {
    let estimate = estimate_request_tokens(messages);

    if !service.increment_tokens_used(job_id, i64::from(estimate))? {
        return Err(budget_error(service, job_id, phase, estimate));
    }
    debug!(job_id = %job_id, phase, estimate, "tokens reserved");

    let completion = match tokio::time::timeout(timeout, provider.generate(messages, format)).await
    {
        Ok(result) => result?,
        Err(_) => {
            return Err(Error::PhaseTimeout {
                phase: phase.to_string(),
                secs: timeout.as_secs(),
            });
        }
    };

    if let Some(usage) = completion.usage {
        let correction = i64::from(usage.total_tokens) - i64::from(estimate);
        if correction != 0 && !service.increment_tokens_used(job_id, correction)? {
            // Real usage blew past the budget. The ledger stays at the
            // reserved estimate — never above the ceiling — and the job
            // fails the same way a rejected reservation would.
            warn!(job_id = %job_id, phase, actual = usage.total_tokens, "usage exceeded budget");
            return Err(budget_error(service, job_id, phase, usage.total_tokens));
        }
        debug!(job_id = %job_id, phase, actual = usage.total_tokens, "ledger corrected");
    }

    Ok(completion)
}

fn budget_error(service: &JobService, job_id: JobId, phase: &str, estimated: u32) -> Error {
    let (remaining, budget) = match service.get(job_id) {
        Ok(job) => (job.token_budget.saturating_sub(job.tokens_used), job.token_budget),
        Err(_) => (0, 0),
    };
    Error::BudgetExceeded {
        phase: phase.to_string(),
        estimated,
        remaining,
        budget,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimate_covers_input_and_expected_output() {
        let messages = vec![ChatMessage::user("x".repeat(400))];
        // 400 chars -> 100 input tokens -> 200 with output budgeted 1:1.
        assert_eq!(estimate_request_tokens(&messages), 200);
    }

    #[test]
    fn estimate_never_returns_zero() {
        let messages = vec![ChatMessage::user("")];
        assert!(estimate_request_tokens(&messages) >= 1);
    }
}
