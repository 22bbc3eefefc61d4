//! Chain planner
//!
//! Picks the next step from the legal set. A single legal step is returned
//! without calling the Generator. Otherwise the first arrow-delimited
//! segment of the response that names a legal step wins, and anything
//! unparseable falls back to `<END>`.

use crate::config::{ChainConfig, PlanStrategy};
use crate::confidence::ConfidenceTally;
use crate::error::GeneratorError;
use crate::generator::Generator;
use crate::prompts::{plan_prompt, PLAN_STOP};
use crate::state_machine::{current_state, legal_next, ChainState, NextStep, Operation};
use crate::table::TableSnapshot;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

static OPERATION_CALL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"f_(.*?)\(.*\)").expect("static pattern"));

const END_TOKEN: &str = "<END>";

/// One planning step as recorded in the task log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanLog {
    /// Full trace (kept and skipped) at planning time
    pub act_chain: Vec<String>,
    /// Last kept operation
    pub last_operation: ChainState,
    /// Legal next steps offered
    pub legal_next: Vec<NextStep>,
    /// Prompt sent; `None` when the decision needed no Generator call
    pub prompt: Option<String>,
    /// First completion text
    pub response: Option<String>,
    /// Steps parsed from the first completion
    pub parsed: Vec<NextStep>,
    /// Decision
    pub next: NextStep,
}

/// Planner output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanDecision {
    /// Step to take
    pub next: NextStep,
    /// Log entry
    pub log: PlanLog,
}

/// Parse every `f_<op>(...)` or `<END>` segment of an arrow-joined chain
///
/// Unknown operation names are dropped.
#[must_use]
pub fn parse_plan(response: &str) -> Vec<NextStep> {
    response
        .split("->")
        .map(str::trim)
        .filter_map(|part| {
            if part == END_TOKEN {
                return Some(NextStep::End);
            }
            let name = OPERATION_CALL.captures(part)?.get(1)?.as_str();
            Operation::from_name(name).map(NextStep::Apply)
        })
        .collect()
}

fn first_legal(parsed: &[NextStep], legal: &[NextStep]) -> Option<NextStep> {
    parsed.iter().copied().find(|step| legal.contains(step))
}

/// Decide the next step for `snapshot`
///
/// # Errors
/// Propagates Generator failures; parse failures resolve to `<END>`.
pub async fn plan(
    generator: &dyn Generator,
    snapshot: &TableSnapshot,
    statement: &str,
    config: &ChainConfig,
) -> Result<PlanDecision, GeneratorError> {
    let trace = snapshot.trace();
    let act_chain: Vec<String> = trace.iter().map(ToString::to_string).collect();
    let last_operation = current_state(trace);
    let legal = legal_next(trace);

    let mut log = PlanLog {
        act_chain,
        last_operation,
        legal_next: legal.clone(),
        prompt: None,
        response: None,
        parsed: Vec::new(),
        next: NextStep::End,
    };

    if legal.len() <= 1 {
        let next = legal.first().copied().unwrap_or(NextStep::End);
        debug!("planner forced {} after {}", next, last_operation);
        log.next = next;
        return Ok(PlanDecision { next, log });
    }

    let prompt = plan_prompt(snapshot, statement, &snapshot.kept_chain(), &legal);
    let options = config.planner.clone().with_stop(PLAN_STOP);
    let completions = generator.complete(&prompt, &options).await?;

    let first = completions.first().map(|c| c.text.clone());
    let parsed = first.as_deref().map(parse_plan).unwrap_or_default();

    let next = match config.plan_strategy {
        PlanStrategy::Top => first_legal(&parsed, &legal).unwrap_or(NextStep::End),
        PlanStrategy::Voting => {
            let mut tally = ConfidenceTally::new();
            for completion in &completions {
                if let Some(step) = first_legal(&parse_plan(&completion.text), &legal) {
                    tally.add(step, completion.log_score);
                }
            }
            tally
                .into_ranked()
                .first()
                .map_or(NextStep::End, |ranked| ranked.value)
        }
    };
    debug!("planner chose {} from {} legal steps", next, legal.len());

    log.prompt = Some(prompt);
    log.response = first;
    log.parsed = parsed;
    log.next = next;
    Ok(PlanDecision { next, log })
}
