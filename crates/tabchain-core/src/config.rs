//! Chain configuration
//!
//! Per-stage sampling options plus the strategies and policies the Driver,
//! Planner and apply stages consult. Everything is serde so the CLI can load
//! a JSON file and override single fields from flags.

use crate::generator::GenerationOptions;
use crate::state_machine::Operation;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How the Planner turns sampled plans into one decision
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStrategy {
    /// First completion only
    #[default]
    Top,
    /// Sum confidence per operation over all completions
    Voting,
}

impl FromStr for PlanStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "top" => Ok(Self::Top),
            "voting" => Ok(Self::Voting),
            other => Err(format!("unknown plan strategy: {other}")),
        }
    }
}

impl fmt::Display for PlanStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Top => f.write_str("top"),
            Self::Voting => f.write_str("voting"),
        }
    }
}

/// How final-query answers become a verdict
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictStrategy {
    /// Highest single-completion confidence
    #[default]
    Top,
    /// Confidence summed per normalized answer
    Weighted,
}

/// Which sort candidates the apply stage may commit
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortFilter {
    /// Only numeric-typed candidates; others degrade to skip
    #[default]
    OnlyNumeric,
    /// Any datatype the propose stage accepted
    Any,
}

/// Apply-stage policy knobs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyPolicy {
    /// Candidate sets unioned by row and column selection
    pub union_top_k: usize,
    /// Sort datatype filter
    pub sort_filter: SortFilter,
}

impl Default for ApplyPolicy {
    fn default() -> Self {
        Self {
            union_top_k: 2,
            sort_filter: SortFilter::OnlyNumeric,
        }
    }
}

/// Full configuration of one chain run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    /// Planner sampling
    pub planner: GenerationOptions,
    /// Add-column proposal and follow-ups
    pub add_column: GenerationOptions,
    /// Row selection sampling
    pub select_row: GenerationOptions,
    /// Column selection sampling
    pub select_column: GenerationOptions,
    /// Group-by sampling
    pub group_column: GenerationOptions,
    /// Sort-by sampling
    pub sort_column: GenerationOptions,
    /// Final query sampling
    pub final_query: GenerationOptions,
    /// Planner aggregation
    pub plan_strategy: PlanStrategy,
    /// Verdict aggregation
    pub verdict_strategy: VerdictStrategy,
    /// Hard cap on operations per task
    pub max_steps: usize,
    /// Apply-stage policy
    pub apply: ApplyPolicy,
    /// Include few-shot exemplars in the final query
    pub final_query_demos: bool,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            planner: GenerationOptions::greedy(200),
            add_column: GenerationOptions::greedy(150),
            select_row: GenerationOptions::greedy(150).sampled(0.5, 8),
            select_column: GenerationOptions::greedy(150).sampled(0.5, 8),
            group_column: GenerationOptions::greedy(150),
            sort_column: GenerationOptions::greedy(150),
            final_query: GenerationOptions::greedy(200),
            plan_strategy: PlanStrategy::Top,
            verdict_strategy: VerdictStrategy::Top,
            max_steps: Operation::ALL.len(),
            apply: ApplyPolicy::default(),
            final_query_demos: true,
        }
    }
}

impl ChainConfig {
    /// Sampling options of one operation
    #[must_use]
    pub fn options_for(&self, operation: Operation) -> &GenerationOptions {
        match operation {
            Operation::AddColumn => &self.add_column,
            Operation::SelectRow => &self.select_row,
            Operation::SelectColumn => &self.select_column,
            Operation::GroupColumn => &self.group_column,
            Operation::SortColumn => &self.sort_column,
        }
    }

    /// With planner strategy
    #[inline]
    #[must_use]
    pub fn with_plan_strategy(mut self, strategy: PlanStrategy) -> Self {
        self.plan_strategy = strategy;
        self
    }

    /// With verdict strategy
    #[inline]
    #[must_use]
    pub fn with_verdict_strategy(mut self, strategy: VerdictStrategy) -> Self {
        self.verdict_strategy = strategy;
        self
    }

    /// With step cap
    #[inline]
    #[must_use]
    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// With apply policy
    #[inline]
    #[must_use]
    pub fn with_apply_policy(mut self, apply: ApplyPolicy) -> Self {
        self.apply = apply;
        self
    }

    /// With or without final-query exemplars
    #[inline]
    #[must_use]
    pub fn with_final_query_demos(mut self, enabled: bool) -> Self {
        self.final_query_demos = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_stage_table() {
        let config = ChainConfig::default();
        assert_eq!(config.select_row.sample_count, 8);
        assert!((config.select_column.temperature - 0.5).abs() < f32::EPSILON);
        assert_eq!(config.sort_column.sample_count, 1);
        assert_eq!(config.planner.max_output_tokens, 200);
        assert_eq!(config.max_steps, 5);
        assert_eq!(config.apply.union_top_k, 2);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: ChainConfig =
            serde_json::from_str(r#"{"plan_strategy":"voting","max_steps":3}"#).unwrap();
        assert_eq!(config.plan_strategy, PlanStrategy::Voting);
        assert_eq!(config.max_steps, 3);
        assert_eq!(config.apply, ApplyPolicy::default());
    }

    #[test]
    fn partial_stage_options_fill_defaults() {
        let config: ChainConfig =
            serde_json::from_str(r#"{"planner":{"temperature":0.2}}"#).unwrap();
        let defaults = GenerationOptions::default();

        assert!((config.planner.temperature - 0.2).abs() < f32::EPSILON);
        assert_eq!(config.planner.max_output_tokens, defaults.max_output_tokens);
        assert_eq!(config.planner.sample_count, defaults.sample_count);
        assert_eq!(config.planner.stop, None);
        assert_eq!(config.select_row, ChainConfig::default().select_row);
    }

    #[test]
    fn plan_strategy_from_str() {
        assert_eq!("Voting".parse::<PlanStrategy>(), Ok(PlanStrategy::Voting));
        assert!("best".parse::<PlanStrategy>().is_err());
    }
}
