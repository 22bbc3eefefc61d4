//! Final query stage
//!
//! One Generator call over the transformed table, the group and sort side
//! facts and the original statement. Answers are normalized before they
//! are tallied.

use crate::config::{ChainConfig, VerdictStrategy};
use crate::confidence::{rank_descending, ConfidenceTally, Ranked};
use crate::error::GeneratorError;
use crate::generator::Generator;
use crate::prompts::{table_block, FINAL_QUERY_DEMO, FINAL_QUERY_INSTRUCTION, FULL_TABLE_ROWS};
use crate::table::TableSnapshot;
use crate::types::Task;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Verdict on a statement
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// Entailed
    Yes,
    /// Refuted
    No,
    /// Anything else the backend said
    Other(String),
}

impl Verdict {
    /// Verdict of a normalized answer
    #[must_use]
    pub fn from_answer(answer: &str) -> Self {
        match answer {
            "yes" => Self::Yes,
            "no" => Self::No,
            other => Self::Other(other.to_string()),
        }
    }

    /// Agreement with a label where 1 means entailed and 0 refuted
    #[must_use]
    pub fn matches_label(&self, label: u8) -> bool {
        matches!((self, label), (Self::Yes, 1) | (Self::No, 0))
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Yes => f.write_str("yes"),
            Self::No => f.write_str("no"),
            Self::Other(answer) => write!(f, "other({answer})"),
        }
    }
}

/// Ranked answers and the verdict drawn from them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalAnswer {
    /// Normalized answers, confidence summed per answer
    pub answers: Vec<Ranked<String>>,
    /// Verdict
    pub verdict: Verdict,
}

/// Trim, case-fold and alias `true`/`false` to `yes`/`no`
#[must_use]
pub fn normalize_answer(text: &str) -> String {
    let answer = text.trim().to_lowercase();
    match answer.as_str() {
        "true" => "yes".to_string(),
        "false" => "no".to_string(),
        _ => answer,
    }
}

/// Final query prompt
#[must_use]
pub fn build_prompt(task: &Task, snapshot: &TableSnapshot, with_demos: bool) -> String {
    let mut prompt = String::from(FINAL_QUERY_INSTRUCTION);
    if with_demos {
        prompt.push('\n');
        prompt.push_str(FINAL_QUERY_DEMO);
        prompt.push_str("\n\n");
        prompt.push_str(FINAL_QUERY_INSTRUCTION);
        prompt.push('\n');
    }
    prompt.push_str(&table_block(&snapshot.linearize(task.caption.as_deref(), FULL_TABLE_ROWS)));

    if let Some(facts) = snapshot.group_facts() {
        prompt.push_str("/*\n");
        prompt.push_str(&format!("Group the rows according to column: {}.\n", facts.column));
        prompt.push_str(&format!("Group ID | {} | Count\n", facts.column));
        for (idx, (value, count)) in facts.groups.iter().enumerate() {
            let value = if value.trim().is_empty() { "[Empty Cell]" } else { value };
            prompt.push_str(&format!("Group {} | {} | {}\n", idx + 1, value, count));
        }
        prompt.push_str("*/\n");
    }
    if let Some(facts) = snapshot.sort_facts() {
        prompt.push_str(&format!(
            "/*\nSort the rows according to column: {}. Max value: {}. Min value: {}.\n*/\n",
            facts.column, facts.max, facts.min
        ));
    }

    prompt.push_str("Statement: ");
    prompt.push_str(&task.statement);
    prompt.push_str("\nThe answer is:");
    prompt
}

/// Ask for the verdict on the transformed table
///
/// # Errors
/// Propagates Generator failures.
pub async fn query(
    generator: &dyn Generator,
    task: &Task,
    snapshot: &TableSnapshot,
    config: &ChainConfig,
) -> Result<FinalAnswer, GeneratorError> {
    let prompt = build_prompt(task, snapshot, config.final_query_demos);
    let completions = generator.complete(&prompt, &config.final_query).await?;

    let mut singles: Vec<Ranked<String>> = completions
        .iter()
        .map(|c| Ranked::new(normalize_answer(&c.text), c.confidence()))
        .collect();
    let mut tally = ConfidenceTally::new();
    for single in &singles {
        tally.add_confidence(single.value.clone(), single.confidence);
    }
    let answers = tally.into_ranked();

    let verdict = match config.verdict_strategy {
        VerdictStrategy::Top => {
            rank_descending(&mut singles);
            singles.first().map(|s| s.value.as_str())
        }
        VerdictStrategy::Weighted => answers.first().map(|a| a.value.as_str()),
    }
    .map_or_else(|| Verdict::Other(String::new()), Verdict::from_answer);

    Ok(FinalAnswer { answers, verdict })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::{Completion, GenerationOptions};
    use crate::table::{GroupFacts, TraceEntry};
    use crate::types::RawTable;
    use async_trait::async_trait;

    struct Answers(Vec<(&'static str, f64)>);

    #[async_trait]
    impl Generator for Answers {
        async fn complete(
            &self,
            _prompt: &str,
            _options: &GenerationOptions,
        ) -> Result<Vec<Completion>, GeneratorError> {
            Ok(self.0.iter().map(|(t, s)| Completion::new(*t, *s)).collect())
        }
    }

    fn task() -> Task {
        Task::new(
            "t",
            RawTable::new(vec!["party".into()], vec![vec!["dem".into()], vec![String::new()]]),
            "dem won once",
        )
        .with_caption("elections")
    }

    #[test]
    fn normalizes_aliases() {
        assert_eq!(normalize_answer(" TRUE "), "yes");
        assert_eq!(normalize_answer("False"), "no");
        assert_eq!(normalize_answer("YES"), "yes");
    }

    #[test]
    fn prompt_renders_group_table_with_empty_cells() {
        let task = task();
        let snapshot = task.initial_snapshot().unwrap().with_group_facts(
            GroupFacts {
                column: "party".into(),
                groups: vec![("dem".into(), 1), (String::new(), 1)],
            },
            TraceEntry::kept(crate::state_machine::Operation::GroupColumn, "party"),
        );
        let prompt = build_prompt(&task, &snapshot, false);
        assert!(prompt.starts_with(FINAL_QUERY_INSTRUCTION));
        assert!(prompt.contains("table caption : elections\n"));
        assert!(prompt.contains("Group ID | party | Count\nGroup 1 | dem | 1\nGroup 2 | [Empty Cell] | 1\n*/\n"));
        assert!(prompt.ends_with("Statement: dem won once\nThe answer is:"));
    }

    #[tokio::test]
    async fn weighted_and_top_can_disagree() {
        let generator = Answers(vec![("YES", (0.5f64).ln()), ("no", (0.3f64).ln()), ("False", (0.3f64).ln())]);
        let task = task();
        let snapshot = task.initial_snapshot().unwrap();

        let top = query(&generator, &task, &snapshot, &ChainConfig::default()).await.unwrap();
        assert_eq!(top.verdict, Verdict::Yes);
        assert_eq!(top.answers[0].value, "no");

        let config = ChainConfig::default().with_verdict_strategy(VerdictStrategy::Weighted);
        let weighted = query(&generator, &task, &snapshot, &config).await.unwrap();
        assert_eq!(weighted.verdict, Verdict::No);
    }

    #[test]
    fn verdict_label_agreement() {
        assert!(Verdict::Yes.matches_label(1));
        assert!(!Verdict::Yes.matches_label(0));
        assert!(!Verdict::Other("maybe".into()).matches_label(1));
    }
}
