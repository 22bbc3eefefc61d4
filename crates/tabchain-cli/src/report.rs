//! Batch output files

use anyhow::Context;
use serde::Serialize;
use std::io::Write;
use std::path::Path;
use tabchain_batch::{BatchReport, CheckpointEntry};
use tabchain_core::{Ranked, TaskId, Verdict};

/// One line of `results.jsonl`
#[derive(Debug, Serialize)]
pub(crate) struct ResultLine<'a> {
    pub(crate) id: &'a TaskId,
    pub(crate) verdict: &'a Verdict,
    pub(crate) label: Option<u8>,
    pub(crate) answers: &'a [Ranked<String>],
    pub(crate) chain: Vec<String>,
}

impl<'a> From<&'a CheckpointEntry> for ResultLine<'a> {
    fn from(entry: &'a CheckpointEntry) -> Self {
        Self {
            id: &entry.task.id,
            verdict: &entry.result.answer.verdict,
            label: entry.task.label,
            answers: &entry.result.answer.answers,
            chain: entry.result.snapshot.kept_chain(),
        }
    }
}

/// Write `results.jsonl` and `result.txt` into `dir`
pub(crate) fn write_outputs(dir: &Path, report: &BatchReport) -> anyhow::Result<()> {
    let results_path = dir.join("results.jsonl");
    let file = std::fs::File::create(&results_path)
        .with_context(|| format!("creating {}", results_path.display()))?;
    let mut out = std::io::BufWriter::new(file);
    for entry in report.completed() {
        serde_json::to_writer(&mut out, &ResultLine::from(entry))?;
        out.write_all(b"\n")?;
    }
    out.flush()?;

    let summary_path = dir.join("result.txt");
    std::fs::write(&summary_path, summary(report))
        .with_context(|| format!("writing {}", summary_path.display()))?;
    Ok(())
}

/// Human-readable batch summary
pub(crate) fn summary(report: &BatchReport) -> String {
    let stats = &report.stats;
    let accuracy = report
        .accuracy()
        .map_or_else(|| "n/a".to_string(), |acc| format!("{acc:.4}"));
    format!(
        "Run: {}\nTasks: {}\nExecuted: {}\nCached: {}\nFailed: {}\nAccuracy: {}\n",
        report.run_id, stats.total, stats.executed, stats.cached, stats.failed, accuracy
    )
}

/// Render one checkpoint for the `show` subcommand
pub(crate) fn render_entry(entry: &CheckpointEntry) -> String {
    let mut out = String::new();
    out.push_str(&format!("task: {}\n", entry.task.id));
    out.push_str(&format!("statement: {}\n", entry.task.statement));
    out.push_str(&format!("completed: {}\n", entry.completed_at.to_rfc3339()));

    out.push_str("plans:\n");
    for plan in &entry.log.plans {
        let legal: Vec<String> = plan.legal_next.iter().map(ToString::to_string).collect();
        out.push_str(&format!("  after {} chose {} from [{}]\n", plan.last_operation, plan.next, legal.join(", ")));
    }

    let snapshot = &entry.result.snapshot;
    let trace: Vec<String> = snapshot.trace().iter().map(ToString::to_string).collect();
    out.push_str(&format!("trace: {}\n", trace.join(" -> ")));
    out.push_str(&format!("audit: {}\n", snapshot.audit_trace().join(" -> ")));
    out.push_str(&format!("verdict: {}\n", entry.result.answer.verdict));
    if let Some(label) = entry.task.label {
        out.push_str(&format!("label: {label} ({})\n", if entry.result.matches_label(label) { "match" } else { "miss" }));
    }
    out
}
