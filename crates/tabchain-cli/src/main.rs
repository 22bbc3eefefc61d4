//! `tabchain` command-line runner
//!
//! - `run`: verify every statement of a JSONL dataset, resuming from the
//!   checkpoint cache under the output directory
//! - `show`: print the cached trace and planner decisions of one task

mod backend;
mod report;

use anyhow::{bail, Context};
use backend::{DryRunGenerator, OpenAiConfig, OpenAiGenerator};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tabchain_batch::{read_jsonl, BatchConfig, BatchExecutor, CheckpointStore, CleanedStatements};
use tabchain_core::{ChainConfig, ChainDriver, Generator, PlanStrategy, TaskId};
use tracing::info;
use tracing_subscriber::EnvFilter;

const CACHE_DIR: &str = "cache";

fn cli() -> Command {
    Command::new("tabchain")
        .version(tabchain_core::VERSION)
        .about("Table fact verification through dynamic operation chains")
        .subcommand_required(true)
        .arg(
            Arg::new("log-json")
                .long("log-json")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON lines"),
        )
        .subcommand(
            Command::new("run")
                .about("Run a dataset through the chain")
                .arg(
                    Arg::new("dataset")
                        .long("dataset")
                        .default_value("data/tabfact/test.jsonl")
                        .value_parser(value_parser!(PathBuf))
                        .help("TabFact-style JSONL file"),
                )
                .arg(
                    Arg::new("output-dir")
                        .long("output-dir")
                        .default_value("results/tabfact")
                        .value_parser(value_parser!(PathBuf))
                        .help("Directory for the checkpoint cache and results"),
                )
                .arg(
                    Arg::new("backend")
                        .long("backend")
                        .default_value("openai")
                        .value_parser(["openai", "dry-run"])
                        .help("Generator backend"),
                )
                .arg(
                    Arg::new("model")
                        .long("model")
                        .default_value("gpt-3.5-turbo-16k-0613")
                        .help("Model name for the openai backend"),
                )
                .arg(
                    Arg::new("api-key")
                        .long("api-key")
                        .env("OPENAI_API_KEY")
                        .hide_env_values(true)
                        .help("API key for the openai backend"),
                )
                .arg(
                    Arg::new("base-url")
                        .long("base-url")
                        .env("OPENAI_BASE_URL")
                        .help("OpenAI-compatible endpoint"),
                )
                .arg(
                    Arg::new("raw2clean")
                        .long("raw2clean")
                        .value_parser(value_parser!(PathBuf))
                        .help("JSONL of statement / cleaned_statement pairs"),
                )
                .arg(
                    Arg::new("workers")
                        .long("workers")
                        .value_parser(value_parser!(usize))
                        .help("Concurrent tasks [default: 10]"),
                )
                .arg(
                    Arg::new("chunk-size")
                        .long("chunk-size")
                        .value_parser(value_parser!(usize))
                        .help("Tasks per queued job [default: 1]"),
                )
                .arg(
                    Arg::new("strategy")
                        .long("strategy")
                        .value_parser(["top", "voting"])
                        .help("Planner strategy (overrides the config file)"),
                )
                .arg(
                    Arg::new("first-n")
                        .long("first-n")
                        .value_parser(value_parser!(usize))
                        .help("Only run the first N records"),
                )
                .arg(
                    Arg::new("config")
                        .long("config")
                        .value_parser(value_parser!(PathBuf))
                        .help("ChainConfig JSON file"),
                ),
        )
        .subcommand(
            Command::new("show")
                .about("Show the cached chain of one task")
                .arg(
                    Arg::new("output-dir")
                        .long("output-dir")
                        .default_value("results/tabfact")
                        .value_parser(value_parser!(PathBuf))
                        .help("Directory holding the checkpoint cache"),
                )
                .arg(Arg::new("id").required(true).help("Task identity, e.g. test-12")),
        )
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<ChainConfig> {
    let Some(path) = path else {
        return Ok(ChainConfig::default());
    };
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

fn build_generator(args: &ArgMatches) -> anyhow::Result<Arc<dyn Generator>> {
    match args.get_one::<String>("backend").map(String::as_str) {
        Some("dry-run") => Ok(Arc::new(DryRunGenerator)),
        Some("openai") | None => {
            let Some(key) = args.get_one::<String>("api-key") else {
                bail!("the openai backend needs --api-key or OPENAI_API_KEY");
            };
            let model = args
                .get_one::<String>("model")
                .context("missing --model")?;
            let mut config = OpenAiConfig::new(key.as_str(), model.as_str());
            if let Some(base_url) = args.get_one::<String>("base-url") {
                config = config.with_base_url(base_url.as_str());
            }
            Ok(Arc::new(OpenAiGenerator::new(config).context("building HTTP client")?))
        }
        Some(other) => bail!("unknown backend {other}"),
    }
}

fn batch_config(args: &ArgMatches) -> BatchConfig {
    let defaults = BatchConfig::default();
    let workers = args.get_one::<usize>("workers").copied().unwrap_or(defaults.workers);
    let chunk_size = args
        .get_one::<usize>("chunk-size")
        .copied()
        .unwrap_or(defaults.chunk_size);
    defaults.with_workers(workers).with_chunk_size(chunk_size)
}

fn dataset_tag(path: &Path) -> String {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("task")
        .to_string()
}

async fn run(args: &ArgMatches) -> anyhow::Result<()> {
    let dataset = args.get_one::<PathBuf>("dataset").context("missing --dataset")?;
    let output_dir = args.get_one::<PathBuf>("output-dir").context("missing --output-dir")?;

    let mut config = load_config(args.get_one::<PathBuf>("config"))?;
    if let Some(strategy) = args.get_one::<String>("strategy") {
        let strategy: PlanStrategy = strategy.parse().map_err(anyhow::Error::msg)?;
        config = config.with_plan_strategy(strategy);
    }
    let batch = batch_config(args);

    let mut tasks = read_jsonl(dataset, &dataset_tag(dataset), args.get_one::<usize>("first-n").copied())
        .with_context(|| format!("loading {}", dataset.display()))?;
    if let Some(path) = args.get_one::<PathBuf>("raw2clean") {
        let cleaned = CleanedStatements::read(path).with_context(|| format!("loading {}", path.display()))?;
        let merged = cleaned.merge_into(&mut tasks);
        info!("cleaned statements found for {} of {} tasks", merged, tasks.len());
    }
    let generator = build_generator(args)?;
    info!(
        "running {} tasks with the {} backend, plan strategy {}",
        tasks.len(),
        generator.name(),
        config.plan_strategy
    );

    let store = CheckpointStore::open(output_dir.join(CACHE_DIR))?;
    let executor = BatchExecutor::new(ChainDriver::new(generator, config), store, batch);
    let report = executor.run(tasks).await;

    report::write_outputs(output_dir, &report)?;
    print!("{}", report::summary(&report));
    Ok(())
}

async fn show(args: &ArgMatches) -> anyhow::Result<()> {
    let output_dir = args.get_one::<PathBuf>("output-dir").context("missing --output-dir")?;
    let id = args.get_one::<String>("id").context("missing task id")?;

    let store = CheckpointStore::open(output_dir.join(CACHE_DIR))?;
    let Some(entry) = store.load(&TaskId::new(id.as_str())).await? else {
        bail!("no checkpoint for {id} under {}", store.dir().display());
    };
    print!("{}", report::render_entry(&entry));
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = cli().get_matches();
    init_tracing(matches.get_flag("log-json"));

    match matches.subcommand() {
        Some(("run", args)) => run(args).await,
        Some(("show", args)) => show(args).await,
        _ => bail!("unknown subcommand"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn command_definition_is_valid() {
        cli().debug_assert();
    }

    #[test]
    fn run_arguments_parse() {
        let matches = cli()
            .try_get_matches_from([
                "tabchain", "run", "--backend", "dry-run", "--workers", "4", "--strategy", "voting",
                "--first-n", "10",
            ])
            .unwrap();
        let (name, args) = matches.subcommand().unwrap();

        assert_eq!(name, "run");
        assert_eq!(args.get_one::<usize>("workers"), Some(&4));
        assert_eq!(args.get_one::<usize>("first-n"), Some(&10));
        assert_eq!(args.get_one::<String>("strategy").map(String::as_str), Some("voting"));
    }

    #[test]
    fn batch_defaults_match_the_executor() {
        let matches = cli().try_get_matches_from(["tabchain", "run"]).unwrap();
        let (_, args) = matches.subcommand().unwrap();
        assert_eq!(batch_config(args), BatchConfig::default());

        let matches = cli()
            .try_get_matches_from(["tabchain", "run", "--workers", "3", "--chunk-size", "0"])
            .unwrap();
        let (_, args) = matches.subcommand().unwrap();
        assert_eq!(batch_config(args), BatchConfig { workers: 3, chunk_size: 1 });
    }

    #[test]
    fn unknown_backend_is_rejected() {
        let parsed = cli().try_get_matches_from(["tabchain", "run", "--backend", "local"]);
        assert!(parsed.is_err());
    }

    #[test]
    fn tag_comes_from_file_stem() {
        assert_eq!(dataset_tag(Path::new("data/tabfact/test.jsonl")), "test");
    }

    #[test]
    fn config_file_overrides_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"max_steps": 3, "plan_strategy": "voting"}}"#).unwrap();

        let config = load_config(Some(&file.path().to_path_buf())).unwrap();
        assert_eq!(config.max_steps, 3);
        assert_eq!(config.plan_strategy, PlanStrategy::Voting);
        assert_eq!(config.apply, ChainConfig::default().apply);
    }

    #[tokio::test]
    async fn dry_run_writes_results_and_cache() {
        let dir = tempfile::tempdir().unwrap();
        let dataset = dir.path().join("sample.jsonl");
        std::fs::write(
            &dataset,
            r#"{"statement": "2001 has the lowest score", "table_text": [["year", "score"], ["1999", "10"], ["2001", "5"]], "label": 1}
"#,
        )
        .unwrap();
        let raw2clean = dir.path().join("raw2clean.jsonl");
        std::fs::write(
            &raw2clean,
            r#"{"statement": "2001 has the lowest score", "cleaned_statement": "2001 scored lowest"}
"#,
        )
        .unwrap();
        let output = dir.path().join("out");

        let matches = cli()
            .try_get_matches_from([
                "tabchain",
                "run",
                "--backend",
                "dry-run",
                "--dataset",
                dataset.to_str().unwrap(),
                "--output-dir",
                output.to_str().unwrap(),
                "--raw2clean",
                raw2clean.to_str().unwrap(),
            ])
            .unwrap();
        let (_, args) = matches.subcommand().unwrap();
        run(args).await.unwrap();

        let lines = std::fs::read_to_string(output.join("results.jsonl")).unwrap();
        let line: serde_json::Value = serde_json::from_str(lines.trim()).unwrap();
        assert_eq!(line["id"], "sample-0");
        assert_eq!(line["label"], 1);
        assert!(std::fs::read_to_string(output.join("result.txt"))
            .unwrap()
            .contains("Accuracy: 0.0000"));

        let store = CheckpointStore::open(output.join(CACHE_DIR)).unwrap();
        let entry = store.load(&TaskId::new("sample-0")).await.unwrap().unwrap();
        assert!(report::render_entry(&entry).contains("task: sample-0\n"));
        assert_eq!(entry.task.cleaned_statement.as_deref(), Some("2001 scored lowest"));
    }
}
