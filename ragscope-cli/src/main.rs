// Copyright 2025 Sushanth (https://github.com/sushanthpy)
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Ragscope CLI
//!
//! Evaluates a question-answering batch from CSV and prints report summaries.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use ragscope_core::{read_input_csv, read_report_csv, write_report_csv, EvaluationReport, Summary};
use ragscope_evals::{EvalOptions, EvalSettings, EvaluationOrchestrator};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "ragscope")]
#[command(about = "Ragscope - RAG, safety and lexical evaluation", long_about = None)]
struct Cli {
    /// Verbose mode
    #[arg(short, long)]
    verbose: bool,

    /// Output as JSON (machine-readable)
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate an input CSV and write the report
    Evaluate(EvaluateArgs),

    /// Print the summary of a persisted report
    Summary {
        /// Report CSV
        #[arg(long, default_value = "output_results.csv")]
        report: PathBuf,

        /// Comma-separated metric columns (default: every metric column)
        #[arg(long, value_delimiter = ',')]
        metrics: Vec<String>,
    },
}

#[derive(Args, Debug, Clone)]
struct EvaluateArgs {
    /// Input CSV with question, answer, ground_truth and context columns
    #[arg(short, long)]
    input: PathBuf,

    /// Report CSV to write
    #[arg(short, long, default_value = "output_results.csv")]
    output: PathBuf,

    /// Evaluation settings (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Judge model identifier (overrides settings)
    #[arg(long)]
    judge_model: Option<String>,

    /// Maximum concurrent judge calls per family (overrides settings)
    #[arg(long)]
    max_concurrent: Option<usize>,

    /// Skip retrieval-quality metrics
    #[arg(long)]
    no_rag: bool,

    /// Skip safety metrics
    #[arg(long)]
    no_safety: bool,

    /// Skip lexical metrics
    #[arg(long)]
    no_nlp: bool,
}

impl EvaluateArgs {
    fn options(&self) -> EvalOptions {
        EvalOptions {
            include_rag: !self.no_rag,
            include_safety: !self.no_safety,
            include_nlp: !self.no_nlp,
        }
    }
}

async fn evaluate(args: &EvaluateArgs) -> Result<EvaluationReport> {
    let input = read_input_csv(&args.input)
        .with_context(|| format!("Failed to read input {:?}", args.input))?;
    let options = args.options();

    let orchestrator = if options.include_rag || options.include_safety {
        let mut settings =
            EvalSettings::load(args.config.clone()).context("Failed to load evaluation settings")?;
        if let Some(model) = &args.judge_model {
            settings.judge.model = model.clone();
        }
        if let Some(max_concurrent) = args.max_concurrent {
            settings.evaluation.max_concurrent = max_concurrent;
        }
        EvaluationOrchestrator::from_settings(&settings, options)
            .context("Invalid evaluation settings")?
    } else {
        EvaluationOrchestrator::new()
    };

    let report = orchestrator
        .evaluate_with_base(&input.batch, input.columns, options)
        .await
        .context("Evaluation failed")?;

    write_report_csv(&args.output, &report)
        .with_context(|| format!("Failed to write report {:?}", args.output))?;
    info!("Report written to {:?}", args.output);
    Ok(report)
}

fn format_summary(summary: &Summary) -> String {
    let width = summary
        .metrics
        .iter()
        .map(|(name, _)| name.len())
        .max()
        .unwrap_or(0)
        .max("total_samples".len());

    let mut out = format!("{:<width$}  {}\n", "total_samples", summary.total_samples);
    for (name, value) in &summary.metrics {
        match value {
            Some(v) => out.push_str(&format!("{:<width$}  {:.4}\n", name, v)),
            None => out.push_str(&format!("{:<width$}  -\n", name)),
        }
    }
    out
}

fn print_summary(summary: &Summary, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(summary)?);
    } else {
        print!("{}", format_summary(summary));
    }
    Ok(())
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "ragscope=debug,ragscope_evals=debug,ragscope_core=debug"
    } else {
        "ragscope=info,ragscope_evals=info,ragscope_core=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Evaluate(args) => {
            let report = evaluate(&args).await?;
            if !cli.json {
                println!("✓ Evaluated {} samples, results saved to {:?}", report.rows(), args.output);
                for failure in report.failures() {
                    println!("✗ {} metrics skipped ({}): {}", failure.family, failure.kind, failure.message);
                }
            }
            print_summary(&report.summary(), cli.json)?;
        }

        Commands::Summary { report, metrics } => {
            let loaded = read_report_csv(&report)
                .with_context(|| format!("Failed to read report {:?}", report))?;
            let summary = if metrics.is_empty() {
                loaded.summary()
            } else {
                Summary::for_metrics(&loaded, &metrics)
            };
            print_summary(&summary, cli.json)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_evaluate_flags() {
        let cli = Cli::try_parse_from([
            "ragscope", "evaluate", "--input", "in.csv", "--no-rag", "--no-safety",
        ])
        .unwrap();
        match cli.command {
            Commands::Evaluate(args) => {
                assert_eq!(args.output, PathBuf::from("output_results.csv"));
                assert_eq!(
                    args.options(),
                    EvalOptions {
                        include_rag: false,
                        include_safety: false,
                        include_nlp: true,
                    }
                );
            }
            _ => panic!("expected evaluate"),
        }
    }

    #[test]
    fn test_format_summary() {
        let summary = Summary {
            total_samples: 3,
            metrics: vec![
                ("nlp_bleu".to_string(), Some(0.5)),
                ("safety_bias".to_string(), None),
            ],
        };
        let text = format_summary(&summary);
        assert!(text.contains("total_samples  3"));
        assert!(text.contains("nlp_bleu       0.5000"));
        assert!(text.contains("safety_bias    -"));
    }

    #[tokio::test]
    async fn test_evaluate_lexical_only_keeps_input_columns() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("input.csv");
        std::fs::write(
            &input,
            "ID,Question,Answer,Ground_Truth,Context\n\
             1,Capital of France?,Paris,paris,\"[\"\"Paris is in France\"\"]\"\n\
             2,Capital of Italy?,Rome is the capital,Rome,Italy\n",
        )
        .unwrap();
        let output = dir.path().join("out").join("results.csv");

        let args = EvaluateArgs {
            input,
            output: output.clone(),
            config: None,
            judge_model: None,
            max_concurrent: None,
            no_rag: true,
            no_safety: true,
            no_nlp: false,
        };
        let report = evaluate(&args).await.unwrap();
        assert_eq!(report.rows(), 2);
        assert!(report.failures().is_empty());

        let persisted = read_report_csv(&output).unwrap();
        let names = persisted.column_names();
        assert_eq!(&names[..5], &["id", "question", "answer", "ground_truth", "context"]);
        assert!(names.contains(&"nlp_exact_match"));
        assert_eq!(persisted.column("nlp_exact_match").unwrap().numeric_value(0), Some(1.0));
        assert_eq!(persisted.column("nlp_exact_match").unwrap().numeric_value(1), Some(0.0));
    }
}
