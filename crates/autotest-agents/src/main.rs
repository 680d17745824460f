//! `autotest` — requirement in, executed browser test and report out.
//!
//! ```bash
//! # Whole pipeline
//! autotest pipeline --requirement-file login.txt --url https://app.example/login
//!
//! # Step by step
//! autotest generate --requirement "Users can log in" --out cases.json
//! autotest script --cases cases.json --url https://app.example/login --out test_login.py
//! autotest run --script test_login.py --save-result result.json
//! autotest report --result result.json --format json
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use autotest_agents::{AutotestConfig, Session};
use autotest_engine::{Delta, ExecutionOptions, ExecutionReport, ExecutionResult, ProcessRunner};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde_json::Value;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "autotest", author, version, about, long_about = None)]
struct Cli {
    /// TOML configuration file (environment variables still take precedence)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate test cases from a requirement (Stage A)
    Generate {
        #[command(flatten)]
        requirement: RequirementArgs,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Generate a script from a test case file (Stage B)
    Script {
        /// JSON array of test cases, e.g. the output of `generate`
        #[arg(long)]
        cases: PathBuf,
        /// Edit delta applied over the test cases before generation
        #[arg(long)]
        delta: Option<PathBuf>,
        /// Page the script will drive
        #[arg(long)]
        url: String,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Execute a script and report the outcome
    Run {
        #[arg(long)]
        script: PathBuf,
        #[command(flatten)]
        execution: ExecutionArgs,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Requirement to report in one go
    Pipeline {
        #[command(flatten)]
        requirement: RequirementArgs,
        /// Edit delta applied over the generated test cases
        #[arg(long)]
        delta: Option<PathBuf>,
        #[arg(long)]
        url: String,
        /// Also write the generated script here
        #[arg(long)]
        save_script: Option<PathBuf>,
        #[command(flatten)]
        execution: ExecutionArgs,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Render a report from a saved execution result
    Report {
        /// JSON execution result written by `run --save-result`
        #[arg(long)]
        result: PathBuf,
        #[command(flatten)]
        output: OutputArgs,
    },
}

#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
struct RequirementArgs {
    /// Requirement text
    #[arg(long)]
    requirement: Option<String>,
    /// File holding the requirement text
    #[arg(long)]
    requirement_file: Option<PathBuf>,
}

impl RequirementArgs {
    fn text(&self) -> Result<String> {
        match (&self.requirement, &self.requirement_file) {
            (Some(text), _) => Ok(text.clone()),
            (None, Some(path)) => std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read requirement from {}", path.display())),
            (None, None) => anyhow::bail!("a requirement is needed"),
        }
    }
}

#[derive(Args, Debug)]
struct ExecutionArgs {
    /// Show the browser instead of passing --headless to the script
    #[arg(long, default_value_t = false)]
    headed: bool,
    /// Wall-clock budget in seconds (overrides the configured execution timeout)
    #[arg(long)]
    timeout: Option<u64>,
    /// Write the raw execution result as JSON
    #[arg(long)]
    save_result: Option<PathBuf>,
    /// Extra arguments passed to the script after `--`
    #[arg(last = true)]
    script_args: Vec<String>,
}

impl ExecutionArgs {
    fn options(&self) -> ExecutionOptions {
        ExecutionOptions {
            headless: !self.headed,
            extra_args: self.script_args.clone(),
        }
    }
}

#[derive(Args, Debug)]
struct OutputArgs {
    /// Write output here instead of stdout
    #[arg(long)]
    out: Option<PathBuf>,
    #[arg(long, value_enum, default_value_t = OutputFormat::Markdown)]
    format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Markdown,
    Json,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            tracing::warn!(error = %e, "failed to load .env file");
        }
    }

    let cli = Cli::parse();
    let mut config =
        AutotestConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;

    match cli.command {
        Command::Generate {
            requirement,
            output,
        } => {
            let mut session = Session::from_config(&config)?;
            let text = requirement.text()?;
            session.generate_test_cases(&text).await?;
            let cases = serde_json::to_string_pretty(session.raw_test_cases())?;
            emit(output.out.as_deref(), &cases)?;
        }

        Command::Script {
            cases,
            delta,
            url,
            output,
        } => {
            let mut session = Session::from_config(&config)?;
            let cases = read_cases(&cases)?;
            let version = session.import_test_cases(cases)?.version;
            if let Some(path) = delta {
                session.apply_edits(version, &read_delta(&path)?)?;
            }
            let artifact = session.generate_script(&url).await?;
            emit(output.out.as_deref(), &artifact.code)?;
        }

        Command::Run {
            script,
            execution,
            output,
        } => {
            if let Some(secs) = execution.timeout {
                config.runner.timeout_secs = secs;
            }
            let code = std::fs::read_to_string(&script)
                .with_context(|| format!("Failed to read script {}", script.display()))?;
            let runner = ProcessRunner::new(config.runner.clone());
            let result = runner.run_default(&code, &execution.options()).await;
            finish(&result, execution.save_result.as_deref(), &output)?;
        }

        Command::Pipeline {
            requirement,
            delta,
            url,
            save_script,
            execution,
            output,
        } => {
            if let Some(secs) = execution.timeout {
                config.runner.timeout_secs = secs;
            }
            let mut session = Session::from_config(&config)?;
            let text = requirement.text()?;

            let version = session.generate_test_cases(&text).await?.version;
            if let Some(path) = delta {
                session.apply_edits(version, &read_delta(&path)?)?;
            }
            let artifact = session.generate_script(&url).await?;
            if let Some(path) = save_script {
                std::fs::write(&path, &artifact.code)
                    .with_context(|| format!("Failed to write script to {}", path.display()))?;
            }
            let result = session.execute(&execution.options()).await?.clone();
            info!(summary = %session.machine().summary(), "pipeline finished");
            finish(&result, execution.save_result.as_deref(), &output)?;
        }

        Command::Report { result, output } => {
            let text = std::fs::read_to_string(&result)
                .with_context(|| format!("Failed to read execution result {}", result.display()))?;
            let result: ExecutionResult =
                serde_json::from_str(&text).context("Execution result is not valid JSON")?;
            emit_report(&ExecutionReport::from_result(&result), &output)?;
        }
    }

    Ok(())
}

fn read_cases(path: &Path) -> Result<Vec<Value>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read test cases from {}", path.display()))?;
    match serde_json::from_str(&text).context("Test case file is not valid JSON")? {
        Value::Array(cases) => Ok(cases),
        _ => anyhow::bail!("{} must contain a JSON array of test cases", path.display()),
    }
}

fn read_delta(path: &Path) -> Result<Delta> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read delta from {}", path.display()))?;
    let value: Value = serde_json::from_str(&text).context("Delta file is not valid JSON")?;
    Ok(Delta::from_value(&value))
}

fn finish(result: &ExecutionResult, save_result: Option<&Path>, output: &OutputArgs) -> Result<()> {
    if let Some(path) = save_result {
        std::fs::write(path, serde_json::to_string_pretty(result)?)
            .with_context(|| format!("Failed to write execution result to {}", path.display()))?;
    }
    emit_report(&ExecutionReport::from_result(result), output)
}

fn emit_report(report: &ExecutionReport, output: &OutputArgs) -> Result<()> {
    let text = match output.format {
        OutputFormat::Markdown => report.render_markdown(),
        OutputFormat::Json => report.to_json()?,
    };
    emit(output.out.as_deref(), &text)
}

fn emit(out: Option<&Path>, text: &str) -> Result<()> {
    match out {
        Some(path) => {
            std::fs::write(path, text)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!(path = %path.display(), "output written");
        }
        None => println!("{text}"),
    }
    Ok(())
}
