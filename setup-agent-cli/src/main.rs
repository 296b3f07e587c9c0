//! # setup-agent CLI
//!
//! Usage:
//!   setup-agent setup run [OPTIONS]
//!   setup-agent self install [--dist-dir DIR] [--bin-dir DIR] [--build-cmd CMD]
//!   setup-agent self uninstall
//!
//! Examples:
//!   setup-agent setup run --project-root ~/src/webapp
//!   setup-agent setup run --guideline-files README.md docs/INSTALL.md --task "run the dev server"
//!   setup-agent -v setup run --model openai:gpt-4o --temperature 0.2

use clap::{Args, Parser, Subcommand};
use setup_agent_core::distribution::{
    InstallOptions, Installer, UninstallOptions, UninstallReport, Uninstaller,
};
use setup_agent_core::{
    load_dotenv, Observability, Prompter, PtyOptions, Runtime, SetupConfig, ShellOptions,
    ShellRegistry, TerminalPrompter, WebSearch, Workflow,
};
use setup_agent_error::Result;
use setup_agent_llm::{
    AnyProvider, LlmSettings, ModelSpec, StructuredLlm, MAX_RETRIES, SUGGESTED_MODELS,
};
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use tracing::Instrument;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "setup-agent")]
#[command(author, version, about = "setup-agent - sets up and runs projects from their docs")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Set up a project
    Setup {
        #[command(subcommand)]
        command: SetupCommand,
    },
    /// Manage this installation of setup-agent
    #[command(name = "self")]
    SelfManage {
        #[command(subcommand)]
        command: SelfCommand,
    },
}

#[derive(Subcommand)]
enum SetupCommand {
    /// Run the setup workflow; missing values are asked for
    Run(RunArgs),
}

#[derive(Args, Default)]
struct RunArgs {
    /// Project to set up
    #[arg(long)]
    project_root: Option<PathBuf>,

    /// Guideline files, relative to the project root; skips discovery
    #[arg(long, num_args = 1..)]
    guideline_files: Vec<PathBuf>,

    /// Task to perform; skips task identification
    #[arg(long)]
    task: Option<String>,

    /// Model as provider:model, e.g. anthropic:claude-sonnet-4-5
    #[arg(long)]
    model: Option<String>,

    #[arg(long)]
    temperature: Option<f32>,

    #[arg(long)]
    max_output_tokens: Option<usize>,

    /// Request timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    #[arg(long)]
    max_retries: Option<u32>,

    /// Shell transcript file
    #[arg(long)]
    log_file: Option<PathBuf>,
}

impl RunArgs {
    fn has_tuning(&self) -> bool {
        self.temperature.is_some()
            || self.max_output_tokens.is_some()
            || self.timeout.is_some()
            || self.max_retries.is_some()
    }
}

#[derive(Subcommand)]
enum SelfCommand {
    /// Install the release artifact into the user bin directory
    Install {
        /// Directory holding release artifacts
        #[arg(long)]
        dist_dir: Option<PathBuf>,

        #[arg(long)]
        bin_dir: Option<PathBuf>,

        /// Command that produces an artifact when none exists
        #[arg(long)]
        build_cmd: Option<String>,
    },
    /// Remove setup-agent and its PATH entries
    Uninstall,
}

fn init_tracing(verbose: bool, quiet: bool) {
    let level = if quiet {
        "error"
    } else if verbose {
        "debug"
    } else {
        "info"
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

const CUSTOM_MODEL: &str = "Other: (Enter model identifier)";

/// Ask until the answer is empty or parses and passes `check`
fn ask_optional<T: FromStr>(
    prompter: &dyn Prompter,
    message: &str,
    error: &str,
    check: fn(&T) -> bool,
) -> Result<Option<T>> {
    let validate = |text: &str| {
        let text = text.trim();
        if text.is_empty() || text.parse::<T>().ok().is_some_and(|v| check(&v)) {
            Ok(())
        } else {
            Err(error.to_string())
        }
    };
    let answer = prompter.input_validated(message, &validate)?;
    Ok(answer.trim().parse::<T>().ok())
}

fn ask_project_root(prompter: &dyn Prompter) -> Result<PathBuf> {
    let validate = |text: &str| {
        let text = text.trim();
        if text.is_empty() || Path::new(text).is_dir() {
            Ok(())
        } else {
            Err("Path is not a directory.".to_string())
        }
    };
    let answer = prompter.input_validated(
        "Project root directory (Enter for the current directory):",
        &validate,
    )?;
    Ok(match answer.trim() {
        "" => PathBuf::from("."),
        path => PathBuf::from(path),
    })
}

fn ask_model(prompter: &dyn Prompter) -> Result<String> {
    let mut choices: Vec<String> = SUGGESTED_MODELS
        .iter()
        .map(|m| format!("{} [{}]", m.label, m.id))
        .collect();
    choices.push(CUSTOM_MODEL.to_string());

    let picked = prompter.select("Select the model:", &choices, 0)?;
    if let Some(model) = SUGGESTED_MODELS.get(picked) {
        return Ok(model.id.to_string());
    }

    let validate = |text: &str| ModelSpec::parse(text).map(|_| ()).map_err(|e| e.to_string());
    let model = prompter.input_validated("Model (provider:model):", &validate)?;
    Ok(model.trim().to_string())
}

fn ask_tuning(prompter: &dyn Prompter, llm: &mut LlmSettings) -> Result<()> {
    if !prompter.confirm("Configure advanced model parameters?", false)? {
        return Ok(());
    }
    llm.temperature = ask_optional(
        prompter,
        "Temperature (0.0-1.0, Enter to skip):",
        "Enter a number between 0.0 and 1.0.",
        |t: &f32| (0.0..=1.0).contains(t),
    )?;
    llm.max_output_tokens = ask_optional(
        prompter,
        "Max output tokens (Enter to skip):",
        "Enter a positive whole number.",
        |n: &usize| *n > 0,
    )?;
    llm.timeout_secs = ask_optional(
        prompter,
        "Request timeout in seconds (Enter to skip):",
        "Enter a positive whole number.",
        |n: &u64| *n > 0,
    )?;
    if let Some(retries) = ask_optional(
        prompter,
        "Max retries (Enter to keep the default):",
        "Enter a whole number from 0 to 10.",
        |n: &u32| *n <= MAX_RETRIES,
    )? {
        llm.max_retries = retries;
    }
    Ok(())
}

/// Flags win; anything missing is asked for when `interactive`
fn resolve_config(
    args: RunArgs,
    prompter: &dyn Prompter,
    interactive: bool,
) -> Result<SetupConfig> {
    let project_root = match &args.project_root {
        Some(root) => root.clone(),
        None if interactive => ask_project_root(prompter)?,
        None => PathBuf::from("."),
    };
    let mut config = SetupConfig::new(&project_root)?;

    let mut guideline_files = args.guideline_files.clone();
    if guideline_files.is_empty() && interactive {
        let answer = prompter.input(
            "Guideline files, comma-separated (Enter to discover them automatically):",
        )?;
        guideline_files = answer
            .split(',')
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .map(PathBuf::from)
            .collect();
    }
    config = config.with_guideline_files(guideline_files);

    let task = match &args.task {
        Some(task) => Some(task.clone()),
        None if interactive => Some(
            prompter.input("Task to perform (Enter to pick one from the documentation):")?,
        ),
        None => None,
    };
    config = config.with_task(task);

    let mut llm = LlmSettings::default();
    match &args.model {
        Some(model) => llm.model = model.clone(),
        None if interactive => llm.model = ask_model(prompter)?,
        None => {}
    }
    if args.has_tuning() {
        llm.temperature = args.temperature;
        llm.max_output_tokens = args.max_output_tokens;
        llm.timeout_secs = args.timeout;
        if let Some(retries) = args.max_retries {
            llm.max_retries = retries;
        }
    } else if interactive {
        ask_tuning(prompter, &mut llm)?;
    }

    let config = config.with_llm(llm).with_log_file(args.log_file);
    config.validate()?;
    Ok(config)
}

async fn run_setup(args: RunArgs) -> Result<()> {
    let prompter = Arc::new(TerminalPrompter::new());
    let interactive = std::io::stdin().is_terminal();
    let config = resolve_config(args, prompter.as_ref(), interactive)?;
    tracing::info!(
        project_root = %config.project_root.display(),
        model = %config.llm.model,
        "starting setup"
    );

    let provider = AnyProvider::from_settings(&config.llm)?;
    let llm = StructuredLlm::new(provider, config.llm.clone());
    let shell_options = ShellOptions {
        log_file: config.log_file.clone(),
        ..Default::default()
    };
    let pty = PtyOptions {
        cwd: Some(config.project_root.clone()),
        ..Default::default()
    };
    let shells = ShellRegistry::with_pty(shell_options, pty).await?;
    let search = WebSearch::from_env()?;

    let mut rt = Runtime::new(config, llm, prompter, shells)?.with_search(search);
    let observability = Observability::from_env();
    if let Some(project) = &observability.project {
        tracing::info!(project = %project, "LangSmith runs are tagged in logs, not exported");
    }
    let state = Workflow::new()
        .run(&mut rt)
        .instrument(observability.span())
        .await?;

    let usage = rt.llm.usage();
    println!(
        "\nFinished tasks: {}",
        if state.finished_tasks.is_empty() {
            "none".to_string()
        } else {
            state.finished_tasks.join(", ")
        }
    );
    println!(
        "LLM calls: {} ({} tokens)",
        usage.total_calls,
        usage.total_tokens()
    );
    Ok(())
}

fn run_install(
    dist_dir: Option<PathBuf>,
    bin_dir: Option<PathBuf>,
    build_cmd: Option<String>,
) -> Result<()> {
    let mut options = InstallOptions::for_user()?;
    if let Some(dir) = dist_dir {
        options.dist_dir = dir;
    }
    if let Some(dir) = bin_dir {
        options.bin_dir = dir;
    }
    if build_cmd.is_some() {
        options.build_command = build_cmd;
    }

    let report = Installer::new(options).run()?;
    if report.built {
        println!("Built {}", report.artifact.display());
    }
    println!("Installed {}", report.binary.display());
    for rc in &report.rc_updated {
        println!("Added PATH entry to {}", rc.display());
    }
    if !report.rc_updated.is_empty() {
        println!("Open a new shell or source your rc file to use setup-agent.");
    }
    Ok(())
}

fn run_uninstall() -> Result<()> {
    match Uninstaller::new(UninstallOptions::for_user()?).run()? {
        UninstallReport::NotInstalled => {
            println!("setup-agent is not installed; nothing to remove.");
        }
        UninstallReport::Removed {
            binaries,
            rc_cleaned,
        } => {
            for binary in binaries {
                println!("Removed {}", binary.display());
            }
            for rc in rc_cleaned {
                println!("Removed PATH entry from {}", rc.display());
            }
        }
    }
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Setup {
            command: SetupCommand::Run(args),
        } => run_setup(args).await,
        Commands::SelfManage { command } => match command {
            SelfCommand::Install {
                dist_dir,
                bin_dir,
                build_cmd,
            } => run_install(dist_dir, bin_dir, build_cmd),
            SelfCommand::Uninstall => run_uninstall(),
        },
    }
}

#[tokio::main]
async fn main() {
    load_dotenv();
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    if let Err(e) = run(cli).await {
        tracing::debug!("{:?}", e);
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
