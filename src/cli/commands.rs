//! CLI command definitions for swe-harbor.
//!
//! Every harness option can also come from a `SWE_HARBOR_*` environment
//! variable, so the same binary works from a shell or from an orchestrator.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser};
use serde::Serialize;
use tracing::{info, warn};

use crate::harbor::{
    discover_tasks, AgentAsset, EnvDefaults, HarborConfig, Provisioner, TaskInstance, TaskState,
    DEFAULT_INSTALL_COMMAND,
};
use crate::sandbox::{DockerSandboxClient, RecordingSandbox, SandboxSpec};

/// Provision sandboxes for coding tasks and run the harbor agent in them.
#[derive(Parser)]
#[command(name = "swe-harbor")]
#[command(about = "Provision task sandboxes and run the harbor agent")]
#[command(version)]
#[command(
    long_about = "swe-harbor prepares a sandbox for one benchmark task: it uploads the task's instruction and starting files, installs the agent's runtime dependency, and uploads the harbor-agent executable.\n\nExample usage:\n  swe-harbor run --task ./tasks/clone-check\n  swe-harbor provision --sandbox my-container --task ./tasks/clone-check"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Print the environment the agent would receive, as JSON.
    Env(EnvArgs),

    /// List the tasks in the dataset.
    Tasks(TasksArgs),

    /// Provision an already-running sandbox container.
    Provision(ProvisionArgs),

    /// Create a container, provision it, run the agent, then remove it.
    Run(RunArgs),
}

/// Harness options shared by the subcommands.
#[derive(Args, Debug, Clone)]
pub struct HarborArgs {
    /// Directory holding one sub-directory per task.
    #[arg(long, env = "SWE_HARBOR_DATASET_PATH", default_value = "./tasks")]
    pub dataset_path: PathBuf,

    /// Comma-separated task names to include (default: all).
    #[arg(long, env = "SWE_HARBOR_TASKS", value_delimiter = ',')]
    pub tasks: Vec<String>,

    /// Working directory inside the sandbox.
    #[arg(long, env = "SWE_HARBOR_AGENT_WORKDIR", default_value = "/app")]
    pub agent_workdir: String,

    /// Image for containers created by `run`.
    #[arg(long, env = "SWE_HARBOR_DOCKER_IMAGE", default_value = "python:3.11-slim")]
    pub docker_image: String,

    /// Timeout for the agent run command, in seconds.
    #[arg(long, env = "SWE_HARBOR_TIMEOUT_SECONDS", default_value = "900")]
    pub timeout_seconds: u64,

    /// CPU limit for created containers.
    #[arg(long, env = "SWE_HARBOR_CPU_CORES", default_value = "2")]
    pub cpu_cores: f64,

    /// Memory limit for created containers, in GiB.
    #[arg(long, env = "SWE_HARBOR_MEMORY_GB", default_value = "4")]
    pub memory_gb: u64,

    /// Disk size in GiB (recorded; not enforced by the Docker backend).
    #[arg(long, env = "SWE_HARBOR_DISK_SIZE_GB", default_value = "10")]
    pub disk_size_gb: u64,

    /// Lifetime of created containers, in minutes.
    #[arg(long, env = "SWE_HARBOR_TIMEOUT_MINUTES", default_value = "60")]
    pub timeout_minutes: u64,

    /// Rollout turn cap of the surrounding harness.
    #[arg(long, env = "SWE_HARBOR_MAX_TURNS", default_value = "30")]
    pub max_turns: u32,

    /// Command that installs the agent's runtime dependency.
    #[arg(long, env = "SWE_HARBOR_INSTALL_COMMAND", default_value = DEFAULT_INSTALL_COMMAND)]
    pub install_command: String,

    /// Command that starts the agent (default: `<agent-workdir>/agent 2>&1`).
    #[arg(long, env = "SWE_HARBOR_RUN_COMMAND")]
    pub run_command: Option<String>,

    /// Path to the harbor-agent executable (default: next to this binary).
    ///
    /// Must be a Linux ELF binary. On macOS hosts, or hosts with a newer glibc
    /// than the image, build with `--target x86_64-unknown-linux-musl`.
    #[arg(long, env = "SWE_HARBOR_AGENT_BINARY")]
    pub agent_binary: Option<PathBuf>,
}

impl HarborArgs {
    pub fn to_config(&self) -> HarborConfig {
        HarborConfig {
            dataset_path: self.dataset_path.clone(),
            tasks: self.tasks.clone(),
            agent_workdir: self.agent_workdir.clone(),
            docker_image: self.docker_image.clone(),
            timeout_seconds: self.timeout_seconds,
            cpu_cores: self.cpu_cores,
            memory_gb: self.memory_gb,
            disk_size_gb: self.disk_size_gb,
            timeout_minutes: self.timeout_minutes,
            max_turns: self.max_turns,
            install_command: self.install_command.clone(),
            run_command: self.run_command.clone(),
        }
    }

    fn agent_asset(&self) -> anyhow::Result<AgentAsset> {
        let asset = match &self.agent_binary {
            Some(path) => AgentAsset::load(path)?,
            None => AgentAsset::locate()?,
        };
        Ok(asset)
    }
}

/// Arguments for `swe-harbor env`.
#[derive(Args, Debug)]
pub struct EnvArgs {
    /// Variable already injected by the infra (repeatable).
    #[arg(long = "set", value_name = "KEY=VALUE", value_parser = parse_key_val)]
    pub vars: Vec<(String, String)>,
}

/// Arguments for `swe-harbor tasks`.
#[derive(Args, Debug)]
pub struct TasksArgs {
    #[command(flatten)]
    pub harbor: HarborArgs,
}

/// Arguments for `swe-harbor provision`.
#[derive(Args, Debug)]
pub struct ProvisionArgs {
    /// Id or name of the running container.
    #[arg(long)]
    pub sandbox: String,

    /// Task directory whose assets are uploaded first.
    #[arg(long)]
    pub task: Option<PathBuf>,

    /// Print the operations instead of contacting Docker.
    #[arg(long)]
    pub dry_run: bool,

    #[command(flatten)]
    pub harbor: HarborArgs,
}

/// Arguments for `swe-harbor run`.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Task directory to run.
    #[arg(long)]
    pub task: PathBuf,

    /// Keep the container after the run.
    #[arg(long)]
    pub keep: bool,

    /// Variable injected into the task state (repeatable).
    #[arg(long = "set", value_name = "KEY=VALUE", value_parser = parse_key_val)]
    pub vars: Vec<(String, String)>,

    #[command(flatten)]
    pub harbor: HarborArgs,
}

/// Parse a `KEY=VALUE` pair. The value may be empty or contain `=`.
pub fn parse_key_val(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{}'", raw)),
    }
}

/// Parse command-line arguments.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Parse arguments and run the selected command.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with already-parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Env(args) => run_env_command(args),
        Commands::Tasks(args) => run_tasks_command(args),
        Commands::Provision(args) => run_provision_command(args).await,
        Commands::Run(args) => run_run_command(args).await,
    }
}

fn state_with_vars(sandbox_id: impl Into<String>, vars: &[(String, String)]) -> TaskState {
    vars.iter()
        .fold(TaskState::new(sandbox_id), |state, (k, v)| state.with_env(k, v))
}

fn run_env_command(args: EnvArgs) -> anyhow::Result<()> {
    let state = state_with_vars("", &args.vars);
    let env = crate::harbor::resolve_environment(&state, &EnvDefaults::from_host());
    println!("{}", serde_json::to_string_pretty(&env)?);
    Ok(())
}

#[derive(Serialize)]
struct TaskListing<'a> {
    name: &'a str,
    path: String,
    has_environment: bool,
    has_tests: bool,
}

fn run_tasks_command(args: TasksArgs) -> anyhow::Result<()> {
    let config = args.harbor.to_config();
    let tasks = discover_tasks(&config.dataset_path, &config.tasks)?;
    for task in &tasks {
        let listing = TaskListing {
            name: &task.name,
            path: task.dir.display().to_string(),
            has_environment: task.environment_dir.is_some(),
            has_tests: task.tests_dir.is_some(),
        };
        println!("{}", serde_json::to_string(&listing)?);
    }
    info!(count = tasks.len(), "Listed tasks");
    Ok(())
}

async fn run_provision_command(args: ProvisionArgs) -> anyhow::Result<()> {
    let config = args.harbor.to_config();
    let agent = args.harbor.agent_asset()?;
    let task = args.task.as_ref().map(TaskInstance::load).transpose()?;
    let state = TaskState::new(args.sandbox.clone());

    if args.dry_run {
        let recorder = Arc::new(RecordingSandbox::new());
        let provisioner = Provisioner::new(recorder.clone(), config, EnvDefaults::from_host());
        provision_task(&provisioner, &state, task.as_ref(), &agent).await?;
        for event in recorder.events() {
            println!("{}", event.summary());
        }
        return Ok(());
    }

    let client = Arc::new(DockerSandboxClient::new()?);
    let provisioner = Provisioner::new(client, config, EnvDefaults::from_host());
    provision_task(&provisioner, &state, task.as_ref(), &agent).await?;
    info!(sandbox = %args.sandbox, "Sandbox provisioned");
    Ok(())
}

async fn provision_task(
    provisioner: &Provisioner,
    state: &TaskState,
    task: Option<&TaskInstance>,
    agent: &AgentAsset,
) -> anyhow::Result<()> {
    match task {
        Some(task) => provisioner.setup(state, task, agent).await?,
        None => provisioner.provision(state, agent).await?,
    }
    Ok(())
}

async fn run_run_command(args: RunArgs) -> anyhow::Result<()> {
    let config = args.harbor.to_config();
    let agent = args.harbor.agent_asset()?;
    let task = TaskInstance::load(&args.task)?;

    let client = Arc::new(DockerSandboxClient::new()?);
    let spec = SandboxSpec::new(config.docker_image.clone())
        .with_working_dir(config.agent_workdir.clone())
        .with_limits(config.cpu_cores, config.memory_gb)
        .with_lifetime(config.sandbox_lifetime());
    let sandbox_id = client
        .create_sandbox(&spec)
        .await
        .context("Failed to create sandbox")?;
    info!(task = %task.name, sandbox = %sandbox_id, "Sandbox created");

    let state = state_with_vars(sandbox_id.clone(), &args.vars);
    let provisioner = Provisioner::new(client.clone(), config, EnvDefaults::from_host());

    let outcome = async {
        provisioner.setup(&state, &task, &agent).await?;
        let result = provisioner.run_agent(&state).await?;
        anyhow::Ok(result)
    }
    .await;

    if args.keep {
        info!(sandbox = %sandbox_id, "Keeping sandbox");
    } else if let Err(e) = client.delete_sandbox(&sandbox_id).await {
        warn!(sandbox = %sandbox_id, error = %e, "Failed to remove sandbox");
    }

    let result = outcome?;
    print!("{}", result.stdout);
    if !result.success() {
        warn!(task = %task.name, exit_code = result.exit_code, "Agent exited non-zero");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_key_val() {
        assert_eq!(
            parse_key_val("OPENAI_MODEL=gpt").unwrap(),
            ("OPENAI_MODEL".to_string(), "gpt".to_string())
        );
        assert_eq!(
            parse_key_val("A=b=c").unwrap(),
            ("A".to_string(), "b=c".to_string())
        );
        assert_eq!(parse_key_val("EMPTY=").unwrap().1, "");
        assert!(parse_key_val("novalue").is_err());
        assert!(parse_key_val("=x").is_err());
    }

    #[test]
    fn test_cli_defaults_match_config() {
        let cli = Cli::try_parse_from(["swe-harbor", "tasks"]).unwrap();
        let Commands::Tasks(args) = cli.command else {
            panic!("expected tasks command");
        };
        let config = args.harbor.to_config();
        let defaults = HarborConfig::default();
        assert_eq!(config.agent_workdir, defaults.agent_workdir);
        assert_eq!(config.install_command, defaults.install_command);
        assert_eq!(config.run_command(), "/app/agent 2>&1");
        assert_eq!(config.timeout_seconds, defaults.timeout_seconds);
        assert_eq!(cli.log_level, "info");
    }

    #[test]
    fn test_provision_args() {
        let cli = Cli::try_parse_from([
            "swe-harbor",
            "provision",
            "--sandbox",
            "c1",
            "--dry-run",
            "--agent-workdir",
            "/work",
        ])
        .unwrap();
        let Commands::Provision(args) = cli.command else {
            panic!("expected provision command");
        };
        assert_eq!(args.sandbox, "c1");
        assert!(args.dry_run);
        assert_eq!(args.harbor.to_config().agent_remote_path(), "/work/agent");
    }

    #[test]
    fn test_state_with_vars() {
        let state = state_with_vars(
            "sb",
            &[("OPENAI_BASE_URL".to_string(), "http://x".to_string())],
        );
        assert_eq!(state.sandbox_id, "sb");
        assert_eq!(state.env_vars["OPENAI_BASE_URL"], "http://x");
    }
}
