use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use stagehand_actions::Phase;
use stagehand_core::Operation;

mod commands;

#[derive(Parser)]
#[command(
    name = "stagehand",
    about = "Stagehand — bring a component system up and down from a profile",
    version,
    propagate_version = true,
)]
struct Cli {
    /// Log scheduler decisions (condition waits, plan layout).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Verify every component and port in the profile is present
    Check(RunArgs),
    /// Recreate connections and configuration described by the profile
    Resurrect(RunArgs),
    /// Remove every connection described by the profile
    Teardown(RunArgs),
    /// Activate all components, honouring [[activation]] constraints
    Start(RunArgs),
    /// Deactivate all components, honouring [[deactivation]] constraints
    Stop(RunArgs),
    /// Reset errored components, honouring [[resetting]] constraints
    Reset(RunArgs),
    /// Load and validate a profile
    Validate {
        /// Path to the profile
        profile: PathBuf,
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Path to the profile
    profile: PathBuf,
    /// Print the plan without running anything
    #[arg(long)]
    dry_run: bool,
    /// TOML file with component states that differ from the profile
    #[arg(long)]
    system_state: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let directive = if cli.verbose {
        "stagehand=debug"
    } else {
        "stagehand=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(directive.parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let (phase, args) = match cli.command {
        Commands::Validate { profile, format } => {
            return commands::validate::validate(&profile, &format);
        }
        Commands::Check(args) => (Phase::Check, args),
        Commands::Resurrect(args) => (Phase::Resurrect, args),
        Commands::Teardown(args) => (Phase::Teardown, args),
        Commands::Start(args) => (Phase::Lifecycle(Operation::Activation), args),
        Commands::Stop(args) => (Phase::Lifecycle(Operation::Deactivation), args),
        Commands::Reset(args) => (Phase::Lifecycle(Operation::Resetting), args),
    };

    commands::run::run(
        phase,
        &args.profile,
        args.system_state.as_deref(),
        args.dry_run,
    )
    .await
}
