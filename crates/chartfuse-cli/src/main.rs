//! Chartfuse CLI - render Helm charts and fuse kustomize overlays into the output

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

mod commands;
mod error;
mod exit_codes;
mod logging;

#[derive(Parser)]
#[command(name = "chartfuse")]
#[command(author = "Chartfuse Contributors")]
#[command(version)]
#[command(about = "Render Helm charts and fuse kustomize overlays into one manifest", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug output
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a chart config and apply its overlays
    Generate {
        /// HelmChart config file
        config: PathBuf,

        /// Output file (if not set, outputs to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Keep the temporary workspace for inspection
        #[arg(long)]
        keep_workspace: bool,

        #[command(flatten)]
        overrides: commands::generate::Overrides,
    },

    /// Deep merge a YAML document into every resource of a manifest
    Merge {
        /// Manifest file (multi-document YAML)
        base: PathBuf,

        /// Document merged on top of each resource
        overlay: PathBuf,

        /// Output file (if not set, outputs to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    miette::set_panic_hook();

    let cli = Cli::parse();
    logging::init(cli.debug);

    let result = match cli.command {
        Commands::Generate {
            config,
            output,
            keep_workspace,
            overrides,
        } => commands::generate::run(&config, output.as_deref(), keep_workspace, &overrides),

        Commands::Merge {
            base,
            overlay,
            output,
        } => commands::merge::run(&base, &overlay, output.as_deref()),
    };

    let code = match result {
        Ok(()) => exit_codes::SUCCESS,
        Err(err) => {
            let code = err.exit_code();
            eprintln!("{:?}", miette::Report::new(err));
            code
        }
    };
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}
