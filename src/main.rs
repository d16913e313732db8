//! testcompose - compose files for integration tests
//!
//! This is the CLI entry point for testcompose.

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::io::BufRead;
use std::path::PathBuf;
use std::time::Duration;
use testcompose::compose::{ComposeBuilder, ComposeParser, Disposition, FieldStrategy};
use testcompose::harness::HarnessConfig;
use testcompose::runtime::{ComposeDescriptor, ComposeManager, ComposeOptions};
use tracing_subscriber::EnvFilter;

/// testcompose - build, merge and run compose files for tests
#[derive(Parser)]
#[command(name = "testcompose")]
#[command(author = "Evoker Industries")]
#[command(version)]
#[command(about = "Build, merge and run Docker Compose files for integration tests", long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Merge compose files and print the result
    Config {
        /// Base compose file
        #[arg(short, long)]
        base: Option<PathBuf>,
        /// Partial compose files merged over the base, in order
        #[arg(short, long)]
        partial: Vec<PathBuf>,
        /// Keep the base value for these fields (dotted paths, `*` wildcards)
        #[arg(long)]
        prefer_base: Vec<String>,
        /// Concatenate these sequence fields instead of replacing them
        #[arg(long)]
        append: Vec<String>,
        /// Write absent fields as explicit nulls
        #[arg(long)]
        keep_absent: bool,
        /// Write the result to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Start a compose file and wait for services to accept connections
    Up {
        /// Compose file
        #[arg(short, long)]
        file: Option<PathBuf>,
        /// Service ports to wait for (service:port)
        #[arg(short, long, value_parser = parse_service_port)]
        wait: Vec<(String, u16)>,
        /// Readiness timeout in seconds
        #[arg(short, long)]
        timeout: Option<u64>,
        /// Pause between readiness checks in milliseconds
        #[arg(long, default_value = "500")]
        pause: u64,
        /// Project name prefix
        #[arg(long)]
        project_prefix: Option<String>,
    },
}

fn parse_service_port(value: &str) -> std::result::Result<(String, u16), String> {
    let (service, port) = value
        .rsplit_once(':')
        .ok_or_else(|| format!("expected service:port, got '{}'", value))?;
    let port = port
        .parse()
        .map_err(|_| format!("invalid port '{}' in '{}'", port, value))?;
    Ok((service.to_string(), port))
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = HarnessConfig::from_env()?;

    match cli.command {
        Commands::Config {
            base,
            partial,
            prefer_base,
            append,
            keep_absent,
            output,
        } => {
            let mut builder = ComposeBuilder::new();
            if let Some(base) = base.or_else(|| config.base_config.clone()) {
                builder
                    .from_base(&base)
                    .with_context(|| format!("failed to load {}", base.display()))?;
            }

            let strategy = prefer_base
                .iter()
                .fold(FieldStrategy::new(), |s, path| s.with(path, Disposition::PreferBase));
            let strategy = append
                .iter()
                .fold(strategy, |s, path| s.with(path, Disposition::Concatenate));

            for path in &partial {
                let spec = ComposeParser::parse_file(path)
                    .with_context(|| format!("failed to load {}", path.display()))?;
                builder.merge_partial_with_strategy(&spec, &strategy)?;
            }

            let rendered = builder.build_config(!keep_absent)?;
            match output {
                Some(path) => std::fs::write(&path, rendered)
                    .with_context(|| format!("failed to write {}", path.display()))?,
                None => print!("{}", rendered),
            }
        }

        Commands::Up {
            file,
            wait,
            timeout,
            pause,
            project_prefix,
        } => {
            let working_dir = std::env::current_dir()?;
            let compose_file = file
                .or_else(|| ComposeParser::find_compose_file(&working_dir))
                .unwrap_or_else(|| config.compose_file_path());

            let mut options = ComposeOptions::new(ComposeDescriptor::from_path(&compose_file)?);
            options.project_prefix = project_prefix.or(config.project_prefix.clone());
            let timeout = timeout
                .map(Duration::from_secs)
                .unwrap_or_else(|| config.up_timeout());
            let pause = Duration::from_millis(pause);

            let manager = ComposeManager::docker(options)?;
            println!("Started project {}", manager.project_name());

            manager.scope(|manager| {
                for (service, port) in &wait {
                    let (host, published) = manager.wait_for_port(service, *port, timeout, pause)?;
                    println!("{}:{} -> {}:{}", service, port, host, published);
                }

                println!("Press Enter to stop the project...");
                let mut line = String::new();
                std::io::stdin().lock().read_line(&mut line)?;
                Ok(())
            })?;
        }
    }

    Ok(())
}
