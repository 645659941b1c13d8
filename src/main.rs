use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use plugin_host::plugins::PluginOrigin;
use plugin_host::{FactoryLoader, HostConfig, HostHandle, PluginDescriptor, PluginRegistry};

/// plugin-host - Discover, inspect, and toggle application plugins
#[derive(Parser)]
#[command(name = "plugin-host", version, about)]
struct Cli {
    /// Config file (defaults to the standard location)
    #[arg(short, long, env = "PLUGIN_HOST_CONFIG")]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List discovered plugins, including disabled ones
    List {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Enable a plugin on the next load
    Enable {
        /// Plugin id
        id: String,
    },
    /// Disable a plugin on the next load
    Disable {
        /// Plugin id
        id: String,
    },
    /// Run a full load pass and report what plugins contributed
    Load,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "warn,plugin_host=info",
        1 => "info,plugin_host=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = match &cli.config {
        Some(path) => HostConfig::load_from(path)?,
        None => HostConfig::load()?,
    };
    tracing::debug!(?config, "loaded configuration");

    let mut registry = PluginRegistry::new(config, Arc::new(FactoryLoader::new()), HostHandle::default());

    match cli.command {
        Command::List { json } => {
            let plugins = registry.discover_plugins();
            if json {
                println!("{}", serde_json::to_string_pretty(&plugins)?);
            } else {
                print_table(&plugins);
            }
        }
        Command::Enable { id } => {
            registry.set_enabled(&id, true).await?;
            println!("Enabled {id}; takes effect on next load");
        }
        Command::Disable { id } => {
            registry.set_enabled(&id, false).await?;
            println!("Disabled {id}; takes effect on next load");
        }
        Command::Load => cmd_load(&mut registry),
    }

    Ok(())
}

fn print_table(plugins: &[PluginDescriptor]) {
    if plugins.is_empty() {
        println!("No plugins found");
        return;
    }

    println!("{:<24} {:<10} {:<8} {:<8} NAME", "ID", "VERSION", "ORIGIN", "ENABLED");
    for p in plugins {
        let origin = match p.origin {
            PluginOrigin::Bundled => "bundled",
            PluginOrigin::User => "user",
        };
        println!(
            "{:<24} {:<10} {:<8} {:<8} {}",
            p.id,
            p.version,
            origin,
            if p.enabled { "yes" } else { "no" },
            p.name
        );
    }
}

fn cmd_load(registry: &mut PluginRegistry) {
    let summary = registry.load_all();
    println!(
        "Discovered {}, loaded {} ({} failed), activated {} ({} failed)",
        summary.discovered,
        summary.loaded,
        summary.load_failed,
        summary.activated,
        summary.activation_failed
    );

    for record in registry.records() {
        println!("  {:<24} {:?}", record.id, record.status);
    }

    let preloads = registry.preload_scripts();
    if !preloads.is_empty() {
        println!("\nRenderer preloads:");
        for path in preloads {
            println!("  {}", path.display());
        }
    }

    let pages = registry.renderer_pages();
    if !pages.is_empty() {
        println!("\nRenderer pages:");
        for page in pages {
            println!("  {} -> {}", registry.page_url(&page.id), page.file_url);
        }
    }

    println!(
        "\nWeb-request rules: {}, context-menu contributors: {}",
        registry.web_request_count(),
        registry.context_menu_count()
    );
}
