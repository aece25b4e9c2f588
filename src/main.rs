mod cli;

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use cli::{Cli, Commands, ListArgs};
use media_recovery::access::GrantStore;
use media_recovery::catalog;
use media_recovery::models::{Category, Variant};
use media_recovery::services::WatchRegistry;
use media_recovery::signal::LogListener;
use media_recovery::storage::StorageLocator;
use media_recovery::{logging, EngineConfig, RecoveryEngine};
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    logging::init_logger();

    let args = Cli::parse();

    let config = match EngineConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            error!("Error loading configuration: {}", err);
            return ExitCode::FAILURE;
        }
    };

    let result = match args.command.unwrap_or(Commands::Watch) {
        Commands::Watch => run_watch(config).await,
        Commands::List(list) => run_list(&config, list),
        Commands::Grant { uri } => GrantStore::load(&config.preferences_path)
            .grant(&uri)
            .map_err(|e| e.to_string()),
        Commands::Revoke => GrantStore::load(&config.preferences_path)
            .revoke()
            .map_err(|e| format!("Failed to revoke grant: {}", e)),
        Commands::Targets => {
            print_targets(&config);
            Ok(())
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("Error: {}", err);
            ExitCode::FAILURE
        }
    }
}

async fn run_watch(config: EngineConfig) -> Result<(), String> {
    let mut engine = RecoveryEngine::new(config, Arc::new(LogListener));
    engine.start().map_err(|e| e.to_string())?;
    info!("Actively monitoring for deleted media");

    let outcome = tokio::select! {
        signal = tokio::signal::ctrl_c() => signal.map_err(|e| format!("Failed to listen for Ctrl-C: {}", e)),
        _ = engine.halted() => Err("Recovery engine halted".to_string()),
    };

    engine.stop().await;
    outcome
}

fn run_list(config: &EngineConfig, args: ListArgs) -> Result<(), String> {
    let variant: Variant = args.variant.parse()?;
    let category: Category = args.category.parse()?;
    let locator = StorageLocator::new(config);

    let items = catalog::list_recovered(&locator, variant, category)
        .map_err(|e| format!("Failed to list recovered files: {}", e))?;

    if args.json {
        let json = serde_json::to_string_pretty(&items).map_err(|e| e.to_string())?;
        println!("{}", json);
        return Ok(());
    }

    for item in &items {
        println!(
            "{:<40} {:>10}  {}  {}",
            item.title, item.human_size, item.human_date, item.absolute_path
        );
    }
    println!("{} recovered {} file(s)", items.len(), category);
    Ok(())
}

fn print_targets(config: &EngineConfig) {
    let registry = WatchRegistry::build(config);
    for target in registry.targets() {
        let state = if target.path.is_dir() { "present" } else { "missing" };
        println!(
            "{:<10} {:<12} {:<15} {:<8} {}{}",
            target.variant.to_string(),
            target.category.to_string(),
            target.access_mode.to_string(),
            state,
            target.path.display(),
            if target.rolling { " (rolling)" } else { "" }
        );
    }
}
