//! CLI mode
//!
//! One-shot commands that share the server's storage and refresh pipeline
//! without starting the HTTP listener.

use std::path::Path;

use anyhow::{Context, Result, bail};
use colored::Colorize;

use crate::cli::{Commands, ConfigCommands};
use crate::config::{AppConfig, DEFAULT_CONFIG_PATH};
use crate::runtime::AppContext;
use crate::services::RefreshOutcome;

/// 执行单条 CLI 命令（`serve` 由调用方处理）
pub async fn run_cli(command: Commands, config: AppConfig) -> Result<()> {
    match command {
        Commands::Serve => bail!("serve is not a one-shot command"),
        Commands::Config { action } => run_config_command(action),
        Commands::Refresh { force } => {
            let app = AppContext::build(config).await?;
            let result = refresh(&app, force).await;
            app.shutdown().await;
            result
        }
        Commands::Lookup { ip } => {
            let app = AppContext::build(config).await?;
            let result = app.resolver.resolve(&ip).await;
            app.shutdown().await;
            let location = result?;
            println!("{}", serde_json::to_string_pretty(&location)?);
            Ok(())
        }
        Commands::Status => {
            let app = AppContext::build(config).await?;
            let result = status(&app).await;
            app.shutdown().await;
            result
        }
    }
}

async fn refresh(app: &AppContext, force: bool) -> Result<()> {
    match app.orchestrator.refresh(force).await? {
        RefreshOutcome::Skipped => {
            println!("{}", "A refresh is already running".yellow());
        }
        RefreshOutcome::Completed(report) => {
            println!(
                "{} {} of {} datasets reloaded in {} ms",
                "Refresh finished:".green().bold(),
                report.loaded_count(),
                report.pairs.len(),
                report.duration_ms
            );
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }
    Ok(())
}

async fn status(app: &AppContext) -> Result<()> {
    let generations = app.registry.generations().await?;
    println!(
        "{} {}",
        "Storage backend:".bold(),
        app.registry.backend_name().cyan()
    );
    if generations.is_empty() {
        println!("{}", "No dataset configured".yellow());
        return Ok(());
    }
    for (key, generation) in generations {
        let state = if generation == 0 {
            "not loaded".red().to_string()
        } else {
            format!("generation {}", generation).green().to_string()
        };
        println!("  {:<12} {}", key.to_string(), state);
    }
    Ok(())
}

/// 不依赖已加载的配置，避免配置错误时无法生成样例
pub fn run_config_command(action: ConfigCommands) -> Result<()> {
    match action {
        ConfigCommands::Generate { output_path, force } => {
            let path = output_path.unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
            if !force && Path::new(&path).exists() {
                bail!("File already exists: {} (use --force to overwrite)", path);
            }

            if let Some(parent) = Path::new(&path).parent()
                && !parent.as_os_str().is_empty()
            {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            std::fs::write(&path, AppConfig::generate_sample_config())
                .with_context(|| format!("Failed to write {}", path))?;

            println!(
                "  {} {}",
                "Configuration file generated successfully".green(),
                path.blue()
            );
            Ok(())
        }
    }
}
