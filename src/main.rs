use clap::Parser;

use iplocate::cli::{Cli, Commands};
use iplocate::config::AppConfig;
use iplocate::runtime::modes::{cli::run_config_command, run_cli, run_server};
use iplocate::system::init_logging;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let command = match cli.command {
        // 生成配置不需要加载现有配置
        Some(Commands::Config { action }) => return run_config_command(action),
        command => command,
    };

    let config = match AppConfig::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e.format_colored());
            std::process::exit(1);
        }
    };

    let _log_guard = init_logging(&config.logging);

    match command {
        None | Some(Commands::Serve) => run_server(config).await,
        Some(command) => run_cli(command, config).await,
    }
}
