//! posterwall binary entry point
//!
//! Dispatches to kiosk mode or one-shot subcommands.

use clap::Parser;
use color_eyre::eyre::Result;
use posterwall::{cli::Args, cli::Command, commands, config::Config, daemon, logging};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();
    let overrides = args.overrides();
    let config_path = args.config.as_deref();

    match args.command {
        // Kiosk mode sets up its own logging (stderr + file)
        Command::Run => {
            let config = Config::load(config_path, &overrides)?;
            daemon::run(config).await
        }

        Command::Download => {
            let config = Config::load(config_path, &overrides)?;
            logging::init_cli_logging(&config.kiosk.log_level);
            commands::download(&config)
        }

        Command::List => {
            logging::init_cli_logging("warn");
            let config = Config::load(config_path, &overrides)?;
            commands::list(&config)
        }

        Command::Validate => {
            logging::init_cli_logging("warn");
            let config = Config::load(config_path, &overrides)?;
            commands::validate(&config, config_path);
            Ok(())
        }

        Command::Display { power } => {
            logging::init_cli_logging("info");
            commands::display(power)
        }

        Command::ExceptOn { holidays, command } => {
            logging::init_cli_logging("warn");
            let code = commands::except_on(holidays.as_deref(), &command)?;
            std::process::exit(code);
        }
    }
}
