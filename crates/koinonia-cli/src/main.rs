//! Koinonia CLI - sign in, inspect the session, and check route access.

mod commands;
mod ui;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use koinonia_core::Config;
use koinonia_core::config::LogFormat;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser)]
#[command(name = "koinonia")]
#[command(about = "Koinonia - scripture studies, courses, and study groups")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to ~/.koinonia/koinonia.json)
    #[arg(long, global = true, env = "KOINONIA_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in with a password or request a magic link
    Login {
        /// Account email
        #[arg(long)]
        email: Option<String>,

        /// Password (prompted when omitted)
        #[arg(long)]
        password: Option<String>,

        /// Email a one-time sign-in link instead
        #[arg(long, conflicts_with = "password")]
        magic_link: bool,

        /// Login page query carrying the original destination
        #[arg(long)]
        redirect: Option<String>,

        /// Where the magic link should land (full URL)
        #[arg(long, requires = "magic_link")]
        redirect_to: Option<String>,
    },

    /// Sign out and clear the stored session
    Logout,

    /// Show the signed-in user
    Whoami,

    /// Check whether a location would render for the current user
    Guard {
        /// Location as requested (path, query, fragment)
        location: String,

        /// Require admin rights
        #[arg(long)]
        admin: bool,
    },

    /// Configuration
    Config {
        #[command(subcommand)]
        action: Option<ConfigCommands>,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show full configuration
    Show,

    /// Validate configuration
    Validate,

    /// Print the config file path
    Path,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);

    // Config problems are reported after logging is up
    let loaded = if config_path.exists() {
        Config::load(&config_path)
    } else {
        Ok(Config::default())
    }
    .map(Config::with_env_overrides);

    let settings = loaded
        .as_ref()
        .map(|c| c.settings.clone())
        .unwrap_or_default();
    init_logging(cli.verbose || settings.debug, &settings.log_format);

    let args = commands::CommonArgs {
        config_path,
        loaded,
    };

    match cli.command {
        Commands::Login {
            email,
            password,
            magic_link,
            redirect,
            redirect_to,
        } => {
            let login = commands::login::LoginArgs {
                email,
                password,
                magic_link,
                redirect,
                redirect_to,
            };
            commands::run_login(args, login).await?;
        }

        Commands::Logout => commands::run_logout(args).await?,

        Commands::Whoami => commands::run_whoami(args).await?,

        Commands::Guard { location, admin } => {
            commands::run_guard(args, commands::guard::GuardArgs { location, admin }).await?;
        }

        Commands::Config { action } => {
            let action = match action {
                Some(ConfigCommands::Validate) => commands::config::ConfigAction::Validate,
                Some(ConfigCommands::Path) => commands::config::ConfigAction::Path,
                Some(ConfigCommands::Show) | None => commands::config::ConfigAction::Show,
            };
            commands::run_config(args, action)?;
        }
    }

    Ok(())
}

fn init_logging(debug: bool, format: &LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if debug {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(fmt::layer().with_target(false)).init(),
    }
}
