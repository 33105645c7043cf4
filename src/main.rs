use anyhow::Result;
use clap::{Parser, Subcommand};
use std::process::ExitCode;
use tracing::{debug, info, warn};
mod commands;
mod config;
mod error;
mod model;
mod services;
mod utils;

use commands::{ResetArgs, SetArgs, StartArgs};
use config::Config;
use error::BackdropError;
use model::WindowHandle;
use services::create_windowing_service;
use services::windowing::WindowingService;

#[derive(Parser, Debug)]
#[command(name = "backdrop")]
#[command(about = "Pin any window to the desktop background so it behaves like a live wallpaper")]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "backdrop.toml", global = true)]
    config: String,

    /// Run against a simulated desktop instead of the real one
    #[arg(long, global = true)]
    dry_run: bool,

    /// Log level (overrides the configuration)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Pin an existing window, matched by title or class
    Set(SetArgs),
    /// Launch a program and pin its main window
    Start(StartArgs),
    /// Detach everything from the desktop background
    Reset(ResetArgs),
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();

    let (config, config_error) = match resolve_config(&args) {
        Ok(resolved) => resolved,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = init_tracing(&config) {
        if !args.command.is_reset() {
            eprintln!("Failed to initialise logging: {:#}", e);
            return ExitCode::FAILURE;
        }
    }
    info!("Starting backdrop v{}", env!("CARGO_PKG_VERSION"));
    match config_error {
        Some(e) => warn!("{}; resetting with default settings", e),
        None => debug!("Configuration loaded from {}", args.config),
    }

    if args.dry_run {
        info!("Dry-run mode: working on a simulated desktop");
    }

    let service = create_windowing_service(args.dry_run, &config.desktop);
    match dispatch(&args.command, &config, service).await {
        Ok(Some(window)) => {
            info!("Window {} is now the desktop background", window);
            ExitCode::SUCCESS
        }
        Ok(None) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e);
            ExitCode::FAILURE
        }
    }
}

impl Command {
    fn is_reset(&self) -> bool {
        matches!(self, Command::Reset(_))
    }
}

fn load_config(args: &Args) -> error::Result<Config> {
    let mut config = Config::load(&args.config)?;
    if let Some(level) = &args.log_level {
        config.logging.level = level.clone();
        config.validate()?;
    }
    Ok(config)
}

/// `reset` never fails, so an unusable configuration falls back to the defaults for it
fn resolve_config(args: &Args) -> error::Result<(Config, Option<BackdropError>)> {
    match load_config(args) {
        Ok(config) => Ok((config, None)),
        Err(e) if args.command.is_reset() => Ok((Config::default(), Some(e))),
        Err(e) => Err(e),
    }
}

/// Run the verb; `Ok(None)` is a successful `reset`, with or without a backend
async fn dispatch(
    command: &Command,
    config: &Config,
    service: error::Result<Box<dyn WindowingService>>,
) -> error::Result<Option<WindowHandle>> {
    let service = match service {
        Ok(service) => service,
        Err(e) if command.is_reset() => {
            warn!("Nothing to reset: {}", e);
            return Ok(None);
        }
        Err(e) => return Err(e),
    };

    match command {
        Command::Set(set) => commands::set(service.as_ref(), config, set).map(Some),
        Command::Start(start) => commands::start(service.as_ref(), config, start)
            .await
            .map(Some),
        Command::Reset(reset) => {
            commands::reset(service.as_ref(), config, reset);
            Ok(None)
        }
    }
}

fn init_tracing(config: &Config) -> Result<()> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.level))?;

    let fmt_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);
    let registry = tracing_subscriber::registry().with(filter);

    if config.logging.format == "pretty" {
        registry.with(fmt_layer.pretty()).init();
    } else {
        registry.with(fmt_layer.compact()).init();
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn parses_start_with_negative_bounds() {
        let args = Args::try_parse_from([
            "backdrop", "start", "--path", "notepad", "--args", "", "--bounds", "-1920", "0",
            "1920", "1080",
        ])
        .unwrap();

        match args.command {
            Command::Start(start) => {
                assert_eq!(start.path, "notepad");
                assert_eq!(start.args, "");
                assert_eq!(start.bounds, vec!["-1920", "0", "1920", "1080"]);
                assert_eq!(start.timeout_ms, None);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn parses_partial_and_non_numeric_bounds() {
        let args = Args::try_parse_from([
            "backdrop", "set", "--window", "Notes", "--bounds", "10", "abc", "--class", "Notepad",
        ])
        .unwrap();

        match args.command {
            Command::Set(set) => {
                assert_eq!(set.window.as_deref(), Some("Notes"));
                assert_eq!(set.class.as_deref(), Some("Notepad"));
                assert_eq!(set.bounds, vec!["10", "abc"]);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn parses_reset_with_global_flags() {
        let args = Args::try_parse_from(["backdrop", "reset", "--kill", "--dry-run"]).unwrap();
        assert!(args.dry_run);
        assert!(matches!(args.command, Command::Reset(ResetArgs { kill: true })));
    }

    #[test]
    fn reset_falls_back_to_defaults_on_bad_config() {
        Jail::expect_with(|jail| {
            jail.set_env("BACKDROP_LOGGING__LEVEL", "loud");

            let reset = Args::try_parse_from(["backdrop", "--dry-run", "reset"]).unwrap();
            let (config, error) = resolve_config(&reset).expect("reset never fails");
            assert_eq!(config.logging.level, "warn");
            assert!(matches!(error, Some(BackdropError::Config(_))));

            let set = Args::try_parse_from(["backdrop", "set", "--class", "Notepad"]).unwrap();
            assert!(resolve_config(&set).is_err());
            Ok(())
        });
    }

    #[test]
    fn reset_ignores_invalid_log_level_override() {
        Jail::expect_with(|_jail| {
            let args =
                Args::try_parse_from(["backdrop", "--log-level", "chatty", "reset"]).unwrap();
            let (config, error) = resolve_config(&args).expect("reset never fails");
            assert_eq!(config.logging.level, "warn");
            assert!(error.is_some());
            Ok(())
        });
    }

    #[cfg(not(windows))]
    #[tokio::test]
    async fn reset_without_backend_succeeds() {
        let config = Config::default();
        let reset = Command::Reset(ResetArgs { kill: true });
        let service = create_windowing_service(false, &config.desktop);
        let outcome = dispatch(&reset, &config, service).await;
        assert!(matches!(outcome, Ok(None)));

        let set = Command::Set(SetArgs {
            class: Some("Notepad".to_string()),
            ..SetArgs::default()
        });
        let service = create_windowing_service(false, &config.desktop);
        let outcome = dispatch(&set, &config, service).await;
        assert!(matches!(outcome, Err(BackdropError::UnsupportedPlatform(_))));
    }

    #[tokio::test]
    async fn dry_run_dispatch_reports_pinned_window() {
        let config = Config::default();
        let set = Command::Set(SetArgs {
            window: Some("Untitled - Notepad".to_string()),
            ..SetArgs::default()
        });
        let service = create_windowing_service(true, &config.desktop);
        let outcome = dispatch(&set, &config, service).await;
        assert!(matches!(outcome, Ok(Some(_))));

        let reset = Command::Reset(ResetArgs::default());
        let service = create_windowing_service(true, &config.desktop);
        let outcome = dispatch(&reset, &config, service).await;
        assert!(matches!(outcome, Ok(None)));
    }

    #[test]
    fn rejects_more_than_four_bounds() {
        assert!(Args::try_parse_from([
            "backdrop", "set", "--class", "X", "--bounds", "1", "2", "3", "4", "5",
        ])
        .is_err());
    }
}
