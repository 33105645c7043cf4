use crate::config::Config;
use crate::error::{BackdropError, Result};
use crate::model::{AttachmentState, Bounds, WindowHandle};
use crate::services::desktop::DetachReport;
use crate::services::windowing::WindowingService;
use crate::services::{
    create_worker_strategy, DesktopAttacher, DesktopDetacher, ProcessLauncher, WindowLocator,
};
use clap::Args;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Args, Debug, Clone, Default)]
pub struct SetArgs {
    /// Title (or part of it) of the window to pin
    #[arg(long)]
    pub window: Option<String>,

    /// Window class to fall back on when no title matches
    #[arg(long)]
    pub class: Option<String>,

    /// Placement: x y width height (missing values are 0; all zero keeps the current size)
    #[arg(long, num_args = 0..=4, allow_negative_numbers = true, value_name = "N")]
    pub bounds: Vec<String>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct StartArgs {
    /// Executable to launch
    #[arg(long)]
    pub path: String,

    /// Command line passed to the executable as-is
    #[arg(long, default_value = "", allow_hyphen_values = true)]
    pub args: String,

    /// Placement: x y width height (missing values are 0; all zero keeps the current size)
    #[arg(long, num_args = 0..=4, allow_negative_numbers = true, value_name = "N")]
    pub bounds: Vec<String>,

    /// How long to wait for the main window (overrides the config)
    #[arg(long)]
    pub timeout_ms: Option<u64>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct ResetArgs {
    /// Also terminate the processes owning the attached windows
    #[arg(long)]
    pub kill: bool,
}

/// Pin an already running window
pub fn set(
    service: &dyn WindowingService,
    config: &Config,
    args: &SetArgs,
) -> Result<WindowHandle> {
    let strategy = create_worker_strategy(&config.desktop)?;
    let locator = WindowLocator::new(service, &config.discovery);

    let window = args
        .window
        .as_deref()
        .and_then(|title| locator.find_by_title(title))
        .or_else(|| {
            args.class
                .as_deref()
                .and_then(|class| locator.find_by_class(class))
        })
        .ok_or(BackdropError::WindowNotFound)?;
    info!("Selected window {}", window);

    let previous = DesktopAttacher::new(service, strategy.as_ref())
        .attach(window, Bounds::parse(&args.bounds))?;
    if previous == AttachmentState::Attached {
        info!("{} was already attached, placement re-applied", window);
    }
    Ok(window)
}

/// Launch a program and pin its main window.
///
/// The launcher already terminates the child when no window turns up; if attaching
/// fails afterwards the window is asked to close.
pub async fn start(
    service: &dyn WindowingService,
    config: &Config,
    args: &StartArgs,
) -> Result<WindowHandle> {
    let strategy = create_worker_strategy(&config.desktop)?;
    let timeout = args
        .timeout_ms
        .map(Duration::from_millis)
        .unwrap_or_else(|| config.discovery.main_window_timeout());

    let launcher = ProcessLauncher::new(service, WindowLocator::new(service, &config.discovery));
    let (process, window) = launcher.start(&args.path, &args.args, timeout).await?;

    let bounds = Bounds::parse(&args.bounds);
    if let Err(e) = DesktopAttacher::new(service, strategy.as_ref()).attach(window, bounds) {
        if let Err(close) = service.close_window(window) {
            debug!("Could not ask {} to close: {}", window, close);
        }
        return Err(e);
    }

    info!("pid {} keeps running as the desktop background", process.pid());
    Ok(window)
}

/// Empty the background layer. Never fails: problems are only logged.
pub fn reset(service: &dyn WindowingService, config: &Config, args: &ResetArgs) -> DetachReport {
    let strategy = match create_worker_strategy(&config.desktop) {
        Ok(strategy) => strategy,
        Err(e) => {
            warn!("Reset skipped: {}", e);
            return DetachReport::default();
        }
    };

    let report = DesktopDetacher::new(service, strategy.as_ref())
        .with_wallpaper_refresh(config.desktop.refresh_wallpaper_on_reset)
        .detach(args.kill)
        .unwrap_or_else(|e| {
            warn!("{}", e);
            match e {
                BackdropError::DetachFailure { report, .. } => report,
                _ => DetachReport::default(),
            }
        });
    if report.is_empty() {
        debug!("Nothing was attached to the desktop background");
    }
    report
}
