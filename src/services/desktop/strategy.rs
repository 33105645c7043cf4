use crate::config::DesktopConfig;
use crate::error::Result;
use crate::model::WindowHandle;
use crate::services::windowing::WindowingService;
use std::time::Duration;
use tracing::debug;

/// Undocumented Progman message that makes the shell spawn the WorkerW behind the icons
pub const SPAWN_WORKER_MESSAGE: u32 = 0x052C;

const PROGMAN_CLASS: &str = "Progman";
const WORKER_CLASS: &str = "WorkerW";
const ICON_VIEW_CLASS: &str = "SHELLDLL_DefView";

/// Finds the background render surface of a particular desktop shell
pub trait WorkerLayerStrategy {
    fn name(&self) -> &'static str;

    /// Locate the worker window, asking the shell to create it if needed
    fn locate_worker(&self, service: &dyn WindowingService) -> Result<WindowHandle>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerLayout {
    /// Try the Progman child first, then the DefView sibling
    Auto,
    /// WorkerW nested inside Progman (newer shells)
    ProgmanChild,
    /// Top-level WorkerW following the one that hosts the icons (classic shells)
    DefViewSibling,
}

impl WorkerLayout {
    pub fn from_config(name: &str) -> Option<Self> {
        match name {
            "auto" => Some(WorkerLayout::Auto),
            "progman-child" => Some(WorkerLayout::ProgmanChild),
            "defview-sibling" => Some(WorkerLayout::DefViewSibling),
            _ => None,
        }
    }
}

/// Progman/WorkerW trick of the Windows desktop shell
pub struct ProgmanWorkerStrategy {
    layout: WorkerLayout,
    message_timeout: Duration,
}

impl ProgmanWorkerStrategy {
    pub fn new(layout: WorkerLayout, message_timeout: Duration) -> Self {
        Self {
            layout,
            message_timeout,
        }
    }

    fn progman_child(
        &self,
        service: &dyn WindowingService,
        progman: WindowHandle,
    ) -> Option<WindowHandle> {
        service.find_child(Some(progman), None, WORKER_CLASS)
    }

    fn defview_sibling(&self, service: &dyn WindowingService) -> Option<WindowHandle> {
        let icons_host = service
            .top_level_windows()
            .map(|w| w.handle)
            .find(|&handle| service.find_child(Some(handle), None, ICON_VIEW_CLASS).is_some())?;
        crate::debug_if_enabled!("Desktop icons are hosted by {}", icons_host);
        service.find_child(None, Some(icons_host), WORKER_CLASS)
    }
}

impl WorkerLayerStrategy for ProgmanWorkerStrategy {
    fn name(&self) -> &'static str {
        match self.layout {
            WorkerLayout::Auto => "progman/auto",
            WorkerLayout::ProgmanChild => "progman/progman-child",
            WorkerLayout::DefViewSibling => "progman/defview-sibling",
        }
    }

    fn locate_worker(&self, service: &dyn WindowingService) -> Result<WindowHandle> {
        let progman = service
            .find_window(Some(PROGMAN_CLASS), None)
            .ok_or_else(|| crate::backdrop_error!(attach, "desktop shell window (Progman) not found"))?;
        debug!("Progman window: {}", progman);

        // The worker may already exist, so a lost message is not fatal
        if let Err(e) = service.send_message(
            progman,
            SPAWN_WORKER_MESSAGE,
            0,
            0,
            self.message_timeout,
        ) {
            debug!("Progman did not acknowledge the worker spawn request: {}", e);
        }

        let worker = match self.layout {
            WorkerLayout::ProgmanChild => self.progman_child(service, progman),
            WorkerLayout::DefViewSibling => self.defview_sibling(service),
            WorkerLayout::Auto => self
                .progman_child(service, progman)
                .or_else(|| self.defview_sibling(service)),
        };

        worker.ok_or_else(|| {
            crate::backdrop_error!(attach, "background worker layer not found ({})", self.name())
        })
    }
}

/// Factory for the strategy named by `desktop.layout`
pub fn create_worker_strategy(config: &DesktopConfig) -> Result<Box<dyn WorkerLayerStrategy>> {
    let layout = WorkerLayout::from_config(&config.layout).ok_or_else(|| {
        crate::backdrop_error!(attach, "unknown desktop layout '{}'", config.layout)
    })?;
    Ok(Box::new(ProgmanWorkerStrategy::new(
        layout,
        config.spawn_worker_timeout(),
    )))
}
