use crate::error::{BackdropError, Result};
use crate::model::{AttachmentState, WindowHandle};
use crate::services::windowing::WindowingService;
use tracing::{debug, info, warn};

use super::strategy::WorkerLayerStrategy;

/// What a detach pass touched
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DetachReport {
    pub detached: Vec<WindowHandle>,
    pub terminated: Vec<u32>,
}

impl DetachReport {
    pub fn is_empty(&self) -> bool {
        self.detached.is_empty() && self.terminated.is_empty()
    }
}

/// Restores the normal desktop by emptying the background worker layer.
///
/// Nothing about earlier attachments is remembered; whatever currently sits in the
/// worker layer is what gets detached.
pub struct DesktopDetacher<'a> {
    service: &'a dyn WindowingService,
    strategy: &'a dyn WorkerLayerStrategy,
    refresh_wallpaper: bool,
}

impl<'a> DesktopDetacher<'a> {
    pub fn new(service: &'a dyn WindowingService, strategy: &'a dyn WorkerLayerStrategy) -> Self {
        Self {
            service,
            strategy,
            refresh_wallpaper: true,
        }
    }

    pub fn with_wallpaper_refresh(mut self, refresh: bool) -> Self {
        self.refresh_wallpaper = refresh;
        self
    }

    pub fn detach(&self, kill_owning_process: bool) -> Result<DetachReport> {
        let mut report = DetachReport::default();

        match self.strategy.locate_worker(self.service) {
            Ok(worker) => {
                for child in self.service.child_windows(worker) {
                    if kill_owning_process {
                        self.terminate_owner(child, &mut report);
                    } else {
                        self.release(child, &mut report);
                    }
                }
            }
            Err(e) => debug!("No background worker layer, nothing to detach: {}", e),
        }

        if self.refresh_wallpaper {
            if let Err(e) = self.service.refresh_wallpaper() {
                return Err(BackdropError::DetachFailure {
                    reason: e.to_string(),
                    report,
                });
            }
        }

        info!(
            "Desktop reset: {} window(s) detached, {} process(es) terminated",
            report.detached.len(),
            report.terminated.len()
        );
        Ok(report)
    }

    /// Falls back to releasing the window when its owner cannot be terminated
    fn terminate_owner(&self, window: WindowHandle, report: &mut DetachReport) {
        let Some(pid) = self.service.process_id(window) else {
            // Gone together with an owner terminated earlier in this pass
            if self.service.is_window(window) {
                debug!("{} has no findable owner", window);
                self.release(window, report);
            }
            return;
        };
        if report.terminated.contains(&pid) {
            return;
        }
        match self.service.terminate_pid(pid) {
            Ok(()) => {
                info!("Terminated pid {} owning {}", pid, window);
                report.terminated.push(pid);
            }
            Err(e) => {
                warn!("Could not terminate pid {} owning {}: {}", pid, window, e);
                self.release(window, report);
            }
        }
    }

    fn release(&self, window: WindowHandle, report: &mut DetachReport) {
        match self.service.set_parent(window, None) {
            Ok(()) => {
                info!("{} is {} from the desktop background", window, AttachmentState::Detached);
                report.detached.push(window);
            }
            Err(e) => warn!("Could not detach {}: {}", window, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Bounds;
    use crate::services::desktop::attacher::DesktopAttacher;
    use crate::services::desktop::strategy::{ProgmanWorkerStrategy, WorkerLayout};
    use crate::services::windowing::{DryRunDesktop, ShellLayout};
    use std::time::Duration;

    fn strategy() -> ProgmanWorkerStrategy {
        ProgmanWorkerStrategy::new(WorkerLayout::Auto, Duration::from_millis(100))
    }

    #[test]
    fn reset_without_attachment_is_idempotent() {
        let desktop = DryRunDesktop::new(ShellLayout::Classic);
        desktop.add_window(500, "Notepad", "notes", true);
        let strategy = strategy();
        let detacher = DesktopDetacher::new(&desktop, &strategy);

        // First pass lets the shell create its worker windows
        assert!(detacher.detach(false).unwrap().is_empty());
        let settled = desktop.layout_snapshot();

        assert!(detacher.detach(false).unwrap().is_empty());
        assert!(detacher.detach(true).unwrap().is_empty());
        assert_eq!(desktop.layout_snapshot(), settled);
        assert!(desktop.is_running(500));
    }

    #[test]
    fn detach_returns_window_to_top_level() {
        let desktop = DryRunDesktop::new(ShellLayout::Classic);
        let target = desktop.add_window(500, "Notepad", "notes", true);
        let strategy = strategy();
        DesktopAttacher::new(&desktop, &strategy)
            .attach(target, Bounds::default())
            .unwrap();

        let report = DesktopDetacher::new(&desktop, &strategy)
            .detach(false)
            .unwrap();

        assert_eq!(report.detached, vec![target]);
        assert_eq!(desktop.parent(target), None);
        assert!(desktop.is_running(500));
        assert_eq!(desktop.wallpaper_refreshes(), 1);
    }

    #[test]
    fn kill_terminates_owner() {
        let desktop = DryRunDesktop::new(ShellLayout::ProgmanChild);
        let target = desktop.add_window(500, "Notepad", "notes", true);
        let strategy = strategy();
        DesktopAttacher::new(&desktop, &strategy)
            .attach(target, Bounds::new(0, 0, 1920, 1080))
            .unwrap();

        let report = DesktopDetacher::new(&desktop, &strategy)
            .detach(true)
            .unwrap();

        assert_eq!(report.terminated, vec![500]);
        assert!(!desktop.is_running(500));
        assert!(!desktop.is_window(target));
    }

    #[test]
    fn kill_falls_back_to_release() {
        let desktop = DryRunDesktop::new(ShellLayout::Classic);
        let target = desktop.add_window(500, "Notepad", "notes", true);
        let strategy = strategy();
        DesktopAttacher::new(&desktop, &strategy)
            .attach(target, Bounds::default())
            .unwrap();
        desktop.protect_process(500);

        let report = DesktopDetacher::new(&desktop, &strategy)
            .detach(true)
            .unwrap();

        assert!(report.terminated.is_empty());
        assert_eq!(report.detached, vec![target]);
        assert_eq!(desktop.parent(target), None);
        assert!(desktop.is_running(500));
    }

    #[test]
    fn failed_refresh_is_detach_failure_with_report() {
        let desktop = DryRunDesktop::new(ShellLayout::Classic);
        let target = desktop.add_window(500, "Notepad", "notes", true);
        let strategy = strategy();
        DesktopAttacher::new(&desktop, &strategy)
            .attach(target, Bounds::default())
            .unwrap();
        desktop.fail_wallpaper_refresh();

        let err = DesktopDetacher::new(&desktop, &strategy)
            .detach(false)
            .unwrap_err();

        assert!(err.to_string().starts_with("Failed to reset wallpaper"));
        match err {
            BackdropError::DetachFailure { report, .. } => {
                assert_eq!(report.detached, vec![target])
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert_eq!(desktop.parent(target), None);
    }

    #[test]
    fn missing_shell_is_tolerated() {
        let desktop = DryRunDesktop::empty(ShellLayout::Classic);
        let strategy = strategy();
        let report = DesktopDetacher::new(&desktop, &strategy)
            .with_wallpaper_refresh(false)
            .detach(true)
            .unwrap();
        assert!(report.is_empty());
        assert_eq!(desktop.wallpaper_refreshes(), 0);
    }
}
