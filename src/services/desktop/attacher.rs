use crate::error::Result;
use crate::model::{AttachmentState, Bounds, WindowHandle};
use crate::services::windowing::WindowingService;
use tracing::{debug, info};

use super::strategy::WorkerLayerStrategy;

/// Reparents a window under the desktop background layer
pub struct DesktopAttacher<'a> {
    service: &'a dyn WindowingService,
    strategy: &'a dyn WorkerLayerStrategy,
}

impl<'a> DesktopAttacher<'a> {
    pub fn new(service: &'a dyn WindowingService, strategy: &'a dyn WorkerLayerStrategy) -> Self {
        Self { service, strategy }
    }

    /// Attach `target` to the worker layer and place it at `bounds`.
    ///
    /// All-zero bounds leave the window at its current extent. If the window does not end
    /// up under the worker at its placement, the reparent is rolled back before the error
    /// is returned. Returns the state the window was in beforehand.
    pub fn attach(&self, target: WindowHandle, bounds: Bounds) -> Result<AttachmentState> {
        if !self.service.is_window(target) {
            return Err(crate::backdrop_error!(attach, "window {} no longer exists", target));
        }

        let worker = self.strategy.locate_worker(self.service)?;
        debug!("Background worker layer: {} via {}", worker, self.strategy.name());
        let previous = self.state_under(target, worker);

        self.service
            .set_parent(target, Some(worker))
            .map_err(|e| crate::backdrop_error!(attach, "cannot reparent {}: {}", target, e))?;

        if self.state_under(target, worker) != AttachmentState::Attached {
            self.roll_back(target);
            return Err(crate::backdrop_error!(
                attach,
                "{} is not parented under the worker layer after reparenting",
                target
            ));
        }

        if bounds.is_unset() {
            debug!("No placement requested, keeping current extent of {}", target);
        } else if let Err(e) = self.service.move_window(target, bounds) {
            self.roll_back(target);
            return Err(crate::backdrop_error!(
                attach,
                "{} was reparented but could not be moved to {}: {}",
                target,
                bounds,
                e
            ));
        }

        info!("Attached {} to the desktop background at {}", target, bounds);
        Ok(previous)
    }

    /// Derive the attachment state from the window's current parent
    #[cfg_attr(not(test), allow(dead_code))]
    pub fn state_of(&self, window: WindowHandle) -> AttachmentState {
        match self.strategy.locate_worker(self.service) {
            Ok(worker) => self.state_under(window, worker),
            Err(_) if self.service.is_window(window) => AttachmentState::Located,
            Err(_) => AttachmentState::Unattached,
        }
    }

    fn state_under(&self, window: WindowHandle, worker: WindowHandle) -> AttachmentState {
        if !self.service.is_window(window) {
            AttachmentState::Unattached
        } else if self.service.parent(window) == Some(worker) {
            AttachmentState::Attached
        } else {
            AttachmentState::Located
        }
    }

    fn roll_back(&self, target: WindowHandle) {
        if let Err(e) = self.service.set_parent(target, None) {
            debug!("Rollback of {} to top level failed: {}", target, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::desktop::strategy::{ProgmanWorkerStrategy, WorkerLayout};
    use crate::services::windowing::{DryRunDesktop, ShellLayout};
    use std::time::Duration;

    fn strategy() -> ProgmanWorkerStrategy {
        ProgmanWorkerStrategy::new(WorkerLayout::Auto, Duration::from_millis(100))
    }

    #[test]
    fn attach_reparents_and_moves() {
        let desktop = DryRunDesktop::new(ShellLayout::Classic);
        let target = desktop.add_window(500, "Notepad", "notes", true);
        let strategy = strategy();
        let attacher = DesktopAttacher::new(&desktop, &strategy);

        assert_eq!(attacher.state_of(target), AttachmentState::Located);
        attacher
            .attach(target, Bounds::new(0, 0, 1920, 1080))
            .unwrap();

        let worker = strategy.locate_worker(&desktop).unwrap();
        assert_eq!(desktop.parent(target), Some(worker));
        assert_eq!(desktop.bounds_of(target), Some(Bounds::new(0, 0, 1920, 1080)));
        assert_eq!(attacher.state_of(target), AttachmentState::Attached);
    }

    #[test]
    fn sentinel_bounds_only_reparent() {
        let desktop = DryRunDesktop::new(ShellLayout::ProgmanChild);
        let target = desktop.add_window(500, "Notepad", "notes", true);
        let before = desktop.bounds_of(target);
        let strategy = strategy();

        DesktopAttacher::new(&desktop, &strategy)
            .attach(target, Bounds::default())
            .unwrap();

        assert_eq!(desktop.move_calls(), 0);
        assert_eq!(desktop.bounds_of(target), before);
        assert_eq!(
            desktop.class_name(desktop.parent(target).unwrap()).as_deref(),
            Some("WorkerW")
        );
    }

    #[test]
    fn dead_handle_fails_without_side_effects() {
        let desktop = DryRunDesktop::new(ShellLayout::Classic);
        let target = desktop.add_window(500, "Notepad", "notes", true);
        desktop.terminate_pid(500).unwrap();
        let strategy = strategy();
        let attacher = DesktopAttacher::new(&desktop, &strategy);

        assert!(attacher.attach(target, Bounds::default()).is_err());
        assert_eq!(attacher.state_of(target), AttachmentState::Unattached);
    }

    #[test]
    fn denied_reparent_is_reported() {
        let desktop = DryRunDesktop::new(ShellLayout::Classic);
        let target = desktop.add_window(500, "Notepad", "notes", true);
        desktop.deny_reparent(target);
        let strategy = strategy();

        let err = DesktopAttacher::new(&desktop, &strategy)
            .attach(target, Bounds::new(0, 0, 10, 10))
            .unwrap_err();
        assert!(err.to_string().contains("access denied"));
        assert_eq!(desktop.parent(target), None);
    }

    #[test]
    fn misplaced_reparent_is_rolled_back() {
        let desktop = DryRunDesktop::new(ShellLayout::Classic);
        let target = desktop.add_window(500, "Notepad", "notes", true);
        desktop.misdirect_reparent(target);
        let strategy = strategy();

        let err = DesktopAttacher::new(&desktop, &strategy)
            .attach(target, Bounds::new(0, 0, 10, 10))
            .unwrap_err();
        assert!(err.to_string().contains("not parented under the worker layer"));
        assert_eq!(desktop.parent(target), None);
        assert_eq!(desktop.move_calls(), 0);
    }

    #[test]
    fn reattach_reports_previous_state() {
        let desktop = DryRunDesktop::new(ShellLayout::Classic);
        let target = desktop.add_window(500, "Notepad", "notes", true);
        let strategy = strategy();
        let attacher = DesktopAttacher::new(&desktop, &strategy);

        assert_eq!(
            attacher.attach(target, Bounds::default()).unwrap(),
            AttachmentState::Located
        );
        assert_eq!(
            attacher.attach(target, Bounds::new(5, 5, 50, 50)).unwrap(),
            AttachmentState::Attached
        );
        assert_eq!(desktop.bounds_of(target), Some(Bounds::new(5, 5, 50, 50)));
    }

    #[test]
    fn failed_move_rolls_back_reparent() {
        let desktop = DryRunDesktop::new(ShellLayout::Classic);
        let target = desktop.add_window(500, "Notepad", "notes", true);
        desktop.deny_move(target);
        let strategy = strategy();

        let err = DesktopAttacher::new(&desktop, &strategy)
            .attach(target, Bounds::new(0, 0, 10, 10))
            .unwrap_err();
        assert!(err.to_string().contains("could not be moved"));
        assert_eq!(desktop.parent(target), None);
    }
}
