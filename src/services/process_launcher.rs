use crate::error::{BackdropError, Result};
use crate::model::{ProcessHandle, WindowHandle};
use crate::services::window_locator::WindowLocator;
use crate::services::windowing::WindowingService;
use crate::utils::PollDeadline;
use std::time::Duration;
use tracing::{debug, info};

/// Spawns a process and works out which window is its main UI
pub struct ProcessLauncher<'a> {
    service: &'a dyn WindowingService,
    locator: WindowLocator<'a>,
}

impl<'a> ProcessLauncher<'a> {
    pub fn new(service: &'a dyn WindowingService, locator: WindowLocator<'a>) -> Self {
        Self { service, locator }
    }

    pub fn launch(&self, path: &str, args: &str) -> Result<ProcessHandle> {
        let process = self.service.spawn(path, args)?;
        info!("Started {} (pid {})", path, process.pid());
        Ok(process)
    }

    /// Resolve the main window of `process` within `timeout`.
    ///
    /// On failure the process is terminated (unless it already exited) before the
    /// error is returned, so no windowless child is left behind.
    pub async fn resolve_main_window(
        &self,
        process: &mut ProcessHandle,
        timeout: Duration,
    ) -> Result<WindowHandle> {
        let deadline = PollDeadline::start(timeout);
        let pid = process.pid();

        if let Some(handle) = self.wait_until_idle(process, timeout) {
            info!("Main window of pid {} reported as {}", pid, handle);
            return Ok(handle);
        }

        debug!(
            "Falling back to window scan for pid {} ({} ms left)",
            pid,
            deadline.remaining().as_millis()
        );
        if let Some(handle) = self
            .locator
            .find_by_process(pid, deadline.remaining())
            .await
        {
            info!("Main window of pid {} found by scan: {}", pid, handle);
            return Ok(handle);
        }

        self.abandon(process);
        Err(BackdropError::MainWindowResolutionTimeout {
            pid,
            timeout_ms: timeout.as_millis(),
        })
    }

    /// Launch and resolve in one go; the caller owns the process afterwards
    pub async fn start(
        &self,
        path: &str,
        args: &str,
        timeout: Duration,
    ) -> Result<(ProcessHandle, WindowHandle)> {
        let mut process = self.launch(path, args)?;
        let window = self.resolve_main_window(&mut process, timeout).await?;
        Ok((process, window))
    }

    /// Input-idle fast path. Anything short of a usable window means "fall back".
    fn wait_until_idle(
        &self,
        process: &mut ProcessHandle,
        timeout: Duration,
    ) -> Option<WindowHandle> {
        let handle = match self.service.wait_for_input_idle(process, timeout) {
            Ok(Some(handle)) => handle,
            Ok(None) => {
                debug!("pid {} is idle but has no main window yet", process.pid());
                return None;
            }
            Err(e) => {
                debug!("Input-idle wait unavailable for pid {}: {}", process.pid(), e);
                return None;
            }
        };

        // The reported window may already be gone or be a console host
        let usable = self.service.is_window(handle)
            && self.service.is_visible(handle)
            && !self
                .service
                .class_name(handle)
                .map(|class| self.locator.is_console_class(&class))
                .unwrap_or(false);
        usable.then_some(handle)
    }

    fn abandon(&self, process: &mut ProcessHandle) {
        let pid = process.pid();
        if self.service.has_exited(process) {
            debug!("pid {} already exited", pid);
            return;
        }
        match self.service.terminate(process) {
            Ok(()) => info!("Terminated pid {} after failing to find its window", pid),
            Err(e) => debug!("Could not terminate pid {}: {}", pid, e),
        }
    }
}
