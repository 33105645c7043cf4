use crate::config::DiscoveryConfig;
use crate::model::{self, WindowDescriptor, WindowHandle};
use crate::services::windowing::WindowingService;
use crate::utils::PollDeadline;
use std::time::Duration;
use tracing::debug;

/// Finds target windows by title, class or owning process. Purely observational.
pub struct WindowLocator<'a> {
    service: &'a dyn WindowingService,
    console_classes: Vec<String>,
    poll_interval: Duration,
}

impl<'a> WindowLocator<'a> {
    pub fn new(service: &'a dyn WindowingService, config: &DiscoveryConfig) -> Self {
        Self {
            service,
            console_classes: config.console_classes.clone(),
            poll_interval: config.poll_interval(),
        }
    }

    /// Exact title first, then the first top-level window whose title contains `title`
    pub fn find_by_title(&self, title: &str) -> Option<WindowHandle> {
        if title.is_empty() {
            return None;
        }
        self.service.find_window(None, Some(title)).or_else(|| {
            self.service
                .top_level_windows()
                .find(|w| w.title_contains(title))
                .map(|w| w.handle)
        })
    }

    pub fn find_by_class(&self, class_name: &str) -> Option<WindowHandle> {
        if class_name.is_empty() {
            return None;
        }
        self.service.find_window(Some(class_name), None)
    }

    /// Whether `window` could be the UI of process `pid`
    pub fn accepts(&self, window: &WindowDescriptor, pid: u32) -> bool {
        window.pid == pid && window.visible && !window.is_console_host(&self.console_classes)
    }

    pub fn is_console_class(&self, class_name: &str) -> bool {
        model::is_console_class(&self.console_classes, class_name)
    }

    /// One enumeration pass; the first accepted window wins
    pub fn scan_for_process(&self, pid: u32) -> Option<WindowHandle> {
        self.service
            .top_level_windows()
            .find(|w| self.accepts(w, pid))
            .map(|w| w.handle)
    }

    /// Repeat `scan_for_process` until a window turns up or `timeout` runs out.
    ///
    /// At least one pass always runs.
    pub async fn find_by_process(&self, pid: u32, timeout: Duration) -> Option<WindowHandle> {
        let deadline = PollDeadline::start(timeout);
        let mut passes = 0u32;

        loop {
            passes += 1;
            if let Some(handle) = self.scan_for_process(pid) {
                debug!("Window {} of pid {} found after {} pass(es)", handle, pid, passes);
                return Some(handle);
            }
            if deadline.expired() {
                debug!(
                    "No window for pid {} after {} pass(es) in {} ms",
                    pid,
                    passes,
                    deadline.elapsed().as_millis()
                );
                return None;
            }
            crate::trace_if_enabled!("Pass {} found no window for pid {}", passes, pid);
            tokio::time::sleep(deadline.next_pause(self.poll_interval)).await;
        }
    }
}
