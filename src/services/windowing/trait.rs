use crate::config::DesktopConfig;
use crate::error::Result;
use crate::model::{Bounds, ProcessHandle, WindowDescriptor, WindowHandle};
use std::time::Duration;

use super::dry_run::{DryRunDesktop, ShellLayout};

/// Finite, one-shot enumeration; call `top_level_windows` again to restart it
pub type WindowIter<'a> = Box<dyn Iterator<Item = WindowDescriptor> + 'a>;

/// Raw windowing and process primitives of the host desktop
pub trait WindowingService {
    /// Enumerate top-level windows in OS order
    fn top_level_windows(&self) -> WindowIter<'_>;

    /// Exact top-level lookup; `None` acts as a wildcard
    fn find_window(&self, class_name: Option<&str>, title: Option<&str>) -> Option<WindowHandle>;

    /// First child of `parent` (top level when `None`) with the given class,
    /// starting after `after` when given
    fn find_child(
        &self,
        parent: Option<WindowHandle>,
        after: Option<WindowHandle>,
        class_name: &str,
    ) -> Option<WindowHandle>;

    /// Direct children only
    fn child_windows(&self, parent: WindowHandle) -> Vec<WindowHandle>;

    fn class_name(&self, window: WindowHandle) -> Option<String>;
    fn process_id(&self, window: WindowHandle) -> Option<u32>;
    fn is_visible(&self, window: WindowHandle) -> bool;
    fn is_window(&self, window: WindowHandle) -> bool;

    /// Parent window, `None` for top-level windows
    fn parent(&self, window: WindowHandle) -> Option<WindowHandle>;

    fn move_window(&self, window: WindowHandle, bounds: Bounds) -> Result<()>;

    /// Reparent `window`; `None` makes it top level again
    fn set_parent(&self, window: WindowHandle, parent: Option<WindowHandle>) -> Result<()>;

    fn send_message(
        &self,
        window: WindowHandle,
        message: u32,
        wparam: usize,
        lparam: isize,
        timeout: Duration,
    ) -> Result<()>;

    /// Ask the window to close itself (no kill)
    fn close_window(&self, window: WindowHandle) -> Result<()>;

    /// Make the shell repaint the wallpaper over the background layer
    fn refresh_wallpaper(&self) -> Result<()>;

    fn spawn(&self, path: &str, args: &str) -> Result<ProcessHandle>;

    /// Block until the process is ready for input or `timeout` elapses.
    ///
    /// `Ok(Some(_))` when the OS can name the main window right away, `Ok(None)` when
    /// it cannot yet, `Err` when the process has no message loop to wait on.
    fn wait_for_input_idle(
        &self,
        process: &mut ProcessHandle,
        timeout: Duration,
    ) -> Result<Option<WindowHandle>>;

    fn has_exited(&self, process: &mut ProcessHandle) -> bool;
    fn terminate(&self, process: &mut ProcessHandle) -> Result<()>;
    fn terminate_pid(&self, pid: u32) -> Result<()>;
}

/// Factory function to create the windowing backend based on the dry_run flag.
///
/// The simulated desktop mimics the shell generation named by `desktop.layout`.
pub fn create_windowing_service(
    dry_run: bool,
    desktop: &DesktopConfig,
) -> Result<Box<dyn WindowingService>> {
    if dry_run {
        let layout = match desktop.layout.as_str() {
            "progman-child" => ShellLayout::ProgmanChild,
            _ => ShellLayout::Classic,
        };
        return Ok(Box::new(DryRunDesktop::sample(layout)));
    }

    #[cfg(windows)]
    {
        Ok(Box::new(super::win32::Win32Windowing::new()))
    }

    #[cfg(not(windows))]
    {
        Err(crate::backdrop_error!(
            unsupported,
            "{} has no desktop background layer backend; use --dry-run",
            std::env::consts::OS
        ))
    }
}
