use std::ffi::c_void;
use std::os::windows::io::AsRawHandle;
use std::os::windows::process::CommandExt;
use std::process::Command;
use std::time::Duration;

use tracing::debug;
use windows::core::PCWSTR;
use windows::Win32::Foundation::{CloseHandle, BOOL, FALSE, HANDLE, HWND, LPARAM, TRUE, WPARAM};
use windows::Win32::System::Threading::{OpenProcess, TerminateProcess, PROCESS_TERMINATE};
use windows::Win32::UI::WindowsAndMessaging::{
    EnumChildWindows, EnumWindows, FindWindowExW, FindWindowW, GetAncestor, GetClassNameW,
    GetDesktopWindow, GetWindow, GetWindowTextW, GetWindowThreadProcessId, IsWindow,
    IsWindowVisible, PostMessageW, SendMessageTimeoutW, SetParent, SetWindowPos,
    SystemParametersInfoW, WaitForInputIdle, GA_PARENT, GW_OWNER, SMTO_NORMAL,
    SPIF_SENDCHANGE, SPIF_UPDATEINIFILE, SPI_GETDESKWALLPAPER, SPI_SETDESKWALLPAPER,
    SWP_NOACTIVATE, SWP_NOZORDER, SWP_SHOWWINDOW, SYSTEM_PARAMETERS_INFO_UPDATE_FLAGS, WM_CLOSE,
};

use crate::error::{BackdropError, Result};
use crate::model::{Bounds, ProcessHandle, WindowDescriptor, WindowHandle};

use super::r#trait::{WindowIter, WindowingService};

const WAIT_TIMEOUT: u32 = 0x0000_0102;
const WAIT_FAILED: u32 = 0xFFFF_FFFF;
const MAX_PATH: usize = 260;

fn hwnd(window: WindowHandle) -> HWND {
    HWND(window.raw())
}

fn handle_of(hwnd: HWND) -> Option<WindowHandle> {
    (hwnd.0 != 0).then_some(WindowHandle(hwnd.0))
}

fn wide(text: &str) -> Vec<u16> {
    text.encode_utf16().chain(std::iter::once(0)).collect()
}

fn pcwstr(buffer: &Option<Vec<u16>>) -> PCWSTR {
    buffer
        .as_ref()
        .map_or(PCWSTR::null(), |b| PCWSTR::from_raw(b.as_ptr()))
}

fn last_error(call: &str) -> BackdropError {
    crate::backdrop_error!(os, "{} failed: {}", call, windows::core::Error::from_win32())
}

unsafe extern "system" fn collect_handles(hwnd: HWND, lparam: LPARAM) -> BOOL {
    let handles = &mut *(lparam.0 as *mut Vec<isize>);
    handles.push(hwnd.0);
    TRUE
}

/// Windowing service backed by user32 on the live desktop
pub struct Win32Windowing;

impl Win32Windowing {
    pub fn new() -> Self {
        Self
    }

    fn top_level_handles(&self) -> Vec<isize> {
        let mut handles: Vec<isize> = Vec::new();
        unsafe {
            let _ = EnumWindows(
                Some(collect_handles),
                LPARAM(&mut handles as *mut Vec<isize> as isize),
            );
        }
        handles
    }

    fn describe(&self, raw: isize) -> WindowDescriptor {
        let handle = WindowHandle(raw);
        WindowDescriptor::new(handle)
            .with_pid(self.process_id(handle).unwrap_or(0))
            .with_visible(self.is_visible(handle))
            .with_class(self.class_name(handle).unwrap_or_default())
            .with_title(self.title(handle))
    }

    fn title(&self, window: WindowHandle) -> String {
        let mut buffer = [0u16; 512];
        let len = unsafe { GetWindowTextW(hwnd(window), &mut buffer) };
        String::from_utf16_lossy(&buffer[..len.max(0) as usize])
    }

    /// Visible, unowned top-level window of `pid`: what the shell treats as its main window
    fn main_window_of(&self, pid: u32) -> Option<WindowHandle> {
        self.top_level_windows()
            .filter(|w| w.pid == pid && w.visible)
            .find(|w| unsafe { GetWindow(hwnd(w.handle), GW_OWNER) }.0 == 0)
            .map(|w| w.handle)
    }

    fn current_wallpaper(&self) -> Result<Vec<u16>> {
        let mut buffer = vec![0u16; MAX_PATH];
        unsafe {
            SystemParametersInfoW(
                SPI_GETDESKWALLPAPER,
                buffer.len() as u32,
                Some(buffer.as_mut_ptr() as *mut c_void),
                SYSTEM_PARAMETERS_INFO_UPDATE_FLAGS(0),
            )
        }
        .map_err(|e| crate::backdrop_error!(os, "SPI_GETDESKWALLPAPER failed: {}", e))?;
        Ok(buffer)
    }
}

impl WindowingService for Win32Windowing {
    fn top_level_windows(&self) -> WindowIter<'_> {
        let handles = self.top_level_handles();
        Box::new(handles.into_iter().map(move |raw| self.describe(raw)))
    }

    fn find_window(&self, class_name: Option<&str>, title: Option<&str>) -> Option<WindowHandle> {
        let class = class_name.map(wide);
        let title = title.map(wide);
        handle_of(unsafe { FindWindowW(pcwstr(&class), pcwstr(&title)) })
    }

    fn find_child(
        &self,
        parent: Option<WindowHandle>,
        after: Option<WindowHandle>,
        class_name: &str,
    ) -> Option<WindowHandle> {
        let class = Some(wide(class_name));
        let parent = parent.map_or(HWND(0), hwnd);
        let after = after.map_or(HWND(0), hwnd);
        handle_of(unsafe { FindWindowExW(parent, after, pcwstr(&class), PCWSTR::null()) })
    }

    fn child_windows(&self, parent: WindowHandle) -> Vec<WindowHandle> {
        let mut handles: Vec<isize> = Vec::new();
        unsafe {
            EnumChildWindows(
                hwnd(parent),
                Some(collect_handles),
                LPARAM(&mut handles as *mut Vec<isize> as isize),
            );
        }
        // EnumChildWindows walks all descendants
        handles
            .into_iter()
            .map(WindowHandle)
            .filter(|child| self.parent(*child) == Some(parent))
            .collect()
    }

    fn class_name(&self, window: WindowHandle) -> Option<String> {
        let mut buffer = [0u16; 256];
        let len = unsafe { GetClassNameW(hwnd(window), &mut buffer) };
        (len > 0).then(|| String::from_utf16_lossy(&buffer[..len as usize]))
    }

    fn process_id(&self, window: WindowHandle) -> Option<u32> {
        let mut pid: u32 = 0;
        let thread = unsafe { GetWindowThreadProcessId(hwnd(window), Some(&mut pid as *mut u32)) };
        (thread != 0).then_some(pid)
    }

    fn is_visible(&self, window: WindowHandle) -> bool {
        unsafe { IsWindowVisible(hwnd(window)) }.as_bool()
    }

    fn is_window(&self, window: WindowHandle) -> bool {
        unsafe { IsWindow(hwnd(window)) }.as_bool()
    }

    fn parent(&self, window: WindowHandle) -> Option<WindowHandle> {
        let parent = unsafe { GetAncestor(hwnd(window), GA_PARENT) };
        if parent == unsafe { GetDesktopWindow() } {
            return None;
        }
        handle_of(parent)
    }

    fn move_window(&self, window: WindowHandle, bounds: Bounds) -> Result<()> {
        unsafe {
            SetWindowPos(
                hwnd(window),
                HWND(0),
                bounds.x,
                bounds.y,
                bounds.width,
                bounds.height,
                SWP_NOZORDER | SWP_NOACTIVATE | SWP_SHOWWINDOW,
            )
        }
        .map_err(|e| crate::backdrop_error!(os, "SetWindowPos on {} failed: {}", window, e))
    }

    fn set_parent(&self, window: WindowHandle, parent: Option<WindowHandle>) -> Result<()> {
        let previous = unsafe { SetParent(hwnd(window), parent.map_or(HWND(0), hwnd)) };
        if previous.0 == 0 {
            return Err(last_error("SetParent"));
        }
        Ok(())
    }

    fn send_message(
        &self,
        window: WindowHandle,
        message: u32,
        wparam: usize,
        lparam: isize,
        timeout: Duration,
    ) -> Result<()> {
        let mut result: usize = 0;
        let sent = unsafe {
            SendMessageTimeoutW(
                hwnd(window),
                message,
                WPARAM(wparam),
                LPARAM(lparam),
                SMTO_NORMAL,
                timeout.as_millis().min(u32::MAX as u128) as u32,
                Some(&mut result as *mut usize),
            )
        };
        if sent.0 == 0 {
            return Err(last_error("SendMessageTimeoutW"));
        }
        Ok(())
    }

    fn close_window(&self, window: WindowHandle) -> Result<()> {
        unsafe { PostMessageW(hwnd(window), WM_CLOSE, WPARAM(0), LPARAM(0)) }
            .map_err(|e| crate::backdrop_error!(os, "WM_CLOSE to {} failed: {}", window, e))
    }

    fn refresh_wallpaper(&self) -> Result<()> {
        // Re-applying the current wallpaper repaints over the worker layer
        let mut wallpaper = self.current_wallpaper()?;
        unsafe {
            SystemParametersInfoW(
                SPI_SETDESKWALLPAPER,
                0,
                Some(wallpaper.as_mut_ptr() as *mut c_void),
                SPIF_UPDATEINIFILE | SPIF_SENDCHANGE,
            )
        }
        .map_err(|e| crate::backdrop_error!(os, "SPI_SETDESKWALLPAPER failed: {}", e))
    }

    fn spawn(&self, path: &str, args: &str) -> Result<ProcessHandle> {
        let mut command = Command::new(path);
        if !args.trim().is_empty() {
            command.raw_arg(args);
        }
        let child = command
            .spawn()
            .map_err(|e| BackdropError::spawn_failure(path, e))?;
        debug!("Spawned {} as pid {}", path, child.id());
        Ok(ProcessHandle::from_child(child))
    }

    fn wait_for_input_idle(
        &self,
        process: &mut ProcessHandle,
        timeout: Duration,
    ) -> Result<Option<WindowHandle>> {
        let pid = process.pid();
        let Some(child) = process.child_mut() else {
            return Ok(self.main_window_of(pid));
        };
        let raw = HANDLE(child.as_raw_handle() as isize);
        let millis = timeout.as_millis().min(u32::MAX as u128) as u32;

        match unsafe { WaitForInputIdle(raw, millis) } {
            WAIT_FAILED => Err(last_error("WaitForInputIdle")),
            WAIT_TIMEOUT => Ok(None),
            _ => Ok(self.main_window_of(pid)),
        }
    }

    fn has_exited(&self, process: &mut ProcessHandle) -> bool {
        match process.child_mut() {
            Some(child) => matches!(child.try_wait(), Ok(Some(_))),
            None => false,
        }
    }

    fn terminate(&self, process: &mut ProcessHandle) -> Result<()> {
        let pid = process.pid();
        match process.child_mut() {
            Some(child) => {
                child.kill()?;
                let _ = child.wait();
                Ok(())
            }
            None => self.terminate_pid(pid),
        }
    }

    fn terminate_pid(&self, pid: u32) -> Result<()> {
        unsafe {
            let process = OpenProcess(PROCESS_TERMINATE, FALSE, pid)
                .map_err(|e| crate::backdrop_error!(os, "OpenProcess({}) failed: {}", pid, e))?;
            let terminated = TerminateProcess(process, 1);
            let _ = CloseHandle(process);
            terminated
                .map_err(|e| crate::backdrop_error!(os, "TerminateProcess({}) failed: {}", pid, e))
        }
    }
}
