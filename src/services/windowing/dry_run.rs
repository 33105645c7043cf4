use crate::error::{BackdropError, Result};
use crate::model::{Bounds, ProcessHandle, WindowDescriptor, WindowHandle};
use crate::services::desktop::SPAWN_WORKER_MESSAGE;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use super::r#trait::{WindowIter, WindowingService};

const EXPLORER_PID: u32 = 1000;
const NEVER: u32 = u32::MAX;

/// Where the shell puts the worker window after the spawn message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellLayout {
    /// Top-level WorkerW pair; the icons move into the first one
    Classic,
    /// WorkerW created as a child of Progman
    ProgmanChild,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleBehavior {
    /// Input-idle wait succeeds and names the main window
    ReportsWindow,
    /// Input-idle wait returns before any window exists
    NoWindowYet,
    /// Input-idle wait is refused (console-style process)
    NoMessageLoop,
}

/// How a simulated process behaves once spawned
#[derive(Debug, Clone)]
pub struct LaunchPlan {
    pub class_name: String,
    pub title: String,
    /// Number of enumeration passes before the main window shows up
    pub window_after_scans: u32,
    pub idle: IdleBehavior,
    pub console_first: bool,
}

impl LaunchPlan {
    pub fn window(class_name: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            title: title.into(),
            window_after_scans: 0,
            idle: IdleBehavior::NoWindowYet,
            console_first: false,
        }
    }

    pub fn after_scans(mut self, scans: u32) -> Self {
        self.window_after_scans = scans;
        self
    }

    pub fn never_shows(mut self) -> Self {
        self.window_after_scans = NEVER;
        self
    }

    pub fn idle(mut self, idle: IdleBehavior) -> Self {
        self.idle = idle;
        self
    }

    pub fn with_console(mut self) -> Self {
        self.console_first = true;
        self
    }
}

#[derive(Debug, Clone)]
struct SimWindow {
    handle: WindowHandle,
    parent: Option<WindowHandle>,
    pid: u32,
    class_name: String,
    title: String,
    visible: bool,
    bounds: Bounds,
}

#[derive(Debug)]
struct SimProcess {
    running: bool,
    plan: Option<LaunchPlan>,
    window: Option<WindowHandle>,
    scans: u32,
}

impl SimProcess {
    fn external() -> Self {
        Self {
            running: true,
            plan: None,
            window: None,
            scans: 0,
        }
    }
}

#[derive(Debug)]
struct DesktopState {
    layout: ShellLayout,
    windows: Vec<SimWindow>,
    processes: BTreeMap<u32, SimProcess>,
    plans: HashMap<String, LaunchPlan>,
    failing_paths: HashSet<String>,
    denied_reparent: HashSet<WindowHandle>,
    denied_move: HashSet<WindowHandle>,
    misdirected_reparent: HashSet<WindowHandle>,
    protected_pids: HashSet<u32>,
    next_handle: isize,
    next_pid: u32,
    progman: Option<WindowHandle>,
    defview: Option<WindowHandle>,
    worker_spawned: bool,
    shell_responds: bool,
    wallpaper_fails: bool,
    close_requests: Vec<WindowHandle>,
    wallpaper_refreshes: u32,
    move_calls: u32,
}

impl DesktopState {
    fn alloc_handle(&mut self) -> WindowHandle {
        let handle = WindowHandle(self.next_handle);
        self.next_handle += 0x10;
        handle
    }

    fn window(&self, handle: WindowHandle) -> Option<&SimWindow> {
        self.windows.iter().find(|w| w.handle == handle)
    }

    fn window_mut(&mut self, handle: WindowHandle) -> Option<&mut SimWindow> {
        self.windows.iter_mut().find(|w| w.handle == handle)
    }

    fn position(&self, handle: WindowHandle) -> Option<usize> {
        self.windows.iter().position(|w| w.handle == handle)
    }

    fn insert_window(&mut self, index: usize, window: SimWindow) {
        let index = index.min(self.windows.len());
        self.windows.insert(index, window);
    }

    fn new_window(
        &mut self,
        parent: Option<WindowHandle>,
        pid: u32,
        class_name: &str,
        title: &str,
        visible: bool,
    ) -> SimWindow {
        SimWindow {
            handle: self.alloc_handle(),
            parent,
            pid,
            class_name: class_name.to_string(),
            title: title.to_string(),
            visible,
            bounds: Bounds::new(100, 100, 800, 600),
        }
    }

    fn require(&self, handle: WindowHandle) -> Result<&SimWindow> {
        self.window(handle)
            .ok_or_else(|| crate::backdrop_error!(os, "invalid window handle {}", handle))
    }

    /// New top-level windows land at the top of the z-order
    fn materialize(&mut self, pid: u32) -> Option<WindowHandle> {
        let plan = self.processes.get(&pid)?.plan.clone()?;
        if let Some(existing) = self.processes.get(&pid).and_then(|p| p.window) {
            return Some(existing);
        }
        let window = self.new_window(None, pid, &plan.class_name, &plan.title, true);
        let handle = window.handle;
        self.insert_window(0, window);
        if let Some(process) = self.processes.get_mut(&pid) {
            process.window = Some(handle);
        }
        Some(handle)
    }

    fn tick_pending_processes(&mut self) {
        let due: Vec<u32> = self
            .processes
            .iter_mut()
            .filter_map(|(pid, process)| {
                let plan = process.plan.as_ref()?;
                if !process.running || process.window.is_some() || plan.window_after_scans == NEVER
                {
                    return None;
                }
                process.scans += 1;
                (process.scans >= plan.window_after_scans).then_some(*pid)
            })
            .collect();
        for pid in due {
            self.materialize(pid);
        }
    }

    fn spawn_worker(&mut self) {
        if self.worker_spawned {
            return;
        }
        let Some(progman) = self.progman else {
            return;
        };

        match self.layout {
            ShellLayout::Classic => {
                let icons_host = self.new_window(None, EXPLORER_PID, "WorkerW", "", true);
                let icons_host_handle = icons_host.handle;
                let background = self.new_window(None, EXPLORER_PID, "WorkerW", "", true);
                let at = self.position(progman).unwrap_or(self.windows.len());
                self.insert_window(at, background);
                self.insert_window(at, icons_host);
                if let Some(defview) = self.defview {
                    if let Some(view) = self.window_mut(defview) {
                        view.parent = Some(icons_host_handle);
                    }
                }
            }
            ShellLayout::ProgmanChild => {
                let worker = self.new_window(Some(progman), EXPLORER_PID, "WorkerW", "", true);
                self.windows.push(worker);
            }
        }
        self.worker_spawned = true;
    }

    fn stop_process(&mut self, pid: u32) -> Result<()> {
        match self.processes.get_mut(&pid) {
            Some(process) if process.running => {
                process.running = false;
                process.window = None;
            }
            _ => return Err(crate::backdrop_error!(os, "no running process with pid {}", pid)),
        }
        self.windows.retain(|w| w.pid != pid);
        Ok(())
    }
}

/// In-memory desktop shell used by `--dry-run` and the test-suite.
///
/// Models Progman, SHELLDLL_DefView and the WorkerW that the spawn message creates,
/// plus scripted processes whose windows appear after a number of enumeration passes.
pub struct DryRunDesktop {
    state: Mutex<DesktopState>,
}

impl DryRunDesktop {
    /// Desktop with just the shell windows: tray, Progman and the icon view
    pub fn new(layout: ShellLayout) -> Self {
        let desktop = Self::empty(layout);
        {
            let mut state = desktop.state.lock();
            state.processes.insert(EXPLORER_PID, SimProcess::external());

            let tray = state.new_window(None, EXPLORER_PID, "Shell_TrayWnd", "", true);
            state.windows.push(tray);

            let progman = state.new_window(None, EXPLORER_PID, "Progman", "Program Manager", true);
            let progman_handle = progman.handle;
            state.windows.push(progman);

            let defview =
                state.new_window(Some(progman_handle), EXPLORER_PID, "SHELLDLL_DefView", "", true);
            state.defview = Some(defview.handle);
            state.windows.push(defview);

            state.progman = Some(progman_handle);
        }
        desktop
    }

    /// Desktop with no shell at all
    pub fn empty(layout: ShellLayout) -> Self {
        Self {
            state: Mutex::new(DesktopState {
                layout,
                windows: Vec::new(),
                processes: BTreeMap::new(),
                plans: HashMap::new(),
                failing_paths: HashSet::new(),
                denied_reparent: HashSet::new(),
                denied_move: HashSet::new(),
                misdirected_reparent: HashSet::new(),
                protected_pids: HashSet::new(),
                next_handle: 0x10010,
                next_pid: 4000,
                progman: None,
                defview: None,
                worker_spawned: false,
                shell_responds: true,
                wallpaper_fails: false,
                close_requests: Vec::new(),
                wallpaper_refreshes: 0,
                move_calls: 0,
            }),
        }
    }

    /// Shell with a few ordinary windows and launchable programs, for `--dry-run`
    pub fn sample(layout: ShellLayout) -> Self {
        let desktop = Self::new(layout);
        desktop.add_window(2001, "Notepad", "Untitled - Notepad", true);
        desktop.add_window(2002, "ConsoleWindowClass", "Command Prompt", true);
        desktop.add_window(2003, "Chrome_WidgetWin_1", "New Tab - Browser", true);

        let notepad = LaunchPlan::window("Notepad", "Untitled - Notepad")
            .after_scans(2)
            .idle(IdleBehavior::ReportsWindow);
        desktop.plan_launch("notepad", notepad.clone());
        desktop.plan_launch("notepad.exe", notepad);
        desktop.plan_launch(
            "wt.exe",
            LaunchPlan::window("CASCADIA_HOSTING_WINDOW_CLASS", "Terminal")
                .with_console()
                .after_scans(3)
                .idle(IdleBehavior::NoMessageLoop),
        );
        desktop.plan_launch(
            "service.exe",
            LaunchPlan::window("ServiceHost", "service").never_shows(),
        );
        desktop
    }

    pub fn add_window(&self, pid: u32, class_name: &str, title: &str, visible: bool) -> WindowHandle {
        let mut state = self.state.lock();
        state
            .processes
            .entry(pid)
            .or_insert_with(SimProcess::external);
        let window = state.new_window(None, pid, class_name, title, visible);
        let handle = window.handle;
        state.windows.push(window);
        handle
    }

    pub fn plan_launch(&self, path: &str, plan: LaunchPlan) {
        self.state.lock().plans.insert(path.to_string(), plan);
    }

    fn default_plan(path: &str) -> LaunchPlan {
        let stem = Path::new(path)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("app");
        LaunchPlan::window(stem, format!("{} - dry_run", stem)).after_scans(2)
    }
}

// Fault injection and inspection for tests
#[cfg(test)]
impl DryRunDesktop {
    pub fn fail_spawn(&self, path: &str) {
        self.state.lock().failing_paths.insert(path.to_string());
    }

    pub fn deny_reparent(&self, window: WindowHandle) {
        self.state.lock().denied_reparent.insert(window);
    }

    pub fn deny_move(&self, window: WindowHandle) {
        self.state.lock().denied_move.insert(window);
    }

    /// The shell ignores the spawn-worker message
    pub fn silence_shell(&self) {
        self.state.lock().shell_responds = false;
    }

    /// Reparenting `window` reports success but lands it under Progman
    pub fn misdirect_reparent(&self, window: WindowHandle) {
        self.state.lock().misdirected_reparent.insert(window);
    }

    /// Termination of `pid` is refused
    pub fn protect_process(&self, pid: u32) {
        self.state.lock().protected_pids.insert(pid);
    }

    pub fn fail_wallpaper_refresh(&self) {
        self.state.lock().wallpaper_fails = true;
    }

    pub fn bounds_of(&self, window: WindowHandle) -> Option<Bounds> {
        self.state.lock().window(window).map(|w| w.bounds)
    }

    pub fn is_running(&self, pid: u32) -> bool {
        self.state
            .lock()
            .processes
            .get(&pid)
            .map(|p| p.running)
            .unwrap_or(false)
    }

    pub fn close_requests(&self) -> Vec<WindowHandle> {
        self.state.lock().close_requests.clone()
    }

    pub fn wallpaper_refreshes(&self) -> u32 {
        self.state.lock().wallpaper_refreshes
    }

    pub fn move_calls(&self) -> u32 {
        self.state.lock().move_calls
    }

    /// Snapshot of every window as (handle, parent), for comparing desktop states
    pub fn layout_snapshot(&self) -> Vec<(WindowHandle, Option<WindowHandle>)> {
        self.state
            .lock()
            .windows
            .iter()
            .map(|w| (w.handle, w.parent))
            .collect()
    }
}

impl WindowingService for DryRunDesktop {
    fn top_level_windows(&self) -> WindowIter<'_> {
        let mut state = self.state.lock();
        state.tick_pending_processes();
        let snapshot: Vec<WindowDescriptor> = state
            .windows
            .iter()
            .filter(|w| w.parent.is_none())
            .map(|w| {
                WindowDescriptor::new(w.handle)
                    .with_pid(w.pid)
                    .with_class(w.class_name.clone())
                    .with_title(w.title.clone())
                    .with_visible(w.visible)
            })
            .collect();
        Box::new(snapshot.into_iter())
    }

    fn find_window(&self, class_name: Option<&str>, title: Option<&str>) -> Option<WindowHandle> {
        let state = self.state.lock();
        state
            .windows
            .iter()
            .filter(|w| w.parent.is_none())
            .find(|w| {
                class_name.map_or(true, |c| w.class_name == c) && title.map_or(true, |t| w.title == t)
            })
            .map(|w| w.handle)
    }

    fn find_child(
        &self,
        parent: Option<WindowHandle>,
        after: Option<WindowHandle>,
        class_name: &str,
    ) -> Option<WindowHandle> {
        let state = self.state.lock();
        let mut siblings = state.windows.iter().filter(|w| w.parent == parent);
        if let Some(after) = after {
            siblings.by_ref().find(|w| w.handle == after)?;
        }
        siblings
            .find(|w| w.class_name == class_name)
            .map(|w| w.handle)
    }

    fn child_windows(&self, parent: WindowHandle) -> Vec<WindowHandle> {
        self.state
            .lock()
            .windows
            .iter()
            .filter(|w| w.parent == Some(parent))
            .map(|w| w.handle)
            .collect()
    }

    fn class_name(&self, window: WindowHandle) -> Option<String> {
        self.state.lock().window(window).map(|w| w.class_name.clone())
    }

    fn process_id(&self, window: WindowHandle) -> Option<u32> {
        self.state.lock().window(window).map(|w| w.pid)
    }

    fn is_visible(&self, window: WindowHandle) -> bool {
        self.state
            .lock()
            .window(window)
            .map(|w| w.visible)
            .unwrap_or(false)
    }

    fn is_window(&self, window: WindowHandle) -> bool {
        self.state.lock().window(window).is_some()
    }

    fn parent(&self, window: WindowHandle) -> Option<WindowHandle> {
        self.state.lock().window(window).and_then(|w| w.parent)
    }

    fn move_window(&self, window: WindowHandle, bounds: Bounds) -> Result<()> {
        let mut state = self.state.lock();
        state.require(window)?;
        if state.denied_move.contains(&window) {
            return Err(crate::backdrop_error!(os, "SetWindowPos on {}: access denied", window));
        }
        state.move_calls += 1;
        if let Some(w) = state.window_mut(window) {
            w.bounds = bounds;
        }
        info!("Dry-run: move #{}: {} to {}", state.move_calls, window, bounds);
        Ok(())
    }

    fn set_parent(&self, window: WindowHandle, parent: Option<WindowHandle>) -> Result<()> {
        let mut state = self.state.lock();
        state.require(window)?;
        if let Some(parent) = parent {
            state.require(parent)?;
        }
        if state.denied_reparent.contains(&window) {
            return Err(crate::backdrop_error!(os, "SetParent on {}: access denied", window));
        }
        let parent = match parent {
            Some(_) if state.misdirected_reparent.contains(&window) => state.progman,
            parent => parent,
        };
        if let Some(w) = state.window_mut(window) {
            w.parent = parent;
        }
        match parent {
            Some(parent) => info!("Dry-run: {} reparented under {}", window, parent),
            None => info!("Dry-run: {} is top level again", window),
        }
        Ok(())
    }

    fn send_message(
        &self,
        window: WindowHandle,
        message: u32,
        _wparam: usize,
        _lparam: isize,
        timeout: Duration,
    ) -> Result<()> {
        let mut state = self.state.lock();
        state.require(window)?;
        if !state.shell_responds {
            return Err(crate::backdrop_error!(
                os,
                "message {:#x} to {} timed out after {} ms",
                message,
                window,
                timeout.as_millis()
            ));
        }
        if Some(window) == state.progman && message == SPAWN_WORKER_MESSAGE {
            state.spawn_worker();
        }
        Ok(())
    }

    fn close_window(&self, window: WindowHandle) -> Result<()> {
        let mut state = self.state.lock();
        let pid = state.require(window)?.pid;
        state.close_requests.push(window);
        info!("Dry-run: close requested for {} (pid {})", window, pid);
        // Well-behaved applications exit on close
        state.stop_process(pid)
    }

    fn refresh_wallpaper(&self) -> Result<()> {
        let mut state = self.state.lock();
        if state.wallpaper_fails {
            return Err(crate::backdrop_error!(os, "SPI_SETDESKWALLPAPER: access denied"));
        }
        state.wallpaper_refreshes += 1;
        info!("Dry-run: wallpaper refreshed ({} so far)", state.wallpaper_refreshes);
        Ok(())
    }

    fn spawn(&self, path: &str, _args: &str) -> Result<ProcessHandle> {
        let mut state = self.state.lock();
        if path.trim().is_empty() || state.failing_paths.contains(path) {
            return Err(BackdropError::spawn_failure(
                path,
                "The system cannot find the file specified.",
            ));
        }

        let plan = state
            .plans
            .get(path)
            .cloned()
            .unwrap_or_else(|| Self::default_plan(path));
        let pid = state.next_pid;
        state.next_pid += 4;

        if plan.console_first {
            let console = state.new_window(None, pid, "ConsoleWindowClass", path, true);
            state.insert_window(0, console);
        }

        let immediate = plan.window_after_scans == 0;
        state.processes.insert(
            pid,
            SimProcess {
                running: true,
                plan: Some(plan),
                window: None,
                scans: 0,
            },
        );
        if immediate {
            state.materialize(pid);
        }

        info!("Dry-run: spawned {} as pid {}", path, pid);
        Ok(ProcessHandle::simulated(pid))
    }

    fn wait_for_input_idle(
        &self,
        process: &mut ProcessHandle,
        _timeout: Duration,
    ) -> Result<Option<WindowHandle>> {
        let mut state = self.state.lock();
        let pid = process.pid();
        let (running, idle) = match state.processes.get(&pid) {
            Some(p) => (p.running, p.plan.as_ref().map(|plan| plan.idle)),
            None => return Err(crate::backdrop_error!(os, "unknown process {}", pid)),
        };
        if !running {
            return Err(crate::backdrop_error!(os, "process {} has exited", pid));
        }

        match idle {
            Some(IdleBehavior::ReportsWindow) => Ok(state.materialize(pid)),
            Some(IdleBehavior::NoMessageLoop) => Err(crate::backdrop_error!(
                os,
                "process {} has no message loop to wait on",
                pid
            )),
            Some(IdleBehavior::NoWindowYet) | None => Ok(None),
        }
    }

    fn has_exited(&self, process: &mut ProcessHandle) -> bool {
        !self
            .state
            .lock()
            .processes
            .get(&process.pid())
            .map(|p| p.running)
            .unwrap_or(false)
    }

    fn terminate(&self, process: &mut ProcessHandle) -> Result<()> {
        self.terminate_pid(process.pid())
    }

    fn terminate_pid(&self, pid: u32) -> Result<()> {
        let mut state = self.state.lock();
        if state.protected_pids.contains(&pid) {
            return Err(crate::backdrop_error!(os, "TerminateProcess({}): access denied", pid));
        }
        state.stop_process(pid)?;
        info!("Dry-run: terminated pid {}", pid);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classic_spawn_message_creates_worker_pair() {
        let desktop = DryRunDesktop::new(ShellLayout::Classic);
        let progman = desktop.find_window(Some("Progman"), None).unwrap();
        assert!(desktop.find_child(None, None, "WorkerW").is_none());

        desktop
            .send_message(progman, SPAWN_WORKER_MESSAGE, 0, 0, Duration::from_millis(100))
            .unwrap();

        let icons_host = desktop.find_child(None, None, "WorkerW").unwrap();
        assert!(desktop.find_child(Some(icons_host), None, "SHELLDLL_DefView").is_some());
        let background = desktop.find_child(None, Some(icons_host), "WorkerW").unwrap();
        assert_ne!(background, icons_host);
        assert!(desktop.child_windows(background).is_empty());
    }

    #[test]
    fn progman_child_layout_nests_worker() {
        let desktop = DryRunDesktop::new(ShellLayout::ProgmanChild);
        let progman = desktop.find_window(Some("Progman"), None).unwrap();
        desktop
            .send_message(progman, SPAWN_WORKER_MESSAGE, 0, 0, Duration::from_millis(100))
            .unwrap();

        let worker = desktop.find_child(Some(progman), None, "WorkerW").unwrap();
        assert_eq!(desktop.parent(worker), Some(progman));
        assert!(desktop.find_child(None, None, "WorkerW").is_none());
    }

    #[test]
    fn planned_window_appears_after_scans() {
        let desktop = DryRunDesktop::new(ShellLayout::Classic);
        desktop.plan_launch("app.exe", LaunchPlan::window("AppWindow", "App").after_scans(2));
        let process = desktop.spawn("app.exe", "").unwrap();

        let has_app = |d: &DryRunDesktop| {
            d.top_level_windows()
                .any(|w| w.pid == process.pid() && w.class_name == "AppWindow")
        };
        assert!(!has_app(&desktop));
        assert!(has_app(&desktop));
    }

    #[test]
    fn terminate_removes_windows_and_rejects_twice() {
        let desktop = DryRunDesktop::new(ShellLayout::Classic);
        let window = desktop.add_window(77, "Notepad", "notes", true);

        desktop.terminate_pid(77).unwrap();
        assert!(!desktop.is_window(window));
        assert!(!desktop.is_running(77));
        assert!(desktop.terminate_pid(77).is_err());
    }

    #[test]
    fn sample_follows_requested_layout() {
        let desktop = DryRunDesktop::sample(ShellLayout::ProgmanChild);
        let progman = desktop.find_window(Some("Progman"), None).unwrap();
        desktop
            .send_message(progman, SPAWN_WORKER_MESSAGE, 0, 0, Duration::from_millis(100))
            .unwrap();

        assert!(desktop.find_child(Some(progman), None, "WorkerW").is_some());
        assert!(desktop.find_window(Some("Notepad"), None).is_some());
    }

    #[test]
    fn injected_faults_surface_as_errors() {
        let desktop = DryRunDesktop::new(ShellLayout::Classic);
        let window = desktop.add_window(77, "Notepad", "notes", true);
        desktop.protect_process(77);
        desktop.fail_wallpaper_refresh();

        assert!(desktop.terminate_pid(77).is_err());
        assert!(desktop.is_running(77));
        assert!(desktop.refresh_wallpaper().is_err());
        assert_eq!(desktop.wallpaper_refreshes(), 0);
        assert!(desktop.is_window(window));
    }

    #[test]
    fn failing_spawn_reports_spawn_failure() {
        let desktop = DryRunDesktop::new(ShellLayout::Classic);
        desktop.fail_spawn("missing.exe");
        let err = desktop.spawn("missing.exe", "").unwrap_err();
        assert!(matches!(err, BackdropError::SpawnFailure { ref path, .. } if path == "missing.exe"));
    }
}
