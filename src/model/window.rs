use serde::{Deserialize, Serialize};
use std::fmt;
use std::process::Child;

/// Opaque reference to an OS window.
///
/// Carries no ownership: the window can disappear at any moment, so a handle
/// must be re-validated before it is mutated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WindowHandle(pub isize);

impl WindowHandle {
    #[cfg_attr(not(windows), allow(dead_code))]
    pub fn raw(self) -> isize {
        self.0
    }
}

impl fmt::Display for WindowHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// One element of a top-level window enumeration
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WindowDescriptor {
    pub handle: WindowHandle,
    pub pid: u32,
    pub visible: bool,
    pub class_name: String,
    pub title: String,
}

impl WindowDescriptor {
    pub fn new(handle: WindowHandle) -> Self {
        Self {
            handle,
            pid: 0,
            visible: false,
            class_name: String::new(),
            title: String::new(),
        }
    }

    pub fn with_pid(mut self, pid: u32) -> Self {
        self.pid = pid;
        self
    }

    pub fn with_class(mut self, class_name: impl Into<String>) -> Self {
        self.class_name = class_name.into();
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_visible(mut self, visible: bool) -> Self {
        self.visible = visible;
        self
    }

    /// Case-insensitive title substring match. An empty needle never matches.
    pub fn title_contains(&self, needle: &str) -> bool {
        if needle.is_empty() {
            return false;
        }
        self.title.to_lowercase().contains(&needle.to_lowercase())
    }

    /// Whether the window class is one of the given console-host classes
    pub fn is_console_host(&self, console_classes: &[String]) -> bool {
        is_console_class(console_classes, &self.class_name)
    }
}

/// Case-insensitive membership of `class_name` in the console-host class list
pub fn is_console_class(console_classes: &[String], class_name: &str) -> bool {
    console_classes
        .iter()
        .any(|class| class.eq_ignore_ascii_case(class_name))
}

impl fmt::Display for WindowDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.class_name.is_empty() {
            write!(f, "{} \"{}\" (pid {})", self.handle, self.title, self.pid)
        } else {
            write!(
                f,
                "{} \"{}\" [{}] (pid {})",
                self.handle, self.title, self.class_name, self.pid
            )
        }
    }
}

/// Owning reference to a spawned child process.
///
/// `child` is `None` for processes that only exist on the dry-run desktop.
#[derive(Debug)]
pub struct ProcessHandle {
    pid: u32,
    child: Option<Child>,
}

impl ProcessHandle {
    #[cfg_attr(not(windows), allow(dead_code))]
    pub fn from_child(child: Child) -> Self {
        Self {
            pid: child.id(),
            child: Some(child),
        }
    }

    pub fn simulated(pid: u32) -> Self {
        Self { pid, child: None }
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    #[cfg_attr(not(windows), allow(dead_code))]
    pub fn child_mut(&mut self) -> Option<&mut Child> {
        self.child.as_mut()
    }
}

/// Where a window stands relative to the desktop background layer.
///
/// Never persisted: derived each run from the window's current parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttachmentState {
    Unattached,
    Located,
    Attached,
    Detached,
}

impl fmt::Display for AttachmentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AttachmentState::Unattached => "unattached",
            AttachmentState::Located => "located",
            AttachmentState::Attached => "attached",
            AttachmentState::Detached => "detached",
        };
        f.write_str(name)
    }
}
