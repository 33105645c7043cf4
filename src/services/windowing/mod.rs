//! Windowing service: the boundary between discovery/attachment logic and the OS
//!
//! Everything that touches real windows or processes goes through `WindowingService`.
//! The locator, launcher, attacher and detacher only ever see this trait, so the same
//! code runs against the Win32 backend or against the in-memory dry-run desktop.

mod dry_run;
mod r#trait;
#[cfg(windows)]
mod win32;

#[cfg(test)]
pub use self::dry_run::{DryRunDesktop, IdleBehavior, LaunchPlan, ShellLayout};
pub use self::r#trait::{create_windowing_service, WindowingService};
