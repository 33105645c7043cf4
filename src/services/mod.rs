pub mod desktop;
pub mod process_launcher;
pub mod window_locator;
pub mod windowing;

pub use desktop::{create_worker_strategy, DesktopAttacher, DesktopDetacher};
pub use process_launcher::ProcessLauncher;
pub use window_locator::WindowLocator;
pub use windowing::create_windowing_service;
