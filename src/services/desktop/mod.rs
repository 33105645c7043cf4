//! Desktop background layer: attaching windows behind the icons and resetting it
//!
//! The shell-specific part (which window is the background surface and how to make
//! the shell create it) lives behind `WorkerLayerStrategy`; the attacher and detacher
//! only reparent, move and clean up.

mod attacher;
mod detacher;
mod strategy;

pub use attacher::DesktopAttacher;
pub use detacher::{DesktopDetacher, DetachReport};
pub use strategy::{create_worker_strategy, SPAWN_WORKER_MESSAGE};
#[cfg(test)]
pub use strategy::WorkerLayerStrategy;
