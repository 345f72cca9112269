//! Price panel loading from local files.

mod loader;

pub use loader::{load_panels, PanelSpec};
