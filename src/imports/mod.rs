//! Module & stub resolution

pub mod finder;
pub mod module;
mod resolve;

pub use finder::{FileProbe, ModuleFinder, ModuleLocation, OverlayProbe};
pub use module::{ModuleOrigin, ModuleRecord, ModuleRegistry};
