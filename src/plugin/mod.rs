pub mod reference;
pub mod version;

pub use reference::{ParsedLocator, PluginReference};
pub use version::RegistryTag;
