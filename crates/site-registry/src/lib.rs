//! Site Strategy Registry.
//!
//! Maps a [`SiteKey`] to the ordered element locators and the input protocol
//! an injector must use on that site. Adding a destination is a data change:
//! one more entry in [`builtin`] or in a YAML overlay file.

pub mod builtin;
pub mod errors;
pub mod model;
pub mod registry;

pub use errors::RegistryError;
pub use model::{CommitKey, ElementLocator, InjectionStrategy, InputProtocol, Pick};
pub use registry::{ResolvedStrategy, StrategyRegistry};
pub use tabcast_core_types::SiteKey;
