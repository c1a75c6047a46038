//! Typed, named source properties
//!
//! Properties live inside their source's state and are reached through
//! property handles the registry maps back to `(source, index)`.

pub mod kind;
pub mod store;

pub use kind::{PropertyKind, PropertySpec, PropertyValue};
pub use store::{Property, PropertySet};
