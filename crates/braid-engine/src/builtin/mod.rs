//! Built-in plugins.
//!
//! Two kinds ship with the engine:
//!
//! - Plugin **types** with factories (`sequence`, `reverse_lookup`),
//!   registered via [`register_builtin_types`].
//! - Sentinel **plugins** preregistered under reserved `_`-prefixed tags
//!   (`_drop_response`, `_block_with_servfail`, …), installed via
//!   [`register_sentinels`]. The engine itself does not depend on them;
//!   they are contracts with configuration authors.

pub mod reverse_lookup;
pub mod sentinels;
pub mod sequence;

pub use reverse_lookup::{ReverseLookupArgs, ReverseLookupPlugin, TYPE_REVERSE_LOOKUP};
pub use sentinels::{SingleFlightPlugin, register_sentinels};
pub use sequence::{SequencePlugin, TYPE_SEQUENCE};

use crate::registry::Registry;

/// Registers the factories for all built-in plugin types.
///
/// # Panics
///
/// Panics if any of the built-in type names is already taken.
pub fn register_builtin_types(registry: &Registry) {
    registry.register_type(TYPE_SEQUENCE, sequence::factory());
    registry.register_type(TYPE_REVERSE_LOOKUP, reverse_lookup::factory());
}
