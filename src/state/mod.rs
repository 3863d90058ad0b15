//! State modules - the data a schema is mounted against.
//!
//! - [`context`] - `NodeContext`: value, props, attrs, fns, classes, events
//! - [`events`] - Event emitter with explicit unsubscribe tokens
//! - [`classes`] - Lazy, memoized class lists per section
//! - [`scope`] - Variable frames for expression lookup

pub mod classes;
pub mod context;
pub mod events;
pub mod scope;

pub use classes::{ClassCache, ClassResolver, default_class_list};
pub use context::{DEFAULT_CLASS_PREFIX, NodeContext};
pub use events::{EventEmitter, EventHandler, Listener};
pub use scope::Scope;
