//! # spark-schema
//!
//! Composable form-input schemas and a reactive interpreter for them.
//!
//! Built on [spark-signals](https://github.com/RLabs-Inc/spark-signals) for fine-grained reactivity.
//!
//! ## Architecture
//!
//! A schema is a tree of plain data: elements, components, text, conditionals,
//! slot-guards and fragments. Schemas are assembled from named, overridable
//! [`sections`] and mounted by the [`Interpreter`] against a [`NodeContext`].
//!
//! ```text
//! Sections ──build(extensions)──> SchemaNode ──compile──> CompiledNode ──mount──> OutputTree
//!                                                                         ↑
//!                                                          context signals (value, props, ...)
//! ```
//!
//! Every dynamic value in a mounted tree is its own subscription: changing a
//! prop re-evaluates only the attributes and text that read it.
//!
//! ## Modules
//!
//! - [`types`] - `Value`, `SchemaNode` and the node shapes
//! - [`sections`] - Section builder, extension merger, composition, traversal
//! - [`expression`] - Expression language: parse, compile, evaluate
//! - [`state`] - Node context, scopes, events, class lists
//! - [`engine`] - Output tree of rendered nodes
//! - [`primitives`] - Element, text, conditional, loop and slot bindings
//! - [`pipeline`] - Compile, mount, diagnostics, options

pub mod engine;
pub mod error;
pub mod expression;
pub mod pipeline;
pub mod primitives;
pub mod sections;
pub mod state;
pub mod types;

// Re-export commonly used items
pub use types::*;

pub use error::{EvalError, ExpressionError, SchemaError};

pub use engine::{OutputKind, OutputNode, OutputTree, RenderedNode};

pub use expression::{CompiledExpression, ExpressionCache, Resolver, compile};

pub use pipeline::{
    CompiledNode, Diagnostic, DiagnosticKind, Diagnostics, Interpreter, InterpreterOptions,
    LoopKeying, MountHandle, compile_schema, mount, unmount,
};

pub use primitives::{Cleanup, SlotFn, SlotProps, Slots};

#[allow(deprecated)]
pub use sections::root_section;
pub use sections::{
    Extension, ExtensionMap, NodePatch, Section, SectionEl, SectionFactory, SectionMatch,
    attrs_section, create_section, each_section, extend_schema, extend_section, find_section,
    find_section_mut, for_section, for_section_indexed, if_section,
};

pub use state::{EventEmitter, Listener, NodeContext, Scope};
