//! Pipeline - From schema to live output.
//!
//! ```text
//! SchemaNode --compile--> CompiledNode --mount(scope)--> OutputTree
//!                                           |
//!                                scope signals change
//!                                           |
//!                                   targeted patches
//! ```
//!
//! - [`compile`] - Parse every embedded expression (memoized) up front
//! - [`mount`] - Interpreter, dispatcher and `MountHandle`
//! - [`diagnostics`] - Once-per-key reporting of recoverable errors
//! - [`options`] - Interpreter configuration

pub mod compile;
pub mod diagnostics;
pub mod mount;
pub mod options;

pub use compile::{
    AttrBinding, CompiledConditional, CompiledElement, CompiledLoop, CompiledNode, CompiledSlot,
    CompiledText, ElementKind, compile_schema,
};
pub use diagnostics::{Diagnostic, DiagnosticKind, Diagnostics};
pub use mount::{Interpreter, MountHandle, mount, mount_node, unmount};
pub use options::{InterpreterOptions, LoopKeying};
