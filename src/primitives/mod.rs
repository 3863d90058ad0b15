//! Mount Primitives - Building blocks of a mounted schema.
//!
//! This module provides the primitives the interpreter dispatches to:
//! - [`element`] - Elements, components and unwrapped sections
//! - [`text`] - Static and expression text
//! - [`show`], [`each`], [`slot`] - Control flow
//!
//! # Architecture
//!
//! Rendered nodes are indices in an [`OutputTree`](crate::engine::OutputTree).
//! Each primitive:
//! 1. Allocates its index under the current parent
//! 2. Creates one binding per dynamic value it renders
//! 3. Mounts its children with itself as the parent
//! 4. Returns a cleanup function
//!
//! # Reactivity
//!
//! A binding is an effect: it re-evaluates its expression whenever a signal
//! read during the last evaluation changes, and patches only its own output.

mod control_flow;
mod element;
mod text;
mod types;

pub use control_flow::{each, show, slot};
pub use element::element;
pub use text::text;
pub use types::*;
