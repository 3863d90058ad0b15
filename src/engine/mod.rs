//! Output Engine - Rendered node registry.
//!
//! Mounted schemas write into an [`OutputTree`]: a registry of indices, each
//! holding one rendered node (element, component, text or fragment).
//!
//! ```text
//! Index 0: Element "div"   (parent=None, section="outer")
//! Index 1: Fragment        (parent=0,    section="wrapper")
//! Index 2: Element "label" (parent=1,    section="label")
//! Index 3: Text "Name"     (parent=2)
//! ```
//!
//! Indices are stable for the lifetime of a node, so a patch to one node never
//! changes the identity of its siblings.

mod registry;

pub use registry::*;
