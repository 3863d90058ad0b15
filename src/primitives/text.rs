//! Text Primitive - Static or expression-bound text.
//!
//! # Reactivity
//!
//! Expression text binds once at mount. When a signal the expression read
//! changes, only this text node is patched.
//!
//! ```text
//! "Name"        -> static, no binding
//! "$label"      -> binding on the `label` prop
//! "$item.name"  -> binding on the loop item signal
//! ```

use crate::engine::OutputKind;
use crate::pipeline::CompiledText;
use crate::state::Scope;

use super::types::{Cleanup, Runtime};

/// Mount a text node under the current parent.
///
/// Returns a cleanup function that stops the binding and releases the node.
pub fn text(content: &CompiledText, scope: &Scope, rt: &Runtime, location: &str) -> Cleanup {
    let tree = rt.tree.clone();
    let index = tree.allocate(OutputKind::Text, None);

    let stop = match content {
        CompiledText::Static(text) => {
            tree.set_text(index, text);
            None
        }
        CompiledText::Dynamic(expr) => {
            let expr = expr.clone();
            let scope = scope.clone();
            let rt_inner = rt.clone();
            let location = location.to_string();
            Some(rt.bind(move || {
                if let Some(value) = rt_inner.evaluate(&expr, &scope, &location) {
                    rt_inner.tree.set_text(index, &value.to_display_string());
                }
            }))
        }
    };

    Box::new(move || {
        if let Some(stop) = stop {
            stop();
        }
        tree.release(index);
    })
}
