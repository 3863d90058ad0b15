//! Interpreter configuration.

/// How loop items are matched between renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoopKeying {
    /// By item value. Equal items are told apart by occurrence order.
    #[default]
    Value,
    /// By position. Reordering updates items in place instead of moving them.
    Index,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterpreterOptions {
    /// Identity used for loops without an explicit `key`.
    pub loop_keys: LoopKeying,
    /// Log each distinct runtime error once instead of on every update.
    pub report_errors_once: bool,
    /// Drain pending effects before `mount` returns.
    pub flush_on_mount: bool,
}

impl Default for InterpreterOptions {
    fn default() -> Self {
        Self {
            loop_keys: LoopKeying::Value,
            report_errors_once: true,
            flush_on_mount: true,
        }
    }
}

impl InterpreterOptions {
    pub fn with_loop_keys(mut self, keying: LoopKeying) -> Self {
        self.loop_keys = keying;
        self
    }

    pub fn with_report_errors_once(mut self, once: bool) -> Self {
        self.report_errors_once = once;
        self
    }

    pub fn with_flush_on_mount(mut self, flush: bool) -> Self {
        self.flush_on_mount = flush;
        self
    }
}
