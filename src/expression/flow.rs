//! Conditional block state carried from one expression to the next.

use super::Guard;
use crate::variables::VariableStore;

/// The three flags threaded through an asset's expressions in document order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlowState {
    /// The open block's guard was indeterminate; its macros are re-emitted
    /// verbatim for a later runtime pass.
    pub fallback: bool,
    /// A conditional block is open.
    pub open: bool,
    /// Output is suppressed until the next else/end.
    pub elide: bool,
}

impl FlowState {
    /// State after `[% if guard %]`. `None` means the guard was indeterminate.
    pub fn opened(guard: Option<bool>) -> Self {
        match guard {
            Some(value) => Self {
                fallback: false,
                open: true,
                elide: !value,
            },
            None => Self {
                fallback: true,
                open: true,
                elide: false,
            },
        }
    }

    /// State after `[% else %]`. Fallback blocks keep both branches.
    pub fn otherwise(self) -> Self {
        if self.fallback {
            self
        } else {
            Self {
                elide: !self.elide,
                ..self
            }
        }
    }

    /// State after `[% end %]`.
    pub fn closed(self) -> Self {
        Self::default()
    }
}

impl Guard {
    /// Evaluate against the asset's variables. `None` when indeterminate.
    pub fn evaluate(&self, vars: &VariableStore) -> Option<bool> {
        match self {
            Guard::Truthy(operand) => vars.truthy(operand),
            Guard::Equals(left, right) => vars.equals(left, right),
            Guard::NotEquals(left, right) => vars.equals(left, right).map(|eq| !eq),
        }
    }
}
