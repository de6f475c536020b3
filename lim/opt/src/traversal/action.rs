//! Actions control the traversal of a design.
use lim_utils::LimResult;

/// Result of performing a visit.
pub type VisResult = LimResult<Action>;

/// Action performed at the end of visiting a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Continue traversal of the design.
    Continue,
    /// Globally abort traversal of the design.
    Stop,
    /// Skips the traversal of this module's children but continues
    /// traversing the sibling components.
    SkipChildren,
}

impl Action {
    /// Run the traversal specified by `next` if this traversal succeeds.
    /// If the result of this traversal is not `Action::Continue`, do not
    /// run `next()`.
    pub(super) fn and_then<F>(self, mut next: F) -> VisResult
    where
        F: FnMut() -> VisResult,
    {
        match self {
            Action::Continue => next(),
            Action::Stop | Action::SkipChildren => Ok(self),
        }
    }

    /// Changes a Action::SkipChildren to Action::Continue.
    /// Should be called to indicate the boundary of traversing the children
    /// of a module.
    pub(super) fn pop(self) -> Self {
        match self {
            Action::SkipChildren => Action::Continue,
            x => x,
        }
    }
}
