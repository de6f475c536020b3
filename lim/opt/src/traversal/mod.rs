//! Helpers for traversing the component hierarchy of a design.
mod action;
mod adapters;
mod construct;
mod order;
mod visitor;

pub use action::{Action, VisResult};
pub use adapters::{Filtered, FilteredVisitor, fail_unhandled, skip_unhandled};
pub use construct::{ConstructVisitor, Named, ParseVal, PassOpt};
pub use order::{Order, data_flow, module_children};
pub use visitor::{Visitable, Visitor, design_roots};
