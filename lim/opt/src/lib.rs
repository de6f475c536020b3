//! Passes over the Logical Intermediate Model.
//!
//! Every pass is a [traversal::Visitor] over a [lim_ir::Design]. The
//! [pass_manager::PassManager] registers passes by name and runs pipelines
//! of them; [default_passes] lists the passes shipped with the compiler.
pub mod analysis;
pub mod default_passes;
pub mod pass_manager;
pub mod passes;
pub mod traversal;
