//! # The LIM Compiler
//!
//! This crate plumbs together the LIM crates and provides a command-line
//! interface that reads a design, runs a pipeline of passes over it and
//! prints the result. Depend on [`lim_ir`] and [`lim_opt`] directly to use
//! the IR as a library.
pub mod cmdline;
pub mod driver;
