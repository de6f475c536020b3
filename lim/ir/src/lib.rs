//! The Logical Intermediate Model: a hardware design as a graph of
//! components wired physically through ports and buses and logically through
//! entries and dependencies.
//!
//! Every node lives in an arena of the owning [Design] and is referred to by
//! a copyable handle. All structural mutation goes through methods of
//! [Design] that keep both ends of every connection in step.

// Modules defining internal structures.
mod bit;
mod component;
mod design;
mod latency;
mod structure;
mod value;

// Operations on a design.
mod builder;
mod clone;
mod connect;
mod module;
mod printer;
mod propagate;
mod referee;
mod referent;

/// Module to build designs from their JSON description.
pub mod from_json;

pub use bit::Bit;
pub use clone::CloneContext;
pub use component::{
    BlockData, BranchData, CallData, Component, ComponentKind, ControlFlags,
    DecisionData, GateKind, InBufData, Iterations, LatchData, LoopBodyData,
    LoopBodyKind, LoopData, Module, ModuleShape, MuxData, NodeKind, OpKind,
    OutBufData, RegData,
};
pub use design::{Design, Task};
pub use latency::{AndKey, Latency, LatencyKey};
pub use module::ExitMap;
pub use printer::Printer;
pub use referee::{AccessKind, RefereeData, RefereeSlot, Resource};
pub use referent::{Procedure, Referent};
pub use structure::{
    Bus, BusIdx, CompIdx, ConnTag, DepIdx, DepKind, Dependency, Entry,
    EntryIdx, Exit, ExitIdx, ExitTag, ExitType, Port, PortIdx, ProcIdx,
};
pub use value::Value;

pub use lim_utils::{GetName, Id};
