//! The arena that owns every node of a design.
use crate::{
    Bus, BusIdx, CompIdx, Component, ComponentKind, DepIdx, Dependency, Entry,
    EntryIdx, Exit, ExitIdx, ExitTag, Latency, Module, Port, PortIdx, ProcIdx,
    Procedure,
};
use lim_idx::IndexedPool;
use lim_utils::{Id, NameGenerator};

/// A top level entry point of the design: a call of the procedure
/// implementing it.
#[derive(Clone, Copy, Debug)]
pub struct Task {
    pub call: CompIdx,
    /// Set when the task runs continuously instead of on request.
    pub kickable: bool,
}

/// The root of the IR. Every component, port, bus, exit, entry, dependency
/// and procedure of a design lives in one of its pools and is referred to by
/// handle.
#[derive(Debug, Default)]
pub struct Design {
    pub name: Id,
    pub(crate) comps: IndexedPool<CompIdx, Component>,
    pub(crate) ports: IndexedPool<PortIdx, Port>,
    pub(crate) buses: IndexedPool<BusIdx, Bus>,
    pub(crate) exits: IndexedPool<ExitIdx, Exit>,
    pub(crate) entries: IndexedPool<EntryIdx, Entry>,
    pub(crate) deps: IndexedPool<DepIdx, Dependency>,
    pub(crate) procedures: IndexedPool<ProcIdx, Procedure>,
    pub(crate) tasks: Vec<Task>,
    /// Live referees, for retiring the slots of deleted accessors.
    pub(crate) referees: Vec<CompIdx>,
    /// Generates unique component names.
    pub namegen: NameGenerator,
    /// Options passed to the passes, in the form `pass:opt=value`.
    pub extra_opts: Vec<String>,
}

impl Design {
    pub fn new<S: Into<Id>>(name: S) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    // ========================= Lookup ============================

    pub fn comp(&self, idx: CompIdx) -> &Component {
        &self.comps[idx]
    }

    pub fn comp_mut(&mut self, idx: CompIdx) -> &mut Component {
        &mut self.comps[idx]
    }

    pub fn find_comp(&self, idx: CompIdx) -> Option<&Component> {
        self.comps.get(idx)
    }

    pub fn port(&self, idx: PortIdx) -> &Port {
        &self.ports[idx]
    }

    pub fn port_mut(&mut self, idx: PortIdx) -> &mut Port {
        &mut self.ports[idx]
    }

    pub fn find_port(&self, idx: PortIdx) -> Option<&Port> {
        self.ports.get(idx)
    }

    pub fn bus(&self, idx: BusIdx) -> &Bus {
        &self.buses[idx]
    }

    pub fn bus_mut(&mut self, idx: BusIdx) -> &mut Bus {
        &mut self.buses[idx]
    }

    pub fn find_bus(&self, idx: BusIdx) -> Option<&Bus> {
        self.buses.get(idx)
    }

    pub fn exit(&self, idx: ExitIdx) -> &Exit {
        &self.exits[idx]
    }

    pub fn exit_mut(&mut self, idx: ExitIdx) -> &mut Exit {
        &mut self.exits[idx]
    }

    pub fn find_exit(&self, idx: ExitIdx) -> Option<&Exit> {
        self.exits.get(idx)
    }

    pub fn entry(&self, idx: EntryIdx) -> &Entry {
        &self.entries[idx]
    }

    pub fn find_entry(&self, idx: EntryIdx) -> Option<&Entry> {
        self.entries.get(idx)
    }

    pub fn dep(&self, idx: DepIdx) -> &Dependency {
        &self.deps[idx]
    }

    pub fn find_dep(&self, idx: DepIdx) -> Option<&Dependency> {
        self.deps.get(idx)
    }

    pub fn procedure(&self, idx: ProcIdx) -> &Procedure {
        &self.procedures[idx]
    }

    pub fn procedure_mut(&mut self, idx: ProcIdx) -> &mut Procedure {
        &mut self.procedures[idx]
    }

    pub fn find_procedure(&self, idx: ProcIdx) -> Option<&Procedure> {
        self.procedures.get(idx)
    }

    /// Handles of every live component.
    pub fn components(&self) -> Vec<CompIdx> {
        self.comps.keys().collect()
    }

    pub fn procedures(&self) -> Vec<ProcIdx> {
        self.procedures.keys().collect()
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn add_task(&mut self, call: CompIdx, kickable: bool) {
        self.tasks.push(Task { call, kickable });
    }

    pub fn component_count(&self) -> usize {
        self.comps.len()
    }

    // ========================= Queries ============================

    /// Human readable description of a component: its kind and name.
    pub fn describe(&self, comp: CompIdx) -> String {
        match self.comps.get(comp) {
            Some(c) => format!("{}({})", c.node_kind(), c.name),
            None => format!("<removed component {}>", comp.0),
        }
    }

    /// The module data of `comp`. Panics if `comp` is not a module.
    pub fn module(&self, comp: CompIdx) -> &Module {
        match self.comp(comp).module() {
            Some(m) => m,
            None => panic!("{} is not a module", self.describe(comp)),
        }
    }

    pub fn module_mut(&mut self, comp: CompIdx) -> &mut Module {
        if !self.comp(comp).is_module() {
            panic!("{} is not a module", self.describe(comp));
        }
        match self.comp_mut(comp).module_mut() {
            Some(m) => m,
            None => unreachable!(),
        }
    }

    /// The InBuf of module `comp`.
    pub fn in_buf(&self, comp: CompIdx) -> CompIdx {
        self.module(comp).in_buf
    }

    /// The OutBuf collecting `exit` of a module.
    pub fn out_buf(&self, exit: ExitIdx) -> Option<CompIdx> {
        self.exit(exit).peer
    }

    /// The exit with `tag` of `comp`.
    pub fn exit_of(&self, comp: CompIdx, tag: ExitTag) -> Option<ExitIdx> {
        self.comp(comp).exit(tag)
    }

    /// The DONE exit of `comp`. Panics when it has none.
    pub fn main_exit(&self, comp: CompIdx) -> ExitIdx {
        match self.comp(comp).main_exit() {
            Some(e) => e,
            None => panic!("{} has no done exit", self.describe(comp)),
        }
    }

    /// The first data bus of the main exit.
    pub fn result_bus(&self, comp: CompIdx) -> Option<BusIdx> {
        self.comp(comp)
            .main_exit()
            .and_then(|e| self.exit(e).data_buses.first().copied())
    }

    /// Every bus owned by `exit`, including the clock and reset buses of an
    /// InBuf exit.
    pub fn exit_buses(&self, exit: ExitIdx) -> Vec<BusIdx> {
        let e = self.exit(exit);
        let mut buses: Vec<BusIdx> = e.buses().collect();
        if let ComponentKind::InBuf(data) = &self.comp(e.owner).kind {
            buses.push(data.clock);
            buses.push(data.reset);
        }
        buses
    }

    /// Every bus owned by any exit of `comp`.
    pub fn component_buses(&self, comp: CompIdx) -> Vec<BusIdx> {
        self.comp(comp)
            .exits()
            .flat_map(|(_, e)| self.exit_buses(e))
            .collect()
    }

    /// The component owning `bus`.
    pub fn bus_owner(&self, bus: BusIdx) -> CompIdx {
        self.exit(self.bus(bus).owner).owner
    }

    /// Latency of the DONE exit, or zero for components without one.
    pub fn latency(&self, comp: CompIdx) -> Latency {
        self.comp(comp)
            .main_exit()
            .map(|e| self.exit(e).latency.clone())
            .unwrap_or(Latency::ZERO)
    }

    /// True if `comp` is contained, at any depth, in `ancestor`.
    pub fn is_descendant_of(&self, comp: CompIdx, ancestor: CompIdx) -> bool {
        let mut cur = self.comp(comp).owner;
        while let Some(owner) = cur {
            if owner == ancestor {
                return true;
            }
            cur = self.comp(owner).owner;
        }
        false
    }

    /// The innermost module containing both components.
    pub fn common_ancestor(&self, a: CompIdx, b: CompIdx) -> Option<CompIdx> {
        let mut cur = self.comp(a).owner;
        while let Some(owner) = cur {
            if b == owner || self.is_descendant_of(b, owner) {
                return Some(owner);
            }
            cur = self.comp(owner).owner;
        }
        None
    }

    /// The components consuming `bus`, either through a physical connection
    /// or as the target of a dependency. Each appears once.
    pub fn dependent_components(&self, bus: BusIdx) -> Vec<CompIdx> {
        let b = self.bus(bus);
        let mut comps: Vec<CompIdx> = Vec::new();
        let owners = b.ports.iter().map(|p| self.port(*p).owner).chain(
            b.logical_dependents
                .iter()
                .map(|d| self.port(self.dep(*d).port).owner),
        );
        for owner in owners {
            if !comps.contains(&owner) {
                comps.push(owner);
            }
        }
        comps
    }

    /// The dependencies recorded for `port` across every entry of its owner.
    pub fn port_dependencies(&self, port: PortIdx) -> Vec<DepIdx> {
        let owner = self.port(port).owner;
        self.comp(owner)
            .entries
            .iter()
            .flat_map(|e| self.entry(*e).dependencies(port).iter().copied())
            .collect()
    }

    /// Procedure bodies that are not owned by another component, together
    /// with any module not reachable from one.
    pub fn roots(&self) -> Vec<CompIdx> {
        self.comps
            .iter()
            .filter(|(_, c)| c.owner.is_none())
            .filter(|(_, c)| !matches!(c.kind, ComponentKind::Call(_)))
            .map(|(idx, _)| idx)
            .collect()
    }
}
