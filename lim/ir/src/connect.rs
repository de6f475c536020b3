//! Structural mutation of a [Design]. These functions are the only way to
//! change a connection and they always update both ends of it.
use crate::{
    Bus, BusIdx, CompIdx, Component, ComponentKind, ControlFlags, DepIdx,
    DepKind, Dependency, Design, Entry, EntryIdx, Exit, ExitIdx, ExitTag,
    InBufData, Latency, Module, ModuleShape, OutBufData, Port, PortIdx, Value,
};
use lim_utils::{Error, Id, LimResult};
use linked_hash_map::LinkedHashMap;
use smallvec::SmallVec;

impl Design {
    // ========================= Allocation ============================

    /// Allocate a component with its clock, reset and go ports and no exits.
    pub(crate) fn alloc_component(
        &mut self,
        name: Id,
        kind: ComponentKind,
        flags: ControlFlags,
    ) -> CompIdx {
        let idx = self.comps.peek_next_idx();
        let clock = self.ports.push(Port::new(Id::new("clk"), idx));
        let reset = self.ports.push(Port::new(Id::new("reset"), idx));
        let go = self.ports.push(Port::new(Id::new("go"), idx));
        self.comps.push(Component {
            name,
            kind,
            non_removable: false,
            flags,
            owner: None,
            clock,
            reset,
            go,
            this: None,
            data_ports: Vec::new(),
            exits: LinkedHashMap::new(),
            entries: Vec::new(),
        })
    }

    /// Allocate a module together with its InBuf. The clock, reset and go
    /// ports of the module continue inside it as the InBuf clock, reset and
    /// done buses.
    pub(crate) fn alloc_module(
        &mut self,
        name: Id,
        shape: ModuleShape,
        flags: ControlFlags,
    ) -> LimResult<CompIdx> {
        let in_buf = self.alloc_component(
            Id::new(format!("{name}_inbuf")),
            ComponentKind::NoOp,
            ControlFlags::COMBINATIONAL,
        );
        let exit = self.make_exit(in_buf, ExitTag::DONE, 0)?;
        let clock = self.push_bus(exit, Id::new("clk"));
        let reset = self.push_bus(exit, Id::new("reset"));
        for bus in [clock, reset] {
            self.buses[bus].value = Some(Value::local(bus, 1, false));
        }
        self.comp_mut(in_buf).kind =
            ComponentKind::InBuf(InBufData { clock, reset });

        let module = self.alloc_component(
            name,
            ComponentKind::Module(Box::new(Module {
                components: vec![in_buf],
                in_buf,
                shape,
            })),
            flags,
        );
        self.comp_mut(in_buf).owner = Some(module);
        let go_bus = self.exit(exit).done;
        let m = self.comp(module);
        for (port, bus) in [(m.clock, clock), (m.reset, reset), (m.go, go_bus)]
        {
            self.ports[port].peer = Some(bus);
            self.buses[bus].peer = Some(port);
        }
        Ok(module)
    }

    pub(crate) fn push_bus(&mut self, exit: ExitIdx, name: Id) -> BusIdx {
        self.buses.push(Bus::new(name, exit))
    }

    /// Add a data port to `comp`. A module port is paired with a new data bus
    /// of its InBuf.
    pub fn make_data_port(&mut self, comp: CompIdx) -> PortIdx {
        let n = self.comp(comp).data_ports.len();
        let name = Id::new(format!("din{n}"));
        let port = self.ports.push(Port::new(name, comp));
        self.comp_mut(comp).data_ports.push(port);
        if let Some(m) = self.comp(comp).module() {
            let exit = self.main_exit(m.in_buf);
            let bus = self.push_bus(exit, name);
            self.exit_mut(exit).data_buses.push(bus);
            self.ports[port].peer = Some(bus);
            self.buses[bus].peer = Some(port);
        }
        port
    }

    /// Add the object reference port of an instance method call.
    pub fn make_this_port(&mut self, comp: CompIdx) -> LimResult<PortIdx> {
        if self.comp(comp).this.is_some() {
            return Err(Error::illegal_state(format!(
                "{} already has a this port",
                self.describe(comp)
            )));
        }
        let port = self.ports.push(Port::new(Id::new("this"), comp));
        self.comp_mut(comp).this = Some(port);
        Ok(port)
    }

    /// Create an exit of `comp` with `data_count` data buses. The exit of a
    /// module gets an OutBuf inside the module that collects its values.
    pub fn make_exit(
        &mut self,
        comp: CompIdx,
        tag: ExitTag,
        data_count: usize,
    ) -> LimResult<ExitIdx> {
        if self.comp(comp).exits.contains_key(&tag) {
            return Err(Error::illegal_state(format!(
                "{} already has a {tag} exit",
                self.describe(comp)
            )));
        }
        let idx = self.exits.peek_next_idx();
        let done = self.push_bus(idx, Id::new("done"));
        self.buses[done].value = Some(Value::local(done, 1, false));
        self.exits.push(Exit {
            tag,
            owner: comp,
            latency: Latency::ZERO,
            done,
            data_buses: SmallVec::new(),
            drivens: Vec::new(),
            peer: None,
        });
        self.comp_mut(comp).exits.insert(tag, idx);

        if self.comp(comp).is_module() {
            let name =
                Id::new(format!("{}_outbuf_{tag}", self.comp(comp).name));
            let out_buf = self.alloc_component(
                name,
                ComponentKind::OutBuf(OutBufData { exit: idx }),
                ControlFlags::COMBINATIONAL,
            );
            let produces_done = self.comp(comp).flags.produces_done;
            let ob = self.comp_mut(out_buf);
            ob.owner = Some(comp);
            ob.flags.consumes_go = produces_done;
            let go = ob.go;
            self.module_mut(comp).components.push(out_buf);
            self.exit_mut(idx).peer = Some(out_buf);
            self.ports[go].peer = Some(done);
            self.buses[done].peer = Some(go);
        }

        for _ in 0..data_count {
            self.make_data_bus(idx);
        }
        Ok(idx)
    }

    /// Add a data bus to `exit`. When the exit belongs to a module, its
    /// OutBuf gains the matching data port in the same step.
    pub fn make_data_bus(&mut self, exit: ExitIdx) -> BusIdx {
        let n = self.exit(exit).data_buses.len();
        let bus = self.push_bus(exit, Id::new(format!("dout{n}")));
        self.exit_mut(exit).data_buses.push(bus);
        if let Some(out_buf) = self.exit(exit).peer {
            let port = self.make_data_port(out_buf);
            self.ports[port].peer = Some(bus);
            self.buses[bus].peer = Some(port);
        }
        bus
    }

    /// Remove a data bus from its exit along with everything connected to
    /// it. The peer on the other side of a module boundary goes too.
    pub fn remove_data_bus(&mut self, bus: BusIdx) -> LimResult<()> {
        let exit = self.bus(bus).owner;
        let Some(pos) =
            self.exit(exit).data_buses.iter().position(|b| *b == bus)
        else {
            return Err(Error::malformed_structure(format!(
                "bus {} is not a data bus of its exit",
                self.bus(bus).name
            )));
        };
        self.exit_mut(exit).data_buses.remove(pos);
        let peer = self.bus_mut(bus).peer.take();
        self.disconnect_bus(bus);
        self.clear_logical_dependents(bus);
        self.buses.remove(bus);
        if let Some(port) = peer {
            self.port_mut(port).peer = None;
            self.remove_data_port(port)?;
        }
        Ok(())
    }

    /// Remove a data port from its owner along with every connection to it.
    /// The peer on the other side of a module boundary goes too.
    pub fn remove_data_port(&mut self, port: PortIdx) -> LimResult<()> {
        let owner = self.port(port).owner;
        let Some(pos) =
            self.comp(owner).data_ports.iter().position(|p| *p == port)
        else {
            return Err(Error::malformed_structure(format!(
                "port {} is not a data port of {}",
                self.port(port).name,
                self.describe(owner)
            )));
        };
        self.comp_mut(owner).data_ports.remove(pos);
        let peer = self.port_mut(port).peer.take();
        self.disconnect_port(port);
        for entry in self.comp(owner).entries.clone() {
            self.clear_dependencies(entry, port);
        }
        self.ports.remove(port);
        if let Some(bus) = peer {
            self.bus_mut(bus).peer = None;
            self.remove_data_bus(bus)?;
        }
        Ok(())
    }

    // ========================= Physical wiring ============================

    /// Drive `port` from `bus`, replacing any previous connection.
    pub fn connect(&mut self, port: PortIdx, bus: BusIdx) {
        self.disconnect_port(port);
        self.ports[port].bus = Some(bus);
        self.buses[bus].ports.push(port);
    }

    pub fn disconnect_port(&mut self, port: PortIdx) {
        if let Some(bus) = self.ports[port].bus.take() {
            if let Some(b) = self.buses.get_mut(bus) {
                b.ports.retain(|p| *p != port);
            }
        }
    }

    /// Detach every port driven by `bus`.
    pub fn disconnect_bus(&mut self, bus: BusIdx) {
        let ports = std::mem::take(&mut self.buses[bus].ports);
        for port in ports {
            if let Some(p) = self.ports.get_mut(port) {
                p.bus = None;
            }
        }
    }

    /// Remove every dependency naming `bus` as its source.
    pub fn clear_logical_dependents(&mut self, bus: BusIdx) {
        for dep in self.bus(bus).logical_dependents.clone() {
            self.remove_dependency(dep);
        }
    }

    // ========================= Logical wiring ============================

    /// Create an entry of `comp`, optionally driven by `driving`.
    pub fn make_entry(
        &mut self,
        comp: CompIdx,
        driving: Option<ExitIdx>,
    ) -> EntryIdx {
        let entry = self.entries.push(Entry {
            owner: comp,
            driving_exit: None,
            deps: LinkedHashMap::new(),
        });
        self.comp_mut(comp).entries.push(entry);
        self.set_driving_exit(entry, driving);
        entry
    }

    /// Change the exit driving `entry`, keeping the exit's list of driven
    /// entries in step.
    pub fn set_driving_exit(&mut self, entry: EntryIdx, exit: Option<ExitIdx>) {
        if let Some(old) = self.entries[entry].driving_exit.take() {
            if let Some(e) = self.exits.get_mut(old) {
                e.drivens.retain(|d| *d != entry);
            }
        }
        if let Some(new) = exit {
            self.exits[new].drivens.push(entry);
        }
        self.entries[entry].driving_exit = exit;
    }

    /// Record that `port` depends on `bus` within `entry`. The port must
    /// belong to the owner of the entry.
    pub fn add_dependency(
        &mut self,
        entry: EntryIdx,
        port: PortIdx,
        bus: BusIdx,
        kind: DepKind,
    ) -> LimResult<DepIdx> {
        let owner = self.entry(entry).owner;
        if self.port(port).owner != owner {
            return Err(Error::malformed_structure(format!(
                "dependency on port {} of {} added to an entry of {}",
                self.port(port).name,
                self.describe(self.port(port).owner),
                self.describe(owner)
            )));
        }
        let dep = self.deps.push(Dependency {
            kind,
            entry,
            port,
            logical_bus: bus,
        });
        self.entries[entry]
            .deps
            .entry(port)
            .or_insert_with(Vec::new)
            .push(dep);
        self.buses[bus].logical_dependents.push(dep);
        Ok(dep)
    }

    /// Delete a dependency, detaching it from its entry and its source bus.
    pub fn remove_dependency(&mut self, dep: DepIdx) {
        let Some(d) = self.deps.remove(dep) else {
            return;
        };
        if let Some(entry) = self.entries.get_mut(d.entry) {
            if let Some(list) = entry.deps.get_mut(&d.port) {
                list.retain(|x| *x != dep);
                if list.is_empty() {
                    entry.deps.remove(&d.port);
                }
            }
        }
        if let Some(bus) = self.buses.get_mut(d.logical_bus) {
            bus.logical_dependents.retain(|x| *x != dep);
        }
    }

    /// Remove every dependency of `entry` targeting `port`.
    pub fn clear_dependencies(&mut self, entry: EntryIdx, port: PortIdx) {
        let deps = self.entry(entry).dependencies(port).to_vec();
        for dep in deps {
            self.remove_dependency(dep);
        }
    }

    /// Move the dependency to a different source bus.
    pub fn set_logical_bus(&mut self, dep: DepIdx, bus: BusIdx) {
        let old = self.deps[dep].logical_bus;
        if let Some(b) = self.buses.get_mut(old) {
            b.logical_dependents.retain(|x| *x != dep);
        }
        self.deps[dep].logical_bus = bus;
        self.buses[bus].logical_dependents.push(dep);
    }

    /// Remove all dependencies of `entry` and detach it from its driving
    /// exit. The entry itself stays with its owner.
    pub fn decimate_entry(&mut self, entry: EntryIdx) {
        let deps: Vec<DepIdx> = self.entry(entry).all_dependencies().collect();
        for dep in deps {
            self.remove_dependency(dep);
        }
        self.set_driving_exit(entry, None);
    }

    pub fn remove_entry(&mut self, entry: EntryIdx) {
        self.decimate_entry(entry);
        let owner = self.entry(entry).owner;
        if let Some(c) = self.comps.get_mut(owner) {
            c.entries.retain(|e| *e != entry);
        }
        self.entries.remove(entry);
    }

    // ========================= Teardown ============================

    /// Detach every bus of `exit` from the ports it drives and from the
    /// dependencies naming it.
    pub fn disconnect_exit(&mut self, exit: ExitIdx) {
        for bus in self.exit_buses(exit) {
            self.disconnect_bus(bus);
            self.clear_logical_dependents(bus);
        }
    }

    /// Remove every connection of `comp` to the rest of the design: its
    /// entries, the physical connections of its ports and the consumers of
    /// its buses.
    pub fn disconnect_component(&mut self, comp: CompIdx) {
        for entry in self.comp(comp).entries.clone() {
            self.remove_entry(entry);
        }
        let ports: Vec<PortIdx> = self.comp(comp).ports().collect();
        for port in ports {
            self.disconnect_port(port);
        }
        let exits: Vec<ExitIdx> =
            self.comp(comp).exits().map(|(_, e)| e).collect();
        for exit in exits {
            self.disconnect_exit(exit);
        }
        log::trace!("disconnected {}", self.describe(comp));
    }

    /// Remove the exit with `tag` from `comp`. The entries it drove lose
    /// their driving exit and a module loses the matching OutBuf.
    pub fn remove_exit(&mut self, comp: CompIdx, tag: ExitTag) -> LimResult<()> {
        let Some(exit) = self.comp_mut(comp).exits.remove(&tag) else {
            return Err(Error::illegal_state(format!(
                "{} has no {tag} exit",
                self.describe(comp)
            )));
        };
        for entry in self.exit(exit).drivens.clone() {
            self.set_driving_exit(entry, None);
        }
        self.disconnect_exit(exit);
        if let Some(out_buf) = self.exit(exit).peer {
            self.disconnect_component(out_buf);
            if let Some(m) = self.comp_mut(comp).module_mut() {
                m.components.retain(|c| *c != out_buf);
            }
            self.delete_component(out_buf);
        }
        for bus in self.exit_buses(exit) {
            self.buses.remove(bus);
        }
        self.exits.remove(exit);
        Ok(())
    }

    /// Free `comp`, and for a module everything it contains, from the pools.
    /// The component must already be disconnected.
    pub(crate) fn delete_component(&mut self, comp: CompIdx) {
        let Some(c) = self.comps.remove(comp) else {
            return;
        };
        match &c.kind {
            ComponentKind::Module(m) => {
                for child in &m.components {
                    self.delete_component(*child);
                }
            }
            ComponentKind::Call(data) => {
                self.procedure_mut(data.procedure).calls.forget(comp);
                self.tasks.retain(|t| t.call != comp);
            }
            ComponentKind::Referee(_) => self.referees.retain(|r| *r != comp),
            _ => {}
        }
        self.forget_accessor(comp);
        for entry in &c.entries {
            self.decimate_entry(*entry);
            self.entries.remove(*entry);
        }
        let ports: Vec<PortIdx> = c.ports().collect();
        for port in ports {
            self.disconnect_port(port);
            self.ports.remove(port);
        }
        for (_, exit) in c.exits() {
            let mut buses: Vec<BusIdx> =
                self.exit(exit).buses().collect();
            if let ComponentKind::InBuf(data) = &c.kind {
                buses.extend([data.clock, data.reset]);
            }
            for bus in buses {
                self.disconnect_bus(bus);
                self.clear_logical_dependents(bus);
                self.buses.remove(bus);
            }
            for entry in self.exit(exit).drivens.clone() {
                self.set_driving_exit(entry, None);
            }
            self.exits.remove(exit);
        }
    }

    /// Re-key an exit of `comp`.
    pub fn change_exit(
        &mut self,
        comp: CompIdx,
        old: ExitTag,
        new: ExitTag,
    ) -> LimResult<()> {
        if self.comp(comp).exits.contains_key(&new) {
            return Err(Error::illegal_state(format!(
                "{} already has a {new} exit",
                self.describe(comp)
            )));
        }
        let Some(exit) = self.comp_mut(comp).exits.remove(&old) else {
            return Err(Error::illegal_state(format!(
                "{} has no {old} exit",
                self.describe(comp)
            )));
        };
        self.comp_mut(comp).exits.insert(new, exit);
        self.exit_mut(exit).tag = new;
        Ok(())
    }

    // ========================= Values ============================

    /// Establish the width of `port`. The value starts out as generic care
    /// bits.
    pub fn set_port_size(
        &mut self,
        port: PortIdx,
        size: usize,
        signed: bool,
    ) -> LimResult<()> {
        let p = &mut self.ports[port];
        if p.value.is_some() {
            return Err(Error::illegal_state(format!(
                "size of port {} is already set",
                p.name
            )));
        }
        if size < 1 {
            return Err(Error::illegal_state(format!(
                "invalid size {size} for port {}",
                p.name
            )));
        }
        p.value = Some(Value::new(size, signed));
        Ok(())
    }

    /// Establish the width of `bus`. Every bit starts out produced locally by
    /// the bus.
    pub fn set_bus_size(
        &mut self,
        bus: BusIdx,
        size: usize,
        signed: bool,
    ) -> LimResult<()> {
        let b = &mut self.buses[bus];
        if b.value.is_some() {
            return Err(Error::illegal_state(format!(
                "size of bus {} is already set",
                b.name
            )));
        }
        if size < 1 {
            return Err(Error::illegal_state(format!(
                "invalid size {size} for bus {}",
                b.name
            )));
        }
        b.value = Some(Value::local(bus, size, signed));
        Ok(())
    }

    /// Commit the value of `bus`. Propagation through the bus is rejected
    /// from then on.
    pub fn force_bus_value(&mut self, bus: BusIdx, value: Value) -> LimResult<()> {
        let b = &mut self.buses[bus];
        let Some(current) = &b.value else {
            return Err(Error::illegal_state(format!(
                "cannot force the value of unsized bus {}",
                b.name
            )));
        };
        if value.size() == 0 {
            return Err(Error::illegal_state(format!(
                "cannot force an empty value on bus {}",
                b.name
            )));
        }
        if value.size() > current.size() {
            return Err(Error::size_mismatch(
                format!("forced value of bus {}", b.name),
                current.size(),
                value.size(),
            ));
        }
        b.value = Some(value);
        b.forced = true;
        Ok(())
    }

    // ========================= Attributes ============================

    /// Copy the flags of `from` to `to` and give `to` a generic value of the
    /// same shape.
    pub fn copy_port_attributes(&mut self, from: PortIdx, to: PortIdx) {
        let (used, tag, value) = {
            let p = self.port(from);
            (p.used, p.tag, p.value.as_ref().map(|v| (v.size(), v.is_signed())))
        };
        let p = &mut self.ports[to];
        p.used = used;
        p.tag = tag;
        if let Some((size, signed)) = value {
            p.value = Some(Value::new(size, signed));
        }
    }

    /// Copy the flags of `from` to `to`. Constant and don't-care bits carry
    /// over, the rest become bits local to `to`.
    pub fn copy_bus_attributes(&mut self, from: BusIdx, to: BusIdx) {
        let b = self.bus(from);
        let (used, float, tag) = (b.used, b.float, b.tag);
        let value = b.value.as_ref().map(|v| {
            let mut copy = Value::local(to, v.size(), v.is_signed());
            for (i, bit) in v.bits().iter().enumerate() {
                if bit.is_constant() || !bit.is_care() {
                    copy.set_bit(i, *bit);
                }
            }
            copy
        });
        let b = &mut self.buses[to];
        b.used = used;
        b.float = float;
        b.tag = tag;
        b.value = value;
    }

    /// Copy the latency and the attributes of every bus of `from` to the
    /// buses in the same position of `to`.
    pub fn copy_exit_attributes(&mut self, from: ExitIdx, to: ExitIdx) {
        self.exits[to].latency = self.exit(from).latency.clone();
        let pairs: Vec<(BusIdx, BusIdx)> =
            self.exit(from).buses().zip(self.exit(to).buses()).collect();
        for (f, t) in pairs {
            self.copy_bus_attributes(f, t);
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{DepKind, Design, ExitTag, OpKind};

    #[test]
    fn setting_a_size_twice_fails() {
        let mut design = Design::new("test");
        let add = design.make_op("add", OpKind::Add, 8, true).unwrap();
        let port = design.comp(add).data_ports()[0];
        let bus = design.result_bus(add).unwrap();
        assert!(design.set_port_size(port, 8, true).is_ok());
        assert!(design.set_port_size(port, 8, true).is_err());
        assert!(design.set_bus_size(bus, 8, true).is_err());
        assert_eq!(design.bus(bus).size(), 8);
    }

    #[test]
    fn disconnect_clears_both_sides() {
        let mut design = Design::new("test");
        let a = design.make_constant("a", 3, 8, true).unwrap();
        let add = design.make_op("add", OpKind::Add, 8, true).unwrap();
        let bus = design.result_bus(a).unwrap();
        let ports = design.comp(add).data_ports().to_vec();
        for p in &ports {
            design.connect(*p, bus);
        }
        assert_eq!(design.bus(bus).ports().len(), 2);
        design.disconnect_bus(bus);
        assert!(design.bus(bus).ports().is_empty());
        for p in ports {
            assert_eq!(design.port(p).bus(), None);
        }
    }

    #[test]
    fn dependency_must_target_entry_owner() {
        let mut design = Design::new("test");
        let a = design.make_constant("a", 3, 8, true).unwrap();
        let b = design.make_constant("b", 4, 8, true).unwrap();
        let add = design.make_op("add", OpKind::Add, 8, true).unwrap();
        let entry = design.make_entry(add, None);
        let bus = design.result_bus(a).unwrap();
        let foreign = design.comp(b).go();
        assert!(design.add_dependency(entry, foreign, bus, DepKind::Data).is_err());

        let port = design.comp(add).data_ports()[0];
        let dep = design.add_dependency(entry, port, bus, DepKind::Data).unwrap();
        assert_eq!(design.bus(bus).logical_dependents(), &[dep]);
        design.remove_dependency(dep);
        assert!(design.bus(bus).logical_dependents().is_empty());
        assert!(design.entry(entry).dependencies(port).is_empty());
    }

    #[test]
    fn driving_exit_is_symmetric() {
        let mut design = Design::new("test");
        let a = design.make_constant("a", 3, 8, true).unwrap();
        let add = design.make_op("add", OpKind::Add, 8, true).unwrap();
        let exit = design.main_exit(a);
        let entry = design.make_entry(add, Some(exit));
        assert_eq!(design.exit(exit).drivens(), &[entry]);
        design.set_driving_exit(entry, None);
        assert!(design.exit(exit).drivens().is_empty());
    }

    #[test]
    fn changing_an_exit_tag() {
        let mut design = Design::new("test");
        let noop = design.make_noop("nop").unwrap();
        let ret = ExitTag::RETURN;
        design.change_exit(noop, ExitTag::DONE, ret).unwrap();
        assert!(design.comp(noop).main_exit().is_none());
        assert!(design.comp(noop).exit(ret).is_some());
        assert!(design.change_exit(noop, ExitTag::DONE, ret).is_err());
    }
}
