//! Deep copies of components. A [CloneContext] records the copy made of
//! every component, port, bus, exit and entry so that later passes can
//! retarget references into the clone.
use crate::{
    BlockData, BranchData, BusIdx, CallData, CompIdx, Component,
    ComponentKind, DecisionData, Design, EntryIdx, ExitIdx, LatchData,
    LoopBodyData, LoopData, Module, ModuleShape, MuxData, PortIdx, ProcIdx,
    RegData,
};
use ahash::AHashMap;
use lim_utils::{Error, LimResult};

/// Correlation from original handles to the handles of their copies.
#[derive(Debug, Default)]
pub struct CloneContext {
    pub comps: AHashMap<CompIdx, CompIdx>,
    pub ports: AHashMap<PortIdx, PortIdx>,
    pub buses: AHashMap<BusIdx, BusIdx>,
    pub exits: AHashMap<ExitIdx, ExitIdx>,
    pub entries: AHashMap<EntryIdx, EntryIdx>,
}

/// Handles outside the cloned region map to themselves.
impl CloneContext {
    pub fn map_comp(&self, c: CompIdx) -> CompIdx {
        self.comps.get(&c).copied().unwrap_or(c)
    }

    pub fn map_port(&self, p: PortIdx) -> PortIdx {
        self.ports.get(&p).copied().unwrap_or(p)
    }

    pub fn map_bus(&self, b: BusIdx) -> BusIdx {
        self.buses.get(&b).copied().unwrap_or(b)
    }

    pub fn map_exit(&self, e: ExitIdx) -> ExitIdx {
        self.exits.get(&e).copied().unwrap_or(e)
    }

    pub fn map_entry(&self, e: EntryIdx) -> EntryIdx {
        self.entries.get(&e).copied().unwrap_or(e)
    }

    fn map_opt(&self, c: Option<CompIdx>) -> Option<CompIdx> {
        c.map(|c| self.map_comp(c))
    }
}

impl Design {
    /// Copy `comp` and, for a module, everything inside it. The copy has no
    /// owner and no entries; wiring it into a module is up to the caller.
    pub fn clone_component(
        &mut self,
        comp: CompIdx,
        ctx: &mut CloneContext,
    ) -> LimResult<CompIdx> {
        let src = self.comp(comp).clone();
        match &src.kind {
            ComponentKind::InBuf(_)
            | ComponentKind::OutBuf(_)
            | ComponentKind::Referee(_) => {
                return Err(Error::unsupported_clone(self.describe(comp)));
            }
            ComponentKind::Call(call) if self.procedure(call.procedure).shared => {
                return Err(Error::unsupported_clone(format!(
                    "{} of shared procedure {}",
                    self.describe(comp),
                    self.procedure(call.procedure).name
                )));
            }
            _ => {}
        }
        let clone = if src.is_module() {
            self.clone_module(comp, &src, ctx)?
        } else {
            self.clone_leaf(comp, &src, ctx)?
        };
        log::debug!(
            "cloned {} as {}",
            self.describe(comp),
            self.describe(clone)
        );
        Ok(clone)
    }

    /// Copy the ports and exits of `src` onto `new`.
    fn clone_interface(
        &mut self,
        src: &Component,
        new: CompIdx,
        ctx: &mut CloneContext,
    ) -> LimResult<()> {
        let n = self.comp(new);
        let control = [
            (src.clock(), n.clock()),
            (src.reset(), n.reset()),
            (src.go(), n.go()),
        ];
        for (from, to) in control {
            self.copy_port_attributes(from, to);
            ctx.ports.insert(from, to);
        }
        if let Some(this) = src.this_port() {
            let port = self.make_this_port(new)?;
            self.copy_port_attributes(this, port);
            ctx.ports.insert(this, port);
        }
        for from in src.data_ports() {
            let to = self.make_data_port(new);
            let name = self.port(*from).name;
            self.port_mut(to).name = name;
            self.copy_port_attributes(*from, to);
            ctx.ports.insert(*from, to);
        }
        for (tag, from) in src.exits() {
            let count = self.exit(from).data_buses().len();
            let to = self.make_exit(new, tag, count)?;
            self.copy_exit_attributes(from, to);
            ctx.exits.insert(from, to);
            let pairs: Vec<(BusIdx, BusIdx)> =
                self.exit(from).buses().zip(self.exit(to).buses()).collect();
            for (f, t) in pairs {
                let name = self.bus(f).name;
                self.bus_mut(t).name = name;
                ctx.buses.insert(f, t);
            }
        }
        Ok(())
    }

    fn clone_leaf(
        &mut self,
        comp: CompIdx,
        src: &Component,
        ctx: &mut CloneContext,
    ) -> LimResult<CompIdx> {
        let name = self.namegen.gen_name(src.name.as_str());
        let new = self.alloc_component(name, ComponentKind::NoOp, src.flags);
        self.comp_mut(new).non_removable = src.non_removable;
        ctx.comps.insert(comp, new);
        self.clone_interface(src, new, ctx)?;
        let kind = match &src.kind {
            ComponentKind::Reg(r) => ComponentKind::Reg(RegData {
                data: ctx.map_port(r.data),
                set: ctx.map_port(r.set),
                internal_reset: ctx.map_port(r.internal_reset),
                enable: ctx.map_port(r.enable),
                init: r.init.clone(),
            }),
            ComponentKind::Mux(m) => ComponentKind::Mux(MuxData {
                pairs: m
                    .pairs
                    .iter()
                    .map(|(s, d)| (ctx.map_port(*s), ctx.map_port(*d)))
                    .collect(),
            }),
            ComponentKind::Call(call) => {
                self.procedure_mut(call.procedure)
                    .calls
                    .add_reference(new)?;
                ComponentKind::Call(CallData {
                    procedure: call.procedure,
                    ports: call
                        .ports
                        .iter()
                        .map(|(c, b)| (ctx.map_port(*c), *b))
                        .collect(),
                    exits: call
                        .exits
                        .iter()
                        .map(|(c, b)| (ctx.map_exit(*c), *b))
                        .collect(),
                    buses: call
                        .buses
                        .iter()
                        .map(|(c, b)| (ctx.map_bus(*c), *b))
                        .collect(),
                })
            }
            other => other.clone(),
        };
        self.comp_mut(new).kind = kind;
        Ok(new)
    }

    fn clone_module(
        &mut self,
        comp: CompIdx,
        src: &Component,
        ctx: &mut CloneContext,
    ) -> LimResult<CompIdx> {
        let module = self.module(comp).clone();
        let name = self.namegen.gen_name(src.name.as_str());
        let new = self.alloc_module(
            name,
            ModuleShape::Block(BlockData::default()),
            src.flags,
        )?;
        self.comp_mut(new).non_removable = src.non_removable;
        match self.fill_module_clone(comp, src, &module, new, ctx) {
            Ok(()) => Ok(new),
            Err(e) => {
                // Drop the partial copy and everything cloned into it.
                self.disconnect_component(new);
                self.delete_component(new);
                ctx.comps.retain(|_, c| self.comps.get(*c).is_some());
                ctx.ports.retain(|_, p| self.ports.get(*p).is_some());
                ctx.buses.retain(|_, b| self.buses.get(*b).is_some());
                ctx.exits.retain(|_, x| self.exits.get(*x).is_some());
                ctx.entries.retain(|_, e| self.entries.get(*e).is_some());
                Err(e)
            }
        }
    }

    fn fill_module_clone(
        &mut self,
        comp: CompIdx,
        src: &Component,
        module: &Module,
        new: CompIdx,
        ctx: &mut CloneContext,
    ) -> LimResult<()> {
        ctx.comps.insert(comp, new);
        self.clone_interface(src, new, ctx)?;

        // Boundary buffers were created along with the interface.
        let new_in_buf = self.in_buf(new);
        ctx.comps.insert(module.in_buf, new_in_buf);
        let (from, to) = (self.main_exit(module.in_buf), self.main_exit(new_in_buf));
        ctx.exits.insert(from, to);
        let pairs: Vec<(BusIdx, BusIdx)> = self
            .exit_buses(from)
            .into_iter()
            .zip(self.exit_buses(to))
            .collect();
        for (f, t) in pairs {
            self.copy_bus_attributes(f, t);
            ctx.buses.insert(f, t);
        }
        for (_, exit) in src.exits() {
            let (Some(old_ob), Some(new_ob)) = (
                self.out_buf(exit),
                self.out_buf(ctx.map_exit(exit)),
            ) else {
                continue;
            };
            ctx.comps.insert(old_ob, new_ob);
            let ports: Vec<(PortIdx, PortIdx)> = self
                .comp(old_ob)
                .ports()
                .zip(self.comp(new_ob).ports())
                .collect();
            for (f, t) in ports {
                self.copy_port_attributes(f, t);
                ctx.ports.insert(f, t);
            }
        }

        for child in module.components() {
            if self.comp(*child).node_kind().is_buffer() {
                continue;
            }
            let copy = self.clone_component(*child, ctx)?;
            if let Err(e) = self.add_component(new, copy) {
                self.disconnect_component(copy);
                self.delete_component(copy);
                return Err(e);
            }
        }

        // Entries and physical connections between the children.
        for child in module.components() {
            if *child == module.in_buf {
                continue;
            }
            for entry in self.comp(*child).entries().to_vec() {
                let driving = self.entry(entry).driving_exit().map(|e| ctx.map_exit(e));
                let copy = self.make_entry(ctx.map_comp(*child), driving);
                ctx.entries.insert(entry, copy);
                let deps: Vec<_> = self.entry(entry).all_dependencies().collect();
                for dep in deps {
                    let d = self.dep(dep);
                    let (port, bus, kind) = (d.port(), d.logical_bus(), d.kind);
                    self.add_dependency(
                        copy,
                        ctx.map_port(port),
                        ctx.map_bus(bus),
                        kind,
                    )?;
                }
            }
            let ports: Vec<PortIdx> = self.comp(*child).ports().collect();
            for port in ports {
                if let Some(bus) = self.port(port).bus() {
                    self.connect(ctx.map_port(port), ctx.map_bus(bus));
                }
            }
        }

        self.module_mut(new).shape = remap_shape(&module.shape, ctx);
        Ok(())
    }

    /// Copy the body of `procedure` into a new procedure without calls.
    pub fn clone_procedure(
        &mut self,
        procedure: ProcIdx,
        ctx: &mut CloneContext,
    ) -> LimResult<ProcIdx> {
        let p = self.procedure(procedure);
        if p.shared {
            return Err(Error::unsupported_clone(format!(
                "shared procedure {}",
                p.name
            )));
        }
        let (name, body) = (p.name, p.body);
        let body = self.clone_component(body, ctx)?;
        let name = self.namegen.gen_name(name.as_str());
        self.make_procedure(name, body)
    }
}

fn remap_shape(shape: &ModuleShape, ctx: &CloneContext) -> ModuleShape {
    let block = |b: &BlockData| BlockData {
        sequence: b.sequence.iter().map(|c| ctx.map_comp(*c)).collect(),
        procedure_body: b.procedure_body,
    };
    match shape {
        ModuleShape::Block(b) => ModuleShape::Block(block(b)),
        ModuleShape::Switch(b) => ModuleShape::Switch(block(b)),
        ModuleShape::Loop(l) => ModuleShape::Loop(LoopData {
            init_block: ctx.map_opt(l.init_block),
            body: ctx.map_opt(l.body),
            control_reg: ctx.map_opt(l.control_reg),
            data_regs: l.data_regs.iter().map(|c| ctx.map_comp(*c)).collect(),
            latches: l.latches.iter().map(|c| ctx.map_comp(*c)).collect(),
            iterations: l.iterations,
            body_init_entry: l.body_init_entry.map(|e| ctx.map_entry(e)),
            body_feedback_entry: l.body_feedback_entry.map(|e| ctx.map_entry(e)),
        }),
        ModuleShape::LoopBody(lb) => ModuleShape::LoopBody(LoopBodyData {
            kind: lb.kind,
            decision: ctx.map_opt(lb.decision),
            body: ctx.map_opt(lb.body),
            update: ctx.map_opt(lb.update),
        }),
        ModuleShape::Branch(b) => ModuleShape::Branch(BranchData {
            decision: ctx.map_opt(b.decision),
            true_branch: ctx.map_opt(b.true_branch),
            false_branch: ctx.map_opt(b.false_branch),
        }),
        ModuleShape::Decision(d) => ModuleShape::Decision(DecisionData {
            test_block: ctx.map_opt(d.test_block),
            test_component: ctx.map_comp(d.test_component),
            not: ctx.map_opt(d.not),
            true_and: ctx.map_opt(d.true_and),
            false_and: ctx.map_opt(d.false_and),
        }),
        ModuleShape::Latch(l) => ModuleShape::Latch(LatchData {
            reg: ctx.map_comp(l.reg),
            mux: ctx.map_comp(l.mux),
            result: ctx.map_bus(l.result),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::CloneContext;
    use crate::{ComponentKind, DepKind, Design, ModuleShape, OpKind};
    use lim_utils::Error;

    #[test]
    fn leaf_clone_has_its_own_ports_and_buses() {
        let mut design = Design::new("test");
        let add = design.make_op("add", OpKind::Add, 8, true).unwrap();
        for port in design.comp(add).data_ports().to_vec() {
            design.set_port_size(port, 8, true).unwrap();
        }
        let mut ctx = CloneContext::default();
        let copy = design.clone_component(add, &mut ctx).unwrap();

        assert_ne!(copy, add);
        assert_eq!(ctx.comps.get(&add), Some(&copy));
        let original: Vec<_> = design.comp(add).ports().collect();
        let cloned: Vec<_> = design.comp(copy).ports().collect();
        assert_eq!(original.len(), cloned.len());
        for (o, c) in original.iter().zip(&cloned) {
            assert_ne!(o, c);
            assert_eq!(ctx.ports.get(o), Some(c));
            assert_eq!(design.port(*o).size(), design.port(*c).size());
        }
        let (ob, cb) = (
            design.result_bus(add).unwrap(),
            design.result_bus(copy).unwrap(),
        );
        assert_ne!(ob, cb);
        assert_eq!(ctx.buses.get(&ob), Some(&cb));
        assert_eq!(design.bus(ob).size(), design.bus(cb).size());
        assert_eq!(
            design.bus(ob).value().unwrap().is_signed(),
            design.bus(cb).value().unwrap().is_signed()
        );
        // Done and result bus, one exit.
        assert_eq!(ctx.buses.len(), 2);
        assert_eq!(ctx.exits.len(), 1);
        assert!(matches!(design.comp(copy).kind, ComponentKind::Op(OpKind::Add)));
    }

    #[test]
    fn block_clone_reconnects_its_children() {
        let mut design = Design::new("test");
        let c3 = design.make_constant("c", 3, 8, true).unwrap();
        let add = design.make_op("add", OpKind::Add, 8, true).unwrap();
        let block = design.make_block("block", vec![c3, add]).unwrap();
        let entry = design.comp(add).entries()[0];
        let port = design.comp(add).data_ports()[0];
        let bus = design.result_bus(c3).unwrap();
        design.add_dependency(entry, port, bus, DepKind::Data).unwrap();
        design.connect(port, bus);

        let mut ctx = CloneContext::default();
        let copy = design.clone_component(block, &mut ctx).unwrap();
        let seq = design.module(copy).sequence().unwrap().to_vec();
        assert_eq!(seq, vec![ctx.map_comp(c3), ctx.map_comp(add)]);

        let new_add = ctx.map_comp(add);
        let new_port = design.comp(new_add).data_ports()[0];
        let new_bus = design.result_bus(ctx.map_comp(c3)).unwrap();
        assert_eq!(design.port(new_port).bus(), Some(new_bus));
        let new_entry = design.comp(new_add).entries()[0];
        assert_eq!(
            design.entry(new_entry).driving_exit(),
            Some(design.main_exit(ctx.map_comp(c3)))
        );
        let dep = design.entry(new_entry).dependencies(new_port)[0];
        assert_eq!(design.dep(dep).logical_bus(), new_bus);
        // The original is untouched.
        assert_eq!(design.port(port).bus(), Some(bus));
        assert!(matches!(design.module(copy).shape, ModuleShape::Block(_)));
    }

    #[test]
    fn boundary_buffers_refuse() {
        let mut design = Design::new("test");
        let block = design.make_block("block", vec![]).unwrap();
        let in_buf = design.in_buf(block);
        let out_buf = design.out_buf(design.main_exit(block)).unwrap();
        let mut ctx = CloneContext::default();
        for buf in [in_buf, out_buf] {
            assert!(matches!(
                design.clone_component(buf, &mut ctx),
                Err(Error::UnsupportedClone(_))
            ));
        }
    }

    #[test]
    fn shared_procedure_calls_refuse() {
        let mut design = Design::new("test");
        let body = design.make_procedure_body("body", vec![]).unwrap();
        let proc = design.make_procedure("f", body).unwrap();
        let call = design.make_call(proc).unwrap();
        let mut ctx = CloneContext::default();
        let copy = design.clone_component(call, &mut ctx).unwrap();
        assert_eq!(design.procedure(proc).calls(), &[call, copy]);

        design.procedure_mut(proc).shared = true;
        assert!(design.clone_component(call, &mut ctx).is_err());
        assert!(design.clone_procedure(proc, &mut ctx).is_err());
    }

    #[test]
    fn failed_module_clone_leaves_nothing_behind() {
        let mut design = Design::new("test");
        let body = design.make_procedure_body("body", vec![]).unwrap();
        let proc = design.make_procedure("f", body).unwrap();
        design.procedure_mut(proc).shared = true;
        let call = design.make_call(proc).unwrap();
        let add = design.make_op("add", OpKind::Add, 4, false).unwrap();
        let inner = design.make_block("inner", vec![call]).unwrap();
        let outer = design.make_block("outer", vec![add, inner]).unwrap();

        let counts = |d: &Design| {
            (d.comps.len(), d.ports.len(), d.buses.len(), d.exits.len())
        };
        let before = counts(&design);
        let mut ctx = CloneContext::default();
        assert!(matches!(
            design.clone_component(outer, &mut ctx),
            Err(Error::UnsupportedClone(_))
        ));
        assert_eq!(counts(&design), before);
        assert_eq!(design.procedure(proc).calls(), &[call]);
        assert!(ctx.comps.values().all(|c| design.find_comp(*c).is_some()));
        assert!(ctx.ports.is_empty() && ctx.buses.is_empty());
    }
}
