//! Construction and editing of modules. Each constructor builds the shape's
//! children into the module and wires their control flow with entries and
//! dependencies; the physical connections are left to the caller except
//! where the shape dictates them.
use crate::{
    BlockData, BranchData, BusIdx, CompIdx, ComponentKind, ControlFlags,
    DecisionData, DepKind, Design, EntryIdx, ExitIdx, ExitTag, ExitType,
    GateKind, Latency, LatchData, LoopBodyData, LoopBodyKind, LoopData,
    ModuleShape,
};
use lim_utils::{Error, LimResult};
use linked_hash_map::LinkedHashMap;

/// Exits of the children of a module grouped by the exit of the module they
/// lead to.
pub type ExitMap = LinkedHashMap<ExitTag, Vec<ExitIdx>>;

/// Clock, reset and go signals available inside a module.
#[derive(Clone, Copy, Debug)]
struct Boundary {
    clock: BusIdx,
    reset: BusIdx,
    go: BusIdx,
    exit: ExitIdx,
}

impl Design {
    fn boundary(&self, module: CompIdx) -> Boundary {
        let in_buf = self.in_buf(module);
        let exit = self.main_exit(in_buf);
        let (clock, reset) = match &self.comp(in_buf).kind {
            ComponentKind::InBuf(data) => (data.clock, data.reset),
            _ => unreachable!("module InBuf has the wrong kind"),
        };
        Boundary {
            clock,
            reset,
            go: self.exit(exit).done,
            exit,
        }
    }

    /// Make `comp` a child of `module`.
    pub fn add_component(
        &mut self,
        module: CompIdx,
        comp: CompIdx,
    ) -> LimResult<()> {
        if !self.comp(module).is_module() {
            return Err(Error::malformed_structure(format!(
                "{} cannot contain components",
                self.describe(module)
            )));
        }
        if let Some(owner) = self.comp(comp).owner() {
            return Err(Error::illegal_state(format!(
                "{} already belongs to {}",
                self.describe(comp),
                self.describe(owner)
            )));
        }
        self.comp_mut(comp).owner = Some(module);
        self.module_mut(module).components.push(comp);
        Ok(())
    }

    /// Add the clock, reset and control dependencies of `entry` on the given
    /// buses.
    pub fn add_dependencies(
        &mut self,
        entry: EntryIdx,
        clock: BusIdx,
        reset: BusIdx,
        go: BusIdx,
    ) -> LimResult<()> {
        let owner = self.entry(entry).owner;
        let c = self.comp(owner);
        let (clk, rst, gop) = (c.clock(), c.reset(), c.go());
        self.add_dependency(entry, clk, clock, DepKind::Clock)?;
        self.add_dependency(entry, rst, reset, DepKind::Reset)?;
        self.add_dependency(entry, gop, go, DepKind::Control)?;
        Ok(())
    }

    /// Append every exit of `comp` to `map`.
    pub fn collect_exits(&self, comp: CompIdx, map: &mut ExitMap) {
        for (tag, exit) in self.comp(comp).exits() {
            map.entry(tag).or_insert_with(Vec::new).push(exit);
        }
    }

    /// Route each group of child exits in `map` to the module exit with the
    /// same tag, creating it if needed. Every child exit drives its own
    /// entry of the OutBuf.
    pub fn merge_exits(
        &mut self,
        module: CompIdx,
        map: &ExitMap,
    ) -> LimResult<()> {
        let b = self.boundary(module);
        for (tag, exits) in map.iter() {
            if exits.is_empty() {
                continue;
            }
            let module_exit = match self.exit_of(module, *tag) {
                Some(e) => e,
                None => self.make_exit(module, *tag, 0)?,
            };
            let Some(out_buf) = self.out_buf(module_exit) else {
                return Err(Error::malformed_structure(format!(
                    "{tag} exit of {} has no OutBuf",
                    self.describe(module)
                )));
            };
            for exit in exits {
                let entry = self.make_entry(out_buf, Some(*exit));
                let done = self.exit(*exit).done;
                self.add_dependencies(entry, b.clock, b.reset, done)?;
            }
        }
        Ok(())
    }

    fn new_module(
        &mut self,
        prefix: &str,
        shape: ModuleShape,
        flags: ControlFlags,
        children: &[CompIdx],
    ) -> LimResult<CompIdx> {
        let name = self.namegen.gen_name(prefix);
        let module = self.alloc_module(name, shape, flags)?;
        for child in children {
            self.add_component(module, *child)?;
        }
        Ok(module)
    }

    // ========================= Blocks ============================

    /// A block executing `components` in order.
    pub fn make_block(
        &mut self,
        prefix: &str,
        components: Vec<CompIdx>,
    ) -> LimResult<CompIdx> {
        self.block_like(prefix, components, false, false)
    }

    /// The outermost block of a procedure. Its main exit is RETURN.
    pub fn make_procedure_body(
        &mut self,
        prefix: &str,
        components: Vec<CompIdx>,
    ) -> LimResult<CompIdx> {
        self.block_like(prefix, components, true, false)
    }

    /// A block made of the cases of a switch statement.
    pub fn make_switch(
        &mut self,
        prefix: &str,
        cases: Vec<CompIdx>,
    ) -> LimResult<CompIdx> {
        self.block_like(prefix, cases, false, true)
    }

    fn block_like(
        &mut self,
        prefix: &str,
        sequence: Vec<CompIdx>,
        procedure_body: bool,
        switch: bool,
    ) -> LimResult<CompIdx> {
        let data = BlockData {
            sequence: sequence.clone(),
            procedure_body,
        };
        let shape = if switch {
            ModuleShape::Switch(data)
        } else {
            ModuleShape::Block(data)
        };
        let block =
            self.new_module(prefix, shape, ControlFlags::SEQUENTIAL, &sequence)?;
        self.set_block_control(block)?;
        log::debug!("built {}", self.describe(block));
        Ok(block)
    }

    /// Each component is driven by the DONE exit of its predecessor. A
    /// component that can leave in more than one way waits for every DONE
    /// exit collected so far.
    fn set_block_control(&mut self, block: CompIdx) -> LimResult<()> {
        let (sequence, procedure_body) = match &self.module(block).shape {
            ModuleShape::Block(b) | ModuleShape::Switch(b) => {
                (b.sequence.clone(), b.procedure_body)
            }
            _ => {
                return Err(Error::malformed_structure(format!(
                    "{} is not a block",
                    self.describe(block)
                )));
            }
        };
        let b = self.boundary(block);
        let mut go = b.go;
        let mut driving = Some(b.exit);
        let mut exits = ExitMap::new();
        for comp in &sequence {
            let entry = self.make_entry(*comp, driving);
            self.add_dependencies(entry, b.clock, b.reset, go)?;
            let c = self.comp(*comp);
            if c.exit_count() > 1 || c.main_exit().is_none() {
                let go_port = c.go();
                if let Some(done_exits) = exits.remove(&ExitTag::DONE) {
                    for e in done_exits {
                        let done = self.exit(e).done;
                        self.add_dependency(
                            entry,
                            go_port,
                            done,
                            DepKind::Control,
                        )?;
                    }
                }
                if let Some(done) = self.comp(*comp).main_exit() {
                    go = self.exit(done).done;
                }
            }
            self.collect_exits(*comp, &mut exits);
            driving = self.comp(*comp).main_exit();
        }

        let done_exits = exits.remove(&ExitTag::DONE);
        let (main_tag, return_exits) = if procedure_body {
            (ExitTag::RETURN, exits.remove(&ExitTag::RETURN))
        } else {
            (ExitTag::DONE, None)
        };
        self.merge_exits(block, &exits)?;

        if let Some(done_exits) = done_exits {
            let exit = self.make_exit(block, main_tag, 0)?;
            let out_buf = self.out_buf(exit).ok_or_else(|| {
                Error::malformed_structure("block exit without OutBuf")
            })?;
            let entry = self.make_entry(out_buf, driving);
            let ob = self.comp(out_buf);
            let (clk, rst, gop) = (ob.clock(), ob.reset(), ob.go());
            self.add_dependency(entry, clk, b.clock, DepKind::Clock)?;
            self.add_dependency(entry, rst, b.reset, DepKind::Reset)?;
            for e in done_exits {
                let done = self.exit(e).done;
                self.add_dependency(entry, gop, done, DepKind::Control)?;
            }
        } else if sequence.is_empty() {
            let exit = self.make_exit(block, main_tag, 0)?;
            let out_buf = self.out_buf(exit).ok_or_else(|| {
                Error::malformed_structure("block exit without OutBuf")
            })?;
            let entry = self.make_entry(out_buf, driving);
            self.add_dependencies(entry, b.clock, b.reset, go)?;
        }

        if let Some(returns) = return_exits {
            let mut map = ExitMap::new();
            map.insert(main_tag, returns);
            self.merge_exits(block, &map)?;
        }
        Ok(())
    }

    // ========================= Decisions ============================

    /// A decision testing the result of `test_component`, which must belong
    /// to `test_block`. It leaves through the "true" or the "false" exit.
    pub fn make_decision(
        &mut self,
        prefix: &str,
        test_block: CompIdx,
        test_component: CompIdx,
    ) -> LimResult<CompIdx> {
        if self.comp(test_component).owner() != Some(test_block) {
            return Err(Error::malformed_structure(format!(
                "{} is not part of the test block {}",
                self.describe(test_component),
                self.describe(test_block)
            )));
        }
        let Some(bool_bus) = self.result_bus(test_component) else {
            return Err(Error::malformed_structure(format!(
                "{} produces no result to test",
                self.describe(test_component)
            )));
        };
        let Some(test_exit) = self.comp(test_block).main_exit() else {
            return Err(Error::malformed_structure(format!(
                "test block {} never completes",
                self.describe(test_block)
            )));
        };
        self.comp_mut(test_component).non_removable = true;

        let not = self.make_gate("not", GateKind::Not, 1)?;
        let true_and = self.make_gate("and", GateKind::And, 2)?;
        let false_and = self.make_gate("and", GateKind::And, 2)?;
        let decision = self.new_module(
            prefix,
            ModuleShape::Decision(DecisionData {
                test_block: Some(test_block),
                test_component,
                not: Some(not),
                true_and: Some(true_and),
                false_and: Some(false_and),
            }),
            ControlFlags::SEQUENTIAL,
            &[test_block, not, true_and, false_and],
        )?;
        let true_exit = self.make_exit(decision, ExitTag::true_branch(), 0)?;
        let false_exit = self.make_exit(decision, ExitTag::false_branch(), 0)?;
        let b = self.boundary(decision);

        // Control
        let test_entry = self.make_entry(test_block, Some(b.exit));
        self.add_dependencies(test_entry, b.clock, b.reset, b.go)?;
        let true_and_entry = self.make_entry(true_and, Some(test_exit));
        self.add_dependencies(true_and_entry, b.clock, b.reset, b.go)?;
        let not_entry = self.make_entry(not, Some(test_exit));
        self.add_dependencies(not_entry, b.clock, b.reset, b.go)?;
        let not_exit = self.main_exit(not);
        let false_and_entry = self.make_entry(false_and, Some(not_exit));
        self.add_dependencies(false_and_entry, b.clock, b.reset, b.go)?;

        for (exit, gate) in [(true_exit, true_and), (false_exit, false_and)] {
            let out_buf = self.out_buf(exit).ok_or_else(|| {
                Error::malformed_structure("decision exit without OutBuf")
            })?;
            let gate_exit = self.main_exit(gate);
            let Some(result) = self.result_bus(gate) else {
                unreachable!("gates always have a result")
            };
            let entry = self.make_entry(out_buf, Some(gate_exit));
            self.add_dependencies(entry, b.clock, b.reset, result)?;
        }

        let mut exits = ExitMap::new();
        for child in [test_block, not, true_and, false_and] {
            self.collect_exits(child, &mut exits);
        }
        for tag in [ExitTag::true_branch(), ExitTag::false_branch(), ExitTag::DONE]
        {
            exits.remove(&tag);
        }
        self.merge_exits(decision, &exits)?;

        // Data: the condition leaves the test block on a new bus.
        let test_done = self.exit(test_exit).done;
        let test_bus = self.make_data_bus(test_exit);
        let test_out_buf = self.out_buf(test_exit);
        if let Some(out_buf) = test_out_buf {
            let port = self.bus(test_bus).peer().ok_or_else(|| {
                Error::malformed_structure("test bus without OutBuf port")
            })?;
            let entry = match self.comp(out_buf).entries().first() {
                Some(e) => *e,
                None => self.make_entry(out_buf, None),
            };
            self.add_dependency(entry, port, bool_bus, DepKind::Data)?;
        }
        let not_done = self.exit(not_exit).done;
        let Some(not_bus) = self.result_bus(not) else {
            unreachable!("gates always have a result")
        };
        let wiring = [
            (true_and_entry, true_and, vec![test_done, test_bus]),
            (not_entry, not, vec![test_bus]),
            (false_and_entry, false_and, vec![not_done, not_bus]),
        ];
        for (entry, gate, sources) in wiring {
            let ports = self.comp(gate).data_ports().to_vec();
            for (port, bus) in ports.into_iter().zip(sources) {
                self.add_dependency(entry, port, bus, DepKind::Data)?;
            }
        }
        log::debug!("built {}", self.describe(decision));
        Ok(decision)
    }

    /// The "true" and "false" exits of a decision.
    pub fn decision_exits(
        &self,
        decision: CompIdx,
    ) -> LimResult<(ExitIdx, ExitIdx)> {
        match (
            self.exit_of(decision, ExitTag::true_branch()),
            self.exit_of(decision, ExitTag::false_branch()),
        ) {
            (Some(t), Some(f)) => Ok((t, f)),
            _ => Err(Error::malformed_structure(format!(
                "{} has no true and false exits",
                self.describe(decision)
            ))),
        }
    }

    // ========================= Branches ============================

    /// An if statement. Without a false branch the false exit of the
    /// decision completes the branch directly.
    pub fn make_branch(
        &mut self,
        prefix: &str,
        decision: CompIdx,
        true_branch: CompIdx,
        false_branch: Option<CompIdx>,
    ) -> LimResult<CompIdx> {
        let (true_exit, false_exit) = self.decision_exits(decision)?;
        let children: Vec<CompIdx> = [decision, true_branch]
            .into_iter()
            .chain(false_branch)
            .collect();
        let branch = self.new_module(
            prefix,
            ModuleShape::Branch(BranchData {
                decision: Some(decision),
                true_branch: Some(true_branch),
                false_branch,
            }),
            ControlFlags::SEQUENTIAL,
            &children,
        )?;
        let b = self.boundary(branch);
        let entry = self.make_entry(decision, Some(b.exit));
        self.add_dependencies(entry, b.clock, b.reset, b.go)?;

        let mut exits = ExitMap::new();
        self.collect_exits(decision, &mut exits);
        exits.remove(&ExitTag::true_branch());
        exits.remove(&ExitTag::false_branch());

        let true_done = self.exit(true_exit).done;
        let entry = self.make_entry(true_branch, Some(true_exit));
        self.add_dependencies(entry, b.clock, b.reset, true_done)?;
        self.collect_exits(true_branch, &mut exits);

        match false_branch {
            Some(fb) => {
                let false_done = self.exit(false_exit).done;
                let entry = self.make_entry(fb, Some(false_exit));
                self.add_dependencies(entry, b.clock, b.reset, false_done)?;
                self.collect_exits(fb, &mut exits);
            }
            None => exits
                .entry(ExitTag::DONE)
                .or_insert_with(Vec::new)
                .push(false_exit),
        }
        self.merge_exits(branch, &exits)?;
        log::debug!("built {}", self.describe(branch));
        Ok(branch)
    }

    // ========================= Loops ============================

    /// One iteration of a loop. The module leaves through its feedback exit
    /// when another iteration is needed and through DONE when the loop is
    /// complete. CONTINUE exits of the body count as feedback.
    pub fn make_loop_body(
        &mut self,
        prefix: &str,
        kind: LoopBodyKind,
        decision: CompIdx,
        body: CompIdx,
        update: Option<CompIdx>,
    ) -> LimResult<CompIdx> {
        if update.is_some() && kind != LoopBodyKind::For {
            return Err(Error::malformed_structure(
                "only for loops have an update block",
            ));
        }
        let (true_exit, false_exit) = self.decision_exits(decision)?;
        let children: Vec<CompIdx> =
            [decision, body].into_iter().chain(update).collect();
        let loop_body = self.new_module(
            prefix,
            ModuleShape::LoopBody(LoopBodyData {
                kind,
                decision: Some(decision),
                body: Some(body),
                update,
            }),
            ControlFlags::SEQUENTIAL,
            &children,
        )?;
        let b = self.boundary(loop_body);
        let continue_tag = ExitTag::new(ExitType::Continue);
        let break_tag = ExitTag::new(ExitType::Break);

        let mut exits = ExitMap::new();
        let mut feedback = Vec::new();
        let mut complete = Vec::new();
        match kind {
            LoopBodyKind::While | LoopBodyKind::For => {
                let entry = self.make_entry(decision, Some(b.exit));
                self.add_dependencies(entry, b.clock, b.reset, b.go)?;
                self.collect_exits(decision, &mut exits);
                exits.remove(&ExitTag::true_branch());
                complete.extend(
                    exits
                        .remove(&ExitTag::false_branch())
                        .unwrap_or_default(),
                );

                let true_done = self.exit(true_exit).done;
                let entry = self.make_entry(body, Some(true_exit));
                self.add_dependencies(entry, b.clock, b.reset, true_done)?;
                self.collect_exits(body, &mut exits);

                let mut iteration_done =
                    exits.remove(&ExitTag::DONE).unwrap_or_default();
                iteration_done
                    .extend(exits.remove(&continue_tag).unwrap_or_default());
                match update {
                    Some(update) if !iteration_done.is_empty() => {
                        let first = iteration_done[0];
                        let go = self.exit(first).done;
                        let entry = self.make_entry(update, Some(first));
                        self.add_dependencies(entry, b.clock, b.reset, go)?;
                        let go_port = self.comp(update).go();
                        for e in &iteration_done[1..] {
                            let done = self.exit(*e).done;
                            self.add_dependency(
                                entry,
                                go_port,
                                done,
                                DepKind::Control,
                            )?;
                        }
                        self.collect_exits(update, &mut exits);
                        feedback.extend(
                            exits.remove(&ExitTag::DONE).unwrap_or_default(),
                        );
                    }
                    _ => feedback.extend(iteration_done),
                }
            }
            LoopBodyKind::Until => {
                let entry = self.make_entry(body, Some(b.exit));
                self.add_dependencies(entry, b.clock, b.reset, b.go)?;
                self.collect_exits(body, &mut exits);
                let mut iteration_done =
                    exits.remove(&ExitTag::DONE).unwrap_or_default();
                iteration_done
                    .extend(exits.remove(&continue_tag).unwrap_or_default());
                if iteration_done.is_empty() {
                    // The body never finishes normally so the test is dead.
                    self.remove_component(loop_body, decision)?;
                } else {
                    let first = iteration_done[0];
                    let go = self.exit(first).done;
                    let entry = self.make_entry(decision, Some(first));
                    self.add_dependencies(entry, b.clock, b.reset, go)?;
                    let go_port = self.comp(decision).go();
                    for e in &iteration_done[1..] {
                        let done = self.exit(*e).done;
                        self.add_dependency(
                            entry,
                            go_port,
                            done,
                            DepKind::Control,
                        )?;
                    }
                    self.collect_exits(decision, &mut exits);
                    feedback.extend(
                        exits.remove(&ExitTag::true_branch()).unwrap_or_default(),
                    );
                    complete.extend(
                        exits
                            .remove(&ExitTag::false_branch())
                            .unwrap_or_default(),
                    );
                }
            }
        }
        complete.extend(exits.remove(&break_tag).unwrap_or_default());
        if !feedback.is_empty() {
            exits.insert(ExitTag::feedback(), feedback);
        }
        if !complete.is_empty() {
            exits.insert(ExitTag::DONE, complete);
        }
        self.merge_exits(loop_body, &exits)?;
        log::debug!("built {}", self.describe(loop_body));
        Ok(loop_body)
    }

    /// A loop running `init_block` once and then `body` until the body
    /// leaves through its DONE exit. A register carries the feedback exit of
    /// the body into the next iteration.
    pub fn make_loop(
        &mut self,
        prefix: &str,
        init_block: CompIdx,
        body: CompIdx,
    ) -> LimResult<CompIdx> {
        let Some(init_exit) = self.comp(init_block).main_exit() else {
            return Err(Error::malformed_structure(format!(
                "init block {} never completes",
                self.describe(init_block)
            )));
        };
        let name = self.namegen.gen_name(prefix);
        let lp = self.alloc_module(
            name,
            ModuleShape::Loop(LoopData {
                init_block: Some(init_block),
                body: Some(body),
                control_reg: None,
                data_regs: Vec::new(),
                latches: Vec::new(),
                iterations: Default::default(),
                body_init_entry: None,
                body_feedback_entry: None,
            }),
            ControlFlags::SEQUENTIAL,
        )?;
        let done_exit = self.make_exit(lp, ExitTag::DONE, 0)?;
        self.add_component(lp, init_block)?;
        self.add_component(lp, body)?;
        let control_reg = self.make_reg("loopControl", 1, false)?;
        self.add_component(lp, control_reg)?;
        self.loop_data_mut(lp)?.control_reg = Some(control_reg);
        let b = self.boundary(lp);

        let entry = self.make_entry(init_block, Some(b.exit));
        self.add_dependencies(entry, b.clock, b.reset, b.go)?;
        let init_done = self.exit(init_exit).done;
        let body_init_entry = self.make_entry(body, Some(init_exit));
        self.add_dependencies(body_init_entry, b.clock, b.reset, init_done)?;
        self.loop_data_mut(lp)?.body_init_entry = Some(body_init_entry);

        match self.exit_of(body, ExitTag::feedback()) {
            Some(feedback) => {
                let fb_done = self.exit(feedback).done;
                let reg_entry = self.make_entry(control_reg, Some(feedback));
                let reg = self.comp(control_reg);
                let (clk, rst) = (reg.clock(), reg.reset());
                let (data, internal_reset) = match &reg.kind {
                    ComponentKind::Reg(r) => (r.data, r.internal_reset),
                    _ => unreachable!("control register has the wrong kind"),
                };
                self.add_dependency(reg_entry, clk, b.clock, DepKind::Clock)?;
                self.add_dependency(reg_entry, rst, b.reset, DepKind::Reset)?;
                self.add_dependency(
                    reg_entry,
                    internal_reset,
                    b.reset,
                    DepKind::Reset,
                )?;
                self.add_dependency(reg_entry, data, fb_done, DepKind::Data)?;

                let reg_exit = self.main_exit(control_reg);
                let Some(reg_out) = self.result_bus(control_reg) else {
                    unreachable!("registers always have a result")
                };
                let fb_entry = self.make_entry(body, Some(reg_exit));
                self.add_dependencies(fb_entry, b.clock, b.reset, reg_out)?;
                self.loop_data_mut(lp)?.body_feedback_entry = Some(fb_entry);
            }
            None => self.remove_component(lp, control_reg)?,
        }

        if let Some(complete) = self.exit_of(body, ExitTag::DONE) {
            let out_buf = self.out_buf(done_exit).ok_or_else(|| {
                Error::malformed_structure("loop exit without OutBuf")
            })?;
            let go = self.exit(complete).done;
            let entry = self.make_entry(out_buf, Some(complete));
            self.add_dependencies(entry, b.clock, b.reset, go)?;
        }

        let mut exits = ExitMap::new();
        self.collect_exits(init_block, &mut exits);
        self.collect_exits(body, &mut exits);
        exits.remove(&ExitTag::DONE);
        exits.remove(&ExitTag::feedback());
        self.merge_exits(lp, &exits)?;
        log::debug!("built {}", self.describe(lp));
        Ok(lp)
    }

    fn loop_data_mut(&mut self, lp: CompIdx) -> LimResult<&mut LoopData> {
        match &mut self.module_mut(lp).shape {
            ModuleShape::Loop(data) => Ok(data),
            _ => Err(Error::malformed_structure("expected a loop")),
        }
    }

    /// Add a register carrying a loop variable across iterations.
    pub fn create_data_register(
        &mut self,
        lp: CompIdx,
        width: usize,
        signed: bool,
    ) -> LimResult<CompIdx> {
        self.loop_data_mut(lp)?;
        let reg = self.make_reg("loopData", width, signed)?;
        self.add_component(lp, reg)?;
        self.loop_data_mut(lp)?.data_regs.push(reg);
        Ok(reg)
    }

    /// Add a latch capturing a loop invariant value on the first iteration.
    pub fn create_data_latch(
        &mut self,
        lp: CompIdx,
        width: usize,
        signed: bool,
    ) -> LimResult<CompIdx> {
        self.loop_data_mut(lp)?;
        let latch = self.make_latch("loopLatch", width, signed)?;
        self.add_component(lp, latch)?;
        self.loop_data_mut(lp)?.latches.push(latch);
        Ok(latch)
    }

    /// A register and a multiplexer that pass the input through while the
    /// enable (go) signal is high and hold the last value otherwise.
    pub fn make_latch(
        &mut self,
        prefix: &str,
        width: usize,
        signed: bool,
    ) -> LimResult<CompIdx> {
        let reg = self.make_reg(&format!("{prefix}_reg"), width, signed)?;
        let mux = self.make_mux(&format!("{prefix}_mux"), 2, width, signed)?;
        let name = self.namegen.gen_name(prefix);
        let latch = self.alloc_module(
            name,
            ModuleShape::Block(BlockData::default()),
            ControlFlags {
                consumes_go: true,
                produces_done: false,
                consumes_clock: true,
                consumes_reset: false,
            },
        )?;
        let exit = self.make_exit(latch, ExitTag::DONE, 0)?;
        self.exit_mut(exit).latency = Latency::ZERO;
        self.add_component(latch, reg)?;
        self.add_component(latch, mux)?;
        let result = self.make_data_bus(exit);
        self.bus_mut(result).used = true;
        self.make_data_port(latch);

        let in_buf = self.in_buf(latch);
        let (clock, data, enable) = {
            let ib_exit = self.main_exit(in_buf);
            let e = self.exit(ib_exit);
            let clock = match &self.comp(in_buf).kind {
                ComponentKind::InBuf(d) => d.clock,
                _ => unreachable!("module InBuf has the wrong kind"),
            };
            (clock, e.data_buses()[0], e.done())
        };
        let (reg_clock, reg_data, reg_enable) = match &self.comp(reg).kind {
            ComponentKind::Reg(r) => (self.comp(reg).clock(), r.data, r.enable),
            _ => unreachable!("make_reg builds registers"),
        };
        self.connect(reg_clock, clock);
        self.connect(reg_data, data);
        self.connect(reg_enable, enable);

        let pairs = match &self.comp(mux).kind {
            ComponentKind::Mux(m) => m.pairs.clone(),
            _ => unreachable!("make_mux builds multiplexers"),
        };
        let (Some(reg_out), Some(mux_out)) =
            (self.result_bus(reg), self.result_bus(mux))
        else {
            unreachable!("registers and multiplexers have results")
        };
        self.connect(pairs[0].0, enable);
        self.connect(pairs[0].1, data);
        self.connect(pairs[1].0, enable);
        self.connect(pairs[1].1, reg_out);
        let out_port = self.bus(result).peer().ok_or_else(|| {
            Error::malformed_structure("latch result without OutBuf port")
        })?;
        self.connect(out_port, mux_out);

        self.module_mut(latch).shape =
            ModuleShape::Latch(LatchData { reg, mux, result });
        self.set_bus_size(result, width, signed)?;
        Ok(latch)
    }

    // ========================= Editing ============================

    /// Registers that carry values around the feedback path of a loop.
    pub fn feedback_points(&self, module: CompIdx) -> Vec<CompIdx> {
        match &self.module(module).shape {
            ModuleShape::Loop(l) => {
                l.data_regs.iter().copied().chain(l.control_reg).collect()
            }
            _ => Vec::new(),
        }
    }

    fn check_child(&self, module: CompIdx, comp: CompIdx) -> LimResult<()> {
        if self.comp(comp).owner() != Some(module) {
            return Err(Error::malformed_structure(format!(
                "{} is not a child of {}",
                self.describe(comp),
                self.describe(module)
            )));
        }
        if self.comp(comp).node_kind().is_buffer() {
            return Err(Error::illegal_state(format!(
                "{} can only be removed with its module or exit",
                self.describe(comp)
            )));
        }
        if matches!(self.module(module).shape, ModuleShape::Latch(_)) {
            return Err(Error::illegal_state(format!(
                "the contents of {} are fixed",
                self.describe(module)
            )));
        }
        Ok(())
    }

    /// Disconnect `comp` and delete it from `module`. Entries driven by its
    /// exits lose their driving exit.
    pub fn remove_component(
        &mut self,
        module: CompIdx,
        comp: CompIdx,
    ) -> LimResult<()> {
        self.check_child(module, comp)?;
        let exits: Vec<ExitIdx> =
            self.comp(comp).exits().map(|(_, e)| e).collect();
        for exit in exits {
            for entry in self.exit(exit).drivens().to_vec() {
                self.set_driving_exit(entry, None);
            }
        }
        self.disconnect_component(comp);
        log::debug!(
            "removing {} from {}",
            self.describe(comp),
            self.describe(module)
        );
        let m = self.module_mut(module);
        m.components.retain(|c| *c != comp);
        forget_child(&mut m.shape, comp);
        self.delete_component(comp);
        Ok(())
    }

    /// Put `inserted` in the place `removed` held in the shape of `module`
    /// and delete `removed`.
    pub fn replace_component(
        &mut self,
        module: CompIdx,
        removed: CompIdx,
        inserted: CompIdx,
    ) -> LimResult<()> {
        self.check_child(module, removed)?;
        if inserted == module || inserted == removed {
            return Err(Error::illegal_state(format!(
                "cannot replace {} with {}",
                self.describe(removed),
                self.describe(inserted)
            )));
        }
        if let Some(owner) = self.comp(inserted).owner() {
            return Err(Error::illegal_state(format!(
                "{} already belongs to {}",
                self.describe(inserted),
                self.describe(owner)
            )));
        }
        if !substitute_child(
            &mut self.module_mut(module).shape,
            removed,
            inserted,
        ) {
            return Err(Error::malformed_structure(format!(
                "{} has no place for {} in {}",
                self.describe(removed),
                self.describe(inserted),
                self.describe(module)
            )));
        }
        self.remove_component(module, removed)?;
        self.add_component(module, inserted)
    }

    /// Insert `comp` into the sequence of a block at `index`. Control
    /// dependencies are the caller's responsibility.
    pub fn insert_component(
        &mut self,
        block: CompIdx,
        comp: CompIdx,
        index: usize,
    ) -> LimResult<()> {
        match &mut self.module_mut(block).shape {
            ModuleShape::Block(b) | ModuleShape::Switch(b) => {
                let index = index.min(b.sequence.len());
                b.sequence.insert(index, comp);
            }
            _ => {
                return Err(Error::malformed_structure(format!(
                    "cannot insert into {}",
                    self.describe(block)
                )));
            }
        }
        self.add_component(block, comp)
    }
}

fn clear_if(slot: &mut Option<CompIdx>, comp: CompIdx) {
    if *slot == Some(comp) {
        *slot = None;
    }
}

fn forget_child(shape: &mut ModuleShape, comp: CompIdx) {
    match shape {
        ModuleShape::Block(b) | ModuleShape::Switch(b) => {
            b.sequence.retain(|c| *c != comp)
        }
        ModuleShape::Loop(l) => {
            clear_if(&mut l.init_block, comp);
            clear_if(&mut l.body, comp);
            clear_if(&mut l.control_reg, comp);
            l.data_regs.retain(|c| *c != comp);
            l.latches.retain(|c| *c != comp);
        }
        ModuleShape::LoopBody(lb) => {
            clear_if(&mut lb.decision, comp);
            clear_if(&mut lb.body, comp);
            clear_if(&mut lb.update, comp);
        }
        ModuleShape::Branch(br) => {
            clear_if(&mut br.decision, comp);
            clear_if(&mut br.true_branch, comp);
            clear_if(&mut br.false_branch, comp);
        }
        ModuleShape::Decision(d) => {
            clear_if(&mut d.test_block, comp);
            clear_if(&mut d.not, comp);
            clear_if(&mut d.true_and, comp);
            clear_if(&mut d.false_and, comp);
        }
        ModuleShape::Latch(_) => {}
    }
}

fn substitute_child(
    shape: &mut ModuleShape,
    removed: CompIdx,
    inserted: CompIdx,
) -> bool {
    let mut found = false;
    let mut swap = |slot: &mut CompIdx| {
        if *slot == removed {
            *slot = inserted;
            found = true;
        }
    };
    match shape {
        ModuleShape::Block(b) | ModuleShape::Switch(b) => {
            b.sequence.iter_mut().for_each(&mut swap)
        }
        ModuleShape::Loop(l) => {
            l.init_block
                .iter_mut()
                .chain(l.body.iter_mut())
                .chain(l.control_reg.iter_mut())
                .chain(l.data_regs.iter_mut())
                .chain(l.latches.iter_mut())
                .for_each(&mut swap);
        }
        ModuleShape::LoopBody(lb) => lb
            .decision
            .iter_mut()
            .chain(lb.body.iter_mut())
            .chain(lb.update.iter_mut())
            .for_each(&mut swap),
        ModuleShape::Branch(br) => br
            .decision
            .iter_mut()
            .chain(br.true_branch.iter_mut())
            .chain(br.false_branch.iter_mut())
            .for_each(&mut swap),
        ModuleShape::Decision(d) => {
            d.test_block
                .iter_mut()
                .chain(d.not.iter_mut())
                .chain(d.true_and.iter_mut())
                .chain(d.false_and.iter_mut())
                .for_each(&mut swap);
            if d.test_component == removed {
                d.test_component = inserted;
                found = true;
            }
        }
        ModuleShape::Latch(_) => {}
    }
    found
}

#[cfg(test)]
mod tests {
    use crate::{
        ComponentKind, DepKind, Design, ExitTag, ExitType, LoopBodyKind,
        ModuleShape, OpKind,
    };

    fn ops(design: &mut Design, n: usize) -> Vec<crate::CompIdx> {
        (0..n)
            .map(|_| design.make_op("add", OpKind::Add, 8, false).unwrap())
            .collect()
    }

    fn decision(design: &mut Design) -> crate::CompIdx {
        let lt = design.make_op("lt", OpKind::LessThan, 8, false).unwrap();
        let test = design.make_block("test", vec![lt]).unwrap();
        design.make_decision("decision", test, lt).unwrap()
    }

    #[test]
    fn adding_a_data_bus_grows_the_out_buf() {
        let mut design = Design::new("test");
        let block = design.make_block("block", vec![]).unwrap();
        let exit = design.main_exit(block);
        design.make_data_bus(exit);
        design.make_data_bus(exit);
        let out_buf = design.out_buf(exit).unwrap();
        assert_eq!(design.comp(out_buf).data_ports().len(), 2);

        let third = design.make_data_bus(exit);
        assert_eq!(design.exit(exit).data_buses().len(), 3);
        assert_eq!(design.comp(out_buf).data_ports().len(), 3);
        let port = design.bus(third).peer().unwrap();
        assert_eq!(design.port(port).peer(), Some(third));

        design.remove_data_bus(third).unwrap();
        assert_eq!(design.comp(out_buf).data_ports().len(), 2);
        assert!(design.find_port(port).is_none());
    }

    #[test]
    fn block_chains_its_components() {
        let mut design = Design::new("test");
        let comps = ops(&mut design, 3);
        let block = design.make_block("block", comps.clone()).unwrap();
        for pair in comps.windows(2) {
            let entry = design.comp(pair[1]).entries()[0];
            assert_eq!(
                design.entry(entry).driving_exit(),
                Some(design.main_exit(pair[0]))
            );
        }
        let out_buf = design.out_buf(design.main_exit(block)).unwrap();
        let entry = design.comp(out_buf).entries()[0];
        assert_eq!(
            design.entry(entry).driving_exit(),
            Some(design.main_exit(comps[2]))
        );
        // The OutBuf waits for every DONE exit of the sequence.
        let go = design.comp(out_buf).go();
        assert_eq!(design.entry(entry).dependencies(go).len(), 3);
        for c in comps {
            assert_eq!(design.comp(c).owner(), Some(block));
        }
    }

    #[test]
    fn procedure_body_completes_with_return() {
        let mut design = Design::new("test");
        let comps = ops(&mut design, 1);
        let body = design.make_procedure_body("body", comps).unwrap();
        assert!(design.exit_of(body, ExitTag::RETURN).is_some());
        assert!(design.exit_of(body, ExitTag::DONE).is_none());
    }

    #[test]
    fn decision_routes_true_and_false() {
        let mut design = Design::new("test");
        let d = decision(&mut design);
        let (t, f) = design.decision_exits(d).unwrap();
        assert_ne!(t, f);
        assert!(design.exit_of(d, ExitTag::DONE).is_none());
        let ModuleShape::Decision(data) = &design.module(d).shape else {
            panic!("expected a decision")
        };
        assert!(design.comp(data.test_component).non_removable);
        let true_and = data.true_and.unwrap();
        let entry = design.comp(true_and).entries()[0];
        let port = design.comp(true_and).data_ports()[1];
        let dep = design.entry(entry).dependencies(port)[0];
        assert_eq!(design.dep(dep).kind, DepKind::Data);
    }

    #[test]
    fn branch_without_false_side_completes_on_false() {
        let mut design = Design::new("test");
        let d = decision(&mut design);
        let then = ops(&mut design, 1);
        let then = design.make_block("then", then).unwrap();
        let branch = design.make_branch("branch", d, then, None).unwrap();
        let exit = design.main_exit(branch);
        let out_buf = design.out_buf(exit).unwrap();
        assert_eq!(design.comp(out_buf).entries().len(), 2);
    }

    #[test]
    fn while_loop_feeds_back_through_a_register() {
        let mut design = Design::new("test");
        let d = decision(&mut design);
        let body = ops(&mut design, 1);
        let body = design.make_block("body", body).unwrap();
        let lb = design
            .make_loop_body("while", LoopBodyKind::While, d, body, None)
            .unwrap();
        assert!(design.exit_of(lb, ExitTag::feedback()).is_some());
        assert!(design.exit_of(lb, ExitTag::DONE).is_some());

        let init = design.make_block("init", vec![]).unwrap();
        let lp = design.make_loop("loop", init, lb).unwrap();
        let points = design.feedback_points(lp);
        assert_eq!(points.len(), 1);
        let ModuleShape::Loop(data) = &design.module(lp).shape else {
            panic!("expected a loop")
        };
        assert!(data.body_feedback_entry.is_some());
        assert_eq!(design.comp(lb).entries().len(), 2);

        let reg = design.create_data_register(lp, 8, false).unwrap();
        assert!(design.feedback_points(lp).contains(&reg));
    }

    #[test]
    fn loop_without_feedback_drops_its_register() {
        let mut design = Design::new("test");
        let init = design.make_block("init", vec![]).unwrap();
        let body = design.make_block("body", vec![]).unwrap();
        let lp = design.make_loop("loop", init, body).unwrap();
        assert!(design.feedback_points(lp).is_empty());
    }

    #[test]
    fn break_exits_complete_the_loop_body() {
        let mut design = Design::new("test");
        let d = decision(&mut design);
        let body = ops(&mut design, 1);
        let body = design.make_block("body", body).unwrap();
        design
            .make_exit(body, ExitTag::new(ExitType::Break), 0)
            .unwrap();
        let lb = design
            .make_loop_body("until", LoopBodyKind::Until, d, body, None)
            .unwrap();
        let done = design.exit_of(lb, ExitTag::DONE).unwrap();
        let out_buf = design.out_buf(done).unwrap();
        // The false exit of the decision and the break of the body.
        assert_eq!(design.comp(out_buf).entries().len(), 2);
        assert!(design.exit_of(lb, ExitTag::new(ExitType::Break)).is_none());
    }

    #[test]
    fn latch_is_wired_internally() {
        let mut design = Design::new("test");
        let latch = design.make_latch("latch", 8, false).unwrap();
        let ModuleShape::Latch(data) = &design.module(latch).shape else {
            panic!("expected a latch")
        };
        let (reg, result) = (data.reg, data.result);
        assert_eq!(design.bus(result).size(), 8);
        let ComponentKind::Reg(r) = &design.comp(reg).kind else {
            panic!("expected a register")
        };
        assert!(design.port(r.enable).is_connected());
        assert!(design.remove_component(latch, reg).is_err());
        assert_eq!(design.latency(latch).max_clocks(), Some(0));
    }

    #[test]
    fn removing_a_component_unhooks_what_it_drove() {
        let mut design = Design::new("test");
        let comps = ops(&mut design, 2);
        let block = design.make_block("block", comps.clone()).unwrap();
        let entry = design.comp(comps[1]).entries()[0];
        design.remove_component(block, comps[0]).unwrap();
        assert_eq!(design.entry(entry).driving_exit(), None);
        assert!(design.find_comp(comps[0]).is_none());
        assert_eq!(design.module(block).sequence().unwrap(), &comps[1..]);
    }

    #[test]
    fn replacing_keeps_the_position() {
        let mut design = Design::new("test");
        let comps = ops(&mut design, 3);
        let block = design.make_block("block", comps.clone()).unwrap();
        let fresh = design.make_noop("nop").unwrap();
        design.replace_component(block, comps[1], fresh).unwrap();
        assert_eq!(
            design.module(block).sequence().unwrap(),
            &[comps[0], fresh, comps[2]]
        );
        assert_eq!(design.comp(fresh).owner(), Some(block));
    }

    #[test]
    fn failed_replacement_leaves_the_block_alone() {
        let mut design = Design::new("test");
        let comps = ops(&mut design, 2);
        let block = design.make_block("block", vec![comps[0]]).unwrap();
        let other = design.make_block("other", vec![comps[1]]).unwrap();
        assert!(design.replace_component(block, comps[0], comps[1]).is_err());
        assert!(design.find_comp(comps[0]).is_some());
        assert_eq!(design.module(block).sequence().unwrap(), &[comps[0]]);
        assert_eq!(design.comp(comps[1]).owner(), Some(other));
        assert!(design.replace_component(block, comps[0], block).is_err());
        assert_eq!(design.comp(comps[0]).owner(), Some(block));
    }
}
