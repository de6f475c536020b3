//! Procedures and the calls that instantiate them.
use crate::{
    CallData, CompIdx, ComponentKind, Design, ExitTag, ModuleShape, ProcIdx,
};
use lim_utils::{Error, GetName, Id, LimResult};
use linked_hash_map::LinkedHashMap;
use std::fmt::Debug;

/// The set of live references to a shared definition. References are only
/// added and removed through this table.
#[derive(Clone, Debug)]
pub struct Referent<R> {
    references: Vec<R>,
}

impl<R> Default for Referent<R> {
    fn default() -> Self {
        Self {
            references: Vec::new(),
        }
    }
}

impl<R: Copy + Eq + Debug> Referent<R> {
    pub fn add_reference(&mut self, reference: R) -> LimResult<()> {
        if self.contains(reference) {
            return Err(Error::illegal_state(format!(
                "{reference:?} is already a reference"
            )));
        }
        self.references.push(reference);
        Ok(())
    }

    /// Remove `reference`. Removing a reference that is not live, including
    /// a second removal of the same one, is an error.
    pub fn remove_reference(&mut self, reference: R) -> LimResult<()> {
        let Some(pos) = self.references.iter().position(|r| *r == reference)
        else {
            return Err(Error::unknown_reference(format!("{reference:?}")));
        };
        self.references.remove(pos);
        Ok(())
    }

    /// Drop `reference` if it is live. Used when the referring node itself
    /// is deleted.
    pub(crate) fn forget(&mut self, reference: R) {
        self.references.retain(|r| *r != reference);
    }

    pub fn contains(&self, reference: R) -> bool {
        self.references.contains(&reference)
    }

    pub fn references(&self) -> &[R] {
        &self.references
    }

    pub fn len(&self) -> usize {
        self.references.len()
    }

    pub fn is_empty(&self) -> bool {
        self.references.is_empty()
    }
}

/// A reusable body invoked through [CallData] components.
#[derive(Clone, Debug)]
pub struct Procedure {
    pub name: Id,
    pub(crate) body: CompIdx,
    pub(crate) calls: Referent<CompIdx>,
    /// A shared procedure is implemented once for all of its calls and
    /// cannot be cloned.
    pub shared: bool,
}

impl GetName for Procedure {
    fn name(&self) -> Id {
        self.name
    }
}

impl Procedure {
    pub fn body(&self) -> CompIdx {
        self.body
    }

    /// Every live call of the procedure.
    pub fn calls(&self) -> &[CompIdx] {
        self.calls.references()
    }
}

impl Design {
    /// Register the block `body` as the body of a new procedure.
    pub fn make_procedure<S: Into<Id>>(
        &mut self,
        name: S,
        body: CompIdx,
    ) -> LimResult<ProcIdx> {
        let c = self.comp(body);
        if !matches!(c.module().map(|m| &m.shape), Some(ModuleShape::Block(_)))
        {
            return Err(Error::malformed_structure(format!(
                "procedure body {} is not a block",
                self.describe(body)
            )));
        }
        if let Some(owner) = c.owner() {
            return Err(Error::malformed_structure(format!(
                "procedure body {} belongs to {}",
                self.describe(body),
                self.describe(owner)
            )));
        }
        if self.procedures.iter().any(|(_, p)| p.body == body) {
            return Err(Error::illegal_state(format!(
                "{} is already the body of a procedure",
                self.describe(body)
            )));
        }
        Ok(self.procedures.push(Procedure {
            name: name.into(),
            body,
            calls: Referent::default(),
            shared: false,
        }))
    }

    /// Create a call of `procedure` whose ports, exits and buses mirror those
    /// of the body.
    pub fn make_call(&mut self, procedure: ProcIdx) -> LimResult<CompIdx> {
        let body = self.procedure(procedure).body;
        let name = self
            .namegen
            .gen_name(&format!("call_{}", self.procedure(procedure).name));
        let flags = self.comp(body).flags;
        let call = self.alloc_component(name, ComponentKind::NoOp, flags);

        let mut ports = LinkedHashMap::new();
        let body_comp = self.comp(body);
        ports.insert(self.comp(call).clock(), body_comp.clock());
        ports.insert(self.comp(call).reset(), body_comp.reset());
        ports.insert(self.comp(call).go(), body_comp.go());
        let body_this = body_comp.this_port();
        let body_data = body_comp.data_ports().to_vec();
        if let Some(this) = body_this {
            let port = self.make_this_port(call)?;
            self.copy_port_attributes(this, port);
            ports.insert(port, this);
        }
        for body_port in body_data {
            let port = self.make_data_port(call);
            let name = self.port(body_port).name;
            self.port_mut(port).name = name;
            self.copy_port_attributes(body_port, port);
            ports.insert(port, body_port);
        }

        let mut exits = LinkedHashMap::new();
        let mut buses = LinkedHashMap::new();
        let body_exits: Vec<(ExitTag, _)> = self.comp(body).exits().collect();
        for (tag, body_exit) in body_exits {
            let n = self.exit(body_exit).data_buses().len();
            let exit = self.make_exit(call, tag, n)?;
            self.copy_exit_attributes(body_exit, exit);
            let pairs: Vec<_> = self
                .exit(exit)
                .buses()
                .zip(self.exit(body_exit).buses())
                .collect();
            for (call_bus, body_bus) in pairs {
                buses.insert(call_bus, body_bus);
            }
            exits.insert(exit, body_exit);
        }

        self.comp_mut(call).kind = ComponentKind::Call(CallData {
            procedure,
            ports,
            exits,
            buses,
        });
        self.procedure_mut(procedure).calls.add_reference(call)?;
        log::debug!(
            "created {} of {}",
            self.describe(call),
            self.procedure(procedure).name
        );
        Ok(call)
    }

    /// The procedure invoked by `call`.
    pub fn called_procedure(&self, call: CompIdx) -> Option<ProcIdx> {
        match self.find_comp(call).map(|c| &c.kind) {
            Some(ComponentKind::Call(data)) => Some(data.procedure),
            _ => None,
        }
    }

    /// Delete `call`, detaching it from its procedure and from the module
    /// containing it.
    pub fn remove_call(&mut self, call: CompIdx) -> LimResult<()> {
        let Some(procedure) = self.called_procedure(call) else {
            return Err(Error::unknown_reference(format!(
                "{} is not a live call",
                self.describe(call)
            )));
        };
        if !self.procedure(procedure).calls.contains(call) {
            return Err(Error::unknown_reference(format!(
                "{} is not registered with its procedure",
                self.describe(call)
            )));
        }
        // Deleting the call drops it from the procedure and the tasks.
        match self.comp(call).owner() {
            Some(owner) => self.remove_component(owner, call),
            None => {
                self.disconnect_component(call);
                self.delete_component(call);
                Ok(())
            }
        }
    }

    /// True when the body returns data through its main exit.
    pub fn has_return_value(&self, procedure: ProcIdx) -> bool {
        let body = self.procedure(procedure).body;
        self.exit_of(body, ExitTag::RETURN)
            .or_else(|| self.exit_of(body, ExitTag::DONE))
            .is_some_and(|e| !self.exit(e).data_buses().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::Referent;
    use crate::{ComponentKind, Design, ExitTag, OpKind};
    use lim_utils::Error;

    #[test]
    fn referent_tracks_live_references() {
        let mut r: Referent<u32> = Referent::default();
        r.add_reference(1).unwrap();
        r.add_reference(2).unwrap();
        assert!(r.add_reference(1).is_err());
        r.remove_reference(1).unwrap();
        assert!(matches!(
            r.remove_reference(1),
            Err(Error::UnknownReference(_))
        ));
        assert_eq!(r.references(), &[2]);
    }

    #[test]
    fn calls_mirror_the_body() {
        let mut design = Design::new("test");
        let add = design.make_op("add", OpKind::Add, 8, false).unwrap();
        let body = design.make_procedure_body("body", vec![add]).unwrap();
        design.make_data_port(body);
        let ret = design.exit_of(body, ExitTag::RETURN).unwrap();
        let bus = design.make_data_bus(ret);
        design.set_bus_size(bus, 8, false).unwrap();
        let proc = design.make_procedure("f", body).unwrap();
        assert!(design.has_return_value(proc));

        let a = design.make_call(proc).unwrap();
        let b = design.make_call(proc).unwrap();
        assert_eq!(design.procedure(proc).calls(), &[a, b]);
        assert_eq!(design.comp(a).data_ports().len(), 1);
        let ComponentKind::Call(data) = &design.comp(a).kind else {
            panic!("expected a call")
        };
        let call_ret = design.exit_of(a, ExitTag::RETURN).unwrap();
        let call_bus = design.exit(call_ret).data_buses()[0];
        assert_eq!(data.buses.get(&call_bus), Some(&bus));
        assert_eq!(design.bus(call_bus).size(), 8);

        design.remove_call(a).unwrap();
        assert_eq!(design.procedure(proc).calls(), &[b]);
        assert!(design.find_comp(a).is_none());
        assert!(design.remove_call(a).is_err());
    }

    #[test]
    fn removing_calls_updates_the_procedure() {
        let mut design = Design::new("test");
        let add = design.make_op("add", OpKind::Add, 8, false).unwrap();
        let body = design.make_procedure_body("body", vec![add]).unwrap();
        let proc = design.make_procedure("f", body).unwrap();
        let keep = design.make_call(proc).unwrap();
        let direct = design.make_call(proc).unwrap();
        let nested = design.make_call(proc).unwrap();
        design.add_task(direct, false);
        let inner = design.make_block("inner", vec![nested]).unwrap();
        let outer = design.make_block("outer", vec![direct, inner]).unwrap();

        design.remove_component(outer, direct).unwrap();
        assert_eq!(design.procedure(proc).calls(), &[keep, nested]);
        assert!(design.tasks().is_empty());

        // Deleting a module drops the calls inside it.
        design.remove_component(outer, inner).unwrap();
        assert_eq!(design.procedure(proc).calls(), &[keep]);

        // Propagation through the surviving call only sees live calls.
        design.push_values_forward(keep).unwrap();
        assert!(design.remove_call(nested).is_err());
    }
}
