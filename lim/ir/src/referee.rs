//! Referees arbitrate the accesses of several components to one shared
//! resource, a pin or a memory.
use crate::{
    BusIdx, CompIdx, ComponentKind, ConnTag, ControlFlags, Design, ExitTag,
    PortIdx, Referent,
};
use lim_utils::{Error, Id, LimResult};

/// The resource a referee guards.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Resource {
    Pin { name: Id, width: usize },
    Memory { name: Id, width: usize, address_width: usize },
}

impl Resource {
    pub fn name(&self) -> Id {
        match self {
            Resource::Pin { name, .. } | Resource::Memory { name, .. } => *name,
        }
    }

    pub fn width(&self) -> usize {
        match self {
            Resource::Pin { width, .. } | Resource::Memory { width, .. } => {
                *width
            }
        }
    }

    /// Pins are addressed by a single bit.
    fn address_width(&self) -> usize {
        match self {
            Resource::Pin { .. } => 1,
            Resource::Memory { address_width, .. } => *address_width,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccessKind {
    Read,
    Write,
}

/// The sideband ports and buses that connect one accessor to its referee.
#[derive(Clone, Debug)]
pub struct RefereeSlot {
    pub accessor: CompIdx,
    pub access: AccessKind,
    pub go: PortIdx,
    pub address: PortIdx,
    /// Data to store, for writes.
    pub data_in: Option<PortIdx>,
    /// Data loaded, for reads.
    pub data_out: Option<BusIdx>,
    pub done: BusIdx,
}

impl RefereeSlot {
    fn ports(&self) -> impl Iterator<Item = PortIdx> + '_ {
        [self.go, self.address].into_iter().chain(self.data_in)
    }

    fn buses(&self) -> impl Iterator<Item = BusIdx> + '_ {
        self.data_out.into_iter().chain(Some(self.done))
    }
}

#[derive(Clone, Debug)]
pub struct RefereeData {
    pub resource: Resource,
    pub(crate) accessors: Referent<CompIdx>,
    pub(crate) slots: Vec<RefereeSlot>,
}

impl RefereeData {
    pub fn accessors(&self) -> &[CompIdx] {
        self.accessors.references()
    }

    pub fn slots(&self) -> &[RefereeSlot] {
        &self.slots
    }

    pub fn slot(&self, accessor: CompIdx) -> Option<&RefereeSlot> {
        self.slots.iter().find(|s| s.accessor == accessor)
    }
}

impl Design {
    /// Create a referee for `resource`. Its clock and reset are always used
    /// and its DONE exit collects the buses of every slot.
    pub fn make_referee(
        &mut self,
        prefix: &str,
        resource: Resource,
    ) -> LimResult<CompIdx> {
        if resource.width() == 0 {
            return Err(Error::illegal_state(format!(
                "resource {} has no width",
                resource.name()
            )));
        }
        let name = self.namegen.gen_name(prefix);
        let flags = ControlFlags {
            consumes_go: false,
            produces_done: false,
            consumes_clock: true,
            consumes_reset: true,
        };
        let comp = self.alloc_component(
            name,
            ComponentKind::Referee(RefereeData {
                resource,
                accessors: Referent::default(),
                slots: Vec::new(),
            }),
            flags,
        );
        self.comp_mut(comp).non_removable = true;
        self.make_exit(comp, ExitTag::DONE, 0)?;
        let c = self.comp(comp);
        let (clock, reset) = (c.clock(), c.reset());
        self.port_mut(clock).used = true;
        self.port_mut(reset).used = true;
        self.referees.push(comp);
        Ok(comp)
    }

    fn referee_data(&self, referee: CompIdx) -> LimResult<&RefereeData> {
        match self.find_comp(referee).map(|c| &c.kind) {
            Some(ComponentKind::Referee(data)) => Ok(data),
            _ => Err(Error::illegal_state(format!(
                "{referee:?} is not a referee"
            ))),
        }
    }

    fn referee_data_mut(
        &mut self,
        referee: CompIdx,
    ) -> LimResult<&mut RefereeData> {
        match self.comps.get_mut(referee).map(|c| &mut c.kind) {
            Some(ComponentKind::Referee(data)) => Ok(data),
            _ => Err(Error::illegal_state(format!(
                "{referee:?} is not a referee"
            ))),
        }
    }

    /// Register `accessor` with `referee` and build the slot it connects
    /// through. An accessor holds at most one slot per referee.
    pub fn add_access(
        &mut self,
        referee: CompIdx,
        accessor: CompIdx,
        access: AccessKind,
    ) -> LimResult<RefereeSlot> {
        let resource = self.referee_data(referee)?.resource.clone();
        if self.find_comp(accessor).is_none() {
            return Err(Error::unknown_reference(format!("{accessor:?}")));
        }
        self.referee_data_mut(referee)?
            .accessors
            .add_reference(accessor)?;

        let prefix = self.comp(accessor).name;
        let go = self.make_slot_port(referee, prefix, "go", 1)?;
        let address = self.make_slot_port(
            referee,
            prefix,
            "addr",
            resource.address_width(),
        )?;
        let data_in = match access {
            AccessKind::Write => Some(self.make_slot_port(
                referee,
                prefix,
                "din",
                resource.width(),
            )?),
            AccessKind::Read => None,
        };
        let data_out = match access {
            AccessKind::Read => Some(self.make_slot_bus(
                referee,
                prefix,
                "dout",
                resource.width(),
            )?),
            AccessKind::Write => None,
        };
        let done = self.make_slot_bus(referee, prefix, "done", 1)?;
        let slot = RefereeSlot {
            accessor,
            access,
            go,
            address,
            data_in,
            data_out,
            done,
        };
        self.referee_data_mut(referee)?.slots.push(slot.clone());
        log::debug!(
            "{} arbitrates {:?} access of {}",
            self.describe(referee),
            access,
            self.describe(accessor)
        );
        Ok(slot)
    }

    fn make_slot_port(
        &mut self,
        referee: CompIdx,
        prefix: Id,
        suffix: &str,
        size: usize,
    ) -> LimResult<PortIdx> {
        let port = self.make_data_port(referee);
        let p = self.port_mut(port);
        p.name = Id::new(format!("{prefix}_{suffix}"));
        p.tag = ConnTag::Sideband;
        p.used = true;
        self.set_port_size(port, size, false)?;
        Ok(port)
    }

    fn make_slot_bus(
        &mut self,
        referee: CompIdx,
        prefix: Id,
        suffix: &str,
        size: usize,
    ) -> LimResult<BusIdx> {
        let exit = self.main_exit(referee);
        let name = Id::new(format!("{prefix}_{suffix}"));
        let bus = self.push_bus(exit, name);
        self.exit_mut(exit).data_buses.push(bus);
        self.bus_mut(bus).tag = ConnTag::Sideband;
        self.set_bus_size(bus, size, false)?;
        Ok(bus)
    }

    /// Unregister `accessor` and free its slot. Removing an accessor that is
    /// not registered is an error.
    pub fn remove_access(
        &mut self,
        referee: CompIdx,
        accessor: CompIdx,
    ) -> LimResult<()> {
        self.referee_data_mut(referee)?
            .accessors
            .remove_reference(accessor)?;
        self.free_slot(referee, accessor);
        Ok(())
    }

    /// Drop the slot of `accessor` in `referee`, if any.
    fn free_slot(&mut self, referee: CompIdx, accessor: CompIdx) {
        let Ok(data) = self.referee_data_mut(referee) else {
            return;
        };
        let Some(pos) = data.slots.iter().position(|s| s.accessor == accessor)
        else {
            return;
        };
        let slot = data.slots.remove(pos);
        let ports: Vec<PortIdx> = slot.ports().collect();
        let buses: Vec<BusIdx> = slot.buses().collect();
        self.comp_mut(referee)
            .data_ports
            .retain(|p| !ports.contains(p));
        for port in ports {
            self.disconnect_port(port);
            self.ports.remove(port);
        }
        let exit = self.main_exit(referee);
        self.exit_mut(exit).data_buses.retain(|b| !buses.contains(b));
        for bus in buses {
            self.disconnect_bus(bus);
            self.clear_logical_dependents(bus);
            self.buses.remove(bus);
        }
    }

    /// Forget `accessor` in every referee. Used when the accessor is
    /// deleted.
    pub(crate) fn forget_accessor(&mut self, accessor: CompIdx) {
        for referee in self.referees.clone() {
            if let Ok(data) = self.referee_data_mut(referee) {
                data.accessors.forget(accessor);
                self.free_slot(referee, accessor);
            }
        }
    }

    /// Every live referee of the design.
    pub fn referees(&self) -> &[CompIdx] {
        &self.referees
    }

    /// The referees `accessor` is registered with.
    pub fn referees_of(&self, accessor: CompIdx) -> Vec<CompIdx> {
        self.referees
            .iter()
            .copied()
            .filter(|r| {
                self.referee_data(*r)
                    .is_ok_and(|d| d.accessors.contains(accessor))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::{AccessKind, Resource};
    use crate::{CloneContext, ComponentKind, ConnTag, Design, NodeKind, OpKind};
    use lim_utils::{Error, Id};

    fn memory(design: &mut Design) -> crate::CompIdx {
        design
            .make_referee(
                "mem_referee",
                Resource::Memory {
                    name: Id::new("mem"),
                    width: 32,
                    address_width: 10,
                },
            )
            .unwrap()
    }

    #[test]
    fn accesses_get_sideband_slots() {
        let mut design = Design::new("test");
        let referee = memory(&mut design);
        let load = design.make_noop("load").unwrap();
        let store = design.make_noop("store").unwrap();
        assert_eq!(design.comp(referee).node_kind(), NodeKind::Referee);

        let read = design.add_access(referee, load, AccessKind::Read).unwrap();
        assert!(read.data_in.is_none());
        let dout = read.data_out.unwrap();
        assert_eq!(design.bus(dout).size(), 32);
        assert_eq!(design.bus(dout).tag, ConnTag::Sideband);
        assert_eq!(design.port(read.address).value().unwrap().size(), 10);

        let write =
            design.add_access(referee, store, AccessKind::Write).unwrap();
        assert!(write.data_out.is_none());
        let din = write.data_in.unwrap();
        assert_eq!(design.port(din).value().unwrap().size(), 32);
        assert_eq!(design.comp(referee).data_ports().len(), 5);

        let ComponentKind::Referee(data) = &design.comp(referee).kind else {
            panic!("not a referee");
        };
        assert_eq!(data.accessors(), &[load, store]);
        assert_eq!(data.slot(store).unwrap().go, write.go);
        assert_eq!(design.referees_of(load), vec![referee]);
    }

    #[test]
    fn an_accessor_registers_once() {
        let mut design = Design::new("test");
        let referee = memory(&mut design);
        let load = design.make_noop("load").unwrap();
        design.add_access(referee, load, AccessKind::Read).unwrap();
        assert!(design.add_access(referee, load, AccessKind::Write).is_err());

        let slot_ports = design.comp(referee).data_ports().len();
        design.remove_access(referee, load).unwrap();
        assert_eq!(design.comp(referee).data_ports().len(), slot_ports - 2);
        assert!(design.referees_of(load).is_empty());
        assert!(matches!(
            design.remove_access(referee, load),
            Err(Error::UnknownReference(_))
        ));
    }

    #[test]
    fn deleted_accessors_leave_the_referee() {
        let mut design = Design::new("test");
        let referee = memory(&mut design);
        let load = design.make_noop("load").unwrap();
        let slot = design.add_access(referee, load, AccessKind::Read).unwrap();
        design.disconnect_component(load);
        design.delete_component(load);
        let ComponentKind::Referee(data) = &design.comp(referee).kind else {
            panic!("not a referee");
        };
        assert!(data.accessors().is_empty());
        assert!(data.slots().is_empty());
        assert!(design.buses.get(slot.done).is_none());

        design.delete_component(referee);
        assert!(design.referees().is_empty());
    }

    #[test]
    fn pin_referees_cannot_be_cloned() {
        let mut design = Design::new("test");
        let pin = design
            .make_referee(
                "pin_referee",
                Resource::Pin {
                    name: Id::new("led"),
                    width: 1,
                },
            )
            .unwrap();
        let write = design.make_op("write", OpKind::Add, 1, false).unwrap();
        design.add_access(pin, write, AccessKind::Write).unwrap();
        let clock = design.comp(pin).clock();
        assert!(design.port(clock).used);

        let mut ctx = CloneContext::default();
        assert!(matches!(
            design.clone_component(pin, &mut ctx),
            Err(Error::UnsupportedClone(_))
        ));
        assert!(ctx.comps.is_empty());
        assert!(design
            .make_referee(
                "empty",
                Resource::Pin {
                    name: Id::new("none"),
                    width: 0,
                },
            )
            .is_err());
    }
}
