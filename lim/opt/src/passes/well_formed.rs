use crate::analysis::DependencyGraph;
use crate::traversal::{Action, Named, VisResult, Visitor};
use itertools::Itertools;
use lim_ir::{CompIdx, Design};
use lim_utils::{Error, LimResult};

/// Checks the structural invariants of every component:
/// - both ends of every physical connection agree,
/// - every dependency targets a port of the component owning its entry and
///   is listed by its source bus,
/// - every exit of a module has an OutBuf with one port per data bus and
///   the InBuf has one data bus per data port,
/// - no two children of a module feed each other data combinationally.
#[derive(Default)]
pub struct WellFormed {
    checked: usize,
}

impl Named for WellFormed {
    fn name() -> &'static str {
        "well-formed"
    }

    fn description() -> &'static str {
        "check the structural invariants of the design"
    }
}

impl WellFormed {
    fn check_wiring(comp: CompIdx, design: &Design) -> LimResult<()> {
        let c = design.comp(comp);
        for port in c.ports() {
            let p = design.port(port);
            if p.owner != comp {
                return Err(Error::malformed_structure(format!(
                    "port {} of {} names another owner",
                    p.name,
                    design.describe(comp)
                )));
            }
            if let Some(bus) = p.bus() {
                if !design.bus(bus).ports().contains(&port) {
                    return Err(Error::malformed_structure(format!(
                        "{}.{} is connected to bus {} which does not list it",
                        c.name,
                        p.name,
                        design.bus(bus).name
                    )));
                }
            }
        }
        for (tag, exit) in c.exits() {
            let e = design.exit(exit);
            if e.owner != comp || e.tag != tag {
                return Err(Error::malformed_structure(format!(
                    "exit {tag} of {} is registered under another owner or tag",
                    design.describe(comp)
                )));
            }
            for bus in design.exit_buses(exit) {
                let b = design.bus(bus);
                if b.owner != exit {
                    return Err(Error::malformed_structure(format!(
                        "bus {} of {} names another exit",
                        b.name,
                        design.describe(comp)
                    )));
                }
                if let Some(port) =
                    b.ports().iter().find(|p| design.port(**p).bus() != Some(bus))
                {
                    return Err(Error::malformed_structure(format!(
                        "bus {} of {} lists port {} which is not connected to it",
                        b.name,
                        design.describe(comp),
                        design.port(*port).name
                    )));
                }
            }
            for entry in e.drivens() {
                if design.entry(*entry).driving_exit() != Some(exit) {
                    return Err(Error::malformed_structure(format!(
                        "exit {tag} of {} lists an entry it does not drive",
                        design.describe(comp)
                    )));
                }
            }
        }
        Ok(())
    }

    fn check_dependencies(comp: CompIdx, design: &Design) -> LimResult<()> {
        for entry in design.comp(comp).entries() {
            let en = design.entry(*entry);
            if en.owner != comp {
                return Err(Error::malformed_structure(format!(
                    "entry of {} names another owner",
                    design.describe(comp)
                )));
            }
            for dep in en.all_dependencies() {
                let d = design.dep(dep);
                let port = design.port(d.port());
                if d.entry() != *entry || port.owner != comp {
                    return Err(Error::malformed_structure(format!(
                        "{} dependency of {} targets port {} of {}",
                        d.kind,
                        design.describe(comp),
                        port.name,
                        design.describe(port.owner)
                    )));
                }
                let Some(bus) = design.find_bus(d.logical_bus()) else {
                    return Err(Error::malformed_structure(format!(
                        "{} dependency of {} names a removed bus",
                        d.kind,
                        design.describe(comp)
                    )));
                };
                if !bus.logical_dependents().contains(&dep) {
                    return Err(Error::malformed_structure(format!(
                        "bus {} does not list the {} dependency of {}.{}",
                        bus.name,
                        d.kind,
                        design.comp(comp).name,
                        port.name
                    )));
                }
            }
        }
        Ok(())
    }

    fn check_boundary(module: CompIdx, design: &Design) -> LimResult<()> {
        let m = design.module(module);
        for child in m.components() {
            if design.comp(*child).owner() != Some(module) {
                return Err(Error::malformed_structure(format!(
                    "{} is listed by {} but owned elsewhere",
                    design.describe(*child),
                    design.describe(module)
                )));
            }
        }
        let in_exit = design.main_exit(m.in_buf());
        let inputs = design.exit(in_exit).data_buses().len();
        let ports = design.comp(module).data_ports().len();
        if inputs != ports {
            return Err(Error::size_mismatch(
                format!("data buses of the InBuf of {}", design.describe(module)),
                ports,
                inputs,
            ));
        }
        for (tag, exit) in design.comp(module).exits() {
            let Some(out_buf) = design.out_buf(exit) else {
                return Err(Error::malformed_structure(format!(
                    "exit {tag} of {} has no OutBuf",
                    design.describe(module)
                )));
            };
            let buses = design.exit(exit).data_buses();
            let ports = design.comp(out_buf).data_ports();
            if buses.len() != ports.len() {
                return Err(Error::size_mismatch(
                    format!(
                        "data ports of the OutBuf of exit {tag} of {}",
                        design.describe(module)
                    ),
                    buses.len(),
                    ports.len(),
                ));
            }
            let paired = buses
                .iter()
                .zip_eq(ports)
                .all(|(b, p)| design.port(*p).peer() == Some(*b));
            if !paired {
                return Err(Error::malformed_structure(format!(
                    "OutBuf ports of exit {tag} of {} are not paired with its buses",
                    design.describe(module)
                )));
            }
        }
        let graph = DependencyGraph::from_module(design, module);
        if let Some(cycle) = graph.combinational_cycle(design) {
            return Err(Error::malformed_structure(format!(
                "combinational cycle in {}: {}",
                design.describe(module),
                cycle.iter().map(|c| design.comp(*c).name).join(" -> ")
            )));
        }
        Ok(())
    }
}

impl Visitor for WellFormed {
    fn unhandled(&mut self, comp: CompIdx, design: &mut Design) -> VisResult {
        Self::check_wiring(comp, design)?;
        Self::check_dependencies(comp, design)?;
        if design.comp(comp).is_module() {
            Self::check_boundary(comp, design)?;
        }
        self.checked += 1;
        Ok(Action::Continue)
    }

    fn finish_design(&mut self, design: &mut Design) -> VisResult {
        for task in design.tasks() {
            if design.called_procedure(task.call).is_none() {
                return Err(Error::unknown_reference(format!(
                    "task {} is not a live call",
                    design.describe(task.call)
                )));
            }
        }
        log::debug!("{}: checked {} components", Self::name(), self.checked);
        Ok(Action::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::WellFormed;
    use crate::traversal::Visitor;
    use lim_ir::{DepKind, Design, ExitTag, OpKind};
    use lim_utils::Error;

    fn sample() -> Design {
        let mut design = Design::new("test");
        let a = design.make_constant("a", 3, 8, true).unwrap();
        let add = design.make_op("add", OpKind::Add, 8, true).unwrap();
        let body = design.make_procedure_body("body", vec![a, add]).unwrap();
        let entry = design.comp(add).entries()[0];
        let port = design.comp(add).data_ports()[0];
        let bus = design.result_bus(a).unwrap();
        design.add_dependency(entry, port, bus, DepKind::Data).unwrap();
        let ret = design.exit_of(body, ExitTag::RETURN).unwrap();
        design.make_data_bus(ret);
        let proc = design.make_procedure("f", body).unwrap();
        let call = design.make_call(proc).unwrap();
        design.add_task(call, false);
        design
    }

    #[test]
    fn built_designs_are_well_formed() {
        let mut design = sample();
        let pass = WellFormed::do_pass_default(&mut design).unwrap();
        assert!(pass.checked >= 6);
    }

    #[test]
    fn combinational_cycles_are_rejected() {
        let mut design = Design::new("test");
        let x = design.make_op("x", OpKind::Add, 4, false).unwrap();
        let y = design.make_op("y", OpKind::Add, 4, false).unwrap();
        design.make_block("b", vec![x, y]).unwrap();
        let (xp, yp) = (design.comp(x).data_ports()[0], design.comp(y).data_ports()[0]);
        let (xb, yb) = (design.result_bus(x).unwrap(), design.result_bus(y).unwrap());
        design.connect(xp, yb);
        design.connect(yp, xb);
        let Err(Error::MalformedStructure(msg)) =
            WellFormed::do_pass_default(&mut design)
        else {
            panic!("expected a malformed structure error")
        };
        assert!(msg.contains("combinational cycle"));
    }
}
