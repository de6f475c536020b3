//! Implements a formatter for the in-memory representation of a design.
//! Printing never mutates the design.
use crate::{BusIdx, CompIdx, ComponentKind, Design, PortIdx};
use itertools::Itertools;
use std::io;

/// Printer for the IR.
pub struct Printer;

impl Printer {
    fn format_port(design: &Design, port: PortIdx) -> String {
        let p = design.port(port);
        let mut buf = p.name.to_string();
        if let Some(v) = p.value() {
            buf.push_str(&format!(":{v}"));
        }
        if let Some(bus) = p.bus() {
            let b = design.bus(bus);
            let owner = design.bus_owner(bus);
            buf.push_str(&format!(" <- {}.{}", design.comp(owner).name, b.name));
        }
        buf
    }

    fn format_bus(design: &Design, bus: BusIdx) -> String {
        let b = design.bus(bus);
        let mut buf = b.name.to_string();
        if let Some(v) = b.value() {
            buf.push_str(&format!(":{v}"));
        }
        if b.is_forced() {
            buf.push_str(" (forced)");
        }
        buf
    }

    /// Prints the procedures and tasks of `design` followed by every root
    /// component.
    pub fn write_design<F: io::Write>(
        design: &Design,
        f: &mut F,
    ) -> io::Result<()> {
        writeln!(f, "design {} {{", design.name)?;
        for idx in design.procedures() {
            let p = design.procedure(idx);
            writeln!(
                f,
                "  procedure {}{} = {} calls [{}]",
                p.name,
                if p.shared { " shared" } else { "" },
                design.describe(p.body()),
                p.calls().iter().map(|c| design.comp(*c).name).join(", ")
            )?;
        }
        for task in design.tasks() {
            writeln!(
                f,
                "  task {}{}",
                design.comp(task.call).name,
                if task.kickable { " kickable" } else { "" }
            )?;
        }
        for root in design.roots() {
            Self::write_component(design, root, 2, f)?;
        }
        writeln!(f, "}}")
    }

    /// Prints one component and, for a module, its contents.
    pub fn write_component<F: io::Write>(
        design: &Design,
        comp: CompIdx,
        indent_level: usize,
        f: &mut F,
    ) -> io::Result<()> {
        let c = design.comp(comp);
        let indent = " ".repeat(indent_level);
        let ports = c
            .ports()
            .filter(|p| *p != c.clock() && *p != c.reset())
            .map(|p| Self::format_port(design, p))
            .join(", ");
        write!(f, "{indent}{}({ports})", design.describe(comp))?;
        if let ComponentKind::Constant(v) = &c.kind {
            write!(f, " ={v}")?;
        }
        if c.non_removable {
            write!(f, " @keep")?;
        }
        writeln!(f)?;
        for (tag, exit) in c.exits() {
            let e = design.exit(exit);
            writeln!(
                f,
                "{indent}  exit {tag} [{}] -> {}",
                e.latency,
                e.buses().map(|b| Self::format_bus(design, b)).join(", ")
            )?;
        }
        for entry in c.entries() {
            let e = design.entry(*entry);
            let driver = match e.driving_exit() {
                Some(exit) => {
                    let x = design.exit(exit);
                    format!("{}.{}", design.comp(x.owner).name, x.tag)
                }
                None => "-".to_string(),
            };
            let deps = e
                .all_dependencies()
                .map(|d| {
                    let dep = design.dep(d);
                    format!(
                        "{} {}<-{}",
                        dep.kind,
                        design.port(dep.port()).name,
                        design.bus(dep.logical_bus()).name
                    )
                })
                .join(", ");
            writeln!(f, "{indent}  entry from {driver}: {deps}")?;
        }
        if let Some(m) = c.module() {
            writeln!(f, "{indent}  {{")?;
            for child in m.components() {
                Self::write_component(design, *child, indent_level + 4, f)?;
            }
            writeln!(f, "{indent}  }}")?;
        }
        Ok(())
    }

    /// The printed form of `design` as a string.
    pub fn design_to_string(design: &Design) -> String {
        let mut buf = Vec::new();
        // Writing into a vector cannot fail.
        let _ = Self::write_design(design, &mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::Printer;
    use crate::{Design, OpKind};

    #[test]
    fn prints_the_hierarchy() {
        let mut design = Design::new("main");
        let c = design.make_constant("c", 5, 4, false).unwrap();
        let add = design.make_op("add", OpKind::Add, 4, false).unwrap();
        let body = design.make_procedure_body("body", vec![c, add]).unwrap();
        let proc = design.make_procedure("f", body).unwrap();
        let call = design.make_call(proc).unwrap();
        design.add_task(call, true);

        let out = Printer::design_to_string(&design);
        assert!(out.starts_with("design main {"));
        assert!(out.contains("procedure f = Block(body"));
        assert!(out.contains("kickable"));
        assert!(out.contains("Constant(c"));
        assert!(out.contains("[0101]"));
    }
}
