use itertools::Itertools;
use lim_ir::{CompIdx, DepKind, Design};
use petgraph::{
    Direction,
    algo,
    graphmap::DiGraphMap,
};
use std::fmt::Write;

/// How one child of a module feeds another.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Feed {
    /// A port of the target is physically connected to a bus of the source.
    Wire,
    /// A dependency of the target names a bus of the source.
    Logical(DepKind),
}

impl Feed {
    /// True when the edge carries data rather than sequencing.
    pub fn is_data(&self) -> bool {
        matches!(self, Feed::Wire | Feed::Logical(DepKind::Data))
    }
}

/// Edges between the children of one module: an edge `a -> b` means some
/// bus of `a` feeds some port of `b`. Buses of components outside of the
/// module are not represented.
pub struct DependencyGraph {
    graph: DiGraphMap<CompIdx, Feed>,
}

impl DependencyGraph {
    /// Build the graph over `children`, which must all belong to the same
    /// module.
    pub fn from_children(design: &Design, children: &[CompIdx]) -> Self {
        let mut graph = DiGraphMap::new();
        for c in children {
            graph.add_node(*c);
        }
        for target in children {
            let comp = design.comp(*target);
            for port in comp.ports() {
                if let Some(bus) = design.port(port).bus() {
                    let source = design.bus_owner(bus);
                    if source != *target && graph.contains_node(source) {
                        graph.add_edge(source, *target, Feed::Wire);
                    }
                }
            }
            for entry in comp.entries() {
                for dep in design.entry(*entry).all_dependencies() {
                    let d = design.dep(dep);
                    let source = design.bus_owner(d.logical_bus());
                    if source == *target || !graph.contains_node(source) {
                        continue;
                    }
                    // Keep a data edge over a sequencing one between the same
                    // pair.
                    let keep_existing = graph
                        .edge_weight(source, *target)
                        .is_some_and(Feed::is_data);
                    if !keep_existing {
                        graph.add_edge(source, *target, Feed::Logical(d.kind));
                    }
                }
            }
        }
        Self { graph }
    }

    /// Build the graph over every child of `module`.
    pub fn from_module(design: &Design, module: CompIdx) -> Self {
        Self::from_children(design, design.module(module).components())
    }

    /// The children feeding `comp`.
    pub fn predecessors(
        &self,
        comp: CompIdx,
    ) -> impl Iterator<Item = CompIdx> + '_ {
        self.graph.neighbors_directed(comp, Direction::Incoming)
    }

    /// The children `comp` feeds.
    pub fn successors(&self, comp: CompIdx) -> impl Iterator<Item = CompIdx> + '_ {
        self.graph.neighbors_directed(comp, Direction::Outgoing)
    }

    pub fn edge(&self, from: CompIdx, to: CompIdx) -> Option<Feed> {
        self.graph.edge_weight(from, to).copied()
    }

    /// A topological order of the children, or None when they depend on
    /// each other cyclically.
    pub fn topological_order(&self) -> Option<Vec<CompIdx>> {
        algo::toposort(&self.graph, None).ok()
    }

    /// Components that feed each other data without going through a
    /// component that waits for the clock.
    pub fn combinational_cycle(&self, design: &Design) -> Option<Vec<CompIdx>> {
        let mut comb: DiGraphMap<CompIdx, ()> = DiGraphMap::new();
        for n in self.graph.nodes() {
            if !design.comp(n).flags.consumes_clock {
                comb.add_node(n);
            }
        }
        for (a, b, feed) in self.graph.all_edges() {
            if feed.is_data() && comb.contains_node(a) && comb.contains_node(b) {
                comb.add_edge(a, b, ());
            }
        }
        algo::tarjan_scc(&comb)
            .into_iter()
            .find(|scc| scc.len() > 1)
    }

    /// Render the graph with component names, one edge per line.
    pub fn describe(&self, design: &Design) -> String {
        let mut out = String::new();
        for (a, b, feed) in self
            .graph
            .all_edges()
            .sorted_by_key(|(a, b, _)| (*a, *b))
        {
            // Writing into a string cannot fail.
            let _ = writeln!(
                out,
                "{} -> {} ({feed:?})",
                design.comp(a).name,
                design.comp(b).name
            );
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::{DependencyGraph, Feed};
    use lim_ir::{DepKind, Design, OpKind};

    #[test]
    fn block_children_are_ordered() {
        let mut design = Design::new("test");
        let a = design.make_constant("a", 1, 4, false).unwrap();
        let add = design.make_op("add", OpKind::Add, 4, false).unwrap();
        let block = design.make_block("b", vec![a, add]).unwrap();
        let entry = design.comp(add).entries()[0];
        let port = design.comp(add).data_ports()[0];
        let bus = design.result_bus(a).unwrap();
        design.add_dependency(entry, port, bus, DepKind::Data).unwrap();

        let graph = DependencyGraph::from_module(&design, block);
        assert_eq!(graph.edge(a, add), Some(Feed::Logical(DepKind::Data)));
        assert!(graph.predecessors(add).any(|c| c == a));
        assert!(graph.successors(a).any(|c| c == add));
        let order = graph.topological_order().unwrap();
        let pos = |c| order.iter().position(|x| *x == c).unwrap();
        assert!(pos(a) < pos(add));
        assert!(graph.combinational_cycle(&design).is_none());
    }

    #[test]
    fn wired_loops_are_found() {
        let mut design = Design::new("test");
        let x = design.make_op("x", OpKind::Add, 4, false).unwrap();
        let y = design.make_op("y", OpKind::Add, 4, false).unwrap();
        let block = design.make_block("b", vec![x, y]).unwrap();
        let (xp, yp) = (design.comp(x).data_ports()[0], design.comp(y).data_ports()[0]);
        let (xb, yb) = (design.result_bus(x).unwrap(), design.result_bus(y).unwrap());
        design.connect(xp, yb);
        design.connect(yp, xb);

        let graph = DependencyGraph::from_module(&design, block);
        assert!(graph.topological_order().is_none());
        let cycle = graph.combinational_cycle(&design).unwrap();
        assert_eq!(cycle.len(), 2);
        assert!(graph.describe(&design).contains("x -> y (Wire)"));
    }
}
