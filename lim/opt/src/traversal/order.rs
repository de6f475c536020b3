use crate::analysis::DependencyGraph;
use ahash::AHashSet;
use lim_ir::{CompIdx, ComponentKind, Design};
use std::collections::VecDeque;

/// The order in which the children of a module are visited.
#[derive(Default, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Order {
    /// The InBuf, then the children in the order the module wires them,
    /// then any other child, then the OutBufs.
    #[default]
    Scanner,
    /// Like [Order::Scanner] but a child is only visited once every sibling
    /// feeding it has been.
    DataFlow,
    /// The reverse of [Order::DataFlow]: OutBufs first and the InBuf last.
    ReverseDataFlow,
}

/// The children of `module` in traversal order.
///
/// With [Order::Scanner] the InBuf comes first, then the children named by
/// the shape of the module in the order the shape wires them, then the
/// remaining children in insertion order, and finally the OutBufs. The data
/// flow orders keep the buffers at the ends and order everything between
/// them with a readiness work queue.
pub fn module_children(
    design: &Design,
    module: CompIdx,
    order: Order,
) -> Vec<CompIdx> {
    let m = design.module(module);
    let mut middle: Vec<CompIdx> = m
        .ordered_children()
        .into_iter()
        .filter(|c| design.find_comp(*c).is_some())
        .collect();
    let is_out_buf = |c: &CompIdx| {
        matches!(design.comp(*c).kind, ComponentKind::OutBuf(_))
    };
    let rest: Vec<CompIdx> = m
        .components()
        .iter()
        .copied()
        .filter(|c| *c != m.in_buf() && !is_out_buf(c) && !middle.contains(c))
        .collect();
    middle.extend(rest);

    if order != Order::Scanner {
        middle = data_flow(design, &middle);
    }

    let mut children = Vec::with_capacity(m.components().len());
    children.push(m.in_buf());
    children.extend(middle);
    children.extend(m.components().iter().copied().filter(is_out_buf));
    if order == Order::ReverseDataFlow {
        children.reverse();
    }
    children
}

/// Reorder `comps` so that a component comes after every component in
/// `comps` feeding it. Components whose predecessors are not all visited
/// are put back at the end of the queue. When the whole queue is waiting,
/// as happens around feedback paths, the oldest waiting component goes
/// first.
pub fn data_flow(design: &Design, comps: &[CompIdx]) -> Vec<CompIdx> {
    let graph = DependencyGraph::from_children(design, comps);
    let mut pending: AHashSet<CompIdx> = comps.iter().copied().collect();
    let mut queue: VecDeque<CompIdx> = comps.iter().copied().collect();
    let mut order = Vec::with_capacity(comps.len());
    let mut waiting = 0;

    while let Some(comp) = queue.pop_front() {
        let ready = graph
            .predecessors(comp)
            .all(|p| p == comp || !pending.contains(&p));
        if ready || waiting >= queue.len() + 1 {
            if !ready {
                log::trace!(
                    "breaking the wait on {} around a feedback path",
                    design.describe(comp)
                );
            }
            pending.remove(&comp);
            order.push(comp);
            waiting = 0;
        } else {
            queue.push_back(comp);
            waiting += 1;
        }
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use lim_ir::{DepKind, OpKind};

    #[test]
    fn buffers_bracket_the_children() {
        let mut design = Design::new("test");
        let a = design.make_constant("a", 1, 4, false).unwrap();
        let b = design.make_constant("b", 2, 4, false).unwrap();
        let block = design.make_block("blk", vec![a, b]).unwrap();
        let in_buf = design.in_buf(block);
        let out_buf = design.out_buf(design.main_exit(block)).unwrap();

        let scan = module_children(&design, block, Order::Scanner);
        assert_eq!(scan, vec![in_buf, a, b, out_buf]);
        let rev = module_children(&design, block, Order::ReverseDataFlow);
        assert_eq!(rev.first(), Some(&out_buf));
        assert_eq!(rev.last(), Some(&in_buf));
    }

    #[test]
    fn consumers_wait_for_their_producers() {
        let mut design = Design::new("test");
        let add = design.make_op("add", OpKind::Add, 4, false).unwrap();
        let a = design.make_constant("a", 1, 4, false).unwrap();
        let b = design.make_constant("b", 2, 4, false).unwrap();
        // Listed before its inputs.
        let block = design.make_block("blk", vec![add, a, b]).unwrap();
        let entry = design.comp(add).entries()[0];
        for (i, src) in [a, b].into_iter().enumerate() {
            let port = design.comp(add).data_ports()[i];
            let bus = design.result_bus(src).unwrap();
            design.add_dependency(entry, port, bus, DepKind::Data).unwrap();
        }

        let flow = module_children(&design, block, Order::DataFlow);
        let pos = |c| flow.iter().position(|x| *x == c).unwrap();
        assert!(pos(a) < pos(add));
        assert!(pos(b) < pos(add));
        assert_eq!(flow.len(), 5);
    }

    #[test]
    fn cycles_do_not_stall_the_queue() {
        let mut design = Design::new("test");
        let x = design.make_op("x", OpKind::Add, 4, false).unwrap();
        let y = design.make_op("y", OpKind::Add, 4, false).unwrap();
        let (xp, yp) = (design.comp(x).data_ports()[0], design.comp(y).data_ports()[0]);
        let (xb, yb) = (design.result_bus(x).unwrap(), design.result_bus(y).unwrap());
        design.connect(xp, yb);
        design.connect(yp, xb);
        assert_eq!(data_flow(&design, &[x, y]), vec![x, y]);
    }
}
