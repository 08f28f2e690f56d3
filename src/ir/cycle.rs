//! Cycle detection over derived rule edges.

use super::graph::RuleId;

/// Tracks the visitation state of a node during cycle detection.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum VisitState {
    Visiting,
    Visited,
}

/// Find a cycle in `edges`, where `edges[i]` lists the rules rule `i`
/// depends on.
///
/// The returned cycle repeats its first element at the end.
pub(crate) fn find_cycle(edges: &[Vec<RuleId>]) -> Option<Vec<RuleId>> {
    let mut detector = CycleDetector::new(edges);
    (0..edges.len()).map(RuleId::new).find_map(|node| {
        if detector.is_visited(node) {
            None
        } else {
            detector.visit(node)
        }
    })
}

struct CycleDetector<'a> {
    edges: &'a [Vec<RuleId>],
    /// Nodes on the current path with the index of their next unexplored
    /// dependency.
    stack: Vec<(RuleId, usize)>,
    states: Vec<Option<VisitState>>,
}

impl<'a> CycleDetector<'a> {
    fn new(edges: &'a [Vec<RuleId>]) -> Self {
        Self {
            edges,
            stack: Vec::new(),
            states: vec![None; edges.len()],
        }
    }

    fn state(&self, node: RuleId) -> Option<VisitState> {
        self.states.get(node.index()).copied().flatten()
    }

    fn set_state(&mut self, node: RuleId, state: VisitState) {
        if let Some(slot) = self.states.get_mut(node.index()) {
            *slot = Some(state);
        }
    }

    fn is_visited(&self, node: RuleId) -> bool {
        matches!(self.state(node), Some(VisitState::Visited))
    }

    fn dependency(&self, node: RuleId, idx: usize) -> Option<RuleId> {
        self.edges
            .get(node.index())
            .and_then(|deps| deps.get(idx))
            .copied()
    }

    /// Depth-first walk from `root` using `self.stack` instead of recursion.
    fn visit(&mut self, root: RuleId) -> Option<Vec<RuleId>> {
        if self.state(root).is_some() {
            return None;
        }
        self.set_state(root, VisitState::Visiting);
        self.stack.push((root, 0));

        while let Some(&(node, next)) = self.stack.last() {
            let Some(dep) = self.dependency(node, next) else {
                self.stack.pop();
                self.set_state(node, VisitState::Visited);
                continue;
            };
            if let Some(top) = self.stack.last_mut() {
                top.1 += 1;
            }
            match self.state(dep) {
                Some(VisitState::Visited) => {}
                Some(VisitState::Visiting) => return self.cycle_through(dep),
                None => {
                    self.set_state(dep, VisitState::Visiting);
                    self.stack.push((dep, 0));
                }
            }
        }
        None
    }

    /// The path from `node`'s position on the stack back to `node`.
    fn cycle_through(&self, node: RuleId) -> Option<Vec<RuleId>> {
        let start = self.stack.iter().position(|(n, _)| *n == node)?;
        let mut cycle: Vec<RuleId> = self.stack.iter().skip(start).map(|(n, _)| *n).collect();
        cycle.push(node);
        Some(cycle)
    }
}

/// Rotate a closed cycle so it starts at its smallest element.
///
/// Reporting the same cycle identically no matter where traversal entered it
/// keeps diagnostics stable.
pub(crate) fn canonicalize_cycle<T: Ord + Clone>(mut cycle: Vec<T>) -> Vec<T> {
    if cycle.len() < 2 {
        return cycle;
    }
    let len = cycle.len() - 1;
    let start = cycle
        .iter()
        .take(len)
        .enumerate()
        .min_by(|(_, a), (_, b)| a.cmp(b))
        .map_or(0, |(idx, _)| idx);
    let (open, closing) = cycle.split_at_mut(len);
    open.rotate_left(start);
    if let (Some(first), Some(slot)) = (open.first().cloned(), closing.first_mut()) {
        *slot = first;
    }
    cycle
}
