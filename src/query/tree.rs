use super::merge::StacktraceTable;
use super::resolve::{Frame, Resolved};
use crate::error::Result;
use crate::metastore::LocationId;
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct Node {
    /// `None` only for the synthetic root.
    pub frame: Option<Frame>,
    pub cumulative: i64,
    pub flat: i64,
    pub diff: i64,
    pub children: Vec<usize>,
}

impl Node {
    fn add(&mut self, value: i64, diff: i64) {
        self.cumulative = self.cumulative.saturating_add(value);
        self.diff = self.diff.saturating_add(diff);
    }
}

/// Call tree of an aggregated stacktrace table, stored as an arena.
///
/// Children are keyed by (location, inline frame index) under their parent, so
/// stacks sharing a prefix share nodes.
#[derive(Debug, Clone)]
pub struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    pub const ROOT: usize = 0;

    pub fn build(table: &StacktraceTable, resolved: &Resolved) -> Result<Self> {
        let mut nodes = vec![Node::default()];
        let mut index: HashMap<(usize, LocationId, usize), usize> = HashMap::new();

        for (id, totals) in table.sorted() {
            let frames = resolved.frames(&id)?;

            nodes[Self::ROOT].add(totals.value, totals.diff);

            let mut cur = Self::ROOT;
            for frame in frames.into_iter().rev() {
                let key = (cur, frame.location_id, frame.inline_index);
                let next = match index.get(&key) {
                    Some(&n) => n,
                    None => {
                        let n = nodes.len();
                        nodes.push(Node {
                            frame: Some(frame),
                            ..Default::default()
                        });
                        nodes[cur].children.push(n);
                        index.insert(key, n);
                        n
                    }
                };
                nodes[next].add(totals.value, totals.diff);
                cur = next;
            }
            nodes[cur].flat = nodes[cur].flat.saturating_add(totals.value);
        }

        let mut tree = Self { nodes };
        tree.sort_children();
        Ok(tree)
    }

    pub fn root(&self) -> &Node {
        &self.nodes[Self::ROOT]
    }

    pub fn node(&self, idx: usize) -> &Node {
        &self.nodes[idx]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 1
    }

    /// Depth of the deepest node, counting the root.
    pub fn height(&self) -> usize {
        let mut max = 0;
        let mut stack = vec![(Self::ROOT, 1)];
        while let Some((idx, depth)) = stack.pop() {
            max = max.max(depth);
            stack.extend(self.nodes[idx].children.iter().map(|&c| (c, depth + 1)));
        }
        max
    }

    // Heaviest first, then by name so output is stable.
    fn sort_children(&mut self) {
        for i in 0..self.nodes.len() {
            let mut children = std::mem::take(&mut self.nodes[i].children);
            children.sort_by_cached_key(|&c| {
                let n = &self.nodes[c];
                let (name, location) = match &n.frame {
                    Some(f) => (f.function_name(), Some(f.location_id)),
                    None => (String::new(), None),
                };
                (std::cmp::Reverse(n.cumulative), name, location)
            });
            self.nodes[i].children = children;
        }
    }
}
