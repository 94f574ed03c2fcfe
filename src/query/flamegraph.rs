use super::tree::Tree;
use crate::querypb::{Flamegraph, FlamegraphNode, FlamegraphRootNode};

pub fn flamegraph(tree: &Tree, unit: &str) -> Flamegraph {
    let root = tree.root();
    Flamegraph {
        root: Some(FlamegraphRootNode {
            cumulative: root.cumulative,
            diff: root.diff,
            children: root.children.iter().map(|&c| node(tree, c)).collect(),
        }),
        total: root.cumulative,
        unit: unit.to_string(),
        height: tree.height() as i32,
    }
}

fn node(tree: &Tree, idx: usize) -> FlamegraphNode {
    let n = tree.node(idx);
    FlamegraphNode {
        meta: n.frame.as_ref().map(|f| f.meta()),
        cumulative: n.cumulative,
        diff: n.diff,
        children: n.children.iter().map(|&c| node(tree, c)).collect(),
    }
}
