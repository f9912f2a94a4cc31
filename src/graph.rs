//! Graph view over the inverse tables, for cycle diagnostics and DOT export.

use petgraph::{
    algo::kosaraju_scc,
    dot::Dot,
    graph::NodeIndex,
    visit::Dfs,
    Graph,
};
use std::collections::{BTreeMap, HashSet};

use crate::{
    index::{AssetIndex, EdgeKind},
    properties::AssetId,
};

/// Asset to asset edges, pointing from the user to the used asset. Plain files that are not
/// assets are not part of the graph.
#[derive(Debug, Clone, Default)]
pub struct AssetGraph(pub Graph<AssetId, EdgeKind>);

impl AssetGraph {
    pub fn from_index(index: &AssetIndex) -> Self {
        let mut graph = Graph::new();
        let mut nodes: BTreeMap<AssetId, NodeIndex> = BTreeMap::new();
        for id in index.asset_ids() {
            nodes.insert(id, graph.add_node(id));
        }
        for record in index.records() {
            let Some(&target) = nodes.get(&record.id) else {
                continue;
            };
            for kind in [EdgeKind::Dependency, EdgeKind::Reference] {
                for user in index.inverse_table(kind).dependents(&record.absolute_path) {
                    if let Some(&source) = nodes.get(&user) {
                        graph.add_edge(source, target, kind);
                    }
                }
            }
        }
        AssetGraph(graph)
    }

    pub fn as_graph(&self) -> &Graph<AssetId, EdgeKind> {
        &self.0
    }

    /// The part of the graph `root` uses, directly or transitively, including `root` itself.
    /// Empty if `root` is not an asset.
    pub fn reachable_from(&self, root: AssetId) -> AssetGraph {
        let Some(start) = self.0.node_indices().find(|idx| self.0[*idx] == root) else {
            return AssetGraph::default();
        };
        let mut reached = HashSet::new();
        let mut dfs = Dfs::new(&self.0, start);
        while let Some(idx) = dfs.next(&self.0) {
            reached.insert(idx);
        }
        AssetGraph(self.0.filter_map(
            |idx, id| reached.contains(&idx).then_some(*id),
            |_, kind| Some(*kind),
        ))
    }

    /// Groups of assets that use each other, directly or transitively. Only groups of two or
    /// more assets, or single assets that use themselves, are reported.
    pub fn cycles(&self) -> Vec<Vec<AssetId>> {
        let mut cycles: Vec<Vec<AssetId>> = kosaraju_scc(&self.0)
            .into_iter()
            .filter(|component| {
                component.len() > 1
                    || component
                        .first()
                        .map(|idx| self.0.contains_edge(*idx, *idx))
                        .unwrap_or(false)
            })
            .map(|component| {
                let mut ids: Vec<AssetId> = component.iter().map(|idx| self.0[*idx]).collect();
                ids.sort();
                ids
            })
            .collect();
        cycles.sort();
        cycles
    }

    /// Graphviz rendering with asset identifiers as node labels and edge kinds as edge labels.
    pub fn to_dot(&self) -> String {
        Dot::new(&self.0).to_string()
    }
}
