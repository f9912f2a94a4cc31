use std::{
    collections::{BTreeSet, HashMap},
    path::{Path, PathBuf},
};

use crate::properties::AssetId;

/// Which inverse table an edge belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EdgeKind {
    Dependency,
    Reference,
}

impl std::fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EdgeKind::Dependency => write!(f, "dependency"),
            EdgeKind::Reference => write!(f, "reference"),
        }
    }
}

/// Referenced file path to the assets that declared it.
#[derive(Debug, Default)]
pub struct InverseTable {
    entries: HashMap<PathBuf, BTreeSet<AssetId>>,
}

impl InverseTable {
    pub fn add(&mut self, path: &Path, id: AssetId) {
        self.entries.entry(path.to_path_buf()).or_default().insert(id);
    }

    pub fn remove(&mut self, path: &Path, id: AssetId) {
        if let Some(ids) = self.entries.get_mut(path) {
            ids.remove(&id);
            if ids.is_empty() {
                self.entries.remove(path);
            }
        }
    }

    pub fn get(&self, path: &Path) -> Option<&BTreeSet<AssetId>> {
        self.entries.get(path)
    }

    pub fn dependents(&self, path: &Path) -> impl Iterator<Item = AssetId> + '_ {
        self.entries.get(path).into_iter().flatten().copied()
    }

    pub fn contains(&self, path: &Path, id: AssetId) -> bool {
        self.entries
            .get(path)
            .map(|ids| ids.contains(&id))
            .unwrap_or(false)
    }

    /// True if `id` appears under any path.
    pub fn mentions(&self, id: AssetId) -> bool {
        self.entries.values().any(|ids| ids.contains(&id))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// (dependent, dependency) pairs whose dependency was declared by identifier before any asset
/// with that identifier was indexed.
#[derive(Debug, Default)]
pub struct UnresolvedEdges {
    pairs: BTreeSet<(AssetId, AssetId)>,
}

impl UnresolvedEdges {
    pub fn insert(&mut self, dependent: AssetId, dependency: AssetId) {
        self.pairs.insert((dependent, dependency));
    }

    pub fn forget_dependent(&mut self, dependent: AssetId) {
        self.pairs.retain(|(a, _)| *a != dependent);
    }

    /// Removes and returns every dependent waiting on `dependency`.
    pub fn take_waiting_on(&mut self, dependency: AssetId) -> Vec<AssetId> {
        let waiting: Vec<AssetId> = self
            .pairs
            .iter()
            .filter(|(_, dep)| *dep == dependency)
            .map(|(a, _)| *a)
            .collect();
        for dependent in waiting.iter() {
            self.pairs.remove(&(*dependent, dependency));
        }
        waiting
    }

    pub fn contains(&self, dependent: AssetId, dependency: AssetId) -> bool {
        self.pairs.contains(&(dependent, dependency))
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn clear(&mut self) {
        self.pairs.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_entries_are_dropped() {
        let mut table = InverseTable::default();
        let id = AssetId::new();
        let path = Path::new("/data/tex.png");
        table.add(path, id);
        assert!(table.contains(path, id));
        table.remove(path, id);
        assert!(table.is_empty());
        assert!(!table.mentions(id));
    }

    #[test]
    fn unresolved_edges_resolve_per_dependency() {
        let mut edges = UnresolvedEdges::default();
        let (a, b, dep) = (AssetId::new(), AssetId::new(), AssetId::new());
        edges.insert(a, dep);
        edges.insert(b, dep);
        edges.insert(a, b);
        let mut waiting = edges.take_waiting_on(dep);
        waiting.sort();
        let mut expected = vec![a, b];
        expected.sort();
        assert_eq!(waiting, expected);
        assert!(edges.contains(a, b));
        edges.forget_dependent(a);
        assert!(edges.is_empty());
    }
}
