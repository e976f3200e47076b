//! Taxonomy tree loading and flattening.
//!
//! The tree source is a nested JSON document where every object key is a
//! category segment, except two reserved keys carrying node metadata:
//! `__defects__` (defect labels valid at that node) and `__spass_code__`
//! (an opaque code passed through to the UI, never part of a path).

use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use serde_json::Value;

/// Separator between path segments, e.g. `"Car > Exterior"`.
pub const PATH_SEPARATOR: &str = " > ";

/// Reserved key: list of defect labels valid at this node.
pub const DEFECTS_KEY: &str = "__defects__";

/// Reserved key: opaque code attached to a node, excluded from paths.
pub const SPASS_CODE_KEY: &str = "__spass_code__";

/// Flattened view of the category tree: every reachable non-root path plus
/// the defect labels attached to each node that declares any.
///
/// Built once at startup and read-only afterwards.
pub struct TaxonomyIndex {
    /// All paths, deduplicated, in lexicographic order.
    paths: Vec<String>,
    /// Path -> defect labels, order preserved from the source file.
    defects: HashMap<String, Vec<String>>,
}

impl TaxonomyIndex {
    /// Load and flatten the tree file. A missing or unparsable file yields
    /// an empty index so the server can still start; every classification
    /// against it reports a no-index condition instead.
    pub fn load(tree_path: &Path) -> Self {
        match std::fs::read_to_string(tree_path) {
            Ok(data) => match serde_json::from_str::<Value>(&data) {
                Ok(tree) => Self::from_value(&tree),
                Err(e) => {
                    tracing::error!("Taxonomy tree {} is not valid JSON: {e}", tree_path.display());
                    Self::empty()
                }
            },
            Err(e) => {
                tracing::error!("Cannot read taxonomy tree {}: {e}", tree_path.display());
                Self::empty()
            }
        }
    }

    pub fn empty() -> Self {
        Self {
            paths: Vec::new(),
            defects: HashMap::new(),
        }
    }

    /// Flatten a parsed tree into sorted paths and the defect map.
    pub fn from_value(tree: &Value) -> Self {
        let mut paths = BTreeSet::new();
        let mut defects = HashMap::new();
        collect(tree, "", &mut paths, &mut defects);
        Self {
            paths: paths.into_iter().collect(),
            defects,
        }
    }

    /// All known paths in lexicographic order.
    pub fn paths(&self) -> &[String] {
        &self.paths
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Defect labels attached to `path`, if the node declares any.
    pub fn defects_for(&self, path: &str) -> Option<&[String]> {
        self.defects.get(path).map(|v| v.as_slice())
    }

    /// Whether `path` carries a non-empty defect list. Only defect-bearing
    /// paths are valid classification targets.
    pub fn has_defects(&self, path: &str) -> bool {
        self.defects.get(path).is_some_and(|d| !d.is_empty())
    }

    /// Union of every defect label in the tree, sorted and deduplicated.
    /// This is the master label set for the defect classifier.
    pub fn all_unique_defects(&self) -> Vec<String> {
        let unique: BTreeSet<&String> = self.defects.values().flatten().collect();
        unique.into_iter().cloned().collect()
    }
}

fn collect(
    node: &Value,
    current_path: &str,
    paths: &mut BTreeSet<String>,
    defects: &mut HashMap<String, Vec<String>>,
) {
    let Value::Object(map) = node else {
        // Leaf values carry no structure of their own; the path to them
        // was recorded by the parent iteration.
        return;
    };

    if let Some(Value::Array(labels)) = map.get(DEFECTS_KEY) {
        let labels: Vec<String> = labels
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect();
        defects.insert(current_path.to_string(), labels);
    }

    if !current_path.is_empty() {
        paths.insert(current_path.to_string());
    }

    for (key, child) in map {
        if key == DEFECTS_KEY || key == SPASS_CODE_KEY {
            continue;
        }
        let child_path = if current_path.is_empty() {
            key.clone()
        } else {
            format!("{current_path}{PATH_SEPARATOR}{key}")
        };
        // The child path is recorded even when the child is a leaf value.
        paths.insert(child_path.clone());
        collect(child, &child_path, paths, defects);
    }
}
