//! Addon Dependency Resolution
//!
//! Computes install/uninstall order for addons from a dependency graph
//! (addon name -> names it depends on), and provides diagnostics for
//! broken graphs.
//!
//! # Install order
//!
//! [`DependencyResolver::resolve_install_order`] works in three steps:
//!
//! 1. Depth-first collection of the transitive dependency set of the
//!    requested addon, failing on the first cycle or missing dependency.
//! 2. Kahn's algorithm over the subgraph induced by that set. In-degree is
//!    counted along `addon -> dependency` edges, so Kahn emits dependents
//!    before their dependencies.
//! 3. The emitted order is reversed so dependencies come first.
//!
//! Cycle detection walks with an explicit on-path stack (push on enter, pop
//! on exit) instead of copying the visited set per branch, which keeps every
//! traversal linear in the size of the graph while producing the same
//! observable results.
//!
//! # Example
//!
//! ```rust
//! use deckhand_core::resolver::{DependencyGraph, DependencyResolver};
//!
//! let mut graph = DependencyGraph::new();
//! graph.insert("web".into(), vec!["db".into(), "cache".into()]);
//! graph.insert("db".into(), vec![]);
//! graph.insert("cache".into(), vec![]);
//!
//! let order = DependencyResolver::new(&graph).resolve_install_order("web").unwrap();
//! assert_eq!(order.last().map(String::as_str), Some("web"));
//! ```

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Addon name -> ordered list of dependency names.
///
/// A `BTreeMap` keeps every traversal deterministic.
pub type DependencyGraph = BTreeMap<String, Vec<String>>;

// ─────────────────────────────────────────────────────────────────────────────
// Error Types
// ─────────────────────────────────────────────────────────────────────────────

/// Errors raised while resolving install order.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolutionError {
    #[error("Circular dependency detected: {}", .cycle.join(" -> "))]
    CircularDependency { cycle: Vec<String> },

    #[error("Dependency not found: {addon} requires {dependency}")]
    DependencyNotFound { addon: String, dependency: String },

    #[error("Addon not found: {0}")]
    AddonNotFound(String),
}

impl ResolutionError {
    /// Every addon name involved in the failure.
    pub fn affected_addons(&self) -> Vec<String> {
        match self {
            Self::CircularDependency { cycle } => {
                let unique: BTreeSet<&String> = cycle.iter().collect();
                unique.into_iter().cloned().collect()
            }
            Self::DependencyNotFound { addon, dependency } => {
                vec![addon.clone(), dependency.clone()]
            }
            Self::AddonNotFound(name) => vec![name.clone()],
        }
    }
}

pub type ResolutionResult<T> = Result<T, ResolutionError>;

// ─────────────────────────────────────────────────────────────────────────────
// Dependency Tree
// ─────────────────────────────────────────────────────────────────────────────

/// Nested view of an addon's dependencies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyTree {
    /// Addon name
    pub name: String,
    /// Set when the name already appears on the path from the root
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub circular: bool,
    /// Set when the name is not a key of the graph
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub missing: bool,
    /// Child trees, in declaration order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<DependencyTree>,
}

impl DependencyTree {
    fn leaf(name: &str) -> Self {
        Self {
            name: name.to_string(),
            circular: false,
            missing: false,
            dependencies: Vec::new(),
        }
    }

    /// Render as an indented text tree.
    pub fn render(&self) -> String {
        let mut out = String::new();
        self.render_into(&mut out, 0);
        out
    }

    fn render_into(&self, out: &mut String, depth: usize) {
        out.push_str(&"  ".repeat(depth));
        out.push_str(&self.name);
        if self.circular {
            out.push_str(" (circular)");
        }
        if self.missing {
            out.push_str(" (missing)");
        }
        out.push('\n');
        for child in &self.dependencies {
            child.render_into(out, depth + 1);
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Dependency Resolver
// ─────────────────────────────────────────────────────────────────────────────

/// Resolves dependencies between addons.
///
/// Pure: borrows the graph and never mutates it.
pub struct DependencyResolver<'a> {
    graph: &'a DependencyGraph,
}

impl<'a> DependencyResolver<'a> {
    /// Create a resolver over a dependency graph
    pub fn new(graph: &'a DependencyGraph) -> Self {
        Self { graph }
    }

    /// Dependencies-first install order for `name`, ending with `name`.
    pub fn resolve_install_order(&self, name: &str) -> ResolutionResult<Vec<String>> {
        if !self.graph.contains_key(name) {
            return Err(ResolutionError::AddonNotFound(name.to_string()));
        }

        let mut collected = BTreeSet::new();
        let mut path = Vec::new();
        self.collect(name, &mut path, &mut collected)?;

        let subgraph: BTreeMap<&str, &[String]> = collected
            .iter()
            .map(|node| (node.as_str(), self.dependencies_of(node)))
            .collect();

        let mut order = kahn_order(&subgraph)?;
        order.reverse();
        Ok(order)
    }

    /// Dependencies-first install order covering several addons.
    ///
    /// Each addon appears once, at the position of its first requirement.
    pub fn resolve_many(&self, names: &[String]) -> ResolutionResult<Vec<String>> {
        let mut seen = HashSet::new();
        let mut order = Vec::new();
        for name in names {
            for node in self.resolve_install_order(name)? {
                if seen.insert(node.clone()) {
                    order.push(node);
                }
            }
        }
        Ok(order)
    }

    /// Dependents-first order over the whole graph (safe uninstall order).
    pub fn uninstall_order(&self) -> ResolutionResult<Vec<String>> {
        for (addon, deps) in self.graph {
            if let Some(dependency) = deps.iter().find(|d| !self.graph.contains_key(*d)) {
                return Err(ResolutionError::DependencyNotFound {
                    addon: addon.clone(),
                    dependency: dependency.clone(),
                });
            }
        }

        let whole: BTreeMap<&str, &[String]> = self
            .graph
            .iter()
            .map(|(name, deps)| (name.as_str(), deps.as_slice()))
            .collect();
        kahn_order(&whole)
    }

    /// Addons that depend on `name`, directly or transitively.
    pub fn dependents_of(&self, name: &str) -> Vec<String> {
        let mut reverse: HashMap<&str, Vec<&str>> = HashMap::new();
        for (addon, deps) in self.graph {
            for dep in deps {
                reverse.entry(dep.as_str()).or_default().push(addon.as_str());
            }
        }

        let mut found = BTreeSet::new();
        let mut queue = VecDeque::from([name]);
        while let Some(current) = queue.pop_front() {
            for dependent in reverse.get(current).into_iter().flatten() {
                if *dependent != name && found.insert(dependent.to_string()) {
                    queue.push_back(*dependent);
                }
            }
        }
        found.into_iter().collect()
    }

    /// Every elementary cycle reachable in the graph.
    ///
    /// A cycle and its rotations or reverse are reported once. Never fails.
    pub fn detect_circular_dependencies(&self) -> Vec<Vec<String>> {
        let mut cycles: Vec<Vec<String>> = Vec::new();
        let mut canonical_seen: HashSet<Vec<String>> = HashSet::new();

        for start in self.graph.keys() {
            let mut path: Vec<&str> = Vec::new();
            self.find_cycles(start, &mut path, &mut |cycle| {
                let key = canonical_cycle(&cycle);
                if canonical_seen.insert(key) {
                    cycles.push(cycle);
                }
            });
        }

        cycles
    }

    /// Nested dependency tree for `name`.
    ///
    /// A name that reappears on the current path is marked `circular` and
    /// not expanded further; sibling branches are unaffected.
    pub fn get_dependency_tree(&self, name: &str) -> DependencyTree {
        let mut path = Vec::new();
        self.build_tree(name, &mut path)
    }

    /// Human-readable issues with the graph. Never fails.
    pub fn validate_graph(&self) -> Vec<String> {
        let mut issues = Vec::new();

        for cycle in self.detect_circular_dependencies() {
            let mut display = cycle.clone();
            if let Some(first) = cycle.first() {
                display.push(first.clone());
            }
            issues.push(format!(
                "Circular dependency detected: {}",
                display.join(" -> ")
            ));
        }

        for (addon, deps) in self.graph {
            for dep in deps {
                if !self.graph.contains_key(dep) {
                    issues.push(format!(
                        "Addon '{addon}' depends on '{dep}', which is not available"
                    ));
                }
            }
        }

        issues
    }

    // Private helpers

    fn dependencies_of(&self, name: &str) -> &'a [String] {
        self.graph.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    fn collect(
        &self,
        name: &str,
        path: &mut Vec<String>,
        collected: &mut BTreeSet<String>,
    ) -> ResolutionResult<()> {
        if let Some(pos) = path.iter().position(|n| n == name) {
            let mut cycle = path[pos..].to_vec();
            cycle.push(name.to_string());
            return Err(ResolutionError::CircularDependency { cycle });
        }
        if collected.contains(name) {
            return Ok(());
        }

        path.push(name.to_string());
        for dep in self.dependencies_of(name) {
            if !self.graph.contains_key(dep) {
                return Err(ResolutionError::DependencyNotFound {
                    addon: name.to_string(),
                    dependency: dep.clone(),
                });
            }
            self.collect(dep, path, collected)?;
        }
        path.pop();

        collected.insert(name.to_string());
        Ok(())
    }

    fn find_cycles<'g>(
        &'g self,
        name: &'g str,
        path: &mut Vec<&'g str>,
        on_cycle: &mut dyn FnMut(Vec<String>),
    ) {
        if let Some(pos) = path.iter().position(|n| *n == name) {
            on_cycle(path[pos..].iter().map(|s| s.to_string()).collect());
            return;
        }
        if !self.graph.contains_key(name) {
            return;
        }

        // Nodes are re-entered through every path so no elementary cycle is missed
        path.push(name);
        for dep in self.dependencies_of(name) {
            self.find_cycles(dep.as_str(), path, on_cycle);
        }
        path.pop();
    }

    fn build_tree(&self, name: &str, path: &mut Vec<String>) -> DependencyTree {
        let mut node = DependencyTree::leaf(name);

        if path.iter().any(|n| n == name) {
            node.circular = true;
            return node;
        }
        let Some(deps) = self.graph.get(name) else {
            node.missing = true;
            return node;
        };

        path.push(name.to_string());
        node.dependencies = deps.iter().map(|dep| self.build_tree(dep, path)).collect();
        path.pop();

        node
    }
}

/// Kahn's algorithm along `node -> dependency` edges.
///
/// Returns dependents before dependencies. Fails with the unsorted remainder
/// when the graph contains a cycle.
fn kahn_order(graph: &BTreeMap<&str, &[String]>) -> ResolutionResult<Vec<String>> {
    let mut in_degree: BTreeMap<&str, usize> = graph.keys().map(|k| (*k, 0)).collect();
    for deps in graph.values() {
        for dep in deps.iter() {
            if let Some(count) = in_degree.get_mut(dep.as_str()) {
                *count += 1;
            }
        }
    }

    let mut queue: VecDeque<&str> = in_degree
        .iter()
        .filter(|(_, count)| **count == 0)
        .map(|(name, _)| *name)
        .collect();

    let mut order = Vec::with_capacity(graph.len());
    while let Some(node) = queue.pop_front() {
        order.push(node.to_string());
        for dep in graph.get(node).copied().unwrap_or(&[]) {
            if let Some(count) = in_degree.get_mut(dep.as_str()) {
                *count -= 1;
                if *count == 0 {
                    queue.push_back(dep.as_str());
                }
            }
        }
    }

    if order.len() < graph.len() {
        let emitted: HashSet<&str> = order.iter().map(String::as_str).collect();
        let cycle = graph
            .keys()
            .filter(|name| !emitted.contains(*name))
            .map(|name| name.to_string())
            .collect();
        return Err(ResolutionError::CircularDependency { cycle });
    }

    Ok(order)
}

/// Rotation- and direction-independent key for a cycle.
fn canonical_cycle(cycle: &[String]) -> Vec<String> {
    let rotate_min = |nodes: Vec<String>| -> Vec<String> {
        let Some(min_pos) = nodes
            .iter()
            .enumerate()
            .min_by(|a, b| a.1.cmp(b.1))
            .map(|(i, _)| i)
        else {
            return nodes;
        };
        let mut rotated = nodes[min_pos..].to_vec();
        rotated.extend_from_slice(&nodes[..min_pos]);
        rotated
    };

    let forward = rotate_min(cycle.to_vec());
    let backward = rotate_min(cycle.iter().rev().cloned().collect());
    forward.min(backward)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(edges: &[(&str, &[&str])]) -> DependencyGraph {
        edges
            .iter()
            .map(|(name, deps)| {
                (
                    name.to_string(),
                    deps.iter().map(|d| d.to_string()).collect(),
                )
            })
            .collect()
    }

    fn index_of(order: &[String], name: &str) -> usize {
        order.iter().position(|n| n == name).unwrap()
    }

    #[test]
    fn test_install_order_dependencies_first() {
        let g = graph(&[
            ("app", &["web", "worker"]),
            ("web", &["db", "cache"]),
            ("worker", &["db", "queue"]),
            ("db", &[]),
            ("cache", &[]),
            ("queue", &["cache"]),
            ("unrelated", &[]),
        ]);
        let order = DependencyResolver::new(&g).resolve_install_order("app").unwrap();

        assert_eq!(order.len(), 6);
        assert!(!order.contains(&"unrelated".to_string()));
        assert_eq!(order.last().unwrap(), "app");

        for node in &order {
            for dep in &g[node] {
                assert!(
                    index_of(&order, dep) < index_of(&order, node),
                    "{dep} must precede {node} in {order:?}"
                );
            }
        }
    }

    #[test]
    fn test_install_order_is_stable() {
        let g = graph(&[("a", &["b", "c"]), ("b", &[]), ("c", &[])]);
        let resolver = DependencyResolver::new(&g);
        let first = resolver.resolve_install_order("a").unwrap();
        for _ in 0..10 {
            assert_eq!(resolver.resolve_install_order("a").unwrap(), first);
        }
    }

    #[test]
    fn test_leaf_addon_resolves_to_itself() {
        let g = graph(&[("solo", &[])]);
        let order = DependencyResolver::new(&g).resolve_install_order("solo").unwrap();
        assert_eq!(order, vec!["solo".to_string()]);
    }

    #[test]
    fn test_two_node_cycle_is_an_error() {
        let g = graph(&[("A", &["B"]), ("B", &["A"])]);
        let err = DependencyResolver::new(&g)
            .resolve_install_order("A")
            .unwrap_err();
        match err {
            ResolutionError::CircularDependency { cycle } => {
                assert_eq!(cycle, vec!["A", "B", "A"]);
            }
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_dependency_is_an_error() {
        let g = graph(&[("A", &["B"])]);
        let err = DependencyResolver::new(&g)
            .resolve_install_order("A")
            .unwrap_err();
        assert_eq!(
            err,
            ResolutionError::DependencyNotFound {
                addon: "A".into(),
                dependency: "B".into(),
            }
        );
        assert_eq!(err.affected_addons(), vec!["A", "B"]);
    }

    #[test]
    fn test_unknown_root_addon() {
        let g = graph(&[("A", &[])]);
        let err = DependencyResolver::new(&g)
            .resolve_install_order("Z")
            .unwrap_err();
        assert_eq!(err, ResolutionError::AddonNotFound("Z".into()));
    }

    #[test]
    fn test_diamond_is_not_a_cycle() {
        // Sibling branches share "base"; must not be flagged as circular
        let g = graph(&[
            ("top", &["left", "right"]),
            ("left", &["base"]),
            ("right", &["base"]),
            ("base", &[]),
        ]);
        let resolver = DependencyResolver::new(&g);
        let order = resolver.resolve_install_order("top").unwrap();
        assert_eq!(order.first().unwrap(), "base");
        assert_eq!(order.last().unwrap(), "top");
        assert!(resolver.detect_circular_dependencies().is_empty());

        let tree = resolver.get_dependency_tree("top");
        assert!(tree.dependencies.iter().all(|c| !c.circular));
        assert_eq!(tree.dependencies[1].dependencies[0].name, "base");
        assert!(!tree.dependencies[1].dependencies[0].circular);
    }

    #[test]
    fn test_detect_two_node_cycle_reported_once() {
        let g = graph(&[("A", &["B"]), ("B", &["A"])]);
        let cycles = DependencyResolver::new(&g).detect_circular_dependencies();
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0], vec!["A", "B"]);
    }

    #[test]
    fn test_detect_three_node_cycle_and_self_loop() {
        let g = graph(&[
            ("a", &["b"]),
            ("b", &["c"]),
            ("c", &["a"]),
            ("self", &["self"]),
            ("ok", &["a"]),
        ]);
        let cycles = DependencyResolver::new(&g).detect_circular_dependencies();
        assert_eq!(cycles.len(), 2);
        assert!(cycles.contains(&vec!["a".to_string(), "b".into(), "c".into()]));
        assert!(cycles.contains(&vec!["self".to_string()]));
    }

    #[test]
    fn test_detect_cycles_sharing_nodes() {
        let g = graph(&[("X", &["Y", "Z"]), ("Y", &["Z"]), ("Z", &["X", "Y"])]);
        let resolver = DependencyResolver::new(&g);
        let cycles = resolver.detect_circular_dependencies();

        assert_eq!(cycles.len(), 3);
        assert!(cycles.contains(&vec!["X".to_string(), "Y".into(), "Z".into()]));
        assert!(cycles.contains(&vec!["Y".to_string(), "Z".into()]));
        assert!(cycles.contains(&vec!["X".to_string(), "Z".into()]));

        let issues = resolver.validate_graph();
        assert!(issues.iter().any(|i| i.ends_with("X -> Z -> X")));
    }

    #[test]
    fn test_cycle_below_root_is_detected() {
        let g = graph(&[("x", &["y"]), ("y", &["z"]), ("z", &["y"])]);
        let err = DependencyResolver::new(&g)
            .resolve_install_order("x")
            .unwrap_err();
        assert!(matches!(err, ResolutionError::CircularDependency { .. }));
        assert!(err.to_string().contains("y"));
    }

    #[test]
    fn test_dependency_tree_marks_circular() {
        let g = graph(&[("A", &["B"]), ("B", &["A", "C"]), ("C", &[])]);
        let tree = DependencyResolver::new(&g).get_dependency_tree("A");

        assert_eq!(tree.name, "A");
        let b = &tree.dependencies[0];
        assert_eq!(b.name, "B");
        assert!(b.dependencies[0].circular);
        assert!(b.dependencies[0].dependencies.is_empty());
        assert_eq!(b.dependencies[1].name, "C");
        assert!(!b.dependencies[1].circular);

        let rendered = tree.render();
        assert!(rendered.contains("A (circular)"));
    }

    #[test]
    fn test_dependency_tree_marks_missing() {
        let g = graph(&[("A", &["ghost"])]);
        let tree = DependencyResolver::new(&g).get_dependency_tree("A");
        assert!(tree.dependencies[0].missing);
    }

    #[test]
    fn test_validate_graph_reports_everything() {
        let g = graph(&[("A", &["B"]), ("B", &["A"]), ("C", &["D"])]);
        let issues = DependencyResolver::new(&g).validate_graph();
        assert_eq!(issues.len(), 2);
        assert!(issues.iter().any(|i| i.contains("A -> B -> A")));
        assert!(issues.iter().any(|i| i.contains("'C' depends on 'D'")));
    }

    #[test]
    fn test_validate_clean_graph() {
        let g = graph(&[("A", &["B"]), ("B", &[])]);
        assert!(DependencyResolver::new(&g).validate_graph().is_empty());
    }

    #[test]
    fn test_uninstall_order_dependents_first() {
        let g = graph(&[("web", &["db"]), ("db", &[]), ("api", &["db", "web"])]);
        let order = DependencyResolver::new(&g).uninstall_order().unwrap();
        assert!(index_of(&order, "api") < index_of(&order, "web"));
        assert!(index_of(&order, "web") < index_of(&order, "db"));
    }

    #[test]
    fn test_dependents_of_is_transitive() {
        let g = graph(&[("web", &["db"]), ("db", &[]), ("api", &["web"]), ("x", &[])]);
        let dependents = DependencyResolver::new(&g).dependents_of("db");
        assert_eq!(dependents, vec!["api".to_string(), "web".to_string()]);
    }

    #[test]
    fn test_resolve_many_deduplicates() {
        let g = graph(&[("a", &["base"]), ("b", &["base"]), ("base", &[])]);
        let order = DependencyResolver::new(&g)
            .resolve_many(&["a".into(), "b".into()])
            .unwrap();
        assert_eq!(order, vec!["base", "a", "b"]);
    }
}
