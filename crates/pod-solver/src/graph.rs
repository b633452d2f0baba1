//! Loaded view of a solved package set.
//!
//! Nodes are package names, not references to other packages, so the
//! cyclic graphs a dev-edge can produce never become reference cycles;
//! traversal resolves names through the node map and tracks visited
//! nodes.

use std::collections::BTreeMap;

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Dfs;
use pod_core::error::{PodError, PodResult};
use pod_core::manifest::Dependency;
use pod_core::package::Package;

/// Adjacency over the root package and every locked member
#[derive(Debug)]
pub struct PackageGraph {
    graph: DiGraph<String, ()>,
    nodes: BTreeMap<String, NodeIndex>,
    packages: BTreeMap<String, Package>,
}

impl PackageGraph {
    /// Build the graph from the loaded members. Edges follow runtime
    /// dependencies everywhere, plus the root's dev dependencies.
    pub fn new(root_name: &str, members: Vec<Package>) -> Self {
        let mut graph = DiGraph::new();
        let mut nodes = BTreeMap::new();
        let mut packages = BTreeMap::new();

        for member in members {
            let name = member.pubspec.name.clone();
            let index = graph.add_node(name.clone());
            nodes.insert(name.clone(), index);
            packages.insert(name, member);
        }
        for (name, member) in &packages {
            let from = nodes[name];
            let dev: &[Dependency] = if name == root_name {
                &member.pubspec.dev_dependencies
            } else {
                &[]
            };
            for dep in member.pubspec.dependencies.iter().chain(dev) {
                if let Some(&to) = nodes.get(dep.name()) {
                    graph.add_edge(from, to, ());
                }
            }
        }

        Self {
            graph,
            nodes,
            packages,
        }
    }

    pub fn package(&self, name: &str) -> Option<&Package> {
        self.packages.get(name)
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// Packages `name` depends on directly, ordered by name
    pub fn direct_dependencies(&self, name: &str) -> PodResult<Vec<&Package>> {
        let &index = self
            .nodes
            .get(name)
            .ok_or_else(|| PodError::internal(format!("package {name} is not in the graph")))?;
        let mut names: Vec<&str> = self
            .graph
            .neighbors(index)
            .map(|n| self.graph[n].as_str())
            .collect();
        names.sort_unstable();
        names.dedup();
        Ok(names.iter().map(|n| &self.packages[*n]).collect())
    }

    /// Every package reachable from `name`, excluding itself unless a
    /// cycle leads back, ordered by name. Safe on cyclic graphs.
    pub fn transitive_dependencies(&self, name: &str) -> PodResult<Vec<&Package>> {
        let &start = self
            .nodes
            .get(name)
            .ok_or_else(|| PodError::internal(format!("package {name} is not in the graph")))?;
        let mut reached: Vec<&str> = Vec::new();
        let mut dfs = Dfs::new(&self.graph, start);
        let mut cycles_back = false;
        while let Some(node) = dfs.next(&self.graph) {
            if node != start {
                reached.push(self.graph[node].as_str());
            }
            if self.graph.neighbors(node).any(|n| n == start) {
                cycles_back = true;
            }
        }
        // The start itself counts only when an edge leads back to it.
        if cycles_back {
            reached.push(name);
        }
        reached.sort_unstable();
        reached.dedup();
        Ok(reached.iter().map(|n| &self.packages[*n]).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use pod_core::manifest::{Dependency, Pubspec};
    use pod_core::package::{Description, PackageId, PackageRef, DEFAULT_HOSTED_URL};
    use pod_core::version::{Version, VersionConstraint};

    fn member(name: &str, deps: &[&str]) -> Package {
        let dependencies = deps
            .iter()
            .map(|dep| {
                Dependency::new(
                    PackageRef::new(
                        *dep,
                        Description::Hosted {
                            url: DEFAULT_HOSTED_URL.to_string(),
                            name: dep.to_string(),
                        },
                    ),
                    VersionConstraint::Any,
                )
            })
            .collect();
        let pubspec = Pubspec {
            name: name.to_string(),
            version: Some(Version::new(1, 0, 0)),
            sdk_constraint: None,
            dependencies,
            dev_dependencies: Vec::new(),
        };
        let dir = Utf8PathBuf::from(format!("/packages/{name}"));
        Package::new(
            PackageId::root(name, Version::new(1, 0, 0), &dir),
            dir,
            pubspec,
        )
    }

    fn names(packages: &[&Package]) -> Vec<String> {
        packages.iter().map(|p| p.pubspec.name.clone()).collect()
    }

    #[test]
    fn test_direct_dependencies() {
        let graph = PackageGraph::new(
            "app",
            vec![
                member("app", &["foo", "bar"]),
                member("foo", &["baz"]),
                member("bar", &[]),
                member("baz", &[]),
            ],
        );
        assert_eq!(graph.len(), 4);
        assert_eq!(
            names(&graph.direct_dependencies("app").unwrap()),
            vec!["bar", "foo"]
        );
        assert_eq!(
            names(&graph.direct_dependencies("foo").unwrap()),
            vec!["baz"]
        );
    }

    #[test]
    fn test_transitive_closure() {
        let graph = PackageGraph::new(
            "app",
            vec![
                member("app", &["foo"]),
                member("foo", &["baz"]),
                member("baz", &[]),
                member("unrelated", &[]),
            ],
        );
        assert_eq!(
            names(&graph.transitive_dependencies("app").unwrap()),
            vec!["baz", "foo"]
        );
    }

    #[test]
    fn test_cycles_are_traversed_once() {
        let graph = PackageGraph::new(
            "app",
            vec![
                member("app", &["a"]),
                member("a", &["b"]),
                member("b", &["a"]),
            ],
        );
        assert_eq!(
            names(&graph.transitive_dependencies("app").unwrap()),
            vec!["a", "b"]
        );
        // A participant of the cycle reaches itself.
        assert_eq!(
            names(&graph.transitive_dependencies("a").unwrap()),
            vec!["a", "b"]
        );
    }

    #[test]
    fn test_unknown_package_is_an_error() {
        let graph = PackageGraph::new("app", vec![member("app", &[])]);
        assert!(graph.direct_dependencies("ghost").is_err());
    }
}
