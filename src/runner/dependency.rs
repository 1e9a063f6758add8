//! Dependency graph for stage execution ordering.
//!
//! All collections are ordered so that every query is deterministic:
//! the same pipeline always yields the same order, groups and cycle path.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::{DefinitionError, ReprunError, Result};

/// Represents the dependency relationships between stages.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    /// Map of stage name to its direct dependencies.
    dependencies: BTreeMap<String, BTreeSet<String>>,
    /// Map of stage name to stages that depend on it.
    dependents: BTreeMap<String, BTreeSet<String>>,
}

impl DependencyGraph {
    /// Create a new dependency graph builder.
    pub fn builder() -> DependencyGraphBuilder {
        DependencyGraphBuilder::new()
    }

    /// Get the direct dependencies of a stage.
    pub fn dependencies_of(&self, stage: &str) -> Option<&BTreeSet<String>> {
        self.dependencies.get(stage)
    }

    /// Get stages that depend on the given stage.
    pub fn dependents_of(&self, stage: &str) -> Option<&BTreeSet<String>> {
        self.dependents.get(stage)
    }

    /// Check if a stage exists in the graph.
    pub fn contains(&self, stage: &str) -> bool {
        self.dependencies.contains_key(stage)
    }

    /// Iterate stage names in lexicographic order.
    pub fn stages(&self) -> impl Iterator<Item = &str> {
        self.dependencies.keys().map(String::as_str)
    }

    /// Get the number of stages in the graph.
    pub fn len(&self) -> usize {
        self.dependencies.len()
    }

    /// Check if the graph is empty.
    pub fn is_empty(&self) -> bool {
        self.dependencies.is_empty()
    }

    /// Returns stages in topological order (dependencies before dependents).
    ///
    /// Among stages whose dependencies are all scheduled, the
    /// lexicographically smallest name goes first.
    ///
    /// Returns [`ReprunError::Cycle`] if no such order exists.
    pub fn order(&self) -> Result<Vec<String>> {
        let mut in_degree: BTreeMap<&str, usize> = self
            .dependencies
            .iter()
            .map(|(stage, deps)| (stage.as_str(), deps.len()))
            .collect();

        let mut ready: BTreeSet<&str> = in_degree
            .iter()
            .filter(|(_, &degree)| degree == 0)
            .map(|(stage, _)| *stage)
            .collect();

        let mut result = Vec::with_capacity(self.len());

        while let Some(stage) = ready.pop_first() {
            result.push(stage.to_string());

            if let Some(dependents) = self.dependents.get(stage) {
                for dependent in dependents {
                    if let Some(degree) = in_degree.get_mut(dependent.as_str()) {
                        *degree -= 1;
                        if *degree == 0 {
                            ready.insert(dependent.as_str());
                        }
                    }
                }
            }
        }

        if result.len() != self.len() {
            let stages = self.find_cycle().unwrap_or_else(|| {
                in_degree
                    .iter()
                    .filter(|(_, &d)| d > 0)
                    .map(|(s, _)| s.to_string())
                    .collect()
            });
            return Err(ReprunError::Cycle { stages });
        }

        Ok(result)
    }

    /// Find a cycle in the graph, returning the path if one exists.
    ///
    /// The path starts and ends with the same stage, e.g. `[a, b, a]`.
    pub fn find_cycle(&self) -> Option<Vec<String>> {
        #[derive(Clone, Copy, PartialEq)]
        enum State {
            Unvisited,
            Visiting,
            Visited,
        }

        fn dfs<'a>(
            node: &'a str,
            graph: &'a DependencyGraph,
            state: &mut BTreeMap<&'a str, State>,
            path: &mut Vec<&'a str>,
        ) -> Option<Vec<String>> {
            state.insert(node, State::Visiting);
            path.push(node);

            if let Some(deps) = graph.dependencies.get(node) {
                for dep in deps {
                    match state.get(dep.as_str()) {
                        Some(State::Visiting) => {
                            let start = path.iter().position(|s| *s == dep.as_str())?;
                            let mut cycle: Vec<String> =
                                path[start..].iter().map(|s| s.to_string()).collect();
                            cycle.push(dep.clone());
                            return Some(cycle);
                        }
                        Some(State::Unvisited) | None => {
                            if let Some(cycle) = dfs(dep, graph, state, path) {
                                return Some(cycle);
                            }
                        }
                        Some(State::Visited) => {}
                    }
                }
            }

            path.pop();
            state.insert(node, State::Visited);
            None
        }

        let mut state: BTreeMap<&str, State> = self
            .stages()
            .map(|s| (s, State::Unvisited))
            .collect();
        let mut path: Vec<&str> = Vec::new();

        for stage in self.stages() {
            if state.get(stage) == Some(&State::Unvisited) {
                if let Some(cycle) = dfs(stage, self, &mut state, &mut path) {
                    return Some(cycle);
                }
            }
        }

        None
    }

    /// Returns groups of stages that can execute in parallel.
    ///
    /// Each group contains stages whose dependencies are satisfied
    /// by all previous groups.
    pub fn parallel_groups(&self) -> Result<Vec<Vec<String>>> {
        if let Some(stages) = self.find_cycle() {
            return Err(ReprunError::Cycle { stages });
        }

        let mut groups: Vec<Vec<String>> = Vec::new();
        let mut completed: BTreeSet<String> = BTreeSet::new();

        while completed.len() < self.len() {
            let ready: Vec<String> = self
                .stages()
                .filter(|s| !completed.contains(*s))
                .filter(|s| self.is_ready(s, &completed))
                .map(str::to_string)
                .collect();

            if ready.is_empty() {
                break;
            }

            completed.extend(ready.iter().cloned());
            groups.push(ready);
        }

        Ok(groups)
    }

    /// Check if a stage is ready to run given completed stages.
    pub fn is_ready(&self, stage: &str, completed: &BTreeSet<String>) -> bool {
        match self.dependencies.get(stage) {
            None => true,
            Some(deps) => deps.iter().all(|d| completed.contains(d)),
        }
    }

    /// Get all transitive dependents of a stage.
    ///
    /// Returns stages that depend on the given stage, directly or indirectly.
    pub fn transitive_dependents(&self, stage: &str) -> BTreeSet<String> {
        let mut result = BTreeSet::new();
        let mut to_visit = vec![stage.to_string()];

        while let Some(current) = to_visit.pop() {
            if let Some(dependents) = self.dependents.get(&current) {
                for dep in dependents {
                    if result.insert(dep.clone()) {
                        to_visit.push(dep.clone());
                    }
                }
            }
        }

        result
    }
}

/// Builder for constructing a DependencyGraph.
#[derive(Debug, Default)]
pub struct DependencyGraphBuilder {
    dependencies: BTreeMap<String, BTreeSet<String>>,
}

impl DependencyGraphBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a stage with its dependencies.
    pub fn add_stage<I, S>(mut self, name: impl Into<String>, depends_on: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies
            .entry(name.into())
            .or_default()
            .extend(depends_on.into_iter().map(Into::into));
        self
    }

    /// Build the dependency graph.
    ///
    /// Returns an error if any dependency references a non-existent stage.
    pub fn build(self) -> Result<DependencyGraph> {
        let mut problems = Vec::new();
        for (stage, deps) in &self.dependencies {
            for dep in deps {
                if !self.dependencies.contains_key(dep) {
                    problems.push(format!(
                        "stage '{}' depends on unknown stage '{}'",
                        stage, dep
                    ));
                }
            }
        }
        if !problems.is_empty() {
            return Err(DefinitionError::Invalid { problems }.into());
        }

        let mut dependents: BTreeMap<String, BTreeSet<String>> = self
            .dependencies
            .keys()
            .map(|stage| (stage.clone(), BTreeSet::new()))
            .collect();

        for (stage, deps) in &self.dependencies {
            for dep in deps {
                if let Some(set) = dependents.get_mut(dep) {
                    set.insert(stage.clone());
                }
            }
        }

        Ok(DependencyGraph {
            dependencies: self.dependencies,
            dependents,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NONE: [&str; 0] = [];

    fn position(order: &[String], name: &str) -> usize {
        order.iter().position(|s| s == name).unwrap()
    }

    #[test]
    fn builder_creates_empty_graph() {
        let graph = DependencyGraph::builder().build().unwrap();
        assert!(graph.is_empty());
        assert!(graph.order().unwrap().is_empty());
    }

    #[test]
    fn builder_tracks_dependents() {
        let graph = DependencyGraph::builder()
            .add_stage("setup", NONE)
            .add_stage("clean", ["setup"])
            .add_stage("codebook", ["setup"])
            .build()
            .unwrap();

        let dependents = graph.dependents_of("setup").unwrap();
        assert!(dependents.contains("clean"));
        assert!(dependents.contains("codebook"));
        assert!(graph.dependencies_of("clean").unwrap().contains("setup"));
    }

    #[test]
    fn builder_rejects_unknown_dependency() {
        let result = DependencyGraph::builder()
            .add_stage("analyze", ["missing"])
            .build();

        assert!(matches!(
            result,
            Err(ReprunError::Definition(DefinitionError::Invalid { .. }))
        ));
    }

    #[test]
    fn order_linear_chain() {
        let graph = DependencyGraph::builder()
            .add_stage("analyze", ["clean"])
            .add_stage("clean", ["setup"])
            .add_stage("setup", NONE)
            .build()
            .unwrap();

        assert_eq!(graph.order().unwrap(), vec!["setup", "clean", "analyze"]);
    }

    #[test]
    fn order_breaks_ties_lexicographically() {
        let graph = DependencyGraph::builder()
            .add_stage("zeta", NONE)
            .add_stage("alpha", NONE)
            .add_stage("mid", ["zeta"])
            .build()
            .unwrap();

        // alpha and zeta are both ready first; mid becomes ready after zeta
        assert_eq!(graph.order().unwrap(), vec!["alpha", "zeta", "mid"]);
    }

    #[test]
    fn order_diamond_dependency() {
        let graph = DependencyGraph::builder()
            .add_stage("a", NONE)
            .add_stage("b", ["a"])
            .add_stage("c", ["a"])
            .add_stage("d", ["b", "c"])
            .build()
            .unwrap();

        let order = graph.order().unwrap();
        assert!(position(&order, "a") < position(&order, "b"));
        assert!(position(&order, "a") < position(&order, "c"));
        assert!(position(&order, "b") < position(&order, "d"));
        assert!(position(&order, "c") < position(&order, "d"));
    }

    #[test]
    fn order_is_idempotent() {
        let graph = DependencyGraph::builder()
            .add_stage("export", ["analyze", "figures"])
            .add_stage("figures", ["clean"])
            .add_stage("analyze", ["clean"])
            .add_stage("clean", NONE)
            .build()
            .unwrap();

        let first = graph.order().unwrap();
        for _ in 0..5 {
            assert_eq!(graph.order().unwrap(), first);
        }
    }

    #[test]
    fn order_respects_every_edge_in_wide_graph() {
        let mut builder = DependencyGraph::builder();
        for i in 0..20 {
            let deps: Vec<String> = (0..i)
                .filter(|j| (i + j) % 3 == 0)
                .map(|j| format!("s{:02}", j))
                .collect();
            builder = builder.add_stage(format!("s{:02}", i), deps);
        }
        let graph = builder.build().unwrap();
        let order = graph.order().unwrap();

        for stage in graph.stages() {
            for dep in graph.dependencies_of(stage).unwrap() {
                assert!(position(&order, dep) < position(&order, stage));
            }
        }
    }

    #[test]
    fn order_reports_cycle_members() {
        let graph = DependencyGraph::builder()
            .add_stage("a", ["b"])
            .add_stage("b", ["a"])
            .add_stage("c", NONE)
            .build()
            .unwrap();

        match graph.order() {
            Err(ReprunError::Cycle { stages }) => {
                assert!(stages.contains(&"a".to_string()));
                assert!(stages.contains(&"b".to_string()));
                assert!(!stages.contains(&"c".to_string()));
            }
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn simple_cycle_returns_path() {
        let graph = DependencyGraph::builder()
            .add_stage("a", ["b"])
            .add_stage("b", ["a"])
            .build()
            .unwrap();

        let path = graph.find_cycle().unwrap();
        assert_eq!(path, vec!["a", "b", "a"]);
    }

    #[test]
    fn longer_cycle_returns_full_path() {
        let graph = DependencyGraph::builder()
            .add_stage("a", ["c"])
            .add_stage("b", ["a"])
            .add_stage("c", ["b"])
            .build()
            .unwrap();

        let path = graph.find_cycle().unwrap();
        assert_eq!(path.first(), path.last());
        assert!(path.contains(&"a".to_string()));
        assert!(path.contains(&"b".to_string()));
        assert!(path.contains(&"c".to_string()));
    }

    #[test]
    fn self_cycle_detected() {
        let graph = DependencyGraph::builder()
            .add_stage("a", ["a"])
            .build()
            .unwrap();

        assert_eq!(graph.find_cycle(), Some(vec!["a".to_string(), "a".to_string()]));
        assert!(graph.order().is_err());
    }

    #[test]
    fn no_cycle_returns_none() {
        let graph = DependencyGraph::builder()
            .add_stage("a", NONE)
            .add_stage("b", ["a"])
            .build()
            .unwrap();

        assert!(graph.find_cycle().is_none());
    }

    #[test]
    fn parallel_groups_diamond() {
        let graph = DependencyGraph::builder()
            .add_stage("a", NONE)
            .add_stage("b", ["a"])
            .add_stage("c", ["a"])
            .add_stage("d", ["b", "c"])
            .build()
            .unwrap();

        let groups = graph.parallel_groups().unwrap();
        assert_eq!(groups, vec![vec!["a"], vec!["b", "c"], vec!["d"]]);
    }

    #[test]
    fn parallel_groups_rejects_cycle() {
        let graph = DependencyGraph::builder()
            .add_stage("a", ["b"])
            .add_stage("b", ["a"])
            .build()
            .unwrap();

        assert!(matches!(
            graph.parallel_groups(),
            Err(ReprunError::Cycle { .. })
        ));
    }

    #[test]
    fn is_ready_tracks_completed_dependencies() {
        let graph = DependencyGraph::builder()
            .add_stage("a", NONE)
            .add_stage("b", ["a"])
            .build()
            .unwrap();

        let mut completed = BTreeSet::new();
        assert!(graph.is_ready("a", &completed));
        assert!(!graph.is_ready("b", &completed));

        completed.insert("a".to_string());
        assert!(graph.is_ready("b", &completed));
    }

    #[test]
    fn transitive_dependents_indirect() {
        let graph = DependencyGraph::builder()
            .add_stage("a", NONE)
            .add_stage("b", ["a"])
            .add_stage("c", ["b"])
            .add_stage("d", NONE)
            .build()
            .unwrap();

        let deps = graph.transitive_dependents("a");
        assert!(deps.contains("b"));
        assert!(deps.contains("c"));
        assert!(!deps.contains("d"));
        assert!(graph.transitive_dependents("c").is_empty());
    }
}
