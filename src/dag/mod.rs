//! Dependency graph: insertion-ordered steps, validation, topological
//! ordering, and level partitioning.
//!
//! Forward references are legal at insertion time; dependency
//! resolution and acyclicity are checked by [`Dag::validate`], which
//! is idempotent and never mutates the graph.

use crate::errors::{
    CycleDetectedError, DuplicateStepError, FlowdagError, MissingDependencyError,
};
use crate::step::Step;
use std::collections::{HashMap, HashSet};

/// A directed acyclic graph of steps, in insertion order.
#[derive(Debug, Clone, Default)]
pub struct Dag {
    steps: HashMap<String, Step>,
    order: Vec<String>,
}

impl Dag {
    /// Creates an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a step to the graph.
    ///
    /// Dependencies may reference steps added later; they are checked
    /// by [`Dag::validate`], not here.
    ///
    /// # Errors
    ///
    /// Returns [`DuplicateStepError`] if a step of the same name is
    /// already registered.
    pub fn add(&mut self, step: Step) -> Result<(), DuplicateStepError> {
        if self.steps.contains_key(step.name()) {
            return Err(DuplicateStepError::new(step.name()));
        }
        self.order.push(step.name().to_string());
        self.steps.insert(step.name().to_string(), step);
        Ok(())
    }

    /// Looks up a step by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Step> {
        self.steps.get(name)
    }

    /// Returns the number of steps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Returns true if the graph has no steps.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Iterates step names in insertion order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    /// Iterates steps in insertion order.
    pub fn steps(&self) -> impl Iterator<Item = &Step> {
        self.order.iter().filter_map(|name| self.steps.get(name))
    }

    /// Returns the steps with no dependencies, in insertion order.
    #[must_use]
    pub fn roots(&self) -> Vec<&Step> {
        self.steps()
            .filter(|step| step.dependencies().is_empty())
            .collect()
    }

    /// Returns the steps no other step depends on, in insertion order.
    #[must_use]
    pub fn leaves(&self) -> Vec<&Step> {
        let referenced: HashSet<&str> = self
            .steps()
            .flat_map(|step| step.dependencies().iter().map(String::as_str))
            .collect();
        self.steps()
            .filter(|step| !referenced.contains(step.name()))
            .collect()
    }

    /// Validates dependency resolution and acyclicity.
    ///
    /// Idempotent: repeated calls on an unchanged graph return the
    /// same answer and never mutate state.
    ///
    /// # Errors
    ///
    /// Returns [`MissingDependencyError`] for the first unresolved
    /// dependency in insertion order, then [`CycleDetectedError`] if
    /// the graph contains a directed cycle.
    pub fn validate(&self) -> Result<(), FlowdagError> {
        for name in &self.order {
            let step = &self.steps[name];
            for dep in step.dependencies() {
                if !self.steps.contains_key(dep) {
                    return Err(MissingDependencyError::new(name, dep).into());
                }
            }
        }
        self.detect_cycles()?;
        Ok(())
    }

    /// Returns a topological ordering of the steps.
    ///
    /// Among steps whose dependencies have all been emitted, insertion
    /// order breaks the tie, so the ordering is deterministic.
    ///
    /// # Errors
    ///
    /// Returns the same errors as [`Dag::validate`].
    pub fn sorted_steps(&self) -> Result<Vec<&Step>, FlowdagError> {
        self.validate()?;

        let mut emitted: HashSet<&str> = HashSet::new();
        let mut sorted: Vec<&Step> = Vec::with_capacity(self.order.len());

        while sorted.len() < self.order.len() {
            let mut progressed = false;
            for name in &self.order {
                if emitted.contains(name.as_str()) {
                    continue;
                }
                let step = &self.steps[name];
                if step
                    .dependencies()
                    .iter()
                    .all(|dep| emitted.contains(dep.as_str()))
                {
                    emitted.insert(name);
                    sorted.push(step);
                    progressed = true;
                }
            }
            // Unreachable after a successful cycle check.
            if !progressed {
                let remaining: Vec<String> = self
                    .order
                    .iter()
                    .filter(|name| !emitted.contains(name.as_str()))
                    .cloned()
                    .collect();
                return Err(CycleDetectedError::new(remaining).into());
            }
        }

        Ok(sorted)
    }

    /// Partitions the steps into levels.
    ///
    /// Level 0 holds every step with no dependencies; a step's level
    /// is one more than the deepest level among its dependencies.
    /// Insertion order is preserved within a level.
    ///
    /// # Errors
    ///
    /// Returns the same errors as [`Dag::validate`].
    pub fn levels(&self) -> Result<Vec<Vec<&Step>>, FlowdagError> {
        let sorted = self.sorted_steps()?;

        let mut level_of: HashMap<&str, usize> = HashMap::new();
        for step in &sorted {
            let level = step
                .dependencies()
                .iter()
                .map(|dep| level_of.get(dep.as_str()).copied().unwrap_or(0) + 1)
                .max()
                .unwrap_or(0);
            level_of.insert(step.name(), level);
        }

        let depth = level_of.values().max().map_or(0, |max| max + 1);
        let mut levels: Vec<Vec<&Step>> = vec![Vec::new(); depth];
        for name in &self.order {
            let step = &self.steps[name];
            levels[level_of[step.name()]].push(step);
        }

        Ok(levels)
    }

    /// Renders the graph as a Mermaid flowchart.
    ///
    /// One `dep --> step` edge per declared dependency, in insertion
    /// order, followed by a bare line for each step with neither
    /// dependencies nor dependents.
    #[must_use]
    pub fn to_mermaid(&self) -> String {
        let referenced: HashSet<&str> = self
            .steps()
            .flat_map(|step| step.dependencies().iter().map(String::as_str))
            .collect();

        let mut out = String::from("graph TD\n");
        for name in &self.order {
            for dep in self.steps[name].dependencies() {
                out.push_str(&format!("  {dep} --> {name}\n"));
            }
        }
        for name in &self.order {
            let step = &self.steps[name];
            if step.dependencies().is_empty() && !referenced.contains(name.as_str()) {
                out.push_str(&format!("  {name}\n"));
            }
        }
        out
    }

    fn detect_cycles(&self) -> Result<(), CycleDetectedError> {
        let mut visited: HashSet<String> = HashSet::new();
        let mut rec_stack: HashSet<String> = HashSet::new();
        let mut path: Vec<String> = Vec::new();

        for name in &self.order {
            if !visited.contains(name) {
                if let Some(cycle) = self.dfs_cycle(name, &mut visited, &mut rec_stack, &mut path) {
                    return Err(CycleDetectedError::new(cycle));
                }
            }
        }

        Ok(())
    }

    fn dfs_cycle(
        &self,
        node: &str,
        visited: &mut HashSet<String>,
        rec_stack: &mut HashSet<String>,
        path: &mut Vec<String>,
    ) -> Option<Vec<String>> {
        visited.insert(node.to_string());
        rec_stack.insert(node.to_string());
        path.push(node.to_string());

        if let Some(step) = self.steps.get(node) {
            for dep in step.dependencies() {
                if !visited.contains(dep) {
                    if let Some(cycle) = self.dfs_cycle(dep, visited, rec_stack, path) {
                        return Some(cycle);
                    }
                } else if rec_stack.contains(dep) {
                    let cycle_start = path.iter().position(|n| n == dep).unwrap_or(0);
                    let mut cycle: Vec<String> = path[cycle_start..].to_vec();
                    cycle.push(dep.clone());
                    return Some(cycle);
                }
            }
        }

        path.pop();
        rec_stack.remove(node);
        None
    }
}
