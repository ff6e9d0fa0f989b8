//! Dependency graph for derived roles (§4.4): Kahn's algorithm for
//! topological ordering plus DFS-based cycle detection, so that a bundle
//! with a circular derived-role dependency is rejected at load time.

use std::collections::{HashMap, HashSet, VecDeque};

use thiserror::Error;

use super::types::DerivedRole;

#[derive(Debug, Error, PartialEq)]
pub enum GraphError {
    #[error("circular dependency detected: {0}")]
    CircularDependency(String),
    #[error("duplicate derived role name: {0}")]
    DuplicateRole(String),
    #[error("invalid derived role: {0}")]
    InvalidRole(String),
}

#[derive(Debug, Clone)]
struct GraphNode {
    dependencies: Vec<String>,
}

impl GraphNode {
    fn new() -> Self {
        Self { dependencies: Vec::new() }
    }

    fn add_dependency(&mut self, depends_on: String) {
        if !self.dependencies.contains(&depends_on) {
            self.dependencies.push(depends_on);
        }
    }
}

/// Dependency graph keyed by derived-role name. An edge `A -> B` means `A`
/// must be evaluated after `B` (`A` depends on `B`).
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    nodes: HashMap<String, GraphNode>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self { nodes: HashMap::new() }
    }

    fn add_node(&mut self, name: &str) {
        self.nodes.entry(name.to_string()).or_insert_with(GraphNode::new);
    }

    fn add_dependency_edge(&mut self, from_role: &str, to_role: &str) {
        if let Some(node) = self.nodes.get_mut(from_role) {
            node.add_dependency(to_role.to_string());
        }
    }

    /// Kahn's algorithm: dependencies first, then roles depending on them.
    pub fn resolve_order(&self) -> Result<Vec<String>, GraphError> {
        if self.nodes.is_empty() {
            return Ok(Vec::new());
        }

        let mut reverse_edges: HashMap<String, Vec<String>> = HashMap::new();
        let mut in_degree: HashMap<String, usize> = HashMap::new();
        for name in self.nodes.keys() {
            reverse_edges.insert(name.clone(), Vec::new());
            in_degree.insert(name.clone(), 0);
        }
        for (name, node) in &self.nodes {
            for dep in &node.dependencies {
                if let Some(edges) = reverse_edges.get_mut(dep) {
                    edges.push(name.clone());
                }
                if let Some(degree) = in_degree.get_mut(name) {
                    *degree += 1;
                }
            }
        }

        let mut queue: VecDeque<String> =
            in_degree.iter().filter(|(_, &d)| d == 0).map(|(n, _)| n.clone()).collect();
        let mut sorted = Vec::new();

        while let Some(current) = queue.pop_front() {
            sorted.push(current.clone());
            if let Some(dependents) = reverse_edges.get(&current) {
                for dependent in dependents {
                    if let Some(degree) = in_degree.get_mut(dependent) {
                        *degree -= 1;
                        if *degree == 0 {
                            queue.push_back(dependent.clone());
                        }
                    }
                }
            }
        }

        if sorted.len() != self.nodes.len() {
            let cycles = self.find_cycles_dfs()?;
            let detail = cycles.first().map(|c| c.join(" -> ")).unwrap_or_else(|| "unknown cycle".to_string());
            return Err(GraphError::CircularDependency(detail));
        }

        Ok(sorted)
    }

    pub fn detect_cycles(&self) -> Result<Vec<Vec<String>>, GraphError> {
        self.find_cycles_dfs()
    }

    fn find_cycles_dfs(&self) -> Result<Vec<Vec<String>>, GraphError> {
        let mut state: HashMap<String, u8> = self.nodes.keys().map(|n| (n.clone(), 0)).collect();
        let mut cycles = Vec::new();
        let names: Vec<String> = self.nodes.keys().cloned().collect();
        for start in &names {
            if state[start] == 0 {
                let mut path = Vec::new();
                self.dfs_cycle_detect(start, &mut state, &mut path, &mut cycles)?;
            }
        }
        Ok(cycles)
    }

    fn dfs_cycle_detect(
        &self,
        node: &str,
        state: &mut HashMap<String, u8>,
        path: &mut Vec<String>,
        cycles: &mut Vec<Vec<String>>,
    ) -> Result<(), GraphError> {
        match state.get(node) {
            Some(1) => {
                if let Some(start) = path.iter().position(|n| n == node) {
                    let cycle: Vec<String> =
                        path[start..].iter().chain(std::iter::once(&node.to_string())).cloned().collect();
                    let joined = cycle.join(" -> ");
                    cycles.push(cycle);
                    return Err(GraphError::CircularDependency(joined));
                }
                return Ok(());
            }
            Some(2) => return Ok(()),
            _ => {}
        }

        state.insert(node.to_string(), 1);
        path.push(node.to_string());

        if let Some(graph_node) = self.nodes.get(node) {
            for dep in &graph_node.dependencies {
                self.dfs_cycle_detect(dep, state, path, cycles)?;
            }
        }

        state.insert(node.to_string(), 2);
        path.pop();
        Ok(())
    }
}

impl Default for DependencyGraph {
    fn default() -> Self {
        Self::new()
    }
}

/// Builds a [`DependencyGraph`] from a full set of [`DerivedRole`] definitions.
///
/// Edges come from two sources: a role's `parent_roles` naming another
/// derived role, and a role's `condition` text syntactically mentioning
/// another derived role's name (§4.4's "detected syntactically by
/// identifier scan").
#[derive(Debug, Clone, Default)]
pub struct DependencyGraphBuilder {
    roles: Vec<DerivedRole>,
}

impl DependencyGraphBuilder {
    pub fn new() -> Self {
        Self { roles: Vec::new() }
    }

    pub fn add_role(&mut self, role: DerivedRole) -> Result<(), GraphError> {
        role.validate().map_err(|e| GraphError::InvalidRole(e.to_string()))?;
        if self.roles.iter().any(|r| r.name == role.name) {
            return Err(GraphError::DuplicateRole(role.name.clone()));
        }
        self.roles.push(role);
        Ok(())
    }

    pub fn build(self) -> Result<DependencyGraph, GraphError> {
        let mut graph = DependencyGraph::new();
        let derived_names: HashSet<String> = self.roles.iter().map(|r| r.name.clone()).collect();

        for role in &self.roles {
            graph.add_node(&role.name);
        }

        for role in &self.roles {
            for parent in &role.parent_roles {
                if derived_names.contains(parent) {
                    graph.add_dependency_edge(&role.name, parent);
                }
            }
            if let Some(condition) = &role.condition {
                for other in &derived_names {
                    if other != &role.name && mentions_identifier(condition, other) {
                        graph.add_dependency_edge(&role.name, other);
                    }
                }
            }
        }

        graph.detect_cycles()?;
        Ok(graph)
    }
}

/// Whole-word scan for `needle` inside `haystack`, treating `[A-Za-z0-9_]`
/// as identifier characters.
fn mentions_identifier(haystack: &str, needle: &str) -> bool {
    let bytes = haystack.as_bytes();
    let needle_len = needle.len();
    if needle_len == 0 {
        return false;
    }
    let mut start = 0;
    while let Some(pos) = haystack[start..].find(needle) {
        let abs = start + pos;
        let before_ok = abs == 0 || !is_ident_char(bytes[abs - 1]);
        let after = abs + needle_len;
        let after_ok = after >= bytes.len() || !is_ident_char(bytes[after]);
        if before_ok && after_ok {
            return true;
        }
        start = abs + 1;
    }
    false
}

fn is_ident_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}
