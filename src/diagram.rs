//! In-memory diagram model: visible processes, their edges and process groups.

use std::collections::{BTreeMap, BTreeSet};

use crate::dot::{Cluster, DotEdge, DotGraph, DotNode};
use crate::error::{DiagramError, Result};
use crate::ir::{Process, ProcessGroup};
use crate::theme::{Attrs, Theme};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Start,
    End,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagramNode {
    pub name: String,
    pub description: Option<String>,
}

impl DiagramNode {
    fn from_process(process: &Process) -> Self {
        Self {
            name: process.name.clone(),
            description: process.description.clone(),
        }
    }
}

/// Edge set holding at most one entry per ordered pair.
///
/// A direct edge replaces a collapsed one for the same pair; a collapsed edge
/// never replaces a direct one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EdgeSet {
    edges: BTreeMap<(String, String), bool>,
}

impl EdgeSet {
    pub fn insert(&mut self, from: &str, to: &str, has_hidden: bool) {
        let key = (from.to_string(), to.to_string());
        match self.edges.get_mut(&key) {
            Some(existing) => *existing = *existing && has_hidden,
            None => {
                self.edges.insert(key, has_hidden);
            }
        }
    }

    pub fn contains(&self, from: &str, to: &str, has_hidden: bool) -> bool {
        self.edges
            .get(&(from.to_string(), to.to_string()))
            .is_some_and(|flag| *flag == has_hidden)
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// `(from, to, has_hidden)` triples.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, bool)> {
        self.edges
            .iter()
            .map(|((from, to), has_hidden)| (from.as_str(), to.as_str(), *has_hidden))
    }
}

#[derive(Debug, Clone)]
pub struct Group {
    pub name: String,
    pub label: String,
    pub nodes: BTreeMap<String, DiagramNode>,
    pub edges: EdgeSet,
}

impl Group {
    pub fn new(group: &ProcessGroup) -> Self {
        Self {
            name: group.name.clone(),
            label: group.display_name().to_string(),
            nodes: BTreeMap::new(),
            edges: EdgeSet::default(),
        }
    }

    pub fn add_node(&mut self, node: DiagramNode) {
        self.nodes.insert(node.name.clone(), node);
    }

    pub fn add_edge(&mut self, from: &str, to: &str, has_hidden: bool) {
        self.edges.insert(from, to, has_hidden);
    }

    fn build(&self, diagram: &Diagram) -> Cluster {
        let theme = &diagram.theme.procgroup;
        let mut attrs = theme.attrs.clone();
        attrs.insert("label".to_string(), self.label.clone());

        let mut edge_hidden = diagram.theme.edge_hidden.clone();
        edge_hidden.extend(theme.edge_hidden.clone());

        Cluster {
            name: format!("cluster_{}", self.name),
            attrs,
            node_defaults: theme.node.clone(),
            edge_defaults: theme.edge.clone(),
            nodes: self.nodes.values().map(|node| diagram.build_node(node)).collect(),
            edges: self
                .edges
                .iter()
                .map(|(from, to, has_hidden)| build_edge(from, to, has_hidden.then_some(&edge_hidden)))
                .collect(),
        }
    }
}

/// Diagram model populated once per run, then turned into a [`DotGraph`].
#[derive(Debug, Clone)]
pub struct Diagram {
    pub title: String,
    /// Shown as the tooltip of the whole graph.
    pub description: Option<String>,
    pub theme: Theme,
    pub nodes: BTreeMap<String, DiagramNode>,
    pub starts: BTreeSet<String>,
    pub ends: BTreeSet<String>,
    pub groups: BTreeMap<String, Group>,
    pub edges: EdgeSet,
}

impl Diagram {
    pub fn new(title: &str, theme: Theme) -> Self {
        Self {
            title: title.trim().to_string(),
            description: None,
            theme,
            nodes: BTreeMap::new(),
            starts: BTreeSet::new(),
            ends: BTreeSet::new(),
            groups: BTreeMap::new(),
            edges: EdgeSet::default(),
        }
    }

    /// Register a visible process, inside its group when it has one.
    pub fn add_node(&mut self, process: &Process, group: Option<&ProcessGroup>, role: Option<Role>) {
        match role {
            Some(Role::Start) => {
                self.starts.insert(process.name.clone());
            }
            Some(Role::End) => {
                self.ends.insert(process.name.clone());
            }
            None => {}
        }

        let node = DiagramNode::from_process(process);
        match group {
            Some(group) => self
                .groups
                .entry(group.name.clone())
                .or_insert_with(|| Group::new(group))
                .add_node(node),
            None => {
                self.nodes.insert(node.name.clone(), node);
            }
        }
    }

    /// Add an edge between two registered processes.
    ///
    /// With a group the edge is drawn inside that group's cluster, whatever
    /// container the endpoints live in.
    pub fn add_edge(
        &mut self,
        from: &str,
        to: &str,
        group: Option<&ProcessGroup>,
        has_hidden: bool,
    ) -> Result<()> {
        for name in [from, to] {
            if !self.contains_node(name) {
                return Err(DiagramError::UnregisteredNode {
                    name: name.to_string(),
                });
            }
        }
        match group {
            Some(group) => self
                .groups
                .entry(group.name.clone())
                .or_insert_with(|| Group::new(group))
                .add_edge(from, to, has_hidden),
            None => self.edges.insert(from, to, has_hidden),
        }
        Ok(())
    }

    pub fn contains_node(&self, name: &str) -> bool {
        self.nodes.contains_key(name) || self.groups.values().any(|group| group.nodes.contains_key(name))
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len() + self.groups.values().map(|group| group.edges.len()).sum::<usize>()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len() + self.groups.values().map(|group| group.nodes.len()).sum::<usize>()
    }

    /// Apply the theme and produce the drawable graph.
    pub fn build(&self) -> DotGraph {
        let mut graph = DotGraph::new(self.title.clone());
        graph.attrs = self.theme.graph.clone();
        // blank second line keeps the title off the drawing
        graph
            .attrs
            .insert("label".to_string(), format!("{}\n ", self.title));
        if let Some(description) = &self.description {
            graph.attrs.insert("tooltip".to_string(), description.clone());
        }
        graph.node_defaults = self.theme.node.clone();
        graph.edge_defaults = self.theme.edge.clone();

        graph.clusters = self.groups.values().map(|group| group.build(self)).collect();
        graph.nodes = self.nodes.values().map(|node| self.build_node(node)).collect();
        graph.edges = self
            .edges
            .iter()
            .map(|(from, to, has_hidden)| build_edge(from, to, has_hidden.then_some(&self.theme.edge_hidden)))
            .collect();
        graph
    }

    fn build_node(&self, node: &DiagramNode) -> DotNode {
        let mut attrs = if self.starts.contains(&node.name) {
            self.theme.start.clone()
        } else if self.ends.contains(&node.name) {
            self.theme.end.clone()
        } else {
            Attrs::new()
        };
        if let Some(description) = &node.description {
            attrs.insert("tooltip".to_string(), description.clone());
        }
        DotNode {
            id: node.name.clone(),
            attrs,
        }
    }
}

fn build_edge(from: &str, to: &str, style: Option<&Attrs>) -> DotEdge {
    DotEdge {
        from: from.to_string(),
        to: to.to_string(),
        attrs: style.cloned().unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;

    fn edges(set: &EdgeSet) -> BTreeSet<(String, String, bool)> {
        set.iter()
            .map(|(from, to, hidden)| (from.to_string(), to.to_string(), hidden))
            .collect()
    }

    fn diagram_with(names: &[&str]) -> Diagram {
        let mut diagram = Diagram::new(" pipeline ", Theme::default_theme());
        for name in names {
            diagram.add_node(&Process::new(*name), None, None);
        }
        diagram
    }

    #[test]
    fn direct_edge_supersedes_collapsed_edge() {
        let mut diagram = diagram_with(&["A", "B"]);
        diagram.add_edge("A", "B", None, true).unwrap();
        diagram.add_edge("A", "B", None, false).unwrap();
        assert_eq!(
            edges(&diagram.edges),
            BTreeSet::from([("A".to_string(), "B".to_string(), false)])
        );
    }

    #[test]
    fn collapsed_edge_never_supersedes_direct_edge() {
        let mut diagram = diagram_with(&["A", "B"]);
        diagram.add_edge("A", "B", None, false).unwrap();
        diagram.add_edge("A", "B", None, true).unwrap();
        assert_eq!(diagram.edges.len(), 1);
        assert!(diagram.edges.contains("A", "B", false));
        assert!(!diagram.edges.contains("A", "B", true));
    }

    #[test]
    fn group_edges_follow_the_same_rule() {
        let group = ProcessGroup::new("PG");
        let mut diagram = Diagram::new("p", Theme::default_theme());
        diagram.add_node(&Process::new("C"), Some(&group), None);
        diagram.add_node(&Process::new("D"), Some(&group), None);
        diagram.add_edge("C", "D", Some(&group), true).unwrap();
        diagram.add_edge("C", "D", Some(&group), false).unwrap();
        diagram.add_edge("C", "D", Some(&group), true).unwrap();

        let group = &diagram.groups["PG"];
        assert_eq!(
            edges(&group.edges),
            BTreeSet::from([("C".to_string(), "D".to_string(), false)])
        );
        assert!(diagram.edges.is_empty());
    }

    #[test]
    fn nodes_live_in_exactly_one_container() {
        let group = ProcessGroup::new("PG");
        let mut diagram = Diagram::new("p", Theme::default_theme());
        diagram.add_node(&Process::new("A"), None, Some(Role::Start));
        diagram.add_node(&Process::new("C"), Some(&group), Some(Role::End));

        assert!(diagram.nodes.contains_key("A"));
        assert!(!diagram.nodes.contains_key("C"));
        assert!(diagram.groups["PG"].nodes.contains_key("C"));
        assert_eq!(diagram.node_count(), 2);
        assert!(diagram.starts.contains("A"));
        assert!(diagram.ends.contains("C"));
    }

    #[test]
    fn group_argument_scopes_the_edge() {
        let group = ProcessGroup::new("PG");
        let mut diagram = diagram_with(&["A", "B"]);
        diagram.add_edge("A", "B", Some(&group), false).unwrap();
        assert!(diagram.edges.is_empty());
        assert!(diagram.groups["PG"].edges.contains("A", "B", false));
    }

    #[test]
    fn edges_require_registered_endpoints() {
        let mut diagram = diagram_with(&["A"]);
        let err = diagram.add_edge("A", "Z", None, false).unwrap_err();
        assert!(matches!(err, DiagramError::UnregisteredNode { ref name } if name == "Z"));
    }

    #[test]
    fn build_applies_roles_and_tooltips() {
        let mut diagram = Diagram::new("p", Theme::dark());
        diagram.add_node(&Process::new("A").describe("first step"), None, Some(Role::Start));
        diagram.add_node(&Process::new("B"), None, None);
        diagram.add_node(&Process::new("C"), None, Some(Role::End));
        diagram.add_edge("A", "B", None, false).unwrap();
        diagram.add_edge("B", "C", None, true).unwrap();

        let graph = diagram.build();
        assert_eq!(graph.attrs.get("label").map(String::as_str), Some("p\n "));
        assert!(!graph.attrs.contains_key("tooltip"));
        assert_eq!(graph.attrs.get("bgcolor").map(String::as_str), Some("#333333"));
        assert_eq!(graph.node_defaults, Theme::dark().node);
        assert_eq!(graph.edge_defaults, Theme::dark().edge);

        let a = graph.node_attrs("A").unwrap();
        assert_eq!(a.get("shape").map(String::as_str), Some("diamond"));
        assert_eq!(a.get("tooltip").map(String::as_str), Some("first step"));
        let b = graph.node_attrs("B").unwrap();
        assert_eq!(b.get("shape").map(String::as_str), Some("box"));
        assert!(!b.contains_key("tooltip"));
        let c = graph.node_attrs("C").unwrap();
        assert_eq!(c.get("shape").map(String::as_str), Some("rectangle"));

        let direct = graph.edge_attrs("A", "B").unwrap();
        assert_eq!(direct.get("style"), None);
        let collapsed = graph.edge_attrs("B", "C").unwrap();
        assert_eq!(collapsed.get("style").map(String::as_str), Some("dashed"));
        assert_eq!(collapsed.get("color").map(String::as_str), Some("#eeeeee"));
    }

    #[test]
    fn clusters_use_group_theme_with_hidden_edge_fallback() {
        let group = ProcessGroup::new("PG").with_label("Process Group");
        let mut diagram = Diagram::new("p", Theme::default_theme());
        diagram.add_node(&Process::new("C"), Some(&group), None);
        diagram.add_node(&Process::new("D"), Some(&group), None);
        diagram.add_edge("C", "D", Some(&group), true).unwrap();

        let graph = diagram.build();
        assert_eq!(graph.clusters.len(), 1);
        let cluster = &graph.clusters[0];
        assert_eq!(cluster.name, "cluster_PG");
        assert_eq!(cluster.attrs.get("label").map(String::as_str), Some("Process Group"));
        assert_eq!(cluster.attrs.get("color").map(String::as_str), Some("#eeeeee"));
        assert_eq!(cluster.edge_defaults.get("arrowsize").map(String::as_str), Some("0.8"));
        // procgroup.edge_hidden is empty, so the top-level bundle applies
        assert_eq!(cluster.edges[0].attrs.get("style").map(String::as_str), Some("dashed"));

        let node_ids: BTreeSet<&str> = cluster.nodes.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(node_ids, BTreeSet::from(["C", "D"]));
        assert!(graph.nodes.is_empty());
    }
}
