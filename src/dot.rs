//! Backend-neutral drawable graph, written out as Graphviz DOT.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::theme::Attrs;

static PLAIN_ID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:[A-Za-z_\x{80}-\x{10FFFF}][A-Za-z0-9_\x{80}-\x{10FFFF}]*|-?(?:\.[0-9]+|[0-9]+(?:\.[0-9]*)?))$")
        .expect("valid DOT identifier pattern")
});

const KEYWORDS: [&str; 6] = ["node", "edge", "graph", "digraph", "subgraph", "strict"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DotNode {
    pub id: String,
    pub attrs: Attrs,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DotEdge {
    pub from: String,
    pub to: String,
    pub attrs: Attrs,
}

/// Labeled sub-cluster; Graphviz only draws a boundary for names starting with `cluster`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Cluster {
    pub name: String,
    pub attrs: Attrs,
    pub node_defaults: Attrs,
    pub edge_defaults: Attrs,
    pub nodes: Vec<DotNode>,
    pub edges: Vec<DotEdge>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DotGraph {
    pub name: String,
    pub attrs: Attrs,
    pub node_defaults: Attrs,
    pub edge_defaults: Attrs,
    pub clusters: Vec<Cluster>,
    pub nodes: Vec<DotNode>,
    pub edges: Vec<DotEdge>,
}

impl DotGraph {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Every node with the cluster that holds it, if any.
    pub fn all_nodes(&self) -> impl Iterator<Item = (&DotNode, Option<&Cluster>)> {
        self.clusters
            .iter()
            .flat_map(|cluster| cluster.nodes.iter().map(move |node| (node, Some(cluster))))
            .chain(self.nodes.iter().map(|node| (node, None)))
    }

    /// Every edge with the cluster it was declared in, if any.
    pub fn all_edges(&self) -> impl Iterator<Item = (&DotEdge, Option<&Cluster>)> {
        self.clusters
            .iter()
            .flat_map(|cluster| cluster.edges.iter().map(move |edge| (edge, Some(cluster))))
            .chain(self.edges.iter().map(|edge| (edge, None)))
    }

    /// Attributes a node ends up with: graph defaults, then cluster defaults, then its own.
    pub fn node_attrs(&self, id: &str) -> Option<Attrs> {
        let (node, cluster) = self.all_nodes().find(|(node, _)| node.id == id)?;
        let mut attrs = self.node_defaults.clone();
        if let Some(cluster) = cluster {
            attrs.extend(cluster.node_defaults.clone());
        }
        attrs.extend(node.attrs.clone());
        Some(attrs)
    }

    /// Attributes of the first edge `from -> to`, resolved like [`DotGraph::node_attrs`].
    pub fn edge_attrs(&self, from: &str, to: &str) -> Option<Attrs> {
        let (edge, cluster) = self
            .all_edges()
            .find(|(edge, _)| edge.from == from && edge.to == to)?;
        Some(self.resolve_edge(edge, cluster))
    }

    pub(crate) fn resolve_edge(&self, edge: &DotEdge, cluster: Option<&Cluster>) -> Attrs {
        let mut attrs = self.edge_defaults.clone();
        if let Some(cluster) = cluster {
            attrs.extend(cluster.edge_defaults.clone());
        }
        attrs.extend(edge.attrs.clone());
        attrs
    }

    pub fn to_dot(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("digraph {} {{\n", quote_id(&self.name)));
        write_defaults(&mut out, "\t", &self.attrs, &self.node_defaults, &self.edge_defaults);
        for cluster in &self.clusters {
            out.push_str(&format!("\tsubgraph {} {{\n", quote_id(&cluster.name)));
            write_defaults(
                &mut out,
                "\t\t",
                &cluster.attrs,
                &cluster.node_defaults,
                &cluster.edge_defaults,
            );
            write_body(&mut out, "\t\t", &cluster.nodes, &cluster.edges);
            out.push_str("\t}\n");
        }
        write_body(&mut out, "\t", &self.nodes, &self.edges);
        out.push_str("}\n");
        out
    }
}

impl fmt::Display for DotGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_dot())
    }
}

fn write_defaults(out: &mut String, indent: &str, graph: &Attrs, node: &Attrs, edge: &Attrs) {
    for (key, value) in graph {
        out.push_str(&format!("{indent}{}={}\n", quote_id(key), quote_id(value)));
    }
    if !node.is_empty() {
        out.push_str(&format!("{indent}node{}\n", attr_list(node)));
    }
    if !edge.is_empty() {
        out.push_str(&format!("{indent}edge{}\n", attr_list(edge)));
    }
}

fn write_body(out: &mut String, indent: &str, nodes: &[DotNode], edges: &[DotEdge]) {
    for node in nodes {
        out.push_str(&format!("{indent}{}{}\n", quote_id(&node.id), attr_list(&node.attrs)));
    }
    for edge in edges {
        out.push_str(&format!(
            "{indent}{} -> {}{}\n",
            quote_id(&edge.from),
            quote_id(&edge.to),
            attr_list(&edge.attrs)
        ));
    }
}

fn attr_list(attrs: &Attrs) -> String {
    if attrs.is_empty() {
        return String::new();
    }
    let parts: Vec<String> = attrs
        .iter()
        .map(|(key, value)| format!("{}={}", quote_id(key), quote_id(value)))
        .collect();
    format!(" [{}]", parts.join(" "))
}

/// Quote a DOT identifier unless it is a plain ID or numeral.
pub fn quote_id(id: &str) -> String {
    if PLAIN_ID.is_match(id) && !KEYWORDS.contains(&id.to_ascii_lowercase().as_str()) {
        return id.to_string();
    }
    let mut quoted = String::with_capacity(id.len() + 2);
    quoted.push('"');
    let mut chars = id.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '"' => quoted.push_str("\\\""),
            '\\' => {
                // keep DOT escapes like \n and \l, escape a lone trailing backslash
                if chars.peek().is_some() {
                    quoted.push('\\');
                } else {
                    quoted.push_str("\\\\");
                }
            }
            '\n' => quoted.push_str("\\n"),
            other => quoted.push(other),
        }
    }
    quoted.push('"');
    quoted
}
