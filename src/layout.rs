use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap, HashMap, HashSet};

use crate::config::LayoutConfig;
use crate::dot::DotGraph;
use crate::text_metrics::measure_text_width;
use crate::theme::Attrs;

#[derive(Debug, Clone)]
pub struct TextBlock {
    pub lines: Vec<String>,
    pub width: f32,
    pub height: f32,
    pub font_size: f32,
    pub font_family: String,
}

#[derive(Debug, Clone)]
pub struct NodeLayout {
    pub id: String,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub label: TextBlock,
    pub attrs: Attrs,
    pub cluster: Option<usize>,
}

impl NodeLayout {
    pub fn center(&self) -> (f32, f32) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}

#[derive(Debug, Clone)]
pub struct EdgeLayout {
    pub from: String,
    pub to: String,
    pub points: Vec<(f32, f32)>,
    pub attrs: Attrs,
}

#[derive(Debug, Clone)]
pub struct ClusterLayout {
    pub name: String,
    pub label: TextBlock,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub attrs: Attrs,
}

#[derive(Debug, Clone)]
pub struct Layout {
    pub nodes: BTreeMap<String, NodeLayout>,
    pub edges: Vec<EdgeLayout>,
    pub clusters: Vec<ClusterLayout>,
    pub title: Option<(f32, f32, TextBlock)>,
    pub graph_attrs: Attrs,
    pub width: f32,
    pub height: f32,
}

/// Lay the graph out top-down: one row per rank, cluster members kept side by side.
pub fn compute_layout(graph: &DotGraph, config: &LayoutConfig) -> Layout {
    let mut node_ids: Vec<String> = Vec::new();
    let mut node_cluster: HashMap<String, Option<usize>> = HashMap::new();
    let mut node_attrs: HashMap<String, Attrs> = HashMap::new();
    for (node, _) in graph.all_nodes() {
        if node_cluster.contains_key(&node.id) {
            continue;
        }
        let cluster = graph
            .clusters
            .iter()
            .position(|cluster| cluster.nodes.iter().any(|n| n.id == node.id));
        node_ids.push(node.id.clone());
        node_cluster.insert(node.id.clone(), cluster);
        node_attrs.insert(node.id.clone(), graph.node_attrs(&node.id).unwrap_or_default());
    }
    let node_order: HashMap<String, usize> = node_ids
        .iter()
        .enumerate()
        .map(|(idx, id)| (id.clone(), idx))
        .collect();

    let edges: Vec<(String, String, Attrs)> = graph
        .all_edges()
        .filter(|(edge, _)| node_order.contains_key(&edge.from) && node_order.contains_key(&edge.to))
        .map(|(edge, cluster)| {
            (
                edge.from.clone(),
                edge.to.clone(),
                graph.resolve_edge(edge, cluster),
            )
        })
        .collect();
    let links: Vec<(String, String)> = edges
        .iter()
        .map(|(from, to, _)| (from.clone(), to.clone()))
        .collect();

    let ranks = compute_ranks(&node_ids, &links, &node_order);
    let max_rank = ranks.values().copied().max().unwrap_or(0);
    let mut rank_nodes: Vec<Vec<String>> = vec![Vec::new(); max_rank + 1];
    for id in &node_ids {
        rank_nodes[ranks.get(id).copied().unwrap_or(0)].push(id.clone());
    }
    order_rank_nodes(&mut rank_nodes, &links, &node_order, config.order_passes);
    for bucket in rank_nodes.iter_mut() {
        keep_clusters_together(bucket, &node_cluster);
    }

    let mut nodes: BTreeMap<String, NodeLayout> = BTreeMap::new();
    for id in &node_ids {
        let attrs = node_attrs.remove(id).unwrap_or_default();
        let label_text = attrs.get("label").cloned().unwrap_or_else(|| id.clone());
        let label = measure_label(&label_text, &attrs, config);
        let (width, height) = node_size(&label, &attrs, config);
        nodes.insert(
            id.clone(),
            NodeLayout {
                id: id.clone(),
                x: 0.0,
                y: 0.0,
                width,
                height,
                label,
                attrs,
                cluster: node_cluster.get(id).copied().flatten(),
            },
        );
    }

    let graph_attrs = graph.attrs.clone();
    let title = graph_attrs
        .get("label")
        .map(|text| measure_label(text.trim_end(), &graph_attrs, config))
        .filter(|block| !block.lines.is_empty());
    let title_on_top = graph_attrs.get("labelloc").map(String::as_str) == Some("t");
    let title_height = title.as_ref().map(|t| t.height + config.title_gap).unwrap_or(0.0);
    let cluster_head = if graph.clusters.is_empty() {
        0.0
    } else {
        config.cluster_padding + config.cluster_label_height
    };

    // rows
    let mut y = config.margin + cluster_head + if title_on_top { title_height } else { 0.0 };
    let mut row_widths = Vec::with_capacity(rank_nodes.len());
    for bucket in &rank_nodes {
        let row_height = bucket
            .iter()
            .filter_map(|id| nodes.get(id))
            .map(|node| node.height)
            .fold(0.0_f32, f32::max);
        let mut x = 0.0_f32;
        let mut prev_cluster: Option<Option<usize>> = None;
        for id in bucket {
            let Some(node) = nodes.get_mut(id) else {
                continue;
            };
            if let Some(prev) = prev_cluster {
                x += config.node_spacing;
                if prev != node.cluster && (prev.is_some() || node.cluster.is_some()) {
                    x += config.cluster_padding * 2.0;
                }
            } else if node.cluster.is_some() {
                x += config.cluster_padding;
            }
            node.x = x;
            node.y = y + (row_height - node.height) / 2.0;
            x += node.width;
            prev_cluster = Some(node.cluster);
        }
        if prev_cluster.flatten().is_some() {
            x += config.cluster_padding;
        }
        row_widths.push(x);
        y += row_height + config.rank_spacing;
    }
    let content_width = row_widths.iter().copied().fold(0.0_f32, f32::max);
    for (bucket, row_width) in rank_nodes.iter().zip(&row_widths) {
        let shift = config.margin + (content_width - row_width) / 2.0;
        for id in bucket {
            if let Some(node) = nodes.get_mut(id) {
                node.x += shift;
            }
        }
    }

    let mut clusters = Vec::with_capacity(graph.clusters.len());
    for (idx, cluster) in graph.clusters.iter().enumerate() {
        let members: Vec<&NodeLayout> = nodes.values().filter(|n| n.cluster == Some(idx)).collect();
        let label_text = cluster.attrs.get("label").cloned().unwrap_or_default();
        let label = measure_label(&label_text, &cluster.attrs, config);
        if members.is_empty() {
            continue;
        }
        let min_x = members.iter().map(|n| n.x).fold(f32::MAX, f32::min);
        let min_y = members.iter().map(|n| n.y).fold(f32::MAX, f32::min);
        let max_x = members.iter().map(|n| n.x + n.width).fold(f32::MIN, f32::max);
        let max_y = members.iter().map(|n| n.y + n.height).fold(f32::MIN, f32::max);
        let x = min_x - config.cluster_padding;
        let top = min_y - config.cluster_padding - config.cluster_label_height;
        let width = (max_x - min_x + config.cluster_padding * 2.0).max(label.width + config.cluster_padding * 2.0);
        clusters.push(ClusterLayout {
            name: cluster.name.clone(),
            label,
            x,
            y: top,
            width,
            height: max_y + config.cluster_padding - top,
            attrs: cluster.attrs.clone(),
        });
    }

    let edges = edges
        .into_iter()
        .filter_map(|(from, to, attrs)| {
            let source = nodes.get(&from)?;
            let target = nodes.get(&to)?;
            Some(EdgeLayout {
                points: route_edge(source, target),
                from,
                to,
                attrs,
            })
        })
        .collect();

    let mut width = nodes
        .values()
        .map(|n| n.x + n.width)
        .chain(clusters.iter().map(|c| c.x + c.width))
        .fold(0.0_f32, f32::max)
        + config.margin;
    let mut height = nodes
        .values()
        .map(|n| n.y + n.height)
        .chain(clusters.iter().map(|c| c.y + c.height))
        .fold(0.0_f32, f32::max)
        + config.margin;
    if let Some(block) = &title {
        width = width.max(block.width + config.margin * 2.0);
    }
    let title = title.map(|block| {
        let ty = if title_on_top {
            config.margin
        } else {
            let top = height - config.margin + config.title_gap;
            height = top + block.height + config.margin;
            top
        };
        (width / 2.0, ty, block)
    });

    Layout {
        nodes,
        edges,
        clusters,
        title,
        graph_attrs,
        width,
        height,
    }
}

fn route_edge(source: &NodeLayout, target: &NodeLayout) -> Vec<(f32, f32)> {
    let (sx, _) = source.center();
    let (tx, _) = target.center();
    let start = (sx, source.y + source.height);
    let end = (tx, target.y);
    if (sx - tx).abs() < 0.5 || end.1 <= start.1 {
        return vec![start, end];
    }
    let mid_y = start.1 + (end.1 - start.1) / 2.0;
    vec![start, (sx, mid_y), (tx, mid_y), end]
}

fn node_size(label: &TextBlock, attrs: &Attrs, config: &LayoutConfig) -> (f32, f32) {
    let width = (label.width + config.node_padding_x * 2.0).max(config.min_node_width);
    let height = (label.height + config.node_padding_y * 2.0).max(config.min_node_height);
    match attrs.get("shape").map(String::as_str) {
        Some("diamond") => (width * 1.6, height * 1.6),
        Some("box" | "rect" | "rectangle" | "square" | "plaintext" | "plain" | "none") => (width, height),
        // Graphviz draws ellipses by default
        _ => (width * 1.3, height * 1.2),
    }
}

pub(crate) fn measure_label(text: &str, attrs: &Attrs, config: &LayoutConfig) -> TextBlock {
    let font_size = attrs
        .get("fontsize")
        .and_then(|value| value.trim().parse::<f32>().ok())
        .unwrap_or(config.default_font_size);
    let font_family = attrs
        .get("fontname")
        .cloned()
        .unwrap_or_else(|| config.default_font_family.clone());
    let lines: Vec<String> = split_lines(text);
    let width = lines
        .iter()
        .map(|line| {
            measure_text_width(line, font_size, &font_family)
                .unwrap_or_else(|| line.chars().count() as f32 * font_size * 0.6)
        })
        .fold(0.0_f32, f32::max);
    let height = lines.len() as f32 * font_size * config.label_line_height;
    TextBlock {
        lines,
        width,
        height,
        font_size,
        font_family,
    }
}

fn split_lines(text: &str) -> Vec<String> {
    let mut lines: Vec<String> = text
        .replace("\\n", "\n")
        .replace("\\l", "\n")
        .replace("\\r", "\n")
        .split('\n')
        .map(|line| line.to_string())
        .collect();
    while lines.last().is_some_and(|line| line.trim().is_empty()) {
        lines.pop();
    }
    lines
}

/// Longest-path ranks over a topological order; edges pointing backwards are ignored.
pub(crate) fn compute_ranks(
    node_ids: &[String],
    edges: &[(String, String)],
    node_order: &HashMap<String, usize>,
) -> HashMap<String, usize> {
    let set: HashSet<&str> = node_ids.iter().map(String::as_str).collect();
    let mut adj: HashMap<&str, Vec<&str>> = HashMap::new();
    let mut indeg: HashMap<&str, usize> = set.iter().map(|id| (*id, 0)).collect();
    for (from, to) in edges {
        if set.contains(from.as_str()) && set.contains(to.as_str()) {
            adj.entry(from.as_str()).or_default().push(to.as_str());
            *indeg.entry(to.as_str()).or_insert(0) += 1;
        }
    }
    let order_key = |id: &str| node_order.get(id).copied().unwrap_or(usize::MAX);

    let mut ready: BinaryHeap<Reverse<(usize, &str)>> = BinaryHeap::new();
    for id in &set {
        if indeg.get(id).copied().unwrap_or(0) == 0 {
            ready.push(Reverse((order_key(*id), *id)));
        }
    }

    let mut order: Vec<&str> = Vec::with_capacity(set.len());
    let mut processed: HashSet<&str> = HashSet::new();
    loop {
        while let Some(Reverse((_key, id))) = ready.pop() {
            if !processed.insert(id) {
                continue;
            }
            order.push(id);
            for next in adj.get(id).into_iter().flatten() {
                if processed.contains(next) {
                    continue;
                }
                if let Some(deg) = indeg.get_mut(next) {
                    *deg = deg.saturating_sub(1);
                    if *deg == 0 {
                        ready.push(Reverse((order_key(*next), *next)));
                    }
                }
            }
        }

        if processed.len() >= set.len() {
            break;
        }

        // Cycle: restart from the earliest declared node still waiting.
        let best = set
            .iter()
            .filter(|id| !processed.contains(**id))
            .min_by_key(|id| order_key(**id));
        match best {
            Some(id) => ready.push(Reverse((order_key(*id), *id))),
            None => break,
        }
    }

    let order_index: HashMap<&str, usize> = order.iter().enumerate().map(|(idx, id)| (*id, idx)).collect();
    let mut ranks: HashMap<String, usize> = HashMap::new();
    for node in &order {
        let rank = *ranks.entry(node.to_string()).or_insert(0);
        let from_idx = order_index[node];
        for next in adj.get(node).into_iter().flatten() {
            if order_index.get(next).copied().unwrap_or(from_idx) <= from_idx {
                continue;
            }
            let entry = ranks.entry(next.to_string()).or_insert(0);
            *entry = (*entry).max(rank + 1);
        }
    }
    ranks
}

/// Median-heuristic crossing reduction, alternating downward and upward sweeps.
pub(crate) fn order_rank_nodes(
    rank_nodes: &mut [Vec<String>],
    edges: &[(String, String)],
    node_order: &HashMap<String, usize>,
    passes: usize,
) {
    if rank_nodes.len() <= 1 {
        return;
    }
    let mut incoming: HashMap<String, Vec<String>> = HashMap::new();
    let mut outgoing: HashMap<String, Vec<String>> = HashMap::new();
    for (from, to) in edges {
        outgoing.entry(from.clone()).or_default().push(to.clone());
        incoming.entry(to.clone()).or_default().push(from.clone());
    }

    let mut positions: HashMap<String, usize> = HashMap::new();
    let update_positions = |rank_nodes: &mut [Vec<String>], positions: &mut HashMap<String, usize>| {
        positions.clear();
        for bucket in rank_nodes.iter() {
            for (idx, id) in bucket.iter().enumerate() {
                positions.insert(id.clone(), idx);
            }
        }
    };
    update_positions(rank_nodes, &mut positions);

    let sort_bucket = |bucket: &mut Vec<String>,
                       neighbors: &HashMap<String, Vec<String>>,
                       positions: &HashMap<String, usize>| {
        let current: HashMap<String, usize> = bucket
            .iter()
            .enumerate()
            .map(|(idx, id)| (id.clone(), idx))
            .collect();
        bucket.sort_by(|a, b| {
            let a_score = median_position(a, neighbors, positions, &current);
            let b_score = median_position(b, neighbors, positions, &current);
            a_score
                .partial_cmp(&b_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| current.get(a).cmp(&current.get(b)))
                .then_with(|| node_order.get(a).cmp(&node_order.get(b)))
        });
    };

    for _ in 0..passes.max(1) {
        for rank in 1..rank_nodes.len() {
            if rank_nodes[rank].len() > 1 {
                sort_bucket(&mut rank_nodes[rank], &incoming, &positions);
                update_positions(rank_nodes, &mut positions);
            }
        }
        for rank in (0..rank_nodes.len() - 1).rev() {
            if rank_nodes[rank].len() > 1 {
                sort_bucket(&mut rank_nodes[rank], &outgoing, &positions);
                update_positions(rank_nodes, &mut positions);
            }
        }
    }
}

fn median_position(
    node_id: &str,
    neighbors: &HashMap<String, Vec<String>>,
    positions: &HashMap<String, usize>,
    current: &HashMap<String, usize>,
) -> f32 {
    let fallback = *current.get(node_id).unwrap_or(&0) as f32;
    let Some(list) = neighbors.get(node_id) else {
        return fallback;
    };
    let mut values: Vec<f32> = list
        .iter()
        .filter_map(|neighbor| positions.get(neighbor))
        .map(|pos| *pos as f32)
        .collect();
    if values.is_empty() {
        return fallback;
    }
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = values.len() / 2;
    if values.len() % 2 == 1 {
        values[mid]
    } else {
        (values[mid - 1] + values[mid]) * 0.5
    }
}

/// Pull the members of each cluster next to the first of them in the row.
fn keep_clusters_together(bucket: &mut Vec<String>, node_cluster: &HashMap<String, Option<usize>>) {
    let mut anchor: HashMap<usize, usize> = HashMap::new();
    for (pos, id) in bucket.iter().enumerate() {
        if let Some(Some(cluster)) = node_cluster.get(id) {
            anchor.entry(*cluster).or_insert(pos);
        }
    }
    let mut keyed: Vec<(usize, usize, String)> = bucket
        .drain(..)
        .enumerate()
        .map(|(pos, id)| {
            let key = match node_cluster.get(&id) {
                Some(Some(cluster)) => anchor[cluster],
                _ => pos,
            };
            (key, pos, id)
        })
        .collect();
    keyed.sort_by_key(|(key, pos, _)| (*key, *pos));
    bucket.extend(keyed.into_iter().map(|(_, _, id)| id));
}
