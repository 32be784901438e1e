use std::io::Write;
use std::process::{Command, Stdio};

use serde::{Deserialize, Serialize};

use crate::config::LayoutConfig;
use crate::dot::DotGraph;
use crate::error::{DiagramError, Result};
use crate::layout::{compute_layout, ClusterLayout, EdgeLayout, Layout, NodeLayout, TextBlock};
use crate::theme::Attrs;

/// Which backend turns the graph description into an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RendererKind {
    #[default]
    Builtin,
    /// Pipe the DOT text through the Graphviz `dot` program.
    Graphviz,
}

pub trait Renderer {
    fn render_svg(&self, graph: &DotGraph) -> Result<String>;
}

pub fn renderer_for(kind: RendererKind, config: &LayoutConfig) -> Box<dyn Renderer> {
    match kind {
        RendererKind::Builtin => Box::new(BuiltinRenderer::new(config.clone())),
        RendererKind::Graphviz => Box::new(GraphvizRenderer::default()),
    }
}

/// Lays the graph out itself and draws it honouring the Graphviz attributes themes use.
#[derive(Debug, Clone, Default)]
pub struct BuiltinRenderer {
    config: LayoutConfig,
}

impl BuiltinRenderer {
    pub fn new(config: LayoutConfig) -> Self {
        Self { config }
    }
}

impl Renderer for BuiltinRenderer {
    fn render_svg(&self, graph: &DotGraph) -> Result<String> {
        let layout = compute_layout(graph, &self.config);
        Ok(render_layout(&layout))
    }
}

#[derive(Debug, Clone)]
pub struct GraphvizRenderer {
    pub program: String,
}

impl Default for GraphvizRenderer {
    fn default() -> Self {
        Self {
            program: "dot".to_string(),
        }
    }
}

impl Renderer for GraphvizRenderer {
    fn render_svg(&self, graph: &DotGraph) -> Result<String> {
        let failed = |err: std::io::Error| DiagramError::Render(format!("failed to run `{}`: {err}", self.program));
        let mut child = Command::new(&self.program)
            .arg("-Tsvg")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(failed)?;

        let source = graph.to_dot();
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| DiagramError::Render(format!("`{}` has no stdin", self.program)))?;
        // dot may start writing before it has read everything
        let writer = std::thread::spawn(move || stdin.write_all(source.as_bytes()));
        let output = child.wait_with_output().map_err(failed)?;
        let written = writer
            .join()
            .map_err(|_| DiagramError::Render("stdin writer panicked".to_string()))?;

        // an early exit also breaks the pipe; the exit status says why
        if !output.status.success() {
            return Err(exit_error(&self.program, &output));
        }
        written.map_err(failed)?;
        String::from_utf8(output.stdout).map_err(|err| DiagramError::Render(err.to_string()))
    }
}

fn exit_error(program: &str, output: &std::process::Output) -> DiagramError {
    DiagramError::Render(format!(
        "`{program}` exited with {}: {}",
        output.status,
        String::from_utf8_lossy(&output.stderr).trim()
    ))
}

pub fn render_layout(layout: &Layout) -> String {
    let width = layout.width.ceil();
    let height = layout.height.ceil();
    let mut svg = String::new();
    svg.push_str(&format!(
        "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{width}pt\" height=\"{height}pt\" viewBox=\"0 0 {width} {height}\">\n",
    ));

    let graph = &layout.graph_attrs;
    svg.push_str(&format!(
        "<rect width=\"100%\" height=\"100%\" fill=\"{}\"/>\n",
        escape_xml(get(graph, "bgcolor").unwrap_or("white"))
    ));
    if let Some((x, y, block)) = &layout.title {
        let fill = get(graph, "fontcolor").unwrap_or("black");
        svg.push_str(&text_svg(*x, *y, block, "middle", fill));
    }

    for cluster in &layout.clusters {
        svg.push_str(&cluster_svg(cluster));
    }
    for edge in &layout.edges {
        svg.push_str(&edge_svg(edge));
    }
    for node in layout.nodes.values() {
        svg.push_str(&node_svg(node));
    }

    svg.push_str("</svg>\n");
    svg
}

fn cluster_svg(cluster: &ClusterLayout) -> String {
    let attrs = &cluster.attrs;
    let styles = styles(attrs);
    let color = get(attrs, "color");
    let fill = if styles.contains(&"filled") {
        get(attrs, "fillcolor").or(color).unwrap_or("lightgrey")
    } else {
        get(attrs, "bgcolor").unwrap_or("none")
    };
    let stroke = get(attrs, "pencolor").or(color).unwrap_or("black");
    let rx = if styles.contains(&"rounded") { 8.0 } else { 0.0 };

    let mut out = format!("<g class=\"cluster\"><title>{}</title>\n", escape_xml(&cluster.name));
    out.push_str(&format!(
        "<rect x=\"{:.2}\" y=\"{:.2}\" width=\"{:.2}\" height=\"{:.2}\" rx=\"{rx}\" fill=\"{}\" stroke=\"{}\"{}/>\n",
        cluster.x,
        cluster.y,
        cluster.width,
        cluster.height,
        escape_xml(fill),
        escape_xml(stroke),
        stroke_extras(attrs, &styles),
    ));

    let pad = 8.0;
    let (x, anchor) = match get(attrs, "labeljust") {
        Some("l") => (cluster.x + pad, "start"),
        Some("r") => (cluster.x + cluster.width - pad, "end"),
        _ => (cluster.x + cluster.width / 2.0, "middle"),
    };
    let fill = get(attrs, "fontcolor").unwrap_or("black");
    out.push_str(&text_svg(x, cluster.y + 4.0, &cluster.label, anchor, fill));
    out.push_str("</g>\n");
    out
}

fn edge_svg(edge: &EdgeLayout) -> String {
    let attrs = &edge.attrs;
    let styles = styles(attrs);
    if styles.contains(&"invis") || edge.points.len() < 2 {
        return String::new();
    }
    let color = escape_xml(get(attrs, "color").unwrap_or("black"));
    let arrow_size = number(attrs, "arrowsize").unwrap_or(1.0);

    let mut points = edge.points.clone();
    let len = points.len();
    let (end_x, end_y) = points[len - 1];
    let (prev_x, prev_y) = points[len - 2];
    let (dx, dy) = (end_x - prev_x, end_y - prev_y);
    let dist = (dx * dx + dy * dy).sqrt().max(f32::EPSILON);
    let (ux, uy) = (dx / dist, dy / dist);
    let head = (10.0 * arrow_size).min(dist);
    let half = 3.5 * arrow_size;
    let base = (end_x - ux * head, end_y - uy * head);
    points[len - 1] = base;

    let mut out = format!(
        "<g class=\"edge\"><title>{}</title>\n",
        escape_xml(&format!("{}->{}", edge.from, edge.to))
    );
    out.push_str(&format!(
        "<path d=\"{}\" fill=\"none\" stroke=\"{color}\"{}/>\n",
        points_to_path(&points),
        stroke_extras(attrs, &styles)
    ));
    out.push_str(&format!(
        "<polygon points=\"{:.2},{:.2} {:.2},{:.2} {:.2},{:.2}\" fill=\"{color}\" stroke=\"{color}\"/>\n",
        end_x,
        end_y,
        base.0 - uy * half,
        base.1 + ux * half,
        base.0 + uy * half,
        base.1 - ux * half,
    ));
    out.push_str("</g>\n");
    out
}

fn node_svg(node: &NodeLayout) -> String {
    let attrs = &node.attrs;
    let styles = styles(attrs);
    if styles.contains(&"invis") {
        return String::new();
    }
    let color = get(attrs, "color").unwrap_or("black");
    let fill = if styles.contains(&"filled") {
        get(attrs, "fillcolor").or(get(attrs, "color")).unwrap_or("lightgrey")
    } else {
        "none"
    };
    let outlined = number(attrs, "peripheries").is_none_or(|count| count > 0.0);
    let stroke = if outlined { color } else { "none" };
    let paint = format!(
        "fill=\"{}\" stroke=\"{}\"{}",
        escape_xml(fill),
        escape_xml(stroke),
        stroke_extras(attrs, &styles)
    );

    let tooltip = get(attrs, "tooltip").unwrap_or(node.id.as_str());
    let mut out = format!(
        "<g class=\"node\" id=\"{}\"><title>{}</title>\n",
        escape_xml(&node.id),
        escape_xml(tooltip)
    );
    let (cx, cy) = node.center();
    match get(attrs, "shape").unwrap_or("ellipse") {
        "box" | "rect" | "rectangle" | "square" => {
            let rx = if styles.contains(&"rounded") { 6.0 } else { 0.0 };
            out.push_str(&format!(
                "<rect x=\"{:.2}\" y=\"{:.2}\" width=\"{:.2}\" height=\"{:.2}\" rx=\"{rx}\" {paint}/>\n",
                node.x, node.y, node.width, node.height
            ));
        }
        "diamond" => {
            out.push_str(&format!(
                "<polygon points=\"{cx:.2},{:.2} {:.2},{cy:.2} {cx:.2},{:.2} {:.2},{cy:.2}\" {paint}/>\n",
                node.y,
                node.x + node.width,
                node.y + node.height,
                node.x
            ));
        }
        "plaintext" | "plain" | "none" => {}
        _ => {
            out.push_str(&format!(
                "<ellipse cx=\"{cx:.2}\" cy=\"{cy:.2}\" rx=\"{:.2}\" ry=\"{:.2}\" {paint}/>\n",
                node.width / 2.0,
                node.height / 2.0
            ));
        }
    }
    let font_color = get(attrs, "fontcolor").unwrap_or("black");
    out.push_str(&text_svg(cx, cy - node.label.height / 2.0, &node.label, "middle", font_color));
    out.push_str("</g>\n");
    out
}

/// `top` is the upper edge of the text block.
fn text_svg(x: f32, top: f32, block: &TextBlock, anchor: &str, fill: &str) -> String {
    if block.lines.is_empty() {
        return String::new();
    }
    let line_height = block.height / block.lines.len() as f32;
    let baseline = top + line_height / 2.0 + block.font_size * 0.35;
    let mut text = format!(
        "<text x=\"{x:.2}\" y=\"{baseline:.2}\" text-anchor=\"{anchor}\" font-family=\"{}\" font-size=\"{:.2}\" fill=\"{}\">",
        escape_xml(&block.font_family),
        block.font_size,
        escape_xml(fill)
    );
    for (idx, line) in block.lines.iter().enumerate() {
        let dy = if idx == 0 { 0.0 } else { line_height };
        text.push_str(&format!("<tspan x=\"{x:.2}\" dy=\"{dy:.2}\">{}</tspan>", escape_xml(line)));
    }
    text.push_str("</text>\n");
    text
}

fn stroke_extras(attrs: &Attrs, styles: &[&str]) -> String {
    let mut extras = String::new();
    if let Some(width) = number(attrs, "penwidth") {
        extras.push_str(&format!(" stroke-width=\"{width}\""));
    }
    if styles.contains(&"dashed") {
        extras.push_str(" stroke-dasharray=\"5,2\"");
    } else if styles.contains(&"dotted") {
        extras.push_str(" stroke-dasharray=\"1,5\"");
    }
    extras
}

fn points_to_path(points: &[(f32, f32)]) -> String {
    let mut d = String::new();
    for (idx, (x, y)) in points.iter().enumerate() {
        let cmd = if idx == 0 { "M" } else { " L" };
        d.push_str(&format!("{cmd} {x:.2} {y:.2}"));
    }
    d
}

fn get<'a>(attrs: &'a Attrs, key: &str) -> Option<&'a str> {
    attrs.get(key).map(String::as_str)
}

fn number(attrs: &Attrs, key: &str) -> Option<f32> {
    attrs.get(key).and_then(|value| value.trim().parse().ok())
}

fn styles(attrs: &Attrs) -> Vec<&str> {
    get(attrs, "style")
        .map(|style| style.split(',').map(str::trim).collect())
        .unwrap_or_default()
}

/// Rasterise an SVG document to PNG bytes.
#[cfg(feature = "png")]
pub fn render_png(svg: &str) -> Result<Vec<u8>> {
    let mut opt = usvg::Options::default();
    opt.fontdb_mut().load_system_fonts();

    let tree = usvg::Tree::from_str(svg, &opt).map_err(|err| DiagramError::Render(err.to_string()))?;
    let size = tree.size().to_int_size();
    let mut pixmap = resvg::tiny_skia::Pixmap::new(size.width(), size.height())
        .ok_or_else(|| DiagramError::Render("failed to allocate pixmap".to_string()))?;

    let mut pixmap_mut = pixmap.as_mut();
    resvg::render(&tree, resvg::tiny_skia::Transform::default(), &mut pixmap_mut);
    pixmap
        .encode_png()
        .map_err(|err| DiagramError::Render(err.to_string()))
}

pub(crate) fn escape_xml(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
