//! Turning a pipeline into a diagram and writing it out.

use tracing::{debug, info};

use crate::config::DiagramConfig;
use crate::diagram::{Diagram, Role};
use crate::error::Result;
use crate::hidden::{validate_hidden, visible_successors};
use crate::ir::{Pipeline, Process, ProcessGroup};
use crate::render::renderer_for;
use crate::storage::{Artifact, Destination};
use crate::theme::Theme;

/// File name (without extension) of the artifacts inside the output directory.
pub const OUTPUT_NAME: &str = "diagram";

/// Populate a [`Diagram`] from the pipeline, collapsing hidden processes.
pub fn assemble(pipeline: &Pipeline, theme: Theme) -> Result<Diagram> {
    validate_hidden(pipeline)?;

    let mut diagram = Diagram::new(&pipeline.name, theme);
    diagram.description = pipeline.description.clone();
    let visible: Vec<&Process> = pipeline.processes().iter().filter(|p| !p.is_hidden()).collect();

    for process in &visible {
        diagram.add_node(process, process.group.as_ref(), role_of(pipeline, process));
    }
    for process in &visible {
        for (target, collapsed) in visible_successors(pipeline, process) {
            let group = shared_group(process, target);
            debug!(from = %process.name, to = %target.name, collapsed, "edge");
            diagram.add_edge(&process.name, &target.name, group, collapsed)?;
        }
    }

    info!(
        pipeline = %pipeline.name,
        nodes = diagram.node_count(),
        edges = diagram.edge_count(),
        groups = diagram.groups.len(),
        "assembled diagram"
    );
    Ok(diagram)
}

/// Resolve the theme, assemble, render and persist under `<outdir>/diagram`.
///
/// Returns the written targets. Nothing is written when any earlier step fails.
pub fn render_pipeline(pipeline: &Pipeline, config: &DiagramConfig, outdir: &Destination) -> Result<Vec<String>> {
    let theme = config.resolve_theme()?;
    let diagram = assemble(pipeline, theme)?;
    let graph = diagram.build();

    let svg = renderer_for(config.renderer, &config.layout).render_svg(&graph)?;

    let mut artifacts = Vec::with_capacity(3);
    if config.save_dot {
        artifacts.push(Artifact::new("dot", graph.to_dot()));
    }
    if config.png {
        artifacts.push(Artifact::new("png", rasterise(&svg)?));
    }
    artifacts.insert(usize::from(config.save_dot), Artifact::new("svg", svg));

    let prefix = outdir.join(OUTPUT_NAME);
    info!("Building diagram and saving to `{prefix}.svg`");
    prefix.persist(&artifacts)
}

fn role_of(pipeline: &Pipeline, process: &Process) -> Option<Role> {
    if pipeline.is_start(&process.name) {
        Some(Role::Start)
    } else if process.nexts.is_empty() {
        Some(Role::End)
    } else {
        None
    }
}

/// Edges only go inside a cluster when both ends belong to it.
fn shared_group<'a>(from: &'a Process, to: &Process) -> Option<&'a ProcessGroup> {
    match (&from.group, &to.group) {
        (Some(a), Some(b)) if a.name == b.name => Some(a),
        _ => None,
    }
}

#[cfg(feature = "png")]
fn rasterise(svg: &str) -> Result<Vec<u8>> {
    crate::render::render_png(svg)
}

#[cfg(not(feature = "png"))]
fn rasterise(_svg: &str) -> Result<Vec<u8>> {
    Err(crate::error::DiagramError::Render(
        "PNG output needs the `png` feature".to_string(),
    ))
}
