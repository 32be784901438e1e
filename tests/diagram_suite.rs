use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use pipeline_diagram::error::HiddenNodeViolation;
use pipeline_diagram::{
    assemble, render_pipeline, DiagramConfig, DiagramError, Destination, MirrorStore, ObjectStore, Pipeline,
    Process, Theme, ThemeSpec,
};

fn chain(hidden_tail: bool) -> Pipeline {
    let c = Process::new("C").requires(["B"]);
    let c = if hidden_tail { c.hidden() } else { c };
    Pipeline::new(
        "chain",
        vec![Process::new("A"), Process::new("B").requires(["A"]), c],
    )
    .expect("valid pipeline")
}

fn two_nodes() -> Pipeline {
    Pipeline::new("pair", vec![Process::new("A"), Process::new("B").requires(["A"])]).expect("valid pipeline")
}

fn config(theme: &str, save_dot: bool) -> DiagramConfig {
    DiagramConfig {
        theme: ThemeSpec::from(theme),
        save_dot,
        ..DiagramConfig::default()
    }
}

fn files_in(dir: &Path) -> BTreeSet<String> {
    match std::fs::read_dir(dir) {
        Ok(entries) => entries
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect(),
        Err(_) => BTreeSet::new(),
    }
}

#[test]
fn hidden_end_process_fails_before_any_file_is_written() {
    let dir = tempfile::tempdir().unwrap();
    let outdir = dir.path().join("out");
    let err = render_pipeline(&chain(true), &config("default", true), &Destination::Local(outdir.clone()))
        .unwrap_err();

    match err {
        DiagramError::InvalidHiddenNode { process, violation } => {
            assert_eq!(process, "C");
            assert_eq!(violation, HiddenNodeViolation::Terminal);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(files_in(&outdir).is_empty());
}

#[test]
fn dark_theme_with_dot_writes_both_files() {
    let dir = tempfile::tempdir().unwrap();
    let written = render_pipeline(&two_nodes(), &config("dark", true), &Destination::Local(dir.path().to_path_buf()))
        .unwrap();

    assert_eq!(written.len(), 2);
    assert_eq!(
        files_in(dir.path()),
        BTreeSet::from(["diagram.dot".to_string(), "diagram.svg".to_string()])
    );

    let dot = std::fs::read_to_string(dir.path().join("diagram.dot")).unwrap();
    assert!(dot.contains("bgcolor=\"#333333\""));
    assert!(dot.contains("node [color=\"#eeeeee\""));
    assert!(dot.contains("edge [color=\"#eeeeee\"]"));
    assert!(dot.contains("A -> B"));

    let svg = std::fs::read_to_string(dir.path().join("diagram.svg")).unwrap();
    assert!(svg.contains("fill=\"#333333\""));
    assert!(svg.contains("stroke=\"#eeeeee\""));
}

#[test]
fn dark_theme_bundles_reach_the_drawable_graph() {
    let diagram = assemble(&two_nodes(), Theme::named("dark").unwrap()).unwrap();
    let graph = diagram.build();
    let dark = Theme::dark();

    let edge = graph.edge_attrs("A", "B").unwrap();
    for (key, value) in &dark.edge {
        assert_eq!(edge.get(key), Some(value));
    }
    // start node: node defaults overlaid by the start bundle
    let start = graph.node_attrs("A").unwrap();
    for (key, value) in &dark.start {
        assert_eq!(start.get(key), Some(value));
    }
    assert_eq!(start.get("fontcolor"), dark.node.get("fontcolor"));
}

#[test]
fn without_dot_only_svg_is_written() {
    let dir = tempfile::tempdir().unwrap();
    render_pipeline(&two_nodes(), &config("dark", false), &Destination::Local(dir.path().to_path_buf())).unwrap();
    assert_eq!(files_in(dir.path()), BTreeSet::from(["diagram.svg".to_string()]));
}

#[test]
fn unknown_theme_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let outdir = dir.path().join("out");
    let err = render_pipeline(&two_nodes(), &config("doesnotexist", true), &Destination::Local(outdir.clone()))
        .unwrap_err();
    assert!(matches!(err, DiagramError::UnknownTheme { ref name } if name == "doesnotexist"));
    assert!(!outdir.exists());
}

#[test]
fn grouped_fixture_collapses_hidden_processes() {
    let source = std::fs::read_to_string(
        Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/grouped.json5"),
    )
    .unwrap();
    let (pipeline, options) = Pipeline::from_json5(&source).unwrap();
    let mut config = DiagramConfig::default();
    config.apply_options(options.unwrap()).unwrap();
    assert!(config.save_dot);

    let diagram = assemble(&pipeline, config.resolve_theme().unwrap()).unwrap();
    assert!(!diagram.contains_node("B"));
    assert!(!diagram.contains_node("C1"));
    assert_eq!(diagram.starts, BTreeSet::from(["A".to_string()]));
    assert_eq!(diagram.ends, BTreeSet::from(["F".to_string()]));

    let top: BTreeSet<(String, String, bool)> = diagram
        .edges
        .iter()
        .map(|(from, to, hidden)| (from.to_string(), to.to_string(), hidden))
        .collect();
    assert_eq!(
        top,
        BTreeSet::from([
            ("A".to_string(), "C".to_string(), true),
            ("A".to_string(), "E".to_string(), false),
            ("D".to_string(), "E".to_string(), false),
            ("E".to_string(), "F".to_string(), false),
        ])
    );
    let group = &diagram.groups["PG"];
    assert_eq!(group.label, "Process Group");
    assert!(group.edges.contains("C", "D", true));
    assert_eq!(group.edges.len(), 1);

    let graph = diagram.build();
    assert_eq!(graph.clusters.len(), 1);
    assert_eq!(graph.clusters[0].name, "cluster_PG");
    assert_eq!(graph.edge_attrs("C", "D").unwrap().get("style").map(String::as_str), Some("dashed"));
    assert_eq!(graph.node_attrs("A").unwrap().get("tooltip").map(String::as_str), Some("Process A"));
    assert_eq!(graph.attrs.get("tooltip").map(String::as_str), Some("Grouped example"));

    let dir = tempfile::tempdir().unwrap();
    let written = render_pipeline(&pipeline, &config, &Destination::Local(dir.path().to_path_buf())).unwrap();
    assert_eq!(written.len(), 2);
    let svg = std::fs::read_to_string(dir.path().join("diagram.svg")).unwrap();
    assert!(svg.contains(">Process Group</tspan>"));
    assert!(svg.contains(">MyPipeline</tspan>"));
}

#[test]
fn remote_destination_is_staged_and_uploaded() {
    let root = tempfile::tempdir().unwrap();
    let store: Arc<dyn ObjectStore> = Arc::new(MirrorStore::new(root.path()));
    let outdir = Destination::parse("gs://bucket/runs/42", Some(store)).unwrap();

    let written = render_pipeline(&two_nodes(), &config("default", true), &outdir).unwrap();
    assert_eq!(
        written,
        vec![
            "gs://bucket/runs/42/diagram.dot".to_string(),
            "gs://bucket/runs/42/diagram.svg".to_string(),
        ]
    );
    assert_eq!(
        files_in(&root.path().join("bucket/runs/42")),
        BTreeSet::from(["diagram.dot".to_string(), "diagram.svg".to_string()])
    );
}

#[test]
fn visible_chain_renders_every_node() {
    let dir = tempfile::tempdir().unwrap();
    render_pipeline(&chain(false), &config("fancy", false), &Destination::Local(dir.path().to_path_buf())).unwrap();
    let svg = std::fs::read_to_string(dir.path().join("diagram.svg")).unwrap();
    for id in ["A", "B", "C"] {
        assert!(svg.contains(&format!("id=\"{id}\"")), "missing node {id}");
    }
}
