//! Pipeline diagrams: turn a process graph into a themed SVG, collapsing
//! processes flagged as hidden into dashed edges.

pub mod config;
pub mod diagram;
pub mod dot;
pub mod entry;
pub mod error;
pub mod hidden;
pub mod ir;
pub mod layout;
pub mod render;
pub mod storage;
pub mod text_metrics;
pub mod theme;

#[cfg(feature = "cli")]
pub mod cli;

pub use config::{load_config, DiagramConfig, LayoutConfig};
pub use diagram::{Diagram, Group, Role};
pub use dot::DotGraph;
pub use entry::{assemble, render_pipeline};
pub use error::{DiagramError, Result};
pub use ir::{Pipeline, Process, ProcessGroup};
pub use render::{Renderer, RendererKind};
pub use storage::{Artifact, Destination, MirrorStore, ObjectStore};
pub use theme::{resolve as resolve_theme, Theme, ThemeOverrides, ThemeSpec};

#[cfg(feature = "cli")]
pub use cli::run;
