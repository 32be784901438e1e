use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{DiagramError, Result};
use crate::render::RendererKind;
use crate::theme::{self, DEFAULT_THEME, Theme, ThemeSpec};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutConfig {
    pub node_spacing: f32,
    pub rank_spacing: f32,
    pub node_padding_x: f32,
    pub node_padding_y: f32,
    pub min_node_width: f32,
    pub min_node_height: f32,
    pub label_line_height: f32,
    pub cluster_padding: f32,
    pub cluster_label_height: f32,
    pub title_gap: f32,
    pub margin: f32,
    pub order_passes: usize,
    /// Used when a bundle sets no `fontsize` (Graphviz default).
    pub default_font_size: f32,
    pub default_font_family: String,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            node_spacing: 36.0,
            rank_spacing: 50.0,
            node_padding_x: 14.0,
            node_padding_y: 8.0,
            min_node_width: 54.0,
            min_node_height: 36.0,
            label_line_height: 1.25,
            cluster_padding: 12.0,
            cluster_label_height: 18.0,
            title_gap: 12.0,
            margin: 8.0,
            order_passes: 4,
            default_font_size: 14.0,
            default_font_family: "Times-Roman".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagramConfig {
    pub theme: ThemeSpec,
    /// Catalog theme that override maps in `theme` are applied to.
    pub base_theme: String,
    /// Also keep the graph description next to the image as `<prefix>.dot`.
    pub save_dot: bool,
    pub loglevel: String,
    pub renderer: RendererKind,
    /// Also rasterise the image to `<prefix>.png`.
    pub png: bool,
    pub layout: LayoutConfig,
}

impl Default for DiagramConfig {
    fn default() -> Self {
        Self {
            theme: ThemeSpec::default(),
            base_theme: DEFAULT_THEME.to_string(),
            save_dot: false,
            loglevel: "info".to_string(),
            renderer: RendererKind::Builtin,
            png: false,
            layout: LayoutConfig::default(),
        }
    }
}

impl DiagramConfig {
    /// Resolve the configured theme against the catalog.
    pub fn resolve_theme(&self) -> Result<Theme> {
        theme::resolve(&self.theme, &self.base_theme)
    }

    /// Overlay options given as a JSON object, e.g. the `options` block of a pipeline file.
    pub fn apply_options(&mut self, options: serde_json::Value) -> Result<()> {
        let parsed: ConfigFile =
            serde_json::from_value(options).map_err(|err| DiagramError::Config(err.to_string()))?;
        self.apply(parsed);
        Ok(())
    }

    fn apply(&mut self, parsed: ConfigFile) {
        if let Some(v) = parsed.theme {
            self.theme = v;
        }
        if let Some(v) = parsed.base_theme {
            self.base_theme = v;
        }
        if let Some(v) = parsed.save_dot {
            self.save_dot = v;
        }
        if let Some(v) = parsed.loglevel {
            self.loglevel = v;
        }
        if let Some(v) = parsed.renderer {
            self.renderer = v;
        }
        if let Some(v) = parsed.png {
            self.png = v;
        }
        if let Some(layout) = parsed.layout {
            layout.apply(&mut self.layout);
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(alias = "diagram_theme")]
    theme: Option<ThemeSpec>,
    #[serde(alias = "diagram_theme_base")]
    base_theme: Option<String>,
    #[serde(alias = "diagram_savedot")]
    save_dot: Option<bool>,
    #[serde(alias = "diagram_loglevel")]
    loglevel: Option<String>,
    #[serde(alias = "diagram_renderer")]
    renderer: Option<RendererKind>,
    #[serde(alias = "diagram_png")]
    png: Option<bool>,
    layout: Option<LayoutConfigFile>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct LayoutConfigFile {
    node_spacing: Option<f32>,
    rank_spacing: Option<f32>,
    node_padding_x: Option<f32>,
    node_padding_y: Option<f32>,
    min_node_width: Option<f32>,
    min_node_height: Option<f32>,
    label_line_height: Option<f32>,
    cluster_padding: Option<f32>,
    cluster_label_height: Option<f32>,
    title_gap: Option<f32>,
    margin: Option<f32>,
    order_passes: Option<usize>,
    default_font_size: Option<f32>,
    default_font_family: Option<String>,
}

impl LayoutConfigFile {
    fn apply(self, layout: &mut LayoutConfig) {
        if let Some(v) = self.node_spacing {
            layout.node_spacing = v;
        }
        if let Some(v) = self.rank_spacing {
            layout.rank_spacing = v;
        }
        if let Some(v) = self.node_padding_x {
            layout.node_padding_x = v;
        }
        if let Some(v) = self.node_padding_y {
            layout.node_padding_y = v;
        }
        if let Some(v) = self.min_node_width {
            layout.min_node_width = v;
        }
        if let Some(v) = self.min_node_height {
            layout.min_node_height = v;
        }
        if let Some(v) = self.label_line_height {
            layout.label_line_height = v;
        }
        if let Some(v) = self.cluster_padding {
            layout.cluster_padding = v;
        }
        if let Some(v) = self.cluster_label_height {
            layout.cluster_label_height = v;
        }
        if let Some(v) = self.title_gap {
            layout.title_gap = v;
        }
        if let Some(v) = self.margin {
            layout.margin = v;
        }
        if let Some(v) = self.order_passes {
            layout.order_passes = v;
        }
        if let Some(v) = self.default_font_size {
            layout.default_font_size = v;
        }
        if let Some(v) = self.default_font_family {
            layout.default_font_family = v;
        }
    }
}

/// Load a JSON5 (or JSON) config file; without a path the defaults are returned.
pub fn load_config(path: Option<&Path>) -> Result<DiagramConfig> {
    let mut config = DiagramConfig::default();
    let Some(path) = path else {
        return Ok(config);
    };

    let contents = std::fs::read_to_string(path)
        .map_err(|err| DiagramError::Config(format!("{}: {err}", path.display())))?;
    let parsed: ConfigFile = json5::from_str(&contents)
        .map_err(|err| DiagramError::Config(format!("{}: {err}", path.display())))?;
    config.apply(parsed);
    Ok(config)
}
