use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::error::{DiagramError, Result};

/// Graphviz-style attribute bundle (`shape = "box"`, `style = "dashed"`, ...).
pub type Attrs = BTreeMap<String, String>;

pub const DEFAULT_THEME: &str = "default";

/// Styling for process-group clusters.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GroupTheme {
    /// Cluster-level attributes (`style`, `color`, `labeljust`, ...).
    #[serde(flatten)]
    pub attrs: Attrs,
    /// Default node attributes inside the cluster.
    #[serde(default)]
    pub node: Attrs,
    /// Default edge attributes inside the cluster.
    #[serde(default)]
    pub edge: Attrs,
    /// Overlaid on the top-level `edge_hidden` bundle for collapsed edges inside the cluster.
    #[serde(default)]
    pub edge_hidden: Attrs,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Theme {
    #[serde(default)]
    pub graph: Attrs,
    #[serde(default)]
    pub node: Attrs,
    #[serde(default)]
    pub edge: Attrs,
    #[serde(default)]
    pub edge_hidden: Attrs,
    #[serde(default)]
    pub start: Attrs,
    #[serde(default)]
    pub end: Attrs,
    #[serde(default)]
    pub procgroup: GroupTheme,
}

fn attrs(pairs: &[(&str, &str)]) -> Attrs {
    pairs
        .iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect()
}

impl Theme {
    pub fn default_theme() -> Self {
        Self {
            graph: attrs(&[("labelloc", "t"), ("fontname", "Helvetica")]),
            node: attrs(&[
                ("shape", "box"),
                ("style", "rounded"),
                ("fontsize", "12"),
                ("fontname", "Helvetica"),
            ]),
            edge: attrs(&[("arrowsize", "0.8")]),
            edge_hidden: attrs(&[("style", "dashed")]),
            start: attrs(&[("shape", "diamond"), ("style", "solid")]),
            end: attrs(&[("shape", "rectangle"), ("style", "solid")]),
            procgroup: GroupTheme {
                attrs: attrs(&[("style", "filled"), ("color", "#eeeeee"), ("labeljust", "l")]),
                node: Attrs::new(),
                edge: attrs(&[("arrowsize", "0.8")]),
                edge_hidden: Attrs::new(),
            },
        }
    }

    pub fn fancy() -> Self {
        Self {
            graph: attrs(&[("labelloc", "t"), ("fontname", "Helvetica")]),
            node: attrs(&[
                ("shape", "box"),
                ("style", "rounded,filled"),
                ("fontsize", "12"),
                ("fillcolor", "#219ebc"),
                ("fontcolor", "#ffffff"),
                ("peripheries", "0"),
                ("fontname", "Helvetica"),
            ]),
            edge: attrs(&[("arrowsize", "0.8"), ("color", "#3d314a")]),
            edge_hidden: attrs(&[("style", "dashed")]),
            start: attrs(&[
                ("shape", "diamond"),
                ("style", "solid,filled"),
                ("fillcolor", "#4c956c"),
            ]),
            end: attrs(&[
                ("shape", "rectangle"),
                ("style", "solid,filled"),
                ("fillcolor", "#f26419"),
            ]),
            procgroup: GroupTheme {
                attrs: attrs(&[("style", "filled"), ("color", "#eeeeee"), ("labeljust", "l")]),
                node: Attrs::new(),
                edge: attrs(&[("arrowsize", "0.8")]),
                edge_hidden: Attrs::new(),
            },
        }
    }

    pub fn dark() -> Self {
        Self {
            graph: attrs(&[
                ("labelloc", "t"),
                ("bgcolor", "#333333"),
                ("fontcolor", "#eeeeee"),
                ("fontname", "Helvetica"),
            ]),
            node: attrs(&[
                ("shape", "box"),
                ("style", "rounded"),
                ("color", "#eeeeee"),
                ("fontcolor", "#eeeeee"),
                ("fontsize", "12"),
                ("fontname", "Helvetica"),
            ]),
            edge: attrs(&[("color", "#eeeeee")]),
            edge_hidden: attrs(&[("style", "dashed")]),
            start: attrs(&[("shape", "diamond"), ("style", "solid")]),
            end: attrs(&[("shape", "rectangle"), ("style", "solid")]),
            procgroup: GroupTheme {
                attrs: attrs(&[("style", "filled"), ("color", "#666666"), ("labeljust", "l")]),
                ..GroupTheme::default()
            },
        }
    }

    pub fn fancy_dark() -> Self {
        Self {
            graph: attrs(&[
                ("labelloc", "t"),
                ("fontname", "Helvetica"),
                ("bgcolor", "#333333"),
                ("fontcolor", "#eeeeee"),
            ]),
            edge: attrs(&[("color", "#eeeeee")]),
            procgroup: GroupTheme {
                attrs: attrs(&[("style", "filled"), ("color", "#666666"), ("labeljust", "l")]),
                ..GroupTheme::default()
            },
            ..Self::fancy()
        }
    }

    /// Look a theme up in the built-in catalog.
    pub fn named(name: &str) -> Result<Self> {
        THEMES
            .get(name)
            .cloned()
            .ok_or_else(|| DiagramError::UnknownTheme {
                name: name.to_string(),
            })
    }

    /// Names of the built-in themes, sorted.
    pub fn names() -> impl Iterator<Item = &'static str> {
        THEMES.keys().copied()
    }

    /// Overlay `overrides` onto this theme; roles the overrides leave out stay as they are.
    pub fn merged(mut self, overrides: &ThemeOverrides) -> Self {
        overlay(&mut self.graph, overrides.graph.as_ref());
        overlay(&mut self.node, overrides.node.as_ref());
        overlay(&mut self.edge, overrides.edge.as_ref());
        overlay(&mut self.edge_hidden, overrides.edge_hidden.as_ref());
        overlay(&mut self.start, overrides.start.as_ref());
        overlay(&mut self.end, overrides.end.as_ref());
        if let Some(group) = &overrides.procgroup {
            overlay(&mut self.procgroup.attrs, Some(&group.attrs));
            overlay(&mut self.procgroup.node, group.node.as_ref());
            overlay(&mut self.procgroup.edge, group.edge.as_ref());
            overlay(&mut self.procgroup.edge_hidden, group.edge_hidden.as_ref());
        }
        self
    }
}

static THEMES: Lazy<BTreeMap<&'static str, Theme>> = Lazy::new(|| {
    BTreeMap::from([
        (DEFAULT_THEME, Theme::default_theme()),
        ("fancy", Theme::fancy()),
        ("dark", Theme::dark()),
        ("fancy_dark", Theme::fancy_dark()),
    ])
});

fn overlay(target: &mut Attrs, source: Option<&RawAttrs>) {
    let Some(source) = source else {
        return;
    };
    for (key, value) in source {
        target.insert(key.clone(), value.as_string());
    }
}

/// Attribute value as written in a config file. Graphviz only sees strings,
/// but users naturally write `penwidth: 2` or `splines: true`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Bool(bool),
    Number(f64),
    String(String),
}

impl AttrValue {
    pub fn as_string(&self) -> String {
        match self {
            AttrValue::Bool(val) => val.to_string(),
            AttrValue::Number(val) => format!("{}", val),
            AttrValue::String(val) => val.clone(),
        }
    }
}

pub type RawAttrs = BTreeMap<String, AttrValue>;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GroupOverrides {
    #[serde(flatten)]
    pub attrs: RawAttrs,
    pub node: Option<RawAttrs>,
    pub edge: Option<RawAttrs>,
    pub edge_hidden: Option<RawAttrs>,
}

/// Partial theme: every role is optional and only the attributes given are replaced.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ThemeOverrides {
    pub graph: Option<RawAttrs>,
    pub node: Option<RawAttrs>,
    pub edge: Option<RawAttrs>,
    pub edge_hidden: Option<RawAttrs>,
    pub start: Option<RawAttrs>,
    pub end: Option<RawAttrs>,
    pub procgroup: Option<GroupOverrides>,
}

/// How a theme is requested: by catalog name or as overrides of a base theme.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ThemeSpec {
    Name(String),
    Overrides(ThemeOverrides),
}

impl Default for ThemeSpec {
    fn default() -> Self {
        ThemeSpec::Name(DEFAULT_THEME.to_string())
    }
}

impl From<&str> for ThemeSpec {
    fn from(name: &str) -> Self {
        ThemeSpec::Name(name.to_string())
    }
}

/// Resolve a theme request. Override maps are applied on top of the catalog theme `base`.
pub fn resolve(spec: &ThemeSpec, base: &str) -> Result<Theme> {
    match spec {
        ThemeSpec::Name(name) => Theme::named(name),
        ThemeSpec::Overrides(overrides) => Ok(Theme::named(base)?.merged(overrides)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn start_override() -> ThemeOverrides {
        serde_json::from_str(r##"{"start": {"style": "filled", "color": "#59b95f", "penwidth": 2}}"##)
            .expect("override should parse")
    }

    #[test]
    fn catalog_contains_builtin_themes() {
        let names: Vec<&str> = Theme::names().collect();
        assert_eq!(names, vec!["dark", "default", "fancy", "fancy_dark"]);
        assert_eq!(Theme::named("dark").unwrap(), Theme::dark());
    }

    #[test]
    fn unknown_theme_is_rejected() {
        let err = resolve(&ThemeSpec::from("doesnotexist"), DEFAULT_THEME).unwrap_err();
        assert!(matches!(err, DiagramError::UnknownTheme { ref name } if name == "doesnotexist"));

        let err = resolve(&ThemeSpec::Overrides(ThemeOverrides::default()), "nope").unwrap_err();
        assert!(matches!(err, DiagramError::UnknownTheme { .. }));
    }

    #[test]
    fn empty_override_returns_base_unchanged() {
        for name in Theme::names() {
            let resolved = resolve(&ThemeSpec::Overrides(ThemeOverrides::default()), name).unwrap();
            assert_eq!(resolved, Theme::named(name).unwrap(), "{name}");
        }
    }

    #[test]
    fn override_touches_only_its_role() {
        let base = Theme::default_theme();
        let resolved = resolve(&ThemeSpec::Overrides(start_override()), DEFAULT_THEME).unwrap();

        assert_eq!(resolved.start.get("style").map(String::as_str), Some("filled"));
        assert_eq!(resolved.start.get("color").map(String::as_str), Some("#59b95f"));
        assert_eq!(resolved.start.get("penwidth").map(String::as_str), Some("2"));
        // inherited from the base bundle
        assert_eq!(resolved.start.get("shape").map(String::as_str), Some("diamond"));

        assert_eq!(resolved.graph, base.graph);
        assert_eq!(resolved.node, base.node);
        assert_eq!(resolved.edge, base.edge);
        assert_eq!(resolved.edge_hidden, base.edge_hidden);
        assert_eq!(resolved.end, base.end);
        assert_eq!(resolved.procgroup, base.procgroup);
    }

    #[test]
    fn merge_is_idempotent() {
        let spec = ThemeSpec::Overrides(start_override());
        let once = resolve(&spec, "dark").unwrap();
        let twice = once.clone().merged(&start_override());
        assert_eq!(once, twice);
        assert_eq!(once, resolve(&spec, "dark").unwrap());
    }

    #[test]
    fn group_overrides_merge_nested_bundles() {
        let overrides: ThemeOverrides = serde_json::from_str(
            r##"{"procgroup": {"color": "#123456", "edge": {"color": "red"}}}"##,
        )
        .unwrap();
        let resolved = Theme::default_theme().merged(&overrides);
        assert_eq!(resolved.procgroup.attrs.get("color").map(String::as_str), Some("#123456"));
        assert_eq!(resolved.procgroup.attrs.get("labeljust").map(String::as_str), Some("l"));
        assert_eq!(resolved.procgroup.edge.get("color").map(String::as_str), Some("red"));
        assert_eq!(resolved.procgroup.edge.get("arrowsize").map(String::as_str), Some("0.8"));
        assert!(!resolved.procgroup.attrs.contains_key("edge"));
    }

    #[test]
    fn theme_spec_parses_name_or_map() {
        let named: ThemeSpec = serde_json::from_str("\"fancy\"").unwrap();
        assert_eq!(named, ThemeSpec::from("fancy"));
        let map: ThemeSpec = serde_json::from_str(r#"{"edge": {"color": "blue"}}"#).unwrap();
        assert!(matches!(map, ThemeSpec::Overrides(_)));
    }
}
