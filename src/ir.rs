use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use serde::Deserialize;

use crate::error::{DiagramError, Result};

/// Named set of processes drawn inside one cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessGroup {
    pub name: String,
    pub label: Option<String>,
}

impl ProcessGroup {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            label: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn display_name(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub struct ProcessOptions {
    /// Leave the process out of the diagram and collapse its connections.
    #[serde(default, rename = "diagram_hide", alias = "hidden")]
    pub hidden: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Process {
    pub name: String,
    pub description: Option<String>,
    pub requires: Vec<String>,
    /// Filled in by [`Pipeline::new`] from the other processes' `requires`.
    pub nexts: Vec<String>,
    pub options: ProcessOptions,
    pub group: Option<ProcessGroup>,
}

impl Process {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            requires: Vec::new(),
            nexts: Vec::new(),
            options: ProcessOptions::default(),
            group: None,
        }
    }

    pub fn requires<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.requires.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn hidden(mut self) -> Self {
        self.options.hidden = true;
        self
    }

    pub fn in_group(mut self, group: ProcessGroup) -> Self {
        self.group = Some(group);
        self
    }

    pub fn is_hidden(&self) -> bool {
        self.options.hidden
    }
}

/// Snapshot of a pipeline's process graph, taken once before the diagram is drawn.
#[derive(Debug, Clone)]
pub struct Pipeline {
    pub name: String,
    pub description: Option<String>,
    processes: Vec<Process>,
    index: HashMap<String, usize>,
    starts: BTreeSet<String>,
}

impl Pipeline {
    /// Build a pipeline from processes in declaration order.
    ///
    /// Successor lists are derived from `requires`, and repeated requirements are
    /// folded. Duplicate names, requirements on unknown processes and dependency
    /// cycles are rejected.
    pub fn new(name: impl Into<String>, mut processes: Vec<Process>) -> Result<Self> {
        let mut index = HashMap::with_capacity(processes.len());
        for (idx, process) in processes.iter().enumerate() {
            if index.insert(process.name.clone(), idx).is_some() {
                return Err(DiagramError::InvalidPipeline(format!(
                    "duplicate process `{}`",
                    process.name
                )));
            }
        }

        for process in processes.iter_mut() {
            process.nexts.clear();
            let mut seen = HashSet::with_capacity(process.requires.len());
            process.requires.retain(|name| seen.insert(name.clone()));
        }
        let mut links = Vec::new();
        for (idx, process) in processes.iter().enumerate() {
            for required in &process.requires {
                let Some(&upstream) = index.get(required) else {
                    return Err(DiagramError::InvalidPipeline(format!(
                        "process `{}` requires unknown process `{}`",
                        process.name, required
                    )));
                };
                links.push((upstream, idx));
            }
        }
        for (upstream, downstream) in links {
            let next = processes[downstream].name.clone();
            if !processes[upstream].nexts.contains(&next) {
                processes[upstream].nexts.push(next);
            }
        }

        let starts = processes
            .iter()
            .filter(|process| process.requires.is_empty())
            .map(|process| process.name.clone())
            .collect();

        let pipeline = Self {
            name: name.into(),
            description: None,
            processes,
            index,
            starts,
        };
        pipeline.check_acyclic()?;
        Ok(pipeline)
    }

    /// Replace the derived start processes with the ones the runtime was started with.
    pub fn with_starts<I, S>(mut self, starts: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set = BTreeSet::new();
        for name in starts {
            let name = name.into();
            if !self.index.contains_key(&name) {
                return Err(DiagramError::InvalidPipeline(format!(
                    "start process `{name}` is not part of the pipeline"
                )));
            }
            set.insert(name);
        }
        self.starts = set;
        Ok(self)
    }

    pub fn processes(&self) -> &[Process] {
        &self.processes
    }

    pub fn get(&self, name: &str) -> Option<&Process> {
        self.index.get(name).map(|&idx| &self.processes[idx])
    }

    pub fn is_start(&self, name: &str) -> bool {
        self.starts.contains(name)
    }

    pub fn starts(&self) -> impl Iterator<Item = &str> {
        self.starts.iter().map(String::as_str)
    }

    /// Iterate the successor processes of `process`.
    pub fn nexts<'a>(&'a self, process: &'a Process) -> impl Iterator<Item = &'a Process> + 'a {
        process.nexts.iter().filter_map(|name| self.get(name))
    }

    fn check_acyclic(&self) -> Result<()> {
        let mut indeg: Vec<usize> = self
            .processes
            .iter()
            .map(|process| process.requires.len())
            .collect();
        let mut ready: Vec<usize> = indeg
            .iter()
            .enumerate()
            .filter(|(_, deg)| **deg == 0)
            .map(|(idx, _)| idx)
            .collect();
        let mut visited = 0usize;
        while let Some(idx) = ready.pop() {
            visited += 1;
            for next in &self.processes[idx].nexts {
                let next_idx = self.index[next];
                let required = self.processes[next_idx]
                    .requires
                    .iter()
                    .filter(|name| **name == self.processes[idx].name)
                    .count();
                indeg[next_idx] = indeg[next_idx].saturating_sub(required);
                if indeg[next_idx] == 0 {
                    ready.push(next_idx);
                }
            }
        }
        if visited != self.processes.len() {
            let stuck: Vec<&str> = indeg
                .iter()
                .enumerate()
                .filter(|(_, deg)| **deg > 0)
                .map(|(idx, _)| self.processes[idx].name.as_str())
                .collect();
            return Err(DiagramError::InvalidPipeline(format!(
                "dependency cycle involving {}",
                stuck.join(", ")
            )));
        }
        Ok(())
    }

    /// Load a pipeline description written in JSON5 (plain JSON is accepted too).
    ///
    /// ```json5
    /// {
    ///   name: "MyPipeline",
    ///   groups: { PG: { label: "Process Group" } },
    ///   processes: [
    ///     { name: "A", description: "Process A" },
    ///     { name: "B", requires: ["A"], options: { diagram_hide: true } },
    ///     { name: "C", requires: ["B"], group: "PG" },
    ///   ],
    /// }
    /// ```
    pub fn from_json5(source: &str) -> Result<(Self, Option<serde_json::Value>)> {
        let file: PipelineFile =
            json5::from_str(source).map_err(|err| DiagramError::Config(err.to_string()))?;
        file.into_pipeline()
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PipelineFile {
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    options: Option<serde_json::Value>,
    #[serde(default)]
    groups: BTreeMap<String, GroupFile>,
    #[serde(default)]
    starts: Option<Vec<String>>,
    processes: Vec<ProcessFile>,
}

#[derive(Debug, Default, Deserialize)]
struct GroupFile {
    #[serde(default)]
    label: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ProcessFile {
    name: String,
    #[serde(default, alias = "desc")]
    description: Option<String>,
    #[serde(default)]
    requires: Vec<String>,
    #[serde(default)]
    group: Option<String>,
    #[serde(default)]
    options: ProcessOptions,
}

impl PipelineFile {
    fn into_pipeline(self) -> Result<(Pipeline, Option<serde_json::Value>)> {
        let groups = self.groups;
        let processes = self
            .processes
            .into_iter()
            .map(|proc_file| {
                let group = proc_file.group.map(|name| {
                    let label = groups.get(&name).and_then(|group| group.label.clone());
                    ProcessGroup { name, label }
                });
                Process {
                    name: proc_file.name,
                    description: proc_file.description,
                    requires: proc_file.requires,
                    nexts: Vec::new(),
                    options: proc_file.options,
                    group,
                }
            })
            .collect();

        let mut pipeline = Pipeline::new(self.name.trim(), processes)?;
        pipeline.description = self.description;
        if let Some(starts) = self.starts {
            pipeline = pipeline.with_starts(starts)?;
        }
        Ok((pipeline, self.options))
    }
}
