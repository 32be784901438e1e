//! Collapsing of hidden processes.
//!
//! A hidden process is never drawn. Every visible process that reaches it is
//! instead connected straight to the visible processes behind it, and those
//! edges are flagged as collapsed so they can be styled differently.

use std::collections::HashSet;

use tracing::trace;

use crate::error::{DiagramError, HiddenNodeViolation, Result};
use crate::ir::{Pipeline, Process};

/// Check that every hidden process can be replaced by plain edges.
///
/// A hidden end process has nothing to collapse into, and a hidden process with
/// several required and several dependent processes would need a many-to-many
/// edge explosion.
pub fn validate_hidden(pipeline: &Pipeline) -> Result<()> {
    for process in pipeline.processes().iter().filter(|p| p.is_hidden()) {
        let requires = process.requires.len();
        let nexts = process.nexts.len();
        let violation = if nexts == 0 {
            Some(HiddenNodeViolation::Terminal)
        } else if requires > 1 && nexts > 1 {
            Some(HiddenNodeViolation::AmbiguousFan { requires, nexts })
        } else {
            None
        };
        if let Some(violation) = violation {
            return Err(DiagramError::InvalidHiddenNode {
                process: process.name.clone(),
                violation,
            });
        }
    }
    Ok(())
}

/// Visible processes reachable from `process` through hidden ones.
///
/// Yields `(target, collapsed)` pairs; `collapsed` is true when at least one
/// hidden process was skipped on the way. A target can be yielded more than
/// once when several paths lead to it. Each hidden process is expanded once.
pub fn visible_successors<'a>(pipeline: &'a Pipeline, process: &'a Process) -> VisibleSuccessors<'a> {
    let mut stack: Vec<(&'a Process, bool)> = pipeline.nexts(process).map(|next| (next, false)).collect();
    stack.reverse();
    VisibleSuccessors {
        pipeline,
        stack,
        expanded: HashSet::new(),
    }
}

/// Depth-first walk over successor lists, see [`visible_successors`].
pub struct VisibleSuccessors<'a> {
    pipeline: &'a Pipeline,
    stack: Vec<(&'a Process, bool)>,
    expanded: HashSet<&'a str>,
}

impl<'a> Iterator for VisibleSuccessors<'a> {
    type Item = (&'a Process, bool);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some((process, collapsed)) = self.stack.pop() {
            if !process.is_hidden() {
                return Some((process, collapsed));
            }
            // everything behind a hidden process is collapsed, so one expansion covers all paths
            if !self.expanded.insert(process.name.as_str()) {
                continue;
            }
            trace!(hidden = %process.name, "skipping hidden process");
            let pipeline = self.pipeline;
            let len = self.stack.len();
            self.stack
                .extend(pipeline.nexts(process).map(|next| (next, true)));
            self.stack[len..].reverse();
        }
        None
    }
}
