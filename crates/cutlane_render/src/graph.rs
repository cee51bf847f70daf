//! Filter graph IR.
//!
//! Nodes are connected only through opaque string labels. Nothing here
//! validates the graph; [`FilterGraph::duplicate_outputs`] exists for tests
//! and diagnostics.

use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
enum FilterOpt {
    Keyed(String, String),
    Positional(String),
}

/// A named, parameterized filter, e.g. `trim=start=1:end=5`.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterOp {
    name: String,
    opts: Vec<FilterOpt>,
}

impl FilterOp {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            opts: vec![],
        }
    }

    /// Add a `key=value` option.
    pub fn arg(mut self, key: impl Into<String>, value: impl fmt::Display) -> Self {
        self.opts
            .push(FilterOpt::Keyed(key.into(), value.to_string()));
        self
    }

    /// Add a `key=value` option only when `value` is set.
    pub fn opt_arg<V: fmt::Display>(self, key: impl Into<String>, value: Option<V>) -> Self {
        match value {
            Some(v) => self.arg(key, v),
            None => self,
        }
    }

    /// Add a positional option.
    pub fn positional(mut self, value: impl fmt::Display) -> Self {
        self.opts.push(FilterOpt::Positional(value.to_string()));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for FilterOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        for (i, opt) in self.opts.iter().enumerate() {
            f.write_str(if i == 0 { "=" } else { ":" })?;
            match opt {
                FilterOpt::Keyed(k, v) => write!(f, "{k}={v}")?,
                FilterOpt::Positional(v) => f.write_str(v)?,
            }
        }
        Ok(())
    }
}

/// Input labels, a chain of filters, output labels.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterNode {
    pub inputs: Vec<String>,
    pub ops: Vec<FilterOp>,
    pub outputs: Vec<String>,
}

impl FilterNode {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn input(mut self, label: impl Into<String>) -> Self {
        self.inputs.push(label.into());
        self
    }

    pub fn filter(mut self, op: FilterOp) -> Self {
        self.ops.push(op);
        self
    }

    pub fn output(mut self, label: impl Into<String>) -> Self {
        self.outputs.push(label.into());
        self
    }
}

impl fmt::Display for FilterNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for label in &self.inputs {
            write!(f, "[{label}]")?;
        }
        for (i, op) in self.ops.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{op}")?;
        }
        for label in &self.outputs {
            write!(f, "[{label}]")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterGraph {
    nodes: Vec<FilterNode>,
}

impl FilterGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, node: FilterNode) {
        self.nodes.push(node);
    }

    pub fn nodes(&self) -> &[FilterNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Output labels produced by more than one node, in first-seen order.
    pub fn duplicate_outputs(&self) -> Vec<String> {
        let mut seen: HashMap<&str, usize> = HashMap::new();
        let mut dups = Vec::new();
        for label in self.nodes.iter().flat_map(|n| n.outputs.iter()) {
            let count = seen.entry(label.as_str()).or_insert(0);
            *count += 1;
            if *count == 2 {
                dups.push(label.clone());
            }
        }
        dups
    }
}

impl fmt::Display for FilterGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, node) in self.nodes.iter().enumerate() {
            if i > 0 {
                f.write_str(";")?;
            }
            write!(f, "{node}")?;
        }
        Ok(())
    }
}

/// Hands out labels unique within one job.
#[derive(Debug, Default)]
pub struct LabelAllocator {
    next: usize,
}

impl LabelAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&mut self, prefix: &str) -> String {
        let label = format!("{prefix}{}", self.next);
        self.next += 1;
        label
    }
}
