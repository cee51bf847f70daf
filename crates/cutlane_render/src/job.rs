use crate::graph::FilterGraph;
use cutlane_core::types::TimeUs;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum StreamKind {
    Video,
    Audio,
}

impl StreamKind {
    fn specifier(&self) -> &'static str {
        match self {
            StreamKind::Video => "v",
            StreamKind::Audio => "a",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobInput {
    pub path: PathBuf,
    pub index: usize,
    /// Options placed before this input's `-i`.
    pub options: Vec<String>,
}

/// One invocation of the media engine.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    inputs: Vec<JobInput>,
    global_options: Vec<String>,
    graph: Option<FilterGraph>,
    codecs: BTreeMap<StreamKind, String>,
    bitrates: BTreeMap<StreamKind, String>,
    maps: Vec<String>,
    duration: Option<TimeUs>,
    output: PathBuf,
    report_progress: bool,
}

impl Job {
    pub fn new(output: impl Into<PathBuf>) -> Self {
        Self {
            inputs: vec![],
            global_options: vec![],
            graph: None,
            codecs: BTreeMap::new(),
            bitrates: BTreeMap::new(),
            maps: vec![],
            duration: None,
            output: output.into(),
            report_progress: true,
        }
    }

    /// Register an input file and return its index. A path already
    /// registered keeps its index and its original options.
    pub fn add_input(&mut self, path: impl AsRef<Path>, options: &[&str]) -> usize {
        let path = path.as_ref();
        if let Some(existing) = self.inputs.iter().find(|i| i.path == path) {
            return existing.index;
        }
        let index = self.inputs.len();
        self.inputs.push(JobInput {
            path: path.to_path_buf(),
            index,
            options: options.iter().map(|s| s.to_string()).collect(),
        });
        index
    }

    pub fn global_option<I, S>(&mut self, args: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.global_options.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn set_graph(&mut self, graph: FilterGraph) -> &mut Self {
        self.graph = Some(graph);
        self
    }

    /// Select the codec for a stream kind, replacing any earlier choice.
    pub fn codec(&mut self, kind: StreamKind, codec: impl Into<String>) -> &mut Self {
        self.codecs.insert(kind, codec.into());
        self
    }

    /// Select the bitrate for a stream kind, replacing any earlier choice.
    pub fn bitrate(&mut self, kind: StreamKind, rate: impl Into<String>) -> &mut Self {
        self.bitrates.insert(kind, rate.into());
        self
    }

    /// Map a stream into the output: a graph label like `[v3]` or an input
    /// stream like `0:a:0`.
    pub fn map(&mut self, spec: impl Into<String>) -> &mut Self {
        self.maps.push(spec.into());
        self
    }

    pub fn set_duration(&mut self, duration: TimeUs) -> &mut Self {
        self.duration = Some(duration);
        self
    }

    /// Whether to ask the engine for machine-readable progress on stdout.
    pub fn report_progress(&mut self, enabled: bool) -> &mut Self {
        self.report_progress = enabled;
        self
    }

    pub fn inputs(&self) -> &[JobInput] {
        &self.inputs
    }

    pub fn graph(&self) -> Option<&FilterGraph> {
        self.graph.as_ref()
    }

    pub fn maps(&self) -> &[String] {
        &self.maps
    }

    pub fn declared_duration(&self) -> Option<TimeUs> {
        self.duration
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    /// The engine argument vector (without the binary).
    pub fn to_args(&self) -> Vec<String> {
        self.build_args(|p| p.to_string_lossy().into_owned(), |g| g.to_string())
    }

    /// The full command line for logs, with paths and the graph quoted.
    pub fn command_line(&self, binary: &Path) -> String {
        let quote = |s: &str| format!("\"{}\"", s.replace('"', "\\\""));
        let args = self.build_args(
            |p| quote(&p.to_string_lossy()),
            |g| quote(&g.to_string()),
        );
        let mut line = quote(&binary.to_string_lossy());
        for arg in args {
            line.push(' ');
            line.push_str(&arg);
        }
        line
    }

    fn build_args(
        &self,
        path: impl Fn(&Path) -> String,
        graph: impl Fn(&FilterGraph) -> String,
    ) -> Vec<String> {
        let mut args = Vec::new();
        if self.report_progress {
            args.push("-progress".to_string());
            args.push("pipe:1".to_string());
        }
        args.push("-y".to_string());

        for input in &self.inputs {
            args.extend(input.options.iter().cloned());
            args.push("-i".to_string());
            args.push(path(&input.path));
        }

        if let Some(g) = self.graph.as_ref().filter(|g| !g.is_empty()) {
            args.push("-filter_complex".to_string());
            args.push(graph(g));
        }

        for spec in &self.maps {
            args.push("-map".to_string());
            args.push(spec.clone());
        }
        for (kind, codec) in &self.codecs {
            args.push(format!("-c:{}", kind.specifier()));
            args.push(codec.clone());
        }
        for (kind, rate) in &self.bitrates {
            args.push(format!("-b:{}", kind.specifier()));
            args.push(rate.clone());
        }
        args.extend(self.global_options.iter().cloned());

        if let Some(d) = self.duration {
            args.push("-t".to_string());
            args.push(d.to_string());
        }

        args.push(path(&self.output));
        args
    }
}
