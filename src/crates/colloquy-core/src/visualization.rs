//! Graph rendering for documentation and debugging
//!
//! Renders a compiled workflow as a Mermaid flowchart (the default, see
//! [`CompiledGraph::describe`](crate::CompiledGraph::describe)) or as a DOT
//! digraph for Graphviz.
//!
//! ```text
//! graph TD
//!     START((START))
//!     END((END))
//!     reporter(["reporter"])
//!     critic{"critic"}
//!     human[/"human"/]
//!     START --> reporter
//!     reporter --> critic
//!     critic -.-> ta_review
//!     critic -.-> human
//! ```
//!
//! Shapes encode behavior: nodes with a conditional edge are diamonds,
//! interrupt points are parallelograms, streaming nodes are stadiums.
//! Conditional edges are dashed, one line per declared target. Output is
//! deterministic: nodes follow registration order.

use crate::graph::{Edge, Graph, NodeSpec, END};
use crate::interrupt::InterruptConfig;
use std::fmt::Write;

const START: &str = "__start__";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VisualizationFormat {
    #[default]
    Mermaid,
    Dot,
}

impl std::str::FromStr for VisualizationFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mermaid" => Ok(Self::Mermaid),
            "dot" | "graphviz" => Ok(Self::Dot),
            other => Err(format!("unknown format '{other}', expected mermaid or dot")),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct VisualizationOptions {
    pub format: VisualizationFormat,
    pub title: Option<String>,
}

impl VisualizationOptions {
    pub fn mermaid() -> Self {
        Self::default()
    }

    pub fn dot() -> Self {
        Self {
            format: VisualizationFormat::Dot,
            ..Default::default()
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}

pub fn visualize(graph: &Graph, interrupts: &InterruptConfig, options: &VisualizationOptions) -> String {
    match options.format {
        VisualizationFormat::Mermaid => visualize_mermaid(graph, interrupts, options),
        VisualizationFormat::Dot => visualize_dot(graph, interrupts, options),
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum NodeStyle {
    Router,
    Interrupt,
    Streaming,
    Plain,
}

fn style_of(graph: &Graph, interrupts: &InterruptConfig, spec: &NodeSpec) -> NodeStyle {
    if interrupts.should_interrupt_before(&spec.name) {
        NodeStyle::Interrupt
    } else if matches!(graph.edge(&spec.name), Some(Edge::Conditional { .. })) {
        NodeStyle::Router
    } else if spec.kind.is_streaming() {
        NodeStyle::Streaming
    } else {
        NodeStyle::Plain
    }
}

fn nodes_in_order(graph: &Graph) -> impl Iterator<Item = &NodeSpec> {
    graph.order.iter().filter_map(|name| graph.node(name))
}

fn visualize_mermaid(graph: &Graph, interrupts: &InterruptConfig, options: &VisualizationOptions) -> String {
    let mut out = String::new();
    if let Some(title) = &options.title {
        let _ = writeln!(out, "---\ntitle: {}\n---", escape_mermaid(title));
    }
    out.push_str("graph TD\n");

    let _ = writeln!(out, "    {}((START))", sanitize_id(START));
    let _ = writeln!(out, "    style {} fill:#90EE90,stroke:#228B22,stroke-width:3px", sanitize_id(START));
    let _ = writeln!(out, "    {}((END))", sanitize_id(END));
    let _ = writeln!(out, "    style {} fill:#FFB6C1,stroke:#DC143C,stroke-width:3px", sanitize_id(END));

    for spec in nodes_in_order(graph) {
        let id = sanitize_id(&spec.name);
        let label = escape_mermaid(&spec.name);
        let (open, close, fill) = match style_of(graph, interrupts, spec) {
            NodeStyle::Router => ("{", "}", "fill:#FFE4B5,stroke:#FF8C00"),
            NodeStyle::Interrupt => ("[/", "/]", "fill:#ADD8E6,stroke:#4682B4"),
            NodeStyle::Streaming => ("([", "])", "fill:#E6E6FA,stroke:#6A5ACD"),
            NodeStyle::Plain => ("[", "]", "fill:#F0F0F0,stroke:#666"),
        };
        let _ = writeln!(out, "    {id}{open}\"{label}\"{close}");
        let _ = writeln!(out, "    style {id} {fill},stroke-width:2px");
    }

    if let Some(entry) = &graph.entry {
        let _ = writeln!(out, "    {} --> {}", sanitize_id(START), sanitize_id(entry));
    }
    for from in &graph.order {
        match graph.edge(from) {
            Some(Edge::Direct(to)) => {
                let _ = writeln!(out, "    {} --> {}", sanitize_id(from), sanitize_id(to));
            }
            Some(Edge::Conditional { targets, .. }) => {
                for to in targets {
                    let _ = writeln!(out, "    {} -.-> {}", sanitize_id(from), sanitize_id(to));
                }
            }
            None => {
                let _ = writeln!(out, "    {} --> {}", sanitize_id(from), sanitize_id(END));
            }
        }
    }

    out
}

fn visualize_dot(graph: &Graph, interrupts: &InterruptConfig, options: &VisualizationOptions) -> String {
    let mut out = String::from("digraph {\n");
    if let Some(title) = &options.title {
        let _ = writeln!(out, "    label=\"{}\";", escape_dot(title));
    }
    out.push_str("    node [shape=box, style=rounded];\n");
    let _ = writeln!(out, "    \"{START}\" [shape=circle, style=filled, fillcolor=green];");
    let _ = writeln!(out, "    \"{END}\" [shape=circle, style=filled, fillcolor=red];");

    for spec in nodes_in_order(graph) {
        let attrs = match style_of(graph, interrupts, spec) {
            NodeStyle::Router => " [shape=diamond]",
            NodeStyle::Interrupt => " [shape=parallelogram, style=filled, fillcolor=lightblue]",
            NodeStyle::Streaming => " [style=\"rounded,bold\"]",
            NodeStyle::Plain => "",
        };
        let _ = writeln!(out, "    \"{}\"{attrs};", escape_dot(&spec.name));
    }

    if let Some(entry) = &graph.entry {
        let _ = writeln!(out, "    \"{START}\" -> \"{}\";", escape_dot(entry));
    }
    for from in &graph.order {
        match graph.edge(from) {
            Some(Edge::Direct(to)) => {
                let _ = writeln!(out, "    \"{}\" -> \"{}\";", escape_dot(from), escape_dot(to));
            }
            Some(Edge::Conditional { targets, .. }) => {
                for to in targets {
                    let _ = writeln!(
                        out,
                        "    \"{}\" -> \"{}\" [style=dashed];",
                        escape_dot(from),
                        escape_dot(to)
                    );
                }
            }
            None => {
                let _ = writeln!(out, "    \"{}\" -> \"{END}\";", escape_dot(from));
            }
        }
    }

    out.push_str("}\n");
    out
}

fn escape_dot(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"").replace('\n', "\\n")
}

fn escape_mermaid(s: &str) -> String {
    s.replace('"', "&quot;").replace('<', "&lt;").replace('>', "&gt;")
}

/// Mermaid ids must be alphanumeric plus underscore, and lowercase `end`
/// is a keyword.
fn sanitize_id(s: &str) -> String {
    match s {
        START => "START".to_string(),
        END => "END".to_string(),
        _ => s.replace(['-', '.', ' '], "_"),
    }
}
