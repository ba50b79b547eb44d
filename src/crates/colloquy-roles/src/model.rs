//! Collaborator traits for text generation and retrieval
//!
//! Roles never talk to a model provider directly. They receive an
//! `Arc<dyn TextModel>` and an `Arc<dyn Retriever>`, so a hosted model, a
//! local one or the deterministic [`ScriptedModel`] can be swapped in without
//! touching the workflow.
//!
//! ```text
//!  role node ──prompt──► TextModel ──text / deltas──► role node
//!      │
//!      └──query──► Retriever ──documents──► prompt context
//! ```

use crate::error::{Result, RoleError};
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Text deltas produced by [`TextModel::stream`].
pub type TextStream = BoxStream<'static, Result<String>>;

/// A generative text service.
///
/// Implementations must be `Send + Sync`; share them across nodes with
/// `Arc<dyn TextModel>`.
#[async_trait]
pub trait TextModel: Send + Sync {
    /// Produce the complete response to `prompt`.
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Produce the response to `prompt` as a stream of text deltas.
    ///
    /// The default implementation yields the whole [`generate`](Self::generate)
    /// result as a single delta.
    async fn stream(&self, prompt: &str) -> Result<TextStream> {
        let text = self.generate(prompt).await?;
        Ok(stream::once(async move { Ok(text) }).boxed())
    }
}

/// A piece of retrieved context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl Document {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            source: None,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

/// A source of context documents for a query.
#[async_trait]
pub trait Retriever: Send + Sync {
    /// At most `limit` documents relevant to `query`.
    async fn retrieve(&self, query: &str, limit: usize) -> Result<Vec<Document>>;
}

struct Script {
    marker: String,
    responses: Vec<String>,
    served: AtomicUsize,
}

/// Deterministic [`TextModel`] answering from a script.
///
/// Each entry pairs a marker with one or more responses. A prompt is answered
/// by the first entry whose marker it contains; successive matches walk
/// through the entry's responses and then repeat the last one. Streaming
/// splits the response into word-sized deltas.
///
/// ```rust
/// use colloquy_roles::{ScriptedModel, TextModel};
///
/// # async fn example() -> colloquy_roles::Result<()> {
/// let model = ScriptedModel::new()
///     .on("Role: teaching assistant", ["REVISE\nAdd a third case.", "APPROVE"]);
///
/// assert!(model.generate("Role: teaching assistant\n...").await?.starts_with("REVISE"));
/// assert_eq!(model.generate("Role: teaching assistant\n...").await?, "APPROVE");
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct ScriptedModel {
    scripts: Vec<Script>,
    fallback: Option<String>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer prompts containing `marker` with `responses`, in order.
    pub fn on<I, S>(mut self, marker: impl Into<String>, responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scripts.push(Script {
            marker: marker.into(),
            responses: responses.into_iter().map(Into::into).collect(),
            served: AtomicUsize::new(0),
        });
        self
    }

    /// Answer unmatched prompts with `response` instead of failing.
    pub fn with_fallback(mut self, response: impl Into<String>) -> Self {
        self.fallback = Some(response.into());
        self
    }

    /// Every prompt received so far, oldest first.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }

    /// A script covering every classroom role, used by the CLI demo.
    pub fn classroom() -> Self {
        Self::new()
            .on(
                "Role: reporter",
                [concat!(
                    "Tariffs are taxes on imported goods.\n",
                    "- Tariffs raise the price of imports for domestic buyers (trade brief)\n",
                    "- Trading partners often answer with tariffs of their own (policy review)\n",
                    "- Protected industries gain while consumers pay more (economics notes)\n",
                )],
            )
            .on(
                "Role: critic",
                [r#"{"points": [
                    {"title": "Do tariffs protect domestic jobs?",
                     "cases": ["Yes: protected industries keep hiring", "No: retaliation costs jobs elsewhere"]},
                    {"title": "Are retaliatory tariffs legitimate?",
                     "cases": ["Yes: they restore a balance", "No: they escalate disputes"]},
                    {"title": "What are the long-term effects of tariffs?",
                     "cases": ["Supply chains relocate", "Prices stay permanently higher"]}
                ]}"#],
            )
            .on("Role: teaching assistant", ["APPROVE\nThe points are ready for discussion."])
            .on(
                "Role: checker",
                [concat!(
                    "- Steel tariffs were followed by new mill investment (industry report)\n",
                    "- Washing machine tariffs raised retail prices (price survey)\n",
                    "- Export industries faced retaliation (trade statistics)\n",
                )],
            )
            .on(
                "Role: explorer",
                [concat!(
                    "The point deserves a closer look.\n",
                    "- Who pays the tariff in practice (incidence study)\n",
                    "- How long the effect lasts (historical data)\n",
                )],
            )
    }

    fn respond(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().push(prompt.to_string());

        let script = self.scripts.iter().find(|s| prompt.contains(&s.marker));
        match script {
            Some(script) if !script.responses.is_empty() => {
                let n = script.served.fetch_add(1, Ordering::SeqCst);
                let index = n.min(script.responses.len() - 1);
                Ok(script.responses[index].clone())
            }
            _ => self.fallback.clone().ok_or_else(|| {
                let head = prompt.lines().next().unwrap_or_default();
                RoleError::Model(format!("no scripted response for prompt '{head}'"))
            }),
        }
    }
}

impl std::fmt::Debug for ScriptedModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedModel")
            .field(
                "markers",
                &self.scripts.iter().map(|s| s.marker.as_str()).collect::<Vec<_>>(),
            )
            .field("fallback", &self.fallback.is_some())
            .finish()
    }
}

#[async_trait]
impl TextModel for ScriptedModel {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.respond(prompt)
    }

    async fn stream(&self, prompt: &str) -> Result<TextStream> {
        let text = self.respond(prompt)?;
        let deltas: Vec<Result<String>> = text
            .split_inclusive(' ')
            .map(|delta| Ok(delta.to_string()))
            .collect();
        Ok(stream::iter(deltas).boxed())
    }
}

/// [`Retriever`] over a fixed set of documents.
///
/// Documents are ranked by how many distinct query terms they contain. When
/// nothing matches, the first documents are returned so roles always have
/// some context.
#[derive(Debug, Clone, Default)]
pub struct StaticRetriever {
    documents: Vec<Document>,
}

impl StaticRetriever {
    pub fn new(documents: impl IntoIterator<Item = Document>) -> Self {
        Self {
            documents: documents.into_iter().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

fn terms(text: &str) -> Vec<String> {
    let mut terms: Vec<String> = text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() > 2)
        .map(str::to_lowercase)
        .collect();
    terms.sort();
    terms.dedup();
    terms
}

#[async_trait]
impl Retriever for StaticRetriever {
    async fn retrieve(&self, query: &str, limit: usize) -> Result<Vec<Document>> {
        let query_terms = terms(query);
        let mut scored: Vec<(usize, &Document)> = self
            .documents
            .iter()
            .map(|doc| {
                let content = doc.content.to_lowercase();
                let hits = query_terms.iter().filter(|t| content.contains(t.as_str())).count();
                (hits, doc)
            })
            .filter(|(hits, _)| *hits > 0)
            .collect();
        // Stable sort keeps document order among equal scores.
        scored.sort_by(|a, b| b.0.cmp(&a.0));

        let documents: Vec<Document> = if scored.is_empty() {
            self.documents.iter().take(limit).cloned().collect()
        } else {
            scored.into_iter().take(limit).map(|(_, d)| d.clone()).collect()
        };
        tracing::debug!(query, found = documents.len(), "retrieved documents");
        Ok(documents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_model_walks_responses() {
        let model = ScriptedModel::new().on("Role: critic", ["first", "second"]);

        assert_eq!(model.generate("Role: critic\nA").await.unwrap(), "first");
        assert_eq!(model.generate("Role: critic\nB").await.unwrap(), "second");
        assert_eq!(model.generate("Role: critic\nC").await.unwrap(), "second");
        assert_eq!(model.prompts().len(), 3);
    }

    #[tokio::test]
    async fn test_scripted_model_unmatched_prompt() {
        let model = ScriptedModel::new();
        let err = model.generate("Role: reporter\nQuestion").await.unwrap_err();
        assert!(matches!(err, RoleError::Model(msg) if msg.contains("Role: reporter")));

        let model = ScriptedModel::new().with_fallback("fine");
        assert_eq!(model.generate("anything").await.unwrap(), "fine");
    }

    #[tokio::test]
    async fn test_scripted_stream_concatenates_to_response() {
        let model = ScriptedModel::new().on("Role: reporter", ["Tariffs raise prices."]);
        let deltas: Vec<String> = model
            .stream("Role: reporter")
            .await
            .unwrap()
            .map(|d| d.unwrap())
            .collect()
            .await;

        assert_eq!(deltas, vec!["Tariffs ", "raise ", "prices."]);
        assert_eq!(deltas.concat(), "Tariffs raise prices.");
    }

    #[tokio::test]
    async fn test_static_retriever_ranks_by_terms() {
        let retriever = StaticRetriever::new([
            Document::new("Weather in spring"),
            Document::new("Tariffs on steel imports").with_source("brief"),
            Document::new("Steel tariffs and import prices"),
        ]);

        let found = retriever.retrieve("steel import tariffs prices", 2).await.unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].content, "Steel tariffs and import prices");
        assert_eq!(found[1].source.as_deref(), Some("brief"));

        let fallback = retriever.retrieve("volcanoes", 1).await.unwrap();
        assert_eq!(fallback[0].content, "Weather in spring");
    }
}
