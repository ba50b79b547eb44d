//! # colloquy-roles - Classroom Roles and Workflow
//!
//! The seminar roles that run on the [`colloquy_core`] engine, and the
//! builder that wires them into one resumable workflow:
//!
//! - **[Reporter](nodes::reporter)** - streams a report on the question from
//!   retrieved material
//! - **[Critic](nodes::critic)** - extracts discussion points with opposing cases
//! - **[Teaching assistant](nodes::ta_review)** - approves the points or sends
//!   them back for revision
//! - **[Human](nodes::human)** - picks a point and case while the thread is paused
//! - **[Checker](nodes::check)** - reports concrete examples for the chosen case
//! - **[Explorer](nodes::explore)** - writes a detailed sub-report for one point
//!
//! Roles depend on two collaborator traits, [`TextModel`] and [`Retriever`].
//! [`ScriptedModel`] and [`StaticRetriever`] are deterministic
//! implementations for tests and demos.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use colloquy_core::state::from_value;
//! use colloquy_roles::{ClassroomBuilder, ConfigLoader, ScriptedModel, StaticRetriever};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ConfigLoader::new().load().await?;
//! let graph = ClassroomBuilder::new(
//!     Arc::new(ScriptedModel::classroom()),
//!     Arc::new(StaticRetriever::default()),
//! )
//! .with_workflow(config.workflow.clone())
//! .with_engine_config(config.engine.clone())
//! .with_checkpointer(config.checkpoint.open_saver().await?)
//! .build()?;
//!
//! graph
//!     .invoke("lesson-1", Some(from_value(json!({"query": "Do tariffs work?"}))?))
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod content;
pub mod error;
pub mod model;
pub mod nodes;
pub mod templates;
pub mod workflow;

pub use config::{
    CheckpointBackend, CheckpointConfig, ColloquyConfig, ConfigLoader, LogFormat, LoggingConfig,
    WorkflowConfig,
};
pub use content::{CriticContent, CriticPoint, HumanSelection, PointSelection, TaFeedback};
pub use error::{Result, RoleError};
pub use model::{Document, Retriever, ScriptedModel, StaticRetriever, TextModel, TextStream};
pub use nodes::RoleContext;
pub use workflow::ClassroomBuilder;
