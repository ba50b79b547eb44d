//! End-to-end runs of the classroom workflow with scripted roles

use async_trait::async_trait;
use colloquy_checkpoint::FileCheckpointSaver;
use colloquy_core::state::from_value;
use colloquy_core::{CompiledGraph, GraphError, ReportTree, State, StreamEvent, ThreadStatus};
use colloquy_roles::{
    ClassroomBuilder, Document, RoleError, ScriptedModel, StaticRetriever, TextModel,
    WorkflowConfig,
};
use futures::StreamExt;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

fn input(value: Value) -> State {
    from_value(value).unwrap()
}

fn retriever() -> Arc<StaticRetriever> {
    Arc::new(StaticRetriever::new([
        Document::new("Steel tariffs were followed by new mill investment").with_source("industry report"),
        Document::new("Retaliation against tariffs hit farm exports").with_source("trade statistics"),
        Document::new("Tariffs on washing machines raised retail prices").with_source("price survey"),
    ]))
}

fn classroom(model: Arc<dyn TextModel>, workflow: WorkflowConfig) -> CompiledGraph {
    ClassroomBuilder::new(model, retriever())
        .with_workflow(workflow)
        .build()
        .unwrap()
}

fn critic_prompts(model: &ScriptedModel) -> Vec<String> {
    model
        .prompts()
        .into_iter()
        .filter(|p| p.starts_with("Role: critic"))
        .collect()
}

#[tokio::test]
async fn test_lesson_pauses_for_human_then_checks_case() {
    let model = Arc::new(ScriptedModel::classroom());
    let graph = classroom(model.clone(), WorkflowConfig::default());

    let paused = graph
        .invoke("lesson", Some(input(json!({"query": "Do tariffs protect jobs?"}))))
        .await
        .unwrap();
    assert!(paused["reporter_content"].as_str().unwrap().contains("Tariffs are taxes"));
    assert_eq!(paused["critic_content"]["points"].as_array().unwrap().len(), 3);
    assert_eq!(paused["ta_feedback"]["approved"], json!(true));
    assert_eq!(paused["critic_passes"], json!(1));
    assert!(!paused.contains_key("check_content"));

    let snapshot = graph.get_state("lesson").await.unwrap();
    assert_eq!(snapshot.status, ThreadStatus::Paused);
    assert_eq!(snapshot.next.as_deref(), Some("human"));

    let done = graph
        .invoke(
            "lesson",
            Some(input(json!({"human_selection": {"point": 0, "case": 1}}))),
        )
        .await
        .unwrap();
    assert!(done["check_content"]
        .as_str()
        .unwrap()
        .contains("Export industries faced retaliation"));

    let check_prompt = model
        .prompts()
        .into_iter()
        .find(|p| p.starts_with("Role: checker"))
        .unwrap();
    assert!(check_prompt.contains("No: retaliation costs jobs elsewhere"));
    assert!(check_prompt.contains("Discussion point: Do tariffs protect domestic jobs?"));

    let finished = graph.get_state("lesson").await.unwrap();
    assert_eq!(finished.status, ThreadStatus::Done);
    assert_eq!(finished.next, None);
}

#[tokio::test]
async fn test_selection_through_update_state_then_resume() {
    let graph = classroom(Arc::new(ScriptedModel::classroom()), WorkflowConfig::default());
    graph
        .invoke("lesson", Some(input(json!({"query": "tariffs"}))))
        .await
        .unwrap();

    graph
        .update_state("lesson", input(json!({"human_selection": {"point": 2, "case": 0}})))
        .await
        .unwrap();
    let done = graph.invoke("lesson", None).await.unwrap();

    assert!(done.contains_key("check_content"));
    assert_eq!(done["human_selection"], json!({"point": 2, "case": 0}));
}

#[tokio::test]
async fn test_ta_revisions_stop_at_max_passes() {
    let model = Arc::new(
        ScriptedModel::new()
            .on("Role: reporter", ["Report\n- Prices rise\n- Jobs shift"])
            .on(
                "Role: critic",
                [r#"{"points": [{"title": "Do tariffs help?", "cases": ["Yes: jobs", "No: prices"]}]}"#],
            )
            .on("Role: teaching assistant", ["REVISE\nThe cases overlap."]),
    );
    let graph = classroom(
        model.clone(),
        WorkflowConfig {
            max_critic_passes: 3,
            ..WorkflowConfig::default()
        },
    );

    let paused = graph
        .invoke("lesson", Some(input(json!({"query": "tariffs"}))))
        .await
        .unwrap();

    assert_eq!(paused["critic_passes"], json!(3));
    assert_eq!(paused["ta_feedback"]["approved"], json!(false));
    let prompts = critic_prompts(&model);
    assert_eq!(prompts.len(), 3);
    assert!(!prompts[0].contains("The cases overlap."));
    assert!(prompts[1].contains("The cases overlap."));
    assert!(prompts[2].contains("- Do tariffs help? (Yes: jobs / No: prices)"));
    assert_eq!(
        graph.get_state("lesson").await.unwrap().next.as_deref(),
        Some("human")
    );
}

#[tokio::test]
async fn test_ta_approval_ends_revision_loop() {
    let model = Arc::new(
        ScriptedModel::new()
            .on("Role: reporter", ["Report\n- Prices rise"])
            .on(
                "Role: critic",
                [r#"{"points": [{"title": "Do tariffs help?", "cases": ["Yes", "No"]}]}"#],
            )
            .on("Role: teaching assistant", ["REVISE\nSharpen the title.", "APPROVE"]),
    );
    let graph = classroom(model.clone(), WorkflowConfig::default());

    let paused = graph
        .invoke("lesson", Some(input(json!({"query": "tariffs"}))))
        .await
        .unwrap();

    assert_eq!(paused["critic_passes"], json!(2));
    assert_eq!(paused["ta_feedback"]["approved"], json!(true));
    assert_eq!(critic_prompts(&model).len(), 2);
}

#[tokio::test]
async fn test_invalid_selection_keeps_thread_resumable() {
    let graph = classroom(Arc::new(ScriptedModel::classroom()), WorkflowConfig::default());
    graph
        .invoke("lesson", Some(input(json!({"query": "tariffs"}))))
        .await
        .unwrap();

    let err = graph
        .invoke(
            "lesson",
            Some(input(json!({"human_selection": {"point": 7, "case": 0}}))),
        )
        .await
        .unwrap_err();
    assert!(matches!(&err, GraphError::NodeExecution { node, .. } if node == "human"));

    let snapshot = graph.get_state("lesson").await.unwrap();
    assert_eq!(snapshot.next.as_deref(), Some("human"));
    assert!(!snapshot.values.contains_key("check_content"));

    let done = graph
        .invoke(
            "lesson",
            Some(input(json!({"human_selection": {"point": 1, "case": 1}}))),
        )
        .await
        .unwrap();
    assert!(done.contains_key("check_content"));
}

/// Fails the first critic call, then behaves like the classroom script.
struct FlakyCritic {
    inner: ScriptedModel,
    failed: AtomicBool,
}

#[async_trait]
impl TextModel for FlakyCritic {
    async fn generate(&self, prompt: &str) -> colloquy_roles::Result<String> {
        if prompt.starts_with("Role: critic") && !self.failed.swap(true, Ordering::SeqCst) {
            return Err(RoleError::Model("upstream timeout".into()));
        }
        self.inner.generate(prompt).await
    }
}

#[tokio::test]
async fn test_model_failure_resumes_at_failed_role() {
    let model = Arc::new(FlakyCritic {
        inner: ScriptedModel::classroom(),
        failed: AtomicBool::new(false),
    });
    let graph = classroom(model, WorkflowConfig::default());

    let err = graph
        .invoke("lesson", Some(input(json!({"query": "tariffs"}))))
        .await
        .unwrap_err();
    assert!(matches!(&err, GraphError::NodeExecution { node, .. } if node == "critic"));
    assert!(err.to_string().contains("critic"));

    let snapshot = graph.get_state("lesson").await.unwrap();
    assert_eq!(snapshot.next.as_deref(), Some("critic"));
    assert!(snapshot.values.contains_key("reporter_content"));
    assert!(!snapshot.values.contains_key("critic_content"));

    let paused = graph.invoke("lesson", None).await.unwrap();
    assert_eq!(paused["critic_passes"], json!(1));
    assert_eq!(
        graph.get_state("lesson").await.unwrap().next.as_deref(),
        Some("human")
    );
}

#[tokio::test]
async fn test_exploration_adds_detail_report() {
    let graph = classroom(
        Arc::new(ScriptedModel::classroom()),
        WorkflowConfig {
            exploration: true,
            ..WorkflowConfig::default()
        },
    );

    graph
        .invoke("lesson", Some(input(json!({"query": "tariffs"}))))
        .await
        .unwrap();
    assert_eq!(
        graph.get_state("lesson").await.unwrap().next.as_deref(),
        Some("explore")
    );

    let paused = graph
        .invoke("lesson", Some(input(json!({"point_selection": {"point": 1}}))))
        .await
        .unwrap();
    assert!(paused["explored_content"].as_str().unwrap().contains("Who pays"));

    let tree = ReportTree::from_state(&paused).unwrap();
    let root = tree.root().unwrap();
    assert_eq!(paused["report_id"], json!(root.id));
    let children = tree.children(&root.id);
    assert_eq!(children.len(), 1);
    assert_eq!(children[0].depth, 1);
    assert_eq!(children[0].parent_point, Some(1));
    assert_eq!(tree.path(&children[0].id).len(), 2);
    assert_eq!(
        graph.get_state("lesson").await.unwrap().next.as_deref(),
        Some("human")
    );
}

#[tokio::test]
async fn test_exploration_can_be_skipped() {
    let graph = classroom(
        Arc::new(ScriptedModel::classroom()),
        WorkflowConfig {
            exploration: true,
            ..WorkflowConfig::default()
        },
    );

    graph
        .invoke("lesson", Some(input(json!({"query": "tariffs"}))))
        .await
        .unwrap();
    let paused = graph.invoke("lesson", None).await.unwrap();

    assert!(!paused.contains_key("explored_content"));
    assert!(paused.contains_key("critic_content"));
    assert_eq!(ReportTree::from_state(&paused).unwrap().len(), 1);
}

#[tokio::test]
async fn test_streamed_report_matches_final_content() {
    let graph = classroom(Arc::new(ScriptedModel::classroom()), WorkflowConfig::default());

    let events: Vec<StreamEvent> = graph
        .stream("lesson", Some(input(json!({"query": "tariffs"}))))
        .await
        .unwrap()
        .map(|event| event.unwrap())
        .collect()
        .await;

    let mut streamed = String::new();
    let mut final_report = None;
    for event in &events {
        if let StreamEvent::Update { node, update, is_final } = event {
            if node != "reporter" {
                continue;
            }
            let text = update["reporter_content"].as_str().unwrap();
            if *is_final {
                final_report = Some(text.to_string());
                assert!(update.contains_key("report_id"));
            } else {
                streamed.push_str(text);
            }
        }
    }

    assert!(streamed.starts_with("Tariffs are taxes"));
    assert_eq!(final_report.as_deref(), Some(streamed.as_str()));
    match events.last() {
        Some(StreamEvent::Interrupted { node, state }) => {
            assert_eq!(node, "human");
            assert_eq!(state["reporter_content"], json!(streamed));
        }
        other => panic!("expected interruption, got {other:?}"),
    }
}

#[tokio::test]
async fn test_file_store_resumes_lesson_across_processes() {
    let dir = tempfile::tempdir().unwrap();

    let first = ClassroomBuilder::new(Arc::new(ScriptedModel::classroom()), retriever())
        .with_checkpointer(Arc::new(FileCheckpointSaver::open(dir.path()).await.unwrap()))
        .build()
        .unwrap();
    first
        .invoke("lesson", Some(input(json!({"query": "tariffs"}))))
        .await
        .unwrap();
    drop(first);

    let second = ClassroomBuilder::new(Arc::new(ScriptedModel::classroom()), retriever())
        .with_checkpointer(Arc::new(FileCheckpointSaver::open(dir.path()).await.unwrap()))
        .build()
        .unwrap();
    assert_eq!(
        second.get_state("lesson").await.unwrap().next.as_deref(),
        Some("human")
    );

    let done = second
        .invoke(
            "lesson",
            Some(input(json!({"human_selection": {"point": 0, "case": 0}}))),
        )
        .await
        .unwrap();
    assert!(done.contains_key("check_content"));
    assert_eq!(second.list_threads().await.unwrap(), vec!["lesson"]);
}
