//! Task list to dependency graph, end to end.

use foreman::state::{Plan, PlanStore};
use foreman::{Error, TaskGraph, TaskSpec, TaskStatus};

#[tokio::test]
async fn test_stored_plan_drives_graph_readiness() {
    let dir = tempfile::tempdir().unwrap();
    let store = PlanStore::open(dir.path()).unwrap();

    let mut plan = Plan::new("release", "Ship v2");
    plan.tasks = vec![
        TaskSpec::new("design", "Write design doc").with_status(TaskStatus::Completed),
        TaskSpec::new("impl", "Implement feature").blocked_by(&["design"]),
        TaskSpec::new("review", "Code review").blocked_by(&["impl"]),
        TaskSpec::new("docs", "Update docs").blocked_by(&["design"]),
    ];
    store.save(&plan).await.unwrap();

    let graph = store.load("release").await.unwrap().graph().unwrap();
    assert_eq!(graph.ready_ids(), vec!["docs", "impl"]);
    assert_eq!(graph.get("review").unwrap().status, TaskStatus::Blocked);
    assert_eq!(
        graph.critical_path,
        vec!["impl".to_string(), "review".to_string()]
    );

    // Completing the implementation unblocks the review.
    let updated = store
        .update("release", |p| {
            for task in p.tasks.iter_mut() {
                if task.id == "impl" {
                    task.status = TaskStatus::Completed;
                }
            }
        })
        .await
        .unwrap();
    let graph = updated.graph().unwrap();
    assert_eq!(graph.get("review").unwrap().status, TaskStatus::Ready);
}

#[test]
fn test_external_task_json_builds_layered_graph() {
    // The camelCase shape an external task store produces.
    let json = r#"[
        {"id": "t1", "title": "Scaffold", "status": "completed"},
        {"id": "t2", "title": "Parser", "blockedBy": ["t1"]},
        {"id": "t3", "title": "Codegen", "blockedBy": ["t1"]},
        {"id": "t4", "title": "Integration", "blockedBy": ["t2", "t3"]}
    ]"#;
    let tasks: Vec<TaskSpec> = serde_json::from_str(json).unwrap();
    let graph = TaskGraph::build(&tasks).unwrap();

    assert_eq!(graph.max_depth, 2);
    assert_eq!(graph.roots, vec!["t1".to_string()]);
    assert_eq!(graph.leaves, vec!["t4".to_string()]);
    assert_eq!(graph.get("t4").unwrap().depth, 2);
    assert_eq!(graph.ready_ids(), vec!["t2", "t3"]);
}

#[test]
fn test_cycle_in_external_tasks_is_rejected() {
    let json = r#"[
        {"id": "t1", "title": "A", "blockedBy": ["t2"]},
        {"id": "t2", "title": "B", "blockedBy": ["t1"]}
    ]"#;
    let tasks: Vec<TaskSpec> = serde_json::from_str(json).unwrap();
    assert!(matches!(TaskGraph::build(&tasks), Err(Error::Cycle(_))));
}

#[test]
fn test_graph_serializes_for_headless_output() {
    let tasks = vec![
        TaskSpec::new("a", "First"),
        TaskSpec::new("b", "Second").blocked_by(&["a"]),
    ];
    let graph = TaskGraph::build(&tasks).unwrap();
    let json = serde_json::to_value(&graph).unwrap();

    assert_eq!(json["max_depth"], 1);
    assert_eq!(json["nodes"]["b"]["depth"], 1);
    assert_eq!(json["critical_path"][0], "a");
}
