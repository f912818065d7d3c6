use crate::harness::{test_runtime, Harness, EMAIL};
use agentcanvas_core::{
    Connection, EdgeChange, MockFault, MockRoute, NodeChange, Position, SyncError, SyncStatus,
};
use serde_json::json;

#[test]
fn edits_reach_a_fresh_session() {
    let runtime = test_runtime();
    let harness = Harness::new();
    let session = harness.session();
    harness.log_in(&session);
    let mut sync = harness.project_sync(&session);

    let project = runtime
        .block_on(sync.create_project("Pipeline", "three agents"))
        .expect("create");
    runtime.block_on(sync.open(&project.id)).expect("open");
    let model = sync.model_mut();
    model.add_node("Research");
    model.add_node_at("Write", Position::new(200.0, 0.0));
    model.add_node_at("Review", Position::new(400.0, 0.0));
    model.connect(Connection::new("node-1", "node-2")).expect("edge 1");
    model.connect(Connection::new("node-2", "node-3")).expect("edge 2");
    assert_eq!(model.sync_status(), SyncStatus::Dirty);
    runtime.block_on(sync.save_active()).expect("save");
    assert_eq!(sync.model().sync_status(), SyncStatus::Persisted);

    let restarted = harness.session();
    let mut reopened = harness.project_sync(&restarted);
    let model = runtime.block_on(reopened.open(&project.id)).expect("reopen");
    assert_eq!(model.nodes().len(), 3);
    assert_eq!(model.edges().len(), 2);
    assert_eq!(
        model.node("node-3").map(|node| node.position),
        Some(Position::new(400.0, 0.0))
    );
    assert!(!model.is_dirty());
}

#[test]
fn removing_a_node_persists_without_its_edges() {
    let runtime = test_runtime();
    let harness = Harness::new();
    let session = harness.session();
    harness.log_in(&session);
    let mut sync = harness.project_sync(&session);
    let project = runtime
        .block_on(sync.create_project("Prune", ""))
        .expect("create");
    runtime.block_on(sync.open(&project.id)).expect("open");

    let model = sync.model_mut();
    model.add_node("a");
    model.add_node("b");
    model.add_node("c");
    model.connect(Connection::new("node-1", "node-2")).expect("edge");
    model.connect(Connection::new("node-3", "node-2")).expect("edge");
    model.connect(Connection::new("node-1", "node-3")).expect("edge");
    model.apply_node_changes([NodeChange::Remove { id: "node-2".into() }]);
    model.apply_edge_changes([EdgeChange::Select {
        id: "edge-node-1-node-3".into(),
        selected: true,
    }]);
    runtime.block_on(sync.save_active()).expect("save");

    let stored = harness.backend.project(&project.id).expect("stored");
    let edges = stored["graph_data"]["edges"].as_array().expect("edges");
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0]["id"], "edge-node-1-node-3");
    assert_eq!(stored["graph_data"]["nodes"].as_array().expect("nodes").len(), 2);
}

#[test]
fn unknown_fields_survive_a_round_trip() {
    let runtime = test_runtime();
    let harness = Harness::new();
    let session = harness.session();
    harness.log_in(&session);
    let graph = json!({
        "nodes": [
            {"id": "n1", "type": "agent", "position": {"x": 5, "y": 6},
             "data": {"label": "Planner", "model": "small"}, "width": 150}
        ],
        "edges": [],
        "viewport": {"zoom": 1.5}
    });
    let id = harness.backend.seed_project(EMAIL, "Rich", Some(graph));
    let mut sync = harness.project_sync(&session);

    runtime.block_on(sync.open(&id)).expect("open");
    sync.model_mut().apply_node_changes([NodeChange::Position {
        id: "n1".into(),
        position: Some(Position::new(50.0, 60.0)),
    }]);
    runtime.block_on(sync.save_active()).expect("save");

    let stored = harness.backend.project(&id).expect("stored");
    let node = &stored["graph_data"]["nodes"][0];
    assert_eq!(node["type"], "agent");
    assert_eq!(node["width"], 150);
    assert_eq!(node["data"]["model"], "small");
    assert_eq!(node["position"], json!({"x": 50.0, "y": 60.0}));
    assert_eq!(stored["graph_data"]["viewport"], json!({"zoom": 1.5}));
}

#[test]
fn dangling_edges_are_dropped_on_load() {
    let runtime = test_runtime();
    let harness = Harness::new();
    let session = harness.session();
    harness.log_in(&session);
    let graph = json!({
        "nodes": [{"id": "a", "position": {"x": 0, "y": 0}, "data": {"label": "A"}}],
        "edges": [{"id": "e1", "source": "a", "target": "ghost"}]
    });
    let id = harness.backend.seed_project(EMAIL, "Dangling", Some(graph));
    let mut sync = harness.project_sync(&session);

    let model = runtime.block_on(sync.open(&id)).expect("open");
    assert_eq!(model.nodes().len(), 1);
    assert!(model.edges().is_empty());
}

#[test]
fn duplicate_node_ids_load_as_empty() {
    let runtime = test_runtime();
    let harness = Harness::new();
    let session = harness.session();
    harness.log_in(&session);
    let graph = json!({
        "nodes": [
            {"id": "a", "position": {"x": 0, "y": 0}, "data": {"label": "A"}},
            {"id": "a", "position": {"x": 1, "y": 1}, "data": {"label": "A again"}}
        ],
        "edges": []
    });
    let id = harness.backend.seed_project(EMAIL, "Duplicated", Some(graph));
    let sync = harness.project_sync(&session);

    assert!(runtime.block_on(sync.load(&id)).expect("load").is_empty());
}

#[test]
fn expiry_during_save_keeps_unsaved_edits() {
    let runtime = test_runtime();
    let harness = Harness::new();
    let session = harness.session();
    harness.log_in(&session);
    let mut sync = harness.project_sync(&session);
    let project = runtime
        .block_on(sync.create_project("Unlucky", ""))
        .expect("create");
    runtime.block_on(sync.open(&project.id)).expect("open");
    sync.model_mut().add_node("draft");

    harness.backend.expire_access_tokens();
    harness.backend.inject(MockRoute::Refresh, MockFault::Status(401));
    let err = runtime.block_on(sync.save_active()).unwrap_err();

    assert!(err.is_session_expired());
    assert!(!session.is_logged_in());
    assert!(sync.model().is_dirty());
    assert_eq!(sync.model().nodes().len(), 1);
    assert_eq!(
        harness.backend.project(&project.id).expect("stored")["graph_data"],
        json!({})
    );
}

#[test]
fn server_errors_are_not_retried() {
    let runtime = test_runtime();
    let harness = Harness::new();
    let session = harness.session();
    harness.log_in(&session);
    let sync = harness.project_sync(&session);
    harness
        .backend
        .inject(MockRoute::ListProjects, MockFault::Status(503));

    let err = runtime.block_on(sync.list_projects()).unwrap_err();
    assert!(matches!(err, SyncError::RequestFailed { status: Some(503), .. }));
    assert_eq!(harness.backend.hits(MockRoute::ListProjects), 1);
    assert_eq!(harness.backend.hits(MockRoute::Refresh), 0);
    assert!(session.is_logged_in());
}
