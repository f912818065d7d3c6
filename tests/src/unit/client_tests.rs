use crate::harness::{test_runtime, Harness, EMAIL, PASSWORD};
use agentcanvas::{load_cli_settings, CliSettings};
use agentcanvas_core::{MockFault, MockRoute, Position};

#[test]
fn signup_create_and_edit_through_the_client() {
    let runtime = test_runtime();
    let harness = Harness::new();
    let mut client = harness.client(CliSettings::default());

    runtime
        .block_on(client.signup(EMAIL, PASSWORD))
        .expect("signup");
    let created = runtime
        .block_on(client.create_project("Canvas", "demo"))
        .expect("create");
    assert!(created.contains("Canvas"));
    let project_id = client
        .cli_settings()
        .current_project
        .clone()
        .expect("current project");

    runtime.block_on(client.add_node("Planner", None)).expect("add");
    runtime
        .block_on(client.add_node("Coder", Some(Position::new(240.0, 0.0))))
        .expect("add");
    let edge = runtime
        .block_on(client.connect("node-1", "node-2"))
        .expect("connect");
    assert_eq!(edge, "Added edge edge-node-1-node-2.");
    runtime
        .block_on(client.move_node("node-1", Position::new(-20.0, 15.0)))
        .expect("move");

    let shown = runtime.block_on(client.show_graph(false)).expect("show");
    assert_eq!(
        shown,
        "node node-1 \"Planner\" at (-20, 15)\n\
         node node-2 \"Coder\" at (240, 0)\n\
         edge edge-node-1-node-2: node-1 -> node-2"
    );

    let stored = harness.backend.project(&project_id).expect("stored");
    assert_eq!(stored["graph_data"]["nodes"].as_array().map(Vec::len), Some(2));
}

#[test]
fn restarted_client_remembers_login_and_project() {
    let runtime = test_runtime();
    let harness = Harness::new();
    harness.backend.register_user(EMAIL, PASSWORD);
    let mut first = harness.client(CliSettings::default());
    runtime.block_on(first.login(EMAIL, PASSWORD)).expect("login");
    runtime
        .block_on(first.create_project("Persistent", ""))
        .expect("create");
    runtime.block_on(first.add_node("kept", None)).expect("add");

    let cli = runtime
        .block_on(load_cli_settings(&harness.scope()))
        .expect("cli settings");
    let mut second = harness.client(cli);
    assert!(second.session().is_logged_in());
    let shown = runtime.block_on(second.show_graph(false)).expect("show");
    assert_eq!(shown, "node node-1 \"kept\" at (0, 0)");
}

#[test]
fn removing_a_node_reports_dropped_edges() {
    let runtime = test_runtime();
    let harness = Harness::new();
    let mut client = harness.client(CliSettings::default());
    runtime.block_on(client.signup(EMAIL, PASSWORD)).expect("signup");
    runtime
        .block_on(client.create_project("Prune", ""))
        .expect("create");
    for label in ["a", "b", "c"] {
        runtime.block_on(client.add_node(label, None)).expect("add");
    }
    runtime.block_on(client.connect("node-1", "node-2")).expect("edge");
    runtime.block_on(client.connect("node-2", "node-3")).expect("edge");

    let removed = runtime.block_on(client.remove("node-2")).expect("remove");
    assert_eq!(removed, "Removed node node-2 and 2 edge(s).");
    assert!(runtime.block_on(client.remove("node-2")).is_err());
}

#[test]
fn graph_commands_require_login_and_a_project() {
    let runtime = test_runtime();
    let harness = Harness::new();
    let mut client = harness.client(CliSettings::default());

    let err = runtime.block_on(client.show_graph(false)).unwrap_err();
    assert!(err.to_string().contains("Not logged in"));

    runtime.block_on(client.signup(EMAIL, PASSWORD)).expect("signup");
    let err = runtime.block_on(client.show_graph(false)).unwrap_err();
    assert!(err.to_string().contains("No project selected"));
}

#[test]
fn forced_logout_is_reported() {
    let runtime = test_runtime();
    let harness = Harness::new();
    let mut client = harness.client(CliSettings::default());
    runtime.block_on(client.signup(EMAIL, PASSWORD)).expect("signup");

    harness.backend.expire_access_tokens();
    harness.backend.revoke_refresh_tokens();
    let err = runtime.block_on(client.list_projects()).unwrap_err();

    assert!(err.to_string().contains("agentcanvas login"));
    assert!(!client.session().is_logged_in());
    assert!(client.status().starts_with("Session: logged out"));
}

#[test]
fn using_a_missing_project_forgets_it() {
    let runtime = test_runtime();
    let harness = Harness::new();
    let cli = CliSettings {
        current_project: Some("gone".to_string()),
        recent_projects: vec!["gone".to_string()],
    };
    let mut client = harness.client(cli);
    runtime.block_on(client.signup(EMAIL, PASSWORD)).expect("signup");

    assert!(runtime.block_on(client.use_project("gone")).is_err());
    assert_eq!(client.cli_settings().current_project, None);
    assert!(client.cli_settings().recent_projects.is_empty());
}

#[test]
fn failed_signup_leaves_session_logged_out() {
    let runtime = test_runtime();
    let harness = Harness::new();
    harness
        .backend
        .inject(MockRoute::Signup, MockFault::Status(500));
    let mut client = harness.client(CliSettings::default());

    assert!(runtime.block_on(client.signup(EMAIL, PASSWORD)).is_err());
    assert!(!client.session().is_logged_in());
}
