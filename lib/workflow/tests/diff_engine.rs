//! End-to-end behavior of the diff engine through its JSON interface.

use flowpatch_workflow::{
    ConnectionRef, DiffEngine, DiffRequest, DiffResult, Effect, Position, WorkflowDocument,
};
use serde_json::{Value, json};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("flowpatch_workflow=debug")
        .with_test_writer()
        .try_init();
}

/// `Start -> HTTP` over the main ports.
fn start_http_document() -> WorkflowDocument {
    serde_json::from_value(json!({
        "id": "wf-1",
        "name": "Fetch example",
        "active": false,
        "nodes": [
            {
                "id": "a1",
                "name": "Start",
                "type": "n8n-nodes-base.manualTrigger",
                "typeVersion": 1,
                "position": [250, 300],
                "parameters": {}
            },
            {
                "id": "b2",
                "name": "HTTP",
                "type": "n8n-nodes-base.httpRequest",
                "typeVersion": 4.2,
                "position": [450, 300],
                "parameters": {"url": "https://example.com"}
            }
        ],
        "connections": {
            "Start": {"main": [[{"node": "HTTP", "type": "main", "index": 0}]]}
        },
        "settings": {"executionOrder": "v1"},
        "tags": []
    }))
    .expect("document")
}

fn run(document: &WorkflowDocument, operations: Value, flags: Value) -> DiffResult {
    init_tracing();
    let mut request = json!({"documentId": "wf-1", "operations": operations});
    if let (Some(request), Some(flags)) = (request.as_object_mut(), flags.as_object()) {
        request.extend(flags.clone());
    }
    DiffEngine::default()
        .apply_json(document, &request)
        .expect("valid request")
}

fn applied_indices(result: &DiffResult) -> Vec<usize> {
    result.applied.iter().map(|entry| entry.index).collect()
}

fn failed_indices(result: &DiffResult) -> Vec<usize> {
    result.failed.iter().map(|entry| entry.index).collect()
}

#[test]
fn empty_batch_is_identity() {
    let document = start_http_document();
    let result = run(&document, json!([]), json!({}));

    assert!(result.success);
    assert_eq!(result.operations_applied, 0);
    assert_eq!(result.workflow.as_ref(), Some(&document));
}

#[test]
fn caller_document_is_never_mutated() {
    let document = start_http_document();
    let before = document.clone();

    let succeeded = run(
        &document,
        json!([
            {"type": "removeNode", "nodeName": "HTTP"},
            {"type": "renameWorkflow", "name": "Changed"}
        ]),
        json!({}),
    );
    let failed = run(
        &document,
        json!([
            {"type": "moveNode", "nodeName": "Start", "position": [0, 0]},
            {"type": "removeNode", "nodeName": "Missing"}
        ]),
        json!({}),
    );

    assert!(succeeded.success);
    assert!(!failed.success);
    assert_eq!(document, before);
}

#[test]
fn fail_fast_halts_at_first_failure() {
    let document = start_http_document();
    let result = run(
        &document,
        json!([
            {"type": "moveNode", "nodeName": "Start", "position": [50, 50]},
            {"type": "updateNode", "nodeName": "Missing", "updates": {"disabled": true}},
            {"type": "addTag", "tag": "never"}
        ]),
        json!({}),
    );

    assert!(!result.success);
    assert_eq!(applied_indices(&result), [0]);
    assert_eq!(failed_indices(&result), [1]);
    assert_eq!(result.failed[0].reason, "NodeNotFound");
    assert_eq!(result.operations_applied, 1);
    assert_eq!(result.errors.len(), 1);

    let workflow = result.workflow.expect("prior successes are returned");
    assert_eq!(
        workflow.node("Start").map(|node| node.position),
        Some(Position::new(50.0, 50.0))
    );
    assert!(!workflow.tags.contains("never"));
}

#[test]
fn continue_on_error_attempts_every_operation() {
    let document = start_http_document();
    let result = run(
        &document,
        json!([
            {"type": "moveNode", "nodeName": "Start", "position": [50, 50]},
            {"type": "updateNode", "nodeName": "Missing", "updates": {"disabled": true}},
            {"type": "addTag", "tag": "reached"}
        ]),
        json!({"continueOnError": true}),
    );

    assert!(!result.success);
    assert_eq!(applied_indices(&result), [0, 2]);
    assert_eq!(failed_indices(&result), [1]);
    assert_eq!(result.operations_applied, 2);
    assert!(result.should_persist());

    let workflow = result.workflow.expect("workflow");
    assert!(workflow.tags.contains("reached"));
}

#[test]
fn removing_a_node_cascades_to_its_connections() {
    let document = start_http_document();
    let result = run(
        &document,
        json!([{"type": "removeNode", "nodeName": "HTTP"}]),
        json!({}),
    );

    assert!(result.success);
    assert_eq!(result.operations_applied, 1);
    let workflow = result.workflow.expect("workflow");
    assert_eq!(workflow.node_names().collect::<Vec<_>>(), ["Start"]);
    assert_eq!(workflow.connections.slot("Start", "main", 0), Some(&[][..]));

    match &result.applied[0].effect {
        Some(Effect::NodeRemoved {
            removed_connections,
            ..
        }) => assert_eq!(removed_connections, &[ConnectionRef::main("Start", "HTTP")]),
        other => panic!("unexpected effect: {other:?}"),
    }
}

#[test]
fn later_operations_resolve_nodes_added_earlier() {
    let document = start_http_document();
    let result = run(
        &document,
        json!([
            {"type": "addNode", "node": {"name": "Set1", "type": "n8n-nodes-base.set"}},
            {"type": "addConnection", "source": "Start", "target": "Set1"}
        ]),
        json!({}),
    );

    assert!(result.success);
    assert_eq!(applied_indices(&result), [0, 1]);
    let workflow = result.workflow.expect("workflow");
    assert!(workflow
        .connections
        .contains(&ConnectionRef::main("Start", "Set1")));
}

#[test]
fn generated_ids_are_addressable_in_the_same_batch() {
    let document = start_http_document();
    let first = run(
        &document,
        json!([{"type": "addNode", "node": {"name": "Set1", "type": "set"}}]),
        json!({}),
    );
    let Some(Effect::NodeAdded { node_id }) = &first.applied[0].effect else {
        panic!("expected a generated id");
    };
    assert!(!node_id.is_empty());

    // Nodes added with a known id can be referenced by it immediately.
    let result = run(
        &document,
        json!([
            {"type": "addNode", "node": {"id": "c3", "name": "Set2", "type": "set"}},
            {"type": "moveNode", "nodeId": "c3", "position": [10, 20]},
            {"type": "addConnection", "source": "b2", "target": "c3"}
        ]),
        json!({}),
    );
    assert!(result.success);
    let workflow = result.workflow.expect("workflow");
    assert_eq!(
        workflow.node("Set2").map(|node| node.position),
        Some(Position::new(10.0, 20.0))
    );
    assert!(workflow
        .connections
        .contains(&ConnectionRef::main("HTTP", "Set2")));
}

#[test]
fn duplicate_connection_in_one_batch_is_idempotent() {
    let document = start_http_document();
    let connect = json!({"type": "addConnection", "source": "HTTP", "target": "Start"});
    let result = run(&document, json!([connect.clone(), connect]), json!({}));

    assert!(result.success);
    assert_eq!(applied_indices(&result), [0, 1]);
    assert_eq!(result.applied[1].effect, Some(Effect::AlreadySatisfied));

    let workflow = result.workflow.expect("workflow");
    assert_eq!(workflow.connections.edge_count(), 2);
    assert_eq!(
        workflow.connections.slot("HTTP", "main", 0).map(<[_]>::len),
        Some(1)
    );
}

#[test]
fn adding_an_existing_name_fails_without_overwriting() {
    let document = start_http_document();
    let result = run(
        &document,
        json!([{"type": "addNode", "node": {"name": "Start", "type": "n8n-nodes-base.set"}}]),
        json!({}),
    );

    assert!(!result.success);
    assert_eq!(result.failed[0].reason, "DuplicateNodeName");
    assert!(result.workflow.is_none());
    assert!(!result.should_persist());
}

#[test]
fn validate_only_previews_without_persisting() {
    let document = start_http_document();
    let result = run(
        &document,
        json!([{"type": "renameWorkflow", "name": "Preview"}]),
        json!({"validateOnly": true}),
    );

    assert!(result.success);
    assert!(result.message.starts_with("Validation:"));
    assert_eq!(result.workflow.as_ref().map(|w| w.name.as_str()), Some("Preview"));
    assert!(!result.should_persist());
}

#[test]
fn rename_via_update_rewrites_connections() {
    let document = start_http_document();
    let result = run(
        &document,
        json!([
            {"type": "updateNode", "nodeId": "b2", "updates": {"name": "Fetch"}},
            {"type": "addConnection", "source": "Fetch", "target": "Start", "sourceIndex": 1}
        ]),
        json!({}),
    );

    assert!(result.success);
    let workflow = result.workflow.expect("workflow");
    assert!(workflow
        .connections
        .contains(&ConnectionRef::main("Start", "Fetch")));
    assert!(workflow.connections.outputs("HTTP").is_none());
    assert_eq!(
        workflow.connections.slot("Fetch", "main", 0).map(<[_]>::len),
        Some(0)
    );
}

#[test]
fn cleanup_dry_run_reports_without_removing() {
    let mut document = start_http_document();
    document
        .connections
        .insert(&ConnectionRef::main("HTTP", "Deleted elsewhere"));

    let preview = run(
        &document,
        json!([{"type": "cleanupConnections", "dryRun": true}]),
        json!({}),
    );
    let swept = run(&document, json!([{"type": "cleanupConnections"}]), json!({}));

    let expected = vec![ConnectionRef::main("HTTP", "Deleted elsewhere")];
    assert_eq!(
        preview.applied[0].effect,
        Some(Effect::ConnectionsSwept {
            dry_run: true,
            connections: expected.clone()
        })
    );
    assert_eq!(
        preview.workflow.map(|w| w.connections.edge_count()),
        Some(2)
    );
    assert_eq!(
        swept.applied[0].effect,
        Some(Effect::ConnectionsSwept {
            dry_run: false,
            connections: expected
        })
    );
    assert_eq!(swept.workflow.map(|w| w.connections.edge_count()), Some(1));
}

#[test]
fn ignore_errors_suppresses_connection_failures() {
    let document = start_http_document();
    let result = run(
        &document,
        json!([
            {"type": "addConnection", "source": "Start", "target": "Ghost", "ignoreErrors": true},
            {"type": "removeConnection", "source": "HTTP", "target": "Start", "ignoreErrors": true},
            {"type": "addConnection", "source": "Start", "target": "Ghost"}
        ]),
        json!({}),
    );

    assert_eq!(applied_indices(&result), [0, 1]);
    assert!(matches!(result.applied[0].effect, Some(Effect::Skipped { .. })));
    assert_eq!(result.failed[0].reason, "ConnectionEndpointMissing");
    assert!(result.failed[0].message.contains("target"));
}

#[test]
fn malformed_request_aborts_whole_call() {
    init_tracing();
    let document = start_http_document();
    let err = DiffEngine::default()
        .apply_json(
            &document,
            &json!({
                "documentId": "wf-1",
                "operations": [
                    {"type": "addTag", "tag": "fine"},
                    {"type": "moveNode", "nodeName": "Start"}
                ]
            }),
        )
        .expect_err("request should be rejected");

    assert!(err.to_string().contains("operations[1]"));
}

#[test]
fn oversized_connection_indices_are_rejected_up_front() {
    init_tracing();
    let document = start_http_document();
    for index in [json!(u64::MAX), json!(100_000_000_000_u64)] {
        let err = DiffEngine::default()
            .apply_json(
                &document,
                &json!({
                    "documentId": "wf-1",
                    "operations": [
                        {"type": "addConnection", "source": "Start", "target": "HTTP",
                         "sourceIndex": index},
                        {"type": "addConnection", "source": "Start", "target": "HTTP",
                         "case": index},
                        {"type": "removeConnection", "source": "Start", "target": "HTTP",
                         "targetIndex": index}
                    ]
                }),
            )
            .expect_err("request should be rejected");

        let text = err.to_string();
        assert!(text.contains("operations[0].sourceIndex"));
        assert!(text.contains("operations[1].case"));
        assert!(text.contains("operations[2].targetIndex"));
    }
}

#[test]
fn rename_onto_a_dangling_source_is_refused() {
    let mut document = start_http_document();
    document
        .connections
        .insert(&ConnectionRef::main("Ghost", "HTTP"));

    let result = run(
        &document,
        json!([{"type": "updateNode", "nodeName": "Start", "updates": {"name": "Ghost"}}]),
        json!({}),
    );

    assert!(!result.success);
    assert_eq!(result.failed[0].reason, "DanglingConnections");

    let cleaned = run(
        &document,
        json!([
            {"type": "cleanupConnections"},
            {"type": "updateNode", "nodeName": "Start", "updates": {"name": "Ghost"}}
        ]),
        json!({}),
    );
    assert!(cleaned.success);
    let workflow = cleaned.workflow.expect("workflow");
    assert_eq!(workflow.connections.edge_count(), 1);
    assert!(workflow
        .connections
        .contains(&ConnectionRef::main("Ghost", "HTTP")));
}

#[test]
fn documents_with_duplicate_names_are_rejected() {
    init_tracing();
    let mut document = start_http_document();
    let mut twin = document.nodes[1].clone();
    twin.id = "c3".into();
    document.nodes.push(twin);

    let err = DiffEngine::default()
        .apply_json(
            &document,
            &json!({
                "documentId": "wf-1",
                "operations": [{"type": "removeNode", "nodeName": "HTTP"}]
            }),
        )
        .expect_err("document should be rejected");
    assert!(err.to_string().contains("'HTTP'"));
}

#[test]
fn typed_requests_run_the_same_pass() {
    let document = start_http_document();
    let request: DiffRequest = serde_json::from_value(json!({
        "documentId": "wf-1",
        "operations": [
            {"type": "disableNode", "nodeName": "HTTP"},
            {"type": "activateWorkflow"},
            {"type": "updateSettings", "settings": {"timezone": "Europe/Berlin"}}
        ]
    }))
    .expect("request");

    let result = DiffEngine::default()
        .apply(&document, &request)
        .expect("apply");

    assert!(result.success);
    assert_eq!(result.message, "Applied 3 of 3 operations");
    let workflow = result.workflow.expect("workflow");
    assert!(workflow.active);
    assert!(workflow.node("HTTP").is_some_and(|node| node.disabled));
    assert_eq!(workflow.settings.get("timezone"), Some(&json!("Europe/Berlin")));
    assert!(workflow.settings.get("executionOrder").is_none());
}
