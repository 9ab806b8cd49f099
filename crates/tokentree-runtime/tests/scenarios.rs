//! End-to-end allocation and dispatch scenarios.

use std::sync::Arc;

use serde_json::{json, Value};
use tokentree_balancer::AllocationReport;
use tokentree_core::{Error, ErrorCode, InterfaceKind, Manifest, RuntimeConfig};
use tokentree_external::{create_mock, Flaky};
use tokentree_runtime::{Action, RequestState, Runtime, Workflow};

fn synthetic(depth: usize, budget: u64) -> Runtime {
    let config = RuntimeConfig {
        total_budget: budget,
        ..RuntimeConfig::default()
    };
    Runtime::new(config, &Manifest::complete(depth)).unwrap()
}

fn standard_with_budget(budget: u64) -> Runtime {
    let config = RuntimeConfig {
        total_budget: budget,
        ..RuntimeConfig::default()
    };
    Runtime::new(config, &Manifest::standard()).unwrap()
}

fn leaf_allocations(rt: &Runtime) -> Vec<u64> {
    rt.topology()
        .leaves()
        .iter()
        .map(|&leaf| rt.allocator().allocated(leaf))
        .collect()
}

#[test]
fn test_even_split_over_eight_leaves() {
    let rt = synthetic(3, 100_000);
    assert_eq!(leaf_allocations(&rt), vec![12_500; 8]);
    assert_eq!(rt.query("N1-0").unwrap(), 50_000);
}

#[test]
fn test_heavy_leaf_gets_proportional_share() {
    let mut rt = synthetic(3, 100_000);
    rt.update_weight("L1", 16).unwrap();

    let alloc = leaf_allocations(&rt);
    let l1 = alloc[0];
    assert!(alloc[1..].iter().all(|&other| l1 > other));

    let l2 = alloc[1];
    let ratio_error = (l1 as i64 - 16 * l2 as i64).abs();
    assert!(ratio_error <= 16, "l1={} l2={}", l1, l2);
    assert_eq!(alloc.iter().sum::<u64>(), 100_000);
}

#[test]
fn test_consume_never_overdraws() {
    let mut rt = synthetic(3, 100_000);
    let l1 = rt.topology().lookup("L1").unwrap();

    assert_eq!(rt.allocator().allocated(l1), 12_500);
    rt.consume("L1", 9_000).unwrap();
    assert_eq!(rt.allocator().remaining(l1), 3_500);

    let err = rt.consume("L1", 4_000).unwrap_err();
    assert!(matches!(
        err,
        Error::BudgetExhausted {
            requested: 4_000,
            remaining: 3_500,
            ..
        }
    ));
    assert_eq!(rt.allocator().remaining(l1), 3_500);
}

#[test]
fn test_utilization_report() {
    let mut rt = synthetic(3, 100_000);
    rt.consume("L1", 9_000).unwrap();

    let report = rt.report();
    assert_eq!(report.len(), 8);
    assert_eq!(report["L1"], AllocationReport::new(12_500, 9_000));
    assert_eq!(report["L1"].utilization, 72.0);
    assert_eq!(report["L1"].remaining, 3_500);
    assert_eq!(report["L2"].utilization, 0.0);
}

#[test]
fn test_always_failing_collaborator_exhausts_retries() {
    let mut rt = Runtime::standard().unwrap();
    rt.bind_collaborator(
        "M111",
        Arc::new(Flaky::always(create_mock(InterfaceKind::ConfigStore))),
    )
    .unwrap();

    let result = rt.dispatch_raw("read_config", json!({"path": "config/settings.json"}));

    assert!(!result.success);
    assert_eq!(result.data["retries"], json!(3));
    assert_eq!(result.path.last().map(String::as_str), Some("M110"));
    assert_eq!(result.path.first().map(String::as_str), Some("M000"));
    let error = result.error.as_ref().unwrap();
    assert_eq!(error.code, ErrorCode::ExternalIoError);
    assert_eq!(error.message, "external service unavailable");
    // four attempts at 10 each plus 10 + 20 + 30 overhead
    assert_eq!(result.tokens_used, 100);

    let last = rt.history().last().unwrap();
    assert_eq!(last.final_state, RequestState::Failed);
}

#[test]
fn test_flaky_collaborator_recovers() {
    let mut rt = Runtime::standard().unwrap();
    rt.bind_collaborator(
        "M111",
        Arc::new(Flaky::failing(create_mock(InterfaceKind::ConfigStore), 2)),
    )
    .unwrap();

    let result = rt.dispatch_raw("read_config", json!({"path": "config/settings.json"}));
    assert!(result.success);
    assert_eq!(result.data["retries"], json!(2));
    assert_eq!(result.tokens_used, 90);
    assert_eq!(result.path, vec!["M000", "M100", "M110", "M111"]);
}

#[test]
fn test_aggregation_keeps_successful_child_data() {
    let mut rt = Runtime::standard().unwrap();
    rt.bind_collaborator(
        "M122",
        Arc::new(Flaky::always(create_mock(InterfaceKind::RelationalStore))),
    )
    .unwrap();

    let result = rt.dispatch_raw("sync_data", json!({"sheet": "inventory"}));

    assert!(!result.success);
    assert_eq!(result.unit_id, "M120");
    assert_eq!(result.error_code(), Some(ErrorCode::ExternalIoError));
    assert_eq!(result.data["M121"]["rowCount"], json!(3));
    assert_eq!(result.data["M122"]["retries"], json!(3));
}

#[test]
fn test_every_aggregate_succeeds_with_mocks() {
    let mut rt = Runtime::standard().unwrap();
    let cases: Vec<(&str, Value, &str)> = vec![
        ("init_system", json!({"path": "app.json", "message": "boot"}), "M110"),
        ("sync_data", json!({"sheet": "inventory"}), "M120"),
        ("infrastructure_status", json!({"path": "app.json"}), "M100"),
        (
            "prompted_tool_call",
            json!({"template": "prompt://summarize", "tool": "echo"}),
            "M210",
        ),
        (
            "multi_output",
            json!({"method": "GET", "url": "/health", "report_type": "summary"}),
            "M220",
        ),
    ];
    for (action, params, fork) in cases {
        let result = rt.dispatch_raw(action, params);
        assert!(result.success, "{} failed: {:?}", action, result.error);
        assert_eq!(result.unit_id, fork, "{}", action);
        assert_eq!(result.data.len(), 2, "{}", action);
    }
}

#[test]
fn test_budget_exhausted_is_not_retried() {
    let mut rt = standard_with_budget(100);
    let flaky = Arc::new(Flaky::failing(create_mock(InterfaceKind::ToolApi), 0));
    rt.bind_collaborator("M211", flaky.clone()).unwrap();

    let result = rt.dispatch_raw("call_tool", json!({"tool": "echo"}));

    assert!(!result.success);
    assert_eq!(result.error_code(), Some(ErrorCode::BudgetExhausted));
    assert_eq!(flaky.calls(), 0);
    assert!(result.data.get("retries").is_none());
    let m211 = rt.topology().lookup("M211").unwrap();
    assert_eq!(rt.allocator().consumed(m211), 0);
}

#[test]
fn test_rebalance_rejected_below_consumption() {
    let mut rt = synthetic(3, 100_000);
    rt.consume("L1", 12_000).unwrap();
    let before = rt.report();

    let err = rt.update_weight("L2", 100).unwrap_err();
    assert!(matches!(err, Error::AllocationBelowConsumption { .. }));
    assert_eq!(rt.report(), before);
    assert_eq!(rt.allocation("L2").unwrap().weight_override, None);
}

#[test]
fn test_tenant_lifecycle_through_tree() {
    let mut rt = Runtime::standard().unwrap();

    let inserted = rt.dispatch_raw("insert_tenant", json!({"record": {"name": "Initech", "plan": "pro"}}));
    assert!(inserted.success);
    let id = inserted.data["id"].clone();

    let updated = rt.dispatch_raw("update_tenant", json!({"id": id, "fields": {"plan": "basic"}}));
    assert_eq!(updated.data["updated"], json!(true));

    let queried = rt.dispatch_raw("query_tenant", json!({"filter": {"plan": "basic"}}));
    assert_eq!(queried.data["count"], json!(2));

    let deleted = rt.dispatch_raw("delete_tenant", json!({"id": id}));
    assert_eq!(deleted.data["deleted"], json!(true));
}

#[test]
fn test_runtime_from_manifest_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("units.json");
    std::fs::write(&path, serde_json::to_string(&Manifest::complete(2)).unwrap()).unwrap();

    let config = RuntimeConfig {
        manifest_path: Some(path),
        ..RuntimeConfig::default()
    };
    let rt = Runtime::from_config(config).unwrap();
    assert_eq!(rt.status().units, 7);
    assert_eq!(leaf_allocations(&rt), vec![25_000; 4]);
}

#[test]
fn test_malformed_manifest_rejected() {
    let mut manifest = Manifest::standard();
    manifest.units.retain(|u| u.unit_id != "M222");
    let result = Runtime::new(RuntimeConfig::default(), &manifest);
    assert!(matches!(result, Err(Error::MalformedTopology(_))));
}

#[test]
fn test_tenant_report_workflow_feeds_steps_forward() {
    let mut rt = Runtime::standard().unwrap();
    let input = json!({"tenant_id": 1}).as_object().cloned().unwrap();
    let result = rt.run_workflow(Workflow::TenantReport, input);

    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.workflow_id, "WF-0001");
    let names: Vec<&str> = result.steps.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["config_load", "tenant_query", "tool_process", "report_generate"]);
    assert!(result.steps.iter().all(|s| s.success));

    // The queried tenant row flows through the tool into the report
    assert_eq!(result.data["tool_process"]["output"]["name"], json!("Acme"));
    assert_eq!(result.data["report_generate"]["pages"], json!(1));
    assert_eq!(
        result.tokens_used,
        result.steps.iter().map(|s| s.tokens_used).sum::<u64>()
    );

    let history: Vec<_> = rt.history().collect();
    assert_eq!(history.len(), 5);
    assert!(history
        .iter()
        .all(|h| h.workflow_id.as_deref() == Some("WF-0001")));
    let summary = history.last().unwrap();
    assert_eq!(summary.action, "tenant_report");
    assert_eq!(summary.final_state, RequestState::Completed);
    assert_eq!(summary.steps.len(), 4);
    assert_eq!(rt.status().workflows, 1);
    assert_eq!(rt.status().dispatches, 4);
}

#[test]
fn test_full_pipeline_exports_generated_document() {
    let mut rt = Runtime::standard().unwrap();
    rt.run_workflow(Workflow::DataSync, Default::default());
    let result = rt.run_workflow(Workflow::FullPipeline, Default::default());

    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.workflow_id, "WF-0002");
    assert_eq!(result.steps.len(), 5);
    assert_eq!(result.steps[0].action, Action::InitSystem);
    assert_eq!(result.steps[0].unit_id, "M110");

    let document = &result.data["report_generate"]["documentId"];
    assert_eq!(&result.data["report_export"]["documentId"], document);
    assert_eq!(result.data["report_export"]["format"], json!("pdf"));
}

#[test]
fn test_data_sync_workflow() {
    let mut rt = Runtime::standard().unwrap();
    let result = rt.run_workflow(Workflow::DataSync, Default::default());
    assert!(result.success);
    assert_eq!(result.steps.len(), 1);
    assert_eq!(result.data["sync"]["M121"]["rowCount"], json!(3));
    assert_eq!(result.data["sync"]["M122"]["count"], json!(2));
}

#[test]
fn test_workflow_stops_at_failing_step() {
    let mut rt = Runtime::standard().unwrap();
    rt.bind_collaborator("M211", Arc::new(Flaky::always(create_mock(InterfaceKind::ToolApi))))
        .unwrap();

    let result = rt.run_workflow(Workflow::TenantReport, Default::default());

    assert!(!result.success);
    assert_eq!(result.steps.len(), 3);
    let failed = result.steps.last().unwrap();
    assert_eq!(failed.name, "tool_process");
    assert!(!failed.success);
    assert_eq!(
        result.error.as_ref().map(|e| e.code),
        Some(ErrorCode::ExternalIoError)
    );
    assert!(result.data.contains_key("tenant_query"));
    assert!(!result.data.contains_key("report_generate"));

    let m222 = rt.topology().lookup("M222").unwrap();
    assert_eq!(rt.allocator().consumed(m222), 0);

    let summary = rt.history().last().unwrap();
    assert_eq!(summary.final_state, RequestState::Failed);
    assert_eq!(summary.error, Some(ErrorCode::ExternalIoError));
    assert_eq!(
        summary.steps.iter().map(|s| s.success).collect::<Vec<_>>(),
        vec![true, true, false]
    );
}
