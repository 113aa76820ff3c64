//! CLI integration tests

use recommender_lib::model::{
    AggregateContainerState, AggregateStateKey, AggregateStateMap, ResourceAmount,
};
use recommender_lib::provider::StaticProvider;
use recommender_lib::{
    ClusterStateFeeder, FeederConfig, FileStore, HealthRegistry, Recommender, Store,
};
use std::path::Path;
use std::process::{Command, Output};
use std::sync::Arc;
use tempfile::TempDir;

fn recctl(store: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_recctl"))
        .arg("--store")
        .arg(store)
        .args(args)
        .env("NO_COLOR", "1")
        .output()
        .expect("Failed to execute recctl")
}

fn json(output: &Output) -> serde_json::Value {
    assert!(
        output.status.success(),
        "recctl failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("stdout is not JSON")
}

/// Test that the CLI shows help
#[test]
fn test_cli_help() {
    let output = Command::new(env!("CARGO_BIN_EXE_recctl"))
        .arg("--help")
        .output()
        .expect("Failed to execute command");

    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI help should succeed");
    assert!(stdout.contains("app"), "Should show app command");
    assert!(stdout.contains("timeframe"), "Should show timeframe command");
    assert!(stdout.contains("resources"), "Should show resources command");
}

#[test]
fn test_application_lifecycle() {
    let dir = TempDir::new().unwrap();
    let store = dir.path().join("store.json");

    assert!(recctl(&store, &["app", "add", "svc-a"]).status.success());
    assert!(recctl(&store, &["app", "add", "svc-b"]).status.success());

    let duplicate = recctl(&store, &["app", "add", "svc-a"]);
    assert!(!duplicate.status.success());
    assert!(String::from_utf8_lossy(&duplicate.stderr).contains("already exists"));

    let listed = json(&recctl(&store, &["--format", "json", "app", "list"]));
    let names: Vec<_> = listed
        .as_array()
        .unwrap()
        .iter()
        .map(|a| a["name"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(names, vec!["svc-a", "svc-b"]);

    assert!(recctl(&store, &["app", "delete", "svc-b"]).status.success());
    let listed = json(&recctl(&store, &["--format", "json", "app", "list"]));
    assert_eq!(listed.as_array().unwrap().len(), 1);
}

#[test]
fn test_timeframe_add_accepts_both_timestamp_forms() {
    let dir = TempDir::new().unwrap();
    let store = dir.path().join("store.json");

    let created = json(&recctl(
        &store,
        &[
            "--format",
            "json",
            "timeframe",
            "add",
            "black-friday",
            "--start",
            "2024-11-29 00:00:00",
            "--end",
            "2024-11-30T00:00:00Z",
            "--on",
            "--description",
            "peak sale",
        ],
    ));

    assert_eq!(created["name"], "black-friday");
    assert_eq!(created["status"], "on");
    assert_eq!(created["description"], "peak sale");

    assert!(recctl(&store, &["timeframe", "off", "black-friday"]).status.success());
    let listed = json(&recctl(&store, &["--format", "json", "timeframe", "list"]));
    assert_eq!(listed[0]["status"], "off");
}

#[test]
fn test_timeframe_add_rejects_inverted_window() {
    let dir = TempDir::new().unwrap();
    let store = dir.path().join("store.json");

    let output = recctl(
        &store,
        &[
            "timeframe",
            "add",
            "backwards",
            "--start",
            "2024-11-30 00:00:00",
            "--end",
            "2024-11-29 00:00:00",
        ],
    );

    assert!(!output.status.success());
    let listed = json(&recctl(&store, &["--format", "json", "timeframe", "list"]));
    assert!(listed.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_resources_show_recommender_output() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("store.json");

    let store = Arc::new(FileStore::new(&path));
    store.create_application("svc-a").await.unwrap();

    let mut usage = AggregateContainerState::new();
    usage.cpu = ResourceAmount::from_cores(0.5);
    usage.memory = ResourceAmount::from_f64(104_857_600.0);
    let mut aggregates = AggregateStateMap::new();
    aggregates.insert(AggregateStateKey::new("svc-a", "web", "k8s_web_1"), usage);

    let provider = Arc::new(StaticProvider::new());
    provider.set_metrics("svc-a", aggregates);

    let feeder = ClusterStateFeeder::new(store.clone(), provider, FeederConfig::default());
    let mut recommender = Recommender::new(feeder, HealthRegistry::new());
    recommender.run_once().await;

    let shown = json(&recctl(&path, &["--format", "json", "resources", "--app", "svc-a"]));
    let containers = shown[0]["container_resources"].as_array().unwrap();
    assert_eq!(containers.len(), 1);
    assert_eq!(containers[0]["name"], "web");
    assert_eq!(containers[0]["cpu_limit"], 500);
    assert_eq!(containers[0]["memory_limit"], 104_857_600);

    let table = recctl(&path, &["resources"]);
    assert!(table.status.success());
    let stdout = String::from_utf8_lossy(&table.stdout);
    assert!(stdout.contains("web"));
    assert!(stdout.contains("500m"));
    assert!(stdout.contains("100.00Mi"));
}
