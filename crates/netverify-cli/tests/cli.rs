use serde_json::Value;
use std::path::Path;
use std::process::{Command, Output};

type TestResult = Result<(), Box<dyn std::error::Error>>;

const TWO_ROUTERS: &str = r#"{
  "configurations": [
    {"hostname": "a", "interfaces": [{"name": "to-b", "address": "10.0.0.1/30"}]},
    {"hostname": "b", "interfaces": [
      {"name": "to-a", "address": "10.0.0.2/30"},
      {"name": "lan", "address": "192.168.0.1/24"}
    ]}
  ]
}"#;

fn netverify(network: &Path, args: &[&str]) -> Result<Output, Box<dyn std::error::Error>> {
    let network = network.to_str().ok_or("non-utf8 path")?;
    Ok(Command::new(env!("CARGO_BIN_EXE_netverify"))
        .arg(network)
        .args(args)
        .env("RUST_LOG", "warn")
        .output()?)
}

fn write_network(dir: &tempfile::TempDir) -> Result<std::path::PathBuf, std::io::Error> {
    let path = dir.path().join("network.json");
    std::fs::write(&path, TWO_ROUTERS)?;
    Ok(path)
}

#[test]
fn reachable_peer_exits_zero() -> TestResult {
    let dir = tempfile::tempdir()?;
    let network = write_network(&dir)?;
    let out = netverify(&network, &["reachability", "--final-node", "b", "--final-iface", "to-a"])?;
    assert_eq!(
        out.status.code(),
        Some(0),
        "stderr={}",
        String::from_utf8_lossy(&out.stderr)
    );
    assert_eq!(String::from_utf8_lossy(&out.stdout), "Verified\n");
    Ok(())
}

#[test]
fn failure_budget_from_query_file_produces_json_counterexample() -> TestResult {
    let dir = tempfile::tempdir()?;
    let network = write_network(&dir)?;
    let query = dir.path().join("query.json");
    std::fs::write(
        &query,
        r#"{"failures": 1, "final_node_regex": "b", "final_iface_regex": "to-a"}"#,
    )?;
    let out = netverify(
        &network,
        &["reachability", "--query", query.to_str().ok_or("non-utf8 path")?, "--json"],
    )?;
    assert_eq!(
        out.status.code(),
        Some(2),
        "stderr={}",
        String::from_utf8_lossy(&out.stderr)
    );
    let report: Value = serde_json::from_slice(&out.stdout)?;
    assert_eq!(report["verified"], Value::Bool(false));
    let failures = report["counterexample"]["failures"]
        .as_array()
        .ok_or("failures should be an array")?;
    assert!(failures.iter().any(|f| f == "link(a,b)"));
    Ok(())
}

#[test]
fn missing_network_file_is_an_error() -> TestResult {
    let dir = tempfile::tempdir()?;
    let out = netverify(&dir.path().join("absent.json"), &["forwarding"])?;
    assert_eq!(out.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&out.stderr).contains("failed to load network"));
    Ok(())
}
