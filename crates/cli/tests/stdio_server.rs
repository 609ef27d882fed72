//! Tests against the real `switchboard` binary: the stdio protocol served by
//! `switchboard serve utils`, and the commands that drive it.

use futures::future::join_all;
use serde_json::{Value, json};
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::time::Duration;
use switchboard_core::protocol::PROTOCOL_VERSION;
use switchboard_core::{FailureKind, InvocationRequest, OutcomeStatus, RequestId, ServerSpec};
use switchboard_router::{Router, RouterOptions};
use switchboard_servers::ConnectorSet;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

const BIN: &str = env!("CARGO_BIN_EXE_switchboard");

fn utils_spec() -> ServerSpec {
    ServerSpec::stdio("utils", BIN, vec!["serve".into(), "utils".into()])
}

fn request(index: usize, capability: &str, arguments: Value) -> InvocationRequest {
    let Value::Object(arguments) = arguments else {
        panic!("arguments must be an object");
    };
    InvocationRequest::new(RequestId::new(1, 1, index), capability, arguments, 1)
}

type Lines = tokio::io::Lines<BufReader<tokio::process::ChildStdout>>;

/// Write one request line and read one response line.
async fn exchange(stdin: &mut tokio::process::ChildStdin, lines: &mut Lines, request: Value) -> Value {
    stdin.write_all(format!("{request}\n").as_bytes()).await.unwrap();
    stdin.flush().await.unwrap();
    let reply = tokio::time::timeout(Duration::from_secs(10), lines.next_line())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    serde_json::from_str(&reply).unwrap()
}

#[tokio::test]
async fn raw_protocol_over_pipes() {
    let mut child = tokio::process::Command::new(BIN)
        .args(["serve", "utils"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .unwrap();
    let mut stdin = child.stdin.take().unwrap();
    let mut lines = BufReader::new(child.stdout.take().unwrap()).lines();

    let hello = exchange(
        &mut stdin,
        &mut lines,
        json!({"id": 1, "method": "handshake", "params": {"client": "test", "protocol_version": PROTOCOL_VERSION}}),
    )
    .await;
    assert_eq!(hello["id"], 1);
    assert_eq!(hello["status"], "ok");
    assert_eq!(hello["payload"]["server"], "utils");

    let listing = exchange(&mut stdin, &mut lines, json!({"id": 2, "method": "discover"})).await;
    let names: Vec<&str> = listing["payload"]["capabilities"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|c| c["name"].as_str())
        .collect();
    assert!(names.contains(&"calculate"));
    assert!(names.contains(&"convert_temperature"));
    assert!(names.contains(&"get_current_time"));

    let sum = exchange(
        &mut stdin,
        &mut lines,
        json!({"id": 3, "method": "invoke", "params": {"name": "calculate", "arguments": {"expression": "2+3*4"}}}),
    )
    .await;
    assert_eq!(sum["id"], 3);
    assert_eq!(sum["payload"], "Result: 2+3*4 = 14");

    let missing = exchange(
        &mut stdin,
        &mut lines,
        json!({"id": 4, "method": "invoke", "params": {"name": "teleport", "arguments": {}}}),
    )
    .await;
    assert_eq!(missing["status"], "error");
    assert_eq!(missing["kind"], "unknown_capability");

    drop(stdin);
    let status = tokio::time::timeout(Duration::from_secs(10), child.wait())
        .await
        .unwrap()
        .unwrap();
    assert!(status.success());
}

#[tokio::test]
async fn router_routes_to_a_subprocess_server() {
    let router = Router::new(Arc::new(ConnectorSet::new()), RouterOptions::default());
    let names = router.connect(utils_spec()).await.unwrap();
    assert_eq!(names.len(), 3);

    let requests = [
        request(0, "calculate", json!({"expression": "sqrt(16) + 2^3"})),
        request(1, "convert_temperature", json!({"value": 100, "from_unit": "celsius", "to_unit": "fahrenheit"})),
        request(2, "calculate", json!({"expression": "1/0"})),
        request(3, "calculate", json!({})),
    ];
    let outcomes = join_all(requests.iter().map(|r| router.route(r))).await;

    assert_eq!(
        outcomes[0].status,
        OutcomeStatus::Success {
            payload: json!("Result: sqrt(16) + 2^3 = 12")
        }
    );
    assert_eq!(
        outcomes[1].status,
        OutcomeStatus::Success {
            payload: json!("Result: 100°C = 212°F")
        }
    );
    assert_eq!(outcomes[2].failure_kind(), Some(FailureKind::CapabilityError));
    assert_eq!(outcomes[3].failure_kind(), Some(FailureKind::CapabilityError));

    router.shutdown().await;
}

#[test]
fn init_writes_a_loadable_config() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("config.toml");

    let output = Command::new(BIN)
        .args(["--config", path.to_str().unwrap(), "init"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let written = std::fs::read_to_string(&path).unwrap();
    assert!(written.contains("[[servers]]"));
    assert!(written.contains("serve"));

    // a second run leaves the file alone
    std::fs::write(&path, "# edited\n").unwrap();
    let again = Command::new(BIN)
        .args(["--config", path.to_str().unwrap(), "init"])
        .output()
        .unwrap();
    assert!(again.status.success());
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "# edited\n");
}

#[test]
fn capabilities_lists_the_configured_namespace() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        format!("[[servers]]\nname = \"utils\"\ncommand = '{BIN}'\nargs = [\"serve\", \"utils\"]\n"),
    )
    .unwrap();

    let output = Command::new(BIN)
        .args(["--config", path.to_str().unwrap(), "capabilities", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let listing: Vec<Value> = serde_json::from_slice(&output.stdout).unwrap();
    let names: Vec<&str> = listing.iter().filter_map(|d| d["name"].as_str()).collect();
    assert_eq!(names, vec!["calculate", "convert_temperature", "get_current_time"]);
}

#[test]
fn serve_rejects_unknown_sets() {
    let output = Command::new(BIN)
        .args(["serve", "weather"])
        .stdin(Stdio::null())
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Available: utils"));
}
