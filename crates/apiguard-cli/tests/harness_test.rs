//! Harness end-to-end: config file -> suites -> results file -> gate

use apiguard_cli::{execute, read_results, RunArgs};
use apiguard_qc::{expect, SuiteRegistry, TestServer};
use clap::Parser;
use serde_json::json;

fn registry() -> SuiteRegistry {
    let mut registry = SuiteRegistry::new();
    registry
        .describe("Users API", |s| {
            s.test("lists users", |ctx| async move {
                let response = ctx.request().get("/v1/users").await?;
                expect(&response).to_have_status(200)?;
                Ok(())
            })
        })
        .unwrap();
    registry
}

#[tokio::test]
async fn test_run_writes_results_and_gates_on_findings() {
    let server = TestServer::new()
        .get("/v1/users", json!({ "users": [] }))
        .start()
        .await
        .unwrap();
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("results.json");

    // Plain HTTP always yields one high finding per request
    let config = dir.path().join("apiguard.config.yaml");
    std::fs::write(
        &config,
        format!(
            "baseUrl: {}\nsecurity:\n  checks:\n    ssl-tls: {{}}\nthresholds:\n  securityFindings:\n    high: 0\n",
            server.url()
        ),
    )
    .unwrap();

    let args = RunArgs::try_parse_from([
        "apiguard".to_string(),
        "--config".to_string(),
        config.display().to_string(),
        "--output".to_string(),
        output.display().to_string(),
        "--format".to_string(),
        "json".to_string(),
    ])
    .unwrap();

    let code = execute(args, &registry()).await.unwrap();
    assert_eq!(code, 1);

    let results = read_results(&output).unwrap();
    assert_eq!(results.summary.passed, 1);
    assert_eq!(results.security.findings.len(), 1);
    assert_eq!(results.security.findings[0].test, "lists users");
    assert!(results.metadata.start_time.is_some());
}

#[tokio::test]
async fn test_clean_run_exits_zero() {
    let server = TestServer::new()
        .get("/v1/users", json!({ "users": [] }))
        .start()
        .await
        .unwrap();
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("apiguard.config.json");
    std::fs::write(
        &config,
        json!({
            "governance": { "rules": { "versioning": {}, "naming-conventions": {} } },
            "thresholds": { "governanceViolations": { "error": 0 }, "testPassRate": 100 }
        })
        .to_string(),
    )
    .unwrap();

    let args = RunArgs::try_parse_from([
        "apiguard".to_string(),
        "--config".to_string(),
        config.display().to_string(),
        "--base-url".to_string(),
        server.url().to_string(),
    ])
    .unwrap();

    assert_eq!(execute(args, &registry()).await.unwrap(), 0);
}
