//! End-to-end: suites -> runner -> interceptor -> rule engines -> collector,
//! against the axum stub server over plain HTTP.

use apiguard_http::{HttpClient, HttpClientConfig};
use apiguard_qc::{
    expect, Exchange, GovernanceEngine, GovernanceRule, PluginConfig, RawViolation, RunConfig,
    RunnerConfig, Severity, StubRoute, SuiteRegistry, TestRunner, TestServer, TestStatus,
};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

async fn stub_server() -> apiguard_qc::TestServerHandle {
    TestServer::new()
        .get("/user", json!({ "id": 1, "name": "Ann" }))
        .get("/v1/users", json!({ "users": [] }))
        .route(
            "POST",
            "/v1/users",
            StubRoute::new(201, json!({ "id": 2 })).header("location", "/v1/users/2"),
        )
        .start()
        .await
        .unwrap()
}

fn transport() -> Arc<HttpClient> {
    Arc::new(HttpClient::new(HttpClientConfig::new()).unwrap())
}

fn config(base_url: &str) -> RunConfig {
    let mut config = RunConfig {
        base_url: Some(base_url.to_string()),
        ..Default::default()
    };
    config
        .governance
        .rules
        .insert("versioning".into(), PluginConfig::enabled());
    config
        .governance
        .rules
        .insert("naming-conventions".into(), PluginConfig::enabled());
    config
        .security
        .checks
        .insert("ssl-tls".into(), PluginConfig::enabled());
    config
}

#[tokio::test]
async fn test_exchanges_produce_labelled_issues() {
    let server = stub_server().await;

    let mut registry = SuiteRegistry::new();
    registry
        .describe("Users API", |s| {
            s.test("gets a single user", |ctx| async move {
                let response = ctx.request().get("/user").await?;
                expect(&response).to_have_status(200)?;
                Ok(())
            })?;
            s.test("creates a user", |ctx| async move {
                let response = ctx
                    .request()
                    .post("/v1/users", json!({ "name": "Bob" }))
                    .await?;
                expect(response.status_code).to_be(201)?;
                Ok(())
            })
        })
        .unwrap();

    let runner = TestRunner::from_run_config(&config(server.url()), transport()).unwrap();
    let results = runner.run(&registry).await;

    // Rule output never changes test outcomes
    assert_eq!(results.summary.passed, 2);
    assert!(!results.has_failures());

    let rules: Vec<_> = results
        .governance
        .violations
        .iter()
        .map(|v| (v.rule.as_str(), v.test.as_str()))
        .collect();
    assert!(rules.contains(&("versioning", "gets a single user")));
    assert!(rules.contains(&("naming-conventions", "gets a single user")));
    assert!(results
        .governance
        .violations
        .iter()
        .all(|v| v.test == "gets a single user" && v.endpoint == "/user"));

    // Plain HTTP is flagged once per exchange
    let findings = &results.security.findings;
    assert_eq!(findings.len(), 2);
    assert!(findings.iter().all(|f| f.check == "ssl-tls"));
    assert!(findings.iter().all(|f| f.suite == "Users API"));
    assert!(findings.iter().any(|f| f.test == "creates a user" && f.method == "POST"));
    assert!(findings.iter().all(|f| f.cwe == "CWE-319"));
}

struct Broken;

#[async_trait]
impl GovernanceRule for Broken {
    fn name(&self) -> &str {
        "broken"
    }

    async fn validate(&self, _: &Exchange<'_>) -> anyhow::Result<Vec<RawViolation>> {
        anyhow::bail!("rule crashed")
    }
}

struct Noisy;

#[async_trait]
impl GovernanceRule for Noisy {
    fn name(&self) -> &str {
        "noisy"
    }

    async fn validate(&self, _: &Exchange<'_>) -> anyhow::Result<Vec<RawViolation>> {
        Ok(vec![RawViolation::new("always complains").severity(Severity::Low)])
    }
}

#[tokio::test]
async fn test_failing_rule_is_isolated() {
    let server = stub_server().await;

    let mut governance = GovernanceEngine::new();
    governance.add_rule(Arc::new(Broken));
    governance.add_rule(Arc::new(Noisy));

    let mut registry = SuiteRegistry::new();
    registry
        .describe("Users API", |s| {
            s.test("lists users", |ctx| async move {
                let response = ctx.request().get("/v1/users").await?;
                expect(response.status_code).to_be(200)?;
                Ok(())
            })
        })
        .unwrap();

    let runner = TestRunner::new(RunnerConfig::default(), transport())
        .with_governance(governance)
        .with_base_url(server.url());
    let results = runner.run(&registry).await;

    assert_eq!(results.tests().next().unwrap().status, TestStatus::Passed);
    assert!(results.governance.violations.is_empty());
    assert_eq!(results.governance.warnings.len(), 1);
    assert_eq!(results.governance.warnings[0].rule, "noisy");
}

#[tokio::test]
async fn test_transport_failure_fails_only_the_test() {
    let mut registry = SuiteRegistry::new();
    registry
        .describe("Offline", |s| {
            s.test("cannot connect", |ctx| async move {
                ctx.request().get("/v1/users").await?;
                Ok(())
            })?;
            s.test("does not need the network", |_| async move {
                expect(1 + 1).to_be(2)?;
                Ok(())
            })
        })
        .unwrap();

    // Nothing listens on port 9 locally
    let runner = TestRunner::new(RunnerConfig::default(), transport())
        .with_base_url("http://127.0.0.1:9");
    let results = runner.run(&registry).await;

    assert_eq!(results.summary.failed, 1);
    assert_eq!(results.summary.passed, 1);
    assert!(results.security.findings.is_empty());
}
