//! Building a full guard stack from a configuration file

use std::path::Path;
use std::time::Duration;

use axum::http::{HeaderMap, HeaderValue};
use tempfile::TempDir;
use warden_guard::{
    EnforcementMode, GuardError, GuardOutcome, RateLimiter, RequestContext, WardenConfig,
    WardenStack,
};

const ROLES: &str = r#"
roles:
  - name: Basic Client
    permissions:
      - user:view:own
bindings:
  - user_id: u1
    role: Basic Client
"#;

fn write_config(dir: &Path) -> std::path::PathBuf {
    let roles = dir.join("roles.yaml");
    std::fs::write(&roles, ROLES).unwrap();

    let path = dir.join("warden.toml");
    std::fs::write(
        &path,
        format!(
            r#"
mode = "enforce"
principal_header = "x-authenticated-user"
roles_file = "{roles}"
audit_file = "{audit}"

[cache]
ttl_seconds = 45
max_entries = 2

[audit]
queue_capacity = 64

[rate_limit.route_limits."/login"]
max_requests = 1
window_seconds = 300
"#,
            roles = roles.display(),
            audit = dir.join("audit.jsonl").display(),
        ),
    )
    .unwrap();
    path
}

fn ctx(header: &'static str, user: &str) -> RequestContext {
    let mut headers = HeaderMap::new();
    headers.insert(header, HeaderValue::from_str(user).unwrap());
    RequestContext::from_parts(&headers, "/api/users")
}

#[tokio::test]
async fn test_stack_follows_every_config_section() {
    let dir = TempDir::new().unwrap();
    let config = WardenConfig::from_file(&write_config(dir.path())).unwrap();
    let stack = WardenStack::from_config(config).await.unwrap();

    assert_eq!(stack.guard.mode().get(), EnforcementMode::Enforce);
    assert_eq!(stack.guard.cache().config().ttl, Duration::from_secs(45));
    assert_eq!(stack.guard.audit().config().queue_capacity, 64);
    assert!(stack.roles.is_some());

    // Only the configured header identifies the caller.
    let outcome = stack
        .guard
        .guard("user:view:own", &ctx("x-authenticated-user", "u1"))
        .await;
    assert!(matches!(outcome, GuardOutcome::Continue { decision: Some(ref d) } if d.allowed));
    let outcome = stack.guard.guard("user:view:own", &ctx("x-user-id", "u1")).await;
    assert!(matches!(outcome, GuardOutcome::Unauthenticated));

    assert!(stack.limiter.check("user:u1", "/login").await.unwrap().success);
    assert!(!stack.limiter.check("user:u1", "/login").await.unwrap().success);
    assert_eq!(stack.limiter.check("user:u1", "/other").await.unwrap().limit, 120);

    stack.guard.audit().shutdown().await;
    let trail = std::fs::read_to_string(dir.path().join("audit.jsonl")).unwrap();
    assert_eq!(trail.lines().count(), 2);
}

#[tokio::test]
async fn test_bounded_cache_still_serves_every_user() {
    let dir = TempDir::new().unwrap();
    let config = WardenConfig::from_file(&write_config(dir.path())).unwrap();
    let stack = WardenStack::from_config(config).await.unwrap();

    for user in ["u1", "u2", "u3", "u4"] {
        stack.guard.check_permission(user, "user:view:own").await.unwrap();
    }
    let decision = stack.guard.check_permission("u1", "user:view:own").await.unwrap();
    assert!(decision.allowed);
}

#[tokio::test]
async fn test_without_roles_file_everything_is_denied() {
    let stack = WardenStack::from_config(WardenConfig::default()).await.unwrap();
    assert!(stack.roles.is_none());

    let outcome = stack.guard.guard("user:view:own", &ctx("x-user-id", "u1")).await;
    assert!(matches!(outcome, GuardOutcome::Forbidden(_)));
}

#[tokio::test]
async fn test_invalid_principal_header_is_rejected() {
    let config = WardenConfig {
        principal_header: "x user".to_string(),
        ..WardenConfig::default()
    };
    let err = WardenStack::from_config(config).await.unwrap_err();
    assert!(matches!(err, GuardError::InvalidHeader(ref header) if header == "x user"));
}

#[tokio::test]
async fn test_missing_role_document_names_the_path() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("absent.yaml");
    let config = WardenConfig {
        roles_file: Some(missing.clone()),
        ..WardenConfig::default()
    };

    match WardenStack::from_config(config).await {
        Err(GuardError::RoleDocument { path, .. }) => assert_eq!(path, missing),
        other => panic!("unexpected result {:?}", other.map(|_| ())),
    }
}
