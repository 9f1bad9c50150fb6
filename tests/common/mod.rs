//! Shared fixtures for the workspace integration tests

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use warden_audit::AuditConfig;
use warden_guard::{EnforcementMode, Guard, WardenConfig, WardenStack};
use warden_permissions::FileRoleStore;

pub const ROLES_YAML: &str = r#"
roles:
  - name: Basic Client
    description: Self-service access for clients
    permissions:
      - user:view:own
      - user:edit:own
  - name: HR Manager
    permissions:
      - employee:*:organization
      - attendance:view:organization
      - user:view:all
  - name: Administrator
    permissions:
      - "*:*:*"
bindings:
  - user_id: client-1
    role: Basic Client
  - user_id: hr-1
    role: HR Manager
  - user_id: hr-1
    role: Basic Client
  - user_id: admin-1
    role: Administrator
  - user_id: ghost-1
    role: Retired Role
"#;

pub fn write_roles(dir: &Path, yaml: &str) -> PathBuf {
    let path = dir.join("roles.yaml");
    std::fs::write(&path, yaml).unwrap();
    path
}

/// A guard wired the way a service would wire it, over file-backed roles and audit
pub struct Stack {
    pub guard: Guard,
    pub roles: Arc<FileRoleStore>,
    pub audit_path: PathBuf,
}

impl Stack {
    pub async fn new(dir: &Path, mode: EnforcementMode) -> Self {
        Self::with_audit_config(dir, mode, AuditConfig::default()).await
    }

    pub async fn with_audit_config(dir: &Path, mode: EnforcementMode, audit: AuditConfig) -> Self {
        let audit_path = dir.join("audit").join("trail.jsonl");
        let stack = WardenStack::from_config(WardenConfig {
            mode,
            roles_file: Some(write_roles(dir, ROLES_YAML)),
            audit_file: Some(audit_path.clone()),
            audit,
            ..WardenConfig::default()
        })
        .await
        .unwrap();

        Self {
            guard: stack.guard,
            roles: stack.roles.unwrap(),
            audit_path,
        }
    }
}
