//! Role-binding stores
//!
//! The evaluator reads roles and bindings only through [`RoleBindingStore`].
//! Administrative writes happen elsewhere; whoever performs them must
//! invalidate the permission cache afterwards.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{PermissionError, Result};
use crate::role::{Role, RoleBinding};

/// Narrow read interface onto the external role-binding source of truth
#[async_trait]
pub trait RoleBindingStore: Send + Sync {
    /// All role bindings for a user
    async fn role_bindings_for(&self, user_id: &str) -> Result<Vec<RoleBinding>>;

    /// Look up a role definition by name
    async fn role(&self, name: &str) -> Result<Option<Role>>;
}

/// Serialized form of a role catalogue plus bindings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoleDocument {
    #[serde(default)]
    pub roles: Vec<Role>,
    #[serde(default)]
    pub bindings: Vec<RoleBinding>,
}

impl RoleDocument {
    fn validate(&self) -> Result<()> {
        let mut names = std::collections::HashSet::new();
        for role in &self.roles {
            role.validate()?;
            if !names.insert(role.name.as_str()) {
                return Err(PermissionError::InvalidRole(format!(
                    "duplicate role '{}'",
                    role.name
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct RoleState {
    roles: HashMap<String, Role>,
    bindings: HashMap<String, Vec<String>>,
}

impl RoleState {
    fn from_document(doc: RoleDocument) -> Result<Self> {
        doc.validate()?;
        let mut state = RoleState::default();
        for role in doc.roles {
            state.roles.insert(role.name.clone(), role);
        }
        for binding in doc.bindings {
            state.bind(binding.user_id, binding.role);
        }
        Ok(state)
    }

    fn bind(&mut self, user_id: String, role: String) {
        let roles = self.bindings.entry(user_id).or_default();
        if !roles.contains(&role) {
            roles.push(role);
        }
    }

    fn bindings_for(&self, user_id: &str) -> Vec<RoleBinding> {
        self.bindings
            .get(user_id)
            .map(|roles| {
                roles
                    .iter()
                    .map(|role| RoleBinding::new(user_id, role.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// In-process role store
#[derive(Debug, Default)]
pub struct InMemoryRoleStore {
    state: RwLock<RoleState>,
}

impl InMemoryRoleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_document(doc: RoleDocument) -> Result<Self> {
        Ok(Self {
            state: RwLock::new(RoleState::from_document(doc)?),
        })
    }

    /// Insert or replace a role definition
    pub fn upsert_role(&self, role: Role) -> Result<()> {
        role.validate()?;
        self.state.write().roles.insert(role.name.clone(), role);
        Ok(())
    }

    /// Remove a role definition; existing bindings to it stop granting anything
    pub fn remove_role(&self, name: &str) -> bool {
        self.state.write().roles.remove(name).is_some()
    }

    pub fn bind(&self, user_id: impl Into<String>, role: impl Into<String>) {
        self.state.write().bind(user_id.into(), role.into());
    }

    /// Remove a binding; returns whether it existed
    pub fn unbind(&self, user_id: &str, role: &str) -> bool {
        let mut state = self.state.write();
        match state.bindings.get_mut(user_id) {
            Some(roles) => {
                let before = roles.len();
                roles.retain(|r| r != role);
                before != roles.len()
            }
            None => false,
        }
    }
}

#[async_trait]
impl RoleBindingStore for InMemoryRoleStore {
    async fn role_bindings_for(&self, user_id: &str) -> Result<Vec<RoleBinding>> {
        Ok(self.state.read().bindings_for(user_id))
    }

    async fn role(&self, name: &str) -> Result<Option<Role>> {
        Ok(self.state.read().roles.get(name).cloned())
    }
}

/// Role store backed by a JSON or YAML [`RoleDocument`] on disk
pub struct FileRoleStore {
    path: PathBuf,
    state: RwLock<RoleState>,
}

impl FileRoleStore {
    /// Load the document at `path`; `.yaml`/`.yml` are read as YAML, anything else as JSON
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let state = RoleState::from_document(Self::read_document(&path).await?)?;
        info!(
            path = %path.display(),
            roles = state.roles.len(),
            users = state.bindings.len(),
            "Loaded role document"
        );
        Ok(Self {
            path,
            state: RwLock::new(state),
        })
    }

    /// Re-read the document from disk, replacing the in-memory state atomically
    pub async fn reload(&self) -> Result<()> {
        let state = RoleState::from_document(Self::read_document(&self.path).await?)?;
        debug!(path = %self.path.display(), "Reloaded role document");
        *self.state.write() = state;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_document(path: &Path) -> Result<RoleDocument> {
        let content = tokio::fs::read_to_string(path).await?;
        let is_yaml = matches!(
            path.extension().and_then(|ext| ext.to_str()),
            Some("yaml") | Some("yml")
        );
        let doc = if is_yaml {
            serde_yaml::from_str(&content)?
        } else {
            serde_json::from_str(&content)?
        };
        Ok(doc)
    }
}

#[async_trait]
impl RoleBindingStore for FileRoleStore {
    async fn role_bindings_for(&self, user_id: &str) -> Result<Vec<RoleBinding>> {
        Ok(self.state.read().bindings_for(user_id))
    }

    async fn role(&self, name: &str) -> Result<Option<Role>> {
        Ok(self.state.read().roles.get(name).cloned())
    }
}
