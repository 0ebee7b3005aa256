//! Requester accounts and the per-call request context.

use std::collections::BTreeSet;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::{EngineError, EngineResult, StoreError};

/// Account role, supplied by the registration collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Regular user.
    #[default]
    User,
    /// External customer.
    Customer,
    /// Regional manager.
    Manager,
    /// Administrator.
    Admin,
}

/// A requester account. The engine only ever removes grants from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAccount {
    /// Requester identity.
    pub id: String,
    /// Home region.
    pub region: String,
    /// Role.
    pub role: Role,
    /// Resource names the account currently holds grants for.
    pub granted_resources: BTreeSet<String>,
}

impl UserAccount {
    /// Account with no grants.
    pub fn new(id: impl Into<String>, region: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            region: region.into(),
            role,
            granted_resources: BTreeSet::new(),
        }
    }

    /// Builder-style grant.
    #[must_use]
    pub fn with_grant(mut self, resource: impl Into<String>) -> Self {
        self.granted_resources.insert(resource.into());
        self
    }
}

/// Storage backend for accounts.
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Fetch one account.
    async fn get(&self, id: &str) -> Result<Option<UserAccount>, StoreError>;

    /// Insert or replace an account.
    async fn upsert(&self, account: UserAccount) -> Result<(), StoreError>;

    /// Remove `resource` from the account's grants. Returns whether a grant
    /// was removed; a missing account is not an error.
    async fn revoke_grant(&self, id: &str, resource: &str) -> Result<bool, StoreError>;
}

/// Identity of the caller, passed explicitly into every engine call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContext {
    /// Requester identity.
    pub requester_id: String,
    /// Requester's region.
    pub region: String,
}

impl RequestContext {
    /// Build a context.
    pub fn new(requester_id: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            requester_id: requester_id.into(),
            region: region.into(),
        }
    }

    /// Context for an account, using its home region.
    #[must_use]
    pub fn for_account(account: &UserAccount) -> Self {
        Self::new(account.id.clone(), account.region.clone())
    }

    /// Reject empty identity or region.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Validation`] when either field is blank.
    pub fn validate(&self) -> EngineResult<()> {
        if self.requester_id.trim().is_empty() {
            return Err(EngineError::Validation("requester id must not be empty".into()));
        }
        if self.region.trim().is_empty() {
            return Err(EngineError::Validation("requester region must not be empty".into()));
        }
        Ok(())
    }
}
