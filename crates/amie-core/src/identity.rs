// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Site identity store interface.
//!
//! The identity store knows local users and project memberships. The
//! reconciler only reads users (to short-circuit account requests for people
//! who already have a login) and clears project membership on inactivation.

use async_trait::async_trait;

/// A user known to the local site.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
pub struct SiteUser {
    pub email: String,
    pub unix_name: String,
}

/// Identity store failures.
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("user '{0}' not found")]
    UserNotFound(String),

    #[error("project '{0}' not found")]
    ProjectNotFound(String),

    #[error("identity store unavailable: {0}")]
    Unavailable(String),
}

/// Local identity store.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Resolve a site person id to a local user.
    async fn lookup_user(&self, person_id: &str) -> Result<SiteUser, IdentityError>;

    /// Remove every member from a project.
    async fn remove_all_users(&self, project_id: &str) -> Result<(), IdentityError>;
}

/// Identity store used when no identity service is configured.
///
/// Every call reports [`IdentityError::Unavailable`], which sends account
/// requests to facilitators.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnconfiguredIdentityStore;

#[async_trait]
impl IdentityStore for UnconfiguredIdentityStore {
    async fn lookup_user(&self, _person_id: &str) -> Result<SiteUser, IdentityError> {
        Err(IdentityError::Unavailable("not configured".to_string()))
    }

    async fn remove_all_users(&self, _project_id: &str) -> Result<(), IdentityError> {
        Err(IdentityError::Unavailable("not configured".to_string()))
    }
}
