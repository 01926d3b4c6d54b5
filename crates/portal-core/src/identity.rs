use std::sync::Arc;

use chrono::Utc;
use portal_db::Database;
use portal_types::models::{AuthSource, User};
use tracing::info;
use uuid::Uuid;

use crate::config::DevIdentity;
use crate::error::{PortalError, Result};
use crate::oauth::ProviderIdentity;
use crate::task;

/// Turns an asserted identity into a `User` row, creating it on first
/// sight. The dev capability is decided once at construction: when
/// `dev` is `None`, `resolve_dev` is a dead end no request can open.
pub struct IdentityResolver {
    db: Arc<Database>,
    dev: Option<DevIdentity>,
}

impl IdentityResolver {
    pub fn new(db: Arc<Database>, dev: Option<DevIdentity>) -> Self {
        Self { db, dev }
    }

    pub fn dev_enabled(&self) -> bool {
        self.dev.is_some()
    }

    /// Dev-mode shortcut: materialize the configured local identity.
    pub async fn resolve_dev(&self) -> Result<User> {
        let dev = self.dev.clone().ok_or(PortalError::Unauthenticated)?;
        self.upsert(&dev.email, &dev.display_name, AuthSource::Dev)
            .await
    }

    /// OAuth path: the provider already verified this identity.
    pub async fn resolve_provider(&self, identity: &ProviderIdentity) -> Result<User> {
        self.upsert(&identity.email, &identity.display_name, AuthSource::Google)
            .await
    }

    /// Session lookup: the id baked into an already-validated token.
    pub async fn user_by_id(&self, id: Uuid) -> Result<Option<User>> {
        let db = self.db.clone();
        let row = task::blocking(move || Ok(db.get_user_by_id(&id.to_string())?)).await?;
        match row {
            Some(row) => Ok(Some(row.into_model()?)),
            None => Ok(None),
        }
    }

    /// Match by lowercased email; create on first sight, refresh the
    /// display name on repeat sight.
    async fn upsert(&self, email: &str, display_name: &str, source: AuthSource) -> Result<User> {
        let email = email.trim().to_lowercase();
        let display_name = display_name.trim().to_string();
        if email.is_empty() {
            return Err(PortalError::Unauthenticated);
        }

        let db = self.db.clone();
        task::blocking(move || {
            if let Some(row) = db.get_user_by_email(&email)? {
                if row.display_name != display_name {
                    db.update_user_display_name(&row.id, &display_name)?;
                }
                let mut user = row.into_model()?;
                user.display_name = display_name;
                return Ok(user);
            }

            let id = Uuid::new_v4();
            let created_at = Utc::now();
            db.create_user(
                &id.to_string(),
                &email,
                &display_name,
                source.as_str(),
                &created_at.to_rfc3339(),
            )?;
            info!("Created user {} ({}, {})", id, email, source.as_str());

            Ok(User {
                id,
                email,
                display_name,
                auth_source: source,
                created_at,
            })
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::scratch_env;

    fn dev_identity() -> DevIdentity {
        DevIdentity {
            email: "dev@example.com".into(),
            display_name: "Dev User".into(),
        }
    }

    #[tokio::test]
    async fn dev_login_disabled_without_capability() {
        let (_dir, db, _storage) = scratch_env().await;
        let resolver = IdentityResolver::new(db, None);

        assert!(!resolver.dev_enabled());
        assert!(matches!(
            resolver.resolve_dev().await,
            Err(PortalError::Unauthenticated)
        ));
    }

    #[tokio::test]
    async fn dev_login_creates_then_reuses_user() {
        let (_dir, db, _storage) = scratch_env().await;
        let resolver = IdentityResolver::new(db, Some(dev_identity()));

        let first = resolver.resolve_dev().await.unwrap();
        assert_eq!(first.email, "dev@example.com");
        assert_eq!(first.auth_source, AuthSource::Dev);

        let second = resolver.resolve_dev().await.unwrap();
        assert_eq!(second.id, first.id);
    }

    #[tokio::test]
    async fn provider_email_matched_case_insensitively() {
        let (_dir, db, _storage) = scratch_env().await;
        let resolver = IdentityResolver::new(db, None);

        let first = resolver
            .resolve_provider(&ProviderIdentity {
                email: "Parent@Example.COM".into(),
                display_name: "Pat".into(),
            })
            .await
            .unwrap();
        assert_eq!(first.email, "parent@example.com");

        let second = resolver
            .resolve_provider(&ProviderIdentity {
                email: "parent@example.com".into(),
                display_name: "Pat Doe".into(),
            })
            .await
            .unwrap();
        assert_eq!(second.id, first.id);
        assert_eq!(second.display_name, "Pat Doe");
    }
}
