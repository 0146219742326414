//! Service wiring: identity store, authorization manager, token service and
//! the policy table, built once at startup and shared by every request.

use std::sync::Arc;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;

use bizhub_auth::{Hs256TokenService, JwtSettings, PolicyRegistry, Role, TokenService};
use bizhub_core::{DomainError, TenantId, UserId};
use bizhub_infra::{
    AuthorizationManager, IdentityStore, InMemoryIdentityStore, ManagementError, PostgresIdentityStore,
};

use crate::config::{AppConfig, BootstrapConfig, StoreBackend};

/// Store type the HTTP layer works against.
pub type SharedStore = Arc<dyn IdentityStore>;

pub struct AppServices {
    pub manager: AuthorizationManager<SharedStore>,
    pub tokens: Arc<dyn TokenService>,
}

/// The administrator seeded by [`AppServices::bootstrap`].
#[derive(Debug, Clone)]
pub struct BootstrapAdmin {
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub token: String,
}

impl AppServices {
    pub fn new(store: SharedStore, jwt: JwtSettings) -> Self {
        Self {
            manager: AuthorizationManager::new(store, PolicyRegistry::standard()),
            tokens: Arc::new(Hs256TokenService::new(jwt)),
        }
    }

    /// In-memory wiring (dev/test).
    pub fn in_memory(jwt: JwtSettings) -> Self {
        Self::new(Arc::new(InMemoryIdentityStore::new()), jwt)
    }

    /// Wiring selected by configuration. Applies the schema for Postgres.
    pub async fn from_config(cfg: &AppConfig) -> anyhow::Result<Self> {
        let store: SharedStore = match cfg.store.backend {
            StoreBackend::Memory => {
                tracing::info!("using in-memory identity store");
                Arc::new(InMemoryIdentityStore::new())
            }
            StoreBackend::Postgres => {
                let url = cfg
                    .store
                    .database_url
                    .as_deref()
                    .context("store.database_url is required for the postgres backend")?;
                let pool = PgPoolOptions::new()
                    .max_connections(cfg.store.max_connections)
                    .connect(url)
                    .await
                    .context("failed to connect to postgres")?;
                let store = PostgresIdentityStore::new(pool);
                store
                    .run_migrations()
                    .await
                    .context("failed to apply identity schema")?;
                tracing::info!("using postgres identity store");
                Arc::new(store)
            }
        };

        let services = Self::new(store, cfg.jwt_settings());
        services.bootstrap(&cfg.bootstrap).await?;
        Ok(services)
    }

    /// Seed the configured administrator: an Admin role (reused when present),
    /// the user holding it, and a token for first sign-in.
    ///
    /// Returns `None` when nothing is configured or the user already exists.
    pub async fn bootstrap(&self, cfg: &BootstrapConfig) -> anyhow::Result<Option<BootstrapAdmin>> {
        let Some((user_name, email)) = cfg.admin() else {
            return Ok(None);
        };
        let tenant_id = cfg.tenant_id.unwrap_or_else(TenantId::new);

        let user = match self.manager.create_user(tenant_id, user_name, email).await {
            Ok(user) => user,
            Err(ManagementError::Domain(DomainError::Conflict(_))) => {
                tracing::info!(%tenant_id, user_name, "bootstrap admin already exists");
                return Ok(None);
            }
            Err(e) => return Err(e).context("failed to create bootstrap admin"),
        };

        let existing = self
            .manager
            .get_role_list(tenant_id)
            .await?
            .into_iter()
            .find(|r| r.name.eq_ignore_ascii_case(Role::ADMIN.as_str()));
        let admin_role = match existing {
            Some(role) => role,
            None => self.manager.create_role(tenant_id, Role::ADMIN.as_str()).await?,
        };
        self.manager
            .update_user_roles(tenant_id, user.id, &[admin_role.id])
            .await?;

        let token = self
            .manager
            .issue_token(tenant_id, user.id, self.tokens.as_ref())
            .await?;
        tracing::info!(%tenant_id, user_id = %user.id, %token, "bootstrap admin ready");

        Ok(Some(BootstrapAdmin {
            tenant_id,
            user_id: user.id,
            token,
        }))
    }

    pub fn policies(&self) -> &PolicyRegistry {
        self.manager.policies()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn services() -> AppServices {
        AppServices::in_memory(JwtSettings::with_secret("test-secret"))
    }

    fn admin_config(tenant_id: Option<TenantId>) -> BootstrapConfig {
        BootstrapConfig {
            tenant_id,
            admin_user_name: Some("admin".into()),
            admin_email: Some("admin@example.com".into()),
        }
    }

    #[tokio::test]
    async fn nothing_is_seeded_without_configuration() {
        let svc = services();
        assert!(svc.bootstrap(&BootstrapConfig::default()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn bootstrap_seeds_an_admin_with_a_usable_token() {
        let svc = services();
        let tenant_id = TenantId::new();
        let admin = svc.bootstrap(&admin_config(Some(tenant_id))).await.unwrap().unwrap();
        assert_eq!(admin.tenant_id, tenant_id);

        let claims = svc.tokens.validate(&admin.token).unwrap();
        assert_eq!(claims.sub, admin.user_id);
        assert_eq!(claims.tenant_id, tenant_id);
        assert!(claims.has_role(&Role::ADMIN));

        let view = svc.manager.manage_user_roles(tenant_id, admin.user_id).await.unwrap();
        let held: Vec<&str> = view
            .roles
            .iter()
            .filter(|r| r.has_role)
            .map(|r| r.name.as_str())
            .collect();
        assert_eq!(held, vec!["Admin"]);
    }

    #[tokio::test]
    async fn bootstrap_reuses_existing_admin_role_and_skips_existing_user() {
        let svc = services();
        let tenant_id = TenantId::new();
        svc.manager.create_role(tenant_id, "admin").await.unwrap();

        assert!(svc.bootstrap(&admin_config(Some(tenant_id))).await.unwrap().is_some());
        assert_eq!(svc.manager.get_role_list(tenant_id).await.unwrap().len(), 1);

        assert!(svc.bootstrap(&admin_config(Some(tenant_id))).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn bootstrap_without_tenant_uses_a_fresh_one() {
        let svc = services();
        let admin = svc.bootstrap(&admin_config(None)).await.unwrap().unwrap();
        let roles = svc.manager.get_role_list(admin.tenant_id).await.unwrap();
        assert_eq!(roles.len(), 1);
    }
}
