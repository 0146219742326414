//! Postgres-backed identity store.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError | Scenario |
//! |------------|----------------------|------------|----------|
//! | Database (unique violation) | `23505` | `Conflict` | Duplicate role name, user name or email |
//! | Database (foreign key violation) | `23503` | `Conflict` | Deleting a role that is still assigned |
//! | Database (other) | Any other | `Backend` | Other database errors |
//! | PoolClosed / Other | N/A | `Backend` | Network errors, connection failures, etc. |
//!
//! Role and claim replacement run in one transaction that locks the user row
//! first, so concurrent replacements for the same user serialize.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Postgres, Row, Transaction};
use tracing::instrument;
use uuid::Uuid;

use bizhub_auth::UserClaim;
use bizhub_core::{RoleId, TenantId, UserId};

use super::r#trait::{IdentityStore, RoleRecord, SetDiff, StoreError, UserRecord, normalize};

const SCHEMA: &str = include_str!("../../migrations/0001_identity.sql");

#[derive(Debug, Clone)]
pub struct PostgresIdentityStore {
    pool: Arc<PgPool>,
}

impl PostgresIdentityStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Apply the identity schema. Idempotent.
    #[instrument(skip(self), err)]
    pub async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(self.pool.as_ref())
            .await
            .map_err(|e| map_sqlx_error("run_migrations", e))?;
        Ok(())
    }

    async fn begin(&self) -> Result<Transaction<'_, Postgres>, StoreError> {
        self.pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))
    }
}

/// Lock the user row for the rest of the transaction. `false` if the user
/// does not exist in the tenant.
async fn lock_user(
    tx: &mut Transaction<'_, Postgres>,
    tenant_id: TenantId,
    user_id: UserId,
) -> Result<bool, StoreError> {
    let row = sqlx::query("SELECT id FROM users WHERE tenant_id = $1 AND id = $2 FOR UPDATE")
        .bind(tenant_id.as_uuid())
        .bind(user_id.as_uuid())
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("lock_user", e))?;
    Ok(row.is_some())
}

async fn rollback(tx: Transaction<'_, Postgres>) -> Result<(), StoreError> {
    tx.rollback()
        .await
        .map_err(|e| map_sqlx_error("rollback", e))
}

#[async_trait::async_trait]
impl IdentityStore for PostgresIdentityStore {
    #[instrument(skip(self), fields(tenant_id = %tenant_id, role_id = %role_id), err)]
    async fn get_role(&self, tenant_id: TenantId, role_id: RoleId) -> Result<Option<RoleRecord>, StoreError> {
        let row = sqlx::query(
            "SELECT id, name, normalized_name FROM roles WHERE tenant_id = $1 AND id = $2",
        )
        .bind(tenant_id.as_uuid())
        .bind(role_id.as_uuid())
        .fetch_optional(self.pool.as_ref())
        .await
        .map_err(|e| map_sqlx_error("get_role", e))?;

        row.map(|r| RoleRow::from_row(&r).map(Into::into))
            .transpose()
            .map_err(|e| map_sqlx_error("get_role", e))
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id), err)]
    async fn list_roles(&self, tenant_id: TenantId) -> Result<Vec<RoleRecord>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, normalized_name
            FROM roles
            WHERE tenant_id = $1
            ORDER BY normalized_name ASC
            "#,
        )
        .bind(tenant_id.as_uuid())
        .fetch_all(self.pool.as_ref())
        .await
        .map_err(|e| map_sqlx_error("list_roles", e))?;

        rows.iter()
            .map(|r| RoleRow::from_row(r).map(Into::into))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| map_sqlx_error("list_roles", e))
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id), err)]
    async fn create_role(&self, tenant_id: TenantId, name: &str) -> Result<RoleRecord, StoreError> {
        let role = RoleRecord {
            id: RoleId::new(),
            name: name.trim().to_string(),
            normalized_name: normalize(name),
        };

        sqlx::query("INSERT INTO roles (id, tenant_id, name, normalized_name) VALUES ($1, $2, $3, $4)")
            .bind(role.id.as_uuid())
            .bind(tenant_id.as_uuid())
            .bind(&role.name)
            .bind(&role.normalized_name)
            .execute(self.pool.as_ref())
            .await
            .map_err(|e| map_sqlx_error("create_role", e))?;

        Ok(role)
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, role_id = %role_id), err)]
    async fn rename_role(
        &self,
        tenant_id: TenantId,
        role_id: RoleId,
        name: &str,
    ) -> Result<RoleRecord, StoreError> {
        let row = sqlx::query(
            r#"
            UPDATE roles
            SET name = $3, normalized_name = $4
            WHERE tenant_id = $1 AND id = $2
            RETURNING id, name, normalized_name
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(role_id.as_uuid())
        .bind(name.trim())
        .bind(normalize(name))
        .fetch_optional(self.pool.as_ref())
        .await
        .map_err(|e| map_sqlx_error("rename_role", e))?
        .ok_or_else(|| StoreError::NotFound("role".to_string()))?;

        RoleRow::from_row(&row)
            .map(Into::into)
            .map_err(|e| map_sqlx_error("rename_role", e))
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, role_id = %role_id), err)]
    async fn delete_role(&self, tenant_id: TenantId, role_id: RoleId) -> Result<(), StoreError> {
        // user_roles.role_id is ON DELETE RESTRICT, so an assigned role maps to Conflict.
        let result = sqlx::query("DELETE FROM roles WHERE tenant_id = $1 AND id = $2")
            .bind(tenant_id.as_uuid())
            .bind(role_id.as_uuid())
            .execute(self.pool.as_ref())
            .await
            .map_err(|e| map_sqlx_error("delete_role", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("role".to_string()));
        }
        Ok(())
    }

    #[instrument(skip(self, email), fields(tenant_id = %tenant_id), err)]
    async fn create_user(
        &self,
        tenant_id: TenantId,
        user_name: &str,
        email: &str,
    ) -> Result<UserRecord, StoreError> {
        let row = sqlx::query(
            r#"
            INSERT INTO users (id, tenant_id, user_name, normalized_user_name, email, normalized_email)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, tenant_id, user_name, email, created_at
            "#,
        )
        .bind(*UserId::new().as_uuid())
        .bind(tenant_id.as_uuid())
        .bind(user_name.trim())
        .bind(normalize(user_name))
        .bind(email.trim())
        .bind(normalize(email))
        .fetch_one(self.pool.as_ref())
        .await
        .map_err(|e| map_sqlx_error("create_user", e))?;

        UserRow::from_row(&row)
            .map(Into::into)
            .map_err(|e| map_sqlx_error("create_user", e))
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, user_id = %user_id), err)]
    async fn get_user(&self, tenant_id: TenantId, user_id: UserId) -> Result<Option<UserRecord>, StoreError> {
        let row = sqlx::query(
            "SELECT id, tenant_id, user_name, email, created_at FROM users WHERE tenant_id = $1 AND id = $2",
        )
        .bind(tenant_id.as_uuid())
        .bind(user_id.as_uuid())
        .fetch_optional(self.pool.as_ref())
        .await
        .map_err(|e| map_sqlx_error("get_user", e))?;

        row.map(|r| UserRow::from_row(&r).map(Into::into))
            .transpose()
            .map_err(|e| map_sqlx_error("get_user", e))
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, user_id = %user_id), err)]
    async fn user_role_ids(&self, tenant_id: TenantId, user_id: UserId) -> Result<BTreeSet<RoleId>, StoreError> {
        if self.get_user(tenant_id, user_id).await?.is_none() {
            return Err(StoreError::NotFound("user".to_string()));
        }

        let rows = sqlx::query(
            r#"
            SELECT ur.role_id
            FROM user_roles ur
            JOIN users u ON u.id = ur.user_id
            WHERE u.tenant_id = $1 AND ur.user_id = $2
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(user_id.as_uuid())
        .fetch_all(self.pool.as_ref())
        .await
        .map_err(|e| map_sqlx_error("user_role_ids", e))?;

        rows.iter()
            .map(|r| r.try_get::<Uuid, _>("role_id").map(RoleId::from_uuid))
            .collect::<Result<_, _>>()
            .map_err(|e| map_sqlx_error("user_role_ids", e))
    }

    #[instrument(skip(self, role_ids), fields(tenant_id = %tenant_id, user_id = %user_id, requested = role_ids.len()), err)]
    async fn replace_user_roles(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
        role_ids: &BTreeSet<RoleId>,
    ) -> Result<SetDiff<RoleId>, StoreError> {
        let mut tx = self.begin().await?;

        if !lock_user(&mut tx, tenant_id, user_id).await? {
            rollback(tx).await?;
            return Err(StoreError::NotFound("user".to_string()));
        }

        let requested: Vec<Uuid> = role_ids.iter().map(|id| *id.as_uuid()).collect();
        let known = sqlx::query("SELECT COUNT(*) AS n FROM roles WHERE tenant_id = $1 AND id = ANY($2)")
            .bind(tenant_id.as_uuid())
            .bind(&requested)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("replace_user_roles", e))?
            .try_get::<i64, _>("n")
            .map_err(|e| map_sqlx_error("replace_user_roles", e))?;
        if known != requested.len() as i64 {
            rollback(tx).await?;
            return Err(StoreError::NotFound("role".to_string()));
        }

        let current: BTreeSet<RoleId> = sqlx::query("SELECT role_id FROM user_roles WHERE user_id = $1")
            .bind(user_id.as_uuid())
            .fetch_all(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("replace_user_roles", e))?
            .iter()
            .map(|r| r.try_get::<Uuid, _>("role_id").map(RoleId::from_uuid))
            .collect::<Result<_, _>>()
            .map_err(|e| map_sqlx_error("replace_user_roles", e))?;

        let diff = SetDiff::between(&current, role_ids);
        let to_add: Vec<Uuid> = diff.to_add.iter().map(|id| *id.as_uuid()).collect();
        let to_remove: Vec<Uuid> = diff.to_remove.iter().map(|id| *id.as_uuid()).collect();

        sqlx::query("INSERT INTO user_roles (user_id, role_id) SELECT $1, UNNEST($2::uuid[])")
            .bind(user_id.as_uuid())
            .bind(&to_add)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("replace_user_roles", e))?;

        sqlx::query("DELETE FROM user_roles WHERE user_id = $1 AND role_id = ANY($2)")
            .bind(user_id.as_uuid())
            .bind(&to_remove)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("replace_user_roles", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit", e))?;

        Ok(diff)
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, user_id = %user_id), err)]
    async fn user_claims(&self, tenant_id: TenantId, user_id: UserId) -> Result<BTreeSet<UserClaim>, StoreError> {
        if self.get_user(tenant_id, user_id).await?.is_none() {
            return Err(StoreError::NotFound("user".to_string()));
        }

        let rows = sqlx::query("SELECT claim_key, claim_value FROM user_claims WHERE user_id = $1")
            .bind(user_id.as_uuid())
            .fetch_all(self.pool.as_ref())
            .await
            .map_err(|e| map_sqlx_error("user_claims", e))?;

        rows.iter()
            .map(claim_from_row)
            .collect::<Result<_, _>>()
            .map_err(|e| map_sqlx_error("user_claims", e))
    }

    #[instrument(skip(self, claims), fields(tenant_id = %tenant_id, user_id = %user_id, requested = claims.len()), err)]
    async fn replace_user_claims(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
        claims: &BTreeSet<UserClaim>,
    ) -> Result<SetDiff<UserClaim>, StoreError> {
        let mut tx = self.begin().await?;

        if !lock_user(&mut tx, tenant_id, user_id).await? {
            rollback(tx).await?;
            return Err(StoreError::NotFound("user".to_string()));
        }

        let current: BTreeSet<UserClaim> =
            sqlx::query("SELECT claim_key, claim_value FROM user_claims WHERE user_id = $1")
                .bind(user_id.as_uuid())
                .fetch_all(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("replace_user_claims", e))?
                .iter()
                .map(claim_from_row)
                .collect::<Result<_, _>>()
                .map_err(|e| map_sqlx_error("replace_user_claims", e))?;

        let diff = SetDiff::between(&current, claims);
        let (add_keys, add_values): (Vec<&str>, Vec<&str>) = diff
            .to_add
            .iter()
            .map(|c| (c.key.as_str(), c.value.as_str()))
            .unzip();
        let (remove_keys, remove_values): (Vec<&str>, Vec<&str>) = diff
            .to_remove
            .iter()
            .map(|c| (c.key.as_str(), c.value.as_str()))
            .unzip();

        sqlx::query(
            r#"
            INSERT INTO user_claims (user_id, claim_key, claim_value)
            SELECT $1, k, v FROM UNNEST($2::text[], $3::text[]) AS t(k, v)
            "#,
        )
        .bind(user_id.as_uuid())
        .bind(&add_keys)
        .bind(&add_values)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("replace_user_claims", e))?;

        sqlx::query(
            r#"
            DELETE FROM user_claims uc
            USING UNNEST($2::text[], $3::text[]) AS t(k, v)
            WHERE uc.user_id = $1 AND uc.claim_key = t.k AND uc.claim_value = t.v
            "#,
        )
        .bind(user_id.as_uuid())
        .bind(&remove_keys)
        .bind(&remove_values)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("replace_user_claims", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit", e))?;

        Ok(diff)
    }
}

fn claim_from_row(row: &sqlx::postgres::PgRow) -> Result<UserClaim, sqlx::Error> {
    Ok(UserClaim::new(
        row.try_get::<String, _>("claim_key")?,
        row.try_get::<String, _>("claim_value")?,
    ))
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => StoreError::Conflict(match db_err.constraint() {
                    Some("roles_tenant_name_unique") => "role name is already taken".to_string(),
                    Some("users_tenant_user_name_unique") => "user name is already taken".to_string(),
                    Some("users_tenant_email_unique") => "email is already registered".to_string(),
                    _ => msg,
                }),
                Some("23503") => StoreError::Conflict("role is still assigned to one or more users".to_string()),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Backend(format!("connection pool closed in {}", operation))
        }
        other => StoreError::Backend(format!("error in {}: {}", operation, other)),
    }
}

struct RoleRow {
    id: Uuid,
    name: String,
    normalized_name: String,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for RoleRow {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(RoleRow {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            normalized_name: row.try_get("normalized_name")?,
        })
    }
}

impl From<RoleRow> for RoleRecord {
    fn from(row: RoleRow) -> Self {
        RoleRecord {
            id: RoleId::from_uuid(row.id),
            name: row.name,
            normalized_name: row.normalized_name,
        }
    }
}

struct UserRow {
    id: Uuid,
    tenant_id: Uuid,
    user_name: String,
    email: String,
    created_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for UserRow {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(UserRow {
            id: row.try_get("id")?,
            tenant_id: row.try_get("tenant_id")?,
            user_name: row.try_get("user_name")?,
            email: row.try_get("email")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl From<UserRow> for UserRecord {
    fn from(row: UserRow) -> Self {
        UserRecord {
            id: UserId::from_uuid(row.id),
            tenant_id: TenantId::from_uuid(row.tenant_id),
            user_name: row.user_name,
            email: row.email,
            created_at: row.created_at,
        }
    }
}

/// Runs against a real database only when `DATABASE_URL` is set.
#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> Option<PostgresIdentityStore> {
        let url = std::env::var("DATABASE_URL").ok()?;
        let pool = PgPool::connect(&url).await.expect("connect to DATABASE_URL");
        let store = PostgresIdentityStore::new(pool);
        store.run_migrations().await.expect("apply identity schema");
        Some(store)
    }

    #[tokio::test]
    async fn role_lifecycle_against_postgres() {
        let Some(store) = store().await else {
            eprintln!("DATABASE_URL not set; skipping");
            return;
        };
        let tenant = TenantId::new();
        let user = store.create_user(tenant, "pg-user", "pg@example.com").await.unwrap();
        let manager = store.create_role(tenant, "Manager").await.unwrap();

        assert!(matches!(
            store.create_role(tenant, "MANAGER").await,
            Err(StoreError::Conflict(_))
        ));

        store.replace_user_roles(tenant, user.id, &[manager.id].into()).await.unwrap();
        assert!(matches!(
            store.delete_role(tenant, manager.id).await,
            Err(StoreError::Conflict(_))
        ));

        store.replace_user_roles(tenant, user.id, &BTreeSet::new()).await.unwrap();
        store.delete_role(tenant, manager.id).await.unwrap();
        assert_eq!(store.get_role(tenant, manager.id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn claim_replacement_against_postgres() {
        let Some(store) = store().await else {
            eprintln!("DATABASE_URL not set; skipping");
            return;
        };
        let tenant = TenantId::new();
        let user = store.create_user(tenant, "pg-claims", "claims@example.com").await.unwrap();

        let first: BTreeSet<UserClaim> = [
            UserClaim::new("Get Customer", "True"),
            UserClaim::new("Edit Customer", "True"),
        ]
        .into();
        store.replace_user_claims(tenant, user.id, &first).await.unwrap();

        let second: BTreeSet<UserClaim> = [UserClaim::new("Get Customer", "True")].into();
        let diff = store.replace_user_claims(tenant, user.id, &second).await.unwrap();
        assert!(diff.to_add.is_empty());
        assert_eq!(diff.to_remove, vec![UserClaim::new("Edit Customer", "True")]);
        assert_eq!(store.user_claims(tenant, user.id).await.unwrap(), second);
    }
}
