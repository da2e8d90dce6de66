//! Database repository for users, their roles and caregiver profiles.

use crate::types::{UserId, abbrev_uuid};
use crate::{
    api::models::users::{CaregiverProfileUpdate, Role},
    db::{
        errors::Result,
        handlers::repository::Repository,
        models::users::{CaregiverListingDBResponse, CaregiverProfileDBResponse, UserCreateDBRequest, UserDBResponse, UserUpdateDBRequest},
    },
};
use sqlx::{Connection, PgConnection};
use tracing::instrument;
use uuid::Uuid;

/// Columns of [`UserDBResponse`], roles folded into an array.
const USER_SELECT: &str = r#"
    SELECT u.id, u.external_id, u.email, u.display_name, u.zip, u.bio, u.auth_source, u.is_suspended,
           u.created_at, u.updated_at,
           COALESCE((SELECT array_agg(r.role ORDER BY r.role) FROM user_roles r WHERE r.user_id = u.id), '{}') AS roles
    FROM users u
"#;

/// Filter for listing users
#[derive(Debug, Clone)]
pub struct UserFilter {
    pub skip: i64,
    pub limit: i64,
    /// Case-insensitive substring of email or display name
    pub search: Option<String>,
}

impl UserFilter {
    pub fn new(skip: i64, limit: i64) -> Self {
        Self { skip, limit, search: None }
    }

    pub fn with_search(mut self, search: Option<String>) -> Self {
        self.search = search.filter(|s| !s.trim().is_empty());
        self
    }
}

pub struct Users<'c> {
    db: &'c mut PgConnection,
}

#[async_trait::async_trait]
impl<'c> Repository for Users<'c> {
    type CreateRequest = UserCreateDBRequest;
    type UpdateRequest = UserUpdateDBRequest;
    type Response = UserDBResponse;
    type Id = UserId;
    type Filter = UserFilter;

    #[instrument(skip(self, request), fields(email = %request.email), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let user_id = Uuid::new_v4();
        let mut tx = self.db.begin().await?;

        sqlx::query(
            "INSERT INTO users (id, external_id, email, display_name, auth_source) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(user_id)
        .bind(&request.external_id)
        .bind(&request.email)
        .bind(&request.display_name)
        .bind(&request.auth_source)
        .execute(&mut *tx)
        .await?;

        let mut roles = request.roles.clone();
        roles.push(Role::Buyer);
        roles.sort();
        roles.dedup();
        sqlx::query("INSERT INTO user_roles (user_id, role) SELECT $1, UNNEST($2::user_role[])")
            .bind(user_id)
            .bind(&roles)
            .execute(&mut *tx)
            .await?;

        let user = sqlx::query_as::<_, UserDBResponse>(&format!("{USER_SELECT} WHERE u.id = $1"))
            .bind(user_id)
            .fetch_one(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(user)
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&id)), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let user = sqlx::query_as::<_, UserDBResponse>(&format!("{USER_SELECT} WHERE u.id = $1"))
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;
        Ok(user)
    }

    #[instrument(skip(self, filter), fields(limit = filter.limit, skip = filter.skip), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let pattern = filter.search.as_ref().map(|s| format!("%{}%", s.trim()));
        let users = sqlx::query_as::<_, UserDBResponse>(&format!(
            "{USER_SELECT}
             WHERE ($1::text IS NULL OR u.email ILIKE $1 OR u.display_name ILIKE $1)
             ORDER BY u.created_at DESC, u.id
             LIMIT $2 OFFSET $3"
        ))
        .bind(pattern)
        .bind(filter.limit)
        .bind(filter.skip)
        .fetch_all(&mut *self.db)
        .await?;
        Ok(users)
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&id)), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<bool> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1").bind(id).execute(&mut *self.db).await?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, request), fields(user_id = %abbrev_uuid(&id)), err)]
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response> {
        let updated = sqlx::query(
            r#"
            UPDATE users SET
                display_name = CASE WHEN $2 THEN $3 ELSE display_name END,
                zip = CASE WHEN $4 THEN $5 ELSE zip END,
                bio = CASE WHEN $6 THEN $7 ELSE bio END,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(request.display_name.is_some())
        .bind(request.display_name.clone().flatten())
        .bind(request.zip.is_some())
        .bind(request.zip.clone().flatten())
        .bind(request.bio.is_some())
        .bind(request.bio.clone().flatten())
        .execute(&mut *self.db)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(crate::db::errors::DbError::NotFound);
        }
        self.get_by_id(id).await?.ok_or(crate::db::errors::DbError::NotFound)
    }
}

impl<'c> Users<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self), err)]
    pub async fn get_by_external_id(&mut self, external_id: &str) -> Result<Option<UserDBResponse>> {
        let user = sqlx::query_as::<_, UserDBResponse>(&format!("{USER_SELECT} WHERE u.external_id = $1"))
            .bind(external_id)
            .fetch_optional(&mut *self.db)
            .await?;
        Ok(user)
    }

    #[instrument(skip(self, email), err)]
    pub async fn get_by_email(&mut self, email: &str) -> Result<Option<UserDBResponse>> {
        let user = sqlx::query_as::<_, UserDBResponse>(&format!("{USER_SELECT} WHERE lower(u.email) = lower($1)"))
            .bind(email)
            .fetch_optional(&mut *self.db)
            .await?;
        Ok(user)
    }

    /// Link an existing account to an identity-provider subject.
    #[instrument(skip(self, external_id), fields(user_id = %abbrev_uuid(&id)), err)]
    pub async fn set_external_id(&mut self, id: UserId, external_id: &str) -> Result<()> {
        sqlx::query("UPDATE users SET external_id = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(external_id)
            .execute(&mut *self.db)
            .await?;
        Ok(())
    }

    /// Grant roles; already-held roles are left alone.
    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&id)), err)]
    pub async fn add_roles(&mut self, id: UserId, roles: &[Role]) -> Result<()> {
        sqlx::query("INSERT INTO user_roles (user_id, role) SELECT $1, UNNEST($2::user_role[]) ON CONFLICT DO NOTHING")
            .bind(id)
            .bind(roles)
            .execute(&mut *self.db)
            .await?;
        Ok(())
    }

    /// Replace the role set. `Buyer` is kept regardless.
    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&id)), err)]
    pub async fn set_roles(&mut self, id: UserId, roles: &[Role]) -> Result<()> {
        let mut roles = roles.to_vec();
        roles.push(Role::Buyer);
        roles.sort();
        roles.dedup();

        let mut tx = self.db.begin().await?;
        sqlx::query("DELETE FROM user_roles WHERE user_id = $1").bind(id).execute(&mut *tx).await?;
        sqlx::query("INSERT INTO user_roles (user_id, role) SELECT $1, UNNEST($2::user_role[])")
            .bind(id)
            .bind(&roles)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&id)), err)]
    pub async fn set_suspended(&mut self, id: UserId, suspended: bool) -> Result<bool> {
        let result = sqlx::query("UPDATE users SET is_suspended = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(suspended)
            .execute(&mut *self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, filter), err)]
    pub async fn count(&mut self, filter: &UserFilter) -> Result<i64> {
        let pattern = filter.search.as_ref().map(|s| format!("%{}%", s.trim()));
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users u WHERE ($1::text IS NULL OR u.email ILIKE $1 OR u.display_name ILIKE $1)")
            .bind(pattern)
            .fetch_one(&mut *self.db)
            .await?;
        Ok(count)
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&id)), err)]
    pub async fn get_caregiver_profile(&mut self, id: UserId) -> Result<Option<CaregiverProfileDBResponse>> {
        let profile = sqlx::query_as::<_, CaregiverProfileDBResponse>(
            "SELECT user_id, bio, services, rate_per_day, zip, updated_at FROM caregiver_profiles WHERE user_id = $1",
        )
        .bind(id)
        .fetch_optional(&mut *self.db)
        .await?;
        Ok(profile)
    }

    /// Create or replace the caregiver profile and grant the caregiver role.
    #[instrument(skip(self, profile), fields(user_id = %abbrev_uuid(&id)), err)]
    pub async fn upsert_caregiver_profile(&mut self, id: UserId, profile: &CaregiverProfileUpdate) -> Result<CaregiverProfileDBResponse> {
        let mut tx = self.db.begin().await?;
        let saved = sqlx::query_as::<_, CaregiverProfileDBResponse>(
            r#"
            INSERT INTO caregiver_profiles (user_id, bio, services, rate_per_day, zip)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (user_id) DO UPDATE SET
                bio = EXCLUDED.bio,
                services = EXCLUDED.services,
                rate_per_day = EXCLUDED.rate_per_day,
                zip = EXCLUDED.zip,
                updated_at = NOW()
            RETURNING user_id, bio, services, rate_per_day, zip, updated_at
            "#,
        )
        .bind(id)
        .bind(&profile.bio)
        .bind(&profile.services)
        .bind(profile.rate_per_day)
        .bind(&profile.zip)
        .fetch_one(&mut *tx)
        .await?;

        Users::new(&mut tx).add_roles(id, &[Role::Caregiver]).await?;
        tx.commit().await?;
        Ok(saved)
    }

    /// Active caregivers with a profile, optionally offering `service`.
    #[instrument(skip(self), err)]
    pub async fn list_caregivers(&mut self, service: Option<&str>) -> Result<Vec<CaregiverListingDBResponse>> {
        let caregivers = sqlx::query_as::<_, CaregiverListingDBResponse>(
            r#"
            SELECT u.id AS user_id, u.display_name, p.bio, p.services, p.rate_per_day, p.zip, u.created_at
            FROM caregiver_profiles p
            JOIN users u ON u.id = p.user_id
            WHERE NOT u.is_suspended
              AND EXISTS (SELECT 1 FROM user_roles r WHERE r.user_id = u.id AND r.role = 'CAREGIVER')
              AND ($1::text IS NULL OR $1 = ANY(p.services))
            "#,
        )
        .bind(service.map(|s| s.trim().to_lowercase()))
        .fetch_all(&mut *self.db)
        .await?;
        Ok(caregivers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::create_test_user;
    use rust_decimal::Decimal;
    use sqlx::PgPool;

    fn request(email: &str) -> UserCreateDBRequest {
        UserCreateDBRequest {
            external_id: None,
            email: email.to_string(),
            display_name: Some("Test".to_string()),
            auth_source: "test".to_string(),
            roles: vec![Role::Producer],
        }
    }

    #[sqlx::test]
    #[ignore = "requires PostgreSQL (set DATABASE_URL)"]
    async fn test_create_always_grants_buyer(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Users::new(&mut conn);
        let user = repo.create(&request("farm@example.com")).await.unwrap();
        assert_eq!(user.roles, vec![Role::Buyer, Role::Producer]);

        let fetched = repo.get_by_email("FARM@example.com").await.unwrap().unwrap();
        assert_eq!(fetched.id, user.id);
    }

    #[sqlx::test]
    #[ignore = "requires PostgreSQL (set DATABASE_URL)"]
    async fn test_duplicate_email_is_unique_violation(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Users::new(&mut conn);
        repo.create(&request("dup@example.com")).await.unwrap();
        let err = repo.create(&request("dup@example.com")).await.unwrap_err();
        assert!(matches!(err, crate::db::errors::DbError::UniqueViolation { .. }));
    }

    #[sqlx::test]
    #[ignore = "requires PostgreSQL (set DATABASE_URL)"]
    async fn test_update_clears_and_sets(pool: PgPool) {
        let user = create_test_user(&pool, &[]).await;
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Users::new(&mut conn);

        let updated = repo
            .update(
                user.id,
                &UserUpdateDBRequest {
                    display_name: Some(None),
                    zip: Some(Some("05401".to_string())),
                    bio: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.display_name, None);
        assert_eq!(updated.zip.as_deref(), Some("05401"));
    }

    #[sqlx::test]
    #[ignore = "requires PostgreSQL (set DATABASE_URL)"]
    async fn test_caregiver_profile_grants_role_and_is_searchable(pool: PgPool) {
        let user = create_test_user(&pool, &[]).await;
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Users::new(&mut conn);

        repo.upsert_caregiver_profile(
            user.id,
            &CaregiverProfileUpdate {
                bio: "Chores while you travel".to_string(),
                services: vec!["feeding".to_string(), "milking".to_string()],
                rate_per_day: Decimal::new(4000, 2),
                zip: "05602".to_string(),
            },
        )
        .await
        .unwrap();

        let reloaded = repo.get_by_id(user.id).await.unwrap().unwrap();
        assert!(reloaded.roles.contains(&Role::Caregiver));

        assert_eq!(repo.list_caregivers(Some("Milking")).await.unwrap().len(), 1);
        assert!(repo.list_caregivers(Some("shearing")).await.unwrap().is_empty());

        repo.set_suspended(user.id, true).await.unwrap();
        assert!(repo.list_caregivers(None).await.unwrap().is_empty());
    }

    #[sqlx::test]
    #[ignore = "requires PostgreSQL (set DATABASE_URL)"]
    async fn test_set_roles_keeps_buyer(pool: PgPool) {
        let user = create_test_user(&pool, &[Role::Producer, Role::Admin]).await;
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Users::new(&mut conn);
        repo.set_roles(user.id, &[Role::Caregiver]).await.unwrap();
        let roles = repo.get_by_id(user.id).await.unwrap().unwrap().roles;
        assert_eq!(roles, vec![Role::Buyer, Role::Caregiver]);
    }
}
