//! The CRUD surface shared by table-backed repositories.

use crate::db::errors::Result;

/// Create, read, list, update and delete for one table.
///
/// Implementors wrap a `&mut PgConnection`, so the same repository works on a pooled connection
/// or inside a transaction. Queries that don't fit this shape (stock locking, moderation queues,
/// search) live as inherent methods next to the impl.
#[async_trait::async_trait]
pub trait Repository {
    type CreateRequest;
    type UpdateRequest;
    type Response;
    type Id: Send + Sync;
    /// Filter and pagination for [`Repository::list`]
    type Filter: Send + Sync;

    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response>;

    /// `Ok(None)` when no row has this ID.
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>>;

    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>>;

    /// Returns whether a row was affected. Tables that keep history soft-delete here.
    async fn delete(&mut self, id: Self::Id) -> Result<bool>;

    /// Fails with [`DbError::NotFound`](crate::db::errors::DbError::NotFound) when the row is gone.
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response>;
}
