use crate::models::{
    Article, Category, CreateArticleRequest, CreateCategoryRequest, User,
};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

pub mod memory;
pub mod postgres;

pub use memory::MemoryRepository;
pub use postgres::PostgresRepository;

/// RepositoryError
///
/// The outcomes callers branch on: the row is absent, a unique column already
/// holds the value, or the backend failed. Keeping them apart lets the subject
/// lookup create on a miss without also creating on a broken connection, and
/// recover when a concurrent request created the same identity first.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("record not found")]
    NotFound,
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("{0}")]
    Unexpected(String),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => RepositoryError::NotFound,
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                RepositoryError::Conflict(db.to_string())
            }
            other => RepositoryError::Unexpected(other.to_string()),
        }
    }
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Repository Trait
///
/// The CRUD contract for the three resource families. Updates take the whole
/// record: handlers fetch, mutate and hand it back (read-modify-write, with
/// no isolation against concurrent writers).
///
/// **Send + Sync + async_trait** keep `Arc<dyn Repository>` usable across
/// Axum's task boundaries.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Users ---
    async fn list_users(&self) -> RepositoryResult<Vec<User>>;
    async fn get_user(&self, id: i64) -> RepositoryResult<User>;
    async fn get_user_by_access_token(&self, access_token: &str) -> RepositoryResult<User>;
    async fn get_user_by_google_sub(&self, google_sub: &str) -> RepositoryResult<User>;
    // The id of `user` is ignored; the store assigns one.
    async fn create_user(&self, user: User) -> RepositoryResult<User>;
    async fn update_user(&self, user: User) -> RepositoryResult<User>;

    // --- Categories ---
    async fn list_categories(&self) -> RepositoryResult<Vec<Category>>;
    async fn get_category(&self, id: i64) -> RepositoryResult<Category>;
    async fn create_category(&self, req: CreateCategoryRequest) -> RepositoryResult<Category>;
    async fn update_category(&self, category: Category) -> RepositoryResult<Category>;
    /// Does not touch articles that reference the category.
    async fn delete_category(&self, id: i64) -> RepositoryResult<()>;

    // --- Articles ---
    async fn list_articles(&self) -> RepositoryResult<Vec<Article>>;
    async fn get_article(&self, id: i64) -> RepositoryResult<Article>;
    async fn create_article(
        &self,
        req: CreateArticleRequest,
        user_id: i64,
    ) -> RepositoryResult<Article>;
    async fn update_article(&self, article: Article) -> RepositoryResult<Article>;
    async fn delete_article(&self, id: i64) -> RepositoryResult<()>;
}

/// RepositoryState
///
/// The shared handle to the persistence layer held in the application state.
pub type RepositoryState = Arc<dyn Repository>;
