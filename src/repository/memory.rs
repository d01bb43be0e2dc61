//! In-memory implementation of the repository.
//!
//! Backs local runs without a `DATABASE_URL` and the handler tests. State
//! lives in `BTreeMap`s behind a single `tokio::sync::RwLock`, so listings
//! come back in id order like the Postgres `ORDER BY id`. Nothing survives a
//! restart.
//!
//! A repository built with [`MemoryRepository::failing`] answers every call
//! with `RepositoryError::Unexpected`, which is how the storage-failure paths
//! of the handlers get exercised.

use super::{Repository, RepositoryError, RepositoryResult};
use crate::models::{Article, Category, CreateArticleRequest, CreateCategoryRequest, User};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

#[derive(Default)]
struct Tables {
    next_user_id: i64,
    next_category_id: i64,
    next_article_id: i64,
    users: BTreeMap<i64, User>,
    categories: BTreeMap<i64, Category>,
    articles: BTreeMap<i64, Article>,
}

impl Tables {
    fn next_id(counter: &mut i64) -> i64 {
        *counter += 1;
        *counter
    }

    /// Loads the owner and category the way the Postgres lookups do.
    fn with_associations(&self, article: Article) -> Article {
        Article {
            user: self.users.get(&article.user_id).cloned(),
            category: self.categories.get(&article.category_id).cloned(),
            ..article
        }
    }
}

#[derive(Default)]
pub struct MemoryRepository {
    tables: RwLock<Tables>,
    should_fail: bool,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            tables: RwLock::default(),
            should_fail: true,
        }
    }

    fn check(&self) -> RepositoryResult<()> {
        if self.should_fail {
            return Err(RepositoryError::Unexpected(
                "simulated storage failure".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn list_users(&self) -> RepositoryResult<Vec<User>> {
        self.check()?;
        Ok(self.tables.read().await.users.values().cloned().collect())
    }

    async fn get_user(&self, id: i64) -> RepositoryResult<User> {
        self.check()?;
        self.tables
            .read()
            .await
            .users
            .get(&id)
            .cloned()
            .ok_or(RepositoryError::NotFound)
    }

    async fn get_user_by_access_token(&self, access_token: &str) -> RepositoryResult<User> {
        self.check()?;
        self.tables
            .read()
            .await
            .users
            .values()
            .find(|u| u.access_token == access_token)
            .cloned()
            .ok_or(RepositoryError::NotFound)
    }

    async fn get_user_by_google_sub(&self, google_sub: &str) -> RepositoryResult<User> {
        self.check()?;
        self.tables
            .read()
            .await
            .users
            .values()
            .find(|u| u.google_sub == google_sub)
            .cloned()
            .ok_or(RepositoryError::NotFound)
    }

    async fn create_user(&self, mut user: User) -> RepositoryResult<User> {
        self.check()?;
        let mut tables = self.tables.write().await;
        // Mirrors the UNIQUE constraints of the users table.
        let duplicate = tables
            .users
            .values()
            .any(|u| u.google_sub == user.google_sub || u.access_token == user.access_token);
        if duplicate {
            return Err(RepositoryError::Conflict(
                "duplicate subject or access token".to_string(),
            ));
        }
        user.id = Tables::next_id(&mut tables.next_user_id);
        tables.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn update_user(&self, user: User) -> RepositoryResult<User> {
        self.check()?;
        let mut tables = self.tables.write().await;
        let stored = tables
            .users
            .get_mut(&user.id)
            .ok_or(RepositoryError::NotFound)?;
        let (google_sub, access_token) = (stored.google_sub.clone(), stored.access_token.clone());
        *stored = User {
            google_sub,
            access_token,
            ..user
        };
        Ok(stored.clone())
    }

    async fn list_categories(&self) -> RepositoryResult<Vec<Category>> {
        self.check()?;
        Ok(self.tables.read().await.categories.values().cloned().collect())
    }

    async fn get_category(&self, id: i64) -> RepositoryResult<Category> {
        self.check()?;
        self.tables
            .read()
            .await
            .categories
            .get(&id)
            .cloned()
            .ok_or(RepositoryError::NotFound)
    }

    async fn create_category(&self, req: CreateCategoryRequest) -> RepositoryResult<Category> {
        self.check()?;
        let mut tables = self.tables.write().await;
        let category = Category {
            id: Tables::next_id(&mut tables.next_category_id),
            name: req.name,
            image_url: req.image_url,
        };
        tables.categories.insert(category.id, category.clone());
        Ok(category)
    }

    async fn update_category(&self, category: Category) -> RepositoryResult<Category> {
        self.check()?;
        let mut tables = self.tables.write().await;
        let stored = tables
            .categories
            .get_mut(&category.id)
            .ok_or(RepositoryError::NotFound)?;
        *stored = category;
        Ok(stored.clone())
    }

    async fn delete_category(&self, id: i64) -> RepositoryResult<()> {
        self.check()?;
        self.tables
            .write()
            .await
            .categories
            .remove(&id)
            .map(|_| ())
            .ok_or(RepositoryError::NotFound)
    }

    async fn list_articles(&self) -> RepositoryResult<Vec<Article>> {
        self.check()?;
        let tables = self.tables.read().await;
        Ok(tables
            .articles
            .values()
            .map(|article| tables.with_associations(article.clone()))
            .collect())
    }

    async fn get_article(&self, id: i64) -> RepositoryResult<Article> {
        self.check()?;
        let tables = self.tables.read().await;
        let article = tables
            .articles
            .get(&id)
            .cloned()
            .ok_or(RepositoryError::NotFound)?;
        Ok(tables.with_associations(article))
    }

    async fn create_article(
        &self,
        req: CreateArticleRequest,
        user_id: i64,
    ) -> RepositoryResult<Article> {
        self.check()?;
        let mut tables = self.tables.write().await;
        let now = Utc::now();
        let article = Article {
            id: Tables::next_id(&mut tables.next_article_id),
            user_id,
            category_id: req.category_id,
            title: req.title,
            body: req.body,
            image_url: req.image_url,
            tags: req.tags,
            created_at: now,
            updated_at: now,
            user: None,
            category: None,
        };
        tables.articles.insert(article.id, article.clone());
        Ok(tables.with_associations(article))
    }

    async fn update_article(&self, article: Article) -> RepositoryResult<Article> {
        self.check()?;
        let mut tables = self.tables.write().await;
        let stored = tables
            .articles
            .get_mut(&article.id)
            .ok_or(RepositoryError::NotFound)?;
        // Owner and creation time are fixed at insert.
        let updated = Article {
            user_id: stored.user_id,
            created_at: stored.created_at,
            updated_at: Utc::now(),
            ..article.without_associations()
        };
        *stored = updated.clone();
        Ok(tables.with_associations(updated))
    }

    async fn delete_article(&self, id: i64) -> RepositoryResult<()> {
        self.check()?;
        self.tables
            .write()
            .await
            .articles
            .remove(&id)
            .map(|_| ())
            .ok_or(RepositoryError::NotFound)
    }
}
