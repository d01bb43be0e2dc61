use super::{Repository, RepositoryError, RepositoryResult};
use crate::models::{Article, Category, CreateArticleRequest, CreateCategoryRequest, User};
use async_trait::async_trait;
use sqlx::PgPool;
use std::collections::HashMap;

const USER_COLUMNS: &str = r#"
    id, google_sub, access_token, name, email, birthdate, gender,
    profile_picture_url, description, short_description, role,
    user_profile_edited, calories, carbs, fats, proteins, day, recipes_added
"#;

const ARTICLE_COLUMNS: &str = r#"
    id, user_id, category_id, title, body, image_url, tags, created_at, updated_at
"#;

/// PostgresRepository
///
/// The `Repository` implementation backed by PostgreSQL. List-valued fields
/// map onto `TEXT[]` columns directly.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    /// Creates a new repository instance using the initialized connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn find_user_where(&self, column: &str, value: &str) -> RepositoryResult<User> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE {column} = $1");
        sqlx::query_as::<_, User>(&query)
            .bind(value)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| log_error("find_user", e))?
            .ok_or(RepositoryError::NotFound)
    }

    /// Loads owners and categories for a batch of articles with one query each.
    /// Ids without a row (a deleted category) leave the association `None`.
    async fn attach_associations(&self, articles: &mut [Article]) -> RepositoryResult<()> {
        if articles.is_empty() {
            return Ok(());
        }
        let user_ids: Vec<i64> = articles.iter().map(|a| a.user_id).collect();
        let category_ids: Vec<i64> = articles.iter().map(|a| a.category_id).collect();

        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ANY($1)");
        let users: HashMap<i64, User> = sqlx::query_as::<_, User>(&query)
            .bind(&user_ids)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| log_error("load_article_users", e))?
            .into_iter()
            .map(|user| (user.id, user))
            .collect();

        let categories: HashMap<i64, Category> = sqlx::query_as::<_, Category>(
            "SELECT id, name, image_url FROM categories WHERE id = ANY($1)",
        )
        .bind(&category_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| log_error("load_article_categories", e))?
        .into_iter()
        .map(|category| (category.id, category))
        .collect();

        for article in articles.iter_mut() {
            article.user = users.get(&article.user_id).cloned();
            article.category = categories.get(&article.category_id).cloned();
        }
        Ok(())
    }

    async fn with_associations(&self, article: Article) -> RepositoryResult<Article> {
        let mut batch = [article];
        self.attach_associations(&mut batch).await?;
        let [article] = batch;
        Ok(article)
    }
}

fn log_error(operation: &str, err: sqlx::Error) -> RepositoryError {
    tracing::error!("{} error: {:?}", operation, err);
    err.into()
}

#[async_trait]
impl Repository for PostgresRepository {
    // --- USERS ---

    async fn list_users(&self) -> RepositoryResult<Vec<User>> {
        let query = format!("SELECT {USER_COLUMNS} FROM users ORDER BY id");
        sqlx::query_as::<_, User>(&query)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| log_error("list_users", e))
    }

    async fn get_user(&self, id: i64) -> RepositoryResult<User> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        sqlx::query_as::<_, User>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| log_error("get_user", e))?
            .ok_or(RepositoryError::NotFound)
    }

    async fn get_user_by_access_token(&self, access_token: &str) -> RepositoryResult<User> {
        self.find_user_where("access_token", access_token).await
    }

    async fn get_user_by_google_sub(&self, google_sub: &str) -> RepositoryResult<User> {
        self.find_user_where("google_sub", google_sub).await
    }

    async fn create_user(&self, user: User) -> RepositoryResult<User> {
        let query = format!(
            r#"
            INSERT INTO users (
                google_sub, access_token, name, email, birthdate, gender,
                profile_picture_url, description, short_description, role,
                user_profile_edited, calories, carbs, fats, proteins, day, recipes_added
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            RETURNING {USER_COLUMNS}
            "#
        );
        sqlx::query_as::<_, User>(&query)
            .bind(&user.google_sub)
            .bind(&user.access_token)
            .bind(&user.name)
            .bind(&user.email)
            .bind(user.birthdate)
            .bind(&user.gender)
            .bind(&user.profile_picture_url)
            .bind(&user.description)
            .bind(&user.short_description)
            .bind(user.role.as_str())
            .bind(user.user_profile_edited)
            .bind(user.calories)
            .bind(user.carbs)
            .bind(user.fats)
            .bind(user.proteins)
            .bind(user.day)
            .bind(&user.recipes_added)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| log_error("create_user", e))
    }

    /// update_user
    ///
    /// Full-row save of a previously fetched record. The subject and the
    /// credential are immutable and are not part of the SET list.
    async fn update_user(&self, user: User) -> RepositoryResult<User> {
        let query = format!(
            r#"
            UPDATE users
            SET name = $2, email = $3, birthdate = $4, gender = $5,
                profile_picture_url = $6, description = $7, short_description = $8,
                role = $9, user_profile_edited = $10, calories = $11, carbs = $12,
                fats = $13, proteins = $14, day = $15, recipes_added = $16
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        );
        sqlx::query_as::<_, User>(&query)
            .bind(user.id)
            .bind(&user.name)
            .bind(&user.email)
            .bind(user.birthdate)
            .bind(&user.gender)
            .bind(&user.profile_picture_url)
            .bind(&user.description)
            .bind(&user.short_description)
            .bind(user.role.as_str())
            .bind(user.user_profile_edited)
            .bind(user.calories)
            .bind(user.carbs)
            .bind(user.fats)
            .bind(user.proteins)
            .bind(user.day)
            .bind(&user.recipes_added)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| log_error("update_user", e))?
            .ok_or(RepositoryError::NotFound)
    }

    // --- CATEGORIES ---

    async fn list_categories(&self) -> RepositoryResult<Vec<Category>> {
        sqlx::query_as::<_, Category>("SELECT id, name, image_url FROM categories ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| log_error("list_categories", e))
    }

    async fn get_category(&self, id: i64) -> RepositoryResult<Category> {
        sqlx::query_as::<_, Category>("SELECT id, name, image_url FROM categories WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| log_error("get_category", e))?
            .ok_or(RepositoryError::NotFound)
    }

    async fn create_category(&self, req: CreateCategoryRequest) -> RepositoryResult<Category> {
        sqlx::query_as::<_, Category>(
            "INSERT INTO categories (name, image_url) VALUES ($1, $2) RETURNING id, name, image_url",
        )
        .bind(&req.name)
        .bind(&req.image_url)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| log_error("create_category", e))
    }

    async fn update_category(&self, category: Category) -> RepositoryResult<Category> {
        sqlx::query_as::<_, Category>(
            "UPDATE categories SET name = $2, image_url = $3 WHERE id = $1 RETURNING id, name, image_url",
        )
        .bind(category.id)
        .bind(&category.name)
        .bind(&category.image_url)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| log_error("update_category", e))?
        .ok_or(RepositoryError::NotFound)
    }

    /// delete_category
    ///
    /// `articles.category_id` carries no foreign key, so referencing articles
    /// survive with a dangling id.
    async fn delete_category(&self, id: i64) -> RepositoryResult<()> {
        let result = sqlx::query("DELETE FROM categories WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| log_error("delete_category", e))?;
        match result.rows_affected() {
            0 => Err(RepositoryError::NotFound),
            _ => Ok(()),
        }
    }

    // --- ARTICLES ---

    async fn list_articles(&self) -> RepositoryResult<Vec<Article>> {
        let query = format!("SELECT {ARTICLE_COLUMNS} FROM articles ORDER BY id");
        let mut articles = sqlx::query_as::<_, Article>(&query)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| log_error("list_articles", e))?;
        self.attach_associations(&mut articles).await?;
        Ok(articles)
    }

    async fn get_article(&self, id: i64) -> RepositoryResult<Article> {
        let query = format!("SELECT {ARTICLE_COLUMNS} FROM articles WHERE id = $1");
        let article = sqlx::query_as::<_, Article>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| log_error("get_article", e))?
            .ok_or(RepositoryError::NotFound)?;
        self.with_associations(article).await
    }

    async fn create_article(
        &self,
        req: CreateArticleRequest,
        user_id: i64,
    ) -> RepositoryResult<Article> {
        let query = format!(
            r#"
            INSERT INTO articles (user_id, category_id, title, body, image_url, tags, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, NOW(), NOW())
            RETURNING {ARTICLE_COLUMNS}
            "#
        );
        let article = sqlx::query_as::<_, Article>(&query)
            .bind(user_id)
            .bind(req.category_id)
            .bind(&req.title)
            .bind(&req.body)
            .bind(&req.image_url)
            .bind(&req.tags)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| log_error("create_article", e))?;
        self.with_associations(article).await
    }

    async fn update_article(&self, article: Article) -> RepositoryResult<Article> {
        let query = format!(
            r#"
            UPDATE articles
            SET category_id = $2, title = $3, body = $4, image_url = $5, tags = $6,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {ARTICLE_COLUMNS}
            "#
        );
        let updated = sqlx::query_as::<_, Article>(&query)
            .bind(article.id)
            .bind(article.category_id)
            .bind(&article.title)
            .bind(&article.body)
            .bind(&article.image_url)
            .bind(&article.tags)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| log_error("update_article", e))?
            .ok_or(RepositoryError::NotFound)?;
        self.with_associations(updated).await
    }

    async fn delete_article(&self, id: i64) -> RepositoryResult<()> {
        let result = sqlx::query("DELETE FROM articles WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| log_error("delete_article", e))?;
        match result.rows_affected() {
            0 => Err(RepositoryError::NotFound),
            _ => Ok(()),
        }
    }
}
