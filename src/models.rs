use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use ts_rs::TS;
use utoipa::ToSchema;

// --- Roles ---

/// Role
///
/// The closed set of roles an identity can hold. Every permission in the
/// policy layer matches on this enum exhaustively; unknown strings are
/// rejected when a request body is deserialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub enum Role {
    Administrator,
    Writer,
    #[default]
    Reader,
}

impl Role {
    /// The canonical spelling, used on the wire and in the `users.role` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Administrator => "Administrator",
            Role::Writer => "Writer",
            Role::Reader => "Reader",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq)]
#[error("unknown role: {0}")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Administrator" => Ok(Role::Administrator),
            "Writer" => Ok(Role::Writer),
            "Reader" => Ok(Role::Reader),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

impl TryFrom<String> for Role {
    type Error = UnknownRole;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

// --- Core Application Schemas (Mapped to Database) ---

/// User
///
/// The canonical identity record stored in the `users` table. Carries the
/// article-platform profile and the nutrition-tracking fields side by side.
///
/// The Google subject and the access credential never leave the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct User {
    pub id: i64,
    #[serde(skip)]
    pub google_sub: String,
    #[serde(skip)]
    pub access_token: String,
    pub name: String,
    pub email: String,
    #[ts(type = "string | null")]
    pub birthdate: Option<DateTime<Utc>>,
    pub gender: String,
    pub profile_picture_url: String,
    pub description: String,
    pub short_description: String,
    // Stored as TEXT, parsed back into the enum on read.
    #[sqlx(try_from = "String")]
    pub role: Role,

    // Nutrition tracking
    pub user_profile_edited: bool,
    pub calories: i32,
    pub carbs: i32,
    pub fats: i32,
    pub proteins: i32,
    pub day: i32,
    pub recipes_added: Vec<String>,
}

/// Category
///
/// A grouping articles point at by id. Categories own nothing: deleting one
/// leaves referencing articles untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub image_url: String,
}

/// Article
///
/// Content record from the `articles` table. `user_id` is the owner and is
/// fixed to the creator at insert time.
///
/// Repositories hand articles back with `user` and `category` loaded from
/// their ids. `category` is `None` once the category has been deleted; the
/// dangling `category_id` is kept as stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Article {
    pub id: i64,
    pub user_id: i64,
    pub category_id: i64,
    pub title: String,
    pub body: String,
    pub image_url: String,
    pub tags: Vec<String>,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
    #[sqlx(skip)]
    #[serde(default)]
    pub user: Option<User>,
    #[sqlx(skip)]
    #[serde(default)]
    pub category: Option<Category>,
}

impl Article {
    /// Drops the loaded associations, leaving only the stored columns.
    pub fn without_associations(self) -> Self {
        Article {
            user: None,
            category: None,
            ..self
        }
    }
}

// --- Request Payloads (Input Schemas) ---

/// CreateCategoryRequest
///
/// Input payload for POST /categories.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct CreateCategoryRequest {
    pub name: String,
    #[serde(default)]
    pub image_url: String,
}

impl CreateCategoryRequest {
    pub fn validate(&self) -> Result<(), String> {
        require_non_blank("name", &self.name)
    }
}

/// UpdateCategoryRequest
///
/// Partial update payload for PUT /categories/{id}. Absent fields keep their
/// stored value.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct UpdateCategoryRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

impl UpdateCategoryRequest {
    pub fn validate(&self) -> Result<(), String> {
        match &self.name {
            Some(name) => require_non_blank("name", name),
            None => Ok(()),
        }
    }

    pub fn apply_to(self, category: &mut Category) {
        if let Some(name) = self.name {
            category.name = name;
        }
        if let Some(image_url) = self.image_url {
            category.image_url = image_url;
        }
    }
}

/// CreateArticleRequest
///
/// Input payload for POST /articles. The owner is taken from the resolved
/// identity, never from the body.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct CreateArticleRequest {
    pub category_id: i64,
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub image_url: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl CreateArticleRequest {
    pub fn validate(&self) -> Result<(), String> {
        require_non_blank("title", &self.title)?;
        require_entries("tags", &self.tags)
    }
}

/// UpdateArticleRequest
///
/// Partial update payload for PUT /articles/{id}.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct UpdateArticleRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

impl UpdateArticleRequest {
    pub fn validate(&self) -> Result<(), String> {
        if let Some(title) = &self.title {
            require_non_blank("title", title)?;
        }
        match &self.tags {
            Some(tags) => require_entries("tags", tags),
            None => Ok(()),
        }
    }

    pub fn apply_to(self, article: &mut Article) {
        if let Some(category_id) = self.category_id {
            article.category_id = category_id;
        }
        if let Some(title) = self.title {
            article.title = title;
        }
        if let Some(body) = self.body {
            article.body = body;
        }
        if let Some(image_url) = self.image_url {
            article.image_url = image_url;
        }
        if let Some(tags) = self.tags {
            article.tags = tags;
        }
    }
}

/// UpdateUserRequest
///
/// Partial update payload for PUT /users/{id}. Splits into the profile part
/// (only the identity itself may apply it) and the role (Administrators only).
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct UpdateUserRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[ts(type = "string | null")]
    pub birthdate: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_picture_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub short_description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_profile_edited: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calories: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub carbs: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fats: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proteins: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub day: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipes_added: Option<Vec<String>>,
}

impl UpdateUserRequest {
    /// Checks the profile and nutrition fields. `role` is already checked by
    /// deserialization.
    pub fn validate(&self) -> Result<(), String> {
        let quantities = [
            ("calories", self.calories),
            ("carbs", self.carbs),
            ("fats", self.fats),
            ("proteins", self.proteins),
            ("day", self.day),
        ];
        for (field, value) in quantities {
            if matches!(value, Some(v) if v < 0) {
                return Err(format!("{field} must not be negative"));
            }
        }
        match &self.recipes_added {
            Some(recipes) => require_entries("recipesAdded", recipes),
            None => Ok(()),
        }
    }

    /// Copies every submitted non-role field onto `user`.
    pub fn apply_profile(&self, user: &mut User) {
        if let Some(name) = &self.name {
            user.name = name.clone();
        }
        if let Some(email) = &self.email {
            user.email = email.clone();
        }
        if self.birthdate.is_some() {
            user.birthdate = self.birthdate;
        }
        if let Some(gender) = &self.gender {
            user.gender = gender.clone();
        }
        if let Some(url) = &self.profile_picture_url {
            user.profile_picture_url = url.clone();
        }
        if let Some(description) = &self.description {
            user.description = description.clone();
        }
        if let Some(short) = &self.short_description {
            user.short_description = short.clone();
        }
        if let Some(edited) = self.user_profile_edited {
            user.user_profile_edited = edited;
        }
        if let Some(calories) = self.calories {
            user.calories = calories;
        }
        if let Some(carbs) = self.carbs {
            user.carbs = carbs;
        }
        if let Some(fats) = self.fats {
            user.fats = fats;
        }
        if let Some(proteins) = self.proteins {
            user.proteins = proteins;
        }
        if let Some(day) = self.day {
            user.day = day;
        }
        if let Some(recipes) = &self.recipes_added {
            user.recipes_added = recipes.clone();
        }
    }
}

/// CredentialExchangeRequest
///
/// Input payload for POST /auth: trades a provider access token for the local
/// credential.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct CredentialExchangeRequest {
    pub provider_access_token: String,
}

// --- Output Schemas ---

/// TokenResponse
///
/// Returned at the end of the OAuth callback and by the credential exchange.
/// `access_token` is the value clients send in the credential header.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
}

impl TokenResponse {
    pub fn bearer(access_token: String) -> Self {
        Self {
            access_token,
            token_type: "Bearer".to_string(),
        }
    }
}

// --- Validation helpers ---

fn require_non_blank(field: &str, value: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{field} must not be blank"));
    }
    Ok(())
}

fn require_entries(field: &str, entries: &[String]) -> Result<(), String> {
    if entries.iter().any(|entry| entry.trim().is_empty()) {
        return Err(format!("{field} must not contain blank entries"));
    }
    Ok(())
}
