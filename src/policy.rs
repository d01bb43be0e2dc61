//! Authorization policy.
//!
//! A pure decision over who is acting, what they want to do and, for
//! ownership-gated actions, who owns the target. Handlers consult it before
//! touching storage and turn a `Deny` into a 403 with the attached reason.

use crate::models::Role;

/// Actor
///
/// The resolved identity as the policy sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub id: i64,
    pub role: Role,
}

/// Action
///
/// Every gated operation. Ownership-sensitive variants carry the id of the
/// identity that owns (or is) the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    CreateCategory,
    UpdateCategory,
    DeleteCategory,
    CreateArticle,
    UpdateArticle { owner: i64 },
    DeleteArticle { owner: i64 },
    UpdateProfile { target: i64 },
    UpdateRole { target: i64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(String),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }

    fn deny(reason: &str) -> Self {
        Decision::Deny(reason.to_string())
    }
}

/// authorize
///
/// `None` stands for an unauthenticated caller and is denied everything.
pub fn authorize(actor: Option<&Actor>, action: Action) -> Decision {
    let Some(actor) = actor else {
        return Decision::deny("authentication required");
    };

    match action {
        Action::CreateCategory => administrator_only(actor, "create categories"),
        Action::UpdateCategory => administrator_only(actor, "update categories"),
        Action::DeleteCategory => administrator_only(actor, "delete categories"),
        Action::CreateArticle => match actor.role {
            Role::Administrator | Role::Writer => Decision::Allow,
            Role::Reader => {
                Decision::deny("only users with role Writer or Administrator can create articles")
            }
        },
        Action::UpdateArticle { owner } => owner_or_administrator(actor, owner, "update"),
        Action::DeleteArticle { owner } => owner_or_administrator(actor, owner, "delete"),
        Action::UpdateProfile { target } => {
            if actor.id == target {
                Decision::Allow
            } else {
                Decision::deny("users can only update their own profile")
            }
        }
        Action::UpdateRole { .. } => administrator_only(actor, "change roles"),
    }
}

fn administrator_only(actor: &Actor, what: &str) -> Decision {
    match actor.role {
        Role::Administrator => Decision::Allow,
        Role::Writer | Role::Reader => {
            Decision::Deny(format!("only users with role Administrator can {what}"))
        }
    }
}

fn owner_or_administrator(actor: &Actor, owner: i64, verb: &str) -> Decision {
    if actor.id == owner {
        return Decision::Allow;
    }
    match actor.role {
        Role::Administrator => Decision::Allow,
        Role::Writer | Role::Reader => Decision::Deny(format!(
            "only the owner or an Administrator can {verb} this article"
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADMIN: Actor = Actor {
        id: 1,
        role: Role::Administrator,
    };
    const WRITER: Actor = Actor {
        id: 2,
        role: Role::Writer,
    };
    const READER: Actor = Actor {
        id: 3,
        role: Role::Reader,
    };

    #[test]
    fn category_mutations_are_administrator_only() {
        for action in [
            Action::CreateCategory,
            Action::UpdateCategory,
            Action::DeleteCategory,
        ] {
            assert!(authorize(Some(&ADMIN), action).is_allowed());
            assert!(!authorize(Some(&WRITER), action).is_allowed());
            assert!(!authorize(Some(&READER), action).is_allowed());
        }
    }

    #[test]
    fn readers_cannot_create_articles() {
        assert!(authorize(Some(&ADMIN), Action::CreateArticle).is_allowed());
        assert!(authorize(Some(&WRITER), Action::CreateArticle).is_allowed());
        assert_eq!(
            authorize(Some(&READER), Action::CreateArticle),
            Decision::Deny(
                "only users with role Writer or Administrator can create articles".to_string()
            )
        );
    }

    #[test]
    fn article_changes_need_ownership_or_administrator() {
        let owned_by_writer = WRITER.id;
        for action in [
            Action::UpdateArticle {
                owner: owned_by_writer,
            },
            Action::DeleteArticle {
                owner: owned_by_writer,
            },
        ] {
            assert!(authorize(Some(&WRITER), action).is_allowed());
            assert!(authorize(Some(&ADMIN), action).is_allowed());
            assert!(!authorize(Some(&READER), action).is_allowed());
        }

        let other_writer = Actor { id: 9, ..WRITER };
        assert!(
            !authorize(
                Some(&other_writer),
                Action::UpdateArticle {
                    owner: owned_by_writer
                }
            )
            .is_allowed()
        );
    }

    #[test]
    fn administrator_may_edit_own_article() {
        let action = Action::UpdateArticle { owner: ADMIN.id };
        assert!(authorize(Some(&ADMIN), action).is_allowed());
    }

    #[test]
    fn profile_updates_are_self_only() {
        assert!(authorize(Some(&READER), Action::UpdateProfile { target: READER.id }).is_allowed());
        assert!(!authorize(Some(&READER), Action::UpdateProfile { target: WRITER.id }).is_allowed());
        // Administrators get no exception for other people's profile fields.
        assert!(!authorize(Some(&ADMIN), Action::UpdateProfile { target: READER.id }).is_allowed());
    }

    #[test]
    fn role_changes_are_administrator_only() {
        assert!(authorize(Some(&ADMIN), Action::UpdateRole { target: READER.id }).is_allowed());
        assert!(authorize(Some(&ADMIN), Action::UpdateRole { target: ADMIN.id }).is_allowed());
        assert!(!authorize(Some(&READER), Action::UpdateRole { target: READER.id }).is_allowed());
        assert!(!authorize(Some(&WRITER), Action::UpdateRole { target: READER.id }).is_allowed());
    }

    #[test]
    fn unauthenticated_callers_are_denied_everything() {
        let actions = [
            Action::CreateCategory,
            Action::UpdateCategory,
            Action::DeleteCategory,
            Action::CreateArticle,
            Action::UpdateArticle { owner: 1 },
            Action::DeleteArticle { owner: 1 },
            Action::UpdateProfile { target: 1 },
            Action::UpdateRole { target: 1 },
        ];
        for action in actions {
            assert_eq!(
                authorize(None, action),
                Decision::Deny("authentication required".to_string())
            );
        }
    }
}
