//! Permission rules checked against the current user.

use crate::error::ApiError;
use crate::service::auth::CurrentUser;
use crate::sql::quoted;
use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use sqlx::PgPool;

#[derive(Clone, Debug, PartialEq)]
pub enum PermRule {
    /// The user with this id.
    User(i64),
    /// Any member of the group with this id.
    GroupMember(i64),
    AllOf(Vec<PermRule>),
    AnyOf(Vec<PermRule>),
}

#[async_trait]
pub trait MembershipLookup: Send + Sync {
    async fn is_member(&self, user_id: i64, group_id: i64) -> Result<bool, ApiError>;
}

/// Group membership through the `group_members` link table.
pub struct PgMembership<'a> {
    pub pool: &'a PgPool,
}

#[async_trait]
impl MembershipLookup for PgMembership<'_> {
    async fn is_member(&self, user_id: i64, group_id: i64) -> Result<bool, ApiError> {
        let sql = format!(
            "SELECT 1 AS found FROM {} WHERE user_id = $1::bigint AND group_id = $2::bigint",
            quoted("group_members")
        );
        let row = sqlx::query(&sql)
            .bind(user_id)
            .bind(group_id)
            .fetch_optional(self.pool)
            .await?;
        Ok(row.is_some())
    }
}

impl PermRule {
    pub fn evaluate<'a>(
        &'a self,
        user: &'a CurrentUser,
        members: &'a dyn MembershipLookup,
    ) -> BoxFuture<'a, Result<bool, ApiError>> {
        async move {
            match self {
                PermRule::User(id) => Ok(user.id == *id),
                PermRule::GroupMember(group) => members.is_member(user.id, *group).await,
                PermRule::AllOf(rules) => {
                    for r in rules {
                        if !r.evaluate(user, members).await? {
                            return Ok(false);
                        }
                    }
                    Ok(true)
                }
                PermRule::AnyOf(rules) => {
                    for r in rules {
                        if r.evaluate(user, members).await? {
                            return Ok(true);
                        }
                    }
                    Ok(false)
                }
            }
        }
        .boxed()
    }
}

/// `login_required` without a user, `perm_denied` when the rule fails.
pub async fn check_perm<'u>(
    user: Option<&'u CurrentUser>,
    rule: &PermRule,
    members: &dyn MembershipLookup,
) -> Result<&'u CurrentUser, ApiError> {
    let user = user.ok_or(ApiError::LoginRequired)?;
    if rule.evaluate(user, members).await? {
        Ok(user)
    } else {
        Err(ApiError::PermDenied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    struct Members(HashSet<(i64, i64)>);

    #[async_trait]
    impl MembershipLookup for Members {
        async fn is_member(&self, user_id: i64, group_id: i64) -> Result<bool, ApiError> {
            Ok(self.0.contains(&(user_id, group_id)))
        }
    }

    fn user(id: i64) -> CurrentUser {
        CurrentUser {
            id,
            username: format!("u{}", id),
            token: "t".into(),
        }
    }

    #[tokio::test]
    async fn owner_and_member_rules() {
        let members = Members([(2, 7)].into_iter().collect());
        let rule = PermRule::AnyOf(vec![PermRule::User(1), PermRule::GroupMember(7)]);
        assert!(check_perm(Some(&user(1)), &rule, &members).await.is_ok());
        assert!(check_perm(Some(&user(2)), &rule, &members).await.is_ok());
        assert!(matches!(check_perm(Some(&user(3)), &rule, &members).await, Err(ApiError::PermDenied)));
    }

    #[tokio::test]
    async fn anonymous_needs_login() {
        let members = Members(HashSet::new());
        let err = check_perm(None, &PermRule::User(1), &members).await.unwrap_err();
        assert!(matches!(err, ApiError::LoginRequired));
    }

    #[tokio::test]
    async fn all_of_requires_every_rule() {
        let members = Members([(1, 7)].into_iter().collect());
        let rule = PermRule::AllOf(vec![PermRule::User(1), PermRule::GroupMember(8)]);
        assert!(matches!(check_perm(Some(&user(1)), &rule, &members).await, Err(ApiError::PermDenied)));
    }
}
