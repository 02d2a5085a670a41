use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use validator::Validate;

use crate::auth::{default_tokens, Action, Module, Permission, PermissionToken, Session};
use crate::errors::{Result, ServiceError};
use crate::models::{User, UserRole};
use crate::repositories::Repository;
use crate::store::ListQuery;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NewUser {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
    #[validate(length(min = 1, message = "Name is required"))]
    pub name: String,
    pub role: UserRole,
    /// Defaults to the role's standard tokens when empty.
    #[serde(default)]
    pub permissions: Vec<String>,
}

#[derive(Clone)]
pub struct UserService {
    users: Repository<User>,
}

impl UserService {
    pub fn new(users: Repository<User>) -> Self {
        Self { users }
    }

    pub async fn list_users(&self, session: &Session) -> Result<Vec<User>> {
        session.require(Permission::new(Module::Users, Action::View))?;
        self.users.list(&ListQuery::all()).await
    }

    /// Only admins create users.
    #[instrument(skip(self, input, session), fields(email = %input.email))]
    pub async fn create_user(&self, input: NewUser, session: &Session) -> Result<User> {
        if !session.is_admin() {
            return Err(ServiceError::Forbidden(
                "Only administrators can create users".into(),
            ));
        }
        self.insert(input).await
    }

    /// Creates the first administrator. Refused once any user exists.
    #[instrument(skip(self))]
    pub async fn bootstrap_admin(&self, email: &str, name: &str) -> Result<User> {
        if !self.users.list(&ListQuery::all()).await?.is_empty() {
            return Err(ServiceError::Forbidden(
                "Users already exist; sign in as an administrator".into(),
            ));
        }
        self.insert(NewUser {
            email: email.to_string(),
            name: name.to_string(),
            role: UserRole::Admin,
            permissions: Vec::new(),
        })
        .await
    }

    #[instrument(skip(self, tokens, session), fields(user_id = %user_id))]
    pub async fn set_permissions(
        &self,
        user_id: &str,
        tokens: Vec<String>,
        session: &Session,
    ) -> Result<User> {
        session.require(Permission::new(Module::Users, Action::Manage))?;
        for token in &tokens {
            if let PermissionToken::Legacy(raw) = PermissionToken::parse(token) {
                warn!(token = %raw, "storing a legacy permission token");
            }
        }
        let mut user = self.users.get(user_id).await?;
        user.permissions = tokens;
        self.users.save(&user).await
    }

    pub async fn set_active(&self, user_id: &str, active: bool, session: &Session) -> Result<User> {
        session.require(Permission::new(Module::Users, Action::Edit))?;
        if user_id == session.user_id && !active {
            return Err(ServiceError::ValidationError(
                "You cannot deactivate yourself".into(),
            ));
        }
        let mut user = self.users.get(user_id).await?;
        user.active = active;
        self.users.save(&user).await
    }

    pub async fn delete_user(&self, user_id: &str, session: &Session) -> Result<bool> {
        session.require(Permission::new(Module::Users, Action::Delete))?;
        Ok(self.users.delete(user_id).await)
    }

    async fn insert(&self, input: NewUser) -> Result<User> {
        input.validate()?;
        let email = input.email.trim().to_lowercase();
        let taken = self
            .users
            .list(&ListQuery::all())
            .await?
            .iter()
            .any(|u| u.email.to_lowercase() == email);
        if taken {
            return Err(ServiceError::ValidationError(format!(
                "{} is already registered",
                email
            )));
        }

        let mut user = User::new(email, input.name, input.role);
        user.permissions = if input.permissions.is_empty() {
            default_tokens(input.role)
        } else {
            input.permissions
        };

        let created = self.users.create(&user).await?;
        info!(user_id = %created.id, role = %created.role, "user created");
        Ok(created)
    }
}
