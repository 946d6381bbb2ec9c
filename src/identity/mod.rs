//! Client for the external identity provider's admin API.
//!
//! Sign-in and sessions live entirely with the provider. The service only
//! needs to create an identity when a coach registers a member, and to
//! delete it again when the member row cannot be written.

use async_trait::async_trait;
use rand::distr::Alphanumeric;
use rand::Rng;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::IdentityConfig;

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("identity provider is not configured")]
    NotConfigured,
    #[error("an identity with this email already exists")]
    AlreadyExists,
    #[error("identity provider error: {0}")]
    Upstream(String),
}

impl From<reqwest::Error> for IdentityError {
    fn from(err: reqwest::Error) -> Self {
        IdentityError::Upstream(err.to_string())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct NewIdentity<'a> {
    pub email: &'a str,
    pub password: &'a str,
    pub full_name: &'a str,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Create a confirmed identity and return its user id
    async fn create_user(&self, identity: &NewIdentity<'_>) -> Result<String, IdentityError>;

    async fn delete_user(&self, user_id: &str) -> Result<(), IdentityError>;
}

/// Random initial password for members registered without one
pub fn generate_password() -> String {
    rand::rng()
        .sample_iter(Alphanumeric)
        .take(24)
        .map(char::from)
        .collect()
}

/// Admin API over HTTP, authenticated with the service key
pub struct HttpIdentityProvider {
    client: reqwest::Client,
    base_url: String,
    service_key: String,
}

#[derive(Serialize)]
struct CreateUserBody<'a> {
    email: &'a str,
    password: &'a str,
    email_confirm: bool,
    user_metadata: UserMetadata<'a>,
}

#[derive(Serialize)]
struct UserMetadata<'a> {
    full_name: &'a str,
}

#[derive(Deserialize)]
struct CreatedUser {
    id: String,
}

impl HttpIdentityProvider {
    /// Build a client from config; `None` when the admin API is not configured
    pub fn from_config(config: &IdentityConfig) -> anyhow::Result<Option<Self>> {
        let (Some(base_url), Some(service_key)) = (&config.base_url, &config.service_key) else {
            return Ok(None);
        };

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()?;

        Ok(Some(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            service_key: service_key.clone(),
        }))
    }

    fn users_url(&self) -> String {
        format!("{}/admin/users", self.base_url)
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    async fn create_user(&self, identity: &NewIdentity<'_>) -> Result<String, IdentityError> {
        let response = self
            .client
            .post(self.users_url())
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
            .json(&CreateUserBody {
                email: identity.email,
                password: identity.password,
                email_confirm: true,
                user_metadata: UserMetadata {
                    full_name: identity.full_name,
                },
            })
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            let created: CreatedUser = response.json().await?;
            tracing::info!(user_id = %created.id, "Created identity");
            return Ok(created.id);
        }

        let body = response.text().await.unwrap_or_default();
        if status == StatusCode::CONFLICT
            || (status == StatusCode::UNPROCESSABLE_ENTITY && body.contains("already"))
        {
            return Err(IdentityError::AlreadyExists);
        }
        Err(IdentityError::Upstream(format!("create user returned {}: {}", status, body)))
    }

    async fn delete_user(&self, user_id: &str) -> Result<(), IdentityError> {
        let response = self
            .client
            .delete(format!("{}/{}", self.users_url(), user_id))
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
            .send()
            .await?;

        let status = response.status();
        // Already gone is as good as deleted
        if status.is_success() || status == StatusCode::NOT_FOUND {
            tracing::info!(user_id = %user_id, "Deleted identity");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(IdentityError::Upstream(format!("delete user returned {}: {}", status, body)))
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use std::sync::Mutex;

    /// In-memory provider that records calls and can be told to fail
    #[derive(Default)]
    pub struct FakeIdentityProvider {
        pub users: Mutex<Vec<(String, String)>>,
        pub deleted: Mutex<Vec<String>>,
        pub fail_delete: bool,
    }

    impl FakeIdentityProvider {
        pub fn user_count(&self) -> usize {
            self.users.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl IdentityProvider for FakeIdentityProvider {
        async fn create_user(&self, identity: &NewIdentity<'_>) -> Result<String, IdentityError> {
            let mut users = self.users.lock().unwrap();
            if users.iter().any(|(_, email)| email == identity.email) {
                return Err(IdentityError::AlreadyExists);
            }
            let id = uuid::Uuid::new_v4().to_string();
            users.push((id.clone(), identity.email.to_string()));
            Ok(id)
        }

        async fn delete_user(&self, user_id: &str) -> Result<(), IdentityError> {
            if self.fail_delete {
                return Err(IdentityError::Upstream("delete refused".to_string()));
            }
            self.users.lock().unwrap().retain(|(id, _)| id != user_id);
            self.deleted.lock().unwrap().push(user_id.to_string());
            Ok(())
        }
    }
}
