use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{LoginReply, Registration, Transport};
use crate::config::ServerConfig;
use crate::error::TransportError;
use crate::principal::{Principal, Role, UserId};
use crate::record::{DashboardStats, NewUser, UserChanges, UserRecord};
use crate::Secret;

/// Transport over HTTP/JSON using `reqwest`.
///
/// # Examples
///
/// ```no_run
/// use console_access::{ClientConfig, HttpTransport};
///
/// let config = ClientConfig::default();
/// let transport = HttpTransport::new(&config.server).expect("client builds");
/// assert_eq!(transport.base_url(), "http://localhost:8080");
/// ```
#[derive(Debug, Clone)]
pub struct HttpTransport {
    base_url: String,
    client: Client,
}

#[derive(Serialize)]
struct LoginBody<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct LoginResponse {
    token: String,
    #[serde(default)]
    user: Option<LoginUser>,
}

#[derive(Deserialize)]
struct LoginUser {
    id: UserId,
    username: String,
    #[serde(default)]
    role: Role,
}

#[derive(Serialize)]
struct RegisterBody<'a> {
    username: &'a str,
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct CreateUserBody<'a> {
    username: &'a str,
    email: &'a str,
    password: &'a str,
    role: Role,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PasswordBody<'a> {
    current_password: &'a str,
    new_password: &'a str,
}

impl HttpTransport {
    /// Builds a client for `config.base_url` with the configured timeout.
    pub fn new(config: &ServerConfig) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| TransportError::Network(e.to_string()))?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    /// Base URL without a trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, TransportError> {
        let response = request
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;
        let status = response.status();
        debug!(status = status.as_u16(), url = %response.url(), "transport response");

        if status.is_success() {
            return Ok(response);
        }

        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(TransportError::Unauthorized(status.as_u16()))
            }
            StatusCode::NOT_FOUND => Err(TransportError::NotFound),
            _ => {
                let message = response.text().await.unwrap_or_default();
                Err(TransportError::Rejected {
                    status: status.as_u16(),
                    message: message.trim().to_string(),
                })
            }
        }
    }

    async fn json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, TransportError> {
        self.send(request)
            .await?
            .json::<T>()
            .await
            .map_err(|e| TransportError::Decode(e.to_string()))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn login(
        &self,
        username: &str,
        password: &Secret<String>,
    ) -> Result<LoginReply, TransportError> {
        let body = LoginBody {
            username,
            password: password.expose_secret(),
        };
        let reply: LoginResponse = self
            .json(self.client.post(self.url("/api/login")).json(&body))
            .await?;

        Ok(LoginReply {
            token: Secret::new(reply.token),
            user: reply
                .user
                .map(|u| Principal::new(u.id, u.username, u.role)),
        })
    }

    async fn register(&self, registration: &Registration) -> Result<(), TransportError> {
        let body = RegisterBody {
            username: &registration.username,
            email: &registration.email,
            password: registration.password.expose_secret(),
        };
        self.send(self.client.post(self.url("/api/register")).json(&body))
            .await?;
        Ok(())
    }

    async fn list_users(&self, token: &Secret<String>) -> Result<Vec<UserRecord>, TransportError> {
        self.json(
            self.client
                .get(self.url("/api/users"))
                .bearer_auth(token.expose_secret()),
        )
        .await
    }

    async fn create_user(
        &self,
        token: &Secret<String>,
        user: &NewUser,
    ) -> Result<UserRecord, TransportError> {
        let body = CreateUserBody {
            username: &user.username,
            email: &user.email,
            password: user.password.expose_secret(),
            role: user.role,
        };
        self.json(
            self.client
                .post(self.url("/api/users"))
                .bearer_auth(token.expose_secret())
                .json(&body),
        )
        .await
    }

    async fn update_user(
        &self,
        token: &Secret<String>,
        id: UserId,
        changes: &UserChanges,
    ) -> Result<UserRecord, TransportError> {
        self.json(
            self.client
                .put(self.url(&format!("/api/users/{id}")))
                .bearer_auth(token.expose_secret())
                .json(changes),
        )
        .await
    }

    async fn delete_user(&self, token: &Secret<String>, id: UserId) -> Result<(), TransportError> {
        self.send(
            self.client
                .delete(self.url(&format!("/api/users/{id}")))
                .bearer_auth(token.expose_secret()),
        )
        .await?;
        Ok(())
    }

    async fn change_password(
        &self,
        token: &Secret<String>,
        current: &Secret<String>,
        new: &Secret<String>,
    ) -> Result<(), TransportError> {
        let body = PasswordBody {
            current_password: current.expose_secret(),
            new_password: new.expose_secret(),
        };
        self.send(
            self.client
                .put(self.url("/api/profile/password"))
                .bearer_auth(token.expose_secret())
                .json(&body),
        )
        .await?;
        Ok(())
    }

    async fn dashboard_stats(&self, token: &Secret<String>) -> Result<DashboardStats, TransportError> {
        self.json(
            self.client
                .get(self.url("/api/dashboard/stats"))
                .bearer_auth(token.expose_secret()),
        )
        .await
    }

    async fn fetch_profile(&self, token: &Secret<String>) -> Result<UserRecord, TransportError> {
        self.json(
            self.client
                .get(self.url("/api/profile"))
                .bearer_auth(token.expose_secret()),
        )
        .await
    }

    async fn update_profile(
        &self,
        token: &Secret<String>,
        changes: &UserChanges,
    ) -> Result<UserRecord, TransportError> {
        self.json(
            self.client
                .put(self.url("/api/profile"))
                .bearer_auth(token.expose_secret())
                .json(changes),
        )
        .await
    }
}
