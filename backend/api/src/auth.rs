//! Identity collaborator — resolves a bearer credential to `{id, role}`.
//!
//! The platform's auth service owns credentials; this engine only consumes
//! an introspection endpoint. Any failure along the way (missing header,
//! network error, non-2xx, unparsable body) is `Unauthorized`.

use axum::http::{header, HeaderMap};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use crate::config::Config;
use crate::errors::{ApiError, Result};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Role {
    User,
    Admin,
}

/// The authenticated caller of a request.
#[derive(Clone, Debug)]
pub struct Caller {
    pub id: String,
    pub role: Role,
}

impl Caller {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

#[derive(Debug, Deserialize)]
struct IntrospectionResponse {
    id: String,
    role: Option<String>,
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

/// Resolve the request's bearer token against the identity service.
pub async fn authenticate(client: &Client, config: &Config, headers: &HeaderMap) -> Result<Caller> {
    let token = bearer_token(headers)
        .ok_or_else(|| ApiError::Unauthorized("missing bearer token".to_string()))?;

    let response = client
        .post(format!("{}/introspect", config.auth_url))
        .json(&json!({ "token": token }))
        .send()
        .await
        .map_err(|e| ApiError::Unauthorized(format!("identity service unreachable: {e}")))?;

    if !response.status().is_success() {
        return Err(ApiError::Unauthorized("invalid credentials".to_string()));
    }

    let body: IntrospectionResponse = response
        .json()
        .await
        .map_err(|_| ApiError::Unauthorized("invalid credentials".to_string()))?;

    let role = match body.role.as_deref() {
        Some("admin") => Role::Admin,
        _ => Role::User,
    };

    Ok(Caller { id: body.id, role })
}
