//! Google OAuth2 collaborator: authorization-code exchange plus the
//! userinfo lookup, behind a trait so the identity flow is testable
//! without network access.

use async_trait::async_trait;
use rand::Rng;
use rand::distr::Alphanumeric;
use serde::Deserialize;
use tracing::warn;
use url::Url;

use crate::config::GoogleConfig;
use crate::error::PortalError;

const AUTHORIZE_ENDPOINT: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";
const USERINFO_ENDPOINT: &str = "https://openidconnect.googleapis.com/v1/userinfo";

/// What the provider asserts about a signed-in person.
#[derive(Debug, Clone)]
pub struct ProviderIdentity {
    pub email: String,
    pub display_name: String,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    fn authorize_url(&self, state: &str) -> String;
    async fn exchange_code(&self, code: &str) -> Result<ProviderIdentity, PortalError>;
}

/// Random nonce for the OAuth `state` parameter.
pub fn random_state() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect()
}

pub struct GoogleProvider {
    http: reqwest::Client,
    config: GoogleConfig,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Deserialize)]
struct UserInfo {
    email: Option<String>,
    name: Option<String>,
    given_name: Option<String>,
}

impl GoogleProvider {
    pub fn new(config: GoogleConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }
}

#[async_trait]
impl IdentityProvider for GoogleProvider {
    fn authorize_url(&self, state: &str) -> String {
        let mut url = Url::parse(AUTHORIZE_ENDPOINT).expect("valid constant URL");
        url.query_pairs_mut()
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", &self.config.redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", "openid email profile")
            .append_pair("state", state);
        url.to_string()
    }

    async fn exchange_code(&self, code: &str) -> Result<ProviderIdentity, PortalError> {
        let token: TokenResponse = self
            .http
            .post(TOKEN_ENDPOINT)
            .form(&[
                ("code", code),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| {
                warn!("Google token exchange failed: {}", e);
                PortalError::Unauthenticated
            })?
            .json()
            .await
            .map_err(|e| {
                warn!("Google token response unreadable: {}", e);
                PortalError::Unauthenticated
            })?;

        let info: UserInfo = self
            .http
            .get(USERINFO_ENDPOINT)
            .bearer_auth(&token.access_token)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| {
                warn!("Google userinfo fetch failed: {}", e);
                PortalError::Unauthenticated
            })?
            .json()
            .await
            .map_err(|e| {
                warn!("Google userinfo unreadable: {}", e);
                PortalError::Unauthenticated
            })?;

        let email = match info.email {
            Some(email) if !email.trim().is_empty() => email,
            _ => {
                warn!("Google profile carried no email");
                return Err(PortalError::Unauthenticated);
            }
        };
        let display_name = info
            .name
            .or(info.given_name)
            .unwrap_or_else(|| email.clone());

        Ok(ProviderIdentity {
            email,
            display_name,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn authorize_url_carries_client_and_state() {
        let provider = GoogleProvider::new(GoogleConfig {
            client_id: "portal-client".into(),
            client_secret: "secret".into(),
            redirect_uri: "http://localhost:8000/auth/google/callback".into(),
        });

        let url = Url::parse(&provider.authorize_url("nonce123")).unwrap();
        assert_eq!(url.host_str(), Some("accounts.google.com"));

        let pairs: HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(pairs.get("client_id").map(String::as_str), Some("portal-client"));
        assert_eq!(pairs.get("state").map(String::as_str), Some("nonce123"));
        assert_eq!(pairs.get("response_type").map(String::as_str), Some("code"));
        assert_eq!(
            pairs.get("scope").map(String::as_str),
            Some("openid email profile")
        );
    }

    #[test]
    fn state_nonces_are_distinct() {
        let a = random_state();
        let b = random_state();
        assert_eq!(a.len(), 32);
        assert_ne!(a, b);
    }
}
