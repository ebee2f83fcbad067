//! Credential hand-off types.
//!
//! Tools ask for credentials through [`ToolContext::request_credential`](crate::tools::ToolContext::request_credential).
//! The dispatcher turns those requests into synthetic `request_credential`
//! function calls for the client; the client answers with function responses
//! carrying a completed [`AuthConfig`], which the request pipeline stores in
//! temporary state and uses to resume the original calls.

pub mod preprocessor;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use strum::{Display, EnumString};

pub use preprocessor::AuthPreprocessor;

/// Name of the synthetic function call asking the client for a credential.
pub const REQUEST_CREDENTIAL_FUNCTION_CALL_NAME: &str = "request_credential";

/// State prefix under which received credentials are stored for the turn.
pub const CREDENTIAL_STATE_PREFIX: &str = "temp_";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AuthCredentialType {
    ApiKey,
    Http,
    OAuth2,
    OpenIdConnect,
    ServiceAccount,
}

/// OAuth2 client data and, once the flow completes, its tokens.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct OAuth2Auth {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_response_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

/// A credential, raw or exchanged.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuthCredential {
    pub auth_type: AuthCredentialType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oauth2: Option<OAuth2Auth>,
}

/// What a tool needs to authenticate, and what the client supplied back.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuthConfig {
    /// Scheme description (OpenAPI security scheme object).
    pub auth_scheme: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_auth_credential: Option<AuthCredential>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exchanged_auth_credential: Option<AuthCredential>,
    /// Explicit key for storing the credential; derived from the scheme when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential_key: Option<String>,
}

impl AuthConfig {
    pub fn new(auth_scheme: serde_json::Value) -> Self {
        Self {
            auth_scheme,
            raw_auth_credential: None,
            exchanged_auth_credential: None,
            credential_key: None,
        }
    }

    pub fn with_raw_credential(mut self, credential: AuthCredential) -> Self {
        self.raw_auth_credential = Some(credential);
        self
    }

    /// Stable key identifying this scheme + raw credential pair.
    pub fn credential_key(&self) -> String {
        if let Some(key) = &self.credential_key {
            return key.clone();
        }
        let mut hasher = Sha256::new();
        hasher.update(self.auth_scheme.to_string().as_bytes());
        if let Some(raw) = &self.raw_auth_credential {
            hasher.update(raw.auth_type.to_string().as_bytes());
            if let Some(client_id) = raw.oauth2.as_ref().and_then(|o| o.client_id.as_deref()) {
                hasher.update(client_id.as_bytes());
            }
        }
        let digest = hasher.finalize();
        let hex: String = digest[..8].iter().map(|b| format!("{b:02x}")).collect();
        format!("kestrel_auth_{hex}")
    }

    /// State key under which the client's answer is stored.
    pub fn state_key(&self) -> String {
        format!("{CREDENTIAL_STATE_PREFIX}{}", self.credential_key())
    }
}

/// Arguments of a synthetic `request_credential` call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuthToolArguments {
    /// Id of the tool call that needs the credential.
    pub function_call_id: String,
    pub auth_config: AuthConfig,
}
