use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Seconds before the provider's stated expiry at which a token is treated as
/// already expired, so it does not lapse mid-request.
pub const EXPIRY_MARGIN_SECS: i64 = 30;

/// Raw token endpoint response for both the `authorization_code` and the
/// `refresh_token` grants.
#[derive(Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    pub expires_in: Option<i64>,
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub id_token: Option<String>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

/// A client's Google credential.
#[derive(Clone, Serialize, Deserialize, PartialEq)]
pub struct OAuthTokenSet {
    /// The access token for API requests
    pub access_token: String,
    /// Always "Bearer" for Google
    pub token_type: String,
    /// When the access token stops being accepted
    pub expires_at: DateTime<Utc>,
    /// Present when consent was given with `access_type=offline`
    pub refresh_token: Option<String>,
    /// Space separated scopes granted to this token
    pub scope: String,
    /// Email of the Google account that granted access
    pub email: Option<String>,
}

impl OAuthTokenSet {
    pub fn from_response(response: TokenResponse, requested_scope: &str, now: DateTime<Utc>) -> Self {
        Self {
            expires_at: expires_at(response.expires_in, now),
            scope: response
                .scope
                .unwrap_or_else(|| requested_scope.to_string()),
            access_token: response.access_token,
            token_type: response.token_type,
            refresh_token: response.refresh_token,
            email: None,
        }
    }

    /// Fold a `refresh_token` grant response into this credential.
    ///
    /// Google omits the refresh token on refresh, so the existing one is kept
    /// unless a rotated one comes back.
    pub fn refreshed(&self, response: TokenResponse, now: DateTime<Utc>) -> Self {
        Self {
            access_token: response.access_token,
            token_type: response.token_type,
            expires_at: expires_at(response.expires_in, now),
            refresh_token: response.refresh_token.or_else(|| self.refresh_token.clone()),
            scope: response.scope.unwrap_or_else(|| self.scope.clone()),
            email: self.email.clone(),
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now + Duration::seconds(EXPIRY_MARGIN_SECS) >= self.expires_at
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn can_refresh(&self) -> bool {
        self.refresh_token.is_some()
    }
}

fn expires_at(expires_in: Option<i64>, now: DateTime<Utc>) -> DateTime<Utc> {
    // Google always sends expires_in; an hour is its documented lifetime
    now + Duration::seconds(expires_in.unwrap_or(3600))
}

impl std::fmt::Debug for OAuthTokenSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthTokenSet")
            .field("access_token", &"[redacted]")
            .field("token_type", &self.token_type)
            .field("expires_at", &self.expires_at)
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[redacted]"),
            )
            .field("scope", &self.scope)
            .field("email", &self.email)
            .finish()
    }
}

impl std::fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenResponse")
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("scope", &self.scope)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(refresh_token: Option<&str>) -> TokenResponse {
        TokenResponse {
            access_token: "ya29.access".to_string(),
            token_type: "Bearer".to_string(),
            expires_in: Some(3600),
            refresh_token: refresh_token.map(str::to_string),
            scope: None,
            id_token: None,
        }
    }

    #[test]
    fn test_expiry_uses_margin() {
        let now = Utc::now();
        let tokens = OAuthTokenSet::from_response(response(None), "openid", now);

        assert!(!tokens.is_expired_at(now));
        assert!(tokens.is_expired_at(now + Duration::seconds(3600 - EXPIRY_MARGIN_SECS)));
        assert_eq!(tokens.scope, "openid");
    }

    #[test]
    fn test_refresh_keeps_existing_refresh_token() {
        let now = Utc::now();
        let mut original = OAuthTokenSet::from_response(response(Some("1//refresh")), "openid", now);
        original.email = Some("someone@example.com".to_string());

        let mut refresh = response(None);
        refresh.access_token = "ya29.new".to_string();
        let refreshed = original.refreshed(refresh, now);

        assert_eq!(refreshed.access_token, "ya29.new");
        assert_eq!(refreshed.refresh_token.as_deref(), Some("1//refresh"));
        assert_eq!(refreshed.email.as_deref(), Some("someone@example.com"));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let tokens =
            OAuthTokenSet::from_response(response(Some("1//refresh")), "openid", Utc::now());
        let debug = format!("{tokens:?}");

        assert!(!debug.contains("ya29.access"));
        assert!(!debug.contains("1//refresh"));
        assert!(debug.contains("[redacted]"));
    }
}
