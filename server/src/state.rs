use std::{env, path::Path, str::FromStr, sync::Arc, time::Duration};

use color_eyre::eyre::{eyre, WrapErr};
use serde::Deserialize;

use crate::{
    bridge::ToolBridge,
    oauth::{
        provider::{google::GoogleOAuthClient, OAuthProvider},
        store::{MemorySessionStore, SessionStore},
        machine::DEFAULT_EXCHANGE_GRACE_SECS,
        Authorizer,
    },
    tools::drive::{DriveApi, GoogleDriveClient},
};

pub const DEFAULT_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/v2/auth";
pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
pub const DEFAULT_REVOKE_URI: &str = "https://oauth2.googleapis.com/revoke";
pub const DEFAULT_USERINFO_URI: &str = "https://www.googleapis.com/oauth2/v2/userinfo";
pub const DEFAULT_DRIVE_API_URL: &str = "https://www.googleapis.com/drive/v3";

pub const DEFAULT_SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/drive.metadata.readonly",
    "https://www.googleapis.com/auth/userinfo.profile",
    "https://www.googleapis.com/auth/userinfo.email",
    "openid",
];

/// Read `key`, falling back to `default` when unset. A set but unparsable
/// value is an error rather than a silent default.
pub(crate) fn env_or<T>(key: &str, default: T) -> color_eyre::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| eyre!("Failed to parse {}={:?}: {}", key, raw, e)),
        Err(_) => Ok(default),
    }
}

/// OAuth client registration and Google endpoints.
#[derive(Clone)]
pub struct GoogleOAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub auth_uri: String,
    pub token_uri: String,
    pub revoke_uri: String,
    pub userinfo_uri: String,
    pub drive_api_url: String,
    pub scopes: Vec<String>,
}

#[derive(Deserialize)]
struct ClientSecretsFile {
    web: Option<ClientSecrets>,
    installed: Option<ClientSecrets>,
}

#[derive(Deserialize)]
struct ClientSecrets {
    client_id: String,
    client_secret: String,
    auth_uri: Option<String>,
    token_uri: Option<String>,
}

impl GoogleOAuthConfig {
    pub fn with_credentials(client_id: String, client_secret: String) -> Self {
        Self {
            client_id,
            client_secret,
            auth_uri: DEFAULT_AUTH_URI.to_string(),
            token_uri: DEFAULT_TOKEN_URI.to_string(),
            revoke_uri: DEFAULT_REVOKE_URI.to_string(),
            userinfo_uri: DEFAULT_USERINFO_URI.to_string(),
            drive_api_url: DEFAULT_DRIVE_API_URL.to_string(),
            scopes: DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Credentials from `GOOGLE_CLIENT_ID`/`GOOGLE_CLIENT_SECRET`, otherwise
    /// from the client secrets JSON at `GOOGLE_CLIENT_SECRETS_FILE`
    /// (default `credentials.json`). Endpoint variables override either.
    pub fn from_env() -> color_eyre::Result<Self> {
        let config = match (env::var("GOOGLE_CLIENT_ID"), env::var("GOOGLE_CLIENT_SECRET")) {
            (Ok(client_id), Ok(client_secret)) => Self::with_credentials(client_id, client_secret),
            _ => {
                let path = env::var("GOOGLE_CLIENT_SECRETS_FILE")
                    .unwrap_or_else(|_| "credentials.json".to_string());
                Self::from_client_secrets_file(Path::new(&path))?
            }
        };

        Ok(config.with_env_overrides())
    }

    pub fn from_client_secrets_file(path: &Path) -> color_eyre::Result<Self> {
        let raw = std::fs::read_to_string(path).wrap_err_with(|| {
            format!(
                "GOOGLE_CLIENT_ID/GOOGLE_CLIENT_SECRET are not set and {} could not be read",
                path.display()
            )
        })?;
        Self::from_client_secrets(&raw)
            .wrap_err_with(|| format!("Invalid client secrets file {}", path.display()))
    }

    /// Parse a Google Cloud console client secrets download.
    pub fn from_client_secrets(raw: &str) -> color_eyre::Result<Self> {
        let file: ClientSecretsFile = serde_json::from_str(raw)?;
        let secrets = file
            .web
            .or(file.installed)
            .ok_or_else(|| eyre!("expected a \"web\" or \"installed\" client"))?;

        let mut config = Self::with_credentials(secrets.client_id, secrets.client_secret);
        if let Some(auth_uri) = secrets.auth_uri {
            config.auth_uri = auth_uri;
        }
        if let Some(token_uri) = secrets.token_uri {
            config.token_uri = token_uri;
        }
        Ok(config)
    }

    fn with_env_overrides(mut self) -> Self {
        for (key, field) in [
            ("GOOGLE_AUTH_URI", &mut self.auth_uri),
            ("GOOGLE_TOKEN_URI", &mut self.token_uri),
            ("GOOGLE_REVOKE_URI", &mut self.revoke_uri),
            ("GOOGLE_USERINFO_URI", &mut self.userinfo_uri),
            ("GOOGLE_DRIVE_API_URL", &mut self.drive_api_url),
        ] {
            if let Ok(value) = env::var(key) {
                *field = value;
            }
        }
        self
    }
}

impl std::fmt::Debug for GoogleOAuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoogleOAuthConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[redacted]")
            .field("auth_uri", &self.auth_uri)
            .field("token_uri", &self.token_uri)
            .field("revoke_uri", &self.revoke_uri)
            .field("userinfo_uri", &self.userinfo_uri)
            .field("drive_api_url", &self.drive_api_url)
            .field("scopes", &self.scopes)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// Origin the browser reaches us on; the OAuth redirect hangs off it
    pub public_url: String,
    pub pending_ttl: chrono::Duration,
    pub http_timeout: Duration,
    pub sweep_interval: Duration,
}

impl ServerSettings {
    pub fn from_env() -> color_eyre::Result<Self> {
        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env_or("PORT", 8081u16)?;
        let public_url = env::var("PUBLIC_URL").unwrap_or_else(|_| format!("http://{host}:{port}"));

        Ok(Self {
            host,
            port,
            public_url: public_url.trim_end_matches('/').to_string(),
            pending_ttl: chrono::Duration::seconds(env_or("PENDING_AUTH_TTL_SECS", 600i64)?),
            http_timeout: Duration::from_secs(env_or("HTTP_TIMEOUT_SECS", 30u64)?),
            sweep_interval: Duration::from_secs(env_or("PENDING_SWEEP_INTERVAL_SECS", 60u64)?),
        })
    }

    /// Defaults for a broker reachable at `public_url`.
    pub fn for_public_url(public_url: &str) -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            public_url: public_url.trim_end_matches('/').to_string(),
            pending_ttl: chrono::Duration::seconds(600),
            http_timeout: Duration::from_secs(30),
            sweep_interval: Duration::from_secs(60),
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Returns the canonical redirect URI for OAuth
    pub fn redirect_uri(&self) -> String {
        format!("{}/oauth2callback", self.public_url)
    }
}

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<ServerSettings>,
    pub authorizer: Authorizer,
    pub bridge: Arc<ToolBridge>,
}

impl AppState {
    pub fn from_env() -> color_eyre::Result<Self> {
        let settings = ServerSettings::from_env()?;
        let google = GoogleOAuthConfig::from_env()?;

        tracing::info!(
            public_url = %settings.public_url,
            redirect_uri = %settings.redirect_uri(),
            "Loaded configuration"
        );

        Self::new(settings, google)
    }

    /// Wire the Google adapters and an in-memory store.
    pub fn new(settings: ServerSettings, google: GoogleOAuthConfig) -> color_eyre::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(settings.http_timeout)
            .use_rustls_tls()
            .build()?;

        let drive = GoogleDriveClient::new(http.clone(), &google.drive_api_url);
        let provider = GoogleOAuthClient::new(http, google, settings.redirect_uri());

        Ok(Self::with_components(
            settings,
            Arc::new(MemorySessionStore::new()),
            Arc::new(provider),
            Arc::new(drive),
        ))
    }

    pub fn with_components(
        settings: ServerSettings,
        store: Arc<dyn SessionStore>,
        provider: Arc<dyn OAuthProvider>,
        drive: Arc<dyn DriveApi>,
    ) -> Self {
        let exchange_grace = chrono::Duration::from_std(settings.http_timeout)
            .unwrap_or_else(|_| chrono::Duration::seconds(DEFAULT_EXCHANGE_GRACE_SECS));
        let authorizer = Authorizer::new(store, provider, settings.pending_ttl)
            .with_exchange_grace(exchange_grace);
        let bridge = Arc::new(ToolBridge::new(authorizer.clone(), drive));

        Self {
            settings: Arc::new(settings),
            authorizer,
            bridge,
        }
    }
}
