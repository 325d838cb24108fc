//! Configuration layer: typed settings with layered precedence (file → env → CLI).

mod cli;

pub use cli::{CliArgs, Command, DatabaseOverride, MigrateArgs, ServeArgs, ServeOverrides};

use std::{
    collections::HashMap,
    net::SocketAddr,
    num::{NonZeroU32, NonZeroUsize},
    str::FromStr,
    time::Duration,
};

use axum::http::Method;
use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "portfolio";
const ENV_PREFIX: &str = "PORTFOLIO";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 8;
const DEFAULT_SESSION_TTL_HOURS: u64 = 24;
const MIN_TOKEN_SECRET_BYTES: usize = 32;
const DEFAULT_RATE_LIMIT_WINDOW_SECS: u64 = 60;
const DEFAULT_RATE_LIMIT_MAX_REQUESTS: u64 = 120;
const DEFAULT_RATE_LIMIT_SWEEP_SECS: u64 = 60;
const DEFAULT_CACHE_TTL_SECS: u64 = 60;
const DEFAULT_CACHE_MAX_ENTRIES: usize = 1024;
const DEFAULT_MAIL_FROM: &str = "Portfolio <noreply@localhost>";
const DEFAULT_MAIL_SIGNATURE: &str = "The portfolio team";

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub auth: AuthSettings,
    pub rate_limit: RateLimitSettings,
    pub cache: CacheSettings,
    pub mail: MailSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub graceful_shutdown: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    /// When unset the server runs on the in-memory store.
    pub url: Option<String>,
    pub max_connections: NonZeroU32,
}

#[derive(Clone)]
pub struct AuthSettings {
    pub admin_password: String,
    pub token_secret: String,
    pub session_ttl: time::Duration,
    pub secure_cookie: bool,
}

impl std::fmt::Debug for AuthSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSettings")
            .field("admin_password", &"<redacted>")
            .field("token_secret", &"<redacted>")
            .field("session_ttl", &self.session_ttl)
            .field("secure_cookie", &self.secure_cookie)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSettings {
    pub window_seconds: NonZeroU32,
    pub max_requests: NonZeroU32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteLimitSettings {
    pub prefix: String,
    /// Empty means every method.
    pub methods: Vec<Method>,
    pub window: WindowSettings,
}

#[derive(Debug, Clone)]
pub struct RateLimitSettings {
    pub default: WindowSettings,
    pub sweep_interval: Duration,
    /// Key clients by `X-Forwarded-For`/`X-Real-IP` instead of the socket peer.
    pub trust_forwarded_headers: bool,
    pub routes: Vec<RouteLimitSettings>,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub enabled: bool,
    pub default_ttl: Duration,
    pub max_entries: NonZeroUsize,
    pub ttl_overrides: HashMap<String, Duration>,
}

#[derive(Debug, Clone)]
pub struct MailSettings {
    /// Delivery is only attempted when both endpoint and key are set.
    pub transport: Option<MailTransport>,
    pub from: String,
    pub admin_address: Option<String>,
    pub signature: String,
    pub auto_reply: bool,
}

#[derive(Clone)]
pub struct MailTransport {
    pub endpoint: Url,
    pub api_key: String,
}

impl std::fmt::Debug for MailTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailTransport")
            .field("endpoint", &self.endpoint.as_str())
            .field("api_key", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Migrate(args)) => raw.apply_database_override(&args.database),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    database: RawDatabaseSettings,
    auth: RawAuthSettings,
    rate_limit: RawRateLimitSettings,
    cache: RawCacheSettings,
    mail: RawMailSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(seconds) = overrides.server_graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(max) = overrides.database_max_connections {
            self.database.max_connections = Some(max);
        }
        if let Some(window) = overrides.rate_limit_window_seconds {
            self.rate_limit.window_seconds = Some(window);
        }
        if let Some(max) = overrides.rate_limit_max_requests {
            self.rate_limit.max_requests = Some(max);
        }
        if let Some(trust) = overrides.rate_limit_trust_forwarded_headers {
            self.rate_limit.trust_forwarded_headers = Some(trust);
        }
        if let Some(enabled) = overrides.cache_enabled {
            self.cache.enabled = Some(enabled);
        }
        if let Some(ttl) = overrides.cache_default_ttl_seconds {
            self.cache.default_ttl_seconds = Some(ttl);
        }
        if let Some(secure) = overrides.auth_secure_cookie {
            self.auth.secure_cookie = Some(secure);
        }

        self.apply_database_override(&overrides.database);
    }

    fn apply_database_override(&mut self, overrides: &DatabaseOverride) {
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            database,
            auth,
            rate_limit,
            cache,
            mail,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            database: build_database_settings(database)?,
            auth: build_auth_settings(auth)?,
            rate_limit: build_rate_limit_settings(rate_limit)?,
            cache: build_cache_settings(cache)?,
            mail: build_mail_settings(mail)?,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());

    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }

    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.host", reason))?;

    let graceful_secs = server
        .graceful_shutdown_seconds
        .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS);
    if graceful_secs == 0 {
        return Err(LoadError::invalid(
            "server.graceful_shutdown_seconds",
            "must be greater than zero",
        ));
    }

    Ok(ServerSettings {
        addr,
        graceful_shutdown: Duration::from_secs(graceful_secs),
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_database_settings(database: RawDatabaseSettings) -> Result<DatabaseSettings, LoadError> {
    let max = database
        .max_connections
        .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS);

    Ok(DatabaseSettings {
        url: non_blank(database.url),
        max_connections: non_zero_u32(max.into(), "database.max_connections")?,
    })
}

fn build_auth_settings(auth: RawAuthSettings) -> Result<AuthSettings, LoadError> {
    let admin_password = auth
        .admin_password
        .filter(|value| !value.is_empty())
        .ok_or_else(|| LoadError::invalid("auth.admin_password", "must be set"))?;

    let token_secret = auth
        .token_secret
        .ok_or_else(|| LoadError::invalid("auth.token_secret", "must be set"))?;
    if token_secret.len() < MIN_TOKEN_SECRET_BYTES {
        return Err(LoadError::invalid(
            "auth.token_secret",
            format!("must be at least {MIN_TOKEN_SECRET_BYTES} bytes"),
        ));
    }

    let ttl_hours = auth.session_ttl_hours.unwrap_or(DEFAULT_SESSION_TTL_HOURS);
    if ttl_hours == 0 {
        return Err(LoadError::invalid(
            "auth.session_ttl_hours",
            "must be greater than zero",
        ));
    }
    let ttl_hours = i64::try_from(ttl_hours)
        .map_err(|_| LoadError::invalid("auth.session_ttl_hours", "value out of range"))?;

    Ok(AuthSettings {
        admin_password,
        token_secret,
        session_ttl: time::Duration::hours(ttl_hours),
        secure_cookie: auth.secure_cookie.unwrap_or(true),
    })
}

fn build_rate_limit_settings(
    rate_limit: RawRateLimitSettings,
) -> Result<RateLimitSettings, LoadError> {
    let default = WindowSettings {
        window_seconds: non_zero_u32(
            rate_limit
                .window_seconds
                .unwrap_or(DEFAULT_RATE_LIMIT_WINDOW_SECS),
            "rate_limit.window_seconds",
        )?,
        max_requests: non_zero_u32(
            rate_limit
                .max_requests
                .unwrap_or(DEFAULT_RATE_LIMIT_MAX_REQUESTS),
            "rate_limit.max_requests",
        )?,
    };

    let sweep_secs = rate_limit
        .sweep_interval_seconds
        .unwrap_or(DEFAULT_RATE_LIMIT_SWEEP_SECS);
    if sweep_secs == 0 {
        return Err(LoadError::invalid(
            "rate_limit.sweep_interval_seconds",
            "must be greater than zero",
        ));
    }

    let routes = rate_limit
        .routes
        .unwrap_or_else(default_route_limits)
        .into_iter()
        .map(build_route_limit)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(RateLimitSettings {
        default,
        sweep_interval: Duration::from_secs(sweep_secs),
        trust_forwarded_headers: rate_limit.trust_forwarded_headers.unwrap_or(false),
        routes,
    })
}

fn build_route_limit(route: RawRouteLimit) -> Result<RouteLimitSettings, LoadError> {
    let prefix = route.prefix.trim().to_string();
    if !prefix.starts_with('/') {
        return Err(LoadError::invalid(
            "rate_limit.routes.prefix",
            format!("`{prefix}` must start with `/`"),
        ));
    }

    let methods = route
        .methods
        .iter()
        .map(|name| {
            Method::from_bytes(name.trim().to_ascii_uppercase().as_bytes()).map_err(|err| {
                LoadError::invalid(
                    "rate_limit.routes.methods",
                    format!("`{name}` is not an HTTP method: {err}"),
                )
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(RouteLimitSettings {
        prefix,
        methods,
        window: WindowSettings {
            window_seconds: non_zero_u32(route.window_seconds, "rate_limit.routes.window_seconds")?,
            max_requests: non_zero_u32(route.max_requests, "rate_limit.routes.max_requests")?,
        },
    })
}

/// Built-in table used when no `rate_limit.routes` are configured.
fn default_route_limits() -> Vec<RawRouteLimit> {
    vec![
        RawRouteLimit {
            prefix: "/api/contact".to_string(),
            methods: vec!["POST".to_string()],
            window_seconds: 60,
            max_requests: 5,
        },
        RawRouteLimit {
            prefix: "/api/auth".to_string(),
            methods: Vec::new(),
            window_seconds: 900,
            max_requests: 10,
        },
    ]
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let ttl_secs = cache.default_ttl_seconds.unwrap_or(DEFAULT_CACHE_TTL_SECS);
    if ttl_secs == 0 {
        return Err(LoadError::invalid(
            "cache.default_ttl_seconds",
            "must be greater than zero",
        ));
    }

    let max_entries = NonZeroUsize::new(cache.max_entries.unwrap_or(DEFAULT_CACHE_MAX_ENTRIES))
        .ok_or_else(|| LoadError::invalid("cache.max_entries", "must be greater than zero"))?;

    let mut ttl_overrides = HashMap::with_capacity(cache.ttl_overrides.len());
    for (collection, seconds) in cache.ttl_overrides {
        if seconds == 0 {
            return Err(LoadError::invalid(
                "cache.ttl_overrides",
                format!("`{collection}` must be greater than zero"),
            ));
        }
        ttl_overrides.insert(collection, Duration::from_secs(seconds));
    }

    Ok(CacheSettings {
        enabled: cache.enabled.unwrap_or(true),
        default_ttl: Duration::from_secs(ttl_secs),
        max_entries,
        ttl_overrides,
    })
}

fn build_mail_settings(mail: RawMailSettings) -> Result<MailSettings, LoadError> {
    let transport = match (non_blank(mail.endpoint), non_blank(mail.api_key)) {
        (Some(endpoint), Some(api_key)) => {
            let endpoint = Url::parse(&endpoint).map_err(|err| {
                LoadError::invalid("mail.endpoint", format!("failed to parse: {err}"))
            })?;
            Some(MailTransport { endpoint, api_key })
        }
        (Some(_), None) => {
            return Err(LoadError::invalid(
                "mail.api_key",
                "must be set when mail.endpoint is configured",
            ));
        }
        _ => None,
    };

    Ok(MailSettings {
        transport,
        from: non_blank(mail.from).unwrap_or_else(|| DEFAULT_MAIL_FROM.to_string()),
        admin_address: non_blank(mail.admin_address),
        signature: non_blank(mail.signature).unwrap_or_else(|| DEFAULT_MAIL_SIGNATURE.to_string()),
        auto_reply: mail.auto_reply.unwrap_or(true),
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDatabaseSettings {
    url: Option<String>,
    max_connections: Option<u32>,
}

#[derive(Clone, Deserialize, Default)]
#[serde(default)]
struct RawAuthSettings {
    admin_password: Option<String>,
    token_secret: Option<String>,
    session_ttl_hours: Option<u64>,
    secure_cookie: Option<bool>,
}

impl std::fmt::Debug for RawAuthSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawAuthSettings")
            .field("session_ttl_hours", &self.session_ttl_hours)
            .field("secure_cookie", &self.secure_cookie)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRateLimitSettings {
    window_seconds: Option<u64>,
    max_requests: Option<u64>,
    sweep_interval_seconds: Option<u64>,
    trust_forwarded_headers: Option<bool>,
    routes: Option<Vec<RawRouteLimit>>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawRouteLimit {
    prefix: String,
    #[serde(default)]
    methods: Vec<String>,
    window_seconds: u64,
    max_requests: u64,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    enabled: Option<bool>,
    default_ttl_seconds: Option<u64>,
    max_entries: Option<usize>,
    ttl_overrides: HashMap<String, u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawMailSettings {
    endpoint: Option<String>,
    api_key: Option<String>,
    from: Option<String>,
    admin_address: Option<String>,
    signature: Option<String>,
    auto_reply: Option<bool>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

#[cfg(test)]
mod tests;
