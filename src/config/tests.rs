use std::io::Write;

use super::*;

const SECRET: &str = "0123456789abcdef0123456789abcdef";

fn raw_with_auth() -> RawSettings {
    let mut raw = RawSettings::default();
    raw.auth.admin_password = Some("hunter2".to_string());
    raw.auth.token_secret = Some(SECRET.to_string());
    raw
}

fn config_file(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("temp file");
    file.write_all(contents.as_bytes()).expect("write config");
    file
}

#[test]
fn cli_overrides_take_highest_precedence() {
    let mut raw = raw_with_auth();
    raw.server.port = Some(4000);
    raw.logging.level = Some("info".to_string());

    let overrides = ServeOverrides {
        server_port: Some(4321),
        log_level: Some("debug".to_string()),
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.server.addr.port(), 4321);
    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
}

#[test]
fn cli_json_logging_enforces_format() {
    let mut raw = raw_with_auth();
    let overrides = ServeOverrides {
        log_json: Some(true),
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert!(matches!(settings.logging.format, LogFormat::Json));
}

#[test]
fn admin_password_is_required() {
    let mut raw = raw_with_auth();
    raw.auth.admin_password = None;

    let err = Settings::from_raw(raw).expect_err("missing password");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "auth.admin_password",
            ..
        }
    ));
}

#[test]
fn short_token_secret_is_rejected() {
    let mut raw = raw_with_auth();
    raw.auth.token_secret = Some("too-short".to_string());

    let err = Settings::from_raw(raw).expect_err("short secret");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "auth.token_secret",
            ..
        }
    ));
}

#[test]
fn defaults_cover_session_and_sensitive_routes() {
    let settings = Settings::from_raw(raw_with_auth()).expect("valid settings");

    assert_eq!(settings.auth.session_ttl, time::Duration::hours(24));
    assert!(settings.auth.secure_cookie);
    assert_eq!(settings.rate_limit.sweep_interval, Duration::from_secs(60));

    let contact = settings
        .rate_limit
        .routes
        .iter()
        .find(|route| route.prefix == "/api/contact")
        .expect("contact rule");
    assert_eq!(contact.methods, vec![Method::POST]);
    assert_eq!(contact.window.max_requests.get(), 5);
    assert_eq!(contact.window.window_seconds.get(), 60);

    let auth = settings
        .rate_limit
        .routes
        .iter()
        .find(|route| route.prefix == "/api/auth")
        .expect("auth rule");
    assert!(auth.methods.is_empty());
    assert_eq!(auth.window.max_requests.get(), 10);
    assert_eq!(auth.window.window_seconds.get(), 900);
}

#[test]
fn forwarded_headers_are_untrusted_unless_enabled() {
    let settings = Settings::from_raw(raw_with_auth()).expect("valid settings");
    assert!(!settings.rate_limit.trust_forwarded_headers);

    let args = CliArgs::parse_from(["portfolio", "serve", "--trust-forwarded-headers"]);
    let Some(Command::Serve(serve)) = args.command else {
        panic!("serve command expected");
    };
    assert_eq!(serve.overrides.rate_limit_trust_forwarded_headers, Some(true));

    let mut raw = raw_with_auth();
    raw.apply_serve_overrides(&serve.overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");
    assert!(settings.rate_limit.trust_forwarded_headers);
}

#[test]
fn zero_window_is_rejected() {
    let mut raw = raw_with_auth();
    raw.rate_limit.window_seconds = Some(0);
    assert!(Settings::from_raw(raw).is_err());
}

#[test]
fn mail_endpoint_requires_api_key() {
    let mut raw = raw_with_auth();
    raw.mail.endpoint = Some("https://mail.example.com/send".to_string());

    let err = Settings::from_raw(raw).expect_err("missing api key");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "mail.api_key",
            ..
        }
    ));
}

#[test]
fn blank_database_url_means_in_memory() {
    let mut raw = raw_with_auth();
    raw.database.url = Some("   ".to_string());
    let settings = Settings::from_raw(raw).expect("valid settings");
    assert!(settings.database.url.is_none());
}

#[test]
fn config_file_supplies_routes_and_cache_overrides() {
    let file = config_file(&format!(
        r#"
[auth]
admin_password = "from-file"
token_secret = "{SECRET}"
secure_cookie = false

[cache]
default_ttl_seconds = 30

[cache.ttl_overrides]
blog_posts = 300

[[rate_limit.routes]]
prefix = "/api/contact"
methods = ["post"]
window_seconds = 120
max_requests = 3
"#
    ));

    let args = CliArgs::parse_from([
        "portfolio",
        "--config-file",
        file.path().to_str().expect("utf-8 path"),
        "serve",
        "--port",
        "8088",
    ]);
    let settings = load(&args).expect("settings load");

    assert_eq!(settings.auth.admin_password, "from-file");
    assert!(!settings.auth.secure_cookie);
    assert_eq!(settings.server.addr.port(), 8088);
    assert_eq!(settings.cache.default_ttl, Duration::from_secs(30));
    assert_eq!(
        settings.cache.ttl_overrides.get("blog_posts"),
        Some(&Duration::from_secs(300))
    );
    assert_eq!(settings.rate_limit.routes.len(), 1);
    assert_eq!(settings.rate_limit.routes[0].methods, vec![Method::POST]);
    assert_eq!(settings.rate_limit.routes[0].window.max_requests.get(), 3);
}

#[test]
fn invalid_route_method_fails_to_load() {
    let file = config_file(&format!(
        r#"
[auth]
admin_password = "from-file"
token_secret = "{SECRET}"

[[rate_limit.routes]]
prefix = "/api/contact"
methods = ["not a method"]
window_seconds = 60
max_requests = 5
"#
    ));

    let args = CliArgs::parse_from([
        "portfolio",
        "--config-file",
        file.path().to_str().expect("utf-8 path"),
    ]);
    let err = load(&args).expect_err("bad method");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "rate_limit.routes.methods",
            ..
        }
    ));
}

#[test]
fn missing_config_file_is_an_error() {
    let args = CliArgs::parse_from([
        "portfolio",
        "--config-file",
        "/nonexistent/portfolio-config.toml",
    ]);
    assert!(matches!(load(&args), Err(LoadError::Build(_))));
}

#[test]
fn default_to_serve_command() {
    let args = CliArgs::parse_from(["portfolio"]);
    let command = args
        .command
        .unwrap_or(Command::Serve(Box::<ServeArgs>::default()));
    assert!(matches!(command, Command::Serve(_)));
}

#[test]
fn parse_serve_arguments() {
    let args = CliArgs::parse_from([
        "portfolio",
        "serve",
        "--database-url",
        "postgres://example",
        "--log-json",
        "--cache-enabled",
        "false",
    ]);

    match args.command.expect("serve command") {
        Command::Serve(serve) => {
            assert_eq!(
                serve.overrides.database.database_url.as_deref(),
                Some("postgres://example")
            );
            assert_eq!(serve.overrides.log_json, Some(true));
            assert_eq!(serve.overrides.cache_enabled, Some(false));
        }
        _ => panic!("wrong command parsed"),
    }
}

#[test]
fn parse_migrate_arguments() {
    let args = CliArgs::parse_from([
        "portfolio",
        "migrate",
        "--database-url",
        "postgres://example",
    ]);

    match args.command.expect("migrate command") {
        Command::Migrate(migrate) => {
            assert_eq!(
                migrate.database.database_url.as_deref(),
                Some("postgres://example")
            );
        }
        _ => panic!("wrong command parsed"),
    }
}
