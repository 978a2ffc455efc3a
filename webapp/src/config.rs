use crate::error::AppError;
use crate::gate::ProtectedEndpoints;
use crate::security::SecureString;
use clap::Parser;
use config::Source;
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use tracing::{debug, error, warn};

/// Keys without which the application refuses to start
pub const REQUIRED_KEYS: [&str; 3] = ["aad.authority", "aad.client_id", "aad.scopes"];

const DEFAULT_CONFIG_FILE: &str = "authentication.toml";
const ENV_PREFIX: &str = "WEBAPP";
const DEFAULT_REDIRECT_URI: &str = "http://localhost:8080/auth/redirect";
const DEFAULT_GRAPH_ENDPOINT: &str = "https://graph.microsoft.com/v1.0";
const DEFAULT_HOME_PAGE: &str = "http://localhost:8080";
const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_STATE_TTL_SECS: u64 = 600;
const DEFAULT_SESSION_TTL_SECS: u64 = 3600;
/// Upper bound for `app.state_ttl` / `app.session_ttl` (one year)
pub const MAX_TTL_SECS: u64 = 365 * 24 * 3600;

/// CLI arguments structure for clap
#[derive(Debug, Default, Parser)]
#[command(name = "aad-webapp")]
#[command(about = "Web application protected by Azure AD authorization-code login")]
pub struct CliArgs {
    /// Path to the authentication properties file (TOML or YAML)
    #[arg(long)]
    pub config_file: Option<PathBuf>,

    /// Socket address to listen on (overrides app.listen_addr)
    #[arg(long)]
    pub listen_addr: Option<String>,

    /// Logging level: trace, debug, info, warn, error (overrides logging.level)
    #[arg(long)]
    pub log_level: Option<String>,
}

/// Flat `section.key` view over the authentication properties.
///
/// Values come from the properties file overlaid by `WEBAPP_`-prefixed
/// environment variables (`WEBAPP_AAD__CLIENT_ID` -> `aad.client_id`).
#[derive(Debug, Clone, Default)]
pub struct Properties {
    values: HashMap<String, String>,
}

impl Properties {
    /// Load the properties file (if any) and the environment overlay.
    pub fn load(path: Option<&Path>) -> Result<Self, AppError> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            if !path.exists() {
                return Err(AppError::Config(format!(
                    "Config file not found: {}",
                    path.display()
                )));
            }
            let format = match path.extension().and_then(|s| s.to_str()) {
                Some("yaml") | Some("yml") => config::FileFormat::Yaml,
                _ => config::FileFormat::Toml,
            };
            builder = builder.add_source(config::File::from(path).format(format));
        }

        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__"),
        );

        Self::from_settings(builder.build()?)
    }

    /// Parse properties from TOML text, without any environment overlay.
    pub fn from_toml_str(toml: &str) -> Result<Self, AppError> {
        let settings = config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()?;
        Self::from_settings(settings)
    }

    fn from_settings(settings: config::Config) -> Result<Self, AppError> {
        let mut values = HashMap::new();
        flatten_into(&mut values, "", settings.collect()?);
        Ok(Self { values })
    }

    /// Look up a property.
    ///
    /// A missing required key is an error; a missing optional key logs a
    /// warning and yields an empty string.
    pub fn get_property(&self, key: &str) -> Result<String, AppError> {
        match self.values.get(key) {
            Some(value) => {
                debug!(key = key, "{} is {}", key, value);
                Ok(value.clone())
            }
            None if REQUIRED_KEYS.contains(&key) => {
                error!(key = key, "FATAL: could not load required key {} from config", key);
                Err(AppError::MissingRequiredConfig(key.to_string()))
            }
            None => {
                warn!(key = key, "Could not load {}!", key);
                Ok(String::new())
            }
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }
}

fn flatten_into(out: &mut HashMap<String, String>, prefix: &str, table: config::Map<String, config::Value>) {
    for (key, value) in table {
        let full_key = if prefix.is_empty() {
            key
        } else {
            format!("{}.{}", prefix, key)
        };

        if let Ok(nested) = value.clone().into_table() {
            flatten_into(out, &full_key, nested);
            continue;
        }

        match value.into_string() {
            Ok(s) => {
                out.insert(full_key, s);
            }
            Err(e) => warn!(key = %full_key, error = %e, "Ignoring non-scalar property"),
        }
    }
}

/// Application configuration, built once at start and shared read-only.
pub struct Config {
    /// Authority base URL, always ending in `/`
    pub authority: String,
    pub client_id: String,
    pub client_secret: SecureString,
    pub scopes: Vec<String>,
    pub version: String,
    pub redirect_uri: String,
    pub sign_out_endpoint: String,
    pub post_sign_out_fragment: String,
    pub graph_endpoint: String,
    pub home_page: String,
    pub protected_endpoints: ProtectedEndpoints,
    pub state_ttl_secs: u64,
    pub session_ttl_secs: u64,
    pub listen_addr: String,
    pub log_level: String,
}

impl Config {
    /// Load configuration with precedence: CLI args > env vars > properties file > defaults
    ///
    /// The properties file is `--config-file`, else `WEBAPP_CONFIG_FILE`, else
    /// `authentication.toml` in the working directory when it exists.
    pub fn load(cli_args: &CliArgs) -> Result<Config, AppError> {
        // .env never overrides variables already set in the environment
        dotenv::dotenv().ok();

        let config_path = cli_args
            .config_file
            .clone()
            .or_else(|| env::var(format!("{}_CONFIG_FILE", ENV_PREFIX)).ok().map(PathBuf::from))
            .or_else(|| {
                let default = PathBuf::from(DEFAULT_CONFIG_FILE);
                default.exists().then_some(default)
            });

        let properties = Properties::load(config_path.as_deref())?;
        let mut config = Self::from_properties(&properties)?;

        if let Some(listen_addr) = &cli_args.listen_addr {
            config.listen_addr = listen_addr.clone();
        }
        if let Some(log_level) = &cli_args.log_level {
            config.log_level = log_level.clone();
        }

        Ok(config)
    }

    pub fn from_properties(props: &Properties) -> Result<Config, AppError> {
        let mut authority = props.get_property("aad.authority")?;
        if !authority.ends_with('/') {
            authority.push('/');
        }
        let client_id = props.get_property("aad.client_id")?;
        let scopes: Vec<String> = props
            .get_property("aad.scopes")?
            .split_whitespace()
            .map(str::to_string)
            .collect();

        let version = props.get_property("aad.version")?;
        let client_secret = SecureString::from(props.get_property("aad.secret")?);
        let redirect_uri = or_default(props.get_property("aad.redirect_uri")?, DEFAULT_REDIRECT_URI);
        let sign_out_endpoint = or_default(
            props.get_property("aad.sign_out_endpoint")?,
            &format!("{}oauth2/v2.0/logout", authority),
        );
        let post_sign_out_fragment = props.get_property("aad.post_sign_out_fragment")?;
        let graph_endpoint = or_default(props.get_property("aad.graph_endpoint")?, DEFAULT_GRAPH_ENDPOINT)
            .trim_end_matches('/')
            .to_string();
        let home_page = or_default(props.get_property("app.home_page")?, DEFAULT_HOME_PAGE)
            .trim_end_matches('/')
            .to_string();
        let protected_endpoints = ProtectedEndpoints::parse(&props.get_property("app.protect.authenticated")?);
        let state_ttl_secs = parse_secs(props, "app.state_ttl", DEFAULT_STATE_TTL_SECS)?;
        let session_ttl_secs = parse_secs(props, "app.session_ttl", DEFAULT_SESSION_TTL_SECS)?;
        let listen_addr = or_default(props.get_property("app.listen_addr")?, DEFAULT_LISTEN_ADDR);
        let log_level = or_default(props.get_property("logging.level")?, "info");

        Ok(Config {
            authority,
            client_id,
            client_secret,
            scopes,
            version,
            redirect_uri,
            sign_out_endpoint,
            post_sign_out_fragment,
            graph_endpoint,
            home_page,
            protected_endpoints,
            state_ttl_secs,
            session_ttl_secs,
            listen_addr,
            log_level,
        })
    }
}

fn or_default(value: String, default: &str) -> String {
    if value.is_empty() {
        default.to_string()
    } else {
        value
    }
}

fn parse_secs(props: &Properties, key: &str, default: u64) -> Result<u64, AppError> {
    let raw = props.get_property(key)?;
    if raw.is_empty() {
        return Ok(default);
    }
    let secs = raw
        .trim()
        .parse::<u64>()
        .map_err(|_| AppError::Config(format!("{} must be a whole number of seconds, got {:?}", key, raw)))?;
    if secs > MAX_TTL_SECS {
        return Err(AppError::Config(format!(
            "{} must be at most {} seconds, got {}",
            key, MAX_TTL_SECS, secs
        )));
    }
    Ok(secs)
}
