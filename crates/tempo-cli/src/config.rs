//! Environment configuration for the `tempo` binary.
//!
//! Values come from the process environment, after an optional `.env` file in
//! the current directory has been loaded with `dotenvy`.

/// Runtime settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// `DATABASE_URL`, required by every command that connects
    pub database_url: Option<String>,
    /// `TEMPO_SCHEMA`, default `public`
    pub schema: String,
    /// `TEMPO_LOCK`, default `true`
    pub lock: bool,
    /// `TEMPO_LEDGER`, default `true`
    pub ledger: bool,
}

impl Config {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through `lookup`, which returns the value of an
    /// environment variable if it is set.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let database_url = lookup("DATABASE_URL").filter(|url| !url.trim().is_empty());

        let schema = lookup("TEMPO_SCHEMA").unwrap_or_else(|| "public".to_string());
        if schema.trim().is_empty() {
            return Err(ConfigError::EmptySchema);
        }

        Ok(Self {
            database_url,
            schema,
            lock: flag(&lookup, "TEMPO_LOCK", true)?,
            ledger: flag(&lookup, "TEMPO_LEDGER", true)?,
        })
    }

    /// The connection URL, or an error naming the missing variable.
    pub fn database_url(&self) -> Result<&str, ConfigError> {
        self.database_url
            .as_deref()
            .ok_or(ConfigError::MissingDatabaseUrl)
    }
}

fn flag(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: bool,
) -> Result<bool, ConfigError> {
    let Some(value) = lookup(key) else {
        return Ok(default);
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidFlag { key, value }),
    }
}

/// Errors that can occur when reading configuration.
#[derive(Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// `DATABASE_URL` is unset and no `--database-url` was given
    MissingDatabaseUrl,
    /// `TEMPO_SCHEMA` is set but blank
    EmptySchema,
    /// A boolean variable has an unrecognized value
    InvalidFlag { key: &'static str, value: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::MissingDatabaseUrl => write!(
                f,
                "DATABASE_URL is not set; export it or pass --database-url"
            ),
            ConfigError::EmptySchema => write!(f, "TEMPO_SCHEMA is set but empty"),
            ConfigError::InvalidFlag { key, value } => {
                write!(f, "{} must be true or false, got {:?}", key, value)
            }
        }
    }
}

impl std::error::Error for ConfigError {}
