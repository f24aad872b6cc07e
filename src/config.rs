//! Session settings and the named-section resolver that produces them.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value as JsonValue;
use tracing::debug;

use crate::driver::Driver;
use crate::error::SqlSessionError;
use crate::liveness::{IdleBudget, IdlePolicy};
use crate::session::DatabaseSession;
use crate::validate;

/// Character set negotiated on every (re)connect unless configured otherwise.
pub const DEFAULT_CHARSET: &str = "utf8mb4";

/// Resolved connection settings.
///
/// Deserializes from an object with the canonical key names; `password`, `charset`
/// and `idle_policy` may be omitted.
#[derive(Clone, PartialEq, Deserialize)]
pub struct SessionConfig {
    pub host: String,
    pub user: String,
    #[serde(default)]
    pub password: String,
    pub database: String,
    #[serde(default = "default_charset")]
    pub charset: String,
    #[serde(default)]
    pub idle_policy: IdlePolicy,
}

fn default_charset() -> String {
    DEFAULT_CHARSET.to_owned()
}

impl SessionConfig {
    #[must_use]
    pub fn new(
        host: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
        database: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            user: user.into(),
            password: password.into(),
            database: database.into(),
            charset: DEFAULT_CHARSET.to_owned(),
            idle_policy: IdlePolicy::default(),
        }
    }

    #[must_use]
    pub fn builder(
        host: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
        database: impl Into<String>,
    ) -> SessionConfigBuilder {
        SessionConfigBuilder {
            cfg: Self::new(host, user, password, database),
        }
    }

    /// Check every field against its validator.
    ///
    /// # Errors
    ///
    /// Returns `SqlSessionError::ConfigError` naming every invalid field.
    pub fn validate(&self) -> Result<(), SqlSessionError> {
        let mut problems = Vec::new();
        if !validate::is_valid_host(&self.host) {
            problems.push(format!("host `{}` is invalid", self.host));
        }
        if !validate::is_valid_user(&self.user) {
            problems.push(format!("user `{}` is invalid", self.user));
        }
        if !validate::is_valid_password(&self.password) {
            problems.push("password is invalid".to_owned());
        }
        if !validate::is_valid_database_name(&self.database) {
            problems.push(format!("database `{}` is invalid", self.database));
        }
        if !validate::is_valid_charset(&self.charset) {
            problems.push(format!("charset `{}` is invalid", self.charset));
        }
        if !self.idle_policy.is_valid() {
            problems.push(format!(
                "idle policy {:?} is invalid",
                self.idle_policy.budget
            ));
        }
        if problems.is_empty() {
            Ok(())
        } else {
            Err(SqlSessionError::ConfigError(problems.join("; ")))
        }
    }

    /// Build a config from the output of [`ConfigResolver::for_database`].
    ///
    /// # Errors
    ///
    /// Returns `SqlSessionError::ConfigError` if a required key is absent or a numeric
    /// key does not parse.
    pub fn from_settings(settings: &ResolvedSettings) -> Result<Self, SqlSessionError> {
        let mut cfg = Self::new(
            settings.require("host")?,
            settings.require("user")?,
            settings.get("password").unwrap_or_default(),
            settings.require("database")?,
        );
        if let Some(charset) = settings.get("charset") {
            charset.clone_into(&mut cfg.charset);
        }
        if let Some(fraction) = settings.get("idle_fraction") {
            let fraction: f64 = fraction.parse().map_err(|e| {
                SqlSessionError::ConfigError(format!("idle_fraction `{fraction}`: {e}"))
            })?;
            cfg.idle_policy.budget = IdleBudget::Fraction(fraction);
        }
        if let Some(secs) = settings.get("idle_fallback_secs") {
            let secs: u64 = secs.parse().map_err(|e| {
                SqlSessionError::ConfigError(format!("idle_fallback_secs `{secs}`: {e}"))
            })?;
            cfg.idle_policy.fallback = Duration::from_secs(secs);
        }
        Ok(cfg)
    }

    /// Resolve `section` out of a JSON settings document, applying `overrides`.
    ///
    /// # Errors
    ///
    /// Returns `SqlSessionError::ConfigError` if resolution or validation fails.
    pub fn from_section(
        document: &JsonValue,
        section: &str,
        overrides: &[(&str, &str)],
    ) -> Result<Self, SqlSessionError> {
        let mut resolver = ConfigResolver::for_database(section);
        for (key, value) in overrides {
            resolver = resolver.with_override(*key, *value);
        }
        let cfg = Self::from_settings(&resolver.resolve(document)?)?;
        cfg.validate()?;
        Ok(cfg)
    }
}

impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfig")
            .field("host", &self.host)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("database", &self.database)
            .field("charset", &self.charset)
            .field("idle_policy", &self.idle_policy)
            .finish()
    }
}

/// Fluent builder for [`SessionConfig`].
#[derive(Debug, Clone)]
pub struct SessionConfigBuilder {
    cfg: SessionConfig,
}

impl SessionConfigBuilder {
    #[must_use]
    pub fn charset(mut self, charset: impl Into<String>) -> Self {
        self.cfg.charset = charset.into();
        self
    }

    #[must_use]
    pub fn idle_policy(mut self, policy: IdlePolicy) -> Self {
        self.cfg.idle_policy = policy;
        self
    }

    #[must_use]
    pub fn finish(self) -> SessionConfig {
        self.cfg
    }

    /// Open a session with these settings.
    ///
    /// # Errors
    ///
    /// Returns `SqlSessionError` if validation or the initial connect fails.
    pub fn connect<D: Driver>(self, driver: D) -> Result<DatabaseSession<D>, SqlSessionError> {
        DatabaseSession::connect(driver, self.finish())
    }
}

/// Validator applied to a resolved value.
pub type Validator = fn(&str) -> bool;

/// One key the resolver looks for.
#[derive(Debug, Clone, Copy)]
pub struct KeySpec {
    pub canonical: &'static str,
    /// Accepted alternate spellings, checked in order after the canonical key.
    pub aliases: &'static [&'static str],
    pub required: bool,
    pub validator: Validator,
}

impl KeySpec {
    #[must_use]
    pub const fn required(
        canonical: &'static str,
        aliases: &'static [&'static str],
        validator: Validator,
    ) -> Self {
        Self {
            canonical,
            aliases,
            required: true,
            validator,
        }
    }

    #[must_use]
    pub const fn optional(
        canonical: &'static str,
        aliases: &'static [&'static str],
        validator: Validator,
    ) -> Self {
        Self {
            canonical,
            aliases,
            required: false,
            validator,
        }
    }

    fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        std::iter::once(self.canonical).chain(self.aliases.iter().copied())
    }
}

fn is_fraction(value: &str) -> bool {
    value
        .parse::<f64>()
        .is_ok_and(|f| f.is_finite() && f > 0.0 && f <= 1.0)
}

fn is_seconds(value: &str) -> bool {
    value.parse::<u64>().is_ok()
}

/// Keys understood by [`SessionConfig::from_settings`].
pub const DATABASE_KEYS: &[KeySpec] = &[
    KeySpec::required("host", &["hostname", "server"], validate::is_valid_host),
    KeySpec::required("user", &["username", "login"], validate::is_valid_user),
    KeySpec::optional("password", &["pass", "pwd"], validate::is_valid_password),
    KeySpec::required("database", &["dbname", "db", "name"], validate::is_valid_database_name),
    KeySpec::optional("charset", &["encoding"], validate::is_valid_charset),
    KeySpec::optional("idle_fraction", &[], is_fraction),
    KeySpec::optional("idle_fallback_secs", &["wait_timeout"], is_seconds),
];

/// Values produced by [`ConfigResolver::resolve`], keyed by canonical name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedSettings {
    values: HashMap<String, String>,
}

impl ResolvedSettings {
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// # Errors
    ///
    /// Returns `SqlSessionError::ConfigError` if `key` was not resolved.
    pub fn require(&self, key: &str) -> Result<&str, SqlSessionError> {
        self.get(key)
            .ok_or_else(|| SqlSessionError::ConfigError(format!("missing required key `{key}`")))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Resolves a named settings section against a list of key specs.
///
/// Lookup order per key: direct override, canonical key in the section, then aliases.
#[derive(Debug, Clone)]
pub struct ConfigResolver {
    section: String,
    keys: Vec<KeySpec>,
    overrides: HashMap<String, String>,
}

impl ConfigResolver {
    #[must_use]
    pub fn new(section: impl Into<String>) -> Self {
        Self {
            section: section.into(),
            keys: Vec::new(),
            overrides: HashMap::new(),
        }
    }

    /// Resolver preloaded with [`DATABASE_KEYS`].
    #[must_use]
    pub fn for_database(section: impl Into<String>) -> Self {
        let mut resolver = Self::new(section);
        resolver.keys.extend_from_slice(DATABASE_KEYS);
        resolver
    }

    #[must_use]
    pub fn key(mut self, spec: KeySpec) -> Self {
        self.keys.push(spec);
        self
    }

    /// Supply a value directly; `key` may be canonical or an alias.
    #[must_use]
    pub fn with_override(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.overrides.insert(key.into(), value.into());
        self
    }

    /// # Errors
    ///
    /// Returns `SqlSessionError::ConfigError` listing every missing or invalid key.
    pub fn resolve(&self, document: &JsonValue) -> Result<ResolvedSettings, SqlSessionError> {
        let section = match document.get(&self.section) {
            Some(JsonValue::Object(map)) => Some(map),
            Some(_) => {
                return Err(SqlSessionError::ConfigError(format!(
                    "section `{}` is not an object",
                    self.section
                )));
            }
            None => None,
        };

        for key in self.overrides.keys() {
            if !self.keys.iter().any(|spec| spec.names().any(|n| n == key)) {
                return Err(SqlSessionError::ConfigError(format!(
                    "override for unknown key `{key}`"
                )));
            }
        }

        let mut values = HashMap::new();
        let mut problems = Vec::new();
        for spec in &self.keys {
            let from_override = spec
                .names()
                .find_map(|name| self.overrides.get(name).cloned());
            let found = match from_override {
                Some(v) => Some(Ok(v)),
                None => section.and_then(|map| {
                    spec.names()
                        .find_map(|name| map.get(name))
                        .map(scalar_to_string)
                }),
            };
            match found {
                Some(Ok(value)) if (spec.validator)(&value) => {
                    values.insert(spec.canonical.to_owned(), value);
                }
                Some(Ok(_)) => problems.push(format!("`{}` failed validation", spec.canonical)),
                Some(Err(kind)) => {
                    problems.push(format!("`{}` must be a scalar, found {kind}", spec.canonical));
                }
                None if spec.required => {
                    problems.push(format!("missing required key `{}`", spec.canonical));
                }
                None => {}
            }
        }

        if section.is_none() && !problems.is_empty() {
            problems.insert(0, format!("section `{}` not found", self.section));
        }
        if !problems.is_empty() {
            return Err(SqlSessionError::ConfigError(problems.join("; ")));
        }
        debug!(section = %self.section, keys = values.len(), "resolved settings");
        Ok(ResolvedSettings { values })
    }

    /// # Errors
    ///
    /// Returns `SqlSessionError::ConfigError` if `json` does not parse or resolution fails.
    pub fn resolve_str(&self, json: &str) -> Result<ResolvedSettings, SqlSessionError> {
        let document: JsonValue = serde_json::from_str(json)
            .map_err(|e| SqlSessionError::ConfigError(format!("invalid settings JSON: {e}")))?;
        self.resolve(&document)
    }

    /// # Errors
    ///
    /// Returns `SqlSessionError::ConfigError` if the file cannot be read or resolved.
    pub fn resolve_file(
        &self,
        path: impl AsRef<Path>,
    ) -> Result<ResolvedSettings, SqlSessionError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            SqlSessionError::ConfigError(format!("cannot read {}: {e}", path.display()))
        })?;
        self.resolve_str(&text)
    }
}

fn scalar_to_string(value: &JsonValue) -> Result<String, &'static str> {
    match value {
        JsonValue::String(s) => Ok(s.clone()),
        JsonValue::Number(n) => Ok(n.to_string()),
        JsonValue::Bool(b) => Ok(b.to_string()),
        JsonValue::Null => Err("null"),
        JsonValue::Array(_) => Err("an array"),
        JsonValue::Object(_) => Err("an object"),
    }
}
