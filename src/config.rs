//! Configuration types for media-pipeline
//!
//! Three layers live here:
//! - [`Settings`], the flat key/value store consulted at construction time
//! - [`PipelineClass`], the declared identity and attribute overrides of a pipeline
//! - [`PipelineConfig`], the immutable values resolved from the two above

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{collections::HashMap, time::Duration};

/// Name of the base files pipeline; class-prefixed keys are ignored for it
pub const FILES_PIPELINE_NAME: &str = "FilesPipeline";

/// Base name used when resolving media-level keys such as `MEDIA_ALLOW_REDIRECTS`
pub const MEDIA_PIPELINE_NAME: &str = "MediaPipeline";

/// Built-in expiry window in days
pub const DEFAULT_EXPIRES_DAYS: u32 = 90;

/// Built-in item field holding the URLs to download
pub const DEFAULT_FILES_URLS_FIELD: &str = "file_urls";

/// Built-in item field receiving the download results
pub const DEFAULT_FILES_RESULT_FIELD: &str = "files";

/// Settings keys understood by the pipeline and its stores
pub mod keys {
    /// Store URI (filesystem path, `file://`, `s3://`, `gs://`, `ftp://`)
    pub const FILES_STORE: &str = "FILES_STORE";
    /// Expiry window in days
    pub const FILES_EXPIRES: &str = "FILES_EXPIRES";
    /// Item field holding URLs
    pub const FILES_URLS_FIELD: &str = "FILES_URLS_FIELD";
    /// Item field receiving results
    pub const FILES_RESULT_FIELD: &str = "FILES_RESULT_FIELD";
    /// Whether the downloader may follow redirects for media requests
    pub const MEDIA_ALLOW_REDIRECTS: &str = "MEDIA_ALLOW_REDIRECTS";
    /// Canned ACL applied to S3 uploads
    pub const FILES_STORE_S3_ACL: &str = "FILES_STORE_S3_ACL";
    /// Predefined ACL applied to GCS uploads
    pub const FILES_STORE_GCS_ACL: &str = "FILES_STORE_GCS_ACL";
    /// AWS access key id
    pub const AWS_ACCESS_KEY_ID: &str = "AWS_ACCESS_KEY_ID";
    /// AWS secret access key
    pub const AWS_SECRET_ACCESS_KEY: &str = "AWS_SECRET_ACCESS_KEY";
    /// AWS session token
    pub const AWS_SESSION_TOKEN: &str = "AWS_SESSION_TOKEN";
    /// Custom S3-compatible endpoint (switches to path-style addressing)
    pub const AWS_ENDPOINT_URL: &str = "AWS_ENDPOINT_URL";
    /// AWS region
    pub const AWS_REGION_NAME: &str = "AWS_REGION_NAME";
    /// Use HTTPS for the default AWS endpoint
    pub const AWS_USE_SSL: &str = "AWS_USE_SSL";
    /// Google Cloud project id
    pub const GCS_PROJECT_ID: &str = "GCS_PROJECT_ID";
    /// OAuth2 bearer token for GCS
    pub const GCS_ACCESS_TOKEN: &str = "GCS_ACCESS_TOKEN";
    /// Custom GCS endpoint
    pub const GCS_ENDPOINT_URL: &str = "GCS_ENDPOINT_URL";
    /// FTP user when the URI has none
    pub const FTP_USER: &str = "FTP_USER";
    /// FTP password when the URI has none
    pub const FTP_PASSWORD: &str = "FTP_PASSWORD";
    /// Use active FTP mode
    pub const FEED_STORAGE_FTP_ACTIVE: &str = "FEED_STORAGE_FTP_ACTIVE";
}

/// Flat key/value settings store
///
/// Values are JSON values so settings can be loaded from a file or built in
/// code. A key mapped to `null` is treated as absent.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Settings {
    values: HashMap<String, Value>,
}

impl Settings {
    /// Create an empty settings store
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse settings from a JSON object
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Set a value, replacing any previous one
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.values.insert(key.into(), value.into());
        self
    }

    /// Builder-style [`set`](Self::set)
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    /// Raw value for `key`, `None` if absent or null
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key).filter(|v| !v.is_null())
    }

    /// Whether `key` holds a non-null value
    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// String value; numbers and booleans are rendered as text
    pub fn get_str(&self, key: &str) -> Result<Option<String>> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(Value::Number(n)) => Ok(Some(n.to_string())),
            Some(Value::Bool(b)) => Ok(Some(b.to_string())),
            Some(other) => Err(Error::config(
                key,
                format!("expected a string, got {}", json_type_name(other)),
            )),
        }
    }

    /// Integer value; numeric strings are accepted
    pub fn get_int(&self, key: &str) -> Result<Option<i64>> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::Number(n)) => n
                .as_i64()
                .map(Some)
                .ok_or_else(|| Error::config(key, format!("expected an integer, got {n}"))),
            Some(Value::String(s)) => s
                .trim()
                .parse::<i64>()
                .map(Some)
                .map_err(|_| Error::config(key, format!("expected an integer, got {s:?}"))),
            Some(other) => Err(Error::config(
                key,
                format!("expected an integer, got {}", json_type_name(other)),
            )),
        }
    }

    /// Boolean value; accepts `true`/`false`, `0`/`1` and their string forms
    pub fn get_bool(&self, key: &str) -> Result<Option<bool>> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::Bool(b)) => Ok(Some(*b)),
            Some(Value::Number(n)) => match n.as_i64() {
                Some(0) => Ok(Some(false)),
                Some(1) => Ok(Some(true)),
                _ => Err(Error::config(key, format!("expected a boolean, got {n}"))),
            },
            Some(Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" => Ok(Some(true)),
                "false" | "0" => Ok(Some(false)),
                _ => Err(Error::config(key, format!("expected a boolean, got {s:?}"))),
            },
            Some(other) => Err(Error::config(
                key,
                format!("expected a boolean, got {}", json_type_name(other)),
            )),
        }
    }
}

impl<K, V> FromIterator<(K, V)> for Settings
where
    K: Into<String>,
    V: Into<Value>,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Human-readable JSON type name used in error messages
pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "dict",
    }
}

/// Declared identity and attribute overrides of a files pipeline
///
/// This is the explicit counterpart of subclassing the base pipeline: `name`
/// selects which class-prefixed settings keys apply, and each `Some` field is
/// an attribute the "subclass" overrides. `None` means "inherit the base
/// default".
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PipelineClass {
    /// Class name; its uppercase form prefixes settings keys
    pub name: String,
    /// Overridden expiry window in days
    pub expires: Option<u32>,
    /// Overridden URL field name
    pub files_urls_field: Option<String>,
    /// Overridden result field name
    pub files_result_field: Option<String>,
    /// Replacement for the default URL field name
    pub default_files_urls_field: Option<String>,
    /// Replacement for the default result field name
    pub default_files_result_field: Option<String>,
    /// Overridden redirect policy
    pub allow_redirects: Option<bool>,
}

impl Default for PipelineClass {
    fn default() -> Self {
        Self::named(FILES_PIPELINE_NAME)
    }
}

impl PipelineClass {
    /// A pipeline class with the given name and no attribute overrides
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            expires: None,
            files_urls_field: None,
            files_result_field: None,
            default_files_urls_field: None,
            default_files_result_field: None,
            allow_redirects: None,
        }
    }

    /// Override the expiry window
    pub fn with_expires(mut self, days: u32) -> Self {
        self.expires = Some(days);
        self
    }

    /// Override the URL field name
    pub fn with_urls_field(mut self, field: impl Into<String>) -> Self {
        self.files_urls_field = Some(field.into());
        self
    }

    /// Override the result field name
    pub fn with_result_field(mut self, field: impl Into<String>) -> Self {
        self.files_result_field = Some(field.into());
        self
    }

    /// Replace the default URL field name
    pub fn with_default_urls_field(mut self, field: impl Into<String>) -> Self {
        self.default_files_urls_field = Some(field.into());
        self
    }

    /// Replace the default result field name
    pub fn with_default_result_field(mut self, field: impl Into<String>) -> Self {
        self.default_files_result_field = Some(field.into());
        self
    }

    /// Override the redirect policy
    pub fn with_allow_redirects(mut self, allow: bool) -> Self {
        self.allow_redirects = Some(allow);
        self
    }

    /// Settings key to consult for `key`
    ///
    /// The class-prefixed form (`<NAME>_<KEY>`) is returned only when this
    /// class is not the base class and the prefixed key is actually set.
    pub fn key_for(&self, key: &str, base_class_name: &str, settings: &Settings) -> String {
        if self.name == base_class_name {
            return key.to_string();
        }
        let prefixed = format!("{}_{}", self.name.to_uppercase(), key);
        if settings.contains(&prefixed) {
            prefixed
        } else {
            key.to_string()
        }
    }

    fn urls_field_attr(&self) -> String {
        self.files_urls_field
            .clone()
            .or_else(|| self.default_files_urls_field.clone())
            .unwrap_or_else(|| DEFAULT_FILES_URLS_FIELD.to_string())
    }

    fn result_field_attr(&self) -> String {
        self.files_result_field
            .clone()
            .or_else(|| self.default_files_result_field.clone())
            .unwrap_or_else(|| DEFAULT_FILES_RESULT_FIELD.to_string())
    }
}

/// Values resolved once per pipeline instance
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Days a stored file stays fresh; 0 always re-downloads
    pub expires_days: u32,
    /// Item field the URLs are read from
    pub urls_field: String,
    /// Item field the results are written to
    pub result_field: String,
    /// Whether media requests may follow redirects
    pub allow_redirects: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            expires_days: DEFAULT_EXPIRES_DAYS,
            urls_field: DEFAULT_FILES_URLS_FIELD.to_string(),
            result_field: DEFAULT_FILES_RESULT_FIELD.to_string(),
            allow_redirects: false,
        }
    }
}

impl PipelineConfig {
    /// Resolve every value, highest precedence first:
    /// class-prefixed key, plain key, class attribute, built-in default.
    pub fn resolve(class: &PipelineClass, settings: &Settings) -> Result<Self> {
        let expires_key = class.key_for(keys::FILES_EXPIRES, FILES_PIPELINE_NAME, settings);
        let expires_days = match settings.get_int(&expires_key)? {
            Some(days) => u32::try_from(days).map_err(|_| {
                Error::config(
                    &expires_key,
                    format!("expiry must be a non-negative number of days, got {days}"),
                )
            })?,
            None => class.expires.unwrap_or(DEFAULT_EXPIRES_DAYS),
        };

        let urls_key = class.key_for(keys::FILES_URLS_FIELD, FILES_PIPELINE_NAME, settings);
        let urls_field = settings
            .get_str(&urls_key)?
            .unwrap_or_else(|| class.urls_field_attr());

        let result_key = class.key_for(keys::FILES_RESULT_FIELD, FILES_PIPELINE_NAME, settings);
        let result_field = settings
            .get_str(&result_key)?
            .unwrap_or_else(|| class.result_field_attr());

        let redirects_key =
            class.key_for(keys::MEDIA_ALLOW_REDIRECTS, MEDIA_PIPELINE_NAME, settings);
        let allow_redirects = settings
            .get_bool(&redirects_key)?
            .or(class.allow_redirects)
            .unwrap_or(false);

        tracing::debug!(
            pipeline = %class.name,
            expires_days,
            urls_field = %urls_field,
            result_field = %result_field,
            allow_redirects,
            "Resolved pipeline configuration"
        );

        Ok(Self {
            expires_days,
            urls_field,
            result_field,
            allow_redirects,
        })
    }
}

/// Retry configuration for transient store failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts after the first try (default: 2)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 10 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// A configuration that never retries
    pub fn disabled() -> Self {
        Self {
            max_attempts: 0,
            ..Self::default()
        }
    }
}

fn default_max_attempts() -> u32 {
    2
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(10)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_true() -> bool {
    true
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
