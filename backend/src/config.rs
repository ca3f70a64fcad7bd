use serde::Deserialize;
use std::env;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;

use crate::intake::decode::parse_format_tag;

pub const CONFIG_PATH_VAR: &str = "TEA_GRADE_CONFIG";

/// Same decompression-bomb threshold Pillow refuses to open past.
pub const DEFAULT_MAX_PIXELS: u64 = 178_956_970;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Invalid value for {key}: {value:?} ({reason})")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
    #[error("Unknown image format in allow-list: {0}")]
    UnknownFormat(String),
    #[error("Image format allow-list is empty")]
    EmptyAllowList,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub intake: IntakeConfig,
    pub classifier: ClassifierConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            cors_origins: vec![
                "http://localhost:3000".to_string(),
                "http://localhost:3001".to_string(),
            ],
        }
    }
}

/// Limits applied by the intake pipeline to every upload.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IntakeConfig {
    pub max_upload_bytes: usize,
    pub max_dimension: u32,
    /// Largest declared width x height accepted for decoding.
    pub max_pixels: u64,
    /// Decoder format tags, compared case-sensitively.
    pub allowed_formats: Vec<String>,
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            max_upload_bytes: 5 * 1024 * 1024,
            max_dimension: 400,
            max_pixels: DEFAULT_MAX_PIXELS,
            allowed_formats: vec!["JPEG".to_string(), "PNG".to_string()],
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub file: Option<PathBuf>,
}

impl AppConfig {
    /// Loads `.env`, the optional YAML file named by `TEA_GRADE_CONFIG`, then
    /// applies environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        let yaml = match env::var(CONFIG_PATH_VAR) {
            Ok(path) => {
                let path = PathBuf::from(path);
                let contents = std::fs::read_to_string(&path)
                    .map_err(|source| ConfigError::Read { path, source })?;
                Some(contents)
            }
            Err(_) => None,
        };

        Self::from_sources(yaml.as_deref(), |key| env::var(key).ok())
    }

    pub fn from_sources<F>(yaml: Option<&str>, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config: AppConfig = match yaml {
            Some(text) if !text.trim().is_empty() => serde_yaml::from_str(text)?,
            _ => AppConfig::default(),
        };

        override_parsed(&lookup, "HOST", &mut config.server.host)?;
        override_parsed(&lookup, "PORT", &mut config.server.port)?;
        if let Some(origins) = lookup("CORS_ALLOWED_ORIGINS") {
            config.server.cors_origins = split_list(&origins);
        }

        override_parsed(&lookup, "MAX_UPLOAD_BYTES", &mut config.intake.max_upload_bytes)?;
        override_parsed(&lookup, "MAX_IMAGE_DIMENSION", &mut config.intake.max_dimension)?;
        override_parsed(&lookup, "MAX_IMAGE_PIXELS", &mut config.intake.max_pixels)?;
        if let Some(formats) = lookup("ALLOWED_FORMATS") {
            config.intake.allowed_formats = split_list(&formats);
        }

        if let Some(seed) = lookup("CLASSIFIER_SEED") {
            config.classifier.seed = Some(parse_value("CLASSIFIER_SEED", &seed)?);
        }
        if let Some(file) = lookup("LOG_FILE") {
            config.logging.file = Some(PathBuf::from(file));
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.intake.max_upload_bytes == 0 {
            return Err(ConfigError::InvalidValue {
                key: "MAX_UPLOAD_BYTES",
                value: "0".to_string(),
                reason: "must be positive".to_string(),
            });
        }
        if self.intake.max_dimension == 0 {
            return Err(ConfigError::InvalidValue {
                key: "MAX_IMAGE_DIMENSION",
                value: "0".to_string(),
                reason: "must be positive".to_string(),
            });
        }
        if self.intake.max_pixels == 0 {
            return Err(ConfigError::InvalidValue {
                key: "MAX_IMAGE_PIXELS",
                value: "0".to_string(),
                reason: "must be positive".to_string(),
            });
        }
        for origin in &self.server.cors_origins {
            if let Err(reason) = check_origin(origin) {
                return Err(ConfigError::InvalidValue {
                    key: "CORS_ALLOWED_ORIGINS",
                    value: origin.clone(),
                    reason: reason.to_string(),
                });
            }
        }
        if self.intake.allowed_formats.is_empty() {
            return Err(ConfigError::EmptyAllowList);
        }
        for tag in &self.intake.allowed_formats {
            if parse_format_tag(tag).is_none() {
                return Err(ConfigError::UnknownFormat(tag.clone()));
            }
        }
        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

fn override_parsed<F, T>(lookup: &F, key: &'static str, slot: &mut T) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: Display,
{
    if let Some(raw) = lookup(key) {
        *slot = parse_value(key, &raw)?;
    }
    Ok(())
}

fn parse_value<T>(key: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key,
        value: raw.to_string(),
        reason: e.to_string(),
    })
}

/// Origins must be concrete `scheme://host[:port]` values; actix-cors
/// panics on `*` and on anything that is not a valid header value.
fn check_origin(origin: &str) -> Result<(), &'static str> {
    if origin == "*" {
        return Err("wildcard origins are not supported");
    }
    let rest = origin
        .strip_prefix("http://")
        .or_else(|| origin.strip_prefix("https://"))
        .ok_or("must start with http:// or https://")?;
    if rest.is_empty() || rest.contains('/') {
        return Err("must be scheme://host[:port] without a path");
    }
    if !origin.bytes().all(|b| b.is_ascii_graphic()) {
        return Err("contains whitespace or non-ASCII characters");
    }
    Ok(())
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
