//! Service settings loaded from the environment.
//!
//! Site credentials are not here: they are resolved per target from the
//! variables its login block names (see [`crate::security::SiteCredentials`]).

use std::env;

use crate::error::{ConfigError, ConfigResult};
use crate::security::SecretString;

pub const DEFAULT_INDEX_NAME: &str = "troubleshooter-index";
pub const DEFAULT_CLASSIFIER_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-ada-002";
pub const DEFAULT_EMBEDDING_DIMENSION: u32 = 1536;
pub const DEFAULT_TOPIC: &str = "smart home automation, equipment racks, switches, receivers, matrix amps, audio, video, routers, TVs, cameras";

/// Settings for the hosted services the pipeline talks to.
#[derive(Debug, Clone)]
pub struct Settings {
    pub openai_api_key: SecretString,
    pub pinecone_api_key: SecretString,
    pub pinecone_index: String,
    /// Data-plane host; resolved from the control plane when absent.
    pub pinecone_host: Option<String>,
    pub pinecone_cloud: String,
    pub pinecone_region: String,
    pub database_url: SecretString,
    pub relevance_topic: String,
    pub classifier_model: String,
    pub embedding_model: String,
    pub embedding_dimension: u32,
}

impl Settings {
    /// Load settings, reading a `.env` file first if one is present.
    pub fn from_env() -> ConfigResult<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load settings through an arbitrary variable lookup. Blank values are
    /// treated as unset.
    pub fn from_lookup<F>(lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let require = |key: &str| get(key).ok_or_else(|| ConfigError::MissingVar(key.to_string()));
        let or_default = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        let embedding_dimension = match get("EMBEDDING_DIMENSION") {
            Some(raw) => raw
                .trim()
                .parse::<u32>()
                .ok()
                .filter(|d| *d > 0)
                .ok_or_else(|| ConfigError::InvalidValue {
                    name: "EMBEDDING_DIMENSION".into(),
                    reason: format!("'{}' is not a positive integer", raw),
                })?,
            None => DEFAULT_EMBEDDING_DIMENSION,
        };

        Ok(Self {
            openai_api_key: SecretString::new(require("OPENAI_API_KEY")?),
            pinecone_api_key: SecretString::new(require("PINECONE_API_KEY")?),
            pinecone_index: or_default("PINECONE_INDEX", DEFAULT_INDEX_NAME),
            pinecone_host: get("PINECONE_HOST"),
            pinecone_cloud: or_default("PINECONE_CLOUD", "aws"),
            pinecone_region: or_default("PINECONE_ENVIRONMENT", "us-east-1"),
            database_url: SecretString::new(database_url(&get)?),
            relevance_topic: or_default("RELEVANCE_TOPIC", DEFAULT_TOPIC),
            classifier_model: or_default("CLASSIFIER_MODEL", DEFAULT_CLASSIFIER_MODEL),
            embedding_model: or_default("EMBEDDING_MODEL", DEFAULT_EMBEDDING_MODEL),
            embedding_dimension,
        })
    }
}

/// `DATABASE_URL`, or one assembled from the `PG_*` parts.
fn database_url<F>(get: &F) -> ConfigResult<String>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(url) = get("DATABASE_URL") {
        return Ok(url);
    }

    let dbname = get("PG_DBNAME").ok_or_else(|| ConfigError::MissingVar("DATABASE_URL or PG_DBNAME".into()))?;
    let user = get("PG_USER").ok_or_else(|| ConfigError::MissingVar("PG_USER".into()))?;
    let host = get("PG_HOST").unwrap_or_else(|| "localhost".to_string());
    let port = match get("PG_PORT") {
        Some(raw) => raw.trim().parse::<u16>().map_err(|_| ConfigError::InvalidValue {
            name: "PG_PORT".into(),
            reason: format!("'{}' is not a port number", raw),
        })?,
        None => 5432,
    };

    let invalid = |name: &str| ConfigError::InvalidValue {
        name: name.to_string(),
        reason: "cannot be used in a connection URL".into(),
    };
    let mut url = url::Url::parse(&format!("postgres://{}:{}/{}", host, port, dbname))
        .map_err(|_| invalid("PG_HOST"))?;
    url.set_username(&user).map_err(|_| invalid("PG_USER"))?;
    if let Some(password) = get("PG_PASSWORD") {
        url.set_password(Some(&password))
            .map_err(|_| invalid("PG_PASSWORD"))?;
    }
    Ok(url.to_string())
}
