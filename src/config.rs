use std::fs;
use std::path::PathBuf;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::domain::{PagePolicy, Source};
use crate::error::KiraError;

pub const DEFAULT_CONFIG_FILE: &str = "kira-ri.json";
pub const DEFAULT_DATABASE: &str = "nucleotide";
pub const DEFAULT_BATCH_SIZE: usize = 5000;
pub const DEFAULT_MITOFISH_URL: &str = "http://mitofish.aori.u-tokyo.ac.jp/species/detail/download/?filename=download%2F/complete_partial_mitogenomes.zip";
pub const DEFAULT_EMBL_RELEASE_URL: &str =
    "https://ftp.ebi.ac.uk/pub/databases/embl/release/std/";
pub const DEFAULT_BOLD_URL: &str = "http://v3.boldsystems.org/index.php/API_Public/sequence";

/// On-disk shape of `kira-ri.json`. Every field is optional so CLI flags
/// can fill the gaps.
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub source: Option<Source>,
    #[serde(default)]
    pub output_path: Option<String>,
    #[serde(default)]
    pub work_dir: Option<String>,
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub batch_size: Option<usize>,
    #[serde(default)]
    pub page_policy: Option<PagePolicy>,
    #[serde(default)]
    pub mitofish_url: Option<String>,
    #[serde(default)]
    pub embl_division: Option<String>,
    #[serde(default)]
    pub embl_release_url: Option<String>,
    #[serde(default)]
    pub bold_taxon: Option<String>,
    #[serde(default)]
    pub bold_url: Option<String>,
}

impl Config {
    /// Fields set in `other` win.
    pub fn overlay(self, other: Config) -> Config {
        Config {
            schema_version: other.schema_version.or(self.schema_version),
            source: other.source.or(self.source),
            output_path: other.output_path.or(self.output_path),
            work_dir: other.work_dir.or(self.work_dir),
            query: other.query.or(self.query),
            database: other.database.or(self.database),
            email: other.email.or(self.email),
            api_key: other.api_key.or(self.api_key),
            batch_size: other.batch_size.or(self.batch_size),
            page_policy: other.page_policy.or(self.page_policy),
            mitofish_url: other.mitofish_url.or(self.mitofish_url),
            embl_division: other.embl_division.or(self.embl_division),
            embl_release_url: other.embl_release_url.or(self.embl_release_url),
            bold_taxon: other.bold_taxon.or(self.bold_taxon),
            bold_url: other.bold_url.or(self.bold_url),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NcbiRequest {
    pub query: String,
    pub database: String,
    pub email: String,
    pub api_key: Option<String>,
    pub batch_size: usize,
    pub page_policy: PagePolicy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MitofishRequest {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmblRequest {
    pub release_url: String,
    /// Division prefix such as `mam` or `hum*`.
    pub division: String,
}

impl EmblRequest {
    /// File-name prefix shared by every file of the division.
    pub fn file_prefix(&self) -> String {
        format!("rel_std_{}", self.division.trim_end_matches('*'))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoldRequest {
    pub url: String,
    pub taxon: String,
}

impl BoldRequest {
    pub fn query_url(&self) -> String {
        format!("{}?taxon={}", self.url, self.taxon)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceRequest {
    Ncbi(NcbiRequest),
    Mitofish(MitofishRequest),
    Embl(EmblRequest),
    Bold(BoldRequest),
}

impl SourceRequest {
    pub fn source(&self) -> Source {
        match self {
            SourceRequest::Ncbi(_) => Source::Ncbi,
            SourceRequest::Mitofish(_) => Source::Mitofish,
            SourceRequest::Embl(_) => Source::Embl,
            SourceRequest::Bold(_) => Source::Bold,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub request: SourceRequest,
    pub output: Utf8PathBuf,
    pub work_dir: Option<Utf8PathBuf>,
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Reads the config file. An explicit path must exist; the default
    /// `kira-ri.json` is optional and yields an empty config when absent.
    pub fn load(path: Option<&str>) -> Result<Config, KiraError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };
        if path.is_none() && !config_path.exists() {
            return Ok(Config::default());
        }
        let content = fs::read_to_string(&config_path)
            .map_err(|_| KiraError::ConfigRead(config_path.clone()))?;
        serde_json::from_str(&content).map_err(|err| KiraError::ConfigParse(err.to_string()))
    }

    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, KiraError> {
        let config_path = PathBuf::from(path.unwrap_or(DEFAULT_CONFIG_FILE));
        if path.is_none() && !config_path.exists() {
            return Err(KiraError::MissingConfig);
        }
        Self::resolve_config(Self::load(path)?)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, KiraError> {
        let schema_version = config.schema_version.unwrap_or(1);
        let source = config
            .source
            .ok_or_else(|| KiraError::InvalidConfig("source is required".to_string()))?;
        let output = config
            .output_path
            .map(Utf8PathBuf::from)
            .ok_or_else(|| KiraError::InvalidConfig("output_path is required".to_string()))?;

        let request = match source {
            Source::Ncbi => {
                let batch_size = config.batch_size.unwrap_or(DEFAULT_BATCH_SIZE);
                if batch_size == 0 {
                    return Err(KiraError::InvalidConfig(
                        "batch_size must be greater than zero".to_string(),
                    ));
                }
                SourceRequest::Ncbi(NcbiRequest {
                    query: required(config.query, "query")?,
                    database: config
                        .database
                        .unwrap_or_else(|| DEFAULT_DATABASE.to_string()),
                    email: required(config.email, "email")?,
                    api_key: config.api_key,
                    batch_size,
                    page_policy: config.page_policy.unwrap_or_default(),
                })
            }
            Source::Mitofish => SourceRequest::Mitofish(MitofishRequest {
                url: config
                    .mitofish_url
                    .unwrap_or_else(|| DEFAULT_MITOFISH_URL.to_string()),
            }),
            Source::Embl => SourceRequest::Embl(EmblRequest {
                release_url: config
                    .embl_release_url
                    .unwrap_or_else(|| DEFAULT_EMBL_RELEASE_URL.to_string()),
                division: required(config.embl_division, "embl_division")?,
            }),
            Source::Bold => SourceRequest::Bold(BoldRequest {
                url: config
                    .bold_url
                    .unwrap_or_else(|| DEFAULT_BOLD_URL.to_string()),
                taxon: required(config.bold_taxon, "bold_taxon")?,
            }),
        };

        Ok(ResolvedConfig {
            schema_version,
            request,
            output,
            work_dir: config.work_dir.map(Utf8PathBuf::from),
        })
    }
}

fn required(value: Option<String>, name: &str) -> Result<String, KiraError> {
    value
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| KiraError::InvalidConfig(format!("{name} is required for this source")))
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn ncbi_defaults() {
        let config = Config {
            source: Some(Source::Ncbi),
            output_path: Some("12S.fasta".to_string()),
            query: Some("12S[All Fields] AND mitochondrion[filter]".to_string()),
            email: Some("lab@example.org".to_string()),
            ..Config::default()
        };
        let resolved = ConfigLoader::resolve_config(config).unwrap();
        assert_eq!(resolved.schema_version, 1);
        let SourceRequest::Ncbi(request) = resolved.request else {
            panic!("expected ncbi request");
        };
        assert_eq!(request.database, DEFAULT_DATABASE);
        assert_eq!(request.batch_size, DEFAULT_BATCH_SIZE);
        assert_eq!(request.page_policy, PagePolicy::Strict);
    }

    #[test]
    fn ncbi_requires_email() {
        let config = Config {
            source: Some(Source::Ncbi),
            output_path: Some("12S.fasta".to_string()),
            query: Some("12S".to_string()),
            ..Config::default()
        };
        assert_matches!(
            ConfigLoader::resolve_config(config),
            Err(KiraError::InvalidConfig(_))
        );
    }

    #[test]
    fn overlay_prefers_later_values() {
        let file = Config {
            source: Some(Source::Bold),
            bold_taxon: Some("Salmo".to_string()),
            output_path: Some("a.fasta".to_string()),
            ..Config::default()
        };
        let cli = Config {
            output_path: Some("b.fasta".to_string()),
            ..Config::default()
        };
        let merged = file.overlay(cli);
        assert_eq!(merged.output_path.as_deref(), Some("b.fasta"));
        assert_eq!(merged.bold_taxon.as_deref(), Some("Salmo"));
    }

    #[test]
    fn embl_prefix() {
        let request = EmblRequest {
            release_url: DEFAULT_EMBL_RELEASE_URL.to_string(),
            division: "mam*".to_string(),
        };
        assert_eq!(request.file_prefix(), "rel_std_mam");
    }
}
