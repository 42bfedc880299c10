use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

pub const CONFIG_FILE_NAME: &str = "expat-site.toml";
pub const CONFIG_ENV: &str = "EXPAT_CONFIG";
pub const DRY_RUN_ENV: &str = "EXPAT_DRY_RUN";

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("missing configuration key: {0}")]
    Missing(&'static str),
    #[error("invalid duration for {key}: {value}")]
    InvalidDuration { key: &'static str, value: String },
}

/// Fully resolved configuration used by the runner and every step.
#[derive(Debug, Clone)]
pub struct ExpatConfig {
    pub dry_run: bool,
    /// `version-<majorminor>` to ordered step identifiers.
    pub versions: HashMap<String, Vec<String>>,
    pub database: DatabaseConfig,
    pub hops: HopsConfig,
    pub elastic: ElasticConfig,
    pub kibana: KibanaConfig,
    pub hopsworks: HopsworksConfig,
    pub kube: KubeConfig,
    pub conda: CondaConfig,
    pub executor: ExecutorConfig,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub metadata_url: Option<String>,
    pub max_connections: u32,
}

#[derive(Debug, Clone)]
pub struct HopsConfig {
    pub client_user: String,
    pub webhdfs_url: String,
}

#[derive(Debug, Clone)]
pub struct ElasticConfig {
    pub uri: String,
    pub user: String,
    pub password: Option<String>,
    /// Also applies to Kibana and the platform API, which share the cluster's certificates.
    pub verify_certificates: bool,
}

#[derive(Debug, Clone)]
pub struct KibanaConfig {
    pub uri: String,
}

#[derive(Debug, Clone)]
pub struct HopsworksConfig {
    pub url: String,
    pub service_jwt: Option<String>,
}

#[derive(Debug, Clone)]
pub struct KubeConfig {
    pub master_url: String,
    pub ca_path: Option<PathBuf>,
    pub cert_file: Option<PathBuf>,
    pub key_file: Option<PathBuf>,
    pub token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CondaConfig {
    pub dir: String,
    pub user: String,
    pub expat_path: PathBuf,
    pub hadoop_home: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub threads: usize,
    pub shutdown_timeout: Duration,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            metadata_url: None,
            max_connections: 5,
        }
    }
}

impl Default for HopsConfig {
    fn default() -> Self {
        Self {
            client_user: "hdfs".to_string(),
            webhdfs_url: "http://localhost:50070/webhdfs/v1".to_string(),
        }
    }
}

impl Default for ElasticConfig {
    fn default() -> Self {
        Self {
            uri: "https://localhost:9200".to_string(),
            user: "admin".to_string(),
            password: None,
            verify_certificates: false,
        }
    }
}

impl Default for KibanaConfig {
    fn default() -> Self {
        Self {
            uri: "https://localhost:5601".to_string(),
        }
    }
}

impl Default for HopsworksConfig {
    fn default() -> Self {
        Self {
            url: "https://localhost:8181".to_string(),
            service_jwt: None,
        }
    }
}

impl Default for KubeConfig {
    fn default() -> Self {
        Self {
            master_url: "https://localhost:6443".to_string(),
            ca_path: None,
            cert_file: None,
            key_file: None,
            token: None,
        }
    }
}

impl Default for CondaConfig {
    fn default() -> Self {
        Self {
            dir: "/srv/hops/anaconda".to_string(),
            user: "anaconda".to_string(),
            expat_path: PathBuf::from("/srv/hops/expat"),
            hadoop_home: "/srv/hops/hadoop".to_string(),
            timeout: Duration::from_secs(120),
        }
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            threads: 20,
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

impl Default for ExpatConfig {
    fn default() -> Self {
        Self {
            dry_run: false,
            versions: HashMap::new(),
            database: DatabaseConfig::default(),
            hops: HopsConfig::default(),
            elastic: ElasticConfig::default(),
            kibana: KibanaConfig::default(),
            hopsworks: HopsworksConfig::default(),
            kube: KubeConfig::default(),
            conda: CondaConfig::default(),
            executor: ExecutorConfig::default(),
        }
    }
}

/// A version entry is either a newline separated string or a list.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum StepList {
    Lines(String),
    List(Vec<String>),
}

impl StepList {
    pub fn identifiers(&self) -> Vec<String> {
        let raw: Vec<&str> = match self {
            StepList::Lines(s) => s.lines().collect(),
            StepList::List(v) => v.iter().map(String::as_str).collect(),
        };
        raw.into_iter()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct FileConfig {
    pub dry_run: Option<bool>,
    pub versions: Option<HashMap<String, StepList>>,
    pub database: Option<PartialDatabaseConfig>,
    pub hops: Option<PartialHopsConfig>,
    pub elastic: Option<PartialElasticConfig>,
    pub kibana: Option<PartialKibanaConfig>,
    pub hopsworks: Option<PartialHopsworksConfig>,
    pub kube: Option<PartialKubeConfig>,
    pub conda: Option<PartialCondaConfig>,
    pub executor: Option<PartialExecutorConfig>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct PartialDatabaseConfig {
    pub url: Option<String>,
    pub metadata_url: Option<String>,
    pub max_connections: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct PartialHopsConfig {
    pub client_user: Option<String>,
    pub webhdfs_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct PartialElasticConfig {
    pub uri: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub verify_certificates: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct PartialKibanaConfig {
    pub uri: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct PartialHopsworksConfig {
    pub url: Option<String>,
    pub service_jwt: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct PartialKubeConfig {
    pub master_url: Option<String>,
    pub ca_path: Option<PathBuf>,
    pub cert_file: Option<PathBuf>,
    pub key_file: Option<PathBuf>,
    pub token: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct PartialCondaConfig {
    pub dir: Option<String>,
    pub user: Option<String>,
    pub expat_path: Option<PathBuf>,
    pub hadoop_home: Option<String>,
    // humantime string, e.g. "2m"
    pub timeout: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct PartialExecutorConfig {
    pub threads: Option<usize>,
    pub shutdown_timeout: Option<String>,
}

fn parse_duration(key: &'static str, value: Option<String>, fallback: Duration) -> Result<Duration> {
    match value {
        None => Ok(fallback),
        Some(v) => humantime::parse_duration(&v).map_err(|_| {
            ConfigError::InvalidDuration {
                key,
                value: v.clone(),
            }
            .into()
        }),
    }
}

fn parse_bool_env(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl ExpatConfig {
    /// Merges a parsed file configuration over the built-in defaults.
    pub fn from_file_config(file: FileConfig) -> Result<Self> {
        let defaults = ExpatConfig::default();

        let versions = file
            .versions
            .unwrap_or_default()
            .into_iter()
            .map(|(k, v)| (k, v.identifiers()))
            .collect();

        let database = {
            let p = file.database.unwrap_or_default();
            DatabaseConfig {
                url: p.url,
                metadata_url: p.metadata_url,
                max_connections: p
                    .max_connections
                    .unwrap_or(defaults.database.max_connections),
            }
        };

        let hops = {
            let p = file.hops.unwrap_or_default();
            HopsConfig {
                client_user: p.client_user.unwrap_or(defaults.hops.client_user),
                webhdfs_url: p.webhdfs_url.unwrap_or(defaults.hops.webhdfs_url),
            }
        };

        let elastic = {
            let p = file.elastic.unwrap_or_default();
            ElasticConfig {
                uri: p.uri.unwrap_or(defaults.elastic.uri),
                user: p.user.unwrap_or(defaults.elastic.user),
                password: p.password,
                verify_certificates: p
                    .verify_certificates
                    .unwrap_or(defaults.elastic.verify_certificates),
            }
        };

        let kibana = KibanaConfig {
            uri: file
                .kibana
                .and_then(|k| k.uri)
                .unwrap_or(defaults.kibana.uri),
        };

        let hopsworks = {
            let p = file.hopsworks.unwrap_or_default();
            HopsworksConfig {
                url: p.url.unwrap_or(defaults.hopsworks.url),
                service_jwt: p.service_jwt,
            }
        };

        let kube = {
            let p = file.kube.unwrap_or_default();
            KubeConfig {
                master_url: p.master_url.unwrap_or(defaults.kube.master_url),
                ca_path: p.ca_path,
                cert_file: p.cert_file,
                key_file: p.key_file,
                token: p.token,
            }
        };

        let conda = {
            let p = file.conda.unwrap_or_default();
            CondaConfig {
                dir: p.dir.unwrap_or(defaults.conda.dir),
                user: p.user.unwrap_or(defaults.conda.user),
                expat_path: p.expat_path.unwrap_or(defaults.conda.expat_path),
                hadoop_home: p.hadoop_home.unwrap_or(defaults.conda.hadoop_home),
                timeout: parse_duration("conda.timeout", p.timeout, defaults.conda.timeout)?,
            }
        };

        let executor = {
            let p = file.executor.unwrap_or_default();
            ExecutorConfig {
                threads: p.threads.unwrap_or(defaults.executor.threads).max(1),
                shutdown_timeout: parse_duration(
                    "executor.shutdown_timeout",
                    p.shutdown_timeout,
                    defaults.executor.shutdown_timeout,
                )?,
            }
        };

        Ok(Self {
            dry_run: file.dry_run.unwrap_or(defaults.dry_run),
            versions,
            database,
            hops,
            elastic,
            kibana,
            hopsworks,
            kube,
            conda,
            executor,
        })
    }

    /// Loads the configuration file and applies environment and CLI overrides.
    ///
    /// # Arguments
    /// * `explicit` - Path given on the command line, if any. It must exist.
    /// * `cli_dry_run` - `true` when `--dry-run` was passed.
    pub fn load(explicit: Option<&Path>, cli_dry_run: bool) -> Result<Self> {
        let file_cfg = match explicit {
            Some(path) => read_config_file(path)?,
            None => load_file_config()?,
        };
        let mut cfg = Self::from_file_config(file_cfg)?;
        if let Ok(v) = std::env::var(DRY_RUN_ENV)
            && let Some(flag) = parse_bool_env(&v)
        {
            cfg.dry_run = flag;
        }
        if cli_dry_run {
            cfg.dry_run = true;
        }
        Ok(cfg)
    }

    /// Ordered step identifiers configured for a version key.
    pub fn steps_for(&self, version_key: &str) -> Option<&[String]> {
        self.versions.get(version_key).map(Vec::as_slice)
    }
}

/// Reads one configuration file. Parse errors are fatal here since the path was asked for.
pub fn read_config_file(path: &Path) -> Result<FileConfig> {
    let s = fs::read_to_string(path)
        .with_context(|| format!("read config file: {}", path.display()))?;
    let cfg = toml::from_str::<FileConfig>(&s)
        .with_context(|| format!("parse config file: {}", path.display()))?;
    info!(path=%path.display(), "loaded config file");
    Ok(cfg)
}

fn candidate_paths() -> Vec<PathBuf> {
    let mut v = Vec::new();
    if let Ok(p) = std::env::var(CONFIG_ENV) {
        v.push(PathBuf::from(p));
    }
    v.push(PathBuf::from(CONFIG_FILE_NAME));
    if let Ok(xdg_home) = std::env::var("XDG_CONFIG_HOME") {
        v.push(Path::new(&xdg_home).join("expat").join(CONFIG_FILE_NAME));
    } else if let Ok(home) = std::env::var("HOME") {
        v.push(Path::new(&home).join(".config/expat").join(CONFIG_FILE_NAME));
    }
    v
}

/// Walks the candidate locations and returns the first file that parses.
pub fn load_file_config() -> Result<FileConfig> {
    for p in candidate_paths() {
        if p.exists() {
            let s = fs::read_to_string(&p)
                .with_context(|| format!("read config file: {}", p.display()))?;
            match toml::from_str::<FileConfig>(&s) {
                Ok(cfg) => {
                    info!(path=%p.display(), "loaded config file");
                    return Ok(cfg);
                }
                Err(e) => {
                    warn!(path=%p.display(), error=%e.to_string(), "parse config failed");
                    continue;
                }
            }
        }
    }
    warn!("no configuration file found, using defaults");
    Ok(FileConfig::default())
}
