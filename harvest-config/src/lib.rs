//! Loader for harvest configuration with YAML + environment overlays.
//!
//! Precedence, lowest first: built-in defaults, YAML files/snippets in the
//! order they were attached, then `HARVEST_`-prefixed environment variables
//! (`__` separates nesting, e.g. `HARVEST_WALK__MAX_PAGES=3`). String values
//! may reference other environment variables as `${VAR}`, which is how
//! session cookies are usually injected:
//!
//! ```yaml
//! fetch:
//!   strategies: [plain-http, async-http]
//!   timeout_secs: 20
//! walk:
//!   max_pages: 5
//! session:
//!   cookies:
//!     session_id: "${SITE_SESSION}"
//! ```
use config::{Config, ConfigError, Environment, File};
use harvest_common::observability::{LogConfig, LogFormat};
use harvest_common::FetchStrategy;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

const MAXIMUM_ENV_EXPANSION_DEPTH: usize = 8;

/// Root of the configuration tree. Every section is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    pub fetch: FetchConfig,
    pub walk: WalkConfig,
    pub enrich: EnrichConfig,
    pub session: SessionConfig,
    pub log: LogSettings,
}

/// How pages are retrieved.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Strategies tried in order until one yields content.
    pub strategies: Vec<FetchStrategy>,
    /// Budget for one listing fetch attempt.
    pub timeout_secs: u64,
    /// Budget for one detail page fetch; kept shorter than listing fetches.
    pub detail_timeout_secs: u64,
    /// Retries for the async HTTP strategy (429/5xx/network).
    pub retries: usize,
    pub user_agent: String,
    /// Chromedriver endpoint for the headless browser strategy.
    pub chromedriver_url: String,
    /// Geckodriver endpoint for the browser engine strategy.
    pub geckodriver_url: String,
    pub headless: bool,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            strategies: FetchStrategy::default_order(),
            timeout_secs: 30,
            detail_timeout_secs: 10,
            retries: 2,
            user_agent: default_user_agent(),
            chromedriver_url: "http://localhost:9515".into(),
            geckodriver_url: "http://localhost:4444".into(),
            headless: true,
        }
    }
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }

    pub fn detail_timeout(&self) -> Duration {
        Duration::from_secs(self.detail_timeout_secs.max(1))
    }
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/129.0.0.0 Safari/537.36".into()
}

/// Pagination limits and guards.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WalkConfig {
    /// Hard ceiling on pages loaded in one walk, the first page included.
    pub max_pages: usize,
    /// Share of the first page's records a later page may repeat before the
    /// walk is considered to be clamping to the last page.
    pub near_duplicate_threshold: f64,
    /// Pause after a browser click before the new page is read.
    pub settle_ms: u64,
}

impl Default for WalkConfig {
    fn default() -> Self {
        Self {
            max_pages: 10,
            near_duplicate_threshold: 0.7,
            settle_ms: 3000,
        }
    }
}

impl WalkConfig {
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}

/// Detail page enrichment.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EnrichConfig {
    pub enabled: bool,
    /// Cap on detail fetches per run; `None` means every linked record.
    pub max_details: Option<usize>,
    /// Detail fetches in flight at once. `1` keeps enrichment sequential.
    pub workers: usize,
    /// Minimum spacing between consecutive requests to the target.
    pub min_interval_ms: u64,
}

impl Default for EnrichConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_details: None,
            workers: 1,
            min_interval_ms: 0,
        }
    }
}

impl EnrichConfig {
    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }
}

/// Pre-authenticated credentials attached to outgoing requests.
#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub cookies: BTreeMap<String, String>,
    pub headers: BTreeMap<String, String>,
}

// Values are secrets; only the names are printable.
impl std::fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionConfig")
            .field("cookies", &self.cookies.keys().collect::<Vec<_>>())
            .field("headers", &self.headers.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Logging settings as they appear in YAML.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    pub dir: Option<PathBuf>,
    pub format: LogFormat,
    pub stderr: bool,
    pub filter: String,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            dir: None,
            format: LogFormat::Text,
            stderr: false,
            filter: "info".into(),
        }
    }
}

impl LogSettings {
    /// Translate into the observability initializer's config.
    pub fn to_log_config(&self, app_name: &'static str) -> LogConfig {
        LogConfig {
            app_name,
            log_dir: self.dir.clone(),
            emit_stderr: self.stderr,
            format: self.format,
            default_filter: self.filter.clone(),
        }
    }
}

fn expand_env_in_value(v: &mut Value) {
    match v {
        Value::String(s) => {
            if s.contains('$') {
                let mut cur = std::mem::take(s);
                for _ in 0..MAXIMUM_ENV_EXPANSION_DEPTH {
                    let expanded = match shellexpand::env(&cur) {
                        Ok(cow) => cow.into_owned(),
                        Err(_) => cur.clone(),
                    };
                    if expanded == cur {
                        break;
                    }
                    cur = expanded;
                }
                *s = cur;
            }
        }
        Value::Array(arr) => arr.iter_mut().for_each(expand_env_in_value),
        Value::Object(obj) => obj.values_mut().for_each(expand_env_in_value),
        _ => {}
    }
}

/// Builder hides the `config` crate wiring (YAML + env overrides).
pub struct HarvestConfigLoader {
    builder: config::ConfigBuilder<config::builder::DefaultState>,
    env: Environment,
}

impl Default for HarvestConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl HarvestConfigLoader {
    /// Start from defaults with `HARVEST_` env overrides applied last.
    ///
    /// ```
    /// use harvest_config::HarvestConfigLoader;
    ///
    /// let config = HarvestConfigLoader::new()
    ///     .with_yaml_str("walk:\n  max_pages: 3")
    ///     .load()
    ///     .expect("valid config");
    ///
    /// assert_eq!(config.walk.max_pages, 3);
    /// assert_eq!(config.fetch.strategies.len(), 4);
    /// ```
    pub fn new() -> Self {
        let env = Environment::with_prefix("HARVEST")
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("fetch.strategies");
        Self {
            builder: Config::builder(),
            env,
        }
    }

    /// Attach a YAML/TOML/JSON file that must exist; format inferred by suffix.
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.builder = self
            .builder
            .add_source(File::from(path.as_ref()).required(true));
        self
    }

    /// Attach a file that is skipped when absent, so env-only setups work.
    pub fn with_optional_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.builder = self
            .builder
            .add_source(File::from(path.as_ref()).required(false));
        self
    }

    /// Merge an inline YAML snippet.
    ///
    /// ```
    /// use harvest_common::FetchStrategy;
    /// use harvest_config::HarvestConfigLoader;
    ///
    /// let cfg = HarvestConfigLoader::new()
    ///     .with_yaml_str(
    ///         r#"
    /// fetch:
    ///   strategies: [async-http]
    ///   timeout_secs: 5
    /// enrich:
    ///   enabled: false
    /// "#,
    ///     )
    ///     .load()
    ///     .unwrap();
    ///
    /// assert_eq!(cfg.fetch.strategies, vec![FetchStrategy::AsyncHttp]);
    /// assert_eq!(cfg.fetch.timeout().as_secs(), 5);
    /// assert!(!cfg.enrich.enabled);
    /// ```
    pub fn with_yaml_str(mut self, yaml: &str) -> Self {
        self.builder = self
            .builder
            .add_source(File::from_str(yaml, config::FileFormat::Yaml));
        self
    }

    /// Consume the builder and deserialize the merged sources.
    ///
    /// `${VAR}` placeholders are expanded after merging, before the typed
    /// structs are built.
    ///
    /// ```
    /// use harvest_config::HarvestConfigLoader;
    ///
    /// unsafe { std::env::set_var("DOC_SESSION", "abc123"); }
    ///
    /// let config = HarvestConfigLoader::new()
    ///     .with_yaml_str(r#"
    /// session:
    ///   cookies:
    ///     sid: "${DOC_SESSION}"
    /// "#)
    ///     .load()
    ///     .expect("valid configuration");
    ///
    /// assert_eq!(config.session.cookies["sid"], "abc123");
    ///
    /// unsafe { std::env::remove_var("DOC_SESSION"); }
    /// ```
    pub fn load(self) -> Result<HarvestConfig, ConfigError> {
        let cfg = self.builder.add_source(self.env).build()?;

        let mut v: Value = cfg.try_deserialize()?;
        expand_env_in_value(&mut v);

        let typed: HarvestConfig =
            serde_json::from_value(v).map_err(|e| ConfigError::Message(e.to_string()))?;
        typed.validate()?;
        Ok(typed)
    }
}

impl HarvestConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.fetch.strategies.is_empty() {
            return Err(ConfigError::Message(
                "fetch.strategies must name at least one strategy".into(),
            ));
        }
        if self.walk.max_pages == 0 {
            return Err(ConfigError::Message("walk.max_pages must be >= 1".into()));
        }
        if !(0.0..=1.0).contains(&self.walk.near_duplicate_threshold) {
            return Err(ConfigError::Message(
                "walk.near_duplicate_threshold must be within 0.0..=1.0".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn expands_cookie_placeholder() {
        temp_env::with_var("SITE_SESSION", Some("s3cr3t"), || {
            let mut v = json!({ "cookies": { "sid": "${SITE_SESSION}" } });
            expand_env_in_value(&mut v);
            assert_eq!(v, json!({ "cookies": { "sid": "s3cr3t" } }));
        });
    }

    #[test]
    fn expands_in_arrays_and_leaves_scalars() {
        temp_env::with_vars([("HOST", Some("a.com")), ("PORT", Some("8080"))], || {
            let mut v = json!(["http://$HOST", { "url": "${HOST}:${PORT}" }, 7, false, null]);
            expand_env_in_value(&mut v);
            assert_eq!(v, json!(["http://a.com", { "url": "a.com:8080" }, 7, false, null]));
        });
    }

    #[test]
    fn expansion_terminates_on_cycles() {
        temp_env::with_vars([("A", Some("${B}")), ("B", Some("${A}"))], || {
            let mut v = json!("x=${A}-y");
            expand_env_in_value(&mut v);
            let s = v.as_str().unwrap();
            assert!(s.starts_with("x=") && s.ends_with("-y"));
            assert!(s.contains("${"));
        });
    }

    #[test]
    fn unknown_vars_are_left_as_is() {
        let mut v = json!("hi-${HARVEST_DOES_NOT_EXIST}");
        expand_env_in_value(&mut v);
        assert_eq!(v, json!("hi-${HARVEST_DOES_NOT_EXIST}"));
    }

    #[test]
    fn defaults_match_documented_values() {
        let cfg = HarvestConfig::default();
        assert_eq!(cfg.walk.max_pages, 10);
        assert!((cfg.walk.near_duplicate_threshold - 0.7).abs() < f64::EPSILON);
        assert_eq!(cfg.fetch.detail_timeout(), Duration::from_secs(10));
        assert!(cfg.fetch.detail_timeout() < cfg.fetch.timeout());
        assert_eq!(cfg.fetch.strategies, FetchStrategy::default_order());
    }

    #[test]
    fn rejects_out_of_range_threshold() {
        let err = HarvestConfigLoader::new()
            .with_yaml_str("walk:\n  near_duplicate_threshold: 1.5")
            .load()
            .unwrap_err();
        assert!(err.to_string().contains("near_duplicate_threshold"));
    }

    #[test]
    fn session_debug_hides_values() {
        let mut session = SessionConfig::default();
        session.cookies.insert("sid".into(), "topsecret".into());
        let printed = format!("{session:?}");
        assert!(printed.contains("sid"));
        assert!(!printed.contains("topsecret"));
    }
}
