use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use query_db::EngineConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Environment prefix; `QUERYKIT__ENGINE__PAGING__MAX_PAGE_SIZE=50` maps to
/// `engine.paging.max_page_size`.
pub const ENV_PREFIX: &str = "QUERYKIT__";

/// Application configuration: engine settings plus logging.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Base directory for relative log paths. Empty means the working directory.
    #[serde(default)]
    pub home_dir: String,
    #[serde(default)]
    pub engine: EngineConfig,
    /// Logging configuration (optional, uses defaults if None).
    #[serde(default)]
    pub logging: Option<LoggingConfig>,
}

/// Subsystem name → logging settings. Key "default" is the catch-all for
/// targets without their own section.
pub type LoggingConfig = BTreeMap<String, LogSection>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LogSection {
    /// "trace" .. "error", or "off"
    pub console_level: String,
    /// Log file, relative to `home_dir`; empty disables file output.
    #[serde(default)]
    pub file: String,
    #[serde(default = "default_file_level")]
    pub file_level: String,
    /// Rotated files to keep; unset rotates daily without a count limit.
    #[serde(default)]
    pub max_backups: Option<usize>,
    #[serde(default)]
    pub max_size_mb: Option<u64>,
}

fn default_file_level() -> String {
    "debug".to_string()
}

impl LogSection {
    pub fn console(level: &str) -> Self {
        Self {
            console_level: level.to_string(),
            file: String::new(),
            file_level: default_file_level(),
            max_backups: None,
            max_size_mb: None,
        }
    }
}

/// Console-only logging at `info`.
pub fn default_logging_config() -> LoggingConfig {
    let mut logging = BTreeMap::new();
    logging.insert("default".to_string(), LogSection::console("info"));
    logging
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            home_dir: String::new(),
            engine: EngineConfig::default(),
            logging: Some(default_logging_config()),
        }
    }
}

impl AppConfig {
    /// Figment stack: defaults → YAML file → `QUERYKIT__*` environment.
    pub fn figment(config_path: Option<&Path>) -> Figment {
        // Optional sections start as None so they stay None unless provided.
        let base = AppConfig {
            logging: None,
            ..AppConfig::default()
        };
        let mut figment = Figment::new().merge(Serialized::defaults(base));
        if let Some(path) = config_path {
            figment = figment.merge(Yaml::file(path));
        }
        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Load configuration with layered loading: defaults → YAML file → environment variables.
    pub fn load_layered<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let path = config_path.as_ref();
        if !path.exists() {
            anyhow::bail!("config file not found: {}", path.display());
        }
        Self::figment(Some(path))
            .extract()
            .with_context(|| format!("Failed to load config from {}", path.display()))
    }

    /// Layered load when a path is given; otherwise defaults plus environment.
    pub fn load_or_default<P: AsRef<Path>>(config_path: Option<P>) -> Result<Self> {
        match config_path {
            Some(path) => Self::load_layered(path),
            None => {
                let mut config: AppConfig = Self::figment(None)
                    .extract()
                    .context("Failed to extract config from environment")?;
                config.logging.get_or_insert_with(default_logging_config);
                Ok(config)
            }
        }
    }

    /// Serialize configuration to YAML.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Failed to serialize config to YAML")
    }

    /// Apply overrides from command line arguments.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(size) = args.page_size {
            self.engine.paging.default_page_size = size;
        }
        if args.no_cache {
            self.engine.cache.enabled = false;
        }

        let logging = self.logging.get_or_insert_with(default_logging_config);
        let default_section = logging
            .entry("default".to_string())
            .or_insert_with(|| LogSection::console("info"));
        match args.verbose {
            0 => {}
            1 => default_section.console_level = "debug".to_string(),
            _ => default_section.console_level = "trace".to_string(),
        }
    }

    /// Directory relative log paths resolve against.
    pub fn home_dir(&self) -> Result<PathBuf> {
        resolve_home_dir(&self.home_dir)
    }
}

/// Command line arguments relevant to configuration.
#[derive(Debug, Clone, Default)]
pub struct CliArgs {
    pub config: Option<String>,
    pub print_config: bool,
    pub verbose: u8,
    pub page_size: Option<u64>,
    pub no_cache: bool,
}

/// `~` expands to `$HOME`; relative paths are taken from the working directory.
fn resolve_home_dir(raw: &str) -> Result<PathBuf> {
    let cwd = std::env::current_dir().context("Failed to read the working directory")?;
    resolve_home_dir_from(raw, &cwd)
}

fn resolve_home_dir_from(raw: &str, cwd: &Path) -> Result<PathBuf> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(cwd.to_path_buf());
    }
    let expanded = match raw.strip_prefix('~') {
        Some(rest) => {
            let home = std::env::var_os("HOME").context("HOME is not set")?;
            PathBuf::from(home).join(rest.trim_start_matches(['/', '\\']))
        }
        None => PathBuf::from(raw),
    };
    Ok(if expanded.is_absolute() {
        expanded
    } else {
        cwd.join(expanded)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use query_db::CachedOp;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_default_config_structure() {
        let config = AppConfig::default();

        assert_eq!(config.home_dir, "");
        assert_eq!(config.engine, EngineConfig::default());
        assert!(config.engine.cache.enabled);
        assert_eq!(config.engine.paging.default_page_size, 25);

        let logging = config.logging.as_ref().unwrap();
        let default_section = &logging["default"];
        assert_eq!(default_section.console_level, "info");
        assert_eq!(default_section.file, "");
    }

    #[test]
    fn test_load_layered_yaml() {
        let tmp = tempdir().unwrap();
        let cfg_path = tmp.path().join("cfg.yaml");

        let yaml = r#"
home_dir: "/tmp/querykit"
engine:
  cache:
    enabled: true
    operations: [load, get_id]
  paging:
    default_page_size: 10
    max_page_size: 100

logging:
  default:
    console_level: debug
    file: "logs/querykit.log"
  query_db:
    console_level: trace
    max_backups: 3
"#;
        fs::write(&cfg_path, yaml).unwrap();

        let config = AppConfig::load_layered(&cfg_path).unwrap();
        assert_eq!(config.home_dir, "/tmp/querykit");
        assert!(config.engine.cache.caches(CachedOp::Load));
        assert!(!config.engine.cache.caches(CachedOp::Find));
        assert_eq!(config.engine.paging.default_page_size, 10);

        let logging = config.logging.as_ref().unwrap();
        assert_eq!(logging["default"].console_level, "debug");
        assert_eq!(logging["default"].file_level, "debug");
        assert_eq!(logging["query_db"].max_backups, Some(3));
    }

    #[test]
    fn test_minimal_yaml_keeps_optional_sections_empty() {
        let tmp = tempdir().unwrap();
        let cfg_path = tmp.path().join("cfg.yaml");
        fs::write(&cfg_path, "engine:\n  paging:\n    max_page_size: 7\n").unwrap();

        let config = AppConfig::load_layered(&cfg_path).unwrap();
        assert_eq!(config.engine.paging.max_page_size, 7);
        assert_eq!(config.engine.paging.default_page_size, 25);
        assert!(config.logging.is_none());
    }

    #[test]
    fn test_env_overrides_yaml() {
        figment::Jail::expect_with(|jail| {
            jail.create_file("cfg.yaml", "engine:\n  paging:\n    max_page_size: 7\n")?;
            jail.set_env("QUERYKIT__ENGINE__PAGING__MAX_PAGE_SIZE", "50");

            let config = AppConfig::load_layered("cfg.yaml").map_err(|e| e.to_string())?;
            assert_eq!(config.engine.paging.max_page_size, 50);
            Ok(())
        });
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        let tmp = tempdir().unwrap();
        let cfg_path = tmp.path().join("cfg.yaml");
        fs::write(&cfg_path, "server:\n  port: 8080\n").unwrap();
        assert!(AppConfig::load_layered(&cfg_path).is_err());
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let tmp = tempdir().unwrap();
        let err = AppConfig::load_layered(tmp.path().join("nope.yaml")).unwrap_err();
        assert!(err.to_string().contains("config file not found"));
    }

    #[test]
    fn test_load_or_default_without_path() {
        let config = AppConfig::load_or_default(None::<&str>).unwrap();
        assert!(config.logging.is_some());
    }

    #[test]
    fn test_cli_overrides() {
        let mut config = AppConfig::default();
        let args = CliArgs {
            verbose: 2,
            page_size: Some(5),
            no_cache: true,
            ..Default::default()
        };
        config.apply_cli_overrides(&args);

        assert_eq!(config.engine.paging.default_page_size, 5);
        assert!(!config.engine.cache.enabled);
        let logging = config.logging.as_ref().unwrap();
        assert_eq!(logging["default"].console_level, "trace");
    }

    #[test]
    fn test_cli_verbose_levels_matrix() {
        for (verbose, expected) in [(0, "info"), (1, "debug"), (2, "trace"), (3, "trace")] {
            let mut config = AppConfig::default();
            config.apply_cli_overrides(&CliArgs {
                verbose,
                ..Default::default()
            });
            let logging = config.logging.as_ref().unwrap();
            assert_eq!(logging["default"].console_level, expected);
        }
    }

    #[test]
    fn test_to_yaml_roundtrip_basic() {
        let config = AppConfig::default();
        let yaml = config.to_yaml().unwrap();
        assert!(yaml.contains("engine:"));
        assert!(yaml.contains("logging:"));

        let roundtrip: AppConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(roundtrip, config);
    }

    #[test]
    fn test_home_dir_resolution() {
        let cwd = Path::new("/srv/querykit");
        assert_eq!(resolve_home_dir_from("", cwd).unwrap(), cwd);
        assert_eq!(resolve_home_dir_from(" data ", cwd).unwrap(), cwd.join("data"));
        assert_eq!(
            resolve_home_dir_from("/var/lib/qk", cwd).unwrap(),
            PathBuf::from("/var/lib/qk")
        );
    }
}
