use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

use crate::compiler::{LanguageVersion, DEFAULT_LANGUAGE_VERSION};
use crate::execution::DEFAULT_DEADLINE;

/// Environment variable overriding `evaluation.timeout`
pub const TIMEOUT_ENV: &str = "ROWSCRIPT_EVALUATION_TIMEOUT";

/// Complete rowscript configuration (loaded from TOML file)
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct RowscriptConfig {
    #[serde(default)]
    pub compiler: CompilerConfig,

    #[serde(default)]
    pub evaluation: EvaluationConfig,

    #[serde(default)]
    pub cache: CacheConfig,
}

/// Template compiler configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompilerConfig {
    /// ECMAScript edition: ES2020, ES2022, ES2023
    #[serde(default = "default_language_version")]
    pub language_version: String,

    /// Compile a trivial script at startup
    #[serde(default)]
    pub initialize: bool,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            language_version: default_language_version(),
            initialize: false,
        }
    }
}

/// Per-record evaluation configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EvaluationConfig {
    /// Deadline of a single record evaluation (e.g., "500ms", "100s")
    #[serde(default = "default_timeout")]
    pub timeout: String,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
        }
    }
}

impl EvaluationConfig {
    /// Effective per-record deadline
    ///
    /// `ROWSCRIPT_EVALUATION_TIMEOUT` wins over the configured value. An
    /// unparsable value is skipped with a warning.
    pub fn resolve_timeout(&self) -> Duration {
        let from_env = std::env::var(TIMEOUT_ENV).ok();
        let candidates = [
            (TIMEOUT_ENV, from_env.as_deref()),
            ("evaluation.timeout", Some(self.timeout.as_str())),
        ];

        for (source, value) in candidates {
            let Some(value) = value else { continue };
            match parse_duration(value) {
                Ok(timeout) if !timeout.is_zero() => return timeout,
                Ok(_) => warn!("Ignoring zero timeout from {}", source),
                Err(e) => warn!("Ignoring {} = {:?}: {}", source, value, e),
            }
        }

        DEFAULT_DEADLINE
    }
}

/// Module cache configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct CacheConfig {
    /// Idle time after which a loaded module is unloaded; unset or "0" disables caching
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<String>,

    /// How often the sweeper runs; defaults to the TTL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sweep_interval: Option<String>,
}

impl CacheConfig {
    /// Parsed TTL; `None` when caching is disabled
    pub fn ttl(&self) -> Result<Option<Duration>> {
        let Some(ttl) = self.ttl.as_deref() else {
            return Ok(None);
        };
        let ttl = parse_duration(ttl).context("Invalid cache.ttl")?;
        Ok(Some(ttl).filter(|ttl| !ttl.is_zero()))
    }

    /// Sweep interval, falling back to the TTL
    pub fn sweep_interval(&self) -> Result<Option<Duration>> {
        match self.sweep_interval.as_deref() {
            Some(interval) => {
                let interval = parse_duration(interval).context("Invalid cache.sweep_interval")?;
                if interval.is_zero() {
                    anyhow::bail!("cache.sweep_interval must be greater than zero");
                }
                Ok(Some(interval))
            }
            None => self.ttl(),
        }
    }
}

fn default_language_version() -> String {
    DEFAULT_LANGUAGE_VERSION.to_string()
}

fn default_timeout() -> String {
    "100s".to_string()
}

/// Parse duration string (e.g., "250ms", "30s", "10m", "1h", "7d"); a bare number is seconds
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return Err(anyhow!("Empty duration string"));
    }

    let split = s
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(s.len());
    let (num_str, unit) = s.split_at(split);
    let num: u64 = num_str
        .parse()
        .map_err(|_| anyhow!("Invalid duration: {}", s))?;

    let duration = match unit {
        "ms" => Duration::from_millis(num),
        "" | "s" => Duration::from_secs(num),
        "m" => Duration::from_secs(num.saturating_mul(60)),
        "h" => Duration::from_secs(num.saturating_mul(3600)),
        "d" => Duration::from_secs(num.saturating_mul(86400)),
        _ => {
            return Err(anyhow!(
                "Invalid duration unit: {}. Use: ms, s, m, h, d",
                unit
            ))
        }
    };

    Ok(duration)
}

impl RowscriptConfig {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: RowscriptConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;

        Ok(config)
    }

    /// Generate example configuration as TOML string
    pub fn example() -> Result<String> {
        let config = RowscriptConfig {
            compiler: CompilerConfig {
                language_version: "ES2023".to_string(),
                initialize: true,
            },
            evaluation: EvaluationConfig {
                timeout: "100s".to_string(),
            },
            cache: CacheConfig {
                ttl: Some("30m".to_string()),
                sweep_interval: Some("1m".to_string()),
            },
        };

        toml::to_string_pretty(&config).context("Failed to render example configuration")
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.compiler
            .language_version
            .parse::<LanguageVersion>()
            .map_err(|_| {
                anyhow!(
                    "compiler.language_version must be one of: ES2020, ES2022, ES2023 (got {})",
                    self.compiler.language_version
                )
            })?;

        self.cache.ttl()?;
        self.cache.sweep_interval()?;

        parse_duration(&self.evaluation.timeout).context("Invalid evaluation.timeout")?;

        Ok(())
    }
}
