//! Configuration layer: typed settings with layered precedence (file → env → CLI).

mod cli;

use std::{
    collections::BTreeMap,
    num::NonZeroUsize,
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

pub use cli::{CliArgs, Command, InputArgs, Overrides};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "fenceline";
const DEFAULT_ENDPOINT: &str = "https://api.torchlight.dev/highlight";
const DEFAULT_TIMEOUT_SECS: u64 = 15;
const DEFAULT_RESULT_CACHE_CAPACITY: usize = 512;
const DEFAULT_SNIPPET_CACHE_CAPACITY: usize = 128;

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub highlight: HighlightSettings,
    pub snippets: SnippetSettings,
    pub render: RenderSettings,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct HighlightSettings {
    /// `None` when highlighting is switched off or no token is configured.
    pub token: Option<String>,
    pub endpoint: Url,
    pub default_theme: Option<String>,
    pub timeout: Duration,
    /// `None` disables the cross-document result cache.
    pub result_cache_capacity: Option<NonZeroUsize>,
    pub options: BTreeMap<String, serde_json::Value>,
}

impl HighlightSettings {
    pub fn is_enabled(&self) -> bool {
        self.token.is_some()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RenderSettings {
    /// Sanitize rendered HTML, for markdown that may carry untrusted raw HTML.
    pub sanitize_html: bool,
}

#[derive(Debug, Clone)]
pub struct SnippetSettings {
    pub directories: Vec<PathBuf>,
    pub cache_capacity: NonZeroUsize,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(
        Environment::with_prefix("FENCELINE")
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("snippets.directories")
            .try_parsing(true),
    );

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;
    raw.apply_overrides(&cli.overrides);

    Settings::from_raw(raw)
}

pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    highlight: RawHighlightSettings,
    snippets: RawSnippetSettings,
    render: RawRenderSettings,
}

impl RawSettings {
    fn apply_overrides(&mut self, overrides: &Overrides) {
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(token) = overrides.token.as_ref() {
            self.highlight.token = Some(token.clone());
        }
        if let Some(endpoint) = overrides.endpoint.as_ref() {
            self.highlight.endpoint = Some(endpoint.clone());
        }
        if let Some(theme) = overrides.theme.as_ref() {
            self.highlight.default_theme = Some(theme.clone());
        }
        if !overrides.snippet_dirs.is_empty() {
            self.snippets
                .directories
                .get_or_insert_with(Vec::new)
                .extend(overrides.snippet_dirs.iter().cloned());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            logging,
            highlight,
            snippets,
            render,
        } = raw;

        let logging = build_logging_settings(logging)?;
        let highlight = build_highlight_settings(highlight)?;
        let snippets = build_snippet_settings(snippets)?;

        Ok(Self {
            logging,
            highlight,
            snippets,
            render: RenderSettings {
                sanitize_html: render.sanitize_html.unwrap_or(false),
            },
        })
    }
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_highlight_settings(
    highlight: RawHighlightSettings,
) -> Result<HighlightSettings, LoadError> {
    let enabled = highlight.enabled.unwrap_or(true);
    let token = non_blank(highlight.token).filter(|_| enabled);

    let endpoint_value =
        non_blank(highlight.endpoint).unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());
    let endpoint = Url::parse(&endpoint_value).map_err(|err| {
        LoadError::invalid("highlight.endpoint", format!("failed to parse: {err}"))
    })?;
    if !matches!(endpoint.scheme(), "http" | "https") {
        return Err(LoadError::invalid(
            "highlight.endpoint",
            "endpoint must use http or https",
        ));
    }

    let timeout_seconds = highlight.timeout_seconds.unwrap_or(DEFAULT_TIMEOUT_SECS);
    if timeout_seconds == 0 {
        return Err(LoadError::invalid(
            "highlight.timeout_seconds",
            "timeout must be greater than zero",
        ));
    }

    let result_cache_capacity = NonZeroUsize::new(
        highlight
            .result_cache_capacity
            .unwrap_or(DEFAULT_RESULT_CACHE_CAPACITY),
    );

    Ok(HighlightSettings {
        token,
        endpoint,
        default_theme: non_blank(highlight.default_theme),
        timeout: Duration::from_secs(timeout_seconds),
        result_cache_capacity,
        options: highlight.options.unwrap_or_default(),
    })
}

fn build_snippet_settings(snippets: RawSnippetSettings) -> Result<SnippetSettings, LoadError> {
    let directories = snippets
        .directories
        .unwrap_or_default()
        .into_iter()
        .filter(|dir| !dir.as_os_str().is_empty())
        .collect();

    let cache_capacity = NonZeroUsize::new(
        snippets
            .cache_capacity
            .unwrap_or(DEFAULT_SNIPPET_CACHE_CAPACITY),
    )
    .ok_or_else(|| {
        LoadError::invalid(
            "snippets.cache_capacity",
            "cache capacity must be greater than zero",
        )
    })?;

    Ok(SnippetSettings {
        directories,
        cache_capacity,
    })
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawHighlightSettings {
    enabled: Option<bool>,
    token: Option<String>,
    endpoint: Option<String>,
    default_theme: Option<String>,
    timeout_seconds: Option<u64>,
    result_cache_capacity: Option<usize>,
    options: Option<BTreeMap<String, serde_json::Value>>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSnippetSettings {
    directories: Option<Vec<PathBuf>>,
    cache_capacity: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRenderSettings {
    sanitize_html: Option<bool>,
}
