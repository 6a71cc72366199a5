//! Application configuration loading for CLI defaults.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use epub_downloader_core::Theme;

/// Highest accepted `rate_limit` in milliseconds.
pub const MAX_RATE_LIMIT_MS: u64 = 60_000;

/// Accepted range for `max_retries` (attempts per request).
pub const MAX_RETRIES_RANGE: std::ops::RangeInclusive<u32> = 1..=10;

/// TOML-backed file configuration for converter defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileConfig {
    /// Directory that receives finished books.
    pub output_dir: Option<PathBuf>,
    /// Netscape-format cookie file holding the reader session.
    pub cookies: Option<PathBuf>,
    /// Default reader theme.
    pub theme: Option<Theme>,
    /// Add e-ink reflow styles by default.
    pub kindle: Option<bool>,
    /// Spacing between requests in milliseconds.
    pub rate_limit: Option<u64>,
    /// Attempts per request, including the first.
    pub max_retries: Option<u32>,
    /// Reader site root.
    pub site_url: Option<String>,
}

impl FileConfig {
    /// Validates config values against CLI constraints.
    pub fn validate(&self) -> Result<()> {
        if let Some(rate_limit) = self.rate_limit
            && rate_limit > MAX_RATE_LIMIT_MS
        {
            bail!(
                "Invalid config value for `rate_limit`: {rate_limit}. Expected range: 0..={MAX_RATE_LIMIT_MS}"
            );
        }
        if let Some(max_retries) = self.max_retries
            && !MAX_RETRIES_RANGE.contains(&max_retries)
        {
            bail!("Invalid config value for `max_retries`: {max_retries}. Expected range: 1..=10");
        }
        if let Some(site_url) = &self.site_url
            && !(site_url.starts_with("https://") || site_url.starts_with("http://"))
        {
            bail!("Invalid config value for `site_url`: '{site_url}'. Expected an http(s) URL");
        }
        Ok(())
    }
}

/// Loaded config metadata.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// Resolved config path if a base directory is known.
    pub path: Option<PathBuf>,
    /// Parsed file config when a config file exists and was valid.
    pub config: Option<FileConfig>,
}

impl LoadedConfig {
    /// File values, or all defaults when no file was loaded.
    #[must_use]
    pub fn values(&self) -> FileConfig {
        self.config.clone().unwrap_or_default()
    }
}

/// Resolves default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/epub-downloader/config.toml`
/// 2. `$HOME/.config/epub-downloader/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(
            PathBuf::from(xdg_config_home)
                .join("epub-downloader")
                .join("config.toml"),
        );
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("epub-downloader")
            .join("config.toml"),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Loads config from default path if present.
pub fn load_default_file_config() -> Result<LoadedConfig> {
    let path = resolve_default_config_path();
    let config = match path.as_deref() {
        Some(path_ref) if path_ref.exists() => Some(load_file_config(path_ref)?),
        _ => None,
    };
    Ok(LoadedConfig { path, config })
}

fn load_file_config(path: &Path) -> Result<FileConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    parse_config_str(&raw)
        .with_context(|| format!("Failed to parse config file '{}'", path.display()))
}

fn parse_config_str(raw: &str) -> Result<FileConfig> {
    let mut cfg = FileConfig::default();
    for (line_index, raw_line) in raw.lines().enumerate() {
        let line = strip_inline_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }
        let line_no = line_index + 1;

        let Some((raw_key, raw_value)) = line.split_once('=') else {
            bail!("Invalid config syntax on line {line_no}: expected key = value");
        };

        let key = raw_key.trim();
        let value = raw_value.trim();
        let invalid = || format!("Invalid `{key}` value on line {line_no}");

        match key {
            "output_dir" => {
                cfg.output_dir = Some(PathBuf::from(
                    parse_string_literal(value).with_context(invalid)?,
                ));
            }
            "cookies" => {
                cfg.cookies = Some(PathBuf::from(
                    parse_string_literal(value).with_context(invalid)?,
                ));
            }
            "theme" => {
                let parsed = parse_string_literal(value).with_context(invalid)?;
                cfg.theme = Some(parsed.parse::<Theme>().with_context(invalid)?);
            }
            "kindle" => {
                cfg.kindle = Some(parse_boolean(value).with_context(invalid)?);
            }
            "rate_limit" => {
                cfg.rate_limit = Some(parse_integer_u64(value).with_context(invalid)?);
            }
            "max_retries" => {
                let parsed = parse_integer_u64(value).with_context(invalid)?;
                let n = u32::try_from(parsed)
                    .map_err(|_| anyhow::anyhow!("max_retries out of range for u32"))
                    .with_context(invalid)?;
                cfg.max_retries = Some(n);
            }
            "site_url" => {
                cfg.site_url = Some(parse_string_literal(value).with_context(invalid)?);
            }
            unknown => {
                bail!("Unknown configuration key: '{unknown}' on line {line_no}");
            }
        }
    }
    cfg.validate()?;
    Ok(cfg)
}

fn strip_inline_comment(line: &str) -> &str {
    let mut in_string = false;
    for (index, ch) in line.char_indices() {
        match ch {
            '"' => in_string = !in_string,
            '#' if !in_string => return &line[..index],
            _ => {}
        }
    }
    line
}

fn parse_string_literal(raw_value: &str) -> Result<String> {
    if raw_value.len() < 2 || !raw_value.starts_with('"') || !raw_value.ends_with('"') {
        bail!("Expected double-quoted string");
    }
    Ok(raw_value[1..raw_value.len() - 1].to_string())
}

fn parse_integer_u64(raw_value: &str) -> Result<u64> {
    let token = raw_value.trim();
    if token.is_empty() {
        bail!("Expected integer value");
    }
    let value = token.parse::<i128>()?;
    if value < 0 {
        bail!("Expected non-negative integer");
    }
    u64::try_from(value).map_err(|_| anyhow::anyhow!("Integer value out of range for u64"))
}

fn parse_boolean(raw_value: &str) -> Result<bool> {
    match raw_value.trim() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => bail!("Expected 'true' or 'false'"),
    }
}
