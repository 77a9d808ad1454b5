//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{
    num::{NonZeroU32, NonZeroUsize},
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "folio";
const ENV_PREFIX: &str = "FOLIO";
const DEFAULT_API_BASE_URL: &str = "http://localhost:3001";
const DEFAULT_API_TIMEOUT_SECS: u64 = 30;
const DEFAULT_CACHE_MAX_ENTRIES: u64 = 500;
const DEFAULT_CACHE_STALE_AFTER_SECS: u64 = 60;
const DEFAULT_SCRAPE_SOURCE_URL: &str =
    "https://www.worldofbooks.com/en-gb/collections/fiction-books";
pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const DEFAULT_MAX_AUTO_RETRIES: u32 = 1;

/// Command-line arguments for the Folio binary.
#[derive(Debug, Parser)]
#[command(name = "folio", version, about = "Browse the scraped book catalog")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "FOLIO_CONFIG_FILE", value_name = "PATH", value_hint = ValueHint::FilePath, global = true)]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: SettingsOverrides,

    /// Bearer token sent with favourites and reviews requests.
    #[arg(long, env = "FOLIO_TOKEN", value_name = "TOKEN", hide_env_values = true, global = true)]
    pub token: Option<String>,

    /// Print results as pretty JSON instead of text lines.
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Show the navigation tree, scraping first if the catalog is empty.
    Browse(BrowseArgs),
    /// Print the navigation tree without scraping.
    Navigation,
    /// List the categories of one navigation group.
    Categories {
        /// Navigation slug.
        slug: String,
    },
    /// List one page of a category's products.
    Products(ProductsArgs),
    /// Show one product with its details and reviews.
    Product {
        /// Product id.
        id: String,
    },
    /// List products related to a product.
    Related {
        /// Product id.
        id: String,
    },
    /// Search products.
    Search(SearchArgs),
    /// List your favourites.
    Favourites,
    /// Add a product to your favourites.
    Favourite {
        /// Product id.
        product_id: String,
    },
    /// List the reviews of a product.
    Reviews {
        /// Product id.
        product_id: String,
    },
    /// Review a product.
    Review(ReviewArgs),
    /// Trigger a scrape of the navigation tree or of one category.
    Scrape(ScrapeArgs),
}

#[derive(Debug, Args, Clone, Default)]
pub struct BrowseArgs {
    /// Source URL to scrape when the catalog is empty.
    #[arg(long, value_name = "URL")]
    pub url: Option<String>,

    /// Scrape one category instead of the navigation tree.
    #[arg(long, value_name = "ID")]
    pub category: Option<i64>,
}

#[derive(Debug, Args, Clone)]
pub struct ProductsArgs {
    /// Category id.
    pub category_id: i64,

    /// Page number, starting at 1.
    #[arg(long, default_value_t = 1)]
    pub page: u32,

    /// Load every page and print them as one list.
    #[arg(long, conflicts_with = "page")]
    pub all: bool,
}

#[derive(Debug, Args, Clone)]
pub struct SearchArgs {
    /// Search text.
    pub query: String,

    /// Page number, starting at 1.
    #[arg(long, default_value_t = 1)]
    pub page: u32,
}

#[derive(Debug, Args, Clone)]
pub struct ReviewArgs {
    /// Product id.
    pub product_id: String,

    /// Rating from 1 to 5.
    #[arg(long, allow_hyphen_values = true)]
    pub rating: i64,

    /// Optional review text.
    #[arg(long)]
    pub comment: Option<String>,
}

#[derive(Debug, Args, Clone, Default)]
pub struct ScrapeArgs {
    /// Category to scrape; the navigation tree when omitted.
    #[arg(long, value_name = "ID")]
    pub category: Option<i64>,

    /// Source URL; defaults to `scrape.default_source_url`.
    #[arg(long, value_name = "URL")]
    pub url: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct SettingsOverrides {
    /// Override the catalog API base URL.
    #[arg(long = "api-base-url", value_name = "URL", global = true)]
    pub api_base_url: Option<String>,

    /// Override the per-request timeout.
    #[arg(long = "api-timeout-seconds", value_name = "SECONDS", global = true)]
    pub api_timeout_seconds: Option<u64>,

    /// Override the page size used for listings and search.
    #[arg(long = "page-size", value_name = "COUNT", global = true)]
    pub page_size: Option<u32>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new(),
        global = true
    )]
    pub log_json: Option<bool>,
}

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub api: ApiSettings,
    pub cache: CacheSettings,
    pub pagination: PaginationSettings,
    pub scrape: ScrapeSettings,
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
pub struct ApiSettings {
    pub base_url: Url,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub max_entries: NonZeroUsize,
    /// `None` when `stale_after_seconds` is 0.
    pub stale_after: Option<Duration>,
    pub refetch_active_on_invalidate: bool,
}

#[derive(Debug, Clone)]
pub struct PaginationSettings {
    pub page_size: NonZeroU32,
    pub keep_previous_page: bool,
}

#[derive(Debug, Clone)]
pub struct ScrapeSettings {
    pub default_source_url: Url,
    pub max_auto_retries: u32,
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

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;
    raw.apply_overrides(&cli.overrides);

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    api: RawApiSettings,
    cache: RawCacheSettings,
    pagination: RawPaginationSettings,
    scrape: RawScrapeSettings,
}

impl RawSettings {
    fn apply_overrides(&mut self, overrides: &SettingsOverrides) {
        if let Some(url) = overrides.api_base_url.as_ref() {
            self.api.base_url = Some(url.clone());
        }
        if let Some(seconds) = overrides.api_timeout_seconds {
            self.api.timeout_seconds = Some(seconds);
        }
        if let Some(size) = overrides.page_size {
            self.pagination.page_size = Some(size.into());
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            logging,
            api,
            cache,
            pagination,
            scrape,
        } = raw;

        Ok(Self {
            logging: build_logging_settings(logging)?,
            api: build_api_settings(api)?,
            cache: build_cache_settings(cache)?,
            pagination: build_pagination_settings(pagination)?,
            scrape: build_scrape_settings(scrape)?,
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

fn build_api_settings(api: RawApiSettings) -> Result<ApiSettings, LoadError> {
    let base_url = parse_http_url(
        api.base_url.as_deref().unwrap_or(DEFAULT_API_BASE_URL),
        "api.base_url",
    )?;

    let timeout_seconds = api.timeout_seconds.unwrap_or(DEFAULT_API_TIMEOUT_SECS);
    if timeout_seconds == 0 {
        return Err(LoadError::invalid(
            "api.timeout_seconds",
            "must be greater than zero",
        ));
    }

    Ok(ApiSettings {
        base_url,
        timeout: Duration::from_secs(timeout_seconds),
    })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let max_entries_value = cache.max_entries.unwrap_or(DEFAULT_CACHE_MAX_ENTRIES);
    let max_entries = usize::try_from(max_entries_value)
        .ok()
        .and_then(NonZeroUsize::new)
        .ok_or_else(|| {
            LoadError::invalid(
                "cache.max_entries",
                "must be greater than zero and fit in usize",
            )
        })?;

    let stale_after_seconds = cache
        .stale_after_seconds
        .unwrap_or(DEFAULT_CACHE_STALE_AFTER_SECS);
    let stale_after = (stale_after_seconds > 0).then(|| Duration::from_secs(stale_after_seconds));

    Ok(CacheSettings {
        max_entries,
        stale_after,
        refetch_active_on_invalidate: cache.refetch_active_on_invalidate.unwrap_or(true),
    })
}

fn build_pagination_settings(
    pagination: RawPaginationSettings,
) -> Result<PaginationSettings, LoadError> {
    let page_size = non_zero_u32(
        pagination.page_size.unwrap_or(DEFAULT_PAGE_SIZE.into()),
        "pagination.page_size",
    )?;

    Ok(PaginationSettings {
        page_size,
        keep_previous_page: pagination.keep_previous_page.unwrap_or(false),
    })
}

fn build_scrape_settings(scrape: RawScrapeSettings) -> Result<ScrapeSettings, LoadError> {
    let default_source_url = parse_http_url(
        scrape
            .default_source_url
            .as_deref()
            .unwrap_or(DEFAULT_SCRAPE_SOURCE_URL),
        "scrape.default_source_url",
    )?;

    Ok(ScrapeSettings {
        default_source_url,
        max_auto_retries: scrape.max_auto_retries.unwrap_or(DEFAULT_MAX_AUTO_RETRIES),
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
struct RawApiSettings {
    base_url: Option<String>,
    timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    max_entries: Option<u64>,
    stale_after_seconds: Option<u64>,
    refetch_active_on_invalidate: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawPaginationSettings {
    page_size: Option<u64>,
    keep_previous_page: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawScrapeSettings {
    default_source_url: Option<String>,
    max_auto_retries: Option<u32>,
}

/// Parse an absolute `http`/`https` URL.
pub fn parse_http_url(value: &str, key: &'static str) -> Result<Url, LoadError> {
    let url = Url::parse(value.trim())
        .map_err(|err| LoadError::invalid(key, format!("invalid URL `{value}`: {err}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(LoadError::invalid(
            key,
            format!("unsupported scheme `{}`", url.scheme()),
        ));
    }
    Ok(url)
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}
