use crate::config::{PatternMode, TaskConfig};
use crate::url::normalize::resolve_url;
use crate::ConfigError;
use regex::Regex;
use url::Url;

/// A single compiled include or exclude rule
#[derive(Debug, Clone)]
enum Rule {
    /// Prefix rule starting with `/`: compared with the path, seed host only
    PathPrefix(String),
    /// Any other prefix rule: compared with the full URL string
    UrlPrefix(String),
    /// Regex rule: searched anywhere in the full URL string
    Pattern(Regex),
}

impl Rule {
    fn compile(raw: &str, mode: PatternMode) -> Result<Self, ConfigError> {
        let raw = raw.trim();
        match mode {
            PatternMode::Prefix if raw.starts_with('/') => Ok(Self::PathPrefix(raw.to_string())),
            PatternMode::Prefix => Ok(Self::UrlPrefix(raw.to_string())),
            PatternMode::Regex => Regex::new(raw)
                .map(Self::Pattern)
                .map_err(|e| ConfigError::InvalidPattern(format!("'{}': {}", raw, e))),
        }
    }

    fn matches(&self, url: &Url, on_seed_host: bool) -> bool {
        match self {
            Self::PathPrefix(prefix) => on_seed_host && url.path().starts_with(prefix.as_str()),
            Self::UrlPrefix(prefix) => url.as_str().starts_with(prefix.as_str()),
            Self::Pattern(re) => re.is_match(url.as_str()),
        }
    }
}

/// Decides whether a discovered URL belongs to a task
///
/// The filter is compiled once per task from its configuration and seed URL.
///
/// # Rules
///
/// 1. Only http and https URLs are considered
/// 2. Exclude rules win over include rules
/// 3. With include rules, the URL must match at least one of them. A match
///    counts as an explicit inclusion, even on another host
/// 4. Without include rules, the URL must be on the seed host
///
/// Candidates may be absolute URLs or paths; paths resolve against the seed.
///
/// # Examples
///
/// ```
/// use markdoc::config::TaskConfig;
/// use markdoc::url::UrlFilter;
/// use url::Url;
///
/// let seed = Url::parse("https://example.com/").unwrap();
/// let config = TaskConfig {
///     include_patterns: vec!["/docs/".to_string()],
///     exclude_patterns: vec!["/docs/internal/".to_string()],
///     ..TaskConfig::default()
/// };
/// let filter = UrlFilter::new(&seed, &config).unwrap();
///
/// assert!(filter.matches("/docs/guide"));
/// assert!(!filter.matches("/docs/internal/x"));
/// assert!(!filter.matches("/blog/"));
/// ```
#[derive(Debug, Clone)]
pub struct UrlFilter {
    seed: Url,
    include: Vec<Rule>,
    exclude: Vec<Rule>,
}

impl UrlFilter {
    /// Compiles the include and exclude rules of a task
    ///
    /// # Returns
    ///
    /// * `Ok(UrlFilter)` - All rules compiled
    /// * `Err(ConfigError::InvalidPattern)` - A regex failed to compile
    pub fn new(seed: &Url, config: &TaskConfig) -> Result<Self, ConfigError> {
        let compile = |rules: &[String]| -> Result<Vec<Rule>, ConfigError> {
            rules
                .iter()
                .filter(|r| !r.trim().is_empty())
                .map(|r| Rule::compile(r, config.pattern_mode))
                .collect()
        };

        Ok(Self {
            seed: seed.clone(),
            include: compile(&config.include_patterns)?,
            exclude: compile(&config.exclude_patterns)?,
        })
    }

    /// Returns the seed URL the filter scopes against
    pub fn seed(&self) -> &Url {
        &self.seed
    }

    /// Checks a candidate given as an absolute URL or a path
    ///
    /// Unparseable candidates and non-http(s) schemes never match.
    pub fn matches(&self, candidate: &str) -> bool {
        match resolve_url(&self.seed, candidate) {
            Ok(url) => self.matches_url(&url),
            Err(_) => false,
        }
    }

    /// Checks an already parsed URL
    pub fn matches_url(&self, url: &Url) -> bool {
        if url.scheme() != "http" && url.scheme() != "https" {
            return false;
        }

        let on_seed_host = self.is_seed_host(url);

        if self.exclude.iter().any(|rule| rule.matches(url, on_seed_host)) {
            return false;
        }

        if self.include.is_empty() {
            on_seed_host
        } else {
            self.include.iter().any(|rule| rule.matches(url, on_seed_host))
        }
    }

    fn is_seed_host(&self, url: &Url) -> bool {
        url.host_str() == self.seed.host_str()
            && url.port_or_known_default() == self.seed.port_or_known_default()
    }
}
