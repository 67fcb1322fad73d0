//! Server configuration

use std::env;
use std::str::FromStr;

/// Security and resource configuration for the PDF Assembler server
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    /// Directories that input and output paths must stay within
    /// (empty = unrestricted)
    pub resource_dirs: Vec<String>,
    /// Allow URLs that resolve to private/reserved IPs (default: false)
    pub allow_private_urls: bool,
    /// Maximum download size in bytes for URL sources (default: 100MB)
    pub max_download_bytes: u64,
    /// Maximum total bytes in cache (default: 512MB)
    pub cache_max_bytes: usize,
    /// Maximum number of cache entries (default: 100)
    pub cache_max_entries: usize,
    /// Maximum number of documents in one merge (default: 64)
    pub max_sources: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            resource_dirs: Vec::new(),
            allow_private_urls: false,
            max_download_bytes: 100 * 1024 * 1024, // 100MB
            cache_max_bytes: 512 * 1024 * 1024,    // 512MB
            cache_max_entries: 100,
            max_sources: 64,
        }
    }
}

impl ServerConfig {
    /// Create configuration from environment variables
    ///
    /// Environment variables:
    /// - `PDF_ASSEMBLER_RESOURCE_DIRS`: comma or colon separated directories
    /// - `PDF_ASSEMBLER_ALLOW_PRIVATE_URLS`: "true" / "false"
    /// - `PDF_ASSEMBLER_MAX_DOWNLOAD_BYTES`
    /// - `PDF_ASSEMBLER_CACHE_MAX_BYTES`
    /// - `PDF_ASSEMBLER_CACHE_MAX_ENTRIES`
    /// - `PDF_ASSEMBLER_MAX_SOURCES`
    ///
    /// Missing or unparsable values keep their defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let resource_dirs = lookup("PDF_ASSEMBLER_RESOURCE_DIRS")
            .map(|dirs| {
                dirs.split([',', ':'])
                    .map(str::trim)
                    .filter(|d| !d.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or(defaults.resource_dirs);

        Self {
            resource_dirs,
            allow_private_urls: parse_var(&lookup, "PDF_ASSEMBLER_ALLOW_PRIVATE_URLS")
                .unwrap_or(defaults.allow_private_urls),
            max_download_bytes: parse_var(&lookup, "PDF_ASSEMBLER_MAX_DOWNLOAD_BYTES")
                .unwrap_or(defaults.max_download_bytes),
            cache_max_bytes: parse_var(&lookup, "PDF_ASSEMBLER_CACHE_MAX_BYTES")
                .unwrap_or(defaults.cache_max_bytes),
            cache_max_entries: parse_var(&lookup, "PDF_ASSEMBLER_CACHE_MAX_ENTRIES")
                .unwrap_or(defaults.cache_max_entries),
            max_sources: parse_var(&lookup, "PDF_ASSEMBLER_MAX_SOURCES")
                .unwrap_or(defaults.max_sources),
        }
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|s| s.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert!(config.resource_dirs.is_empty());
        assert!(!config.allow_private_urls);
        assert_eq!(config.max_download_bytes, 100 * 1024 * 1024);
        assert_eq!(config.cache_max_bytes, 512 * 1024 * 1024);
        assert_eq!(config.cache_max_entries, 100);
        assert_eq!(config.max_sources, 64);
    }

    #[test]
    fn test_from_env_empty_is_default() {
        assert_eq!(ServerConfig::from_lookup(lookup(&[])), ServerConfig::default());
    }

    #[test]
    fn test_from_env_values() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("PDF_ASSEMBLER_RESOURCE_DIRS", "/srv/in, /srv/out:/tmp"),
            ("PDF_ASSEMBLER_ALLOW_PRIVATE_URLS", "true"),
            ("PDF_ASSEMBLER_CACHE_MAX_ENTRIES", "5"),
            ("PDF_ASSEMBLER_MAX_SOURCES", "not-a-number"),
        ]));
        assert_eq!(config.resource_dirs, vec!["/srv/in", "/srv/out", "/tmp"]);
        assert!(config.allow_private_urls);
        assert_eq!(config.cache_max_entries, 5);
        assert_eq!(config.max_sources, 64);
    }
}
