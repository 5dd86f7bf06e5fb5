use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

pub const CONFIG_DIR: &str = ".dexom";
pub const CONFIG_FILE: &str = "config.toml";

/// `.dexom/config.toml`.
///
/// ```toml
/// [dexom]
/// prefix = "dexom"
///
/// [redis]
/// url = "${REDIS_URL}"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub dexom: StoreSection,
    #[serde(default)]
    pub redis: RedisSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreSection {
    /// Must match the prefix the application's `RedisDatastore` uses.
    pub prefix: String,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            prefix: "dexom".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedisSection {
    pub url: String,
}

impl Default for RedisSection {
    fn default() -> Self {
        Self {
            url: "${REDIS_URL}".to_string(),
        }
    }
}

/// A config file and the directory it was found in.
pub struct Located {
    pub path: PathBuf,
    pub config: Config,
}

impl Config {
    pub fn path_in(dir: &Path) -> PathBuf {
        dir.join(CONFIG_DIR).join(CONFIG_FILE)
    }

    /// Nearest config at or above `start`.
    pub fn locate(start: &Path) -> Result<Option<Located>> {
        for dir in start.ancestors() {
            let path = Self::path_in(dir);
            if path.is_file() {
                let text = std::fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
                let config = toml::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
                return Ok(Some(Located { path, config }));
            }
        }
        Ok(None)
    }

    /// Like [`Config::locate`] from the working directory, but a missing config is an error.
    pub fn require() -> Result<Located> {
        let cwd = std::env::current_dir().context("reading the current directory")?;
        match Self::locate(&cwd)? {
            Some(located) => Ok(located),
            None => bail!("no {CONFIG_DIR}/{CONFIG_FILE} here or in a parent directory; run `dexom init`"),
        }
    }

    /// Redis URL with a `${VAR}` value read from the environment.
    pub fn redis_url(&self) -> Result<String> {
        expand(&self.redis.url)
    }
}

fn expand(value: &str) -> Result<String> {
    let Some(name) = value.strip_prefix("${").and_then(|rest| rest.strip_suffix('}')) else {
        return Ok(value.to_string());
    };
    std::env::var(name).with_context(|| format!("{name} is not set; the config reads the Redis URL from it"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_sections_take_defaults() {
        let config: Config = toml::from_str("[dexom]\nprefix = \"app\"\n").unwrap();
        assert_eq!(config.dexom.prefix, "app");
        assert_eq!(config.redis, RedisSection::default());
    }

    #[test]
    fn locate_walks_up_to_the_nearest_config() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir(root.path().join(CONFIG_DIR)).unwrap();
        std::fs::write(
            Config::path_in(root.path()),
            "[dexom]\nprefix = \"app\"\n\n[redis]\nurl = \"redis://127.0.0.1:6379\"\n",
        )
        .unwrap();
        let nested = root.path().join("src/bin");
        std::fs::create_dir_all(&nested).unwrap();

        let located = Config::locate(&nested).unwrap().expect("config above src/bin");
        assert_eq!(located.path, Config::path_in(root.path()));
        assert_eq!(located.config.dexom.prefix, "app");
        assert_eq!(located.config.redis_url().unwrap(), "redis://127.0.0.1:6379");
    }

    #[test]
    fn locate_without_config_is_none() {
        let root = tempfile::tempdir().unwrap();
        assert!(Config::locate(root.path()).unwrap().is_none());
    }

    #[test]
    fn only_whole_variable_references_expand() {
        assert_eq!(expand("redis://localhost").unwrap(), "redis://localhost");
        assert!(expand("${DEXOM_TEST_UNSET_VARIABLE}").is_err());
    }
}
