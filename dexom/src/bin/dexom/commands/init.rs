use anyhow::{Context, Result, bail};
use clap::Args;

use crate::config::{CONFIG_DIR, Config};
use crate::output::Printer;

pub const AFTER_HELP: &str = "Examples:\n  dexom init\n  dexom init --prefix myapp --redis-url redis://localhost:6379";

#[derive(Args)]
pub struct InitArgs {
    /// Key prefix the application's datastore writes under
    #[arg(long)]
    prefix: Option<String>,

    /// Redis URL, or `${VAR}` to read it from the environment
    #[arg(long)]
    redis_url: Option<String>,

    /// Replace an existing config
    #[arg(long)]
    force: bool,
}

impl InitArgs {
    fn config(self) -> Config {
        let mut config = Config::default();
        if let Some(prefix) = self.prefix {
            config.dexom.prefix = prefix;
        }
        if let Some(url) = self.redis_url {
            config.redis.url = url;
        }
        config
    }
}

pub async fn run(args: InitArgs, printer: &Printer) -> Result<()> {
    let dir = std::env::current_dir().context("reading the current directory")?;
    let path = Config::path_in(&dir);
    if path.exists() && !args.force {
        bail!("{} already exists; pass --force to replace it", path.display());
    }

    let config = args.config();
    tokio::fs::create_dir_all(dir.join(CONFIG_DIR))
        .await
        .with_context(|| format!("creating {CONFIG_DIR}"))?;
    tokio::fs::write(&path, toml::to_string_pretty(&config)?)
        .await
        .with_context(|| format!("writing {}", path.display()))?;

    printer.status(&format!(
        "wrote {} (prefix {}, redis {})",
        path.display(),
        config.dexom.prefix,
        config.redis.url
    ));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_defaults() {
        let args = InitArgs {
            prefix: Some("myapp".to_string()),
            redis_url: None,
            force: false,
        };
        let config = args.config();
        assert_eq!(config.dexom.prefix, "myapp");
        assert_eq!(config.redis.url, "${REDIS_URL}");

        let written = toml::to_string_pretty(&config).unwrap();
        let back: Config = toml::from_str(&written).unwrap();
        assert_eq!(back, config);
    }
}
