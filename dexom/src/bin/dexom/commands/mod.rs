pub mod init;
pub mod inspect;
pub mod query;

use anyhow::{Context, Result};
use dexom::{ConnectionManager, KeyId, RedisDatastore};

use crate::config::Config;
use crate::output::Printer;

/// Open the datastore described by the nearest config.
async fn open_store(printer: &Printer) -> Result<RedisDatastore<ConnectionManager>> {
    let located = Config::require()?;
    let url = located.config.redis_url()?;
    printer.status(&format!("using {}", located.path.display()));
    RedisDatastore::connect(&url, located.config.dexom.prefix.clone())
        .await
        .with_context(|| format!("connecting to {url}"))
}

/// Digits address allocated ids; anything else is a key name.
fn key_id(raw: &str) -> KeyId {
    raw.parse::<i64>().map_or_else(|_| KeyId::Name(raw.to_string()), KeyId::Id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_and_names() {
        assert_eq!(key_id("2"), KeyId::Id(2));
        assert_eq!(key_id("-7"), KeyId::Id(-7));
        assert_eq!(key_id("alice"), KeyId::Name("alice".to_string()));
        assert_eq!(key_id("007x"), KeyId::Name("007x".to_string()));
    }
}
