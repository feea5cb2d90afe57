use anyhow::{Context, Result};
use serde_json::json;

use cardiovar_infra::CacheStore;

use crate::cli::CacheCommands;
use crate::print_json;

pub fn run(cache: &impl CacheStore, command: CacheCommands) -> Result<()> {
    match command {
        CacheCommands::Get { key } => {
            let entry = cache.entry(&key).with_context(|| format!("failed to read {key}"))?;
            match entry {
                Some(entry) => {
                    let expired = entry.is_expired(chrono::Utc::now());
                    print_json(&json!({"entry": entry, "expired": expired}))
                }
                None => anyhow::bail!("no cache entry for {key}"),
            }
        }
        CacheCommands::Invalidate { key } => {
            let removed = cache.invalidate(&key)?;
            print_json(&json!({"key": key, "removed": removed}))
        }
        CacheCommands::InvalidatePattern { pattern } => {
            let removed = cache.invalidate_pattern(&pattern)?;
            print_json(&json!({"pattern": pattern, "removed": removed}))
        }
        CacheCommands::Sweep => {
            let removed = cache.sweep_expired()?;
            print_json(&json!({"expired_removed": removed}))
        }
        CacheCommands::Clear => {
            let removed = cache.clear_all()?;
            print_json(&json!({"removed": removed}))
        }
        CacheCommands::Stats => print_json(&cache.stats()?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cardiovar_infra::InMemoryCacheStore;

    #[test]
    fn admin_commands_touch_the_store() {
        let cache = InMemoryCacheStore::new(chrono::Duration::hours(1));
        cache.set("gnomad:chr1:1:A:T", &json!(0.1), None).unwrap();
        cache.set("gnomad:chr1:2:A:T", &json!(0.2), None).unwrap();
        cache.set("clinvar:chr1:2:A:T", &json!({}), None).unwrap();

        run(&cache, CacheCommands::Get { key: "gnomad:chr1:1:A:T".into() }).unwrap();
        assert!(run(&cache, CacheCommands::Get { key: "missing".into() }).is_err());

        run(&cache, CacheCommands::InvalidatePattern { pattern: "gnomad:*".into() }).unwrap();
        assert_eq!(cache.stats().unwrap().total, 1);

        run(&cache, CacheCommands::Clear).unwrap();
        assert_eq!(cache.stats().unwrap().total, 0);
    }
}
