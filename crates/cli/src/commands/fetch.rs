use anyhow::{Context, Result};

use cardiovar_core::SourceKey;
use cardiovar_infra::{CacheStore, Settings};

use crate::cli::FetchArgs;
use crate::print_json;

pub fn run<C: CacheStore>(settings: &Settings, cache: C, args: FetchArgs) -> Result<()> {
    let key = SourceKey::from_parts(args.parts);
    args.kind
        .validate(&key)
        .with_context(|| format!("bad key for {}", args.kind))?;

    let chain = cardiovar_upstream::default_chain(settings, cache).context("failed to build source chain")?;
    let outcome = chain
        .fetch(args.kind, &key, args.force_live)
        .with_context(|| format!("fetch {} {key} failed", args.kind))?;
    if outcome.provenance.is_degraded() {
        tracing::warn!(kind = %args.kind, provenance = %outcome.provenance, "live data unavailable");
    }
    print_json(&outcome)
}
