use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde_json::{Value, json};

use cardiovar_infra::jobs::{InMemoryJobStore, Job, JobRegistry, JobState};
use cardiovar_infra::{CacheStore, Settings};

use crate::annotate::VariantAnnotator;
use crate::cli::{AnnotateArgs, BatchArgs};
use crate::print_json;

fn registry<C: CacheStore + 'static>(
    settings: &Settings,
    cache: C,
    force_live: bool,
) -> Result<JobRegistry<InMemoryJobStore>> {
    let chain = cardiovar_upstream::default_chain(settings, cache).context("failed to build source chain")?;
    let annotator = VariantAnnotator::new(Arc::new(chain), force_live);
    Ok(JobRegistry::new(InMemoryJobStore::new(), annotator))
}

fn finish(job: &Job) -> Result<()> {
    print_json(job)?;
    if job.state == JobState::Failed {
        bail!("job {} failed: {}", job.id, job.error.as_deref().unwrap_or("unknown error"));
    }
    Ok(())
}

pub fn annotate<C: CacheStore + 'static>(settings: &Settings, cache: C, args: AnnotateArgs) -> Result<()> {
    let registry = registry(settings, cache, args.force_live)?;
    let input = json!({
        "chrom": args.chrom,
        "pos": args.pos,
        "ref": args.reference,
        "alt": args.alternate,
        "gene": args.gene,
    });

    let id = registry.submit_single(input)?;
    eprintln!("submitted job {id}");
    let job = registry.wait(id, Duration::from_secs(args.timeout_secs))?;
    finish(&job)
}

/// Batch input: a JSON array of variant objects.
pub fn read_batch(raw: &str) -> Result<Vec<Value>> {
    let parsed: Value = serde_json::from_str(raw).context("batch file is not valid JSON")?;
    match parsed {
        Value::Array(items) if !items.is_empty() => Ok(items),
        Value::Array(_) => bail!("batch file holds no variants"),
        _ => bail!("batch file must hold a JSON array"),
    }
}

pub fn batch<C: CacheStore + 'static>(settings: &Settings, cache: C, args: BatchArgs) -> Result<()> {
    let raw = std::fs::read_to_string(&args.file)
        .with_context(|| format!("failed to read {}", args.file.display()))?;
    let inputs = read_batch(&raw)?;

    let registry = registry(settings, cache, args.force_live)?;
    let id = registry.submit_batch(inputs)?;
    eprintln!("submitted batch job {id}");

    let mut last = None;
    let job = registry.wait_with(id, Duration::from_secs(args.timeout_secs), |job| {
        if let Some(progress) = job.progress().filter(|p| Some(*p) != last) {
            eprintln!("[{}] {}/{}", job.state, progress.0, progress.1);
            last = Some(progress);
        }
    })?;

    let failed = job.items().iter().filter(|item| !item.is_success()).count();
    if failed > 0 {
        tracing::warn!(job_id = %id, failed, "some batch items failed");
    }
    finish(&job)
}
