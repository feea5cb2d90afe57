//! Pre-seeded local datasets consulted when the live tier fails.
//!
//! Each dataset is indexed by the logical identity of the record, which is not
//! necessarily the cache key: gene-level data is looked up by symbol, variant
//! frequencies by `"<chrom>-<pos>-<ref>-<alt>"` without the `chr` prefix.

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use serde_json::{Map, Value};
use thiserror::Error;

use cardiovar_core::{DataKind, SourceKey};

/// Fallback lookup seam used by the source chain.
pub trait FallbackSource: Send + Sync {
    fn lookup(&self, key: &SourceKey) -> Option<Value>;
}

impl<F> FallbackSource for F
where
    F: Fn(&SourceKey) -> Option<Value> + Send + Sync,
{
    fn lookup(&self, key: &SourceKey) -> Option<Value> {
        self(key)
    }
}

/// Dataset load error.
#[derive(Debug, Error)]
pub enum FallbackError {
    #[error("failed to read fallback file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse fallback file {path}: {message}")]
    Parse { path: String, message: String },
}

/// How a source key maps onto a dataset index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyIndex {
    /// Key part 0 verbatim (gene symbol).
    Gene,
    /// Key part 0 upper-cased.
    GeneUpper,
    /// `"<chrom w/o chr>-<pos>-<ref>-<alt>"`.
    VariantDashed,
    /// All key parts joined with `:`.
    Joined,
    /// `chr`-prefixed chromosome mapped to a representative gene symbol.
    ChromGene(BTreeMap<String, String>),
}

impl KeyIndex {
    pub fn index_key(&self, key: &SourceKey) -> Option<String> {
        match self {
            KeyIndex::Gene => key.part(0).ok().map(str::to_string),
            KeyIndex::GeneUpper => key.part(0).ok().map(str::to_ascii_uppercase),
            KeyIndex::VariantDashed => {
                let chrom = key.bare_chrom().ok()?;
                let rest = key.parts().get(1..4)?;
                Some(format!("{chrom}-{}", rest.join("-")))
            }
            KeyIndex::Joined => Some(key.parts().join(":")),
            KeyIndex::ChromGene(genes) => {
                let chrom = key.bare_chrom().ok()?;
                genes.get(&format!("chr{chrom}")).cloned()
            }
        }
    }

    /// Demo chromosome → gene table used for exon-structure fallback.
    pub fn demo_chrom_genes() -> Self {
        KeyIndex::ChromGene(
            [("chr22", "MYH9"), ("chr1", "PCSK9"), ("chr2", "APOB"), ("chr3", "MYL3")]
                .into_iter()
                .map(|(c, g)| (c.to_string(), g.to_string()))
                .collect(),
        )
    }
}

/// In-memory static dataset.
#[derive(Debug, Clone)]
pub struct StaticDataset {
    name: String,
    index: KeyIndex,
    records: HashMap<String, Value>,
}

impl StaticDataset {
    pub fn from_records(name: impl Into<String>, index: KeyIndex, records: HashMap<String, Value>) -> Self {
        Self {
            name: name.into(),
            index,
            records,
        }
    }

    pub fn empty(name: impl Into<String>, index: KeyIndex) -> Self {
        Self::from_records(name, index, HashMap::new())
    }

    /// JSON object file: `{ "<index>": <value>, ... }`.
    pub fn from_json_map(path: &Path, index: KeyIndex) -> Result<Self, FallbackError> {
        let name = dataset_name(path);
        let value = read_json(path)?;
        let Value::Object(map) = value else {
            return Err(parse_error(path, "expected a JSON object"));
        };
        Ok(Self::from_records(name, index, map.into_iter().collect()))
    }

    /// JSON array file of objects, indexed by `field`, optionally reshaped.
    pub fn from_json_records(
        path: &Path,
        field: &str,
        index: KeyIndex,
        project: Option<fn(&Value) -> Value>,
    ) -> Result<Self, FallbackError> {
        let name = dataset_name(path);
        let value = read_json(path)?;
        let Value::Array(items) = value else {
            return Err(parse_error(path, "expected a JSON array"));
        };

        let mut records = HashMap::with_capacity(items.len());
        for item in items {
            let Some(id) = item.get(field).and_then(Value::as_str) else {
                continue;
            };
            let id = normalise(&index, id);
            let record = match project {
                Some(f) => f(&item),
                None => item.clone(),
            };
            // First record wins, like a linear scan would.
            records.entry(id).or_insert(record);
        }
        Ok(Self::from_records(name, index, records))
    }

    /// JSON array file of objects grouped into arrays by the `:`-joined
    /// values of `fields`. Numbers are joined in their decimal form.
    pub fn from_json_grouped(path: &Path, fields: &[&str], index: KeyIndex) -> Result<Self, FallbackError> {
        let name = dataset_name(path);
        let value = read_json(path)?;
        let Value::Array(items) = value else {
            return Err(parse_error(path, "expected a JSON array"));
        };

        let mut grouped: HashMap<String, Vec<Value>> = HashMap::new();
        for item in items {
            let parts: Option<Vec<String>> = fields
                .iter()
                .map(|field| match item.get(*field)? {
                    Value::String(s) => Some(s.clone()),
                    Value::Number(n) => Some(n.to_string()),
                    _ => None,
                })
                .collect();
            let Some(parts) = parts else { continue };
            grouped.entry(normalise(&index, &parts.join(":"))).or_default().push(item);
        }

        let records = grouped.into_iter().map(|(k, v)| (k, Value::Array(v))).collect();
        Ok(Self::from_records(name, index, records))
    }

    /// Tab-separated file grouped by `key_column` into arrays of
    /// `{column: value}` objects over `value_columns`.
    pub fn from_tsv_grouped(
        path: &Path,
        key_column: &str,
        value_columns: &[&str],
        index: KeyIndex,
    ) -> Result<Self, FallbackError> {
        let name = dataset_name(path);
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .from_path(path)
            .map_err(|e| parse_error(path, e))?;

        let headers = reader.headers().map_err(|e| parse_error(path, e))?.clone();
        let position = |column: &str| {
            headers
                .iter()
                .position(|h| h == column)
                .ok_or_else(|| parse_error(path, format!("missing column `{column}`")))
        };
        let key_at = position(key_column)?;
        let value_at = value_columns
            .iter()
            .map(|c| position(c).map(|i| (*c, i)))
            .collect::<Result<Vec<_>, _>>()?;

        let mut grouped: HashMap<String, Vec<Value>> = HashMap::new();
        for row in reader.records() {
            let row = row.map_err(|e| parse_error(path, e))?;
            let Some(id) = row.get(key_at) else { continue };
            let mut object = Map::new();
            for (column, at) in &value_at {
                let cell = row.get(*at).unwrap_or_default();
                object.insert(column.to_string(), cell_value(cell));
            }
            grouped
                .entry(normalise(&index, id))
                .or_default()
                .push(Value::Object(object));
        }

        let records = grouped.into_iter().map(|(k, v)| (k, Value::Array(v))).collect();
        Ok(Self::from_records(name, index, records))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl FallbackSource for StaticDataset {
    fn lookup(&self, key: &SourceKey) -> Option<Value> {
        let id = self.index.index_key(key)?;
        self.records.get(&id).cloned()
    }
}

fn normalise(index: &KeyIndex, id: &str) -> String {
    match index {
        KeyIndex::GeneUpper => id.to_ascii_uppercase(),
        _ => id.to_string(),
    }
}

fn cell_value(cell: &str) -> Value {
    match cell.parse::<f64>() {
        Ok(n) => serde_json::Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null),
        Err(_) => Value::String(cell.to_string()),
    }
}

fn dataset_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn read_json(path: &Path) -> Result<Value, FallbackError> {
    let file = File::open(path).map_err(|source| FallbackError::Io {
        path: path.display().to_string(),
        source,
    })?;
    serde_json::from_reader(BufReader::new(file)).map_err(|e| parse_error(path, e))
}

fn parse_error(path: &Path, message: impl std::fmt::Display) -> FallbackError {
    FallbackError::Parse {
        path: path.display().to_string(),
        message: message.to_string(),
    }
}

fn protein_domains_projection(record: &Value) -> Value {
    serde_json::json!({
        "protein_length": record.get("protein_length").cloned().unwrap_or(Value::Null),
        "protein_domains": record.get("domains").cloned().unwrap_or(Value::Array(vec![])),
    })
}

fn single_cell_projection(record: &Value) -> Value {
    record.get("expression").cloned().unwrap_or(Value::Array(vec![]))
}

fn local_gene_projection(record: &Value) -> Value {
    let mut record = record.clone();
    if let Value::Object(map) = &mut record {
        map.insert("source".to_string(), Value::from("Local Fallback"));
    }
    record
}

/// Load every known fallback file under `dir`.
///
/// A missing file yields no dataset for that kind; an unreadable file is
/// logged and skipped so a bad seed file cannot take the chain down.
pub fn load_fallback_datasets(dir: &Path) -> HashMap<DataKind, Arc<StaticDataset>> {
    type Loader = fn(&Path) -> Result<StaticDataset, FallbackError>;
    let loaders: [(DataKind, &str, Loader); 8] = [
        (DataKind::GnomadFrequency, "gnomad_fallback.json", |p| {
            StaticDataset::from_json_map(p, KeyIndex::VariantDashed)
        }),
        (DataKind::EnsemblGene, "gene_annotations.json", |p| {
            StaticDataset::from_json_records(p, "symbol", KeyIndex::Gene, Some(local_gene_projection))
        }),
        (DataKind::ProteinDomains, "protein_domains_fallback.json", |p| {
            StaticDataset::from_json_records(
                p,
                "gene_symbol",
                KeyIndex::Gene,
                Some(protein_domains_projection),
            )
        }),
        (DataKind::GtexExpression, "gtex_expression.tsv", |p| {
            StaticDataset::from_tsv_grouped(p, "gene_symbol", &["tissue", "tpm"], KeyIndex::GeneUpper)
        }),
        (DataKind::GeneStructure, "gene_structure_fallback.json", |p| {
            StaticDataset::from_json_map(p, KeyIndex::demo_chrom_genes())
        }),
        (DataKind::Phylop, "phylop_fallback.json", |p| {
            StaticDataset::from_json_map(p, KeyIndex::Joined)
        }),
        (DataKind::SingleCell, "single_cell_data.json", |p| {
            StaticDataset::from_json_records(p, "symbol", KeyIndex::Gene, Some(single_cell_projection))
        }),
        (DataKind::RelatedVariants, "related_data_fallback.json", |p| {
            StaticDataset::from_json_grouped(p, &["chrom", "pos", "ref", "alt"], KeyIndex::Joined)
        }),
    ];

    let mut datasets = HashMap::new();
    for (kind, file, load) in loaders {
        let path = dir.join(file);
        if !path.exists() {
            tracing::debug!(kind = %kind, path = %path.display(), "fallback file not found");
            continue;
        }
        match load(&path) {
            Ok(dataset) => {
                tracing::debug!(kind = %kind, records = dataset.len(), "loaded fallback dataset");
                datasets.insert(kind, Arc::new(dataset));
            }
            Err(e) => tracing::warn!(kind = %kind, error = %e, "skipping unreadable fallback dataset"),
        }
    }
    datasets
}
