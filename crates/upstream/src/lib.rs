//! `cardiovar-upstream`: live-fetch adapters for the public genomics services.
//!
//! Each adapter implements [`LiveSource`](cardiovar_infra::sources::LiveSource)
//! over a shared blocking [`HttpClient`]; response parsing lives in pure
//! `parse_*` functions so it can be tested against captured payloads.
//! [`default_chain`] assembles the full source chain from [`Settings`](cardiovar_infra::Settings).

pub mod catalog;
pub mod client;
pub mod ensembl;
pub mod gnomad;
pub mod gtex;
pub mod mygene;
pub mod myvariant;
pub mod ncbi;
pub mod ucsc;

pub use catalog::{KindDefaults, chain_with_client, default_chain};
pub use client::{Endpoints, HttpClient, USER_AGENT};
pub use ensembl::{EnsemblGene, GeneStructure, ProteinDomains};
pub use gnomad::{GnomadGene, GnomadVariant};
pub use gtex::GtexExpression;
pub use mygene::MyGene;
pub use myvariant::{MyVariantClinvar, MyVariantFrequency};
pub use ncbi::{Clinvar, Dbsnp};
pub use ucsc::{Phylop, Sequence};
