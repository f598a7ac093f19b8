pub mod codec;
pub mod engine;
pub mod error;
pub mod filter;
pub(crate) mod parser;
pub mod reader;
pub mod record;
pub mod record_set;
pub mod types;

pub use codec::{AlleleSummary, Carriers, Extract, OutputMode, VariantKey};
pub use engine::{Engine, Representation};
pub use error::{Error, Result};
pub use filter::{Filter, FilterOp, Region};
pub use reader::{IndexedBacking, IndexedSource, TabixBacking, VcfRecords};
pub use record::{Genotype, GenotypeAllele, Variant};
pub use record_set::RecordSet;
pub use types::{Header, Sample, Value, VarType};
