use std::collections::BTreeSet;
use std::path::Path;
use std::sync::OnceLock;

use getset::Getters;
use itertools::Itertools;
use log::debug;
use multimap::MultiMap;

use crate::error::{Error, Result};
use crate::filter::{FilterOp, Region};
use crate::reader::VcfRecords;
use crate::record::Variant;
use crate::types::{Sample, VarType};

type Locus = (String, u64);

/// An owned, in-memory sequence of variants sharing one sample list.
///
/// Every filter returns a new set and leaves `samples` unchanged; only the
/// FILTER-tag filter touches genotypes, and only by marking them pruned.
#[derive(Debug, Clone, Default, Getters)]
pub struct RecordSet {
    #[getset(get = "pub")]
    records: Vec<Variant>,
    #[getset(get = "pub")]
    samples: Vec<Sample>,
    loci: OnceLock<MultiMap<Locus, usize>>,
}

impl RecordSet {
    /// Every record must carry one genotype per sample, or none at all.
    pub fn new(records: Vec<Variant>, samples: Vec<Sample>) -> Result<Self> {
        if let Some(dup) = samples.iter().duplicates().next() {
            return Err(Error::DuplicateSample(dup.clone()));
        }
        if let Some(v) = records
            .iter()
            .find(|v| !v.genotypes.is_empty() && v.genotypes.len() != samples.len())
        {
            return Err(Error::SampleMismatch {
                locus: v.locus(),
                found: v.genotypes.len(),
                expected: samples.len(),
            });
        }
        Ok(Self::from_parts(records, samples))
    }

    fn from_parts(records: Vec<Variant>, samples: Vec<Sample>) -> Self {
        RecordSet {
            records,
            samples,
            loci: OnceLock::new(),
        }
    }

    /// Read a whole (plain or gzip compressed) VCF into memory; no index needed.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let records = VcfRecords::from_path(path)?;
        let samples = records.header().samples.clone();
        let records = records.collect::<Result<Vec<_>>>()?;
        Self::new(records, samples)
    }

    /// Concatenate sets that share `samples`, keeping input order.
    pub(crate) fn concat<'a, I>(sets: I, samples: Vec<Sample>) -> Self
    where
        I: IntoIterator<Item = &'a RecordSet>,
    {
        let records = sets
            .into_iter()
            .flat_map(|set| set.records.iter().cloned())
            .collect();
        Self::from_parts(records, samples)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn into_records(self) -> Vec<Variant> {
        self.records
    }

    /// Variants at exactly `chrom:pos`, in record order.
    pub fn at(&self, chrom: &str, pos: u64) -> Vec<&Variant> {
        let loci = self.loci.get_or_init(|| {
            self.records
                .iter()
                .enumerate()
                .map(|(i, v)| ((v.chrom.clone(), v.pos), i))
                .collect()
        });
        loci.get_vec(&(chrom.to_owned(), pos))
            .map(|idx| idx.iter().map(|&i| &self.records[i]).collect())
            .unwrap_or_default()
    }

    fn retain<F>(&self, keep: F) -> Self
    where
        F: Fn(&Variant) -> bool,
    {
        let records = self.records.iter().filter(|v| keep(v)).cloned().collect();
        Self::from_parts(records, self.samples.clone())
    }

    /// Keep variants on the region's chromosome with `start <= pos <= end`.
    pub fn region(&self, region: &Region) -> Self {
        self.retain(|v| region.contains(v))
    }

    /// Drop variants whose FILTER column intersects `names` and prune the
    /// genotypes whose `FT` intersects `names`.
    ///
    /// A variant whose genotypes are all pruned is dropped. A variant without
    /// genotypes, or with some genotypes left, is kept.
    pub fn filter_tags(&self, names: &BTreeSet<String>) -> Self {
        let records = self
            .records
            .iter()
            .filter_map(|v| prune_genotypes(v, names))
            .collect();
        Self::from_parts(records, self.samples.clone())
    }

    /// Keep variants with at least one ALT allele of the given types.
    pub fn vartypes(&self, types: &BTreeSet<VarType>) -> Self {
        self.retain(|v| !v.vartypes().is_disjoint(types))
    }

    /// Keep variants with at most `n` ALT alleles.
    pub fn max_alleles(&self, n: usize) -> Self {
        self.retain(|v| v.alt_alleles.len() <= n)
    }

    /// Apply one record-level operation. Sample narrowing and merging are not
    /// record predicates and are rejected.
    pub fn apply(&self, op: &FilterOp) -> Result<Self> {
        let filtered = match op {
            FilterOp::Region { chrom, start, end } => {
                self.region(&Region::new(chrom.as_str(), *start, *end)?)
            }
            FilterOp::FilterTags { names } => self.filter_tags(names),
            FilterOp::VarTypes { types } => self.vartypes(types),
            FilterOp::MaxAlleles { n } => self.max_alleles(*n),
            FilterOp::Samples { .. } | FilterOp::Merge { .. } => {
                return Err(Error::UnsupportedOperation(format!(
                    "{} cannot be applied to materialized records",
                    op
                )))
            }
        };
        debug!("{}: {} -> {} records", op, self.len(), filtered.len());
        Ok(filtered)
    }
}

fn prune_genotypes(variant: &Variant, names: &BTreeSet<String>) -> Option<Variant> {
    if let Some(tags) = &variant.filter_tags {
        if !tags.is_disjoint(names) {
            return None;
        }
    }
    if variant.genotypes.is_empty() {
        return Some(variant.clone());
    }
    let mut variant = variant.clone();
    let mut tagged = false;
    for genotype in variant.genotypes.iter_mut() {
        if let Some(tags) = &genotype.filter_tags {
            tagged = true;
            if !tags.is_disjoint(names) {
                genotype.pruned = true;
            }
        }
    }
    let retained = variant.genotypes.iter().filter(|g| !g.pruned).count();
    if retained == 0 && tagged {
        return None;
    }
    Some(variant)
}
