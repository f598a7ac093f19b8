//! Filter descriptions.
//!
//! A [`Filter`] collects the parameters of a combined `filter(...)` call and
//! decomposes them into [`FilterOp`]s in a fixed order (samples, region,
//! FILTER tags, variant types, allele count), so that a combined call and
//! the equivalent chain of single calls always produce the same result.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use getset::{CopyGetters, Getters};
use itertools::Itertools;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::parser;
use crate::record::Variant;
use crate::types::{Sample, VarType};

/// A closed, 1-based genomic interval on one chromosome.
#[derive(Debug, Clone, PartialEq, Eq, Getters, CopyGetters, Serialize)]
pub struct Region {
    #[getset(get = "pub")]
    chrom: String,
    #[getset(get_copy = "pub")]
    start: u64,
    #[getset(get_copy = "pub")]
    end: u64,
}

impl Region {
    pub fn new<C: Into<String>>(chrom: C, start: u64, end: u64) -> Result<Self> {
        let chrom = chrom.into();
        if start > end {
            return Err(Error::InvalidRegion(format!(
                "{}:{}-{} (start > end)",
                chrom, start, end
            )));
        }
        Ok(Region { chrom, start, end })
    }

    /// Both bounds are inclusive.
    pub fn contains(&self, variant: &Variant) -> bool {
        variant.chrom() == &self.chrom && self.start <= variant.pos() && variant.pos() <= self.end
    }
}

impl FromStr for Region {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        parser::region(s).map_err(Error::InvalidRegion)
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}-{}", self.chrom, self.start, self.end)
    }
}

/// One step in the derivation of an engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum FilterOp {
    Region { chrom: String, start: u64, end: u64 },
    Samples { names: Vec<Sample> },
    FilterTags { names: BTreeSet<String> },
    VarTypes { types: BTreeSet<VarType> },
    MaxAlleles { n: usize },
    Merge { count: usize },
}

impl From<&Region> for FilterOp {
    fn from(region: &Region) -> Self {
        FilterOp::Region {
            chrom: region.chrom.clone(),
            start: region.start,
            end: region.end,
        }
    }
}

impl fmt::Display for FilterOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterOp::Region { chrom, start, end } => {
                write!(f, "region({}:{}-{})", chrom, start, end)
            }
            FilterOp::Samples { names } => write!(f, "samples({})", names.iter().join(",")),
            FilterOp::FilterTags { names } => {
                write!(f, "filter_tags({})", names.iter().join(","))
            }
            FilterOp::VarTypes { types } => write!(f, "vartypes({})", types.iter().join(",")),
            FilterOp::MaxAlleles { n } => write!(f, "max_alleles({})", n),
            FilterOp::Merge { count } => write!(f, "merge({})", count),
        }
    }
}

/// Parameters of a combined filter call. Unset parameters are skipped.
///
/// ```
/// use vcf_engine::{Filter, Region, VarType};
///
/// let filter = Filter::new()
///     .max_alleles(2)
///     .region(Region::new("1", 100, 200).unwrap())
///     .vartypes([VarType::Snp]);
/// let ops: Vec<String> = filter.ops().iter().map(ToString::to_string).collect();
/// assert_eq!(ops, ["region(1:100-200)", "vartypes(snp)", "max_alleles(2)"]);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    region: Option<Region>,
    samples: Option<Vec<Sample>>,
    filter_tags: Option<BTreeSet<String>>,
    vartypes: Option<BTreeSet<VarType>>,
    max_alleles: Option<usize>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn region(mut self, region: Region) -> Self {
        self.region = Some(region);
        self
    }

    pub fn samples<I>(mut self, names: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Sample>,
    {
        self.samples = Some(names.into_iter().map(Into::into).collect());
        self
    }

    pub fn filter_tags<I>(mut self, names: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.filter_tags = Some(names.into_iter().map(Into::into).collect());
        self
    }

    pub fn vartypes<I: IntoIterator<Item = VarType>>(mut self, types: I) -> Self {
        self.vartypes = Some(types.into_iter().collect());
        self
    }

    pub fn max_alleles(mut self, n: usize) -> Self {
        self.max_alleles = Some(n);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.ops().is_empty()
    }

    /// Decompose into single operations, in application order.
    pub fn ops(&self) -> Vec<FilterOp> {
        let mut ops = Vec::new();
        if let Some(names) = &self.samples {
            ops.push(FilterOp::Samples {
                names: names.clone(),
            });
        }
        if let Some(region) = &self.region {
            ops.push(FilterOp::from(region));
        }
        if let Some(names) = &self.filter_tags {
            ops.push(FilterOp::FilterTags {
                names: names.clone(),
            });
        }
        if let Some(types) = &self.vartypes {
            ops.push(FilterOp::VarTypes {
                types: types.clone(),
            });
        }
        if let Some(n) = self.max_alleles {
            ops.push(FilterOp::MaxAlleles { n });
        }
        ops
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_bounds_are_inclusive() {
        let region = Region::new("1", 100, 200).unwrap();
        assert!(region.contains(&Variant::new("1", 100, "A", ["T"])));
        assert!(region.contains(&Variant::new("1", 200, "A", ["T"])));
        assert!(!region.contains(&Variant::new("1", 99, "A", ["T"])));
        assert!(!region.contains(&Variant::new("1", 201, "A", ["T"])));
        assert!(!region.contains(&Variant::new("2", 150, "A", ["T"])));
    }

    #[test]
    fn test_region_rejects_reversed_bounds() {
        assert!(matches!(
            Region::new("1", 10, 9),
            Err(Error::InvalidRegion(_))
        ));
        assert!("1:10-9".parse::<Region>().is_err());
        assert_eq!(
            "1:10-20".parse::<Region>().unwrap(),
            Region::new("1", 10, 20).unwrap()
        );
    }

    #[test]
    fn test_ops_order_is_fixed() {
        let a = Filter::new()
            .max_alleles(1)
            .filter_tags(["LowQual"])
            .samples(["s2", "s1"])
            .region(Region::new("1", 1, 5).unwrap());
        let b = Filter::new()
            .region(Region::new("1", 1, 5).unwrap())
            .samples(["s2", "s1"])
            .filter_tags(["LowQual"])
            .max_alleles(1);
        assert_eq!(a.ops(), b.ops());
        assert!(matches!(a.ops()[0], FilterOp::Samples { .. }));
        assert!(matches!(a.ops()[3], FilterOp::MaxAlleles { n: 1 }));
        assert!(Filter::new().is_empty());
    }

    #[test]
    fn test_op_display() {
        let op = FilterOp::FilterTags {
            names: ["q10", "LowQual"].iter().map(|s| s.to_string()).collect(),
        };
        assert_eq!(op.to_string(), "filter_tags(LowQual,q10)");
        assert_eq!(FilterOp::Merge { count: 3 }.to_string(), "merge(3)");
    }
}
