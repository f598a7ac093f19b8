use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use getset::{CopyGetters, Getters};
use indexmap::IndexMap;
use itertools::Itertools;
use serde::Serialize;

use crate::parser;
use crate::types::{Value, VarType};

/// A decoded VCF data line. Immutable once decoded; filters build new values.
#[derive(Debug, Clone, PartialEq, Getters, CopyGetters, Serialize)]
pub struct Variant {
    #[getset(get = "pub")]
    pub(crate) chrom: String,
    /// 1-based position.
    #[getset(get_copy = "pub")]
    pub(crate) pos: u64,
    #[getset(get = "pub")]
    pub(crate) id: Option<String>,
    #[getset(get = "pub")]
    pub(crate) ref_allele: String,
    #[getset(get = "pub")]
    pub(crate) alt_alleles: Vec<String>,
    #[getset(get_copy = "pub")]
    pub(crate) qual: Option<f32>,
    /// `None` for PASS or an unset FILTER column.
    #[getset(get = "pub")]
    pub(crate) filter_tags: Option<BTreeSet<String>>,
    #[getset(get = "pub")]
    pub(crate) info: IndexMap<String, Value>,
    #[getset(get = "pub")]
    pub(crate) genotypes: Vec<Genotype>,
}

impl Variant {
    pub fn new<C, R, A>(chrom: C, pos: u64, ref_allele: R, alt_alleles: A) -> Self
    where
        C: Into<String>,
        R: Into<String>,
        A: IntoIterator,
        A::Item: Into<String>,
    {
        Variant {
            chrom: chrom.into(),
            pos,
            id: None,
            ref_allele: ref_allele.into(),
            alt_alleles: alt_alleles.into_iter().map(Into::into).collect(),
            qual: None,
            filter_tags: None,
            info: IndexMap::new(),
            genotypes: Vec::new(),
        }
    }

    pub fn with_id<S: Into<String>>(mut self, id: S) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_qual(mut self, qual: f32) -> Self {
        self.qual = Some(qual);
        self
    }

    /// Set the FILTER column. An empty set or a lone `PASS` means unfiltered.
    pub fn with_filter_tags<I>(mut self, tags: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let tags: BTreeSet<String> = tags.into_iter().map(Into::into).collect();
        self.filter_tags = if tags.is_empty() || (tags.len() == 1 && tags.contains("PASS")) {
            None
        } else {
            Some(tags)
        };
        self
    }

    pub fn with_info<K: Into<String>>(mut self, key: K, value: Value) -> Self {
        self.info.insert(key.into(), value);
        self
    }

    pub fn with_genotypes(mut self, genotypes: Vec<Genotype>) -> Self {
        self.genotypes = genotypes;
        self
    }

    /// `chrom:pos`, used in log and error messages.
    pub fn locus(&self) -> String {
        format!("{}:{}", self.chrom, self.pos)
    }

    /// Allele id of `allele`: 0 for REF, `i + 1` for `alt_alleles[i]`.
    pub fn allele_id(&self, allele: &str) -> Option<u32> {
        if allele == self.ref_allele {
            return Some(0);
        }
        self.alt_alleles
            .iter()
            .position(|a| a == allele)
            .map(|i| i as u32 + 1)
    }

    /// Number of alleles including REF.
    pub fn n_alleles(&self) -> usize {
        self.alt_alleles.len() + 1
    }

    pub fn vartypes(&self) -> BTreeSet<VarType> {
        self.alt_alleles
            .iter()
            .filter_map(|alt| VarType::classify(&self.ref_allele, alt))
            .collect()
    }

    /// Genotypes not pruned by a FILTER-tag filter, with their sample column.
    pub fn visible_genotypes(&self) -> impl Iterator<Item = (usize, &Genotype)> + '_ {
        self.genotypes.iter().enumerate().filter(|(_, gt)| !gt.pruned)
    }

    /// Per-sample values of a FORMAT field.
    pub fn format(&self, key: &str) -> Vec<Option<&Value>> {
        self.genotypes.iter().map(|gt| gt.fields.get(key)).collect()
    }
}

/// Phased or unphased alleles, represented as indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum GenotypeAllele {
    Unphased(u32),
    Phased(u32),
    UnphasedMissing,
    PhasedMissing,
}

impl GenotypeAllele {
    /// Get the index into the list of alleles.
    pub fn index(self) -> Option<u32> {
        match self {
            GenotypeAllele::Unphased(i) | GenotypeAllele::Phased(i) => Some(i),
            GenotypeAllele::UnphasedMissing | GenotypeAllele::PhasedMissing => None,
        }
    }

    pub fn is_phased(self) -> bool {
        matches!(
            self,
            GenotypeAllele::Phased(_) | GenotypeAllele::PhasedMissing
        )
    }
}

/// One sample's call at a variant.
#[derive(Debug, Clone, Default, PartialEq, Getters, CopyGetters, Serialize)]
pub struct Genotype {
    #[getset(get = "pub")]
    pub(crate) alleles: Vec<GenotypeAllele>,
    /// Per-sample FILTER tags (the `FT` FORMAT field); `None` when PASS or absent.
    #[getset(get = "pub")]
    pub(crate) filter_tags: Option<BTreeSet<String>>,
    /// Remaining FORMAT fields.
    #[getset(get = "pub")]
    pub(crate) fields: IndexMap<String, Value>,
    /// Excluded by a FILTER-tag filter for this variant only.
    #[getset(get_copy = "pub")]
    pub(crate) pruned: bool,
}

impl Genotype {
    pub fn new(alleles: Vec<GenotypeAllele>) -> Self {
        Genotype {
            alleles,
            ..Default::default()
        }
    }

    pub fn with_filter_tags<I>(mut self, tags: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let tags: BTreeSet<String> = tags.into_iter().map(Into::into).collect();
        self.filter_tags = if tags.is_empty() || (tags.len() == 1 && tags.contains("PASS")) {
            None
        } else {
            Some(tags)
        };
        self
    }

    pub fn with_field<K: Into<String>>(mut self, key: K, value: Value) -> Self {
        self.fields.insert(key.into(), value);
        self
    }

    pub fn ploidy(&self) -> usize {
        self.alleles.len()
    }

    pub fn phased(&self) -> bool {
        self.alleles.len() > 1 && self.alleles[1..].iter().all(|a| a.is_phased())
    }

    pub fn is_missing(&self) -> bool {
        self.alleles.iter().all(|a| a.index().is_none())
    }

    /// How many times allele `id` occurs in this call.
    pub fn count(&self, id: u32) -> u32 {
        self.alleles.iter().filter(|a| a.index() == Some(id)).count() as u32
    }

    pub fn contains(&self, id: u32) -> bool {
        self.count(id) > 0
    }
}

impl FromStr for Genotype {
    type Err = String;

    /// Parse a `GT` value such as `0/1`, `1|0`, `./.` or `2`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parser::genotype_alleles(s)
            .map(Genotype::new)
            .map_err(|_| format!("invalid genotype '{}'", s))
    }
}

impl fmt::Display for Genotype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = self
            .alleles
            .iter()
            .enumerate()
            .map(|(i, a)| {
                let sep = match (i, a.is_phased()) {
                    (0, _) => "",
                    (_, true) => "|",
                    (_, false) => "/",
                };
                match a.index() {
                    Some(idx) => format!("{}{}", sep, idx),
                    None => format!("{}.", sep),
                }
            })
            .join("");
        f.write_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allele_ids() {
        let v = Variant::new("1", 1000, "A", ["T", "G"]);
        assert_eq!(v.allele_id("A"), Some(0));
        assert_eq!(v.allele_id("T"), Some(1));
        assert_eq!(v.allele_id("G"), Some(2));
        assert_eq!(v.allele_id("C"), None);
        assert_eq!(v.n_alleles(), 3);
    }

    #[test]
    fn test_pass_is_unfiltered() {
        let v = Variant::new("1", 1, "A", ["T"]).with_filter_tags(["PASS"]);
        assert_eq!(v.filter_tags(), &None);
        let v = v.with_filter_tags(["LowQual", "q10"]);
        assert_eq!(v.filter_tags().as_ref().map(|t| t.len()), Some(2));
    }

    #[test]
    fn test_genotype_text() {
        let gt: Genotype = "0|1".parse().unwrap();
        assert!(gt.phased());
        assert_eq!(gt.count(1), 1);
        assert_eq!(gt.to_string(), "0|1");

        let gt: Genotype = "./.".parse().unwrap();
        assert!(gt.is_missing());
        assert_eq!(gt.ploidy(), 2);

        let gt: Genotype = "2".parse().unwrap();
        assert_eq!(gt.ploidy(), 1);
        assert!(gt.contains(2));
        assert!("0/x".parse::<Genotype>().is_err());
    }
}
