//! Allele indexing and genotype tables.
//!
//! Rows of every table are keyed by a variant identifier,
//! `{chrom}-{pos}-{ref}-{alt}`, one row per ALT allele. Columns follow the
//! sample order of the record set.

use std::fmt;
use std::str::FromStr;

use getset::{CopyGetters, Getters};
use indexmap::IndexMap;
use log::warn;
use serde::Serialize;
use strum::{Display, EnumString};

use crate::record::Variant;
use crate::record_set::RecordSet;
use crate::types::Sample;

pub type GenotypeMatrix = IndexMap<String, IndexMap<Sample, u32>>;
pub type SummaryMatrix = IndexMap<String, AlleleSummary>;

/// The key of one (variant, ALT allele) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Getters, CopyGetters)]
pub struct VariantKey {
    #[getset(get = "pub")]
    chrom: String,
    #[getset(get_copy = "pub")]
    pos: u64,
    #[getset(get = "pub")]
    ref_allele: String,
    #[getset(get = "pub")]
    alt: String,
}

impl VariantKey {
    /// Key of `variant.alt_alleles()[alt_index]`.
    pub fn new(variant: &Variant, alt_index: usize) -> Option<Self> {
        variant.alt_alleles().get(alt_index).map(|alt| VariantKey {
            chrom: variant.chrom().clone(),
            pos: variant.pos(),
            ref_allele: variant.ref_allele().clone(),
            alt: alt.clone(),
        })
    }
}

impl fmt::Display for VariantKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}-{}-{}",
            self.chrom, self.pos, self.ref_allele, self.alt
        )
    }
}

impl FromStr for VariantKey {
    type Err = String;

    /// Split from the right, so chromosome names may contain `-`. A symbolic
    /// ALT (`<...>`) is taken whole, so it may contain `-` as well.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (rest, alt) = match s.rfind("-<") {
            Some(i) if s.ends_with('>') => (&s[..i], Some(&s[i + 1..])),
            _ => (s, None),
        };
        let mut parts = rest.rsplitn(if alt.is_some() { 3 } else { 4 }, '-');
        let alt = alt.or_else(|| parts.next());
        match (alt, parts.next(), parts.next(), parts.next()) {
            (Some(alt), Some(ref_allele), Some(pos), Some(chrom))
                if !alt.is_empty() && !ref_allele.is_empty() && !chrom.is_empty() =>
            {
                Ok(VariantKey {
                    chrom: chrom.to_owned(),
                    pos: pos
                        .parse()
                        .map_err(|_| format!("invalid position in identifier '{}'", s))?,
                    ref_allele: ref_allele.to_owned(),
                    alt: alt.to_owned(),
                })
            }
            _ => Err(format!("invalid variant identifier '{}'", s)),
        }
    }
}

/// `"{chrom}-{pos}-{ref}-{alt}"` for `variant.alt_alleles()[alt_index]`.
///
/// Parsing the result back into a [`VariantKey`] works for chromosome names
/// and symbolic ALTs containing `-`. Breakend ALTs whose mate chromosome
/// contains `-` (`N[HLA-A:100[`) do not round-trip.
pub fn identifier(variant: &Variant, alt_index: usize) -> Option<String> {
    VariantKey::new(variant, alt_index).map(|key| key.to_string())
}

/// Offset of the genotype `j/k` in a per-genotype array (`Number=G` fields
/// such as `PL` or `GL`), ordered `0/0, 0/1, 1/1, 0/2, 1/2, 2/2, ...`.
///
/// The offset is `k * (k + 1) / 2 + j` with `j <= k`; argument order does
/// not matter.
pub fn field_index(a: u32, b: u32) -> usize {
    let (j, k) = if a <= b { (a, b) } else { (b, a) };
    let (j, k) = (j as usize, k as usize);
    k * (k + 1) / 2 + j
}

/// Hom-ref, het and hom-alt offsets for the allele with id `alt_id`.
pub fn allele_field_indices(alt_id: u32) -> [usize; 3] {
    [
        field_index(0, 0),
        field_index(0, alt_id),
        field_index(alt_id, alt_id),
    ]
}

/// Per sample, the hom-ref/het/hom-alt entries of the `Number=G` FORMAT field
/// `key` for one ALT allele. Samples lacking the field, or with a shorter
/// array, get `None`.
pub fn genotype_likelihoods(
    variant: &Variant,
    alt_index: usize,
    key: &str,
) -> Vec<Option<[f32; 3]>> {
    let alt_id = alt_index as u32 + 1;
    let offsets = allele_field_indices(alt_id);
    variant
        .format(key)
        .into_iter()
        .map(|value| {
            let values = value?.float()?;
            let mut out = [0.0; 3];
            for (slot, &offset) in out.iter_mut().zip(offsets.iter()) {
                *slot = (*values.get(offset)?)?;
            }
            Some(out)
        })
        .collect()
}

/// Ploidy-aware genotype counts for one ALT allele.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub struct AlleleSummary {
    /// Diploid, both REF.
    pub rr: u32,
    /// Diploid, one REF and one copy of this ALT.
    pub ra: u32,
    /// Diploid, two copies of this ALT.
    pub aa: u32,
    /// Haploid REF.
    pub r: u32,
    /// Haploid ALT.
    pub a: u32,
    /// Everything else: missing alleles, other ALT alleles, ploidy above two,
    /// genotypes pruned by a FILTER-tag filter.
    pub o: u32,
}

/// One row per (variant, ALT allele), one column per visible sample holding
/// the number of copies of that ALT allele.
pub fn genotype_matrix(set: &RecordSet) -> GenotypeMatrix {
    rows(set, |variant, alt_id| {
        variant
            .visible_genotypes()
            .map(|(i, gt)| (set.samples()[i].clone(), gt.count(alt_id)))
            .collect()
    })
}

pub fn summary_matrix(set: &RecordSet) -> SummaryMatrix {
    rows(set, |variant, alt_id| {
        let mut summary = AlleleSummary::default();
        for gt in variant.genotypes() {
            let ids: Option<Vec<u32>> = gt.alleles().iter().map(|a| a.index()).collect();
            let counted = match ids {
                Some(ids) if !gt.pruned() && ids.iter().all(|&id| id == 0 || id == alt_id) => {
                    Some(ids)
                }
                _ => None,
            };
            let bucket = match counted.as_deref() {
                Some([0, 0]) => &mut summary.rr,
                Some([_, _]) if gt.count(alt_id) == 1 => &mut summary.ra,
                Some([_, _]) => &mut summary.aa,
                Some([0]) => &mut summary.r,
                Some([_]) => &mut summary.a,
                _ => &mut summary.o,
            };
            *bucket += 1;
        }
        summary
    })
}

fn rows<T, F>(set: &RecordSet, row: F) -> IndexMap<String, T>
where
    F: Fn(&Variant, u32) -> T,
{
    let mut table = IndexMap::new();
    for variant in set.records() {
        let keys = (0..variant.alt_alleles().len())
            .filter_map(|alt_index| identifier(variant, alt_index).map(|key| (alt_index, key)));
        for (alt_index, key) in keys {
            if table.contains_key(&key) {
                warn!("duplicate variant {}; keeping the first occurrence", key);
                continue;
            }
            table.insert(key, row(variant, alt_index as u32 + 1));
        }
    }
    table
}

/// Samples carrying an allele, and whether the query had REF and ALT swapped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Carriers {
    pub samples: Vec<Sample>,
    pub allele_swap: bool,
}

/// Samples whose genotype contains `alt` at `chrom:pos`.
///
/// When no record matches `ref_allele`/`alt` but one matches with the two
/// swapped, the query's `ref_allele` is looked up instead and the result is
/// flagged. No match yields an empty result.
pub fn who_has(set: &RecordSet, chrom: &str, pos: u64, ref_allele: &str, alt: &str) -> Carriers {
    let at = set.at(chrom, pos);
    let direct: Vec<(&Variant, u32)> = at
        .iter()
        .filter(|v| v.ref_allele() == ref_allele)
        .filter_map(|v| v.allele_id(alt).filter(|&id| id > 0).map(|id| (*v, id)))
        .collect();
    let (targets, allele_swap) = if direct.is_empty() {
        let swapped: Vec<(&Variant, u32)> = at
            .iter()
            .filter(|v| v.ref_allele() == alt)
            .filter_map(|v| {
                v.allele_id(ref_allele)
                    .filter(|&id| id > 0)
                    .map(|id| (*v, id))
            })
            .collect();
        if !swapped.is_empty() {
            warn!(
                "ambiguous allele swap at {}:{}: stored as {}>{}, queried as {}>{}",
                chrom, pos, alt, ref_allele, ref_allele, alt
            );
        }
        let allele_swap = !swapped.is_empty();
        (swapped, allele_swap)
    } else {
        (direct, false)
    };

    let samples = set
        .samples()
        .iter()
        .enumerate()
        .filter(|(i, _)| {
            targets.iter().any(|(v, id)| {
                v.genotypes()
                    .get(*i)
                    .map_or(false, |gt| !gt.pruned() && gt.contains(*id))
            })
        })
        .map(|(_, s)| s.clone())
        .collect();
    Carriers {
        samples,
        allele_swap,
    }
}

/// Shape of a genotype table requested by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum OutputMode {
    Raw,
    Summary,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Extract {
    Raw(GenotypeMatrix),
    Summary(SummaryMatrix),
}

pub fn extract(set: &RecordSet, mode: OutputMode) -> Extract {
    match mode {
        OutputMode::Raw => Extract::Raw(genotype_matrix(set)),
        OutputMode::Summary => Extract::Summary(summary_matrix(set)),
    }
}
