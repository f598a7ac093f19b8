//! The query facade over a variant dataset.
//!
//! An [`Engine`] is either *indexed* (records stay on disk and are fetched
//! per query) or *materialized* (records live in a [`RecordSet`]). Filters
//! never mutate an engine; each returns a new one with the operation
//! appended to its filter stack.
//!
//! | state        | operation                            | result            |
//! |--------------|--------------------------------------|-------------------|
//! | indexed      | samples                              | indexed           |
//! | indexed      | region, filter tags, types, alleles  | materialized      |
//! | materialized | samples                              | error             |
//! | materialized | region, filter tags, types, alleles  | materialized      |

use std::path::Path;
use std::sync::OnceLock;

use itertools::Itertools;
use log::debug;

use crate::codec::{self, Carriers, Extract, GenotypeMatrix, OutputMode, SummaryMatrix};
use crate::error::{Error, Result};
use crate::filter::{Filter, FilterOp, Region};
use crate::reader::IndexedSource;
use crate::record::Variant;
use crate::record_set::RecordSet;
use crate::types::{Sample, VarType};

#[derive(Debug, Clone)]
pub enum Representation {
    Indexed(IndexedSource),
    Materialized(RecordSet),
}

#[derive(Debug, Clone)]
pub struct Engine {
    repr: Representation,
    filter_stack: Vec<FilterOp>,
    /// Full read of an indexed engine, filled on first use.
    cache: OnceLock<RecordSet>,
}

impl Engine {
    fn with(repr: Representation, filter_stack: Vec<FilterOp>) -> Self {
        Engine {
            repr,
            filter_stack,
            cache: OnceLock::new(),
        }
    }

    /// Open a bgzipped, indexed VCF, optionally restricted to `samples`.
    ///
    /// A missing or unreadable file or index is reported here, not on first query.
    pub fn open<P: AsRef<Path>>(path: P, samples: Option<&[Sample]>) -> Result<Self> {
        let engine = Self::from_source(IndexedSource::open(path)?);
        match samples {
            Some(names) => engine.filter_samples(names),
            None => Ok(engine),
        }
    }

    pub fn from_source(source: IndexedSource) -> Self {
        Self::with(Representation::Indexed(source), vec![])
    }

    pub fn from_records(records: Vec<Variant>, samples: Vec<Sample>) -> Result<Self> {
        Ok(Self::from_record_set(RecordSet::new(records, samples)?))
    }

    pub fn from_record_set(set: RecordSet) -> Self {
        Self::with(Representation::Materialized(set), vec![])
    }

    /// Read a VCF without an index straight into memory.
    pub fn from_path_unindexed<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self::from_record_set(RecordSet::from_path(path)?))
    }

    pub fn representation(&self) -> &Representation {
        &self.repr
    }

    pub fn is_indexed(&self) -> bool {
        matches!(self.repr, Representation::Indexed(_))
    }

    pub fn is_materialized(&self) -> bool {
        matches!(self.repr, Representation::Materialized(_))
    }

    /// Operations applied to reach this engine, oldest first.
    pub fn filter_stack(&self) -> &[FilterOp] {
        &self.filter_stack
    }

    pub fn samples(&self) -> &[Sample] {
        match &self.repr {
            Representation::Indexed(source) => source.samples(),
            Representation::Materialized(set) => set.samples(),
        }
    }

    /// Apply every parameter of `filter` in the fixed order samples, region,
    /// filter tags, variant types, allele count.
    ///
    /// ```
    /// use vcf_engine::{Engine, Filter, Region, Variant};
    ///
    /// let engine = Engine::from_records(
    ///     vec![
    ///         Variant::new("1", 100, "A", ["T"]),
    ///         Variant::new("1", 200, "A", ["T", "G"]),
    ///         Variant::new("2", 100, "C", ["G"]),
    ///     ],
    ///     vec![],
    /// )
    /// .unwrap();
    /// let filtered = engine
    ///     .filter(&Filter::new().max_alleles(1).region(Region::new("1", 1, 500).unwrap()))
    ///     .unwrap();
    /// assert_eq!(filtered.records().unwrap().len(), 1);
    /// assert_eq!(filtered.filter_stack().len(), 2);
    /// assert_eq!(engine.filter_stack().len(), 0);
    /// ```
    pub fn filter(&self, filter: &Filter) -> Result<Engine> {
        let mut ops = filter.ops().into_iter();
        let first = match ops.next() {
            Some(op) => self.apply(op)?,
            None => return Ok(self.clone()),
        };
        ops.try_fold(first, |engine, op| engine.apply(op))
    }

    /// Apply a single operation.
    pub fn apply(&self, op: FilterOp) -> Result<Engine> {
        let repr = match (&self.repr, &op) {
            (_, FilterOp::Merge { .. }) => {
                return Err(Error::UnsupportedOperation(
                    "merge is not a filter; use Engine::merge".into(),
                ))
            }
            (Representation::Indexed(source), FilterOp::Samples { names }) => {
                Representation::Indexed(source.with_samples(names)?)
            }
            (Representation::Materialized(_), FilterOp::Samples { .. }) => {
                return Err(Error::UnsupportedOperation(
                    "samples must be selected before any other filter; \
                     genotype columns are fixed once records are materialized"
                        .into(),
                ))
            }
            (Representation::Indexed(source), FilterOp::Region { chrom, start, end }) => {
                match self.cache.get() {
                    Some(set) => Representation::Materialized(set.apply(&op)?),
                    None => {
                        let region = Region::new(chrom.as_str(), *start, *end)?;
                        Representation::Materialized(source.to_record_set(Some(&region))?)
                    }
                }
            }
            (Representation::Indexed(_), _) => {
                Representation::Materialized(self.record_set()?.apply(&op)?)
            }
            (Representation::Materialized(set), _) => Representation::Materialized(set.apply(&op)?),
        };
        let mut filter_stack = self.filter_stack.clone();
        filter_stack.push(op);
        Ok(Self::with(repr, filter_stack))
    }

    pub fn filter_samples(&self, names: &[Sample]) -> Result<Engine> {
        self.apply(FilterOp::Samples {
            names: names.to_vec(),
        })
    }

    pub fn filter_region(&self, region: &Region) -> Result<Engine> {
        self.apply(FilterOp::from(region))
    }

    pub fn filter_tags<I>(&self, names: I) -> Result<Engine>
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.apply(FilterOp::FilterTags {
            names: names.into_iter().map(Into::into).collect(),
        })
    }

    pub fn filter_vartypes<I: IntoIterator<Item = VarType>>(&self, types: I) -> Result<Engine> {
        self.apply(FilterOp::VarTypes {
            types: types.into_iter().collect(),
        })
    }

    pub fn filter_max_alleles(&self, n: usize) -> Result<Engine> {
        self.apply(FilterOp::MaxAlleles { n })
    }

    /// The materialized records. An indexed engine reads its source once and
    /// keeps the result.
    pub fn record_set(&self) -> Result<&RecordSet> {
        match &self.repr {
            Representation::Materialized(set) => Ok(set),
            Representation::Indexed(source) => {
                if let Some(set) = self.cache.get() {
                    return Ok(set);
                }
                let set = source.to_record_set(None)?;
                Ok(self.cache.get_or_init(|| set))
            }
        }
    }

    pub fn records(&self) -> Result<&[Variant]> {
        Ok(self.record_set()?.records())
    }

    /// A materialized engine with the same records and filter stack.
    pub fn to_records(&self) -> Result<Engine> {
        match &self.repr {
            Representation::Materialized(_) => Ok(self.clone()),
            Representation::Indexed(_) => Ok(Self::with(
                Representation::Materialized(self.record_set()?.clone()),
                self.filter_stack.clone(),
            )),
        }
    }

    pub fn genotype_matrix(&self) -> Result<GenotypeMatrix> {
        Ok(codec::genotype_matrix(self.record_set()?))
    }

    pub fn summary(&self) -> Result<SummaryMatrix> {
        Ok(codec::summary_matrix(self.record_set()?))
    }

    pub fn extract(&self, mode: OutputMode) -> Result<Extract> {
        Ok(codec::extract(self.record_set()?, mode))
    }

    pub fn who_has(&self, chrom: &str, pos: u64, ref_allele: &str, alt: &str) -> Result<Carriers> {
        Ok(codec::who_has(
            self.record_set()?,
            chrom,
            pos,
            ref_allele,
            alt,
        ))
    }

    /// Concatenate engines with identical sample lists into one materialized
    /// engine whose filter stack is a single `Merge` entry.
    pub fn merge(engines: &[Engine]) -> Result<Engine> {
        let first = engines
            .first()
            .ok_or_else(|| Error::IncompatibleMerge("nothing to merge".into()))?;
        for (i, (a, b)) in engines.iter().tuple_windows().enumerate() {
            if a.samples() != b.samples() {
                return Err(Error::IncompatibleMerge(format!(
                    "input {} has samples [{}], input {} has [{}]",
                    i,
                    a.samples().iter().join(","),
                    i + 1,
                    b.samples().iter().join(",")
                )));
            }
        }
        for (i, engine) in engines.iter().enumerate() {
            debug!(
                "merge input {}: [{}]",
                i,
                engine.filter_stack.iter().join(", ")
            );
        }
        let sets = engines
            .iter()
            .map(Engine::record_set)
            .collect::<Result<Vec<_>>>()?;
        let set = RecordSet::concat(sets, first.samples().to_vec());
        Ok(Self::with(
            Representation::Materialized(set),
            vec![FilterOp::Merge {
                count: engines.len(),
            }],
        ))
    }

    pub fn add(&self, other: &Engine) -> Result<Engine> {
        Self::merge(&[self.clone(), other.clone()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::tests::memory_source;
    use std::collections::BTreeSet;

    fn indexed() -> Engine {
        Engine::from_source(memory_source())
    }

    fn positions(engine: &Engine) -> Vec<(String, u64)> {
        engine
            .records()
            .unwrap()
            .iter()
            .map(|v| (v.chrom().clone(), v.pos()))
            .collect()
    }

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn test_engine_is_send_sync() {
        assert_send_sync::<Engine>();
    }

    #[test]
    fn test_samples_keep_indexed_state() {
        let engine = indexed();
        assert!(engine.is_indexed());
        let narrowed = engine.filter_samples(&["s2".into()]).unwrap();
        assert!(narrowed.is_indexed());
        assert_eq!(narrowed.samples(), ["s2"]);
        assert_eq!(engine.samples(), ["s1", "s2", "s3"]);
        assert_eq!(narrowed.filter_stack().len(), 1);
        assert!(narrowed
            .records()
            .unwrap()
            .iter()
            .all(|v| v.genotypes().len() == 1));
        assert!(matches!(
            engine.filter_samples(&["nobody".into()]),
            Err(Error::UnknownSample(_))
        ));
    }

    #[test]
    fn test_other_filters_materialize() {
        let engine = indexed();
        let region = Region::new("1", 100, 200).unwrap();
        for next in [
            engine.filter_region(&region).unwrap(),
            engine.filter_tags(["LowQual"]).unwrap(),
            engine.filter_vartypes([VarType::Snp]).unwrap(),
            engine.filter_max_alleles(1).unwrap(),
        ] {
            assert!(next.is_materialized());
            assert_eq!(next.filter_stack().len(), 1);
        }
        assert!(engine.is_indexed());
        assert!(engine.filter_stack().is_empty());
    }

    #[test]
    fn test_samples_after_materialization_fails() {
        let engine = indexed().filter_max_alleles(2).unwrap();
        assert!(matches!(
            engine.filter_samples(&["s1".into()]),
            Err(Error::UnsupportedOperation(_))
        ));
        let records = indexed().to_records().unwrap();
        assert!(records.is_materialized());
        assert!(matches!(
            records.filter(&Filter::new().samples(["s1"])),
            Err(Error::UnsupportedOperation(_))
        ));
        let from_records = Engine::from_records(vec![], vec!["s1".into()]).unwrap();
        assert!(from_records.filter_samples(&["s1".into()]).is_err());
    }

    #[test]
    fn test_region_filter_is_inclusive() {
        let engine = indexed();
        let region = Region::new("1", 100, 300).unwrap();
        let filtered = engine.filter_region(&region).unwrap();
        assert_eq!(
            positions(&filtered),
            vec![("1".into(), 100), ("1".into(), 200), ("1".into(), 300)]
        );
        for v in filtered.records().unwrap() {
            assert!(region.contains(v));
        }
        let narrow = engine
            .filter_region(&Region::new("1", 101, 299).unwrap())
            .unwrap();
        assert_eq!(positions(&narrow), vec![("1".into(), 200)]);
        let absent = engine
            .filter_region(&Region::new("9", 1, 10).unwrap())
            .unwrap();
        assert!(absent.records().unwrap().is_empty());
    }

    #[test]
    fn test_combined_equals_chained() {
        let engine = indexed();
        let region = Region::new("1", 1, 1000).unwrap();
        let combined = engine
            .filter(
                &Filter::new()
                    .max_alleles(1)
                    .samples(["s3", "s1"])
                    .region(region.clone()),
            )
            .unwrap();
        let chained = engine
            .filter_samples(&["s3".into(), "s1".into()])
            .unwrap()
            .filter_region(&region)
            .unwrap()
            .filter_max_alleles(1)
            .unwrap();
        assert_eq!(combined.records().unwrap(), chained.records().unwrap());
        assert_eq!(combined.filter_stack(), chained.filter_stack());
        assert_eq!(positions(&combined), vec![("1".into(), 100), ("1".into(), 200)]);
        assert_eq!(combined.samples(), ["s3", "s1"]);
    }

    #[test]
    fn test_filter_on_materialized_engine() {
        let engine = indexed().to_records().unwrap();
        let filtered = engine
            .filter(&Filter::new().filter_tags(["LowQual"]).vartypes([VarType::Snp]))
            .unwrap();
        assert_eq!(
            positions(&filtered),
            vec![("1".into(), 100), ("1".into(), 300)]
        );
        let stack: Vec<String> = filtered
            .filter_stack()
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(stack, vec!["filter_tags(LowQual)", "vartypes(snp)"]);
        assert!(engine.filter(&Filter::new()).unwrap().filter_stack().is_empty());
    }

    #[test]
    fn test_genotype_filter_tags_through_engine() {
        // s1 at 1:300 carries FT=DP5, s2 at 1:200 carries FT=DP5
        let engine = indexed().filter_tags(["DP5"]).unwrap();
        let records = engine.records().unwrap();
        assert_eq!(records.len(), 4);
        let at_300 = &records[2];
        assert!(at_300.genotypes()[0].pruned());
        let matrix = engine.genotype_matrix().unwrap();
        assert!(!matrix["1-300-G-C"].contains_key("s1"));
        assert_eq!(matrix["1-300-G-C"]["s2"], 1);
        assert_eq!(engine.samples(), ["s1", "s2", "s3"]);
    }

    #[test]
    fn test_end_to_end_scenario() {
        let engine = Engine::from_records(
            vec![Variant::new("1", 1000, "A", ["T", "G"]).with_genotypes(vec![
                "0/1".parse().unwrap(),
                "1/1".parse().unwrap(),
                "0/0".parse().unwrap(),
            ])],
            vec!["s1".into(), "s2".into(), "s3".into()],
        )
        .unwrap();
        let matrix = engine.genotype_matrix().unwrap();
        let row = &matrix["1-1000-A-T"];
        assert_eq!(
            row.iter().map(|(s, c)| (s.as_str(), *c)).collect::<Vec<_>>(),
            vec![("s1", 1), ("s2", 2), ("s3", 0)]
        );
        let carriers = engine.who_has("1", 1000, "A", "T").unwrap();
        assert_eq!(carriers.samples, vec!["s1", "s2"]);
        let summary = engine.summary().unwrap();
        let t = summary["1-1000-A-T"];
        assert_eq!((t.ra, t.aa, t.rr, t.o), (1, 1, 1, 0));
        match engine.extract(OutputMode::Summary).unwrap() {
            Extract::Summary(s) => assert_eq!(s, summary),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_merge_concatenates() {
        let engine = indexed();
        let a = engine.filter_region(&Region::new("1", 1, 150).unwrap()).unwrap();
        let b = engine.filter_region(&Region::new("2", 1, 1000).unwrap()).unwrap();
        let merged = Engine::merge(&[a.clone(), b.clone()]).unwrap();
        assert!(merged.is_materialized());
        assert_eq!(merged.filter_stack(), [FilterOp::Merge { count: 2 }]);
        let expected: Vec<Variant> = a
            .records()
            .unwrap()
            .iter()
            .chain(b.records().unwrap())
            .cloned()
            .collect();
        assert_eq!(merged.records().unwrap(), expected.as_slice());
        assert_eq!(a.add(&b).unwrap().records().unwrap(), expected.as_slice());
    }

    #[test]
    fn test_merge_is_associative() {
        let engine = indexed();
        let parts: Vec<Engine> = [(1, 150), (151, 250), (251, 1000)]
            .iter()
            .map(|&(s, e)| engine.filter_region(&Region::new("1", s, e).unwrap()).unwrap())
            .collect();
        let all = Engine::merge(&parts).unwrap();
        let stepwise = parts[0].add(&parts[1]).unwrap().add(&parts[2]).unwrap();
        let nested = Engine::merge(&[Engine::merge(&parts[..2]).unwrap(), parts[2].clone()]).unwrap();
        assert_eq!(all.records().unwrap(), stepwise.records().unwrap());
        assert_eq!(all.records().unwrap(), nested.records().unwrap());
        assert_eq!(all.samples(), stepwise.samples());
    }

    #[test]
    fn test_merge_requires_identical_samples() {
        let engine = indexed();
        let a = engine.filter_samples(&["s1".into(), "s2".into()]).unwrap();
        let b = engine.filter_samples(&["s2".into(), "s1".into()]).unwrap();
        assert!(matches!(
            Engine::merge(&[a.clone(), b]),
            Err(Error::IncompatibleMerge(_))
        ));
        assert!(matches!(
            Engine::merge(&[]),
            Err(Error::IncompatibleMerge(_))
        ));
        // indexed inputs are materialized by the merge
        let merged = Engine::merge(&[a.clone(), a]).unwrap();
        assert_eq!(merged.records().unwrap().len(), 8);
    }

    #[test]
    fn test_records_are_cached_once() {
        let engine = indexed();
        let first = engine.records().unwrap().as_ptr();
        let second = engine.records().unwrap().as_ptr();
        assert_eq!(first, second);
        // region queries on a filled cache reuse it
        let region = engine
            .filter_region(&Region::new("1", 200, 300).unwrap())
            .unwrap();
        assert_eq!(region.records().unwrap().len(), 2);
    }

    #[test]
    fn test_who_has_on_indexed_engine() {
        let engine = indexed();
        let carriers = engine.who_has("1", 300, "G", "T").unwrap();
        assert_eq!(carriers.samples, vec!["s1", "s3"]);
        let swapped = engine.who_has("1", 100, "T", "A").unwrap();
        assert!(swapped.allele_swap);
        assert_eq!(swapped.samples, vec!["s1", "s2"]);
        let tags: BTreeSet<_> = engine.records().unwrap()[1]
            .filter_tags()
            .clone()
            .unwrap_or_default();
        assert!(tags.contains("LowQual"));
    }
}
