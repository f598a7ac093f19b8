use std::fmt;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use itertools::Itertools;
use log::{debug, trace};
use rust_htslib::tbx::{self, Read as TbxRead};

use crate::error::{Error, Result};
use crate::filter::Region;
use crate::parser;
use crate::record::Variant;
use crate::record_set::RecordSet;
use crate::types::{Header, Sample};

/// Largest end coordinate handed to the index; whole-contig queries are clamped to it.
const MAX_QUERY_END: u64 = 1 << 62;

/// Streaming reader over a plain or gzip/bgzip compressed VCF.
pub struct VcfRecords<R: BufRead> {
    header: Arc<Header>,
    columns: Option<Vec<usize>>,
    line_buf: String,
    line_no: usize,
    inner: R,
}

impl<R: BufRead> VcfRecords<R> {
    pub fn header(&self) -> &Header {
        self.header.as_ref()
    }

    /// Only decode the given sample columns, in the given order.
    pub fn with_columns(mut self, columns: Vec<usize>) -> Self {
        self.columns = Some(columns);
        self
    }
}

impl VcfRecords<BufReader<Box<dyn Read>>> {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let (reader, _format) = niffler::from_path(path)?;
        Self::new(BufReader::new(reader))
    }
}

impl<R: BufRead> VcfRecords<R> {
    pub fn new(mut reader: R) -> Result<Self> {
        let mut lines = Vec::new();
        let mut line_no = 0;
        loop {
            let mut line = String::new();
            if reader.read_line(&mut line)? == 0 {
                break;
            }
            line_no += 1;
            let is_columns = line.starts_with("#CHROM");
            lines.push(line);
            if is_columns {
                break;
            }
        }
        let header = parser::header(lines.iter().map(String::as_str))
            .map_err(|msg| Error::Parse { line: line_no, msg })?;
        debug!("read VCF header with {} samples", header.samples.len());
        Ok(Self {
            header: Arc::new(header),
            columns: None,
            line_buf: String::new(),
            line_no,
            inner: reader,
        })
    }
}

impl<R: BufRead> Iterator for VcfRecords<R> {
    type Item = Result<Variant>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.line_buf.clear();
            match self.inner.read_line(&mut self.line_buf) {
                Ok(0) => return None,
                Ok(_) => self.line_no += 1,
                Err(e) => return Some(Err(e.into())),
            }
            if self.line_buf.trim().is_empty() {
                continue;
            }
            return Some(
                parser::variant(&self.header, &self.line_buf, self.columns.as_deref()).map_err(
                    |msg| Error::Parse {
                        line: self.line_no,
                        msg,
                    },
                ),
            );
        }
    }
}

/// A region-queryable store of variant records.
///
/// `columns` selects (and orders) the sample columns to decode; `None`
/// decodes all of them. Implementations may return records that merely
/// overlap the region; callers apply the exact position predicate.
pub trait IndexedBacking: fmt::Debug + Send + Sync {
    fn header(&self) -> &Header;

    fn query(&self, region: &Region, columns: Option<&[usize]>) -> Result<Vec<Variant>>;

    /// Every record in file order.
    fn scan(&self, columns: Option<&[usize]>) -> Result<Vec<Variant>>;
}

/// bgzip-compressed VCF with a tabix (`.tbi`) or `.csi` index.
///
/// The file is re-opened for every query, so one backing can serve any
/// number of engines from any thread.
#[derive(Debug)]
pub struct TabixBacking {
    path: PathBuf,
    header: Header,
}

impl TabixBacking {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let index_error = |msg: String| Error::Index {
            path: path.display().to_string(),
            msg,
        };
        if !path.is_file() {
            return Err(index_error("no such file".into()));
        }
        let reader = tbx::Reader::from_path(&path).map_err(|e| index_error(e.to_string()))?;
        let header = parser::header(reader.header().iter().map(String::as_str))
            .map_err(|msg| Error::Parse { line: 0, msg })?;
        debug!(
            "opened {} ({} samples, {} sequences)",
            path.display(),
            header.samples.len(),
            reader.seqnames().len()
        );
        Ok(TabixBacking { path, header })
    }

    fn open(&self) -> Result<tbx::Reader> {
        Ok(tbx::Reader::from_path(&self.path)?)
    }
}

impl IndexedBacking for TabixBacking {
    fn header(&self) -> &Header {
        &self.header
    }

    fn query(&self, region: &Region, columns: Option<&[usize]>) -> Result<Vec<Variant>> {
        let mut reader = self.open()?;
        let tid = match reader.tid(region.chrom()) {
            Ok(tid) => tid,
            Err(_) => {
                trace!("{} is not in the index of {}", region.chrom(), self.path.display());
                return Ok(vec![]);
            }
        };
        // index coordinates are 0-based, half-open
        let start = region.start().saturating_sub(1);
        let end = region.end().min(MAX_QUERY_END);
        reader.fetch(tid, start, end)?;
        let mut records = Vec::new();
        for (i, line) in reader.records().enumerate() {
            let line = line?;
            let line = String::from_utf8_lossy(&line);
            let record = parser::variant(&self.header, &line, columns).map_err(|msg| {
                Error::Parse {
                    line: i + 1,
                    msg: format!("{} (region {})", msg, region),
                }
            })?;
            records.push(record);
        }
        trace!("{} records overlap {}", records.len(), region);
        Ok(records)
    }

    fn scan(&self, columns: Option<&[usize]>) -> Result<Vec<Variant>> {
        let records = VcfRecords::from_path(&self.path)?;
        let records = match columns {
            Some(columns) => records.with_columns(columns.to_vec()),
            None => records,
        };
        records.collect()
    }
}

/// Lazily queried view of an [`IndexedBacking`], optionally restricted to a
/// subset of its samples.
#[derive(Debug, Clone)]
pub struct IndexedSource {
    backing: Arc<dyn IndexedBacking>,
    columns: Option<Vec<usize>>,
    samples: Vec<Sample>,
}

impl IndexedSource {
    /// Open a bgzipped, indexed VCF. Fails right away when the file or its
    /// index cannot be read.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self::new(Arc::new(TabixBacking::from_path(path)?)))
    }

    pub fn new(backing: Arc<dyn IndexedBacking>) -> Self {
        let samples = backing.header().samples.clone();
        IndexedSource {
            backing,
            columns: None,
            samples,
        }
    }

    pub fn header(&self) -> &Header {
        self.backing.header()
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// Re-wrap the backing with a narrower sample list. Names must be part of
    /// the current list; repeated names are kept once, in first-seen order.
    pub fn with_samples(&self, names: &[Sample]) -> Result<Self> {
        let names = names.iter().unique().collect_vec();
        let columns = names
            .iter()
            .map(|&name| {
                let pos = self
                    .samples
                    .iter()
                    .position(|s| s == name)
                    .ok_or_else(|| Error::UnknownSample(name.clone()))?;
                Ok(match &self.columns {
                    Some(columns) => columns[pos],
                    None => pos,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(IndexedSource {
            backing: Arc::clone(&self.backing),
            columns: Some(columns),
            samples: names.into_iter().cloned().collect(),
        })
    }

    /// Records with `region.start() <= pos <= region.end()` on the region's chromosome.
    pub fn query(&self, region: &Region) -> Result<Vec<Variant>> {
        let mut records = self.backing.query(region, self.columns.as_deref())?;
        records.retain(|v| region.contains(v));
        Ok(records)
    }

    pub fn fetch_all(&self) -> Result<Vec<Variant>> {
        self.backing.scan(self.columns.as_deref())
    }

    /// Read the region (or everything) into memory.
    pub fn to_record_set(&self, region: Option<&Region>) -> Result<RecordSet> {
        let records = match region {
            Some(region) => self.query(region)?,
            None => self.fetch_all()?,
        };
        debug!(
            "materialized {} records for {} samples{}",
            records.len(),
            self.samples.len(),
            region.map(|r| format!(" in {}", r)).unwrap_or_default()
        );
        RecordSet::new(records, self.samples.clone())
    }
}
