use std::collections::BTreeSet;
use std::convert::TryFrom;

use indexmap::IndexMap;
use nom::branch::alt;
use nom::bytes::complete::{escaped, is_not, tag};
use nom::character::complete::{char, digit1, none_of, one_of};
use nom::combinator::{all_consuming, eof, map, map_res, opt, value};
use nom::multi::{many0, separated_list0};
use nom::sequence::{delimited, pair, preceded, separated_pair, tuple};
use nom::IResult;

use crate::filter::Region;
use crate::record::{Genotype, GenotypeAllele, Variant};
use crate::types::{
    Header, HeaderContig, HeaderFilter, HeaderInfo, InfoNumber, InfoType, Value, MISSING,
};

const FIXED_COLUMNS: usize = 8;
const FORMAT_COLUMN: usize = 8;
const FIRST_SAMPLE_COLUMN: usize = 9;

fn parse_usize(input: &str) -> Result<usize, std::num::ParseIntError> {
    input.parse()
}

pub(crate) fn info_number(input: &str) -> IResult<&str, InfoNumber> {
    alt((
        map(map_res(digit1, parse_usize), InfoNumber::Count),
        value(InfoNumber::AlternateAlleles, tag("A")),
        value(InfoNumber::Alleles, tag("R")),
        value(InfoNumber::Genotypes, tag("G")),
        value(InfoNumber::Unknown, tag(".")),
    ))(input)
}

fn string(input: &str) -> IResult<&str, &str> {
    delimited(
        tag("\""),
        escaped(none_of("\\\""), '\\', alt((tag("\\"), tag("\"")))),
        tag("\""),
    )(input)
}

fn keys_and_values(input: &str) -> IResult<&str, Vec<(&str, &str)>> {
    fn key_value(input: &str) -> IResult<&str, (&str, &str)> {
        separated_pair(is_not("<,=\n"), tag("="), alt((string, is_not(">,\n"))))(input)
    }
    separated_list0(tag(","), key_value)(input)
}

/// `##key=<k=v,...>` structured header value.
fn structured(input: &str) -> IResult<&str, Vec<(&str, &str)>> {
    delimited(tag("<"), keys_and_values, tag(">"))(input)
}

fn header_line(input: &str) -> IResult<&str, (&str, &str)> {
    preceded(tag("##"), separated_pair(is_not("="), tag("="), is_not("\n")))(input)
}

/// Build a [`Header`] from the `#`-prefixed lines at the top of a VCF file.
/// The last line must be the `#CHROM` column line.
pub(crate) fn header<'a, I>(lines: I) -> Result<Header, String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut header = Header::default();
    let mut saw_columns = false;
    for line in lines {
        let line = line.trim_end_matches(&['\r', '\n'][..]);
        if let Some(columns) = line.strip_prefix("#CHROM") {
            header.samples = columns
                .split('\t')
                .skip(FIRST_SAMPLE_COLUMN)
                .map(str::to_owned)
                .collect();
            saw_columns = true;
            continue;
        }
        let (_, (key, raw)) =
            header_line(line).map_err(|_| format!("malformed header line '{}'", line))?;
        match key {
            "INFO" | "FORMAT" | "FILTER" | "contig" => {
                let (_, data) = all_consuming(structured)(raw)
                    .map_err(|_| format!("malformed {} definition '{}'", key, raw))?;
                match key {
                    "INFO" => {
                        let info = HeaderInfo::try_from(data)?;
                        header.info.insert(info.id.clone(), info);
                    }
                    "FORMAT" => {
                        let format = HeaderInfo::try_from(data)?;
                        header.format.insert(format.id.clone(), format);
                    }
                    "FILTER" => {
                        let filter = HeaderFilter::try_from(data)?;
                        header.filters.insert(filter.id.clone(), filter);
                    }
                    _ => header.contigs.push(HeaderContig::try_from(data)?),
                }
            }
            _ => header.meta.insert(key.to_owned(), raw.to_owned()),
        }
    }
    if !saw_columns {
        return Err("missing #CHROM header line".into());
    }
    Ok(header)
}

fn allele_index(input: &str) -> IResult<&str, Option<u32>> {
    alt((
        value(None, char('.')),
        map(map_res(digit1, str::parse::<u32>), Some),
    ))(input)
}

fn genotype(input: &str) -> IResult<&str, Vec<GenotypeAllele>> {
    let (input, (first_phase, first, rest)) = tuple((
        opt(one_of("/|")),
        allele_index,
        many0(pair(one_of("/|"), allele_index)),
    ))(input)?;
    // the first allele takes its phasing from the separator that follows it
    let first_phased = rest
        .first()
        .map(|(sep, _)| *sep == '|')
        .unwrap_or(first_phase == Some('|'));
    let mut alleles = Vec::with_capacity(rest.len() + 1);
    alleles.push(allele(first_phased, first));
    alleles.extend(rest.into_iter().map(|(sep, idx)| allele(sep == '|', idx)));
    Ok((input, alleles))
}

fn allele(phased: bool, idx: Option<u32>) -> GenotypeAllele {
    match (phased, idx) {
        (true, Some(i)) => GenotypeAllele::Phased(i),
        (false, Some(i)) => GenotypeAllele::Unphased(i),
        (true, None) => GenotypeAllele::PhasedMissing,
        (false, None) => GenotypeAllele::UnphasedMissing,
    }
}

pub(crate) fn genotype_alleles(input: &str) -> Result<Vec<GenotypeAllele>, String> {
    all_consuming(genotype)(input)
        .map(|(_, alleles)| alleles)
        .map_err(|e| e.to_string())
}

fn position(input: &str) -> IResult<&str, u64> {
    map_res(is_not("-"), |s: &str| s.replace(',', "").parse::<u64>())(input)
}

/// Parse `chrom`, `chrom:pos` or `chrom:start-end` (1-based, inclusive).
pub(crate) fn region(input: &str) -> Result<Region, String> {
    fn parse(input: &str) -> IResult<&str, (&str, Option<(u64, Option<u64>)>)> {
        let (input, chrom) = is_not(":")(input)?;
        let (input, span) = alt((
            map(eof, |_| None),
            map(
                preceded(tag(":"), pair(position, opt(preceded(tag("-"), position)))),
                Some,
            ),
        ))(input)?;
        Ok((input, (chrom, span)))
    }
    let (_, (chrom, span)) =
        all_consuming(parse)(input).map_err(|_| format!("cannot parse region '{}'", input))?;
    let (start, end) = match span {
        None => (1, u64::MAX),
        Some((start, None)) => (start, start),
        Some((start, Some(end))) => (start, end),
    };
    Region::new(chrom, start, end).map_err(|e| e.to_string())
}

fn tag_set(raw: &str) -> Option<BTreeSet<String>> {
    if raw == MISSING || raw == "PASS" {
        return None;
    }
    Some(
        raw.split(|c| c == ';' || c == ',')
            .map(str::to_owned)
            .collect(),
    )
}

fn info(header: &Header, raw: &str) -> Result<IndexMap<String, Value>, String> {
    if raw == MISSING {
        return Ok(IndexMap::new());
    }
    raw.split(';')
        .filter(|entry| !entry.is_empty())
        .map(|entry| match entry.split_once('=') {
            Some((key, data)) => {
                Ok((key.to_owned(), Value::parse(&header.info_type(key), data)?))
            }
            None => Ok((entry.to_owned(), Value::Flag)),
        })
        .collect()
}

fn sample(header: &Header, keys: &[&str], raw: &str) -> Result<Genotype, String> {
    let mut genotype = Genotype::default();
    for (key, data) in keys.iter().zip(raw.split(':')) {
        match *key {
            "GT" => genotype.alleles = genotype_alleles(data)?,
            "FT" => genotype.filter_tags = tag_set(data),
            _ if data == MISSING => {}
            _ => {
                let kind = match header.format_type(key) {
                    InfoType::Flag => InfoType::String,
                    kind => kind,
                };
                genotype
                    .fields
                    .insert((*key).to_owned(), Value::parse(&kind, data)?);
            }
        }
    }
    Ok(genotype)
}

/// Decode one tab separated VCF data line. `columns` optionally selects (and
/// orders) the sample columns to keep; unselected columns are not decoded.
pub(crate) fn variant(
    header: &Header,
    line: &str,
    columns: Option<&[usize]>,
) -> Result<Variant, String> {
    let fields: Vec<&str> = line.trim_end_matches(&['\r', '\n'][..]).split('\t').collect();
    if fields.len() < FIXED_COLUMNS {
        return Err(format!(
            "expected at least {} columns, found {}",
            FIXED_COLUMNS,
            fields.len()
        ));
    }
    let pos = fields[1]
        .parse::<u64>()
        .map_err(|_| format!("invalid position '{}'", fields[1]))?;
    let qual = match fields[5] {
        MISSING => None,
        q => Some(q.parse::<f32>().map_err(|_| format!("invalid QUAL '{}'", q))?),
    };
    let alt_alleles = match fields[4] {
        MISSING => vec![],
        alts => alts.split(',').map(str::to_owned).collect(),
    };

    let genotypes = if fields.len() > FIRST_SAMPLE_COLUMN {
        let samples = &fields[FIRST_SAMPLE_COLUMN..];
        if samples.len() != header.samples.len() {
            return Err(format!(
                "expected {} sample columns, found {}",
                header.samples.len(),
                samples.len()
            ));
        }
        let keys: Vec<&str> = fields[FORMAT_COLUMN].split(':').collect();
        match columns {
            Some(columns) => columns
                .iter()
                .map(|&c| sample(header, &keys, samples[c]))
                .collect::<Result<Vec<_>, _>>()?,
            None => samples
                .iter()
                .map(|raw| sample(header, &keys, raw))
                .collect::<Result<Vec<_>, _>>()?,
        }
    } else {
        vec![]
    };

    Ok(Variant {
        chrom: fields[0].to_owned(),
        pos,
        id: match fields[2] {
            MISSING => None,
            id => Some(id.to_owned()),
        },
        ref_allele: fields[3].to_owned(),
        alt_alleles,
        qual,
        filter_tags: tag_set(fields[6]),
        info: info(header, fields[7])?,
        genotypes,
    })
}
