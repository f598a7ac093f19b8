use std::collections::HashMap;
use std::convert::TryFrom;
use std::str::FromStr;

use getset::Getters;
use indexmap::IndexMap;
use multimap::MultiMap;
use serde::Serialize;
use strum::{Display, EnumString};

use crate::parser;

pub type Sample = String;

/// Missing value marker in VCF text (`.`).
pub(crate) const MISSING: &str = ".";

#[derive(Debug, Clone, Default, Getters)]
#[getset(get = "pub")]
pub struct Header {
    /// `##key=value` lines that are not INFO/FORMAT/FILTER/contig definitions.
    pub(crate) meta: MultiMap<String, String>,
    pub(crate) info: IndexMap<String, HeaderInfo>,
    pub(crate) format: IndexMap<String, HeaderInfo>,
    pub(crate) filters: IndexMap<String, HeaderFilter>,
    pub(crate) contigs: Vec<HeaderContig>,
    pub(crate) samples: Vec<Sample>,
}

impl Header {
    /// Declared type of an INFO key; undeclared keys are treated as strings
    /// (or flags, when they carry no value).
    pub(crate) fn info_type(&self, key: &str) -> InfoType {
        self.info
            .get(key)
            .map(|h| h.kind.clone())
            .unwrap_or(InfoType::String)
    }

    pub(crate) fn format_type(&self, key: &str) -> InfoType {
        self.format
            .get(key)
            .map(|h| h.kind.clone())
            .unwrap_or(InfoType::String)
    }
}

#[derive(Debug, Clone, Eq, PartialEq, EnumString)]
pub enum InfoType {
    Integer,
    Float,
    Flag,
    Character,
    String,
}

#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub enum InfoNumber {
    Count(usize),
    Alleles,
    AlternateAlleles,
    Genotypes,
    Unknown,
}

#[derive(Debug, Getters, Clone)]
#[getset(get = "pub")]
pub struct HeaderInfo {
    pub(crate) id: String,
    number: InfoNumber,
    kind: InfoType,
    description: String,
    additional: HashMap<String, String>,
}

impl<'a> TryFrom<Vec<(&'a str, &'a str)>> for HeaderInfo {
    type Error = String;

    fn try_from(data: Vec<(&'a str, &'a str)>) -> Result<Self, Self::Error> {
        let mut h: HashMap<_, _> = data.into_iter().collect();
        let id = h.remove("ID").ok_or("ID is mandatory")?;
        let number = h.remove("Number").ok_or("Number is mandatory")?;
        let number = parser::info_number(number)
            .map_err(|_| format!("unknown Number '{}' for {}", number, id))?
            .1;
        let kind = h.remove("Type").ok_or("Type is mandatory")?;
        let kind =
            InfoType::from_str(kind).map_err(|_| format!("unknown Type '{}' for {}", kind, id))?;
        Ok(HeaderInfo {
            id: id.into(),
            number,
            kind,
            description: h.remove("Description").unwrap_or("").into(),
            additional: h.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        })
    }
}

#[derive(Debug, Clone, Getters)]
#[getset(get = "pub")]
pub struct HeaderContig {
    pub(crate) id: String,
    length: Option<u64>,
}

impl<'a> TryFrom<Vec<(&'a str, &'a str)>> for HeaderContig {
    type Error = String;

    fn try_from(data: Vec<(&'a str, &'a str)>) -> Result<Self, Self::Error> {
        let mut h: HashMap<_, _> = data.into_iter().collect();
        Ok(HeaderContig {
            id: h.remove("ID").ok_or("ID is mandatory")?.into(),
            length: h.remove("length").and_then(|s| s.parse().ok()),
        })
    }
}

#[derive(Debug, Clone, Getters)]
#[getset(get = "pub")]
pub struct HeaderFilter {
    pub(crate) id: String,
    description: String,
}

impl<'a> TryFrom<Vec<(&'a str, &'a str)>> for HeaderFilter {
    type Error = String;

    fn try_from(data: Vec<(&'a str, &'a str)>) -> Result<Self, Self::Error> {
        let mut h: HashMap<_, _> = data.into_iter().collect();
        Ok(HeaderFilter {
            id: h.remove("ID").ok_or("ID is mandatory")?.into(),
            description: h.remove("Description").unwrap_or("").into(),
        })
    }
}

/// A decoded INFO or FORMAT payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Flag,
    Integer(Vec<Option<i32>>),
    Float(Vec<Option<f32>>),
    String(Vec<String>),
}

impl Value {
    /// Decode the comma separated text of a field according to its declared type.
    pub(crate) fn parse(kind: &InfoType, raw: &str) -> Result<Self, String> {
        fn each<T: FromStr>(raw: &str) -> Result<Vec<Option<T>>, String> {
            raw.split(',')
                .map(|v| {
                    if v == MISSING {
                        Ok(None)
                    } else {
                        v.parse()
                            .map(Some)
                            .map_err(|_| format!("cannot parse '{}'", v))
                    }
                })
                .collect()
        }
        Ok(match kind {
            InfoType::Flag => Value::Flag,
            InfoType::Integer => Value::Integer(each(raw)?),
            InfoType::Float => Value::Float(each(raw)?),
            InfoType::Character | InfoType::String => {
                Value::String(raw.split(',').map(str::to_owned).collect())
            }
        })
    }

    pub fn integer(&self) -> Option<&[Option<i32>]> {
        match self {
            Value::Integer(v) => Some(v.as_slice()),
            _ => None,
        }
    }

    /// Numeric view of the payload; integers are widened.
    pub fn float(&self) -> Option<Vec<Option<f32>>> {
        match self {
            Value::Float(v) => Some(v.clone()),
            Value::Integer(v) => Some(v.iter().map(|i| i.map(|i| i as f32)).collect()),
            _ => None,
        }
    }

    pub fn string(&self) -> Option<&[String]> {
        match self {
            Value::String(v) => Some(v.as_slice()),
            _ => None,
        }
    }

    pub fn flag(&self) -> bool {
        matches!(self, Value::Flag)
    }
}

/// Coarse variant class of a single REF/ALT pair.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, EnumString, Display, Serialize,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum VarType {
    Snp,
    Indel,
    #[strum(to_string = "sv", serialize = "structural")]
    Sv,
}

impl VarType {
    /// Classify one ALT allele against REF. `*` (overlapping deletion) and `.`
    /// carry no type.
    pub fn classify(ref_allele: &str, alt: &str) -> Option<VarType> {
        if alt == "*" || alt == MISSING {
            None
        } else if alt.starts_with('<') || alt.contains('[') || alt.contains(']') {
            Some(VarType::Sv)
        } else if alt.len() == ref_allele.len() {
            Some(VarType::Snp)
        } else {
            Some(VarType::Indel)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_parse() {
        assert_eq!(
            Value::parse(&InfoType::Integer, "1,.,3").unwrap(),
            Value::Integer(vec![Some(1), None, Some(3)])
        );
        assert_eq!(
            Value::parse(&InfoType::String, "a,b").unwrap(),
            Value::String(vec!["a".into(), "b".into()])
        );
        assert!(Value::parse(&InfoType::Float, "x").is_err());
        assert_eq!(
            Value::Integer(vec![Some(2)]).float(),
            Some(vec![Some(2.0)])
        );
    }

    #[test]
    fn test_vartype_classify() {
        assert_eq!(VarType::classify("A", "T"), Some(VarType::Snp));
        assert_eq!(VarType::classify("AC", "GT"), Some(VarType::Snp));
        assert_eq!(VarType::classify("A", "AT"), Some(VarType::Indel));
        assert_eq!(VarType::classify("ATT", "A"), Some(VarType::Indel));
        assert_eq!(VarType::classify("A", "<DEL>"), Some(VarType::Sv));
        assert_eq!(VarType::classify("A", "A[chr2:100["), Some(VarType::Sv));
        assert_eq!(VarType::classify("A", "*"), None);
    }

    #[test]
    fn test_vartype_strings() {
        assert_eq!(VarType::from_str("snp").unwrap(), VarType::Snp);
        assert_eq!(VarType::from_str("INDEL").unwrap(), VarType::Indel);
        assert_eq!(VarType::from_str("structural").unwrap(), VarType::Sv);
        assert_eq!(VarType::Sv.to_string(), "sv");
    }

    #[test]
    fn test_header_info_requires_id() {
        assert!(HeaderInfo::try_from(vec![("Number", "1"), ("Type", "Integer")]).is_err());
        let info = HeaderInfo::try_from(vec![
            ("ID", "DP"),
            ("Number", "1"),
            ("Type", "Integer"),
            ("Description", "Depth"),
        ])
        .unwrap();
        assert_eq!(info.number(), &InfoNumber::Count(1));
        assert_eq!(info.kind(), &InfoType::Integer);
    }
}
