//! Typed replies and the parsers that produce them.
use std::collections::BTreeMap;

use crate::{
    error::DecodeError,
    query::{ATTR_MULTI, AttrType},
};

use super::{ReplyReader, Status};

/// Reply body after header and status handling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub version: u16,
    pub body: Vec<u8>,
    pub warning: Option<String>,
}

/// Attribute declared in a search result schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttrDecl {
    pub name: String,
    /// Raw type tag, possibly carrying [`ATTR_MULTI`].
    pub tag: u32,
}

impl AttrDecl {
    pub fn is_multi(&self) -> bool {
        self.tag & ATTR_MULTI != 0
    }

    pub fn attr_type(&self) -> Option<AttrType> {
        AttrType::from_code(self.tag & !ATTR_MULTI)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    Int(u32),
    BigInt(i64),
    Float(f32),
    String(String),
    Multi(Vec<u32>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Match {
    pub id: u64,
    pub weight: u32,
    /// Values in schema order.
    pub attrs: Vec<(String, AttrValue)>,
}

impl Match {
    pub fn attr(&self, name: &str) -> Option<&AttrValue> {
        self.attrs.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WordStats {
    pub docs: u32,
    pub hits: u32,
}

/// Outcome of one search in a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultSet {
    pub status: Status,
    pub error: String,
    pub warning: String,
    pub fields: Vec<String>,
    pub attrs: Vec<AttrDecl>,
    pub matches: Vec<Match>,
    /// Matches returned in this reply.
    pub total: u32,
    /// Matches found in the index.
    pub total_found: u32,
    /// Elapsed search time, milliseconds.
    pub time_ms: u32,
    pub words: BTreeMap<String, WordStats>,
}

impl ResultSet {
    fn empty(status: Status) -> Self {
        Self {
            status,
            error: String::new(),
            warning: String::new(),
            fields: Vec::new(),
            attrs: Vec::new(),
            matches: Vec::new(),
            total: 0,
            total_found: 0,
            time_ms: 0,
            words: BTreeMap::new(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.status, Status::Error | Status::Retry)
    }

    /// Elapsed search time, seconds.
    pub fn time(&self) -> f64 {
        f64::from(self.time_ms) / 1000.0
    }
}

/// Parses the result blocks of a (possibly batched) search reply, in query order.
pub fn parse_search(body: &[u8], queries: usize) -> Result<Vec<ResultSet>, DecodeError> {
    let mut r = ReplyReader::new(body);
    (0..queries).map(|_| parse_result_set(&mut r)).collect()
}

fn parse_result_set(r: &mut ReplyReader<'_>) -> Result<ResultSet, DecodeError> {
    let code = r.u32()?;
    // unknown per-query codes are reported as errors with their message
    let status = Status::from_code(code).unwrap_or(Status::Error);
    let mut result = ResultSet::empty(status);

    if status != Status::Ok {
        let message = r.string()?;
        if status == Status::Warning {
            result.warning = message;
        } else {
            result.error = message;
            return Ok(result);
        }
    }

    let nfields = r.count(4)?;
    for _ in 0..nfields {
        result.fields.push(r.string()?);
    }

    let nattrs = r.count(8)?;
    for _ in 0..nattrs {
        let name = r.string()?;
        let tag = r.u32()?;
        result.attrs.push(AttrDecl { name, tag });
    }

    let count = r.count(8)?;
    let id64 = r.u32()? != 0;
    for _ in 0..count {
        let (id, weight) = if id64 {
            (r.u64()?, r.u32()?)
        } else {
            (u64::from(r.u32()?), r.u32()?)
        };
        let mut attrs = Vec::with_capacity(result.attrs.len());
        for decl in &result.attrs {
            attrs.push((decl.name.clone(), parse_attr_value(r, decl)?));
        }
        result.matches.push(Match { id, weight, attrs });
    }

    result.total = r.u32()?;
    result.total_found = r.u32()?;
    result.time_ms = r.u32()?;
    let nwords = r.count(12)?;
    for _ in 0..nwords {
        let word = r.string()?;
        let docs = r.u32()?;
        let hits = r.u32()?;
        result.words.insert(word, WordStats { docs, hits });
    }

    Ok(result)
}

fn parse_attr_value(r: &mut ReplyReader<'_>, decl: &AttrDecl) -> Result<AttrValue, DecodeError> {
    Ok(match decl.attr_type() {
        Some(AttrType::BigInt) if !decl.is_multi() => AttrValue::BigInt(r.i64()?),
        Some(AttrType::Float) if !decl.is_multi() => AttrValue::Float(r.f32()?),
        Some(AttrType::String) if !decl.is_multi() => AttrValue::String(r.string()?),
        _ if decl.is_multi() => {
            let n = r.count(4)?;
            let mut values = Vec::with_capacity(n);
            for _ in 0..n {
                values.push(r.u32()?);
            }
            AttrValue::Multi(values)
        }
        _ => AttrValue::Int(r.u32()?),
    })
}

/// One snippet per submitted document, in order.
pub fn parse_excerpts(body: &[u8], docs: usize) -> Result<Vec<String>, DecodeError> {
    let mut r = ReplyReader::new(body);
    (0..docs).map(|_| r.string()).collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keyword {
    pub tokenized: String,
    pub normalized: String,
    /// Present only when hit statistics were requested.
    pub stats: Option<WordStats>,
}

pub fn parse_keywords(body: &[u8], hits: bool) -> Result<Vec<Keyword>, DecodeError> {
    let mut r = ReplyReader::new(body);
    let n = r.count(8)?;
    let mut out = Vec::with_capacity(n);
    for _ in 0..n {
        let tokenized = r.string()?;
        let normalized = r.string()?;
        let stats = if hits {
            Some(WordStats {
                docs: r.u32()?,
                hits: r.u32()?,
            })
        } else {
            None
        };
        out.push(Keyword {
            tokenized,
            normalized,
            stats,
        });
    }
    Ok(out)
}

/// Number of updated documents, -1 when the daemon refused the update.
pub fn parse_update(body: &[u8]) -> Result<i32, DecodeError> {
    ReplyReader::new(body).i32()
}

/// Row-major grid of status counters.
pub fn parse_status(body: &[u8]) -> Result<Vec<Vec<String>>, DecodeError> {
    let mut r = ReplyReader::new(body);
    let rows = r.u32()? as usize;
    let cols = r.u32()? as usize;
    if rows.saturating_mul(cols).saturating_mul(4) > r.remaining() {
        return Err(DecodeError::Underrun {
            needed: rows.saturating_mul(cols).saturating_mul(4),
            remaining: r.remaining(),
        });
    }
    (0..rows)
        .map(|_| (0..cols).map(|_| r.string()).collect::<Result<Vec<_>, _>>())
        .collect()
}

/// Flush tag, or -1 when the daemon sent no tag at all.
pub fn parse_flush(body: &[u8]) -> Result<i32, DecodeError> {
    Ok(ReplyReader::new(body).trailing_i32()?.unwrap_or(-1))
}

#[cfg(test)]
mod tests {
    use crate::protocol::RequestWriter;

    use super::*;

    /// Reply with a schema of two fields and four attributes, three matches.
    fn fixture() -> Vec<u8> {
        let mut w = RequestWriter::new();
        w.put_u32(0);
        w.put_u32(2).put_str("name").put_str("description");
        w.put_u32(4)
            .put_str("group_id")
            .put_u32(1)
            .put_str("created_at")
            .put_u32(2)
            .put_str("rating")
            .put_u32(5)
            .put_str("tags")
            .put_u32(ATTR_MULTI | 1);
        w.put_u32(3).put_u32(1);
        for (id, weight, group, created, rating, tags) in [
            (1u64, 3u32, 10u32, 1175658490u32, 1.5f32, vec![1u32, 2]),
            (4294967297, 2, 20, 1175658491, 2.25, vec![]),
            (3, 1, 10, 1175658492, 0.0, vec![7]),
        ] {
            w.put_u64(id)
                .put_u32(weight)
                .put_u32(group)
                .put_u32(created)
                .put_f32(rating)
                .put_u32_array(&tags);
        }
        w.put_u32(3).put_u32(3).put_u32(123).put_u32(1);
        w.put_str("test").put_u32(3).put_u32(5);
        w.into_bytes()
    }

    #[test]
    fn schema_driven_decode() {
        let results = parse_search(&fixture(), 1).unwrap();
        assert_eq!(results.len(), 1);
        let result = &results[0];

        assert_eq!(result.status, Status::Ok);
        assert_eq!(result.fields, vec!["name", "description"]);
        assert_eq!(result.attrs.len(), 4);
        assert!(result.attrs[3].is_multi());
        assert_eq!(result.attrs[1].attr_type(), Some(AttrType::Timestamp));

        assert_eq!(result.matches.len(), 3);
        let ids: Vec<u64> = result.matches.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![1, 4294967297, 3]);
        let weights: Vec<u32> = result.matches.iter().map(|m| m.weight).collect();
        assert_eq!(weights, vec![3, 2, 1]);

        let first = &result.matches[0];
        assert_eq!(first.attr("group_id"), Some(&AttrValue::Int(10)));
        assert_eq!(first.attr("created_at"), Some(&AttrValue::Int(1175658490)));
        assert_eq!(first.attr("rating"), Some(&AttrValue::Float(1.5)));
        assert_eq!(first.attr("tags"), Some(&AttrValue::Multi(vec![1, 2])));
        assert_eq!(result.matches[1].attr("tags"), Some(&AttrValue::Multi(vec![])));

        assert_eq!(result.total, 3);
        assert_eq!(result.total_found, 3);
        assert_eq!(result.time(), 0.123);
        assert_eq!(result.words["test"], WordStats { docs: 3, hits: 5 });
    }

    #[test]
    fn short_ids() {
        let mut w = RequestWriter::new();
        w.put_u32(0).put_u32(0).put_u32(0);
        w.put_u32(1).put_u32(0).put_u32(42).put_u32(7);
        w.put_u32(1).put_u32(1).put_u32(0).put_u32(0);
        let result = &parse_search(w.as_bytes(), 1).unwrap()[0];
        assert_eq!(result.matches[0].id, 42);
        assert_eq!(result.matches[0].weight, 7);
    }

    #[test]
    fn bigint_and_string_attrs() {
        let mut w = RequestWriter::new();
        w.put_u32(0).put_u32(0);
        w.put_u32(2).put_str("big").put_u32(6).put_str("label").put_u32(7);
        w.put_u32(1).put_u32(1);
        w.put_u64(9).put_u32(1).put_i64(-4294967297).put_str("hello");
        w.put_u32(1).put_u32(1).put_u32(0).put_u32(0);
        let result = &parse_search(w.as_bytes(), 1).unwrap()[0];
        assert_eq!(result.matches[0].attr("big"), Some(&AttrValue::BigInt(-4294967297)));
        assert_eq!(
            result.matches[0].attr("label"),
            Some(&AttrValue::String("hello".into()))
        );
    }

    #[test]
    fn batch_with_failed_query() {
        let mut w = RequestWriter::new();
        w.put_u32(1).put_str("index not found");
        w.put_u32(3).put_str("slow");
        w.put_u32(0).put_u32(0).put_u32(0).put_u32(0).put_u32(0).put_u32(0).put_u32(0);
        w.put_u32(0);

        let results = parse_search(w.as_bytes(), 2).unwrap();
        assert!(results[0].is_error());
        assert_eq!(results[0].error, "index not found");
        assert!(!results[1].is_error());
        assert_eq!(results[1].warning, "slow");
    }

    #[test]
    fn truncated_match_list() {
        let body = fixture();
        assert!(parse_search(&body[..body.len() - 10], 1).is_err());
    }

    #[test]
    fn keywords_with_and_without_hits() {
        let mut w = RequestWriter::new();
        w.put_u32(1).put_str("Running").put_str("run").put_u32(2).put_u32(4);
        let kws = parse_keywords(w.as_bytes(), true).unwrap();
        assert_eq!(kws[0].normalized, "run");
        assert_eq!(kws[0].stats, Some(WordStats { docs: 2, hits: 4 }));

        let mut w = RequestWriter::new();
        w.put_u32(1).put_str("Running").put_str("run");
        assert_eq!(parse_keywords(w.as_bytes(), false).unwrap()[0].stats, None);
    }

    #[test]
    fn status_grid() {
        let mut w = RequestWriter::new();
        w.put_u32(2).put_u32(2);
        w.put_str("uptime").put_str("10").put_str("queries").put_str("3");
        let grid = parse_status(w.as_bytes()).unwrap();
        assert_eq!(grid, vec![vec!["uptime", "10"], vec!["queries", "3"]]);
    }

    #[test]
    fn flush_tag() {
        assert_eq!(parse_flush(&[0, 0, 0, 5]).unwrap(), 5);
        assert_eq!(parse_flush(&[]).unwrap(), -1);
        assert!(parse_flush(&[0, 0, 5]).is_err());
    }

    #[test]
    fn update_count() {
        assert_eq!(parse_update(&[0, 0, 0, 2]).unwrap(), 2);
        assert_eq!(parse_update(&[0xff, 0xff, 0xff, 0xff]).unwrap(), -1);
    }
}
