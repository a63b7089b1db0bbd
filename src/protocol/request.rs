//! Request body builders, one per daemon command.
//!
//! Field order is fixed by the command version in [`Command::version`] and must not change.
use std::collections::BTreeMap;

use crate::{
    error::Error,
    query::{Filter, OverrideValue, QueryDescriptor},
};

use super::{Command, RequestWriter};

/// A request ready to be framed on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub command: Command,
    pub body: Vec<u8>,
    /// Extra header field, counted in the body length.
    pub extra: Option<u32>,
}

impl Request {
    pub fn new(command: Command, body: Vec<u8>) -> Self {
        Self {
            command,
            body,
            extra: None,
        }
    }

    /// Several search bodies sent as one request, answered in order.
    pub fn batch(bodies: &[Vec<u8>]) -> Self {
        Self {
            command: Command::Search,
            body: bodies.concat(),
            extra: Some(bodies.len() as u32),
        }
    }

    /// Length announced in the header.
    pub fn wire_len(&self) -> u32 {
        (self.body.len() + if self.extra.is_some() { 4 } else { 0 }) as u32
    }

    /// Stable hash of the body, used to pin identical requests to the same endpoint.
    pub fn checksum(&self) -> u32 {
        crc32fast::hash(&self.body)
    }
}

/// Encodes a single search. The result can be batched with [`Request::batch`].
pub fn search_body(q: &QueryDescriptor) -> Vec<u8> {
    let mut w = RequestWriter::new();
    w.put_u32(q.offset)
        .put_u32(q.limit)
        .put_u32(q.match_mode.code())
        .put_u32(q.ranker.code())
        .put_u32(q.sort_mode.code())
        .put_str(&q.sort_by)
        .put_str(&q.query)
        .put_u32_array(&q.weights)
        .put_str(&q.index)
        .put_u32(1)
        .put_u64(q.min_id)
        .put_u64(q.max_id);

    w.put_len(q.filters.len());
    for filter in &q.filters {
        w.put_str(filter.attribute())
            .put_u32(filter.filter_type().code());
        match filter {
            Filter::Values { values, .. } => {
                w.put_i64_array(values);
            }
            Filter::Range { min, max, .. } => {
                w.put_i64(*min).put_i64(*max);
            }
            Filter::FloatRange { min, max, .. } => {
                w.put_f32(*min).put_f32(*max);
            }
        }
        w.put_bool(filter.exclude());
    }

    w.put_u32(q.group_func.code())
        .put_str(&q.group_by)
        .put_u32(q.max_matches)
        .put_str(&q.group_sort)
        .put_u32(q.cutoff)
        .put_u32(q.retry_count)
        .put_u32(q.retry_delay)
        .put_str(&q.group_distinct);

    match &q.anchor {
        None => {
            w.put_u32(0);
        }
        Some(anchor) => {
            w.put_u32(1)
                .put_str(&anchor.lat_attr)
                .put_str(&anchor.long_attr)
                .put_f32(anchor.lat)
                .put_f32(anchor.long);
        }
    }

    put_weight_map(&mut w, &q.index_weights);
    w.put_u32(q.max_query_time);
    put_weight_map(&mut w, &q.field_weights);
    w.put_str(&q.comment);

    w.put_len(q.overrides.len());
    for entry in &q.overrides {
        w.put_str(&entry.attribute)
            .put_u32(entry.attr_type.code())
            .put_len(entry.values.len());
        for (id, value) in &entry.values {
            w.put_u64(*id);
            match value {
                OverrideValue::Int(v) => w.put_u32(*v),
                OverrideValue::BigInt(v) => w.put_i64(*v),
                OverrideValue::Float(v) => w.put_f32(*v),
            };
        }
    }

    w.put_str(&q.select);
    w.into_bytes()
}

fn put_weight_map(w: &mut RequestWriter, weights: &BTreeMap<String, u32>) {
    w.put_len(weights.len());
    for (name, weight) in weights {
        w.put_str(name).put_u32(*weight);
    }
}

/// Snippet generation options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExcerptOptions {
    pub before_match: String,
    pub after_match: String,
    pub chunk_separator: String,
    /// Maximum snippet size, in symbols.
    pub limit: u32,
    /// Words to keep around each matching keyword.
    pub around: u32,
    pub exact_phrase: bool,
    pub single_passage: bool,
    pub use_boundaries: bool,
    pub weight_order: bool,
    pub query_mode: bool,
}

impl Default for ExcerptOptions {
    fn default() -> Self {
        Self {
            before_match: "<b>".into(),
            after_match: "</b>".into(),
            chunk_separator: " ... ".into(),
            limit: 256,
            around: 5,
            exact_phrase: false,
            single_passage: false,
            use_boundaries: false,
            weight_order: false,
            query_mode: false,
        }
    }
}

impl ExcerptOptions {
    fn flags(&self) -> u32 {
        // bit 0: remove spaces, always on
        let mut flags = 1;
        for (set, bit) in [
            (self.exact_phrase, 2),
            (self.single_passage, 4),
            (self.use_boundaries, 8),
            (self.weight_order, 16),
            (self.query_mode, 32),
        ] {
            if set {
                flags |= bit;
            }
        }
        flags
    }
}

pub fn excerpts_request<S: AsRef<str>>(
    docs: &[S],
    index: &str,
    words: &str,
    opts: &ExcerptOptions,
) -> Request {
    let mut w = RequestWriter::new();
    w.put_u32(0)
        .put_u32(opts.flags())
        .put_str(index)
        .put_str(words)
        .put_str(&opts.before_match)
        .put_str(&opts.after_match)
        .put_str(&opts.chunk_separator)
        .put_u32(opts.limit)
        .put_u32(opts.around)
        .put_len(docs.len());
    for doc in docs {
        w.put_str(doc.as_ref());
    }
    Request::new(Command::Excerpt, w.into_bytes())
}

pub fn keywords_request(query: &str, index: &str, hits: bool) -> Request {
    let mut w = RequestWriter::new();
    w.put_str(query).put_str(index).put_bool(hits);
    Request::new(Command::Keywords, w.into_bytes())
}

/// New attribute values, keyed by document id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateValues {
    Scalar(BTreeMap<u64, Vec<u32>>),
    Multi(BTreeMap<u64, Vec<Vec<u32>>>),
}

/// Validated attribute update for one index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeUpdate {
    attributes: Vec<String>,
    values: UpdateValues,
}

impl AttributeUpdate {
    pub fn new<S: Into<String>>(
        attributes: impl IntoIterator<Item = S>,
        values: UpdateValues,
    ) -> Result<Self, Error> {
        let attributes: Vec<String> = attributes.into_iter().map(Into::into).collect();
        let expected = attributes.len();
        let consistent = match &values {
            UpdateValues::Scalar(docs) => docs.values().all(|v| v.len() == expected),
            UpdateValues::Multi(docs) => docs.values().all(|v| v.len() == expected),
        };
        if !consistent {
            return Err(Error::argument(format!(
                "\"values\" argument Hash values Array must have {expected} elements"
            )));
        }
        Ok(Self { attributes, values })
    }

    pub fn attributes(&self) -> &[String] {
        &self.attributes
    }

    pub fn is_multi(&self) -> bool {
        matches!(self.values, UpdateValues::Multi(_))
    }
}

pub fn update_request(index: &str, update: &AttributeUpdate) -> Request {
    let mut w = RequestWriter::new();
    w.put_str(index).put_len(update.attributes.len());
    for attr in &update.attributes {
        w.put_str(attr).put_bool(update.is_multi());
    }
    match &update.values {
        UpdateValues::Scalar(docs) => {
            w.put_len(docs.len());
            for (id, values) in docs {
                w.put_u64(*id);
                for v in values {
                    w.put_u32(*v);
                }
            }
        }
        UpdateValues::Multi(docs) => {
            w.put_len(docs.len());
            for (id, values) in docs {
                w.put_u64(*id);
                for v in values {
                    w.put_u32_array(v);
                }
            }
        }
    }
    Request::new(Command::Update, w.into_bytes())
}

pub fn status_request() -> Request {
    let mut w = RequestWriter::new();
    w.put_u32(1);
    Request::new(Command::Status, w.into_bytes())
}

pub fn flush_request() -> Request {
    Request::new(Command::FlushAttrs, Vec::new())
}

pub fn persist_request() -> Request {
    let mut w = RequestWriter::new();
    w.put_u32(1);
    Request::new(Command::Persist, w.into_bytes())
}
