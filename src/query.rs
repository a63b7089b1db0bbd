//! Search settings.
//!
//! A [`QueryBuilder`] accumulates and validates the settings of one search. Calling
//! [`QueryBuilder::build`] freezes them into a [`QueryDescriptor`], the value the request
//! encoder consumes. Descriptors are immutable; to tweak a query, clone the builder.
//!
//! # Example
//! ```rust
//! use searchd_client::query::{MatchMode, QueryBuilder, SortMode};
//!
//! let query = QueryBuilder::new("hello world")
//!     .index("articles")
//!     .limits(0, 10, 0, 0)
//!     .match_mode(MatchMode::Extended2)
//!     .sort_mode(SortMode::AttrDesc, "created_at")
//!     .filter("group_id", vec![1, 2], false)
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(query.limit, 10);
//! assert_eq!(query.filters.len(), 1);
//! ```
use std::{collections::BTreeMap, fmt, str::FromStr};

use crate::error::Error;

macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        $name:ident, $what:literal {
            $($variant:ident = $value:literal => $text:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            /// Protocol constant.
            pub fn code(self) -> u32 {
                match self {
                    $($name::$variant => $value),+
                }
            }

            pub fn from_code(code: u32) -> Option<Self> {
                match code {
                    $($value => Some($name::$variant),)+
                    _ => None,
                }
            }

            pub fn name(self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_ascii_lowercase().as_str() {
                    $($text => Ok($name::$variant),)+
                    other => Err(Error::argument(format!(
                        "\"{}\" argument value \"{}\" is invalid",
                        $what, other
                    ))),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.name())
            }
        }
    };
}

wire_enum! {
    /// How query words are matched against documents.
    MatchMode, "mode" {
        All = 0 => "all",
        Any = 1 => "any",
        Phrase = 2 => "phrase",
        Boolean = 3 => "boolean",
        Extended = 4 => "extended",
        Fullscan = 5 => "fullscan",
        Extended2 = 6 => "extended2",
    }
}

wire_enum! {
    /// Ranking function, honored by the extended matching modes only.
    RankingMode, "ranker" {
        ProximityBm25 = 0 => "proximity_bm25",
        Bm25 = 1 => "bm25",
        None = 2 => "none",
        WordCount = 3 => "wordcount",
        Proximity = 4 => "proximity",
        MatchAny = 5 => "matchany",
        FieldMask = 6 => "fieldmask",
        Sph04 = 7 => "sph04",
    }
}

wire_enum! {
    SortMode, "mode" {
        Relevance = 0 => "relevance",
        AttrDesc = 1 => "attr_desc",
        AttrAsc = 2 => "attr_asc",
        TimeSegments = 3 => "time_segments",
        Extended = 4 => "extended",
        Expr = 5 => "expr",
    }
}

wire_enum! {
    FilterType, "type" {
        Values = 0 => "values",
        Range = 1 => "range",
        FloatRange = 2 => "floatrange",
    }
}

wire_enum! {
    /// Attribute value types. Multi-valued attributes carry [`ATTR_MULTI`] on top.
    AttrType, "attrtype" {
        Integer = 1 => "integer",
        Timestamp = 2 => "timestamp",
        Ordinal = 3 => "ordinal",
        Bool = 4 => "bool",
        Float = 5 => "float",
        BigInt = 6 => "bigint",
        String = 7 => "string",
    }
}

wire_enum! {
    /// Function applied to the group-by attribute before grouping.
    GroupFunc, "func" {
        Day = 0 => "day",
        Week = 1 => "week",
        Month = 2 => "month",
        Year = 3 => "year",
        Attr = 4 => "attr",
        AttrPair = 5 => "attrpair",
    }
}

/// Flag bit marking a multi-valued attribute in a type tag.
pub const ATTR_MULTI: u32 = 0x4000_0000;

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Values {
        attribute: String,
        values: Vec<i64>,
        exclude: bool,
    },
    Range {
        attribute: String,
        min: i64,
        max: i64,
        exclude: bool,
    },
    FloatRange {
        attribute: String,
        min: f32,
        max: f32,
        exclude: bool,
    },
}

impl Filter {
    pub fn filter_type(&self) -> FilterType {
        match self {
            Filter::Values { .. } => FilterType::Values,
            Filter::Range { .. } => FilterType::Range,
            Filter::FloatRange { .. } => FilterType::FloatRange,
        }
    }

    pub fn attribute(&self) -> &str {
        match self {
            Filter::Values { attribute, .. }
            | Filter::Range { attribute, .. }
            | Filter::FloatRange { attribute, .. } => attribute,
        }
    }

    pub fn exclude(&self) -> bool {
        match self {
            Filter::Values { exclude, .. }
            | Filter::Range { exclude, .. }
            | Filter::FloatRange { exclude, .. } => *exclude,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeoAnchor {
    pub lat_attr: String,
    pub long_attr: String,
    pub lat: f32,
    pub long: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OverrideValue {
    Int(u32),
    BigInt(i64),
    Float(f32),
}

/// Per-query replacement of attribute values for specific documents.
#[derive(Debug, Clone, PartialEq)]
pub struct Override {
    pub attribute: String,
    pub attr_type: AttrType,
    pub values: BTreeMap<u64, OverrideValue>,
}

/// Immutable snapshot of one search.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryDescriptor {
    pub query: String,
    pub index: String,
    pub comment: String,
    pub offset: u32,
    pub limit: u32,
    pub match_mode: MatchMode,
    pub ranker: RankingMode,
    pub sort_mode: SortMode,
    pub sort_by: String,
    pub weights: Vec<u32>,
    pub field_weights: BTreeMap<String, u32>,
    pub index_weights: BTreeMap<String, u32>,
    pub min_id: u64,
    pub max_id: u64,
    pub filters: Vec<Filter>,
    pub group_func: GroupFunc,
    pub group_by: String,
    pub group_sort: String,
    pub group_distinct: String,
    pub max_matches: u32,
    pub cutoff: u32,
    pub retry_count: u32,
    pub retry_delay: u32,
    pub anchor: Option<GeoAnchor>,
    pub max_query_time: u32,
    pub overrides: Vec<Override>,
    pub select: String,
}

const DEFAULT_GROUP_SORT: &str = "@group desc";

/// Accumulates search settings; the first invalid argument is reported by [`build`](Self::build).
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    inner: QueryDescriptor,
    error: Option<Error>,
}

impl QueryBuilder {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            inner: QueryDescriptor {
                query: query.into(),
                index: "*".into(),
                comment: String::new(),
                offset: 0,
                limit: 20,
                match_mode: MatchMode::All,
                ranker: RankingMode::ProximityBm25,
                sort_mode: SortMode::Relevance,
                sort_by: String::new(),
                weights: Vec::new(),
                field_weights: BTreeMap::new(),
                index_weights: BTreeMap::new(),
                min_id: 0,
                max_id: 0,
                filters: Vec::new(),
                group_func: GroupFunc::Day,
                group_by: String::new(),
                group_sort: DEFAULT_GROUP_SORT.into(),
                group_distinct: String::new(),
                max_matches: 1000,
                cutoff: 0,
                retry_count: 0,
                retry_delay: 0,
                anchor: None,
                max_query_time: 0,
                overrides: Vec::new(),
                select: "*".into(),
            },
            error: None,
        }
    }

    fn fail(mut self, msg: &str) -> Self {
        if self.error.is_none() {
            self.error = Some(Error::argument(msg));
        }
        self
    }

    pub fn query(mut self, query: impl Into<String>) -> Self {
        self.inner.query = query.into();
        self
    }

    /// Index list to search, `*` for all.
    pub fn index(mut self, index: impl Into<String>) -> Self {
        self.inner.index = index.into();
        self
    }

    pub fn comment(mut self, comment: impl Into<String>) -> Self {
        self.inner.comment = comment.into();
        self
    }

    /// `max` and `cutoff` only replace the current values when non-zero.
    pub fn limits(mut self, offset: u32, limit: u32, max: u32, cutoff: u32) -> Self {
        if limit == 0 {
            return self.fail("\"limit\" argument should be greater to zero");
        }
        self.inner.offset = offset;
        self.inner.limit = limit;
        if max > 0 {
            self.inner.max_matches = max;
        }
        if cutoff > 0 {
            self.inner.cutoff = cutoff;
        }
        self
    }

    /// Milliseconds, 0 for no limit.
    pub fn max_query_time(mut self, max: u32) -> Self {
        self.inner.max_query_time = max;
        self
    }

    pub fn match_mode(mut self, mode: MatchMode) -> Self {
        self.inner.match_mode = mode;
        self
    }

    pub fn ranking_mode(mut self, ranker: RankingMode) -> Self {
        self.inner.ranker = ranker;
        self
    }

    pub fn sort_mode(mut self, mode: SortMode, sort_by: impl Into<String>) -> Self {
        let sort_by = sort_by.into();
        if mode != SortMode::Relevance && sort_by.is_empty() {
            return self.fail("\"sortby\" should not be empty unless mode is SPH_SORT_RELEVANCE");
        }
        self.inner.sort_mode = mode;
        self.inner.sort_by = sort_by;
        self
    }

    /// Positional field weights.
    pub fn weights(mut self, weights: Vec<u32>) -> Self {
        self.inner.weights = weights;
        self
    }

    pub fn field_weights<I, S>(mut self, weights: I) -> Self
    where
        I: IntoIterator<Item = (S, u32)>,
        S: Into<String>,
    {
        self.inner.field_weights = weights.into_iter().map(|(k, v)| (k.into(), v)).collect();
        self
    }

    pub fn index_weights<I, S>(mut self, weights: I) -> Self
    where
        I: IntoIterator<Item = (S, u32)>,
        S: Into<String>,
    {
        self.inner.index_weights = weights.into_iter().map(|(k, v)| (k.into(), v)).collect();
        self
    }

    /// Document id range; 0/0 means no restriction.
    pub fn id_range(mut self, min: u64, max: u64) -> Self {
        if min > max {
            return self.fail("\"max\" argument greater or equal to \"min\"");
        }
        self.inner.min_id = min;
        self.inner.max_id = max;
        self
    }

    pub fn filter(mut self, attribute: impl Into<String>, values: Vec<i64>, exclude: bool) -> Self {
        if values.is_empty() {
            return self.fail("\"values\" argument must not be empty");
        }
        self.inner.filters.push(Filter::Values {
            attribute: attribute.into(),
            values,
            exclude,
        });
        self
    }

    pub fn filter_range(
        mut self,
        attribute: impl Into<String>,
        min: i64,
        max: i64,
        exclude: bool,
    ) -> Self {
        if min > max {
            return self.fail("\"max\" argument greater or equal to \"min\"");
        }
        self.inner.filters.push(Filter::Range {
            attribute: attribute.into(),
            min,
            max,
            exclude,
        });
        self
    }

    pub fn filter_float_range(
        mut self,
        attribute: impl Into<String>,
        min: f32,
        max: f32,
        exclude: bool,
    ) -> Self {
        if !(min <= max) {
            return self.fail("\"max\" argument greater or equal to \"min\"");
        }
        self.inner.filters.push(Filter::FloatRange {
            attribute: attribute.into(),
            min,
            max,
            exclude,
        });
        self
    }

    /// Anchor point for geodistance, latitude and longitude in radians.
    pub fn geo_anchor(
        mut self,
        lat_attr: impl Into<String>,
        long_attr: impl Into<String>,
        lat: f32,
        long: f32,
    ) -> Self {
        self.inner.anchor = Some(GeoAnchor {
            lat_attr: lat_attr.into(),
            long_attr: long_attr.into(),
            lat,
            long,
        });
        self
    }

    pub fn group_by(
        mut self,
        attribute: impl Into<String>,
        func: GroupFunc,
        group_sort: impl Into<String>,
    ) -> Self {
        self.inner.group_by = attribute.into();
        self.inner.group_func = func;
        self.inner.group_sort = group_sort.into();
        self
    }

    pub fn group_distinct(mut self, attribute: impl Into<String>) -> Self {
        self.inner.group_distinct = attribute.into();
        self
    }

    /// Distributed retry count and delay, applied by the daemon itself.
    pub fn retries(mut self, count: u32, delay: u32) -> Self {
        self.inner.retry_count = count;
        self.inner.retry_delay = delay;
        self
    }

    pub fn override_values<I>(
        mut self,
        attribute: impl Into<String>,
        attr_type: AttrType,
        values: I,
    ) -> Self
    where
        I: IntoIterator<Item = (u64, OverrideValue)>,
    {
        let values: BTreeMap<u64, OverrideValue> = values.into_iter().collect();
        let matches = values.values().all(|v| {
            matches!(
                (attr_type, v),
                (AttrType::Float, OverrideValue::Float(_))
                    | (AttrType::BigInt, OverrideValue::BigInt(_))
                    | (
                        AttrType::Integer
                            | AttrType::Timestamp
                            | AttrType::Ordinal
                            | AttrType::Bool,
                        OverrideValue::Int(_)
                    )
            )
        });
        if attr_type == AttrType::String {
            return self.fail("\"attrtype\" argument value \"string\" is invalid");
        }
        if !matches {
            return self.fail(&format!(
                "\"values\" argument must be Hash map of Integer to {attr_type} values"
            ));
        }
        self.inner.overrides.push(Override {
            attribute: attribute.into(),
            attr_type,
            values,
        });
        self
    }

    pub fn select(mut self, select: impl Into<String>) -> Self {
        self.inner.select = select.into();
        self
    }

    pub fn reset_filters(mut self) -> Self {
        self.inner.filters.clear();
        self.inner.anchor = None;
        self
    }

    pub fn reset_group_by(mut self) -> Self {
        self.inner.group_by.clear();
        self.inner.group_func = GroupFunc::Day;
        self.inner.group_sort = DEFAULT_GROUP_SORT.into();
        self.inner.group_distinct.clear();
        self
    }

    pub fn reset_overrides(mut self) -> Self {
        self.inner.overrides.clear();
        self
    }

    pub fn build(self) -> Result<QueryDescriptor, Error> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.inner),
        }
    }
}
