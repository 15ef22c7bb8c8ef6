//! Filters, transforms and execution.
//!
//! Every filter adds one query parameter `<column>=<operator>.<operand>`.
//! Parameters are keyed by column and operator: repeating the same pair
//! replaces the earlier operand, while different operators on one column are
//! all sent (`age=gte.18&age=lte.65`). `or`/`and` groups are keyed by their
//! parameter name (`or`, `actors.or`) and replace likewise.
//!
//! The query string is serialized with parameter names in sorted order.

use std::fmt::Display;

use bytes::Bytes;
use http::Method;
use serde::de::DeserializeOwned;

use crate::ClientError;
use crate::query::{QueryState, Returning, clean_columns};
use crate::request::ApiRequest;
use crate::response::QueryResponse;

/// Full-text search flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextSearchKind {
    /// `to_tsquery` (`fts`).
    #[default]
    Default,
    /// `plainto_tsquery` (`plfts`).
    Plain,
    /// `phraseto_tsquery` (`phfts`).
    Phrase,
    /// `websearch_to_tsquery` (`wfts`).
    Websearch,
}

impl TextSearchKind {
    fn operator(&self) -> &'static str {
        match self {
            TextSearchKind::Default => "fts",
            TextSearchKind::Plain => "plfts",
            TextSearchKind::Phrase => "phfts",
            TextSearchKind::Websearch => "wfts",
        }
    }
}

/// Placement of `NULL`s in an ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Nulls {
    First,
    Last,
}

/// Options for [`FilterBuilder::order`].
#[derive(Debug, Clone)]
pub struct OrderOptions {
    ascending: bool,
    nulls: Option<Nulls>,
    foreign_table: Option<String>,
}

impl Default for OrderOptions {
    fn default() -> Self {
        Self::ascending()
    }
}

impl OrderOptions {
    pub fn ascending() -> Self {
        Self {
            ascending: true,
            nulls: None,
            foreign_table: None,
        }
    }

    pub fn descending() -> Self {
        Self {
            ascending: false,
            ..Self::ascending()
        }
    }

    pub fn nulls_first(mut self) -> Self {
        self.nulls = Some(Nulls::First);
        self
    }

    pub fn nulls_last(mut self) -> Self {
        self.nulls = Some(Nulls::Last);
        self
    }

    /// Order an embedded resource instead of the top-level rows.
    pub fn foreign_table(mut self, table: impl Into<String>) -> Self {
        self.foreign_table = Some(table.into());
        self
    }
}

/// Narrows, shapes and executes a query.
///
/// # Example
///
/// ```ignore
/// use postgrest_client::OrderOptions;
///
/// let response = client
///     .from("film")
///     .select("title,rating", "exact", false)
///     .gte("length", 90)
///     .in_("rating", ["PG", "PG-13"])
///     .order("title", OrderOptions::ascending())
///     .range(0, 24)
///     .execute_to::<Vec<Film>>()
///     .await?;
/// ```
#[derive(Debug, Clone)]
pub struct FilterBuilder {
    state: QueryState,
}

impl FilterBuilder {
    pub(crate) fn new(state: QueryState) -> Self {
        Self { state }
    }

    fn op(mut self, column: &str, operator: &str, operand: impl Display) -> Self {
        self.state
            .set_param(column, operator, format!("{operator}.{operand}"));
        self
    }

    /// Raw filter: `column=operator.value`, e.g. `filter("id", "in", "(1,2)")`.
    ///
    /// The operator and value are sent as given.
    pub fn filter(self, column: &str, operator: &str, value: impl Display) -> Self {
        self.op(column, operator, value)
    }

    pub fn eq(self, column: &str, value: impl Display) -> Self {
        self.op(column, "eq", value)
    }

    pub fn neq(self, column: &str, value: impl Display) -> Self {
        self.op(column, "neq", value)
    }

    pub fn gt(self, column: &str, value: impl Display) -> Self {
        self.op(column, "gt", value)
    }

    pub fn gte(self, column: &str, value: impl Display) -> Self {
        self.op(column, "gte", value)
    }

    pub fn lt(self, column: &str, value: impl Display) -> Self {
        self.op(column, "lt", value)
    }

    pub fn lte(self, column: &str, value: impl Display) -> Self {
        self.op(column, "lte", value)
    }

    /// Case-sensitive pattern match; `%` is the wildcard.
    pub fn like(self, column: &str, pattern: &str) -> Self {
        self.op(column, "like", pattern)
    }

    /// Case-insensitive pattern match.
    pub fn ilike(self, column: &str, pattern: &str) -> Self {
        self.op(column, "ilike", pattern)
    }

    /// Identity check against `null`, `true`, `false` or `unknown`.
    pub fn is(self, column: &str, value: impl Display) -> Self {
        self.op(column, "is", value)
    }

    /// Membership in a list: `in.(a,b)`.
    ///
    /// Values containing `,`, `(` or `)` are double-quoted.
    pub fn in_<I, V>(self, column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Display,
    {
        let list = join(values, |value| {
            if value.contains([',', '(', ')']) {
                format!("\"{value}\"")
            } else {
                value
            }
        });
        self.op(column, "in", format_args!("({list})"))
    }

    /// Array or range column contains every element: `cs.{a,b}`.
    pub fn contains<I, V>(self, column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Display,
    {
        let list = join(values, |value| value);
        self.op(column, "cs", format_args!("{{{list}}}"))
    }

    /// Every element of the column is in the list: `cd.{a,b}`.
    pub fn contained_by<I, V>(self, column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Display,
    {
        let list = join(values, |value| value);
        self.op(column, "cd", format_args!("{{{list}}}"))
    }

    /// Column shares an element with the list: `ov.{a,b}`.
    pub fn overlaps<I, V>(self, column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Display,
    {
        let list = join(values, |value| value);
        self.op(column, "ov", format_args!("{{{list}}}"))
    }

    /// Range column is strictly left of `range`, e.g. `[1,10)`.
    pub fn range_lt(self, column: &str, range: &str) -> Self {
        self.op(column, "sl", range)
    }

    /// Range column is strictly right of `range`.
    pub fn range_gt(self, column: &str, range: &str) -> Self {
        self.op(column, "sr", range)
    }

    /// Range column does not extend left of `range`.
    pub fn range_gte(self, column: &str, range: &str) -> Self {
        self.op(column, "nxl", range)
    }

    /// Range column does not extend right of `range`.
    pub fn range_lte(self, column: &str, range: &str) -> Self {
        self.op(column, "nxr", range)
    }

    pub fn range_adjacent(self, column: &str, range: &str) -> Self {
        self.op(column, "adj", range)
    }

    /// Full-text search on a `tsvector` column.
    ///
    /// `config` names the text search configuration, e.g. `english`.
    pub fn text_search(
        mut self,
        column: &str,
        query: &str,
        kind: TextSearchKind,
        config: Option<&str>,
    ) -> Self {
        let operator = kind.operator();
        let value = match config {
            Some(config) => format!("{operator}({config}).{query}"),
            None => format!("{operator}.{query}"),
        };
        self.state.set_param(column, operator, value);
        self
    }

    /// Negate an operator: `not.<operator>.<value>`.
    pub fn not(mut self, column: &str, operator: &str, value: impl Display) -> Self {
        self.state.set_param(
            column,
            format!("not.{operator}"),
            format!("not.{operator}.{value}"),
        );
        self
    }

    /// `eq` for each column/value pair.
    pub fn match_<I, K, V>(mut self, query: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Display,
    {
        for (column, value) in query {
            self = self.eq(column.as_ref(), value);
        }
        self
    }

    /// Rows matching at least one filter, in PostgREST syntax:
    /// `or("id.eq.1,name.eq.bob", None)`.
    pub fn or(mut self, filters: &str, foreign_table: Option<&str>) -> Self {
        self.state
            .set_param(scoped("or", foreign_table), "", format!("({filters})"));
        self
    }

    /// Rows matching every filter; useful inside foreign tables or to nest
    /// under `or`.
    pub fn and(mut self, filters: &str, foreign_table: Option<&str>) -> Self {
        self.state
            .set_param(scoped("and", foreign_table), "", format!("({filters})"));
        self
    }

    /// Matches every pattern: `like(all).{a,b}`.
    pub fn like_all_of<I, V>(self, column: &str, patterns: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Display,
    {
        let list = join(patterns, |value| value);
        self.op(column, "like(all)", format_args!("{{{list}}}"))
    }

    /// Matches any pattern: `like(any).{a,b}`.
    pub fn like_any_of<I, V>(self, column: &str, patterns: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Display,
    {
        let list = join(patterns, |value| value);
        self.op(column, "like(any)", format_args!("{{{list}}}"))
    }

    pub fn ilike_all_of<I, V>(self, column: &str, patterns: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Display,
    {
        let list = join(patterns, |value| value);
        self.op(column, "ilike(all)", format_args!("{{{list}}}"))
    }

    pub fn ilike_any_of<I, V>(self, column: &str, patterns: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Display,
    {
        let list = join(patterns, |value| value);
        self.op(column, "ilike(any)", format_args!("{{{list}}}"))
    }

    /// Pick the returned columns. On writes this also asks for the written
    /// rows back (`Prefer: return=representation`).
    pub fn select(mut self, columns: &str) -> Self {
        self.state.set_param("select", "", clean_columns(columns));
        if [Method::POST, Method::PATCH, Method::DELETE].contains(self.state.method()) {
            self.state
                .prefer(format!("return={}", Returning::Representation.as_str()));
        }
        self
    }

    /// Order by `column`. Repeated calls add tie-breakers in call order.
    pub fn order(mut self, column: &str, options: OrderOptions) -> Self {
        let key = scoped("order", options.foreign_table.as_deref());
        let mut term = format!(
            "{column}.{}",
            if options.ascending { "asc" } else { "desc" }
        );
        match options.nulls {
            Some(Nulls::First) => term.push_str(".nullsfirst"),
            Some(Nulls::Last) => term.push_str(".nullslast"),
            None => {}
        }
        let value = match self.state.param(&key, "") {
            Some(existing) => format!("{existing},{term}"),
            None => term,
        };
        self.state.set_param(key, "", value);
        self
    }

    /// Return at most `count` rows.
    pub fn limit(self, count: u64) -> Self {
        self.limit_foreign(count, None)
    }

    /// Limit the rows of an embedded resource when `foreign_table` is set.
    pub fn limit_foreign(mut self, count: u64, foreign_table: Option<&str>) -> Self {
        self.state
            .set_param(scoped("limit", foreign_table), "", count.to_string());
        self
    }

    /// Skip the first `count` rows.
    pub fn offset(self, count: u64) -> Self {
        self.offset_foreign(count, None)
    }

    pub fn offset_foreign(mut self, count: u64, foreign_table: Option<&str>) -> Self {
        self.state
            .set_param(scoped("offset", foreign_table), "", count.to_string());
        self
    }

    /// Rows `from..=to`, zero-based, through the `Range` header.
    pub fn range(mut self, from: u64, to: u64) -> Self {
        self.state.set_header("range-unit", "items");
        self.state.set_header("range", &format!("{from}-{to}"));
        self
    }

    /// Rows `from..=to` of an embedded resource, as `offset`/`limit`
    /// parameters scoped to `foreign_table`.
    pub fn range_foreign(self, from: u64, to: u64, foreign_table: &str) -> Self {
        let limit = to.saturating_sub(from).saturating_add(1);
        self.offset_foreign(from, Some(foreign_table))
            .limit_foreign(limit, Some(foreign_table))
    }

    /// Return a single JSON object instead of an array; the server rejects
    /// results with zero or several rows.
    pub fn single(mut self) -> Self {
        self.state
            .set_header("accept", "application/vnd.pgrst.object+json");
        self
    }

    /// Return the result as CSV.
    pub fn csv(mut self) -> Self {
        self.state.set_header("accept", "text/csv");
        self
    }

    /// Set a request-level header that overrides the client default.
    ///
    /// `Prefer` tokens are merged with the builder's own, later tokens with
    /// the same key winning.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.state.set_header(name, value);
        self
    }

    /// The request this builder would send.
    pub fn to_request(&self) -> Result<ApiRequest, ClientError> {
        self.state.to_request()
    }

    /// Send the request and return the raw body.
    pub async fn execute(self) -> Result<QueryResponse<Bytes>, ClientError> {
        self.state.execute().await
    }

    /// Send the request and return the body as text.
    pub async fn execute_string(self) -> Result<QueryResponse<String>, ClientError> {
        self.state.execute().await?.into_text()
    }

    /// Send the request and deserialize the JSON body into `T`.
    pub async fn execute_to<T: DeserializeOwned>(self) -> Result<QueryResponse<T>, ClientError> {
        self.state.execute().await?.into_json()
    }

    /// HTTP method of the operation.
    pub fn method(&self) -> Method {
        self.state.method().clone()
    }
}

fn scoped(name: &str, foreign_table: Option<&str>) -> String {
    match foreign_table {
        Some(table) => format!("{table}.{name}"),
        None => name.to_string(),
    }
}

fn join<I, V, F>(values: I, mut wrap: F) -> String
where
    I: IntoIterator<Item = V>,
    V: Display,
    F: FnMut(String) -> String,
{
    let mut out = String::new();
    for (i, value) in values.into_iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&wrap(value.to_string()));
    }
    out
}
