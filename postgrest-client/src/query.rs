//! Query construction.
//!
//! [`QueryBuilder`] is returned by [`Client::from`](crate::Client::from) and
//! picks the operation (`select`, `insert`, `upsert`, `update`, `delete`).
//! Each operation yields a [`FilterBuilder`] that narrows and executes it.
//!
//! Builders are consumed by every call, so a query cannot be shared between
//! threads while it is being configured or executed twice by accident.

use std::collections::BTreeMap;

use bytes::Bytes;
use http::{HeaderMap, Method};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::client::Client;
use crate::filter::FilterBuilder;
use crate::headers::{parse_name, parse_value};
use crate::request::ApiRequest;
use crate::response::{QueryResponse, from_http};
use crate::ClientError;

const PREFER_HEADER: &str = "prefer";

/// Row counting strategy requested through `Prefer: count=...`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Count {
    /// `COUNT(*)` over the whole result.
    Exact,
    /// The planner's estimate.
    Planned,
    /// Exact for small results, planned above the server's threshold.
    Estimated,
}

impl Count {
    /// Parse a count preference. Anything but `exact`, `planned` or
    /// `estimated` yields `None`.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "exact" => Some(Count::Exact),
            "planned" => Some(Count::Planned),
            "estimated" => Some(Count::Estimated),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Count::Exact => "exact",
            Count::Planned => "planned",
            Count::Estimated => "estimated",
        }
    }
}

/// What a write returns, sent as `Prefer: return=...`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Returning {
    /// The affected rows.
    #[default]
    Representation,
    /// Nothing.
    Minimal,
    /// Only the `Location` header.
    HeadersOnly,
}

impl Returning {
    pub fn as_str(&self) -> &'static str {
        match self {
            Returning::Representation => "representation",
            Returning::Minimal => "minimal",
            Returning::HeadersOnly => "headers-only",
        }
    }
}

/// Options for [`QueryBuilder::insert`].
#[derive(Debug, Clone, Default)]
pub struct InsertOptions {
    returning: Returning,
    count: Option<Count>,
    columns: Option<String>,
    missing_as_default: bool,
}

impl InsertOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set what the insert returns.
    pub fn returning(mut self, returning: Returning) -> Self {
        self.returning = returning;
        self
    }

    /// Request a count of the inserted rows.
    pub fn count(mut self, count: Count) -> Self {
        self.count = Some(count);
        self
    }

    /// Restrict the payload keys PostgREST reads (`?columns=`).
    pub fn columns(mut self, columns: impl Into<String>) -> Self {
        self.columns = Some(columns.into());
        self
    }

    /// Fill keys missing from a row with the column default instead of
    /// `NULL` (`Prefer: missing=default`).
    pub fn missing_as_default(mut self, enabled: bool) -> Self {
        self.missing_as_default = enabled;
        self
    }
}

/// Options for [`QueryBuilder::upsert`].
#[derive(Debug, Clone, Default)]
pub struct UpsertOptions {
    returning: Returning,
    count: Option<Count>,
    on_conflict: Option<String>,
    ignore_duplicates: bool,
    missing_as_default: bool,
}

impl UpsertOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn returning(mut self, returning: Returning) -> Self {
        self.returning = returning;
        self
    }

    pub fn count(mut self, count: Count) -> Self {
        self.count = Some(count);
        self
    }

    /// Comma-separated columns of the unique constraint to resolve on.
    pub fn on_conflict(mut self, columns: impl Into<String>) -> Self {
        self.on_conflict = Some(columns.into());
        self
    }

    /// Keep existing rows instead of merging into them.
    pub fn ignore_duplicates(mut self, enabled: bool) -> Self {
        self.ignore_duplicates = enabled;
        self
    }

    pub fn missing_as_default(mut self, enabled: bool) -> Self {
        self.missing_as_default = enabled;
        self
    }
}

/// Accumulated state of a query, shared by [`QueryBuilder`] and
/// [`FilterBuilder`].
#[derive(Debug, Clone)]
pub(crate) struct QueryState {
    client: Client,
    method: Method,
    path: Vec<String>,
    headers: HeaderMap,
    /// `Prefer` tokens keyed by the part before `=`.
    prefer: Vec<(String, String)>,
    /// Query parameters keyed by (parameter name, operator).
    params: BTreeMap<(String, String), String>,
    body: Option<Bytes>,
    /// First error hit while configuring; reported on execution.
    error: Option<ClientError>,
}

impl QueryState {
    pub(crate) fn new(client: Client, method: Method, path: Vec<String>) -> Self {
        Self {
            client,
            method,
            path,
            headers: HeaderMap::new(),
            prefer: Vec::new(),
            params: BTreeMap::new(),
            body: None,
            error: None,
        }
    }

    pub(crate) fn method(&self) -> &Method {
        &self.method
    }

    pub(crate) fn set_method(&mut self, method: Method) {
        self.method = method;
    }

    /// Set a query parameter, replacing any value with the same key.
    pub(crate) fn set_param(&mut self, name: impl Into<String>, operator: impl Into<String>, value: String) {
        self.params.insert((name.into(), operator.into()), value);
    }

    pub(crate) fn param(&self, name: &str, operator: &str) -> Option<&str> {
        self.params
            .get(&(name.to_string(), operator.to_string()))
            .map(String::as_str)
    }

    /// Set a request-level header, replacing previous values. `Prefer` is
    /// split into tokens and merged with the ones the builder adds.
    pub(crate) fn set_header(&mut self, name: &str, value: &str) {
        if name.trim().eq_ignore_ascii_case(PREFER_HEADER) {
            value
                .split(',')
                .map(str::trim)
                .filter(|token| !token.is_empty())
                .for_each(|token| self.prefer(token));
            return;
        }
        let parsed = parse_name(name).and_then(|n| parse_value(name, value).map(|v| (n, v)));
        match parsed {
            Ok((name, value)) => {
                self.headers.insert(name, value);
            }
            Err(err) => self.fail(err),
        }
    }

    /// Add a `Prefer` token such as `count=exact`, replacing a previous token
    /// with the same key.
    pub(crate) fn prefer(&mut self, token: impl Into<String>) {
        let token = token.into();
        let key = token.split_once('=').map_or(token.as_str(), |(k, _)| k).to_string();
        match self.prefer.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = token,
            None => self.prefer.push((key, token)),
        }
    }

    pub(crate) fn prefer_count(&mut self, count: &str) {
        if let Some(count) = Count::parse(count) {
            self.prefer(format!("count={}", count.as_str()));
        }
    }

    pub(crate) fn set_json_body<T: Serialize + ?Sized>(&mut self, value: &T) {
        match serde_json::to_vec(value) {
            Ok(body) => self.body = Some(Bytes::from(body)),
            Err(e) => self.fail(ClientError::Encode(format!("failed to encode request body: {e}"))),
        }
    }

    pub(crate) fn fail(&mut self, err: ClientError) {
        if self.error.is_none() {
            self.error = Some(err);
        }
    }

    /// Serialize into a request relative to the client's base URL.
    pub(crate) fn to_request(&self) -> Result<ApiRequest, ClientError> {
        if let Some(err) = &self.error {
            return Err(err.clone());
        }
        if self.path.iter().any(String::is_empty) {
            return Err(ClientError::Protocol("table name must not be empty".to_string()));
        }

        let mut headers = self.headers.clone();
        if !self.prefer.is_empty() {
            let tokens: Vec<&str> = self.prefer.iter().map(|(_, t)| t.as_str()).collect();
            headers.insert(PREFER_HEADER, parse_value(PREFER_HEADER, &tokens.join(","))?);
        }

        let query = self
            .params
            .iter()
            .map(|((name, _), value)| (name.clone(), value.clone()))
            .collect();

        let mut request = ApiRequest::new(self.method.clone(), self.path.clone())
            .with_query(query)
            .with_headers(headers);
        if let Some(body) = &self.body {
            request = request.with_body(body.clone());
        }
        Ok(request)
    }

    pub(crate) async fn execute(self) -> Result<QueryResponse<Bytes>, ClientError> {
        let request = self.to_request()?;
        let transport = self.client.transport()?;
        let response = transport.round_trip(request).await?;
        from_http(response)
    }
}

/// Entry point for a query against one table or view.
///
/// # Example
///
/// ```ignore
/// let actors = client
///     .from("actor")
///     .select("actor_id,first_name", "", false)
///     .eq("last_name", "DAVIS")
///     .execute_string()
///     .await?;
/// ```
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    state: QueryState,
}

impl QueryBuilder {
    pub(crate) fn new(client: Client, table: &str) -> Self {
        Self {
            state: QueryState::new(client, Method::GET, vec![table.to_string()]),
        }
    }

    /// Read rows.
    ///
    /// `columns` is a PostgREST select list, including embedded resources and
    /// casts (`id,author:users(name),price::text`). Whitespace outside double
    /// quotes is removed; an empty list selects `*`. `count` is `exact`,
    /// `planned` or `estimated`; other values request no count. With `head`
    /// set, a `HEAD` request is sent and only the count comes back.
    pub fn select(mut self, columns: &str, count: &str, head: bool) -> FilterBuilder {
        let method = if head { Method::HEAD } else { Method::GET };
        self.state.set_method(method);
        self.state.set_param("select", "", clean_columns(columns));
        self.state.prefer_count(count);
        FilterBuilder::new(self.state)
    }

    /// Insert one row or an array of rows.
    pub fn insert<T>(mut self, value: &T, options: InsertOptions) -> FilterBuilder
    where
        T: Serialize + ?Sized,
    {
        self.state.set_method(Method::POST);
        self.state.set_json_body(value);
        self.state
            .prefer(format!("return={}", options.returning.as_str()));
        if let Some(count) = options.count {
            self.state.prefer(format!("count={}", count.as_str()));
        }
        if options.missing_as_default {
            self.state.prefer("missing=default");
        }
        if let Some(columns) = options.columns {
            self.state.set_param("columns", "", clean_columns(&columns));
        }
        FilterBuilder::new(self.state)
    }

    /// Insert rows, resolving unique-key conflicts.
    ///
    /// Conflicting rows are merged unless `ignore_duplicates` is set.
    pub fn upsert<T>(mut self, value: &T, options: UpsertOptions) -> FilterBuilder
    where
        T: Serialize + ?Sized,
    {
        self.state.set_method(Method::POST);
        self.state.set_json_body(value);
        let resolution = if options.ignore_duplicates {
            "resolution=ignore-duplicates"
        } else {
            "resolution=merge-duplicates"
        };
        self.state.prefer(resolution);
        self.state
            .prefer(format!("return={}", options.returning.as_str()));
        if let Some(count) = options.count {
            self.state.prefer(format!("count={}", count.as_str()));
        }
        if options.missing_as_default {
            self.state.prefer("missing=default");
        }
        if let Some(columns) = options.on_conflict {
            self.state.set_param("on_conflict", "", clean_columns(&columns));
        }
        FilterBuilder::new(self.state)
    }

    /// Update the rows matched by the filters that follow.
    pub fn update<T>(mut self, value: &T, returning: Returning, count: &str) -> FilterBuilder
    where
        T: Serialize + ?Sized,
    {
        self.state.set_method(Method::PATCH);
        self.state.set_json_body(value);
        self.state.prefer(format!("return={}", returning.as_str()));
        self.state.prefer_count(count);
        FilterBuilder::new(self.state)
    }

    /// Delete the rows matched by the filters that follow.
    pub fn delete(mut self, returning: Returning, count: &str) -> FilterBuilder {
        self.state.set_method(Method::DELETE);
        self.state.prefer(format!("return={}", returning.as_str()));
        self.state.prefer_count(count);
        FilterBuilder::new(self.state)
    }

    /// Set a request-level header that overrides the client default.
    ///
    /// `Prefer` tokens are merged with the builder's own, later tokens with
    /// the same key winning.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.state.set_header(name, value);
        self
    }

    /// The request a plain `GET` of the table would send.
    pub fn to_request(&self) -> Result<ApiRequest, ClientError> {
        self.state.to_request()
    }

    /// `GET` the table with no parameters.
    pub async fn execute(self) -> Result<QueryResponse<Bytes>, ClientError> {
        self.state.execute().await
    }

    /// `GET` the table and return the body as text.
    pub async fn execute_string(self) -> Result<QueryResponse<String>, ClientError> {
        self.state.execute().await?.into_text()
    }

    /// `GET` the table and deserialize the JSON body.
    pub async fn execute_to<T: DeserializeOwned>(self) -> Result<QueryResponse<T>, ClientError> {
        self.state.execute().await?.into_json()
    }
}

/// Strip whitespace outside double-quoted identifiers.
pub(crate) fn clean_columns(columns: &str) -> String {
    let mut quoted = false;
    let cleaned: String = columns
        .chars()
        .filter(|c| {
            if *c == '"' {
                quoted = !quoted;
            }
            quoted || !c.is_whitespace()
        })
        .collect();
    if cleaned.is_empty() {
        "*".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> Client {
        Client::new("http://localhost:3000", "", &[])
    }

    fn prefer(request: &ApiRequest) -> Option<&str> {
        request
            .headers()
            .get(PREFER_HEADER)
            .and_then(|v| v.to_str().ok())
    }

    #[test]
    fn test_caller_prefer_header_is_merged() {
        let request = client()
            .from("actor")
            .header("Prefer", "tx=rollback")
            .delete(Returning::Minimal, "exact")
            .to_request()
            .unwrap();
        assert_eq!(
            prefer(&request),
            Some("tx=rollback,return=minimal,count=exact")
        );
        assert_eq!(request.headers().get_all(PREFER_HEADER).iter().count(), 1);

        let request = client()
            .from("actor")
            .select("*", "exact", false)
            .header("prefer", "count=planned, tx=commit")
            .to_request()
            .unwrap();
        assert_eq!(prefer(&request), Some("count=planned,tx=commit"));
    }

    #[test]
    fn test_clean_columns() {
        assert_eq!(clean_columns(" id, name "), "id,name");
        assert_eq!(clean_columns("\"full name\", id"), "\"full name\",id");
        assert_eq!(clean_columns(""), "*");
        assert_eq!(clean_columns("author:users ( name )"), "author:users(name)");
    }

    #[test]
    fn test_count_parse() {
        assert_eq!(Count::parse("exact"), Some(Count::Exact));
        assert_eq!(Count::parse("planned"), Some(Count::Planned));
        assert_eq!(Count::parse("estimated"), Some(Count::Estimated));
        assert_eq!(Count::parse("bogus"), None);
        assert_eq!(Count::parse(""), None);
    }

    #[test]
    fn test_from_without_filters_has_no_query() {
        let request = client().from("actor").to_request().unwrap();
        assert_eq!(request.method(), Method::GET);
        assert_eq!(request.path(), ["actor".to_string()]);
        assert_eq!(request.query_string(), None);
        assert!(request.headers().is_empty());
    }

    #[test]
    fn test_empty_table_fails_on_execution() {
        let err = client().from("").to_request().unwrap_err();
        assert!(matches!(err, ClientError::Protocol(_)));
    }

    #[test]
    fn test_select_with_count() {
        let request = client()
            .from("actor")
            .select("actor_id, first_name", "exact", false)
            .to_request()
            .unwrap();
        assert_eq!(request.query_value("select"), Some("actor_id,first_name"));
        assert_eq!(prefer(&request), Some("count=exact"));
    }

    #[test]
    fn test_select_ignores_unknown_count() {
        let request = client()
            .from("actor")
            .select("*", "bogus", false)
            .to_request()
            .unwrap();
        assert_eq!(prefer(&request), None);
    }

    #[test]
    fn test_select_head() {
        let request = client()
            .from("actor")
            .select("", "planned", true)
            .to_request()
            .unwrap();
        assert_eq!(request.method(), Method::HEAD);
        assert_eq!(request.query_value("select"), Some("*"));
    }

    #[test]
    fn test_insert() {
        let rows = serde_json::json!([{"first_name": "PENELOPE"}]);
        let request = client()
            .from("actor")
            .insert(
                &rows,
                InsertOptions::new()
                    .returning(Returning::Minimal)
                    .count(Count::Exact)
                    .columns("first_name"),
            )
            .to_request()
            .unwrap();
        assert_eq!(request.method(), Method::POST);
        assert_eq!(prefer(&request), Some("return=minimal,count=exact"));
        assert_eq!(request.query_value("columns"), Some("first_name"));
        assert_eq!(
            request.body().unwrap().as_ref(),
            br#"[{"first_name":"PENELOPE"}]"#
        );
    }

    #[test]
    fn test_upsert() {
        let row = serde_json::json!({"id": 1});
        let request = client()
            .from("actor")
            .upsert(&row, UpsertOptions::new().on_conflict("id").ignore_duplicates(true))
            .to_request()
            .unwrap();
        assert_eq!(
            prefer(&request),
            Some("resolution=ignore-duplicates,return=representation")
        );
        assert_eq!(request.query_value("on_conflict"), Some("id"));
    }

    #[test]
    fn test_update_and_delete_methods() {
        let update = client()
            .from("actor")
            .update(&serde_json::json!({"last_name": "X"}), Returning::Representation, "")
            .to_request()
            .unwrap();
        assert_eq!(update.method(), Method::PATCH);
        assert_eq!(prefer(&update), Some("return=representation"));

        let delete = client()
            .from("actor")
            .delete(Returning::Minimal, "estimated")
            .to_request()
            .unwrap();
        assert_eq!(delete.method(), Method::DELETE);
        assert_eq!(delete.body(), None);
        assert_eq!(prefer(&delete), Some("return=minimal,count=estimated"));
    }

    #[test]
    fn test_prefer_replaces_same_key() {
        let mut state = QueryState::new(client(), Method::GET, vec!["t".into()]);
        state.prefer("count=exact");
        state.prefer("return=minimal");
        state.prefer("count=planned");
        let request = state.to_request().unwrap();
        assert_eq!(prefer(&request), Some("count=planned,return=minimal"));
    }

    #[test]
    fn test_invalid_header_is_deferred() {
        let err = client()
            .from("actor")
            .header("x-bad", "line\nbreak")
            .to_request()
            .unwrap_err();
        assert!(matches!(err, ClientError::InvalidHeader(_)));
    }

    #[test]
    fn test_encode_error_is_serialization() {
        use std::collections::HashMap;

        // JSON object keys must be strings
        let mut bad = HashMap::new();
        bad.insert((1, 2), "value");
        let err = client()
            .from("actor")
            .insert(&bad, InsertOptions::new())
            .to_request()
            .unwrap_err();
        assert!(matches!(err, ClientError::Encode(_)));
        assert!(err.is_serialization());
    }
}
