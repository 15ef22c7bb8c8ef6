//! PostgREST client for Rust.
//!
//! This crate builds and executes requests against a
//! [PostgREST](https://postgrest.org) API without hand-constructing URLs,
//! query strings or headers.
//!
//! ## Features
//!
//! - Fluent query builder: `select`, `insert`, `upsert`, `update`, `delete`
//! - The PostgREST filter vocabulary (`eq`, `in`, `cs`, full-text search,
//!   `or`/`and` groups, ...) plus ordering and pagination
//! - Row counts from `Content-Range`
//! - Database function calls (`rpc`)
//! - Two engines behind one [`Engine`] trait: a standard `reqwest` client and
//!   a pooled `hyper` client with a per-host connection cap
//!
//! ## Example
//!
//! ```ignore
//! use postgrest_client::{Client, OrderOptions};
//!
//! let client = Client::builder("http://localhost:3000")
//!     .header("apikey", "secret")
//!     .build()?;
//!
//! let response = client
//!     .from("actor")
//!     .select("actor_id,first_name", "exact", false)
//!     .ilike("last_name", "d%")
//!     .order("first_name", OrderOptions::ascending())
//!     .limit(10)
//!     .execute_to::<Vec<Actor>>()
//!     .await?;
//!
//! println!("showing {} of {:?}", response.len(), response.count());
//! ```
//!
//! ## Pooled Engine
//!
//! ```ignore
//! use postgrest_client::Client;
//!
//! let client = Client::new_fast("http://localhost:3000", "public", &[]);
//! client.set_fast_http_max_conns(100);
//! ```
//!
//! ## Error Handling
//!
//! Query execution returns `Result<_, ClientError>`. [`Client::ping`] and
//! [`Client::rpc`] additionally record failures in a last-error slot read with
//! [`Client::client_error`]; a client constructed with [`Client::new`] from a
//! bad URL reports its construction error there.
//!
//! ```ignore
//! let client = Client::new("not a url", "", &[]);
//! assert!(client.client_error().is_some());
//! assert!(!client.ping().await);
//! ```

mod builder;
mod client;
pub mod engine;
mod error;
mod error_parser;
mod filter;
pub mod headers;
mod query;
pub mod request;
pub mod response;
pub mod transport;

pub use builder::ClientBuilder;
pub use client::{Client, PING_TIMEOUT};
pub use error::{ClientError, PostgrestError};

// Re-export the query surface
pub use filter::{FilterBuilder, Nulls, OrderOptions, TextSearchKind};
pub use query::{Count, InsertOptions, QueryBuilder, Returning, UpsertOptions};

// Re-export engine types at the top level for convenience
pub use engine::{Engine, EngineKind, FnEngine, PooledEngine, PooledEngineBuilder, StandardEngine};

pub use headers::HeaderSet;
pub use request::ApiRequest;
pub use response::QueryResponse;
pub use transport::Transport;

pub use bytes::Bytes;
