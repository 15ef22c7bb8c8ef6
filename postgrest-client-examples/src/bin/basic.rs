//! Select two columns from `actor` through the pooled engine.
//!
//! ```sh
//! RUST_LOG=postgrest_client=debug cargo run --bin basic -- http://localhost:3000
//! ```

use postgrest_client::Client;
use postgrest_client_examples::{init_tracing, rest_url};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let client = Client::new_fast(&rest_url(), "public", &[]);
    if let Some(err) = client.client_error() {
        return Err(err.into());
    }
    client.set_fast_http_max_conns(100);

    let response = client
        .from("actor")
        .select("actor_id,first_name", "exact", false)
        .execute_string()
        .await?;

    if let Some(count) = response.count() {
        eprintln!("{count} actors");
    }
    println!("{}", response.into_inner());
    Ok(())
}
