//! Call the `add_them(a, b)` database function.

use postgrest_client::Client;
use postgrest_client_examples::{init_tracing, rest_url};
use serde_json::json;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let client = Client::builder(rest_url()).build()?;

    let result = client
        .rpc("add_them", "", Some(&json!({"a": 9, "b": 3})))
        .await?;

    println!("{result}");
    Ok(())
}
