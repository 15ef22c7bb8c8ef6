mod common;

use postgrest_client::{
    Client, ClientError, Count, InsertOptions, OrderOptions, Returning, TextSearchKind,
    UpsertOptions,
};
use serde::Deserialize;
use serde_json::json;

use common::Echo;

fn owned(items: &[(&str, &str)]) -> Vec<(String, String)> {
    items
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

async fn client() -> Client {
    let url = common::serve(common::postgrest_router()).await;
    Client::new(&url, "", &[])
}

#[tokio::test]
async fn test_filters_serialize_sorted() {
    let client = client().await;

    let echo = client
        .from("actor")
        .select("*", "", false)
        .eq("id", 1)
        .eq("id", 2)
        .lte("age", 65)
        .gte("age", 18)
        .in_("last_name", ["DAVIS", "O'Brien, Jr."])
        .order("first_name", OrderOptions::descending().nulls_last())
        .limit(10)
        .execute_to::<Echo>()
        .await
        .unwrap()
        .into_inner();

    assert_eq!(
        echo.query_pairs(),
        owned(&[
            ("age", "gte.18"),
            ("age", "lte.65"),
            ("id", "eq.2"),
            ("last_name", "in.(DAVIS,\"O'Brien, Jr.\")"),
            ("limit", "10"),
            ("order", "first_name.desc.nullslast"),
            ("select", "*"),
        ])
    );
}

#[tokio::test]
async fn test_logical_groups_and_text_search() {
    let client = client().await;

    let echo = client
        .from("films")
        .select("title", "", false)
        .or("rating.eq.PG,rating.eq.G", None)
        .text_search(
            "fulltext",
            "dog & cat",
            TextSearchKind::Plain,
            Some("english"),
        )
        .not("language_id", "eq", 2)
        .execute_to::<Echo>()
        .await
        .unwrap()
        .into_inner();

    assert_eq!(
        echo.query_pairs(),
        owned(&[
            ("fulltext", "plfts(english).dog & cat"),
            ("language_id", "not.eq.2"),
            ("or", "(rating.eq.PG,rating.eq.G)"),
            ("select", "title"),
        ])
    );
}

#[tokio::test]
async fn test_range_and_single_headers() {
    let client = client().await;

    let echo = client
        .from("actor")
        .select("*", "exact", false)
        .range(0, 24)
        .single()
        .execute_to::<Echo>()
        .await
        .unwrap()
        .into_inner();

    assert_eq!(echo.header("range-unit"), Some("items"));
    assert_eq!(echo.header("range"), Some("0-24"));
    assert_eq!(
        echo.header_values("accept"),
        vec!["application/vnd.pgrst.object+json"]
    );
    assert_eq!(echo.header("prefer"), Some("count=exact"));
}

#[tokio::test]
async fn test_write_operations() {
    let client = client().await;
    let row = json!({"first_name": "PENELOPE", "last_name": "GUINESS"});

    let echo = client
        .from("actor")
        .insert(&row, InsertOptions::new().count(Count::Exact))
        .execute_to::<Echo>()
        .await
        .unwrap()
        .into_inner();
    assert_eq!(echo.method, "POST");
    assert_eq!(echo.header("prefer"), Some("return=representation,count=exact"));
    assert_eq!(serde_json::from_str::<serde_json::Value>(&echo.body).unwrap(), row);

    let echo = client
        .from("actor")
        .upsert(&[row.clone()], UpsertOptions::new().on_conflict("actor_id"))
        .execute_to::<Echo>()
        .await
        .unwrap()
        .into_inner();
    assert_eq!(
        echo.header("prefer"),
        Some("resolution=merge-duplicates,return=representation")
    );
    assert_eq!(
        echo.query_pairs(),
        owned(&[("on_conflict", "actor_id")])
    );

    let echo = client
        .from("actor")
        .update(&json!({"last_name": "X"}), Returning::Minimal, "")
        .eq("actor_id", 1)
        .execute_to::<Echo>()
        .await
        .unwrap()
        .into_inner();
    assert_eq!(echo.method, "PATCH");
    assert_eq!(echo.query_pairs(), owned(&[("actor_id", "eq.1")]));

    let echo = client
        .from("actor")
        .delete(Returning::Representation, "planned")
        .eq("actor_id", 1)
        .execute_to::<Echo>()
        .await
        .unwrap()
        .into_inner();
    assert_eq!(echo.method, "DELETE");
    assert_eq!(
        echo.header("prefer"),
        Some("return=representation,count=planned")
    );
}

#[derive(Debug, Deserialize, PartialEq)]
struct Film {
    film_id: i64,
}

#[tokio::test]
async fn test_count_from_content_range() {
    let client = client().await;

    let response = client
        .from("film")
        .select("film_id", "exact", false)
        .execute_to::<Vec<Film>>()
        .await
        .unwrap();

    assert_eq!(response.count(), Some(42));
    assert_eq!(response.status(), 200);
    assert_eq!(
        response.into_inner(),
        vec![Film { film_id: 1 }, Film { film_id: 2 }]
    );
}

#[tokio::test]
async fn test_unknown_count() {
    let client = client().await;

    let response = client.from("unknown_total").execute().await.unwrap();
    assert_eq!(response.count(), None);

    let response = client.from("actor").execute_string().await.unwrap();
    assert_eq!(response.count(), None);
    assert!(response.contains("\"path\":\"/actor\""));
}

#[tokio::test]
async fn test_error_envelope() {
    let client = client().await;

    let err = client
        .from("missing")
        .select("*", "", false)
        .execute()
        .await
        .unwrap_err();

    assert_eq!(err.status(), Some(404));
    let envelope = err.postgrest_error().expect("envelope should parse");
    assert_eq!(envelope.code.as_deref(), Some("42P01"));
    assert!(err.body().is_some_and(|b| b.contains("42P01")));
}

#[tokio::test]
async fn test_error_without_envelope() {
    let client = client().await;

    let err = client.from("gateway").execute().await.unwrap_err();
    assert_eq!(err.status(), Some(502));
    assert!(err.postgrest_error().is_none());
    assert_eq!(err.body(), Some("upstream unavailable"));
}

#[tokio::test]
async fn test_decode_error_is_not_transport() {
    let client = client().await;

    let err = client
        .from("not_json")
        .execute_to::<Vec<Film>>()
        .await
        .unwrap_err();

    assert!(matches!(err, ClientError::Decode(_)));
    assert!(err.is_serialization());
    assert!(!err.is_transport());
}
