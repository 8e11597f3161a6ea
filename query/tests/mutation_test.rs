//! Integration tests for optimistic mutations.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use marquee_core::error::NetworkError;
use marquee_core::http::{HttpResponse, Method};
use marquee_query::tag::list_tags;
use marquee_query::{
    Api, CacheKey, Endpoint, OptimisticUpdate, Patch, QueryCache, QueryEnvironment, QueryError, RequestOptions, Tag,
};
use marquee_testing::{MockHttpClient, test_clock};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;

fn api() -> Api {
    Api::new()
        .endpoint(
            Endpoint::query("getEvents", "/events").provides(|result, _| list_tags("EventList", "Event", result)),
        )
        .endpoint(
            Endpoint::query("getEvent", "/events/{id}")
                .provides(|_, args| vec![Tag::entity("Event", &args["id"])])
                .with_retention(Duration::from_secs(1)),
        )
        .endpoint(
            Endpoint::mutation("createEvent", Method::Post, "/events")
                .invalidates(|_, _| vec![Tag::collection("EventList")]),
        )
        .endpoint(
            Endpoint::mutation("updateEvent", Method::Patch, "/events/{id}")
                .invalidates(|_, args| vec![Tag::entity("Event", &args["id"]), Tag::collection("EventList")]),
        )
}

fn cache(http: &MockHttpClient) -> QueryCache {
    QueryCache::new(api(), QueryEnvironment::new(Arc::new(http.clone())).with_clock(Arc::new(test_clock())))
}

fn three_events() -> Value {
    json!([
        { "id": 1, "title": "Fado Night" },
        { "id": 2, "title": "Jazz Brunch" },
        { "id": 3, "title": "Techno Cave" }
    ])
}

fn list_key() -> CacheKey {
    CacheKey::new("getEvents", &json!({}))
}

fn insert(item: Value) -> OptimisticUpdate {
    OptimisticUpdate::new("getEvents", &json!({}), Patch::InsertItem { item })
}

fn ids(data: &Value) -> Vec<i64> {
    data.as_array()
        .unwrap()
        .iter()
        .map(|item| item["id"].as_i64().unwrap())
        .collect()
}

#[tokio::test]
async fn failed_mutation_restores_the_exact_snapshot() {
    let http = MockHttpClient::new();
    http.respond(Method::Get, "/events", HttpResponse::ok(three_events()));
    http.respond(
        Method::Post,
        "/events",
        HttpResponse::with_status(422, json!({ "message": "title taken" })),
    );
    http.hold(Method::Post, "/events");
    let cache = cache(&http);

    let mut list = cache.request("getEvents", &json!({}), RequestOptions::default()).unwrap();
    let before = list.resolve().await.data.unwrap();

    let pending = tokio::spawn(cache.mutate(
        "createEvent",
        &json!({ "title": "Opera" }),
        vec![insert(json!({ "id": 4, "title": "Opera" }))],
    ));

    let patched = cache.peek(&list_key()).unwrap();
    assert!(patched.optimistic);
    assert_eq!(ids(patched.data.as_ref().unwrap()), vec![1, 2, 3, 4]);

    http.release(Method::Post, "/events");
    let result = pending.await.unwrap();

    assert_eq!(
        result,
        Err(QueryError::Remote {
            status: 422,
            message: "title taken".into()
        })
    );
    let restored = cache.peek(&list_key()).unwrap();
    assert!(!restored.optimistic);
    assert!(Arc::ptr_eq(restored.data.as_ref().unwrap(), &before));
    assert_eq!(*restored.data.unwrap(), three_events());
    assert_eq!(cache.pending_mutations(&list_key()), 0);
    // Nothing was invalidated
    assert_eq!(http.call_count(Method::Get, "/events"), 1);
}

#[tokio::test]
async fn confirmed_mutation_invalidates_and_refetches() {
    let http = MockHttpClient::new();
    http.respond_once(Method::Get, "/events", Ok(HttpResponse::ok(three_events())));
    http.respond(
        Method::Get,
        "/events",
        HttpResponse::ok(json!([{ "id": 1 }, { "id": 2 }, { "id": 3 }, { "id": 40 }])),
    );
    http.respond(Method::Post, "/events", HttpResponse::ok(json!({ "id": 40, "title": "Opera" })));
    let cache = cache(&http);

    let mut list = cache.request("getEvents", &json!({}), RequestOptions::default()).unwrap();
    list.resolve().await;

    let created = cache
        .mutate(
            "createEvent",
            &json!({ "title": "Opera" }),
            vec![insert(json!({ "id": "tmp-1", "title": "Opera" }))],
        )
        .await
        .unwrap();
    assert_eq!(created["id"], 40);

    let post = http.calls().into_iter().find(|call| call.method == Method::Post).unwrap();
    assert_eq!(post.body, Some(json!({ "title": "Opera" })));

    let refreshed = list.settled().await;
    assert!(!refreshed.optimistic);
    assert_eq!(ids(refreshed.data.as_ref().unwrap()), vec![1, 2, 3, 40]);
    assert_eq!(http.call_count(Method::Get, "/events"), 2);
}

#[tokio::test]
async fn rollback_keeps_later_mutations() {
    let http = MockHttpClient::new();
    http.respond(Method::Get, "/events", HttpResponse::ok(three_events()));
    http.respond_once(Method::Post, "/events", Err(NetworkError::Connection("reset".into())));
    http.respond_once(Method::Post, "/events", Ok(HttpResponse::ok(json!({ "id": 5 }))));
    http.hold(Method::Post, "/events");
    let cache = cache(&http);

    // Unsubscribed, so the confirmed mutation does not trigger a refetch
    cache.fetch("getEvents", &json!({}), RequestOptions::default()).await.unwrap();

    let first = tokio::spawn(cache.mutate("createEvent", &json!({}), vec![insert(json!({ "id": 4 }))]));
    let second = tokio::spawn(cache.mutate("createEvent", &json!({}), vec![insert(json!({ "id": 5 }))]));
    assert_eq!(ids(&cache.peek(&list_key()).unwrap().data.unwrap()), vec![1, 2, 3, 4, 5]);
    assert_eq!(cache.pending_mutations(&list_key()), 2);

    http.wait_for_calls(3).await;
    http.release(Method::Post, "/events");

    assert!(matches!(first.await.unwrap(), Err(QueryError::Network(_))));
    assert!(second.await.unwrap().is_ok());

    let entry = cache.peek(&list_key()).unwrap();
    assert_eq!(ids(entry.data.as_ref().unwrap()), vec![1, 2, 3, 5]);
    assert!(!entry.optimistic);
    assert_eq!(cache.pending_mutations(&list_key()), 0);
}

#[tokio::test]
async fn older_commit_keeps_newer_pending_patch() {
    let http = MockHttpClient::new();
    http.respond(Method::Get, "/events", HttpResponse::ok(three_events()));
    http.respond(Method::Post, "/events", HttpResponse::ok(json!({ "id": 4 })));
    http.respond(Method::Patch, "/events/2", HttpResponse::with_status(409, json!({ "message": "stale" })));
    http.hold(Method::Post, "/events");
    http.hold(Method::Patch, "/events/2");
    let cache = cache(&http);

    cache.fetch("getEvents", &json!({}), RequestOptions::default()).await.unwrap();

    let create = tokio::spawn(cache.mutate("createEvent", &json!({}), vec![insert(json!({ "id": 4 }))]));
    let rename = OptimisticUpdate::new(
        "getEvents",
        &json!({}),
        Patch::UpdateItem {
            id: json!(2),
            fields: json!({ "title": "Jazz Lunch" }),
        },
    );
    let update = tokio::spawn(cache.mutate("updateEvent", &json!({ "id": 2, "title": "Jazz Lunch" }), vec![rename]));
    http.wait_for_calls(3).await;
    let both = cache.peek(&list_key()).unwrap().data.unwrap();

    http.release(Method::Post, "/events");
    assert_eq!(create.await.unwrap().unwrap(), json!({ "id": 4 }));

    let entry = cache.peek(&list_key()).unwrap();
    assert!(Arc::ptr_eq(entry.data.as_ref().unwrap(), &both));
    assert_eq!(entry.data.as_ref().unwrap()[1]["title"], "Jazz Lunch");
    assert!(entry.optimistic);
    assert!(entry.invalidated);
    assert_eq!(cache.pending_mutations(&list_key()), 1);

    http.release(Method::Patch, "/events/2");
    assert!(update.await.unwrap().is_err());

    let entry = cache.peek(&list_key()).unwrap();
    assert_eq!(ids(entry.data.as_ref().unwrap()), vec![1, 2, 3, 4]);
    assert_eq!(entry.data.as_ref().unwrap()[1]["title"], "Jazz Brunch");
    assert!(!entry.optimistic);
    assert_eq!(http.call_count(Method::Get, "/events"), 1);
}

#[tokio::test]
async fn fetch_landing_mid_mutation_becomes_the_new_base() {
    let http = MockHttpClient::new();
    http.respond_once(Method::Get, "/events", Ok(HttpResponse::ok(three_events())));
    http.respond(
        Method::Get,
        "/events",
        HttpResponse::ok(json!([{ "id": 1 }, { "id": 2 }, { "id": 3 }, { "id": 9 }])),
    );
    http.respond(Method::Post, "/events", HttpResponse::with_status(500, json!({})));
    http.hold(Method::Post, "/events");
    let cache = cache(&http);

    let mut list = cache.request("getEvents", &json!({}), RequestOptions::default()).unwrap();
    list.resolve().await;

    let pending = tokio::spawn(cache.mutate("createEvent", &json!({}), vec![insert(json!({ "id": 4 }))]));

    let mut refetch = cache.request("getEvents", &json!({}), RequestOptions::force_refetch()).unwrap();
    let rebased = refetch.settled().await;
    assert!(rebased.optimistic);
    assert_eq!(ids(rebased.data.as_ref().unwrap()), vec![1, 2, 3, 9, 4]);

    http.release(Method::Post, "/events");
    assert!(pending.await.unwrap().is_err());

    let entry = cache.peek(&list_key()).unwrap();
    assert_eq!(ids(entry.data.as_ref().unwrap()), vec![1, 2, 3, 9]);
    assert!(!entry.optimistic);
}

#[tokio::test]
async fn missing_target_skips_the_patch() {
    let http = MockHttpClient::new();
    http.respond(Method::Patch, "/events/3", HttpResponse::ok(json!({ "id": 3, "title": "Renamed" })));
    let cache = cache(&http);

    let update = OptimisticUpdate::new(
        "getEvent",
        &json!({ "id": 3 }),
        Patch::Merge {
            fields: json!({ "title": "Renamed" }),
        },
    );
    let result = cache
        .mutate("updateEvent", &json!({ "id": 3, "title": "Renamed" }), vec![update])
        .await;

    assert!(result.is_ok());
    assert!(cache.is_empty());
    assert_eq!(http.call_count(Method::Patch, "/events/3"), 1);
}

#[tokio::test]
async fn wrong_endpoint_kind_is_rejected_without_side_effects() {
    let http = MockHttpClient::new();
    let cache = cache(&http);

    let result = cache.mutate("getEvents", &json!({}), Vec::new()).await;

    assert!(matches!(result, Err(QueryError::WrongEndpointKind { .. })));
    assert!(http.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn overridden_entries_outlive_their_retention() {
    let http = MockHttpClient::new();
    http.respond(Method::Get, "/events/3", HttpResponse::ok(json!({ "id": 3, "seats": 10 })));
    http.respond(Method::Patch, "/events/3", HttpResponse::ok(json!({ "id": 3, "seats": 8 })));
    http.hold(Method::Patch, "/events/3");
    let cache = cache(&http);
    let key = CacheKey::new("getEvent", &json!({ "id": 3 }));

    cache.fetch("getEvent", &json!({ "id": 3 }), RequestOptions::default()).await.unwrap();
    let pending = tokio::spawn(cache.mutate(
        "updateEvent",
        &json!({ "id": 3, "seats": 8 }),
        vec![OptimisticUpdate::new(
            "getEvent",
            &json!({ "id": 3 }),
            Patch::Merge {
                fields: json!({ "seats": 8 }),
            },
        )],
    ));

    tokio::time::sleep(Duration::from_secs(5)).await;
    let overridden = cache.peek(&key).unwrap();
    assert!(overridden.optimistic);
    assert_eq!(overridden.data.unwrap()["seats"], 8);

    http.release(Method::Patch, "/events/3");
    pending.await.unwrap().unwrap();

    tokio::time::sleep(Duration::from_secs(2)).await;
    tokio::task::yield_now().await;
    assert!(cache.peek(&key).is_none());
}
