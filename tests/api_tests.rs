use axum::http::StatusCode;
use axum_test::TestServer;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use bifl_api::api::{create_router, AppState};
use bifl_api::db::{InMemoryCatalog, MemorySessionStore};
use bifl_api::models::{CatalogItem, RatedInteraction};
use bifl_api::services::UnconfiguredProvider;

struct Fixture {
    server: TestServer,
    category: Uuid,
    user: Uuid,
    favorite: CatalogItem,
    products: Vec<CatalogItem>,
}

fn product(name: &str, category_id: Uuid, overall: f64, durability: f64) -> CatalogItem {
    CatalogItem {
        id: Uuid::new_v4(),
        name: name.to_string(),
        category_id,
        brand_id: Uuid::new_v4(),
        overall_score: overall,
        durability_score: Some(durability),
        repairability_score: Some(overall - 1.0),
        warranty_score: Some(overall - 0.5),
        price: Some(40.0),
    }
}

async fn create_test_server() -> Fixture {
    let catalog = Arc::new(InMemoryCatalog::new());
    let (category, user) = (Uuid::new_v4(), Uuid::new_v4());

    let favorite = product("Cast Iron Skillet", category, 9.0, 9.5);
    catalog.insert_product(favorite.clone()).await;
    catalog.add_favorite(user, favorite.id).await;
    catalog
        .add_review(
            user,
            favorite.id,
            RatedInteraction {
                durability_rating: Some(5.0),
                repairability_rating: Some(3.0),
                warranty_rating: Some(4.0),
                value_rating: Some(4.0),
                overall_rating: Some(5.0),
            },
        )
        .await;

    let products = vec![
        product("Carbon Steel Pan", category, 8.4, 9.0),
        product("Stainless Stockpot", category, 8.1, 8.0),
        product("Enameled Dutch Oven", category, 7.9, 8.5),
        product("Merino Hiking Socks", Uuid::new_v4(), 8.8, 7.0),
    ];
    for p in &products {
        catalog.insert_product(p.clone()).await;
    }

    let state = AppState::from_backends(
        catalog,
        Arc::new(MemorySessionStore::new()),
        Arc::new(UnconfiguredProvider),
        Duration::from_secs(1),
    );
    let server = TestServer::new(create_router(state)).unwrap();

    Fixture {
        server,
        category,
        user,
        favorite,
        products,
    }
}

async fn open_session(server: &TestServer, key: &str) -> Value {
    let response = server
        .post("/api/v1/sessions")
        .json(&json!({ "session_key": key }))
        .await;
    response.assert_status(StatusCode::CREATED);
    response.json()
}

async fn session(server: &TestServer, key: &str) -> Value {
    let response = server.get(&format!("/api/v1/sessions/{}", key)).await;
    response.assert_status_ok();
    response.json()
}

#[tokio::test]
async fn test_health_check() {
    let fx = create_test_server().await;
    let response = fx.server.get("/health").await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_request_id_is_echoed() {
    let fx = create_test_server().await;
    let id = Uuid::new_v4().to_string();
    let response = fx
        .server
        .get("/health")
        .add_header("x-request-id".parse::<axum::http::HeaderName>().unwrap(), id.parse::<axum::http::HeaderValue>().unwrap())
        .await;
    assert_eq!(response.header("x-request-id").to_str().unwrap(), id);
}

#[tokio::test]
async fn test_cors_headers_are_applied() {
    let fx = create_test_server().await;
    let response = fx
        .server
        .get("/health")
        .add_header("origin".parse::<axum::http::HeaderName>().unwrap(), "https://shop.example".parse::<axum::http::HeaderValue>().unwrap())
        .await;
    response.assert_status_ok();
    assert_eq!(response.header("access-control-allow-origin").to_str().unwrap(), "*");
    assert!(!response.header("x-request-id").to_str().unwrap().is_empty());
}

#[tokio::test]
async fn test_unknown_session_is_not_found_and_not_opened() {
    let fx = create_test_server().await;
    fx.server
        .get("/api/v1/sessions/ghost")
        .await
        .assert_status(StatusCode::NOT_FOUND);
    // Still unknown: the read did not make it resident
    fx.server
        .post("/api/v1/sessions/ghost/flush")
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_ended_session_is_readable_without_reopening() {
    let fx = create_test_server().await;
    open_session(&fx.server, "archived").await;
    fx.server
        .post("/api/v1/sessions/archived/searches")
        .json(&json!({ "query": "Dutch oven" }))
        .await
        .assert_status(StatusCode::NO_CONTENT);
    fx.server
        .delete("/api/v1/sessions/archived")
        .await
        .assert_status(StatusCode::NO_CONTENT);

    let body = session(&fx.server, "archived").await;
    assert_eq!(body["resident"], false);
    assert_eq!(body["snapshot"]["searches"][0]["query"], "dutch oven");
    // Reading left it closed
    fx.server
        .delete("/api/v1/sessions/archived")
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_open_session_generates_key() {
    let fx = create_test_server().await;
    let response = fx.server.post("/api/v1/sessions").await;
    response.assert_status(StatusCode::CREATED);
    let body: Value = response.json();
    assert!(!body["session_key"].as_str().unwrap().is_empty());
    assert!(body["session_id"].is_string());
}

#[tokio::test]
async fn test_reopening_resident_session_keeps_it() {
    let fx = create_test_server().await;
    let first = open_session(&fx.server, "s-1").await;
    let second = open_session(&fx.server, "s-1").await;
    assert_eq!(first["session_id"], second["session_id"]);
}

#[tokio::test]
async fn test_view_lifecycle() {
    let fx = create_test_server().await;
    open_session(&fx.server, "views").await;
    let (a, b) = (fx.products[0].id, fx.products[1].id);

    fx.server
        .post("/api/v1/sessions/views/views")
        .json(&json!({ "product_id": a, "source": "search" }))
        .await
        .assert_status(StatusCode::NO_CONTENT);
    fx.server
        .post("/api/v1/sessions/views/scroll")
        .json(&json!({ "depth": 60 }))
        .await
        .assert_status(StatusCode::NO_CONTENT);
    fx.server
        .post("/api/v1/sessions/views/views")
        .json(&json!({ "product_id": b }))
        .await
        .assert_status(StatusCode::NO_CONTENT);

    let body = session(&fx.server, "views").await;
    let views = body["snapshot"]["product_views"].as_array().unwrap();
    assert_eq!(views.len(), 1);
    assert_eq!(views[0]["product_id"], json!(a));
    assert_eq!(views[0]["source"], "search");
    assert_eq!(views[0]["scroll_depth_percent"], 60);
    assert_eq!(body["open_view"], json!(b));
}

#[tokio::test]
async fn test_search_click_is_attributed() {
    let fx = create_test_server().await;
    open_session(&fx.server, "search").await;

    fx.server
        .post("/api/v1/sessions/search/searches")
        .json(&json!({ "query": "  Cast IRON ", "results_shown": 5 }))
        .await
        .assert_status(StatusCode::NO_CONTENT);

    let response = fx
        .server
        .post("/api/v1/sessions/search/searches/clicks")
        .json(&json!({ "product_id": fx.favorite.id }))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["attributed"], true);

    let snapshot = session(&fx.server, "search").await["snapshot"].clone();
    assert_eq!(snapshot["searches"][0]["query"], "cast iron");
    assert_eq!(snapshot["searches"][0]["clicked_results"][0], json!(fx.favorite.id));
}

#[tokio::test]
async fn test_empty_search_is_rejected() {
    let fx = create_test_server().await;
    let response = fx
        .server
        .post("/api/v1/sessions/any/searches")
        .json(&json!({ "query": "   " }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_comparison_validation_and_end() {
    let fx = create_test_server().await;
    open_session(&fx.server, "cmp").await;

    let response = fx
        .server
        .post("/api/v1/sessions/cmp/comparisons")
        .json(&json!({ "product_ids": [fx.products[0].id] }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert!(body["error"].as_str().unwrap().contains("between 2 and 5"));

    let ids = json!([fx.products[0].id, fx.products[1].id]);
    fx.server
        .post("/api/v1/sessions/cmp/comparisons")
        .json(&json!({ "product_ids": ids }))
        .await
        .assert_status(StatusCode::NO_CONTENT);

    let response = fx
        .server
        .post("/api/v1/sessions/cmp/comparisons/end")
        .json(&json!({ "product_ids": ids }))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert!(body["duration_seconds"].as_f64().unwrap() >= 0.0);

    // Already closed
    fx.server
        .post("/api/v1/sessions/cmp/comparisons/end")
        .json(&json!({ "product_ids": ids }))
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_favorites_and_custom_interactions() {
    let fx = create_test_server().await;
    open_session(&fx.server, "fav").await;
    let id = fx.products[2].id;

    fx.server
        .post("/api/v1/sessions/fav/favorites")
        .json(&json!({ "product_id": id, "action": "add" }))
        .await
        .assert_status(StatusCode::NO_CONTENT);
    fx.server
        .post("/api/v1/sessions/fav/interactions")
        .json(&json!({ "type": "share", "target": id.to_string(), "metadata": { "channel": "email" } }))
        .await
        .assert_status(StatusCode::NO_CONTENT);

    let snapshot = session(&fx.server, "fav").await["snapshot"].clone();
    assert_eq!(snapshot["favorites"], json!([id]));
    let interactions = snapshot["interactions"].as_array().unwrap();
    assert_eq!(interactions.len(), 2);
    assert_eq!(interactions[1]["metadata"]["channel"], "email");

    fx.server
        .post("/api/v1/sessions/fav/favorites")
        .json(&json!({ "product_id": id, "action": "remove" }))
        .await
        .assert_status(StatusCode::NO_CONTENT);
    let snapshot = session(&fx.server, "fav").await["snapshot"].clone();
    assert_eq!(snapshot["favorites"], json!([]));
}

#[tokio::test]
async fn test_suspend_and_resume_reopen_view() {
    let fx = create_test_server().await;
    open_session(&fx.server, "bg").await;
    let id = fx.products[0].id;

    fx.server
        .post("/api/v1/sessions/bg/views")
        .json(&json!({ "product_id": id, "source": "category" }))
        .await
        .assert_status(StatusCode::NO_CONTENT);
    fx.server
        .post("/api/v1/sessions/bg/suspend")
        .await
        .assert_status(StatusCode::NO_CONTENT);

    let body = session(&fx.server, "bg").await;
    assert!(body["open_view"].is_null());
    assert_eq!(body["snapshot"]["product_views"].as_array().unwrap().len(), 1);

    fx.server
        .post("/api/v1/sessions/bg/resume")
        .await
        .assert_status(StatusCode::NO_CONTENT);
    let body = session(&fx.server, "bg").await;
    assert_eq!(body["open_view"], json!(id));
}

#[tokio::test]
async fn test_ended_session_resumes_from_store() {
    let fx = create_test_server().await;
    let opened = open_session(&fx.server, "persist").await;
    let id = fx.products[1].id;

    fx.server
        .post("/api/v1/sessions/persist/favorites")
        .json(&json!({ "product_id": id, "action": "add" }))
        .await
        .assert_status(StatusCode::NO_CONTENT);
    fx.server
        .delete("/api/v1/sessions/persist")
        .await
        .assert_status(StatusCode::NO_CONTENT);
    fx.server
        .delete("/api/v1/sessions/persist")
        .await
        .assert_status(StatusCode::NOT_FOUND);

    let reopened = open_session(&fx.server, "persist").await;
    assert_ne!(reopened["session_id"], opened["session_id"]);
    let snapshot = session(&fx.server, "persist").await["snapshot"].clone();
    assert_eq!(snapshot["favorites"], json!([id]));
}

#[tokio::test]
async fn test_clear_behavior() {
    let fx = create_test_server().await;
    open_session(&fx.server, "clear").await;

    fx.server
        .post("/api/v1/sessions/clear/searches")
        .json(&json!({ "query": "socks" }))
        .await
        .assert_status(StatusCode::NO_CONTENT);
    fx.server
        .delete("/api/v1/sessions/clear/behavior")
        .await
        .assert_status(StatusCode::NO_CONTENT);

    let snapshot = session(&fx.server, "clear").await["snapshot"].clone();
    assert_eq!(snapshot["searches"], json!([]));
    assert_eq!(snapshot["interactions"], json!([]));
}

#[tokio::test]
async fn test_preference_weights_endpoint() {
    let fx = create_test_server().await;

    let response = fx
        .server
        .get(&format!("/api/v1/users/{}/preferences", fx.user))
        .await;
    response.assert_status_ok();
    let weights: Value = response.json();
    assert_eq!(weights["durability"], 1.0);
    assert_eq!(weights["repairability"], 0.5);
    assert_eq!(weights["overall_preference"], 1.0);

    let response = fx
        .server
        .get(&format!("/api/v1/users/{}/preferences", Uuid::new_v4()))
        .await;
    let neutral: Value = response.json();
    assert_eq!(neutral["durability"], 1.0);
    assert_eq!(neutral["value"], 1.0);
}

#[tokio::test]
async fn test_cold_start_recommendations_are_top_rated() {
    let fx = create_test_server().await;

    let response = fx
        .server
        .get(&format!("/api/v1/users/{}/recommendations", Uuid::new_v4()))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();

    assert_eq!(body["mode"], "trending");
    assert_eq!(body["personalized"], false);
    let names: Vec<&str> = body["recommendations"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["name"].as_str().unwrap())
        .collect();
    assert_eq!(
        names,
        vec![
            "Cast Iron Skillet",
            "Merino Hiking Socks",
            "Carbon Steel Pan",
            "Stainless Stockpot",
            "Enameled Dutch Oven"
        ]
    );
}

#[tokio::test]
async fn test_personalized_recommendations_fall_back_to_heuristic() {
    let fx = create_test_server().await;

    let response = fx
        .server
        .get(&format!("/api/v1/users/{}/recommendations", fx.user))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();

    assert_eq!(body["personalized"], true);
    assert!(body["note"].as_str().is_some());
    let recommendations = body["recommendations"].as_array().unwrap();
    assert_eq!(recommendations.len(), 3);
    for r in recommendations {
        assert_eq!(r["category_id"], json!(fx.category));
        assert_ne!(r["id"], json!(fx.favorite.id));
        assert!(r["personalized_score"].as_f64().unwrap() > 0.0);
    }
}

#[tokio::test]
async fn test_session_behavior_excludes_seen_products() {
    let fx = create_test_server().await;
    open_session(&fx.server, "seen").await;
    let seen = fx.products[0].id;

    fx.server
        .post("/api/v1/sessions/seen/views")
        .json(&json!({ "product_id": seen }))
        .await
        .assert_status(StatusCode::NO_CONTENT);
    // Moving on closes the first view
    fx.server
        .post("/api/v1/sessions/seen/views")
        .json(&json!({ "product_id": fx.products[3].id }))
        .await
        .assert_status(StatusCode::NO_CONTENT);

    let response = fx
        .server
        .post("/api/v1/recommendations")
        .json(&json!({ "user_id": fx.user, "session_key": "seen" }))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    let ids: Vec<Value> = body["recommendations"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["id"].clone())
        .collect();
    assert!(!ids.contains(&json!(seen)));
    assert_eq!(ids.len(), 2);
}

#[tokio::test]
async fn test_inline_behavior_data_is_snake_case() {
    let fx = create_test_server().await;
    let seen = fx.products[1].id;

    let response = fx
        .server
        .post("/api/v1/recommendations")
        .json(&json!({
            "user_id": fx.user,
            "behavior_data": {
                "session_id": Uuid::new_v4(),
                "favorites": [seen]
            }
        }))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    let recommendations = body["recommendations"].as_array().unwrap();
    assert!(!recommendations.is_empty());
    for r in recommendations {
        assert_ne!(r["id"], json!(seen));
        assert!(r["overall_score"].is_number());
        assert!(r["personalized_score"].is_number());
        assert!(r.get("personalizedScore").is_none());
    }
}

#[tokio::test]
async fn test_product_based_recommendations() {
    let fx = create_test_server().await;

    let response = fx
        .server
        .post("/api/v1/recommendations")
        .json(&json!({ "reference_product_id": fx.products[0].id }))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["mode"], "product-based");
    let recommendations = body["recommendations"].as_array().unwrap();
    assert_eq!(recommendations.len(), 3);
    assert!(recommendations
        .iter()
        .all(|r| r["id"] != json!(fx.products[0].id) && r["category_id"] == json!(fx.category)));
}

#[tokio::test]
async fn test_unknown_reference_product_is_not_found() {
    let fx = create_test_server().await;

    let response = fx
        .server
        .post("/api/v1/recommendations")
        .json(&json!({ "reference_product_id": Uuid::new_v4() }))
        .await;
    response.assert_status(StatusCode::NOT_FOUND);
    let body: Value = response.json();
    assert!(body["error"].as_str().unwrap().contains("not found"));
}

#[tokio::test]
async fn test_preference_based_recommendations() {
    let fx = create_test_server().await;

    let response = fx
        .server
        .post("/api/v1/recommendations")
        .json(&json!({
            "preferences": {
                "categories": [fx.category],
                "price_range": { "max": 100.0 },
                "use_case": "everyday cooking",
                "priority_features": ["repairable"]
            }
        }))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["mode"], "preference-based");
    assert_eq!(body["personalized"], false);
    assert_eq!(body["recommendations"].as_array().unwrap().len(), 4);
}
