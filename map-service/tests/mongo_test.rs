//! End-to-end checks against a real MongoDB.
//!
//! Run with `cargo test -- --ignored` and `TEST_MONGODB_URI` pointing at a
//! disposable server (defaults to localhost).

use map_service::config::{MapConfig, StoreBackend};
use map_service::services::{ConnectionState, MongoDriver, StoreDriver};
use map_service::startup::Application;
use mongodb::bson::doc;
use serde_json::{json, Value};
use std::time::Duration;

fn test_config() -> MapConfig {
    let mut config = MapConfig::for_local(0);
    config.store.backend = StoreBackend::Mongodb;
    config.mongodb.uri = std::env::var("TEST_MONGODB_URI")
        .unwrap_or_else(|_| "mongodb://localhost:27017".to_string());
    config.mongodb.database = format!("map_test_{}", uuid::Uuid::new_v4().simple());
    config
}

#[tokio::test]
#[ignore = "Requires MongoDB on localhost:27017 (or TEST_MONGODB_URI)"]
async fn driver_creates_collection_on_open() {
    let config = test_config();
    let driver = MongoDriver::new(config.mongodb.clone());

    let store = driver.open().await.expect("MongoDB should be reachable");
    store.ensure_collection().await.unwrap();
    store.ensure_collection().await.unwrap();

    let client = mongodb::Client::with_uri_str(&config.mongodb.uri).await.unwrap();
    let db = client.database(&config.mongodb.database);
    let names = db
        .list_collection_names(doc! { "name": config.mongodb.collection.as_str() })
        .await
        .unwrap();
    assert_eq!(names, vec![config.mongodb.collection.clone()]);

    store.close().await;
    db.drop(None).await.ok();
}

#[tokio::test]
#[ignore = "Requires MongoDB on localhost:27017 (or TEST_MONGODB_URI)"]
async fn full_cycle_against_mongodb() {
    let config = test_config();
    let database = config.mongodb.database.clone();
    let uri = config.mongodb.uri.clone();

    let app = Application::build(config).await.expect("Failed to build app");
    let port = app.port();
    let connector = app.connector().clone();
    tokio::spawn(async move { app.run_until_stopped().await.ok() });

    let mut rx = connector.subscribe();
    tokio::time::timeout(
        Duration::from_secs(10),
        rx.wait_for(|s| *s == ConnectionState::Ready),
    )
    .await
    .expect("MongoDB connection timed out")
    .unwrap();

    let client = reqwest::Client::new();
    let base = format!("http://127.0.0.1:{}", port);

    let saved: Value = client
        .post(format!("{}/api/saveMapData", base))
        .json(&json!({ "name": "x" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let id = saved["data"].as_str().unwrap().to_string();

    let listed: Value = client
        .get(format!("{}/api/getMapData", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listed["count"], 1);
    assert_eq!(listed["data"][0]["_id"], id);
    assert_eq!(listed["data"][0]["name"], "x");

    let cleared: Value = client
        .delete(format!("{}/api/clearMapData", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(cleared["deletedCount"], 1);

    connector.shutdown().await;
    let admin = mongodb::Client::with_uri_str(&uri).await.unwrap();
    admin.database(&database).drop(None).await.ok();
}
