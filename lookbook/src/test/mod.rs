//! End-to-end tests through the HTTP router, with upstreams mocked by wiremock.

use axum::http::StatusCode;
use axum_test::multipart::{MultipartForm, Part};
use chrono::{Duration as ChronoDuration, Utc};
use serde_json::{Value, json};
use uuid::Uuid;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::db::models::generations::{GenerationCreateDBRequest, GenerationUpdateDBRequest};
use crate::generation::GenerationStatus;
use crate::images::tests::solid_png;
use crate::store::GenerationStore;
use crate::test_utils::{create_test_app, create_test_config, create_test_user};

async fn mount_storage(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/refs/ring.png"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(solid_png(40, 40, [220, 190, 40])))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path_regex(r"^/storage/v1/object/.+"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "Key": "ok" })))
        .mount(server)
        .await;
}

async fn mount_prediction(server: &MockServer, id: &str, terminal: Value) {
    Mock::given(method("POST"))
        .and(path("/v1/models/acme/primary/predictions"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": id, "status": "starting" })))
        .mount(server)
        .await;
    let mut body = terminal;
    body["id"] = json!(id);
    Mock::given(method("GET"))
        .and(path(format!("/v1/predictions/{id}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

#[test_log::test(tokio::test)]
async fn test_health_and_openapi_are_served() {
    let (server, _store) = create_test_app(create_test_config("http://127.0.0.1:9"));

    let health = server.get("/healthz").await;
    health.assert_status_ok();
    health.assert_text("OK");

    let doc: Value = server.get("/openapi.json").await.json();
    assert!(doc["paths"]["/generations/from-urls"].is_object());
}

#[test_log::test(tokio::test)]
async fn test_anonymous_registration_is_idempotent_per_device() {
    let config = create_test_config("http://127.0.0.1:9");
    let initial_credits = config.credits.initial_credits;
    let (server, _store) = create_test_app(config);

    let first = server
        .post("/api/users/anonymous")
        .json(&json!({ "device_id": "device-abc" }))
        .await;
    first.assert_status(StatusCode::CREATED);
    let first: Value = first.json();
    assert_eq!(first["created"], json!(true));
    assert_eq!(first["user"]["credit_balance"], json!(initial_credits));

    let second = server
        .post("/api/users/anonymous")
        .json(&json!({ "device_id": "device-abc" }))
        .await;
    second.assert_status_ok();
    let second: Value = second.json();
    assert_eq!(second["created"], json!(false));
    assert_eq!(second["user"]["id"], first["user"]["id"]);

    let user_id = first["user"]["id"].as_str().unwrap();
    let credits: Value = server.get(&format!("/api/users/{user_id}/credits")).await.json();
    assert_eq!(credits["balance"], json!(initial_credits));
    assert_eq!(credits["total_count"], json!(1));
}

#[test_log::test(tokio::test)]
async fn test_blank_device_id_is_rejected() {
    let (server, _store) = create_test_app(create_test_config("http://127.0.0.1:9"));

    let response = server.post("/api/users/anonymous").json(&json!({ "device_id": "  " })).await;
    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["success"], json!(false));
    assert_eq!(body["code"], json!("VALIDATION_ERROR"));
}

#[test_log::test(tokio::test)]
async fn test_duplicate_favorite_is_conflict() {
    let (server, store) = create_test_app(create_test_config("http://127.0.0.1:9"));
    let user = create_test_user(&store, 0).await;
    let url = format!("/api/favorites/{}", user.id);
    let favorite = json!({ "location_id": "paris-louvre", "location_name": "Louvre" });

    server.post(&url).json(&favorite).await.assert_status(StatusCode::CREATED);

    let duplicate = server.post(&url).json(&favorite).await;
    duplicate.assert_status(StatusCode::CONFLICT);
    let body: Value = duplicate.json();
    assert_eq!(body["code"], json!("ALREADY_FAVORITED"));

    let list: Value = server.get(&url).await.json();
    assert_eq!(list["favorites"].as_array().unwrap().len(), 1);

    server
        .delete(&format!("{url}/paris-louvre"))
        .await
        .assert_status_ok();
    server
        .delete(&format!("{url}/paris-louvre"))
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[test_log::test(tokio::test)]
async fn test_app_link_falls_back_to_global() {
    let (server, _store) = create_test_app(create_test_config("http://127.0.0.1:9"));

    server
        .put("/api/app-links")
        .json(&json!({ "platform": "ios", "url": "https://apps.apple.com/app/id1" }))
        .await
        .assert_status_ok();
    server
        .put("/api/app-links")
        .json(&json!({ "platform": "ios", "country": "DE", "url": "https://apps.apple.com/de/app/id1" }))
        .await
        .assert_status_ok();

    let exact: Value = server
        .get("/api/app-links")
        .add_query_param("platform", "ios")
        .add_query_param("country", "de")
        .await
        .json();
    assert_eq!(exact["link"]["country"], json!("de"));
    assert_eq!(exact["fallback"], json!(false));

    let fallback: Value = server
        .get("/api/app-links")
        .add_query_param("platform", "ios")
        .add_query_param("country", "FR")
        .await
        .json();
    assert_eq!(fallback["link"]["country"], json!("global"));
    assert_eq!(fallback["fallback"], json!(true));

    let all: Value = server.get("/api/app-links").add_query_param("platform", "ios").await.json();
    assert_eq!(all["links"].as_array().unwrap().len(), 2);

    server
        .get("/api/app-links")
        .add_query_param("platform", "android")
        .add_query_param("country", "fr")
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[test_log::test(tokio::test)]
async fn test_pose_catalog_filters_by_gender() {
    let (server, store) = create_test_app(create_test_config("http://127.0.0.1:9"));
    store.seed_pose("Over the shoulder", Some("female"), Some("portrait"));
    store.seed_pose("Hands in pockets", Some("male"), Some("portrait"));
    store.seed_pose("Walking away", None, Some("street"));

    let poses: Value = server.get("/api/poses").add_query_param("gender", "Female").await.json();
    let names: Vec<&str> = poses["poses"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["name"].as_str().unwrap())
        .collect();
    assert!(names.contains(&"Over the shoulder"));
    assert!(names.contains(&"Walking away"));
    assert!(!names.contains(&"Hands in pockets"));
}

#[test_log::test(tokio::test)]
async fn test_generation_from_urls_charges_on_success() {
    let upstream = MockServer::start().await;
    mount_storage(&upstream).await;
    mount_prediction(
        &upstream,
        "pred-e2e",
        json!({ "status": "succeeded", "output": ["https://replicate.test/out.jpg"] }),
    )
    .await;
    let (server, store) = create_test_app(create_test_config(&upstream.uri()));
    let user = create_test_user(&store, 2).await;

    let response = server
        .post("/api/generations/from-urls")
        .json(&json!({
            "user_id": user.id,
            "prompt": "Gold ring on a hand, studio light",
            "aspect_ratio": "1:1",
            "reference_image_urls": [format!("{}/refs/ring.png", upstream.uri())],
        }))
        .await;
    response.assert_status(StatusCode::CREATED);
    let body: Value = response.json();
    let generation = &body["generation"];
    assert_eq!(generation["status"], json!("completed"));
    assert_eq!(generation["result_image_url"], json!("https://replicate.test/out.jpg"));
    assert_eq!(generation["prediction_id"], json!("pred-e2e"));

    let credits: Value = server.get(&format!("/api/users/{}/credits", user.id)).await.json();
    assert_eq!(credits["balance"], json!(1));

    let id = generation["generation_id"].as_str().unwrap();
    let fetched: Value = server
        .get(&format!("/api/generations/{id}"))
        .add_query_param("user_id", user.id)
        .await
        .json();
    assert_eq!(fetched["generation"]["status"], json!("completed"));

    let predictions: Value = server
        .get(&format!("/api/generations/{id}/predictions"))
        .add_query_param("user_id", user.id)
        .await
        .json();
    assert_eq!(predictions["predictions"][0]["id"], json!("pred-e2e"));
    assert_eq!(predictions["predictions"][0]["model"], json!("acme/primary"));
    assert_eq!(predictions["predictions"][0]["status"], json!("succeeded"));

    let history: Value = server.get(&format!("/api/users/{}/generations", user.id)).await.json();
    assert_eq!(history["total_count"], json!(1));
}

#[test_log::test(tokio::test)]
async fn test_multipart_upload_generation() {
    let upstream = MockServer::start().await;
    mount_storage(&upstream).await;
    mount_prediction(
        &upstream,
        "pred-upload",
        json!({ "status": "succeeded", "output": "https://replicate.test/upload.jpg" }),
    )
    .await;
    let (server, store) = create_test_app(create_test_config(&upstream.uri()));
    let user = create_test_user(&store, 1).await;

    let form = MultipartForm::new()
        .add_text("user_id", user.id.to_string())
        .add_text("prompt", "Silver earrings, close-up")
        .add_text("settings", r#"{"background":"beach"}"#)
        .add_part(
            "image1",
            Part::bytes(solid_png(60, 30, [10, 20, 30])).file_name("person.png").mime_type("image/png"),
        )
        .add_part(
            "image2",
            Part::bytes(solid_png(30, 30, [200, 200, 200])).file_name("jewelry.png").mime_type("image/png"),
        );

    let response = server.post("/api/generations").multipart(form).await;
    response.assert_status(StatusCode::CREATED);
    let body: Value = response.json();
    assert_eq!(body["generation"]["status"], json!("completed"));
    assert_eq!(body["generation"]["reference_images"].as_array().unwrap().len(), 2);

    let credits: Value = server.get(&format!("/api/users/{}/credits", user.id)).await.json();
    assert_eq!(credits["balance"], json!(0));
}

#[test_log::test(tokio::test)]
async fn test_sensitive_content_is_rejected_without_charge() {
    let upstream = MockServer::start().await;
    mount_storage(&upstream).await;
    mount_prediction(
        &upstream,
        "pred-flagged",
        json!({ "status": "failed", "error": "E005: input was flagged as sensitive" }),
    )
    .await;
    let (server, store) = create_test_app(create_test_config(&upstream.uri()));
    let user = create_test_user(&store, 1).await;

    let response = server
        .post("/api/generations/from-urls")
        .json(&json!({
            "user_id": user.id,
            "prompt": "Necklace on a model",
            "reference_image_urls": [format!("{}/refs/ring.png", upstream.uri())],
        }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["code"], json!("SENSITIVE_CONTENT"));

    let credits: Value = server.get(&format!("/api/users/{}/credits", user.id)).await.json();
    assert_eq!(credits["balance"], json!(1));

    let history: Value = server.get(&format!("/api/users/{}/generations", user.id)).await.json();
    assert_eq!(history["data"][0]["status"], json!("failed"));
    assert_eq!(history["data"][0]["reason"], json!("sensitive_content"));
}

#[test_log::test(tokio::test)]
async fn test_insufficient_credits_is_payment_required() {
    let (server, store) = create_test_app(create_test_config("http://127.0.0.1:9"));
    let user = create_test_user(&store, 0).await;

    let response = server
        .post("/api/generations/from-urls")
        .json(&json!({
            "user_id": user.id,
            "prompt": "Bracelet",
            "reference_image_urls": ["https://cdn.test/bracelet.png"],
        }))
        .await;
    response.assert_status(StatusCode::PAYMENT_REQUIRED);
    let body: Value = response.json();
    assert_eq!(body["code"], json!("INSUFFICIENT_CREDITS"));
}

#[test_log::test(tokio::test)]
async fn test_stale_generation_expires_when_read() {
    let config = create_test_config("http://127.0.0.1:9");
    let stale_after = config.generations.stale_after;
    let (server, store) = create_test_app(config);
    let user = create_test_user(&store, 1).await;

    let row = store
        .create_generation(&GenerationCreateDBRequest {
            generation_id: Uuid::new_v4(),
            user_id: user.id,
            original_prompt: "Watch on a wrist".to_string(),
            reference_images: vec![],
            settings: json!({}),
            aspect_ratio: "1:1".to_string(),
        })
        .await
        .unwrap();
    let age = ChronoDuration::from_std(stale_after).unwrap() + ChronoDuration::minutes(1);
    store.backdate_generation(row.generation_id, Utc::now() - age);

    let active: Value = server
        .get(&format!("/api/users/{}/generations/active", user.id))
        .await
        .json();
    assert_eq!(active["generations"].as_array().unwrap().len(), 0);
    assert_eq!(active["expired"], json!([row.generation_id]));

    let fetched: Value = server
        .get(&format!("/api/generations/{}", row.generation_id))
        .add_query_param("user_id", user.id)
        .await
        .json();
    assert_eq!(fetched["generation"]["status"], json!("failed"));
    assert_eq!(fetched["generation"]["reason"], json!("timeout"));
}

#[test_log::test(tokio::test)]
async fn test_generation_of_another_user_is_not_found() {
    let (server, store) = create_test_app(create_test_config("http://127.0.0.1:9"));
    let owner = create_test_user(&store, 1).await;
    let stranger = create_test_user(&store, 1).await;
    let row = store
        .create_generation(&GenerationCreateDBRequest {
            generation_id: Uuid::new_v4(),
            user_id: owner.id,
            original_prompt: "Ring".to_string(),
            reference_images: vec![],
            settings: json!({}),
            aspect_ratio: "1:1".to_string(),
        })
        .await
        .unwrap();

    server
        .get(&format!("/api/generations/{}", row.generation_id))
        .add_query_param("user_id", stranger.id)
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[test_log::test(tokio::test)]
async fn test_cleanup_deletes_only_old_finished_generations() {
    let (server, store) = create_test_app(create_test_config("http://127.0.0.1:9"));
    let user = create_test_user(&store, 1).await;

    let mut ids = Vec::new();
    for prompt in ["Finished ring", "Pending ring"] {
        let row = store
            .create_generation(&GenerationCreateDBRequest {
                generation_id: Uuid::new_v4(),
                user_id: user.id,
                original_prompt: prompt.to_string(),
                reference_images: vec![],
                settings: json!({}),
                aspect_ratio: "1:1".to_string(),
            })
            .await
            .unwrap();
        store.backdate_generation(row.generation_id, Utc::now() - ChronoDuration::days(2));
        ids.push(row.generation_id);
    }
    store
        .transition_generation(
            ids[0],
            &[GenerationStatus::Pending],
            GenerationStatus::Completed,
            &GenerationUpdateDBRequest {
                result_image_url: Some("https://replicate.test/done.jpg".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .unwrap();

    for days in ["0", "36501"] {
        server
            .delete(&format!("/api/users/{}/generations", user.id))
            .add_query_param("older_than_days", days)
            .await
            .assert_status(StatusCode::BAD_REQUEST);
    }

    let response = server
        .delete(&format!("/api/users/{}/generations", user.id))
        .add_query_param("older_than_days", 1)
        .await;
    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["deleted"], json!(1));

    let history: Value = server.get(&format!("/api/users/{}/generations", user.id)).await.json();
    assert_eq!(history["total_count"], json!(1));
    assert_eq!(history["data"][0]["generation_id"], json!(ids[1]));
    assert_eq!(history["data"][0]["status"], json!("pending"));
}
