use std::sync::{Arc, Once};

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use content_catalog_service::{AppConfig, ContentEngine, HttpServer};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

static INIT: Once = Once::new();

const BOUNDARY: &str = "catalog-test-boundary";

fn init_test_logging() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .init();
    });
}

fn app() -> Router {
    init_test_logging();
    let engine = Arc::new(ContentEngine::in_memory());
    HttpServer::new(engine, &AppConfig::default()).router()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, body.to_vec())
}

async fn send_json(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let (status, body) = send(app, request).await;
    let value = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, value)
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::post(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// (field name, filename and content type for file parts, content)
type Part<'a> = (&'a str, Option<(&'a str, &'a str)>, &'a [u8]);

fn post_multipart(uri: &str, parts: &[Part<'_>]) -> Request<Body> {
    let mut body = Vec::new();
    for (name, file, content) in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match file {
            Some((filename, content_type)) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                        name, filename, content_type
                    )
                    .as_bytes(),
                );
            }
            None => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name)
                        .as_bytes(),
                );
            }
        }
        body.extend_from_slice(content);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

    Request::post(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

async fn create_named(app: &Router, uri: &str, name: &str) -> String {
    let (status, body) = send_json(app, post_json(uri, json!({ "name": name }))).await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    body["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_health_endpoints() {
    let app = app();

    let (status, body) = send_json(&app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "ok" }));

    let (status, _) = send_json(&app, get("/health/ready")).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_hierarchy_create_and_list() {
    let app = app();

    // Given: A workspace with a description
    let (status, workspace) = send_json(
        &app,
        post_json(
            "/api/v1/workspaces",
            json!({ "name": "Research", "description": "papers" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(workspace["name"], "Research");
    assert_eq!(workspace["description"], "papers");
    assert!(workspace["created_at"].is_string());
    let ws_id = workspace["id"].as_str().unwrap().to_string();

    // When: Two knowledge bases are created in order
    let first = create_named(&app, &format!("/api/v1/workspaces/{}/knowledge-bases", ws_id), "A").await;
    let second = create_named(&app, &format!("/api/v1/workspaces/{}/knowledge-bases", ws_id), "B").await;

    // Then: Listing returns them newest first
    let (status, listed) = send_json(
        &app,
        get(&format!("/api/v1/workspaces/{}/knowledge-bases", ws_id)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<&str> = listed
        .as_array()
        .unwrap()
        .iter()
        .map(|kb| kb["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec![second.as_str(), first.as_str()]);
    assert_eq!(listed[0]["workspace_id"], ws_id.as_str());

    // And: Collections nest under a knowledge base
    let collection_id = create_named(
        &app,
        &format!("/api/v1/knowledge-bases/{}/collections", first),
        "Inbox",
    )
    .await;
    let (status, collections) = send_json(
        &app,
        get(&format!("/api/v1/knowledge-bases/{}/collections", first)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(collections[0]["id"], collection_id.as_str());
    assert_eq!(collections[0]["knowledge_base_id"], first.as_str());
}

#[tokio::test]
async fn test_missing_parent_and_duplicate_name_errors() {
    let app = app();
    let missing = Uuid::new_v4();

    // Missing parents are 404 on both create and list
    let (status, body) = send_json(
        &app,
        post_json(
            &format!("/api/v1/workspaces/{}/knowledge-bases", missing),
            json!({ "name": "kb" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");

    let (status, _) = send_json(
        &app,
        get(&format!("/api/v1/collections/{}/documents", missing)),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Duplicate names are 400 with a readable message
    create_named(&app, "/api/v1/workspaces", "Dup").await;
    let (status, body) = send_json(
        &app,
        post_json("/api/v1/workspaces", json!({ "name": "Dup" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "conflict");
    assert_eq!(body["message"], "Workspace with this name already exists.");

    // Malformed JSON bodies are validation failures
    let (status, body) = send_json(
        &app,
        post_json("/api/v1/workspaces", json!({ "description": "no name" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_failed");
}

#[tokio::test]
async fn test_document_upload_and_download() {
    let app = app();
    let ws = create_named(&app, "/api/v1/workspaces", "ws").await;
    let kb = create_named(&app, &format!("/api/v1/workspaces/{}/knowledge-bases", ws), "kb").await;
    let collection = create_named(&app, &format!("/api/v1/knowledge-bases/{}/collections", kb), "c").await;
    let payload: &[u8] = b"line one\nline two\n\xff\xfe";

    // Given: An uploaded document
    let (status, document) = send_json(
        &app,
        post_multipart(
            &format!("/api/v1/collections/{}/documents", collection),
            &[("file", Some(("notes.txt", "text/plain")), payload)],
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", document);
    assert_eq!(document["filename"], "notes.txt");
    assert_eq!(document["mime_type"], "text/plain");
    assert_eq!(document["size_bytes"], payload.len());
    assert_eq!(document["status"], "ready");
    assert!(document.get("storage_path").is_none());
    let document_id = document["id"].as_str().unwrap();

    // When: Its content is fetched
    let response = app
        .clone()
        .oneshot(get(&format!("/api/v1/documents/{}/content", document_id)))
        .await
        .unwrap();

    // Then: The bytes are identical and the mime type is preserved
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "text/plain");
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&body[..], payload);

    // And: The document is listed under its collection
    let (_, listed) = send_json(
        &app,
        get(&format!("/api/v1/collections/{}/documents", collection)),
    )
    .await;
    assert_eq!(listed.as_array().unwrap().len(), 1);

    // A multipart body without a file is rejected
    let (status, _) = send_json(
        &app,
        post_multipart(
            &format!("/api/v1/collections/{}/documents", collection),
            &[("comment", None, b"no file here")],
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_dataset_upload_requires_csv() {
    let app = app();
    let ws = create_named(&app, "/api/v1/workspaces", "ws").await;
    let uri = format!("/api/v1/workspaces/{}/datasets", ws);

    let (status, body) = send_json(
        &app,
        post_multipart(
            &uri,
            &[
                ("name", None, b"plain"),
                ("file", Some(("data.txt", "text/plain")), b"a,b\n1,2\n"),
            ],
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_failed");

    let (status, dataset) = send_json(
        &app,
        post_multipart(
            &uri,
            &[
                ("name", None, b"trips"),
                ("file", Some(("data.csv", "text/plain")), b"a,b\n1,2\n"),
            ],
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", dataset);
    assert_eq!(dataset["name"], "trips");
    assert_eq!(dataset["workspace_id"], ws.as_str());
    assert_eq!(dataset["size_bytes"], 8);

    let (status, _) = send_json(
        &app,
        post_multipart(&uri, &[("file", Some(("x.csv", "text/csv")), b"a\n")]),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, listed) = send_json(&app, get(&uri)).await;
    assert_eq!(listed.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_delete_workspace_cascades() {
    let app = app();
    let ws = create_named(&app, "/api/v1/workspaces", "ws").await;
    let kb = create_named(&app, &format!("/api/v1/workspaces/{}/knowledge-bases", ws), "kb").await;
    let collection = create_named(&app, &format!("/api/v1/knowledge-bases/{}/collections", kb), "c").await;
    let (status, document) = send_json(
        &app,
        post_multipart(
            &format!("/api/v1/collections/{}/documents", collection),
            &[("file", Some(("a.bin", "application/octet-stream")), b"\x00\x01")],
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    // When: The workspace is deleted
    let delete = Request::delete(format!("/api/v1/workspaces/{}", ws))
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, delete).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    // Then: Every descendant is gone
    let (status, _) = send_json(
        &app,
        get(&format!("/api/v1/knowledge-bases/{}/collections", kb)),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send_json(
        &app,
        get(&format!(
            "/api/v1/documents/{}/content",
            document["id"].as_str().unwrap()
        )),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // And: The name is free again
    create_named(&app, "/api/v1/workspaces", "ws").await;
}

#[tokio::test]
async fn test_upload_to_missing_parent_is_not_found_before_body_checks() {
    let app = app();
    let missing = Uuid::new_v4();

    // Given: Upload bodies that would also fail validation
    let without_file = post_multipart(
        &format!("/api/v1/collections/{}/documents", missing),
        &[("name", None, b"only a name")],
    );
    let without_name = post_multipart(
        &format!("/api/v1/workspaces/{}/datasets", missing),
        &[("comment", None, b"neither name nor file")],
    );
    let not_multipart = post_json(
        &format!("/api/v1/collections/{}/documents", missing),
        json!({ "file": "inline" }),
    );

    // When / Then: The missing parent is reported first
    let (status, body) = send_json(&app, without_file).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
    assert_eq!(body["message"], format!("Collection not found: {}", missing));

    let (status, body) = send_json(&app, without_name).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], format!("Workspace not found: {}", missing));

    let (status, _) = send_json(&app, not_multipart).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
