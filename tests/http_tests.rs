use axum::http::{Method, StatusCode, header};
use axum_test::TestServer;
use bytes::Bytes;
use chrono::DateTime;
use s3fs_gateway::{routes::routes::app, services::storage_service::StorageService};
use tempfile::TempDir;

const S3_XMLNS: &str = "http://s3.amazonaws.com/doc/2006-03-01/";

async fn setup_test_server() -> (TempDir, TestServer) {
    let tmp = TempDir::new().unwrap();
    let service = StorageService::open(tmp.path()).await.unwrap();
    let server = TestServer::new(app(service)).unwrap();
    (tmp, server)
}

#[tokio::test]
async fn test_list_buckets_empty() {
    let (_tmp, server) = setup_test_server().await;

    let response = server.get("/").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let body = response.text();
    assert!(body.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
    assert!(body.contains("ListAllMyBucketsResult"));
    assert!(!body.contains("<Bucket>"));
}

#[tokio::test]
async fn test_full_object_lifecycle() {
    let (_tmp, server) = setup_test_server().await;

    server.put("/b").await.assert_status(StatusCode::OK);

    server
        .put("/b/hello.txt")
        .bytes(Bytes::from_static(b"Hello, HTTP!"))
        .await
        .assert_status(StatusCode::OK);

    let response = server.get("/b/hello.txt").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(response.as_bytes().as_ref(), b"Hello, HTTP!");
    assert_eq!(response.header(header::CONTENT_LENGTH), "12");
    assert_eq!(
        response.header(header::CONTENT_TYPE),
        "application/octet-stream"
    );
    let last_modified = response.header(header::LAST_MODIFIED);
    let last_modified = last_modified.to_str().unwrap();
    assert!(last_modified.ends_with(" GMT"), "{last_modified}");
    assert!(DateTime::parse_from_rfc2822(last_modified).is_ok());

    let response = server.get("/b").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert!(response.text().contains("<Key>hello.txt</Key>"));

    server
        .delete("/b/hello.txt")
        .await
        .assert_status(StatusCode::NO_CONTENT);
    server.delete("/b").await.assert_status(StatusCode::NO_CONTENT);

    let response = server.get("/").await;
    assert!(!response.text().contains("<Name>b</Name>"));
}

#[tokio::test]
async fn test_list_buckets_after_create() {
    let (_tmp, server) = setup_test_server().await;
    server.put("/test-bucket").await.assert_status(StatusCode::OK);
    server.put("/test-bucket").await.assert_status(StatusCode::OK);

    let body = server.get("/").await.text();
    assert_eq!(body.matches("<Name>test-bucket</Name>").count(), 1);
    assert!(body.contains("<CreationDate>"));
}

#[tokio::test]
async fn test_nested_keys_and_prefix() {
    let (_tmp, server) = setup_test_server().await;
    server.put("/b").await;
    server
        .put("/b/dir/nested.txt")
        .bytes(Bytes::from_static(b"nested"))
        .await
        .assert_status(StatusCode::OK);
    server
        .put("/b/top.txt")
        .bytes(Bytes::from_static(b"top"))
        .await
        .assert_status(StatusCode::OK);

    let body = server.get("/b").add_query_param("prefix", "dir/").await.text();
    assert!(body.contains("<Key>dir/nested.txt</Key>"));
    assert!(!body.contains("top.txt"));
    assert_eq!(body.matches("<Contents>").count(), 1);

    let body = server.get("/b").await.text();
    assert_eq!(body.matches("<Contents>").count(), 2);
}

#[tokio::test]
async fn test_xml_content_type_and_namespace() {
    let (_tmp, server) = setup_test_server().await;
    server.put("/test-bucket").await;
    server
        .put("/test-bucket/a.txt")
        .bytes(Bytes::from_static(b"abc"))
        .await;

    let response = server.get("/").await;
    assert!(
        response
            .header(header::CONTENT_TYPE)
            .to_str()
            .unwrap()
            .contains("application/xml")
    );
    assert!(response.text().contains(&format!("xmlns=\"{}\"", S3_XMLNS)));

    let response = server.get("/test-bucket").await;
    assert!(
        response
            .header(header::CONTENT_TYPE)
            .to_str()
            .unwrap()
            .contains("application/xml")
    );
    let body = response.text();
    assert!(body.contains(&format!(
        "<ListBucketResult xmlns=\"{}\"><Name>test-bucket</Name>",
        S3_XMLNS
    )));
    assert!(body.contains("<Size>3</Size>"));
    assert!(body.contains("<LastModified>"));
    assert!(!body.contains("<ETag>"));
}

#[tokio::test]
async fn test_get_missing_object_is_not_found() {
    let (_tmp, server) = setup_test_server().await;
    server.put("/b").await;

    let response = server.get("/b/missing.txt").await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
    assert!(response.text().contains("missing.txt"));
}

#[tokio::test]
async fn test_delete_missing_object_is_not_found() {
    let (_tmp, server) = setup_test_server().await;
    server.put("/b").await;

    let response = server.delete("/b/missing.txt").await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_delete_non_empty_bucket_conflicts() {
    let (_tmp, server) = setup_test_server().await;
    server.put("/b").await;
    server.put("/b/k").bytes(Bytes::from_static(b"x")).await;

    let response = server.delete("/b").await;
    assert_eq!(response.status_code(), StatusCode::CONFLICT);
    assert!(response.text().contains("not empty"));

    let response = server.get("/b/k").await;
    assert_eq!(response.status_code(), StatusCode::OK);
}

#[tokio::test]
async fn test_put_into_missing_bucket_is_not_found() {
    let (_tmp, server) = setup_test_server().await;
    let response = server
        .put("/nope/k")
        .bytes(Bytes::from_static(b"x"))
        .await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_path_traversal_is_rejected() {
    let (tmp, server) = setup_test_server().await;
    server.put("/b").await;

    let response = server
        .put("/b/%2E%2E%2F%2E%2E%2Fescape.txt")
        .bytes(Bytes::from_static(b"x"))
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    assert!(!tmp.path().join("escape.txt").exists());
}

#[tokio::test]
async fn test_escaped_slash_in_bucket_name_is_rejected() {
    let (tmp, server) = setup_test_server().await;

    let response = server.put("/a%2Fb").await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    assert!(!tmp.path().join("a").exists());
}

#[tokio::test]
async fn test_unsupported_methods_are_rejected() {
    let (_tmp, server) = setup_test_server().await;
    server.put("/b").await;

    for path in ["/", "/b", "/b/k"] {
        let response = server.method(Method::POST, path).await;
        assert_eq!(response.status_code(), StatusCode::METHOD_NOT_ALLOWED, "{path}");
    }
    let response = server.method(Method::HEAD, "/b/k").await;
    assert_eq!(response.status_code(), StatusCode::METHOD_NOT_ALLOWED);

    let response = server.put("/").await;
    assert_eq!(response.status_code(), StatusCode::METHOD_NOT_ALLOWED);
    let response = server.delete("/").await;
    assert_eq!(response.status_code(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn test_error_bodies_are_plain_text() {
    let (_tmp, server) = setup_test_server().await;

    let response = server.get("/absent").await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
    assert!(
        response
            .header(header::CONTENT_TYPE)
            .to_str()
            .unwrap()
            .starts_with("text/plain")
    );
    assert_eq!(response.text().lines().count(), 1);
}

#[tokio::test]
async fn test_health_check() {
    let (_tmp, server) = setup_test_server().await;

    let response = server.get("/health").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(response.text(), "OK");

    let response = server.get("/readyz").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert!(response.text().contains("\"disk\""));

    // readiness temp files never show up as buckets
    let body = server.get("/").await.text();
    assert!(!body.contains("readyz"));
}
