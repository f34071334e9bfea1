//! Functional tests for versioned containers.
//!
//! Every test drives a full gateway over the in-memory store and inspects
//! what actually landed in the store.

mod common;

use bytes::Bytes;
use common::{client, config, gateway, revision, versioned_store, CONTAINER, OBJECT, REVISIONS};
use http::{Method, StatusCode};
use http_body::Frame;
use http_body_util::{BodyExt, StreamBody};
use mnemosyne::core::headers::REVISION_POINTER;
use mnemosyne::middleware::{Body, BoxError};
use mnemosyne_test::{MemoryStore, TestResponse};

/// A body that yields one chunk and then fails, as when the client hangs up
/// mid-upload.
fn aborted_body() -> Body {
    let frames: Vec<Result<Frame<Bytes>, BoxError>> = vec![
        Ok(Frame::data(Bytes::from_static(b"partial"))),
        Err("client gone".into()),
    ];
    StreamBody::new(futures_util::stream::iter(frames)).boxed_unsync()
}

#[tokio::test]
async fn test_each_put_creates_a_revision() {
    let store = versioned_store();
    let client = client(gateway(&config(false, true), &store));

    client
        .put(OBJECT)
        .body("rev1")
        .send()
        .await
        .assert_status(StatusCode::CREATED);
    client.get(OBJECT).send().await.assert_body("rev1");

    client
        .put(OBJECT)
        .body("rev2")
        .send()
        .await
        .assert_status(StatusCode::CREATED);
    client
        .get(OBJECT)
        .send()
        .await
        .assert_status(StatusCode::OK)
        .assert_body("rev2");

    assert_eq!(
        store.object_names(REVISIONS),
        vec![revision(0), revision(1)]
    );

    let primary = store.object(OBJECT).unwrap();
    assert!(primary.data.is_empty());
    assert_eq!(primary.meta(REVISION_POINTER), Some(revision(1).as_str()));
}

#[tokio::test]
async fn test_reverting_the_pointer() {
    let store = versioned_store();
    let client = client(gateway(&config(false, true), &store));

    client.put(OBJECT).body("first draft").send().await;
    client.put(OBJECT).body("second draft").send().await;
    client.get(OBJECT).send().await.assert_body("second draft");

    client
        .post(format!("{OBJECT}?manifest"))
        .header(REVISION_POINTER, revision(0))
        .send()
        .await
        .assert_status(StatusCode::ACCEPTED);

    client.get(OBJECT).send().await.assert_body("first draft");
    assert_eq!(store.object_names(REVISIONS).len(), 2);
}

#[tokio::test]
async fn test_post_updates_only_the_current_revision() {
    let store = versioned_store();
    let client = client(gateway(&config(false, true), &store));

    client.put(OBJECT).body("one").send().await;
    client.put(OBJECT).body("two").send().await;

    client
        .post(OBJECT)
        .header("x-object-meta-reviewed", "yes")
        .send()
        .await
        .assert_status(StatusCode::ACCEPTED);

    client
        .head(OBJECT)
        .send()
        .await
        .assert_status(StatusCode::OK)
        .assert_header("x-object-meta-reviewed", "yes");

    let older = store.object(&format!("{REVISIONS}/{}", revision(0))).unwrap();
    assert_eq!(older.meta("x-object-meta-reviewed"), None);
    let current = store.object(&format!("{REVISIONS}/{}", revision(1))).unwrap();
    assert_eq!(current.meta("x-object-meta-reviewed"), Some("yes"));

    let primary = store.object(OBJECT).unwrap();
    assert_eq!(primary.meta("x-object-meta-reviewed"), None);
}

#[tokio::test]
async fn test_user_metadata_is_stored_on_the_revision() {
    let store = versioned_store();
    let client = client(gateway(&config(false, true), &store));

    client
        .put(OBJECT)
        .header("x-object-meta-author", "ada")
        .header("content-type", "text/plain")
        .body("notes")
        .send()
        .await;

    let stored = store.object(&format!("{REVISIONS}/{}", revision(0))).unwrap();
    assert_eq!(stored.meta("x-object-meta-author"), Some("ada"));
    assert_eq!(stored.content_type.as_deref(), Some("text/plain"));

    client
        .get(OBJECT)
        .send()
        .await
        .assert_header("x-object-meta-author", "ada")
        .assert_header("content-type", "text/plain");
}

#[tokio::test]
async fn test_missing_pointer_is_precondition_failed() {
    let store = versioned_store();
    let client = client(gateway(&config(false, true), &store));

    client
        .put(format!("{OBJECT}?manifest"))
        .body("unversioned bytes")
        .send()
        .await
        .assert_status(StatusCode::CREATED);

    for response in [
        client.get(OBJECT).send().await,
        client.head(OBJECT).send().await,
        client
            .post(OBJECT)
            .header("x-object-meta-a", "b")
            .send()
            .await,
    ] {
        response.assert_status(StatusCode::PRECONDITION_FAILED);
    }
    assert!(store.object_names(REVISIONS).is_empty());
}

#[tokio::test]
async fn test_raw_manifest_read() {
    let store = versioned_store();
    let client = client(gateway(&config(false, true), &store));
    client.put(OBJECT).body("payload").send().await;

    client
        .get(format!("{OBJECT}?manifest"))
        .send()
        .await
        .assert_status(StatusCode::OK)
        .assert_header(REVISION_POINTER, revision(0))
        .assert_body("");
}

#[tokio::test]
async fn test_delete_keeps_revisions() {
    let store = versioned_store();
    let client = client(gateway(&config(false, true), &store));
    client.put(OBJECT).body("keep me").send().await;

    client
        .delete(OBJECT)
        .send()
        .await
        .assert_status(StatusCode::NO_CONTENT);
    client
        .get(OBJECT)
        .send()
        .await
        .assert_status(StatusCode::NOT_FOUND);

    assert_eq!(store.object_names(REVISIONS), vec![revision(0)]);

    // Undelete by re-creating the manifest.
    client
        .put(format!("{OBJECT}?manifest"))
        .header(REVISION_POINTER, revision(0))
        .send()
        .await
        .assert_status(StatusCode::CREATED);
    client.get(OBJECT).send().await.assert_body("keep me");
}

#[tokio::test]
async fn test_container_lookup_status_propagates() {
    let store = MemoryStore::with_auth_token("secret");
    store.create_container(CONTAINER, &[("revisions-location", "docs_revs")]);
    store.create_container(REVISIONS, &[]);
    let gateway = gateway(&config(false, true), &store);

    let anonymous = client(gateway.clone());
    anonymous
        .put(OBJECT)
        .body("x")
        .send()
        .await
        .assert_status(StatusCode::UNAUTHORIZED);
    assert_eq!(store.request_count(), 1);

    let authorized = client(gateway).with_default_header("x-auth-token", "secret");
    authorized
        .put(OBJECT)
        .body("x")
        .send()
        .await
        .assert_status(StatusCode::CREATED);
    authorized.get(OBJECT).send().await.assert_body("x");
}

#[tokio::test]
async fn test_missing_container_propagates_not_found() {
    let store = MemoryStore::new();
    let client = client(gateway(&config(false, true), &store));

    client
        .get("/v1/AUTH_test/nowhere/o")
        .send()
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_unversioned_container_passes_through() {
    let store = MemoryStore::new();
    store.create_container(CONTAINER, &[]);
    let client = client(gateway(&config(false, true), &store));

    client.put(OBJECT).body("plain").send().await;
    client.get(OBJECT).send().await.assert_body("plain");

    let stored = store.object(OBJECT).unwrap();
    assert_eq!(&stored.data[..], b"plain");
    assert_eq!(stored.meta(REVISION_POINTER), None);
}

#[tokio::test]
async fn test_sub_requests_are_tagged() {
    let store = versioned_store();
    let client = client(gateway(&config(false, true), &store));
    store.clear_requests();

    client.put(OBJECT).body("v").send().await;

    let sources: Vec<_> = store
        .requests()
        .into_iter()
        .map(|r| (r.method.to_string(), r.path, r.source))
        .collect();
    assert_eq!(
        sources,
        vec![
            ("HEAD".to_string(), CONTAINER.to_string(), Some("revisions")),
            (
                "PUT".to_string(),
                format!("{REVISIONS}/{}", revision(0)),
                Some("revisions")
            ),
            ("PUT".to_string(), OBJECT.to_string(), Some("revisions")),
        ]
    );

    let pointer_update = &store.requests()[2];
    assert_eq!(pointer_update.headers.get("content-length").unwrap(), "0");
}

#[tokio::test]
async fn test_aborted_upload_commits_nothing() {
    for encryption in [false, true] {
        let store = versioned_store();
        let gateway = gateway(&config(encryption, true), &store);

        let request = http::Request::builder()
            .method(Method::PUT)
            .uri(OBJECT)
            .body(aborted_body())
            .unwrap();
        let response = TestResponse::from_response(gateway.handle(request).await)
            .await
            .unwrap();

        assert!(!response.is_success(), "encryption={encryption}");
        assert!(store.object_names(REVISIONS).is_empty());
        assert!(store.object(OBJECT).is_none());
    }
}

#[tokio::test]
async fn test_aborted_upload_keeps_previous_pointer() {
    let store = versioned_store();
    let gateway = gateway(&config(false, true), &store);
    let client = client(gateway.clone());
    client.put(OBJECT).body("kept").send().await;

    let request = http::Request::builder()
        .method(Method::PUT)
        .uri(OBJECT)
        .body(aborted_body())
        .unwrap();
    let response = TestResponse::from_response(gateway.handle(request).await)
        .await
        .unwrap();
    assert!(!response.is_success());

    assert_eq!(store.object_names(REVISIONS), vec![revision(0)]);
    let primary = store.object(OBJECT).unwrap();
    assert_eq!(primary.meta(REVISION_POINTER), Some(revision(0).as_str()));
    client.get(OBJECT).send().await.assert_body("kept");
}

#[tokio::test]
async fn test_object_name_with_space_round_trips() {
    let store = versioned_store();
    let client = client(gateway(&config(false, true), &store));
    let spaced = format!("{CONTAINER}/my%20notes.txt");
    let first = format!("my notes.txt.{}.000000", common::EPOCH);

    client.put(&spaced).body("draft").send().await;
    client.put(&spaced).body("final").send().await;
    client.get(&spaced).send().await.assert_body("final");

    assert_eq!(
        store.object(&spaced).unwrap().meta(REVISION_POINTER),
        Some(format!("my notes.txt.{}.000000", common::EPOCH + 1).as_str())
    );

    client
        .post(format!("{spaced}?manifest"))
        .header(REVISION_POINTER, first.as_str())
        .send()
        .await
        .assert_status(StatusCode::ACCEPTED);
    client
        .get(&spaced)
        .send()
        .await
        .assert_status(StatusCode::OK)
        .assert_body("draft");
}

#[tokio::test]
async fn test_pointer_is_never_read_as_a_query() {
    let store = versioned_store();
    let client = client(gateway(&config(false, true), &store));
    client.put(OBJECT).body("first").send().await;

    client
        .post(format!("{OBJECT}?manifest"))
        .header(REVISION_POINTER, format!("{}?x", revision(0)))
        .send()
        .await
        .assert_status(StatusCode::ACCEPTED);

    client
        .get(OBJECT)
        .send()
        .await
        .assert_status(StatusCode::NOT_FOUND);
}
