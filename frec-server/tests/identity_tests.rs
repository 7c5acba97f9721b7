//! Integration tests for identity resolution
//!
//! Devices and speakers fork on ambiguity; instructors are strict.

mod helpers;

use frec_common::Error;
use frec_server::identity::IdentityResolver;
use helpers::{count_rows, create_test_env, seed_instructor};
use serde_json::json;

#[tokio::test]
async fn tc_id_001_new_imei_inserts_once_then_resolves() {
    // Given: an empty device table
    let env = create_test_env().await.unwrap();
    let resolver = IdentityResolver::new(env.pool.clone());
    let doc = json!({"userAgent": "Mozilla/5.0", "imei": "490154203237518"});

    // When: the same IMEI is resolved three times
    let first = resolver.resolve_device(&doc).await.unwrap();
    let second = resolver.resolve_device(&doc).await.unwrap();
    let third = resolver
        .resolve_device(&json!({"userAgent": "Other agent", "imei": "490154203237518"}))
        .await
        .unwrap();

    // Then: exactly one device row exists and every call returns it
    assert_eq!(first, second);
    assert_eq!(first, third);
    assert_eq!(count_rows(&env.pool, "device").await.unwrap(), 1);
}

#[tokio::test]
async fn tc_id_002_device_id_with_matching_user_agent_resolves() {
    let env = create_test_env().await.unwrap();
    let resolver = IdentityResolver::new(env.pool.clone());

    let id = resolver
        .resolve_device(&json!({"userAgent": "Mozilla/5.0"}))
        .await
        .unwrap();
    let again = resolver
        .resolve_device(&json!({"userAgent": "Mozilla/5.0", "deviceId": id}))
        .await
        .unwrap();

    assert_eq!(id, again);
    assert_eq!(count_rows(&env.pool, "device").await.unwrap(), 1);
}

#[tokio::test]
async fn tc_id_003_device_id_mismatch_forks_new_device() {
    // Given: a device registered with one user agent
    let env = create_test_env().await.unwrap();
    let resolver = IdentityResolver::new(env.pool.clone());
    let id = resolver
        .resolve_device(&json!({"userAgent": "Mozilla/5.0"}))
        .await
        .unwrap();

    // When: its id is claimed with another user agent, and an unknown id is claimed
    let forked = resolver
        .resolve_device(&json!({"userAgent": "Opera/9.80", "deviceId": id}))
        .await
        .unwrap();
    let unknown = resolver
        .resolve_device(&json!({"userAgent": "Mozilla/5.0", "deviceId": "9999"}))
        .await
        .unwrap();

    // Then: new rows are created and the original is untouched
    assert_ne!(id, forked);
    assert_ne!(id, unknown);
    assert_eq!(count_rows(&env.pool, "device").await.unwrap(), 3);
    let stored: String = sqlx::query_scalar("SELECT userAgent FROM device WHERE id = ?")
        .bind(id)
        .fetch_one(&env.pool)
        .await
        .unwrap();
    assert_eq!(stored, "Mozilla/5.0");
}

#[tokio::test]
async fn tc_id_004_device_without_keys_always_inserts() {
    let env = create_test_env().await.unwrap();
    let resolver = IdentityResolver::new(env.pool.clone());
    let doc = json!({"userAgent": "Mozilla/5.0", "imei": ""});

    let a = resolver.resolve_device(&doc).await.unwrap();
    let b = resolver.resolve_device(&doc).await.unwrap();

    assert_ne!(a, b);
}

#[tokio::test]
async fn tc_id_005_device_rejects_unknown_and_missing_fields() {
    let env = create_test_env().await.unwrap();
    let resolver = IdentityResolver::new(env.pool.clone());

    let unknown = resolver
        .resolve_device(&json!({"userAgent": "Mozilla/5.0", "id; DROP TABLE device": 1}))
        .await;
    assert!(matches!(unknown, Err(Error::InvalidInput(_))));

    let missing = resolver.resolve_device(&json!({"imei": "1234"})).await;
    assert!(matches!(missing, Err(Error::InvalidInput(_))));

    assert_eq!(count_rows(&env.pool, "device").await.unwrap(), 0);
}

#[tokio::test]
async fn tc_id_006_device_document_as_json_string() {
    let env = create_test_env().await.unwrap();
    let resolver = IdentityResolver::new(env.pool.clone());

    let encoded = json!(r#"{"userAgent": "Mozilla/5.0", "imei": "111"}"#);
    let id = resolver.resolve_device(&encoded).await.unwrap();
    let plain = resolver
        .resolve_device(&json!({"userAgent": "Mozilla/5.0", "imei": "111"}))
        .await
        .unwrap();

    assert_eq!(id, plain);
}

#[tokio::test]
async fn tc_id_010_instructor_by_known_id() {
    let env = create_test_env().await.unwrap();
    let resolver = IdentityResolver::new(env.pool.clone());
    let id = seed_instructor(&env.pool).await.unwrap();

    assert_eq!(resolver.resolve_instructor(&json!({"id": id})).await.unwrap(), id);
    assert_eq!(
        resolver
            .resolve_instructor(&json!({"id": id.to_string()}))
            .await
            .unwrap(),
        id
    );
}

#[tokio::test]
async fn tc_id_011_unknown_instructor_id_never_inserts() {
    let env = create_test_env().await.unwrap();
    let resolver = IdentityResolver::new(env.pool.clone());

    let result = resolver
        .resolve_instructor(&json!({
            "id": 42,
            "name": "Gunnar",
            "email": "gunnar@example.org",
            "phone": "5551234",
            "address": "Laugavegur 1"
        }))
        .await;

    let err = result.unwrap_err();
    assert!(matches!(err, Error::UnknownReference(_)));
    assert_eq!(err.status_code(), 400);
    assert_eq!(count_rows(&env.pool, "instructor").await.unwrap(), 0);
}

#[tokio::test]
async fn tc_id_012_new_instructor_requires_every_field() {
    let env = create_test_env().await.unwrap();
    let resolver = IdentityResolver::new(env.pool.clone());

    let partial = resolver
        .resolve_instructor(&json!({"name": "Gunnar", "email": "gunnar@example.org"}))
        .await;
    assert!(matches!(partial, Err(Error::InvalidInput(_))));

    let id = resolver
        .resolve_instructor(&json!({
            "name": "Gunnar",
            "email": "gunnar@example.org",
            "phone": "5551234",
            "address": "Laugavegur 1"
        }))
        .await
        .unwrap();
    assert!(id > 0);
    assert_eq!(count_rows(&env.pool, "instructor").await.unwrap(), 1);
}

#[tokio::test]
async fn tc_id_020_speaker_by_name_and_imei_keeps_first_attributes() {
    // Given: a speaker created with one attribute
    let env = create_test_env().await.unwrap();
    let resolver = IdentityResolver::new(env.pool.clone());
    let first = resolver
        .resolve_speaker(&json!({"name": "Anna", "deviceImei": "111", "height": 170}))
        .await
        .unwrap();

    // When: the same speaker resolves again with a different attribute
    let again = resolver
        .resolve_speaker(&json!({"name": "Anna", "deviceImei": "111", "dialect": "north"}))
        .await
        .unwrap();

    // Then: same id, and attributes are those of creation only
    assert_eq!(first, again);
    let attributes: Vec<(String, String)> =
        sqlx::query_as("SELECT s_key, s_value FROM speaker_info WHERE speakerId = ?")
            .bind(first)
            .fetch_all(&env.pool)
            .await
            .unwrap();
    assert_eq!(attributes, vec![("height".to_string(), "170".to_string())]);
}

#[tokio::test]
async fn tc_id_021_speaker_id_name_mismatch_forks() {
    let env = create_test_env().await.unwrap();
    let resolver = IdentityResolver::new(env.pool.clone());

    let anna = resolver.resolve_speaker(&json!({"name": "Anna"})).await.unwrap();
    let same = resolver
        .resolve_speaker(&json!({"name": "Anna", "speakerId": anna}))
        .await
        .unwrap();
    let forked = resolver
        .resolve_speaker(&json!({"name": "Bjorn", "speakerId": anna}))
        .await
        .unwrap();

    assert_eq!(anna, same);
    assert_ne!(anna, forked);
    assert_eq!(count_rows(&env.pool, "speaker").await.unwrap(), 2);
}

#[tokio::test]
async fn tc_id_022_speaker_requires_name() {
    let env = create_test_env().await.unwrap();
    let resolver = IdentityResolver::new(env.pool.clone());

    let result = resolver.resolve_speaker(&json!({"deviceImei": "111"})).await;

    assert!(matches!(result, Err(Error::InvalidInput(_))));
    assert_eq!(count_rows(&env.pool, "speaker").await.unwrap(), 0);
}
