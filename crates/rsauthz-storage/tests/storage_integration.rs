//! Storage Integration Tests.
//!
//! Exercises the DataStore contract through the trait object so any backend
//! can be run through the same helpers.

use std::sync::Arc;

use chrono::Utc;
use rsauthz_storage::{
    DataStore, MemoryDataStore, StoredAttribute, StoredSchema, StoredTuple, TupleFilter,
};
use serde_json::json;

fn tuple(entity_id: &str, relation: &str, subject_id: &str) -> StoredTuple {
    StoredTuple {
        entity_type: "document".to_string(),
        entity_id: entity_id.to_string(),
        relation: relation.to_string(),
        subject_type: "user".to_string(),
        subject_id: subject_id.to_string(),
        subject_relation: None,
    }
}

/// Helper function to run a round of writes and reads against any DataStore.
async fn run_basic_crud_test(store: Arc<dyn DataStore>, tenant_id: &str) {
    store
        .write_schema(StoredSchema {
            tenant_id: tenant_id.to_string(),
            version: "01HV0000000000000000000000".to_string(),
            dsl: "entity user {}".to_string(),
            created_at: Utc::now(),
        })
        .await
        .unwrap();
    let latest = store.get_latest_schema(tenant_id).await.unwrap();
    assert_eq!(latest.dsl, "entity user {}");

    store
        .write_tuples(
            tenant_id,
            vec![tuple("doc1", "viewer", "alice"), tuple("doc1", "owner", "bob")],
        )
        .await
        .unwrap();

    let filter = TupleFilter {
        entity_type: Some("document".to_string()),
        entity_id: Some("doc1".to_string()),
        relation: Some("viewer".to_string()),
        ..Default::default()
    };
    let viewers = store.read_tuples(tenant_id, &filter).await.unwrap();
    assert_eq!(viewers, vec![tuple("doc1", "viewer", "alice")]);

    store
        .write_attributes(
            tenant_id,
            vec![StoredAttribute {
                entity_type: "document".to_string(),
                entity_id: "doc1".to_string(),
                name: "tags".to_string(),
                value: json!(["a", "b"]),
            }],
        )
        .await
        .unwrap();
    let attributes = store
        .read_attributes(tenant_id, "document", "doc1")
        .await
        .unwrap();
    assert_eq!(attributes[0].value, json!(["a", "b"]));

    let removed = store.delete_tuples(tenant_id, &filter).await.unwrap();
    assert_eq!(removed, 1);
}

#[tokio::test]
async fn test_memory_store_basic_crud() {
    run_basic_crud_test(MemoryDataStore::new_shared(), "integration-memory").await;
}

#[tokio::test]
async fn test_concurrent_tuple_writes() {
    let store = MemoryDataStore::new_shared();
    let handles: Vec<_> = (0..16)
        .map(|i| {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                store
                    .write_tuples("t1", vec![tuple(&format!("doc{i}"), "viewer", "alice")])
                    .await
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let all = store
        .read_tuples("t1", &TupleFilter::default())
        .await
        .unwrap();
    assert_eq!(all.len(), 16);
}
