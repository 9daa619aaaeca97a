//! End-to-end engine scenarios.

use marrow_bson::{doc, Doc, Document, Value};
use marrow_core::{Engine, EngineError, FileStore, Handle, MemoryStore, ID_INDEX};
use std::sync::Arc;

fn engine() -> (Engine, MemoryStore) {
    let store = MemoryStore::new();
    let engine = Engine::new(store.clone()).unwrap();
    (engine, store)
}

fn coll() -> Handle {
    Handle::new("db", "coll")
}

fn ids(list: &[Doc]) -> Vec<Value> {
    list.iter().map(|doc| doc.get("_id")).collect()
}

#[test]
fn unordered_insert_with_one_duplicate() {
    let (engine, _) = engine();

    let docs: Vec<Doc> = vec![
        Arc::new(doc! { "_id" => 1, "a" => 1 }),
        Arc::new(doc! { "_id" => 1, "b" => 2 }),
        Arc::new(doc! { "_id" => 2, "a" => 3 }),
    ];
    let result = engine.insert(&coll(), &docs, false).unwrap();

    assert_eq!(ids(&result.modified), vec![Value::Int32(1), Value::Int32(2)]);
    assert_eq!(result.modified[0].get("a"), Value::Int32(1));
    assert_eq!(result.errors.len(), 1);
    assert!(matches!(
        result.errors[0],
        EngineError::DuplicateForIndex { .. }
    ));
    assert_eq!(engine.num_documents(&coll()), 2);
}

#[test]
fn ordered_insert_aborts_at_first_duplicate() {
    let (engine, _) = engine();

    let docs: Vec<Doc> = vec![
        Arc::new(doc! { "_id" => 1 }),
        Arc::new(doc! { "_id" => 1 }),
        Arc::new(doc! { "_id" => 2 }),
    ];
    let result = engine.insert(&coll(), &docs, true).unwrap();

    assert_eq!(result.modified.len(), 1);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(engine.num_documents(&coll()), 1);
}

#[test]
fn unique_index_rejects_second_insert() {
    let (engine, _) = engine();

    engine
        .create_index(&coll(), &doc! { "a" => 1 }, None, true, None)
        .unwrap();

    engine
        .insert(&coll(), &[Arc::new(doc! { "_id" => 1, "a" => 5 })], true)
        .unwrap();
    let result = engine
        .insert(&coll(), &[Arc::new(doc! { "_id" => 2, "a" => 5 })], true)
        .unwrap();

    assert!(result.modified.is_empty());
    assert_eq!(result.errors.len(), 1);
    assert!(matches!(
        result.errors[0],
        EngineError::DuplicateForIndex { .. }
    ));
    assert_eq!(engine.num_documents(&coll()), 1);
}

#[test]
fn rejected_insert_leaves_no_partial_index_entries() {
    let (engine, _) = engine();

    engine
        .create_index(&coll(), &doc! { "a" => 1 }, Some("a_unique"), true, None)
        .unwrap();
    engine
        .insert(&coll(), &[Arc::new(doc! { "_id" => 1, "a" => 5 })], true)
        .unwrap();

    // Rejected by the unique index on "a"; its _id_ entry must be rolled
    // back, so inserting the same _id with a different "a" succeeds.
    let rejected = engine
        .insert(&coll(), &[Arc::new(doc! { "_id" => 2, "a" => 5 })], true)
        .unwrap();
    assert_eq!(rejected.errors.len(), 1);

    let result = engine
        .insert(&coll(), &[Arc::new(doc! { "_id" => 2, "a" => 6 })], true)
        .unwrap();
    assert_eq!(result.modified.len(), 1);
    assert_eq!(engine.num_documents(&coll()), 2);
}

#[test]
fn upsert_via_update() {
    let (engine, _) = engine();

    let result = engine
        .update(
            &coll(),
            &doc! { "a" => 7 },
            None,
            &doc! { "$set" => doc! { "b" => 8 } },
            0,
            true,
        )
        .unwrap();

    let upserted = result.upserted.expect("upserted document");
    assert_eq!(upserted.get("a"), Value::Int32(7));
    assert_eq!(upserted.get("b"), Value::Int32(8));
    assert!(upserted.get("_id").as_object_id().is_some());
    assert_eq!(engine.num_documents(&coll()), 1);

    // The published document is findable by its skeleton fields.
    let found = engine.find(&coll(), &doc! { "a" => 7 }, None, 0, 0).unwrap();
    assert_eq!(found.matched.len(), 1);
}

#[test]
fn upsert_via_replace_carries_query_id() {
    let (engine, _) = engine();

    let result = engine
        .replace(
            &coll(),
            &doc! { "_id" => 42 },
            None,
            &doc! { "x" => 1 },
            true,
        )
        .unwrap();

    let upserted = result.upserted.expect("upserted document");
    assert_eq!(upserted.get("_id"), Value::Int32(42));
    assert_eq!(upserted.get("x"), Value::Int32(1));
}

#[test]
fn upsert_rejects_mismatched_ids() {
    let (engine, store) = engine();

    let result = engine.replace(
        &coll(),
        &doc! { "_id" => 1 },
        None,
        &doc! { "_id" => 2, "x" => 1 },
        true,
    );
    assert!(matches!(result, Err(EngineError::MismatchedIds)));
    assert_eq!(store.store_count(), 0);
}

#[test]
fn replace_preserves_position() {
    let (engine, _) = engine();

    let docs: Vec<Doc> = (1..=3).map(|n| Arc::new(doc! { "_id" => n })).collect();
    engine.insert(&coll(), &docs, true).unwrap();

    engine
        .replace(
            &coll(),
            &doc! { "_id" => 2 },
            None,
            &doc! { "_id" => 2, "x" => 9 },
            false,
        )
        .unwrap();

    let found = engine
        .find(&coll(), &Document::new(), Some(&doc! { "_id" => 1 }), 0, 0)
        .unwrap();
    assert_eq!(
        ids(&found.matched),
        vec![Value::Int32(1), Value::Int32(2), Value::Int32(3)]
    );
    assert_eq!(found.matched[1].get("x"), Value::Int32(9));

    // Position is also preserved in plain insertion order.
    let unsorted = engine.find(&coll(), &Document::new(), None, 0, 0).unwrap();
    assert_eq!(
        ids(&unsorted.matched),
        vec![Value::Int32(1), Value::Int32(2), Value::Int32(3)]
    );
}

#[test]
fn drop_database_drops_all_its_namespaces() {
    let (engine, _) = engine();

    for (db, c) in [("d1", "c1"), ("d1", "c2"), ("d2", "c1")] {
        engine
            .insert(&Handle::new(db, c), &[Arc::new(doc! { "_id" => 1 })], true)
            .unwrap();
    }

    engine.drop_namespace(&Handle::database("d1")).unwrap();

    assert_eq!(engine.num_documents(&Handle::new("d1", "c1")), 0);
    assert_eq!(engine.num_documents(&Handle::new("d1", "c2")), 0);
    assert_eq!(engine.num_documents(&Handle::new("d2", "c1")), 1);
    assert!(engine.list_databases(&Document::new()).unwrap().len() == 1);
}

#[test]
fn drop_single_collection() {
    let (engine, _) = engine();

    engine
        .insert(&Handle::new("d1", "c1"), &[Arc::new(doc! { "_id" => 1 })], true)
        .unwrap();
    engine
        .insert(&Handle::new("d1", "c2"), &[Arc::new(doc! { "_id" => 1 })], true)
        .unwrap();

    engine.drop_namespace(&Handle::new("d1", "c1")).unwrap();

    assert_eq!(engine.num_documents(&Handle::new("d1", "c1")), 0);
    assert_eq!(engine.num_documents(&Handle::new("d1", "c2")), 1);
}

#[test]
fn list_indexes_is_sorted_by_name() {
    let (engine, _) = engine();

    engine
        .create_index(&coll(), &doc! { "z" => 1 }, Some("zeta"), false, None)
        .unwrap();
    engine
        .create_index(&coll(), &doc! { "a" => 1 }, Some("alpha"), false, None)
        .unwrap();

    let list = engine.list_indexes(&coll()).unwrap();
    let names: Vec<_> = list.iter().map(|spec| spec.get("name")).collect();
    assert_eq!(
        names,
        vec![
            Value::from(ID_INDEX),
            Value::from("alpha"),
            Value::from("zeta"),
        ]
    );

    // Unique is only reported for explicitly unique indexes.
    assert_eq!(list[0].get("unique"), Value::Missing);
    assert_eq!(list[0].get("v"), Value::Int32(2));
    assert_eq!(list[0].get("ns"), Value::from("db.coll"));
}

#[test]
fn long_lived_readers_observe_stable_snapshots() {
    let (engine, _) = engine();

    let docs: Vec<Doc> = (1..=3)
        .map(|n| Arc::new(doc! { "_id" => n, "n" => n }))
        .collect();
    engine.insert(&coll(), &docs, true).unwrap();

    // A reader takes a result before a series of mutations.
    let before = engine.find(&coll(), &Document::new(), None, 0, 0).unwrap();
    assert_eq!(before.matched.len(), 3);

    engine
        .update(
            &coll(),
            &doc! { "_id" => 2 },
            None,
            &doc! { "$set" => doc! { "n" => 99 } },
            0,
            false,
        )
        .unwrap();
    engine.delete(&coll(), &doc! { "_id" => 3 }, None, 0).unwrap();

    // The previously read documents are unchanged.
    assert_eq!(before.matched[1].get("n"), Value::Int32(2));
    assert_eq!(before.matched[2].get("n"), Value::Int32(3));

    let after = engine.find(&coll(), &Document::new(), None, 0, 0).unwrap();
    assert_eq!(after.matched.len(), 2);
}

#[test]
fn update_keeps_ids_of_matched_documents() {
    let (engine, _) = engine();

    let docs: Vec<Doc> = (1..=3)
        .map(|n| Arc::new(doc! { "_id" => n, "n" => n }))
        .collect();
    engine.insert(&coll(), &docs, true).unwrap();

    let result = engine
        .update(
            &coll(),
            &Document::new(),
            None,
            &doc! { "$inc" => doc! { "n" => 1 } },
            0,
            false,
        )
        .unwrap();

    assert_eq!(ids(&result.matched), ids(&result.modified));
}

#[test]
fn store_calls_match_publishing_mutations() {
    let (engine, store) = engine();

    engine
        .insert(&coll(), &[Arc::new(doc! { "_id" => 1 })], true)
        .unwrap();
    engine
        .update(
            &coll(),
            &doc! { "_id" => 1 },
            None,
            &doc! { "$set" => doc! { "a" => 1 } },
            0,
            false,
        )
        .unwrap();
    engine.delete(&coll(), &doc! { "_id" => 1 }, None, 0).unwrap();
    assert_eq!(store.store_count(), 3);

    // Reads and empty mutations do not publish.
    engine.find(&coll(), &Document::new(), None, 0, 0).unwrap();
    engine
        .insert(&coll(), &[], true)
        .unwrap();
    engine.delete(&coll(), &doc! { "_id" => 9 }, None, 0).unwrap();
    assert_eq!(store.store_count(), 3);
}

#[test]
fn unique_index_violation_aborts_whole_update() {
    let (engine, _) = engine();

    engine
        .create_index(&coll(), &doc! { "a" => 1 }, None, true, None)
        .unwrap();
    let docs: Vec<Doc> = vec![
        Arc::new(doc! { "_id" => 1, "a" => 1 }),
        Arc::new(doc! { "_id" => 2, "a" => 2 }),
    ];
    engine.insert(&coll(), &docs, true).unwrap();

    // Setting both documents to the same "a" must fail and change nothing.
    let result = engine.update(
        &coll(),
        &Document::new(),
        None,
        &doc! { "$set" => doc! { "a" => 5 } },
        0,
        false,
    );
    assert!(matches!(result, Err(EngineError::DuplicateForIndex { .. })));

    let found = engine
        .find(&coll(), &doc! { "a" => doc! { "$in" => vec![Value::Int32(1), Value::Int32(2)] } }, None, 0, 0)
        .unwrap();
    assert_eq!(found.matched.len(), 2);
}

#[test]
fn partial_index_only_constrains_matching_documents() {
    let (engine, _) = engine();

    // Unique on "a", but only for documents where flagged is true.
    engine
        .create_index(
            &coll(),
            &doc! { "a" => 1 },
            Some("partial_a"),
            true,
            Some(&doc! { "flagged" => true }),
        )
        .unwrap();

    let docs: Vec<Doc> = vec![
        Arc::new(doc! { "_id" => 1, "a" => 5, "flagged" => true }),
        Arc::new(doc! { "_id" => 2, "a" => 5, "flagged" => false }),
        Arc::new(doc! { "_id" => 3, "a" => 5, "flagged" => false }),
    ];
    let result = engine.insert(&coll(), &docs, false).unwrap();
    assert_eq!(result.modified.len(), 3);

    // A second flagged document with the same key is rejected.
    let rejected = engine
        .insert(
            &coll(),
            &[Arc::new(doc! { "_id" => 4, "a" => 5, "flagged" => true })],
            false,
        )
        .unwrap();
    assert_eq!(rejected.errors.len(), 1);
    assert_eq!(engine.num_documents(&coll()), 3);
}

#[test]
fn concurrent_operations_serialize() {
    let (engine, _) = engine();
    let engine = Arc::new(engine);

    std::thread::scope(|scope| {
        for worker in 0..4 {
            let engine = Arc::clone(&engine);
            scope.spawn(move || {
                let handle = Handle::new("db", format!("c{}", worker % 2));
                for n in 0..25 {
                    let doc = Arc::new(doc! { "worker" => worker, "n" => n });
                    engine.insert(&handle, &[doc], true).unwrap();
                    engine
                        .find(&handle, &doc! { "worker" => worker }, None, 0, 0)
                        .unwrap();
                }
            });
        }
    });

    let total = engine.num_documents(&Handle::new("db", "c0"))
        + engine.num_documents(&Handle::new("db", "c1"));
    assert_eq!(total, 100);
}

#[test]
fn file_store_persists_across_engines() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("snapshot.json");

    {
        let engine = Engine::new(FileStore::new(&path)).unwrap();
        engine
            .create_index(&coll(), &doc! { "a" => 1 }, Some("a_1"), true, None)
            .unwrap();
        let docs: Vec<Doc> = (1..=3)
            .map(|n| Arc::new(doc! { "_id" => n, "a" => n * 10 }))
            .collect();
        engine.insert(&coll(), &docs, true).unwrap();
    }

    let engine = Engine::new(FileStore::new(&path)).unwrap();
    assert_eq!(engine.num_documents(&coll()), 3);

    // The rebuilt unique index still rejects duplicates.
    let result = engine
        .insert(&coll(), &[Arc::new(doc! { "_id" => 4, "a" => 10 })], true)
        .unwrap();
    assert_eq!(result.errors.len(), 1);

    // The rebuilt documents are fully queryable.
    let found = engine
        .find(&coll(), &doc! { "a" => doc! { "$gte" => 20 } }, None, 0, 0)
        .unwrap();
    assert_eq!(found.matched.len(), 2);
}
