use normalized_cache::{FieldModifiers, FieldSelector, FieldValue, Link, Modified, Store, StoreError};
use serde_json::{json, Value};

fn entity_fields(extra: &[&str]) -> Vec<FieldSelector> {
    let mut fields = vec![
        FieldSelector::scalar("__typename"),
        FieldSelector::scalar("id"),
    ];
    fields.extend(extra.iter().map(|name| FieldSelector::scalar(*name)));
    fields
}

fn books_selection(args: &Value) -> Vec<FieldSelector> {
    vec![FieldSelector::object_args(
        "books",
        args,
        entity_fields(&["title"])
    )]
}

#[test]
fn normalize_then_resolve_round_trips_nested_graphs() {
    let store = Store::new();
    let selection = vec![FieldSelector::object(
        "author",
        vec![
            FieldSelector::scalar("__typename"),
            FieldSelector::scalar("id"),
            FieldSelector::scalar("name"),
            FieldSelector::object(
                "books",
                vec![
                    FieldSelector::scalar("__typename"),
                    FieldSelector::scalar("id"),
                    FieldSelector::scalar("title"),
                    FieldSelector::object("reviews", entity_fields(&["rating"]))
                ]
            )
        ]
    )];
    let payload = json!({
        "author": {
            "__typename": "Author",
            "id": "a1",
            "name": "N",
            "books": [
                {
                    "__typename": "Book",
                    "id": "b1",
                    "title": "One",
                    "reviews": [
                        { "__typename": "Review", "id": "r1", "rating": 5 },
                        null
                    ]
                },
                {
                    "__typename": "Book",
                    "id": "b2",
                    "title": "Two",
                    "reviews": []
                }
            ]
        }
    });

    store.write_query("Query", &selection, &payload).unwrap();
    assert_eq!(store.read_query("Query", &selection).unwrap(), payload);
}

#[test]
fn writes_with_disjoint_field_sets_union_into_one_record() {
    let store = Store::new();
    let title_selection = vec![FieldSelector::object("book", entity_fields(&["title"]))];
    let year_selection = vec![FieldSelector::object("book", entity_fields(&["year"]))];

    store
        .write_query(
            "Query",
            &title_selection,
            &json!({ "book": { "__typename": "Book", "id": "1", "title": "X" } })
        )
        .unwrap();
    store
        .write_query(
            "Query",
            &year_selection,
            &json!({ "book": { "__typename": "Book", "id": "1", "year": 1978 } })
        )
        .unwrap();

    let both = vec![FieldSelector::object(
        "book",
        entity_fields(&["title", "year"])
    )];
    assert_eq!(
        store.read_query("Query", &both).unwrap(),
        json!({ "book": { "__typename": "Book", "id": "1", "title": "X", "year": 1978 } })
    );
}

#[test]
fn distinct_argument_sets_never_collide() {
    let store = Store::new();
    let fiction = json!({ "filter": { "category": "FICTION" } });
    let biography = json!({ "filter": { "category": "BIOGRAPHY" } });

    store
        .write_query(
            "Query",
            &books_selection(&fiction),
            &json!({ "books": [{ "__typename": "Book", "id": "abc", "title": "X" }] })
        )
        .unwrap();
    store
        .write_query(
            "Query",
            &books_selection(&biography),
            &json!({ "books": [{ "__typename": "Book", "id": "bio", "title": "A Life" }] })
        )
        .unwrap();

    let fiction_read = store.read_query("Query", &books_selection(&fiction)).unwrap();
    assert_eq!(fiction_read["books"][0]["id"], json!("abc"));
    let biography_read = store
        .read_query("Query", &books_selection(&biography))
        .unwrap();
    assert_eq!(biography_read["books"][0]["id"], json!("bio"));
}

#[test]
fn modifying_one_argument_variant_leaves_the_other_untouched() {
    let store = Store::new();
    let fiction = json!({ "filter": { "category": "FICTION" } });
    let biography = json!({ "filter": { "category": "BIOGRAPHY" } });
    store
        .write_query(
            "Query",
            &books_selection(&fiction),
            &json!({ "books": [{ "__typename": "Book", "id": "abc", "title": "X" }] })
        )
        .unwrap();
    store
        .write_query(
            "Query",
            &books_selection(&biography),
            &json!({ "books": [{ "__typename": "Book", "id": "bio", "title": "A Life" }] })
        )
        .unwrap();

    // Clear only the BIOGRAPHY list by inspecting the variant's own args.
    store.modify(
        "Query",
        FieldModifiers::new().field("books", |current, helpers| {
            let targets_biography = helpers.args().map_or(false, |args| {
                args["filter"]["category"] == json!("BIOGRAPHY")
            });
            if targets_biography {
                Modified::Value(FieldValue::Link(Link::List(vec![])))
            } else {
                Modified::Value(current)
            }
        })
    );

    let fiction_read = store.read_query("Query", &books_selection(&fiction)).unwrap();
    assert_eq!(fiction_read["books"][0]["id"], json!("abc"));
    let biography_read = store
        .read_query("Query", &books_selection(&biography))
        .unwrap();
    assert_eq!(biography_read["books"], json!([]));
}

#[test]
fn gc_spares_entities_reachable_through_an_alternate_path() {
    let store = Store::new();
    // root -> a -> b, and root -> b directly.
    let selection = vec![
        FieldSelector::object(
            "a",
            vec![
                FieldSelector::scalar("__typename"),
                FieldSelector::scalar("id"),
                FieldSelector::object("b", entity_fields(&[])),
            ]
        ),
        FieldSelector::object("b", entity_fields(&[])),
    ];
    store
        .write_query(
            "Query",
            &selection,
            &json!({
                "a": {
                    "__typename": "Node", "id": "a",
                    "b": { "__typename": "Node", "id": "b" }
                },
                "b": { "__typename": "Node", "id": "b" }
            })
        )
        .unwrap();

    // Drop the root's reference to a; b stays reachable directly.
    assert!(store.evict("Query", Some("a")));
    assert_eq!(store.gc(), vec!["Node:a".to_string()]);

    let b_only = vec![FieldSelector::object("b", entity_fields(&[]))];
    let read = store.read_query("Query", &b_only).unwrap();
    assert_eq!(read["b"]["id"], json!("b"));
}

#[test]
fn evicting_an_entity_leaves_a_dangling_reference_until_collected() {
    let store = Store::new();
    let selection = vec![FieldSelector::object("book", entity_fields(&["title"]))];
    store
        .write_query(
            "Query",
            &selection,
            &json!({ "book": { "__typename": "Book", "id": "1", "title": "X" } })
        )
        .unwrap();

    assert!(store.evict("Book:1", None));
    assert_eq!(
        store.read_query("Query", &selection),
        Err(StoreError::DanglingReference {
            key: "Book:1".to_string()
        })
    );

    // The evicted entity is already gone; gc has nothing left to reclaim.
    assert!(store.gc().is_empty());
}

#[test]
fn orphaned_cycles_are_collected_together() {
    let store = Store::new();
    let partner = |sub: Vec<FieldSelector>| {
        vec![
            FieldSelector::scalar("__typename"),
            FieldSelector::scalar("id"),
            FieldSelector::object("partner", sub),
        ]
    };

    // a.partner -> b, then b.partner -> a: a two-entity cycle.
    store
        .write_query(
            "Query",
            &vec![FieldSelector::object("a", partner(entity_fields(&[])))],
            &json!({ "a": {
                "__typename": "Node", "id": "a",
                "partner": { "__typename": "Node", "id": "b" }
            }})
        )
        .unwrap();
    store
        .write_query(
            "Query",
            &vec![FieldSelector::object("b", partner(entity_fields(&[])))],
            &json!({ "b": {
                "__typename": "Node", "id": "b",
                "partner": { "__typename": "Node", "id": "a" }
            }})
        )
        .unwrap();

    // Still rooted: nothing to collect.
    assert!(store.gc().is_empty());

    // Cut both root fields; the cycle keeps referencing itself but is
    // unreachable from any root now.
    store.evict("Query", Some("a"));
    store.evict("Query", Some("b"));
    assert_eq!(
        store.gc(),
        vec!["Node:a".to_string(), "Node:b".to_string()]
    );
}

#[test]
fn identify_is_deterministic_and_order_independent() {
    let store = Store::new();
    assert_eq!(
        store.identify(&json!({ "__typename": "Book", "id": "abc" })),
        Some("Book:abc".to_string())
    );
    assert_eq!(
        store.identify(&json!({ "id": "abc", "__typename": "Book" })),
        Some("Book:abc".to_string())
    );
    assert_eq!(store.identify(&json!({ "__typename": "Book" })), None);
}

#[test]
fn missing_fields_are_distinct_from_cached_nulls() {
    let store = Store::new();
    let write_selection = vec![FieldSelector::object(
        "book",
        entity_fields(&["subtitle"])
    )];
    store
        .write_query(
            "Query",
            &write_selection,
            &json!({ "book": { "__typename": "Book", "id": "1", "subtitle": null } })
        )
        .unwrap();

    let null_read = store.read_query("Query", &write_selection).unwrap();
    assert_eq!(null_read["book"]["subtitle"], json!(null));

    let missing_selection = vec![FieldSelector::object("book", entity_fields(&["title"]))];
    let err = store.read_query("Query", &missing_selection).unwrap_err();
    assert!(err.is_missing());
}

#[test]
fn extract_produces_the_flat_ref_marker_snapshot() {
    let store = Store::new();
    let fiction = json!({ "filter": { "category": "FICTION" } });
    store
        .write_query(
            "Query",
            &books_selection(&fiction),
            &json!({ "books": [{ "__typename": "Book", "id": "abc", "title": "X" }] })
        )
        .unwrap();

    assert_eq!(
        store.extract(),
        json!({
            "Book:abc": { "__typename": "Book", "id": "abc", "title": "X" },
            "Query": {
                r#"books({"filter":{"category":"FICTION"}})"#: [{ "ref": "Book:abc" }]
            }
        })
    );
}

#[test]
fn restore_reproduces_a_store_from_its_snapshot() {
    let store = Store::new();
    let fiction = json!({ "filter": { "category": "FICTION" } });
    store
        .write_query(
            "Query",
            &books_selection(&fiction),
            &json!({ "books": [{ "__typename": "Book", "id": "abc", "title": "X" }] })
        )
        .unwrap();

    let replica = Store::new();
    replica.restore(&store.extract()).unwrap();
    assert_eq!(
        replica.read_query("Query", &books_selection(&fiction)).unwrap(),
        store.read_query("Query", &books_selection(&fiction)).unwrap()
    );
    assert_eq!(replica.extract(), store.extract());

    assert_eq!(
        replica.restore(&json!("not a snapshot")),
        Err(StoreError::MalformedSnapshot {
            reason: "top level must be an object mapping entity keys to records".to_string()
        })
    );
}

#[test]
fn ambiguous_keys_fail_the_write_and_leave_the_store_untouched() {
    let store = Store::new();
    let selection = vec![
        FieldSelector::object("a", entity_fields(&[])),
        FieldSelector::object("b", entity_fields(&[])),
    ];
    let err = store
        .write_query(
            "Query",
            &selection,
            &json!({
                "a": { "__typename": "A:B", "id": "1" },
                "b": { "__typename": "A", "id": "B:1" }
            })
        )
        .unwrap_err();
    assert!(matches!(err, StoreError::AmbiguousKey { .. }));
    assert_eq!(store.extract(), json!({}));
}

#[test]
fn later_writes_win_per_field() {
    let store = Store::new();
    let selection = vec![FieldSelector::object("book", entity_fields(&["title"]))];
    store
        .write_query(
            "Query",
            &selection,
            &json!({ "book": { "__typename": "Book", "id": "1", "title": "Old" } })
        )
        .unwrap();
    store
        .write_query(
            "Query",
            &selection,
            &json!({ "book": { "__typename": "Book", "id": "1", "title": "New" } })
        )
        .unwrap();

    let read = store.read_query("Query", &selection).unwrap();
    assert_eq!(read["book"]["title"], json!("New"));
}

#[test]
fn write_query_reports_the_entities_it_touched() {
    let store = Store::new();
    let selection = vec![FieldSelector::object(
        "author",
        vec![
            FieldSelector::scalar("__typename"),
            FieldSelector::scalar("id"),
            FieldSelector::object("books", entity_fields(&[])),
        ]
    )];
    let touched = store
        .write_query(
            "Query",
            &selection,
            &json!({ "author": {
                "__typename": "Author", "id": "a1",
                "books": [{ "__typename": "Book", "id": "b1" }]
            }})
        )
        .unwrap();

    assert!(touched.contains("Author:a1"));
    assert!(touched.contains("Book:b1"));
    assert!(!touched.contains("Query"));
}
