//! End-to-end tests for grouped properties.

use std::sync::Arc;

use pretty_assertions::assert_eq;

use graph_props::*;

fn graph() -> Graph<MemoryBackend> {
    let schema = SchemaRegistry::builder()
        .entity(TypeDef::new("Person").key(PropertyKey::string("name")).key(PropertyKey::group(
            "address",
            [PropertyKey::string("city"), PropertyKey::int("zip"), PropertyKey::string("street").db_name("line1")],
        )))
        .build()
        .unwrap();
    Graph::new(MemoryBackend::new(), Arc::new(schema))
}

async fn fields(graph: &Graph<MemoryBackend>, entity: &GraphObject) -> FieldMap {
    let backend = graph.backend();
    let tx = backend.begin_tx(TxMode::ReadOnly).await.unwrap();
    let node = backend.get_node(&tx, entity.node_id().unwrap()).await.unwrap().unwrap();
    backend.commit_tx(tx).await.unwrap();
    node.fields
}

#[tokio::test]
async fn test_empty_group_reads_as_null() {
    let graph = graph();
    let p = graph.create_node("Person", PropertyMap::new()).await.unwrap();

    assert_eq!(graph.get(&p, "address").await.unwrap(), Value::Null);

    graph.set(&p, "address", Value::Map(Default::default())).await.unwrap();
    assert_eq!(graph.get(&p, "address").await.unwrap(), Value::Null);

    let stored = fields(&graph, &p).await;
    assert_eq!(stored.get("address.null"), Some(&Value::Bool(true)));
    assert!(!stored.contains_key("address.city"));
}

#[tokio::test]
async fn test_non_empty_group_round_trips() {
    let graph = graph();
    let p = graph.create_node("Person", PropertyMap::new()).await.unwrap();

    graph.set(&p, "address", Value::map([("city", "Berlin")])).await.unwrap();
    assert_eq!(graph.get(&p, "address").await.unwrap(), Value::map([("city", "Berlin")]));

    graph
        .set(&p, "address", Value::map([("city", Value::from("Paris")), ("street", Value::from("Rue 1"))]))
        .await
        .unwrap();
    let stored = fields(&graph, &p).await;
    assert_eq!(stored.get("address.null"), Some(&Value::Bool(false)));
    assert_eq!(stored.get("address.city"), Some(&Value::from("Paris")));
    assert_eq!(stored.get("address.line1"), Some(&Value::from("Rue 1")));

    let key = graph.key(&p, "address").unwrap();
    let map = key.group_property().unwrap().get_map(&graph, &p).await.unwrap().unwrap();
    assert_eq!(map.len(), 3);
    assert_eq!(map.get_by_name("zip"), Some(&Value::Null));
    assert_eq!(map.get_by_name("street"), Some(&Value::from("Rue 1")));
}

#[tokio::test]
async fn test_clearing_short_circuits_on_flag() {
    let graph = graph();
    let p = graph.create_node("Person", PropertyMap::new()).await.unwrap();
    graph.set(&p, "address", Value::map([("city", "Berlin")])).await.unwrap();

    graph.set(&p, "address", Value::Null).await.unwrap();
    assert_eq!(graph.get(&p, "address").await.unwrap(), Value::Null);
    // Members are not rewritten; the flag hides them.
    assert_eq!(fields(&graph, &p).await.get("address.city"), Some(&Value::from("Berlin")));
}

#[tokio::test]
async fn test_member_failures_are_skipped() {
    let graph = graph();
    let p = graph.create_node("Person", PropertyMap::new()).await.unwrap();

    graph
        .set(&p, "address", Value::map([("city", Value::from("Berlin")), ("zip", Value::from("ten"))]))
        .await
        .unwrap();

    assert_eq!(graph.get(&p, "address").await.unwrap(), Value::map([("city", "Berlin")]));
    assert!(!fields(&graph, &p).await.contains_key("address.zip"));
}

#[tokio::test]
async fn test_flag_key_is_read_only_and_value_must_be_map() {
    let graph = graph();
    let p = graph.create_node("Person", PropertyMap::new()).await.unwrap();

    let err = graph.set(&p, "address.null", Value::Bool(false)).await.unwrap_err();
    assert!(matches!(err, Error::ReadOnlyViolation { ref key, .. } if key == "address.null"));

    let err = graph.set(&p, "address", Value::from("Berlin")).await.unwrap_err();
    assert!(matches!(err, Error::TypeMismatch { ref expected, .. } if expected == "MAP"));
}

#[tokio::test]
async fn test_group_in_created_node_and_stored_conversion() {
    let graph = graph();
    let address = graph.schema().key("Person", "address").unwrap();
    let props = PropertyMap::new().with(&address, Value::map([("city", Value::from("Oslo")), ("zip", Value::Int(150))]));
    let p = graph.create_node("Person", props).await.unwrap();

    assert_eq!(
        graph.get(&p, "address").await.unwrap(),
        Value::map([("city", Value::from("Oslo")), ("zip", Value::Int(150))])
    );

    let stored = fields(&graph, &p).await;
    match PropertyMap::stored_to_canonical(&graph, "Person", &stored).unwrap() {
        Converted::Typed(map) => {
            assert_eq!(map.get(&address), Some(&Value::map([("city", Value::from("Oslo")), ("zip", Value::Int(150))])));
            assert_eq!(map.get_by_name("name"), Some(&Value::Null));
        }
        Converted::Untyped(_) => panic!("Person is registered"),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_group_access_runs_on_spawned_tasks() {
    let graph = Arc::new(graph());
    let p = graph.create_node("Person", PropertyMap::new()).await.unwrap();

    let writer = {
        let (graph, p) = (graph.clone(), p.clone());
        tokio::spawn(async move { graph.set(&p, "address", Value::map([("city", "Rome")])).await })
    };
    writer.await.unwrap().unwrap();

    let reader = {
        let (graph, p) = (graph.clone(), p.clone());
        tokio::spawn(async move { graph.get(&p, "address").await })
    };
    assert_eq!(reader.await.unwrap().unwrap(), Value::map([("city", "Rome")]));
}
