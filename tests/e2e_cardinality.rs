//! End-to-end tests for relation-backed properties.
//!
//! Each test builds an isolated schema over a fresh MemoryBackend and checks
//! the cardinality rules from the outside: what `get` returns and which edges
//! are left in storage.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use pretty_assertions::assert_eq;

use graph_props::notion::PropertyNotion;
use graph_props::storage::memory::MemoryTx;
use graph_props::*;

fn schema() -> SchemaRegistry {
    SchemaRegistry::builder()
        .entity(
            TypeDef::new("Person")
                .key(PropertyKey::string("name"))
                .key(PropertyKey::entity(
                    "passport",
                    RelationDescriptor::new("Person", "HAS_PASSPORT", "Passport", Cardinality::OneToOne)
                        .with_cascade(Cascade::SourceToTarget),
                ))
                .key(PropertyKey::entity(
                    "employer",
                    RelationDescriptor::new("Person", "WORKS_AT", "Company", Cardinality::ManyToOne),
                ))
                .key(PropertyKey::collection(
                    "friends",
                    RelationDescriptor::new("Person", "KNOWS", "Person", Cardinality::ManyToMany),
                ))
                .key(PropertyKey::collection(
                    "pets",
                    RelationDescriptor::new("Person", "OWNS", "Animal", Cardinality::OneToMany),
                ))
                .key(PropertyKey::collection(
                    "gadgets",
                    RelationDescriptor::new("Person", "OWNS", "Robot", Cardinality::OneToMany),
                )),
        )
        .entity(TypeDef::new("Passport").key(PropertyKey::string("number")).key(PropertyKey::entity(
            "holder",
            RelationDescriptor::new("Passport", "HAS_PASSPORT", "Person", Cardinality::OneToOne).incoming(),
        )))
        .entity(TypeDef::new("Company").key(PropertyKey::string("name")).key(
            PropertyKey::collection(
                "employees",
                RelationDescriptor::new("Company", "WORKS_AT", "Person", Cardinality::ManyToOne).incoming(),
            )
            .notion(PropertyNotion::new("name")),
        ))
        .entity(TypeDef::new("Animal"))
        .entity(TypeDef::new("Dog").extends("Animal"))
        .entity(TypeDef::new("Robot"))
        .build()
        .unwrap()
}

fn graph() -> Graph<MemoryBackend> {
    Graph::new(MemoryBackend::new(), Arc::new(schema()))
}

fn id(entity: &GraphObject) -> Value {
    Value::Int(entity.node_id().unwrap().0 as i64)
}

async fn create<B: StorageBackend>(graph: &Graph<B>, type_name: &str) -> GraphObject {
    graph.create_node(type_name, PropertyMap::new()).await.unwrap()
}

async fn named<B: StorageBackend>(graph: &Graph<B>, type_name: &str, name: &str) -> GraphObject {
    let entity = create(graph, type_name).await;
    graph.set(&entity, "name", Value::from(name)).await.unwrap();
    entity
}

async fn edge_count<B: StorageBackend>(graph: &Graph<B>, node: &GraphObject, label: &str) -> usize {
    let backend = graph.backend();
    let tx = backend.begin_tx(TxMode::ReadOnly).await.unwrap();
    let rels = backend
        .get_relationships(&tx, node.node_id().unwrap(), Direction::Both, Some(label))
        .await
        .unwrap();
    backend.commit_tx(tx).await.unwrap();
    rels.len()
}

fn collection(key: &PropertyKey) -> &graph_props::property::CollectionProperty {
    match key.kind() {
        PropertyKind::Collection(c) => c,
        other => panic!("not a collection: {other:?}"),
    }
}

fn ids(value: Value) -> Vec<Value> {
    match value {
        Value::List(mut items) => {
            items.sort_by(|a, b| a.partial_order(b).unwrap());
            items
        }
        other => panic!("expected list, got {other:?}"),
    }
}

// ============================================================================
// 1. OneToOne: reassignment displaces on both sides
// ============================================================================

#[tokio::test]
async fn test_one_to_one_reassignment() {
    let graph = graph();
    let a = create(&graph, "Person").await;
    let b = create(&graph, "Passport").await;
    let c = create(&graph, "Passport").await;

    graph.set(&a, "passport", id(&b)).await.unwrap();
    graph.set(&a, "passport", id(&c)).await.unwrap();

    assert_eq!(graph.get(&a, "passport").await.unwrap(), id(&c));
    assert_eq!(graph.get(&b, "holder").await.unwrap(), Value::Null);
    assert_eq!(graph.get(&c, "holder").await.unwrap(), id(&a));
    assert_eq!(edge_count(&graph, &b, "HAS_PASSPORT").await, 0);
    assert_eq!(edge_count(&graph, &a, "HAS_PASSPORT").await, 1);
}

#[tokio::test]
async fn test_one_to_one_steals_target() {
    let graph = graph();
    let a = create(&graph, "Person").await;
    let d = create(&graph, "Person").await;
    let passport = create(&graph, "Passport").await;

    graph.set(&a, "passport", id(&passport)).await.unwrap();
    // Assigned from the other side of the same relation.
    graph.set(&passport, "holder", id(&d)).await.unwrap();

    assert_eq!(graph.get(&a, "passport").await.unwrap(), Value::Null);
    assert_eq!(graph.get(&d, "passport").await.unwrap(), id(&passport));
    assert_eq!(edge_count(&graph, &passport, "HAS_PASSPORT").await, 1);
}

// ============================================================================
// 2. ManyToOne: one target per source, targets shared
// ============================================================================

#[tokio::test]
async fn test_many_to_one_latest_target_survives() {
    let graph = graph();
    let p1 = named(&graph, "Person", "Ada").await;
    let p2 = named(&graph, "Person", "Grace").await;
    let c1 = named(&graph, "Company", "One").await;
    let c2 = named(&graph, "Company", "Two").await;
    let c3 = named(&graph, "Company", "Three").await;

    for company in [&c1, &c2, &c3] {
        graph.set(&p1, "employer", id(company)).await.unwrap();
    }
    graph.set(&p2, "employer", id(&c3)).await.unwrap();

    assert_eq!(graph.get(&p1, "employer").await.unwrap(), id(&c3));
    assert_eq!(graph.get(&p2, "employer").await.unwrap(), id(&c3));
    assert_eq!(edge_count(&graph, &p1, "WORKS_AT").await, 1);
    assert_eq!(edge_count(&graph, &c1, "WORKS_AT").await, 0);
    assert_eq!(edge_count(&graph, &c2, "WORKS_AT").await, 0);

    let key = graph.key(&c3, "employees").unwrap();
    let names = collection(&key)
        .get_sorted(&key, &graph, &c3, |a, b| a.partial_order(b).unwrap())
        .await
        .unwrap();
    assert_eq!(names, vec![Value::from("Ada"), Value::from("Grace")]);
}

#[tokio::test]
async fn test_entity_set_null_is_idempotent() {
    let graph = graph();
    let p = create(&graph, "Person").await;
    let c = create(&graph, "Company").await;

    graph.set(&p, "employer", Value::Null).await.unwrap();
    graph.set(&p, "employer", id(&c)).await.unwrap();
    graph.set(&p, "employer", id(&c)).await.unwrap();
    assert_eq!(edge_count(&graph, &p, "WORKS_AT").await, 1);

    graph.set(&p, "employer", Value::Null).await.unwrap();
    graph.set(&p, "employer", Value::Null).await.unwrap();
    assert_eq!(graph.get(&p, "employer").await.unwrap(), Value::Null);
    assert_eq!(edge_count(&graph, &c, "WORKS_AT").await, 0);
}

// ============================================================================
// 3. OneToMany: an end node moves between owners
// ============================================================================

#[tokio::test]
async fn test_one_to_many_moves_end_node() {
    let graph = graph();
    let p1 = create(&graph, "Person").await;
    let p2 = create(&graph, "Person").await;
    let dog1 = create(&graph, "Dog").await;
    let dog2 = create(&graph, "Dog").await;

    graph.set(&p1, "pets", Value::List(vec![id(&dog1), id(&dog2)])).await.unwrap();
    assert_eq!(ids(graph.get(&p1, "pets").await.unwrap()), vec![id(&dog1), id(&dog2)]);

    graph.set(&p2, "pets", Value::List(vec![id(&dog1)])).await.unwrap();
    assert_eq!(ids(graph.get(&p1, "pets").await.unwrap()), vec![id(&dog2)]);
    assert_eq!(ids(graph.get(&p2, "pets").await.unwrap()), vec![id(&dog1)]);
}

// ============================================================================
// 4. ManyToMany and collection semantics
// ============================================================================

#[tokio::test]
async fn test_many_to_many_add_and_remove_item() {
    let graph = graph();
    let a = create(&graph, "Person").await;
    let b = create(&graph, "Person").await;
    let c = create(&graph, "Person").await;

    graph.set(&a, "friends", Value::List(vec![id(&b), id(&c)])).await.unwrap();
    graph.set(&b, "friends", Value::List(vec![id(&c)])).await.unwrap();
    assert_eq!(ids(graph.get(&a, "friends").await.unwrap()), vec![id(&b), id(&c)]);
    assert_eq!(edge_count(&graph, &c, "KNOWS").await, 2);

    let key = graph.key(&a, "friends").unwrap();
    let friends = collection(&key);
    assert!(!friends.add(&key, &graph, &a, id(&b)).await.unwrap());
    assert!(friends.remove_item(&key, &graph, &a, id(&b)).await.unwrap());
    assert!(!friends.remove_item(&key, &graph, &a, id(&b)).await.unwrap());

    assert_eq!(ids(graph.get(&a, "friends").await.unwrap()), vec![id(&c)]);
    assert_eq!(ids(graph.get(&b, "friends").await.unwrap()), vec![id(&c)]);
}

#[tokio::test]
async fn test_collection_set_does_not_remove_stale_members() {
    // Assigning a list only links; members missing from the new list stay
    // linked. This pins the current behavior. Whether assignment should
    // replace the whole collection is an open product question.
    let graph = graph();
    let a = create(&graph, "Person").await;
    let b = create(&graph, "Person").await;
    let c = create(&graph, "Person").await;
    let d = create(&graph, "Person").await;

    graph.set(&a, "friends", Value::List(vec![id(&b), id(&c)])).await.unwrap();
    graph.set(&a, "friends", Value::List(vec![id(&d)])).await.unwrap();
    assert_eq!(ids(graph.get(&a, "friends").await.unwrap()), vec![id(&b), id(&c), id(&d)]);

    graph.set(&a, "friends", Value::List(vec![])).await.unwrap();
    assert_eq!(ids(graph.get(&a, "friends").await.unwrap()).len(), 3);

    graph.set(&a, "friends", Value::Null).await.unwrap();
    assert_eq!(graph.get(&a, "friends").await.unwrap(), Value::List(vec![]));
    graph.set(&a, "friends", Value::Null).await.unwrap();
}

#[tokio::test]
async fn test_collection_filters_foreign_types_on_shared_label() {
    let graph = graph();
    let owner = create(&graph, "Person").await;
    let dog = create(&graph, "Dog").await;
    let robot = create(&graph, "Robot").await;

    graph.set(&owner, "pets", Value::List(vec![id(&dog)])).await.unwrap();
    graph.set(&owner, "gadgets", Value::List(vec![id(&robot)])).await.unwrap();

    assert_eq!(edge_count(&graph, &owner, "OWNS").await, 2);
    assert_eq!(graph.get(&owner, "pets").await.unwrap(), Value::List(vec![id(&dog)]));
    assert_eq!(graph.get(&owner, "gadgets").await.unwrap(), Value::List(vec![id(&robot)]));
}

#[tokio::test]
async fn test_collection_rejects_non_list() {
    let graph = graph();
    let a = create(&graph, "Person").await;
    let err = graph.set(&a, "friends", Value::Int(1)).await.unwrap_err();
    assert!(matches!(err, Error::TypeMismatch { ref expected, .. } if expected == "LIST"), "{err}");
}

#[tokio::test]
async fn test_collection_set_with_unknown_item_links_nothing() {
    let graph = graph();
    let a = create(&graph, "Person").await;
    let b = create(&graph, "Person").await;

    let err = graph.set(&a, "friends", Value::List(vec![id(&b), Value::Int(9_999)])).await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)), "{err}");
    assert_eq!(graph.get(&a, "friends").await.unwrap(), Value::List(vec![]));
    assert_eq!(edge_count(&graph, &b, "KNOWS").await, 0);
}

// ============================================================================
// 5. Lookup failures
// ============================================================================

#[tokio::test]
async fn test_lookup_errors() {
    let graph = graph();
    let p = create(&graph, "Person").await;
    let other = create(&graph, "Person").await;

    let err = graph.set(&p, "employer", Value::Int(9_999)).await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)), "{err}");

    let err = graph.set(&p, "employer", id(&other)).await.unwrap_err();
    assert!(matches!(err, Error::TypeMismatch { ref expected, ref got, .. } if expected == "Company" && got == "Person"));

    let err = graph.set(&p, "employer", Value::Bool(true)).await.unwrap_err();
    assert!(matches!(err, Error::TypeMismatch { .. }));
}

#[tokio::test]
async fn test_missing_endpoint_names_side() {
    let graph = graph();
    let p = create(&graph, "Person").await;
    let c = create(&graph, "Company").await;
    let key = graph.key(&p, "employer").unwrap();
    let relation = key.relation().unwrap();

    let err = relation
        .create_relationship(&graph, &key, Some(&p), None, FieldMap::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::MissingEndpoint { side: Endpoint::Target, .. }));
    assert_eq!(err.to_string(), "Target id not found for relationship 'employer' of Person");

    let ghost = GraphObject::node(NodeId(4_242), "Person");
    let err = relation
        .create_relationship(&graph, &key, Some(&ghost), Some(&c), FieldMap::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::MissingEndpoint { side: Endpoint::Source, .. }));
    assert_eq!(edge_count(&graph, &c, "WORKS_AT").await, 0);
}

// ============================================================================
// 6. Atomicity under storage failure
// ============================================================================

/// MemoryBackend that can be told to fail relationship deletes.
#[derive(Clone, Default)]
struct FlakyBackend {
    inner: MemoryBackend,
    fail_deletes: Arc<AtomicBool>,
}

#[async_trait]
impl StorageBackend for FlakyBackend {
    type Tx = MemoryTx;

    async fn shutdown(&self) -> Result<()> {
        self.inner.shutdown().await
    }
    async fn begin_tx(&self, mode: TxMode) -> Result<MemoryTx> {
        self.inner.begin_tx(mode).await
    }
    async fn commit_tx(&self, tx: MemoryTx) -> Result<()> {
        self.inner.commit_tx(tx).await
    }
    async fn rollback_tx(&self, tx: MemoryTx) -> Result<()> {
        self.inner.rollback_tx(tx).await
    }
    async fn create_node(&self, tx: &mut MemoryTx, labels: &[&str], fields: FieldMap) -> Result<NodeId> {
        self.inner.create_node(tx, labels, fields).await
    }
    async fn get_node(&self, tx: &MemoryTx, id: NodeId) -> Result<Option<Node>> {
        self.inner.get_node(tx, id).await
    }
    async fn delete_node(&self, tx: &mut MemoryTx, id: NodeId) -> Result<bool> {
        self.inner.delete_node(tx, id).await
    }
    async fn set_node_field(&self, tx: &mut MemoryTx, id: NodeId, key: &str, val: Value) -> Result<()> {
        self.inner.set_node_field(tx, id, key, val).await
    }
    async fn remove_node_field(&self, tx: &mut MemoryTx, id: NodeId, key: &str) -> Result<()> {
        self.inner.remove_node_field(tx, id, key).await
    }
    async fn create_relationship(
        &self,
        tx: &mut MemoryTx,
        src: NodeId,
        dst: NodeId,
        rel_type: &str,
        fields: FieldMap,
    ) -> Result<RelId> {
        self.inner.create_relationship(tx, src, dst, rel_type, fields).await
    }
    async fn get_relationship(&self, tx: &MemoryTx, id: RelId) -> Result<Option<Relationship>> {
        self.inner.get_relationship(tx, id).await
    }
    async fn delete_relationship(&self, tx: &mut MemoryTx, id: RelId) -> Result<bool> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(Error::StorageError(format!("injected failure deleting {id}")));
        }
        self.inner.delete_relationship(tx, id).await
    }
    async fn set_relationship_field(&self, tx: &mut MemoryTx, id: RelId, key: &str, val: Value) -> Result<()> {
        self.inner.set_relationship_field(tx, id, key, val).await
    }
    async fn remove_relationship_field(&self, tx: &mut MemoryTx, id: RelId, key: &str) -> Result<()> {
        self.inner.remove_relationship_field(tx, id, key).await
    }
    async fn get_relationships(
        &self,
        tx: &MemoryTx,
        node: NodeId,
        dir: Direction,
        rel_type: Option<&str>,
    ) -> Result<Vec<Relationship>> {
        self.inner.get_relationships(tx, node, dir, rel_type).await
    }
    async fn node_count(&self, tx: &MemoryTx) -> Result<u64> {
        self.inner.node_count(tx).await
    }
    async fn relationship_count(&self, tx: &MemoryTx) -> Result<u64> {
        self.inner.relationship_count(tx).await
    }
    async fn nodes_by_label(&self, tx: &MemoryTx, label: &str) -> Result<Vec<Node>> {
        self.inner.nodes_by_label(tx, label).await
    }
    async fn nodes_by_field(&self, tx: &MemoryTx, label: &str, key: &str, value: &Value) -> Result<Vec<Node>> {
        self.inner.nodes_by_field(tx, label, key, value).await
    }
}

#[tokio::test]
async fn test_failed_displacement_rolls_back_new_edge() {
    let backend = FlakyBackend::default();
    let fail = backend.fail_deletes.clone();
    let graph = Graph::new(backend, Arc::new(schema()));

    let p = create(&graph, "Person").await;
    let c1 = create(&graph, "Company").await;
    let c2 = create(&graph, "Company").await;
    graph.set(&p, "employer", id(&c1)).await.unwrap();

    fail.store(true, Ordering::SeqCst);
    let err = graph.set(&p, "employer", id(&c2)).await.unwrap_err();
    assert!(matches!(err, Error::StorageError(_)));
    fail.store(false, Ordering::SeqCst);

    assert_eq!(graph.get(&p, "employer").await.unwrap(), id(&c1));
    assert_eq!(edge_count(&graph, &p, "WORKS_AT").await, 1);
    assert_eq!(edge_count(&graph, &c2, "WORKS_AT").await, 0);
}

// ============================================================================
// 7. Cascade delete
// ============================================================================

#[tokio::test]
async fn test_cascade_follows_marker_direction() {
    let graph = graph();
    let p = create(&graph, "Person").await;
    let passport = create(&graph, "Passport").await;
    let company = create(&graph, "Company").await;
    graph.set(&p, "passport", id(&passport)).await.unwrap();
    graph.set(&p, "employer", id(&company)).await.unwrap();

    graph.delete_entity(&p).await.unwrap();

    assert!(graph.load(p.node_id().unwrap()).await.unwrap().is_none());
    assert!(graph.load(passport.node_id().unwrap()).await.unwrap().is_none());
    assert!(graph.load(company.node_id().unwrap()).await.unwrap().is_some());
    assert_eq!(edge_count(&graph, &company, "WORKS_AT").await, 0);
}

#[tokio::test]
async fn test_cascade_does_not_run_backwards() {
    let graph = graph();
    let p = create(&graph, "Person").await;
    let passport = create(&graph, "Passport").await;
    graph.set(&p, "passport", id(&passport)).await.unwrap();

    graph.delete_entity(&passport).await.unwrap();

    assert!(graph.load(p.node_id().unwrap()).await.unwrap().is_some());
    assert_eq!(graph.get(&p, "passport").await.unwrap(), Value::Null);

    let err = graph.delete_entity(&passport).await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}
