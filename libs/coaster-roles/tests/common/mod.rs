#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use coaster_roles::annotations::IMMUTABLE;
use coaster_roles::{
    Anchor, AnnotationRegistry, AttrValue, Attribute, AttributeKind, ClassDefinition, GrantsVia,
    Identity, LazyQuery, LazyRoleSet, ModelClass, ModelError, ModelRef, Relation, RelationKind,
    RoleAttrs, RoleModel, WithRoles,
};
use parking_lot::{Mutex, RwLock};
use serde_json::{Value, json};

pub struct Classes {
    pub user: Arc<ModelClass>,
    pub membership: Arc<ModelClass>,
    pub folder: Arc<ModelClass>,
    pub document: Arc<ModelClass>,
}

pub fn classes() -> Classes {
    let registry = AnnotationRegistry::new();

    let user = ClassDefinition::new("User")
        .attribute(Attribute::column("name").with_roles(
            &registry,
            WithRoles::new().read(["all"]).datasets(["minimal", "related"]),
        ))
        .finish(&registry)
        .unwrap();

    let membership = ClassDefinition::new("Membership")
        .attribute(
            Attribute::relationship("user", RelationKind::Scalar)
                .with_roles(&registry, WithRoles::new().read(["all"])),
        )
        .finish(&registry)
        .unwrap();

    let folder = ClassDefinition::new("Folder")
        .attribute(Attribute::column("title").with_roles(
            &registry,
            WithRoles::new().read(["all"]).rw(["owner"]).datasets(["related"]),
        ))
        .attribute(
            Attribute::relationship("owner", RelationKind::Scalar)
                .with_roles(&registry, WithRoles::new().grants(["owner", "editor"])),
        )
        .attribute(
            Attribute::relationship("editors", RelationKind::Sequence).with_roles(
                &registry,
                WithRoles::new().read(["all"]).grants(["editor"]),
            ),
        )
        .finish(&registry)
        .unwrap();

    let document = ClassDefinition::new("Document")
        .attribute(
            Attribute::column("id")
                .annotate(&registry, IMMUTABLE)
                .with_roles(&registry, WithRoles::new().read(["all"]).datasets(["primary"])),
        )
        .attribute(
            Attribute::column("title").with_roles(
                &registry,
                WithRoles::new()
                    .read(["reader", "editor"])
                    .write(["owner", "editor"])
                    .datasets(["primary"]),
            ),
        )
        .attribute(
            Attribute::column("body")
                .with_roles(&registry, WithRoles::new().rw(["editor", "parent_editor"])),
        )
        .attribute(
            Attribute::relationship("owner", RelationKind::Scalar).with_roles(
                &registry,
                WithRoles::new()
                    .read(["all"])
                    .grants(["owner"])
                    .datasets(["primary"]),
            ),
        )
        .attribute(
            Attribute::relationship("members", RelationKind::Query)
                .with_roles(&registry, WithRoles::new().grants(["member", "reader"])),
        )
        .attribute(
            Attribute::relationship("folder", RelationKind::Scalar).with_roles(
                &registry,
                WithRoles::new()
                    .read(["all"])
                    .datasets(["primary"])
                    .grants_via(
                        None,
                        GrantsVia::remap([("editor", "parent_editor"), ("owner", "parent_owner")]),
                    ),
            ),
        )
        .attribute(
            Attribute::relationship("memberships", RelationKind::Sequence).with_roles(
                &registry,
                WithRoles::new().grants_via(
                    Some("user"),
                    GrantsVia::remap([("admin", "doc_admin"), ("viewer", "reader")]),
                ),
            ),
        )
        .attribute(
            Attribute::method("publish")
                .with_roles(&registry, WithRoles::new().call(["owner", "doc_admin"])),
        )
        .role_check("has_invite", ["invitee"])
        .role("invitee", RoleAttrs::new().read(["title"]))
        .json_datasets(["primary"])
        .finish(&registry)
        .unwrap();

    assert_eq!(registry.pending(), 0);
    Classes {
        user,
        membership,
        folder,
        document,
    }
}

/// Generic in-memory model used by the tests.
pub struct Record {
    class: Arc<ModelClass>,
    identity: Option<Identity>,
    values: RwLock<BTreeMap<String, Value>>,
    relations: RwLock<BTreeMap<String, Relation>>,
    offered: Option<BTreeSet<String>>,
    relation_reads: AtomicUsize,
    calls: Mutex<Vec<String>>,
}

impl Record {
    pub fn new(class: &Arc<ModelClass>) -> Self {
        Self {
            class: Arc::clone(class),
            identity: None,
            values: RwLock::new(BTreeMap::new()),
            relations: RwLock::new(BTreeMap::new()),
            offered: None,
            relation_reads: AtomicUsize::new(0),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn identity(mut self, identity: Identity) -> Self {
        self.identity = Some(identity);
        self
    }

    pub fn value(self, name: &str, value: Value) -> Self {
        self.values.write().insert(name.to_owned(), value);
        self
    }

    pub fn relation(self, name: &str, relation: Relation) -> Self {
        self.relations.write().insert(name.to_owned(), relation);
        self
    }

    pub fn offering(mut self, roles: &[&str]) -> Self {
        self.offered = Some(roles.iter().map(|r| (*r).to_owned()).collect());
        self
    }

    pub fn build(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn relation_reads(&self) -> usize {
        self.relation_reads.load(Ordering::SeqCst)
    }

    pub fn stored(&self, name: &str) -> Option<Value> {
        self.values.read().get(name).cloned()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

impl RoleModel for Record {
    fn model_class(&self) -> &Arc<ModelClass> {
        &self.class
    }

    fn identity(&self) -> Option<Identity> {
        self.identity.clone()
    }

    fn attr(&self, name: &str) -> Option<AttrValue> {
        if let Some(value) = self.values.read().get(name) {
            return Some(AttrValue::Value(value.clone()));
        }
        let relation = self.relations.read().get(name).cloned()?;
        self.relation_reads.fetch_add(1, Ordering::SeqCst);
        Some(AttrValue::Relation(relation))
    }

    fn set_attr(&self, name: &str, value: Value) -> Result<(), ModelError> {
        match self.class.attribute(name).map(Attribute::kind) {
            Some(AttributeKind::Column) => {
                self.values.write().insert(name.to_owned(), value);
                Ok(())
            }
            _ => Err(ModelError::ReadOnly(name.to_owned())),
        }
    }

    fn call(&self, name: &str, args: Value) -> Result<Value, ModelError> {
        match self.class.attribute(name).map(Attribute::kind) {
            Some(AttributeKind::Method) => {
                self.calls.lock().push(name.to_owned());
                Ok(json!({ "called": name, "args": args }))
            }
            _ => Err(ModelError::NoMethod(name.to_owned())),
        }
    }

    fn offered_roles(&self) -> Option<BTreeSet<String>> {
        self.offered.clone()
    }

    fn check_role(&self, check: &str, _actor: Option<&Identity>, anchors: &[Anchor]) -> bool {
        check == "has_invite" && anchors.iter().any(|a| a.as_str() == "invite")
    }

    fn adjust_roles(&self, roles: &mut LazyRoleSet, _actor: Option<&Identity>, anchors: &[Anchor]) {
        if anchors.iter().any(|a| a.as_str() == "superuser") {
            roles.add("owner");
        }
        if anchors.iter().any(|a| a.as_str() == "banned") {
            roles.discard("all");
        }
    }
}

pub fn user(classes: &Classes, name: &str) -> Arc<Record> {
    Record::new(&classes.user)
        .identity(Identity::random("user"))
        .value("name", json!(name))
        .build()
}

pub fn actor_of(record: &Arc<Record>) -> Identity {
    record.identity.clone().unwrap()
}

pub fn model(record: &Arc<Record>) -> ModelRef {
    Arc::clone(record) as ModelRef
}

/// Query stand-in that counts how it is used.
pub struct CountingQuery {
    rows: Vec<ModelRef>,
    pub exists_calls: AtomicUsize,
    pub first_calls: AtomicUsize,
    pub fetch_calls: AtomicUsize,
}

impl CountingQuery {
    pub fn new(rows: Vec<ModelRef>) -> Arc<Self> {
        Arc::new(Self {
            rows,
            exists_calls: AtomicUsize::new(0),
            first_calls: AtomicUsize::new(0),
            fetch_calls: AtomicUsize::new(0),
        })
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

impl LazyQuery for CountingQuery {
    fn contains(&self, actor: &Identity) -> bool {
        self.exists_calls.fetch_add(1, Ordering::SeqCst);
        self.rows
            .iter()
            .any(|row| row.identity().as_ref() == Some(actor))
    }

    fn first_related(&self, attr: &str, actor: &Identity) -> Option<ModelRef> {
        self.first_calls.fetch_add(1, Ordering::SeqCst);
        self.rows
            .iter()
            .find(|row| {
                matches!(row.relation(attr), Some(Relation::Scalar(Some(linked)))
                    if linked.identity().as_ref() == Some(actor))
            })
            .cloned()
    }

    fn fetch(&self) -> Vec<ModelRef> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        self.rows.clone()
    }
}

pub fn document(classes: &Classes, owner: &Arc<Record>) -> Record {
    Record::new(&classes.document)
        .value("id", json!(1))
        .value("title", json!("Draft"))
        .value("body", json!("Lorem"))
        .relation("owner", Relation::Scalar(Some(model(owner))))
        .relation("members", Relation::Query(CountingQuery::new(Vec::new())))
        .relation("folder", Relation::Scalar(None))
        .relation("memberships", Relation::Sequence(Vec::new()))
}
