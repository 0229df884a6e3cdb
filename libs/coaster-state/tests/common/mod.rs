#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};

use chrono::{DateTime, TimeDelta, Utc};
use coaster_roles::{
    AnnotationRegistry, AttrValue, Attribute, ClassDefinition, Identity, ModelClass, ModelRef,
    Relation, RelationKind, RoleModel, WithRoles,
};
use coaster_state::{
    Condition, Conditional, Interrupt, Label, StateEnum, StateManager, StateManagerBuilder,
    Transition,
};
use parking_lot::Mutex;
use serde_json::Value;

pub const DRAFT: i32 = 0;
pub const PENDING: i32 = 1;
pub const PUBLISHED: i32 = 2;

pub const UNSUBMITTED: i32 = 0;
pub const IN_REVIEW: i32 = 1;
pub const LOCKED: i32 = 2;

pub const RECENT_SQL: &str = "published_at > NOW() - INTERVAL '1 hour'";

pub fn post_states() -> StateEnum<i32> {
    StateEnum::builder()
        .value("DRAFT", DRAFT, Label::new("Draft"))
        .value("PENDING", PENDING, Label::named("pending", "Pending"))
        .value("PUBLISHED", PUBLISHED, Label::new("Published"))
        .group("UNPUBLISHED", [DRAFT, PENDING])
        .build()
        .unwrap()
}

pub fn review_states() -> StateEnum<i32> {
    StateEnum::builder()
        .value("UNSUBMITTED", UNSUBMITTED, Label::new("Unsubmitted"))
        .value("PENDING", IN_REVIEW, Label::new("Pending review"))
        .value("LOCKED", LOCKED, Label::new("Locked"))
        .group("UNLOCKED", [UNSUBMITTED, IN_REVIEW])
        .build()
        .unwrap()
}

pub struct Classes {
    pub user: Arc<ModelClass>,
    pub post: Arc<ModelClass>,
}

pub fn classes() -> Classes {
    let registry = AnnotationRegistry::new();

    let user = ClassDefinition::new("User")
        .attribute(
            Attribute::column("name").with_roles(&registry, WithRoles::new().read(["all"])),
        )
        .finish(&registry)
        .unwrap();

    let post = ClassDefinition::new("Post")
        .attribute(
            Attribute::column("title").with_roles(&registry, WithRoles::new().read(["all"])),
        )
        .attribute(
            Attribute::relationship("author", RelationKind::Scalar)
                .with_roles(&registry, WithRoles::new().grants(["author"])),
        )
        .attribute(
            Attribute::method("submit")
                .with_roles(&registry, WithRoles::new().call(["author"])),
        )
        .attribute(
            Attribute::method("publish")
                .with_roles(&registry, WithRoles::new().call(["editor"])),
        )
        .attribute(
            Attribute::method("redraft")
                .with_roles(&registry, WithRoles::new().call(["author", "editor"])),
        )
        .attribute(
            Attribute::method("undo").with_roles(&registry, WithRoles::new().call(["editor"])),
        )
        .finish(&registry)
        .unwrap();

    Classes { user, post }
}

pub struct User {
    class: Arc<ModelClass>,
    identity: Identity,
}

impl User {
    pub fn new(classes: &Classes) -> Arc<Self> {
        Arc::new(Self {
            class: Arc::clone(&classes.user),
            identity: Identity::random("user"),
        })
    }

    pub fn id(&self) -> Identity {
        self.identity.clone()
    }
}

impl RoleModel for User {
    fn model_class(&self) -> &Arc<ModelClass> {
        &self.class
    }

    fn identity(&self) -> Option<Identity> {
        Some(self.identity.clone())
    }

    fn attr(&self, name: &str) -> Option<AttrValue> {
        (name == "name").then(|| AttrValue::Value(Value::from("someone")))
    }
}

pub struct Post {
    class: Arc<ModelClass>,
    pub state: AtomicI32,
    pub reviewstate: AtomicI32,
    pub published_at: Mutex<Option<DateTime<Utc>>>,
    pub author: Option<ModelRef>,
    pub subscribers: AtomicUsize,
    pub alerts: AtomicUsize,
    /// Body runs of the `faulty` transition.
    pub attempts: AtomicUsize,
}

impl Post {
    pub fn new(classes: &Classes, author: Option<&Arc<User>>) -> Arc<Self> {
        Arc::new(Self {
            class: Arc::clone(&classes.post),
            state: AtomicI32::new(DRAFT),
            reviewstate: AtomicI32::new(UNSUBMITTED),
            published_at: Mutex::new(None),
            author: author.map(|user| Arc::clone(user) as ModelRef),
            subscribers: AtomicUsize::new(0),
            alerts: AtomicUsize::new(0),
            attempts: AtomicUsize::new(0),
        })
    }

    pub fn with_state(classes: &Classes, state: i32) -> Arc<Self> {
        let post = Self::new(classes, None);
        post.state.store(state, Ordering::SeqCst);
        post
    }

    pub fn state(&self) -> i32 {
        self.state.load(Ordering::SeqCst)
    }

    pub fn reviewstate(&self) -> i32 {
        self.reviewstate.load(Ordering::SeqCst)
    }

    pub fn published_ago(&self, age: TimeDelta) {
        *self.published_at.lock() = Some(Utc::now() - age);
    }
}

impl RoleModel for Post {
    fn model_class(&self) -> &Arc<ModelClass> {
        &self.class
    }

    fn attr(&self, name: &str) -> Option<AttrValue> {
        match name {
            "title" => Some(AttrValue::Value(Value::from("A post"))),
            "author" => Some(AttrValue::Relation(Relation::Scalar(self.author.clone()))),
            _ => None,
        }
    }
}

fn is_recent(post: &Post) -> bool {
    post.published_at
        .lock()
        .is_some_and(|at| at > Utc::now() - TimeDelta::hours(1))
}

/// The `state` manager with the `RECENT` conditional state.
pub fn state_builder() -> StateManagerBuilder<Post, i32> {
    StateManager::builder(
        "state",
        "state",
        post_states(),
        |post: &Post| post.state.load(Ordering::SeqCst),
        |post: &Post, value| post.state.store(value, Ordering::SeqCst),
    )
    .conditional(
        Conditional::new("RECENT", "PUBLISHED", is_recent)
            .class_condition(|| Condition::raw(RECENT_SQL))
            .label(Label::named("recent", "Recently published")),
    )
}

pub fn review_builder() -> StateManagerBuilder<Post, i32> {
    StateManager::builder(
        "reviewstate",
        "reviewstate",
        review_states(),
        |post: &Post| post.reviewstate.load(Ordering::SeqCst),
        |post: &Post, value| post.reviewstate.store(value, Ordering::SeqCst),
    )
}

#[derive(Debug, Clone, Copy)]
pub enum Fault {
    Succeed,
    Abort,
    AbortWith,
    Fail,
}

pub struct Workflow {
    pub state: Arc<StateManager<Post, i32>>,
    pub review: Arc<StateManager<Post, i32>>,
    pub submit: Arc<Transition<Post>>,
    pub publish: Arc<Transition<Post>>,
    pub undo: Arc<Transition<Post>>,
    pub redraft: Arc<Transition<Post>>,
    pub faulty: Arc<Transition<Post, Fault, String>>,
    pub send_alert: Arc<Transition<Post>>,
    pub lock: Arc<Transition<Post>>,
}

pub fn workflow() -> Workflow {
    let state = state_builder()
        .group("REDRAFTABLE", ["DRAFT", "PENDING", "RECENT"])
        .build()
        .unwrap();
    let review = review_builder().build().unwrap();

    let submit = Transition::builder("submit")
        .title("Submit")
        .message("Send the post for review")
        .on(&state, "DRAFT", "PENDING")
        .requires(&review, "UNSUBMITTED")
        .build(|_: &Post, (): ()| Ok(()))
        .unwrap();

    let publish = Transition::builder("publish")
        .title("Publish")
        .on(&state, "UNPUBLISHED", "PUBLISHED")
        .on(&review, "UNLOCKED", "PENDING")
        .build(|post: &Post, (): ()| {
            *post.published_at.lock() = Some(Utc::now());
            Ok(())
        })
        .unwrap();

    let undo = Transition::builder("undo")
        .title("Undo publication")
        .on(&state, "RECENT", "PENDING")
        .on(&review, "PENDING", "UNSUBMITTED")
        .build(|post: &Post, (): ()| {
            *post.published_at.lock() = None;
            Ok(())
        })
        .unwrap();

    let redraft = Transition::builder("redraft")
        .on(&state, "REDRAFTABLE", "DRAFT")
        .build(|_: &Post, (): ()| Ok(()))
        .unwrap();

    let faulty = Transition::builder("faulty")
        .on(&state, "REDRAFTABLE", "DRAFT")
        .build(|post: &Post, fault: Fault| {
            post.attempts.fetch_add(1, Ordering::SeqCst);
            match fault {
                Fault::Succeed => Ok("done".to_owned()),
                Fault::Abort => Err(Interrupt::abort()),
                Fault::AbortWith => Err(Interrupt::abort_with("kept".to_owned())),
                Fault::Fail => Err(Interrupt::fail(anyhow::anyhow!("boom"))),
            }
        })
        .unwrap();

    let send_alert = Transition::builder("send_alert")
        .requires(&state, "PUBLISHED")
        .when(|post: &Post| post.subscribers.load(Ordering::SeqCst) > 0)
        .build(|post: &Post, (): ()| {
            post.alerts.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .unwrap();

    let lock = Transition::builder("lock")
        .on(&review, coaster_state::FromStates::Any, "LOCKED")
        .build(|_: &Post, (): ()| Ok(()))
        .unwrap();

    Workflow {
        state,
        review,
        submit,
        publish,
        undo,
        redraft,
        faulty,
        send_alert,
        lock,
    }
}
