#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use chrono::TimeDelta;
use coaster_state::{Conditional, StateConfigError, StateError, StateManager, StateRef};
use common::{DRAFT, PENDING, PUBLISHED, Post, RECENT_SQL, classes, state_builder, workflow};

#[test]
fn recent_expires_while_published_holds() {
    let classes = classes();
    let wf = workflow();
    let post = Post::with_state(&classes, PUBLISHED);
    post.published_ago(TimeDelta::minutes(5));

    assert!(wf.state.is(&post, "RECENT").unwrap());
    assert!(wf.state.is(&post, "PUBLISHED").unwrap());
    assert_eq!(wf.state.bestmatch(&post).unwrap().name(), "RECENT");
    assert_eq!(
        wf.state.label(&post).unwrap().map(ToString::to_string).as_deref(),
        Some("Recently published")
    );

    post.published_ago(TimeDelta::hours(2));
    assert!(!wf.state.is(&post, "RECENT").unwrap());
    assert!(wf.state.is(&post, "PUBLISHED").unwrap());
    assert_eq!(wf.state.bestmatch(&post).unwrap().name(), "PUBLISHED");
}

#[test]
fn current_lists_states_and_groups() {
    let classes = classes();
    let wf = workflow();

    let draft = Post::with_state(&classes, DRAFT);
    assert_eq!(wf.state.current(&draft), ["DRAFT", "UNPUBLISHED", "REDRAFTABLE"]);

    let fresh = Post::with_state(&classes, PUBLISHED);
    fresh.published_ago(TimeDelta::minutes(1));
    assert_eq!(wf.state.current(&fresh), ["PUBLISHED", "RECENT", "REDRAFTABLE"]);

    let old = Post::with_state(&classes, PUBLISHED);
    old.published_ago(TimeDelta::days(3));
    assert_eq!(wf.state.current(&old), ["PUBLISHED"]);
    assert!(!wf.state.is(&old, "REDRAFTABLE").unwrap());
}

#[test]
fn lookup_by_name() {
    let wf = workflow();
    assert!(matches!(wf.state.state("REDRAFTABLE"), Some(StateRef::Group(g)) if g.members().len() == 3));
    let Some(StateRef::State(recent)) = wf.state.state("RECENT") else {
        panic!("RECENT should be a managed state");
    };
    assert!(recent.is_conditional());
    assert!(!recent.is_static());
    assert!(wf.state.state("ARCHIVED").is_none());
    assert_eq!(wf.state.lenum().label(&PENDING).unwrap().name.as_deref(), Some("pending"));
}

#[test]
fn group_buckets_by_best_match() {
    let classes = classes();
    let wf = workflow();
    let draft = Post::with_state(&classes, DRAFT);
    let fresh = Post::with_state(&classes, PUBLISHED);
    fresh.published_ago(TimeDelta::minutes(10));
    let old = Post::with_state(&classes, PUBLISHED);
    old.published_ago(TimeDelta::hours(5));
    let other_draft = Post::with_state(&classes, DRAFT);

    let posts = [&*fresh, &*draft, &*old, &*other_draft];
    let buckets = wf.state.group(posts, false).unwrap();
    let summary: Vec<(&str, usize)> = buckets
        .iter()
        .map(|(state, items)| (state.name(), items.len()))
        .collect();
    assert_eq!(summary, [("DRAFT", 2), ("PUBLISHED", 1), ("RECENT", 1)]);
    assert!(std::ptr::eq(buckets[2].1[0], &*fresh));

    let buckets = wf.state.group([&*draft], true).unwrap();
    let names: Vec<&str> = buckets.iter().map(|(state, _)| state.name()).collect();
    assert_eq!(names, ["DRAFT", "PENDING", "PUBLISHED", "RECENT"]);
}

#[test]
fn ungoverned_values_are_rejected() {
    let classes = classes();
    let wf = workflow();
    let broken = Post::with_state(&classes, 9);
    let draft = Post::with_state(&classes, DRAFT);

    assert!(matches!(wf.state.bestmatch(&broken), Err(StateError::NotGoverned { .. })));
    assert!(matches!(
        wf.state.group([&*draft, &*broken], false),
        Err(StateError::NotGoverned { .. })
    ));
    assert!(wf.state.current(&broken).is_empty());
}

#[test]
fn direct_writes_need_a_writable_manager() {
    let classes = classes();
    let wf = workflow();
    let post = Post::with_state(&classes, DRAFT);

    assert!(wf.state.is_readonly());
    let err = wf.state.set_value(&post, PUBLISHED).unwrap_err();
    assert_eq!(err.to_string(), "state is read-only; use a transition");
    assert_eq!(post.state(), DRAFT);

    let writable = state_builder().writable().build().unwrap();
    writable.set_value(&post, PENDING).unwrap();
    assert_eq!(post.state(), PENDING);
    assert!(matches!(writable.set_value(&post, 5), Err(StateError::InvalidValue { .. })));
    assert_eq!(post.state(), PENDING);
}

#[test]
fn conditional_cannot_share_a_group_with_its_base() {
    let err = state_builder()
        .group("LIVE", ["PUBLISHED", "RECENT"])
        .build()
        .unwrap_err();
    assert!(matches!(
        err,
        StateConfigError::RedundantGroupMember { group, state } if group == "LIVE" && state == "RECENT"
    ));

    let err = state_builder()
        .group("UNPUBLISHED", ["DRAFT", "PENDING"])
        .build()
        .unwrap_err();
    assert!(matches!(err, StateConfigError::DuplicateName(name) if name == "UNPUBLISHED"));

    let err = state_builder().group("NOTHING", Vec::<String>::new()).build().unwrap_err();
    assert!(matches!(err, StateConfigError::EmptyGroup(_)));
}

#[test]
fn class_level_conditions() {
    let wf = workflow();
    assert_eq!(wf.state.condition("DRAFT").unwrap().to_string(), "state = 0");
    assert_eq!(wf.state.condition("UNPUBLISHED").unwrap().to_string(), "state IN (0, 1)");
    assert_eq!(
        wf.state.condition("RECENT").unwrap().to_string(),
        format!("state = 2 AND ({RECENT_SQL})")
    );
    assert_eq!(
        wf.state.condition("REDRAFTABLE").unwrap().to_string(),
        format!("state = 0 OR state = 1 OR (state = 2 AND ({RECENT_SQL}))")
    );
    assert!(matches!(wf.state.condition("NOPE"), Err(StateError::UnknownState { .. })));

    assert_eq!(wf.state.constraint().to_string(), "state IN (0, 1, 2)");
    assert_eq!(
        StateManager::<Post, i32>::check_constraint("reviewstate", wf.review.lenum()).to_string(),
        "reviewstate IN (0, 1, 2)"
    );
}

#[test]
fn conditions_need_a_class_level_expression() {
    let manager = state_builder()
        .conditional(Conditional::new("FEATURED", "PUBLISHED", |post: &Post| {
            post.subscribers.load(std::sync::atomic::Ordering::SeqCst) > 100
        }))
        .build()
        .unwrap();
    assert!(matches!(
        manager.condition("FEATURED"),
        Err(StateError::NoClassCondition { state, .. }) if state == "FEATURED"
    ));
}
