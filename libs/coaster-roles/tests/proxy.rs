#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use std::sync::Arc;

use coaster_roles::{
    AccessError, AccessRequest, AuthContext, ConfigError, Identity, ModelAccess, ProxyValue,
    Relation, RoleSource,
};
use common::{Record, actor_of, classes, document, model, user};
use serde_json::{Value, json};

#[test]
fn write_only_attribute_can_be_set_but_not_read() {
    let c = classes();
    let owner = user(&c, "owner");
    let record = document(&c, &owner).build();
    let proxy = model(&record)
        .access_for(AccessRequest::new().roles(["owner"]))
        .unwrap();

    proxy.set("title", json!("X")).unwrap();
    assert!(matches!(
        proxy.get("title").unwrap_err(),
        AccessError::NoAttribute { attr, .. } if attr == "title"
    ));
    assert!(matches!(
        proxy.get_item("title").unwrap_err(),
        AccessError::NoKey { key, .. } if key == "title"
    ));
    assert_eq!(record.stored("title"), Some(json!("X")));
}

#[test]
fn actor_roles_drive_access() {
    let c = classes();
    let owner = user(&c, "owner");
    let record = document(&c, &owner).build();
    let doc = model(&record);

    let proxy = doc
        .access_for(AccessRequest::new().actor(actor_of(&owner)))
        .unwrap();
    assert!(proxy.can_write("title").unwrap());
    assert!(!proxy.can_read("title").unwrap());
    assert!(proxy.contains("publish").unwrap());

    let stranger = doc
        .access_for(AccessRequest::new().actor(Identity::random("user")))
        .unwrap();
    assert!(matches!(
        stranger.set("title", json!("nope")).unwrap_err(),
        AccessError::NoAttribute { .. }
    ));
    assert_eq!(record.stored("title"), Some(json!("Draft")));
}

#[test]
fn denied_and_absent_look_the_same() {
    let c = classes();
    let owner = user(&c, "owner");
    let proxy = model(&document(&c, &owner).build())
        .access_for(AccessRequest::new().roles(["owner"]))
        .unwrap();

    let denied = proxy.get("body").unwrap_err();
    let absent = proxy.get("no_such_field").unwrap_err();
    assert!(matches!(denied, AccessError::NoAttribute { .. }));
    assert!(matches!(absent, AccessError::NoAttribute { .. }));
}

#[test]
fn calls_require_call_access() {
    let c = classes();
    let owner = user(&c, "owner");
    let record = document(&c, &owner).build();
    let doc = model(&record);

    let proxy = doc.access_for(AccessRequest::new().roles(["owner"])).unwrap();
    assert!(matches!(proxy.get("publish").unwrap(), ProxyValue::Callable(name) if name == "publish"));
    let result = proxy.call("publish", json!({"at": "now"})).unwrap();
    assert_eq!(result["called"], json!("publish"));
    assert_eq!(record.calls(), ["publish"]);

    let reader = doc.access_for(AccessRequest::new().roles(["reader"])).unwrap();
    assert!(matches!(
        reader.call("publish", Value::Null).unwrap_err(),
        AccessError::NoAttribute { .. }
    ));
    assert_eq!(record.calls().len(), 1);
}

#[test]
fn roles_and_actor_together_are_rejected() {
    let c = classes();
    let owner = user(&c, "owner");
    let doc = model(&document(&c, &owner).build());

    let err = doc
        .access_for(AccessRequest::new().roles(["owner"]).actor(actor_of(&owner)))
        .unwrap_err();
    assert!(matches!(err, AccessError::Config(ConfigError::RolesWithActor)));

    let err = doc
        .access_for(AccessRequest::new().roles(["owner"]).anchor("invite"))
        .unwrap_err();
    assert!(matches!(err, AccessError::Config(ConfigError::RolesWithActor)));
}

#[test]
fn nested_proxies_resolve_their_own_roles() {
    let c = classes();
    let owner = user(&c, "owner");
    let folder_owner = user(&c, "folder-owner");
    let folder = Record::new(&c.folder)
        .value("title", json!("Shared"))
        .relation("owner", Relation::Scalar(Some(model(&folder_owner))))
        .relation("editors", Relation::Sequence(vec![model(&owner)]))
        .build();
    let doc = model(
        &document(&c, &owner)
            .relation("folder", Relation::Scalar(Some(model(&folder))))
            .build(),
    );

    let proxy = doc
        .access_for(AccessRequest::new().actor(actor_of(&folder_owner)))
        .unwrap();
    assert!(!proxy.can_write("title").unwrap());
    let nested = proxy.get("folder").unwrap();
    let nested = nested.as_object().unwrap();
    assert_eq!(nested.path(), "Document.folder");
    assert!(nested.can_write("title").unwrap());
    nested.set("title", json!("Renamed")).unwrap();
    assert_eq!(folder.stored("title"), Some(json!("Renamed")));

    // The document owner is only an editor of the folder.
    let proxy = doc
        .access_for(AccessRequest::new().actor(actor_of(&owner)))
        .unwrap();
    let nested = proxy.get("folder").unwrap();
    assert!(!nested.as_object().unwrap().can_write("title").unwrap());
}

#[test]
fn fixed_roles_carry_into_collections() {
    let c = classes();
    let editor = user(&c, "editor");
    let folder = Record::new(&c.folder)
        .value("title", json!("Shared"))
        .relation("owner", Relation::Scalar(None))
        .relation("editors", Relation::Sequence(vec![model(&editor)]))
        .build();
    let proxy = model(&folder)
        .access_for(AccessRequest::new().roles(["all", "owner"]))
        .unwrap();

    let ProxyValue::List(editors) = proxy.get("editors").unwrap() else {
        panic!("expected a list of proxies");
    };
    assert_eq!(editors.len(), 1);
    assert_eq!(editors[0].path(), "Folder.editors[0]");
    assert!(matches!(editors[0].roles(), RoleSource::Fixed(roles) if roles.contains("owner")));
    assert_eq!(
        editors[0].get("name").unwrap().as_value(),
        Some(&json!("editor"))
    );
}

#[test]
fn datasets_limit_enumeration_and_cascade() {
    let c = classes();
    let owner = user(&c, "owner");
    let doc = model(&document(&c, &owner).build());

    let proxy = doc
        .access_for(
            AccessRequest::new()
                .actor(actor_of(&owner))
                .datasets(["primary", "related"]),
        )
        .unwrap();
    let keys: Vec<String> = proxy.keys().unwrap().into_iter().collect();
    assert_eq!(keys, ["folder", "id", "owner"]);
    assert_eq!(proxy.len().unwrap(), 3);

    // Outside the dataset: enumerable no, readable yes.
    assert!(proxy.get("memberships").is_err());
    assert!(matches!(
        proxy.get_item("publish").unwrap_err(),
        AccessError::NoKey { .. }
    ));

    let expected = json!({ "id": 1, "owner": { "name": "owner" }, "folder": null });
    assert_eq!(proxy.to_json().unwrap(), expected);
    assert!(proxy == *expected.as_object().unwrap());
    assert_eq!(serde_json::to_value(&proxy).unwrap(), expected);
}

#[test]
fn empty_dataset_list_enumerates_nothing() {
    let c = classes();
    let owner = user(&c, "owner");
    let proxy = model(&document(&c, &owner).build())
        .access_for(AccessRequest::new().roles(["all"]).datasets(Vec::<String>::new()))
        .unwrap();
    assert!(proxy.is_empty().unwrap());
    assert_eq!(proxy.get("id").unwrap().as_value(), Some(&json!(1)));
}

#[test]
fn json_datasets_apply_by_default() {
    let c = classes();
    let owner = user(&c, "owner");
    let doc = model(&document(&c, &owner).build());
    let ctx = AuthContext::builder().actor(actor_of(&owner)).build();

    let proxy = doc.current_access(&ctx, None).unwrap();
    assert_eq!(
        proxy.to_json().unwrap(),
        json!({ "id": 1, "owner": {}, "folder": null })
    );
}

#[test]
fn missing_dataset_reports_nested_path() {
    let c = classes();
    let owner = user(&c, "owner");
    let folder = Record::new(&c.folder)
        .value("title", json!("Shared"))
        .relation("owner", Relation::Scalar(None))
        .relation("editors", Relation::Sequence(Vec::new()))
        .build();
    let doc = model(
        &document(&c, &owner)
            .relation("folder", Relation::Scalar(Some(model(&folder))))
            .build(),
    );

    let err = doc
        .access_for(AccessRequest::new().roles(["all"]).datasets(["unknown"]))
        .unwrap_err();
    assert!(matches!(
        err,
        AccessError::MissingDataset { dataset, path, .. } if dataset == "unknown" && path == "Document"
    ));

    let proxy = doc
        .access_for(AccessRequest::new().roles(["all"]).datasets(["primary", "minimal"]))
        .unwrap();
    let err = proxy.to_json().unwrap_err();
    assert!(matches!(
        err,
        AccessError::MissingDataset { dataset, class, path }
            if dataset == "minimal" && class == "Folder" && path == "Document.folder"
    ));
}

#[test]
fn current_roles_follow_the_context() {
    let c = classes();
    let owner = user(&c, "owner");
    let doc = model(&document(&c, &owner).build());

    let anonymous = doc.current_roles(&AuthContext::anonymous());
    assert!(anonymous.contains("anon").unwrap());

    let ctx = AuthContext::builder()
        .actor(actor_of(&owner))
        .anchor("invite")
        .build();
    let roles = doc.current_roles(&ctx);
    assert!(roles.contains("owner").unwrap());
    assert!(roles.contains("invitee").unwrap());
    assert!(Arc::ptr_eq(roles.obj(), &doc));
}
