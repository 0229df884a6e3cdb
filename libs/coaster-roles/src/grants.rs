//! Role discovery through relationships.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::access::ModelAccess;
use crate::error::RoleError;
use crate::identity::{Anchor, Identity};
use crate::model::{ModelRef, Relation, relates_to, resolve_path};
use crate::role_map::RoleOfferMap;

/// Local roles granted through `relation`.
///
/// Without an actor attribute every related object is asked for its own
/// roles, and roles found there are remapped through `offer_map` (or kept
/// by name when there is no map). With an actor attribute the record linking
/// to the actor is located and grants either its offered roles or, when it
/// offers none, the wanted roles by its existence alone.
pub fn roles_via_relation(
    relation: &Relation,
    actor_attr: Option<&str>,
    wanted: &BTreeSet<String>,
    offer_map: Option<&RoleOfferMap>,
    actor: Option<&Identity>,
    anchors: &[Anchor],
) -> Result<BTreeSet<String>, RoleError> {
    match actor_attr {
        None => roles_from_related(relation, wanted, offer_map, actor, anchors),
        Some(attr) => {
            let Some(actor) = actor else {
                return Ok(BTreeSet::new());
            };
            let Some(record) = linking_record(relation, attr, actor) else {
                return Ok(BTreeSet::new());
            };
            Ok(match record.offered_roles() {
                Some(offered) => remap(&offered, wanted, offer_map),
                None => wanted.clone(),
            })
        }
    }
}

fn roles_from_related(
    relation: &Relation,
    wanted: &BTreeSet<String>,
    offer_map: Option<&RoleOfferMap>,
    actor: Option<&Identity>,
    anchors: &[Anchor],
) -> Result<BTreeSet<String>, RoleError> {
    // Related roles worth asking about: only those that map onto a wanted role.
    let candidates: BTreeSet<String> = match offer_map {
        Some(map) => map
            .iter()
            .filter(|(_, locals)| !locals.is_disjoint(wanted))
            .map(|(related, _)| related.clone())
            .collect(),
        None => wanted.clone(),
    };

    let mut granted = BTreeSet::new();
    for obj in relation.objects() {
        let related_roles = obj.roles_for(actor, anchors);
        let found = related_roles.intersection(&candidates)?;
        granted.extend(remap(&found, wanted, offer_map));
        if wanted.is_subset(&granted) {
            break;
        }
    }
    Ok(granted)
}

/// Translate related roles into local roles.
fn remap(
    related: &BTreeSet<String>,
    wanted: &BTreeSet<String>,
    offer_map: Option<&RoleOfferMap>,
) -> BTreeSet<String> {
    match offer_map {
        Some(map) => related
            .iter()
            .filter_map(|role| map.get(role))
            .filter(|locals| !locals.is_disjoint(wanted))
            .flatten()
            .cloned()
            .collect(),
        None => related.intersection(wanted).cloned().collect(),
    }
}

#[derive(Default)]
struct Found {
    seen: BTreeSet<Identity>,
    actors: Vec<(Identity, String)>,
}

impl Found {
    fn push(&mut self, identity: Identity, role: &str) {
        if self.seen.insert(identity.clone()) {
            self.actors.push((identity, role.to_owned()));
        }
    }
}

/// Enumerate actors holding any of `roles` on `obj`.
pub fn actors_with(
    obj: &ModelRef,
    roles: &[&str],
) -> Result<Vec<(Identity, String)>, RoleError> {
    let class = Arc::clone(obj.model_class());
    let class_roles = class.class_roles();
    let mut found = Found::default();

    for role in roles.iter().copied() {
        let Some(attrs) = class.roles().get(role) else {
            continue;
        };
        for source in &attrs.granted_by {
            if class_roles.is_role_check(source) {
                continue;
            }
            if let Some(relation) = resolve_path(obj, source)? {
                for related in relation.objects() {
                    if let Some(identity) = related.identity() {
                        found.push(identity, role);
                    }
                }
            }
        }

        let wanted = BTreeSet::from([role.to_owned()]);
        for (path, actor_attr) in &attrs.granted_via {
            let Some(relation) = resolve_path(obj, path)? else {
                continue;
            };
            if let Some(attr) = actor_attr {
                for record in relation.objects() {
                    let grants = record.offered_roles().is_none_or(|offered| {
                        remap(&offered, &wanted, class_roles.offer_map(path)).contains(role)
                    });
                    if !grants {
                        continue;
                    }
                    if let Some(Relation::Scalar(Some(actor))) = record.relation(attr)
                        && let Some(identity) = actor.identity()
                    {
                        found.push(identity, role);
                    }
                }
            } else {
                let related_roles: Vec<&str> = match class_roles.reversed_offer_map(path) {
                    Some(reversed) => reversed.get(role).map_or_else(Vec::new, |set| {
                        set.iter().map(String::as_str).collect()
                    }),
                    None => vec![role],
                };
                for related in relation.objects() {
                    for (identity, _) in related.actors_with(&related_roles)? {
                        found.push(identity, role);
                    }
                }
            }
        }
    }
    Ok(found.actors)
}

fn linking_record(relation: &Relation, attr: &str, actor: &Identity) -> Option<ModelRef> {
    let links = |obj: &&ModelRef| relates_to(obj, attr, actor);
    match relation {
        Relation::Query(query) => query.first_related(attr, actor),
        Relation::Scalar(obj) => obj.iter().find(links).cloned(),
        Relation::Sequence(items) => items.iter().find(links).cloned(),
        Relation::Mapping(items) => items.values().find(links).cloned(),
    }
}
