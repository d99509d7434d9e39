use crate::aspace::{EntityKind, TargetApi};
use crate::sync::cache::IdentityCache;
use crate::sync::reconcile::SyncContext;
use crate::sync::state::AccessPoints;
use crate::sync::upsert::{WriteTally, create, update};
use serde::Serialize;
use serde_json::{Map, Value, json};

const VOCABULARY: &str = "/vocabularies/1";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TermType {
    Topical,
    Geographic,
}

impl TermType {
    fn as_str(self) -> &'static str {
        match self {
            Self::Topical => "topical",
            Self::Geographic => "geographic",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LinkOutcome {
    pub subjects: WriteTally,
    pub agents: WriteTally,
    pub resources: WriteTally,
    pub resources_missing: u64,
}

pub fn subject_payload(term: &str, term_type: TermType) -> Value {
    json!({
        "jsonmodel_type": "subject",
        "external_ids": [],
        "publish": true,
        "is_slug_auto": true,
        "used_within_repositories": [],
        "used_within_published_repositories": [],
        "terms": [{
            "jsonmodel_type": "term",
            "term": term,
            "term_type": term_type.as_str(),
            "vocabulary": VOCABULARY,
        }],
        "external_documents": [],
        "vocabulary": VOCABULARY,
        "source": "local",
    })
}

pub fn agent_payload(name: &str) -> Value {
    json!({
        "jsonmodel_type": "agent_corporate_entity",
        "agent_type": "agent_corporate_entity",
        "agent_contacts": [],
        "dates_of_existence": [],
        "is_slug_auto": true,
        "publish": true,
        "names": [{
            "jsonmodel_type": "name_corporate_entity",
            "primary_name": name,
            "sort_name": name,
            "authority_id": "",
            "rules": "",
            "source": "local",
        }],
    })
}

fn refs(cache: &IdentityCache, kind: EntityKind, terms: &[String]) -> Vec<String> {
    terms
        .iter()
        .filter_map(|term| cache.get(kind, term).map(|entry| entry.uri.clone()))
        .collect()
}

/// Rebuild a resource's `subjects` and `linked_agents` from its associations.
///
/// Names link with role `subject`. The first listed creator links with role
/// `creator` and every later creator with role `subject`.
pub fn resource_links(id_0: &str, points: &AccessPoints, cache: &IdentityCache) -> Value {
    let subjects = refs(cache, EntityKind::Subject, &points.subject)
        .into_iter()
        .chain(refs(cache, EntityKind::Subject, &points.place))
        .map(|uri| json!({"ref": uri}))
        .collect::<Vec<_>>();

    let mut linked_agents = refs(cache, EntityKind::Agent, &points.name)
        .into_iter()
        .map(|uri| json!({"ref": uri, "role": "subject"}))
        .collect::<Vec<_>>();
    for (idx, creator) in points.creator.iter().enumerate() {
        let Some(entry) = cache.get(EntityKind::Agent, creator) else {
            continue;
        };
        let role = if idx == 0 { "creator" } else { "subject" };
        linked_agents.push(json!({"ref": entry.uri, "role": role}));
    }

    json!({
        "id_0": id_0,
        "subjects": subjects,
        "linked_agents": linked_agents,
    })
}

/// Create a missing term from its full payload. A term that already exists
/// is resubmitted unchanged so curated fields on the target survive.
fn upsert_terms<'a, T: TargetApi>(
    target: &T,
    cache: &mut IdentityCache,
    kind: EntityKind,
    collection: &str,
    terms: impl Iterator<Item = &'a String>,
    payload: impl Fn(&str) -> Value,
    tally: &mut WriteTally,
) {
    for term in terms {
        let exists = cache.contains(kind, term);
        tracing::info!(kind = kind.label(), term = %term, exists, "linking access point");
        let outcome = if exists {
            update(target, cache, kind, term, &Value::Object(Map::new()))
        } else {
            create(target, cache, kind, term, collection, &payload(term))
        };
        tally.record(&outcome);
    }
}

/// Create or update every accumulated subject, place and name, then rewrite
/// each recorded resource's links.
pub fn link_access_points<T: TargetApi>(
    target: &T,
    ctx: &mut SyncContext,
) -> LinkOutcome {
    let mut out = LinkOutcome::default();
    let subjects_collection = EntityKind::Subject.collection(&ctx.repository_id);
    let agents_collection = EntityKind::Agent.collection(&ctx.repository_id);

    upsert_terms(
        target,
        &mut ctx.cache,
        EntityKind::Subject,
        &subjects_collection,
        ctx.state.unique_subjects.iter(),
        |term| subject_payload(term, TermType::Topical),
        &mut out.subjects,
    );
    upsert_terms(
        target,
        &mut ctx.cache,
        EntityKind::Subject,
        &subjects_collection,
        ctx.state.unique_places.iter(),
        |term| subject_payload(term, TermType::Geographic),
        &mut out.subjects,
    );
    upsert_terms(
        target,
        &mut ctx.cache,
        EntityKind::Agent,
        &agents_collection,
        ctx.state.unique_names.iter(),
        agent_payload,
        &mut out.agents,
    );

    for (id_0, points) in &ctx.state.access_points {
        if !ctx.cache.contains(EntityKind::Resource, id_0) {
            tracing::warn!(id_0 = %id_0, "resource not in cache; skipping link update");
            out.resources_missing += 1;
            continue;
        }
        let links = resource_links(id_0, points, &ctx.cache);
        tracing::info!(id_0 = %id_0, clearing = points.is_empty(), "updating resource links");
        let outcome = update(target, &mut ctx.cache, EntityKind::Resource, id_0, &links);
        out.resources.record(&outcome);
    }

    out
}
