//! Lookups over captured namespace events.
//!
//! An unreadable `events.json` is logged and treated as empty.

use std::sync::Arc;

use regex::Regex;

use crate::analyzers::SnapshotContext;
use crate::k8s::{Event, EventList};

fn load(ctx: &SnapshotContext<'_>, namespace: &str) -> Option<Arc<EventList>> {
    match ctx.events(namespace) {
        Ok(events) => events,
        Err(err) => {
            log::warn!("skipping events of namespace {namespace} in {}: {err}", ctx.source());
            None
        }
    }
}

/// Events in `namespace` whose involved object is `kind`/`name`.
pub fn events_for_object(
    ctx: &SnapshotContext<'_>,
    namespace: &str,
    kind: &str,
    name: &str,
) -> Vec<Event> {
    let Some(events) = load(ctx, namespace) else {
        return Vec::new();
    };
    events
        .items
        .iter()
        .filter(|ev| {
            ev.involved_object.kind == kind
                && ev.involved_object.name == name
                && (ev.involved_object.namespace.is_empty()
                    || ev.involved_object.namespace == namespace)
        })
        .cloned()
        .collect()
}

pub fn warning_events(ctx: &SnapshotContext<'_>, namespace: &str) -> Vec<Event> {
    let Some(events) = load(ctx, namespace) else {
        return Vec::new();
    };
    events
        .items
        .iter()
        .filter(|ev| ev.event_type == "Warning")
        .cloned()
        .collect()
}

/// Events in `namespace` whose message matches `pattern`.
pub fn events_matching(
    ctx: &SnapshotContext<'_>,
    namespace: &str,
    pattern: &Regex,
) -> Vec<Event> {
    let Some(events) = load(ctx, namespace) else {
        return Vec::new();
    };
    events
        .items
        .iter()
        .filter(|ev| pattern.is_match(&ev.message))
        .cloned()
        .collect()
}

pub fn describe(event: &Event) -> String {
    format!(
        "Namespace {}, {} {}, Reason {}, Message {}",
        event.metadata.namespace,
        event.involved_object.kind,
        event.involved_object.name,
        event.reason,
        event.message
    )
}
