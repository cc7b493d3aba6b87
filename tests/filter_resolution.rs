//! End-to-end filter resolution against the in-memory reference store.
//!
//! Exercises the full path: constraint data -> descriptor -> predicate
//! tree -> point-in-time resolution -> evaluation, including live-index
//! backed enum resolution, narrowing, relative dates and subtree
//! expansion.

mod common;

use chrono::{Duration, TimeZone, Utc};
use common::RecordingScheduler;
use common::fixtures::{ItemBuilder, pinned_store};
use spindle_query::calendar::{BoundSide, CalendarUnit};
use spindle_query::config::Tunables;
use spindle_query::constraint::{
    DateDescriptor, Descriptor, EnumDescriptor, F_ACCEPT_EMPTY, F_AFTER, F_PRESET, F_SUBSET,
    F_TEXT, F_UNDER, TextDescriptor,
};
use spindle_query::hypercube::Hypercube;
use spindle_query::index::KeyIndex;
use spindle_query::model::{
    AxisValue, ConstraintData, DateValue, FieldValue, ItemId, ItemKey, SourceId,
};
use spindle_query::narrow::Narrower;
use spindle_query::predicate::ResolveContext;
use spindle_query::store::memory::MemStore;
use spindle_query::store::{ItemFilter, ItemStore, Lifetime, StandardKeyShape};
use std::sync::Arc;

fn all_items(store: &MemStore, up_to: i64) -> Vec<ItemId> {
    (1..=up_to).map(ItemId).collect()
}

#[test]
fn enum_filter_resolves_ids_through_live_index() {
    let store = MemStore::new();
    let (alice, issue_a, issue_b) = store.transact(|txn| {
        let alice = ItemBuilder::keyed("alice", "Alice")
            .with_text("type", "user")
            .put(txn);
        let bob = ItemBuilder::keyed("bob", "Bob")
            .with_text("type", "user")
            .put(txn);
        let issue_a = ItemBuilder::keyed("is-1", "Crash on login")
            .with_text("type", "issue")
            .with_ref("assignee", alice)
            .put(txn);
        let issue_b = ItemBuilder::keyed("is-2", "Slow search")
            .with_text("type", "issue")
            .with_ref("assignee", bob)
            .put(txn);
        (alice, issue_a, issue_b)
    });

    let lifetime = Lifetime::new();
    let index = KeyIndex::new(StandardKeyShape::default());
    index
        .subscribe(&lifetime, &store, ItemFilter::attr_text("type", "user"), None)
        .unwrap();
    index.await_initial_scan();

    // Saved query references alice only by textual id.
    let descriptor =
        Descriptor::Enum(EnumDescriptor::new("assignee").with_index(index.clone()));
    let data = ConstraintData::new("assignee")
        .with(F_SUBSET, FieldValue::Refs(vec![ItemKey::unresolved("alice")]));

    let filter = descriptor
        .create_filter(&data, &Hypercube::unrestricted())
        .unwrap();
    let reader = store.snapshot();
    let tunables = Tunables::default();
    let resolved = filter
        .resolve(&ResolveContext::one_off(&*reader, &tunables))
        .unwrap();

    assert!(resolved.matches(&*reader, issue_a));
    assert!(!resolved.matches(&*reader, issue_b));
    let _ = alice;
}

#[test]
fn unresolvable_ids_load_without_error_and_match_once_seen() {
    // A saved query referencing a value the client has never seen loads
    // fine; the marker starts matching once the value exists.
    let store = MemStore::new();
    let descriptor = Descriptor::Enum(EnumDescriptor::new("assignee"));
    let data = ConstraintData::new("assignee").with(
        F_SUBSET,
        FieldValue::Refs(vec![ItemKey::unresolved("charlie")]),
    );
    let filter = descriptor
        .create_filter(&data, &Hypercube::unrestricted())
        .unwrap();
    let tunables = Tunables::default();

    let issue = store.transact(|txn| {
        ItemBuilder::keyed("is-1", "Orphaned work").put(txn)
    });
    let reader = store.snapshot();
    let resolved = filter
        .resolve(&ResolveContext::one_off(&*reader, &tunables))
        .unwrap();
    assert!(!resolved.matches(&*reader, issue));

    // The referenced user appears later; re-resolution picks it up.
    let charlie = store.transact(|txn| {
        ItemBuilder::keyed("charlie", "Charlie").put(txn)
    });
    store.transact(|txn| txn.set_attr(issue, "assignee", spindle_query::model::AttrValue::Ref(charlie)));

    let reader = store.snapshot();
    let resolved = filter
        .resolve(&ResolveContext::one_off(&*reader, &tunables))
        .unwrap();
    assert!(resolved.matches(&*reader, issue));
}

#[test]
fn narrowing_scopes_enum_subsets_to_the_source_axis() {
    let descriptor = Descriptor::Enum(
        EnumDescriptor::new("version").with_narrower(Narrower::SourceFiltered {
            axis: spindle_query::model::Attribute::new("source"),
        }),
    );
    let data = ConstraintData::new("version").with(
        F_SUBSET,
        FieldValue::Refs(vec![
            ItemKey::resolved("v1", ItemId(11), "1.0")
                .with_source(SourceId::new("tracker-a")),
            ItemKey::resolved("v2", ItemId(12), "2.0")
                .with_source(SourceId::new("tracker-b")),
        ]),
    );

    let store = MemStore::new();
    let (scoped, unscoped) = store.transact(|txn| {
        for _ in 0..10 {
            // Burn handles so refs above stay dangling on purpose.
            ItemBuilder::keyed("pad", "Pad").put(txn);
        }
        let scoped = ItemBuilder::keyed("is-1", "In A")
            .with_ref("version", ItemId(11))
            .put(txn);
        let unscoped = ItemBuilder::keyed("is-2", "In B")
            .with_ref("version", ItemId(12))
            .put(txn);
        (scoped, unscoped)
    });

    let cube = Hypercube::unrestricted().with_axis(
        "source",
        [AxisValue::Source(SourceId::new("tracker-a"))],
    );
    let filter = descriptor.create_filter(&data, &cube).unwrap();
    let reader = store.snapshot();
    let tunables = Tunables::default();
    let resolved = filter
        .resolve(&ResolveContext::one_off(&*reader, &tunables))
        .unwrap();
    assert!(resolved.matches(&*reader, scoped));
    assert!(!resolved.matches(&*reader, unscoped));

    // Without the axis, both versions stay in scope.
    let filter = descriptor
        .create_filter(&data, &Hypercube::unrestricted())
        .unwrap();
    let resolved = filter
        .resolve(&ResolveContext::one_off(&*reader, &tunables))
        .unwrap();
    assert!(resolved.matches(&*reader, scoped));
    assert!(resolved.matches(&*reader, unscoped));
}

#[test]
fn relative_date_boundary_moves_with_transaction_time() {
    let t0 = Utc.with_ymd_and_hms(2026, 3, 14, 15, 0, 0).unwrap();
    let store = pinned_store(t0);
    let issue = store.transact(|txn| {
        ItemBuilder::keyed("is-1", "Aging issue")
            .with_date("updated", t0 - Duration::days(7))
            .put(txn)
    });

    let descriptor = Descriptor::Date(DateDescriptor::new("updated"));
    let data = ConstraintData::new("updated").with(
        F_AFTER,
        FieldValue::Date(DateValue::back(7, CalendarUnit::Day, BoundSide::After)),
    );
    let filter = descriptor
        .create_filter(&data, &Hypercube::unrestricted())
        .unwrap();
    let tunables = Tunables::default();

    // At t0 the item sits exactly at the seven-day boundary: still in.
    let reader = store.snapshot();
    let resolved = filter
        .resolve(&ResolveContext::one_off(&*reader, &tunables))
        .unwrap();
    assert!(resolved.matches(&*reader, issue));

    // One day later the boundary is strictly later and the item ages out.
    store.advance(Duration::days(1));
    let reader = store.snapshot();
    let resolved = filter
        .resolve(&ResolveContext::one_off(&*reader, &tunables))
        .unwrap();
    assert!(!resolved.matches(&*reader, issue));
}

#[test]
fn live_resolution_schedules_and_cancels_wakeups_with_lifetime() {
    let t0 = Utc.with_ymd_and_hms(2026, 3, 14, 15, 0, 0).unwrap();
    let store = pinned_store(t0);
    let descriptor = Descriptor::Date(DateDescriptor::new("updated"));
    let data = ConstraintData::new("updated")
        .with(F_PRESET, FieldValue::Text("this-week".to_string()));
    let filter = descriptor
        .create_filter(&data, &Hypercube::unrestricted())
        .unwrap();

    let tunables = Tunables::default();
    let scheduler = RecordingScheduler::new();
    let lifetime = Lifetime::new();
    let reader = store.snapshot();
    let ctx = ResolveContext::live(
        &*reader,
        &tunables,
        &lifetime,
        &scheduler,
        Arc::new(|| {}),
    );
    filter.resolve(&ctx).unwrap();

    // Both preset bounds are week-relative: two wake-ups at the next week
    // boundary plus the margin. 2026-03-14 is a Saturday; the week starts
    // Monday 2026-03-09, so the next boundary is Monday 2026-03-16.
    let expected = Utc.with_ymd_and_hms(2026, 3, 16, 0, 0, 0).unwrap()
        + Duration::milliseconds(tunables.resubscribe_margin_ms);
    assert_eq!(scheduler.requests(), vec![expected, expected]);

    // Ending the lifetime drops (cancels) the attached handles; this must
    // not panic and further resolutions schedule nothing new afterwards.
    lifetime.end();
    let ctx = ResolveContext::live(
        &*reader,
        &tunables,
        &lifetime,
        &scheduler,
        Arc::new(|| {}),
    );
    filter.resolve(&ctx).unwrap();
    assert_eq!(scheduler.requests().len(), 2);
}

#[test]
fn future_due_filter_accepts_undated_items_within_margin() {
    let t0 = Utc.with_ymd_and_hms(2026, 3, 14, 12, 0, 0).unwrap();
    let store = pinned_store(t0);
    let (due_later, undated) = store.transact(|txn| {
        let due_later = ItemBuilder::keyed("is-1", "Planned")
            .with_date("due", t0 + Duration::days(14))
            .put(txn);
        let undated = ItemBuilder::keyed("is-2", "Unplanned").put(txn);
        (due_later, undated)
    });

    let descriptor = Descriptor::Date(DateDescriptor::new("due"));
    let data = ConstraintData::new("due")
        .with(
            F_AFTER,
            FieldValue::Date(DateValue::Relative {
                offset: 1,
                unit: CalendarUnit::Week,
                side: BoundSide::After,
            }),
        )
        .with(F_ACCEPT_EMPTY, FieldValue::Flag(true));
    let filter = descriptor
        .create_filter(&data, &Hypercube::unrestricted())
        .unwrap();
    let tunables = Tunables::default();

    let reader = store.snapshot();
    let resolved = filter
        .resolve(&ResolveContext::one_off(&*reader, &tunables))
        .unwrap();
    assert!(resolved.matches(&*reader, due_later));
    assert!(resolved.matches(&*reader, undated));

    // A bound just behind "now" still counts as future inside the skew
    // margin.
    let skew_data = ConstraintData::new("due")
        .with(
            F_AFTER,
            FieldValue::Date(DateValue::Absolute(t0 - Duration::milliseconds(1000))),
        )
        .with(F_ACCEPT_EMPTY, FieldValue::Flag(true));
    let filter = descriptor
        .create_filter(&skew_data, &Hypercube::unrestricted())
        .unwrap();
    let resolved = filter
        .resolve(&ResolveContext::one_off(&*reader, &tunables))
        .unwrap();
    assert!(resolved.matches(&*reader, undated));

    // Beyond the margin the bound is plainly past: undated items drop out.
    let past_data = ConstraintData::new("due")
        .with(
            F_AFTER,
            FieldValue::Date(DateValue::Absolute(t0 - Duration::seconds(30))),
        )
        .with(F_ACCEPT_EMPTY, FieldValue::Flag(true));
    let filter = descriptor
        .create_filter(&past_data, &Hypercube::unrestricted())
        .unwrap();
    let resolved = filter
        .resolve(&ResolveContext::one_off(&*reader, &tunables))
        .unwrap();
    assert!(!resolved.matches(&*reader, undated));
}

#[test]
fn subtree_filter_matches_descendant_components() {
    let store = MemStore::new();
    let (ui, forms, widgets, other, issue_forms, issue_other) = store.transact(|txn| {
        let ui = ItemBuilder::keyed("ui", "UI").put(txn);
        let forms = ItemBuilder::keyed("forms", "Forms").with_ref("parent", ui).put(txn);
        let widgets = ItemBuilder::keyed("widgets", "Widgets")
            .with_ref("parent", forms)
            .put(txn);
        let other = ItemBuilder::keyed("backend", "Backend").put(txn);
        let issue_forms = ItemBuilder::keyed("is-1", "Form bug")
            .with_ref("component", widgets)
            .put(txn);
        let issue_other = ItemBuilder::keyed("is-2", "API bug")
            .with_ref("component", other)
            .put(txn);
        (ui, forms, widgets, other, issue_forms, issue_other)
    });
    let _ = (forms, widgets, other);

    let descriptor = Descriptor::Enum(
        EnumDescriptor::new("component").with_parent_attr("parent"),
    );
    let data = ConstraintData::new("component")
        .with(
            F_SUBSET,
            FieldValue::Refs(vec![ItemKey::resolved("ui", ui, "UI")]),
        )
        .with(F_UNDER, FieldValue::Flag(true));
    let filter = descriptor
        .create_filter(&data, &Hypercube::unrestricted())
        .unwrap();
    let tunables = Tunables::default();

    let reader = store.snapshot();
    let resolved = filter
        .resolve(&ResolveContext::one_off(&*reader, &tunables))
        .unwrap();
    assert!(resolved.matches(&*reader, issue_forms));
    assert!(!resolved.matches(&*reader, issue_other));
}

#[test]
fn combined_filters_conjoin_and_evaluate() {
    let t0 = Utc.with_ymd_and_hms(2026, 3, 14, 12, 0, 0).unwrap();
    let store = pinned_store(t0);
    let (match_all, wrong_text) = store.transact(|txn| {
        let alice = ItemBuilder::keyed("alice", "Alice").put(txn);
        let match_all = ItemBuilder::keyed("is-1", "login crash")
            .with_text("summary", "Crash at login")
            .with_ref("assignee", alice)
            .put(txn);
        let wrong_text = ItemBuilder::keyed("is-2", "styling")
            .with_text("summary", "Button misaligned")
            .with_ref("assignee", alice)
            .put(txn);
        (match_all, wrong_text)
    });

    let enum_descriptor = Descriptor::Enum(EnumDescriptor::new("assignee"));
    let text_descriptor = Descriptor::Text(TextDescriptor::new("summary"));

    let enum_data = ConstraintData::new("assignee")
        .with(F_SUBSET, FieldValue::Refs(vec![ItemKey::unresolved("alice")]));
    let text_data = ConstraintData::new("summary")
        .with(F_TEXT, FieldValue::Text("crash".to_string()));

    let cube = Hypercube::unrestricted();
    let combined = spindle_query::Predicate::and([
        enum_descriptor.create_filter(&enum_data, &cube).unwrap(),
        text_descriptor.create_filter(&text_data, &cube).unwrap(),
    ]);

    let reader = store.snapshot();
    let tunables = Tunables::default();
    let resolved = combined
        .resolve(&ResolveContext::one_off(&*reader, &tunables))
        .unwrap();
    let matched = resolved.select(&*reader, &all_items(&store, 3));
    assert_eq!(matched, vec![match_all]);
    let _ = wrong_text;
}
