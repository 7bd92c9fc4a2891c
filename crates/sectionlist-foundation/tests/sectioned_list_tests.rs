use std::time::Duration;

use sectionlist_core::{diff, IndexPath, ListModel};
use sectionlist_foundation::lazy::PrefetchStrategy;
use sectionlist_foundation::{ListConfig, ViewCachePolicy};
use sectionlist_testing::{item_id, snapshot, DataSourceEvent, ListTestRule};

fn paths(section: usize, items: std::ops::RangeInclusive<usize>) -> Vec<IndexPath> {
    items.map(|item| IndexPath::new(section, item)).collect()
}

#[test]
fn test_reapplying_snapshot_has_no_side_effects() {
    let mut rule = ListTestRule::default();
    let content = snapshot(&[("a", 0..30), ("b", 0..30)]);
    assert!(rule.set_content(content.clone()));
    rule.scroll_to(0, 10..=14);
    rule.list_mut().render_object(IndexPath::new(0, 10));
    rule.flush();
    rule.take_events();
    let stats = rule.list().stats();

    assert!(!rule.set_content(content));
    assert!(rule.take_events().is_empty());
    assert_eq!(rule.list().stats(), stats);
    assert!(rule.flush().is_empty());
    assert_eq!(rule.view().batches_applied(), 1);
}

#[test]
fn test_view_follows_every_snapshot() {
    let mut rule = ListTestRule::default();
    let versions = [
        snapshot(&[("a", vec![1, 2, 3, 4, 5])]),
        snapshot(&[("a", vec![5, 4, 3, 2, 1]), ("b", vec![1, 2])]),
        snapshot(&[("b", vec![2, 9]), ("c", vec![]), ("a", vec![3, 1])]),
        snapshot(&[("c", vec![7, 8, 9])]),
        snapshot::<Vec<u32>>(&[]),
    ];
    for version in versions {
        rule.set_content(version);
        rule.assert_view_matches_snapshot();
    }
}

#[test]
fn test_diff_applied_to_model_reproduces_target() {
    let a = snapshot(&[("x", vec![1, 2, 3, 4, 5, 6]), ("y", vec![10, 11])]);
    let b = snapshot(&[("y", vec![11, 3, 10]), ("x", vec![6, 1, 2, 5, 4])]);

    let mut model = ListModel::from_snapshot(&a);
    model.apply_script(&diff(&a, &b)).unwrap();
    assert!(model.matches(&b));
}

#[test]
fn test_cache_bound_keeps_most_recent_items() {
    let config = ListConfig::default()
        .cache(ViewCachePolicy::new(3))
        .prefetch(PrefetchStrategy::disabled());
    let mut rule = ListTestRule::with_config(config);
    rule.set_content(snapshot(&[("a", 0..10)]));

    for item in 0..8 {
        rule.list_mut().render_object(IndexPath::new(0, item));
    }

    let resident: Vec<_> = rule.list().cache().keys_by_recency().collect();
    assert_eq!(resident, vec![item_id("a", 5), item_id("a", 6), item_id("a", 7)]);
    assert_eq!(rule.list().stats().evictions, 5);
}

#[test]
fn test_visible_and_pinned_items_survive_pressure() {
    let config = ListConfig::default()
        .cache(ViewCachePolicy::new(2))
        .prefetch(PrefetchStrategy::disabled());
    let mut rule = ListTestRule::with_config(config);
    rule.set_content(snapshot(&[("a", 0..20)]));
    rule.show(0, 0..=0);
    rule.list_mut().cache_pin(item_id("a", 1));

    for item in 0..20 {
        rule.list_mut().render_object(IndexPath::new(0, item));
    }

    let mut resident: Vec<_> = rule.list().cache().keys_by_recency().collect();
    resident.sort();
    let mut protected = vec![item_id("a", 0), item_id("a", 1)];
    protected.sort();
    assert_eq!(resident, protected);
    assert_eq!(rule.list().cache().len(), 2);
    assert_eq!(rule.list().stats().evictions, 18);
    assert_eq!(rule.list().stats().items_in_use, 1);
}

#[test]
fn test_reused_render_object_is_refreshed() {
    let mut rule = ListTestRule::default();
    rule.set_content(snapshot(&[("a", 0..5)]));

    let first = rule.list_mut().render_object(IndexPath::new(0, 2)).unwrap();
    let second = rule.list_mut().render_object(IndexPath::new(0, 2)).unwrap();

    assert_eq!(first.serial, second.serial);
    assert_eq!(second.updates(), 1);
    assert_eq!(
        rule.take_events(),
        vec![
            DataSourceEvent::Materialize(item_id("a", 2)),
            DataSourceEvent::Update(item_id("a", 2)),
        ]
    );
}

#[test]
fn test_persistent_items_outlive_auto_cache() {
    let config = ListConfig::default()
        .cache(ViewCachePolicy::new(1))
        .prefetch(PrefetchStrategy::disabled());
    let mut rule = ListTestRule::with_config(config);
    rule.set_content(snapshot(&[("a", 0..10)]));

    let header = rule.list_mut().render_object(IndexPath::new(0, 0)).unwrap();
    rule.list_mut().cache_persist(item_id("a", 0), header.clone());
    for item in 1..10 {
        rule.list_mut().render_object(IndexPath::new(0, item));
    }

    let again = rule.list_mut().render_object(IndexPath::new(0, 0)).unwrap();
    assert_eq!(again.serial, header.serial);
    assert_eq!(rule.list().stats().persistent_items, 1);

    assert!(rule.list_mut().cache_forget(&item_id("a", 0)).is_some());
    rule.list_mut().cache_clear();
    assert!(rule.list().cache().is_empty());
}

#[test]
fn test_prefetch_window_around_visible_range() {
    let mut rule = ListTestRule::new(5);
    rule.set_content(snapshot(&[("a", 0..50)]));
    rule.scroll_to(0, 20..=24);
    rule.flush();

    let mut expected = paths(0, 15..=19);
    expected.extend(paths(0, 25..=29));
    assert_eq!(rule.in_flight_paths(), expected);
}

#[test]
fn test_unchanged_window_converges() {
    let mut rule = ListTestRule::new(5);
    rule.set_content(snapshot(&[("a", 0..50)]));
    rule.scroll_to(0, 20..=24);
    rule.flush();
    rule.take_events();

    rule.scroll_to(0, 20..=24);
    assert!(rule.flush().is_empty());
    assert!(rule.take_events().is_empty());
}

#[test]
fn test_prefetch_spills_into_previous_section() {
    let mut rule = ListTestRule::new(5);
    rule.set_content(snapshot(&[("a", 0..10), ("b", 0..10)]));
    rule.scroll_to(1, 0..=2);
    rule.flush();

    let mut expected = paths(0, 5..=9);
    expected.extend(paths(1, 3..=7));
    assert_eq!(rule.in_flight_paths(), expected);
}

#[test]
fn test_scrolling_cancels_departed_window() {
    let mut rule = ListTestRule::new(5);
    rule.set_content(snapshot(&[("a", 0..60)]));
    rule.scroll_to(0, 20..=24);
    rule.flush();
    rule.take_events();

    rule.scroll_to(0, 35..=39);
    rule.flush();

    let events = rule.take_events();
    let expected_cancel: Vec<_> = (15..=19)
        .chain(25..=29)
        .map(|item| item_id("a", item))
        .collect();
    let expected_prefetch: Vec<_> = (30..=34)
        .chain(40..=44)
        .map(|item| item_id("a", item))
        .collect();
    assert_eq!(
        events,
        vec![
            DataSourceEvent::Cancel(expected_cancel),
            DataSourceEvent::Prefetch(expected_prefetch),
        ]
    );
}

#[test]
fn test_removed_item_in_window_is_cancelled_under_old_identity() {
    let mut rule = ListTestRule::new(2);
    rule.set_content(snapshot(&[("a", 0..10)]));
    rule.scroll_to(0, 4..=5);
    rule.flush();
    rule.take_events();

    rule.set_content(snapshot(&[("a", vec![0, 1, 2, 3, 4, 5, 7, 8, 9])]));
    rule.flush();

    assert_eq!(rule.data_source().cancelled(), vec![item_id("a", 6)]);
    assert_eq!(rule.data_source().prefetched(), vec![item_id("a", 8)]);
}

#[test]
fn test_boundaries_reported_on_entry() {
    let mut rule = ListTestRule::new(2);
    rule.set_content(snapshot(&[("a", 0..5), ("b", 0..5)]));
    rule.scroll_to(0, 0..=2);
    rule.scroll_to(1, 2..=4);
    rule.show(1, 1..=1);

    assert_eq!(
        rule.data_source().boundaries(),
        vec![
            sectionlist_foundation::Boundary::Start,
            sectionlist_foundation::Boundary::End,
        ]
    );
}

#[test]
fn test_background_worker_delivers_latest_window() {
    let strategy = PrefetchStrategy::new(5).coalesce_window(Duration::from_millis(10));
    let mut rule = ListTestRule::with_config(ListConfig::default().prefetch(strategy));
    rule.set_content(snapshot(&[("a", 0..100)]));

    rule.scroll_to(0, 10..=14);
    rule.scroll_to(0, 40..=44);
    rule.await_idle();

    let mut expected = paths(0, 35..=39);
    expected.extend(paths(0, 45..=49));
    assert_eq!(rule.in_flight_paths(), expected);
    assert!(rule.list().stats().batches_applied >= 1);
}

#[test]
fn test_background_results_for_old_snapshot_are_discarded() {
    let strategy = PrefetchStrategy::new(3).coalesce_window(Duration::from_millis(10));
    let mut rule = ListTestRule::with_config(ListConfig::default().prefetch(strategy));
    rule.set_content(snapshot(&[("a", 0..20)]));
    rule.scroll_to(0, 5..=6);
    rule.set_content(snapshot(&[("a", 0..40)]));
    rule.await_idle();

    let mut expected = paths(0, 2..=4);
    expected.extend(paths(0, 7..=9));
    assert_eq!(rule.in_flight_paths(), expected);
    assert_eq!(rule.list().generation(), 2);
}
