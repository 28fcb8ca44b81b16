//! End-to-end tests for archive, restore, resolution and purge

mod common;

use common::TestFixture;
use permafrost::PermafrostError;
use std::fs;

const V1: &str = "id,amount\n1,10\n2,20\n3,30\n";
const V2: &str = "id,amount\n1,10\n2,25\n3,30\n";
const V3: &str = "id,amount\n2,25\n3,30\n4,40\n";

#[test]
fn test_versions_count_up_from_one() {
    let fixture = TestFixture::new().unwrap();
    let mut manager = fixture.manager().unwrap();

    let path = fixture.create_csv("sales.csv", V1).unwrap();
    for i in 0..5 {
        let record = manager.archive(&path, true).unwrap();
        assert_eq!(record.version, i + 1);
    }

    let versions: Vec<u32> = manager
        .list_versions("sales.csv")
        .unwrap()
        .iter()
        .map(|r| r.version)
        .collect();
    assert_eq!(versions, vec![1, 2, 3, 4, 5]);
}

#[test]
fn test_archive_restore_purge_lifecycle() {
    let fixture = TestFixture::new().unwrap();
    let mut manager = fixture.manager().unwrap();

    let path = fixture.create_csv("sales.csv", V1).unwrap();
    manager.archive(&path, true).unwrap();
    fs::write(&path, V2).unwrap();
    manager.archive(&path, true).unwrap();
    fs::write(&path, V3).unwrap();
    manager.archive(&path, true).unwrap();

    // Unversioned restore brings back the latest content
    fs::write(&path, "scratch").unwrap();
    let outcome = manager.restore("sales", None).unwrap();
    assert_eq!(outcome.record.version, 3);
    assert_eq!(fs::read_to_string(&path).unwrap(), V3);

    // Explicit version restores that exact content
    let outcome = manager.restore("sales", Some(1)).unwrap();
    assert_eq!(outcome.record.version, 1);
    assert_eq!(fs::read_to_string(&path).unwrap(), V1);

    // Purging the middle version leaves the others resolvable
    let purged = manager.purge("sales", Some(2)).unwrap();
    assert_eq!(purged.removed.len(), 1);

    let versions: Vec<u32> = manager
        .list_versions("sales")
        .unwrap()
        .iter()
        .map(|r| r.version)
        .collect();
    assert_eq!(versions, vec![1, 3]);

    assert!(matches!(
        manager.restore("sales", Some(2)),
        Err(PermafrostError::NotFound { .. })
    ));
    assert!(manager.restore("sales", Some(3)).is_ok());
}

#[test]
fn test_archive_name_resolution_matches_versioned_lookup() {
    let fixture = TestFixture::new().unwrap();
    let mut manager = fixture.manager().unwrap();

    let path = fixture.create_csv("sales.csv", V1).unwrap();
    manager.archive(&path, true).unwrap();
    fs::write(&path, V2).unwrap();
    let second = manager.archive(&path, true).unwrap();
    assert_eq!(second.archive_name, "sales_v2.csv");

    let by_name = manager.restore("sales_v2.csv", None).unwrap();
    let by_version = manager.restore("sales.csv", Some(2)).unwrap();
    assert_eq!(by_name.record.id, by_version.record.id);
}

#[test]
fn test_ambiguous_fragment_lists_candidates() {
    let fixture = TestFixture::new().unwrap();
    let mut manager = fixture.manager().unwrap();

    let north = fixture.create_csv("north/sales.csv", V1).unwrap();
    let south = fixture.create_csv("south/sales.csv", V2).unwrap();
    manager.archive(&north, true).unwrap();
    manager.archive(&south, true).unwrap();

    match manager.restore("sales", None) {
        Err(PermafrostError::Ambiguous { candidates, .. }) => {
            assert_eq!(candidates.len(), 2);
        }
        other => panic!(
            "expected Ambiguous, got {:?}",
            other.map(|o| o.record.archive_name)
        ),
    }

    // A longer fragment narrows to a single path
    let outcome = manager.restore("north", None).unwrap();
    assert!(outcome.record.original_path.contains("north"));
}

#[test]
fn test_unknown_spec_is_not_found() {
    let fixture = TestFixture::new().unwrap();
    let manager = fixture.manager().unwrap();

    assert!(matches!(
        manager.restore("nothing-archived", None),
        Err(PermafrostError::NotFound { .. })
    ));
}

#[test]
fn test_purge_all_versions_removes_blobs() {
    let fixture = TestFixture::new().unwrap();
    let mut manager = fixture.manager().unwrap();

    let path = fixture.create_csv("sales.csv", V1).unwrap();
    manager.archive(&path, true).unwrap();
    fs::write(&path, V2).unwrap();
    manager.archive(&path, true).unwrap();

    let purged = manager.purge("sales", None).unwrap();
    assert_eq!(purged.removed.len(), 2);
    for record in &purged.removed {
        assert!(!record.storage_path.exists());
    }

    assert!(matches!(
        manager.purge("sales", None),
        Err(PermafrostError::NotFound { .. })
    ));
}

#[test]
fn test_stats_reflect_archives() {
    let fixture = TestFixture::new().unwrap();
    let mut manager = fixture.manager().unwrap();

    let sales = fixture.create_csv("sales.csv", V1).unwrap();
    let costs = fixture.create_csv("costs.csv", V2).unwrap();
    manager.archive(&sales, true).unwrap();
    fs::write(&sales, V2).unwrap();
    manager.archive(&sales, true).unwrap();
    manager.archive(&costs, true).unwrap();

    let overall = manager.stats(None).unwrap();
    assert_eq!(overall.archive_count, 3);
    assert_eq!(overall.path_count, 2);
    assert_eq!(
        overall.total_original,
        (V1.len() + V2.len() + V2.len()) as u64
    );

    let scoped = manager.stats(Some("sales")).unwrap();
    assert_eq!(scoped.archive_count, 2);
    assert_eq!(scoped.latest_version, Some(2));
}

#[test]
fn test_created_at_is_non_decreasing_per_path() {
    let fixture = TestFixture::new().unwrap();
    let mut manager = fixture.manager().unwrap();

    let path = fixture.create_csv("sales.csv", V1).unwrap();
    for _ in 0..3 {
        manager.archive(&path, false).unwrap();
    }

    let records = manager.list_versions("sales").unwrap();
    for pair in records.windows(2) {
        assert!(pair[0].created_at <= pair[1].created_at);
        assert!(pair[0].version < pair[1].version);
    }
}
