//! Property-based tests for sweep invariants.
//!
//! These tests use proptest to verify invariants hold across
//! randomly generated statistics tables.

#![allow(clippy::expect_used, clippy::unwrap_used)]

mod common;

use proptest::prelude::*;
use tokio_test::block_on;

use statsweep_core::IndexId;
use statsweep_gc::keys::StatsRowKey;
use statsweep_gc::store::{StatsRow, StatsTableHandle, StatsTableKind};
use statsweep_gc::{ColumnStatsSweeper, Expiry, Verdict, classify};

use common::{HIVE, ORDERS, ORDERS_MV, ORDERS_VIEW, SALES_DB, World, policy, row};

/// Raw key parts of a generated row, without its id.
type Parts = (i64, i64, i64, i64, &'static str, Option<&'static str>);

/// Generates key parts mixing live and dropped objects at every level.
fn arb_internal_parts() -> impl Strategy<Value = Parts> {
    (
        prop::sample::select(vec![0_i64, 0, 0, 4242]),
        prop::sample::select(vec![SALES_DB, SALES_DB, 99]),
        prop::sample::select(vec![ORDERS, ORDERS, ORDERS_VIEW, 500]),
        prop::sample::select(vec![-1_i64, -1, ORDERS_MV, 77]),
        prop::sample::select(vec!["id", "amount", "gone", "mva_SUM__amount"]),
        prop::sample::select(vec![None, None, Some("p1"), Some("p2")]),
    )
}

/// Generates parts of a live federated catalog, with ids no internal row uses.
fn arb_external_parts() -> impl Strategy<Value = Parts> {
    (
        Just(HIVE),
        20_000_i64..20_010,
        30_000_i64..30_010,
        prop::sample::select(vec![-1_i64, 40_000]),
        prop::sample::select(vec!["c1", "c2"]),
        prop::sample::select(vec![None, Some("hp")]),
    )
}

fn to_rows(prefix: &str, parts: &[Parts]) -> Vec<StatsRow> {
    parts
        .iter()
        .enumerate()
        .map(|(i, (cat, db, tbl, idx, col, part))| {
            row(&format!("{prefix}{i}"), *cat, *db, *tbl, *idx, col, *part)
        })
        .collect()
}

fn row_id(row: &StatsRow) -> String {
    row.get(StatsRow::ID).unwrap().to_string()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// A row expires at its first missing level; every level above it is live.
    #[test]
    fn classification_stops_at_first_missing_level(parts in arb_internal_parts()) {
        let world = World::new();
        let snapshot = world.snapshot();
        let (cat, db, tbl, idx, col, part) = parts;
        let key = StatsRowKey::parse(&row("r", cat, db, tbl, idx, col, part)).unwrap();

        match classify(&snapshot, &key) {
            Verdict::Live | Verdict::ExternalCatalog => {}
            Verdict::Expired(Expiry::Catalog(_)) => {
                prop_assert!(!snapshot.contains_catalog(key.catalog_id));
            }
            Verdict::Expired(Expiry::Database(_)) => {
                prop_assert!(snapshot.contains_catalog(key.catalog_id));
                prop_assert!(!snapshot.contains_database(key.db_id));
            }
            Verdict::Expired(Expiry::Table(_)) => {
                prop_assert!(snapshot.contains_database(key.db_id));
                prop_assert!(snapshot.table(key.table_id).is_none());
            }
            Verdict::Expired(Expiry::Index(_)) => {
                prop_assert!(snapshot.table(key.table_id).is_some());
                prop_assert!(key.index_id != IndexId::NONE);
            }
            Verdict::Expired(Expiry::Column(id)) => {
                let table = snapshot.table(key.table_id).unwrap();
                prop_assert!(key.index_id == IndexId::NONE || snapshot.contains_mv_index(key.index_id));
                prop_assert!(table.column(&key.column_id).is_none());
                prop_assert_eq!(id, key.record_id.clone());
            }
            Verdict::Expired(Expiry::Partition(id)) => {
                let table = snapshot.table(key.table_id).unwrap();
                prop_assert!(table.kind.supports_partition_stats());
                prop_assert_eq!(Some(id), key.partition_id.clone());
            }
        }
    }

    /// Every scanned row contributes to at most one expired-key category.
    #[test]
    fn each_row_contributes_at_most_once(parts in prop::collection::vec(arb_internal_parts(), 0..60)) {
        let world = World::new();
        let rows = to_rows("r", &parts);
        world.store.insert_rows(StatsTableKind::ColumnLevel, rows.clone());

        let sweeper = ColumnStatsSweeper::new(world.store.clone(), policy(1_000, 1_000)).unwrap();
        let report = block_on(sweeper.sweep(
            &StatsTableHandle::new(StatsTableKind::ColumnLevel),
            &world.snapshot(),
        ))
        .unwrap();

        prop_assert_eq!(report.rows_scanned, rows.len() as u64);
        prop_assert!(report.keys_expired() <= report.rows_scanned);
        prop_assert_eq!(report.malformed_rows, 0);
    }

    /// Rows of a live federated catalog survive any number of cycles.
    #[test]
    fn external_rows_are_never_deleted(
        internal in prop::collection::vec(arb_internal_parts(), 0..40),
        external in prop::collection::vec(arb_external_parts(), 1..20),
    ) {
        let world = World::new();
        let external_rows = to_rows("ext", &external);
        world.store.insert_rows(StatsTableKind::ColumnLevel, to_rows("int", &internal));
        world.store.insert_rows(StatsTableKind::ColumnLevel, external_rows.clone());
        world.store.insert_rows(StatsTableKind::PartitionLevel, external_rows.clone());

        let scheduler = world.scheduler(policy(7, 10));
        for _ in 0..2 {
            let outcome = block_on(scheduler.run_cycle());
            prop_assert_eq!(outcome.label(), "completed");
        }

        for kind in StatsTableKind::ALL {
            let remaining: Vec<String> = world.store.rows(kind).iter().map(row_id).collect();
            for ext in &external_rows {
                prop_assert!(remaining.contains(&row_id(ext)));
            }
        }
    }

    /// No delete carries more values than the configured maximum.
    #[test]
    fn deletes_respect_the_quota(
        parts in prop::collection::vec(arb_internal_parts(), 0..120),
        quota in 10_usize..16,
        page in 1_u64..40,
    ) {
        let world = World::new();
        let mut rows = to_rows("r", &parts);
        // Distinct dropped tables so a single category can overflow the quota.
        rows.extend((0..parts.len() as i64).map(|i| {
            row(&format!("t{i}"), 0, SALES_DB, 1_000 + i, -1, "c", None)
        }));
        world.store.insert_rows(StatsTableKind::ColumnLevel, rows);

        let scheduler = world.scheduler(policy(page, quota));
        let outcome = block_on(scheduler.run_cycle());
        prop_assert_eq!(outcome.label(), "completed");

        for statement in world.store.executed() {
            prop_assert!(!statement.values.is_empty());
            prop_assert!(statement.values.len() <= quota);
        }
    }
}
