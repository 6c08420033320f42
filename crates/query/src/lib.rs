//! Query layer for Mica: predicates, materialized views, aggregation.
//!
//! Built entirely on the engine crate's transaction surface. A query
//! run pins nothing extra; the resulting `TableView` is a snapshot of
//! matching keys that the caller refreshes explicitly.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod aggregate;
pub mod predicate;
pub mod view;

pub use predicate::{CmpOp, MatchMode, Predicate};
pub use view::{Query, TableView};

#[cfg(test)]
mod tests {
    use super::*;
    use mica_core::{ColumnAttrs, ColumnType, LinkType, Value};
    use mica_engine::{Store, StoreConfig, Transaction};

    fn seeded_store() -> Store {
        let store = Store::open(StoreConfig::in_memory()).unwrap();
        let mut txn = store.begin_write().unwrap();
        txn.create_table("person").unwrap();
        txn.add_column("person", "name", ColumnType::String, false, ColumnAttrs::NONE)
            .unwrap();
        txn.add_column("person", "age", ColumnType::Int, true, ColumnAttrs::INDEXED)
            .unwrap();
        txn.add_column("person", "city", ColumnType::String, false, ColumnAttrs::NONE)
            .unwrap();
        for (name, age, city) in [
            ("ada", Some(36), "london"),
            ("brian", Some(70), "murray hill"),
            ("grace", Some(85), "arlington"),
            ("ken", None, "murray hill"),
            ("rob", Some(70), "murray hill"),
        ] {
            let k = txn.create_object("person").unwrap();
            txn.set("person", k, "name", Value::String(name.into()))
                .unwrap();
            if let Some(age) = age {
                txn.set("person", k, "age", Value::Int(age)).unwrap();
            } else {
                txn.set("person", k, "age", Value::Null).unwrap();
            }
            txn.set("person", k, "city", Value::String(city.into()))
                .unwrap();
        }
        txn.commit().unwrap();
        store
    }

    fn names(txn: &Transaction, view: &TableView) -> Vec<String> {
        view.keys()
            .iter()
            .map(|&k| {
                txn.get("person", k, "name")
                    .unwrap()
                    .as_str()
                    .unwrap()
                    .to_string()
            })
            .collect()
    }

    #[test]
    fn test_filter_scan() {
        let store = seeded_store();
        let txn = store.begin_read().unwrap();
        let view = Query::table("person")
            .filter(Predicate::gt("age", 50i64))
            .run(&txn)
            .unwrap();
        assert_eq!(names(&txn, &view), vec!["brian", "grace", "rob"]);
    }

    #[test]
    fn test_indexed_eq_matches_scan() {
        let store = seeded_store();
        let txn = store.begin_read().unwrap();
        let query = Query::table("person").filter(Predicate::eq("age", 70i64));
        let view = query.run(&txn).unwrap();
        assert_eq!(names(&txn, &view), vec!["brian", "rob"]);
    }

    #[test]
    fn test_sort_puts_nulls_first() {
        let store = seeded_store();
        let txn = store.begin_read().unwrap();
        let view = Query::table("person")
            .sorted_by("age", true)
            .run(&txn)
            .unwrap();
        assert_eq!(names(&txn, &view), vec!["ken", "ada", "brian", "rob", "grace"]);

        let view = Query::table("person")
            .sorted_by("age", false)
            .run(&txn)
            .unwrap();
        assert_eq!(names(&txn, &view), vec!["grace", "brian", "rob", "ada", "ken"]);
    }

    #[test]
    fn test_distinct_keeps_first_per_value() {
        let store = seeded_store();
        let txn = store.begin_read().unwrap();
        let view = Query::table("person")
            .distinct_on("city")
            .run(&txn)
            .unwrap();
        assert_eq!(names(&txn, &view), vec!["ada", "brian", "grace"]);
    }

    #[test]
    fn test_limit_truncates_after_sort() {
        let store = seeded_store();
        let txn = store.begin_read().unwrap();
        let view = Query::table("person")
            .sorted_by("age", false)
            .limit(2)
            .run(&txn)
            .unwrap();
        assert_eq!(names(&txn, &view), vec!["grace", "brian"]);
    }

    #[test]
    fn test_string_match_modes() {
        let store = seeded_store();
        let txn = store.begin_read().unwrap();
        let view = Query::table("person")
            .filter(Predicate::matches("city", MatchMode::BeginsWith, "murray"))
            .run(&txn)
            .unwrap();
        assert_eq!(view.len(), 3);
        let view = Query::table("person")
            .filter(Predicate::matches("name", MatchMode::Contains, "ra"))
            .run(&txn)
            .unwrap();
        assert_eq!(names(&txn, &view), vec!["grace"]);
    }

    #[test]
    fn test_view_staleness_and_refresh() {
        let store = seeded_store();
        let mut reader = store.begin_read().unwrap();
        let mut view = Query::table("person").run(&reader).unwrap();
        assert_eq!(view.len(), 5);
        assert!(view.is_in_sync(&reader));

        let mut writer = store.begin_write().unwrap();
        let k = writer.create_object("person").unwrap();
        writer
            .set("person", k, "name", Value::String("dennis".into()))
            .unwrap();
        writer.commit().unwrap();

        // The reader has not advanced, so the view is still current
        assert!(view.is_in_sync(&reader));
        reader.advance_read().unwrap();
        assert!(!view.is_in_sync(&reader));
        assert!(view.sync_if_needed(&reader).unwrap());
        assert_eq!(view.len(), 6);
        assert!(!view.sync_if_needed(&reader).unwrap());
    }

    #[test]
    fn test_traverse_link_predicate() {
        let store = Store::open(StoreConfig::in_memory()).unwrap();
        let mut txn = store.begin_write().unwrap();
        txn.create_table("team").unwrap();
        txn.add_column("team", "name", ColumnType::String, false, ColumnAttrs::NONE)
            .unwrap();
        txn.create_table("player").unwrap();
        txn.add_link_column("player", "team", "team", LinkType::Weak)
            .unwrap();
        let blue = txn.create_object("team").unwrap();
        txn.set("team", blue, "name", Value::String("blue".into()))
            .unwrap();
        let red = txn.create_object("team").unwrap();
        txn.set("team", red, "name", Value::String("red".into()))
            .unwrap();
        let p1 = txn.create_object("player").unwrap();
        txn.set("player", p1, "team", Value::Link(blue)).unwrap();
        let p2 = txn.create_object("player").unwrap();
        txn.set("player", p2, "team", Value::Link(red)).unwrap();
        let p3 = txn.create_object("player").unwrap();
        txn.commit().unwrap();

        let txn = store.begin_read().unwrap();
        let view = Query::table("player")
            .filter(Predicate::traverse("team", Predicate::eq("name", "blue")))
            .run(&txn)
            .unwrap();
        assert_eq!(view.keys(), &[p1]);
        // A null link fails the traversal rather than erroring
        let view = Query::table("player")
            .filter(Predicate::Not(Box::new(Predicate::traverse(
                "team",
                Predicate::True,
            ))))
            .run(&txn)
            .unwrap();
        assert_eq!(view.keys(), &[p3]);
    }

    #[test]
    fn test_aggregates_skip_nulls() {
        let store = seeded_store();
        let txn = store.begin_read().unwrap();
        let view = Query::table("person").run(&txn).unwrap();
        assert_eq!(view.count(&txn, "age").unwrap(), 4);
        assert_eq!(view.sum(&txn, "age").unwrap(), Value::Int(261));
        assert_eq!(view.average(&txn, "age").unwrap(), Some(261.0 / 4.0));
        assert_eq!(view.min(&txn, "age").unwrap(), Some(Value::Int(36)));
        assert_eq!(view.max(&txn, "age").unwrap(), Some(Value::Int(85)));
    }

    #[test]
    fn test_aggregates_on_empty_and_all_null() {
        let store = seeded_store();
        let txn = store.begin_read().unwrap();
        let view = Query::table("person")
            .filter(Predicate::eq("name", "nobody"))
            .run(&txn)
            .unwrap();
        assert!(view.is_empty());
        assert_eq!(view.sum(&txn, "age").unwrap(), Value::Int(0));
        assert_eq!(view.average(&txn, "age").unwrap(), None);
        assert_eq!(view.min(&txn, "age").unwrap(), None);
    }

    #[test]
    fn test_sum_rejects_non_numeric() {
        let store = seeded_store();
        let txn = store.begin_read().unwrap();
        let view = Query::table("person").run(&txn).unwrap();
        assert!(matches!(
            view.sum(&txn, "name"),
            Err(mica_core::Error::TypeMismatch { .. })
        ));
    }
}
