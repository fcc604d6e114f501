mod common;

use common::library;
use relorm::prelude::*;
use relorm::{QueryResult, StatsMonitor};
use std::collections::HashSet;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Hash, FromRow, Model)]
#[orm(table = "author")]
struct Author {
    id: i64,
    #[orm(column = "name")]
    display_name: String,
}

#[test]
fn model_metadata() {
    assert_eq!(Author::TABLE, "author");
    assert_eq!(Author::TABLE_NAME, "author");
    assert_eq!(Author::COLUMNS, ["id", "name"]);
    assert_eq!(Author::COL_DISPLAY_NAME, "name");
}

#[test]
fn find_by_primary_key_adds_no_limit() {
    let (db, log) = library();
    let author = Author::find(2).fetch_one(&db).unwrap().unwrap();
    assert_eq!(author.display_name, "Goethe");
    assert_eq!(log.statements()[0], "SELECT * FROM \"author\" WHERE \"id\" = ?");

    assert!(Author::find(42).fetch_one(&db).unwrap().is_none());
}

#[test]
fn fetch_one_injects_limit() {
    let (db, log) = library();
    let first = Author::select_all()
        .order([col("name")])
        .fetch_one(&db)
        .unwrap()
        .unwrap();
    assert_eq!(first.display_name, "Dante");
    assert!(log.statements()[0].ends_with("ORDER BY \"name\" ASC LIMIT 1"), "{:?}", log.statements());
}

#[test]
fn unique_key_lookup_limits_only_non_unique_columns() {
    let (db, log) = library();
    let by_code = Relation::table("country").filter_unique_key([("code", "DE")]);
    let germany = by_code.fetch_one(&db).unwrap().unwrap();
    assert_eq!(germany.get::<i64>("id").unwrap(), 2);
    assert!(!log.statements()[0].contains("LIMIT"), "{:?}", log.statements());

    log.clear();
    let by_author = Relation::table("book").filter_unique_key([("author_id", 1)]);
    let first = by_author.fetch_one(&db).unwrap().unwrap();
    assert_eq!(first.get::<i64>("author_id").unwrap(), 1);
    assert!(log.statements()[0].ends_with("LIMIT 1"), "{:?}", log.statements());
}

#[test]
fn cursor_is_sticky_after_the_end() {
    let (db, _) = library();
    let request = Author::all().order([col("id")]);
    let mut prepared = request.prepare(&db).unwrap();
    let mut cursor = prepared.fetch_cursor().unwrap();

    let mut names = Vec::new();
    while let Some(author) = cursor.try_next().unwrap() {
        names.push(author.display_name);
    }
    assert_eq!(names, ["Hugo", "Goethe", "Dante"]);
    assert!(cursor.is_done());
    assert!(cursor.try_next().unwrap().is_none());
    assert!(cursor.next().is_none());
}

#[test]
fn prepared_requests_refetch() {
    let (db, log) = library();
    let mut prepared = Author::all().prepare(&db).unwrap();
    assert_eq!(prepared.fetch_all().unwrap().len(), 3);
    db.execute("DELETE FROM author WHERE id = ?", &[Value::from(3)]).unwrap();
    assert_eq!(prepared.fetch_all().unwrap().len(), 2);
    assert_eq!(log.count(), 3);
}

#[test]
fn abandoned_cursor_is_reported() {
    let (db, _) = library();
    let stats = Arc::new(StatsMonitor::new());
    let db = db
        .with_config(relorm::DatabaseConfig::new().enable_monitoring())
        .unwrap()
        .with_monitor_arc(stats.clone());

    let mut prepared = Author::all().prepare(&db).unwrap();
    {
        let mut cursor = prepared.fetch_cursor().unwrap();
        assert!(cursor.try_next().unwrap().is_some());
    }
    let stats = stats.stats();
    assert_eq!(stats.total_queries, 1);
    assert_eq!(stats.abandoned_queries, 1);
    assert!(!QueryResult::Abandoned(1).is_error());
}

#[test]
fn set_and_count() {
    let (db, _) = library();
    let set: HashSet<Author> = Author::all().fetch_set(&db).unwrap();
    assert_eq!(set.len(), 3);

    assert_eq!(Author::all().fetch_count(&db).unwrap(), 3);
    assert_eq!(Author::all().limit_offset(2, 2).fetch_count(&db).unwrap(), 1);
    let books_per_author = Relation::table("book").select(["author_id"]).distinct();
    assert_eq!(books_per_author.fetch_count(&db).unwrap(), 2);
}

#[test]
fn batch_update_and_delete() {
    let (db, log) = library();
    let changed = Relation::table("book")
        .filter(col("year").lt(1850))
        .update_all(&db, ConflictResolution::Abort, [ColumnAssignment::add("year", 1)])
        .unwrap();
    assert_eq!(changed, 2);
    assert_eq!(db.changes(), 2);

    log.clear();
    assert_eq!(
        Relation::table("book")
            .update_all(&db, ConflictResolution::Abort, Vec::new())
            .unwrap(),
        0
    );
    assert_eq!(log.count(), 0);

    let deleted = Relation::table("review").order([col("stars")]).limit(2).delete_all(&db).unwrap();
    assert_eq!(deleted, 2);
    let left: Vec<i64> = Relation::table("review")
        .select(["stars"])
        .fetch_all(&db)
        .unwrap()
        .iter()
        .map(|row| row.get_at(0).unwrap())
        .collect();
    assert_eq!(left, [5]);
}

#[test]
fn unique_violation_is_detected() {
    let (db, _) = library();
    let err = Relation::table("country")
        .filter(col("code").eq("DE"))
        .update_all(&db, ConflictResolution::Abort, [ColumnAssignment::set("code", "FR")])
        .unwrap_err();
    assert!(err.is_unique_violation(), "{err}");
    assert!(err.sql().is_some_and(|sql| sql.starts_with("UPDATE \"country\"")));
}

#[test]
fn region_covers_prefetch_levels() {
    let (db, log) = library();
    let region = Author::select_all()
        .including_all(
            Association::has_many("books", "author", Relation::table("book").select(["title"]))
                .with_foreign_key(["author_id"], None),
        )
        .database_region(&db)
        .unwrap();

    assert_eq!(region.tables().collect::<Vec<_>>(), ["author", "book"]);
    assert_eq!(region.columns("book").unwrap().collect::<Vec<_>>(), ["author_id", "title"]);
    assert_eq!(log.count(), 0);
}
