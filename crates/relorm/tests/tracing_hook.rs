#![cfg(feature = "tracing")]

mod common;

use common::library;
use relorm::prelude::*;
use relorm::TracingSqlHook;
use tracing::Level;

#[test]
fn tracing_hook_leaves_results_untouched() {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter("relorm=debug")
        .with_test_writer()
        .finish();

    tracing::subscriber::with_default(subscriber, || {
        let (db, log) = library();
        let db = db.add_hook(TracingSqlHook::new().level(Level::DEBUG).max_sql_length(80));
        let rows = Relation::table("author")
            .order([col("id")])
            .including_all(
                Association::has_many("books", "author", Relation::table("book"))
                    .with_foreign_key(["author_id"], None),
            )
            .fetch_all(&db)
            .unwrap();

        assert_eq!(rows.len(), 3);
        assert_eq!(log.count(), 2);
    });
}
