mod common;

use common::library;
use relorm::prelude::*;
use relorm::PIVOT_COLUMN_PREFIX;

fn books() -> Association {
    Association::has_many("books", "author", Relation::table("book"))
        .with_foreign_key(["author_id"], None)
        .order([col("id")])
}

fn reviews() -> Association {
    Association::has_many("reviews", "book", Relation::table("review")).order([col("stars").desc()])
}

#[derive(Debug, FromRow)]
struct Review {
    stars: i64,
}

#[derive(Debug, FromRow)]
struct Book {
    title: String,
    #[orm(prefetched = "reviews")]
    reviews: Vec<Review>,
}

#[derive(Debug, FromRow)]
struct Author {
    name: String,
    #[orm(prefetched = "books")]
    books: Vec<Book>,
}

#[test]
fn five_hundred_parents_take_two_queries() {
    let log = std::sync::Arc::new(common::StatementLog::default());
    let db = Database::open_in_memory().unwrap().add_hook_arc(log.clone());
    db.execute_batch(
        "CREATE TABLE parent (id INTEGER PRIMARY KEY);
         CREATE TABLE child (id INTEGER PRIMARY KEY, parent_id INTEGER NOT NULL REFERENCES parent(id));",
    )
    .unwrap();
    let mut fixtures = String::new();
    for id in 1..=500 {
        fixtures.push_str(&format!("INSERT INTO parent (id) VALUES ({id});"));
        if id % 2 == 0 {
            fixtures.push_str(&format!("INSERT INTO child (parent_id) VALUES ({id}), ({id});"));
        }
    }
    db.execute_batch(&fixtures).unwrap();
    log.clear();

    let rows = Relation::table("parent")
        .order([col("id")])
        .including_all(Association::has_many("children", "parent", Relation::table("child")))
        .fetch_all(&db)
        .unwrap();

    assert_eq!(rows.len(), 500);
    assert_eq!(log.count(), 2);
    for row in &rows {
        let id: i64 = row.get("id").unwrap();
        let expected = if id % 2 == 0 { 2 } else { 0 };
        assert_eq!(row.prefetched_rows("children").unwrap().len(), expected);
    }
}

#[test]
fn groups_are_empty_rather_than_absent() {
    let (db, log) = library();
    let rows = Relation::table("author")
        .order([col("id")])
        .including_all(books())
        .fetch_all(&db)
        .unwrap();

    let sizes: Vec<usize> = rows.iter().map(|r| r.prefetched_rows("books").unwrap().len()).collect();
    assert_eq!(sizes, [2, 1, 0]);
    assert_eq!(log.count(), 2);

    let level = &log.statements()[1];
    assert!(level.contains(&format!("\"author_id\" AS \"{PIVOT_COLUMN_PREFIX}author_id\"")), "{level}");
    assert!(level.contains("\"author_id\" IN (?, ?, ?)"), "{level}");

    let book = &rows[0].prefetched_rows("books").unwrap()[0];
    assert!(!book.has_column(&format!("{PIVOT_COLUMN_PREFIX}author_id")));
    assert!(rows[0].prefetched_rows("reviews").unwrap_err().is_usage());
}

#[test]
fn nested_levels_add_one_query_each() {
    let (db, log) = library();
    let authors: Vec<Author> = Relation::table("author")
        .order([col("id")])
        .including_all(books().including_all(reviews()))
        .as_request::<Author>()
        .fetch_all(&db)
        .unwrap();

    assert_eq!(log.count(), 3);
    assert_eq!(authors[0].name, "Hugo");
    let titles: Vec<&str> = authors[0].books.iter().map(|b| b.title.as_str()).collect();
    assert_eq!(titles, ["Les Miserables", "Notre-Dame"]);
    let stars: Vec<i64> = authors[0].books[0].reviews.iter().map(|r| r.stars).collect();
    assert_eq!(stars, [5, 4]);
    assert!(authors[0].books[1].reviews.is_empty());
    assert_eq!(authors[1].books[0].reviews.len(), 1);
    assert!(authors[2].books.is_empty());
}

#[test]
fn through_associations_load_through_their_pivot() {
    let (db, log) = library();
    let passports = Association::has_many("passports", "country", Relation::table("passport"));
    let citizen = Association::belongs_to("citizen", "passport", Relation::table("citizen"));
    let citizens = Association::has_many_through("citizens", passports, citizen).order([col("name")]);

    let rows = Relation::table("country")
        .order([col("id")])
        .including_all(citizens)
        .fetch_all(&db)
        .unwrap();

    let names = |row: &Row| -> Vec<String> {
        row.prefetched_rows("citizens")
            .unwrap()
            .iter()
            .map(|c| c.get::<String>("name").unwrap())
            .collect()
    };
    assert_eq!(names(&rows[0]), ["Anna", "Bruno"]);
    assert_eq!(names(&rows[1]), ["Bruno", "Clara"]);
    assert!(names(&rows[2]).is_empty());
    assert_eq!(log.count(), 2);
    assert!(log.statements()[1].contains("JOIN \"passport\" AS \"__relorm_through\""));
}

#[test]
fn prefetch_below_an_optional_scope() {
    let (db, log) = library();
    let editor = Association::belongs_to("editor", "book", Relation::table("author"))
        .with_foreign_key(["editor_id"], None)
        .including_all(books());

    let rows = Relation::table("book")
        .order([col("id")])
        .including_optional(editor)
        .fetch_all(&db)
        .unwrap();

    assert_eq!(log.count(), 2);
    let edited = rows[1].scope("editor").unwrap();
    assert_eq!(edited.get::<String>("name").unwrap(), "Goethe");
    let titles: Vec<String> = edited
        .prefetched_rows("books")
        .unwrap()
        .iter()
        .map(|b| b.get("title").unwrap())
        .collect();
    assert_eq!(titles, ["Faust"]);
    assert!(rows[0].scope_opt("editor").unwrap().is_none());
    assert!(rows[0].scope("editor").unwrap().prefetched_rows("books").unwrap().is_empty());
}

#[test]
fn no_parents_means_no_level_query() {
    let (db, log) = library();
    let rows = Relation::table("author")
        .filter(col("name").eq("Nobody"))
        .including_all(books())
        .fetch_all(&db)
        .unwrap();
    assert!(rows.is_empty());
    assert_eq!(log.count(), 1);
}

#[test]
fn ambiguous_foreign_key_is_usage_error() {
    let (db, _) = library();
    let err = Relation::table("author")
        .including_all(Association::has_many("books", "author", Relation::table("book")))
        .fetch_all(&db)
        .unwrap_err();
    assert!(err.is_usage(), "{err}");
}

#[test]
fn limited_destination_is_usage_error() {
    let (db, _) = library();
    let err = Relation::table("author")
        .including_all(books().limit(1))
        .fetch_all(&db)
        .unwrap_err();
    assert!(err.is_usage(), "{err}");
}
