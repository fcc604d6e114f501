#![allow(dead_code)]

use relorm::{Database, HookAction, QueryContext, QueryHook};
use std::sync::{Arc, Mutex};

/// Records the SQL of every statement that reaches the hooks.
#[derive(Default)]
pub struct StatementLog(Mutex<Vec<String>>);

impl StatementLog {
    pub fn statements(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.0.lock().unwrap().len()
    }

    pub fn clear(&self) {
        self.0.lock().unwrap().clear();
    }
}

impl QueryHook for StatementLog {
    fn before_query(&self, ctx: &QueryContext) -> HookAction {
        self.0.lock().unwrap().push(ctx.canonical_sql.clone());
        HookAction::Continue
    }
}

pub const SCHEMA: &str = "
    CREATE TABLE author (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL,
        country_id INTEGER REFERENCES country(id)
    );
    CREATE TABLE book (
        id INTEGER PRIMARY KEY,
        author_id INTEGER NOT NULL REFERENCES author(id),
        editor_id INTEGER REFERENCES author(id),
        title TEXT NOT NULL,
        year INTEGER NOT NULL
    );
    CREATE TABLE review (
        id INTEGER PRIMARY KEY,
        book_id INTEGER NOT NULL REFERENCES book(id),
        stars INTEGER NOT NULL
    );
    CREATE TABLE country (
        id INTEGER PRIMARY KEY,
        code TEXT NOT NULL UNIQUE
    );
    CREATE TABLE citizen (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL
    );
    CREATE TABLE passport (
        id INTEGER PRIMARY KEY,
        country_id INTEGER NOT NULL REFERENCES country(id),
        citizen_id INTEGER NOT NULL REFERENCES citizen(id)
    );
";

pub const FIXTURES: &str = "
    INSERT INTO country (id, code) VALUES (1, 'FR'), (2, 'DE'), (3, 'IT');
    INSERT INTO author (id, name, country_id) VALUES (1, 'Hugo', 1), (2, 'Goethe', 2), (3, 'Dante', NULL);
    INSERT INTO book (id, author_id, editor_id, title, year) VALUES
        (1, 1, NULL, 'Les Miserables', 1862),
        (2, 1, 2, 'Notre-Dame', 1831),
        (3, 2, NULL, 'Faust', 1808);
    INSERT INTO review (book_id, stars) VALUES (1, 5), (1, 4), (3, 3);
    INSERT INTO citizen (id, name) VALUES (1, 'Anna'), (2, 'Bruno'), (3, 'Clara');
    INSERT INTO passport (country_id, citizen_id) VALUES (1, 1), (1, 2), (2, 2), (2, 3);
";

/// An in-memory database with the library schema and fixtures, plus its statement log.
pub fn library() -> (Database, Arc<StatementLog>) {
    let log = Arc::new(StatementLog::default());
    let db = Database::open_in_memory().unwrap().add_hook_arc(log.clone());
    db.execute_batch(SCHEMA).unwrap();
    db.execute_batch(FIXTURES).unwrap();
    log.clear();
    (db, log)
}
