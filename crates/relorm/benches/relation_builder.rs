use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use relorm::prelude::*;

fn author() -> Association {
    Association::belongs_to("author", "book", Relation::table("author")).with_foreign_key(["author_id"], None)
}

/// `book` joined to `n` authors, each join filtered and ordered.
fn build_joined(n: usize) -> Relation {
    let mut relation = Relation::table("book").filter(col("year").gt(1800));
    for i in 0..n {
        relation = relation.including_optional(
            author()
                .for_key(format!("author{i}"))
                .filter(col("name").like(format!("{i}%")))
                .order([col("name")]),
        );
    }
    relation.order([col("title").desc()]).limit(20)
}

fn database() -> Database {
    let db = Database::open_in_memory().unwrap();
    db.execute_batch(
        "CREATE TABLE author (id INTEGER PRIMARY KEY, name TEXT);
         CREATE TABLE book (id INTEGER PRIMARY KEY, author_id INTEGER REFERENCES author(id), title TEXT, year INTEGER);",
    )
    .unwrap();
    db
}

fn bench_derive(c: &mut Criterion) {
    let mut group = c.benchmark_group("relation_builder/derive");

    for n in [1, 5, 20] {
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &n| {
            b.iter(|| black_box(build_joined(n)));
        });
    }

    group.finish();
}

fn bench_to_sql(c: &mut Criterion) {
    let db = database();
    let mut group = c.benchmark_group("relation_builder/to_sql");

    for n in [1, 5, 20] {
        let relation = build_joined(n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &relation, |b, relation| {
            b.iter(|| black_box(relation.to_sql(&db).unwrap()));
        });
    }

    group.finish();
}

fn bench_key_filter(c: &mut Criterion) {
    let db = database();
    let mut group = c.benchmark_group("relation_builder/key_filter");

    for n in [5, 100, 500] {
        let relation = Relation::table("author").filter_keys(0..n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &relation, |b, relation| {
            b.iter(|| black_box(relation.to_sql(&db).unwrap()));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_derive, bench_to_sql, bench_key_filter);
criterion_main!(benches);
