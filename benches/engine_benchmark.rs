use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::hint::black_box;

use auditdb::Database;

fn setup_populated_db(n: usize) -> Database {
    let mut db = Database::in_memory();

    let result = db.execute(
        "CREATE TABLE users (id INTEGER, name TEXT, age INTEGER, active BOOLEAN, \
         PRIMARY KEY (id))",
    );
    assert!(result.is_success());

    for i in 0..n {
        let result = db.execute(&format!(
            "INSERT INTO users (id, name, age, active) VALUES ({i}, 'user{i}', {}, {})",
            i % 100,
            i % 2 == 0
        ));
        assert!(result.is_success());
    }
    db
}

fn bench_insert_sql(c: &mut Criterion) {
    let mut group = c.benchmark_group("Insert_SQL_Pipeline");
    group.bench_function("insert_single_row_sql", |b| {
        let mut db = Database::in_memory();
        db.execute("CREATE TABLE tests (id INTEGER)");
        b.iter(|| {
            let result = db.execute(black_box("INSERT INTO tests (id) VALUES (42)"));
            black_box(result);
        });
    });
    group.finish();
}

fn bench_select_indexed_vs_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("Select_Where_Performance");

    for n in [1000, 10000].iter() {
        group.bench_with_input(BenchmarkId::new("indexed_pk", n), n, |b, &n| {
            let mut db = setup_populated_db(n);
            b.iter(|| {
                let result = db.execute(black_box("SELECT * FROM users WHERE id = 500"));
                black_box(result);
            });
        });
        group.bench_with_input(BenchmarkId::new("full_scan", n), n, |b, &n| {
            let mut db = setup_populated_db(n);
            b.iter(|| {
                let result = db.execute(black_box("SELECT * FROM users WHERE age = 42"));
                black_box(result);
            });
        });
    }
    group.finish();
}

fn bench_update_performance(c: &mut Criterion) {
    let mut group = c.benchmark_group("Update_Performance");

    for n in [1000, 10000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(n), n, |b, &n| {
            b.iter_with_setup(
                || setup_populated_db(n),
                |mut db| {
                    db.execute("UPDATE users SET age = 99 WHERE active = TRUE");
                    black_box(db);
                },
            );
        });
    }
    group.finish();
}

fn bench_delete_performance(c: &mut Criterion) {
    let mut group = c.benchmark_group("Delete_Performance");

    for n in [1000, 10000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(n), n, |b, &n| {
            b.iter_with_setup(
                || setup_populated_db(n),
                |mut db| {
                    db.execute("DELETE FROM users WHERE age = 90");
                    black_box(db);
                },
            );
        });
    }
    group.finish();
}

fn bench_ledger_append_and_verify(c: &mut Criterion) {
    let mut group = c.benchmark_group("Ledger_Performance");

    group.bench_function("append_event", |b| {
        let mut db = Database::in_memory();
        db.execute("LEDGER CREATE events");
        b.iter(|| {
            let result = db.execute(black_box(
                "LEDGER APPEND events TYPE='TICK' DATA='{\"n\": 1}'",
            ));
            black_box(result);
        });
    });

    group.bench_function("verify_chain_1000", |b| {
        let mut db = Database::in_memory();
        db.execute("LEDGER CREATE events");
        for i in 0..1000 {
            db.execute(&format!(
                "LEDGER APPEND events TYPE='TICK' DATA='{{\"n\": {i}}}'"
            ));
        }
        b.iter(|| {
            let result = db.execute(black_box("LEDGER VERIFY events"));
            black_box(result);
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_insert_sql,
    bench_select_indexed_vs_scan,
    bench_update_performance,
    bench_delete_performance,
    bench_ledger_append_and_verify
);
criterion_main!(benches);
