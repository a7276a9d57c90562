use auditdb::Database;

fn main() {
    let mut db = Database::in_memory();

    let statements = [
        "CREATE TABLE users (id INTEGER, name TEXT, email TEXT, PRIMARY KEY (id), UNIQUE (email))",
        "INSERT INTO users (id, name, email) VALUES (1, 'Alice', 'alice@example.com')",
        "INSERT INTO users (id, name, email) VALUES (2, 'Bob', 'bob@example.com')",
        "INSERT INTO users (id, name, email) VALUES (2, 'Mallory', 'mallory@example.com')",
        "SELECT name FROM users WHERE id = 1",
        "LEDGER CREATE payments",
        "LEDGER APPEND payments TYPE='PAYMENT_RECEIVED' DATA='{\"amount\": 100}' AGGREGATE='acct-1'",
        "LEDGER APPEND payments TYPE='PAYMENT_SENT' DATA='{\"amount\": 30}' AGGREGATE='acct-1'",
        "LEDGER VERIFY payments",
        "SHOW TABLES",
    ];

    for sql in statements {
        let result = db.execute(sql);
        println!("{sql}");
        println!("  -> {:?}: {}", result.status, result.message);
        if let Some(rows) = result.rows() {
            for row in rows {
                println!("     {row:?}");
            }
        }
    }
}
