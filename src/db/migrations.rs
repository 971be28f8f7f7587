use anyhow::Context;
use rusqlite::Connection;

/// Ordered schema steps. Each is idempotent on its own and recorded once applied.
const MIGRATIONS: &[(&str, &str)] = &[
    (
        "001_employees",
        "CREATE TABLE IF NOT EXISTS employees (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            email TEXT NOT NULL,
            timezone TEXT NOT NULL DEFAULT 'America/Chicago',
            active INTEGER NOT NULL DEFAULT 1,
            daily_start_minutes INTEGER NOT NULL DEFAULT 540,
            daily_end_minutes INTEGER NOT NULL DEFAULT 1020,
            slack_webhook_url TEXT,
            created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now'))
        );",
    ),
    (
        "002_bookings",
        "CREATE TABLE IF NOT EXISTS bookings (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            email TEXT NOT NULL,
            phone TEXT,
            notes TEXT,
            producer_id TEXT REFERENCES employees(id),
            plan_pid TEXT,
            start_time TEXT NOT NULL,
            end_time TEXT NOT NULL,
            reschedule_token TEXT NOT NULL,
            reschedule_expires TEXT NOT NULL,
            cancel_token TEXT NOT NULL,
            cancel_expires TEXT NOT NULL,
            created_at TEXT NOT NULL,
            CHECK (end_time > start_time)
        );
        CREATE UNIQUE INDEX IF NOT EXISTS idx_bookings_reschedule_token ON bookings(reschedule_token);
        CREATE UNIQUE INDEX IF NOT EXISTS idx_bookings_cancel_token ON bookings(cancel_token);
        CREATE INDEX IF NOT EXISTS idx_bookings_producer_time ON bookings(producer_id, start_time);",
    ),
    (
        "003_booking_status",
        "ALTER TABLE bookings ADD COLUMN status TEXT NOT NULL DEFAULT 'active';
        ALTER TABLE bookings ADD COLUMN cancelled_at TEXT;
        ALTER TABLE bookings ADD COLUMN updated_at TEXT;
        CREATE INDEX IF NOT EXISTS idx_bookings_status_time ON bookings(status, start_time);",
    ),
];

pub fn run_migrations(conn: &Connection) -> anyhow::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            name TEXT PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )
    .context("failed to create migrations table")?;

    for (name, sql) in MIGRATIONS {
        let already_applied: bool = conn
            .query_row(
                "SELECT COUNT(*) > 0 FROM _migrations WHERE name = ?1",
                [name],
                |row| row.get(0),
            )
            .context("failed to check migration status")?;

        if already_applied {
            continue;
        }

        let tx = conn
            .unchecked_transaction()
            .with_context(|| format!("failed to begin migration: {name}"))?;
        tx.execute_batch(sql)
            .with_context(|| format!("failed to apply migration: {name}"))?;
        tx.execute("INSERT INTO _migrations (name) VALUES (?1)", [name])
            .with_context(|| format!("failed to record migration: {name}"))?;
        tx.commit()
            .with_context(|| format!("failed to commit migration: {name}"))?;

        tracing::info!("applied migration: {name}");
    }

    Ok(())
}
