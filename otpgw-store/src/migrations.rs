use sqlx::SqlitePool;

/// Create the tables implied by the data model (spec §3) if they don't
/// already exist. Run once at startup, the same way
/// `acteon-state-postgres::migrations::run_migrations` does.
///
/// # Errors
///
/// Returns a [`sqlx::Error`] if any DDL statement fails.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS requests (
            id TEXT PRIMARY KEY,
            phone TEXT NOT NULL,
            code_hash TEXT NOT NULL,
            status TEXT NOT NULL,
            channel_status TEXT,
            channel TEXT,
            auth_status TEXT NOT NULL,
            channels_requested TEXT NOT NULL,
            ip_address TEXT NOT NULL,
            ip_subnet TEXT NOT NULL,
            asn INTEGER,
            ip_country TEXT,
            phone_country TEXT,
            phone_prefix TEXT,
            fraud_score INTEGER NOT NULL,
            fraud_reasons TEXT NOT NULL,
            shadow_banned INTEGER NOT NULL,
            webhook_url TEXT,
            session_id TEXT,
            provider_id TEXT,
            error_message TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            expires_at TEXT NOT NULL,
            start_time TEXT,
            answer_time TEXT,
            end_time TEXT,
            sms_cost_units INTEGER NOT NULL,
            voice_cost_units INTEGER NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_requests_status ON requests(status)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_requests_created_at ON requests(created_at)")
        .execute(pool)
        .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            request_id TEXT NOT NULL,
            channel TEXT NOT NULL,
            event_type TEXT NOT NULL,
            event_data TEXT NOT NULL,
            created_at TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_events_request_id ON events(request_id)")
        .execute(pool)
        .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS reputation (
            subject TEXT PRIMARY KEY,
            total INTEGER NOT NULL,
            verified INTEGER NOT NULL,
            failed INTEGER NOT NULL,
            banned INTEGER NOT NULL,
            first_seen TEXT NOT NULL,
            last_seen TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS breakers (
            key TEXT PRIMARY KEY,
            failures INTEGER NOT NULL,
            successes INTEGER NOT NULL,
            state TEXT NOT NULL,
            opened_at TEXT
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS caller_id_routes (
            channel TEXT NOT NULL,
            prefix TEXT NOT NULL,
            caller_id TEXT NOT NULL,
            enabled INTEGER NOT NULL,
            PRIMARY KEY (channel, prefix)
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS whitelist (
            entry_type TEXT NOT NULL,
            value TEXT NOT NULL,
            description TEXT,
            PRIMARY KEY (entry_type, value)
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS honeypot (
            subnet TEXT PRIMARY KEY,
            reason TEXT NOT NULL,
            expires_at TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    Ok(())
}
