use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (campaigns, donators, users)");
        conn.execute_batch(
            "
            CREATE TABLE campaigns (
                id                TEXT PRIMARY KEY,
                contract_id       INTEGER NOT NULL UNIQUE,
                owner             TEXT NOT NULL,
                title             TEXT NOT NULL,
                description       TEXT NOT NULL,
                category          TEXT NOT NULL DEFAULT 'other',
                image             TEXT NOT NULL,
                target            TEXT NOT NULL,
                amount_collected  TEXT NOT NULL DEFAULT '0',
                deadline          TEXT NOT NULL,
                total_donations   INTEGER NOT NULL DEFAULT 0,
                withdrawn         INTEGER NOT NULL DEFAULT 0,
                is_active         INTEGER NOT NULL DEFAULT 1,
                created_at        TEXT NOT NULL,
                updated_at        TEXT NOT NULL
            );

            CREATE INDEX idx_campaigns_owner ON campaigns(owner);
            CREATE INDEX idx_campaigns_category ON campaigns(category);
            CREATE INDEX idx_campaigns_deadline ON campaigns(deadline);

            -- seq is the entry's position in the campaign's donator list
            CREATE TABLE donators (
                campaign_id       TEXT NOT NULL REFERENCES campaigns(id),
                seq               INTEGER NOT NULL,
                address           TEXT NOT NULL,
                amount            TEXT NOT NULL,
                timestamp         TEXT NOT NULL,
                transaction_hash  TEXT,
                PRIMARY KEY (campaign_id, seq)
            );

            CREATE UNIQUE INDEX idx_donators_tx
                ON donators(campaign_id, transaction_hash)
                WHERE transaction_hash IS NOT NULL;
            CREATE INDEX idx_donators_address ON donators(address);

            CREATE TABLE users (
                address        TEXT PRIMARY KEY,
                name           TEXT,
                email          TEXT,
                bio            TEXT,
                avatar         TEXT NOT NULL DEFAULT '',
                total_donated  REAL NOT NULL DEFAULT 0,
                total_raised   REAL NOT NULL DEFAULT 0,
                created_at     TEXT NOT NULL,
                updated_at     TEXT NOT NULL
            );

            CREATE INDEX idx_users_email ON users(email);

            CREATE TABLE user_campaigns_created (
                address      TEXT NOT NULL REFERENCES users(address),
                campaign_id  TEXT NOT NULL REFERENCES campaigns(id),
                PRIMARY KEY (address, campaign_id)
            );

            CREATE TABLE user_donations (
                id                INTEGER PRIMARY KEY AUTOINCREMENT,
                address           TEXT NOT NULL REFERENCES users(address),
                campaign_id       TEXT NOT NULL REFERENCES campaigns(id),
                amount            TEXT NOT NULL,
                date              TEXT NOT NULL,
                transaction_hash  TEXT
            );

            CREATE INDEX idx_user_donations_address ON user_donations(address, id);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
