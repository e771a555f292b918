use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id          TEXT PRIMARY KEY,
            username    TEXT NOT NULL UNIQUE,
            password    TEXT NOT NULL,
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS campaigns (
            id          TEXT PRIMARY KEY,
            owner_id    TEXT NOT NULL REFERENCES users(id),
            name        TEXT NOT NULL,
            message     TEXT NOT NULL,
            status      TEXT NOT NULL DEFAULT 'draft',
            created_at  TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_campaigns_owner
            ON campaigns(owner_id, created_at);

        CREATE TABLE IF NOT EXISTS destinatarios (
            id          TEXT PRIMARY KEY,
            campaign_id TEXT NOT NULL REFERENCES campaigns(id),
            phone       TEXT NOT NULL,
            name        TEXT NOT NULL,
            status      TEXT NOT NULL DEFAULT 'pending',
            created_at  TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE(campaign_id, phone)
        );

        CREATE INDEX IF NOT EXISTS idx_destinatarios_campaign
            ON destinatarios(campaign_id);
        CREATE INDEX IF NOT EXISTS idx_destinatarios_phone
            ON destinatarios(phone);

        CREATE TABLE IF NOT EXISTS envios (
            id              TEXT PRIMARY KEY,
            batch_id        TEXT NOT NULL,
            campaign_id     TEXT NOT NULL REFERENCES campaigns(id),
            destinatario_id TEXT NOT NULL REFERENCES destinatarios(id),
            phone           TEXT NOT NULL,
            body            TEXT NOT NULL,
            status          TEXT NOT NULL DEFAULT 'prepared',
            error           TEXT,
            created_at      TEXT NOT NULL DEFAULT (datetime('now')),
            sent_at         TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_envios_batch
            ON envios(batch_id, created_at);

        CREATE TABLE IF NOT EXISTS leads (
            id          TEXT PRIMARY KEY,
            owner_id    TEXT REFERENCES users(id),
            phone       TEXT NOT NULL UNIQUE,
            name        TEXT,
            source      TEXT NOT NULL DEFAULT 'inbound',
            status      TEXT NOT NULL DEFAULT 'new',
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS inbound_messages (
            id              TEXT PRIMARY KEY,
            phone           TEXT NOT NULL,
            body            TEXT NOT NULL,
            wa_message_id   TEXT,
            received_at     TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_inbound_phone
            ON inbound_messages(phone, received_at);

        CREATE TABLE IF NOT EXISTS ia_flags (
            phone       TEXT PRIMARY KEY,
            enabled     INTEGER NOT NULL DEFAULT 0,
            updated_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
