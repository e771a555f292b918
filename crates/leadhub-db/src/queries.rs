use crate::Database;
use crate::models::{
    CampaignRow, DestinatarioRow, EnvioRow, IaFlagRow, InboundMessageRow, LeadRow, UserRow,
};
use anyhow::Result;
use leadhub_types::api::{CampaignStatus, DestinatarioStatus, EnvioStatus, LeadStatus};
use rusqlite::Connection;

impl Database {
    // -- Users --

    pub fn create_user(&self, id: &str, username: &str, password_hash: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO users (id, username, password) VALUES (?1, ?2, ?3)",
                (id, username, password_hash),
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "username", username))
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id", id))
    }

    // -- Campaigns --

    pub fn create_campaign(&self, id: &str, owner_id: &str, name: &str, message: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO campaigns (id, owner_id, name, message) VALUES (?1, ?2, ?3, ?4)",
                (id, owner_id, name, message),
            )?;
            Ok(())
        })
    }

    /// Owner-scoped lookup: a campaign is only visible to the user that
    /// created it.
    pub fn get_campaign(&self, id: &str, owner_id: &str) -> Result<Option<CampaignRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, owner_id, name, message, status, created_at, updated_at
                 FROM campaigns WHERE id = ?1 AND owner_id = ?2",
            )?;
            let row = stmt.query_row([id, owner_id], map_campaign).optional()?;
            Ok(row)
        })
    }

    /// Campaigns with their recipient counts in a single query (avoids a
    /// per-campaign COUNT round trip).
    pub fn list_campaigns(&self, owner_id: &str) -> Result<Vec<(CampaignRow, u64)>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT c.id, c.owner_id, c.name, c.message, c.status, c.created_at, c.updated_at,
                        COUNT(d.id)
                 FROM campaigns c
                 LEFT JOIN destinatarios d ON d.campaign_id = c.id
                 WHERE c.owner_id = ?1
                 GROUP BY c.id
                 ORDER BY c.created_at DESC",
            )?;
            let rows = stmt
                .query_map([owner_id], |row| {
                    Ok((map_campaign(row)?, row.get::<_, i64>(7)? as u64))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn update_campaign(
        &self,
        id: &str,
        owner_id: &str,
        name: Option<&str>,
        message: Option<&str>,
        status: Option<CampaignStatus>,
    ) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let updated = conn.execute(
                "UPDATE campaigns SET
                     name = COALESCE(?3, name),
                     message = COALESCE(?4, message),
                     status = COALESCE(?5, status),
                     updated_at = datetime('now')
                 WHERE id = ?1 AND owner_id = ?2",
                rusqlite::params![id, owner_id, name, message, status.map(|s| s.as_str())],
            )?;
            Ok(updated > 0)
        })
    }

    /// Delete a campaign together with its recipients and send records.
    pub fn delete_campaign(&self, id: &str, owner_id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let owned: i64 = tx.query_row(
                "SELECT COUNT(*) FROM campaigns WHERE id = ?1 AND owner_id = ?2",
                [id, owner_id],
                |row| row.get(0),
            )?;
            if owned == 0 {
                return Ok(false);
            }
            tx.execute("DELETE FROM envios WHERE campaign_id = ?1", [id])?;
            tx.execute("DELETE FROM destinatarios WHERE campaign_id = ?1", [id])?;
            tx.execute("DELETE FROM campaigns WHERE id = ?1", [id])?;
            tx.commit()?;
            Ok(true)
        })
    }

    pub fn count_destinatarios(&self, campaign_id: &str) -> Result<u64> {
        self.with_conn(|conn| {
            let n: i64 = conn.query_row(
                "SELECT COUNT(*) FROM destinatarios WHERE campaign_id = ?1",
                [campaign_id],
                |row| row.get(0),
            )?;
            Ok(n as u64)
        })
    }

    // -- Destinatarios --

    /// Idempotent insert: adding a phone that is already on the campaign's
    /// list is a no-op. Returns the stored row plus whether this call
    /// inserted it.
    pub fn add_destinatario(
        &self,
        id: &str,
        campaign_id: &str,
        phone: &str,
        name: &str,
    ) -> Result<(bool, DestinatarioRow)> {
        self.with_conn_mut(|conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO destinatarios (id, campaign_id, phone, name)
                 VALUES (?1, ?2, ?3, ?4)",
                (id, campaign_id, phone, name),
            )?;

            let row = conn.query_row(
                "SELECT id, campaign_id, phone, name, status, created_at
                 FROM destinatarios WHERE campaign_id = ?1 AND phone = ?2",
                [campaign_id, phone],
                map_destinatario,
            )?;
            Ok((inserted > 0, row))
        })
    }

    pub fn list_destinatarios(&self, campaign_id: &str) -> Result<Vec<DestinatarioRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, campaign_id, phone, name, status, created_at
                 FROM destinatarios WHERE campaign_id = ?1 ORDER BY created_at",
            )?;
            let rows = stmt
                .query_map([campaign_id], map_destinatario)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn pending_destinatarios(&self, campaign_id: &str) -> Result<Vec<DestinatarioRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, campaign_id, phone, name, status, created_at
                 FROM destinatarios WHERE campaign_id = ?1 AND status = 'pending'
                 ORDER BY created_at",
            )?;
            let rows = stmt
                .query_map([campaign_id], map_destinatario)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn delete_destinatario(&self, campaign_id: &str, dest_id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let deleted = conn.execute(
                "DELETE FROM destinatarios WHERE id = ?1 AND campaign_id = ?2",
                [dest_id, campaign_id],
            )?;
            Ok(deleted > 0)
        })
    }

    pub fn set_destinatario_status(&self, id: &str, status: DestinatarioStatus) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "UPDATE destinatarios SET status = ?2 WHERE id = ?1",
                [id, status.as_str()],
            )?;
            Ok(())
        })
    }

    /// Owner of the most recent campaign that targets this phone. Used to
    /// attribute inbound leads; None means the phone matched no campaign.
    pub fn find_destinatario_owner(&self, phone: &str) -> Result<Option<String>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT c.owner_id
                     FROM destinatarios d JOIN campaigns c ON d.campaign_id = c.id
                     WHERE d.phone = ?1
                     ORDER BY d.created_at DESC LIMIT 1",
                    [phone],
                    |row| row.get::<_, String>(0),
                )
                .optional()?;
            Ok(row)
        })
    }

    /// Flip every contacted destinatario with this phone to `replied`.
    /// Returns how many rows changed.
    pub fn mark_replied_by_phone(&self, phone: &str) -> Result<usize> {
        self.with_conn_mut(|conn| {
            let n = conn.execute(
                "UPDATE destinatarios SET status = 'replied'
                 WHERE phone = ?1 AND status IN ('pending', 'sent')",
                [phone],
            )?;
            Ok(n)
        })
    }

    // -- Envios --

    /// Insert a prepared batch in one transaction. `rows` is
    /// (id, destinatario_id, phone, body) per recipient.
    pub fn insert_envio_batch(
        &self,
        batch_id: &str,
        campaign_id: &str,
        rows: &[(String, String, String, String)],
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare(
                    "INSERT INTO envios (id, batch_id, campaign_id, destinatario_id, phone, body)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                )?;
                for (id, dest_id, phone, body) in rows {
                    stmt.execute((id, batch_id, campaign_id, dest_id, phone, body))?;
                }
            }
            tx.commit()?;
            Ok(())
        })
    }

    /// Campaign and owner a batch belongs to, if the batch exists.
    pub fn batch_header(&self, batch_id: &str) -> Result<Option<(String, String)>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT e.campaign_id, c.owner_id
                     FROM envios e JOIN campaigns c ON e.campaign_id = c.id
                     WHERE e.batch_id = ?1 LIMIT 1",
                    [batch_id],
                    |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
                )
                .optional()?;
            Ok(row)
        })
    }

    pub fn list_envios(&self, batch_id: &str) -> Result<Vec<EnvioRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, batch_id, campaign_id, destinatario_id, phone, body,
                        status, error, created_at, sent_at
                 FROM envios WHERE batch_id = ?1 ORDER BY created_at",
            )?;
            let rows = stmt
                .query_map([batch_id], map_envio)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn prepared_envios(&self, batch_id: &str) -> Result<Vec<EnvioRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, batch_id, campaign_id, destinatario_id, phone, body,
                        status, error, created_at, sent_at
                 FROM envios WHERE batch_id = ?1 AND status = 'prepared'
                 ORDER BY created_at",
            )?;
            let rows = stmt
                .query_map([batch_id], map_envio)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Move one envio from prepared to sending. Returns false when the row
    /// was cancelled or already picked up, so the dispatcher skips it.
    pub fn claim_envio(&self, id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let n = conn.execute(
                "UPDATE envios SET status = 'sending' WHERE id = ?1 AND status = 'prepared'",
                [id],
            )?;
            Ok(n > 0)
        })
    }

    pub fn set_envio_status(
        &self,
        id: &str,
        status: EnvioStatus,
        error: Option<&str>,
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "UPDATE envios SET status = ?2, error = ?3,
                     sent_at = CASE WHEN ?2 = 'sent' THEN datetime('now') ELSE sent_at END
                 WHERE id = ?1",
                rusqlite::params![id, status.as_str(), error],
            )?;
            Ok(())
        })
    }

    /// Cancel everything still prepared in a batch. Envios already picked up
    /// by the dispatcher are left alone.
    pub fn cancel_batch(&self, batch_id: &str) -> Result<usize> {
        self.with_conn_mut(|conn| {
            let n = conn.execute(
                "UPDATE envios SET status = 'cancelled'
                 WHERE batch_id = ?1 AND status = 'prepared'",
                [batch_id],
            )?;
            Ok(n)
        })
    }

    /// (total, sent, failed, pending) for a batch; pending counts prepared
    /// and in-flight rows.
    pub fn batch_counts(&self, batch_id: &str) -> Result<(u64, u64, u64, u64)> {
        self.with_conn(|conn| {
            let row = conn.query_row(
                "SELECT COUNT(*),
                        SUM(status = 'sent'),
                        SUM(status = 'failed'),
                        SUM(status IN ('prepared', 'sending'))
                 FROM envios WHERE batch_id = ?1",
                [batch_id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, Option<i64>>(1)?.unwrap_or(0),
                        row.get::<_, Option<i64>>(2)?.unwrap_or(0),
                        row.get::<_, Option<i64>>(3)?.unwrap_or(0),
                    ))
                },
            )?;
            Ok((row.0 as u64, row.1 as u64, row.2 as u64, row.3 as u64))
        })
    }

    // -- Leads --

    /// Insert a lead for a phone unless one already exists. Returns whether
    /// this call created it.
    pub fn upsert_lead(
        &self,
        id: &str,
        owner_id: Option<&str>,
        phone: &str,
        name: Option<&str>,
        source: &str,
    ) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO leads (id, owner_id, phone, name, source)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![id, owner_id, phone, name, source],
            )?;
            Ok(inserted > 0)
        })
    }

    /// Leads visible to a user: their own plus the unassigned pool (inbound
    /// phones that matched no campaign).
    pub fn list_leads(&self, owner_id: &str) -> Result<Vec<LeadRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, owner_id, phone, name, source, status, created_at
                 FROM leads WHERE owner_id = ?1 OR owner_id IS NULL
                 ORDER BY created_at DESC",
            )?;
            let rows = stmt
                .query_map([owner_id], map_lead)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn get_lead(&self, id: &str) -> Result<Option<LeadRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, owner_id, phone, name, source, status, created_at
                     FROM leads WHERE id = ?1",
                    [id],
                    map_lead,
                )
                .optional()?;
            Ok(row)
        })
    }

    pub fn update_lead(
        &self,
        id: &str,
        owner_id: &str,
        name: Option<&str>,
        status: Option<LeadStatus>,
    ) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let updated = conn.execute(
                "UPDATE leads SET
                     name = COALESCE(?3, name),
                     status = COALESCE(?4, status),
                     owner_id = COALESCE(owner_id, ?2)
                 WHERE id = ?1 AND (owner_id = ?2 OR owner_id IS NULL)",
                rusqlite::params![id, owner_id, name, status.map(|s| s.as_str())],
            )?;
            Ok(updated > 0)
        })
    }

    // -- Inbound messages --

    pub fn insert_inbound(
        &self,
        id: &str,
        phone: &str,
        body: &str,
        wa_message_id: Option<&str>,
        received_at: &str,
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO inbound_messages (id, phone, body, wa_message_id, received_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![id, phone, body, wa_message_id, received_at],
            )?;
            Ok(())
        })
    }

    pub fn list_inbound(&self, phone: Option<&str>, limit: u32) -> Result<Vec<InboundMessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, phone, body, wa_message_id, received_at
                 FROM inbound_messages
                 WHERE (?1 IS NULL OR phone = ?1)
                 ORDER BY received_at DESC LIMIT ?2",
            )?;
            let rows = stmt
                .query_map(rusqlite::params![phone, limit], map_inbound)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- IA flags --

    pub fn set_ia_flag(&self, phone: &str, enabled: bool) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO ia_flags (phone, enabled, updated_at)
                 VALUES (?1, ?2, datetime('now'))
                 ON CONFLICT(phone) DO UPDATE SET
                     enabled = excluded.enabled,
                     updated_at = excluded.updated_at",
                rusqlite::params![phone, enabled],
            )?;
            Ok(())
        })
    }

    pub fn get_ia_flag(&self, phone: &str) -> Result<Option<IaFlagRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT phone, enabled, updated_at FROM ia_flags WHERE phone = ?1",
                    [phone],
                    |row| {
                        Ok(IaFlagRow {
                            phone: row.get(0)?,
                            enabled: row.get(1)?,
                            updated_at: row.get(2)?,
                        })
                    },
                )
                .optional()?;
            Ok(row)
        })
    }

    /// The listener's per-phone switch; unset phones default to off.
    pub fn is_ia_enabled(&self, phone: &str) -> Result<bool> {
        Ok(self.get_ia_flag(phone)?.map(|f| f.enabled).unwrap_or(false))
    }
}

// -- Row mappers --

fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>> {
    let sql = format!(
        "SELECT id, username, password, created_at FROM users WHERE {} = ?1",
        column
    );
    let mut stmt = conn.prepare(&sql)?;

    let row = stmt
        .query_row([value], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                username: row.get(1)?,
                password: row.get(2)?,
                created_at: row.get(3)?,
            })
        })
        .optional()?;

    Ok(row)
}

fn map_campaign(row: &rusqlite::Row<'_>) -> rusqlite::Result<CampaignRow> {
    Ok(CampaignRow {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        name: row.get(2)?,
        message: row.get(3)?,
        status: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

fn map_destinatario(row: &rusqlite::Row<'_>) -> rusqlite::Result<DestinatarioRow> {
    Ok(DestinatarioRow {
        id: row.get(0)?,
        campaign_id: row.get(1)?,
        phone: row.get(2)?,
        name: row.get(3)?,
        status: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn map_envio(row: &rusqlite::Row<'_>) -> rusqlite::Result<EnvioRow> {
    Ok(EnvioRow {
        id: row.get(0)?,
        batch_id: row.get(1)?,
        campaign_id: row.get(2)?,
        destinatario_id: row.get(3)?,
        phone: row.get(4)?,
        body: row.get(5)?,
        status: row.get(6)?,
        error: row.get(7)?,
        created_at: row.get(8)?,
        sent_at: row.get(9)?,
    })
}

fn map_lead(row: &rusqlite::Row<'_>) -> rusqlite::Result<LeadRow> {
    Ok(LeadRow {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        phone: row.get(2)?,
        name: row.get(3)?,
        source: row.get(4)?,
        status: row.get(5)?,
        created_at: row.get(6)?,
    })
}

fn map_inbound(row: &rusqlite::Row<'_>) -> rusqlite::Result<InboundMessageRow> {
    Ok(InboundMessageRow {
        id: row.get(0)?,
        phone: row.get(1)?,
        body: row.get(2)?,
        wa_message_id: row.get(3)?,
        received_at: row.get(4)?,
    })
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn db_with_user() -> (Database, String) {
        let db = Database::open_in_memory().unwrap();
        let user_id = Uuid::new_v4().to_string();
        db.create_user(&user_id, "marta", "argon2-hash").unwrap();
        (db, user_id)
    }

    fn campaign(db: &Database, owner: &str) -> String {
        let id = Uuid::new_v4().to_string();
        db.create_campaign(&id, owner, "Promo agosto", "Hola {{nombre}}!")
            .unwrap();
        id
    }

    #[test]
    fn duplicate_destinatario_insert_is_idempotent() {
        let (db, owner) = db_with_user();
        let cid = campaign(&db, &owner);

        let (inserted, first) = db
            .add_destinatario(&Uuid::new_v4().to_string(), &cid, "5215512345678", "Ana")
            .unwrap();
        assert!(inserted);

        let (inserted_again, second) = db
            .add_destinatario(&Uuid::new_v4().to_string(), &cid, "5215512345678", "Ana B.")
            .unwrap();
        assert!(!inserted_again);
        // The stored row is the original one, untouched.
        assert_eq!(second.id, first.id);
        assert_eq!(second.name, "Ana");
        assert_eq!(db.count_destinatarios(&cid).unwrap(), 1);
    }

    #[test]
    fn campaigns_are_owner_scoped() {
        let (db, owner) = db_with_user();
        let other = Uuid::new_v4().to_string();
        db.create_user(&other, "intruso", "hash").unwrap();

        let cid = campaign(&db, &owner);

        assert!(db.get_campaign(&cid, &owner).unwrap().is_some());
        assert!(db.get_campaign(&cid, &other).unwrap().is_none());
        assert_eq!(db.list_campaigns(&other).unwrap().len(), 0);
        assert!(!db.delete_campaign(&cid, &other).unwrap());
    }

    #[test]
    fn delete_campaign_removes_recipients_and_envios() {
        let (db, owner) = db_with_user();
        let cid = campaign(&db, &owner);
        let (_, dest) = db
            .add_destinatario(&Uuid::new_v4().to_string(), &cid, "5215511111111", "Luis")
            .unwrap();
        db.insert_envio_batch(
            "batch-1",
            &cid,
            &[(
                Uuid::new_v4().to_string(),
                dest.id.clone(),
                dest.phone.clone(),
                "Hola Luis!".into(),
            )],
        )
        .unwrap();

        assert!(db.delete_campaign(&cid, &owner).unwrap());
        assert_eq!(db.count_destinatarios(&cid).unwrap(), 0);
        assert!(db.batch_header("batch-1").unwrap().is_none());
    }

    #[test]
    fn batch_counts_track_dispatch_progress() {
        let (db, owner) = db_with_user();
        let cid = campaign(&db, &owner);

        let mut rows = Vec::new();
        for i in 0..3 {
            let phone = format!("52155000000{}", i);
            let (_, dest) = db
                .add_destinatario(&Uuid::new_v4().to_string(), &cid, &phone, "X")
                .unwrap();
            rows.push((Uuid::new_v4().to_string(), dest.id, phone, "Hola X".to_string()));
        }
        db.insert_envio_batch("b1", &cid, &rows).unwrap();

        db.set_envio_status(&rows[0].0, EnvioStatus::Sent, None).unwrap();
        db.set_envio_status(&rows[1].0, EnvioStatus::Failed, Some("number not on whatsapp"))
            .unwrap();

        let (total, sent, failed, pending) = db.batch_counts("b1").unwrap();
        assert_eq!((total, sent, failed, pending), (3, 1, 1, 1));

        let envios = db.list_envios("b1").unwrap();
        let sent_row = envios.iter().find(|e| e.id == rows[0].0).unwrap();
        assert!(sent_row.sent_at.is_some());
    }

    #[test]
    fn cancel_batch_only_touches_prepared_rows() {
        let (db, owner) = db_with_user();
        let cid = campaign(&db, &owner);
        let (_, dest) = db
            .add_destinatario(&Uuid::new_v4().to_string(), &cid, "5215522222222", "Eva")
            .unwrap();
        let sent_id = Uuid::new_v4().to_string();
        let pending_id = Uuid::new_v4().to_string();
        db.insert_envio_batch(
            "b2",
            &cid,
            &[
                (sent_id.clone(), dest.id.clone(), dest.phone.clone(), "1".into()),
                (pending_id.clone(), dest.id.clone(), dest.phone.clone(), "2".into()),
            ],
        )
        .unwrap();
        db.set_envio_status(&sent_id, EnvioStatus::Sent, None).unwrap();

        assert_eq!(db.cancel_batch("b2").unwrap(), 1);
        let (_, sent, _, pending) = db.batch_counts("b2").unwrap();
        assert_eq!(sent, 1);
        assert_eq!(pending, 0);
    }

    #[test]
    fn lead_upsert_dedupes_by_phone() {
        let (db, owner) = db_with_user();

        let first = db
            .upsert_lead(&Uuid::new_v4().to_string(), None, "5215533333333", None, "inbound")
            .unwrap();
        let second = db
            .upsert_lead(
                &Uuid::new_v4().to_string(),
                Some(&owner),
                "5215533333333",
                Some("Carlos"),
                "inbound",
            )
            .unwrap();

        assert!(first);
        assert!(!second);
        // Unassigned leads show up for every user.
        assert_eq!(db.list_leads(&owner).unwrap().len(), 1);
    }

    #[test]
    fn claiming_an_unassigned_lead_sets_its_owner() {
        let (db, owner) = db_with_user();
        let lead_id = Uuid::new_v4().to_string();
        db.upsert_lead(&lead_id, None, "5215544444444", None, "inbound")
            .unwrap();

        assert!(db
            .update_lead(&lead_id, &owner, None, Some(LeadStatus::Contacted))
            .unwrap());

        let leads = db.list_leads(&owner).unwrap();
        assert_eq!(leads[0].owner_id.as_deref(), Some(owner.as_str()));
        assert_eq!(leads[0].status, "contacted");
    }

    #[test]
    fn ia_flag_defaults_off_and_upserts() {
        let (db, _) = db_with_user();

        assert!(!db.is_ia_enabled("5215555555555").unwrap());

        db.set_ia_flag("5215555555555", true).unwrap();
        assert!(db.is_ia_enabled("5215555555555").unwrap());

        db.set_ia_flag("5215555555555", false).unwrap();
        assert!(!db.is_ia_enabled("5215555555555").unwrap());
    }

    #[test]
    fn reply_marks_contacted_destinatarios() {
        let (db, owner) = db_with_user();
        let cid = campaign(&db, &owner);
        let (_, dest) = db
            .add_destinatario(&Uuid::new_v4().to_string(), &cid, "5215566666666", "Rosa")
            .unwrap();
        db.set_destinatario_status(&dest.id, DestinatarioStatus::Sent)
            .unwrap();

        assert_eq!(db.mark_replied_by_phone("5215566666666").unwrap(), 1);
        // Already replied — nothing left to flip.
        assert_eq!(db.mark_replied_by_phone("5215566666666").unwrap(), 0);
    }

    #[test]
    fn campaign_status_updates_via_coalesce() {
        let (db, owner) = db_with_user();
        let cid = campaign(&db, &owner);

        assert!(db
            .update_campaign(&cid, &owner, None, None, Some(CampaignStatus::Active))
            .unwrap());

        let row = db.get_campaign(&cid, &owner).unwrap().unwrap();
        assert_eq!(row.status, "active");
        assert_eq!(row.name, "Promo agosto");
    }
}
