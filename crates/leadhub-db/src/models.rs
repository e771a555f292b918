/// Database row types — these map directly to SQLite rows.
/// Distinct from the leadhub-types API models to keep the DB layer
/// independent of wire formats.

pub struct UserRow {
    pub id: String,
    pub username: String,
    pub password: String,
    pub created_at: String,
}

pub struct CampaignRow {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    pub message: String,
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
}

pub struct DestinatarioRow {
    pub id: String,
    pub campaign_id: String,
    pub phone: String,
    pub name: String,
    pub status: String,
    pub created_at: String,
}

pub struct EnvioRow {
    pub id: String,
    pub batch_id: String,
    pub campaign_id: String,
    pub destinatario_id: String,
    pub phone: String,
    pub body: String,
    pub status: String,
    pub error: Option<String>,
    pub created_at: String,
    pub sent_at: Option<String>,
}

pub struct LeadRow {
    pub id: String,
    pub owner_id: Option<String>,
    pub phone: String,
    pub name: Option<String>,
    pub source: String,
    pub status: String,
    pub created_at: String,
}

pub struct InboundMessageRow {
    pub id: String,
    pub phone: String,
    pub body: String,
    pub wa_message_id: Option<String>,
    pub received_at: String,
}

pub struct IaFlagRow {
    pub phone: String,
    pub enabled: bool,
    pub updated_at: String,
}
