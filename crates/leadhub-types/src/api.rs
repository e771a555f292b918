use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::session::{SessionState, SessionStatus};

// -- JWT Claims --

/// JWT claims shared between leadhub-server (REST middleware) and
/// leadhub-session-manager (session control auth). Canonical definition
/// lives here so the two services cannot drift apart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    pub exp: usize,
}

// -- Error envelope --

/// Body of every non-2xx response: `{error, code, message}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: bool,
    pub code: String,
    pub message: String,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub user_id: Uuid,
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub user_id: Uuid,
    pub username: String,
    pub token: String,
}

// -- Campaigns --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateCampaignRequest {
    pub name: String,
    /// Message template; `{{nombre}}` and `{{telefono}}` are substituted
    /// per recipient at prepare time.
    pub message: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateCampaignRequest {
    pub name: Option<String>,
    pub message: Option<String>,
    pub status: Option<CampaignStatus>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CampaignStatus {
    Draft,
    Active,
    Archived,
}

impl CampaignStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Active => "active",
            Self::Archived => "archived",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(Self::Draft),
            "active" => Some(Self::Active),
            "archived" => Some(Self::Archived),
            _ => None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CampaignResponse {
    pub id: Uuid,
    pub name: String,
    pub message: String,
    pub status: CampaignStatus,
    pub destinatario_count: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// -- Destinatarios --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AddDestinatarioRequest {
    pub phone: String,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DestinatarioStatus {
    Pending,
    Sent,
    Failed,
    Replied,
}

impl DestinatarioStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Sent => "sent",
            Self::Failed => "failed",
            Self::Replied => "replied",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "sent" => Some(Self::Sent),
            "failed" => Some(Self::Failed),
            "replied" => Some(Self::Replied),
            _ => None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DestinatarioResponse {
    pub id: Uuid,
    pub campaign_id: Uuid,
    pub phone: String,
    pub name: String,
    pub status: DestinatarioStatus,
    /// False when the phone was already on the list and the insert was a no-op.
    pub inserted: bool,
}

// -- Sender (two-phase manual send) --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PrepareSendRequest {
    pub campaign_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PrepareSendResponse {
    pub batch_id: Uuid,
    pub campaign_id: Uuid,
    pub envios: Vec<EnvioPreview>,
}

/// Rendered message shown to the operator before confirmation.
#[derive(Debug, Serialize, Deserialize)]
pub struct EnvioPreview {
    pub id: Uuid,
    pub phone: String,
    pub name: String,
    pub body: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfirmSendRequest {
    pub batch_id: Uuid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvioStatus {
    Prepared,
    Sending,
    Sent,
    Failed,
    Cancelled,
}

impl EnvioStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Prepared => "prepared",
            Self::Sending => "sending",
            Self::Sent => "sent",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "prepared" => Some(Self::Prepared),
            "sending" => Some(Self::Sending),
            "sent" => Some(Self::Sent),
            "failed" => Some(Self::Failed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BatchStatusResponse {
    pub batch_id: Uuid,
    pub campaign_id: Uuid,
    pub total: u64,
    pub sent: u64,
    pub failed: u64,
    pub pending: u64,
    pub envios: Vec<EnvioResponse>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EnvioResponse {
    pub id: Uuid,
    pub phone: String,
    pub body: String,
    pub status: EnvioStatus,
    pub error: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
}

// -- Listener --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SetIaFlagRequest {
    pub enabled: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct IaFlagResponse {
    pub phone: String,
    pub enabled: bool,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct InboundMessageResponse {
    pub id: Uuid,
    pub phone: String,
    pub body: String,
    pub wa_message_id: Option<String>,
    pub received_at: DateTime<Utc>,
}

// -- Leads --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeadStatus {
    New,
    Contacted,
    Qualified,
    Discarded,
}

impl LeadStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Contacted => "contacted",
            Self::Qualified => "qualified",
            Self::Discarded => "discarded",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "new" => Some(Self::New),
            "contacted" => Some(Self::Contacted),
            "qualified" => Some(Self::Qualified),
            "discarded" => Some(Self::Discarded),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateLeadRequest {
    pub name: Option<String>,
    pub status: Option<LeadStatus>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LeadResponse {
    pub id: Uuid,
    pub phone: String,
    pub name: Option<String>,
    pub source: String,
    pub status: LeadStatus,
    pub created_at: DateTime<Utc>,
}

// -- Session control --

/// `GET /status` body. The QR payload itself is only served by `GET /qr`;
/// the poll loop just needs to know whether one is waiting.
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionStatusResponse {
    pub state: SessionState,
    pub qr_available: bool,
    pub connected: bool,
    pub phone: Option<String>,
    pub last_error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl From<&SessionStatus> for SessionStatusResponse {
    fn from(s: &SessionStatus) -> Self {
        Self {
            state: s.state,
            qr_available: s.qr.is_some(),
            connected: s.connected,
            phone: s.phone.clone(),
            last_error: s.last_error.clone(),
            updated_at: s.updated_at,
        }
    }
}

/// `GET /qr` body — base64 payload ready for the dashboard's QR renderer.
#[derive(Debug, Serialize, Deserialize)]
pub struct QrResponse {
    pub qr: String,
    pub issued_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    pub phone: String,
    pub body: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SendMessageResponse {
    pub wa_message_id: String,
}
