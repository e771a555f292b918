use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{Mutex, mpsc, oneshot};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::provider::{ProviderEvent, SessionProvider};

/// How long a send command may wait for the bridge's ack.
const SEND_ACK_TIMEOUT: Duration = Duration::from_secs(30);

type PendingSends = Arc<Mutex<HashMap<String, oneshot::Sender<Result<String, String>>>>>;

/// Drives the external headless WhatsApp Web bridge as a managed child
/// process. The bridge owns the browser automation; this side only
/// translates its NDJSON stdout into `ProviderEvent`s and writes JSON
/// commands to its stdin.
pub struct BridgeProvider {
    cmd: String,
    session_dir: PathBuf,
    child: Mutex<Option<Child>>,
    stdin: Mutex<Option<ChildStdin>>,
    pending: PendingSends,
}

/// One NDJSON line on the bridge's stdout.
#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum BridgeEvent {
    Qr {
        data: String,
    },
    Authenticated,
    Ready {
        #[serde(default)]
        phone: Option<String>,
    },
    Disconnected {
        #[serde(default)]
        reason: Option<String>,
    },
    AuthFailure {
        #[serde(default)]
        reason: Option<String>,
    },
    Message {
        from: String,
        body: String,
        #[serde(default)]
        id: Option<String>,
    },
    Sent {
        id: String,
        wa_message_id: String,
    },
    SendError {
        id: String,
        error: String,
    },
}

/// One JSON command line on the bridge's stdin.
#[derive(Debug, Serialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
enum BridgeCommand<'a> {
    Send { id: &'a str, to: &'a str, body: &'a str },
    Logout,
}

impl BridgeProvider {
    pub fn new(cmd: String, session_dir: PathBuf) -> Self {
        Self {
            cmd,
            session_dir,
            child: Mutex::new(None),
            stdin: Mutex::new(None),
            pending: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    async fn write_command(&self, command: &BridgeCommand<'_>) -> anyhow::Result<()> {
        let mut line = serde_json::to_string(command)?;
        line.push('\n');

        let mut guard = self.stdin.lock().await;
        let stdin = guard.as_mut().context("bridge process is not running")?;
        stdin.write_all(line.as_bytes()).await?;
        stdin.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl SessionProvider for BridgeProvider {
    fn name(&self) -> &'static str {
        "bridge"
    }

    async fn start(&self, events: mpsc::Sender<ProviderEvent>) -> anyhow::Result<()> {
        let mut parts = self.cmd.split_whitespace();
        let program = parts.next().context("bridge command is empty")?;

        let mut child = Command::new(program)
            .args(parts)
            .env("LEADHUB_SESSION_DIR", &self.session_dir)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to spawn bridge: {}", self.cmd))?;

        let stdout = child.stdout.take().context("bridge stdout not captured")?;
        let stdin = child.stdin.take().context("bridge stdin not captured")?;

        info!("bridge started: {}", self.cmd);

        tokio::spawn(read_bridge_events(stdout, events, self.pending.clone()));

        *self.stdin.lock().await = Some(stdin);
        *self.child.lock().await = Some(child);
        Ok(())
    }

    async fn send_text(&self, phone: &str, body: &str) -> anyhow::Result<String> {
        let id = Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id.clone(), tx);

        let result = self
            .write_command(&BridgeCommand::Send {
                id: &id,
                to: phone,
                body,
            })
            .await;
        if let Err(e) = result {
            self.pending.lock().await.remove(&id);
            return Err(e);
        }

        match tokio::time::timeout(SEND_ACK_TIMEOUT, rx).await {
            Ok(Ok(Ok(wa_message_id))) => Ok(wa_message_id),
            Ok(Ok(Err(e))) => bail!("bridge rejected send: {}", e),
            Ok(Err(_)) => bail!("bridge dropped the send ack"),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                bail!("bridge send timed out after {:?}", SEND_ACK_TIMEOUT)
            }
        }
    }

    async fn shutdown(&self) {
        // Best-effort logout so the phone drops the linked device.
        if let Err(e) = self.write_command(&BridgeCommand::Logout).await {
            debug!("bridge logout command failed: {}", e);
        }

        fail_pending(&self.pending, "session shut down").await;

        *self.stdin.lock().await = None;
        if let Some(mut child) = self.child.lock().await.take() {
            if let Err(e) = child.kill().await {
                debug!("bridge kill failed: {}", e);
            }
            let _ = child.wait().await;
        }
    }
}

/// Pump the bridge's stdout into provider events until the process exits.
async fn read_bridge_events(
    stdout: tokio::process::ChildStdout,
    events: mpsc::Sender<ProviderEvent>,
    pending: PendingSends,
) {
    let mut lines = BufReader::new(stdout).lines();

    while let Ok(Some(line)) = lines.next_line().await {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let event = match serde_json::from_str::<BridgeEvent>(line) {
            Ok(ev) => ev,
            Err(e) => {
                warn!("unparseable bridge line ({}): {}", e, line);
                continue;
            }
        };

        match event {
            BridgeEvent::Sent { id, wa_message_id } => {
                if let Some(tx) = pending.lock().await.remove(&id) {
                    let _ = tx.send(Ok(wa_message_id));
                }
            }
            BridgeEvent::SendError { id, error } => {
                if let Some(tx) = pending.lock().await.remove(&id) {
                    let _ = tx.send(Err(error));
                }
            }
            other => {
                if let Some(ev) = translate_event(other) {
                    if events.send(ev).await.is_err() {
                        // Manager side went away; keep draining so the child
                        // doesn't block on a full pipe.
                        debug!("event receiver closed, draining bridge output");
                    }
                }
            }
        }
    }

    fail_pending(&pending, "bridge process exited").await;
    let _ = events
        .send(ProviderEvent::Disconnected {
            reason: "bridge process exited".into(),
        })
        .await;
}

fn translate_event(event: BridgeEvent) -> Option<ProviderEvent> {
    match event {
        BridgeEvent::Qr { data } => Some(ProviderEvent::Qr(data)),
        BridgeEvent::Authenticated => Some(ProviderEvent::Authenticated),
        BridgeEvent::Ready { phone } => Some(ProviderEvent::Ready { phone }),
        BridgeEvent::Disconnected { reason } => Some(ProviderEvent::Disconnected {
            reason: reason.unwrap_or_else(|| "disconnected".into()),
        }),
        BridgeEvent::AuthFailure { reason } => Some(ProviderEvent::AuthFailure {
            reason: reason.unwrap_or_else(|| "auth failure".into()),
        }),
        BridgeEvent::Message { from, body, id } => {
            // Group chats are not part of the campaign flow.
            if from.ends_with("@g.us") {
                debug!("ignoring group message from {}", from);
                return None;
            }
            Some(ProviderEvent::Message {
                phone: phone_from_jid(&from),
                body,
                wa_message_id: id,
            })
        }
        BridgeEvent::Sent { .. } | BridgeEvent::SendError { .. } => None,
    }
}

/// `5215512345678@c.us` -> `5215512345678`.
fn phone_from_jid(jid: &str) -> String {
    jid.split('@').next().unwrap_or(jid).to_string()
}

async fn fail_pending(pending: &PendingSends, reason: &str) {
    let mut map = pending.lock().await;
    for (_, tx) in map.drain() {
        let _ = tx.send(Err(reason.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_qr_event_line() {
        let ev: BridgeEvent =
            serde_json::from_str(r#"{"event":"qr","data":"2@abc123=="}"#).unwrap();
        match translate_event(ev) {
            Some(ProviderEvent::Qr(data)) => assert_eq!(data, "2@abc123=="),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn parses_ready_with_and_without_phone() {
        let ev: BridgeEvent =
            serde_json::from_str(r#"{"event":"ready","phone":"5215512345678"}"#).unwrap();
        match translate_event(ev) {
            Some(ProviderEvent::Ready { phone }) => {
                assert_eq!(phone.as_deref(), Some("5215512345678"))
            }
            other => panic!("unexpected: {:?}", other),
        }

        let ev: BridgeEvent = serde_json::from_str(r#"{"event":"ready"}"#).unwrap();
        assert!(matches!(
            translate_event(ev),
            Some(ProviderEvent::Ready { phone: None })
        ));
    }

    #[test]
    fn message_event_strips_jid_and_skips_groups() {
        let ev: BridgeEvent = serde_json::from_str(
            r#"{"event":"message","from":"5215512345678@c.us","body":"hola","id":"ABCD"}"#,
        )
        .unwrap();
        match translate_event(ev) {
            Some(ProviderEvent::Message { phone, body, wa_message_id }) => {
                assert_eq!(phone, "5215512345678");
                assert_eq!(body, "hola");
                assert_eq!(wa_message_id.as_deref(), Some("ABCD"));
            }
            other => panic!("unexpected: {:?}", other),
        }

        let group: BridgeEvent = serde_json::from_str(
            r#"{"event":"message","from":"1234-5678@g.us","body":"spam"}"#,
        )
        .unwrap();
        assert!(translate_event(group).is_none());
    }

    #[test]
    fn malformed_and_unknown_lines_fail_to_parse() {
        assert!(serde_json::from_str::<BridgeEvent>("not json").is_err());
        assert!(serde_json::from_str::<BridgeEvent>(r#"{"event":"battery","level":42}"#).is_err());
    }

    #[test]
    fn send_command_serializes_as_single_line() {
        let cmd = BridgeCommand::Send {
            id: "abc",
            to: "5215512345678",
            body: "Hola Ana",
        };
        let json = serde_json::to_string(&cmd).unwrap();
        assert!(!json.contains('\n'));
        assert_eq!(
            json,
            r#"{"cmd":"send","id":"abc","to":"5215512345678","body":"Hola Ana"}"#
        );
    }
}
