/// Persistent conversation history management.
///
/// Each session is a single JSON blob at `sessions/{uuid}.json` under the
/// XDG data directory (`~/.local/share/sven/sessions/`), file mode 0600,
/// directory mode 0700. The blob carries the session id, a title (the first
/// 40 characters of the first user message), the message count, created/
/// updated timestamps, and the full message history needed to resume.
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sven_model::Message;
use uuid::Uuid;

use crate::ParsedConversation;

// ─── Directory ───────────────────────────────────────────────────────────────

/// The user-scoped data directory sven stores all persisted state under.
fn base_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".local")
                .join("share")
        })
        .join("sven")
}

/// Returns the directory where sven stores session records.
///
/// `$XDG_DATA_HOME/sven/sessions` (i.e. `~/.local/share/sven/sessions`).
pub fn history_dir() -> PathBuf {
    base_dir().join("sessions")
}

/// Creates the session directory (mode 0700) if it does not exist and
/// returns its path.
pub fn ensure_history_dir() -> Result<PathBuf> {
    let dir = history_dir();
    create_dir_0700(&dir)
        .with_context(|| format!("creating history directory {}", dir.display()))?;
    Ok(dir)
}

#[cfg(unix)]
fn create_dir_0700(dir: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    std::fs::DirBuilder::new().recursive(true).mode(0o700).create(dir)?;
    Ok(())
}

#[cfg(not(unix))]
fn create_dir_0700(dir: &Path) -> std::io::Result<()> {
    fs::create_dir_all(dir)
}

#[cfg(unix)]
fn write_0600(path: &Path, data: &[u8]) -> std::io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;
    let mut f = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    f.write_all(data)
}

#[cfg(not(unix))]
fn write_0600(path: &Path, data: &[u8]) -> std::io::Result<()> {
    fs::write(path, data)
}

// ─── On-disk record ──────────────────────────────────────────────────────────

/// The JSON blob written to `sessions/{id}.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionRecord {
    id: String,
    title: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    message_count: usize,
    messages: Vec<Message>,
}

fn read_record(path: &Path) -> Option<SessionRecord> {
    let content = fs::read_to_string(path).ok()?;
    serde_json::from_str(&content).ok()
}

// ─── Save ────────────────────────────────────────────────────────────────────

/// Writes `messages` as a new session record and returns the path written.
///
/// Returns an error if `messages` is empty.
pub fn save(messages: &[Message]) -> Result<PathBuf> {
    if messages.is_empty() {
        anyhow::bail!("cannot save empty conversation");
    }

    let dir = ensure_history_dir()?;

    let first_user = messages
        .iter()
        .find(|m| matches!(m.role, sven_model::Role::User))
        .and_then(|m| m.as_text())
        .unwrap_or("");

    let id = Uuid::new_v4().to_string();
    let path = dir.join(format!("{id}.json"));
    let now = Utc::now();
    let record = SessionRecord {
        id,
        title: make_title(first_user),
        created_at: now,
        updated_at: now,
        message_count: messages.len(),
        messages: messages.to_vec(),
    };

    write_record(&path, &record)?;
    Ok(path)
}

/// Overwrites an existing session record with the given messages.
///
/// Preserves the id, title, and `createdAt` of the existing record at `path`
/// (if any); otherwise derives a fresh id/title, consistent with `save()`.
pub fn save_to(path: &Path, messages: &[Message]) -> Result<()> {
    if messages.is_empty() {
        return Ok(());
    }

    let (id, title, created_at) = match read_record(path) {
        Some(existing) => (existing.id, existing.title, existing.created_at),
        None => {
            let first_user = messages
                .iter()
                .find(|m| matches!(m.role, sven_model::Role::User))
                .and_then(|m| m.as_text())
                .unwrap_or("");
            let id = path
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_else(|| Uuid::new_v4().to_string());
            (id, make_title(first_user), Utc::now())
        }
    };

    let record = SessionRecord {
        id,
        title,
        created_at,
        updated_at: Utc::now(),
        message_count: messages.len(),
        messages: messages.to_vec(),
    };

    write_record(path, &record)
}

fn write_record(path: &Path, record: &SessionRecord) -> Result<()> {
    let json = serde_json::to_string_pretty(record).context("serializing session record")?;
    write_0600(path, json.as_bytes())
        .with_context(|| format!("writing session record to {}", path.display()))
}

// ─── List ────────────────────────────────────────────────────────────────────

/// A summary of a saved session shown when listing history.
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    /// Session uuid, used as the `--resume` id.
    pub id: String,
    /// Full path to the session's JSON record.
    pub path: PathBuf,
    /// RFC 3339 `updatedAt` timestamp.
    pub timestamp: String,
    /// First 40 characters of the first user message.
    pub title: String,
    /// Number of messages in the session.
    pub message_count: usize,
}

/// Lists all sessions, most recently updated first.
pub fn list(limit: Option<usize>) -> Result<Vec<HistoryEntry>> {
    let dir = history_dir();
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut entries: Vec<HistoryEntry> = Vec::new();
    for entry in fs::read_dir(&dir).context("reading history directory")? {
        let entry = entry?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let Some(record) = read_record(&path) else {
            continue;
        };
        entries.push(HistoryEntry {
            id: record.id,
            path,
            timestamp: record.updated_at.to_rfc3339(),
            title: record.title,
            message_count: record.message_count,
        });
    }

    entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    if let Some(n) = limit {
        entries.truncate(n);
    }
    Ok(entries)
}

// ─── Resolve / Load ──────────────────────────────────────────────────────────

/// Resolves a session ID to its file path.
///
/// Accepts:
/// - Exact session uuid
/// - Unique uuid prefix
/// - Absolute or relative filesystem path to a `.json` session file
pub fn resolve(id: &str) -> Result<PathBuf> {
    let p = PathBuf::from(id);
    if p.is_absolute() || id.contains('/') {
        if p.exists() {
            return Ok(p);
        }
        anyhow::bail!("file not found: {}", p.display());
    }

    let dir = history_dir();

    let with_ext = dir.join(format!("{id}.json"));
    if with_ext.exists() {
        return Ok(with_ext);
    }

    if dir.exists() {
        let mut matches: Vec<PathBuf> = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with(id) && name.ends_with(".json") {
                matches.push(entry.path());
            }
        }
        matches.sort();
        match matches.len() {
            1 => return Ok(matches.remove(0)),
            n if n > 1 => {
                let ids: Vec<String> = matches
                    .iter()
                    .filter_map(|p| p.file_stem().map(|s| s.to_string_lossy().to_string()))
                    .collect();
                anyhow::bail!(
                    "ambiguous id '{}' matches {} conversations:\n  {}\nBe more specific.",
                    id,
                    n,
                    ids.join("\n  ")
                );
            }
            _ => {}
        }
    }

    anyhow::bail!(
        "no conversation found with id '{}'. Use 'sven chats' to list saved conversations.",
        id
    )
}

/// Loads a session by ID.  Returns both the parsed conversation and the
/// resolved file path (needed for subsequent saves).
pub fn load(id: &str) -> Result<(ParsedConversation, PathBuf)> {
    let path = resolve(id)?;
    let content = fs::read_to_string(&path)
        .with_context(|| format!("reading session file {}", path.display()))?;
    let record: SessionRecord = serde_json::from_str(&content)
        .with_context(|| format!("parsing session file {}", path.display()))?;
    let parsed = ParsedConversation {
        title: Some(record.title),
        history: record.messages,
        pending_user_input: None,
    };
    Ok((parsed, path))
}

// ─── Title ───────────────────────────────────────────────────────────────────

/// First 40 characters of `text`, trimmed. Falls back to "Conversation" when
/// `text` is empty.
pub fn make_title(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return "Conversation".to_string();
    }
    trimmed.chars().take(40).collect()
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
