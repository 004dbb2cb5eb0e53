//! # Session Persistence
//!
//! Save/load query transcripts to `~/.claif/sessions/`.
//!
//! Each session is a JSON file (`<uuid>.json`) plus a lightweight index
//! (`sessions.json`) that avoids loading all files just to render a list.
//!
//! All writes use atomic rename (write `.tmp`, then `rename()`) for crash safety.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::Utc;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::providers::{Message, ProviderKind};

/// Summary metadata for a session (stored in the index file).
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct SessionMeta {
    pub id: String,
    pub title: String,
    pub created_at: i64,
    pub updated_at: i64,
    pub provider: ProviderKind,
    pub model: String,
    pub message_count: usize,
}

/// Full session data: metadata + the prompt and collected messages.
#[derive(Serialize, Deserialize, Debug)]
pub struct SessionData {
    pub meta: SessionMeta,
    pub prompt: String,
    pub messages: Vec<Message>,
}

/// Index of all sessions, sorted by `updated_at` descending (newest first).
#[derive(Serialize, Deserialize, Default, Debug)]
pub struct SessionIndex {
    pub sessions: Vec<SessionMeta>,
}

/// Returns the session directory (`CLAIF_SESSION_DIR` or `~/.claif/sessions/`),
/// creating it if needed.
pub fn sessions_dir() -> io::Result<PathBuf> {
    let dir = match std::env::var("CLAIF_SESSION_DIR") {
        Ok(custom) => PathBuf::from(custom),
        Err(_) => {
            let home = dirs::home_dir()
                .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no home directory"))?;
            home.join(".claif").join("sessions")
        }
    };
    fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Generate a new UUID v4 session ID.
pub fn new_session_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Derive a title from the prompt: first line, truncated to 60 chars.
pub fn derive_title(prompt: &str) -> String {
    let first_line = prompt.lines().next().unwrap_or("").trim();
    if first_line.is_empty() {
        return "Untitled".to_string();
    }
    if first_line.len() > 60 {
        let cut: String = first_line.chars().take(57).collect();
        return format!("{cut}...");
    }
    first_line.to_string()
}

/// Atomically write `data` as JSON to `path` (via `.tmp` + rename).
fn atomic_write_json<T: Serialize>(path: &Path, data: &T) -> io::Result<()> {
    let tmp_path = path.with_extension("tmp");
    let json = serde_json::to_string_pretty(data)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    fs::write(&tmp_path, json)?;
    fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Persist a completed query as a new session and update the index.
/// Skips empty transcripts. Returns the new session ID (None if skipped).
pub fn record_query(
    dir: &Path,
    provider: ProviderKind,
    model: &str,
    prompt: &str,
    messages: &[Message],
) -> io::Result<Option<String>> {
    if messages.is_empty() {
        return Ok(None);
    }

    let now = Utc::now().timestamp();
    let id = new_session_id();
    let meta = SessionMeta {
        id: id.clone(),
        title: derive_title(prompt),
        created_at: now,
        updated_at: now,
        provider,
        model: model.to_string(),
        message_count: messages.len(),
    };
    let data = SessionData {
        meta: meta.clone(),
        prompt: prompt.to_string(),
        messages: messages.to_vec(),
    };

    let session_path = dir.join(format!("{}.json", id));
    atomic_write_json(&session_path, &data)?;

    // Update index, newest first
    let mut index = load_index(dir).unwrap_or_default();
    index.sessions.retain(|s| s.id != id);
    index.sessions.push(meta);
    index.sessions.sort_by_key(|s| std::cmp::Reverse(s.updated_at));

    let index_path = dir.join("sessions.json");
    atomic_write_json(&index_path, &index)?;

    debug!("Session saved: {}", id);
    Ok(Some(id))
}

/// Load a session from disk by ID.
pub fn load_session(dir: &Path, id: &str) -> io::Result<SessionData> {
    let path = dir.join(format!("{}.json", id));
    let json = fs::read_to_string(&path)?;
    serde_json::from_str(&json).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

/// Delete a session from disk and update the index.
pub fn delete_session(dir: &Path, id: &str) -> io::Result<()> {
    let path = dir.join(format!("{}.json", id));
    if path.exists() {
        fs::remove_file(path)?;
    }

    let mut index = load_index(dir).unwrap_or_default();
    index.sessions.retain(|s| s.id != id);
    let index_path = dir.join("sessions.json");
    atomic_write_json(&index_path, &index)?;

    Ok(())
}

/// Load the session index from disk.
pub fn load_index(dir: &Path) -> io::Result<SessionIndex> {
    let path = dir.join("sessions.json");
    if !path.exists() {
        return Ok(SessionIndex::default());
    }
    let json = fs::read_to_string(path)?;
    serde_json::from_str(&json).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}
