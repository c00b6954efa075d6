//! Session id persisted across runs of the chat client.

use std::path::Path;

use endstate_core::SessionId;

use crate::error::Result;

/// Read the session id stored at `path`, or generate one and store it.
pub fn load_or_create(path: &Path) -> Result<SessionId> {
    match std::fs::read_to_string(path) {
        Ok(raw) if !raw.trim().is_empty() => return Ok(SessionId::parse(&raw)?),
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }

    let session_id = SessionId::generate();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, format!("{session_id}\n"))?;
    tracing::info!(session_id = %session_id, path = %path.display(), "Created new session");
    Ok(session_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_then_reuses() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("session");

        let first = load_or_create(&path).unwrap();
        let second = load_or_create(&path).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn rejects_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session");
        std::fs::write(&path, "not a valid id!").unwrap();
        assert!(load_or_create(&path).is_err());
    }
}
