//! Token pair persistence.
//!
//! The pair returned by register/auth is written as JSON with owner-only
//! permissions; `user logout` removes the file.

use std::fs;
use std::io::Write;
use std::path::PathBuf;

use anyhow::Context;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenData {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Clone)]
pub struct TokenFile {
    path: PathBuf,
}

impl TokenFile {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn default_path() -> PathBuf {
        std::env::temp_dir().join(".keeper_token")
    }

    pub fn save(&self, tokens: &TokenData) -> anyhow::Result<()> {
        let json = serde_json::to_string(tokens).context("failed to marshal token")?;

        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let mut file = options
            .open(&self.path)
            .with_context(|| format!("failed to write token file {}", self.path.display()))?;
        file.write_all(json.as_bytes())
            .context("failed to write token file")?;
        Ok(())
    }

    pub fn load(&self) -> anyhow::Result<TokenData> {
        let raw = fs::read_to_string(&self.path)
            .with_context(|| "not authenticated; run `keeper user auth` first".to_string())?;
        serde_json::from_str(&raw).context("failed to parse token file")
    }

    pub fn delete(&self) -> anyhow::Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err).context("failed to delete token file"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens() -> TokenData {
        TokenData {
            access_token: "access.jwt".into(),
            refresh_token: "refresh.jwt".into(),
        }
    }

    #[test]
    fn test_save_load_delete() {
        let dir = tempfile::tempdir().unwrap();
        let file = TokenFile::new(dir.path().join("token.json"));

        file.save(&tokens()).unwrap();
        let loaded = file.load().unwrap();
        assert_eq!(loaded.access_token, "access.jwt");
        assert_eq!(loaded.refresh_token, "refresh.jwt");

        file.delete().unwrap();
        assert!(file.load().is_err());

        // Deleting an absent file is not an error (logout twice).
        file.delete().unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn test_token_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let file = TokenFile::new(dir.path().join("token.json"));
        file.save(&tokens()).unwrap();

        let mode = fs::metadata(dir.path().join("token.json"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_token_json_shape() {
        let json = serde_json::to_value(tokens()).unwrap();
        assert!(json.get("access_token").is_some());
        assert!(json.get("refresh_token").is_some());
    }
}
