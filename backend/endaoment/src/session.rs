//! Persisted client session: who the user says they are and an optional
//! cosmetic donor profile. Loaded once at session start and written back on
//! every change. Nothing here is authoritative.

use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::errors::{EndaomentError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum UserType {
    Donor,
    Student,
    University,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DonorProfile {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// `data:` URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    #[serde(default)]
    pub user_type: Option<UserType>,
    #[serde(default)]
    pub profile: DonorProfile,
}

pub struct SessionStore {
    path: PathBuf,
    session: Session,
}

impl SessionStore {
    /// Read the session at `path`. A missing file starts empty; an unreadable
    /// one is replaced on the next write.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let session = match std::fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!("Ignoring corrupt session file {}: {e}", path.display());
                Session::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Session::default(),
            Err(e) => return Err(e.into()),
        };
        Ok(SessionStore { path, session })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn set_user_type(&mut self, user_type: UserType) -> Result<()> {
        self.session.user_type = Some(user_type);
        self.persist()
    }

    pub fn set_profile(&mut self, profile: DonorProfile) -> Result<()> {
        self.session.profile = profile;
        self.persist()
    }

    fn persist(&self) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, serde_json::to_string_pretty(&self.session)?)?;
        debug!("Session saved to {}", self.path.display());
        Ok(())
    }
}

fn mime_type(path: &Path) -> Result<&'static str> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match extension.as_str() {
        "png" => Ok("image/png"),
        "jpg" | "jpeg" => Ok("image/jpeg"),
        "gif" => Ok("image/gif"),
        "webp" => Ok("image/webp"),
        "svg" => Ok("image/svg+xml"),
        _ => Err(EndaomentError::Config(format!(
            "unsupported image type: {}",
            path.display()
        ))),
    }
}

pub fn image_data_url(mime: &str, bytes: &[u8]) -> String {
    format!("data:{mime};base64,{}", STANDARD.encode(bytes))
}

/// Read an image file into a `data:` URL.
pub fn load_image(path: &Path) -> Result<String> {
    let mime = mime_type(path)?;
    Ok(image_data_url(mime, &std::fs::read(path)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_empty_and_persists_changes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/session.json");

        let mut store = SessionStore::load(&path).unwrap();
        assert_eq!(store.session(), &Session::default());

        store.set_user_type(UserType::Donor).unwrap();
        store
            .set_profile(DonorProfile {
                name: "Fundación Azul".to_string(),
                description: "Becas".to_string(),
                image: None,
            })
            .unwrap();

        let reloaded = SessionStore::load(&path).unwrap();
        assert_eq!(reloaded.session().user_type, Some(UserType::Donor));
        assert_eq!(reloaded.session().profile.name, "Fundación Azul");

        let raw: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["userType"], "donor");
    }

    #[test]
    fn corrupt_file_falls_back_to_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, "{not json").unwrap();

        let mut store = SessionStore::load(&path).unwrap();
        assert_eq!(store.session().user_type, None);
        store.set_user_type(UserType::Student).unwrap();
        assert!(SessionStore::load(&path).is_ok());
    }

    #[test]
    fn images_become_data_urls() {
        let dir = tempfile::tempdir().unwrap();
        let png = dir.path().join("logo.PNG");
        std::fs::write(&png, [0x89, b'P', b'N', b'G']).unwrap();
        assert_eq!(load_image(&png).unwrap(), "data:image/png;base64,iVBORw==");

        let txt = dir.path().join("notes.txt");
        std::fs::write(&txt, "hi").unwrap();
        assert!(load_image(&txt).is_err());
    }
}
