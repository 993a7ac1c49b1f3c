use std::path::PathBuf;

use rocket::tokio::fs;
use uuid::Uuid;

use crate::config::Config;
use crate::data::user::MediaRef;
use crate::resp::problem::{problems, Problem};

/// Simple call/response media host contract: store bytes, get back a public
/// URL plus an id that can destroy the upload later.
pub trait MediaStore {
    async fn upload(&self, bytes: &[u8]) -> Result<MediaRef, Problem>;
    async fn destroy(&self, public_id: &str) -> Result<(), Problem>;
}

/// Media store backed by the public content directory served by the static
/// file routes.
#[derive(Debug, Clone)]
pub struct FsMediaStore {
    root: PathBuf,
    base_url: String,
}

impl FsMediaStore {
    pub fn new(root: impl Into<PathBuf>, app_url: impl AsRef<str>) -> FsMediaStore {
        FsMediaStore {
            root: root.into(),
            base_url: format!("{}/media", app_url.as_ref().trim_end_matches('/')),
        }
    }

    pub fn from_config(c: &Config) -> FsMediaStore {
        FsMediaStore::new(c.public_content.join("media"), &c.app_url)
    }

    fn validate_public_id(public_id: &str) -> Result<(), Problem> {
        let valid = !public_id.is_empty()
            && public_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-');
        if !valid {
            return Err(problems::bad_request("Invalid media id."));
        }
        Ok(())
    }
}

impl MediaStore for FsMediaStore {
    async fn upload(&self, bytes: &[u8]) -> Result<MediaRef, Problem> {
        let public_id = Uuid::new_v4().to_string();

        fs::create_dir_all(&self.root).await?;
        fs::write(self.root.join(&public_id), bytes).await?;

        Ok(MediaRef {
            url: format!("{}/{}", self.base_url, public_id),
            public_id,
        })
    }

    async fn destroy(&self, public_id: &str) -> Result<(), Problem> {
        Self::validate_public_id(public_id)?;

        match fs::remove_file(self.root.join(public_id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(problems::not_found("Media doesn't exist."))
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> FsMediaStore {
        let root = std::env::temp_dir().join(format!("tutorhub-media-{}", Uuid::new_v4()));
        FsMediaStore::new(root, "http://localhost:8000")
    }

    #[rocket::async_test]
    async fn upload_then_destroy_round_trip() {
        let store = temp_store();

        let media = store.upload(b"not really a jpeg").await.expect("upload works");
        assert!(media.url.ends_with(&media.public_id));
        assert!(media.url.starts_with("http://localhost:8000/media/"));

        store.destroy(&media.public_id).await.expect("destroy works");
        assert!(store.destroy(&media.public_id).await.is_err());
    }

    #[rocket::async_test]
    async fn path_escapes_are_rejected() {
        let store = temp_store();

        assert!(store.destroy("../settings.yml").await.is_err());
        assert!(store.destroy("").await.is_err());
    }
}
