use std::path::PathBuf;

use rocket::data::{Data, ToByteUnit};
use rocket::fs::NamedFile;
use rocket::serde::json::Json;
use rocket::State;
use serde_json::{json, Value};

use crate::config::Config;
use crate::data::user::MediaRef;
use crate::media::{FsMediaStore, MediaStore};
use crate::resp::jwt::UserRoleToken;
use crate::resp::problem::{problems, Problem};

/// Uploads larger than this are rejected.
const MEDIA_UPLOAD_LIMIT_MIB: u64 = 32;

pub async fn app_index_file(c: &State<Config>) -> NamedFile {
    NamedFile::open(c.public_content.as_path().join("index.html"))
        .await
        .expect(
            format!(
                "'{}' does not exist!",
                c.public_content.as_path().join("index.html").display()
            )
            .as_str(),
        )
}

#[get("/")]
pub async fn app(c: &State<Config>) -> NamedFile {
    app_index_file(c).await
}

#[get("/<path..>", rank = 10)]
pub async fn app_path(path: PathBuf, c: &State<Config>) -> NamedFile {
    NamedFile::open(c.public_content.as_path().join(path.as_path()))
        .await
        .ok()
        .unwrap_or(app_index_file(c).await)
}

/// Store an uploaded file and return its public URL.
#[post("/media", data = "<upload>")]
#[tracing::instrument(skip(upload, media, _auth))]
pub async fn media_upload(
    upload: Data<'_>,
    _auth: UserRoleToken,
    media: &State<FsMediaStore>,
) -> Result<Json<MediaRef>, Problem> {
    let bytes = upload
        .open(MEDIA_UPLOAD_LIMIT_MIB.mebibytes())
        .into_bytes()
        .await?;

    if !bytes.is_complete() {
        return Err(problems::bad_request("Upload exceeds the size limit."));
    }
    if bytes.is_empty() {
        return Err(problems::bad_request("Upload is empty."));
    }

    Ok(Json(media.upload(&bytes).await?))
}

#[delete("/media/<public_id>")]
#[tracing::instrument(skip(media, _auth))]
pub async fn media_delete(
    public_id: &str,
    _auth: UserRoleToken,
    media: &State<FsMediaStore>,
) -> Result<Json<Value>, Problem> {
    media.destroy(public_id).await?;

    Ok(Json(json!({ "message": "Media deleted successfully." })))
}
