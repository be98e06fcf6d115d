//! Atomic blob writes (spec §4.8): every artifact is written to a sibling
//! temp file first and only `rename`d into place once the write and flush
//! succeed, so a crash or a concurrent read never observes a partial file.

use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

pub async fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp_path = tmp_path_for(path);
    let mut file = tokio::fs::File::create(&tmp_path).await?;
    file.write_all(bytes).await?;
    file.flush().await?;
    file.sync_all().await?;
    tokio::fs::rename(&tmp_path, path).await?;
    Ok(())
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".validating");
    PathBuf::from(tmp)
}

pub fn image_path(job_dir: &Path, image_name: &str) -> PathBuf {
    job_dir.join(format!("{image_name}.jpg"))
}

pub fn alto_path(job_dir: &Path, image_name: &str) -> PathBuf {
    job_dir.join(format!("{image_name}.alto.xml"))
}

pub fn page_path(job_dir: &Path, image_name: &str) -> PathBuf {
    job_dir.join(format!("{image_name}.page.xml"))
}

pub fn metadata_path(job_dir: &Path) -> PathBuf {
    job_dir.join("metadata.json")
}
