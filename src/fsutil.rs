//! Atomic JSON persistence: write to a sibling temp file, then rename over
//! the target. A crash between these two steps leaves either the prior file
//! or the new one on disk — never a truncated write.

use std::path::Path;

use serde::Serialize;
use tokio::io::AsyncWriteExt;

pub async fn atomic_write_json<T: Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    let bytes = serde_json::to_vec(value)?;

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let tmp_name = format!(
        ".{}.{}.tmp",
        path.file_name().and_then(|n| n.to_str()).unwrap_or("index"),
        uuid::Uuid::new_v4()
    );
    let tmp_path = dir.join(tmp_name);

    let mut file = tokio::fs::File::create(&tmp_path).await?;
    file.write_all(&bytes).await?;
    file.sync_all().await?;
    drop(file);

    tokio::fs::rename(&tmp_path, path).await?;
    Ok(())
}
