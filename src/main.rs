use std::path::PathBuf;
use std::sync::Arc;
use anyhow::Context;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use media_vault::config::{Settings, DEFAULT_CONFIG_FILE};
use media_vault::gallery::{GalleryClient, MediaFile};
use media_vault::utils::format_bytes;
use media_vault::{
    HttpTargetProvider, HttpTransport, UploadCallbacks, UploadEvent, UploadFile, UploadManager,
    UploadStatus,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config_path = std::env::var("VAULT_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
    let settings = Settings::load_or_default(&config_path)?;

    let paths: Vec<PathBuf> = std::env::args().skip(1).map(PathBuf::from).collect();
    if paths.is_empty() {
        anyhow::bail!("Usage: media-vault <image>...");
    }

    let mut files = Vec::with_capacity(paths.len());
    for path in &paths {
        let file = UploadFile::from_path(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        files.push(file);
    }

    let client = reqwest::Client::new();
    let provider = HttpTargetProvider::new(client.clone(), &settings.upload_endpoint)
        .context("Invalid upload_endpoint")?;
    let transport = HttpTransport::new(client.clone()).with_chunk_size(settings.chunk_size);
    let gallery = settings
        .files_endpoint
        .as_deref()
        .map(|endpoint| GalleryClient::new(client.clone(), endpoint))
        .transpose()
        .context("Invalid files_endpoint")?;

    let callbacks = UploadCallbacks::new()
        .on_rejected(|rejection| println!("{}: {}", rejection.file_name, rejection.reason))
        .on_progress(|progress| match progress.status {
            UploadStatus::Uploading => println!("{:<32} {:>6.1}%", progress.file_name, progress.percent),
            UploadStatus::Success => println!("{:<32} done", progress.file_name),
            UploadStatus::Error => println!(
                "{:<32} failed: {}",
                progress.file_name,
                progress.error.as_deref().unwrap_or_default()
            ),
            UploadStatus::Idle => {}
        });

    let handle = UploadManager::builder(Arc::new(provider), Arc::new(transport))
        .config(settings.manager_config())
        .callbacks(callbacks)
        .build();

    let mut events = handle.manager.subscribe_events();
    let submission = handle.manager.submit(files).await?;

    // Events only drive gallery refreshes, settling is tracked by the manager
    let mut gallery_files = Vec::new();
    let outcomes = {
        let settled = handle.manager.wait_settled(&submission.accepted);
        tokio::pin!(settled);

        let mut subscribed = true;
        loop {
            tokio::select! {
                outcomes = &mut settled => break outcomes?,
                event = events.recv(), if subscribed => match event {
                    Ok(UploadEvent::Completed(_)) => refresh_gallery(gallery.as_ref(), &mut gallery_files).await,
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => warn!(skipped, "Event subscriber lagged"),
                    Err(RecvError::Closed) => subscribed = false,
                },
            }
        }
    };

    let failed = outcomes.iter().filter(|p| p.status == UploadStatus::Error).count();
    info!(uploaded = outcomes.len() - failed, failed, "Uploads settled");

    refresh_gallery(gallery.as_ref(), &mut gallery_files).await;
    handle.shutdown().await?;
    print_gallery(&gallery_files);

    if submission.rejected.is_empty() {
        Ok(())
    } else {
        anyhow::bail!("{} file(s) rejected", submission.rejected.len())
    }
}

async fn refresh_gallery(gallery: Option<&GalleryClient>, files: &mut Vec<MediaFile>) {
    let Some(gallery) = gallery else {
        return;
    };

    match gallery.list().await {
        Ok(listed) => *files = listed,
        Err(err) => warn!(error = %err.describe(), "Unable to load files"),
    }
}

fn print_gallery(files: &[MediaFile]) {
    if files.is_empty() {
        return;
    }

    println!("\nGallery ({} files)", files.len());
    for file in files {
        println!(
            "  {:<48} {:>10}  {}  {}",
            file.key,
            format_bytes(file.size),
            file.last_modified.format("%Y-%m-%d %H:%M"),
            file.url
        );
    }
}
