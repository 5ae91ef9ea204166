use async_trait::async_trait;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use super::{ChatId, MessageRef, Transport, Upload, UploadAttributes};
use crate::extractors::TransferSample;
use crate::utils::{generate_unique_filename, sanitize_filename};
use crate::Result;

const COPY_CHUNK: usize = 1024 * 1024;

/// Transport that delivers uploads into `<outbox>/<chat_id>/` and shows messages on the terminal
pub struct LocalTransport {
    outbox: PathBuf,
    next_message_id: AtomicI64,
    spinners: Mutex<HashMap<MessageRef, ProgressBar>>,
}

impl LocalTransport {
    pub fn new(outbox: impl Into<PathBuf>) -> Self {
        Self {
            outbox: outbox.into(),
            next_message_id: AtomicI64::new(1),
            spinners: Mutex::new(HashMap::new()),
        }
    }

    pub fn outbox(&self) -> &Path {
        &self.outbox
    }

    fn spinner_for(&self, message: &MessageRef) -> ProgressBar {
        let mut spinners = self.spinners.lock().unwrap_or_else(|p| p.into_inner());
        spinners
            .entry(*message)
            .or_insert_with(|| {
                let spinner = ProgressBar::new_spinner();
                if let Ok(spinner_style) =
                    ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")
                {
                    spinner.set_style(spinner_style);
                }
                spinner.enable_steady_tick(Duration::from_millis(120));
                spinner
            })
            .clone()
    }

    /// Destination for an upload, never overwriting an earlier delivery
    fn destination(&self, chat_id: ChatId, upload: &Upload) -> PathBuf {
        let dir = self.outbox.join(chat_id.to_string());
        let extension = upload
            .file_path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("bin");
        let base = sanitize_filename(&upload.title);
        let base = if base.is_empty() { "media".to_string() } else { base };

        let preferred = dir.join(format!("{}.{}", base, extension));
        if preferred.exists() {
            dir.join(generate_unique_filename(&base, extension))
        } else {
            preferred
        }
    }
}

/// Collapse a chat-formatted message into one terminal line
fn plain_text(text: &str) -> String {
    text.lines()
        .map(|line| {
            line.trim_matches(|c: char| "│├╭╮╰╯─ ".contains(c))
                .replace("**", "")
        })
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" | ")
}

async fn copy_with_progress(
    source: &Path,
    target: &Path,
    progress: Option<&tokio::sync::mpsc::UnboundedSender<TransferSample>>,
) -> Result<u64> {
    let total = tokio::fs::metadata(source).await?.len();
    let mut reader = tokio::fs::File::open(source).await?;
    let mut writer = tokio::fs::File::create(target).await?;
    let mut buf = vec![0u8; COPY_CHUNK];
    let mut done = 0u64;

    loop {
        let read = reader.read(&mut buf).await?;
        if read == 0 {
            break;
        }
        writer.write_all(&buf[..read]).await?;
        done += read as u64;
        if let Some(tx) = progress {
            let _ = tx.send(TransferSample {
                bytes_done: done,
                bytes_total: Some(total),
            });
        }
    }
    writer.flush().await?;

    Ok(done)
}

#[async_trait]
impl Transport for LocalTransport {
    async fn reply(&self, chat_id: ChatId, text: &str) -> Result<MessageRef> {
        let message = MessageRef {
            chat_id,
            message_id: self.next_message_id.fetch_add(1, Ordering::Relaxed),
        };
        println!("{} {}", style(format!("[chat {}]", chat_id)).cyan(), plain_text(text));
        Ok(message)
    }

    async fn edit_message(&self, message: &MessageRef, text: &str) -> Result<()> {
        self.spinner_for(message).set_message(plain_text(text));
        Ok(())
    }

    async fn delete_message(&self, message: &MessageRef) -> Result<()> {
        let spinner = self
            .spinners
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .remove(message);
        if let Some(spinner) = spinner {
            spinner.finish_and_clear();
        }
        Ok(())
    }

    async fn send_file(&self, chat_id: ChatId, upload: &Upload) -> Result<()> {
        let target = self.destination(chat_id, upload);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let bytes = copy_with_progress(&upload.file_path, &target, upload.progress.as_ref()).await?;

        if let Some(thumb) = upload.thumbnail_path.as_deref().filter(|p| p.exists()) {
            let thumb_target = target.with_extension("jpg");
            tokio::fs::copy(thumb, &thumb_target).await?;
        }

        let details = match &upload.attributes {
            Some(UploadAttributes::Video { duration_seconds, width, height, .. }) => format!(
                " ({}x{}, {})",
                width,
                height,
                crate::utils::format_duration(*duration_seconds as f64)
            ),
            Some(UploadAttributes::Audio { performer, .. }) => format!(" ({})", performer),
            None => String::new(),
        };

        println!(
            "{} {}{} -> {} [{}]",
            style(format!("[chat {}]", chat_id)).cyan(),
            style(plain_text(&upload.caption)).bold(),
            details,
            target.display(),
            crate::utils::format_file_size(bytes)
        );
        tracing::info!("Delivered {} to {}", upload.file_path.display(), target.display());

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[test]
    fn test_plain_text() {
        let text = "╭──╮\n│    **Uploading**    \n│ ETA: 0:05\n╰──╯\n\n**Powered By X**";
        assert_eq!(plain_text(text), "Uploading | ETA: 0:05 | Powered By X");
    }

    #[tokio::test]
    async fn test_send_file_copies_into_outbox() {
        let work = tempfile::tempdir().unwrap();
        let outbox = tempfile::tempdir().unwrap();
        let source = work.path().join("audio_abc.mp3");
        std::fs::write(&source, vec![7u8; 3000]).unwrap();

        let transport = LocalTransport::new(outbox.path());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let upload = Upload {
            file_path: source.clone(),
            title: "My Song?".into(),
            caption: "**My Song?**".into(),
            attributes: None,
            thumbnail_path: None,
            progress: Some(tx),
        };

        transport.send_file(42, &upload).await.unwrap();
        drop(upload);

        let delivered = outbox.path().join("42").join("My Song_.mp3");
        assert_eq!(std::fs::read(&delivered).unwrap().len(), 3000);
        // source stays in place; the job's janitor owns it
        assert!(source.exists());

        let mut last = None;
        while let Some(sample) = rx.recv().await {
            last = Some(sample);
        }
        assert_eq!(last, Some(TransferSample { bytes_done: 3000, bytes_total: Some(3000) }));

        transport.send_file(42, &Upload {
            file_path: source,
            title: "My Song?".into(),
            caption: String::new(),
            attributes: None,
            thumbnail_path: None,
            progress: None,
        }).await.unwrap();
        assert_eq!(std::fs::read_dir(outbox.path().join("42")).unwrap().count(), 2);
    }

    #[tokio::test]
    async fn test_reply_ids_increase() {
        let transport = LocalTransport::new("/nonexistent");
        let a = transport.reply(1, "one").await.unwrap();
        let b = transport.reply(1, "two").await.unwrap();
        assert!(b.message_id > a.message_id);
        transport.edit_message(&a, "edited").await.unwrap();
        transport.delete_message(&a).await.unwrap();
    }
}
