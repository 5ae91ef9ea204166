use lofty::config::WriteOptions;
use lofty::file::{AudioFile, TaggedFileExt};
use lofty::picture::{Picture, PictureType};
use lofty::prelude::Accessor;
use lofty::read_from_path;
use lofty::tag::Tag;
use std::path::Path;

use crate::Result;

/// Writes descriptive tags and cover art into downloaded audio.
///
/// Tagging is best effort: [`MetadataEnricher::tag`] logs failures and returns.
#[derive(Debug, Clone)]
pub struct MetadataEnricher {
    comment: String,
}

impl MetadataEnricher {
    pub fn new(comment: impl Into<String>) -> Self {
        Self {
            comment: comment.into(),
        }
    }

    /// Blocking; run it on the worker pool
    pub fn tag(&self, audio_path: &Path, title: &str, author: &str, thumbnail: Option<&[u8]>) {
        if let Err(e) = self.write_tags(audio_path, title, author, thumbnail) {
            tracing::warn!("Tagging {} failed: {}", audio_path.display(), e);
        }
    }

    fn write_tags(&self, audio_path: &Path, title: &str, author: &str, thumbnail: Option<&[u8]>) -> Result<()> {
        let mut tagged_file = read_from_path(audio_path)?;
        let tag_type = tagged_file.primary_tag_type();
        if tagged_file.tag(tag_type).is_none() {
            tagged_file.insert_tag(Tag::new(tag_type));
        }

        let tag = tagged_file
            .tag_mut(tag_type)
            .ok_or_else(|| anyhow::anyhow!("No writable tag available for {:?}", tag_type))?;

        tag.set_title(title.to_string());
        tag.set_artist(author.to_string());
        if !self.comment.is_empty() {
            tag.set_comment(self.comment.clone());
        }

        if let Some(bytes) = thumbnail {
            match Picture::from_reader(&mut &bytes[..]) {
                Ok(mut picture) => {
                    picture.set_pic_type(PictureType::CoverFront);
                    tag.push_picture(picture);
                }
                // keep the text tags even when the image is unusable
                Err(e) => tracing::warn!("Skipping cover art: {}", e),
            }
        }

        tagged_file.save_to_path(audio_path, WriteOptions::default())?;
        Ok(())
    }
}
