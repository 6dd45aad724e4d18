use crate::error::{MetadataWriteError, StoreError};
use crate::model::{AUDIO_TABLE, Audio, EPISODES_TABLE, Episode};
use crate::store::Filter;

use super::{MetadataWriter, to_row};

impl MetadataWriter {
    /// Whether an episode with this dedup key is already stored
    pub async fn episode_exists(
        &self,
        show_id: &str,
        original_audio_url: &str,
    ) -> Result<bool, StoreError> {
        let rows = self
            .store
            .query(
                EPISODES_TABLE,
                &Filter::new()
                    .eq("showId", show_id)
                    .eq("originalAudioUrl", original_audio_url),
            )
            .await?;
        Ok(!rows.is_empty())
    }

    /// Write the audio row
    ///
    /// Keyed by id, so the row left behind by an earlier failed episode
    /// write is replaced rather than duplicated.
    pub async fn insert_audio(&self, audio: &Audio) -> Result<(), MetadataWriteError> {
        let wrap = |source| MetadataWriteError::Audio {
            audio_id: audio.id.clone(),
            source,
        };

        let row = to_row(AUDIO_TABLE, audio).map_err(wrap)?;
        self.store
            .upsert(AUDIO_TABLE, "id", row)
            .await
            .map_err(wrap)
    }

    pub async fn insert_episode(&self, episode: &Episode) -> Result<(), MetadataWriteError> {
        let wrap = |source| MetadataWriteError::Episode {
            episode_id: episode.id.clone(),
            source,
        };

        let row = to_row(EPISODES_TABLE, episode).map_err(wrap)?;
        self.store
            .insert(EPISODES_TABLE, vec![row])
            .await
            .map_err(wrap)
    }
}
