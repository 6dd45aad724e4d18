// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use tracing::debug;

use crate::error::{MetadataWriteError, StoreError};
use crate::model::{SHOWS_TABLE, Show};
use crate::store::Filter;

use super::{MetadataWriter, from_row, to_row};

impl MetadataWriter {
    /// Look up the show stored under `sanitized_title`
    ///
    /// More than one match means the store lost its uniqueness guarantee;
    /// the first row wins.
    pub async fn find_show_by_slug(
        &self,
        sanitized_title: &str,
    ) -> Result<Option<Show>, StoreError> {
        let rows = self
            .store
            .query(
                SHOWS_TABLE,
                &Filter::new().eq("sanitizedTitle", sanitized_title),
            )
            .await?;

        if rows.len() > 1 {
            debug!(slug = sanitized_title, matches = rows.len(), "duplicate show rows");
        }

        rows.into_iter().next().map(from_row).transpose()
    }

    /// Insert the show, or refresh the row with the same id
    pub async fn upsert_show(&self, show: &Show) -> Result<(), MetadataWriteError> {
        let wrap = |source| MetadataWriteError::Show {
            show_id: show.id.clone(),
            source,
        };

        let row = to_row(SHOWS_TABLE, show).map_err(wrap)?;
        self.store
            .upsert(SHOWS_TABLE, "id", row)
            .await
            .map_err(wrap)
    }
}
