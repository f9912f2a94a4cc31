use std::{path::PathBuf, sync::Arc};

use crate::{
    config::PlatformProfile,
    error::CuratorError,
    handler::{AssetContext, AssetHeader, AssetTypeHandler},
    hash::fold,
    hashing::{generate_transitive_hull, hash_asset},
    index::{AssetRecord, CommitOutcome, StateUpdate},
    properties::{AssetId, AssetTypeFlag, TransformState},
};

use super::CuratorCore;

/// A discarded commit means the asset changed while its state was computed. The computation is
/// repeated this many times before the caller gets the current (usually `Unknown`) state.
const MAX_STATE_ATTEMPTS: usize = 3;

/// What a state computation needs from a record, copied out under the lock.
#[derive(Debug, Clone)]
pub(crate) struct RecordSnapshot {
    pub id: AssetId,
    pub generation: u64,
    pub absolute_path: PathBuf,
    pub data_dir: PathBuf,
    pub relative_path: String,
    pub header: AssetHeader,
    pub handler: Arc<dyn AssetTypeHandler>,
    pub asset_hash: u64,
    pub thumb_hash: u64,
}

impl From<&AssetRecord> for RecordSnapshot {
    fn from(record: &AssetRecord) -> Self {
        RecordSnapshot {
            id: record.id,
            generation: record.generation,
            absolute_path: record.absolute_path.clone(),
            data_dir: record.data_dir.clone(),
            relative_path: record.relative_path.clone(),
            header: record.header.clone(),
            handler: record.handler.clone(),
            asset_hash: record.asset_hash,
            thumb_hash: record.thumb_hash,
        }
    }
}

impl RecordSnapshot {
    pub fn context<'a>(&'a self, profile: &'a PlatformProfile) -> AssetContext<'a> {
        AssetContext {
            id: self.id,
            source: &self.absolute_path,
            data_dir: &self.data_dir,
            relative_path: &self.relative_path,
            profile,
        }
    }
}

impl CuratorCore {
    pub(crate) fn snapshot(&self, id: AssetId) -> Result<RecordSnapshot, CuratorError> {
        self.index
            .read()
            .main_record_of(id)
            .map(RecordSnapshot::from)
            .ok_or_else(|| CuratorError::NotFound(format!("asset {id}")))
    }

    /// Settings hash of the asset combined with the active profile.
    fn effective_settings_hash(&self, header: &AssetHeader, profile: &PlatformProfile) -> u64 {
        fold(header.settings_hash, profile.profile_hash())
    }

    /// Re-derives the transform state of an asset (or of the asset owning a sub-asset).
    ///
    /// A cached state is returned as is unless it is `Unknown`, the asset is stale, or `force`
    /// is set. Otherwise the asset's source is re-examined, its transitive hull is hashed with
    /// the lock released and the result is compared against the outputs the handler recorded.
    pub fn update_transform_state(
        &self,
        id: AssetId,
        force: bool,
    ) -> Result<TransformState, CuratorError> {
        let mut current = TransformState::Unknown;
        for attempt in 0..MAX_STATE_ATTEMPTS {
            match self.try_update_transform_state(id, force)? {
                CommitOutcome::Applied(state) => {
                    self.flush_events();
                    return Ok(state);
                }
                CommitOutcome::Discarded(state) => {
                    tracing::debug!(
                        "[StateMachine] State of {} changed during computation (attempt {})",
                        id,
                        attempt + 1
                    );
                    current = state;
                }
            }
        }
        self.flush_events();
        Ok(current)
    }

    fn try_update_transform_state(
        &self,
        id: AssetId,
        force: bool,
    ) -> Result<CommitOutcome, CuratorError> {
        let path = {
            let index = self.index.read();
            let record = index
                .main_record_of(id)
                .ok_or_else(|| CuratorError::NotFound(format!("asset {id}")))?;
            if !force && record.state != TransformState::Unknown && !index.is_stale(record.id) {
                return Ok(CommitOutcome::Applied(record.state));
            }
            record.absolute_path.clone()
        };

        self.handle_single_file(&path)?;

        let (snapshot, hull) = {
            let index = self.index.read();
            let record = index
                .main_record_of(id)
                .ok_or_else(|| CuratorError::NotFound(format!("asset {id} vanished")))?;
            let hull = generate_transitive_hull(&index, record.id)
                .ok_or_else(|| CuratorError::NotFound(format!("asset {id} vanished")))?;
            (RecordSnapshot::from(record), hull)
        };

        let profile = self.active_profile();
        let settings_hash = self.effective_settings_hash(&snapshot.header, &profile);
        let outcome = hash_asset(&self.index, settings_hash, &hull, force);
        let state = match outcome.failure {
            Some(state) => state,
            None => self.compare_with_outputs(
                &snapshot,
                &profile,
                outcome.asset_hash,
                outcome.thumb_hash,
            ),
        };
        tracing::trace!(
            "[StateMachine] {} -> {} (asset {:x}, thumb {:x})",
            snapshot.relative_path,
            state,
            outcome.asset_hash,
            outcome.thumb_hash
        );

        Ok(self.index.write().commit_transform_state(
            snapshot.id,
            snapshot.generation,
            StateUpdate {
                state,
                asset_hash: outcome.asset_hash,
                thumb_hash: outcome.thumb_hash,
                missing_dependencies: outcome.missing_dependencies,
                missing_references: outcome.missing_references,
            },
        ))
    }

    fn compare_with_outputs(
        &self,
        snapshot: &RecordSnapshot,
        profile: &PlatformProfile,
        asset_hash: u64,
        thumb_hash: u64,
    ) -> TransformState {
        let handler = &snapshot.handler;
        let flags = handler.flags();
        let ctx = snapshot.context(profile);
        if snapshot.header.needs_import {
            return TransformState::NeedsImport;
        }
        if !flags.contains(AssetTypeFlag::DisableTransform)
            && handler.recorded_output_hash(&ctx) != Some(asset_hash)
        {
            return TransformState::NeedsTransform;
        }
        if flags.contains(AssetTypeFlag::SupportsThumbnail)
            && handler.recorded_thumbnail_hash(&ctx) != Some(thumb_hash)
        {
            return TransformState::NeedsThumbnail;
        }
        TransformState::UpToDate
    }
}
