use std::collections::{BTreeSet, HashSet};

use crate::{
    error::CuratorError,
    handler::TransformRequest,
    index::Resolution,
    properties::{AssetId, AssetTypeFlag, LogEntry, TransformFlag, TransformFlags, TransformState},
};

use super::CuratorCore;

/// Result of [`CuratorCore::transform_all_assets`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransformSummary {
    pub up_to_date: usize,
    pub failed: usize,
    /// Assets left in any other state, e.g. missing dependencies or disabled transforms.
    pub skipped: usize,
}

impl CuratorCore {
    /// Brings an asset up to date: processes its asset dependencies first, then runs the
    /// handler's transform (and thumbnail generation where the handler asks for it) if the
    /// asset's state requires it. Returns the state after processing.
    pub fn process_asset(
        &self,
        id: AssetId,
        flags: TransformFlags,
    ) -> Result<TransformState, CuratorError> {
        let mut visited = HashSet::new();
        let state = self.process_asset_recursive(id, flags, &mut visited, true);
        self.flush_events();
        state
    }

    /// Explicit, user triggered transform. Also retries an asset stuck in `TransformError`.
    pub fn transform_asset(
        &self,
        id: AssetId,
        flags: TransformFlags,
    ) -> Result<TransformState, CuratorError> {
        self.process_asset(id, flags | TransformFlag::TriggeredManually)
    }

    /// Processes the asset dependencies of `id`, then its runtime references, then `id` itself.
    /// A failed dependency aborts the asset with an error. A failed reference only cancels
    /// types that render a thumbnail on every transform. `ForceTransform` applies to the root
    /// only, and a sticky `TransformError` is retried only for a manually triggered root.
    fn process_asset_recursive(
        &self,
        id: AssetId,
        flags: TransformFlags,
        visited: &mut HashSet<AssetId>,
        root: bool,
    ) -> Result<TransformState, CuratorError> {
        let snapshot = self.snapshot(id)?;
        let id = snapshot.id;
        if !visited.insert(id) {
            return Ok(self.transform_state(id).unwrap_or_default());
        }
        let force = flags.contains(TransformFlag::ForceTransform);
        let retry_error = root && flags.contains(TransformFlag::TriggeredManually);
        let nested_flags = flags - TransformFlag::ForceTransform;

        let (dependencies, references) = {
            let index = self.index.read();
            let assets_in = |declared: &BTreeSet<String>| -> Vec<AssetId> {
                declared
                    .iter()
                    .filter_map(|d| match index.resolve_declared(d, &snapshot.data_dir) {
                        Resolution::Asset(asset, _) => Some(asset),
                        _ => None,
                    })
                    .collect()
            };
            (
                assets_in(&snapshot.header.dependencies),
                assets_in(&snapshot.header.references),
            )
        };
        for dependency in dependencies {
            let failure = match self.process_asset_recursive(dependency, nested_flags, visited, false) {
                Ok(TransformState::TransformError) => {
                    format!("dependency {dependency} failed to transform")
                }
                Ok(_) => continue,
                Err(e) => format!("dependency {dependency} failed: {e}"),
            };
            return Err(self.abort_processing(id, &snapshot.relative_path, failure));
        }
        let mut reference_failure = None;
        for reference in references {
            match self.process_asset_recursive(reference, nested_flags, visited, false) {
                Ok(TransformState::TransformError) => {
                    reference_failure = Some(format!("reference {reference} failed to transform"));
                }
                Ok(_) => continue,
                Err(e) => reference_failure = Some(format!("reference {reference} failed: {e}")),
            }
            break;
        }

        let current = self.transform_state(id).unwrap_or_default();
        let state = self.update_transform_state(
            id,
            force || (retry_error && current == TransformState::TransformError),
        )?;
        let type_flags = snapshot.handler.flags();
        match state {
            TransformState::UpToDate if !force => return Ok(state),
            TransformState::TransformError if !retry_error => return Ok(state),
            TransformState::Unknown | TransformState::MissingDependency => return Ok(state),
            TransformState::NeedsImport => {
                self.index.write().set_log(
                    id,
                    vec![LogEntry::warning(format!(
                        "{} has to be imported before it can be transformed",
                        snapshot.relative_path
                    ))],
                );
                return Ok(state);
            }
            _ => {}
        }
        if type_flags.contains(AssetTypeFlag::DisableTransform) && state != TransformState::NeedsThumbnail {
            return Ok(state);
        }
        if type_flags.contains(AssetTypeFlag::OnlyTransformManually)
            && !flags.contains(TransformFlag::TriggeredManually)
        {
            tracing::debug!("[Processor] {} only transforms on request", snapshot.relative_path);
            return Ok(state);
        }
        if let Some(failure) = reference_failure {
            if type_flags.contains(AssetTypeFlag::AutoThumbnailOnTransform) {
                return Err(self.abort_processing(id, &snapshot.relative_path, failure));
            }
        }

        let snapshot = self.snapshot(id)?;
        let profile = self.active_profile();
        let request = TransformRequest {
            context: snapshot.context(&profile),
            header: &snapshot.header,
            asset_hash: snapshot.asset_hash,
            thumb_hash: snapshot.thumb_hash,
            flags,
        };

        let mut log = Vec::new();
        let thumbnail_only = state == TransformState::NeedsThumbnail && !force;
        if !thumbnail_only {
            tracing::info!("[Processor] Transforming {}", snapshot.relative_path);
            match snapshot.handler.transform(&request) {
                Ok(output) => log.extend(output.log),
                Err(e) => {
                    tracing::warn!("[Processor] Transform of {} failed: {}", snapshot.relative_path, e);
                    log.push(LogEntry::error(e.to_string()));
                    let mut index = self.index.write();
                    index.set_log(id, log);
                    index.set_asset_transform_state(id, TransformState::TransformError);
                    drop(index);
                    self.flush_events();
                    return Ok(TransformState::TransformError);
                }
            }
        }
        let wants_thumbnail = type_flags.contains(AssetTypeFlag::SupportsThumbnail)
            && (thumbnail_only || type_flags.contains(AssetTypeFlag::AutoThumbnailOnTransform));
        if wants_thumbnail && state != TransformState::MissingReference {
            match snapshot.handler.generate_thumbnail(&request) {
                Ok(thumbnail) => log.extend(thumbnail.log),
                Err(e) => {
                    tracing::warn!("[Processor] Thumbnail of {} failed: {}", snapshot.relative_path, e);
                    log.push(LogEntry::warning(e.to_string()));
                }
            }
        }
        self.index.write().set_log(id, log);
        self.update_transform_state(id, true)
    }

    /// Leaves `id` untransformed because of a failed input: records the reason in its log and
    /// settles its state so the update queue does not pick it up again until an input changes.
    fn abort_processing(&self, id: AssetId, relative_path: &str, reason: String) -> CuratorError {
        tracing::warn!("[Processor] Not transforming {}: {}", relative_path, reason);
        self.index.write().set_log(id, vec![LogEntry::error(reason.clone())]);
        if let Err(e) = self.update_transform_state(id, false) {
            tracing::debug!("[Processor] State of {} unavailable: {}", relative_path, e);
        }
        CuratorError::Handler(format!("{relative_path}: {reason}"))
    }

    /// Processes every known asset. Asset tables are rewritten afterwards.
    pub fn transform_all_assets(
        &self,
        flags: TransformFlags,
    ) -> Result<TransformSummary, CuratorError> {
        let mut ids: Vec<(String, AssetId)> = self
            .index
            .read()
            .records()
            .map(|record| (record.relative_path.clone(), record.id))
            .collect();
        ids.sort();

        let mut summary = TransformSummary::default();
        for (relative_path, id) in ids {
            match self.process_asset(id, flags | TransformFlag::TriggeredManually) {
                Ok(TransformState::UpToDate) => summary.up_to_date += 1,
                Ok(TransformState::TransformError) => summary.failed += 1,
                Ok(_) => summary.skipped += 1,
                Err(e) => {
                    tracing::warn!("[Processor] Skipping {}: {}", relative_path, e);
                    summary.skipped += 1;
                }
            }
        }
        self.write_asset_tables(false)?;
        tracing::info!(
            "[Processor] Transform all: {} up to date, {} failed, {} skipped",
            summary.up_to_date,
            summary.failed,
            summary.skipped
        );
        Ok(summary)
    }

    /// Regenerates the thumbnail of an asset whose handler supports thumbnails.
    pub fn create_thumbnail(&self, id: AssetId) -> Result<TransformState, CuratorError> {
        let state = self.update_transform_state(id, false)?;
        let snapshot = self.snapshot(id)?;
        if !snapshot
            .handler
            .flags()
            .contains(AssetTypeFlag::SupportsThumbnail)
        {
            return Err(CuratorError::Handler(format!(
                "{} assets have no thumbnails",
                snapshot.handler.type_name()
            )));
        }
        if matches!(
            state,
            TransformState::Unknown
                | TransformState::MissingDependency
                | TransformState::MissingReference
        ) {
            return Ok(state);
        }
        let profile = self.active_profile();
        let request = TransformRequest {
            context: snapshot.context(&profile),
            header: &snapshot.header,
            asset_hash: snapshot.asset_hash,
            thumb_hash: snapshot.thumb_hash,
            flags: TransformFlag::TriggeredManually.into(),
        };
        let thumbnail = snapshot.handler.generate_thumbnail(&request)?;
        tracing::debug!("[Processor] Thumbnail written to {:?}", thumbnail.path);
        self.update_transform_state(id, true)
    }
}
