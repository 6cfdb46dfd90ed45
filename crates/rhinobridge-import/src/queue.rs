//! Import queue shared between the socket listener and the idle loop
//!
//! The listener thread only ever appends. The idle loop checks
//! [`ImportQueue::can_import`] and calls [`ImportQueue::import_next`], which
//! takes one asset off the head and imports it to completion before
//! returning, so the document is only ever touched by one import at a time.

use chrono::{DateTime, Utc};
use rhinobridge_core::{AssetDescriptor, ImportOptions};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};
use uuid::Uuid;

use crate::document::{DocumentId, Host};
use crate::machine::{ImportError, ImportMachine, ImportReport};

/// A received asset waiting for import
#[derive(Debug, Clone)]
pub struct ImportJob {
    pub id: Uuid,
    pub received_at: DateTime<Utc>,
    pub asset: AssetDescriptor,
}

impl ImportJob {
    pub fn new(asset: AssetDescriptor) -> Self {
        Self {
            id: Uuid::new_v4(),
            received_at: Utc::now(),
            asset,
        }
    }
}

/// Thread-safe FIFO of pending imports
#[derive(Debug, Default)]
pub struct ImportQueue {
    pending: Mutex<VecDeque<ImportJob>>,
    importing: AtomicBool,
    current_document: Mutex<Option<DocumentId>>,
}

/// Clears the importing flag when the import scope ends
struct ImportingFlag<'a>(&'a AtomicBool);

impl Drop for ImportingFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl ImportQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn pending(&self) -> MutexGuard<'_, VecDeque<ImportJob>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append one asset to the tail
    pub fn enqueue(&self, asset: AssetDescriptor) -> Uuid {
        let job = ImportJob::new(asset);
        let id = job.id;
        debug!(import = %id, asset = %job.asset.name, "Queued asset");
        self.pending().push_back(job);
        id
    }

    /// Append a whole batch in order, returns the queue length afterwards
    pub fn enqueue_batch(&self, assets: Vec<AssetDescriptor>) -> usize {
        let count = assets.len();
        let jobs: Vec<ImportJob> = assets.into_iter().map(ImportJob::new).collect();

        let mut pending = self.pending();
        pending.extend(jobs);
        let len = pending.len();
        drop(pending);

        info!(received = count, pending = len, "Imports received");
        len
    }

    pub fn len(&self) -> usize {
        self.pending().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending().is_empty()
    }

    pub fn is_importing(&self) -> bool {
        self.importing.load(Ordering::Acquire)
    }

    /// True if something is queued and no import is running
    pub fn can_import(&self) -> bool {
        !self.is_importing() && !self.is_empty()
    }

    /// Document imports currently go to
    pub fn current_document(&self) -> Option<DocumentId> {
        *self.current_document.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Pick up the host's active document. Called while idle so that a
    /// document switch between imports is honored.
    pub fn update_document<H: Host>(&self, host: &H) {
        let active = host.active_document();
        let mut current = self.current_document.lock().unwrap_or_else(PoisonError::into_inner);
        if *current != active {
            debug!(from = ?*current, to = ?active, "Active document changed");
            *current = active;
        }
    }

    /// Import the asset at the head of the queue.
    ///
    /// Returns `Ok(None)` if nothing was queued. Classified failures come back
    /// inside the report; `Err` means the drain should stop. If no document is
    /// available the asset stays queued.
    pub fn import_next<H: Host>(
        &self,
        host: &mut H,
        options: &ImportOptions,
    ) -> Result<Option<ImportReport>, ImportError> {
        if self
            .importing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(ImportError::ImportInProgress);
        }
        let _importing = ImportingFlag(&self.importing);

        let document_id = self.resolve_document(host)?;
        let document = host
            .document_mut(document_id)
            .ok_or(ImportError::NoActiveDocument)?;

        let Some(job) = self.pending().pop_front() else {
            return Ok(None);
        };

        debug!(import = %job.id, asset = %job.asset.name, document = %document_id, "Starting import");
        ImportMachine::new(job).run(document, options).map(Some)
    }

    fn resolve_document<H: Host>(&self, host: &mut H) -> Result<DocumentId, ImportError> {
        if let Some(id) = self.current_document() {
            if host.document_mut(id).is_some() {
                return Ok(id);
            }
        }

        self.update_document(host);
        match self.current_document() {
            Some(id) if host.document_mut(id).is_some() => Ok(id),
            _ => Err(ImportError::NoActiveDocument),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machine::{FailureKind, ImportState};
    use crate::scene::SceneHost;
    use rhinobridge_core::{Rgb, UnitSystem};
    use std::sync::Arc;

    fn host() -> SceneHost {
        let mut host = SceneHost::new();
        host.open_document(UnitSystem::Meters);
        host
    }

    #[test]
    fn test_drains_in_fifo_order() {
        let queue = ImportQueue::new();
        let mut host = host();
        let names = ["a", "b", "c", "d"];
        for name in names {
            queue.enqueue(AssetDescriptor::new(name, "#000000"));
        }

        let mut imported = Vec::new();
        while queue.can_import() {
            let report = queue
                .import_next(&mut host, &ImportOptions::default())
                .unwrap()
                .unwrap();
            imported.push(report.asset_name);
        }

        assert_eq!(imported, names);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_one_asset_per_call() {
        let queue = ImportQueue::new();
        let mut host = host();
        queue.enqueue_batch(vec![
            AssetDescriptor::new("first", "#000000"),
            AssetDescriptor::new("second", "#000000"),
        ]);

        queue.import_next(&mut host, &ImportOptions::default()).unwrap();
        assert_eq!(queue.len(), 1);
        assert!(!queue.is_importing());
    }

    #[test]
    fn test_can_import_truth_table() {
        let queue = ImportQueue::new();
        assert!(!queue.can_import());

        queue.enqueue(AssetDescriptor::new("a", "#000000"));
        assert!(queue.can_import());

        queue.importing.store(true, Ordering::Release);
        assert!(!queue.can_import());
        let mut host = host();
        assert_eq!(
            queue.import_next(&mut host, &ImportOptions::default()).unwrap_err(),
            ImportError::ImportInProgress
        );
        assert_eq!(queue.len(), 1);

        queue.importing.store(false, Ordering::Release);
        assert!(queue.can_import());
    }

    #[test]
    fn test_empty_queue_imports_nothing() {
        let queue = ImportQueue::new();
        let mut host = host();
        assert!(queue.import_next(&mut host, &ImportOptions::default()).unwrap().is_none());
    }

    #[test]
    fn test_rock_end_to_end() {
        let queue = ImportQueue::new();
        let mut host = host();
        queue.enqueue(
            AssetDescriptor::new("rock01", "#8899AA")
                .with_texture("albedo", "a.png")
                .with_texture("normal", "n.png")
                .with_texture("cavity", "c.png"),
        );

        let report = queue
            .import_next(&mut host, &ImportOptions::default())
            .unwrap()
            .unwrap();

        assert_eq!(report.state, ImportState::Completed);
        assert!(queue.is_empty());

        let doc = &host.documents()[0];
        assert_eq!(doc.materials.len(), 1);
        let material = &doc.materials[0];
        assert_eq!(material.name, "rock01");
        assert_eq!(material.diffuse, Rgb::new(0x88, 0x99, 0xAA));
        assert_eq!(material.base_color_texture.as_deref(), Some("a.png"));
        assert_eq!(material.bump_texture.as_deref(), Some("n.png"));
        assert_eq!(doc.redraw_requests(), 1);
    }

    #[test]
    fn test_failed_asset_does_not_block_queue() {
        let queue = ImportQueue::new();
        let mut host = host();
        queue.enqueue(AssetDescriptor::new("bad", "#000000").with_geometry("blend", "bad.blend"));
        queue.enqueue(AssetDescriptor::new("good", "#000000").with_geometry("obj", "good.obj"));

        let first = queue
            .import_next(&mut host, &ImportOptions::default())
            .unwrap()
            .unwrap();
        assert_eq!(
            first.failure().map(|f| f.kind()),
            Some(FailureKind::GeometryFormatNotImplemented)
        );
        let doc = &host.documents()[0];
        assert!(doc.materials.is_empty());
        assert!(doc.objects.is_empty());
        assert_eq!(queue.len(), 1);

        let second = queue
            .import_next(&mut host, &ImportOptions::default())
            .unwrap()
            .unwrap();
        assert!(second.is_completed());
        assert_eq!(host.documents()[0].objects.len(), 1);
    }

    #[test]
    fn test_no_document_keeps_asset_queued() {
        let queue = ImportQueue::new();
        let mut host = SceneHost::new();
        queue.enqueue(AssetDescriptor::new("a", "#000000"));

        assert_eq!(
            queue.import_next(&mut host, &ImportOptions::default()).unwrap_err(),
            ImportError::NoActiveDocument
        );
        assert_eq!(queue.len(), 1);
        assert!(!queue.is_importing());

        host.open_document(UnitSystem::Meters);
        assert!(queue.import_next(&mut host, &ImportOptions::default()).unwrap().is_some());
    }

    #[test]
    fn test_update_document_follows_active() {
        let queue = ImportQueue::new();
        let mut host = SceneHost::new();
        let first = host.open_document(UnitSystem::Meters);
        queue.update_document(&host);
        assert_eq!(queue.current_document(), Some(first));

        let second = host.open_document(UnitSystem::Centimeters);
        queue.update_document(&host);
        assert_eq!(queue.current_document(), Some(second));

        queue.enqueue(AssetDescriptor::new("a", "#000000"));
        queue.import_next(&mut host, &ImportOptions::default()).unwrap();
        assert_eq!(host.document(second).unwrap().materials.len(), 1);
        assert!(host.document(first).unwrap().materials.is_empty());
    }

    #[test]
    fn test_closed_cached_document_falls_back_to_active() {
        let queue = ImportQueue::new();
        let mut host = SceneHost::new();
        let first = host.open_document(UnitSystem::Meters);
        let second = host.open_document(UnitSystem::Meters);
        queue.update_document(&host);

        host.close_document(second);
        queue.enqueue(AssetDescriptor::new("a", "#000000"));
        queue.import_next(&mut host, &ImportOptions::default()).unwrap();
        assert_eq!(queue.current_document(), Some(first));
        assert_eq!(host.document(first).unwrap().materials.len(), 1);
    }

    #[test]
    fn test_concurrent_enqueue_keeps_every_asset() {
        let queue = Arc::new(ImportQueue::new());
        let producers: Vec<_> = (0..4)
            .map(|p| {
                let queue = queue.clone();
                std::thread::spawn(move || {
                    for i in 0..50 {
                        queue.enqueue(AssetDescriptor::new(format!("{}-{}", p, i), "#000000"));
                    }
                })
            })
            .collect();
        for producer in producers {
            producer.join().unwrap();
        }
        assert_eq!(queue.len(), 200);

        // Per-producer order survives interleaving
        let mut host = host();
        let mut last_seen = [-1i32; 4];
        while let Some(report) = queue.import_next(&mut host, &ImportOptions::default()).unwrap() {
            let (p, i) = report.asset_name.split_once('-').unwrap();
            let (p, i): (usize, i32) = (p.parse().unwrap(), i.parse().unwrap());
            assert!(i > last_seen[p]);
            last_seen[p] = i;
        }
        assert_eq!(last_seen, [49; 4]);
    }
}
