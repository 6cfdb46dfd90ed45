//! Bridge context
//!
//! Owns the settings, the import queue and the socket listener. The host
//! constructs one, starts the server, and calls [`BridgeContext::on_idle`]
//! from its idle loop.

use rhinobridge_core::{Settings, SettingsError, SettingsStore};
use rhinobridge_import::{Host, ImportError, ImportQueue, ImportReport};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::events::BridgeEvent;
use crate::listener::{BridgeListener, ListenerError, ListenerOptions};

pub struct BridgeContext<S: SettingsStore> {
    settings: Settings<S>,
    queue: Arc<ImportQueue>,
    listener: BridgeListener,
    events: broadcast::Sender<BridgeEvent>,
}

impl<S: SettingsStore> BridgeContext<S> {
    pub fn new(settings: Settings<S>, options: ListenerOptions) -> Self {
        let (events, _) = broadcast::channel(100);
        let queue = Arc::new(ImportQueue::new());
        let listener = BridgeListener::new(settings.port(), options, queue.clone(), events.clone());
        Self {
            settings,
            queue,
            listener,
            events,
        }
    }

    /// Start the listener on the persisted port
    pub fn start_server(&mut self) -> Result<u16, ListenerError> {
        self.listener.set_port(self.settings.port());
        self.listener.start()
    }

    pub fn end_server(&mut self) {
        self.listener.stop();
    }

    pub fn is_server_running(&self) -> bool {
        self.listener.is_running()
    }

    pub fn bound_port(&self) -> Option<u16> {
        self.listener.bound_port()
    }

    /// Persist a new port. A running listener picks it up on restart.
    pub fn set_port(&mut self, port: u16) -> Result<(), SettingsError> {
        self.settings.set_port(port)?;
        self.listener.set_port(port);
        Ok(())
    }

    pub fn restore_default_settings(&mut self) -> Result<(), SettingsError> {
        self.settings.restore_defaults()?;
        self.listener.set_port(self.settings.port());
        Ok(())
    }

    pub fn settings(&self) -> &Settings<S> {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut Settings<S> {
        &mut self.settings
    }

    pub fn queue(&self) -> &Arc<ImportQueue> {
        &self.queue
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BridgeEvent> {
        self.events.subscribe()
    }

    /// One idle tick: follow the active document while there is nothing to
    /// do, otherwise import the next queued asset.
    pub fn on_idle<H: Host>(&self, host: &mut H) -> Result<Option<ImportReport>, ImportError> {
        if !self.queue.can_import() {
            self.queue.update_document(host);
            return Ok(None);
        }

        let report = self.queue.import_next(host, &self.settings.import_options())?;
        if let Some(report) = &report {
            let _ = self.events.send(BridgeEvent::AssetImported {
                import_id: report.import_id.to_string(),
                name: report.asset_name.clone(),
                completed: report.is_completed(),
                failure: report.failure().map(|f| f.to_string()),
                elapsed_ms: report.elapsed().num_milliseconds(),
            });
        }
        Ok(report)
    }

    /// Import everything currently queued
    pub fn drain<H: Host>(&self, host: &mut H) -> Result<usize, ImportError> {
        let mut imported = 0;
        while self.queue.can_import() {
            if self.on_idle(host)?.is_some() {
                imported += 1;
            }
        }
        Ok(imported)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rhinobridge_core::{
        AssetDescriptor, GeometryFlavor, MemorySettingsStore, PreviewGeometry, UnitSystem,
    };
    use rhinobridge_import::{ImportState, SceneHost, SceneObject};

    fn context() -> BridgeContext<MemorySettingsStore> {
        BridgeContext::new(Settings::new(MemorySettingsStore::new()), ListenerOptions::default())
    }

    #[test]
    fn test_idle_without_work_tracks_active_document() {
        let ctx = context();
        let mut host = SceneHost::new();
        let doc = host.open_document(UnitSystem::Meters);

        assert!(ctx.on_idle(&mut host).unwrap().is_none());
        assert_eq!(ctx.queue().current_document(), Some(doc));
    }

    #[test]
    fn test_idle_imports_one_asset_per_tick() {
        let ctx = context();
        let mut host = SceneHost::new();
        host.open_document(UnitSystem::Meters);
        let mut rx = ctx.subscribe();

        ctx.queue().enqueue(AssetDescriptor::new("a", "#000000"));
        ctx.queue().enqueue(AssetDescriptor::new("b", "#000000"));

        let report = ctx.on_idle(&mut host).unwrap().unwrap();
        assert_eq!(report.asset_name, "a");
        assert_eq!(report.state, ImportState::Completed);
        assert_eq!(ctx.queue().len(), 1);
        match rx.try_recv().unwrap() {
            BridgeEvent::AssetImported {
                import_id,
                name,
                completed,
                failure,
                elapsed_ms,
            } => {
                assert_eq!(import_id, report.import_id.to_string());
                assert_eq!(name, "a");
                assert!(completed);
                assert!(failure.is_none());
                assert_eq!(elapsed_ms, report.elapsed().num_milliseconds());
            }
            other => panic!("unexpected event {:?}", other),
        }

        assert_eq!(ctx.drain(&mut host).unwrap(), 1);
        assert!(ctx.queue().is_empty());
    }

    #[test]
    fn test_settings_flow_into_imports() {
        let mut ctx = context();
        ctx.settings_mut().set_geometry_flavor(GeometryFlavor::Mesh).unwrap();
        ctx.settings_mut().set_preview_geometry(PreviewGeometry::Cube).unwrap();

        let mut host = SceneHost::new();
        let doc = host.open_document(UnitSystem::Meters);
        ctx.queue().enqueue(
            AssetDescriptor::new("rock01", "#8899AA")
                .with_kind("3d")
                .with_geometry("fbx", "rock01.fbx"),
        );
        ctx.queue().enqueue(AssetDescriptor::new("moss", "#00FF00").with_kind("surface"));
        ctx.drain(&mut host).unwrap();

        let objects = &host.document(doc).unwrap().objects;
        assert!(matches!(objects[0], SceneObject::Mesh { .. }));
        assert!(matches!(
            objects[1],
            SceneObject::Preview {
                shape: PreviewGeometry::Cube,
                ..
            }
        ));
    }

    #[test]
    fn test_failed_import_is_reported() {
        let ctx = context();
        let mut host = SceneHost::new();
        host.open_document(UnitSystem::Meters);
        let mut rx = ctx.subscribe();

        ctx.queue().enqueue(AssetDescriptor::new("plant", "#000000").with_kind("3dplant"));
        let report = ctx.on_idle(&mut host).unwrap().unwrap();
        assert!(!report.is_completed());

        match rx.try_recv().unwrap() {
            BridgeEvent::AssetImported { completed, failure, .. } => {
                assert!(!completed);
                assert!(failure.is_some());
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_no_document_leaves_queue_intact() {
        let ctx = context();
        let mut host = SceneHost::new();
        ctx.queue().enqueue(AssetDescriptor::new("a", "#000000"));

        assert_eq!(ctx.on_idle(&mut host).unwrap_err(), ImportError::NoActiveDocument);
        assert_eq!(ctx.queue().len(), 1);
    }

    #[test]
    fn test_set_port_and_restore_defaults() {
        let mut ctx = context();
        ctx.set_port(30000).unwrap();
        assert_eq!(ctx.settings().port(), 30000);

        ctx.settings_mut().set_should_scale_materials(true).unwrap();
        ctx.restore_default_settings().unwrap();
        assert_eq!(ctx.settings().port(), rhinobridge_core::settings::DEFAULT_PORT);
        assert!(!ctx.settings().should_scale_materials());
    }

    #[test]
    fn test_server_lifecycle() {
        let mut ctx = context();
        ctx.set_port(0).unwrap();
        assert!(!ctx.is_server_running());

        let port = ctx.start_server().unwrap();
        assert_eq!(ctx.bound_port(), Some(port));
        ctx.end_server();
        ctx.end_server();
        assert!(!ctx.is_server_running());
    }

    #[test]
    fn test_start_server_reads_port_from_settings() {
        let reserved = std::net::TcpListener::bind(("127.0.0.1", 0)).unwrap();
        let free_port = reserved.local_addr().unwrap().port();
        drop(reserved);

        let mut ctx = context();
        ctx.settings_mut().set_port(free_port).unwrap();
        assert_eq!(ctx.start_server().unwrap(), free_port);
        ctx.end_server();

        // Changed behind the context's back, picked up on restart
        ctx.settings_mut().set_port(0).unwrap();
        let port = ctx.start_server().unwrap();
        assert_ne!(port, rhinobridge_core::settings::DEFAULT_PORT);
        assert_eq!(ctx.bound_port(), Some(port));
        ctx.end_server();
    }
}
