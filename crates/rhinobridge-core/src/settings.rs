//! Persisted plugin settings
//!
//! Settings are read through the store on every access and written back
//! immediately on every set. The store is injected so the same typed
//! accessors work against a TOML file or an in-memory map.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::convert::{GeometryFlavor, ImportOptions, PreviewGeometry};

pub const DEFAULT_PORT: u16 = 24981;
pub const DEFAULT_PREVIEW_GEOMETRY: PreviewGeometry = PreviewGeometry::Sphere;
pub const DEFAULT_SHOULD_SCALE: bool = false;
pub const DEFAULT_GEOMETRY_FLAVOR: GeometryFlavor = GeometryFlavor::Block;

const PORT_KEY: &str = "PORT";
const PREVIEW_TYPE_KEY: &str = "PREVIEWTYPE";
const SHOULD_SCALE_KEY: &str = "SHOULDSCALE";
const GEOMETRY_FLAVOR_KEY: &str = "ASSETGEOMETRYTYPE";

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse settings file: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Failed to serialize settings: {0}")]
    SerializeError(#[from] toml::ser::Error),
}

/// Typed key/value persistence
pub trait SettingsStore: Send {
    fn get_int(&self, key: &str) -> Option<i64>;
    fn set_int(&mut self, key: &str, value: i64) -> Result<(), SettingsError>;
    fn get_bool(&self, key: &str) -> Option<bool>;
    fn set_bool(&mut self, key: &str, value: bool) -> Result<(), SettingsError>;
    fn get_string(&self, key: &str) -> Option<String>;
    fn set_string(&mut self, key: &str, value: &str) -> Result<(), SettingsError>;
}

/// Settings kept in memory only
#[derive(Debug, Clone, Default)]
pub struct MemorySettingsStore {
    values: BTreeMap<String, toml::Value>,
}

impl MemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SettingsStore for MemorySettingsStore {
    fn get_int(&self, key: &str) -> Option<i64> {
        self.values.get(key).and_then(|v| v.as_integer())
    }

    fn set_int(&mut self, key: &str, value: i64) -> Result<(), SettingsError> {
        self.values.insert(key.to_string(), toml::Value::Integer(value));
        Ok(())
    }

    fn get_bool(&self, key: &str) -> Option<bool> {
        self.values.get(key).and_then(|v| v.as_bool())
    }

    fn set_bool(&mut self, key: &str, value: bool) -> Result<(), SettingsError> {
        self.values.insert(key.to_string(), toml::Value::Boolean(value));
        Ok(())
    }

    fn get_string(&self, key: &str) -> Option<String> {
        self.values.get(key).and_then(|v| v.as_str()).map(str::to_string)
    }

    fn set_string(&mut self, key: &str, value: &str) -> Result<(), SettingsError> {
        self.values.insert(key.to_string(), toml::Value::String(value.to_string()));
        Ok(())
    }
}

/// Settings persisted to a flat TOML file, rewritten on every set
#[derive(Debug, Clone)]
pub struct TomlSettingsStore {
    path: PathBuf,
    table: toml::Table,
}

impl TomlSettingsStore {
    /// Open the settings file, starting empty if it doesn't exist
    pub fn open(path: &Path) -> Result<Self, SettingsError> {
        let table = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let table: toml::Table = toml::from_str(&content)?;
            info!(path = %path.display(), keys = table.len(), "Loaded settings");
            table
        } else {
            info!(path = %path.display(), "Settings file not found, using defaults");
            toml::Table::new()
        };

        Ok(Self {
            path: path.to_path_buf(),
            table,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The in-memory table only changes once the file has been written
    fn write(&mut self, key: &str, value: toml::Value) -> Result<(), SettingsError> {
        let mut table = self.table.clone();
        table.insert(key.to_string(), value);
        let content = toml::to_string_pretty(&table)?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(&self.path, content)?;
        self.table = table;
        debug!(path = %self.path.display(), key = key, "Saved setting");
        Ok(())
    }
}

impl SettingsStore for TomlSettingsStore {
    fn get_int(&self, key: &str) -> Option<i64> {
        self.table.get(key).and_then(|v| v.as_integer())
    }

    fn set_int(&mut self, key: &str, value: i64) -> Result<(), SettingsError> {
        self.write(key, toml::Value::Integer(value))
    }

    fn get_bool(&self, key: &str) -> Option<bool> {
        self.table.get(key).and_then(|v| v.as_bool())
    }

    fn set_bool(&mut self, key: &str, value: bool) -> Result<(), SettingsError> {
        self.write(key, toml::Value::Boolean(value))
    }

    fn get_string(&self, key: &str) -> Option<String> {
        self.table.get(key).and_then(|v| v.as_str()).map(str::to_string)
    }

    fn set_string(&mut self, key: &str, value: &str) -> Result<(), SettingsError> {
        self.write(key, toml::Value::String(value.to_string()))
    }
}

/// Typed access to the bridge settings
pub struct Settings<S: SettingsStore> {
    store: S,
}

impl<S: SettingsStore> Settings<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Port the listener binds to
    pub fn port(&self) -> u16 {
        match self.store.get_int(PORT_KEY) {
            None => DEFAULT_PORT,
            Some(value) => u16::try_from(value).unwrap_or_else(|_| {
                warn!(value = value, "Stored port out of range, using default");
                DEFAULT_PORT
            }),
        }
    }

    pub fn set_port(&mut self, port: u16) -> Result<(), SettingsError> {
        self.store.set_int(PORT_KEY, i64::from(port))
    }

    /// Object generated to preview surface materials
    pub fn preview_geometry(&self) -> PreviewGeometry {
        self.store
            .get_string(PREVIEW_TYPE_KEY)
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_PREVIEW_GEOMETRY)
    }

    pub fn set_preview_geometry(&mut self, preview: PreviewGeometry) -> Result<(), SettingsError> {
        self.store.set_string(PREVIEW_TYPE_KEY, preview.as_str())
    }

    pub fn should_scale_materials(&self) -> bool {
        self.store
            .get_bool(SHOULD_SCALE_KEY)
            .unwrap_or(DEFAULT_SHOULD_SCALE)
    }

    pub fn set_should_scale_materials(&mut self, should_scale: bool) -> Result<(), SettingsError> {
        self.store.set_bool(SHOULD_SCALE_KEY, should_scale)
    }

    /// How asset meshes are placed in the document
    pub fn geometry_flavor(&self) -> GeometryFlavor {
        self.store
            .get_string(GEOMETRY_FLAVOR_KEY)
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_GEOMETRY_FLAVOR)
    }

    pub fn set_geometry_flavor(&mut self, flavor: GeometryFlavor) -> Result<(), SettingsError> {
        self.store.set_string(GEOMETRY_FLAVOR_KEY, flavor.as_str())
    }

    /// Write every setting back to its default value
    pub fn restore_defaults(&mut self) -> Result<(), SettingsError> {
        self.set_port(DEFAULT_PORT)?;
        self.set_preview_geometry(DEFAULT_PREVIEW_GEOMETRY)?;
        self.set_should_scale_materials(DEFAULT_SHOULD_SCALE)?;
        self.set_geometry_flavor(DEFAULT_GEOMETRY_FLAVOR)?;
        info!("Restored default settings");
        Ok(())
    }

    /// Snapshot of the settings that affect an import
    pub fn import_options(&self) -> ImportOptions {
        ImportOptions {
            preview_geometry: self.preview_geometry(),
            should_scale_materials: self.should_scale_materials(),
            geometry_flavor: self.geometry_flavor(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let settings = Settings::new(MemorySettingsStore::new());
        assert_eq!(settings.port(), 24981);
        assert_eq!(settings.preview_geometry(), PreviewGeometry::Sphere);
        assert!(!settings.should_scale_materials());
        assert_eq!(settings.geometry_flavor(), GeometryFlavor::Block);
    }

    #[test]
    fn test_out_of_range_port_falls_back() {
        let mut store = MemorySettingsStore::new();
        store.set_int(PORT_KEY, 70000).unwrap();
        let settings = Settings::new(store);
        assert_eq!(settings.port(), DEFAULT_PORT);

        let mut store = MemorySettingsStore::new();
        store.set_int(PORT_KEY, -1).unwrap();
        assert_eq!(Settings::new(store).port(), DEFAULT_PORT);
    }

    #[test]
    fn test_garbage_enum_falls_back() {
        let mut store = MemorySettingsStore::new();
        store.set_string(PREVIEW_TYPE_KEY, "Teapot").unwrap();
        store.set_int(GEOMETRY_FLAVOR_KEY, 3).unwrap();
        let settings = Settings::new(store);
        assert_eq!(settings.preview_geometry(), PreviewGeometry::Sphere);
        assert_eq!(settings.geometry_flavor(), GeometryFlavor::Block);
    }

    #[test]
    fn test_restore_defaults() {
        let mut settings = Settings::new(MemorySettingsStore::new());
        settings.set_port(3000).unwrap();
        settings.set_preview_geometry(PreviewGeometry::Plane).unwrap();
        settings.set_should_scale_materials(true).unwrap();
        settings.set_geometry_flavor(GeometryFlavor::Mesh).unwrap();

        settings.restore_defaults().unwrap();
        assert_eq!(settings.import_options(), ImportOptions::default());
        assert_eq!(settings.port(), DEFAULT_PORT);
    }

    #[test]
    fn test_toml_store_persists_immediately() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("settings.toml");

        {
            let mut settings = Settings::new(TomlSettingsStore::open(&path).unwrap());
            settings.set_port(25000).unwrap();
            settings.set_geometry_flavor(GeometryFlavor::Mesh).unwrap();
            settings.set_should_scale_materials(true).unwrap();
        }

        assert!(path.exists());
        let reopened = Settings::new(TomlSettingsStore::open(&path).unwrap());
        assert_eq!(reopened.port(), 25000);
        assert_eq!(reopened.geometry_flavor(), GeometryFlavor::Mesh);
        assert!(reopened.should_scale_materials());
        assert_eq!(reopened.preview_geometry(), PreviewGeometry::Sphere);
    }

    #[test]
    fn test_failed_write_keeps_previous_value() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("settings.toml");
        let mut settings = Settings::new(TomlSettingsStore::open(&path).unwrap());
        settings.set_port(25000).unwrap();

        // A directory in place of the file makes every write fail
        std::fs::remove_file(&path).unwrap();
        std::fs::create_dir(&path).unwrap();

        assert!(matches!(settings.set_port(1234), Err(SettingsError::IoError(_))));
        assert_eq!(settings.port(), 25000);
        assert!(settings.set_should_scale_materials(true).is_err());
        assert!(!settings.should_scale_materials());
        assert_eq!(settings.store().path(), path.as_path());
    }
}
