//! RhinoBridge Core - Asset descriptors, conversion, and settings
//!
//! This crate provides the host-independent pieces of the bridge:
//! - Asset descriptors as sent by the exporter, and their classification
//! - Color and unit-system helpers
//! - The pure asset converter (descriptor -> material/geometry parameters)
//! - Persisted plugin settings behind an injectable store

pub mod asset;
pub mod color;
pub mod convert;
pub mod settings;
pub mod units;

pub use asset::{
    parse_batch, AssetDescriptor, AssetKind, GeometryDescriptor, GeometryFormat,
    TextureDescriptor, TextureKind,
};
pub use color::{parse_hex_color, ColorError, Rgb};
pub use convert::{
    classify_asset, classify_geometry, classify_texture, convert, convert_geometry,
    scale_material, ConvertError, GeometryFlavor, GeometryParameters, ImportOptions,
    MaterialParameters, PreviewGeometry, EXPORT_UNIT_SYSTEM,
};
pub use settings::{MemorySettingsStore, Settings, SettingsError, SettingsStore, TomlSettingsStore};
pub use units::UnitSystem;
