//! Asset to host parameter conversion
//!
//! Everything in here is pure: no I/O, no shared state. The import machine
//! calls these functions while converting an asset and hands the results to
//! the host document afterwards.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

use crate::asset::{AssetDescriptor, AssetKind, GeometryDescriptor, GeometryFormat, TextureDescriptor, TextureKind};
use crate::color::{parse_hex_color, ColorError, Rgb};
use crate::units::UnitSystem;

/// Unit system of the mesh files written by the exporter
pub const EXPORT_UNIT_SYSTEM: UnitSystem = UnitSystem::Centimeters;

/// Bitmap formats the host can load into a texture slot
const SUPPORTED_TEXTURE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "tif", "tiff", "bmp", "tga", "exr"];

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConvertError {
    #[error("Invalid average color: {0}")]
    Color(#[from] ColorError),
    #[error("Texture type not implemented: {kind:?} map {path}")]
    TextureTypeNotImplemented { kind: TextureKind, path: String },
    #[error("Asset type not implemented: {0}")]
    AssetTypeNotImplemented(String),
    #[error("Geometry format not implemented: {format} ({path})")]
    GeometryFormatNotImplemented { format: String, path: String },
}

/// Object used to preview surface materials
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PreviewGeometry {
    #[default]
    Sphere,
    Cube,
    Plane,
}

impl PreviewGeometry {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sphere => "Sphere",
            Self::Cube => "Cube",
            Self::Plane => "Plane",
        }
    }
}

impl FromStr for PreviewGeometry {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Sphere" => Ok(Self::Sphere),
            "Cube" => Ok(Self::Cube),
            "Plane" => Ok(Self::Plane),
            other => Err(format!("unknown preview geometry: {}", other)),
        }
    }
}

/// How imported meshes are placed in the document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeometryFlavor {
    /// One block definition per asset, inserted as an instance
    #[default]
    Block,
    /// Plain mesh objects
    Mesh,
}

impl GeometryFlavor {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Block => "Block",
            Self::Mesh => "Mesh",
        }
    }
}

impl FromStr for GeometryFlavor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Block" => Ok(Self::Block),
            "Mesh" => Ok(Self::Mesh),
            other => Err(format!("unknown geometry flavor: {}", other)),
        }
    }
}

/// Settings snapshot that drives one import
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ImportOptions {
    pub preview_geometry: PreviewGeometry,
    pub should_scale_materials: bool,
    pub geometry_flavor: GeometryFlavor,
}

/// Material description handed to the host's material store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialParameters {
    pub name: String,
    pub diffuse: Rgb,
    pub base_color_texture: Option<String>,
    pub bump_texture: Option<String>,
    /// Real-world size one texture tile covers, in document units
    pub texture_size: Option<[f64; 2]>,
}

/// Mesh import description handed to the host document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeometryParameters {
    pub path: String,
    pub format: GeometryFormat,
    pub flavor: GeometryFlavor,
    /// Uniform scale from the exporter's units into document units
    pub scale: f64,
}

pub fn classify_texture(texture: &TextureDescriptor) -> TextureKind {
    TextureKind::from_tag(&texture.kind)
}

pub fn classify_asset(asset: &AssetDescriptor) -> Result<AssetKind, ConvertError> {
    AssetKind::from_tag(asset.kind.as_deref())
        .ok_or_else(|| ConvertError::AssetTypeNotImplemented(asset.kind.clone().unwrap_or_default()))
}

pub fn classify_geometry(geometry: &GeometryDescriptor) -> Result<GeometryFormat, ConvertError> {
    GeometryFormat::from_tag(&geometry.format).ok_or_else(|| ConvertError::GeometryFormatNotImplemented {
        format: geometry.format.clone(),
        path: geometry.path.clone(),
    })
}

/// Convert an asset into material parameters.
///
/// Only albedo and normal maps have a material slot; other channels are
/// accepted and skipped.
pub fn convert(asset: &AssetDescriptor) -> Result<MaterialParameters, ConvertError> {
    let mut material = MaterialParameters {
        name: asset.name.clone(),
        diffuse: parse_hex_color(&asset.average_color)?,
        base_color_texture: None,
        bump_texture: None,
        texture_size: None,
    };

    for texture in &asset.textures {
        match classify_texture(texture) {
            TextureKind::Albedo => {
                check_bitmap(texture, TextureKind::Albedo)?;
                material.base_color_texture = Some(texture.path.clone());
            }
            TextureKind::Normal => {
                check_bitmap(texture, TextureKind::Normal)?;
                material.bump_texture = Some(texture.path.clone());
            }
            // No slot for these yet
            TextureKind::AmbientOcclusion
            | TextureKind::Cavity
            | TextureKind::Displacement
            | TextureKind::Gloss
            | TextureKind::Roughness
            | TextureKind::Specular
            | TextureKind::Undefined => {}
        }
    }

    Ok(material)
}

fn check_bitmap(texture: &TextureDescriptor, kind: TextureKind) -> Result<(), ConvertError> {
    let supported = Path::new(&texture.path)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            SUPPORTED_TEXTURE_EXTENSIONS
                .iter()
                .any(|s| s.eq_ignore_ascii_case(ext))
        })
        .unwrap_or(false);

    if supported {
        Ok(())
    } else {
        Err(ConvertError::TextureTypeNotImplemented {
            kind,
            path: texture.path.clone(),
        })
    }
}

/// Convert one mesh payload into host geometry parameters
pub fn convert_geometry(
    geometry: &GeometryDescriptor,
    options: &ImportOptions,
    document_units: UnitSystem,
) -> Result<GeometryParameters, ConvertError> {
    Ok(GeometryParameters {
        path: geometry.path.clone(),
        format: classify_geometry(geometry)?,
        flavor: options.geometry_flavor,
        scale: EXPORT_UNIT_SYSTEM.scale_to(document_units),
    })
}

/// Size the texture tile to the asset's physical size, in document units.
/// Assets without a physical size are returned unchanged.
pub fn scale_material(
    mut material: MaterialParameters,
    physical_size: Option<[f64; 2]>,
    document_units: UnitSystem,
) -> MaterialParameters {
    if let Some([width, height]) = physical_size {
        let factor = UnitSystem::Meters.scale_to(document_units);
        material.texture_size = Some([width * factor, height * factor]);
    }
    material
}
