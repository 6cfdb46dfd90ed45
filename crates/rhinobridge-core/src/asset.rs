//! Asset descriptors received from the exporter
//!
//! The exporter sends a JSON array of assets per connection. Only the fields
//! the importer needs are modelled here; everything else in the payload is
//! ignored during deserialization.

use serde::{Deserialize, Serialize};

/// One importable asset as described by the exporter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetDescriptor {
    /// Display name, used as the material name
    pub name: String,
    /// Exporter-side asset id
    #[serde(default)]
    pub id: Option<String>,
    /// Raw asset type tag ("3d", "surface", "3dplant", ...)
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    /// Average color of the albedo map, e.g. "#8899AA"
    #[serde(rename = "averageColor")]
    pub average_color: String,
    /// Texture maps in exporter order
    #[serde(default, alias = "components")]
    pub textures: Vec<TextureDescriptor>,
    /// Mesh payloads in exporter order
    #[serde(default, alias = "meshList")]
    pub geometries: Vec<GeometryDescriptor>,
    /// Real-world size of the scanned surface in meters (width, height)
    #[serde(rename = "physicalSize", default)]
    pub physical_size: Option<[f64; 2]>,
}

impl AssetDescriptor {
    /// Create a descriptor with no textures or geometry
    pub fn new(name: impl Into<String>, average_color: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: None,
            kind: None,
            average_color: average_color.into(),
            textures: Vec::new(),
            geometries: Vec::new(),
            physical_size: None,
        }
    }

    pub fn with_kind(mut self, kind: &str) -> Self {
        self.kind = Some(kind.to_string());
        self
    }

    pub fn with_texture(mut self, kind: &str, path: &str) -> Self {
        self.textures.push(TextureDescriptor::new(kind, path));
        self
    }

    pub fn with_geometry(mut self, format: &str, path: &str) -> Self {
        self.geometries.push(GeometryDescriptor::new(format, path));
        self
    }
}

/// A single texture map of an asset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextureDescriptor {
    /// Raw channel tag ("albedo", "normal", ...)
    #[serde(rename = "type")]
    pub kind: String,
    /// Path of the bitmap on disk
    pub path: String,
}

impl TextureDescriptor {
    pub fn new(kind: &str, path: &str) -> Self {
        Self {
            kind: kind.to_string(),
            path: path.to_string(),
        }
    }
}

/// A single mesh payload of an asset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeometryDescriptor {
    /// Raw file format tag ("fbx", "obj", ...)
    pub format: String,
    /// Path of the mesh file on disk
    pub path: String,
}

impl GeometryDescriptor {
    pub fn new(format: &str, path: &str) -> Self {
        Self {
            format: format.to_string(),
            path: path.to_string(),
        }
    }
}

/// Texture role resolved from the raw channel tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TextureKind {
    Albedo,
    AmbientOcclusion,
    Cavity,
    Displacement,
    Gloss,
    Normal,
    Roughness,
    Specular,
    Undefined,
}

impl TextureKind {
    /// Resolve a raw tag. Matching is exact and case-sensitive; anything
    /// unknown becomes `Undefined`.
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "albedo" => Self::Albedo,
            "ao" => Self::AmbientOcclusion,
            "cavity" => Self::Cavity,
            "displacement" => Self::Displacement,
            "gloss" => Self::Gloss,
            "normal" => Self::Normal,
            "roughness" => Self::Roughness,
            "specular" => Self::Specular,
            _ => Self::Undefined,
        }
    }
}

/// Asset categories the importer knows how to place in a document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    /// 3D asset with mesh payloads
    Model,
    /// Surface material, previewed on a generated object
    Surface,
    /// No type given; whatever geometry is listed gets imported
    Unspecified,
}

impl AssetKind {
    /// Resolve a raw asset type tag, `None` if the type is not supported
    pub fn from_tag(tag: Option<&str>) -> Option<Self> {
        match tag {
            None => Some(Self::Unspecified),
            Some("3d") => Some(Self::Model),
            Some("surface") => Some(Self::Surface),
            Some(_) => None,
        }
    }
}

/// Mesh file formats the host can import
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeometryFormat {
    Fbx,
    Obj,
}

impl GeometryFormat {
    /// Resolve a raw format tag, `None` if the format is not supported
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "fbx" => Some(Self::Fbx),
            "obj" => Some(Self::Obj),
            _ => None,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Batch {
    Many(Vec<AssetDescriptor>),
    One(AssetDescriptor),
}

/// Parse one exporter payload into a batch of descriptors.
///
/// The exporter sends an array; a bare object is accepted as a batch of one.
pub fn parse_batch(payload: &[u8]) -> Result<Vec<AssetDescriptor>, serde_json::Error> {
    Ok(match serde_json::from_slice::<Batch>(payload)? {
        Batch::Many(assets) => assets,
        Batch::One(asset) => vec![asset],
    })
}
