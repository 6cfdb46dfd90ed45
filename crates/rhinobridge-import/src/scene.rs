//! Headless in-memory host
//!
//! Stands in for the modeling application when the bridge runs on its own:
//! documents keep the materials and objects imported into them and can be
//! dumped as JSON.

use rhinobridge_core::{
    GeometryFlavor, GeometryFormat, GeometryParameters, MaterialParameters, PreviewGeometry,
    UnitSystem,
};
use serde::Serialize;
use std::path::Path;
use tracing::{debug, info};

use crate::document::{DocumentError, DocumentId, Host, HostDocument, MaterialId};

/// An object placed in a scene document
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SceneObject {
    /// Instance of a block definition built from a mesh file
    BlockInstance {
        definition: String,
        path: String,
        format: GeometryFormat,
        scale: f64,
        material: MaterialId,
    },
    Mesh {
        path: String,
        format: GeometryFormat,
        scale: f64,
        material: MaterialId,
    },
    Preview {
        shape: PreviewGeometry,
        material: MaterialId,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct SceneDocument {
    pub id: DocumentId,
    pub units: UnitSystem,
    pub materials: Vec<MaterialParameters>,
    pub objects: Vec<SceneObject>,
    #[serde(skip)]
    redraw_enabled: bool,
    #[serde(skip)]
    redraw_requests: usize,
}

impl SceneDocument {
    pub fn new(id: DocumentId, units: UnitSystem) -> Self {
        Self {
            id,
            units,
            materials: Vec::new(),
            objects: Vec::new(),
            redraw_enabled: true,
            redraw_requests: 0,
        }
    }

    pub fn redraw_requests(&self) -> usize {
        self.redraw_requests
    }

    fn check_material(&self, material: MaterialId) -> Result<(), DocumentError> {
        if material.0 < self.materials.len() {
            Ok(())
        } else {
            Err(DocumentError::MaterialRejected(format!(
                "unknown material index {}",
                material.0
            )))
        }
    }
}

impl HostDocument for SceneDocument {
    fn id(&self) -> DocumentId {
        self.id
    }

    fn model_units(&self) -> UnitSystem {
        self.units
    }

    fn set_redraw_enabled(&mut self, enabled: bool) {
        self.redraw_enabled = enabled;
    }

    fn redraw(&mut self) {
        if self.redraw_enabled {
            self.redraw_requests += 1;
        }
    }

    fn add_material(&mut self, material: &MaterialParameters) -> Result<MaterialId, DocumentError> {
        if material.name.trim().is_empty() {
            return Err(DocumentError::MaterialRejected("material name is empty".to_string()));
        }
        self.materials.push(material.clone());
        debug!(document = %self.id, material = %material.name, "Added material");
        Ok(MaterialId(self.materials.len() - 1))
    }

    fn add_textured_geometry(
        &mut self,
        geometry: &GeometryParameters,
        material: MaterialId,
    ) -> Result<(), DocumentError> {
        self.check_material(material)?;
        if geometry.path.trim().is_empty() {
            return Err(DocumentError::GeometryRejected {
                path: geometry.path.clone(),
                reason: "empty path".to_string(),
            });
        }

        let object = match geometry.flavor {
            GeometryFlavor::Block => SceneObject::BlockInstance {
                definition: Path::new(&geometry.path)
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_else(|| geometry.path.clone()),
                path: geometry.path.clone(),
                format: geometry.format,
                scale: geometry.scale,
                material,
            },
            GeometryFlavor::Mesh => SceneObject::Mesh {
                path: geometry.path.clone(),
                format: geometry.format,
                scale: geometry.scale,
                material,
            },
        };
        self.objects.push(object);
        Ok(())
    }

    fn add_preview_object(
        &mut self,
        preview: PreviewGeometry,
        material: MaterialId,
    ) -> Result<(), DocumentError> {
        self.check_material(material)?;
        self.objects.push(SceneObject::Preview {
            shape: preview,
            material,
        });
        Ok(())
    }
}

/// A set of open documents, one of which is active
#[derive(Debug, Default)]
pub struct SceneHost {
    documents: Vec<SceneDocument>,
    active: Option<DocumentId>,
    next_id: u32,
}

impl SceneHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new document and make it active
    pub fn open_document(&mut self, units: UnitSystem) -> DocumentId {
        let id = DocumentId(self.next_id);
        self.next_id += 1;
        self.documents.push(SceneDocument::new(id, units));
        self.active = Some(id);
        info!(document = %id, units = ?units, "Opened document");
        id
    }

    pub fn close_document(&mut self, id: DocumentId) -> bool {
        let before = self.documents.len();
        self.documents.retain(|d| d.id != id);
        if self.active == Some(id) {
            self.active = self.documents.last().map(|d| d.id);
        }
        self.documents.len() != before
    }

    pub fn set_active(&mut self, id: DocumentId) -> bool {
        if self.documents.iter().any(|d| d.id == id) {
            self.active = Some(id);
            true
        } else {
            false
        }
    }

    pub fn document(&self, id: DocumentId) -> Option<&SceneDocument> {
        self.documents.iter().find(|d| d.id == id)
    }

    pub fn documents(&self) -> &[SceneDocument] {
        &self.documents
    }

    /// Write all documents as pretty JSON
    pub fn save_json(&self, path: &Path) -> std::io::Result<()> {
        let content = serde_json::to_string_pretty(&self.documents)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, content)?;
        info!(path = %path.display(), documents = self.documents.len(), "Saved scene");
        Ok(())
    }
}

impl Host for SceneHost {
    type Document = SceneDocument;

    fn active_document(&self) -> Option<DocumentId> {
        self.active
    }

    fn document_mut(&mut self, id: DocumentId) -> Option<&mut SceneDocument> {
        self.documents.iter_mut().find(|d| d.id == id)
    }
}
