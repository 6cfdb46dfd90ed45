//! Host document seam
//!
//! The modeling application owns its documents. The importer only needs a
//! handful of operations on them, expressed as the [`HostDocument`] trait,
//! and a way to find the document the user is currently working in
//! ([`Host`]).

use rhinobridge_core::{GeometryParameters, MaterialParameters, PreviewGeometry, UnitSystem};
use serde::{Deserialize, Serialize};
use std::ops::{Deref, DerefMut};
use thiserror::Error;

/// Identifier of an open host document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentId(pub u32);

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "doc-{}", self.0)
    }
}

/// Index of a material in a document's material store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MaterialId(pub usize);

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DocumentError {
    #[error("Material rejected: {0}")]
    MaterialRejected(String),
    #[error("Geometry rejected: {path}: {reason}")]
    GeometryRejected { path: String, reason: String },
    #[error("Document {0} was closed")]
    Closed(DocumentId),
}

impl DocumentError {
    /// A closed document cannot take any further imports; everything else
    /// only affects the asset being applied.
    pub fn is_fatal(&self) -> bool {
        matches!(self, DocumentError::Closed(_))
    }
}

/// Operations the importer performs on a host document
pub trait HostDocument {
    fn id(&self) -> DocumentId;

    /// Unit system of the document's model space
    fn model_units(&self) -> UnitSystem;

    fn set_redraw_enabled(&mut self, enabled: bool);

    /// Request a redraw of all views
    fn redraw(&mut self);

    /// Register a material in the document's material store
    fn add_material(&mut self, material: &MaterialParameters) -> Result<MaterialId, DocumentError>;

    /// Import a mesh file and assign the material to it
    fn add_textured_geometry(
        &mut self,
        geometry: &GeometryParameters,
        material: MaterialId,
    ) -> Result<(), DocumentError>;

    /// Add a generated object that shows off a surface material
    fn add_preview_object(
        &mut self,
        preview: PreviewGeometry,
        material: MaterialId,
    ) -> Result<(), DocumentError>;
}

/// The application side: which document is active, and access to it
pub trait Host {
    type Document: HostDocument;

    fn active_document(&self) -> Option<DocumentId>;

    fn document_mut(&mut self, id: DocumentId) -> Option<&mut Self::Document>;
}

/// Disables redraw for its lifetime. On drop redraw is re-enabled and a
/// redraw is requested, whichever way the scope is left.
pub struct RedrawGuard<'a, D: HostDocument + ?Sized> {
    document: &'a mut D,
}

impl<'a, D: HostDocument + ?Sized> RedrawGuard<'a, D> {
    pub fn new(document: &'a mut D) -> Self {
        document.set_redraw_enabled(false);
        Self { document }
    }
}

impl<D: HostDocument + ?Sized> Deref for RedrawGuard<'_, D> {
    type Target = D;

    fn deref(&self) -> &D {
        self.document
    }
}

impl<D: HostDocument + ?Sized> DerefMut for RedrawGuard<'_, D> {
    fn deref_mut(&mut self) -> &mut D {
        self.document
    }
}

impl<D: HostDocument + ?Sized> Drop for RedrawGuard<'_, D> {
    fn drop(&mut self) {
        self.document.set_redraw_enabled(true);
        self.document.redraw();
    }
}
