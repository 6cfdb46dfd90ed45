//! Per-asset import machine
//!
//! One machine imports exactly one asset:
//! 1. Created - holds the received job
//! 2. Converting - builds material and geometry parameters
//! 3. Applying - mutates the document with redraw suspended
//! 4. Completed, or Failed with a classified reason
//!
//! Classified failures are values (`ImportState::Failed`); only conditions
//! that make further imports pointless surface as `Err(ImportError)`.

use chrono::{DateTime, TimeDelta, Utc};
use rhinobridge_core::{
    classify_asset, convert, convert_geometry, scale_material, AssetKind, ConvertError,
    GeometryParameters, ImportOptions, MaterialParameters, PreviewGeometry,
};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::document::{DocumentError, DocumentId, HostDocument, RedrawGuard};
use crate::queue::ImportJob;

/// Errors that abort the current drain instead of just the current asset
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ImportError {
    #[error("No active document to import into")]
    NoActiveDocument,
    #[error("Document {0} was closed during import")]
    DocumentClosed(DocumentId),
    #[error("An import is already in progress")]
    ImportInProgress,
    #[error("Import machine already finished")]
    MachineFinished,
}

/// Why an asset was abandoned
#[derive(Debug, Clone, PartialEq)]
pub enum ImportFailure {
    Convert(ConvertError),
    Document(DocumentError),
}

/// Coarse classification of an [`ImportFailure`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    TextureTypeNotImplemented,
    AssetTypeNotImplemented,
    GeometryFormatNotImplemented,
    MalformedData,
    DocumentRejected,
}

impl ImportFailure {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Convert(ConvertError::TextureTypeNotImplemented { .. }) => FailureKind::TextureTypeNotImplemented,
            Self::Convert(ConvertError::AssetTypeNotImplemented(_)) => FailureKind::AssetTypeNotImplemented,
            Self::Convert(ConvertError::GeometryFormatNotImplemented { .. }) => {
                FailureKind::GeometryFormatNotImplemented
            }
            Self::Convert(ConvertError::Color(_)) => FailureKind::MalformedData,
            Self::Document(_) => FailureKind::DocumentRejected,
        }
    }
}

impl std::fmt::Display for ImportFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Convert(e) => write!(f, "{}", e),
            Self::Document(e) => write!(f, "{}", e),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ImportState {
    Created,
    Converting,
    Applying,
    Completed,
    Failed(ImportFailure),
}

impl ImportState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ImportState::Completed | ImportState::Failed(_))
    }
}

/// Outcome of one finished import
#[derive(Debug, Clone)]
pub struct ImportReport {
    pub import_id: Uuid,
    pub asset_name: String,
    pub state: ImportState,
    /// Objects added to the document, preview objects included
    pub objects_added: usize,
    pub received_at: DateTime<Utc>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl ImportReport {
    pub fn is_completed(&self) -> bool {
        self.state == ImportState::Completed
    }

    /// Time spent converting and applying
    pub fn elapsed(&self) -> TimeDelta {
        self.finished_at - self.started_at
    }

    /// Time the asset waited in the queue
    pub fn queued_for(&self) -> TimeDelta {
        self.started_at - self.received_at
    }

    pub fn failure(&self) -> Option<&ImportFailure> {
        match &self.state {
            ImportState::Failed(failure) => Some(failure),
            _ => None,
        }
    }
}

struct ConvertedAsset {
    kind: AssetKind,
    preview: PreviewGeometry,
    material: MaterialParameters,
    geometries: Vec<GeometryParameters>,
}

pub struct ImportMachine {
    job: ImportJob,
    state: ImportState,
    converted: Option<ConvertedAsset>,
    objects_added: usize,
}

impl ImportMachine {
    pub fn new(job: ImportJob) -> Self {
        Self {
            job,
            state: ImportState::Created,
            converted: None,
            objects_added: 0,
        }
    }

    pub fn state(&self) -> &ImportState {
        &self.state
    }

    /// Advance by one state
    pub fn step<D: HostDocument + ?Sized>(
        &mut self,
        document: &mut D,
        options: &ImportOptions,
    ) -> Result<&ImportState, ImportError> {
        let next = match &self.state {
            ImportState::Created => ImportState::Converting,
            ImportState::Converting => match self.convert(document, options) {
                Ok(converted) => {
                    self.converted = Some(converted);
                    ImportState::Applying
                }
                Err(e) => ImportState::Failed(ImportFailure::Convert(e)),
            },
            ImportState::Applying => match self.apply(document) {
                Ok(()) => ImportState::Completed,
                Err(e) if e.is_fatal() => {
                    return Err(ImportError::DocumentClosed(document.id()));
                }
                Err(e) => ImportState::Failed(ImportFailure::Document(e)),
            },
            ImportState::Completed | ImportState::Failed(_) => {
                return Err(ImportError::MachineFinished);
            }
        };

        debug!(import = %self.job.id, asset = %self.job.asset.name, state = ?next, "Import state changed");
        self.state = next;
        Ok(&self.state)
    }

    /// Drive the machine to a terminal state. The machine is consumed;
    /// a finished machine is never reused.
    pub fn run<D: HostDocument + ?Sized>(
        mut self,
        document: &mut D,
        options: &ImportOptions,
    ) -> Result<ImportReport, ImportError> {
        let started_at = Utc::now();
        while !self.state.is_terminal() {
            self.step(document, options)?;
        }

        let report = ImportReport {
            import_id: self.job.id,
            asset_name: self.job.asset.name,
            state: self.state,
            objects_added: self.objects_added,
            received_at: self.job.received_at,
            started_at,
            finished_at: Utc::now(),
        };

        let elapsed_ms = report.elapsed().num_milliseconds();
        let queued_ms = report.queued_for().num_milliseconds();
        match &report.state {
            ImportState::Completed => info!(
                import = %report.import_id,
                asset = %report.asset_name,
                objects = report.objects_added,
                elapsed_ms = elapsed_ms,
                queued_ms = queued_ms,
                "Imported asset"
            ),
            ImportState::Failed(failure) => warn!(
                import = %report.import_id,
                asset = %report.asset_name,
                kind = ?failure.kind(),
                elapsed_ms = elapsed_ms,
                "Asset import failed: {}",
                failure
            ),
            _ => {}
        }

        Ok(report)
    }

    fn convert<D: HostDocument + ?Sized>(
        &self,
        document: &D,
        options: &ImportOptions,
    ) -> Result<ConvertedAsset, ConvertError> {
        let asset = &self.job.asset;
        let units = document.model_units();

        let kind = classify_asset(asset)?;

        let mut material = convert(asset)?;
        if options.should_scale_materials {
            material = scale_material(material, asset.physical_size, units);
        }

        let geometries = asset
            .geometries
            .iter()
            .map(|g| convert_geometry(g, options, units))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ConvertedAsset {
            kind,
            preview: options.preview_geometry,
            material,
            geometries,
        })
    }

    fn apply<D: HostDocument + ?Sized>(&mut self, document: &mut D) -> Result<(), DocumentError> {
        let Some(converted) = self.converted.take() else {
            return Ok(());
        };

        let mut document = RedrawGuard::new(document);

        let material = document.add_material(&converted.material)?;

        for geometry in &converted.geometries {
            document.add_textured_geometry(geometry, material)?;
            self.objects_added += 1;
        }

        if converted.kind == AssetKind::Surface {
            document.add_preview_object(converted.preview, material)?;
            self.objects_added += 1;
        }

        Ok(())
    }
}
