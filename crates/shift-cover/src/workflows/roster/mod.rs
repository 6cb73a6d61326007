//! CSV roster and schedule import into the in-memory coverage store.

mod parser;

use std::collections::HashSet;
use std::io::Read;
use std::path::Path;

use serde::Serialize;
use tracing::info;

use crate::workflows::coverage::{
    CoverageRepository, InMemoryCoverageStore, Location, Organization, OrganizationId,
    RepositoryError,
};

#[derive(Debug)]
pub enum RosterImportError {
    Io(std::io::Error),
    Csv(csv::Error),
    InvalidRow { line: usize, message: String },
    Store(RepositoryError),
}

impl std::fmt::Display for RosterImportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RosterImportError::Io(err) => write!(f, "failed to read roster export: {err}"),
            RosterImportError::Csv(err) => write!(f, "invalid roster CSV data: {err}"),
            RosterImportError::InvalidRow { line, message } => {
                write!(f, "roster line {line}: {message}")
            }
            RosterImportError::Store(err) => write!(f, "could not load roster: {err}"),
        }
    }
}

impl std::error::Error for RosterImportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RosterImportError::Io(err) => Some(err),
            RosterImportError::Csv(err) => Some(err),
            RosterImportError::Store(err) => Some(err),
            RosterImportError::InvalidRow { .. } => None,
        }
    }
}

impl From<std::io::Error> for RosterImportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<csv::Error> for RosterImportError {
    fn from(err: csv::Error) -> Self {
        Self::Csv(err)
    }
}

impl From<RepositoryError> for RosterImportError {
    fn from(err: RepositoryError) -> Self {
        Self::Store(err)
    }
}

/// Counts of records created by an import.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub organizations: usize,
    pub locations: usize,
    pub staff: usize,
    pub shifts: usize,
}

/// Loads staff and shift exports; organizations and locations are created on first sight.
pub struct RosterImporter<'a> {
    store: &'a InMemoryCoverageStore,
    summary: ImportSummary,
}

impl<'a> RosterImporter<'a> {
    pub fn new(store: &'a InMemoryCoverageStore) -> Self {
        Self {
            store,
            summary: ImportSummary::default(),
        }
    }

    /// Import a staff file and, optionally, a schedule file that references it.
    pub fn from_paths<P: AsRef<Path>>(
        store: &'a InMemoryCoverageStore,
        staff: P,
        shifts: Option<P>,
    ) -> Result<ImportSummary, RosterImportError> {
        let mut importer = Self::new(store);
        importer.staff(std::fs::File::open(staff)?)?;
        if let Some(path) = shifts {
            importer.shifts(std::fs::File::open(path)?)?;
        }
        Ok(importer.finish())
    }

    pub fn staff<R: Read>(&mut self, reader: R) -> Result<&mut Self, RosterImportError> {
        for member in parser::parse_staff(reader)? {
            self.ensure_organization(&member.organization_id)?;
            self.store.insert_staff(member)?;
            self.summary.staff += 1;
        }
        Ok(self)
    }

    pub fn shifts<R: Read>(&mut self, reader: R) -> Result<&mut Self, RosterImportError> {
        let mut seen_locations = HashSet::new();
        for (index, record) in parser::parse_shifts(reader)?.into_iter().enumerate() {
            let shift = record.shift;
            if let Some(assignee) = &shift.assigned_to {
                let known = self
                    .store
                    .staff_member(assignee)?
                    .is_some_and(|member| member.organization_id == shift.organization_id);
                if !known {
                    return Err(RosterImportError::InvalidRow {
                        line: index + 2,
                        message: format!(
                            "shift {} is assigned to {assignee}, who is not on the {} roster",
                            shift.id, shift.organization_id
                        ),
                    });
                }
            }

            self.ensure_organization(&shift.organization_id)?;
            if seen_locations.insert(shift.location_id.clone())
                && self.store.location(&shift.location_id)?.is_none()
            {
                self.store.insert_location(Location {
                    id: shift.location_id.clone(),
                    organization_id: shift.organization_id.clone(),
                    name: record
                        .location_name
                        .unwrap_or_else(|| shift.location_id.to_string()),
                })?;
                self.summary.locations += 1;
            }
            self.store.insert_shift(shift)?;
            self.summary.shifts += 1;
        }
        Ok(self)
    }

    pub fn finish(&self) -> ImportSummary {
        info!(
            organizations = self.summary.organizations,
            locations = self.summary.locations,
            staff = self.summary.staff,
            shifts = self.summary.shifts,
            "roster import complete"
        );
        self.summary.clone()
    }

    fn ensure_organization(&mut self, id: &OrganizationId) -> Result<(), RosterImportError> {
        if self
            .store
            .organizations()?
            .iter()
            .any(|organization| &organization.id == id)
        {
            return Ok(());
        }
        self.store.insert_organization(Organization {
            id: id.clone(),
            name: id.to_string(),
        })?;
        self.summary.organizations += 1;
        Ok(())
    }
}
