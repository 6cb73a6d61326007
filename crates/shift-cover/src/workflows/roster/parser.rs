use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Deserializer};
use std::io::Read;

use super::RosterImportError;
use crate::workflows::coverage::{
    LocationId, OrganizationId, Shift, ShiftId, ShiftStatus, StaffId, StaffMember, UserRole,
};

/// A shift row plus the display name of its location, when the export carries one.
#[derive(Debug)]
pub(crate) struct ShiftRecord {
    pub(crate) shift: Shift,
    pub(crate) location_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StaffRow {
    id: String,
    organization_id: String,
    name: String,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    role: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    phone: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    email: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    seniority: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    active: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ShiftRow {
    id: String,
    organization_id: String,
    location_id: String,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    location_name: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    assigned_to: Option<String>,
    date: String,
    start: String,
    end: String,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    status: Option<String>,
}

pub(crate) fn parse_staff<R: Read>(reader: R) -> Result<Vec<StaffMember>, RosterImportError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let mut members = Vec::new();

    for (index, record) in csv_reader.deserialize::<StaffRow>().enumerate() {
        let row = record?;
        let line = index + 2;
        let role = match row.role.as_deref() {
            None => UserRole::Staff,
            Some(raw) => UserRole::parse(raw)
                .ok_or_else(|| invalid(line, format!("unknown role '{raw}'")))?,
        };
        let seniority_level = row
            .seniority
            .as_deref()
            .map(|raw| {
                raw.parse::<u32>()
                    .map_err(|_| invalid(line, format!("seniority '{raw}' is not a whole number")))
            })
            .transpose()?;
        let active = match row.active.as_deref() {
            None => true,
            Some(raw) => parse_flag(raw)
                .ok_or_else(|| invalid(line, format!("active flag '{raw}' is not true/false")))?,
        };

        members.push(StaffMember {
            id: StaffId(row.id),
            organization_id: OrganizationId(row.organization_id),
            name: row.name,
            role,
            phone: row.phone,
            email: row.email,
            seniority_level,
            active,
        });
    }

    Ok(members)
}

pub(crate) fn parse_shifts<R: Read>(reader: R) -> Result<Vec<ShiftRecord>, RosterImportError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let mut records = Vec::new();

    for (index, record) in csv_reader.deserialize::<ShiftRow>().enumerate() {
        let row = record?;
        let line = index + 2;
        let date = parse_date(&row.date)
            .ok_or_else(|| invalid(line, format!("date '{}' is not YYYY-MM-DD", row.date)))?;
        let start_time = parse_time(&row.start)
            .ok_or_else(|| invalid(line, format!("start '{}' is not HH:MM", row.start)))?;
        let end_time = parse_time(&row.end)
            .ok_or_else(|| invalid(line, format!("end '{}' is not HH:MM", row.end)))?;
        let status = match row.status.as_deref() {
            None => ShiftStatus::Scheduled,
            Some(raw) => ShiftStatus::parse(raw)
                .ok_or_else(|| invalid(line, format!("unknown shift status '{raw}'")))?,
        };

        records.push(ShiftRecord {
            shift: Shift {
                id: ShiftId(row.id),
                organization_id: OrganizationId(row.organization_id),
                location_id: LocationId(row.location_id),
                assigned_to: row.assigned_to.map(StaffId),
                date,
                start_time,
                end_time,
                status,
            },
            location_name: row.location_name,
        });
    }

    Ok(records)
}

fn invalid(line: usize, message: String) -> RosterImportError {
    RosterImportError::InvalidRow { line, message }
}

fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt = Option::<String>::deserialize(deserializer)?;
    Ok(opt.filter(|value| !value.trim().is_empty()))
}

fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").ok()
}

fn parse_time(value: &str) -> Option<NaiveTime> {
    let trimmed = value.trim();
    NaiveTime::parse_from_str(trimmed, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(trimmed, "%H:%M:%S"))
        .ok()
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "y" => Some(true),
        "0" | "false" | "no" | "n" => Some(false),
        _ => None,
    }
}
