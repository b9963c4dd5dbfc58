//! Listing-file source: one pipe-delimited call record per line, each naming a file under the base.

use chrono::NaiveDateTime;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::CometError;
use crate::types::WorkItem;
use crate::utils::patterns::ItemFilter;
use crate::utils::settings::ScannerSettings;

const FIELD_SEPARATOR: char = '|';
pub const LISTING_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CallDirection {
    Outbound {
        phone: Option<u64>,
    },
    Inbound {
        ani: Option<String>,
        dnis: Option<u32>,
        skill: Option<String>,
    },
}

/// One listing line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallRecord {
    pub wave_path: String,
    pub date_time: NaiveDateTime,
    pub call_id: u32,
    pub agent_id: Option<u32>,
    pub agent: Option<String>,
    pub extension: Option<u32>,
    pub direction: CallDirection,
}

fn optional<T: FromStr>(field: &str, name: &str) -> Result<Option<T>, CometError> {
    if field.is_empty() {
        return Ok(None);
    }
    field
        .parse()
        .map(Some)
        .map_err(|_| CometError::Listing(format!("{} is not a number: {:?}", name, field)))
}

fn optional_text(field: &str) -> Option<String> {
    (!field.is_empty()).then(|| field.to_string())
}

impl FromStr for CallRecord {
    type Err = CometError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = line.splitn(10, FIELD_SEPARATOR).collect();
        if parts.len() != 7 && parts.len() != 9 {
            return Err(CometError::Listing(format!(
                "expected 7 or 9 fields, found {}",
                parts.len()
            )));
        }
        let date_time = NaiveDateTime::parse_from_str(parts[1], LISTING_DATE_FORMAT)
            .map_err(|e| CometError::Listing(format!("DateTime {:?}: {}", parts[1], e)))?;
        let call_id = parts[2]
            .parse()
            .map_err(|_| CometError::Listing(format!("CallID is not a number: {:?}", parts[2])))?;
        let direction = if parts.len() == 7 {
            CallDirection::Outbound {
                phone: optional(parts[6], "Phone")?,
            }
        } else {
            CallDirection::Inbound {
                ani: optional_text(parts[6]),
                dnis: optional(parts[7], "DNIS")?,
                skill: optional_text(parts[8]),
            }
        };
        Ok(CallRecord {
            wave_path: parts[0].to_string(),
            date_time,
            call_id,
            agent_id: optional(parts[3], "AgentId")?,
            agent: optional_text(parts[4]),
            extension: optional(parts[5], "Extension")?,
            direction,
        })
    }
}

/// Streams work items out of the configured listing file.
pub struct ListingReader {
    listing_file: PathBuf,
    filter: ItemFilter,
    base: PathBuf,
    trigger_name: Option<String>,
    reader: Option<BufReader<File>>,
    buf: Vec<u8>,
}

impl ListingReader {
    pub fn new(listing_file: impl Into<PathBuf>, settings: &ScannerSettings) -> Self {
        ListingReader {
            listing_file: listing_file.into(),
            filter: ItemFilter::new(&settings.item_inclusion, &settings.item_exclusion),
            base: PathBuf::new(),
            trigger_name: None,
            reader: None,
            buf: Vec::new(),
        }
    }

    /// Open the listing for a new pass rooted at `base`. Lines that sort before the trigger's file name are skipped.
    pub fn initialize(&mut self, base: &Path, start_trigger: Option<&Path>) -> Result<(), CometError> {
        let file = File::open(&self.listing_file).map_err(|e| {
            CometError::Listing(format!("cannot open {}: {}", self.listing_file.display(), e))
        })?;
        self.base = base.to_path_buf();
        self.trigger_name = start_trigger
            .and_then(|t| t.file_name())
            .map(|n| n.to_string_lossy().into_owned());
        self.reader = Some(BufReader::new(file));
        log::debug!(
            "Reading listing {} for {}",
            self.listing_file.display(),
            base.display()
        );
        Ok(())
    }

    pub fn next_item(&mut self) -> Result<Option<WorkItem>, CometError> {
        loop {
            let Some(reader) = self.reader.as_mut() else {
                return Ok(None);
            };
            self.buf.clear();
            match reader.read_until(b'\n', &mut self.buf) {
                Ok(0) => {
                    self.reader = None;
                    log::debug!("End of listing {}", self.listing_file.display());
                    return Ok(None);
                }
                Ok(_) => {}
                Err(e) => {
                    self.reader = None;
                    return Err(e.into());
                }
            }
            // Undecodable bytes become U+FFFD; the line is kept.
            let line = String::from_utf8_lossy(&self.buf);
            let line = line.trim_end_matches(['\n', '\r']);
            if line.trim().is_empty() {
                continue;
            }
            let record: CallRecord = match line.parse() {
                Ok(r) => r,
                Err(e) => {
                    log::warn!("Skipping listing line {:?}: {}", line, e);
                    continue;
                }
            };
            if let Some(trigger) = &self.trigger_name {
                if record.wave_path.as_str() < trigger.as_str() {
                    continue;
                }
                log::info!("Start trigger {} reached in listing", trigger);
                self.trigger_name = None;
            }
            let path = self.base.join(&record.wave_path);
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            if !self.filter.accepts(&name) {
                log::debug!("Filtered out {}", path.display());
                continue;
            }
            if !path.is_file() {
                log::warn!("Listed file {} is missing or not a regular file", path.display());
                continue;
            }
            return Ok(Some(WorkItem::file(path, &self.base).with_record(record)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_outbound_and_inbound() {
        let out: CallRecord = "a.wav|2023-06-15T10:20:30|42|7|Jo|1234|5551234567"
            .parse()
            .unwrap();
        assert_eq!(out.call_id, 42);
        assert_eq!(out.extension, Some(1234));
        assert_eq!(
            out.direction,
            CallDirection::Outbound {
                phone: Some(5551234567)
            }
        );

        let inbound: CallRecord = "b.wav|2023-06-15T10:20:30|43||||5550000|800|Sales"
            .parse()
            .unwrap();
        assert_eq!(inbound.agent_id, None);
        assert_eq!(inbound.agent, None);
        assert_eq!(
            inbound.direction,
            CallDirection::Inbound {
                ani: Some("5550000".into()),
                dnis: Some(800),
                skill: Some("Sales".into())
            }
        );
    }

    #[test]
    fn rejects_bad_lines() {
        assert!("a.wav|2023-06-15T10:20:30|1".parse::<CallRecord>().is_err());
        assert!("a.wav|15/06/2023|1||||".parse::<CallRecord>().is_err());
        assert!("a.wav|2023-06-15T10:20:30|x||||".parse::<CallRecord>().is_err());
    }
}
