//! `SourceFileInfo` descriptor: path, size and timestamps of the source file.

use chrono::{DateTime, Local, SecondsFormat};
use std::fmt::Write;
use std::path::Path;

use super::destination::{Destination, RetentionPolicy, fan_out};
use super::{ObjectContainer, xml_escape};
use crate::error::CometError;
use crate::types::WorkItem;
use crate::utils::settings::GeneratorSettings;

pub struct FileInfoGenerator {
    destinations: Vec<Destination>,
    policy: RetentionPolicy,
    date_format: String,
}

impl FileInfoGenerator {
    pub fn new(settings: &GeneratorSettings, destinations: Vec<Destination>) -> Result<Self, CometError> {
        Ok(FileInfoGenerator {
            destinations,
            policy: RetentionPolicy::from_settings(settings)?,
            date_format: settings.date_format.clone(),
        })
    }

    pub fn metadata_list(&self, item: &WorkItem) -> Result<Option<Vec<ObjectContainer>>, CometError> {
        let (Some(path), Some(base)) = (item.file_path(), item.base()) else {
            return Ok(None);
        };
        let payload = self.build_xml(path)?;
        Ok(Some(fan_out(
            &self.destinations,
            &self.policy,
            path,
            base,
            payload.as_bytes(),
        )?))
    }

    fn build_xml(&self, path: &Path) -> Result<String, CometError> {
        let meta = std::fs::metadata(path)?;
        let modified: DateTime<Local> = meta.modified()?.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let shred = self.policy.is_shred_candidate(&name);
        let mut written = String::new();
        write!(written, "{}", Local::now().format(&self.date_format)).map_err(|_| {
            CometError::Config(format!("invalid date format {:?}", self.date_format))
        })?;

        let mut xml = String::new();
        let _ = writeln!(xml, r#"<?xml version="1.0" encoding="UTF-8"?>"#);
        let _ = writeln!(xml, "<SourceFileInfo>");
        let _ = writeln!(
            xml,
            "    <Path>{}</Path>",
            xml_escape(&path.display().to_string())
        );
        let _ = writeln!(xml, "    <Size>{}</Size>", meta.len());
        let _ = writeln!(
            xml,
            r#"    <ModificationDate EpochTime="{}" ISO8601Time="{}"/>"#,
            modified.timestamp_millis(),
            xml_escape(&modified.to_rfc3339_opts(SecondsFormat::Secs, false))
        );
        let _ = writeln!(
            xml,
            "    <MetaDataWriteTime>{}</MetaDataWriteTime>",
            xml_escape(&written)
        );
        let _ = writeln!(xml, "    <ShreddingCandidate>{}</ShreddingCandidate>", shred);
        let _ = write!(xml, "</SourceFileInfo>");
        Ok(xml)
    }
}
