//! `CallRecord` descriptor built from the listing fields attached to an item.

use std::fmt::Write;

use super::destination::{Destination, RetentionPolicy, fan_out};
use super::{ObjectContainer, xml_escape};
use crate::error::CometError;
use crate::source::listing::{CallDirection, CallRecord};
use crate::types::WorkItem;
use crate::utils::settings::GeneratorSettings;

pub struct CallRecordGenerator {
    destinations: Vec<Destination>,
    policy: RetentionPolicy,
}

fn element(xml: &mut String, name: &str, value: &str) {
    let _ = writeln!(xml, "    <{name}>{}</{name}>", xml_escape(value));
}

/// XML document for one record.
pub fn record_xml(record: &CallRecord) -> String {
    let mut xml = String::new();
    let _ = writeln!(xml, r#"<?xml version="1.0" encoding="UTF-8"?>"#);
    let _ = writeln!(xml, "<CallRecord>");
    element(&mut xml, "WAVEPath", &record.wave_path);
    element(&mut xml, "CallID", &record.call_id.to_string());
    if let Some(id) = record.agent_id {
        element(&mut xml, "AgentId", &id.to_string());
    }
    if let Some(agent) = &record.agent {
        element(&mut xml, "Agent", agent);
    }
    if let Some(ext) = record.extension {
        element(&mut xml, "Extension", &ext.to_string());
    }
    element(
        &mut xml,
        "DateTime",
        &record.date_time.format("%Y-%m-%dT%H:%M:%S").to_string(),
    );
    match &record.direction {
        CallDirection::Inbound { ani, dnis, skill } => {
            element(&mut xml, "Direction", "Inbound");
            if let Some(ani) = ani {
                element(&mut xml, "ANI", ani);
            }
            if let Some(dnis) = dnis {
                element(&mut xml, "DNIS", &dnis.to_string());
            }
            if let Some(skill) = skill {
                element(&mut xml, "Skill", skill);
            }
        }
        CallDirection::Outbound { phone } => {
            element(&mut xml, "Direction", "Outbound");
            if let Some(phone) = phone {
                element(&mut xml, "DialedNumber", &phone.to_string());
            }
        }
    }
    let _ = write!(xml, "</CallRecord>");
    xml
}

impl CallRecordGenerator {
    pub fn new(settings: &GeneratorSettings, destinations: Vec<Destination>) -> Result<Self, CometError> {
        Ok(CallRecordGenerator {
            destinations,
            policy: RetentionPolicy::from_settings(settings)?,
        })
    }

    /// Nothing for items that did not come from a listing.
    pub fn metadata_list(&self, item: &WorkItem) -> Result<Option<Vec<ObjectContainer>>, CometError> {
        let (Some(record), Some(path), Some(base)) = (&item.record, item.file_path(), item.base())
        else {
            return Ok(None);
        };
        let payload = record_xml(record);
        Ok(Some(fan_out(
            &self.destinations,
            &self.policy,
            path,
            base,
            payload.as_bytes(),
        )?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inbound_record_xml() {
        let record: CallRecord = "x&y.wav|2023-06-15T10:20:30|43|9|Al|100|555|800|"
            .parse()
            .unwrap();
        let xml = record_xml(&record);
        assert!(xml.contains("<WAVEPath>x&amp;y.wav</WAVEPath>"));
        assert!(xml.contains("<Direction>Inbound</Direction>"));
        assert!(xml.contains("<DNIS>800</DNIS>"));
        assert!(!xml.contains("<Skill>"));
        assert!(xml.contains("<DateTime>2023-06-15T10:20:30</DateTime>"));
    }

    #[test]
    fn item_without_record_yields_nothing() {
        let generator = CallRecordGenerator::new(&GeneratorSettings::default(), Vec::new()).unwrap();
        let item = WorkItem::file("/in/a.wav", "/in");
        assert!(generator.metadata_list(&item).unwrap().is_none());
    }
}
