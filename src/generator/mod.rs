//! Metadata generators: turn a work item into zero or more write descriptors.

pub mod call_record;
pub mod destination;
pub mod file_info;

use std::borrow::Cow;
use std::collections::BTreeMap;
use url::Url;
use url::form_urlencoded;

use crate::error::CometError;
use crate::types::WorkItem;
use crate::utils::config::DEFAULT_ANNOTATION;
use crate::utils::settings::{GeneratorKind, GeneratorSettings};

pub use call_record::CallRecordGenerator;
pub use destination::Destination;
pub use file_info::FileInfoGenerator;

/// `namespace.tenant.store-name` split out of a destination host.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HostSpec {
    pub namespace: String,
    pub tenant: String,
    pub store: String,
}

impl HostSpec {
    pub fn from_url(url: &Url) -> Result<Self, CometError> {
        let host = url
            .host_str()
            .ok_or_else(|| CometError::InvalidHost(url.to_string()))?;
        let mut labels = host.splitn(3, '.');
        match (labels.next(), labels.next(), labels.next()) {
            (Some(ns), Some(tenant), Some(store))
                if !ns.is_empty() && !tenant.is_empty() && !store.is_empty() =>
            {
                Ok(HostSpec {
                    namespace: ns.to_string(),
                    tenant: tenant.to_string(),
                    store: store.to_string(),
                })
            }
            _ => Err(CometError::InvalidHost(host.to_string())),
        }
    }
}

/// Where and how an object is written, plus the system-metadata query parameters.
#[derive(Clone, Debug)]
pub struct SystemMetadata {
    url: Url,
    credentials: String,
    retention: Option<String>,
    shred: Option<bool>,
    index: Option<bool>,
    hold: Option<bool>,
    pub update_system_metadata: bool,
}

impl SystemMetadata {
    /// Any query already on `url` is dropped; parameters are tracked separately.
    pub fn new(url: Url, credentials: impl Into<String>) -> Self {
        let mut url = url;
        url.set_query(None);
        url.set_fragment(None);
        SystemMetadata {
            url,
            credentials: credentials.into(),
            retention: None,
            shred: None,
            index: None,
            hold: None,
            update_system_metadata: false,
        }
    }

    pub fn credentials(&self) -> &str {
        &self.credentials
    }

    pub fn set_retention(&mut self, value: impl Into<String>) {
        self.retention = Some(value.into());
    }

    pub fn set_shred(&mut self, on: bool) {
        self.shred = Some(on);
    }

    pub fn set_index(&mut self, on: bool) {
        self.index = Some(on);
    }

    pub fn set_hold(&mut self, on: bool) {
        self.hold = Some(on);
    }

    /// `retention=..&shred=..&index=..&hold=..`, only the parameters that were set.
    pub fn query(&self) -> String {
        let mut ser = form_urlencoded::Serializer::new(String::new());
        if let Some(r) = &self.retention {
            ser.append_pair("retention", r);
        }
        for (key, value) in [("shred", self.shred), ("index", self.index), ("hold", self.hold)] {
            if let Some(v) = value {
                ser.append_pair(key, if v { "true" } else { "false" });
            }
        }
        ser.finish()
    }

    pub fn path_only_url(&self) -> &Url {
        &self.url
    }

    /// Object URL carrying the system-metadata query followed by `extra` parameters.
    pub fn url_with(&self, include_sysmeta: bool, extra: &[(&str, &str)]) -> Url {
        let mut url = self.url.clone();
        let sysmeta = if include_sysmeta { self.query() } else { String::new() };
        if sysmeta.is_empty() && extra.is_empty() {
            return url;
        }
        let mut ser = form_urlencoded::Serializer::new(sysmeta);
        for (k, v) in extra {
            ser.append_pair(k, v);
        }
        url.set_query(Some(&ser.finish()));
        url
    }
}

/// Annotation name to payload, plus how existing metadata is treated.
#[derive(Clone, Debug, Default)]
pub struct CustomMetadata {
    annotations: BTreeMap<String, Vec<u8>>,
    pub delete_existing_on_empty: bool,
    pub should_update: bool,
}

impl CustomMetadata {
    pub fn single(annotation: impl Into<String>, payload: Vec<u8>) -> Self {
        let mut md = CustomMetadata::default();
        md.insert(annotation, payload);
        md
    }

    pub fn insert(&mut self, annotation: impl Into<String>, payload: Vec<u8>) {
        self.annotations.insert(annotation.into(), payload);
    }

    pub fn len(&self) -> usize {
        self.annotations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.annotations.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.annotations
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// True unless there is more than one annotation or one not named `default`.
    pub fn default_only(&self) -> bool {
        match self.annotations.len() {
            0 => true,
            1 => self.annotations.contains_key(DEFAULT_ANNOTATION),
            _ => false,
        }
    }
}

/// One write descriptor: a destination object and its metadata.
#[derive(Clone, Debug)]
pub struct ObjectContainer {
    pub system: SystemMetadata,
    pub custom: CustomMetadata,
}

/// Closed set of generator modules.
pub enum MetadataGenerator {
    FileInfo(FileInfoGenerator),
    CallRecord(CallRecordGenerator),
}

impl MetadataGenerator {
    pub fn metadata_list(&self, item: &WorkItem) -> Result<Option<Vec<ObjectContainer>>, CometError> {
        match self {
            MetadataGenerator::FileInfo(g) => g.metadata_list(item),
            MetadataGenerator::CallRecord(g) => g.metadata_list(item),
        }
    }
}

/// Consults the configured generators in order.
pub struct GeneratorChain {
    modules: Vec<MetadataGenerator>,
}

impl GeneratorChain {
    pub fn build(settings: &GeneratorSettings) -> Result<Self, CometError> {
        let destinations = settings
            .destinations
            .iter()
            .map(Destination::from_settings)
            .collect::<Result<Vec<_>, _>>()?;
        let modules = settings
            .modules
            .iter()
            .map(|kind| -> Result<MetadataGenerator, CometError> {
                Ok(match kind {
                    GeneratorKind::FileInfo => MetadataGenerator::FileInfo(
                        FileInfoGenerator::new(settings, destinations.clone())?,
                    ),
                    GeneratorKind::CallRecord => MetadataGenerator::CallRecord(
                        CallRecordGenerator::new(settings, destinations.clone())?,
                    ),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(GeneratorChain { modules })
    }

    pub fn new(modules: Vec<MetadataGenerator>) -> Self {
        GeneratorChain { modules }
    }

    /// First non-empty descriptor list wins.
    pub fn metadata_list(&self, item: &WorkItem) -> Result<Option<Vec<ObjectContainer>>, CometError> {
        for module in &self.modules {
            if let Some(list) = module.metadata_list(item)?
                && !list.is_empty()
            {
                return Ok(Some(list));
            }
        }
        Ok(None)
    }
}

pub(crate) fn xml_escape(s: &str) -> Cow<'_, str> {
    if !s.contains(['<', '>', '&', '"', '\'']) {
        return Cow::Borrowed(s);
    }
    let mut out = String::with_capacity(s.len() + 8);
    for c in s.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    Cow::Owned(out)
}
