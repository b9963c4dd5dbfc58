//! Maps a source path onto a destination namespace URL.

use regex::Regex;
use std::path::{Component, Path};
use url::Url;

use super::{CustomMetadata, HostSpec, ObjectContainer, SystemMetadata};
use crate::error::CometError;
use crate::utils::settings::{DestinationSettings, GeneratorSettings};

#[derive(Clone, Debug)]
pub struct Destination {
    pub root: Url,
    pub credentials: String,
    pub annotation: String,
    pub append_trailing_folder: bool,
    pub delete_metadata_on_empty: bool,
    pub update_custom_metadata: bool,
    pub update_system_metadata: bool,
    pub index: Option<bool>,
    pub hold: Option<bool>,
}

impl Destination {
    /// The root host must be a `namespace.tenant.store-name` triple.
    pub fn from_settings(settings: &DestinationSettings) -> Result<Self, CometError> {
        let root = Url::parse(&settings.root_path)?;
        let host = HostSpec::from_url(&root)?;
        log::debug!(
            "Destination {} (namespace {}, tenant {})",
            root,
            host.namespace,
            host.tenant
        );
        Ok(Destination {
            root,
            credentials: settings.credentials(),
            annotation: settings.annotation.clone(),
            append_trailing_folder: settings.append_trailing_folder,
            delete_metadata_on_empty: settings.delete_metadata_on_empty,
            update_custom_metadata: settings.update_custom_metadata,
            update_system_metadata: settings.update_system_metadata,
            index: settings.index,
            hold: settings.hold,
        })
    }

    /// Root joined with `path` relative to `base`, one percent-encoded segment per component.
    pub fn map_url(&self, path: &Path, base: &Path) -> Result<Url, CometError> {
        let rel = path
            .strip_prefix(base)
            .map_err(|_| CometError::Unmappable(path.display().to_string()))?;
        let mut segments: Vec<String> = Vec::new();
        if self.append_trailing_folder
            && let Some(folder) = base.file_name()
        {
            segments.push(folder.to_string_lossy().into_owned());
        }
        for comp in rel.components() {
            match comp {
                Component::Normal(part) => segments.push(part.to_string_lossy().into_owned()),
                Component::CurDir => {}
                _ => return Err(CometError::Unmappable(path.display().to_string())),
            }
        }
        if segments.is_empty() {
            return Err(CometError::Unmappable(path.display().to_string()));
        }
        let mut url = self.root.clone();
        url.set_query(None);
        url.path_segments_mut()
            .map_err(|_| CometError::Unmappable(self.root.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Descriptor for one item at this destination carrying `payload` under the configured annotation.
    pub fn container(&self, url: Url, payload: Vec<u8>) -> ObjectContainer {
        let mut system = SystemMetadata::new(url, self.credentials.clone());
        system.update_system_metadata = self.update_system_metadata;
        if let Some(on) = self.index {
            system.set_index(on);
        }
        if let Some(on) = self.hold {
            system.set_hold(on);
        }
        let mut custom = CustomMetadata::single(self.annotation.clone(), payload);
        custom.delete_existing_on_empty = self.delete_metadata_on_empty;
        custom.should_update = self.update_custom_metadata;
        ObjectContainer { system, custom }
    }
}

/// Name-driven retention/shred policy applied to every generated descriptor.
#[derive(Clone, Debug, Default)]
pub struct RetentionPolicy {
    shred: Option<Regex>,
    retention: Option<Regex>,
    retention_value: String,
}

fn optional_regex(pattern: &str, key: &str) -> Result<Option<Regex>, CometError> {
    if pattern.is_empty() {
        return Ok(None);
    }
    Regex::new(pattern)
        .map(Some)
        .map_err(|e| CometError::Config(format!("generator.{}: {}", key, e)))
}

impl RetentionPolicy {
    pub fn from_settings(settings: &GeneratorSettings) -> Result<Self, CometError> {
        Ok(RetentionPolicy {
            shred: optional_regex(&settings.shred_pattern, "shred_pattern")?,
            retention: optional_regex(&settings.retention_pattern, "retention_pattern")?,
            retention_value: settings.retention_value.clone(),
        })
    }

    pub fn is_shred_candidate(&self, name: &str) -> bool {
        self.shred.as_ref().is_some_and(|re| re.is_match(name))
    }

    pub fn apply(&self, name: &str, system: &mut SystemMetadata) {
        if self.is_shred_candidate(name) {
            system.set_shred(true);
        }
        if !self.retention_value.is_empty()
            && self.retention.as_ref().is_some_and(|re| re.is_match(name))
        {
            system.set_retention(self.retention_value.clone());
        }
    }
}

/// One descriptor per destination for a filesystem item.
pub fn fan_out(
    destinations: &[Destination],
    policy: &RetentionPolicy,
    path: &Path,
    base: &Path,
    payload: &[u8],
) -> Result<Vec<ObjectContainer>, CometError> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    destinations
        .iter()
        .map(|dest| {
            let mut container = dest.container(dest.map_url(path, base)?, payload.to_vec());
            policy.apply(&name, &mut container.system);
            Ok(container)
        })
        .collect()
}
