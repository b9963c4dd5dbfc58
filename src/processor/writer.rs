//! Writes items and their metadata to the remote store.
//!
//! Per descriptor: probe existence, then write the object and metadata (Absent), only the metadata
//! (ObjectOnly), or nothing unless asked to update (WithMetadata). Store rejections stay isolated to
//! their descriptor; a local read failure aborts the item.

use std::sync::Arc;
use url::Url;

use crate::error::CometError;
use crate::generator::{GeneratorChain, ObjectContainer};
use crate::processor::hash::validate_hash;
use crate::processor::store::{Auth, Payload, RemoteStore, StoreResponse};
use crate::types::{WorkItem, WriteStatus};
use crate::utils::config::{DEFAULT_ANNOTATION, StoreProtocol};

/// What the store at the destination accepts, derived from its reported version.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub version: Option<(u32, u32)>,
    pub whole_object: bool,
    pub annotations: bool,
}

impl Capabilities {
    pub fn from_version(version: Option<(u32, u32)>) -> Self {
        Capabilities {
            version,
            whole_object: version.is_some_and(|v| v >= StoreProtocol::WHOLE_OBJECT_MIN_VERSION),
            annotations: version.is_some_and(|v| v >= StoreProtocol::ANNOTATIONS_MIN_VERSION),
        }
    }

    pub fn auth(&self, credentials: &str) -> Auth {
        if self.annotations {
            Auth::Authorization(credentials.to_string())
        } else {
            Auth::LegacyCookie(credentials.to_string())
        }
    }
}

/// `major.minor[.patch...]` to `(major, minor)`.
pub fn parse_version(value: &str) -> Result<(u32, u32), CometError> {
    let malformed = || CometError::MalformedHeader {
        header: StoreProtocol::VERSION_HEADER,
        value: value.to_string(),
    };
    let mut parts = value.trim().split('.');
    let major = parts
        .next()
        .and_then(|p| p.parse().ok())
        .ok_or_else(malformed)?;
    let minor = match parts.next() {
        Some(p) => p.parse().map_err(|_| malformed())?,
        None => 0,
    };
    Ok((major, minor))
}

/// HEAD `{scheme}://{host}/rest` with the legacy cookie and read the software version.
pub fn probe_capabilities(
    store: &dyn RemoteStore,
    root: &Url,
    credentials: &str,
) -> Result<Capabilities, CometError> {
    let mut url = root.clone();
    url.set_path(StoreProtocol::GATEWAY);
    url.set_query(None);
    let version = match store.head(&url, &Auth::LegacyCookie(credentials.to_string())) {
        Ok(resp) if resp.status == 404 => None,
        Ok(resp) => match resp.header(StoreProtocol::VERSION_HEADER) {
            Some(v) => Some(parse_version(v)?),
            None => None,
        },
        Err(e) => {
            log::warn!("Version probe of {} failed: {}", url, e);
            None
        }
    };
    let caps = Capabilities::from_version(version);
    match caps.version {
        Some((major, minor)) => log::info!(
            "Store {} reports version {}.{} (whole-object: {}, annotations: {})",
            url.host_str().unwrap_or(""),
            major,
            minor,
            caps.whole_object,
            caps.annotations
        ),
        None => log::info!(
            "Store {} version unknown; using basic protocol",
            url.host_str().unwrap_or("")
        ),
    }
    Ok(caps)
}

/// Existence of the target object.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ObjectState {
    Absent,
    ObjectOnly,
    /// Object with custom metadata; annotation names when the store reports them.
    WithMetadata(Vec<String>),
}

pub struct StoreWriter {
    store: Arc<dyn RemoteStore>,
    generators: GeneratorChain,
    caps: Capabilities,
    validate_hash: bool,
}

fn checked(
    resp: Result<StoreResponse, CometError>,
    method: &'static str,
) -> Result<StoreResponse, CometError> {
    let resp = resp?;
    resp.ensure_success(method)?;
    Ok(resp)
}

impl StoreWriter {
    pub fn new(
        store: Arc<dyn RemoteStore>,
        generators: GeneratorChain,
        caps: Capabilities,
        validate_hash: bool,
    ) -> Self {
        StoreWriter {
            store,
            generators,
            caps,
            validate_hash,
        }
    }

    pub fn capabilities(&self) -> Capabilities {
        self.caps
    }

    pub fn process(&self, item: &mut WorkItem) -> Result<(), CometError> {
        item.status.object = WriteStatus::NotAttempted;
        item.status.metadata = WriteStatus::NotAttempted;

        match item.exists() {
            Ok(true) => {}
            Ok(false) => {
                log::warn!("Item {} no longer exists; skipping", item.name());
                return Ok(());
            }
            Err(e) => {
                item.status.object = WriteStatus::Failure;
                return Err(e);
            }
        }

        let list = match self.generators.metadata_list(item) {
            Ok(Some(list)) => list,
            Ok(None) => {
                log::debug!("No metadata generated for {}; skipping", item.name());
                return Ok(());
            }
            Err(e) => {
                item.status.object = WriteStatus::Failure;
                return Err(e);
            }
        };

        for container in &list {
            match self.write_container(item, container) {
                Ok(()) => {}
                Err(e) if e.is_local_io() => {
                    item.status.object = WriteStatus::Failure;
                    return Err(e);
                }
                Err(e) => {
                    log::warn!(
                        "Write of {} to {} failed: {}",
                        item.name(),
                        container.system.path_only_url(),
                        e
                    );
                    item.status.set_error(e);
                }
            }
        }
        Ok(())
    }

    fn write_container(&self, item: &mut WorkItem, c: &ObjectContainer) -> Result<(), CometError> {
        if !self.caps.annotations && !c.custom.default_only() {
            item.status.object = WriteStatus::Failure;
            return Err(CometError::AnnotationsUnsupported);
        }
        let auth = self.caps.auth(c.system.credentials());

        let state = match self.object_state(c, &auth) {
            Ok(s) => s,
            Err(e) => {
                item.status.object = WriteStatus::Failure;
                return Err(e);
            }
        };
        log::debug!("{} is {:?}", c.system.path_only_url(), state);

        match state {
            ObjectState::Absent => self.write_new(item, c, &auth),
            ObjectState::ObjectOnly => {
                self.write_custom_metadata(item, c, &auth)?;
                self.update_system_metadata(item, c, &auth)
            }
            ObjectState::WithMetadata(_) => {
                if c.custom.should_update {
                    self.write_custom_metadata(item, c, &auth)?;
                }
                self.update_system_metadata(item, c, &auth)
            }
        }
    }

    fn object_state(&self, c: &ObjectContainer, auth: &Auth) -> Result<ObjectState, CometError> {
        let resp = self.store.head(c.system.path_only_url(), auth)?;
        if resp.status == 404 {
            return Ok(ObjectState::Absent);
        }
        resp.ensure_success("HEAD")?;
        let has_metadata = resp
            .header(StoreProtocol::CUSTOM_METADATA_HEADER)
            .is_some_and(|v| v.trim().eq_ignore_ascii_case("true"));
        if !has_metadata {
            return Ok(ObjectState::ObjectOnly);
        }
        let names = if self.caps.annotations {
            match resp.header(StoreProtocol::ANNOTATIONS_HEADER) {
                Some(list) => list
                    .split(';')
                    .map(str::trim)
                    .filter(|n| !n.is_empty())
                    .map(String::from)
                    .collect(),
                None => vec![DEFAULT_ANNOTATION.to_string()],
            }
        } else {
            Vec::new()
        };
        Ok(ObjectState::WithMetadata(names))
    }

    fn annotation_params<'a>(&self, kind: &'a str, name: &'a str) -> Vec<(&'a str, &'a str)> {
        let mut params = vec![("type", kind)];
        if self.caps.annotations {
            params.push(("annotation", name));
        }
        params
    }

    fn write_new(&self, item: &mut WorkItem, c: &ObjectContainer, auth: &Auth) -> Result<(), CometError> {
        let single = match c.custom.iter().collect::<Vec<_>>().as_slice() {
            [(name, payload)] if !payload.is_empty() => Some((name.to_string(), payload.to_vec())),
            _ => None,
        };

        if self.caps.whole_object
            && let Some((name, payload)) = single
        {
            let len = item.content_len()?;
            let content = item.open_content()?;
            let url = c
                .system
                .url_with(true, &self.annotation_params("whole-object", &name));
            let sent = self.store.put(
                &url,
                auth,
                Payload::whole_object(content, len, payload),
                &[(StoreProtocol::SIZE_HEADER, len.to_string())],
            );
            let resp = match checked(sent, "PUT") {
                Ok(r) => r,
                Err(e) => {
                    item.status.object = WriteStatus::Failure;
                    item.status.metadata = WriteStatus::Failure;
                    return Err(e);
                }
            };
            item.status.object = WriteStatus::Success;
            item.status.metadata = WriteStatus::Success;
            log::debug!("Whole-object write of {} to {}", item.name(), url);
            return self.check_hash(item, &resp);
        }

        let len = item.content_len()?;
        let content = item.open_content()?;
        let url = c.system.url_with(true, &[]);
        let sent = self.store.put(
            &url,
            auth,
            Payload::Stream {
                reader: content,
                len,
            },
            &[],
        );
        let resp = match checked(sent, "PUT") {
            Ok(r) => r,
            Err(e) => {
                item.status.object = WriteStatus::Failure;
                return Err(e);
            }
        };
        item.status.object = WriteStatus::Success;
        log::debug!("Wrote {} to {}", item.name(), url);
        self.check_hash(item, &resp)?;
        self.write_custom_metadata(item, c, auth)
    }

    fn check_hash(&self, item: &mut WorkItem, resp: &StoreResponse) -> Result<(), CometError> {
        if !self.validate_hash {
            return Ok(());
        }
        let checked = validate_hash(resp, item);
        if checked.is_err() {
            item.status.object = WriteStatus::Failure;
        }
        checked
    }

    fn write_custom_metadata(
        &self,
        item: &mut WorkItem,
        c: &ObjectContainer,
        auth: &Auth,
    ) -> Result<(), CometError> {
        let mut wrote = false;
        for (name, payload) in c.custom.iter() {
            let url = c
                .system
                .url_with(false, &self.annotation_params("custom-metadata", name));
            if payload.is_empty() {
                if c.custom.delete_existing_on_empty {
                    match checked(self.store.delete(&url, auth), "DELETE") {
                        Ok(_) => log::debug!("Deleted custom metadata {}", url),
                        Err(e) => log::warn!("Delete of custom metadata {} failed: {}", url, e),
                    }
                }
                continue;
            }
            let sent = self
                .store
                .put(&url, auth, Payload::Bytes(payload.to_vec()), &[]);
            match checked(sent, "PUT") {
                Ok(_) => {
                    item.status.metadata = WriteStatus::PartialSuccess;
                    wrote = true;
                }
                Err(e) => {
                    if item.status.metadata != WriteStatus::PartialSuccess {
                        item.status.metadata = WriteStatus::Failure;
                    }
                    return Err(e);
                }
            }
        }
        if wrote {
            item.status.metadata = WriteStatus::Success;
        }
        Ok(())
    }

    fn update_system_metadata(
        &self,
        item: &mut WorkItem,
        c: &ObjectContainer,
        auth: &Auth,
    ) -> Result<(), CometError> {
        if !c.system.update_system_metadata || c.system.query().is_empty() {
            return Ok(());
        }
        let url = c.system.url_with(true, &[]);
        match checked(self.store.post(&url, auth, Payload::Bytes(Vec::new())), "POST") {
            Ok(_) => {
                item.status.object = WriteStatus::Success;
                log::debug!("Updated system metadata {}", url);
                Ok(())
            }
            Err(e) => {
                item.status.object = WriteStatus::Failure;
                Err(e)
            }
        }
    }
}
