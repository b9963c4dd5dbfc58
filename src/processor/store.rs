//! Remote object store seam: the request surface the writer needs, plus the reqwest implementation.

use reqwest::blocking::{Body, Client, RequestBuilder};
use reqwest::header::{AUTHORIZATION, COOKIE};
use std::collections::BTreeMap;
use std::io::{Cursor, Read};
use std::time::Duration;
use url::Url;

use crate::error::CometError;
use crate::utils::config::StoreProtocol;
use crate::utils::settings::HttpSettings;

/// How credentials are presented to the store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Auth {
    /// `Cookie: hcp-ns-auth=<creds>`; understood by every store version.
    LegacyCookie(String),
    /// `Authorization: HCP <creds>`; store 6.0 and later.
    Authorization(String),
}

impl Auth {
    fn apply(&self, req: RequestBuilder) -> RequestBuilder {
        match self {
            Auth::LegacyCookie(creds) => req.header(
                COOKIE,
                format!("{}={}", StoreProtocol::LEGACY_AUTH_COOKIE, creds),
            ),
            Auth::Authorization(creds) => {
                req.header(AUTHORIZATION, format!("{} {}", StoreProtocol::AUTH_SCHEME, creds))
            }
        }
    }
}

/// Status line and headers of a store reply. Header names are kept lowercase.
#[derive(Clone, Debug, Default)]
pub struct StoreResponse {
    pub status: u16,
    pub reason: String,
    pub headers: BTreeMap<String, String>,
}

impl StoreResponse {
    pub fn new(status: u16) -> Self {
        StoreResponse {
            status,
            reason: String::new(),
            headers: BTreeMap::new(),
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn ensure_success(&self, method: &'static str) -> Result<(), CometError> {
        if self.is_success() {
            Ok(())
        } else {
            Err(CometError::Store {
                method,
                status: self.status,
                reason: self.reason.clone(),
            })
        }
    }
}

/// Request body.
pub enum Payload {
    Bytes(Vec<u8>),
    /// Streamed body of known length (source content, optionally chained with metadata).
    Stream {
        reader: Box<dyn Read + Send>,
        len: u64,
    },
}

impl Payload {
    /// Content followed by metadata, as sent in a whole-object PUT.
    pub fn whole_object(content: Box<dyn Read + Send>, content_len: u64, metadata: Vec<u8>) -> Self {
        let len = content_len + metadata.len() as u64;
        Payload::Stream {
            reader: Box::new(content.chain(Cursor::new(metadata))),
            len,
        }
    }

    pub fn len(&self) -> u64 {
        match self {
            Payload::Bytes(b) => b.len() as u64,
            Payload::Stream { len, .. } => *len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drain the body into memory.
    pub fn into_bytes(self) -> std::io::Result<Vec<u8>> {
        match self {
            Payload::Bytes(b) => Ok(b),
            Payload::Stream { mut reader, len } => {
                let mut buf = Vec::with_capacity(len as usize);
                reader.read_to_end(&mut buf)?;
                Ok(buf)
            }
        }
    }
}

impl From<Payload> for Body {
    fn from(p: Payload) -> Body {
        match p {
            Payload::Bytes(b) => Body::from(b),
            Payload::Stream { reader, len } => Body::sized(reader, len),
        }
    }
}

/// Operations the writer performs against the store. Implementations must be shareable across
/// processor threads.
pub trait RemoteStore: Send + Sync {
    fn head(&self, url: &Url, auth: &Auth) -> Result<StoreResponse, CometError>;

    fn put(
        &self,
        url: &Url,
        auth: &Auth,
        body: Payload,
        headers: &[(&'static str, String)],
    ) -> Result<StoreResponse, CometError>;

    fn delete(&self, url: &Url, auth: &Auth) -> Result<StoreResponse, CometError>;

    fn post(&self, url: &Url, auth: &Auth, body: Payload) -> Result<StoreResponse, CometError>;
}

/// Blocking HTTP store. One client (and connection pool) is shared by every processor thread.
pub struct HttpStore {
    client: Client,
    dump_headers: bool,
}

impl HttpStore {
    pub fn new(settings: &HttpSettings) -> Result<Self, CometError> {
        let mut builder = Client::builder();
        if let Some(secs) = settings.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        if let Some(max) = settings.max_connections_per_route {
            builder = builder.pool_max_idle_per_host(max);
        }
        Ok(HttpStore {
            client: builder.build()?,
            dump_headers: settings.dump_headers,
        })
    }

    fn send(
        &self,
        method: &'static str,
        url: &Url,
        auth: &Auth,
        req: RequestBuilder,
    ) -> Result<StoreResponse, CometError> {
        let resp = auth.apply(req).send()?;
        let status = resp.status();
        let headers: BTreeMap<String, String> = resp
            .headers()
            .iter()
            .filter_map(|(k, v)| {
                v.to_str()
                    .ok()
                    .map(|v| (k.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();
        if self.dump_headers {
            log::debug!("{} {} -> {}", method, url, status);
            for (k, v) in &headers {
                log::debug!("    {}: {}", k, v);
            }
        }
        Ok(StoreResponse {
            status: status.as_u16(),
            reason: status.canonical_reason().unwrap_or("").to_string(),
            headers,
        })
    }
}

impl RemoteStore for HttpStore {
    fn head(&self, url: &Url, auth: &Auth) -> Result<StoreResponse, CometError> {
        self.send("HEAD", url, auth, self.client.head(url.clone()))
    }

    fn put(
        &self,
        url: &Url,
        auth: &Auth,
        body: Payload,
        headers: &[(&'static str, String)],
    ) -> Result<StoreResponse, CometError> {
        let mut req = self.client.put(url.clone()).body(Body::from(body));
        for (name, value) in headers {
            req = req.header(*name, value.as_str());
        }
        self.send("PUT", url, auth, req)
    }

    fn delete(&self, url: &Url, auth: &Auth) -> Result<StoreResponse, CometError> {
        self.send("DELETE", url, auth, self.client.delete(url.clone()))
    }

    fn post(&self, url: &Url, auth: &Auth, body: Payload) -> Result<StoreResponse, CometError> {
        let req = self.client.post(url.clone()).body(Body::from(body));
        self.send("POST", url, auth, req)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_lookup_ignores_case() {
        let resp = StoreResponse::new(200).with_header("X-HCP-Hash", "SHA-256 AB");
        assert_eq!(resp.header("x-hcp-hash"), Some("SHA-256 AB"));
        assert_eq!(resp.header(StoreProtocol::HASH_HEADER), Some("SHA-256 AB"));
    }

    #[test]
    fn non_2xx_is_store_error() {
        let mut resp = StoreResponse::new(409);
        resp.reason = "Conflict".into();
        match resp.ensure_success("PUT") {
            Err(CometError::Store {
                method, status, ..
            }) => assert_eq!((method, status), ("PUT", 409)),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn whole_object_payload_appends_metadata() {
        let content: Box<dyn Read + Send> = Box::new(Cursor::new(b"wav".to_vec()));
        let p = Payload::whole_object(content, 3, b"<x/>".to_vec());
        assert_eq!(p.len(), 7);
        assert_eq!(p.into_bytes().unwrap(), b"wav<x/>".to_vec());
    }
}
