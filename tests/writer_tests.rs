use comet::WorkItem;
use comet::WriteStatus;
use comet::generator::GeneratorChain;
use comet::processor::hash::{HashAlgorithm, compute_hash};
use comet::processor::{
    Auth, Capabilities, ItemProcessor, Payload, RemoteStore, StoreResponse, StoreWriter,
    probe_capabilities,
};
use comet::utils::{CometConfig, DestinationSettings, GeneratorSettings, ProcessorKind};
use comet::CometError;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};
use url::Url;

const ROOT: &str = "https://ns1.tenant.hcp.local/rest/in";

#[derive(Clone, Debug)]
struct Request {
    method: &'static str,
    url: Url,
    auth: Auth,
    body: Vec<u8>,
    headers: Vec<(String, String)>,
}

impl Request {
    fn query(&self) -> &str {
        self.url.query().unwrap_or("")
    }
}

/// Scripted store double: queued replies per method, every request recorded.
#[derive(Default)]
struct FakeStore {
    heads: Mutex<VecDeque<StoreResponse>>,
    puts: Mutex<VecDeque<StoreResponse>>,
    requests: Mutex<Vec<Request>>,
}

impl FakeStore {
    fn script_head(&self, resp: StoreResponse) {
        self.heads.lock().unwrap().push_back(resp);
    }

    fn script_put(&self, resp: StoreResponse) {
        self.puts.lock().unwrap().push_back(resp);
    }

    fn take_requests(&self) -> Vec<Request> {
        std::mem::take(&mut *self.requests.lock().unwrap())
    }

    fn record(
        &self,
        method: &'static str,
        url: &Url,
        auth: &Auth,
        body: Payload,
        headers: &[(&'static str, String)],
    ) {
        self.requests.lock().unwrap().push(Request {
            method,
            url: url.clone(),
            auth: auth.clone(),
            body: body.into_bytes().unwrap(),
            headers: headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        });
    }
}

impl RemoteStore for FakeStore {
    fn head(&self, url: &Url, auth: &Auth) -> Result<StoreResponse, CometError> {
        self.record("HEAD", url, auth, Payload::Bytes(Vec::new()), &[]);
        Ok(self
            .heads
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| StoreResponse::new(404)))
    }

    fn put(
        &self,
        url: &Url,
        auth: &Auth,
        body: Payload,
        headers: &[(&'static str, String)],
    ) -> Result<StoreResponse, CometError> {
        self.record("PUT", url, auth, body, headers);
        Ok(self
            .puts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| StoreResponse::new(201)))
    }

    fn delete(&self, url: &Url, auth: &Auth) -> Result<StoreResponse, CometError> {
        self.record("DELETE", url, auth, Payload::Bytes(Vec::new()), &[]);
        Ok(StoreResponse::new(200))
    }

    fn post(&self, url: &Url, auth: &Auth, body: Payload) -> Result<StoreResponse, CometError> {
        self.record("POST", url, auth, body, &[]);
        Ok(StoreResponse::new(200))
    }
}

fn destination() -> DestinationSettings {
    DestinationSettings {
        root_path: ROOT.to_string(),
        user: "ingest".to_string(),
        password: "5f4dcc3b5aa765d61d8327deb882cf99".to_string(),
        password_encoded: true,
        ..Default::default()
    }
}

fn generator_settings(dest: DestinationSettings) -> GeneratorSettings {
    GeneratorSettings {
        destinations: vec![dest],
        ..Default::default()
    }
}

fn writer(
    store: &Arc<FakeStore>,
    settings: &GeneratorSettings,
    version: (u32, u32),
    validate_hash: bool,
) -> StoreWriter {
    StoreWriter::new(
        Arc::clone(store) as Arc<dyn RemoteStore>,
        GeneratorChain::build(settings).unwrap(),
        Capabilities::from_version(Some(version)),
        validate_hash,
    )
}

fn source_file(dir: &Path, name: &str, content: &[u8]) -> WorkItem {
    let path = dir.join(name);
    std::fs::write(&path, content).unwrap();
    WorkItem::file(path, dir)
}

fn methods(requests: &[Request]) -> Vec<&'static str> {
    requests.iter().map(|r| r.method).collect()
}

fn with_metadata() -> StoreResponse {
    StoreResponse::new(200).with_header("X-HCP-Custom-Metadata", "true")
}

// --- existence branches ---

#[test]
fn test_existence_branches_across_three_runs() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FakeStore::default());
    let w = writer(&store, &generator_settings(destination()), (7, 0), false);

    // absent: one combined write
    store.script_head(StoreResponse::new(404));
    let mut item = source_file(dir.path(), "a.wav", b"RIFF");
    w.process(&mut item).unwrap();
    let reqs = store.take_requests();
    assert_eq!(methods(&reqs), vec!["HEAD", "PUT"]);
    assert_eq!(reqs[0].url.as_str(), format!("{}/a.wav", ROOT));
    assert_eq!(reqs[1].query(), "type=whole-object&annotation=default");
    assert!(reqs[1].body.starts_with(b"RIFF"));
    assert!(reqs[1].body.ends_with(b"</SourceFileInfo>"));
    assert!(
        reqs[1]
            .headers
            .contains(&("X-HCP-Size".to_string(), "4".to_string()))
    );
    assert_eq!(item.status.pair(), (WriteStatus::Success, WriteStatus::Success));

    // object only: metadata write, no system metadata update configured
    store.script_head(StoreResponse::new(200));
    let mut item = source_file(dir.path(), "a.wav", b"RIFF");
    w.process(&mut item).unwrap();
    let reqs = store.take_requests();
    assert_eq!(methods(&reqs), vec!["HEAD", "PUT"]);
    assert_eq!(reqs[1].query(), "type=custom-metadata&annotation=default");
    assert!(reqs[1].body.starts_with(b"<?xml"));
    assert_eq!(
        item.status.pair(),
        (WriteStatus::NotAttempted, WriteStatus::Success)
    );

    // object with metadata and no update flags: nothing written
    store.script_head(with_metadata());
    let mut item = source_file(dir.path(), "a.wav", b"RIFF");
    w.process(&mut item).unwrap();
    assert_eq!(methods(&store.take_requests()), vec!["HEAD"]);
    assert_eq!(
        item.status.pair(),
        (WriteStatus::NotAttempted, WriteStatus::NotAttempted)
    );
}

#[test]
fn test_object_only_updates_system_metadata_when_configured() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FakeStore::default());
    let mut settings = generator_settings(DestinationSettings {
        update_system_metadata: true,
        ..destination()
    });
    settings.retention_pattern = r"\.wav$".to_string();
    settings.retention_value = "A+7y".to_string();
    let w = writer(&store, &settings, (7, 0), false);

    store.script_head(StoreResponse::new(200));
    let mut item = source_file(dir.path(), "keep.wav", b"RIFF");
    w.process(&mut item).unwrap();
    let reqs = store.take_requests();
    assert_eq!(methods(&reqs), vec!["HEAD", "PUT", "POST"]);
    assert_eq!(reqs[1].query(), "type=custom-metadata&annotation=default");
    assert_eq!(reqs[2].query(), "retention=A%2B7y");
    assert!(reqs[2].body.is_empty());
    assert_eq!(
        item.status.pair(),
        (WriteStatus::Success, WriteStatus::Success)
    );
}

#[test]
fn test_system_metadata_update_on_existing_metadata_marks_object_success() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FakeStore::default());
    let mut settings = generator_settings(DestinationSettings {
        update_system_metadata: true,
        ..destination()
    });
    settings.retention_pattern = r"\.wav$".to_string();
    settings.retention_value = "A+7y".to_string();
    let w = writer(&store, &settings, (7, 0), false);

    store.script_head(with_metadata());
    let mut item = source_file(dir.path(), "keep.wav", b"RIFF");
    w.process(&mut item).unwrap();
    assert_eq!(methods(&store.take_requests()), vec!["HEAD", "POST"]);
    assert_eq!(
        item.status.pair(),
        (WriteStatus::Success, WriteStatus::NotAttempted)
    );
}

#[test]
fn test_existing_metadata_rewritten_when_update_requested() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FakeStore::default());
    let settings = generator_settings(DestinationSettings {
        update_custom_metadata: true,
        ..destination()
    });
    let w = writer(&store, &settings, (7, 0), false);
    store.script_head(with_metadata().with_header("X-HCP-CustomMetadataAnnotations", "default;other"));
    let mut item = source_file(dir.path(), "a.wav", b"RIFF");
    w.process(&mut item).unwrap();
    assert_eq!(methods(&store.take_requests()), vec!["HEAD", "PUT"]);
    assert_eq!(item.status.metadata, WriteStatus::Success);
}

// --- status independence ---

#[test]
fn test_metadata_failure_leaves_object_success() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FakeStore::default());
    let w = writer(&store, &generator_settings(destination()), (4, 0), false);

    store.script_head(StoreResponse::new(404));
    store.script_put(StoreResponse::new(201));
    store.script_put(StoreResponse::new(400));

    let (tx, rx) = crossbeam_channel::unbounded();
    let mut item = source_file(dir.path(), "a.wav", b"RIFF");
    item.set_completion(tx);
    w.process(&mut item).unwrap();

    let reqs = store.take_requests();
    assert_eq!(methods(&reqs), vec!["HEAD", "PUT", "PUT"]);
    assert_eq!(reqs[1].query(), "");
    assert_eq!(reqs[1].body, b"RIFF".to_vec());
    assert_eq!(reqs[2].query(), "type=custom-metadata");
    assert!(matches!(reqs[0].auth, Auth::LegacyCookie(_)));
    assert_eq!(item.status.pair(), (WriteStatus::Success, WriteStatus::Failure));
    assert!(item.status.error().is_some());

    item.mark_processed();
    let done = rx.try_recv().unwrap();
    assert_eq!(done.status.pair(), (WriteStatus::Success, WriteStatus::Failure));
    assert!(rx.try_recv().is_err());
}

#[test]
fn test_object_write_failure_skips_metadata() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FakeStore::default());
    let w = writer(&store, &generator_settings(destination()), (4, 0), false);
    store.script_put(StoreResponse::new(503));
    let mut item = source_file(dir.path(), "a.wav", b"RIFF");
    w.process(&mut item).unwrap();
    assert_eq!(methods(&store.take_requests()), vec!["HEAD", "PUT"]);
    assert_eq!(
        item.status.pair(),
        (WriteStatus::Failure, WriteStatus::NotAttempted)
    );
}

#[test]
fn test_missing_item_is_not_attempted() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FakeStore::default());
    let w = writer(&store, &generator_settings(destination()), (7, 0), false);
    let mut item = WorkItem::file(dir.path().join("gone.wav"), dir.path());
    w.process(&mut item).unwrap();
    assert!(store.take_requests().is_empty());
    assert_eq!(
        item.status.pair(),
        (WriteStatus::NotAttempted, WriteStatus::NotAttempted)
    );
}

#[test]
fn test_existence_probe_error_fails_object() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FakeStore::default());
    let w = writer(&store, &generator_settings(destination()), (7, 0), false);
    store.script_head(StoreResponse::new(500));
    let mut item = source_file(dir.path(), "a.wav", b"RIFF");
    w.process(&mut item).unwrap();
    assert_eq!(methods(&store.take_requests()), vec!["HEAD"]);
    assert_eq!(item.status.object, WriteStatus::Failure);
}

// --- annotations ---

#[test]
fn test_named_annotation_rejected_by_old_store() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FakeStore::default());
    let settings = generator_settings(DestinationSettings {
        annotation: "calls".to_string(),
        ..destination()
    });
    let w = writer(&store, &settings, (5, 0), false);
    let mut item = source_file(dir.path(), "a.wav", b"RIFF");
    w.process(&mut item).unwrap();
    assert!(store.take_requests().is_empty());
    assert_eq!(item.status.object, WriteStatus::Failure);
    assert!(item.status.error().is_some());
}

#[test]
fn test_named_annotation_sent_to_new_store() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FakeStore::default());
    let settings = generator_settings(DestinationSettings {
        annotation: "calls".to_string(),
        ..destination()
    });
    let w = writer(&store, &settings, (7, 1), false);
    let mut item = source_file(dir.path(), "a.wav", b"RIFF");
    w.process(&mut item).unwrap();
    let reqs = store.take_requests();
    assert_eq!(reqs[1].query(), "type=whole-object&annotation=calls");
    assert!(matches!(reqs[1].auth, Auth::Authorization(_)));
}

// --- hash validation ---

#[test]
fn test_hash_validation_accepts_matching_digest() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FakeStore::default());
    let w = writer(&store, &generator_settings(destination()), (7, 0), true);
    let digest = compute_hash(HashAlgorithm::Sha256, &b"RIFF"[..]).unwrap();
    store.script_put(StoreResponse::new(201).with_header("X-HCP-Hash", format!("SHA-256 {}", digest)));
    let mut item = source_file(dir.path(), "a.wav", b"RIFF");
    w.process(&mut item).unwrap();
    assert_eq!(item.status.pair(), (WriteStatus::Success, WriteStatus::Success));
    assert!(item.status.error().is_none());
}

#[test]
fn test_hash_validation_flags_mismatch() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FakeStore::default());
    let w = writer(&store, &generator_settings(destination()), (7, 0), true);
    store.script_put(StoreResponse::new(201).with_header("X-HCP-Hash", "SHA-256 00FF"));
    let mut item = source_file(dir.path(), "a.wav", b"RIFF");
    w.process(&mut item).unwrap();
    assert_eq!(item.status.object, WriteStatus::Failure);
    assert!(item.status.error().is_some());
}

// --- version probe ---

#[test]
fn test_probe_reads_version_from_gateway() {
    let store = FakeStore::default();
    store.script_head(StoreResponse::new(200).with_header("X-HCP-SoftwareVersion", "7.2.0.26"));
    let root = Url::parse(&format!("{}?x=1", ROOT)).unwrap();
    let caps = probe_capabilities(&store, &root, "creds").unwrap();
    assert_eq!(caps.version, Some((7, 2)));
    assert!(caps.whole_object && caps.annotations);
    let reqs = store.take_requests();
    assert_eq!(reqs[0].url.as_str(), "https://ns1.tenant.hcp.local/rest");
    assert_eq!(reqs[0].auth, Auth::LegacyCookie("creds".to_string()));
}

#[test]
fn test_probe_without_version_uses_basic_protocol() {
    let store = FakeStore::default();
    store.script_head(StoreResponse::new(200));
    let caps = probe_capabilities(&store, &Url::parse(ROOT).unwrap(), "c").unwrap();
    assert_eq!(caps, Capabilities::default());
}

#[test]
fn test_unparseable_version_fails_processor_build() {
    let store = Arc::new(FakeStore::default());
    store.script_head(StoreResponse::new(200).with_header("X-HCP-SoftwareVersion", "banana"));
    let mut config = CometConfig::default();
    config.processor.kind = ProcessorKind::Remote;
    config.generator = generator_settings(destination());
    assert!(ItemProcessor::build(&config, store).is_err());
}
