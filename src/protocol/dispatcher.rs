use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{debug, error, info};

use super::message::{MessageKind, RequestMessage, ResponseMessage, Status};
use super::routes::{self, Endpoint};
use crate::agent::ScheduleStore;
use crate::config::ScheduleFiles;
use crate::error::AkerError;
use crate::persist;
use crate::schedule::decode_schedule;

const JSON_CONTENT_TYPE: &str = "application/json";
const TEXT_CONTENT_TYPE: &str = "text/plain";

/// Response to a request, plus the failure behind a 400 if there was one
#[derive(Debug)]
pub struct Handled {
    pub response: ResponseMessage,
    pub error: Option<AkerError>,
}

struct Payload {
    bytes: Vec<u8>,
    content_type: &'static str,
}

impl Payload {
    fn new(bytes: Vec<u8>, content_type: &'static str) -> Self {
        Self {
            bytes,
            content_type,
        }
    }
}

/// Maps inbound requests onto schedule operations
pub struct ProtocolDispatcher {
    store: Arc<ScheduleStore>,
    files: ScheduleFiles,
    reload: Option<Arc<Notify>>,
}

impl ProtocolDispatcher {
    pub fn new(store: Arc<ScheduleStore>, files: ScheduleFiles) -> Self {
        Self {
            store,
            files,
            reload: None,
        }
    }

    /// Wake the scheduler loop after each successful schedule write
    pub fn with_reload_trigger(mut self, reload: Arc<Notify>) -> Self {
        self.reload = Some(reload);
        self
    }

    /// Handle one request
    pub async fn handle(&self, request: RequestMessage) -> Handled {
        self.handle_at(request, Utc::now()).await
    }

    /// Handle one request, evaluating "now" queries at `now`
    pub async fn handle_at(&self, request: RequestMessage, now: DateTime<Utc>) -> Handled {
        let RequestMessage {
            kind,
            transaction_uuid,
            source,
            dest,
            path,
            payload,
        } = request;

        debug!("Processing {} request for {}", kind, dest);
        let endpoint = routes::resolve(&dest);
        let mut response = ResponseMessage::reply(kind, transaction_uuid, source, dest, path);

        // The request's destination now lives in `response.source`
        let result = match kind {
            MessageKind::Create | MessageKind::Update => {
                self.write_schedule(endpoint, &response.source, payload).await
            }
            MessageKind::Retrieve => self.retrieve(endpoint, &response.source, now).await,
            other => Err(AkerError::UnsupportedOperation(format!(
                "message of kind {} not handled",
                other
            ))),
        };

        match result {
            Ok(payload) => {
                response.status = Status::Success;
                if let Some(payload) = payload {
                    response.payload = Some(payload.bytes);
                    response.content_type = Some(payload.content_type.to_string());
                }
                Handled {
                    response,
                    error: None,
                }
            }
            Err(e) => {
                match kind {
                    MessageKind::Create | MessageKind::Update | MessageKind::Retrieve => {
                        error!("{} {} failed: {}", kind, response.source, e)
                    }
                    _ => info!("{}", e),
                }
                Handled {
                    response,
                    error: Some(e),
                }
            }
        }
    }

    /// Validate and persist a new schedule document
    ///
    /// The body is decoded before anything is written, so an invalid
    /// document never replaces the persisted one. The store itself is only
    /// updated when the scheduler loop picks up the new file version.
    async fn write_schedule(
        &self,
        endpoint: Option<Endpoint>,
        dest: &str,
        payload: Option<Vec<u8>>,
    ) -> Result<Option<Payload>, AkerError> {
        match endpoint {
            Some(Endpoint::Schedule) => {}
            Some(_) => {
                return Err(AkerError::UnsupportedOperation(format!(
                    "create/update is not supported on {}",
                    dest
                )));
            }
            None => return Err(AkerError::InvalidDestination(dest.to_string())),
        }

        let body = payload
            .filter(|p| !p.is_empty())
            .ok_or_else(|| AkerError::DecodeFailure("request carries no schedule".to_string()))?;

        let schedule = decode_schedule(&body)?;
        let files = self.files.clone();
        let sum = persist::blocking(move || {
            persist::write_schedule(&files.data_file, &files.checksum_file, &body)
        })
        .await?;

        info!(
            "Persisted new schedule ({} rules, {} absolute blocks, sha256 {})",
            schedule.rules.len(),
            schedule.absolute.len(),
            &sum[..16]
        );

        if let Some(reload) = &self.reload {
            reload.notify_one();
        }

        Ok(None)
    }

    async fn retrieve(
        &self,
        endpoint: Option<Endpoint>,
        dest: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Payload>, AkerError> {
        match endpoint {
            Some(Endpoint::PersistentSchedule) => {
                let bytes = read_blocking(self.files.data_file.clone()).await?;
                Ok(Some(Payload::new(bytes, JSON_CONTENT_TYPE)))
            }
            Some(Endpoint::PersistentChecksum) => {
                let bytes = read_blocking(self.files.checksum_file.clone()).await?;
                Ok(Some(Payload::new(bytes, TEXT_CONTENT_TYPE)))
            }
            Some(Endpoint::Now) => {
                let blocked = self
                    .store
                    .evaluate_active(now)
                    .await
                    .ok_or(AkerError::NoActiveSchedule)?;
                Ok(Some(Payload::new(
                    blocked.canonical().into_bytes(),
                    TEXT_CONTENT_TYPE,
                )))
            }
            Some(Endpoint::Schedule) => Err(AkerError::UnsupportedOperation(format!(
                "RETRIEVE {} is not supported yet",
                dest
            ))),
            None => Err(AkerError::InvalidDestination(dest.to_string())),
        }
    }
}

async fn read_blocking(path: PathBuf) -> Result<Vec<u8>, AkerError> {
    persist::blocking(move || persist::read_file(&path)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{FileScheduleSource, LoadOutcome, ScheduleLoader};
    use chrono::TimeZone;
    use std::time::Duration;
    use tempfile::TempDir;

    const DAILY: &[u8] =
        br#"{"rules": [{"macs": ["aa:bb:cc:dd:ee:ff"], "start": "08:00", "end": "17:00"}]}"#;
    const REQUESTER: &str = "dns:webpa.example.com/api/v2";
    const DEVICE: &str = "mac:112233445566/config";

    struct Fixture {
        _dir: TempDir,
        files: ScheduleFiles,
        store: Arc<ScheduleStore>,
        dispatcher: ProtocolDispatcher,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let files = ScheduleFiles {
            data_file: dir.path().join("pcs.json"),
            checksum_file: dir.path().join("pcs.json.sha256"),
        };
        let store = Arc::new(ScheduleStore::new());
        let dispatcher = ProtocolDispatcher::new(store.clone(), files.clone());

        Fixture {
            _dir: dir,
            files,
            store,
            dispatcher,
        }
    }

    fn request(kind: MessageKind, endpoint: &str) -> RequestMessage {
        RequestMessage::new(kind, "txn-42", REQUESTER, format!("{}{}", DEVICE, endpoint))
    }

    fn nine_am() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 9, 0, 0).unwrap()
    }

    fn six_pm() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 18, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_create_persists_and_loader_installs() {
        let f = fixture();
        let mut loader = ScheduleLoader::new(FileScheduleSource::new(&f.files.data_file));

        let handled = f
            .dispatcher
            .handle(request(MessageKind::Create, "/aker/schedule").with_payload(DAILY))
            .await;

        assert!(handled.error.is_none(), "unexpected error: {:?}", handled.error);
        let response = handled.response;
        assert_eq!(response.status.code(), 200);
        assert_eq!(response.dest, REQUESTER);
        assert_eq!(response.source, format!("{}/aker/schedule", DEVICE));
        assert_eq!(response.transaction_uuid, "txn-42");
        assert_eq!(response.kind, MessageKind::Create);
        assert!(response.payload.is_none());

        assert_eq!(std::fs::read(&f.files.data_file).unwrap(), DAILY);
        assert_eq!(
            std::fs::read_to_string(&f.files.checksum_file).unwrap(),
            persist::checksum(DAILY)
        );

        // The write does not touch the store; the next poll installs it
        assert!(!f.store.is_active().await);
        assert!(matches!(
            loader.poll(&f.store).await.unwrap(),
            LoadOutcome::Installed { .. }
        ));
        assert_eq!(
            f.store.evaluate(nine_am()).await.canonical(),
            "AA:BB:CC:DD:EE:FF"
        );
    }

    #[tokio::test]
    async fn test_update_behaves_like_create() {
        let f = fixture();

        let handled = f
            .dispatcher
            .handle(request(MessageKind::Update, "/aker/schedule").with_payload(DAILY))
            .await;

        assert_eq!(handled.response.status, Status::Success);
        assert_eq!(handled.response.kind, MessageKind::Update);
        assert!(f.files.data_file.exists());
    }

    #[tokio::test]
    async fn test_create_wakes_scheduler() {
        let f = fixture();
        let reload = Arc::new(Notify::new());
        let dispatcher = ProtocolDispatcher::new(f.store.clone(), f.files.clone())
            .with_reload_trigger(reload.clone());

        dispatcher
            .handle(request(MessageKind::Create, "/aker/schedule").with_payload(DAILY))
            .await;

        tokio::time::timeout(Duration::from_millis(100), reload.notified())
            .await
            .expect("reload was not requested");
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_schedule() {
        let f = fixture();

        let handled = f
            .dispatcher
            .handle(request(MessageKind::Create, "/aker/schedule").with_payload(&b"{\"rules\": 1}"[..]))
            .await;

        assert_eq!(handled.response.status.code(), 400);
        assert!(matches!(handled.error, Some(AkerError::DecodeFailure(_))));
        assert!(!f.files.data_file.exists());
        assert!(!f.files.checksum_file.exists());
    }

    #[tokio::test]
    async fn test_create_requires_payload() {
        let f = fixture();

        let handled = f
            .dispatcher
            .handle(request(MessageKind::Create, "/aker/schedule"))
            .await;
        assert_eq!(handled.response.status, Status::Failed);

        let handled = f
            .dispatcher
            .handle(request(MessageKind::Create, "/aker/schedule").with_payload(Vec::new()))
            .await;
        assert_eq!(handled.response.status, Status::Failed);
        assert!(!f.files.data_file.exists());
    }

    #[tokio::test]
    async fn test_create_on_other_endpoints_never_mutates() {
        let f = fixture();

        let handled = f
            .dispatcher
            .handle(request(MessageKind::Create, "/aker/policy").with_payload(DAILY))
            .await;
        assert_eq!(handled.response.status.code(), 400);
        assert!(matches!(handled.error, Some(AkerError::InvalidDestination(_))));

        let handled = f
            .dispatcher
            .handle(request(MessageKind::Update, "/aker/schedule/now").with_payload(DAILY))
            .await;
        assert_eq!(handled.response.status.code(), 400);
        assert!(matches!(handled.error, Some(AkerError::UnsupportedOperation(_))));

        assert!(!f.files.data_file.exists());
        assert!(!f.store.is_active().await);
    }

    #[tokio::test]
    async fn test_retrieve_bare_schedule_is_unsupported() {
        let f = fixture();
        f.store
            .install(decode_schedule(DAILY).unwrap(), DAILY.to_vec(), 1)
            .await;

        let handled = f
            .dispatcher
            .handle(request(MessageKind::Retrieve, "/aker/schedule"))
            .await;

        assert_eq!(handled.response.status.code(), 400);
        assert!(handled.response.payload.is_none());
        assert_eq!(handled.response.dest, REQUESTER);
        assert!(matches!(handled.error, Some(AkerError::UnsupportedOperation(_))));
    }

    #[tokio::test]
    async fn test_retrieve_unknown_destination() {
        let f = fixture();

        let handled = f
            .dispatcher
            .handle(request(MessageKind::Retrieve, "/aker/other"))
            .await;

        assert_eq!(handled.response.status, Status::Failed);
        assert!(matches!(handled.error, Some(AkerError::InvalidDestination(_))));
    }

    #[tokio::test]
    async fn test_retrieve_now_without_schedule_fails() {
        let f = fixture();

        let handled = f
            .dispatcher
            .handle_at(request(MessageKind::Retrieve, "/aker/schedule/now"), nine_am())
            .await;

        assert_eq!(handled.response.status.code(), 400);
        assert!(handled.response.payload.is_none());
        assert!(matches!(handled.error, Some(AkerError::NoActiveSchedule)));
    }

    #[tokio::test]
    async fn test_retrieve_now_reports_blocked_devices() {
        let f = fixture();
        f.store
            .install(decode_schedule(DAILY).unwrap(), DAILY.to_vec(), 1)
            .await;

        let handled = f
            .dispatcher
            .handle_at(request(MessageKind::Retrieve, "/aker/schedule/now"), nine_am())
            .await;
        assert_eq!(handled.response.status.code(), 200);
        assert_eq!(
            handled.response.payload_text().as_deref(),
            Some("AA:BB:CC:DD:EE:FF")
        );
        assert_eq!(handled.response.content_type.as_deref(), Some("text/plain"));

        let handled = f
            .dispatcher
            .handle_at(request(MessageKind::Retrieve, "/aker/schedule/now"), six_pm())
            .await;
        assert_eq!(handled.response.status.code(), 200);
        assert_eq!(handled.response.payload.as_deref(), Some(&b""[..]));
    }

    #[tokio::test]
    async fn test_retrieve_persistent_schedule_and_checksum() {
        let f = fixture();
        f.dispatcher
            .handle(request(MessageKind::Create, "/aker/schedule").with_payload(DAILY))
            .await;

        let handled = f
            .dispatcher
            .handle(request(MessageKind::Retrieve, "/aker/schedule/persistent"))
            .await;
        assert_eq!(handled.response.status, Status::Success);
        assert_eq!(handled.response.payload.as_deref(), Some(DAILY));
        assert_eq!(
            handled.response.content_type.as_deref(),
            Some("application/json")
        );

        let handled = f
            .dispatcher
            .handle(request(MessageKind::Retrieve, "/aker/schedule/persistent/checksum"))
            .await;
        assert_eq!(handled.response.status, Status::Success);
        assert_eq!(
            handled.response.payload_text().as_deref(),
            Some(persist::checksum(DAILY).as_str())
        );
    }

    #[tokio::test]
    async fn test_retrieve_persistent_without_file_fails() {
        let f = fixture();

        let handled = f
            .dispatcher
            .handle(request(MessageKind::Retrieve, "/aker/schedule/persistent"))
            .await;

        assert_eq!(handled.response.status.code(), 400);
        assert!(handled.response.payload.is_none());
        assert!(matches!(handled.error, Some(AkerError::IoFailure { .. })));
    }

    #[tokio::test]
    async fn test_other_kinds_are_ignored() {
        let f = fixture();

        for kind in [MessageKind::Delete, MessageKind::Unknown] {
            let handled = f
                .dispatcher
                .handle(request(kind, "/aker/schedule").with_payload(DAILY))
                .await;

            assert_eq!(handled.response.status.code(), 400);
            assert!(handled.response.payload.is_none());
            assert!(matches!(handled.error, Some(AkerError::UnsupportedOperation(_))));
        }

        assert!(!f.files.data_file.exists());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_now_queries_race_schedule_reloads() {
        use crate::agent::loader::tests::{MemorySource, OTHER, VALID};

        let f = fixture();
        let source = Arc::new(MemorySource::default());
        let mut loader = ScheduleLoader::new(source.clone());
        source.set(1, VALID);
        loader.poll(&f.store).await.unwrap();

        let reload = {
            let store = f.store.clone();
            let source = source.clone();
            async move {
                for version in 2..=40 {
                    let bytes = if version % 2 == 0 { OTHER } else { VALID };
                    source.set(version, bytes);
                    loader.poll(&store).await.unwrap();
                    tokio::task::yield_now().await;
                }
                None
            }
        };
        let mut reload = Some(reload);

        let dispatcher = Arc::new(f.dispatcher);
        let mut queries = Vec::new();

        for i in 0..100 {
            if i == 10 {
                if let Some(reload) = reload.take() {
                    queries.push(tokio::spawn(reload));
                }
            }

            let dispatcher = dispatcher.clone();
            queries.push(tokio::spawn(async move {
                let request = request(MessageKind::Retrieve, "/aker/schedule/now");
                Some(dispatcher.handle_at(request, nine_am()).await)
            }));
        }

        for query in queries {
            let Some(handled) = query.await.unwrap() else {
                continue;
            };
            assert_eq!(handled.response.status.code(), 200, "{:?}", handled.error);
            let payload = handled.response.payload_text().unwrap().into_owned();
            assert!(
                payload == "AA:BB:CC:DD:EE:FF" || payload == "11:22:33:44:55:66",
                "torn result: {:?}",
                payload
            );
        }

        assert_eq!(
            f.store.evaluate(nine_am()).await.canonical(),
            "11:22:33:44:55:66"
        );
    }
}
