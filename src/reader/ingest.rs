//! Hand-off between the blocking poller thread and the async scan pipeline.

use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};
use utoipa::ToSchema;

use crate::service::attendance::AttendanceService;
use crate::service::resolver::EnrollmentResolver;
use crate::store::StoreError;
use crate::utils::shutdown::Shutdown;

/// Poller side of the scan channel. Never blocks.
#[derive(Clone)]
pub struct UidSink {
    tx: mpsc::UnboundedSender<String>,
    last: Arc<watch::Sender<Option<String>>>,
}

impl UidSink {
    pub fn publish(&self, uid: String) {
        self.last.send_replace(Some(uid.clone()));
        if self.tx.send(uid).is_err() {
            debug!("Scan consumer gone, UID only kept as last scanned");
        }
    }
}

/// Read-only view of the most recent UID seen by the poller.
#[derive(Clone)]
pub struct LastUid(watch::Receiver<Option<String>>);

impl LastUid {
    pub fn uid(&self) -> Option<String> {
        self.0.borrow().clone()
    }

    /// Resolves the last UID against the school year of `today`.
    pub async fn identify(
        &self,
        resolver: &EnrollmentResolver,
        today: NaiveDate,
    ) -> Result<Identification, StoreError> {
        let Some(uid) = self.uid() else {
            return Ok(Identification::default());
        };
        let found = resolver.resolve(&uid, today).await?;
        Ok(match found {
            Some(e) => Identification {
                has_uid: true,
                registered: true,
                uid: Some(uid),
                enrollment_id: Some(e.id),
                student: Some(e.student_name),
                course: Some(e.course_name),
                group: Some(e.group_name),
            },
            None => Identification {
                has_uid: true,
                uid: Some(uid),
                ..Default::default()
            },
        })
    }
}

#[derive(Debug, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct Identification {
    pub has_uid: bool,
    pub registered: bool,
    #[schema(example = "04A1B2C3")]
    pub uid: Option<String>,
    pub enrollment_id: Option<u64>,
    #[schema(example = "Lucia Martin")]
    pub student: Option<String>,
    #[schema(example = "1 DAM")]
    pub course: Option<String>,
    #[schema(example = "A")]
    pub group: Option<String>,
}

pub fn scan_channel() -> (UidSink, mpsc::UnboundedReceiver<String>, LastUid) {
    let (tx, rx) = mpsc::unbounded_channel();
    let (last_tx, last_rx) = watch::channel(None);
    let sink = UidSink {
        tx,
        last: Arc::new(last_tx),
    };
    (sink, rx, LastUid(last_rx))
}

/// Drains the scan channel, registering each UID in its own task so a slow
/// store write never holds back the next tap.
pub fn spawn_scan_consumer(
    mut rx: mpsc::UnboundedReceiver<String>,
    service: Arc<AttendanceService>,
    shutdown: Shutdown,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                uid = rx.recv() => match uid {
                    Some(uid) => {
                        let service = service.clone();
                        tokio::spawn(async move {
                            service.handle_scan(&uid).await;
                        });
                    }
                    None => break,
                },
                _ = shutdown.triggered() => break,
            }
        }
        info!("Scan consumer stopped");
    })
}
