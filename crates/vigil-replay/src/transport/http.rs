use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use vigil_core::{mask_sensitive, Dsn, Envelope, SdkInfo, TransportConfig};

use super::{DeliveryOutcome, DeliveryReport, Transport, TransportError};

pub const ENVELOPE_CONTENT_TYPE: &str = "application/x-sentry-envelope";
pub const AUTH_HEADER: &str = "X-Sentry-Auth";

const REPORT_CAPACITY: usize = 256;

/// Delivers envelopes to the DSN's envelope endpoint over HTTP
pub struct HttpTransport {
    sender: Mutex<Option<mpsc::Sender<Envelope>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    reports: broadcast::Sender<DeliveryReport>,
    pending: Arc<AtomicUsize>,
}

impl HttpTransport {
    /// Spawn the delivery worker; must be called from within a tokio runtime
    pub fn new(dsn: &Dsn, config: &TransportConfig, sdk: SdkInfo) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(sdk.client_string())
            .build()?;

        let url = dsn.envelope_url();
        let auth = dsn.auth_header(&sdk);
        info!(
            "Replay transport sending to {} (key {})",
            url,
            mask_sensitive(&dsn.public_key)
        );

        let capacity = config.max_queued_envelopes.max(1);
        let (sender, receiver) = mpsc::channel(capacity);
        let (reports, _) = broadcast::channel(REPORT_CAPACITY);
        let pending = Arc::new(AtomicUsize::new(0));

        let worker = tokio::spawn(Self::run(
            client,
            url,
            auth,
            receiver,
            reports.clone(),
            pending.clone(),
        ));

        Ok(Self {
            sender: Mutex::new(Some(sender)),
            worker: Mutex::new(Some(worker)),
            reports,
            pending,
        })
    }

    /// Receive a report for every delivery attempt
    pub fn subscribe(&self) -> broadcast::Receiver<DeliveryReport> {
        self.reports.subscribe()
    }

    /// Envelopes queued or in flight
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    async fn run(
        client: reqwest::Client,
        url: String,
        auth: String,
        mut receiver: mpsc::Receiver<Envelope>,
        reports: broadcast::Sender<DeliveryReport>,
        pending: Arc<AtomicUsize>,
    ) {
        debug!("Replay transport worker started");
        let mut delivered = 0usize;

        while let Some(envelope) = receiver.recv().await {
            let event_id = envelope.header().event_id.clone();
            let outcome = Self::deliver(&client, &url, &auth, &envelope).await;

            match &outcome {
                DeliveryOutcome::Delivered { status } => {
                    delivered += 1;
                    debug!("Delivered envelope {:?} (status: {})", event_id, status);
                }
                DeliveryOutcome::Failed { status, message } => {
                    error!(
                        "Failed to deliver envelope {:?} (status: {:?}): {}",
                        event_id, status, message
                    );
                }
            }

            pending.fetch_sub(1, Ordering::SeqCst);
            // No subscribers is fine
            let _ = reports.send(DeliveryReport {
                event_id,
                outcome,
                attempted_at: chrono::Utc::now(),
            });
        }

        debug!(
            "Replay transport worker stopped after delivering {} envelopes",
            delivered
        );
    }

    async fn deliver(
        client: &reqwest::Client,
        url: &str,
        auth: &str,
        envelope: &Envelope,
    ) -> DeliveryOutcome {
        let body = match envelope.to_vec() {
            Ok(body) => body,
            Err(e) => {
                return DeliveryOutcome::Failed {
                    status: None,
                    message: e.to_string(),
                }
            }
        };

        let response = client
            .post(url)
            .header("Content-Type", ENVELOPE_CONTENT_TYPE)
            .header(AUTH_HEADER, auth)
            .body(body)
            .send()
            .await;

        match response {
            Ok(resp) if resp.status().is_success() => DeliveryOutcome::Delivered {
                status: resp.status().as_u16(),
            },
            Ok(resp) => {
                let status = resp.status().as_u16();
                let message = resp.text().await.unwrap_or_default();
                DeliveryOutcome::Failed {
                    status: Some(status),
                    message,
                }
            }
            Err(e) => DeliveryOutcome::Failed {
                status: None,
                message: e.to_string(),
            },
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn send(&self, envelope: Envelope) -> Result<(), TransportError> {
        let sender = self.sender.lock().unwrap_or_else(|e| e.into_inner());
        let sender = sender.as_ref().ok_or(TransportError::Closed)?;

        self.pending.fetch_add(1, Ordering::SeqCst);
        sender.try_send(envelope).map_err(|e| {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            match e {
                mpsc::error::TrySendError::Full(_) => {
                    TransportError::QueueFull(sender.max_capacity())
                }
                mpsc::error::TrySendError::Closed(_) => TransportError::Closed,
            }
        })
    }

    async fn shutdown(&self, timeout: Duration) -> Result<(), TransportError> {
        // Dropping the sender lets the worker finish once the queue is empty
        drop(
            self.sender
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .take(),
        );

        let worker = self.worker.lock().unwrap_or_else(|e| e.into_inner()).take();
        let Some(mut worker) = worker else {
            return Ok(());
        };

        match tokio::time::timeout(timeout, &mut worker).await {
            Ok(_) => {
                info!("Replay transport shut down");
                Ok(())
            }
            Err(_) => {
                worker.abort();
                let remaining = self.pending();
                warn!(
                    "Replay transport shutdown timed out, dropping {} envelope(s)",
                    remaining
                );
                Err(TransportError::ShutdownTimeout(remaining))
            }
        }
    }
}
