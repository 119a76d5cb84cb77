use clap::Args;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use vigil_core::{ClientConfig, Dsn, SystemClock};
use vigil_replay::{Document, HttpTransport, NodeId, Replay, ReplayMetadata, UiEvent};

const DEMO_HREF: &str = "http://localhost:3000/index.html";

#[derive(Args)]
pub struct SimulateCommand {
    /// DSN of the project receiving the replay
    #[arg(long, env = "VIGIL_DSN")]
    pub dsn: String,

    /// Idle time after which the session rotates
    #[arg(long, default_value_t = 2_000)]
    pub idle_timeout_ms: u64,

    /// Clicks recorded before and after the idle period
    #[arg(long, default_value_t = 1)]
    pub clicks: u32,

    /// Compress recording payloads
    #[arg(long, default_value_t = false)]
    pub compress: bool,
}

impl SimulateCommand {
    pub fn execute(self) -> anyhow::Result<()> {
        let rt = tokio::runtime::Runtime::new()?;
        let sessions = rt.block_on(self.run())?;

        for (index, session) in sessions.iter().enumerate() {
            println!("session {}: {}", index + 1, session);
        }
        Ok(())
    }

    async fn run(&self) -> anyhow::Result<Vec<String>> {
        let mut config = ClientConfig::from_env()?;
        config.replay.idle_timeout = Duration::from_millis(self.idle_timeout_ms);
        config.replay.compress_recordings = self.compress;

        let dsn = Dsn::parse(&self.dsn)?;
        info!("Simulating replay against {}", dsn.envelope_url());

        let transport = Arc::new(HttpTransport::new(
            &dsn,
            &config.transport,
            Default::default(),
        )?);
        let (document, button) = demo_page()?;

        let replay = Replay::start(
            &config.replay,
            ReplayMetadata::from_config(&config),
            document,
            transport,
            Arc::new(SystemClock),
        );

        let mut sessions = vec![replay.session_id().await];
        self.click(&replay, button).await?;

        // Past the idle timeout plus one expiry check
        let idle = config.replay.idle_timeout + config.replay.check_interval() * 2;
        debug!("Idling for {:?}", idle);
        tokio::time::sleep(idle).await;

        let session = replay.session_id().await;
        if !sessions.contains(&session) {
            sessions.push(session);
        }
        self.click(&replay, button).await?;

        replay.stop(config.transport.shutdown_timeout).await?;
        Ok(sessions)
    }

    async fn click(&self, replay: &Replay, button: NodeId) -> anyhow::Result<()> {
        for n in 0..self.clicks {
            let offset = i32::try_from(n).unwrap_or(i32::MAX).saturating_mul(4);
            let recorded = replay
                .record(UiEvent::Click {
                    target: button,
                    x: 12 + offset,
                    y: 30,
                })
                .await?;
            debug!("Click {} produced {} snapshot(s)", n + 1, recorded);
        }
        Ok(())
    }
}

/// A small page whose button gets node id 9
fn demo_page() -> anyhow::Result<(Document, NodeId)> {
    let mut doc = Document::new(Some(DEMO_HREF.to_string()));
    let missing = || anyhow::anyhow!("Failed to build demo page");

    let html = doc.append_element(doc.root(), "html", &[]).ok_or_else(missing)?;
    let head = doc.append_element(html, "head", &[]).ok_or_else(missing)?;
    let title = doc.append_element(head, "title", &[]).ok_or_else(missing)?;
    doc.append_text(title, "Replay demo").ok_or_else(missing)?;
    let body = doc.append_element(html, "body", &[]).ok_or_else(missing)?;
    let main = doc.append_element(body, "main", &[]).ok_or_else(missing)?;
    doc.append_element(main, "h1", &[]).ok_or_else(missing)?;
    let button = doc
        .append_element(main, "button", &[("id", "button1")])
        .ok_or_else(missing)?;

    Ok((doc, button))
}
