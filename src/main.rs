use futures::StreamExt;
use mimalloc::MiMalloc;
use ocr_client::OcrClient;
use ocr_client::service::{ReconcileEvent, StopPolicy};
use ocr_client::types::DocumentFilter;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let cfg = &ocr_client::config::CONFIG;

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cfg.loglevel.clone()));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_level(true)
                .with_target(false),
        )
        .init();

    info!(
        api_root = %cfg.api_root(),
        database_url = %cfg.database_url,
        proxy = %cfg.proxy.as_ref().map(|u| u.as_str()).unwrap_or("<none>"),
        poll_interval_ms = cfg.poll_interval_ms,
        loglevel = %cfg.loglevel
    );

    let client = OcrClient::connect(cfg).await?;

    if !client.session().is_authenticated() {
        match (cfg.email.as_deref(), cfg.password.as_deref()) {
            (Some(email), Some(password)) => {
                client.session().login(email, password).await?;
            }
            _ => {
                warn!("no stored session and no OCR_EMAIL/OCR_PASSWORD configured");
                return Ok(());
            }
        }
    }
    if let Some(session) = client.session().session() {
        info!(user = %session.display_name(), "session active");
    }

    let dashboard = client.dashboard(DocumentFilter::all(), StopPolicy::Never).await?;
    let mut events = dashboard.event_stream();
    let mut session_rx = client.session().watch_session();
    dashboard.start(client.poll_interval());

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupt received");
                break;
            }
            changed = session_rx.changed() => {
                if changed.is_err() || session_rx.borrow_and_update().is_none() {
                    warn!("session ended; login again");
                    break;
                }
            }
            event = events.next() => {
                match event {
                    Some(Ok(event)) => log_event(&event),
                    Some(Err(lagged)) => warn!(error = %lagged, "event stream lagged"),
                    None => break,
                }
            }
        }
    }

    dashboard.stop();
    dashboard.shutdown();
    client.shutdown();
    Ok(())
}

fn log_event(event: &ReconcileEvent) {
    match event {
        ReconcileEvent::Changed { changes, snapshot } => {
            info!(changed = changes.len(), total = snapshot.len(), "documents updated");
            for change in changes {
                let doc = change.document();
                match doc.failure_reason() {
                    Some(reason) => warn!(id = %doc.id, filename = %doc.filename, reason, "failed"),
                    None => info!(id = %doc.id, filename = %doc.filename, status = %doc.status),
                }
            }
        }
        ReconcileEvent::Detail(doc) => {
            info!(id = %doc.id, status = %doc.status, has_text = doc.extracted_text().is_some());
        }
        ReconcileEvent::FetchFailed { message, status } => {
            error!(?status, "{message}");
        }
        ReconcileEvent::Stopped(reason) => {
            info!(?reason, "polling stopped");
        }
    }
}
