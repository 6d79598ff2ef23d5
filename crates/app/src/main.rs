use std::sync::Arc;

use marketwire_app::{AppError, AuthSnapshot, AuthState, Session, SessionStores, telemetry};
use marketwire_core::config::{self, Config};
use marketwire_core::{Notification, Topic, handler_fn};
use marketwire_notifications::Presenter;
use marketwire_realtime::{ConnectionState, SubscriberKind, WebSocketTransport};
use tracing::{info, warn};
use uuid::Uuid;

#[tokio::main]
async fn main() {
    let config = match config::load_config() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {e}", config::config_path().display());
            std::process::exit(1);
        }
    };

    if let Err(e) = telemetry::init_tracing(&config.logging.level) {
        eprintln!("{e}");
    }

    if let Err(e) = run(config).await {
        eprintln!("marketwire error: {e}");
        std::process::exit(1);
    }
}

async fn run(config: Config) -> Result<(), AppError> {
    info!(version = env!("CARGO_PKG_VERSION"), url = %config.server.url, "marketwire starting");

    let auth = Arc::new(AuthState::new(match config.auth.token.clone() {
        Some(token) => AuthSnapshot::signed_in(None, token),
        None => AuthSnapshot::signed_out(),
    }));
    let session = Session::new(
        &config,
        WebSocketTransport,
        auth,
        presenter(),
        SessionStores::in_memory(),
    );
    session.start();
    session.bus().register(
        Topic::All,
        handler_fn(|notification: Arc<Notification>| async move {
            match serde_json::to_string(&*notification) {
                Ok(line) => println!("{line}"),
                Err(error) => warn!(error = %error, "notification not printable"),
            }
            Ok(())
        }),
    );

    let subscriber_id = format!("cli-{}", Uuid::new_v4());
    if session
        .connection()
        .subscribe(subscriber_id.as_str(), SubscriberKind::Mixed, None)
        .await
        .is_none()
    {
        warn!("no connection yet; waiting for the network or a token");
    }

    let mut state = session.connection().watch_state();
    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal?;
                break;
            }
            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = *state.borrow_and_update();
                match current {
                    ConnectionState::Connected => info!("connected"),
                    ConnectionState::Connecting => info!("connecting"),
                    ConnectionState::Disconnected => warn!("disconnected"),
                }
            }
        }
    }

    session.connection().unsubscribe(&subscriber_id);
    session.shutdown();
    Ok(())
}

#[cfg(feature = "desktop")]
fn presenter() -> Arc<dyn Presenter> {
    Arc::new(marketwire_notifications::DesktopPresenter)
}

#[cfg(not(feature = "desktop"))]
fn presenter() -> Arc<dyn Presenter> {
    Arc::new(marketwire_notifications::TracingPresenter)
}
