use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use sms_relay::config::{self, RelayConfig};
use sms_relay::database::{self, MessageRepository, SqlxMessageRepository};
use sms_relay::logging;
use sms_relay::modem::{CommandModem, read_inbound_lines};
use sms_relay::relay::channels::{ApiChannel, EmailChannel, SmsChannel, SmtpMailer};
use sms_relay::relay::{DeliveryChannel, ProviderResolver, RelayOptions, RelayService};
use sms_relay::utils::http_client::ReqwestTransport;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config_path = config::config_path();
    let config = RelayConfig::load_or_init(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;

    let _log_guard = logging::init_logging(config.log_dir.as_deref(), config.debug)?;

    // Initialize database
    let database_url = std::env::var("DATABASE_URL").unwrap_or_else(|_| config.database_url());
    let pool = database::init_pool(&database_url).await?;
    database::run_migrations(&pool).await?;
    let repo: Arc<dyn MessageRepository> = Arc::new(SqlxMessageRepository::new(pool.clone()));

    let channels = build_channels(&config)?;

    let cancel = CancellationToken::new();
    let service = RelayService::start(
        repo,
        channels,
        RelayOptions {
            retry_base_delay: config.retry_base_delay(),
            reassembly_timeout: config.reassembly_timeout(),
            ..RelayOptions::default()
        },
        cancel.clone(),
    );

    let intake = service.intake();
    let reader_cancel = cancel.child_token();
    let reader = tokio::spawn(async move {
        match read_inbound_lines(tokio::io::stdin(), &intake, reader_cancel).await {
            Ok(n) => info!("Inbound reader finished after {} message(s)", n),
            Err(e) => error!("Inbound reader failed: {}", e),
        }
    });

    info!(
        "sms-relay started on modem {} ({} baud)",
        config.modem.port, config.modem.baudrate
    );

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");

    cancel.cancel();
    if let Err(e) = reader.await {
        warn!("Inbound reader panicked: {}", e);
    }
    service.join().await;
    pool.close().await;

    Ok(())
}

fn build_channels(config: &RelayConfig) -> anyhow::Result<Vec<Arc<dyn DeliveryChannel>>> {
    let api = ApiChannel::new(
        ProviderResolver::new(config.provider_descriptors()),
        Arc::new(ReqwestTransport::new()?),
        config.max_retries,
    );

    let modem = CommandModem::new(config.modem.send_command.clone(), &config.modem.port)?;
    let sms = SmsChannel::new(
        Arc::new(modem),
        config.sms_recipients.clone(),
        config.sms_max_retries(),
    );

    let email = match config.smtp_settings() {
        Some(settings) => EmailChannel::new(
            Arc::new(SmtpMailer::new(&settings)?),
            config.email_sender(),
            config.email.recipients.clone(),
            config.email_max_retries(),
        ),
        None => EmailChannel::disabled(),
    };

    Ok(vec![Arc::new(api), Arc::new(sms), Arc::new(email)])
}
