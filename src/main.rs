use anyhow::{anyhow, Result};
use catchall::notification::DynNotifier;
use catchall::{AdmissionPolicy, Config, LogNotifier, Notifications, Shared};
use is_terminal::IsTerminal;
use std::sync::Arc;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_init();

    let mut first_args = std::env::args().take(2);
    let (program_name, config_file) = (
        first_args.next().unwrap_or("catchall".to_string()),
        first_args.next(),
    );

    let config = config_init(&program_name, config_file)?;
    let notifier: DynNotifier = Arc::new(Notifications::new(
        &config.notification,
        vec![Arc::new(LogNotifier) as DynNotifier],
    )?);

    let mut launched = catchall::launch(config.clone(), notifier).await?;
    for (transport, addr) in &launched.local_addrs {
        tracing::info!("DNS listening on {transport} {addr}");
    }

    let admission = Arc::new(AdmissionPolicy::from_config(&config)?);
    for subject in admission.managed_subjects() {
        tracing::info!("managing certificate subject {subject}");
    }

    tracing::info!("API listening on {}", &config.api_bind_addr);
    let api_server = catchall::new_http(config.clone(), launched.bridge.clone(), admission);
    let api_handle = tokio::spawn(api_server);

    let result = tokio::select! {
        _ = signal::ctrl_c() => {
            tracing::info!("quitting from signal");
            Ok(())
        },
        Some(err) = launched.failure() => Err(err.into()),
        Ok(api_res) = api_handle => api_res.map_err(Into::into),
    };
    launched.shutdown();
    tracing::info!("goodbye");
    result
}

fn tracing_init() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "catchall=info,notification=info".into());
    let registry = tracing_subscriber::registry().with(filter);
    if std::io::stdout().is_terminal() {
        registry.with(tracing_subscriber::fmt::layer()).init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    }
}

fn config_init(program_name: &str, config_file: Option<String>) -> Result<Shared> {
    match config_file {
        None => Err(anyhow!("usage: {program_name} /path/to/config.json")),
        Some(config_file) => {
            let config = Config::try_from_file(&config_file)?;
            tracing::debug!("loaded config from {config_file}");
            Ok(Arc::new(config))
        }
    }
}
