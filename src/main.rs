use anyhow::{anyhow, Result};
use is_terminal::IsTerminal;
use oobcrab::config::SessionConfig;
use oobcrab::error::Error;
use oobcrab::event::LogSink;
use oobcrab::netx::{tls, Handler, Server};
use oobcrab::store::DynRecordStore;
use oobcrab::{Config, FtpHandler, InMemoryStore, SharedConfig, SharedSink, SmtpHandler};
use std::sync::Arc;
use tokio::signal;
use tokio::task::JoinHandle;
use tokio_rustls::TlsAcceptor;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

type Listener = JoinHandle<Result<(), Error>>;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_init();

    let mut first_args = std::env::args().take(2);
    let (program_name, config_file) = (
        first_args.next().unwrap_or("oobcrab".to_string()),
        first_args.next(),
    );

    let config = config_init(&program_name, config_file)?;
    let store = store_init(&config).await?;
    let sink: SharedSink = Arc::new(LogSink);
    let tls = match &config.tls {
        Some(tls_config) => Some(tls::load_acceptor(
            &tls_config.cert_path,
            &tls_config.key_path,
        )?),
        None => None,
    };

    let (dns_server, _challenges) = oobcrab::new_dns(&config, store, Some(sink.clone())).await?;
    tracing::info!("DNS listening on UDP {}", dns_server.local_addr()?);
    if let Some(tcp_addr) = dns_server.tcp_local_addr() {
        tracing::info!("DNS listening on TCP {}", tcp_addr);
    }
    let dns_handle = tokio::spawn(dns_server.block_until_done());

    let smtp_handle = match &config.smtp {
        Some(smtp) => {
            // STARTTLS is pointless on a listener that is TLS from the first byte.
            let starttls = if smtp.implicit_tls { None } else { tls.clone() };
            let handler = SmtpHandler::new(smtp.greeting(&config.domain), starttls, sink.clone());
            Some(listen("SMTP", smtp, tls.as_ref(), handler).await?)
        }
        None => None,
    };

    let ftp_handle = match &config.ftp {
        Some(ftp) => {
            let handler = FtpHandler::new(ftp.greeting(&config.domain), sink.clone());
            Some(listen("FTP", ftp, tls.as_ref(), handler).await?)
        }
        None => None,
    };

    // TODO(XXX): proper graceful shutdown, letting open sessions emit their events.
    tokio::select! {
        _ = signal::ctrl_c() => {
            tracing::info!("quitting from signal");
        },
        res = join(Some(dns_handle)) => res?,
        res = join(smtp_handle) => res?,
        res = join(ftp_handle) => res?,
    }
    tracing::info!("goodbye");
    Ok(())
}

fn tracing_init() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_ansi(std::io::stdout().is_terminal()))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "oobcrab=info".into()),
        )
        .init();
}

fn config_init(program_name: &str, config_file: Option<String>) -> Result<SharedConfig> {
    match config_file {
        None => Err(anyhow!("usage: {program_name} /path/to/config.json")),
        Some(config_file) => {
            let config = Config::try_from_file(&config_file)?;
            tracing::debug!("loaded config from {config_file}");
            Ok(Arc::new(config))
        }
    }
}

async fn store_init(config: &Config) -> Result<DynRecordStore> {
    match &config.store_fixtures {
        Some(path) => {
            let store = InMemoryStore::try_from_file(path).await?;
            tracing::debug!("loaded store fixtures from {}", path.display());
            Ok(Arc::new(store))
        }
        None => Ok(Arc::new(InMemoryStore::new())),
    }
}

async fn listen<H: Handler>(
    name: &str,
    session: &SessionConfig,
    tls: Option<&TlsAcceptor>,
    handler: H,
) -> Result<Listener> {
    let implicit_tls = if session.implicit_tls {
        tls.cloned()
    } else {
        None
    };
    let secure = implicit_tls.is_some();
    let server = Server::bind(session.bind_addr, implicit_tls, session.limits(), handler).await?;
    tracing::info!(
        "{name} listening on TCP {}{}",
        server.local_addr()?,
        if secure { " (TLS)" } else { "" }
    );
    Ok(tokio::spawn(server.serve()))
}

async fn join(handle: Option<Listener>) -> Result<()> {
    match handle {
        Some(handle) => Ok(handle.await??),
        None => std::future::pending().await,
    }
}
