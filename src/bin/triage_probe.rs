//! triage-probe: exercise the client against a live server.
//!
//! Usage:
//!   triage-probe [--config FILE] whoami              Run the session bootstrap
//!   triage-probe [--config FILE] get <URL>           GET a JSON endpoint, print the payload
//!   triage-probe [--config FILE] download <URL> <OUT> Save a binary resource to OUT

use anyhow::{bail, Context};
use futures::TryStreamExt;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use tokio::sync::oneshot;
use tracing_subscriber::EnvFilter;
use triage_client::shell::SessionState;
use triage_client::{ApiClient, CallDescriptor, ClientConfig, DownloadDescriptor, Reply};

fn print_usage() {
    println!(
        r#"triage-probe: exercise the triage API client

USAGE:
    triage-probe [--config FILE] <COMMAND>

COMMANDS:
    whoami                  Run the session bootstrap and print the resulting view
    get <URL>               GET a JSON endpoint and print the payload
    download <URL> <OUT>    Download a binary resource into OUT
    help                    Show this help message

ENVIRONMENT:
    TRIAGE_BASE_URL, TRIAGE_HTTP_TIMEOUT_SECS, TRIAGE_PROXY_URL,
    TRIAGE_XSRF_TOKEN, TRIAGE_API_USER, TRIAGE_APIKEY, TRIAGE_STATE_DIR
    RUST_LOG                Log filter (default: info)"#
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut args: Vec<String> = std::env::args().skip(1).collect();
    let config_path = match args.iter().position(|a| a == "--config") {
        Some(i) => {
            if i + 1 >= args.len() {
                bail!("--config needs a file argument");
            }
            let path = PathBuf::from(args.remove(i + 1));
            args.remove(i);
            Some(path)
        }
        None => None,
    };

    let mut config = match &config_path {
        Some(path) => ClientConfig::from_yaml_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => ClientConfig::default(),
    };
    config.apply_env();

    let command = args.first().map(String::as_str).unwrap_or("help");
    if matches!(command, "help" | "--help" | "-h") {
        print_usage();
        return Ok(());
    }

    let client = ApiClient::builder()
        .config(config)
        .build()
        .await
        .context("building client")?;

    match (command, &args[1..]) {
        ("whoami", []) => cmd_whoami(&client).await,
        ("get", [url]) => cmd_get(&client, url).await,
        ("download", [url, out]) => cmd_download(&client, url, PathBuf::from(out)).await,
        (other, _) => {
            print_usage();
            bail!("unknown command or wrong arguments: {other}")
        }
    }
}

async fn cmd_whoami(client: &ApiClient) -> anyhow::Result<()> {
    let session = SessionState::new();
    let view = client.bootstrap(&session, None).await;
    println!("view: {view}");
    if let Some(user) = session.user() {
        println!("user: {}", user.username.as_deref().unwrap_or("<unnamed>"));
    }
    if let Some(params) = session.login_params() {
        println!("login: {}", serde_json::to_string_pretty(&params)?);
    }
    println!("server version: {}", client.server_version());
    Ok(())
}

async fn cmd_get(client: &ApiClient, url: &str) -> anyhow::Result<()> {
    match client.fetch(CallDescriptor::get(url)).await {
        Some(Ok(payload)) => {
            println!("{}", serde_json::to_string_pretty(&payload)?);
            Ok(())
        }
        Some(Err(reply)) => bail!("{} {}", reply.status_code(), reply.error_message()),
        None => bail!("no reply for {url}"),
    }
}

async fn cmd_download(client: &ApiClient, url: &str, out: PathBuf) -> anyhow::Result<()> {
    let (tx, rx) = oneshot::channel();
    let (err_tx, err_rx) = oneshot::channel::<Reply>();
    client
        .download(
            DownloadDescriptor::new(url)
                .on_success(move |download| {
                    let _ = tx.send(download);
                })
                .on_failure(move |reply| {
                    let _ = err_tx.send(reply);
                }),
        )
        .await;

    if let Ok(reply) = err_rx.await {
        bail!("{} {}", reply.status_code(), reply.error_message());
    }
    let Ok(download) = rx.await else {
        bail!("download of {url} did not complete");
    };

    eprintln!(
        "saving {} ({} bytes, {})",
        download.filename.as_deref().unwrap_or("<unnamed>"),
        download
            .size
            .map(|s| s.to_string())
            .unwrap_or_else(|| "?".into()),
        download.content_type.as_deref().unwrap_or("?"),
    );
    let mut file = tokio::fs::File::create(&out)
        .await
        .with_context(|| format!("creating {}", out.display()))?;
    let mut body = download.body;
    while let Some(chunk) = body.try_next().await? {
        file.write_all(&chunk).await?;
    }
    file.flush().await?;
    Ok(())
}
