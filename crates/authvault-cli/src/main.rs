mod cli;
mod config;
mod storage;

use crate::cli::{Command, ConfigCommand, LockCommand};
use authvault_core::AuthStorage;
use authvault_storage::BackendSelector;
use clap::Parser;
use color_eyre::Result;
use serde_json::{json, Value};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const PROBE_HASH: &str = "authvault-health";
const PROBE_FILE: &str = "probe.json";

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    init_tracing();

    let cli = cli::Cli::parse();
    let config = config::load()?;
    let selector = storage::selector_from_config(&config)?;
    run(cli.command.unwrap_or(Command::Health), &config, &selector).await
}

fn init_tracing() {
    // Respect user-provided filters, default to info to avoid noisy stdout.
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

fn print_version() {
    println!("authvault {}", env!("CARGO_PKG_VERSION"));
}

fn init_config(config: &config::Config) -> Result<()> {
    let path = config::write_default_if_missing(config)?;
    println!("Config initialized at {}", path.display());
    Ok(())
}

async fn run(
    command: Command,
    config: &config::Config,
    selector: &BackendSelector,
) -> Result<()> {
    match command {
        Command::Version => print_version(),
        Command::Config(ConfigCommand::Init) => init_config(config)?,
        Command::Config(ConfigCommand::Show) => println!("{:#?}", selector.settings()),
        Command::Health => {
            let store = selector.storage().await?;
            run_store_health(store.as_ref()).await?;
            println!("Storage ({}): ok", store.backend_name());
        }
        Command::Read {
            server_url_hash,
            filename,
        } => {
            let store = selector.storage().await?;
            match store.read_json(&server_url_hash, &filename).await {
                Some(value) => println!("{}", serde_json::to_string_pretty(&value)?),
                None => color_eyre::eyre::bail!("no readable value for {filename}"),
            }
        }
        Command::ReadText {
            server_url_hash,
            filename,
            error_message,
        } => {
            let store = selector.storage().await?;
            let text = store
                .read_text(&server_url_hash, &filename, error_message.as_deref())
                .await?;
            println!("{text}");
        }
        Command::Write {
            server_url_hash,
            filename,
            json,
            server_url,
        } => {
            let value: Value = serde_json::from_str(&json)?;
            let store = selector.storage().await?;
            if let Some(url) = server_url {
                store.bind_server_url(&server_url_hash, &url);
            }
            store.write_json(&server_url_hash, &filename, &value).await?;
            println!("Stored {filename}");
        }
        Command::WriteText {
            server_url_hash,
            filename,
            text,
        } => {
            let store = selector.storage().await?;
            store.write_text(&server_url_hash, &filename, &text).await?;
            println!("Stored {filename}");
        }
        Command::Delete {
            server_url_hash,
            filename,
        } => {
            let store = selector.storage().await?;
            store.delete(&server_url_hash, &filename).await?;
            println!("Deleted {filename}");
        }
        Command::Lock(cmd) => run_lock(cmd, selector)?,
    }
    Ok(())
}

fn run_lock(cmd: LockCommand, selector: &BackendSelector) -> Result<()> {
    let files = selector.fallback();
    match cmd {
        LockCommand::Create {
            server_url_hash,
            port,
        } => {
            let data = files.create_lockfile(&server_url_hash, std::process::id(), port)?;
            println!("{}", serde_json::to_string_pretty(&data)?);
        }
        LockCommand::Check { server_url_hash } => match files.check_lockfile(&server_url_hash) {
            Some(data) => println!("{}", serde_json::to_string_pretty(&data)?),
            None => println!("No lockfile for {server_url_hash}"),
        },
        LockCommand::Remove { server_url_hash } => {
            files.delete_lockfile(&server_url_hash)?;
            println!("Removed lockfile for {server_url_hash}");
        }
    }
    Ok(())
}

/// Runs a write/read/delete round trip against the selected backend.
async fn run_store_health(store: &dyn AuthStorage) -> Result<()> {
    let payload = json!({ "ok": true });
    store.write_json(PROBE_HASH, PROBE_FILE, &payload).await?;
    let round_trip = store.read_json(PROBE_HASH, PROBE_FILE).await;
    store.delete(PROBE_HASH, PROBE_FILE).await?;

    if round_trip.as_ref() != Some(&payload) {
        color_eyre::eyre::bail!("storage round-trip failed");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage;

    #[tokio::test]
    async fn health_check_with_test_store_succeeds() {
        let dir = tempfile::tempdir().expect("tempdir");
        let selector = storage::test_selector(dir.path());
        let store = selector.storage().await.expect("storage");
        run_store_health(store.as_ref())
            .await
            .expect("health check should succeed");
        assert_eq!(store.read_json(PROBE_HASH, PROBE_FILE).await, None);
    }

    #[tokio::test]
    async fn write_then_read_text_commands() {
        let dir = tempfile::tempdir().expect("tempdir");
        let selector = storage::test_selector(dir.path());
        run(
            Command::WriteText {
                server_url_hash: "abc".into(),
                filename: "code_verifier.txt".into(),
                text: "v3r1f13r".into(),
            },
            &config::Config::default(),
            &selector,
        )
        .await
        .expect("write-text");

        run(
            Command::ReadText {
                server_url_hash: "abc".into(),
                filename: "code_verifier.txt".into(),
                error_message: None,
            },
            &config::Config::default(),
            &selector,
        )
        .await
        .expect("read-text");

        run(
            Command::Delete {
                server_url_hash: "abc".into(),
                filename: "code_verifier.txt".into(),
            },
            &config::Config::default(),
            &selector,
        )
        .await
        .expect("delete");

        let err = run(
            Command::ReadText {
                server_url_hash: "abc".into(),
                filename: "code_verifier.txt".into(),
                error_message: Some("no verifier".into()),
            },
            &config::Config::default(),
            &selector,
        )
        .await
        .expect_err("deleted");
        assert_eq!(err.to_string(), "no verifier");
    }

    #[test]
    fn lock_commands_use_config_dir() {
        let dir = tempfile::tempdir().expect("tempdir");
        let selector = storage::test_selector(dir.path());
        run_lock(
            LockCommand::Create {
                server_url_hash: "abc".into(),
                port: 3334,
            },
            &selector,
        )
        .expect("create");
        assert!(dir.path().join("abc_lock.json").exists());

        run_lock(
            LockCommand::Remove {
                server_url_hash: "abc".into(),
            },
            &selector,
        )
        .expect("remove");
        assert!(selector.fallback().check_lockfile("abc").is_none());
    }
}
