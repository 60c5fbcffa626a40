mod config;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use lambdashield_storage::{SlashingProtectionStore, backend::RocksDBBackend};
use lambdashield_types::{
    ShortPubkey,
    primitives::{Epoch, ValidatorPubkeyBytes},
};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, Layer, Registry, layer::SubscriberExt};

#[derive(Debug, clap::Parser)]
#[command(
    name = "lambdashield",
    author = "LambdaClass",
    version,
    about = "Validator attestation slashing protection database"
)]
struct CliOptions {
    /// Directory of the slashing protection database
    #[arg(long)]
    datadir: PathBuf,
    /// JSON file with WEAK_SUBJECTIVITY_PERIOD and FAR_FUTURE_EPOCH
    #[arg(long)]
    config_file: Option<PathBuf>,
    #[arg(long)]
    weak_subjectivity_period: Option<u64>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Convert legacy attestation history, if not done yet
    Migrate,
    /// Print the attestation history of a validator
    Inspect {
        /// Validator public key, hex encoded
        #[arg(long, value_parser = parse_pubkey)]
        pubkey: ValidatorPubkeyBytes,
        /// Only print the record for this target epoch
        #[arg(long)]
        target: Option<Epoch>,
    },
    /// List validators with attestation history
    List,
}

fn parse_pubkey(value: &str) -> Result<ValidatorPubkeyBytes, String> {
    let bytes = hex::decode(value.strip_prefix("0x").unwrap_or(value))
        .map_err(|err| format!("invalid hex: {err}"))?;
    let len = bytes.len();
    bytes
        .try_into()
        .map_err(|_| format!("expected 48 bytes, got {len}"))
}

fn main() -> ExitCode {
    let filter = EnvFilter::builder()
        .with_default_directive(tracing::Level::INFO.into())
        .from_env_lossy();
    let subscriber = Registry::default().with(tracing_subscriber::fmt::layer().with_filter(filter));
    tracing::subscriber::set_global_default(subscriber).unwrap();

    let options = CliOptions::parse();

    let protection_config = config::load_protection_config(
        options.config_file.as_deref(),
        options.weak_subjectivity_period,
    )
    .expect("Failed to load protection config");
    info!(
        weak_subjectivity_period = protection_config.weak_subjectivity_period(),
        datadir = ?options.datadir,
        "Opening slashing protection database"
    );

    let backend = RocksDBBackend::open(&options.datadir).expect("Failed to open database");
    let store = SlashingProtectionStore::new(Arc::new(backend), protection_config);

    // Nothing may read or sign against unmigrated history
    if let Err(err) = store.migrate_attestation_history() {
        error!(%err, "Attestation history migration failed, refusing to continue");
        return ExitCode::FAILURE;
    }

    let result = match options.command {
        Command::Migrate => Ok(()),
        Command::Inspect { pubkey, target } => inspect(&store, &pubkey, target),
        Command::List => list(&store),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(%err, "Command failed");
            ExitCode::FAILURE
        }
    }
}

fn inspect(
    store: &SlashingProtectionStore,
    pubkey: &ValidatorPubkeyBytes,
    target: Option<Epoch>,
) -> Result<(), Box<dyn std::error::Error>> {
    let history = store.read_one(pubkey)?;
    let config = store.config();

    println!("pubkey: 0x{}", hex::encode(pubkey));
    println!("latest epoch written: {}", history.get_latest_epoch_written()?);

    let targets: Vec<Epoch> = match target {
        Some(target) => vec![target],
        None => (0..history.slot_count() as u64).collect(),
    };
    for target in targets {
        let slot = config.slot_index(target);
        match history.get_target_data(target)? {
            Some(record) if !record.is_empty(config) => println!(
                "slot {slot:>6} (target {target}): source {} signing root {:#x}",
                record.source_epoch, record.signing_root
            ),
            Some(_) => println!("slot {slot:>6} (target {target}): empty"),
            None => println!("slot {slot:>6} (target {target}): not allocated"),
        }
    }
    Ok(())
}

fn list(store: &SlashingProtectionStore) -> Result<(), Box<dyn std::error::Error>> {
    let public_keys = store.public_keys()?;
    let histories = store.read_many(&public_keys)?;
    for pubkey in &public_keys {
        let history = &histories[pubkey];
        println!(
            "{} latest epoch written {} slots {}",
            ShortPubkey(pubkey),
            history.get_latest_epoch_written()?,
            history.slot_count()
        );
    }
    info!(count = public_keys.len(), "Listed validators");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_pubkey_accepts_prefixed_hex() {
        let hex = format!("0x{}", "ab".repeat(48));
        assert_eq!(parse_pubkey(&hex).unwrap(), [0xab; 48]);
        assert_eq!(parse_pubkey(&"cd".repeat(48)).unwrap(), [0xcd; 48]);
    }

    #[test]
    fn parse_pubkey_rejects_wrong_length() {
        assert!(parse_pubkey("0xabcd").is_err());
        assert!(parse_pubkey("0xzz").is_err());
    }

    #[test]
    fn cli_parses_inspect() {
        let pubkey = format!("0x{}", "01".repeat(48));
        let options = CliOptions::try_parse_from([
            "lambdashield",
            "--datadir",
            "/tmp/db",
            "inspect",
            "--pubkey",
            &pubkey,
            "--target",
            "7",
        ])
        .unwrap();
        assert!(matches!(
            options.command,
            Command::Inspect {
                target: Some(7),
                ..
            }
        ));
    }
}
