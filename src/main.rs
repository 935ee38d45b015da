use std::process;
use std::time::Duration;

use clap::{Arg, Command};
use log::LevelFilter;

use jobrelay::config::{default_profiles, ProfileRegistry, RelayConfig};
use jobrelay::enrich::JobExtractor;
use jobrelay::error::RelayError;
use jobrelay::mailbox::ImapMailbox;
use jobrelay::pipeline::Forwarder;
use jobrelay::store::ForwardedStore;
use jobrelay::transport::SmtpSender;
use jobrelay::Classifier;

#[tokio::main]
async fn main() {
    let matches = Command::new("jobrelay")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Forwards contractor job postings from a mailbox to a recruiter list")
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable verbose logging")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("once")
                .long("once")
                .help("Run a single scan and exit instead of looping")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("test-config")
                .long("test-config")
                .help("Validate configuration and profile patterns, then exit")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("generate-profiles")
                .long("generate-profiles")
                .value_name("FILE")
                .help("Write the built-in sender-profile registry to FILE")
                .action(clap::ArgAction::Set),
        )
        .get_matches();

    let log_level = if matches.get_flag("verbose") {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .init();

    if let Some(path) = matches.get_one::<String>("generate-profiles") {
        generate_profiles(path);
        return;
    }

    let config = match RelayConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            process::exit(1);
        }
    };

    if matches.get_flag("test-config") {
        test_config(&config);
        return;
    }

    let transport = match SmtpSender::new(&config.smtp) {
        Ok(transport) => Box::new(transport),
        Err(e) => {
            eprintln!("Error building SMTP transport: {e:#}");
            process::exit(1);
        }
    };

    let enricher = config.completion.as_ref().map(JobExtractor::new);
    if enricher.is_none() {
        log::info!("no completion credential configured, enrichment disabled");
    }

    let store = ForwardedStore::load(&config.store_path);
    log::info!(
        "{} message(s) already recorded in {}",
        store.len(),
        config.store_path.display()
    );

    let mut forwarder = match Forwarder::new(&config, transport, enricher, store) {
        Ok(forwarder) => forwarder,
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    };

    // One scan at a time by construction: the next one cannot start until
    // this one has finished and the interval has elapsed.
    let interval = Duration::from_secs(config.scan_interval_secs);
    loop {
        if let Err(e) = run_scan(&config, &mut forwarder).await {
            log::error!("{e}");
            process::exit(1);
        }

        if matches.get_flag("once") {
            break;
        }

        log::debug!("next scan in {}s", config.scan_interval_secs);
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = tokio::signal::ctrl_c() => {
                log::info!("shutting down");
                break;
            }
        }
    }
}

/// One full scan: fresh IMAP session, materialize the batch, run the
/// pipeline. The blocking fetch runs off the async executor.
async fn run_scan(config: &RelayConfig, forwarder: &mut Forwarder) -> Result<(), RelayError> {
    let mailbox_config = config.mailbox.clone();
    let batch_size = config.batch_size;

    let batch = tokio::task::spawn_blocking(move || {
        let mut mailbox = ImapMailbox::connect(&mailbox_config)?;
        let batch = mailbox.fetch_recent(batch_size)?;
        mailbox.logout();
        Ok::<_, RelayError>(batch)
    })
    .await
    .map_err(|e| RelayError::Session(format!("fetch task failed: {e}")))??;

    log::info!("fetched {} message(s)", batch.len());
    forwarder.process_batch(&batch).await;
    Ok(())
}

fn generate_profiles(path: &str) {
    let registry = ProfileRegistry {
        profiles: default_profiles(),
    };
    match registry.to_file(path) {
        Ok(()) => println!("Sender-profile registry written to: {path}"),
        Err(e) => {
            eprintln!("Error writing profile registry: {e:#}");
            process::exit(1);
        }
    }
}

fn test_config(config: &RelayConfig) {
    println!("Recruiters: {}", config.recruiters.len());
    println!("Contractors: {}", config.contractors.len());
    println!("Ignored sender fragments: {}", config.ignore_senders.len());
    println!("Sender profiles: {}", config.profiles.len());
    for profile in &config.profiles {
        println!(
            "  {}: {} strip rule(s), {} field rule(s)",
            profile.name,
            profile.strip_rules.len(),
            profile.field_rules.len()
        );
    }
    println!(
        "Enrichment: {}",
        if config.completion.is_some() {
            "configured"
        } else {
            "disabled"
        }
    );

    match Classifier::new(
        &config.ignore_senders,
        &config.contractors,
        &config.profiles,
    ) {
        Ok(_) => println!("All profile patterns compiled successfully."),
        Err(e) => {
            eprintln!("Configuration validation failed: {e}");
            process::exit(1);
        }
    }
}
