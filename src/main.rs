use clap::{Args, Parser, Subcommand, ValueEnum};
use miette::{IntoDiagnostic, Result, miette};
use payrecon::application::desk::{FailureKind, NewPayment, PaymentDesk};
use payrecon::application::notification::NotificationGate;
use payrecon::application::resolver::StatusResolver;
use payrecon::application::scheduler::ReconciliationScheduler;
use payrecon::config::{
    DEFAULT_PROBE_URL_TEMPLATE, DEFAULT_SNAP_BASE_URL, HttpProbeConfig, KeywordRules,
    ResolverConfig, SchedulerConfig,
};
use payrecon::domain::payment::{Details, PaymentMethod, PaymentRecord, detail_keys};
use payrecon::domain::ports::{PaymentStoreRef, SettingsStoreRef};
use payrecon::domain::resolution::Resolution;
use payrecon::infrastructure::http_probe::HttpProbe;
use payrecon::infrastructure::json_file::JsonFilePaymentStore;
use payrecon::interfaces::csv::history_writer::HistoryWriter;
use payrecon::interfaces::stdout_sink::StdoutSink;
use rust_decimal::Decimal;
use serde_json::Value;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// JSON document holding payments and settings
    #[arg(
        long,
        global = true,
        env = "PAYRECON_STORE",
        default_value = "payment_history.json"
    )]
    store: PathBuf,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long, global = true, env = "PAYRECON_DB_PATH")]
    db_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start tracking a payment and print its id
    Create {
        #[arg(long)]
        owner: String,
        #[arg(long)]
        amount: Decimal,
        #[arg(long, default_value = "qris")]
        method: PaymentMethod,
        /// Processor order id; generated when omitted
        #[arg(long)]
        id: Option<String>,
        /// Payment page to probe
        #[arg(long)]
        url: Option<String>,
        #[arg(long, default_value = "")]
        message: String,
        #[arg(long, default_value = "")]
        donor_name: String,
        /// Extra detail as key=value; JSON values are parsed
        #[arg(long = "detail", value_parser = parse_detail)]
        details: Vec<(String, Value)>,
    },
    /// Print one payment as JSON
    Get { id: String },
    /// Cancel every pending payment of an owner
    Cancel {
        #[arg(long)]
        owner: String,
    },
    /// Mark a payment as failed
    Fail {
        id: String,
        /// initialization | api
        #[arg(long)]
        kind: FailureKind,
        #[arg(long, default_value = "")]
        reason: String,
    },
    /// List an owner's payments, newest first
    History {
        #[arg(long)]
        owner: String,
        #[arg(long, default_value_t = 10)]
        limit: usize,
        #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },
    /// Sum of an owner's successful payments
    Total {
        #[arg(long)]
        owner: String,
    },
    /// Read or write a setting (per owner with --owner, global otherwise)
    Setting {
        #[command(subcommand)]
        action: SettingAction,
    },
    /// Resolve a single payment once and print the result
    Resolve {
        #[arg(long, default_value = "qris")]
        method: PaymentMethod,
        #[arg(long)]
        token: Option<String>,
        #[arg(long)]
        url: Option<String>,
        #[command(flatten)]
        probe: ProbeArgs,
    },
    /// Fetch the BCA virtual account number of a payment and store it
    Va {
        id: String,
        #[command(flatten)]
        probe: ProbeArgs,
    },
    /// Reconcile pending payments until interrupted
    Watch {
        #[command(flatten)]
        schedule: ScheduleArgs,
        #[command(flatten)]
        probe: ProbeArgs,
        /// Run a single tick and exit
        #[arg(long)]
        once: bool,
    },
}

#[derive(Subcommand)]
enum SettingAction {
    Get {
        key: String,
        #[arg(long)]
        owner: Option<String>,
    },
    Set {
        key: String,
        /// JSON value; anything that is not valid JSON is stored as a string
        value: String,
        #[arg(long)]
        owner: Option<String>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Table,
    Csv,
    Json,
}

#[derive(Args)]
struct ScheduleArgs {
    #[arg(long, env = "PAYRECON_TICK_INTERVAL_SECONDS", default_value_t = 10)]
    tick_interval_seconds: u64,
    #[arg(long, env = "PAYRECON_MAX_CONCURRENCY", default_value_t = 5)]
    max_concurrency: usize,
    /// Pending payments older than this are no longer probed
    #[arg(long, env = "PAYRECON_MAX_AGE_MINUTES", default_value_t = 60)]
    max_age_minutes: u64,
    #[arg(long, env = "PAYRECON_CHECK_TIMEOUT_SECONDS", default_value_t = 8)]
    check_timeout_seconds: u64,
}

#[derive(Args)]
struct ProbeArgs {
    /// JSON file overriding the keyword rules
    #[arg(long, env = "PAYRECON_KEYWORDS")]
    keywords: Option<PathBuf>,
    #[arg(long, env = "PAYRECON_SNAP_BASE_URL", default_value = DEFAULT_SNAP_BASE_URL)]
    snap_base_url: String,
    #[arg(long, env = "PAYRECON_PROBE_URL_TEMPLATE", default_value = DEFAULT_PROBE_URL_TEMPLATE)]
    probe_url_template: String,
    #[arg(long, env = "PAYRECON_REQUEST_TIMEOUT_SECONDS", default_value_t = 5)]
    request_timeout_seconds: u64,
}

impl ProbeArgs {
    fn http_probe(&self) -> Result<HttpProbe> {
        HttpProbe::new(&HttpProbeConfig {
            snap_base_url: self.snap_base_url.clone(),
            request_timeout: Duration::from_secs(self.request_timeout_seconds.max(1)),
            ..HttpProbeConfig::default()
        })
        .into_diagnostic()
    }

    fn resolver(&self) -> Result<StatusResolver> {
        let rules = match &self.keywords {
            Some(path) => KeywordRules::from_path(path).into_diagnostic()?,
            None => KeywordRules::default(),
        };
        let config = ResolverConfig {
            rules,
            probe_url_template: self.probe_url_template.clone(),
            ..ResolverConfig::default()
        };
        Ok(StatusResolver::new(Arc::new(self.http_probe()?), &config))
    }
}

struct Stores {
    payments: PaymentStoreRef,
    settings: SettingsStoreRef,
}

fn parse_detail(raw: &str) -> std::result::Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", raw))?;
    if key.trim().is_empty() {
        return Err("detail key must not be empty".to_string());
    }
    Ok((key.trim().to_string(), parse_value(value)))
}

fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

#[cfg(feature = "storage-rocksdb")]
fn open_stores(store: &Path, db_path: Option<PathBuf>) -> Result<Stores> {
    use payrecon::infrastructure::rocksdb::RocksDbPaymentStore;

    if let Some(db_path) = db_path {
        let db = RocksDbPaymentStore::open(db_path).into_diagnostic()?;
        return Ok(Stores {
            payments: Arc::new(db.clone()),
            settings: Arc::new(db),
        });
    }
    open_json_store(store)
}

#[cfg(not(feature = "storage-rocksdb"))]
fn open_stores(store: &Path, db_path: Option<PathBuf>) -> Result<Stores> {
    if db_path.is_some() {
        tracing::warn!(
            "WARNING: Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to JSON file storage."
        );
    }
    open_json_store(store)
}

fn open_json_store(path: &Path) -> Result<Stores> {
    let store = JsonFilePaymentStore::open(path).into_diagnostic()?;
    Ok(Stores {
        payments: Arc::new(store.clone()),
        settings: Arc::new(store),
    })
}

fn print_table(records: &[PaymentRecord]) {
    println!(
        "{:<28} {:<17} {:<10} {:>12} {:<22} Donor",
        "ID", "Date", "Method", "Amount", "Status"
    );
    for record in records {
        println!(
            "{:<28} {:<17} {:<10} {:>12} {:<22} {}",
            record.id,
            record.created_at.format("%Y-%m-%d %H:%M").to_string(),
            record.method.as_str(),
            record.amount.normalize().to_string(),
            record.status.as_str(),
            record.donor_name
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let stores = open_stores(&cli.store, cli.db_path)?;
    let desk = PaymentDesk::new(Arc::clone(&stores.payments));

    match cli.command {
        Command::Create {
            owner,
            amount,
            method,
            id,
            url,
            message,
            donor_name,
            details,
        } => {
            let record = desk
                .open(NewPayment {
                    order_id: id,
                    owner_id: owner,
                    method,
                    amount,
                    payment_url: url,
                    message,
                    donor_name,
                    details: details.into_iter().collect::<Details>(),
                })
                .await
                .into_diagnostic()?;
            println!("{}", record.id);
        }
        Command::Get { id } => {
            let record = desk
                .get(&id)
                .await
                .into_diagnostic()?
                .ok_or_else(|| miette!("Payment {} not found", id))?;
            println!(
                "{}",
                serde_json::to_string_pretty(&record).into_diagnostic()?
            );
        }
        Command::Cancel { owner } => {
            for id in desk.cancel_pending_for(&owner).await.into_diagnostic()? {
                println!("{}", id);
            }
        }
        Command::Fail { id, kind, reason } => {
            if !desk.mark_failed(&id, kind, &reason).await.into_diagnostic()? {
                return Err(miette!("Payment {} not found", id));
            }
        }
        Command::History {
            owner,
            limit,
            format,
        } => {
            let records = desk.history(&owner, limit).await.into_diagnostic()?;
            match format {
                OutputFormat::Table => print_table(&records),
                OutputFormat::Csv => {
                    let stdout = io::stdout();
                    HistoryWriter::new(stdout.lock())
                        .write_records(&records)
                        .into_diagnostic()?;
                }
                OutputFormat::Json => println!(
                    "{}",
                    serde_json::to_string_pretty(&records).into_diagnostic()?
                ),
            }
        }
        Command::Total { owner } => {
            let total = desk.success_total(&owner).await.into_diagnostic()?;
            println!("{}", total.normalize());
        }
        Command::Setting { action } => match action {
            SettingAction::Get { key, owner } => {
                let value = match owner {
                    Some(owner) => stores.settings.user_setting(&owner, &key).await,
                    None => stores.settings.global_setting(&key).await,
                }
                .into_diagnostic()?;
                println!("{}", value.unwrap_or(Value::Null));
            }
            SettingAction::Set { key, value, owner } => {
                let value = parse_value(&value);
                match owner {
                    Some(owner) => stores.settings.set_user_setting(&owner, &key, value).await,
                    None => stores.settings.set_global_setting(&key, value).await,
                }
                .into_diagnostic()?;
            }
        },
        Command::Resolve {
            method,
            token,
            url,
            probe,
        } => {
            let resolver = probe.resolver()?;
            match resolver
                .resolve(token.as_deref(), &method, url.as_deref())
                .await
            {
                Resolution::Definitive(resolved) => println!(
                    "{}",
                    serde_json::to_string(&resolved).into_diagnostic()?
                ),
                Resolution::Indeterminate => println!("indeterminate"),
            }
        }
        Command::Va { id, probe } => {
            let record = desk
                .get(&id)
                .await
                .into_diagnostic()?
                .ok_or_else(|| miette!("Payment {} not found", id))?;
            let token = record
                .token()
                .ok_or_else(|| miette!("Payment {} has no token", id))?;
            let va_number = probe
                .http_probe()?
                .virtual_account(token)
                .await
                .into_diagnostic()?
                .ok_or_else(|| miette!("No virtual account issued for payment {}", id))?;

            let mut patch = Details::new();
            patch.insert(detail_keys::VA_NUMBER.to_string(), Value::from(va_number.as_str()));
            desk.attach_details(&id, patch).await.into_diagnostic()?;
            println!("{}", va_number);
        }
        Command::Watch {
            schedule,
            probe,
            once,
        } => {
            let scheduler = ReconciliationScheduler::new(
                Arc::clone(&stores.payments),
                Arc::new(probe.resolver()?),
                NotificationGate::new(Arc::new(StdoutSink::new())),
                SchedulerConfig::from_parts(
                    schedule.tick_interval_seconds,
                    schedule.max_concurrency,
                    schedule.max_age_minutes,
                    schedule.check_timeout_seconds,
                ),
            );

            if once {
                let report = scheduler.tick().await.into_diagnostic()?;
                info!(
                    checked = report.checked,
                    succeeded = report.succeeded,
                    cancelled = report.cancelled,
                    failed = report.failed,
                    "watch: single tick finished"
                );
            } else {
                let (shutdown_tx, shutdown_rx) = watch::channel(false);
                tokio::spawn(async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        info!("watch: shutdown requested");
                        let _ = shutdown_tx.send(true);
                    }
                });
                scheduler.run(shutdown_rx).await.into_diagnostic()?;
            }
        }
    }

    Ok(())
}
