use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result, miette};
use payment_orchestrator::application::orchestrator::{HealthStatus, PaymentOrchestrator};
use payment_orchestrator::config::ServiceConfig;
use payment_orchestrator::domain::payment::PaymentResponse;
use payment_orchestrator::domain::ports::{
    BankingGatewayBox, CacheBox, CardVaultBox, EventPublisherBox, PaymentStoreBox,
};
use payment_orchestrator::infrastructure::banking::HttpBankingGateway;
use payment_orchestrator::infrastructure::cache::TtlCache;
use payment_orchestrator::infrastructure::encryption::AesCardVault;
use payment_orchestrator::infrastructure::events::LogEventPublisher;
use payment_orchestrator::infrastructure::in_memory::InMemoryPaymentStore;
#[cfg(feature = "storage-rocksdb")]
use payment_orchestrator::infrastructure::rocksdb::RocksDBStore;
use payment_orchestrator::infrastructure::simulated::SimulatedBankingGateway;
use payment_orchestrator::interfaces::csv::batch::BatchRunner;
use payment_orchestrator::interfaces::csv::payment_reader::PaymentReader;
use payment_orchestrator::interfaces::csv::result_writer::ResultWriter;
use payment_orchestrator::telemetry::{self, LogFormat};
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long, global = true)]
    db_path: Option<PathBuf>,

    #[arg(long, value_enum, env = "LOG_FORMAT", default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    /// Default log filter, overridden by RUST_LOG.
    #[arg(long, env = "LOG_LEVEL", default_value = "warn", global = true)]
    log_level: String,

    #[command(flatten)]
    service: ServiceConfig,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Process payment, refund and status rows from a CSV file, one outcome row per input row
    Process {
        /// Input CSV file
        input: PathBuf,
    },
    /// Report the health of the store, the banking API and the event publisher
    Health,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    telemetry::init_tracing(&cli.log_level, cli.log_format).into_diagnostic()?;

    let orchestrator = build_orchestrator(cli.db_path.as_deref(), &cli.service)?;

    match cli.command {
        Command::Process { input } => process(&orchestrator, &input).await,
        Command::Health => health(&orchestrator).await,
    }
}

fn build_store(db_path: Option<&Path>) -> Result<PaymentStoreBox> {
    match db_path {
        #[cfg(feature = "storage-rocksdb")]
        Some(path) => Ok(Arc::new(RocksDBStore::open(path).into_diagnostic()?)),
        #[cfg(not(feature = "storage-rocksdb"))]
        Some(_) => {
            eprintln!(
                "WARNING: Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
            );
            Ok(Arc::new(InMemoryPaymentStore::new()))
        }
        None => Ok(Arc::new(InMemoryPaymentStore::new())),
    }
}

fn build_orchestrator(
    db_path: Option<&Path>,
    service: &ServiceConfig,
) -> Result<PaymentOrchestrator> {
    let store = build_store(db_path)?;

    let gateway: BankingGatewayBox = match &service.banking_api_url {
        Some(url) => Arc::new(
            HttpBankingGateway::new(url.clone(), service.gateway_timeout()).into_diagnostic()?,
        ),
        None => Arc::new(
            SimulatedBankingGateway::new()
                .with_decline_suffix(Some(service.simulated_decline_suffix.clone())),
        ),
    };
    let vault: CardVaultBox =
        Arc::new(AesCardVault::new(&service.encryption_key).into_diagnostic()?);
    let cache: CacheBox<PaymentResponse> = Arc::new(TtlCache::with_sweeper(
        service.cache_max_size,
        service.cache_sweep_interval(),
    ));
    let events: EventPublisherBox = Arc::new(LogEventPublisher::new(service.event_logging_enabled));

    Ok(PaymentOrchestrator::new(
        store,
        gateway,
        vault,
        cache,
        events,
        service.orchestrator_config(),
    ))
}

async fn process(orchestrator: &PaymentOrchestrator, input: &Path) -> Result<()> {
    let file = File::open(input).into_diagnostic()?;
    let reader = PaymentReader::new(file);
    let mut runner = BatchRunner::new(orchestrator);
    let mut writer = ResultWriter::new(io::stdout());

    for record in reader.records() {
        match record {
            Ok(record) => {
                let row = runner.process(record).await;
                writer.write_row(&row).into_diagnostic()?;
            }
            Err(e) => {
                eprintln!("Error reading record: {}", e);
            }
        }
    }

    writer.flush().into_diagnostic()?;
    Ok(())
}

async fn health(orchestrator: &PaymentOrchestrator) -> Result<()> {
    let report = orchestrator.health_check().await;
    println!("{}", serde_json::to_string_pretty(&report).into_diagnostic()?);
    if report.status == HealthStatus::Unhealthy {
        return Err(miette!("one or more services are unhealthy"));
    }
    Ok(())
}
