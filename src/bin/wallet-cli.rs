use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "wallet-cli")]
#[command(about = "Management CLI for the custodial wallet core", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8081")]
    url: String,

    #[arg(short, long, env = "WALLET_ADMIN_KEY", default_value = "admin-secret-key")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show scheduler, scanner, collection and ledger status
    Status,
    /// Control the block scanner
    #[command(subcommand)]
    Scanner(ScannerCommand),
    /// Control fund collection
    #[command(subcommand)]
    Collection(CollectionCommand),
    /// Show ledger balances of an address
    Balance {
        address: String,
        #[arg(short, long)]
        symbol: Option<String>,
    },
    /// Show the scan cursor of every currency
    Cursors,
    /// Look up a ledger bill by transaction hash
    Bill { txid: String },
}

#[derive(Subcommand)]
enum ScannerCommand {
    Start,
    Stop,
    Status,
    /// Run one scan cycle for every enabled currency
    ScanOnce,
    /// Rescan an explicit block range for a set of addresses
    ScanRange {
        symbol: String,
        start: u64,
        end: u64,
        /// Addresses to look for; repeat the flag for several
        #[arg(short, long = "address", required = true)]
        addresses: Vec<String>,
    },
}

#[derive(Subcommand)]
enum CollectionCommand {
    Start {
        /// Seconds between passes; the server default applies when omitted
        #[arg(short, long)]
        interval_secs: Option<u64>,
    },
    Stop,
    Status,
    /// Run one collection pass now
    Trigger,
    /// Sweep one address regardless of the threshold
    Collect { symbol: String, address: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
    );

    let base = cli.url.trim_end_matches('/');
    let request = match cli.command {
        Commands::Status => client.get(format!("{base}/admin/status")),
        Commands::Scanner(cmd) => match cmd {
            ScannerCommand::Start => client.post(format!("{base}/admin/scanner/start")),
            ScannerCommand::Stop => client.post(format!("{base}/admin/scanner/stop")),
            ScannerCommand::Status => client.get(format!("{base}/admin/scanner/status")),
            ScannerCommand::ScanOnce => client.post(format!("{base}/admin/scanner/scan-once")),
            ScannerCommand::ScanRange {
                symbol,
                start,
                end,
                addresses,
            } => client
                .post(format!("{base}/admin/scanner/scan-range"))
                .json(&json!({
                    "symbol": symbol,
                    "start": start,
                    "end": end,
                    "addresses": addresses,
                })),
        },
        Commands::Collection(cmd) => match cmd {
            CollectionCommand::Start { interval_secs } => {
                let request = client.post(format!("{base}/admin/collection/start"));
                match interval_secs {
                    Some(secs) => request.query(&[("interval_secs", secs)]),
                    None => request,
                }
            }
            CollectionCommand::Stop => client.post(format!("{base}/admin/collection/stop")),
            CollectionCommand::Status => client.get(format!("{base}/admin/collection/status")),
            CollectionCommand::Trigger => client.post(format!("{base}/admin/collection/trigger")),
            CollectionCommand::Collect { symbol, address } => client
                .post(format!("{base}/admin/collection/collect"))
                .json(&json!({ "symbol": symbol, "address": address })),
        },
        Commands::Balance { address, symbol } => {
            let request = client.get(format!("{base}/admin/balances/{address}"));
            match symbol {
                Some(symbol) => request.query(&[("symbol", symbol)]),
                None => request,
            }
        }
        Commands::Cursors => client.get(format!("{base}/admin/cursors")),
        Commands::Bill { txid } => client.get(format!("{base}/admin/bills/{txid}")),
    };

    let res = request.headers(headers).send().await?;
    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: Admin API returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        std::process::exit(1);
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
