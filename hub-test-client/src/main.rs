use anyhow::Result;
use clap::Parser;
use colored::*;
use std::time::Duration;

mod api_client;
mod output;
mod scenarios;
mod ws_client;

use api_client::ApiClient;
use output::print_test_summary;
use ws_client::Connection;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(name = "hub-test-client")]
#[command(about = "Relay hub WebSocket integration testing tool")]
struct Cli {
    /// Base URL of the relay server (e.g., http://localhost:4000)
    #[arg(long, default_value = "http://localhost:4000")]
    base_url: String,

    /// Path the WebSocket endpoint is mounted on
    #[arg(long, default_value = "/api/socket")]
    socket_path: String,

    /// Test scenario to run
    #[arg(long, value_enum, default_value = "all")]
    scenario: ScenarioChoice,

    /// Enable verbose output
    #[arg(long, short)]
    verbose: bool,
}

#[derive(clap::ValueEnum, Clone)]
enum ScenarioChoice {
    /// Health check, 426 on plain HTTP, and distinct connection ids
    ConnectionTest,
    /// Sender receives its own payload back
    EchoTest,
    /// Payload is relayed to the other client
    BroadcastTest,
    /// Departed clients stop receiving broadcasts
    DisconnectTest,
    /// Run every scenario
    All,
}

fn socket_url(base_url: &str, socket_path: &str) -> String {
    let base = base_url.trim_end_matches('/');
    let ws_base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else {
        base.to_string()
    };
    format!("{}{}", ws_base, socket_path)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Debug)
            .init();
    }

    println!("{}", "=== SETUP PHASE ===".bright_white().bold());

    let base_url = cli.base_url.trim_end_matches('/').to_string();
    let socket_url = socket_url(&base_url, &cli.socket_path);
    let api_client = ApiClient::new(reqwest::Client::new(), base_url);

    println!("\n{} Establishing WebSocket connections...", "→".blue());
    let mut conn1 =
        Connection::establish(&socket_url, "Client 1".to_string(), CONNECT_TIMEOUT).await?;
    let mut conn2 =
        Connection::establish(&socket_url, "Client 2".to_string(), CONNECT_TIMEOUT).await?;

    println!(
        "{} Client 1 connected (ID: {})",
        "✓".green(),
        conn1.connection_id
    );
    println!(
        "{} Client 2 connected (ID: {})",
        "✓".green(),
        conn2.connection_id
    );

    println!("\n{}", "=== TEST PHASE ===".bright_white().bold());

    let mut results = Vec::new();

    match cli.scenario {
        ScenarioChoice::ConnectionTest => {
            results.push(
                scenarios::test_connection(&api_client, &cli.socket_path, &conn1, &conn2).await?,
            );
        }
        ScenarioChoice::EchoTest => {
            results.push(scenarios::test_echo(&mut conn1).await?);
        }
        ScenarioChoice::BroadcastTest => {
            results.push(scenarios::test_broadcast(&mut conn1, &mut conn2).await?);
        }
        ScenarioChoice::DisconnectTest => {
            results.push(scenarios::test_disconnect(&socket_url).await?);
        }
        ScenarioChoice::All => {
            results.push(
                scenarios::test_connection(&api_client, &cli.socket_path, &conn1, &conn2).await?,
            );
            results.push(scenarios::test_echo(&mut conn1).await?);
            conn2.drain();
            results.push(scenarios::test_broadcast(&mut conn1, &mut conn2).await?);
            results.push(scenarios::test_disconnect(&socket_url).await?);
        }
    }

    conn1.close().await?;
    conn2.close().await?;

    println!("\n{}", "=== RESULTS ===".bright_white().bold());
    print_test_summary(&results);

    let all_passed = results.iter().all(|r| r.passed);

    if all_passed {
        println!("\n{}", "All tests passed! ✓".bright_green().bold());
    } else {
        println!("\n{}", "Some tests failed! ✗".bright_red().bold());
    }

    std::process::exit(if all_passed { 0 } else { 1 });
}
