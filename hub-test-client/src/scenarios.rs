use crate::api_client::ApiClient;
use crate::ws_client::Connection;
use anyhow::Result;
use colored::*;
use serde_json::json;
use std::time::{Duration, Instant};

const EVENT_TIMEOUT: Duration = Duration::from_secs(5);
const SILENCE_WINDOW: Duration = Duration::from_millis(500);

#[derive(Debug)]
pub struct TestResult {
    pub scenario_name: String,
    pub passed: bool,
    pub message: Option<String>,
    pub duration: Duration,
}

impl TestResult {
    fn from_outcome(scenario_name: &str, started: Instant, outcome: Result<()>) -> Self {
        let duration = started.elapsed();
        match outcome {
            Ok(()) => {
                println!("{} {} passed", "✓".green(), scenario_name);
                Self {
                    scenario_name: scenario_name.to_string(),
                    passed: true,
                    message: None,
                    duration,
                }
            }
            Err(e) => {
                println!("{} {} failed: {:#}", "✗".red(), scenario_name, e);
                Self {
                    scenario_name: scenario_name.to_string(),
                    passed: false,
                    message: Some(format!("{:#}", e)),
                    duration,
                }
            }
        }
    }
}

fn unique_payload(scenario: &str) -> serde_json::Value {
    json!({ "scenario": scenario, "marker": uuid::Uuid::new_v4().to_string() })
}

/// Health endpoint answers, plain HTTP on the socket path is refused, and two sockets get
/// distinct ids.
pub async fn test_connection(
    api_client: &ApiClient,
    socket_path: &str,
    conn1: &Connection,
    conn2: &Connection,
) -> Result<TestResult> {
    println!("\n{}", "Scenario: connection".bright_white().bold());
    let started = Instant::now();

    let outcome = async {
        api_client.check_health().await?;
        println!("{} /health responded healthy", "→".blue());

        api_client.check_upgrade_required(socket_path).await?;
        println!("{} plain GET {} refused with 426", "→".blue(), socket_path);

        if conn1.connection_id == conn2.connection_id {
            anyhow::bail!("Both connections were assigned {}", conn1.connection_id);
        }
        println!(
            "{} {} = {}, {} = {}",
            "→".blue(),
            conn1.label,
            conn1.connection_id,
            conn2.label,
            conn2.connection_id
        );
        anyhow::Ok(())
    }
    .await;

    Ok(TestResult::from_outcome("connection", started, outcome))
}

/// The sender gets its own payload back as a `message` envelope; malformed frames get nothing.
pub async fn test_echo(conn: &mut Connection) -> Result<TestResult> {
    println!("\n{}", "Scenario: echo".bright_white().bold());
    let started = Instant::now();

    let outcome = async {
        conn.drain();
        conn.send_raw("{this is not json").await?;
        conn.expect_silence(SILENCE_WINDOW).await?;
        println!("{} malformed frame produced no envelope", "→".blue());

        let payload = unique_payload("echo");
        let sent_at = Instant::now();
        conn.send_json(&payload).await?;
        let ack = conn
            .wait_for_payload("message", &payload, EVENT_TIMEOUT)
            .await?;
        println!(
            "{} ack received in {:?}",
            "→".blue(),
            ack.received_at.duration_since(sent_at)
        );
        anyhow::Ok(())
    }
    .await;

    Ok(TestResult::from_outcome("echo", started, outcome))
}

/// One client's payload reaches the other as a `broadcast` tagged with the sender's id.
pub async fn test_broadcast(
    sender: &mut Connection,
    receiver: &mut Connection,
) -> Result<TestResult> {
    println!("\n{}", "Scenario: broadcast".bright_white().bold());
    let started = Instant::now();

    let outcome = async {
        let payload = unique_payload("broadcast");
        sender.send_json(&payload).await?;

        sender
            .wait_for_payload("message", &payload, EVENT_TIMEOUT)
            .await?;
        let relayed = receiver
            .wait_for_payload("broadcast", &payload, EVENT_TIMEOUT)
            .await?;

        if relayed.body["from"] != sender.connection_id.as_str() {
            anyhow::bail!(
                "broadcast attributed to {} instead of {}",
                relayed.body["from"],
                sender.connection_id
            );
        }
        println!(
            "{} {} relayed to {}",
            "→".blue(),
            sender.label,
            receiver.label
        );
        anyhow::Ok(())
    }
    .await;

    Ok(TestResult::from_outcome("broadcast", started, outcome))
}

/// After a peer disconnects, it no longer receives anything and the remaining client still
/// gets its own acknowledgement.
pub async fn test_disconnect(socket_url: &str) -> Result<TestResult> {
    println!("\n{}", "Scenario: disconnect".bright_white().bold());
    let started = Instant::now();

    let outcome = async {
        let leaving =
            Connection::establish(socket_url, "Leaving client".to_string(), EVENT_TIMEOUT).await?;
        let mut staying =
            Connection::establish(socket_url, "Staying client".to_string(), EVENT_TIMEOUT).await?;

        leaving.close().await?;
        // Give the server a moment to process the close frame.
        tokio::time::sleep(Duration::from_millis(200)).await;
        staying.drain();

        let payload = unique_payload("disconnect");
        staying.send_json(&payload).await?;
        staying
            .wait_for_payload("message", &payload, EVENT_TIMEOUT)
            .await?;
        staying.expect_silence(SILENCE_WINDOW).await?;
        println!("{} only the ack arrived after peer left", "→".blue());

        staying.close().await
    }
    .await;

    Ok(TestResult::from_outcome("disconnect", started, outcome))
}
