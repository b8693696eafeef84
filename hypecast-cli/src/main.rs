//! hypecast-cli — terminal front end for the Hypecast HTTP API
//!
//! # Subcommands
//! - `status`                                       — show server health
//! - `events [-n <limit>] [--refresh]`              — list ranked events and their angles
//! - `generate <event_id>... [-p <platform>]... [--json]` — generate posts
//! - `export [--output-dir <dir>]`                  — write the current results to disk

use clap::{Parser, Subcommand};
use serde::Deserialize;

const DEFAULT_SERVER: &str = "http://127.0.0.1:8787";
const DEFAULT_LIMIT: usize = 20;

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Debug, Parser)]
#[command(
    name = "hypecast-cli",
    version,
    about = "Hypecast social content generator — HTTP API client"
)]
struct Cli {
    /// Hypecast HTTP server URL (overrides HYPECAST_HTTP_URL env var)
    #[arg(long, env = "HYPECAST_HTTP_URL", default_value = DEFAULT_SERVER)]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Show Hypecast server status
    Status,

    /// List top events with their content angles
    Events {
        /// Maximum number of events to show
        #[arg(short = 'n', long, default_value_t = DEFAULT_LIMIT)]
        limit: usize,

        /// Drop cached warehouse rows before listing
        #[arg(long)]
        refresh: bool,
    },

    /// Generate posts for the given event ids
    Generate {
        #[arg(required = true)]
        event_ids: Vec<String>,

        /// Target platform (tiktok, instagram, twitter); repeatable
        #[arg(short, long = "platform")]
        platforms: Vec<String>,

        /// Print the raw batch report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Export current results as JSON and text files
    Export {
        /// Directory on the server host (defaults to export.output_dir)
        #[arg(long)]
        output_dir: Option<String>,
    },
}

// ============================================================================
// API Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct EventSummary {
    pub event_id: String,
    pub artist_name: String,
    pub event_name: String,
    pub venue_city: String,
    pub venue_country: String,
    pub rank: u32,
}

#[derive(Debug, Deserialize)]
pub struct EventListing {
    pub event: EventSummary,
    pub angles: Vec<String>,
    pub primary_angle: String,
    pub priority: u8,
}

#[derive(Debug, Deserialize)]
pub struct EventsResponse {
    pub count: usize,
    pub total: usize,
    pub events: Vec<EventListing>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Generated { visual_text: String, caption: String },
    Failed { reason: String },
}

#[derive(Debug, Deserialize)]
pub struct ResultItem {
    pub event_id: String,
    pub artist_name: String,
    pub platform: String,
    pub angle: String,
    pub priority: u8,
    pub outcome: Outcome,
}

#[derive(Debug, Deserialize)]
pub struct BatchResponse {
    pub results: Vec<ResultItem>,
    pub succeeded: usize,
    pub failed: usize,
    pub elapsed_ms: u64,
}

#[derive(Debug, Deserialize)]
pub struct ExportResponse {
    pub json_file: String,
    pub text_file: String,
    #[serde(default)]
    pub csv_file: Option<String>,
    pub items: usize,
}

// ============================================================================
// Rendering
// ============================================================================

/// `"snake_case"` angle → `"Snake Case"`.
pub fn angle_label(angle: &str) -> String {
    angle
        .split('_')
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn render_events(resp: &EventsResponse) -> String {
    let mut out = String::new();
    for warning in &resp.warnings {
        out.push_str(&format!("⚠️  {}\n", warning));
    }
    if resp.events.is_empty() {
        out.push_str("No events found\n");
        return out;
    }

    for item in &resp.events {
        let e = &item.event;
        let rank = if e.rank == 0 { "-".to_string() } else { e.rank.to_string() };
        out.push_str(&format!(
            "#{:<3} {} — {} ({}, {})\n",
            rank, e.artist_name, e.event_name, e.venue_city, e.venue_country
        ));
        let angles: Vec<String> = item.angles.iter().map(|a| angle_label(a)).collect();
        out.push_str(&format!(
            "     id: {} | priority {}/10 | {}\n",
            e.event_id,
            item.priority,
            angles.join(", ")
        ));
    }
    out.push_str(&format!("\nShowing {} of {} events\n", resp.count, resp.total));
    out
}

pub fn render_batch(resp: &BatchResponse) -> String {
    let mut out = String::new();
    for item in &resp.results {
        out.push_str(&format!(
            "\n[{}] {} | {} | priority {}/10\n",
            item.platform,
            item.artist_name,
            angle_label(&item.angle),
            item.priority
        ));
        match &item.outcome {
            Outcome::Generated {
                visual_text,
                caption,
            } => {
                out.push_str(&format!("  Visual:  {}\n", visual_text));
                out.push_str(&format!("  Caption: {}\n", caption));
            }
            Outcome::Failed { reason } => {
                out.push_str(&format!("  ❌ {} ({})\n", reason, item.event_id));
            }
        }
    }
    out.push_str(&format!(
        "\n{} generated, {} failed in {:.1}s\n",
        resp.succeeded,
        resp.failed,
        resp.elapsed_ms as f64 / 1000.0
    ));
    out
}

// ============================================================================
// HTTP Client Calls
// ============================================================================

fn client(timeout_secs: u64) -> anyhow::Result<reqwest::blocking::Client> {
    Ok(reqwest::blocking::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()?)
}

/// Send a request, exit on transport or HTTP errors, decode the body.
fn call<T: for<'de> Deserialize<'de>>(request: reqwest::blocking::RequestBuilder, url: &str) -> T {
    let resp = match request.send() {
        Ok(r) => r,
        Err(e) => {
            eprintln!("hypecast-cli: connection failed to {}: {}", url, e);
            std::process::exit(1);
        }
    };

    if !resp.status().is_success() {
        let status = resp.status();
        let body: serde_json::Value = resp.json().unwrap_or_default();
        eprintln!(
            "hypecast-cli: server returned {}: {}",
            status,
            body["error"].as_str().unwrap_or("unknown error")
        );
        std::process::exit(1);
    }

    match resp.json() {
        Ok(r) => r,
        Err(e) => {
            eprintln!("hypecast-cli: failed to parse response from {}: {}", url, e);
            std::process::exit(1);
        }
    }
}

fn do_status(server: &str) -> anyhow::Result<()> {
    let url = format!("{}/health", server);

    match client(10)?.get(&url).send() {
        Ok(r) if r.status().is_success() => {
            let body: serde_json::Value = r.json().unwrap_or_default();
            println!("Hypecast server: {}", body["status"].as_str().unwrap_or("unknown"));
            println!("Version:         {}", body["version"].as_str().unwrap_or("?"));
            println!("Warehouse:       {}", body["warehouse"].as_str().unwrap_or("?"));
            println!("Source:          {}", body["source"].as_str().unwrap_or("?"));
            println!(
                "Generator:       {} ({})",
                body["generator"].as_str().unwrap_or("?"),
                body["generator_status"].as_str().unwrap_or("unchecked")
            );
            println!("Model:           {}", body["model"].as_str().unwrap_or("?"));
        }
        Ok(r) => {
            let status = r.status();
            let body: serde_json::Value = r.json().unwrap_or_default();
            eprintln!(
                "hypecast-cli: server unhealthy (HTTP {}): {}",
                status,
                body["error"].as_str().unwrap_or("unknown error")
            );
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("hypecast-cli: cannot reach {}: {}", url, e);
            std::process::exit(1);
        }
    }

    Ok(())
}

fn do_events(server: &str, limit: usize, refresh: bool) -> anyhow::Result<()> {
    let url = format!("{}/events", server);
    let request = client(60)?
        .get(&url)
        .query(&[("limit", limit.to_string()), ("refresh", refresh.to_string())]);

    let resp: EventsResponse = call(request, &url);
    print!("{}", render_events(&resp));
    Ok(())
}

fn do_generate(
    server: &str,
    event_ids: Vec<String>,
    platforms: Vec<String>,
    json_output: bool,
) -> anyhow::Result<()> {
    let url = format!("{}/generate", server);
    let body = serde_json::json!({
        "event_ids": event_ids,
        "platforms": platforms,
    });

    // batches call the model sequentially; allow for slow runs
    let request = client(600)?.post(&url).json(&body);

    if json_output {
        let report: serde_json::Value = call(request, &url);
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        let report: BatchResponse = call(request, &url);
        print!("{}", render_batch(&report));
    }
    Ok(())
}

fn do_export(server: &str, output_dir: Option<String>) -> anyhow::Result<()> {
    let url = format!("{}/export", server);
    let request = client(30)?
        .post(&url)
        .json(&serde_json::json!({ "output_dir": output_dir }));

    let resp: ExportResponse = call(request, &url);
    println!("Exported {} items", resp.items);
    println!("JSON: {}", resp.json_file);
    println!("Text: {}", resp.text_file);
    if let Some(csv) = &resp.csv_file {
        println!("CSV:  {}", csv);
    }
    Ok(())
}

// ============================================================================
// Main
// ============================================================================

fn main() {
    let cli = Cli::parse();
    let server = cli.server.trim_end_matches('/').to_string();

    let result = match cli.command {
        Commands::Status => do_status(&server),
        Commands::Events { limit, refresh } => do_events(&server, limit, refresh),
        Commands::Generate {
            event_ids,
            platforms,
            json,
        } => do_generate(&server, event_ids, platforms, json),
        Commands::Export { output_dir } => do_export(&server, output_dir),
    };

    if let Err(e) = result {
        eprintln!("hypecast-cli: {}", e);
        std::process::exit(1);
    }
}

// ============================================================================
// Tests
// ============================================================================
