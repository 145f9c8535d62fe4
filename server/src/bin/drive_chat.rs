//! Interactive terminal chat that searches Google Drive through the broker.

use async_trait::async_trait;
use clap::Parser;
use color_eyre::eyre::WrapErr;
use drive_broker::{
    client::{
        gemini::GeminiClient, mcp_client::McpHttpClient, settings::ChatSettings, AuthPrompt,
        Orchestrator,
    },
    oauth::ClientId,
    telemetry::setup_tracing,
    tools::CHECK_AUTHENTICATION_STATUS,
};
use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

#[derive(Parser, Debug)]
#[command(name = "drive-chat", about = "Chat with Gemini about your Google Drive")]
struct Cli {
    /// Base URL of the drive broker
    #[arg(default_value = "http://localhost:8081")]
    server_url: String,

    /// Reuse a client id from an earlier session instead of generating one
    #[arg(long, env = "DRIVE_CHAT_CLIENT_ID")]
    client_id: Option<String>,
}

struct TerminalPrompt;

#[async_trait]
impl AuthPrompt for TerminalPrompt {
    async fn authorization_required(&self, url: &str) {
        println!("Authentication needed with Google Drive.");
        println!("Open the following URL in your browser to authenticate: {url}");
    }

    async fn still_waiting(&self) {
        println!("Waiting for authentication to complete...");
    }

    async fn authenticated(&self) {
        println!("Authenticated with Google Drive.");
    }
}

const HELP: &str = "Available commands:
  help          Show this message
  quit, exit    Exit the chat
  login         Authenticate with Google Drive
  tools         List available tools
  status        Show authentication status";

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    dotenv::dotenv().ok();
    setup_tracing("warn,drive_broker=info")?;

    let cli = Cli::parse();
    let settings = ChatSettings::from_env()?;

    let client_id = match cli.client_id {
        Some(raw) => ClientId::parse(&raw)?,
        None => ClientId::generate(),
    };

    let http = reqwest::Client::builder()
        .use_rustls_tls()
        .build()
        .wrap_err("Failed to build HTTP client")?;

    let mcp = McpHttpClient::new(http.clone(), &cli.server_url, client_id.to_string());
    let info = mcp
        .initialize()
        .await
        .wrap_err_with(|| format!("Could not connect to {}", cli.server_url))?;

    let model = GeminiClient::new(
        http,
        &settings.gemini_api_url,
        settings.gemini_api_key.clone(),
        settings.model.clone(),
        settings.generation.clone(),
    );
    let orchestrator = Orchestrator::new(
        mcp,
        model,
        settings.auth_poll_interval,
        settings.auth_wait_timeout,
    );

    println!("\nConnected to {} {}", info.server_info.name, info.server_info.version);
    println!("Type your queries or 'help' to know available commands.");
    println!("Using client ID: {client_id}");

    let tools = orchestrator
        .list_tools()
        .await
        .wrap_err("Failed to list tools")?;
    let names: Vec<_> = tools.iter().map(|tool| tool.name.as_str()).collect();
    println!("Available tools: {}", names.join(", "));

    let prompt = TerminalPrompt;
    if let Err(err) = orchestrator.ensure_authenticated(&prompt).await {
        println!("Authentication did not complete: {err}");
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        stdout.write_all(b"\nQuery: ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let query = line.trim();

        match query.to_lowercase().as_str() {
            "" => continue,
            "help" => println!("{HELP}"),
            "quit" | "exit" => break,
            "login" => {
                if let Err(err) = orchestrator.ensure_authenticated(&prompt).await {
                    println!("Error: {err}");
                }
            }
            "tools" => match orchestrator.list_tools().await {
                Ok(tools) => {
                    for tool in tools {
                        println!("Tool: {}\nDescription: {}\n", tool.name, tool.description);
                    }
                }
                Err(err) => println!("Error: {err}"),
            },
            "status" => match orchestrator
                .mcp()
                .call_tool(CHECK_AUTHENTICATION_STATUS, json!({}))
                .await
            {
                Ok(response) => println!("{}", response.text()),
                Err(err) => println!("Error: {err}"),
            },
            _ => match orchestrator.query(query, &prompt).await {
                Ok(answer) => println!("{answer}"),
                Err(err) => println!("Error: {err}"),
            },
        }
    }

    Ok(())
}
