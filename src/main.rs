use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use clap::{Parser, ValueEnum};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing_subscriber::EnvFilter;

use leadflow::api::extract::{TEAM_ID_HEADER, USER_ID_HEADER, USER_NAME_HEADER, USER_ROLE_HEADER};
use leadflow::config::{NodeConfig, RotationConfig};
use leadflow::model::{Lead, Role};
use leadflow::node::Node;
use leadflow::rotation::LineupView;
use leadflow::shutdown::install_shutdown_handler;

#[derive(Parser, Debug)]
#[command(name = "leadflow")]
#[command(version)]
#[command(about = "Lead intake and closer rotation for sales teams")]
#[command(propagate_version = true)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Start the leadflow server
    Server(ServerArgs),

    /// Lead commands
    Lead {
        #[command(flatten)]
        client: ClientArgs,

        #[command(subcommand)]
        command: LeadCommands,
    },

    /// Show the closer lineup for your team
    Lineup {
        #[command(flatten)]
        client: ClientArgs,
    },

    /// Closer commands
    Closer {
        #[command(flatten)]
        client: ClientArgs,

        #[command(subcommand)]
        command: CloserCommands,
    },
}

// =============================================================================
// Server Arguments
// =============================================================================

#[derive(Parser, Debug)]
struct ServerArgs {
    /// Address to bind the HTTP API to
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Port for the HTTP API
    #[arg(long, default_value = "8080")]
    port: u16,

    /// JSON file the store is loaded from at startup and saved to at shutdown
    #[arg(long)]
    data_file: Option<PathBuf>,

    /// Quiet period after the last change before auto-assignment runs
    #[arg(long, default_value = "1000")]
    debounce_ms: u64,

    /// How often scheduled leads are re-checked against the clock
    #[arg(long, default_value = "30")]
    promoter_interval_secs: u64,

    /// Reject new leads once the store holds this many
    #[arg(long, default_value = "100000")]
    max_leads: usize,
}

// =============================================================================
// Client Arguments
// =============================================================================

#[derive(Parser, Debug)]
struct ClientArgs {
    /// Server address
    #[arg(long, short = 'a', default_value = "http://127.0.0.1:8080")]
    addr: String,

    /// Your user id
    #[arg(long, env = "LEADFLOW_USER")]
    user: String,

    /// Your display name (defaults to the user id)
    #[arg(long, env = "LEADFLOW_NAME")]
    name: Option<String>,

    /// Your role: setter, closer, manager or admin
    #[arg(long, env = "LEADFLOW_ROLE")]
    role: Role,

    /// Your team id
    #[arg(long, env = "LEADFLOW_TEAM")]
    team: String,

    /// Output format
    #[arg(long, short = 'o', default_value = "table")]
    output: OutputFormat,
}

#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(clap::Subcommand, Debug)]
enum LeadCommands {
    /// Submit a new lead
    Submit {
        /// Customer name
        customer: String,

        /// Customer phone number
        #[arg(long)]
        phone: Option<String>,

        /// Appointment time (RFC 3339); makes this a scheduled lead
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },
    /// Show one lead
    Status {
        /// The lead ID (UUID)
        lead_id: String,
    },
    /// List leads on your team
    List {
        /// Only leads in this status (e.g. waiting_assignment)
        #[arg(long)]
        status: Option<String>,
    },
}

#[derive(Debug, Clone, ValueEnum)]
enum Duty {
    On,
    Off,
}

#[derive(clap::Subcommand, Debug)]
enum CloserCommands {
    /// Clock a closer in or out
    Duty {
        /// Closer uid
        uid: String,

        /// on or off
        status: Duty,
    },
}

// =============================================================================
// HTTP Client
// =============================================================================

struct ApiClient {
    http: reqwest::Client,
    base: String,
    args: ClientArgs,
}

impl ApiClient {
    fn new(args: ClientArgs) -> Self {
        Self {
            http: reqwest::Client::new(),
            base: args.addr.trim_end_matches('/').to_string(),
            args,
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let name = self.args.name.as_deref().unwrap_or(&self.args.user);
        self.http
            .request(method, format!("{}{}", self.base, path))
            .header(USER_ID_HEADER, &self.args.user)
            .header(USER_NAME_HEADER, name)
            .header(USER_ROLE_HEADER, self.args.role.to_string())
            .header(TEAM_ID_HEADER, &self.args.team)
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, Box<dyn std::error::Error>> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }
        let body: Value = response.json().await.unwrap_or(Value::Null);
        let message = body["error"].as_str().unwrap_or("request failed").to_string();
        Err(format!("{} ({})", message, status).into())
    }

    fn output(&self) -> &OutputFormat {
        &self.args.output
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

fn short(s: &str, max: usize) -> String {
    if s.chars().count() > max {
        let cut: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", cut)
    } else {
        s.to_string()
    }
}

fn print_lead(lead: &Lead) {
    println!("Lead ID:      {}", lead.id);
    println!("Customer:     {}", lead.customer_name);
    println!("Status:       {}", lead.status);
    println!("Team:         {}", lead.team_id);
    if let Some(ref closer) = lead.assigned_closer_name {
        println!("Closer:       {}", closer);
    }
    if let Some(ref setter) = lead.setter_name {
        println!("Setter:       {}", setter);
    }
    if let Some(at) = lead.scheduled_appointment_time {
        println!("Appointment:  {}", at.to_rfc3339());
        println!("Verified:     {}", if lead.setter_verified { "yes" } else { "no" });
    }
    println!("Created:      {}", lead.created_at.to_rfc3339());
}

// =============================================================================
// Server Implementation
// =============================================================================

async fn run_server(args: ServerArgs) -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let listen_addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let rotation = RotationConfig::default()
        .with_matcher_debounce(Duration::from_millis(args.debounce_ms))
        .with_promoter_interval(Duration::from_secs(args.promoter_interval_secs.max(1)));

    let mut config = NodeConfig::new(listen_addr)
        .with_max_leads(args.max_leads)
        .with_rotation(rotation);
    if let Some(path) = args.data_file {
        config = config.with_data_file(path);
    }

    tracing::info!(
        listen_addr = %config.listen_addr,
        data_file = ?config.data_file,
        max_leads = config.max_leads,
        debounce = ?config.rotation.matcher_debounce,
        promoter_interval = ?config.rotation.promoter_interval,
        "Starting leadflow"
    );

    let shutdown = install_shutdown_handler();
    let node = Node::open(config).await?;
    node.run(shutdown).await?;

    Ok(())
}

// =============================================================================
// Client Command Handlers
// =============================================================================

async fn handle_lead_submit(
    client: &ApiClient,
    customer: String,
    phone: Option<String>,
    at: Option<DateTime<Utc>>,
) -> Result<(), Box<dyn std::error::Error>> {
    let body = json!({
        "customerName": customer,
        "customerPhone": phone,
        "dispatchType": if at.is_some() { "scheduled" } else { "immediate" },
        "scheduledAppointmentTime": at,
    });
    let lead: Lead = client
        .send(client.request(reqwest::Method::POST, "/api/leads").json(&body))
        .await?;

    match client.output() {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&lead)?),
        OutputFormat::Table => {
            println!("Lead submitted successfully!");
            println!("Lead ID: {}", lead.id);
            println!("Status:  {}", lead.status);
        }
    }
    Ok(())
}

async fn handle_lead_status(client: &ApiClient, lead_id: String) -> Result<(), Box<dyn std::error::Error>> {
    let lead: Lead = client
        .send(client.request(reqwest::Method::GET, &format!("/api/leads/{}", lead_id)))
        .await?;

    match client.output() {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&lead)?),
        OutputFormat::Table => print_lead(&lead),
    }
    Ok(())
}

async fn handle_lead_list(client: &ApiClient, status: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let mut request = client.request(reqwest::Method::GET, "/api/leads");
    if let Some(ref status) = status {
        request = request.query(&[("status", status)]);
    }
    let leads: Vec<Lead> = client.send(request).await?;

    match client.output() {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&leads)?),
        OutputFormat::Table => {
            if leads.is_empty() {
                println!("No leads found.");
                return Ok(());
            }
            println!(
                "{:<38} {:<20} {:<20} CLOSER",
                "LEAD ID", "STATUS", "CUSTOMER"
            );
            println!("{}", "-".repeat(96));
            for lead in &leads {
                let closer = lead.assigned_closer_name.as_deref().unwrap_or("-");
                println!(
                    "{:<38} {:<20} {:<20} {}",
                    lead.id,
                    lead.status,
                    short(&lead.customer_name, 20),
                    closer
                );
            }
            println!();
            println!("{} lead(s)", leads.len());
        }
    }
    Ok(())
}

async fn handle_lineup(client: &ApiClient) -> Result<(), Box<dyn std::error::Error>> {
    let view: LineupView = client
        .send(client.request(reqwest::Method::GET, "/api/lineup"))
        .await?;

    match client.output() {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&view)?),
        OutputFormat::Table => {
            println!("Lineup for team {}", view.team_id);
            println!("{}", "=".repeat(40));
            println!(
                "On duty: {}   Available: {}",
                view.on_duty_count, view.available_count
            );
            println!();
            println!("{:<5} {:<24} {:<10} STATUS", "POS", "NAME", "ORDER");
            println!("{}", "-".repeat(50));
            for entry in &view.entries {
                let status = if entry.available { "[+] available" } else { "[-] busy" };
                println!(
                    "{:<5} {:<24} {:<10} {}",
                    entry.position,
                    short(&entry.name, 24),
                    entry.lineup_order,
                    status
                );
            }
        }
    }
    Ok(())
}

async fn handle_closer_duty(client: &ApiClient, uid: String, duty: Duty) -> Result<(), Box<dyn std::error::Error>> {
    let status = match duty {
        Duty::On => "On Duty",
        Duty::Off => "Off Duty",
    };
    let closer: Value = client
        .send(
            client
                .request(reqwest::Method::PUT, &format!("/api/closers/{}/duty", uid))
                .json(&json!({ "status": status })),
        )
        .await?;

    match client.output() {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&closer)?),
        OutputFormat::Table => println!("{} is now {}", uid, status),
    }
    Ok(())
}

// =============================================================================
// Main Entry Point
// =============================================================================

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    match args.command {
        Commands::Server(server_args) => {
            run_server(server_args).await?;
        }
        Commands::Lead { client, command } => {
            let client = ApiClient::new(client);
            match command {
                LeadCommands::Submit {
                    customer,
                    phone,
                    at,
                } => handle_lead_submit(&client, customer, phone, at).await?,
                LeadCommands::Status { lead_id } => handle_lead_status(&client, lead_id).await?,
                LeadCommands::List { status } => handle_lead_list(&client, status).await?,
            }
        }
        Commands::Lineup { client } => {
            handle_lineup(&ApiClient::new(client)).await?;
        }
        Commands::Closer { client, command } => {
            let client = ApiClient::new(client);
            match command {
                CloserCommands::Duty { uid, status } => {
                    handle_closer_duty(&client, uid, status).await?
                }
            }
        }
    }

    Ok(())
}
