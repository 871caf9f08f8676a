use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use docstore_gateway::buffers::{base64_decode_to_bytes, BufferPool};
use docstore_gateway::config::schema::ObservabilityConfig;
use docstore_gateway::config::{load_config, RemoteConfig};
use docstore_gateway::observability::logging;
use docstore_gateway::remote::{HttpMethod, OutboundRequest, RemoteExecutor, RequestBody};
use docstore_gateway::security::csrf::compute_token;
use docstore_gateway::soap::{ConfiguredWebservices, SoapClient};
use docstore_gateway::xml::XmlDocument;

#[derive(Parser)]
#[command(name = "docstore-cli")]
#[command(about = "Management CLI for the document store gateway", long_about = None)]
struct Cli {
    /// Log level for diagnostics written to stderr
    #[arg(long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute one outbound request and print the response
    Fetch {
        url: String,
        #[arg(short = 'X', long, default_value = "GET")]
        method: String,
        /// Request body
        #[arg(short, long)]
        data: Option<String>,
        #[arg(long)]
        content_type: Option<String>,
        /// Shape the response into XML
        #[arg(long)]
        xml: bool,
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
    /// Call a configured SOAP webservice with a payload file
    Soap {
        #[arg(short, long, default_value = "docstore.toml")]
        config: PathBuf,
        service: String,
        payload: PathBuf,
    },
    /// Compute the CSRF token for a client address and session id
    CsrfToken { client_ip: String, session_id: String },
    /// Decode a base64 file to stdout
    DecodeBase64 { file: PathBuf },
    /// Load and validate a configuration file
    CheckConfig { config: PathBuf },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    logging::init_logging(&ObservabilityConfig {
        log_level: cli.log_level.clone(),
        ..ObservabilityConfig::default()
    });

    match cli.command {
        Commands::Fetch {
            url,
            method,
            data,
            content_type,
            xml,
            timeout_ms,
        } => {
            let executor = RemoteExecutor::new(RemoteConfig::default(), BufferPool::shared());
            let mut request = OutboundRequest::new(HttpMethod::parse(&method), url);
            if let Some(data) = data {
                request = request.with_body(RequestBody::text(data, content_type.as_deref()));
            }
            if let Some(timeout_ms) = timeout_ms {
                request = request.with_timeout_ms(timeout_ms);
            }

            let output = if xml {
                executor.execute_xml(request).await.map(|doc| doc.to_string())
            } else {
                executor.execute_text(request).await
            };
            match output {
                Ok(body) => println!("{body}"),
                Err(e) => {
                    eprintln!("Error: {e}");
                    if let Some(status) = e.status() {
                        eprintln!("Status: {status}");
                    }
                    if let Some(debug) = e.debug_info() {
                        eprintln!("{debug}");
                    }
                    std::process::exit(1);
                }
            }
        }
        Commands::Soap { config, service, payload } => {
            let config = load_config(&config)?;
            let payload = std::fs::read_to_string(payload)?;
            let pool = Arc::new(BufferPool::new(config.buffers.max_retained));
            let executor = RemoteExecutor::new(config.remote.clone(), pool);
            let client = SoapClient::new(executor, Arc::new(ConfiguredWebservices::new(&config.webservices)));

            match client.call_str(&service, &payload).await {
                Ok(element) => println!("{}", XmlDocument::new(element)),
                Err(e) => {
                    eprintln!("{}", e.to_envelope(true));
                    std::process::exit(1);
                }
            }
        }
        Commands::CsrfToken { client_ip, session_id } => {
            println!("{}", compute_token(&client_ip, &session_id));
        }
        Commands::DecodeBase64 { file } => {
            let text = std::fs::read_to_string(file)?;
            let bytes = base64_decode_to_bytes(&BufferPool::shared(), &text)?;
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&bytes)?;
            stdout.flush()?;
        }
        Commands::CheckConfig { config } => match load_config(&config) {
            Ok(config) => {
                println!(
                    "Configuration OK: {} webservice(s), {} user(s), listening on {}",
                    config.webservices.len(),
                    config.auth.users.len(),
                    config.listener.bind_address
                );
            }
            Err(e) => {
                eprintln!("{e}");
                std::process::exit(1);
            }
        },
    }

    Ok(())
}
