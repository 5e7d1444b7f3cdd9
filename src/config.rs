use std::net::{AddrParseError, SocketAddr};
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use invoicedb_core::DocumentKind;
use serde::Deserialize;

#[derive(Parser, Debug)]
#[command(name = "invoicedb", about = "InvoiceDB - local invoicing and quoting")]
pub struct CliArgs {
    /// Path to config file
    #[arg(short, long, default_value = "invoicedb.toml")]
    pub config: String,

    /// Port to listen on (overrides config file)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Log level (overrides config file)
    #[arg(short, long)]
    pub log_level: Option<String>,

    /// Database file (overrides config file)
    #[arg(short, long)]
    pub database: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Run the HTTP API (default)
    Serve,
    /// Print the dashboard summary
    Dashboard {
        /// Calendar year for the monthly revenue breakdown
        #[arg(short, long)]
        year: Option<i32>,
    },
    /// Render an invoice or quote to PDF
    Export {
        #[arg(value_parser = parse_kind)]
        kind: DocumentKind,
        id: i64,
        /// Output file (defaults to the export directory)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Mark sent invoices past their due date as overdue
    RefreshOverdue,
}

fn parse_kind(s: &str) -> Result<DocumentKind, String> {
    s.parse()
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_server")]
    pub server: ServerConfig,

    #[serde(default = "default_logging")]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default = "default_database")]
    pub database: DatabaseConfig,

    #[serde(default = "default_export")]
    pub export: ExportConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub json: bool,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AuthConfig {
    /// When true, all API endpoints (except /health and /metrics) require authentication.
    #[serde(default)]
    pub enabled: bool,

    /// Static API keys. Each key has a name (for audit) and a role.
    #[serde(default)]
    pub api_keys: Vec<ApiKeyEntry>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApiKeyEntry {
    pub name: String,
    pub key: String,
    #[serde(default = "default_role")]
    pub role: String,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Sqlite,
    Memory,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    #[serde(default = "default_backend")]
    pub backend: BackendKind,

    /// SQLite file, or `:memory:`.
    #[serde(default = "default_database_path")]
    pub path: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExportConfig {
    /// Directory generated PDF files are written to.
    #[serde(default = "default_export_dir")]
    pub directory: PathBuf,
}

fn default_role() -> String {
    "reader".to_string()
}

fn default_server() -> ServerConfig {
    ServerConfig {
        host: default_host(),
        port: default_port(),
    }
}

fn default_logging() -> LoggingConfig {
    LoggingConfig {
        level: default_log_level(),
        json: false,
    }
}

fn default_database() -> DatabaseConfig {
    DatabaseConfig {
        backend: default_backend(),
        path: default_database_path(),
    }
}

fn default_export() -> ExportConfig {
    ExportConfig {
        directory: default_export_dir(),
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_backend() -> BackendKind {
    BackendKind::Sqlite
}

fn default_database_path() -> String {
    "invoicedb.sqlite".to_string()
}

fn default_export_dir() -> PathBuf {
    PathBuf::from("exports")
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: default_server(),
            logging: default_logging(),
            auth: AuthConfig::default(),
            database: default_database(),
            export: default_export(),
        }
    }
}

impl Config {
    pub fn load(cli: &CliArgs) -> Self {
        let mut config = match std::fs::read_to_string(&cli.config) {
            Ok(contents) => Self::parse(&contents).unwrap_or_else(|e| {
                eprintln!("Warning: Failed to parse config file: {}", e);
                Config::default()
            }),
            Err(_) => Config::default(),
        };

        // CLI overrides
        if let Some(port) = cli.port {
            config.server.port = port;
        }
        if let Some(ref level) = cli.log_level {
            config.logging.level = level.clone();
        }
        if let Some(ref path) = cli.database {
            config.database.path = path.clone();
        }

        config
    }

    pub fn parse(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    pub fn listen_addr(&self) -> Result<SocketAddr, AddrParseError> {
        format!("{}:{}", self.server.host, self.server.port).parse()
    }
}
