//! mcplink - MCP install link CLI

use std::collections::BTreeMap;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use mcplink::dispatch::INVALID_LINK_MESSAGE;
use mcplink::{
    generate_legacy_url, generate_protocol_url, is_source_trusted, parse_protocol_url, validate, Channel, Config,
    ConfirmationWorkflow, ConnectionConfig, DispatchOutcome, Dispatcher, InstallRequest, InstallRequestEvent,
    LegacyFormat, LegacyInstallParams, ParsedProtocolUrl, PluginSchema, ProtocolSource,
};

#[derive(Parser)]
#[command(name = "mcplink")]
#[command(about = "MCP install links - parse, generate, and dispatch plugin deep links")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug output
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode an install link
    Parse {
        /// Link to decode (e.g. lobehub://plugin/install?type=mcp&...)
        url: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Generate an install link with an embedded schema
    Generate {
        /// Plugin id; must equal the schema identifier
        #[arg(long)]
        id: String,

        /// Schema as inline JSON, or @path to read it from a file
        #[arg(long)]
        schema: String,

        /// Market the link originates from
        #[arg(long)]
        market_id: Option<String>,

        /// Extra meta parameter as key=value (repeatable)
        #[arg(long = "meta", value_name = "KEY=VALUE")]
        meta: Vec<String>,

        /// Declared source (official, community, third_party, ...)
        #[arg(long)]
        source: Option<ProtocolSource>,

        /// Channel whose scheme to use (defaults to the configured channel)
        #[arg(long)]
        channel: Option<Channel>,
    },

    /// Generate an identifier-only link for older hosts
    Legacy {
        /// Plugin identifier
        #[arg(long)]
        identifier: String,

        /// Declared source
        #[arg(long, default_value = "official")]
        source: ProtocolSource,

        /// Manifest URL
        #[arg(long)]
        manifest_url: Option<String>,

        /// Plugin version
        #[arg(long)]
        version: Option<String>,

        /// Configure automatically after install
        #[arg(long)]
        auto_config: bool,

        /// Preset configuration as a JSON object
        #[arg(long)]
        preset_config: Option<String>,

        /// Wire format: query or json
        #[arg(long, default_value = "query")]
        format: LegacyFormat,

        /// Channel whose scheme to use (defaults to the configured channel)
        #[arg(long)]
        channel: Option<Channel>,
    },

    /// Classify a source tag
    Trust {
        /// Source tag (e.g. official, third_party)
        tag: String,
    },

    /// Dispatch an install link as if the OS had delivered it
    Open {
        /// Link delivered by the OS
        url: String,

        /// Skip the confirmation prompt for untrusted sources
        #[arg(long)]
        yes: bool,
    },

    /// Show resolved configuration
    Config,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match Config::resolve() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    init_tracing(cli.debug, &config);

    match cli.command {
        Commands::Config => {
            println!("Channel:     {}", config.channel);
            println!("Scheme:      {}:", config.channel.scheme());
            println!("Config file: {}", mcplink::config::config_path().display());
            println!("Loaded:      {}", config.source.is_some());
        }
        Commands::Parse { url, json } => match parse_protocol_url(&url) {
            Some(parsed) => {
                if json {
                    print_json(&parsed);
                } else {
                    print_parsed(&parsed);
                }
            }
            None => {
                eprintln!("Error: {}", INVALID_LINK_MESSAGE);
                std::process::exit(1);
            }
        },
        Commands::Generate {
            id,
            schema,
            market_id,
            meta,
            source,
            channel,
        } => {
            let schema = match read_schema(&schema) {
                Ok(s) => s,
                Err(e) => {
                    eprintln!("Error: {}", e);
                    std::process::exit(1);
                }
            };
            let meta_params = match parse_meta(&meta) {
                Ok(m) => m,
                Err(e) => {
                    eprintln!("Error: {}", e);
                    std::process::exit(1);
                }
            };
            let request = InstallRequest {
                id,
                schema,
                market_id,
                meta_params,
                source,
                options: Default::default(),
            };
            match generate_protocol_url(&request, channel.unwrap_or(config.channel)) {
                Ok(url) => println!("{url}"),
                Err(e) => {
                    eprintln!("Error: {}", e);
                    std::process::exit(1);
                }
            }
        }
        Commands::Legacy {
            identifier,
            source,
            manifest_url,
            version,
            auto_config,
            preset_config,
            format,
            channel,
        } => {
            let mut params = LegacyInstallParams::new(identifier, source);
            params.options.manifest_url = manifest_url;
            params.options.version = version;
            params.options.auto_config = auto_config;
            if let Some(raw) = preset_config {
                match serde_json::from_str::<serde_json::Value>(&raw) {
                    Ok(serde_json::Value::Object(preset)) => params.options.preset_config = Some(preset),
                    Ok(_) => {
                        eprintln!("Error: Preset config must be a JSON object");
                        std::process::exit(1);
                    }
                    Err(e) => {
                        eprintln!("Error: Failed to parse preset config: {}", e);
                        std::process::exit(1);
                    }
                }
            }
            match generate_legacy_url(&params, format, channel.unwrap_or(config.channel)) {
                Ok(url) => println!("{url}"),
                Err(e) => {
                    eprintln!("Error: {}", e);
                    std::process::exit(1);
                }
            }
        }
        Commands::Trust { tag } => {
            if is_source_trusted(&tag) {
                println!("trusted");
            } else {
                println!("untrusted");
            }
        }
        Commands::Open { url, yes } => {
            let code = open(&url, yes).await;
            std::process::exit(code);
        }
    }
}

/// `RUST_LOG` wins, then `--debug`, then the configured filter.
fn init_tracing(debug: bool, config: &Config) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if debug {
            EnvFilter::new("mcplink=debug")
        } else {
            EnvFilter::new(config.log_filter.as_deref().unwrap_or("mcplink=warn"))
        }
    });

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .init();
}

async fn open(url: &str, yes: bool) -> i32 {
    let workflow = Arc::new(ConfirmationWorkflow::default());
    let dispatcher = Dispatcher::install(workflow.clone());

    let outcome = dispatcher.dispatch(url).await;
    let event = match &outcome {
        DispatchOutcome::Delivered(event) => event.clone(),
        DispatchOutcome::Rejected(_) => {
            if let Some(report) = outcome.report(url) {
                print_json(&report);
            }
            eprintln!("Error: {}", INVALID_LINK_MESSAGE);
            return 1;
        }
    };

    let accepted = !event.data.requires_confirmation || yes || prompt(&event).await;

    let report = if accepted {
        match workflow.confirm() {
            Ok(confirmed) => {
                // Installation belongs to the host; the confirmed request is handed over on stdout.
                print_json(&confirmed);
                workflow.complete(Ok(()))
            }
            Err(e) => Err(e),
        }
    } else {
        workflow.dismiss()
    };

    match report {
        Ok(report) => {
            print_json(&report);
            if report.success {
                0
            } else {
                1
            }
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

async fn prompt(event: &InstallRequestEvent) -> bool {
    eprintln!(
        "Install {} from {} source? This source is not trusted. [y/N]",
        event.display_name(),
        event.data.source
    );

    let mut line = String::new();
    let mut stdin = BufReader::new(tokio::io::stdin());
    match stdin.read_line(&mut line).await {
        Ok(_) => matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes"),
        Err(e) => {
            tracing::debug!(error = %e, "failed to read confirmation");
            false
        }
    }
}

fn read_schema(arg: &str) -> Result<PluginSchema, String> {
    let text = match arg.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path).map_err(|e| format!("Failed to read schema {}: {}", path, e))?,
        None => arg.to_string(),
    };
    let raw: serde_json::Value =
        serde_json::from_str(&text).map_err(|e| format!("Failed to parse schema: {}", e))?;
    validate(&raw).map_err(|e| format!("Invalid schema: {}", e))
}

fn parse_meta(entries: &[String]) -> Result<BTreeMap<String, String>, String> {
    entries
        .iter()
        .map(|entry| {
            entry
                .split_once('=')
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .ok_or_else(|| format!("Meta parameter must be KEY=VALUE: {}", entry))
        })
        .collect()
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(output) => println!("{output}"),
        Err(e) => {
            eprintln!("Error: Failed to serialize: {}", e);
            std::process::exit(1);
        }
    }
}

fn format_connection(config: &ConnectionConfig) -> String {
    match config {
        ConnectionConfig::Stdio { command, args, .. } => {
            let mut parts = vec![command.as_str()];
            parts.extend(args.iter().flatten().map(String::as_str));
            format!("stdio ({})", parts.join(" "))
        }
        ConnectionConfig::Http { url, .. } => format!("http ({url})"),
    }
}

fn print_parsed(parsed: &ParsedProtocolUrl) {
    const INDENT: &str = "        ";

    let source = parsed.source();
    let trust = if source.is_trusted() {
        "trusted"
    } else {
        "confirmation required"
    };

    println!("{}", parsed.plugin_id());
    println!("{}Channel:    {} ({}:)", INDENT, parsed.channel, parsed.channel.scheme());
    println!("{}Route:      {}/{}", INDENT, parsed.category.as_str(), parsed.action.as_str());
    println!("{}Type:       {}", INDENT, parsed.kind.as_str());
    println!("{}Source:     {} ({})", INDENT, source, trust);
    if let Some(schema) = parsed.schema() {
        println!("{}Name:       {}", INDENT, schema.name);
        println!("{}Version:    {}", INDENT, schema.version);
        println!("{}Author:     {}", INDENT, schema.author);
        if let Some(h) = schema.homepage.as_deref().filter(|x| !x.is_empty()) {
            println!("{}Homepage:   {}", INDENT, h);
        }
        println!("{}Connection: {}", INDENT, format_connection(&schema.config));
    }
    if let Some(market) = parsed.market_id() {
        println!("{}Market:     {}", INDENT, market);
    }
    let options = parsed.options();
    if let Some(m) = options.manifest_url.as_deref() {
        println!("{}Manifest:   {}", INDENT, m);
    }
    if let Some(v) = options.version.as_deref() {
        println!("{}Requested:  {}", INDENT, v);
    }
    if options.auto_config {
        println!("{}AutoConfig: true", INDENT);
    }
    if let Some(platform) = &options.source_platform {
        println!("{}Platform:   {}", INDENT, platform.name);
    }
    for (k, v) in parsed.meta_params().into_iter().flatten() {
        println!("{}Meta.{}:   {}", INDENT, k, v);
    }
}
