pub mod commands;
pub mod logging;

use std::path::PathBuf;
use std::process::ExitCode;

use chrono::Utc;
use clap::{Parser, Subcommand};
use shopchat_core::config::{AppConfig, ConfigOverrides, LoadOptions, LogFormat, LoggingConfig};

use crate::commands::chat::ChatOptions;
use crate::commands::CommandResult;

#[derive(Debug, Parser)]
#[command(
    name = "shopchat",
    about = "Shop chat checkout operator CLI",
    long_about = "Classify customer messages, preview payment plans, check addresses, run a local chat session against in-memory stores, inspect configuration and apply migrations.",
    after_help = "Examples:\n  shopchat classify \"สนใจ RLX-SUB-001 ครับ\"\n  shopchat plan --price 9000 --payment installment\n  shopchat chat --user U1 --channel line --product GLD-NCK-001"
)]
pub struct Cli {
    #[arg(long, global = true, help = "Path to a shopchat.toml file")]
    config: Option<PathBuf>,
    #[arg(long, global = true, help = "Override store.url")]
    store_url: Option<String>,
    #[arg(long, global = true, help = "Override logging.level")]
    log_level: Option<String>,
    #[arg(long, global = true, help = "Override logging.format (compact|pretty|json)")]
    log_format: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Classify one customer message and print the intent result")]
    Classify { text: String },
    #[command(about = "Compute the payment plan for a price and payment type")]
    Plan {
        #[arg(long, help = "Product price in baht")]
        price: String,
        #[arg(long, help = "full, installment or deposit")]
        payment: String,
        #[arg(long, help = "Tenant whose checkout policy applies")]
        tenant: Option<String>,
    },
    #[command(about = "Validate and parse a free-form shipping address")]
    Address { text: String },
    #[command(about = "Chat with the checkout bot on stdin using in-memory stores")]
    Chat {
        #[arg(long, default_value = "cli-user")]
        user: String,
        #[arg(long, default_value = "cli")]
        channel: String,
        #[arg(long, default_value = "default")]
        tenant: String,
        #[arg(long, help = "Open a checkout for this demo product code first")]
        product: Option<String>,
    },
    #[command(about = "Print the effective configuration with secrets redacted")]
    Config,
    #[command(about = "Apply pending database migrations")]
    Migrate,
}

impl Cli {
    fn load_options(&self) -> Result<LoadOptions, CommandResult> {
        let log_format = match self.log_format.as_deref() {
            Some(raw) => Some(raw.parse::<LogFormat>().map_err(|error| {
                CommandResult::failure("cli", "config_validation", error.to_string(), 2)
            })?),
            None => None,
        };
        Ok(LoadOptions {
            config_path: self.config.clone(),
            require_file: self.config.is_some(),
            overrides: ConfigOverrides {
                store_url: self.store_url.clone(),
                log_level: self.log_level.clone(),
                log_format,
                ..ConfigOverrides::default()
            },
        })
    }
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let options = match cli.load_options() {
        Ok(options) => options,
        Err(result) => return emit(result),
    };
    let logging = AppConfig::load(options.clone())
        .map(|config| config.logging)
        .unwrap_or_else(|_| LoggingConfig { level: "info".to_string(), format: LogFormat::Compact });
    logging::init_logging(&logging);

    let result = match cli.command {
        Command::Classify { text } => commands::classify::run(&options, &text),
        Command::Plan { price, payment, tenant } => {
            commands::plan::run(&options, &price, &payment, tenant.as_deref(), Utc::now().date_naive())
        }
        Command::Address { text } => commands::address::run(&text),
        Command::Chat { user, channel, tenant, product } => {
            commands::chat::run(&options, &ChatOptions { user, channel, tenant, product })
        }
        Command::Config => commands::config::run(&options),
        Command::Migrate => commands::migrate::run(&options),
    };

    emit(result)
}

fn emit(result: CommandResult) -> ExitCode {
    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
