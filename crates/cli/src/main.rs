//! giftledger command-line management tool.
//!
//! Provides subcommands for generating and validating configuration,
//! inspecting companies, cards and the transaction ledger, recharging a
//! company, and importing the legacy JSON data files into the configured
//! store.

mod style;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use comfy_table::Cell;
use tracing_subscriber::EnvFilter;

use giftledger_core::config::AppConfig;
use giftledger_core::ledger::{BalanceLedger, LedgerSettings};
use giftledger_core::models::{Company, Transaction};
use giftledger_core::store::{self, json, StoreHandles};

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// giftledger command-line management tool.
#[derive(Parser, Debug)]
#[command(
    name = "giftledger",
    version,
    about = "Manage and inspect a giftledger gift-card ledger"
)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(
        short,
        long,
        global = true,
        default_value = "/etc/giftledger/config.toml"
    )]
    config: PathBuf,

    /// Print JSON instead of tables where supported.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate a default configuration file.
    Init {
        /// Output path for the generated config file.
        #[arg(short, long, default_value = "./giftledger.toml")]
        output: PathBuf,

        /// Data directory to write into the config; the store is created there.
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },

    /// Validate a configuration file.
    Validate,

    /// List all companies.
    Companies,

    /// Show one company with its members and card identifiers.
    Company {
        /// Company id (e.g. 001).
        id: String,
    },

    /// Resolve a gift-card identifier to its company and member.
    Card {
        /// Gift-card identifier (e.g. acmeco_0).
        identifier: String,
    },

    /// Find the gift card of a member email.
    Whois {
        email: String,
    },

    /// Credit a company balance.
    Recharge {
        /// Company id.
        company_id: String,

        /// Amount to credit (> 0).
        amount: f64,

        /// Operator recorded on the transaction.
        #[arg(long)]
        user: Option<String>,
    },

    /// Show the transaction ledger of a company, newest first.
    Transactions {
        /// Company id.
        company_id: String,

        /// Maximum number of entries to show.
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Show totals across every company.
    Stats,

    /// Load the legacy JSON data files into the configured store.
    ImportJson {
        /// Path to creditDB.json.
        companies: PathBuf,

        /// Path to transactions.json.
        transactions: Option<PathBuf>,

        /// Replace existing data in the target store.
        #[arg(long)]
        force: bool,
    },
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> ExitCode {
    // Minimal logging for CLI
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("warn"))
        .with_target(false)
        .without_time()
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", style::error(&format!("{:#}", e)));
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let json = cli.json;
    match cli.command {
        Commands::Init { output, data_dir } => cmd_init(&output, data_dir.as_deref()),
        Commands::Validate => cmd_validate(&cli.config),
        Commands::ImportJson {
            companies,
            transactions,
            force,
        } => {
            let config = load_config(&cli.config)?;
            let handles = open_store(&config)?;
            cmd_import(&handles, &companies, transactions.as_deref(), force)
        }
        Commands::Companies => cmd_companies(&open_ledger(&cli.config)?, json),
        Commands::Company { id } => cmd_company(&open_ledger(&cli.config)?, &id, json),
        Commands::Card { identifier } => cmd_card(&open_ledger(&cli.config)?, &identifier),
        Commands::Whois { email } => cmd_whois(&open_ledger(&cli.config)?, &email),
        Commands::Recharge {
            company_id,
            amount,
            user,
        } => cmd_recharge(&open_ledger(&cli.config)?, &company_id, amount, user.as_deref()),
        Commands::Transactions { company_id, limit } => {
            cmd_transactions(&open_ledger(&cli.config)?, &company_id, limit, json)
        }
        Commands::Stats => cmd_stats(&open_ledger(&cli.config)?, json),
    }
}

// ---------------------------------------------------------------------------
// Config helpers
// ---------------------------------------------------------------------------

fn load_config(path: &Path) -> Result<AppConfig> {
    AppConfig::load_and_validate(path).context("failed to load configuration file")
}

fn open_store(config: &AppConfig) -> Result<StoreHandles> {
    store::open(&config.storage, &config.daemon.data_dir).context("failed to open store")
}

fn open_ledger(config_path: &Path) -> Result<BalanceLedger> {
    let config = load_config(config_path)?;
    Ok(BalanceLedger::new(
        open_store(&config)?,
        LedgerSettings::from(&config.ledger),
    ))
}

fn default_config(data_dir: &Path) -> String {
    let data_dir = data_dir
        .display()
        .to_string()
        .replace('\\', "\\\\")
        .replace('"', "\\\"");

    format!(
        r#"# giftledger configuration
# Every key is optional; the values below are the defaults.

[daemon]
log_level = "info"
data_dir = "{data_dir}"
# log_file = "/var/log/giftledger/giftledger.log"

[storage]
# "sqlite" or "json" (creditDB.json + transactions.json)
backend = "sqlite"

[web]
listen = "127.0.0.1:3000"
# public_base_url = "https://giftcards.example.com"
transaction_href_prefix = "gatewayqa"

[ledger]
amount_tolerance = 0.01
default_operator = "admin"
reject_duplicate_compensation = true
enforce_unique_slugs = true

[giftcard]
provider = "arroyave_gift"
currency_code = "COP"
emission_date = "2025-04-24T20:22:58.163"
expiring_date = "2030-01-01T00:00:00"
"#
    )
}

// ---------------------------------------------------------------------------
// Subcommand implementations
// ---------------------------------------------------------------------------

fn cmd_init(output: &Path, data_dir: Option<&Path>) -> Result<()> {
    if output.exists() {
        anyhow::bail!(
            "file already exists: {}. Use a different path or remove the existing file.",
            output.display()
        );
    }

    let mut config = AppConfig::default();
    if let Some(dir) = data_dir {
        config.daemon.data_dir = dir.to_path_buf();
    }

    std::fs::write(output, default_config(&config.daemon.data_dir))
        .context("failed to write config file")?;
    println!(
        "{}",
        style::success(&format!("Default configuration written to {}", output.display()))
    );

    if data_dir.is_some() {
        open_store(&config)?;
        println!(
            "{}",
            style::success(&format!(
                "Store created in {}",
                config.daemon.data_dir.display()
            ))
        );
    }

    println!();
    println!("{}", style::header("Next steps:"));
    println!("  1. Edit the config file (data_dir, listen address, storage backend)");
    println!(
        "  2. Validate with: giftledger validate --config {}",
        output.display()
    );
    println!(
        "  3. Start the daemon: giftledger-daemon --config {}",
        output.display()
    );

    Ok(())
}

fn cmd_validate(config_path: &Path) -> Result<()> {
    println!("Validating configuration: {}", config_path.display());
    println!();

    let mut config =
        AppConfig::load_from_file(config_path).context("failed to parse configuration")?;
    println!("  {}", style::success("TOML structure is valid"));

    config.apply_env_overrides();

    match config.validate() {
        Ok(()) => println!("  {}", style::success("All fields are valid")),
        Err(e) => {
            println!("  {}", style::error(&format!("Validation error: {}", e)));
            anyhow::bail!("configuration validation failed");
        }
    }

    if !config.ledger.reject_duplicate_compensation {
        println!(
            "  {}",
            style::warn("duplicate settlements and cancellations are accepted")
        );
    }

    println!();
    println!("{}", style::header("Configuration summary:"));
    println!("  Data directory : {}", config.daemon.data_dir.display());
    println!("  Storage        : {:?}", config.storage.backend);
    println!("  Web listen     : {}", config.web.listen);
    println!(
        "  Public URL     : {}",
        config.web.public_base_url.as_deref().unwrap_or("(from request)")
    );
    println!("  Tolerance      : {}", config.ledger.amount_tolerance);
    println!("  Operator       : {}", config.ledger.default_operator);
    println!("  Provider       : {}", config.giftcard.provider);
    println!();
    println!("Configuration is valid.");

    Ok(())
}

fn cmd_companies(ledger: &BalanceLedger, json: bool) -> Result<()> {
    let companies = ledger
        .list_companies()
        .context("failed to list companies")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&companies)?);
        return Ok(());
    }
    if companies.is_empty() {
        println!("No companies found.");
        return Ok(());
    }

    let mut table = style::table(vec!["ID", "Name", "Slug", "Balance", "Members"]);
    for c in &companies {
        table.add_row(vec![
            Cell::new(&c.id),
            Cell::new(&c.company_name),
            Cell::new(c.slug()),
            Cell::new(format!("{:.2}", c.balance)),
            Cell::new(c.members.len()),
        ]);
    }

    println!("{}", table);
    println!("{}", style::dim(&format!("{} company(ies)", companies.len())));
    Ok(())
}

fn cmd_company(ledger: &BalanceLedger, id: &str, json: bool) -> Result<()> {
    let company = ledger.get_company(id).context("failed to load company")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&company)?);
        return Ok(());
    }

    print_company(&company);
    Ok(())
}

fn print_company(company: &Company) {
    println!("{}", style::header(&format!("{} ({})", company.company_name, company.id)));
    println!("  Balance : {:.2}", company.balance);
    println!("  Slug    : {}", company.slug());
    println!();

    if company.members.is_empty() {
        println!("No members enrolled.");
        return;
    }

    let mut table = style::table(vec!["Card", "Email", "Redemption code"]);
    for (index, member) in company.members.iter().enumerate() {
        table.add_row(vec![
            Cell::new(giftledger_core::identifier::build_identifier(
                &company.company_name,
                index,
            )),
            Cell::new(&member.id),
            Cell::new(&member.redemption_code),
        ]);
    }
    println!("{}", table);
}

fn cmd_card(ledger: &BalanceLedger, identifier: &str) -> Result<()> {
    let card = ledger
        .find_card(identifier)
        .context("failed to resolve card")?
        .ok_or_else(|| anyhow::anyhow!("gift card '{}' not found", identifier))?;

    println!("{}", style::header(&format!("Gift card {}", identifier)));
    println!("  Company : {} ({})", card.company.company_name, card.company.id);
    println!("  Member  : {}", card.member().id);
    println!("  Balance : {:.2}", card.company.balance);
    Ok(())
}

fn cmd_whois(ledger: &BalanceLedger, email: &str) -> Result<()> {
    match ledger.find_by_email(email).context("failed to search cards")? {
        Some(card) => {
            println!("{} -> {}", email, style::header(&card.identifier()));
            println!("  Company : {} ({})", card.company.company_name, card.company.id);
            println!("  Balance : {:.2}", card.company.balance);
        }
        None => println!("{}", style::warn(&format!("no gift card for {}", email))),
    }
    Ok(())
}

fn cmd_recharge(
    ledger: &BalanceLedger,
    company_id: &str,
    amount: f64,
    user: Option<&str>,
) -> Result<()> {
    let (company, tx) = ledger
        .credit(company_id, amount, user)
        .context("recharge failed")?;

    println!(
        "{}",
        style::success(&format!(
            "{} credited {}, new balance {:.2}",
            company.company_name,
            style::amount(tx.amount),
            company.balance
        ))
    );
    println!("{}", style::dim(&format!("transaction {}", tx.id)));
    Ok(())
}

fn cmd_transactions(
    ledger: &BalanceLedger,
    company_id: &str,
    limit: usize,
    json: bool,
) -> Result<()> {
    let mut transactions = ledger
        .company_transactions(company_id)
        .context("failed to list transactions")?;
    transactions.truncate(limit);

    if json {
        println!("{}", serde_json::to_string_pretty(&transactions)?);
        return Ok(());
    }
    if transactions.is_empty() {
        println!("No transactions found.");
        return Ok(());
    }

    let mut table = style::table(vec!["Date", "Type", "Amount", "Card", "User", "Result"]);
    for tx in &transactions {
        table.add_row(vec![
            Cell::new(tx.iso_date()),
            Cell::new(tx.kind.as_str()),
            Cell::new(style::amount(tx.amount)),
            Cell::new(tx.card_id.as_deref().unwrap_or("-")),
            Cell::new(&tx.user_id),
            result_cell(tx),
        ]);
    }

    println!("{}", table);
    println!("{}", style::dim(&format!("{} transaction(s) shown", transactions.len())));
    Ok(())
}

fn result_cell(tx: &Transaction) -> Cell {
    match &tx.error {
        None => Cell::new("ok").fg(comfy_table::Color::Green),
        Some(error) => Cell::new(error).fg(comfy_table::Color::Red),
    }
}

fn cmd_stats(ledger: &BalanceLedger, json: bool) -> Result<()> {
    let stats = ledger.stats().context("failed to compute stats")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!("{}", style::header("giftledger totals"));
    println!("  Companies : {}", stats.total_companies);
    println!("  Members   : {}", stats.total_members);
    println!("  Balance   : {:.2}", stats.total_balance);
    Ok(())
}

fn cmd_import(
    handles: &StoreHandles,
    companies_path: &Path,
    transactions_path: Option<&Path>,
    force: bool,
) -> Result<()> {
    if !companies_path.exists() {
        anyhow::bail!("file not found: {}", companies_path.display());
    }

    let companies: Vec<Company> =
        json::read_collection(companies_path).context("failed to read companies file")?;
    let transactions: Vec<Transaction> = match transactions_path {
        Some(path) => json::read_collection(path).context("failed to read transactions file")?,
        None => Vec::new(),
    };

    let existing_companies = handles.companies.load_all().context("failed to read store")?;
    let existing_transactions = handles
        .transactions
        .load_all()
        .context("failed to read store")?;
    if !force && (!existing_companies.is_empty() || !existing_transactions.is_empty()) {
        anyhow::bail!(
            "target store already holds {} companies and {} transactions; pass --force to replace them",
            existing_companies.len(),
            existing_transactions.len()
        );
    }

    handles
        .companies
        .save_all(&companies)
        .context("failed to write companies")?;
    if let Err(e) = handles.transactions.save_all(&transactions) {
        // Put the previous companies back so the store stays consistent.
        if let Err(restore) = handles.companies.save_all(&existing_companies) {
            anyhow::bail!(
                "failed to write transactions ({}); restoring the previous companies also failed ({}), the store now holds the imported companies with the old ledger",
                e,
                restore
            );
        }
        return Err(anyhow::Error::new(e).context("failed to write transactions; companies restored"));
    }

    println!(
        "{}",
        style::success(&format!(
            "Imported {} companies and {} transactions",
            companies.len(),
            transactions.len()
        ))
    );
    Ok(())
}
