use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use folio::AppCommand;
use folio::cli::setup::setup;
use folio::core::interchange::ImportMode;
use folio::core::ledger::{CashRequest, OrderRequest, TradeRequest};
use folio::core::log::init_logging;
use folio::core::model::{ExchangeDirection, Market};
use folio::core::positions::{CashEdit, PositionEdit};
use folio::core::trading::{TradeFilter, parse_trade_time};
use std::path::PathBuf;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to optional configuration file
    #[arg(short, long, global = true)]
    config_path: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Args)]
struct AccountArg {
    /// Account id, defaults to `default_account` from the config
    #[arg(short, long)]
    account: Option<String>,
}

#[derive(Args)]
struct OrderArgs {
    #[command(flatten)]
    account: AccountArg,
    /// KR, US or CRYPTO
    market: Market,
    /// Ticker, six digit KRX code or coin symbol
    code: String,
    /// Execution price in the market's currency
    price: f64,
    qty: f64,
    #[arg(long)]
    name: Option<String>,
    /// Sector code for a newly opened position
    #[arg(long)]
    sector: Option<String>,
    #[arg(long)]
    current_price: Option<f64>,
    /// Trade time: RFC 3339, or KST "YYYY-MM-DD HH:MM" or "YYYY-MM-DD"
    #[arg(long, value_parser = parse_trade_time)]
    date: Option<DateTime<Utc>>,
}

impl OrderArgs {
    fn into_request(self) -> (Option<String>, OrderRequest) {
        (
            self.account.account,
            OrderRequest {
                market: self.market,
                code: self.code,
                name: self.name,
                sector: self.sector,
                price: self.price,
                qty: self.qty,
                current_price: self.current_price,
                date: self.date,
            },
        )
    }
}

#[derive(Args)]
struct CashArgs {
    #[command(flatten)]
    account: AccountArg,
    market: Market,
    amount: f64,
    /// Trade time: RFC 3339, or KST "YYYY-MM-DD HH:MM" or "YYYY-MM-DD"
    #[arg(long, value_parser = parse_trade_time)]
    date: Option<DateTime<Utc>>,
}

impl CashArgs {
    fn into_request(self) -> (Option<String>, CashRequest) {
        (
            self.account.account,
            CashRequest {
                market: self.market,
                amount: self.amount,
                date: self.date,
            },
        )
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum Direction {
    /// KRW to USD
    KrToUs,
    /// USD to KRW
    UsToKr,
}

impl From<Direction> for ExchangeDirection {
    fn from(direction: Direction) -> Self {
        match direction {
            Direction::KrToUs => ExchangeDirection::KrToUs,
            Direction::UsToKr => ExchangeDirection::UsToKr,
        }
    }
}

#[derive(Clone, Copy, Default, ValueEnum)]
enum Mode {
    #[default]
    Overwrite,
    Merge,
}

impl From<Mode> for ImportMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Overwrite => ImportMode::Overwrite,
            Mode::Merge => ImportMode::Merge,
        }
    }
}

#[derive(Subcommand)]
enum AccountCommands {
    /// List accounts
    List,
    /// Create or rename an account
    Add {
        id: String,
        #[arg(long)]
        name: Option<String>,
    },
    /// Delete an account with its positions, cash and trades
    Remove { id: String },
}

#[derive(Subcommand)]
enum SnapshotCommands {
    /// Record total assets of every account at the current rate
    Take {
        #[arg(long)]
        memo: Option<String>,
    },
    /// List snapshots, newest first
    List {
        /// Defaults to 50
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Delete a snapshot
    Delete { id: String },
}

#[derive(Subcommand)]
enum JournalCommands {
    /// Show entries for a month (YYYY-MM), or the latest ones
    Show { month: Option<String> },
    /// Write an entry; empty content without --important removes it
    Set {
        /// YYYY-MM-DD
        date: String,
        content: Option<String>,
        #[arg(long)]
        important: Option<bool>,
    },
}

#[derive(Subcommand)]
enum SectorCommands {
    /// List sectors in display order
    List,
    /// Append a custom sector
    Add {
        code: String,
        name: String,
        #[arg(long)]
        color: Option<String>,
    },
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup {
        /// Account used when commands omit --account
        #[arg(long)]
        default_account: Option<String>,
    },
    /// Display portfolio valuation
    Summary {
        #[command(flatten)]
        account: AccountArg,
        /// Fetch live prices before valuing
        #[arg(long)]
        refresh: bool,
    },
    /// Display rebalancing suggestions against target weights
    Rebalance {
        #[command(flatten)]
        account: AccountArg,
    },
    /// Fetch live prices and store them on the holdings
    Refresh {
        #[command(flatten)]
        account: AccountArg,
    },
    /// Display the current USD/KRW rate
    Rate,
    /// Record a buy
    Buy(OrderArgs),
    /// Record a sell
    Sell(OrderArgs),
    /// Record a cash deposit
    Deposit(CashArgs),
    /// Record a cash withdrawal
    Withdraw(CashArgs),
    /// Convert cash between KRW and USD
    Exchange {
        #[command(flatten)]
        account: AccountArg,
        direction: Direction,
        from_amount: f64,
        /// Amount received, defaults to the current rate's conversion
        to_amount: Option<f64>,
        /// Trade time: RFC 3339, or KST "YYYY-MM-DD HH:MM" or "YYYY-MM-DD"
        #[arg(long, value_parser = parse_trade_time)]
        date: Option<DateTime<Utc>>,
    },
    /// List recorded trades
    Trades {
        #[command(flatten)]
        account: AccountArg,
        /// Trading date (YYYY-MM-DD)
        #[arg(long, conflicts_with_all = ["from", "to"])]
        date: Option<NaiveDate>,
        /// First KST calendar day, inclusive
        #[arg(long)]
        from: Option<NaiveDate>,
        /// Last KST calendar day, inclusive
        #[arg(long)]
        to: Option<NaiveDate>,
        /// Defaults to 100
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Delete a trade and reverse its realized P&L
    DeleteTrade { id: String },
    /// Manage accounts
    #[command(subcommand)]
    Account(AccountCommands),
    /// Edit a position's metadata or last price
    SetPosition {
        #[command(flatten)]
        account: AccountArg,
        market: Market,
        code: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        sector: Option<String>,
        /// Target weight in percent
        #[arg(long)]
        target: Option<f64>,
        #[arg(long)]
        memo: Option<String>,
        #[arg(long)]
        price: Option<f64>,
    },
    /// Edit a cash balance
    SetCash {
        #[command(flatten)]
        account: AccountArg,
        market: Market,
        #[arg(long)]
        amount: Option<f64>,
        /// Target weight in percent
        #[arg(long)]
        target: Option<f64>,
        #[arg(long)]
        memo: Option<String>,
    },
    /// Investment journal
    #[command(subcommand)]
    Journal(JournalCommands),
    /// Sector catalogue
    #[command(subcommand)]
    Sectors(SectorCommands),
    /// Total asset history
    #[command(subcommand)]
    Snapshot(SnapshotCommands),
    /// Export all data as JSON
    Export {
        /// Output file, stdout when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Import a JSON export
    Import {
        input: PathBuf,
        #[arg(long, value_enum, default_value_t)]
        mode: Mode,
    },
}

impl From<Commands> for AppCommand {
    fn from(cmd: Commands) -> AppCommand {
        match cmd {
            Commands::Summary { account, refresh } => AppCommand::Summary {
                account: account.account,
                refresh,
            },
            Commands::Rebalance { account } => AppCommand::Rebalance {
                account: account.account,
            },
            Commands::Refresh { account } => AppCommand::RefreshPrices {
                account: account.account,
            },
            Commands::Rate => AppCommand::Rate,
            Commands::Buy(args) => {
                let (account, order) = args.into_request();
                AppCommand::Trade {
                    account,
                    request: TradeRequest::Buy(order),
                }
            }
            Commands::Sell(args) => {
                let (account, order) = args.into_request();
                AppCommand::Trade {
                    account,
                    request: TradeRequest::Sell(order),
                }
            }
            Commands::Deposit(args) => {
                let (account, cash) = args.into_request();
                AppCommand::Trade {
                    account,
                    request: TradeRequest::Deposit(cash),
                }
            }
            Commands::Withdraw(args) => {
                let (account, cash) = args.into_request();
                AppCommand::Trade {
                    account,
                    request: TradeRequest::Withdraw(cash),
                }
            }
            Commands::Exchange {
                account,
                direction,
                from_amount,
                to_amount,
                date,
            } => AppCommand::Exchange {
                account: account.account,
                direction: direction.into(),
                from_amount,
                to_amount,
                date,
            },
            Commands::Trades {
                account,
                date,
                from,
                to,
                limit,
            } => AppCommand::Trades {
                account: account.account,
                filter: TradeFilter {
                    date,
                    from,
                    to,
                    limit,
                },
            },
            Commands::DeleteTrade { id } => AppCommand::DeleteTrade { id },
            Commands::Account(AccountCommands::List) => AppCommand::Accounts,
            Commands::Account(AccountCommands::Add { id, name }) => {
                AppCommand::AddAccount { id, name }
            }
            Commands::Account(AccountCommands::Remove { id }) => AppCommand::RemoveAccount { id },
            Commands::SetPosition {
                account,
                market,
                code,
                name,
                sector,
                target,
                memo,
                price,
            } => AppCommand::SetPosition {
                account: account.account,
                market,
                code,
                edit: PositionEdit {
                    name,
                    sector,
                    target_weight: target,
                    memo,
                    current_price: price,
                },
            },
            Commands::SetCash {
                account,
                market,
                amount,
                target,
                memo,
            } => AppCommand::SetCash {
                account: account.account,
                market,
                edit: CashEdit {
                    amount,
                    target_weight: target,
                    memo,
                },
            },
            Commands::Journal(JournalCommands::Show { month }) => AppCommand::JournalShow { month },
            Commands::Journal(JournalCommands::Set {
                date,
                content,
                important,
            }) => AppCommand::JournalSet {
                date,
                content,
                important,
            },
            Commands::Sectors(SectorCommands::List) => AppCommand::Sectors,
            Commands::Sectors(SectorCommands::Add { code, name, color }) => {
                AppCommand::AddSector { code, name, color }
            }
            Commands::Snapshot(SnapshotCommands::Take { memo }) => AppCommand::TakeSnapshot { memo },
            Commands::Snapshot(SnapshotCommands::List { limit }) => AppCommand::Snapshots { limit },
            Commands::Snapshot(SnapshotCommands::Delete { id }) => {
                AppCommand::DeleteSnapshot { id }
            }
            Commands::Export { output } => AppCommand::Export { output },
            Commands::Import { input, mode } => AppCommand::Import {
                input,
                mode: mode.into(),
            },
            Commands::Setup { .. } => unreachable!("Setup command should be handled separately"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let result = match cli.command {
        Some(Commands::Setup { default_account }) => match cli.config_path.as_deref() {
            Some(path) => folio::cli::setup::setup_at_path(path, default_account.as_deref()),
            None => setup(default_account.as_deref()),
        },
        Some(cmd) => folio::run_command(cmd.into(), cli.config_path.as_deref()).await,
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Application failed");
    }
    result
}
