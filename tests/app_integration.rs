use folio::core::interchange::ImportMode;
use folio::core::ledger::{CashRequest, OrderRequest, TradeRequest};
use folio::core::model::{ExchangeDirection, Market, TradeKind};
use folio::core::positions::PositionEdit;
use folio::core::trading::{TradeFilter, trading_date};
use folio::{AppCommand, AppContext};
use std::fs;
use std::path::Path;
use tempfile::TempDir;
use tracing::info;

mod test_utils {
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// One server answering for every quote and FX provider.
    pub async fn create_mock_server() -> MockServer {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v8/finance/chart/AAPL"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"chart": {"result": [{"meta": {"regularMarketPrice": 190.0, "currency": "USD"}}]}}"#,
            ))
            .mount(&mock_server)
            .await;

        Mock::given(method("GET"))
            .and(path("/api/stock/005930/basic"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(r#"{"closePrice": "71,500"}"#),
            )
            .mount(&mock_server)
            .await;

        Mock::given(method("GET"))
            .and(path("/api/v3/simple/price"))
            .and(query_param("ids", "bitcoin"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(r#"{"bitcoin": {"krw": 90000000}}"#),
            )
            .mount(&mock_server)
            .await;

        Mock::given(method("GET"))
            .and(path("/v4/latest/KRW"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"{"base": "KRW", "rates": {"KRW": 1, "USD": 0.00075}}"#),
            )
            .mount(&mock_server)
            .await;

        mock_server
    }

    pub fn config_yaml(base_url: &str, data_path: &std::path::Path) -> String {
        format!(
            r#"
default_account: "main"
data_path: "{}"
providers:
  yahoo:
    base_url: "{base_url}"
  naver:
    mobile_url: "{base_url}"
    realtime_url: "{base_url}"
  coingecko:
    base_url: "{base_url}"
  exchange_rate:
    base_url: "{base_url}"
"#,
            data_path.display()
        )
    }
}

struct Workspace {
    _dir: TempDir,
    config_path: String,
    _server: wiremock::MockServer,
}

async fn workspace() -> Workspace {
    let server = test_utils::create_mock_server().await;
    let dir = TempDir::new().expect("Failed to create temp dir");
    let config_path = dir.path().join("config.yaml");
    fs::write(
        &config_path,
        test_utils::config_yaml(&server.uri(), &dir.path().join("data")),
    )
    .expect("Failed to write config file");

    Workspace {
        config_path: config_path.to_str().unwrap().to_string(),
        _dir: dir,
        _server: server,
    }
}

fn order(market: Market, code: &str, price: f64, qty: f64) -> OrderRequest {
    OrderRequest {
        market,
        code: code.to_string(),
        name: None,
        sector: None,
        price,
        qty,
        current_price: None,
        date: None,
    }
}

fn deposit(market: Market, amount: f64) -> AppCommand {
    AppCommand::Trade {
        account: None,
        request: TradeRequest::Deposit(CashRequest {
            market,
            amount,
            date: None,
        }),
    }
}

fn context(config_path: &str) -> AppContext {
    let config = folio::config::AppConfig::load_from_path(config_path).unwrap();
    AppContext::from_config(config).unwrap()
}

#[test_log::test(tokio::test)]
async fn test_full_app_flow_with_mock() {
    let ws = workspace().await;
    let config = Some(ws.config_path.as_str());

    let steps = vec![
        AppCommand::AddAccount {
            id: "main".to_string(),
            name: Some("Main".to_string()),
        },
        deposit(Market::Kr, 10_000_000.0),
        deposit(Market::Us, 5_000.0),
        AppCommand::Trade {
            account: None,
            request: TradeRequest::Buy(order(Market::Kr, "005930", 70_000.0, 10.0)),
        },
        AppCommand::Trade {
            account: None,
            request: TradeRequest::Buy(order(Market::Us, "AAPL", 180.0, 5.0)),
        },
        AppCommand::Trade {
            account: None,
            request: TradeRequest::Buy(order(Market::Crypto, "BTC", 80_000_000.0, 0.01)),
        },
        AppCommand::SetPosition {
            account: None,
            market: Market::Kr,
            code: "005930".to_string(),
            edit: PositionEdit {
                target_weight: Some(40.0),
                sector: Some("ai".to_string()),
                ..Default::default()
            },
        },
        AppCommand::Summary {
            account: None,
            refresh: true,
        },
        AppCommand::Rebalance { account: None },
        AppCommand::Rate,
        AppCommand::Trades {
            account: None,
            filter: TradeFilter {
                limit: Some(10),
                ..TradeFilter::default()
            },
        },
        AppCommand::TakeSnapshot {
            memo: Some("after setup".to_string()),
        },
        AppCommand::Snapshots { limit: None },
    ];

    for command in steps {
        info!(?command, "Running command");
        let result = folio::run_command(command.clone(), config).await;
        assert!(
            result.is_ok(),
            "{command:?} failed with: {:?}",
            result.err()
        );
    }

    let ctx = context(&ws.config_path);
    let holdings = ctx.repository.load_holdings("main").await.unwrap();
    let samsung = holdings.iter().find(|h| h.code == "005930").unwrap();
    assert_eq!(samsung.holding_qty, 10.0);
    assert_eq!(samsung.current_price, 71_500.0);
    assert_eq!(samsung.target_weight, 40.0);
    assert_eq!(samsung.sector, "AI");

    let apple = holdings.iter().find(|h| h.code == "AAPL").unwrap();
    assert_eq!(apple.current_price, 190.0);
    let btc = holdings.iter().find(|h| h.code == "BTC").unwrap();
    assert_eq!(btc.current_price, 90_000_000.0);

    let cash = ctx.repository.load_cash("main").await.unwrap();
    let usd = cash.iter().find(|c| c.market == Market::Us).unwrap();
    // Orders do not move cash
    assert_eq!(usd.amount, 5_000.0);

    let stored = ctx.repository.load_exchange_rate().await.unwrap().unwrap();
    assert_eq!(stored.rate, 1333.33);

    let snapshots = ctx.repository.load_asset_snapshots().await.unwrap();
    assert_eq!(snapshots.len(), 1);
    assert_eq!(snapshots[0].exchange_rate, 1333.33);
    assert_eq!(snapshots[0].accounts[0].account_id, "main");
    assert!(snapshots[0].total_asset > 10_000_000.0);
}

#[test_log::test(tokio::test)]
async fn test_sell_delete_and_exchange_flow() {
    let ws = workspace().await;
    let ctx = context(&ws.config_path);

    folio::execute(
        &ctx,
        AppCommand::AddAccount {
            id: "main".to_string(),
            name: None,
        },
    )
    .await
    .unwrap();
    folio::execute(&ctx, deposit(Market::Kr, 2_000_000.0))
        .await
        .unwrap();
    for request in [
        TradeRequest::Buy(order(Market::Kr, "005930", 70_000.0, 10.0)),
        TradeRequest::Sell(order(Market::Kr, "005930", 80_000.0, 4.0)),
    ] {
        folio::execute(
            &ctx,
            AppCommand::Trade {
                account: None,
                request,
            },
        )
        .await
        .unwrap();
    }
    assert_eq!(
        ctx.repository
            .load_realized_pnl("main")
            .await
            .unwrap()
            .get(Market::Kr),
        40_000.0
    );

    // Oversell leaves the ledger untouched
    let oversell = folio::execute(
        &ctx,
        AppCommand::Trade {
            account: None,
            request: TradeRequest::Sell(order(Market::Kr, "005930", 80_000.0, 7.0)),
        },
    )
    .await;
    assert!(oversell.is_err());

    let sell = ctx
        .trades
        .list_trades("main", &TradeFilter::default())
        .await
        .unwrap()
        .into_iter()
        .find(|t| t.kind == TradeKind::Sell)
        .unwrap();
    folio::execute(&ctx, AppCommand::DeleteTrade { id: sell.id })
        .await
        .unwrap();
    assert_eq!(
        ctx.repository
            .load_realized_pnl("main")
            .await
            .unwrap()
            .get(Market::Kr),
        0.0
    );

    // Rate comes from the mocked FX endpoint: 1 / 0.00075
    folio::execute(
        &ctx,
        AppCommand::Exchange {
            account: None,
            direction: ExchangeDirection::KrToUs,
            from_amount: 1_333_330.0,
            to_amount: None,
            date: None,
        },
    )
    .await
    .unwrap();
    let cash = ctx.repository.load_cash("main").await.unwrap();
    let krw = cash.iter().find(|c| c.market == Market::Kr).unwrap();
    let usd = cash.iter().find(|c| c.market == Market::Us).unwrap();
    assert_eq!(krw.amount, 666_670.0);
    assert!((usd.amount - 1_000.0).abs() < 1e-6);
}

#[test_log::test(tokio::test)]
async fn test_export_then_import_into_fresh_store() {
    let source = workspace().await;
    let ctx = context(&source.config_path);
    folio::execute(
        &ctx,
        AppCommand::AddAccount {
            id: "main".to_string(),
            name: Some("Main".to_string()),
        },
    )
    .await
    .unwrap();
    folio::execute(&ctx, deposit(Market::Kr, 1_000_000.0))
        .await
        .unwrap();
    folio::execute(
        &ctx,
        AppCommand::Trade {
            account: None,
            request: TradeRequest::Buy(order(Market::Kr, "005930", 70_000.0, 3.0)),
        },
    )
    .await
    .unwrap();
    folio::execute(
        &ctx,
        AppCommand::JournalSet {
            date: "2024-05-02".to_string(),
            content: Some("Started a position".to_string()),
            important: Some(true),
        },
    )
    .await
    .unwrap();

    let backup_dir = TempDir::new().unwrap();
    let backup = backup_dir.path().join("backup.json");
    folio::execute(
        &ctx,
        AppCommand::Export {
            output: Some(backup.clone()),
        },
    )
    .await
    .unwrap();
    assert_export_shape(&backup);

    let target = workspace().await;
    let target_ctx = context(&target.config_path);
    for mode in [ImportMode::Overwrite, ImportMode::Merge] {
        folio::execute(
            &target_ctx,
            AppCommand::Import {
                input: backup.clone(),
                mode,
            },
        )
        .await
        .unwrap();
    }

    let holdings = target_ctx.repository.load_holdings("main").await.unwrap();
    assert_eq!(holdings.len(), 1);
    assert_eq!(holdings[0].holding_qty, 3.0);
    let cash = target_ctx.repository.load_cash("main").await.unwrap();
    assert_eq!(
        cash.iter().find(|c| c.market == Market::Kr).unwrap().amount,
        1_000_000.0
    );
    let journal = target_ctx.repository.load_journal().await.unwrap();
    assert_eq!(journal.len(), 1);
    assert!(journal[0].important);
    assert!(
        target_ctx
            .repository
            .load_trades("main")
            .await
            .unwrap()
            .is_empty()
    );
}

fn assert_export_shape(path: &Path) {
    let doc: serde_json::Value = serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
    let main = &doc["accountData"]["main"];
    assert_eq!(main["accountName"], "Main");
    assert_eq!(main["portfolio"][0]["code"], "005930");
    assert_eq!(main["cash"]["KR"], 1_000_000.0);
    assert_eq!(doc["journalData"]["2024-05-02"]["important"], true);
    assert_eq!(doc["tradeHistory"].as_array().unwrap().len(), 2);
    assert_eq!(doc["exchangeRateUSD"], 1333.33);
}

#[test_log::test(tokio::test)]
async fn test_summary_fails_for_unknown_account() {
    let ws = workspace().await;
    let result = folio::run_command(
        AppCommand::Summary {
            account: Some("ghost".to_string()),
            refresh: false,
        },
        Some(&ws.config_path),
    )
    .await;
    let err = result.unwrap_err().to_string();
    assert!(err.contains("ghost"), "unexpected error: {err}");
}

#[test_log::test(tokio::test)]
async fn test_backdated_trade_and_account_removal() {
    let ws = workspace().await;
    let ctx = context(&ws.config_path);
    for id in ["main", "old"] {
        folio::execute(
            &ctx,
            AppCommand::AddAccount {
                id: id.to_string(),
                name: None,
            },
        )
        .await
        .unwrap();
    }

    let backdated = folio::core::trading::parse_trade_time("2024-03-15").unwrap();
    folio::execute(
        &ctx,
        AppCommand::Trade {
            account: Some("old".to_string()),
            request: TradeRequest::Deposit(CashRequest {
                market: Market::Kr,
                amount: 500_000.0,
                date: Some(backdated),
            }),
        },
    )
    .await
    .unwrap();

    let day = chrono::NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
    let march = TradeFilter {
        from: chrono::NaiveDate::from_ymd_opt(2024, 3, 1),
        to: chrono::NaiveDate::from_ymd_opt(2024, 3, 31),
        ..TradeFilter::default()
    };
    let trades = ctx.trades.list_trades("old", &march).await.unwrap();
    assert_eq!(trades.len(), 1);
    assert_eq!(trading_date(trades[0].date), day);

    folio::execute(
        &ctx,
        AppCommand::RemoveAccount {
            id: "old".to_string(),
        },
    )
    .await
    .unwrap();
    assert!(ctx.repository.get_account("old").await.unwrap().is_none());
    assert!(ctx.repository.load_cash("old").await.unwrap().is_empty());
    assert!(
        ctx.trades
            .list_trades("old", &TradeFilter::default())
            .await
            .unwrap()
            .is_empty()
    );
    assert!(ctx.repository.get_account("main").await.unwrap().is_some());

    let again = folio::execute(
        &ctx,
        AppCommand::RemoveAccount {
            id: "old".to_string(),
        },
    )
    .await;
    assert!(again.is_err());
}
