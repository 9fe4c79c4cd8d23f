//! PnL endpoint: per-sell computed rows and summary aggregates.

use std::sync::Arc;

use axum::http::StatusCode;
use lotledger::api::{self, AppState};
use lotledger::engine::OverSellPolicy;
use lotledger::{
    init_db, AccountId, Config, Decimal, Recomputer, Repository, Side, Symbol, TimeMs, Transaction,
};
use serde_json::Value;
use tempfile::TempDir;
use tower::util::ServiceExt;

fn d(s: &str) -> Decimal {
    Decimal::from_str_canonical(s).unwrap()
}

struct TestApp {
    app: axum::Router,
    repo: Arc<Repository>,
    recomputer: Arc<Recomputer>,
    _temp: TempDir,
}

async fn setup_test_app() -> TestApp {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir
        .path()
        .join("test.db")
        .to_string_lossy()
        .to_string();
    let pool = init_db(&db_path).await.expect("init_db failed");

    let repo = Arc::new(Repository::new(pool));
    let config = Config {
        port: 0,
        database_path: db_path,
        oversell_policy: OverSellPolicy::ZeroCost,
    };
    let recomputer = Arc::new(Recomputer::new(repo.clone(), config.oversell_policy));
    let state = AppState::new(repo.clone(), config, recomputer.clone());

    TestApp {
        app: api::create_router(state),
        repo,
        recomputer,
        _temp: temp_dir,
    }
}

async fn get(app: axum::Router, uri: &str) -> (StatusCode, Value) {
    let req = axum::http::Request::builder()
        .method("GET")
        .uri(uri)
        .body(axum::body::Body::empty())
        .unwrap();

    let resp = app.oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

fn txn(side: Side, qty: &str, price: &str, time_ms: i64, stop: Option<&str>) -> Transaction {
    Transaction::new(
        AccountId::new("main".to_string()),
        Symbol::new("AAPL".to_string()),
        side,
        d(qty),
        d(price),
        Decimal::zero(),
        TimeMs::new(time_ms),
        stop.map(d),
        None,
    )
}

async fn seed(test_app: &TestApp, txns: &[Transaction]) {
    for t in txns {
        test_app.repo.insert_transaction(t, None).await.unwrap();
    }
    test_app
        .recomputer
        .recompute(
            &AccountId::new("main".to_string()),
            &Symbol::new("AAPL".to_string()),
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn test_pnl_empty_scope() {
    let test_app = setup_test_app().await;

    let (status, body) = get(test_app.app.clone(), "/v1/pnl?account=main&symbol=AAPL").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["sells"].as_array().unwrap().len(), 0);
    assert_eq!(body["summary"]["sellCount"], 0);
    assert_eq!(body["summary"]["realizedPnl"], "0");
    assert!(body["summary"].get("avgRMultiple").is_none());
}

#[tokio::test]
async fn test_pnl_fields_are_camel_case_strings() {
    let test_app = setup_test_app().await;
    seed(
        &test_app,
        &[
            txn(Side::Buy, "10", "100", 1000, Some("90")),
            txn(Side::Sell, "10", "115", 2000, None),
        ],
    )
    .await;

    let (status, body) = get(test_app.app.clone(), "/v1/pnl?account=main&symbol=AAPL").await;
    assert_eq!(status, StatusCode::OK);

    let sell = &body["sells"][0];
    assert!(sell["txnId"].is_string());
    assert_eq!(sell["costBasis"], "1000");
    assert_eq!(sell["realizedPnl"], "150");
    assert_eq!(sell["initialRiskAmount"], "100");
    assert_eq!(sell["rMultiple"], "1.5");
    assert_eq!(sell["oversold"], false);
}

#[tokio::test]
async fn test_pnl_summary_aggregates() {
    let test_app = setup_test_app().await;
    seed(
        &test_app,
        &[
            txn(Side::Buy, "30", "100", 1000, Some("90")),
            // Win: +150
            txn(Side::Sell, "10", "115", 2000, None),
            // Loss: -50
            txn(Side::Sell, "10", "95", 3000, None),
            // Break-even: 0
            txn(Side::Sell, "10", "100", 4000, None),
        ],
    )
    .await;

    let (_, body) = get(test_app.app.clone(), "/v1/pnl?account=main&symbol=AAPL").await;
    let summary = &body["summary"];

    assert_eq!(summary["sellCount"], 3);
    assert_eq!(summary["winCount"], 1);
    assert_eq!(summary["lossCount"], 1);
    assert_eq!(summary["realizedPnl"], "100");
    assert_eq!(summary["winRatePct"], "33.3333");
    // R values: 1.5, -0.5, 0 => average 1/3.
    assert_eq!(summary["avgRMultiple"], "0.3333");
    assert_eq!(summary["oversoldCount"], 0);
}

#[tokio::test]
async fn test_pnl_summary_counts_oversold() {
    let test_app = setup_test_app().await;
    seed(
        &test_app,
        &[
            txn(Side::Buy, "10", "10", 1000, None),
            txn(Side::Sell, "15", "20", 2000, None),
        ],
    )
    .await;

    let (_, body) = get(test_app.app.clone(), "/v1/pnl?account=main&symbol=AAPL").await;

    assert_eq!(body["summary"]["oversoldCount"], 1);
    assert_eq!(body["sells"][0]["oversold"], true);
    assert_eq!(body["sells"][0]["unmatchedQty"], "5");
}

#[tokio::test]
async fn test_pnl_requires_account_and_symbol() {
    let test_app = setup_test_app().await;

    let (status, _) = get(test_app.app.clone(), "/v1/pnl?account=main&symbol=").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_lots_endpoint_reports_remaining_inventory() {
    let test_app = setup_test_app().await;
    seed(
        &test_app,
        &[
            txn(Side::Buy, "10", "10", 1000, None),
            txn(Side::Buy, "10", "20", 2000, None),
            txn(Side::Sell, "15", "30", 3000, None),
        ],
    )
    .await;

    let (status, body) = get(
        test_app.app.clone(),
        "/v1/lots?account=main&symbol=AAPL",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let lots = body["lots"].as_array().unwrap();
    assert_eq!(lots.len(), 2);
    assert_eq!(lots[0]["remainingQty"], "0");
    assert_eq!(lots[1]["remainingQty"], "5");
    assert_eq!(body["openQuantity"], "5");

    let (_, body) = get(
        test_app.app.clone(),
        "/v1/lots?account=main&symbol=AAPL&openOnly=true",
    )
    .await;
    assert_eq!(body["lots"].as_array().unwrap().len(), 1);
    assert_eq!(body["openQuantity"], "5");
}
