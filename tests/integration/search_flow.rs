//! End-to-end search runs through the coordinator against the mock market.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use alchemist::config::{AppConfig, SelectionConfig};
use alchemist::dashboard::{build_router, DashboardState, RefreshTracker};
use alchemist::engine::coordinator::{SearchCoordinator, SearchStatus};
use alchemist::engine::selector::{LiquidityPolicy, NoSelectionReason, SelectionOutcome, TieredSelector};
use alchemist::types::{Candidate, MembershipFilter, MissingLiquidityPolicy, SearchMode, Tier};

use crate::mock_market::MockMarket;

fn selection() -> SelectionConfig {
    SelectionConfig {
        min_purchase_limit: 0,
        ..SelectionConfig::default()
    }
}

fn build(market: &Arc<MockMarket>, cfg: &SelectionConfig) -> SearchCoordinator {
    SearchCoordinator::from_config(cfg, market.clone(), market.clone(), market.clone())
}

async fn run(coordinator: &SearchCoordinator, mode: SearchMode) -> alchemist::engine::coordinator::RunSummary {
    assert!(coordinator.request_search(mode));
    coordinator.run_search().await.expect("search slot should be free")
}

fn ids(items: &[Candidate]) -> Vec<u32> {
    items.iter().map(|c| c.id).collect()
}

#[tokio::test]
async fn test_verified_tier_prefers_liquid_item() {
    let market = Arc::new(MockMarket::standard().with_volume(2, 2_000, 2_000));
    let coordinator = build(&market, &selection());

    let summary = run(&coordinator, SearchMode::ReplaceAll).await;

    // 1: 0.6 * 0.82 = 0.492; 2: 0.6 * 0.62 + 0.4 = 0.772.
    assert_eq!(summary.selected_item, Some(2));
    assert_eq!(summary.tier, Some(0));
    assert_eq!(summary.eligible, 4);
    assert_eq!(market.verify_calls.load(Ordering::SeqCst), 4);

    let stored = coordinator.snapshot().await;
    assert_eq!(ids(&stored), vec![2]);
    assert_eq!(stored[0].liquidity().map(|l| l.estimated_daily_volume()), Some(1_152_000));
}

#[tokio::test]
async fn test_illiquid_market_falls_through_to_unchecked_tier() {
    let market = Arc::new(MockMarket::standard());
    let cfg = SelectionConfig {
        min_liquidity_per_hour: 100,
        ..selection()
    };
    let coordinator = build(&market, &cfg);

    let summary = run(&coordinator, SearchMode::ReplaceAll).await;

    assert_eq!(summary.selected_item, Some(1));
    assert_eq!(summary.tier, Some(2));
    // Both verified tiers checked the same four candidates.
    assert_eq!(market.verify_calls.load(Ordering::SeqCst), 8);
    assert!(coordinator.snapshot().await[0].liquidity().is_none());
}

#[tokio::test]
async fn test_missing_liquidity_policy() {
    let cfg = |on_missing| SelectionConfig {
        min_liquidity_per_hour: 100,
        missing_liquidity: on_missing,
        tiers: vec![Tier::new(1, true), Tier::new(4, false)],
        ..selection()
    };

    let market = Arc::new(MockMarket::standard().failing_verification(1));
    let pass = build(&market, &cfg(MissingLiquidityPolicy::Pass));
    let summary = run(&pass, SearchMode::ReplaceAll).await;
    assert_eq!((summary.selected_item, summary.tier), (Some(1), Some(0)));

    let market = Arc::new(MockMarket::standard().failing_verification(1));
    let reject = build(&market, &cfg(MissingLiquidityPolicy::Reject));
    let summary = run(&reject, SearchMode::ReplaceAll).await;
    assert_eq!((summary.selected_item, summary.tier), (Some(1), Some(1)));
}

#[tokio::test]
async fn test_add_new_accumulates_until_exhausted() {
    let market = Arc::new(MockMarket::standard());
    let cfg = SelectionConfig {
        tiers: vec![Tier::new(8, false)],
        ..selection()
    };
    let coordinator = build(&market, &cfg);

    for expected in [1, 2, 3, 4] {
        let summary = run(&coordinator, SearchMode::AddNew).await;
        assert_eq!(summary.selected_item, Some(expected));
    }
    let summary = run(&coordinator, SearchMode::AddNew).await;
    assert_eq!(summary.outcome, SelectionOutcome::NoSelection(NoSelectionReason::NoCandidates));

    assert_eq!(ids(&coordinator.snapshot().await), vec![1, 2, 3, 4]);
    assert_eq!(coordinator.status().await, SearchStatus::Completed { selected: false });

    // Replace-all starts over from the top.
    let summary = run(&coordinator, SearchMode::ReplaceAll).await;
    assert_eq!(summary.selected_item, Some(1));
    assert_eq!(ids(&coordinator.snapshot().await), vec![1]);
}

#[tokio::test]
async fn test_membership_filter_restricts_pool() {
    let market = Arc::new(MockMarket::standard());
    let cfg = SelectionConfig {
        membership_filter: MembershipFilter::F2p,
        tiers: vec![Tier::new(8, false)],
        ..selection()
    };
    let coordinator = build(&market, &cfg);

    assert_eq!(run(&coordinator, SearchMode::AddNew).await.selected_item, Some(1));
    assert_eq!(run(&coordinator, SearchMode::AddNew).await.selected_item, Some(2));
    assert!(run(&coordinator, SearchMode::AddNew).await.selected_item.is_none());
}

#[tokio::test]
async fn test_store_bounded_by_max_recommendations() {
    let market = Arc::new(MockMarket::standard());
    let cfg = SelectionConfig {
        max_recommendations: 2,
        tiers: vec![Tier::new(8, false)],
        ..selection()
    };
    let coordinator = build(&market, &cfg);

    run(&coordinator, SearchMode::AddNew).await;
    run(&coordinator, SearchMode::AddNew).await;
    let third = run(&coordinator, SearchMode::AddNew).await;

    assert_eq!(third.selected_item, Some(3));
    assert_eq!(third.evicted, vec![3]);
    assert_eq!(ids(&coordinator.snapshot().await), vec![1, 2]);
}

#[tokio::test]
async fn test_snapshot_failure_is_reported_and_recoverable() {
    let market = Arc::new(MockMarket::standard());
    let refresh = Arc::new(RefreshTracker::new());
    let coordinator = build(&market, &selection()).with_listener(refresh.clone());

    market.set_error("upstream unavailable");
    let summary = run(&coordinator, SearchMode::ReplaceAll).await;
    assert_eq!(
        summary.outcome,
        SelectionOutcome::NoSelection(NoSelectionReason::SnapshotUnavailable)
    );
    assert_eq!(refresh.revision(), 1);
    assert!(!coordinator.is_searching());

    market.clear_error();
    let summary = run(&coordinator, SearchMode::ReplaceAll).await;
    assert!(summary.selected_item.is_some());
    assert_eq!(refresh.revision(), 2);
}

#[tokio::test]
async fn test_snapshot_changes_between_runs() {
    let market = Arc::new(MockMarket::standard());
    let cfg = SelectionConfig {
        tiers: vec![Tier::new(8, false)],
        ..selection()
    };
    let coordinator = build(&market, &cfg);
    run(&coordinator, SearchMode::ReplaceAll).await;

    market.set_items(vec![crate::mock_market::item(9, "Mithril platebody", 5_000, 6_000, 125)]);
    let summary = run(&coordinator, SearchMode::AddNew).await;
    assert_eq!(summary.selected_item, Some(9));
    assert_eq!(summary.scanned, 1);
    assert_eq!(ids(&coordinator.snapshot().await), vec![1, 9]);
}

#[tokio::test]
async fn test_concurrent_trigger_is_dropped() {
    let market = Arc::new(MockMarket::standard());
    let refresh = Arc::new(RefreshTracker::new());
    let coordinator = Arc::new(build(&market, &selection()).with_listener(refresh.clone()));
    let app = build_router(Arc::new(DashboardState::new(coordinator.clone(), refresh, 0)));

    let gate = market.hold_snapshot();
    assert!(coordinator.request_search(SearchMode::ReplaceAll));
    let handle = {
        let coordinator = coordinator.clone();
        tokio::spawn(async move { coordinator.run_search().await })
    };

    for _ in 0..200 {
        if coordinator.is_searching() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(coordinator.is_searching());
    assert_eq!(coordinator.status().await, SearchStatus::Searching);

    assert!(!coordinator.request_search(SearchMode::AddNew));
    assert!(coordinator.run_search().await.is_none());

    let resp = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/search")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CONFLICT);

    gate.notify_one();
    let summary = handle.await.unwrap().expect("first run completes");
    assert_eq!(summary.mode, SearchMode::ReplaceAll);
    assert_eq!(market.snapshot_calls.load(Ordering::SeqCst), 1);
    assert!(!coordinator.is_searching());
    assert!(!coordinator.is_search_allowed());
}

#[test]
fn test_selector_driven_synchronously() {
    let market = Arc::new(MockMarket::new(Vec::new(), 0).failing_verification(1).failing_verification(2));
    let candidates = vec![
        Candidate::new(1, "first", 0, 500, 0, 100),
        Candidate::new(2, "second", 0, 400, 0, 100),
    ];

    // Empty first tier passes through to the unchecked tier.
    let selector = TieredSelector::new(
        vec![Tier::new(0, true), Tier::new(8, false)],
        market.clone(),
        LiquidityPolicy::default(),
        Duration::from_secs(1),
    );
    let outcome = tokio_test::block_on(selector.select(&candidates));
    let sel = outcome.selection().unwrap();
    assert_eq!((sel.candidate.id, sel.tier), (1, 1));

    // Both verifications fail: profit alone decides.
    let selector = TieredSelector::new(
        vec![Tier::new(2, true)],
        market.clone(),
        LiquidityPolicy::default(),
        Duration::from_secs(1),
    );
    let outcome = tokio_test::block_on(selector.select(&candidates));
    let sel = outcome.selection().unwrap();
    assert_eq!(sel.candidate.id, 1);
    assert!(sel.liquidity.is_none());
    assert!((sel.score.unwrap() - 0.3).abs() < 1e-9);
    assert_eq!(market.verify_calls.load(Ordering::SeqCst), 2);
}

#[test]
fn test_bundled_config_builds_coordinator() {
    let cfg = AppConfig::load(concat!(env!("CARGO_MANIFEST_DIR"), "/config.toml")).unwrap();
    let market = Arc::new(MockMarket::standard());
    let coordinator = build(&market, &cfg.selection);
    assert!(!coordinator.is_search_allowed());
    assert_eq!(coordinator.mode(), SearchMode::ReplaceAll);
}
