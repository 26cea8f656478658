use pagegraph_crawl::crawl_engine::{
    EarlyStop, NavigationDecision, NavigationGate, NavigationHistory, NavigationPolicy, StopLoading,
};
use proptest::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Default)]
struct CountingPage {
    stops: AtomicUsize,
}

impl StopLoading for CountingPage {
    fn stop_loading(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}

fn gate(crawl_duplicates: bool) -> NavigationGate {
    let history = NavigationHistory::new(
        "https://target.example/",
        vec![
            "https://first.example/".to_string(),
            "https://second.example/".to_string(),
        ],
    );
    NavigationGate::new(NavigationPolicy::new(crawl_duplicates), history, EarlyStop::new())
}

#[test]
fn test_first_request_for_target_allowed_regardless_of_history() {
    let page = CountingPage::default();
    // Target is also in the handed-over history
    let history = NavigationHistory::new(
        "https://first.example/",
        vec!["https://first.example/".to_string()],
    );
    let gate = NavigationGate::new(NavigationPolicy::new(false), history, EarlyStop::new());

    assert_eq!(
        gate.on_request("https://first.example/", true, &page),
        NavigationDecision::Allow
    );
    assert!(!gate.early_stop().is_triggered());
    assert_eq!(page.stops.load(Ordering::SeqCst), 0);
}

#[test]
fn test_redirect_sets_flag_once_stops_once_and_records_target() {
    let page = CountingPage::default();
    let gate = gate(false);

    let decision = gate.on_request("https://elsewhere.example/landing", true, &page);

    assert_eq!(
        decision,
        NavigationDecision::RedirectDetected("https://elsewhere.example/landing".to_string())
    );
    assert!(gate.early_stop().is_triggered());
    assert_eq!(page.stops.load(Ordering::SeqCst), 1);
    assert_eq!(
        gate.redirect_target().as_deref(),
        Some("https://elsewhere.example/landing")
    );
}

#[test]
fn test_visited_url_with_duplicates_enabled_changes_nothing() {
    let page = CountingPage::default();
    let gate = gate(true);

    assert_eq!(
        gate.on_request("https://first.example/", true, &page),
        NavigationDecision::Allow
    );
    assert!(!gate.early_stop().is_triggered());
    assert_eq!(page.stops.load(Ordering::SeqCst), 0);
    assert!(gate.redirect_target().is_none());
}

#[test]
fn test_loop_stops_without_redirect_target() {
    let page = CountingPage::default();
    let gate = gate(false);

    assert_eq!(
        gate.on_request("https://second.example/", true, &page),
        NavigationDecision::LoopDetected
    );
    assert!(gate.early_stop().is_triggered());
    assert_eq!(page.stops.load(Ordering::SeqCst), 1);
    assert!(gate.redirect_target().is_none());
}

proptest! {
    #[test]
    fn prop_sub_resources_never_touch_state(
        hosts in proptest::collection::vec("[a-z]{1,8}", 1..20),
        crawl_duplicates in any::<bool>(),
    ) {
        let page = CountingPage::default();
        let gate = gate(crawl_duplicates);

        for host in &hosts {
            let url = format!("https://{host}.example/");
            prop_assert_eq!(gate.on_request(&url, false, &page), NavigationDecision::Allow);
        }
        // Sub-frame hit on a visited URL as well
        prop_assert_eq!(
            gate.on_request("https://second.example/", false, &page),
            NavigationDecision::Allow
        );

        prop_assert!(!gate.early_stop().is_triggered());
        prop_assert_eq!(page.stops.load(Ordering::SeqCst), 0);
        prop_assert!(gate.redirect_target().is_none());
    }

    #[test]
    fn prop_target_always_allowed(crawl_duplicates in any::<bool>()) {
        let policy = NavigationPolicy::new(crawl_duplicates);
        let history = NavigationHistory::new("https://target.example/", Vec::new());
        prop_assert_eq!(
            policy.decide(&history, "https://target.example/", true),
            NavigationDecision::Allow
        );
    }
}
