//! Storefront journeys driven through the harness against the fake engine.

use std::sync::Arc;
use std::time::Duration;

use storecheck_core::testkit::{FakeStarter, FakeState, RecordingSink};
use storecheck_core::{
    Config, Harness, HarnessError, ReportSink, ResponseEvent, ScenarioRecord, ScreenshotMode,
};
use storecheck_flows::{ContactPage, FlowError, Header, HomePage, ProductDetailsPage};

const WAIT: Duration = Duration::from_secs(1);

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_test_writer()
        .try_init();
}

fn harness(state: &Arc<FakeState>) -> Harness {
    init_logging();
    let config = Arc::new(Config {
        screenshot_mode: ScreenshotMode::Never,
        base_url: "https://example.test".to_string(),
        ..Config::default()
    });
    Harness::new(
        config,
        Arc::new(RecordingSink::new()) as Arc<dyn ReportSink>,
        Arc::new(FakeStarter::new(Arc::clone(state))),
    )
}

fn api(path: &str) -> ResponseEvent {
    ResponseEvent {
        url: format!("https://api.example.test{}", path),
        status: 200,
    }
}

#[tokio::test]
async fn filter_and_sort_complete_on_listing_responses() {
    let state = FakeState::shared();
    state.respond_on_click("label:has-text('Hammer')", api("/products?by_category=1"));
    state.respond_on_select("select#sort", api("/products?sort=price,asc"));
    state.set_count("[data-test^='product-']", 9);
    state.set_text("[data-test='product-price']", "$3.50$7.00$12.99");

    let harness = harness(&state);
    let scenario = ScenarioRecord::new("filter and sort", vec![]);
    let mut ctx = harness.before(&scenario).await.unwrap();

    let home = HomePage::new(ctx.page().unwrap(), WAIT);
    home.open(&ctx.config().base_url).await.unwrap();
    home.filter_by_category("Hammer").await.unwrap();
    home.sort_by("price,asc").await.unwrap();

    assert_eq!(home.product_count().await.unwrap(), 9);
    assert!(home.prices_sorted_ascending().await.unwrap());
    assert_eq!(state.gotos(), vec!["https://example.test"]);

    ctx.after(&scenario).await;
}

#[tokio::test]
async fn sorting_detects_out_of_order_prices() {
    let state = FakeState::shared();
    state.set_text("[data-test='product-price']", "$12.99$3.50");

    let harness = harness(&state);
    let scenario = ScenarioRecord::new("bad sort", vec![]);
    let mut ctx = harness.before(&scenario).await.unwrap();

    let home = HomePage::new(ctx.page().unwrap(), WAIT);
    assert!(!home.prices_sorted_ascending().await.unwrap());

    ctx.after(&scenario).await;
}

#[tokio::test]
async fn pagination_requires_an_enabled_next_button() {
    let state = FakeState::shared();
    state.set_count("a[aria-label*='Next']", 1);
    state.set_count("li.disabled a[aria-label*='Next']", 1);

    let harness = harness(&state);
    let scenario = ScenarioRecord::new("pagination", vec![]);
    let mut ctx = harness.before(&scenario).await.unwrap();

    let home = HomePage::new(ctx.page().unwrap(), WAIT);
    let err = home.next_page().await.unwrap_err();
    assert!(matches!(err, FlowError::UnexpectedState(_)));

    ctx.after(&scenario).await;
}

#[tokio::test]
async fn pagination_advances_and_reads_active_page() {
    let state = FakeState::shared();
    state.set_count("a[aria-label*='Next']", 1);
    state.respond_on_click("a[aria-label*='Next']", api("/products?page=2"));
    state.set_attribute("li.page-item.active a", "aria-label", "Page-2");

    let harness = harness(&state);
    let scenario = ScenarioRecord::new("next page", vec![]);
    let mut ctx = harness.before(&scenario).await.unwrap();

    let home = HomePage::new(ctx.page().unwrap(), WAIT);
    home.next_page().await.unwrap();
    assert_eq!(home.active_page_number().await.unwrap(), 2);

    ctx.after(&scenario).await;
}

#[tokio::test]
async fn add_to_cart_waits_for_the_cart_mutation() {
    let state = FakeState::shared();
    state.respond_on_click("[data-test^='product-']", api("/products/1/related"));
    state.respond_on_click("[data-test='add-to-cart']", api("/cart"));
    state.set_text("[data-test='product-name']", "Claw Hammer");
    state.set_text("[data-test='cart-quantity']", "2");

    let harness = harness(&state);
    let scenario = ScenarioRecord::new("add to cart", vec![]);
    let mut ctx = harness.before(&scenario).await.unwrap();
    let page = ctx.page().unwrap();

    let home = HomePage::new(Arc::clone(&page), WAIT);
    home.open_first_product().await.unwrap();

    let details = ProductDetailsPage::new(Arc::clone(&page), WAIT);
    assert_eq!(details.product_name().await.unwrap(), "Claw Hammer");
    details.set_quantity(2).await.unwrap();
    details.add_to_cart().await.unwrap();

    let header = Header::new(page);
    assert_eq!(header.cart_item_count().await.unwrap(), 2);

    ctx.after(&scenario).await;
}

#[tokio::test]
async fn contact_form_submit_correlates_with_messages_endpoint() {
    let state = FakeState::shared();
    state.respond_on_click("[data-test='contact-submit']", api("/messages"));
    state.set_visible("[data-test='email']", true);
    state.set_text("[role='alert']", "Thanks for your message! We will contact you shortly.");

    let harness = harness(&state);
    let scenario = ScenarioRecord::new("contact form", vec![]);
    let mut ctx = harness.before(&scenario).await.unwrap();

    let contact = ContactPage::new(ctx.page().unwrap(), WAIT);
    contact.open(&ctx.config().base_url).await.unwrap();
    assert!(contact.is_form_displayed().await.unwrap());

    contact.set_first_name("Jane").await.unwrap();
    contact.set_last_name("Doe").await.unwrap();
    contact.set_email("jane@example.test").await.unwrap();
    contact.select_subject("Warranty").await.unwrap();
    contact.set_message("The hammer arrived without a handle.").await.unwrap();
    contact.submit_and_await_success().await.unwrap();

    assert!(contact.alert_contains("Thanks for your message").await.unwrap());
    assert_eq!(state.gotos(), vec!["https://example.test/contact"]);

    ctx.after(&scenario).await;
}

#[tokio::test]
async fn submit_without_backend_response_times_out() {
    let state = FakeState::shared();

    let harness = harness(&state);
    let scenario = ScenarioRecord::new("dead backend", vec![]);
    let mut ctx = harness.before(&scenario).await.unwrap();

    let contact = ContactPage::new(ctx.page().unwrap(), Duration::from_millis(60));
    let err = contact.submit_and_await_success().await.unwrap_err();
    assert!(matches!(
        err,
        FlowError::Harness(HarnessError::SyncTimeout { .. })
    ));

    ctx.after(&scenario).await;
}

#[tokio::test]
async fn absent_alert_reads_as_no_not_as_failure() {
    let state = FakeState::shared();

    let harness = harness(&state);
    let scenario = ScenarioRecord::new("no alert", vec![]);
    let mut ctx = harness.before(&scenario).await.unwrap();

    let contact = ContactPage::new(ctx.page().unwrap(), WAIT);
    assert!(!contact.alert_contains("Thanks").await.unwrap());

    ctx.after(&scenario).await;
}
