//! Home page: product grid, category filter, sorting, pagination

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use storecheck_core::{body_of, perform_and_await_response, PageHandle};

use crate::{FlowError, FlowResult};

const PRODUCT_NAMES: &str = "[data-test='product-name']";
const PRODUCT_PRICES: &str = "[data-test='product-price']";
const PRODUCT_CARDS: &str = "[data-test^='product-']";
const SORT_DROPDOWN: &str = "select#sort";
const NEXT_PAGE: &str = "a[aria-label*='Next']";
const NEXT_PAGE_DISABLED: &str = "li.disabled a[aria-label*='Next']";
const ACTIVE_PAGE: &str = "li.page-item.active a";

pub struct HomePage {
    page: Arc<dyn PageHandle>,
    wait_timeout: Duration,
}

impl HomePage {
    pub fn new(page: Arc<dyn PageHandle>, wait_timeout: Duration) -> Self {
        Self { page, wait_timeout }
    }

    pub async fn open(&self, base_url: &str) -> FlowResult<()> {
        info!("navigating to {}", base_url);
        self.page.goto(base_url).await?;
        Ok(())
    }

    /// Click a category label and wait for the filtered product listing
    /// to come back from the API.
    pub async fn filter_by_category(&self, category: &str) -> FlowResult<()> {
        let selector = format!("label:has-text('{}')", category);
        perform_and_await_response(
            self.page.as_ref(),
            "filter by category",
            self.wait_timeout,
            body_of("products?"),
            || self.page.click(&selector),
        )
        .await?;
        Ok(())
    }

    /// Pick a sort option and wait for the re-sorted listing.
    pub async fn sort_by(&self, option: &str) -> FlowResult<()> {
        perform_and_await_response(
            self.page.as_ref(),
            "sort products",
            self.wait_timeout,
            body_of("products?"),
            || self.page.select_option(SORT_DROPDOWN, option),
        )
        .await?;
        Ok(())
    }

    /// Open the first product card; completion is the related-products
    /// call the details page fires.
    pub async fn open_first_product(&self) -> FlowResult<()> {
        perform_and_await_response(
            self.page.as_ref(),
            "open first product",
            self.wait_timeout,
            body_of("/related"),
            || self.page.click(PRODUCT_CARDS),
        )
        .await?;
        Ok(())
    }

    /// Advance to the next result page. Fails when the next button is
    /// missing or disabled.
    pub async fn next_page(&self) -> FlowResult<()> {
        if self.page.count(NEXT_PAGE).await? == 0 {
            return Err(FlowError::UnexpectedState("next page button not found".into()));
        }
        if self.page.count(NEXT_PAGE_DISABLED).await? > 0 {
            return Err(FlowError::UnexpectedState("next page button is disabled".into()));
        }
        perform_and_await_response(
            self.page.as_ref(),
            "next page",
            self.wait_timeout,
            body_of("products"),
            || self.page.click(NEXT_PAGE),
        )
        .await?;
        Ok(())
    }

    pub async fn title(&self) -> FlowResult<String> {
        Ok(self.page.title().await?)
    }

    pub async fn product_count(&self) -> FlowResult<usize> {
        Ok(self.page.count(PRODUCT_CARDS).await?)
    }

    pub async fn tool_count(&self) -> FlowResult<usize> {
        Ok(self.page.count(PRODUCT_NAMES).await?)
    }

    /// True when the grid is non-empty and every product name is visible.
    pub async fn all_tools_visible(&self) -> FlowResult<bool> {
        if self.page.count(PRODUCT_NAMES).await? == 0 {
            return Ok(false);
        }
        Ok(self.page.is_visible(PRODUCT_NAMES).await?)
    }

    /// Current page number from the active pagination element, read from
    /// its `aria-label` (`Page-<n>`) with the element text as fallback.
    pub async fn active_page_number(&self) -> FlowResult<u32> {
        if let Some(label) = self.page.get_attribute(ACTIVE_PAGE, "aria-label").await? {
            if let Some(n) = label.strip_prefix("Page-") {
                if let Ok(page) = n.trim().parse() {
                    return Ok(page);
                }
            }
        }
        let text = self.page.text_content(ACTIVE_PAGE).await?;
        text.trim()
            .parse()
            .map_err(|_| FlowError::UnexpectedState(format!("unreadable page number: '{}'", text)))
    }

    /// Whether the listed prices are in non-decreasing order. Prices are
    /// scraped from the joined price-element text, one amount per `$`.
    pub async fn prices_sorted_ascending(&self) -> FlowResult<bool> {
        let prices = self.prices().await?;
        Ok(prices.windows(2).all(|w| w[0] <= w[1]))
    }

    async fn prices(&self) -> FlowResult<Vec<f64>> {
        let text = self.page.text_content(PRODUCT_PRICES).await?;
        let mut prices = Vec::new();
        for raw in text.split('$').filter(|s| !s.trim().is_empty()) {
            let cleaned: String = raw
                .chars()
                .take_while(|c| c.is_ascii_digit() || *c == '.')
                .collect();
            if cleaned.is_empty() {
                continue;
            }
            let price = cleaned.parse().map_err(|_| {
                FlowError::UnexpectedState(format!("unparseable price: '{}'", raw.trim()))
            })?;
            prices.push(price);
        }
        Ok(prices)
    }
}
