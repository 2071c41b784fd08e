//! Product details page: name/price reads and add-to-cart

use std::sync::Arc;
use std::time::Duration;

use storecheck_core::{perform_and_await_response, PageHandle};

use crate::FlowResult;

const PRODUCT_NAME: &str = "[data-test='product-name']";
const UNIT_PRICE: &str = "[data-test='unit-price']";
const QUANTITY: &str = "[data-test='quantity']";
const ADD_TO_CART: &str = "[data-test='add-to-cart']";

pub struct ProductDetailsPage {
    page: Arc<dyn PageHandle>,
    wait_timeout: Duration,
}

impl ProductDetailsPage {
    pub fn new(page: Arc<dyn PageHandle>, wait_timeout: Duration) -> Self {
        Self { page, wait_timeout }
    }

    pub async fn set_quantity(&self, quantity: u32) -> FlowResult<()> {
        self.page.fill(QUANTITY, &quantity.to_string()).await?;
        Ok(())
    }

    /// Click "Add to cart" and wait for the cart mutation to land on the
    /// backend before reporting success.
    pub async fn add_to_cart(&self) -> FlowResult<()> {
        perform_and_await_response(
            self.page.as_ref(),
            "add to cart",
            self.wait_timeout,
            |url, status| (url.contains("/cart") || url.contains("add-to-cart")) && status == 200,
            || self.page.click(ADD_TO_CART),
        )
        .await?;
        Ok(())
    }

    pub async fn product_name(&self) -> FlowResult<String> {
        Ok(self.page.text_content(PRODUCT_NAME).await?)
    }

    pub async fn product_price(&self) -> FlowResult<String> {
        Ok(self.page.text_content(UNIT_PRICE).await?)
    }

    pub async fn is_displayed(&self) -> FlowResult<bool> {
        Ok(self.page.is_visible(PRODUCT_NAME).await?
            && self.page.is_visible(UNIT_PRICE).await?)
    }

    pub async fn is_add_to_cart_visible(&self) -> FlowResult<bool> {
        Ok(self.page.is_visible(ADD_TO_CART).await?)
    }
}
