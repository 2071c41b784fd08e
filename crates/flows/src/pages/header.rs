//! Site header: navigation, cart badge, sign-in state

use std::sync::Arc;

use storecheck_core::PageHandle;

use crate::{FlowError, FlowResult};

const LOGO: &str = "[data-test='nav-logo']";
const HOME_LINK: &str = "[data-test='nav-home']";
const CATEGORIES: &str = "[data-test='nav-categories']";
const CONTACT: &str = "[data-test='nav-contact']";
const SIGN_IN: &str = "[data-test='nav-sign-in']";
const CART: &str = "[data-test='nav-cart']";
const CART_QUANTITY: &str = "[data-test='cart-quantity']";
const USER_MENU: &str = "[data-test='nav-menu']";

pub struct Header {
    page: Arc<dyn PageHandle>,
}

impl Header {
    pub fn new(page: Arc<dyn PageHandle>) -> Self {
        Self { page }
    }

    pub async fn go_home(&self) -> FlowResult<()> {
        self.page.click(HOME_LINK).await?;
        Ok(())
    }

    pub async fn open_categories(&self) -> FlowResult<()> {
        self.page.click(CATEGORIES).await?;
        Ok(())
    }

    pub async fn go_to_contact(&self) -> FlowResult<()> {
        self.page.click(CONTACT).await?;
        Ok(())
    }

    pub async fn open_cart(&self) -> FlowResult<()> {
        self.page.click(CART).await?;
        Ok(())
    }

    pub async fn is_logo_visible(&self) -> FlowResult<bool> {
        Ok(self.page.is_visible(LOGO).await?)
    }

    pub async fn cart_item_count(&self) -> FlowResult<u32> {
        let text = self.page.text_content(CART_QUANTITY).await?;
        text.trim()
            .parse()
            .map_err(|_| FlowError::UnexpectedState(format!("unreadable cart count: '{}'", text)))
    }

    pub async fn is_signed_in(&self) -> FlowResult<bool> {
        Ok(self.page.is_visible(USER_MENU).await?)
    }

    pub async fn is_sign_in_visible(&self) -> FlowResult<bool> {
        Ok(self.page.is_visible(SIGN_IN).await?)
    }
}
