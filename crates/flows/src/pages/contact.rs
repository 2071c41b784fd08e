//! Contact page: form fills and the synchronized submit

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use storecheck_core::error::DriverError;
use storecheck_core::{body_of, perform_and_await_response, PageHandle};

use crate::FlowResult;

const FIRST_NAME: &str = "[data-test='first-name']";
const LAST_NAME: &str = "[data-test='last-name']";
const EMAIL: &str = "[data-test='email']";
const SUBJECT: &str = "[data-test='subject']";
const MESSAGE: &str = "[data-test='message']";
const SEND: &str = "[data-test='contact-submit']";
const ALERT: &str = "[role='alert']";

pub struct ContactPage {
    page: Arc<dyn PageHandle>,
    wait_timeout: Duration,
}

impl ContactPage {
    pub fn new(page: Arc<dyn PageHandle>, wait_timeout: Duration) -> Self {
        Self { page, wait_timeout }
    }

    pub async fn open(&self, base_url: &str) -> FlowResult<()> {
        info!("navigating to {}/contact", base_url);
        self.page.goto(&format!("{}/contact", base_url)).await?;
        Ok(())
    }

    pub async fn set_first_name(&self, value: &str) -> FlowResult<()> {
        self.page.fill(FIRST_NAME, value).await?;
        Ok(())
    }

    pub async fn set_last_name(&self, value: &str) -> FlowResult<()> {
        self.page.fill(LAST_NAME, value).await?;
        Ok(())
    }

    pub async fn set_email(&self, value: &str) -> FlowResult<()> {
        self.page.fill(EMAIL, value).await?;
        Ok(())
    }

    pub async fn select_subject(&self, subject: &str) -> FlowResult<()> {
        self.page.select_option(SUBJECT, subject).await?;
        Ok(())
    }

    pub async fn set_message(&self, value: &str) -> FlowResult<()> {
        self.page.fill(MESSAGE, value).await?;
        Ok(())
    }

    /// Plain submit, no synchronization. Used when the scenario asserts
    /// client-side validation rather than a backend effect.
    pub async fn submit(&self) -> FlowResult<()> {
        self.page.click(SEND).await?;
        Ok(())
    }

    /// Submit and wait until the messages endpoint has accepted the form.
    pub async fn submit_and_await_success(&self) -> FlowResult<()> {
        perform_and_await_response(
            self.page.as_ref(),
            "submit contact form",
            self.wait_timeout,
            body_of("/messages"),
            || self.page.click(SEND),
        )
        .await?;
        Ok(())
    }

    pub async fn alert_text(&self) -> FlowResult<String> {
        Ok(self.page.text_content(ALERT).await?)
    }

    pub async fn alert_contains(&self, expected: &str) -> FlowResult<bool> {
        // An absent alert is a normal "no", not an engine failure.
        match self.page.text_content(ALERT).await {
            Ok(text) => Ok(text.contains(expected)),
            Err(DriverError::ElementAbsent { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn is_form_displayed(&self) -> FlowResult<bool> {
        Ok(self.page.is_visible(EMAIL).await?)
    }

    pub async fn all_fields_visible(&self) -> FlowResult<bool> {
        for selector in [FIRST_NAME, LAST_NAME, EMAIL, SUBJECT, MESSAGE, SEND] {
            if !self.page.is_visible(selector).await? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}
