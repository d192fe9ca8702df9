//! Portal session acquisition via headless browser

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use headless_chrome::{Browser, LaunchOptions};

use crate::config::PortalConfig;

/// Fixed desktop user agent. The availability endpoint rejects requests
/// that don't look like they come from the portal's own frontend.
pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/108.0.0.0 Safari/537.36";

/// Trait for acquiring an authenticated portal session
#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub trait SessionProvider: Send + Sync {
    /// Log in and return the session cookies serialized as
    /// `name=value` pairs joined by `"; "`
    async fn acquire(&self) -> crate::Result<String>;
}

/// Acquires a session by driving the login form in headless Chrome
pub struct ChromeSessionProvider {
    config: PortalConfig,
}

impl std::fmt::Debug for ChromeSessionProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChromeSessionProvider")
            .field("login_url", &self.config.login_url)
            .field("user_id", &self.config.user_id)
            .finish()
    }
}

impl ChromeSessionProvider {
    pub fn new(config: &PortalConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }
}

#[async_trait]
impl SessionProvider for ChromeSessionProvider {
    async fn acquire(&self) -> crate::Result<String> {
        let config = self.config.clone();
        tracing::info!("Logging in to {} via headless browser", config.login_url);

        let cookie = tokio::task::spawn_blocking(move || login_blocking(&config))
            .await
            .map_err(|e| crate::SlotwatchError::Login(format!("login task panicked: {e}")))?
            .map_err(|e| crate::SlotwatchError::Login(format!("{e:#}")))?;

        tracing::info!("Login succeeded");
        Ok(cookie)
    }
}

/// Drive the login form and serialize the cookie jar. The Chrome process is
/// killed when `browser` drops, on success and on every early return.
fn login_blocking(config: &PortalConfig) -> anyhow::Result<String> {
    let options = LaunchOptions::default_builder()
        .headless(true)
        .window_size(Some((1920, 1080)))
        .build()
        .map_err(|e| anyhow::anyhow!("building browser launch options: {e}"))?;
    let browser = Browser::new(options).context("launching headless browser")?;

    let tab = browser.new_tab().context("opening browser tab")?;
    tab.set_default_timeout(Duration::from_secs(config.login_timeout_seconds));
    tab.set_user_agent(USER_AGENT, None, None)
        .context("setting user agent")?;

    tab.navigate_to(&config.login_url)
        .context("navigating to login page")?;

    tab.wait_for_element(&config.id_selector)
        .context("finding user id field")?
        .type_into(&config.user_id)?;
    tab.wait_for_element(&config.password_selector)
        .context("finding password field")?
        .type_into(&config.password)?;
    tab.wait_for_element(&config.submit_selector)
        .context("finding submit button")?
        .click()?;

    tab.wait_for_xpath(&config.post_login_xpath)
        .context("waiting for post-login marker")?;

    let cookies = tab.get_cookies().context("reading session cookies")?;
    let cookie_string = cookies
        .iter()
        .map(|cookie| format!("{}={}", cookie.name, cookie.value))
        .collect::<Vec<_>>()
        .join("; ");

    Ok(cookie_string)
}
