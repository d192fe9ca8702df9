//! Configuration types for the slotwatch service

use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub portal: PortalConfig,
    #[serde(default)]
    pub target: TargetConfig,
    #[serde(default)]
    pub notifiers: Vec<NotifierConfig>,
    #[serde(default)]
    pub poll: PollConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            portal: PortalConfig::default(),
            target: TargetConfig::default(),
            notifiers: Vec::new(),
            poll: PollConfig::default(),
        }
    }
}

/// Portal login settings. Defaults point at the SNUH patient portal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortalConfig {
    #[serde(default = "default_login_url")]
    pub login_url: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_id_selector")]
    pub id_selector: String,
    #[serde(default = "default_password_selector")]
    pub password_selector: String,
    #[serde(default = "default_submit_selector")]
    pub submit_selector: String,
    /// XPath of an element that only exists once the login succeeded
    #[serde(default = "default_post_login_xpath")]
    pub post_login_xpath: String,
    #[serde(default = "default_login_timeout")]
    pub login_timeout_seconds: u64,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            login_url: default_login_url(),
            user_id: String::new(),
            password: String::new(),
            id_selector: default_id_selector(),
            password_selector: default_password_selector(),
            submit_selector: default_submit_selector(),
            post_login_xpath: default_post_login_xpath(),
            login_timeout_seconds: default_login_timeout(),
        }
    }
}

/// Which doctor's schedule to query, and where
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    #[serde(default = "default_endpoint_url")]
    pub endpoint_url: String,
    #[serde(default = "default_referer")]
    pub referer: String,
    #[serde(default = "default_dept_cd")]
    pub dept_cd: String,
    #[serde(default = "default_dr_cd")]
    pub dr_cd: String,
    #[serde(default)]
    pub year: i32,
    /// Months to query, in order. Duplicates are allowed and preserved.
    #[serde(default)]
    pub months: Vec<u32>,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            endpoint_url: default_endpoint_url(),
            referer: default_referer(),
            dept_cd: default_dept_cd(),
            dr_cd: default_dr_cd(),
            year: 0,
            months: Vec::new(),
        }
    }
}

/// Notifier configuration with tagged enum for extensibility
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum NotifierConfig {
    #[serde(rename = "telegram")]
    Telegram {
        #[serde(default)]
        bot_token: String,
        #[serde(default)]
        chat_id: String,
    },
}

impl NotifierConfig {
    pub fn type_name(&self) -> &str {
        match self {
            NotifierConfig::Telegram { .. } => "telegram",
        }
    }
}

/// Polling loop timing and behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollConfig {
    #[serde(default = "default_poll_interval")]
    pub poll_interval_seconds: u64,
    #[serde(default = "default_relogin_retry")]
    pub relogin_retry_seconds: u64,
    /// Pause between per-month requests, to not hammer the portal
    #[serde(default = "default_request_pause")]
    pub request_pause_ms: u64,
    /// When true, dates already announced may be announced again on a
    /// later cycle. When false, each date is announced at most once per
    /// process lifetime.
    #[serde(default = "default_true")]
    pub renotify: bool,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            poll_interval_seconds: default_poll_interval(),
            relogin_retry_seconds: default_relogin_retry(),
            request_pause_ms: default_request_pause(),
            renotify: true,
        }
    }
}

fn default_login_url() -> String {
    "https://www.snuh.org/login.do".to_string()
}

fn default_id_selector() -> String {
    "#id".to_string()
}

fn default_password_selector() -> String {
    "#pass".to_string()
}

fn default_submit_selector() -> String {
    "#loginBtn".to_string()
}

fn default_post_login_xpath() -> String {
    "//a[contains(text(),'로그아웃')]".to_string()
}

fn default_login_timeout() -> u64 {
    10
}

fn default_endpoint_url() -> String {
    "https://www.snuh.org/reservation/medDateListAjax.do".to_string()
}

fn default_referer() -> String {
    "https://www.snuh.org/reservation/reservation.do".to_string()
}

fn default_dept_cd() -> String {
    "OSHS".to_string()
}

fn default_dr_cd() -> String {
    "05081".to_string()
}

fn default_poll_interval() -> u64 {
    300
}

fn default_relogin_retry() -> u64 {
    600
}

fn default_request_pause() -> u64 {
    1000
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Check that the target query is usable. A bad year or month list is
    /// fatal at startup.
    pub fn validate(&self) -> crate::Result<()> {
        if self.target.year < 1 {
            return Err(crate::SlotwatchError::Config(format!(
                "Invalid target year: {}",
                self.target.year
            )));
        }
        if self.target.months.is_empty() {
            return Err(crate::SlotwatchError::Config(
                "No target months configured".to_string(),
            ));
        }
        for month in &self.target.months {
            if !(1..=12).contains(month) {
                return Err(crate::SlotwatchError::Config(format!(
                    "Invalid target month: {}",
                    month
                )));
            }
        }
        Ok(())
    }

    /// Fill credentials that were left out of the config file, from the
    /// environment first and interactively as a last resort. Telegram
    /// credentials stay optional: an empty token or chat id means
    /// notification is skipped, which is a valid mode.
    pub fn resolve_secrets(&mut self) -> crate::Result<()> {
        if self.portal.user_id.is_empty() {
            self.portal.user_id = match std::env::var("SLOTWATCH_PORTAL_ID") {
                Ok(value) => value,
                Err(_) => prompt_line("Portal user id: ")?,
            };
        }
        if self.portal.password.is_empty() {
            self.portal.password = match std::env::var("SLOTWATCH_PORTAL_PASSWORD") {
                Ok(value) => value,
                Err(_) => rpassword::prompt_password("Portal password: ")?,
            };
        }

        for notifier in &mut self.notifiers {
            let NotifierConfig::Telegram { bot_token, chat_id } = notifier;
            if bot_token.is_empty() {
                if let Ok(value) = std::env::var("SLOTWATCH_TELEGRAM_TOKEN") {
                    *bot_token = value;
                }
            }
            if chat_id.is_empty() {
                if let Ok(value) = std::env::var("SLOTWATCH_TELEGRAM_CHAT_ID") {
                    *chat_id = value;
                }
            }
        }

        Ok(())
    }
}

fn prompt_line(prompt: &str) -> crate::Result<String> {
    print!("{prompt}");
    std::io::stdout().flush()?;
    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

/// Parse a month list given as space- or comma-separated integers,
/// e.g. "7 8" or "7,8"
pub fn parse_months(input: &str) -> crate::Result<Vec<u32>> {
    let cleaned = input.replace(',', " ");
    let mut months = Vec::new();
    for token in cleaned.split_whitespace() {
        let month: u32 = token.parse().map_err(|_| {
            crate::SlotwatchError::Config(format!("Invalid month value: {token}"))
        })?;
        months.push(month);
    }
    Ok(months)
}

/// Load configuration from a JSON file
pub fn load_config(path: &Path) -> crate::Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        crate::SlotwatchError::Config(format!("Failed to read config file {:?}: {}", path, e))
    })?;
    let config: Config = serde_json::from_str(&content)?;
    Ok(config)
}
