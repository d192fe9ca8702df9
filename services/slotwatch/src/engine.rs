//! Engine: drives login, polling cycles, and notification dispatch

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::notifier::{Notification, Notifier};
use crate::schedule::{console_message, markdown_message, AvailabilityClient, PollReport};
use crate::session::SessionProvider;

/// The engine cycles between authentication and polling until cancelled.
/// A poll that signals session expiry sends it back to re-authentication;
/// a failed login is retried on a longer interval.
pub struct Engine {
    sessions: Arc<dyn SessionProvider>,
    client: AvailabilityClient,
    notifiers: Vec<Arc<dyn Notifier>>,
    booking_url: String,
    poll_interval: Duration,
    relogin_retry: Duration,
    renotify: bool,
    cancel: CancellationToken,
    session: Option<String>,
    announced: BTreeSet<NaiveDate>,
}

impl Engine {
    pub fn new(
        sessions: Arc<dyn SessionProvider>,
        client: AvailabilityClient,
        notifiers: Vec<Arc<dyn Notifier>>,
        config: &Config,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            sessions,
            client,
            notifiers,
            booking_url: config.target.referer.clone(),
            poll_interval: Duration::from_secs(config.poll.poll_interval_seconds),
            relogin_retry: Duration::from_secs(config.poll.relogin_retry_seconds),
            renotify: config.poll.renotify,
            cancel,
            session: None,
            announced: BTreeSet::new(),
        }
    }

    /// Run cycles until the cancellation token is triggered
    pub async fn run(&mut self) {
        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            let wait = self.cycle().await;
            tracing::debug!("Next cycle in {:?}", wait);

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = self.cancel.cancelled() => {
                    tracing::debug!("Driver loop cancelled");
                    break;
                }
            }
        }
    }

    /// One pass of the driver loop: ensure a session exists, poll, and
    /// dispatch notifications. Returns the wait before the next pass.
    pub async fn cycle(&mut self) -> Duration {
        let cookie = match &self.session {
            Some(cookie) => cookie.clone(),
            None => match self.sessions.acquire().await {
                Ok(cookie) => {
                    self.session = Some(cookie.clone());
                    cookie
                }
                Err(e) => {
                    tracing::warn!(
                        "Login failed: {}; retrying in {:?}",
                        e,
                        self.relogin_retry
                    );
                    return self.relogin_retry;
                }
            },
        };

        match self.client.poll(&cookie).await {
            Ok(report) => {
                self.handle_report(report).await;
                self.poll_interval
            }
            Err(e) => {
                tracing::warn!("Polling cycle aborted: {}", e);
                self.session = None;
                match self.sessions.acquire().await {
                    Ok(cookie) => {
                        self.session = Some(cookie);
                        self.poll_interval
                    }
                    Err(e) => {
                        tracing::warn!(
                            "Re-login failed: {}; retrying in {:?}",
                            e,
                            self.relogin_retry
                        );
                        self.relogin_retry
                    }
                }
            }
        }
    }

    async fn handle_report(&mut self, report: PollReport) {
        if !report.skipped_months.is_empty() {
            tracing::warn!("Months skipped this cycle: {:?}", report.skipped_months);
        }

        let to_announce: BTreeSet<NaiveDate> = if self.renotify {
            report.found
        } else {
            report.found.difference(&self.announced).copied().collect()
        };

        if to_announce.is_empty() {
            tracing::info!("No new bookable dates found");
            return;
        }

        tracing::info!("{}", console_message(&to_announce, &self.booking_url));

        let notification = Notification {
            message: markdown_message(&to_announce, &self.booking_url),
        };
        for notifier in &self.notifiers {
            if let Err(e) = notifier.notify(&notification).await {
                // Notification failures never abort the polling loop
                tracing::warn!("Notification via '{}' failed: {}", notifier.type_name(), e);
            }
        }

        if !self.renotify {
            self.announced.extend(to_announce);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TargetConfig;
    use crate::io::{HttpResponse, MockHttpClient};
    use crate::session::MockSessionProvider;

    fn test_config() -> Config {
        let mut config = Config::default();
        config.target.year = 2025;
        config.target.months = vec![7];
        config
    }

    fn availability_client(mock: MockHttpClient, config: &Config) -> AvailabilityClient {
        AvailabilityClient::new(
            &TargetConfig {
                year: config.target.year,
                months: config.target.months.clone(),
                ..TargetConfig::default()
            },
            Duration::from_millis(0),
            Arc::new(mock),
        )
    }

    fn engine(
        sessions: MockSessionProvider,
        http: MockHttpClient,
        notifiers: Vec<Arc<dyn Notifier>>,
        config: &Config,
    ) -> Engine {
        let client = availability_client(http, config);
        Engine::new(
            Arc::new(sessions),
            client,
            notifiers,
            config,
            CancellationToken::new(),
        )
    }

    fn july_response() -> HttpResponse {
        HttpResponse {
            status: 200,
            body: r#"{"scheduleList":[{"meddate":"20250715"}]}"#.to_string(),
        }
    }

    fn login_page_response() -> HttpResponse {
        HttpResponse {
            status: 200,
            body: "<html>login</html>".to_string(),
        }
    }

    #[tokio::test]
    async fn cycle_logs_in_polls_and_notifies() {
        let mut sessions = MockSessionProvider::new();
        sessions
            .expect_acquire()
            .times(1)
            .returning(|| Box::pin(async { Ok("sid=abc".to_string()) }));

        let mut http = MockHttpClient::new();
        http.expect_get()
            .withf(|_, headers| headers.contains(&("Cookie", "sid=abc")))
            .returning(|_, _| Box::pin(async { Ok(july_response()) }));

        let notifier = Arc::new(TestNotifier::new(true));
        let config = test_config();
        let mut engine = engine(sessions, http, vec![notifier.clone()], &config);

        let wait = engine.cycle().await;

        assert_eq!(wait, Duration::from_secs(300));
        assert_eq!(notifier.call_count().await, 1);
        let messages = notifier.messages().await;
        assert!(messages[0].contains("2025년 07월 15일"));
    }

    #[tokio::test]
    async fn login_failure_waits_relogin_interval() {
        let mut sessions = MockSessionProvider::new();
        sessions.expect_acquire().times(1).returning(|| {
            Box::pin(async { Err(crate::SlotwatchError::Login("bad credentials".to_string())) })
        });

        // No HTTP expectation: polling must not happen without a session
        let http = MockHttpClient::new();
        let config = test_config();
        let mut engine = engine(sessions, http, Vec::new(), &config);

        let wait = engine.cycle().await;
        assert_eq!(wait, Duration::from_secs(600));
    }

    #[tokio::test]
    async fn session_expiry_triggers_relogin() {
        let mut sessions = MockSessionProvider::new();
        sessions
            .expect_acquire()
            .times(2)
            .returning(|| Box::pin(async { Ok("sid=abc".to_string()) }));

        let mut http = MockHttpClient::new();
        // First cycle gets the portal's login page back, second cycle works
        http.expect_get()
            .times(1)
            .returning(|_, _| Box::pin(async { Ok(login_page_response()) }));
        http.expect_get()
            .times(1)
            .returning(|_, _| Box::pin(async { Ok(july_response()) }));

        let notifier = Arc::new(TestNotifier::new(true));
        let config = test_config();
        let mut engine = engine(sessions, http, vec![notifier.clone()], &config);

        let wait = engine.cycle().await;
        assert_eq!(wait, Duration::from_secs(300));
        assert_eq!(notifier.call_count().await, 0);

        engine.cycle().await;
        assert_eq!(notifier.call_count().await, 1);
    }

    #[tokio::test]
    async fn failed_relogin_waits_relogin_interval() {
        let mut sessions = MockSessionProvider::new();
        sessions
            .expect_acquire()
            .times(1)
            .returning(|| Box::pin(async { Ok("sid=abc".to_string()) }));
        sessions.expect_acquire().times(1).returning(|| {
            Box::pin(async { Err(crate::SlotwatchError::Login("portal down".to_string())) })
        });

        let mut http = MockHttpClient::new();
        http.expect_get()
            .returning(|_, _| Box::pin(async { Ok(login_page_response()) }));

        let config = test_config();
        let mut engine = engine(sessions, http, Vec::new(), &config);

        let wait = engine.cycle().await;
        assert_eq!(wait, Duration::from_secs(600));
    }

    #[tokio::test]
    async fn renotify_false_announces_each_date_once() {
        let mut sessions = MockSessionProvider::new();
        sessions
            .expect_acquire()
            .returning(|| Box::pin(async { Ok("sid=abc".to_string()) }));

        let mut http = MockHttpClient::new();
        http.expect_get()
            .times(2)
            .returning(|_, _| Box::pin(async { Ok(july_response()) }));

        let notifier = Arc::new(TestNotifier::new(true));
        let mut config = test_config();
        config.poll.renotify = false;
        let mut engine = engine(sessions, http, vec![notifier.clone()], &config);

        engine.cycle().await;
        engine.cycle().await;

        assert_eq!(notifier.call_count().await, 1);
    }

    #[tokio::test]
    async fn renotify_true_announces_again_each_cycle() {
        let mut sessions = MockSessionProvider::new();
        sessions
            .expect_acquire()
            .returning(|| Box::pin(async { Ok("sid=abc".to_string()) }));

        let mut http = MockHttpClient::new();
        http.expect_get()
            .times(2)
            .returning(|_, _| Box::pin(async { Ok(july_response()) }));

        let notifier = Arc::new(TestNotifier::new(true));
        let config = test_config();
        let mut engine = engine(sessions, http, vec![notifier.clone()], &config);

        engine.cycle().await;
        engine.cycle().await;

        assert_eq!(notifier.call_count().await, 2);
    }

    #[tokio::test]
    async fn notifier_failure_does_not_abort_cycle() {
        let mut sessions = MockSessionProvider::new();
        sessions
            .expect_acquire()
            .returning(|| Box::pin(async { Ok("sid=abc".to_string()) }));

        let mut http = MockHttpClient::new();
        http.expect_get()
            .returning(|_, _| Box::pin(async { Ok(july_response()) }));

        let notifier = Arc::new(TestNotifier::new(false));
        let config = test_config();
        let mut engine = engine(sessions, http, vec![notifier.clone()], &config);

        let wait = engine.cycle().await;
        assert_eq!(wait, Duration::from_secs(300));
        assert_eq!(notifier.call_count().await, 1);
    }

    #[tokio::test]
    async fn empty_report_sends_nothing() {
        let mut sessions = MockSessionProvider::new();
        sessions
            .expect_acquire()
            .returning(|| Box::pin(async { Ok("sid=abc".to_string()) }));

        let mut http = MockHttpClient::new();
        http.expect_get().returning(|_, _| {
            Box::pin(async {
                Ok(HttpResponse {
                    status: 200,
                    body: r#"{"scheduleList":[]}"#.to_string(),
                })
            })
        });

        let notifier = Arc::new(TestNotifier::new(true));
        let config = test_config();
        let mut engine = engine(sessions, http, vec![notifier.clone()], &config);

        engine.cycle().await;
        assert_eq!(notifier.call_count().await, 0);
    }

    /// A test notifier that can succeed or fail and records messages
    #[derive(Debug)]
    struct TestNotifier {
        succeed: bool,
        sent: Arc<tokio::sync::RwLock<Vec<String>>>,
    }

    impl TestNotifier {
        fn new(succeed: bool) -> Self {
            Self {
                succeed,
                sent: Arc::new(tokio::sync::RwLock::new(Vec::new())),
            }
        }

        async fn call_count(&self) -> usize {
            self.sent.read().await.len()
        }

        async fn messages(&self) -> Vec<String> {
            self.sent.read().await.clone()
        }
    }

    #[async_trait::async_trait]
    impl Notifier for TestNotifier {
        fn type_name(&self) -> &str {
            "test"
        }

        async fn notify(&self, notification: &Notification) -> crate::Result<()> {
            self.sent.write().await.push(notification.message.clone());
            if self.succeed {
                Ok(())
            } else {
                Err(crate::SlotwatchError::Notifier("test failure".to_string()))
            }
        }
    }
}
