//! Browser driver seam
//!
//! Page objects talk to the browser through [`Driver`]; this crate ships no
//! browser backend. [`DriverHelper`] layers the usual visibility waits on
//! top of the poll-wait engine.

use std::fmt;

use async_trait::async_trait;
use tracing::debug;

use dashprobe_common::{poll_until, PollPolicy};

use crate::error::{E2eError, E2eResult};

/// How to find an element
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    Css(String),
    XPath(String),
}

impl Locator {
    pub fn css(selector: impl Into<String>) -> Self {
        Locator::Css(selector.into())
    }

    pub fn xpath(expression: impl Into<String>) -> Self {
        Locator::XPath(expression.into())
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Css(selector) => write!(f, "css={selector}"),
            Locator::XPath(expression) => write!(f, "xpath={expression}"),
        }
    }
}

/// Element-level browser operations
///
/// Implementations report a detached element as `E2eError::StaleElement`;
/// waits treat that as "not yet".
#[async_trait]
pub trait Driver: Send + Sync {
    /// Element is attached and rendered
    async fn is_displayed(&self, locator: &Locator) -> E2eResult<bool>;

    /// Element is attached to the DOM
    async fn is_present(&self, locator: &Locator) -> E2eResult<bool>;

    async fn click(&self, locator: &Locator) -> E2eResult<()>;
}

/// Polling waits over a [`Driver`]
pub struct DriverHelper<D> {
    driver: D,
    policy: PollPolicy,
}

impl<D: Driver> DriverHelper<D> {
    pub fn new(driver: D, policy: PollPolicy) -> Self {
        Self { driver, policy }
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Wait with the helper's default policy
    pub async fn wait_visibility(&self, locator: &Locator) -> E2eResult<()> {
        self.wait_visibility_with(locator, &self.policy).await
    }

    pub async fn wait_visibility_with(&self, locator: &Locator, policy: &PollPolicy) -> E2eResult<()> {
        debug!("Waiting for {} to be visible", locator);
        self.wait_until(locator, policy, "visibility", |driver, locator| async move {
            driver.is_displayed(locator).await
        })
        .await
    }

    pub async fn wait_disappearance(&self, locator: &Locator) -> E2eResult<()> {
        self.wait_disappearance_with(locator, &self.policy).await
    }

    pub async fn wait_disappearance_with(&self, locator: &Locator, policy: &PollPolicy) -> E2eResult<()> {
        debug!("Waiting for {} to disappear", locator);
        self.wait_until(locator, policy, "disappearance", |driver, locator| async move {
            driver.is_present(locator).await.map(|present| !present)
        })
        .await
    }

    /// Wait for visibility, then click; a click on a detached element is retried
    pub async fn wait_and_click(&self, locator: &Locator) -> E2eResult<()> {
        debug!("Clicking {}", locator);
        self.wait_until(locator, &self.policy, "click", |driver, locator| async move {
            match driver.is_displayed(locator).await {
                Ok(true) => driver.click(locator).await.map(|()| true),
                other => other,
            }
        })
        .await
    }

    async fn wait_until<'a, F, Fut>(
        &'a self,
        locator: &'a Locator,
        policy: &PollPolicy,
        what: &str,
        check: F,
    ) -> E2eResult<()>
    where
        F: Fn(&'a D, &'a Locator) -> Fut,
        Fut: std::future::Future<Output = E2eResult<bool>> + 'a,
    {
        let outcome = poll_until(policy, || {
            let pending = check(&self.driver, locator);
            async move {
                match pending.await {
                    Ok(true) => Ok(Some(())),
                    Ok(false) => Ok(None),
                    Err(E2eError::StaleElement(reason)) => {
                        debug!("Stale element {} ({}), retrying", locator, reason);
                        Ok(None)
                    }
                    Err(e) => Err(e),
                }
            }
        })
        .await;

        outcome.into_result(
            |attempts, _| E2eError::ElementTimeout(format!("{what} of {locator} after {attempts} attempt(s)")),
            |attempts, elapsed| {
                E2eError::ElementTimeout(format!("{what} of {locator} after {attempts} attempt(s) in {elapsed:?}"))
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::time::Duration;

    /// Replays one scripted answer per call
    struct ScriptedDriver {
        answers: Mutex<VecDeque<E2eResult<bool>>>,
        clicks: Mutex<u32>,
    }

    impl ScriptedDriver {
        fn new(answers: Vec<E2eResult<bool>>) -> Self {
            Self {
                answers: Mutex::new(answers.into()),
                clicks: Mutex::new(0),
            }
        }

        fn next(&self) -> E2eResult<bool> {
            self.answers.lock().pop_front().unwrap_or(Ok(false))
        }
    }

    #[async_trait]
    impl Driver for ScriptedDriver {
        async fn is_displayed(&self, _locator: &Locator) -> E2eResult<bool> {
            self.next()
        }

        async fn is_present(&self, _locator: &Locator) -> E2eResult<bool> {
            self.next()
        }

        async fn click(&self, _locator: &Locator) -> E2eResult<()> {
            *self.clicks.lock() += 1;
            Ok(())
        }
    }

    fn helper(answers: Vec<E2eResult<bool>>) -> DriverHelper<ScriptedDriver> {
        DriverHelper::new(
            ScriptedDriver::new(answers),
            PollPolicy::new(3, Duration::from_millis(500)).unwrap(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_visibility_after_stale_element() {
        let helper = helper(vec![
            Err(E2eError::StaleElement("node detached".to_string())),
            Ok(true),
        ]);
        helper
            .wait_visibility(&Locator::css("#run-workspace-button"))
            .await
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_disappearance_times_out() {
        let helper = helper(vec![Ok(true), Ok(true), Ok(true)]);
        let err = helper
            .wait_disappearance(&Locator::css("md-progress-linear"))
            .await
            .unwrap_err();
        assert!(err.is_timeout());
        assert!(err.to_string().contains("md-progress-linear"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_driver_failure_is_not_retried() {
        let helper = helper(vec![Err(E2eError::Driver("session deleted".to_string())), Ok(true)]);
        let err = helper
            .wait_visibility(&Locator::xpath("//a[text()='Open']"))
            .await
            .unwrap_err();
        assert!(matches!(err, E2eError::Driver(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_click_waits_for_visibility() {
        let helper = helper(vec![Ok(false), Ok(true)]);
        helper
            .wait_and_click(&Locator::css("button[name=save-button]"))
            .await
            .unwrap();
        assert_eq!(*helper.driver().clicks.lock(), 1);
    }
}
