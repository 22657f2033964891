use crate::{browser::config::{ConnectionOptions, LaunchOptions},
            driver::{Locator, PageDriver, RawTable},
            error::{Result, ScreenerError}};
use headless_chrome::{Browser, Element, Tab};
use std::{ffi::OsStr, sync::Arc, time::Duration};

/// Browser session that manages a Chrome/Chromium instance
pub struct BrowserSession {
    /// The underlying headless_chrome Browser instance
    browser: Browser,
}

impl BrowserSession {
    /// Launch a new browser instance with the given options
    pub fn launch(options: LaunchOptions) -> Result<Self> {
        let mut launch_opts = headless_chrome::LaunchOptions::default();

        // Screener sites serve a stripped page to obvious automation
        launch_opts.ignore_default_args.push(OsStr::new("--enable-automation"));
        launch_opts.args.push(OsStr::new("--disable-blink-features=AutomationControlled"));

        // A full scrape of a large region can outlive the 30 second default
        launch_opts.idle_browser_timeout = Duration::from_secs(60 * 60);

        launch_opts.headless = options.headless;
        launch_opts.window_size = Some((options.window_width, options.window_height));

        if let Some(path) = options.chrome_path {
            launch_opts.path = Some(path);
        }

        if let Some(dir) = options.user_data_dir {
            launch_opts.user_data_dir = Some(dir);
        }

        launch_opts.sandbox = options.sandbox;

        let browser = Browser::new(launch_opts).map_err(|e| ScreenerError::LaunchFailed(e.to_string()))?;

        browser.new_tab().map_err(|e| ScreenerError::LaunchFailed(format!("Failed to create tab: {}", e)))?;

        Ok(Self { browser })
    }

    /// Connect to an existing browser instance via WebSocket
    pub fn connect(options: ConnectionOptions) -> Result<Self> {
        let browser = Browser::connect_with_timeout(options.ws_url, Duration::from_millis(options.idle_timeout_ms))
            .map_err(|e| ScreenerError::ConnectionFailed(e.to_string()))?;

        let has_tab = browser.get_tabs().lock().map(|tabs| !tabs.is_empty()).unwrap_or(false);
        if !has_tab {
            browser
                .new_tab()
                .map_err(|e| ScreenerError::ConnectionFailed(format!("Failed to create tab: {}", e)))?;
        }

        Ok(Self { browser })
    }

    /// Get the active tab
    pub fn tab(&self) -> Result<Arc<Tab>> {
        self.get_active_tab()
    }

    /// Get all tabs
    pub fn get_tabs(&self) -> Result<Vec<Arc<Tab>>> {
        let tabs = self
            .browser
            .get_tabs()
            .lock()
            .map_err(|e| ScreenerError::TabOperationFailed(format!("Failed to get tabs: {}", e)))?
            .clone();

        Ok(tabs)
    }

    /// Get the currently active tab.
    ///
    /// Prefers a visible tab; a headless browser with a single tab may never
    /// report visibility, so the first tab is used as a fallback.
    pub fn get_active_tab(&self) -> Result<Arc<Tab>> {
        let tabs = self.get_tabs()?;

        for tab in &tabs {
            match tab.evaluate("document.visibilityState === 'visible'", false) {
                Ok(remote_object) => {
                    if remote_object.value.and_then(|v| v.as_bool()).unwrap_or(false) {
                        return Ok(tab.clone());
                    }
                }
                Err(e) => {
                    log::debug!("Failed to check tab status: {}", e);
                    continue;
                }
            }
        }

        tabs.first()
            .cloned()
            .ok_or_else(|| ScreenerError::TabOperationFailed("No active tab found".to_string()))
    }

    /// Wait for navigation to complete
    pub fn wait_for_navigation(&self) -> Result<()> {
        self.tab()?
            .wait_until_navigated()
            .map_err(|e| ScreenerError::NavigationFailed(format!("Navigation timeout: {}", e)))?;

        Ok(())
    }

    /// Find an element in the provided tab without waiting
    pub fn find_element<'a>(&self, tab: &'a Arc<Tab>, target: &Locator) -> Result<Element<'a>> {
        let found = match target {
            Locator::Css(selector) => tab.find_element(selector),
            Locator::XPath(expression) => tab.find_element_by_xpath(expression),
        };

        found.map_err(|e| ScreenerError::ElementNotFound {
            step: "lookup".to_string(),
            reason: format!("Element '{}' not found: {}", target, e),
        })
    }
}

/// JavaScript expression resolving `target` to a DOM node (or null)
fn locate_expression(target: &Locator) -> Result<String> {
    let expr = match target {
        Locator::Css(selector) => format!("document.querySelector({})", serde_json::to_string(selector)?),
        Locator::XPath(expression) => format!(
            "document.evaluate({}, document, null, XPathResult.FIRST_ORDERED_NODE_TYPE, null).singleNodeValue",
            serde_json::to_string(expression)?
        ),
    };
    Ok(expr)
}

impl PageDriver for BrowserSession {
    fn navigate(&self, url: &str) -> Result<()> {
        self.tab()?
            .navigate_to(url)
            .map_err(|e| ScreenerError::NavigationFailed(format!("Failed to navigate to {}: {}", url, e)))?;

        self.wait_for_navigation()
    }

    fn current_url(&self) -> Result<String> {
        Ok(self.tab()?.get_url())
    }

    fn wait_for(&self, target: &Locator, timeout: Duration) -> Result<()> {
        let tab = self.tab()?;
        let waited = match target {
            Locator::Css(selector) => tab.wait_for_element_with_custom_timeout(selector, timeout),
            Locator::XPath(expression) => tab.wait_for_xpath_with_custom_timeout(expression, timeout),
        };

        waited.map(|_| ()).map_err(|e| ScreenerError::ElementNotFound {
            step: "wait".to_string(),
            reason: format!("Element '{}' not present after {:?}: {}", target, timeout, e),
        })
    }

    fn click(&self, target: &Locator) -> Result<()> {
        let tab = self.tab()?;
        let element = self.find_element(&tab, target)?;
        element
            .click()
            .map_err(|e| ScreenerError::TabOperationFailed(format!("Failed to click '{}': {}", target, e)))?;
        Ok(())
    }

    fn type_text(&self, target: &Locator, text: &str) -> Result<()> {
        let tab = self.tab()?;
        let element = self.find_element(&tab, target)?;
        element
            .type_into(text)
            .map_err(|e| ScreenerError::TabOperationFailed(format!("Failed to type into '{}': {}", target, e)))?;
        Ok(())
    }

    fn read_text(&self, target: &Locator) -> Result<String> {
        let tab = self.tab()?;
        let element = self.find_element(&tab, target)?;
        element
            .get_inner_text()
            .map_err(|e| ScreenerError::EvaluationFailed(format!("Failed to read text of '{}': {}", target, e)))
    }

    fn read_table(&self, target: &Locator) -> Result<RawTable> {
        let js_code = format!("{}({})", include_str!("read_table.js"), locate_expression(target)?);

        let result = self
            .tab()?
            .evaluate(&js_code, false)
            .map_err(|e| ScreenerError::EvaluationFailed(format!("Failed to execute table script: {}", e)))?;

        // The script returns a JSON string, or null when the table is missing
        let json_str = match result.value {
            Some(serde_json::Value::String(s)) => s,
            _ => {
                return Err(ScreenerError::ElementNotFound {
                    step: "read table".to_string(),
                    reason: format!("No table at '{}'", target),
                });
            }
        };

        serde_json::from_str(&json_str)
            .map_err(|e| ScreenerError::TableParseFailed(format!("Failed to parse table JSON: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_launch_options_builder() {
        let opts = LaunchOptions::new().headless(true).window_size(800, 600);

        assert!(opts.headless);
        assert_eq!(opts.window_width, 800);
        assert_eq!(opts.window_height, 600);
    }

    #[test]
    fn test_connection_options() {
        let opts = ConnectionOptions::new("ws://localhost:9222");
        assert_eq!(opts.idle_timeout_ms, 60 * 60 * 1000);

        let opts = opts.idle_timeout(5000);
        assert_eq!(opts.ws_url, "ws://localhost:9222");
        assert_eq!(opts.idle_timeout_ms, 5000);
    }

    #[test]
    fn test_locate_expression_escapes_selector() {
        let css = locate_expression(&Locator::css("div[data-test=\"x\"]")).unwrap();
        assert_eq!(css, r#"document.querySelector("div[data-test=\"x\"]")"#);

        let xpath = locate_expression(&Locator::xpath("//span[@class='a b']")).unwrap();
        assert!(xpath.starts_with(r#"document.evaluate("//span[@class='a b']""#));
        assert!(xpath.ends_with(".singleNodeValue"));
    }

    // Integration tests (require Chrome to be installed)
    #[test]
    #[ignore] // Ignore by default, run with: cargo test -- --ignored
    fn test_launch_browser() {
        let result = BrowserSession::launch(LaunchOptions::new().headless(true));
        assert!(result.is_ok());
    }

    #[test]
    #[ignore]
    fn test_navigate() {
        let session = BrowserSession::launch(LaunchOptions::new().headless(true)).expect("Failed to launch browser");

        let result = session.navigate("about:blank");
        assert!(result.is_ok());
    }
}
