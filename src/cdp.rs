//! Chrome DevTools Protocol adapter implementation
//!
//! `headless_chrome` is synchronous, so every call is moved onto the blocking
//! thread pool and awaited from the caller's task.

use std::ffi::OsStr;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use headless_chrome::browser::tab::Tab;
use headless_chrome::protocol::cdp::Browser as BrowserDomain;
use headless_chrome::protocol::cdp::{Page, Target};
use headless_chrome::types::PrintToPdfOptions;
use headless_chrome::{Browser, LaunchOptions};
use log::{debug, warn};

use crate::{Engine, EngineConfig, EngineLauncher, Error, PageSize, RenderContext, Result};

/// Resolves once the current document has fired `load`.
const WAIT_FOR_LOAD: &str = r#"new Promise(function(resolve){
    if (document.readyState === 'complete') { resolve(true); return; }
    window.addEventListener('load', function(){ resolve(true); }, { once: true });
})"#;

async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::CdpError(format!("Worker task failed: {}", e)))?
}

/// Launches headless Chrome with the fixed container-friendly flags
#[derive(Debug, Clone, Default)]
pub struct ChromeLauncher {
    config: EngineConfig,
}

impl ChromeLauncher {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl EngineLauncher for ChromeLauncher {
    type Engine = ChromeEngine;

    async fn launch(&self) -> Result<ChromeEngine> {
        let config = self.config.clone();
        blocking(move || {
            let args: Vec<&OsStr> = EngineConfig::launch_args()
                .iter()
                .map(OsStr::new)
                .collect();

            let launch_options = LaunchOptions::default_builder()
                .headless(true)
                .sandbox(false)
                .path(config.chrome_path.clone())
                .idle_browser_timeout(config.idle_timeout)
                .args(args)
                .build()
                .map_err(|e| Error::EngineStart(format!("Failed to build launch options: {}", e)))?;

            let browser = Browser::new(launch_options)
                .map_err(|e| Error::EngineStart(format!("Failed to launch browser: {}", e)))?;

            debug!("Chrome launched (pid {:?})", browser.get_process_id());
            Ok(ChromeEngine {
                browser: Mutex::new(Some(browser)),
            })
        })
        .await
    }
}

/// A running headless Chrome process
pub struct ChromeEngine {
    browser: Mutex<Option<Browser>>,
}

impl ChromeEngine {
    fn browser(&self) -> Result<Browser> {
        self.browser
            .lock()
            .map_err(|_| Error::CdpError("Browser handle poisoned".into()))?
            .clone()
            .ok_or_else(|| Error::CdpError("Browser has been closed".into()))
    }
}

#[async_trait]
impl Engine for ChromeEngine {
    type Context = ChromeContext;

    async fn new_context(&self) -> Result<ChromeContext> {
        let browser = self.browser()?;
        blocking(move || {
            let context = browser
                .new_context()
                .map_err(|e| Error::RenderError(format!("Failed to create context: {}", e)))?;
            let context_id = context.get_id().to_string();

            let tab = match context.new_tab() {
                Ok(tab) => tab,
                Err(e) => {
                    if let Err(dispose_err) = dispose_context(&browser, &context_id) {
                        warn!("Failed to dispose half-built context: {}", dispose_err);
                    }
                    return Err(Error::RenderError(format!("Failed to create tab: {}", e)));
                }
            };

            debug!("Opened browser context {}", context_id);
            Ok(ChromeContext {
                browser,
                context_id,
                tab,
            })
        })
        .await
    }

    async fn ping(&self) -> Result<()> {
        let browser = self.browser()?;
        blocking(move || {
            browser.get_version()?;
            Ok(())
        })
        .await
    }

    async fn close(&self) -> Result<()> {
        let browser = self
            .browser
            .lock()
            .map_err(|_| Error::Cleanup("Browser handle poisoned".into()))?
            .take();

        let Some(browser) = browser else {
            return Ok(());
        };

        blocking(move || {
            // Browser.close ends the process even while contexts still hold
            // clones of the handle; dropping the last clone reaps it.
            let res = browser
                .call_method(BrowserDomain::Close(None))
                .map(|_| ())
                .map_err(|e| Error::Cleanup(format!("Browser.close failed: {}", e)));
            drop(browser);
            res
        })
        .await
    }
}

fn dispose_context(browser: &Browser, context_id: &str) -> Result<()> {
    browser
        .call_method(Target::DisposeBrowserContext {
            browser_context_id: context_id.to_string(),
        })
        .map_err(|e| Error::Cleanup(format!("Failed to dispose context {}: {}", context_id, e)))?;
    Ok(())
}

/// An isolated browser context holding one tab
pub struct ChromeContext {
    browser: Browser,
    context_id: String,
    tab: Arc<Tab>,
}

#[async_trait]
impl RenderContext for ChromeContext {
    async fn set_content(&mut self, html: &str) -> Result<()> {
        let tab = self.tab.clone();
        let html = html.to_string();
        blocking(move || {
            // The main frame of a page target shares the target's id.
            let frame_id = tab.get_target_id().to_string();
            tab.call_method(Page::SetDocumentContent { frame_id, html })
                .map_err(|e| Error::RenderError(format!("Failed to set content: {}", e)))?;
            tab.evaluate(WAIT_FOR_LOAD, true)
                .map_err(|e| Error::RenderError(format!("Wait for load failed: {}", e)))?;
            Ok(())
        })
        .await
    }

    async fn print_pdf(&mut self, size: PageSize) -> Result<Vec<u8>> {
        let tab = self.tab.clone();
        blocking(move || {
            let options = PrintToPdfOptions {
                paper_width: Some(size.width_in()),
                paper_height: Some(size.height_in()),
                margin_top: Some(0.0),
                margin_bottom: Some(0.0),
                margin_left: Some(0.0),
                margin_right: Some(0.0),
                print_background: Some(true),
                prefer_css_page_size: Some(false),
                ..Default::default()
            };
            tab.print_to_pdf(Some(options))
                .map_err(|e| Error::RenderError(format!("Print to PDF failed: {}", e)))
        })
        .await
    }

    async fn close(self) -> Result<()> {
        let ChromeContext {
            browser,
            context_id,
            tab,
        } = self;
        blocking(move || {
            let closed = tab
                .close(false)
                .map(|_| ())
                .map_err(|e| Error::Cleanup(format!("Failed to close tab: {}", e)));
            let disposed = dispose_context(&browser, &context_id);
            debug!("Closed browser context {}", context_id);
            closed.and(disposed)
        })
        .await
    }
}
