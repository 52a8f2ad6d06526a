//! Browser session lifecycle.
//!
//! A `BrowserSession` owns (or borrows) the Chrome handles behind one chat
//! session: the browser connection, the page, and the CDP event handler
//! task. It supports two entry paths, attaching to an already-running
//! debuggable Chrome (launching one when the attach fails) and launching a
//! persistent profile directly, and guarantees best-effort teardown in
//! page → browser → handler order. `close()` followed by `open()` is the
//! restart mechanism bot-detection recovery relies on.

use crate::config::Config;
use crate::error::{AiUiError, Result};
use crate::surface::{CdpSurface, ChatSurface};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::browser::{GrantPermissionsParams, PermissionType};
use chromiumoxide::cdp::browser_protocol::target::CloseTargetParams;
use chromiumoxide::page::Page;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Delay for a freshly spawned Chrome to expose its debug port.
const LAUNCH_SETTLE: Duration = Duration::from_secs(3);

/// Whether a resource is ours to close or merely on loan from the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    Owned,
    External,
}

/// Seam between the orchestrator and the browser: production uses
/// `BrowserSession`, tests substitute a scripted backend.
#[async_trait]
pub trait SessionBackend: Send {
    /// Open the session and hand back the DOM surface bound to its page.
    async fn open(&mut self, config: &Config) -> Result<Arc<dyn ChatSurface>>;

    /// Tear the session down. Close-time errors are logged, never raised.
    async fn close(&mut self);
}

pub struct BrowserSession {
    browser: Option<Browser>,
    browser_ownership: Ownership,
    page: Option<Page>,
    handler: Option<JoinHandle<()>>,
}

impl Default for BrowserSession {
    fn default() -> Self {
        Self::new()
    }
}

impl BrowserSession {
    pub fn new() -> Self {
        Self {
            browser: None,
            browser_ownership: Ownership::Owned,
            page: None,
            handler: None,
        }
    }

    /// Wrap a caller-supplied browser. The session will create and close its
    /// own page in it, but will never close the browser itself.
    pub fn attached(browser: Browser) -> Self {
        Self {
            browser: Some(browser),
            browser_ownership: Ownership::External,
            page: None,
            handler: None,
        }
    }

    /// Open the session and return its page.
    ///
    /// With `connect_over_cdp` set, attaches to the browser listening on
    /// `localhost:debug_port`; when that attach fails, spawns the native
    /// Chrome binary with remote debugging enabled, waits for it to settle
    /// and retries the attach exactly once. Without the flag, launches a
    /// persistent context from the configured profile directory.
    pub async fn open(&mut self, config: &Config) -> Result<Page> {
        if self.browser.is_none() {
            let browser = if config.connect_over_cdp {
                self.connect_or_launch(config).await?
            } else {
                self.launch_persistent(config).await?
            };
            self.browser = Some(browser);
        }

        let Some(browser) = self.browser.as_ref() else {
            return Err(AiUiError::ConnectionFailed("no browser handle".to_string()));
        };
        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| AiUiError::Other(format!("failed to create page: {}", e)))?;

        // Code-block extraction reads the clipboard from page context.
        let grant = GrantPermissionsParams {
            permissions: vec![
                PermissionType::ClipboardReadWrite,
                PermissionType::ClipboardSanitizedWrite,
            ],
            origin: None,
            browser_context_id: None,
        };
        if let Err(e) = page.execute(grant).await {
            log::warn!("could not grant clipboard permissions: {}", e);
        }

        self.page = Some(page.clone());
        Ok(page)
    }

    async fn connect_or_launch(&mut self, config: &Config) -> Result<Browser> {
        let url = format!("http://localhost:{}", config.debug_port);
        match Browser::connect(&url).await {
            Ok((browser, handler)) => {
                self.spawn_handler(handler);
                Ok(browser)
            }
            Err(first_err) => {
                log::info!(
                    "no debuggable Chrome on port {}, launching one: {}",
                    config.debug_port,
                    first_err
                );
                spawn_chrome(config)?;
                tokio::time::sleep(LAUNCH_SETTLE).await;
                let (browser, handler) = Browser::connect(&url).await.map_err(|e| {
                    AiUiError::ConnectionFailed(format!(
                        "Failed to connect to Chrome on port {} after launching it. \
                         Make sure Chrome is running with --remote-debugging-port={}: {}",
                        config.debug_port, config.debug_port, e
                    ))
                })?;
                self.spawn_handler(handler);
                Ok(browser)
            }
        }
    }

    async fn launch_persistent(&mut self, config: &Config) -> Result<Browser> {
        let mut builder = if config.headless {
            BrowserConfig::builder()
        } else {
            BrowserConfig::builder().with_head()
        };
        if let Some(dir) = &config.user_data_dir {
            builder = builder.user_data_dir(dir);
        }
        if let Some(path) = &config.chrome_binary_path {
            builder = builder.chrome_executable(path);
        }
        let browser_config = builder
            .build()
            .map_err(|e| AiUiError::LaunchFailed(e.to_string()))?;

        let (browser, handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| AiUiError::LaunchFailed(e.to_string()))?;
        self.spawn_handler(handler);
        Ok(browser)
    }

    fn spawn_handler(
        &mut self,
        mut handler: chromiumoxide::handler::Handler,
    ) {
        self.handler = Some(tokio::spawn(async move {
            while (handler.next().await).is_some() {
                // Drive browser events until the connection drops.
            }
        }));
    }

    /// Close page, then browser, then the handler task. Each step is guarded
    /// independently and close-time errors are logged rather than raised, so
    /// teardown never masks the error that triggered it. Externally supplied
    /// resources are released, not closed.
    pub async fn close(&mut self) {
        if let Some(page) = self.page.take() {
            let close = CloseTargetParams::new(page.target_id().clone());
            if let Err(e) = page.execute(close).await {
                log::warn!("error closing page: {}", e);
            }
        }

        if let Some(mut browser) = self.browser.take() {
            match self.browser_ownership {
                Ownership::Owned => {
                    if let Err(e) = browser.close().await {
                        log::warn!("error closing browser: {}", e);
                    }
                    if let Err(e) = browser.wait().await {
                        log::warn!("error waiting for browser shutdown: {}", e);
                    }
                }
                Ownership::External => {
                    log::debug!("releasing externally owned browser without closing it");
                    // Keep the borrowed handle for a later reopen.
                    self.browser = Some(browser);
                }
            }
        }

        if self.browser.is_none() {
            if let Some(handler) = self.handler.take() {
                handler.abort();
            }
        }
    }

    pub fn page(&self) -> Option<&Page> {
        self.page.as_ref()
    }

    pub fn browser_ownership(&self) -> Ownership {
        self.browser_ownership
    }

    pub fn is_open(&self) -> bool {
        self.page.is_some()
    }
}

#[async_trait]
impl SessionBackend for BrowserSession {
    async fn open(&mut self, config: &Config) -> Result<Arc<dyn ChatSurface>> {
        let page = BrowserSession::open(self, config).await?;
        Ok(Arc::new(CdpSurface::new(page)))
    }

    async fn close(&mut self) {
        BrowserSession::close(self).await;
    }
}

/// Spawn the native Chrome binary with remote debugging enabled. The process
/// is left running; the session reattaches to it over CDP.
fn spawn_chrome(config: &Config) -> Result<()> {
    let binary = config.resolve_chrome_binary()?;
    let mut command = std::process::Command::new(&binary);
    command.arg(format!("--remote-debugging-port={}", config.debug_port));
    if let Some(dir) = &config.user_data_dir {
        command.arg(format!("--user-data-dir={}", dir.display()));
    }
    if config.headless {
        command.arg("--headless=new");
    }
    command
        .spawn()
        .map_err(|e| AiUiError::LaunchFailed(format!("{}: {}", binary.display(), e)))?;
    log::info!(
        "launched {} with --remote-debugging-port={}",
        binary.display(),
        config.debug_port
    );
    Ok(())
}
