//! The DOM capability surface the chat protocol runs against.
//!
//! `ChatSurface` is the narrow interface the provider state machines need:
//! navigate, locate, click, type, attach files, read the clipboard. The
//! production implementation (`CdpSurface`) drives a chromiumoxide `Page`;
//! tests script a fake so the protocol can be exercised without a browser
//! and without touching the OS clipboard.

use crate::error::{AiUiError, Result};
use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::dom::SetFileInputFilesParams;
use chromiumoxide::cdp::browser_protocol::input::{
    DispatchKeyEventParams, DispatchKeyEventType, InsertTextParams,
};
use chromiumoxide::page::Page;
use std::path::Path;
use std::time::Duration;

/// Delay for the page to settle after navigation or submission. CDP has no
/// network-idle event, so this stands in for the driver-level idle wait.
const SETTLE_DELAY: Duration = Duration::from_secs(2);

/// How long to poll for `document.readyState === "complete"`.
const READY_TIMEOUT: Duration = Duration::from_secs(30);

#[async_trait]
pub trait ChatSurface: Send + Sync {
    async fn goto(&self, url: &str) -> Result<()>;
    async fn reload(&self) -> Result<()>;
    async fn current_url(&self) -> Result<String>;

    /// Wait for the page to finish loading and settle.
    async fn wait_for_idle(&self) -> Result<()>;

    /// Number of elements matching a CSS selector.
    async fn count(&self, selector: &str) -> Result<usize>;

    /// Number of elements whose own text contains `text`.
    async fn count_text(&self, text: &str) -> Result<usize>;

    /// Click the first element matching a CSS selector.
    async fn click(&self, selector: &str) -> Result<()>;

    /// Click the first element whose own text contains `text`.
    async fn click_text(&self, text: &str) -> Result<()>;

    /// Click `inner` inside the last element matching `container`.
    async fn click_within_last(&self, container: &str, inner: &str) -> Result<()>;

    /// Visible text of the last element matching the selector.
    async fn inner_text_last(&self, selector: &str) -> Result<String>;

    /// Attribute of `inner` inside the last element matching `container`.
    async fn attr_within_last(
        &self,
        container: &str,
        inner: &str,
        attr: &str,
    ) -> Result<Option<String>>;

    /// Replace the content of the element matching the selector.
    async fn fill(&self, selector: &str, text: &str) -> Result<()>;

    /// Type into whatever currently has focus, preserving formatting.
    async fn type_text(&self, text: &str) -> Result<()>;

    /// Press a key combo such as `Control+Shift+C`.
    async fn press_key(&self, combo: &str) -> Result<()>;

    /// Set a file input's files.
    async fn set_input_files(&self, selector: &str, path: &Path) -> Result<()>;

    /// `value` property of the first element matching the selector.
    async fn input_value(&self, selector: &str) -> Result<String>;

    /// Visible text of the whole page body.
    async fn body_text(&self) -> Result<String>;

    async fn clipboard_read(&self) -> Result<String>;
    async fn clipboard_write(&self, text: &str) -> Result<()>;
}

/// `ChatSurface` implementation over a live chromiumoxide page.
pub struct CdpSurface {
    page: Page,
}

impl CdpSurface {
    pub fn new(page: Page) -> Self {
        Self { page }
    }

    pub fn page(&self) -> &Page {
        &self.page
    }

    async fn evaluate<T: serde::de::DeserializeOwned>(&self, script: String) -> Result<T> {
        let result = self
            .page
            .evaluate(script)
            .await
            .map_err(|e| AiUiError::Other(format!("script evaluation failed: {}", e)))?;
        result
            .into_value()
            .map_err(|e| AiUiError::Other(format!("failed to deserialize script result: {}", e)))
    }

    fn dispatch_key(
        &self,
        kind: DispatchKeyEventType,
        key: &str,
        modifiers: i64,
    ) -> Result<DispatchKeyEventParams> {
        let mut builder = DispatchKeyEventParams::builder()
            .r#type(kind)
            .key(key.to_string())
            .modifiers(modifiers);
        if let Some(code) = key_code(key) {
            builder = builder.code(code.to_string());
        }
        builder
            .build()
            .map_err(|e| AiUiError::Other(format!("invalid key event: {}", e)))
    }
}

/// Physical code for the keys the shortcut tables use.
fn key_code(key: &str) -> Option<&'static str> {
    match key {
        "Enter" => Some("Enter"),
        "Escape" => Some("Escape"),
        ";" => Some("Semicolon"),
        "C" | "c" => Some("KeyC"),
        "A" | "a" => Some("KeyA"),
        _ => None,
    }
}

/// Split `Meta+Shift+C` into CDP modifier bits and the final key.
fn parse_combo(combo: &str) -> (i64, &str) {
    let parts: Vec<&str> = combo.split('+').collect();
    if parts.len() < 2 {
        return (0, combo);
    }
    let mut modifiers = 0i64;
    for part in &parts[..parts.len() - 1] {
        match part.to_ascii_lowercase().as_str() {
            "alt" | "option" => modifiers |= 1,
            "control" | "ctrl" => modifiers |= 2,
            "meta" | "cmd" | "command" => modifiers |= 4,
            "shift" => modifiers |= 8,
            _ => {}
        }
    }
    (modifiers, parts[parts.len() - 1])
}

#[async_trait]
impl ChatSurface for CdpSurface {
    async fn goto(&self, url: &str) -> Result<()> {
        self.page
            .goto(url)
            .await
            .map_err(|e| AiUiError::NavigationFailed(format!("{}: {}", url, e)))?;
        let _ = self.page.wait_for_navigation().await;
        Ok(())
    }

    async fn reload(&self) -> Result<()> {
        self.page
            .reload()
            .await
            .map_err(|e| AiUiError::NavigationFailed(format!("reload: {}", e)))?;
        let _ = self.page.wait_for_navigation().await;
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        self.page
            .url()
            .await
            .map_err(|e| AiUiError::Other(e.to_string()))?
            .ok_or_else(|| AiUiError::Other("page has no URL".to_string()))
    }

    async fn wait_for_idle(&self) -> Result<()> {
        let deadline = tokio::time::Instant::now() + READY_TIMEOUT;
        loop {
            let ready: String = self
                .evaluate("document.readyState".to_string())
                .await
                .unwrap_or_default();
            if ready == "complete" || tokio::time::Instant::now() >= deadline {
                break;
            }
            tokio::time::sleep(Duration::from_millis(250)).await;
        }
        tokio::time::sleep(SETTLE_DELAY).await;
        Ok(())
    }

    async fn count(&self, selector: &str) -> Result<usize> {
        Ok(self
            .page
            .find_elements(selector)
            .await
            .map(|els| els.len())
            .unwrap_or(0))
    }

    async fn count_text(&self, text: &str) -> Result<usize> {
        let needle = serde_json::to_string(text).map_err(|e| AiUiError::Other(e.to_string()))?;
        let script = format!(
            r#"(() => {{
                const needle = {needle};
                let count = 0;
                for (const el of document.querySelectorAll('*')) {{
                    let own = '';
                    for (const node of el.childNodes) {{
                        if (node.nodeType === Node.TEXT_NODE) own += node.textContent;
                    }}
                    if (own.includes(needle)) count++;
                }}
                return count;
            }})()"#
        );
        self.evaluate(script).await
    }

    async fn click(&self, selector: &str) -> Result<()> {
        let element = self
            .page
            .find_element(selector)
            .await
            .map_err(|_| AiUiError::ElementNotFound(selector.to_string()))?;
        element
            .click()
            .await
            .map_err(|e| AiUiError::Other(format!("click {}: {}", selector, e)))?;
        Ok(())
    }

    async fn click_text(&self, text: &str) -> Result<()> {
        let needle = serde_json::to_string(text).map_err(|e| AiUiError::Other(e.to_string()))?;
        let script = format!(
            r#"(() => {{
                const needle = {needle};
                for (const el of document.querySelectorAll('*')) {{
                    let own = '';
                    for (const node of el.childNodes) {{
                        if (node.nodeType === Node.TEXT_NODE) own += node.textContent;
                    }}
                    if (own.includes(needle)) {{ el.click(); return true; }}
                }}
                return false;
            }})()"#
        );
        let clicked: bool = self.evaluate(script).await?;
        if clicked {
            Ok(())
        } else {
            Err(AiUiError::ElementNotFound(format!("text={}", text)))
        }
    }

    async fn click_within_last(&self, container: &str, inner: &str) -> Result<()> {
        let container_json =
            serde_json::to_string(container).map_err(|e| AiUiError::Other(e.to_string()))?;
        let inner_json =
            serde_json::to_string(inner).map_err(|e| AiUiError::Other(e.to_string()))?;
        let script = format!(
            r#"(() => {{
                const containers = document.querySelectorAll({container_json});
                if (!containers.length) return false;
                const target = containers[containers.length - 1].querySelector({inner_json});
                if (!target) return false;
                target.click();
                return true;
            }})()"#
        );
        let clicked: bool = self.evaluate(script).await?;
        if clicked {
            Ok(())
        } else {
            Err(AiUiError::ElementNotFound(format!(
                "{} within last {}",
                inner, container
            )))
        }
    }

    async fn inner_text_last(&self, selector: &str) -> Result<String> {
        let selector_json =
            serde_json::to_string(selector).map_err(|e| AiUiError::Other(e.to_string()))?;
        let script = format!(
            r#"(() => {{
                const els = document.querySelectorAll({selector_json});
                if (!els.length) return null;
                return els[els.length - 1].innerText;
            }})()"#
        );
        let text: Option<String> = self.evaluate(script).await?;
        text.ok_or_else(|| AiUiError::ElementNotFound(selector.to_string()))
    }

    async fn attr_within_last(
        &self,
        container: &str,
        inner: &str,
        attr: &str,
    ) -> Result<Option<String>> {
        let container_json =
            serde_json::to_string(container).map_err(|e| AiUiError::Other(e.to_string()))?;
        let inner_json =
            serde_json::to_string(inner).map_err(|e| AiUiError::Other(e.to_string()))?;
        let attr_json = serde_json::to_string(attr).map_err(|e| AiUiError::Other(e.to_string()))?;
        let script = format!(
            r#"(() => {{
                const containers = document.querySelectorAll({container_json});
                if (!containers.length) return null;
                const target = containers[containers.length - 1].querySelector({inner_json});
                if (!target) return null;
                return target.getAttribute({attr_json});
            }})()"#
        );
        self.evaluate(script).await
    }

    async fn fill(&self, selector: &str, text: &str) -> Result<()> {
        let element = self
            .page
            .find_element(selector)
            .await
            .map_err(|_| AiUiError::ElementNotFound(selector.to_string()))?;
        element
            .click()
            .await
            .map_err(|e| AiUiError::Other(format!("focus {}: {}", selector, e)))?;
        element
            .focus()
            .await
            .map_err(|e| AiUiError::Other(format!("focus {}: {}", selector, e)))?;
        // Replace rather than append: select everything, then let the
        // inserted text overwrite the selection.
        let _: bool = self
            .evaluate("document.execCommand('selectAll', false, null)".to_string())
            .await
            .unwrap_or(false);
        self.type_text(text).await
    }

    async fn type_text(&self, text: &str) -> Result<()> {
        self.page
            .execute(InsertTextParams::new(text.to_string()))
            .await
            .map_err(|e| AiUiError::Other(format!("insert text: {}", e)))?;
        Ok(())
    }

    async fn press_key(&self, combo: &str) -> Result<()> {
        let (modifiers, key) = parse_combo(combo);
        let down = self.dispatch_key(DispatchKeyEventType::KeyDown, key, modifiers)?;
        self.page
            .execute(down)
            .await
            .map_err(|e| AiUiError::Other(format!("key down {}: {}", combo, e)))?;
        let up = self.dispatch_key(DispatchKeyEventType::KeyUp, key, modifiers)?;
        self.page
            .execute(up)
            .await
            .map_err(|e| AiUiError::Other(format!("key up {}: {}", combo, e)))?;
        Ok(())
    }

    async fn set_input_files(&self, selector: &str, path: &Path) -> Result<()> {
        let element = self
            .page
            .find_element(selector)
            .await
            .map_err(|_| AiUiError::ElementNotFound(selector.to_string()))?;
        let absolute = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        let mut params = SetFileInputFilesParams::new(vec![absolute.to_string_lossy().into_owned()]);
        params.backend_node_id = Some(element.backend_node_id.clone());
        self.page
            .execute(params)
            .await
            .map_err(|e| AiUiError::Other(format!("set input files {}: {}", selector, e)))?;
        Ok(())
    }

    async fn input_value(&self, selector: &str) -> Result<String> {
        let selector_json =
            serde_json::to_string(selector).map_err(|e| AiUiError::Other(e.to_string()))?;
        let script = format!(
            r#"(() => {{
                const el = document.querySelector({selector_json});
                if (!el) return null;
                return el.value ?? '';
            }})()"#
        );
        let value: Option<String> = self.evaluate(script).await?;
        value.ok_or_else(|| AiUiError::ElementNotFound(selector.to_string()))
    }

    async fn body_text(&self) -> Result<String> {
        let text = self
            .page
            .find_element("body")
            .await
            .map_err(|_| AiUiError::ElementNotFound("body".to_string()))?
            .inner_text()
            .await
            .map_err(|_| AiUiError::ElementNotFound("body".to_string()))?
            .unwrap_or_default();
        Ok(text)
    }

    async fn clipboard_read(&self) -> Result<String> {
        let script = r#"(async () => {
            try {
                return await navigator.clipboard.readText();
            } catch (e) {
                return '';
            }
        })()"#;
        self.evaluate(script.to_string()).await
    }

    async fn clipboard_write(&self, text: &str) -> Result<()> {
        let payload = serde_json::to_string(text).map_err(|e| AiUiError::Other(e.to_string()))?;
        let script = format!(
            r#"(async () => {{
                try {{
                    await navigator.clipboard.writeText({payload});
                    return true;
                }} catch (e) {{
                    return false;
                }}
            }})()"#
        );
        let _: bool = self.evaluate(script).await?;
        Ok(())
    }
}
