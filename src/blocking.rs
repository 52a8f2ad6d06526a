//! Blocking facade over the async orchestrator.
//!
//! Owns a tokio runtime and exposes the same operations with identical
//! semantics, for callers without an async context. Each `blocking::AiOnUi`
//! blocks only its own thread; independent instances on separate threads
//! run concurrently.

use crate::error::Result;
use crate::models::{AiModel, ExpectedResult};
use std::path::Path;

pub struct AiOnUi {
    runtime: tokio::runtime::Runtime,
    inner: crate::aionui::AiOnUi,
}

impl AiOnUi {
    pub fn new(model_type: AiModel, config_path: Option<&Path>) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?;
        let inner = crate::aionui::AiOnUi::new(model_type, config_path)?;
        Ok(Self { runtime, inner })
    }

    pub fn open(&mut self) -> Result<()> {
        self.runtime.block_on(self.inner.open())
    }

    pub fn close(&mut self) {
        self.runtime.block_on(self.inner.close())
    }

    pub fn chat(&mut self, message: &str, expected: ExpectedResult) -> Result<String> {
        self.runtime.block_on(self.inner.chat(message, expected))
    }

    pub fn attach_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        self.runtime.block_on(self.inner.attach_file(path))
    }

    pub fn text_as_file(&mut self, content: &str, file_name: &str) -> Result<()> {
        self.runtime
            .block_on(self.inner.text_as_file(content, file_name))
    }

    pub fn load_config(&mut self, path: impl AsRef<Path>) -> Result<()> {
        self.inner.load_config(path)
    }

    pub fn set_recovery_policy(&mut self, policy: crate::aionui::RecoveryPolicy) {
        self.inner.set_recovery_policy(policy);
    }
}

impl Drop for AiOnUi {
    fn drop(&mut self) {
        if self.inner.is_open() {
            self.close();
        }
    }
}
