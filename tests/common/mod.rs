//! Fake engine used by the integration tests.
//!
//! Behaviour is driven by markers embedded in the HTML:
//! - `<!--hang-->`: loading never completes
//! - `<!--fail-->`: loading fails
//! - `<!--cleanup-fail-->`: closing the context fails

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rfrender::{Engine, EngineLauncher, Error, PageSize, RenderContext, Result};

pub const HANG: &str = "<!--hang-->";
pub const FAIL: &str = "<!--fail-->";
pub const CLEANUP_FAIL: &str = "<!--cleanup-fail-->";

/// Counters shared between the launcher, its engines and the test body
#[derive(Default)]
pub struct Counters {
    pub launches: AtomicUsize,
    pub contexts_opened: AtomicUsize,
    pub contexts_closed: AtomicUsize,
    pub engine_closes: AtomicUsize,
    /// When set, engine pings never answer
    pub ping_hangs: AtomicBool,
}

impl Counters {
    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn opened(&self) -> usize {
        self.contexts_opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.contexts_closed.load(Ordering::SeqCst)
    }

    /// Contexts opened but not yet closed
    pub fn open_contexts(&self) -> usize {
        self.opened() - self.closed()
    }

    pub fn engine_closes(&self) -> usize {
        self.engine_closes.load(Ordering::SeqCst)
    }

    pub fn wedge_engine(&self) {
        self.ping_hangs.store(true, Ordering::SeqCst);
    }
}

pub struct FakeLauncher {
    pub counters: Arc<Counters>,
    pub launch_delay: Duration,
    pub failing_launches: AtomicUsize,
}

impl FakeLauncher {
    pub fn new() -> (Self, Arc<Counters>) {
        let counters = Arc::new(Counters::default());
        let launcher = Self {
            counters: counters.clone(),
            launch_delay: Duration::from_millis(50),
            failing_launches: AtomicUsize::new(0),
        };
        (launcher, counters)
    }

    /// Fail the next `n` launches before succeeding.
    pub fn failing(self, n: usize) -> Self {
        self.failing_launches.store(n, Ordering::SeqCst);
        self
    }
}

#[async_trait]
impl EngineLauncher for FakeLauncher {
    type Engine = FakeEngine;

    async fn launch(&self) -> Result<FakeEngine> {
        tokio::time::sleep(self.launch_delay).await;
        let should_fail = self
            .failing_launches
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(Error::EngineStart("chrome binary not found".into()));
        }
        self.counters.launches.fetch_add(1, Ordering::SeqCst);
        self.counters.ping_hangs.store(false, Ordering::SeqCst);
        Ok(FakeEngine {
            counters: self.counters.clone(),
        })
    }
}

pub struct FakeEngine {
    counters: Arc<Counters>,
}

#[async_trait]
impl Engine for FakeEngine {
    type Context = FakeContext;

    async fn new_context(&self) -> Result<FakeContext> {
        self.counters.contexts_opened.fetch_add(1, Ordering::SeqCst);
        Ok(FakeContext {
            counters: self.counters.clone(),
            html: String::new(),
        })
    }

    async fn ping(&self) -> Result<()> {
        if self.counters.ping_hangs.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.counters.engine_closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub struct FakeContext {
    counters: Arc<Counters>,
    html: String,
}

#[async_trait]
impl RenderContext for FakeContext {
    async fn set_content(&mut self, html: &str) -> Result<()> {
        self.html = html.to_string();
        if html.contains(HANG) {
            std::future::pending::<()>().await;
        }
        if html.contains(FAIL) {
            return Err(Error::RenderError("net::ERR_ABORTED".into()));
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
        Ok(())
    }

    async fn print_pdf(&mut self, size: PageSize) -> Result<Vec<u8>> {
        let mut pdf = b"%PDF-1.7\n".to_vec();
        pdf.extend_from_slice(
            format!("% {}x{}mm\n{}\n%%EOF\n", size.width_mm, size.height_mm, self.html).as_bytes(),
        );
        Ok(pdf)
    }

    async fn close(self) -> Result<()> {
        self.counters.contexts_closed.fetch_add(1, Ordering::SeqCst);
        if self.html.contains(CLEANUP_FAIL) {
            return Err(Error::Cleanup("target already detached".into()));
        }
        Ok(())
    }
}
