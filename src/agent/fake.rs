//! 测试用的确定性代理：按脚本往下载目录写文件

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;

use super::{AgentFactory, AgentSession, AgentVerdict, NavigationAgent, TaskDirective, ToolRegistry};

#[derive(Debug, Clone, Default)]
pub(crate) struct FakeBehavior {
    files: Vec<String>,
    sleep: Option<Duration>,
    error: Option<String>,
    claims_success: bool,
}

impl FakeBehavior {
    pub(crate) fn writes(files: &[&str]) -> Self {
        Self {
            files: files.iter().map(|f| f.to_string()).collect(),
            claims_success: true,
            ..Self::default()
        }
    }

    pub(crate) fn claiming(mut self, success: bool) -> Self {
        self.claims_success = success;
        self
    }

    pub(crate) fn sleeping(mut self, duration: Duration) -> Self {
        self.sleep = Some(duration);
        self
    }

    pub(crate) fn failing(mut self, error: &str) -> Self {
        self.error = Some(error.to_string());
        self
    }
}

struct FakeAgent {
    behavior: FakeBehavior,
    directives: Arc<Mutex<Vec<String>>>,
    closed: Arc<AtomicUsize>,
}

#[async_trait]
impl NavigationAgent for FakeAgent {
    async fn run_task(
        &self,
        directive: &TaskDirective,
        _tools: &ToolRegistry,
    ) -> anyhow::Result<AgentVerdict> {
        self.directives.lock().unwrap().push(directive.url.clone());
        for name in &self.behavior.files {
            std::fs::write(directive.download_dir.join(name), format!("%PDF-1.4 {}", name))?;
        }
        if let Some(duration) = self.behavior.sleep {
            tokio::time::sleep(duration).await;
        }
        if let Some(error) = &self.behavior.error {
            return Err(anyhow!(error.clone()));
        }
        Ok(AgentVerdict {
            success: self.behavior.claims_success,
            summary: format!("{} documents", self.behavior.files.len()),
            steps: 1,
        })
    }

    async fn close(&self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

pub(crate) struct FakeFactory {
    behavior: FakeBehavior,
    fail_create: bool,
    created: AtomicUsize,
    directives: Arc<Mutex<Vec<String>>>,
    closed: Arc<AtomicUsize>,
}

impl FakeFactory {
    pub(crate) fn new(behavior: FakeBehavior) -> Self {
        Self {
            behavior,
            fail_create: false,
            created: AtomicUsize::new(0),
            directives: Arc::default(),
            closed: Arc::default(),
        }
    }

    pub(crate) fn failing_to_create(mut self) -> Self {
        self.fail_create = true;
        self
    }

    pub(crate) fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub(crate) fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    pub(crate) fn directive_urls(&self) -> Vec<String> {
        self.directives.lock().unwrap().clone()
    }
}

#[async_trait]
impl AgentFactory for FakeFactory {
    async fn create(&self, _download_dir: &Path) -> anyhow::Result<AgentSession> {
        if self.fail_create {
            return Err(anyhow!("failed to launch browser"));
        }
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(AgentSession {
            agent: Box::new(FakeAgent {
                behavior: self.behavior.clone(),
                directives: self.directives.clone(),
                closed: self.closed.clone(),
            }),
            tools: ToolRegistry::new(),
        })
    }
}
