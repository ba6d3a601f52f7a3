//! The posting agent and its supervised loop
//!
//! One cycle reads the agent's own recent posts and those of every reference
//! account, asks the completion provider for a new post and publishes it.
//! [`Scheduler::run`] repeats cycles forever; a failed cycle is logged and the
//! loop carries on with the next one.

use chrono::Local;
use std::fmt;
use std::sync::Arc;
use tracing::{error, info, warn, Instrument};
use uuid::Uuid;

use crate::accounts::{AccountDirectory, AccountRef, Corpus};
use crate::config::Config;
use crate::error::{MimicastError, Result};
use crate::llm::CompletionProvider;
use crate::orchestrator::{ContentOrchestrator, GenerationRequest};
use crate::platforms::Transport;
use crate::poster::Publisher;
use crate::scheduling::Schedule;

/// Step of a cycle that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleStage {
    FetchOwn,
    FetchReference,
    Generate,
    Publish,
}

impl fmt::Display for CycleStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CycleStage::FetchOwn => "fetch_own",
            CycleStage::FetchReference => "fetch_reference",
            CycleStage::Generate => "generate",
            CycleStage::Publish => "publish",
        };
        f.write_str(name)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("cycle failed at {stage}: {source}")]
pub struct CycleError {
    pub stage: CycleStage,
    pub source: MimicastError,
}

impl CycleError {
    fn at(stage: CycleStage) -> impl FnOnce(MimicastError) -> CycleError {
        move |source| CycleError { stage, source }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    Posted,
    Rejected { status: u16 },
    NothingGenerated,
}

/// Accounts the agent reads from, resolved once at startup
#[derive(Debug, Clone, Default)]
pub struct Targets {
    /// Accounts whose voice is imitated
    pub style: Vec<AccountRef>,
    /// Accounts whose topics are drawn from
    pub content: Vec<AccountRef>,
}

pub struct Agent {
    directory: AccountDirectory,
    orchestrator: ContentOrchestrator,
    publisher: Publisher,
    me: AccountRef,
    targets: Targets,
    directive: String,
    own_post_count: usize,
    reference_post_count: usize,
}

impl Agent {
    pub fn new(
        transport: Arc<dyn Transport>,
        orchestrator: ContentOrchestrator,
        me: AccountRef,
        targets: Targets,
        directive: impl Into<String>,
    ) -> Self {
        Self {
            directory: AccountDirectory::new(transport.clone()),
            orchestrator,
            publisher: Publisher::new(transport),
            me,
            targets,
            directive: directive.into(),
            own_post_count: 5,
            reference_post_count: 15,
        }
    }

    pub fn with_post_counts(mut self, own: usize, reference: usize) -> Self {
        self.own_post_count = own;
        self.reference_post_count = reference;
        self
    }

    /// Build an agent from configuration over an authenticated transport
    ///
    /// Resolves the agent's own account and every configured handle.
    ///
    /// # Errors
    ///
    /// Fails on the first handle that cannot be resolved.
    pub async fn connect(
        config: &Config,
        transport: Arc<dyn Transport>,
        provider: Arc<dyn CompletionProvider>,
    ) -> Result<Self> {
        let directory = AccountDirectory::new(transport.clone());
        let me = directory.me().await?;

        let mut targets = Targets::default();
        for handle in &config.targets.style {
            targets.style.push(directory.resolve_handle(handle).await?);
        }
        for handle in &config.targets.content {
            targets.content.push(directory.resolve_handle(handle).await?);
        }

        info!(
            me = %me.handle,
            style = %handles(&targets.style),
            content = %handles(&targets.content),
            "Imitating accounts"
        );

        let orchestrator = ContentOrchestrator::new(provider, config.provider_model())
            .with_max_tokens(config.provider.max_tokens);

        Ok(Self::new(transport, orchestrator, me, targets, config.agent.persona.clone())
            .with_post_counts(
                config.targets.own_post_count,
                config.targets.reference_post_count,
            ))
    }

    pub fn me(&self) -> &AccountRef {
        &self.me
    }

    pub fn targets(&self) -> &Targets {
        &self.targets
    }

    async fn corpora(&self, accounts: &[AccountRef]) -> Result<Vec<Corpus>> {
        let mut corpora = Vec::with_capacity(accounts.len());
        for account in accounts {
            corpora.push(self.directory.corpus(account, self.reference_post_count).await?);
        }
        Ok(corpora)
    }

    /// Run one fetch, generate and publish cycle
    pub async fn run_cycle(&self) -> std::result::Result<CycleOutcome, CycleError> {
        let own = self
            .directory
            .corpus(&self.me, self.own_post_count)
            .await
            .map_err(CycleError::at(CycleStage::FetchOwn))?;

        let style_sources = self
            .corpora(&self.targets.style)
            .await
            .map_err(CycleError::at(CycleStage::FetchReference))?;
        let content_sources = self
            .corpora(&self.targets.content)
            .await
            .map_err(CycleError::at(CycleStage::FetchReference))?;

        let request = GenerationRequest {
            directive: self.directive.clone(),
            own,
            style_sources,
            content_sources,
        };

        let Some(text) = self
            .orchestrator
            .generate(&request)
            .await
            .map_err(CycleError::at(CycleStage::Generate))?
        else {
            return Ok(CycleOutcome::NothingGenerated);
        };

        let ack = self
            .publisher
            .submit(&text)
            .await
            .map_err(CycleError::at(CycleStage::Publish))?;

        if ack.is_ok() {
            Ok(CycleOutcome::Posted)
        } else {
            Ok(CycleOutcome::Rejected { status: ack.status })
        }
    }
}

fn handles(accounts: &[AccountRef]) -> String {
    accounts
        .iter()
        .map(|a| format!("@{}", a.handle))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Runs agent cycles forever on a [`Schedule`]
pub struct Scheduler {
    schedule: Schedule,
}

impl Scheduler {
    pub fn new(schedule: Schedule) -> Self {
        Self { schedule }
    }

    /// Sleep, run a cycle, log the result, repeat
    ///
    /// Never returns; stop it by dropping or aborting the future.
    pub async fn run(&self, agent: &Agent) {
        info!(schedule = %self.schedule, "Scheduler started");

        loop {
            let delay = self.schedule.delay_until_next(&Local::now());
            info!(
                delay = %humantime::format_duration(delay),
                "Waiting for next cycle"
            );
            tokio::time::sleep(delay).await;

            let span = tracing::info_span!("cycle", id = %Uuid::new_v4());
            Self::supervise(agent).instrument(span).await;
        }
    }

    async fn supervise(agent: &Agent) {
        match agent.run_cycle().await {
            Ok(CycleOutcome::Posted) => info!("Cycle complete, post published"),
            Ok(CycleOutcome::Rejected { status }) => {
                warn!(status, "Cycle complete, post rejected")
            }
            Ok(CycleOutcome::NothingGenerated) => {
                warn!("Cycle complete, provider returned no text")
            }
            Err(e) => {
                error!(stage = %e.stage, error = %e.source, "Cycle failed");
                if e.source.is_authentication() {
                    match e.stage {
                        CycleStage::Generate => {
                            warn!("Completion provider rejected the API key")
                        }
                        _ => warn!(
                            "Session was rejected; delete the session file and restart to log in again"
                        ),
                    }
                }
            }
        }
    }
}
