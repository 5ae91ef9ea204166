//! Chat front end: turns inbound messages into relay jobs.

pub mod commands;

use anyhow::Result;
use std::future::Future;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::task::JoinSet;

use crate::config::PolicyConfig;
use crate::extractors::{CookieProfile, MediaKind};
use crate::relay::{FetchOrchestrator, JobOutcome, JobRequest};
use crate::transport::{ChatId, UserId};
use commands::{parse_command, usage, Command};

pub struct RelayBot {
    orchestrator: Arc<FetchOrchestrator>,
    policy: PolicyConfig,
}

impl RelayBot {
    pub fn new(orchestrator: Arc<FetchOrchestrator>, policy: PolicyConfig) -> Self {
        Self { orchestrator, policy }
    }

    /// Build the job for a command, deciding cookies and limit enforcement from the URL
    pub fn request_for(&self, user_id: UserId, chat_id: ChatId, kind: MediaKind, url: &str) -> JobRequest {
        let cookie_profile = CookieProfile::for_url(url);
        JobRequest {
            user_id,
            chat_id,
            media_kind: kind,
            source_url: url.to_string(),
            cookie_profile,
            enforce_policy: self.policy.applies_to(cookie_profile, kind),
        }
    }

    /// Interpret one chat message. Returns the job to start, if any; usage errors are
    /// answered directly.
    pub async fn handle_message(&self, user_id: UserId, chat_id: ChatId, text: &str) -> Result<Option<JobRequest>> {
        match parse_command(text) {
            Some(Command::Fetch { kind, url }) => Ok(Some(self.request_for(user_id, chat_id, kind, &url))),
            Some(Command::Usage(kind)) => {
                self.orchestrator.transport().reply(chat_id, usage(kind)).await?;
                Ok(None)
            }
            None => Ok(None),
        }
    }

    /// Serve `<user_id> <message>` lines until the input ends or Ctrl-C arrives
    pub async fn serve<R>(&self, input: R) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
    {
        self.serve_until(input, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!("Cannot listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Serve until the input ends (running jobs are awaited) or `shutdown` resolves
    /// (running jobs are abandoned and their files removed).
    pub async fn serve_until<R, S>(&self, input: R, shutdown: S) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        S: Future<Output = ()>,
    {
        let mut lines = input.lines();
        let mut jobs: JoinSet<JobOutcome> = JoinSet::new();
        let mut input_open = true;
        tokio::pin!(shutdown);

        while input_open || !jobs.is_empty() {
            tokio::select! {
                line = lines.next_line(), if input_open => match line? {
                    Some(line) => self.dispatch_line(&line, &mut jobs).await,
                    None => {
                        tracing::info!("Input closed, waiting for {} running jobs", jobs.len());
                        input_open = false;
                    }
                },
                Some(finished) = jobs.join_next(), if !jobs.is_empty() => match finished {
                    Ok(outcome) => tracing::debug!("Job finished: {:?}", outcome),
                    Err(e) => tracing::error!("Job task failed: {}", e),
                },
                _ = &mut shutdown => {
                    tracing::info!("Shutting down with {} running jobs", jobs.len());
                    jobs.shutdown().await;
                    let abandoned = self.orchestrator.gate().registry().abandon_all();
                    if abandoned > 0 {
                        tracing::warn!("Abandoned {} jobs", abandoned);
                    }
                    return Ok(());
                }
            }
        }

        Ok(())
    }

    async fn dispatch_line(&self, line: &str, jobs: &mut JoinSet<JobOutcome>) {
        let Some((user_id, text)) = parse_line(line) else {
            if !line.trim().is_empty() {
                tracing::warn!("Ignoring malformed line: {}", line);
            }
            return;
        };

        // Direct messages: the chat is the user
        let chat_id = user_id as ChatId;
        match self.handle_message(user_id, chat_id, text).await {
            Ok(Some(request)) => {
                tracing::info!(
                    user_id,
                    kind = %request.media_kind,
                    domain = crate::utils::extract_domain(&request.source_url).as_deref().unwrap_or("unknown"),
                    "Dispatching job"
                );
                let orchestrator = self.orchestrator.clone();
                jobs.spawn(async move { orchestrator.run(request).await });
            }
            Ok(None) => {}
            Err(e) => tracing::warn!("Failed to answer user {}: {}", user_id, e),
        }
    }
}

/// Split `<user_id> <message>`
pub fn parse_line(line: &str) -> Option<(UserId, &str)> {
    let (user, text) = line.trim().split_once(char::is_whitespace)?;
    let user_id = user.parse().ok()?;
    Some((user_id, text.trim()))
}
