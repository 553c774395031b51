//! Terminal operator: progress on stderr, answers from stdin.
//!
//! Input is read line by line through one shared reader so the DNS skip
//! listener and later prompts never compete for the same bytes.

use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use colored::Colorize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::dns::DnsRecord;
use crate::error::KdeployError;
use crate::orchestrator::{CleanupDecision, DeployOperator, DeployPhase};
use crate::reconciler::{
    Confirmation, DeploymentIdentity, DeploymentScope, DestroyOperator, StepStatus, TeardownStep,
};

use super::output::OutputFormatter;

/// Word that skips DNS validation while waiting.
const SKIP_WORD: &str = "skip";

/// Answers questions from a line reader and prints progress to stderr.
pub struct TerminalOperator<R = BufReader<Stdin>> {
    /// Formatter for tables shown during the run.
    formatter: OutputFormatter,
    /// Shared line reader.
    input: Arc<tokio::sync::Mutex<Lines<R>>>,
    /// Token cancelled when the operator types the skip word.
    skip: Option<CancellationToken>,
    /// Stops the running skip listener.
    listener: Mutex<Option<CancellationToken>>,
    /// Verified count at the last DNS table print.
    last_verified: AtomicUsize,
}

impl TerminalOperator {
    /// Creates an operator reading from stdin.
    #[must_use]
    pub fn stdin(formatter: OutputFormatter) -> Self {
        Self::with_input(formatter, BufReader::new(tokio::io::stdin()))
    }
}

impl<R> TerminalOperator<R>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    /// Creates an operator reading from the given input.
    #[must_use]
    pub fn with_input(formatter: OutputFormatter, input: R) -> Self {
        Self {
            formatter,
            input: Arc::new(tokio::sync::Mutex::new(input.lines())),
            skip: None,
            listener: Mutex::new(None),
            last_verified: AtomicUsize::new(usize::MAX),
        }
    }

    /// Cancels `token` when the operator types `skip` during the DNS wait.
    #[must_use]
    pub fn with_skip_token(mut self, token: CancellationToken) -> Self {
        self.skip = Some(token);
        self
    }

    /// Stops listening for the skip word.
    pub fn finish(&self) {
        if let Ok(mut slot) = self.listener.lock()
            && let Some(stop) = slot.take()
        {
            stop.cancel();
        }
    }

    /// Prints a prompt and reads one line; `None` when input is closed.
    async fn ask(&self, prompt: &str) -> Option<String> {
        eprint!("{prompt}");
        let _ = std::io::stderr().flush();

        let mut lines = self.input.lock().await;
        match lines.next_line().await {
            Ok(line) => line,
            Err(e) => {
                warn!("Failed to read answer: {e}");
                None
            }
        }
    }

    /// Starts a task that reads lines until the skip word, closed input or `finish`.
    fn listen_for_skip(&self) {
        let Some(skip) = self.skip.clone() else {
            return;
        };

        let stop = CancellationToken::new();
        if let Ok(mut slot) = self.listener.lock()
            && let Some(previous) = slot.replace(stop.clone())
        {
            previous.cancel();
        }

        let input = Arc::clone(&self.input);
        tokio::spawn(async move {
            let mut lines = input.lock().await;
            loop {
                tokio::select! {
                    () = stop.cancelled() => break,
                    line = lines.next_line() => match line {
                        Ok(Some(line)) if line.trim().eq_ignore_ascii_case(SKIP_WORD) => {
                            info!("DNS validation skipped by operator");
                            skip.cancel();
                            break;
                        }
                        Ok(Some(_)) => {}
                        Ok(None) => break,
                        Err(e) => {
                            warn!("Stopped reading input: {e}");
                            break;
                        }
                    },
                }
            }
        });
    }
}

#[async_trait]
impl<R> DeployOperator for TerminalOperator<R>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    fn phase_changed(&self, phase: DeployPhase) {
        if phase == DeployPhase::DnsWait {
            self.listen_for_skip();
        } else {
            self.finish();
        }

        let label = if phase.is_infra() {
            format!("infra: {phase}")
        } else {
            phase.to_string()
        };
        eprintln!("{} {}", "→".cyan(), label.dimmed());
    }

    fn dns_progress(&self, records: &[DnsRecord]) {
        let verified = records.iter().filter(|r| r.verified).count();
        if self.last_verified.swap(verified, Ordering::Relaxed) != verified {
            eprint!("{}", self.formatter.format_dns_progress(records));
        }
    }

    async fn confirm_cleanup(&self, deployment: &str, error: &KdeployError) -> CleanupDecision {
        eprintln!("\n{} Deploy of {deployment} failed: {error}", "✗".red());
        let answer = self
            .ask("Infrastructure was created during this run. Destroy it now? [y/N]: ")
            .await;

        match answer.as_deref().map(str::trim) {
            None => CleanupDecision::Abandon,
            Some(a) if a.eq_ignore_ascii_case("y") || a.eq_ignore_ascii_case("yes") => {
                CleanupDecision::Destroy
            }
            Some(_) => CleanupDecision::Keep,
        }
    }
}

#[async_trait]
impl<R> DestroyOperator for TerminalOperator<R>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    fn scope_discovered(&self, identity: &DeploymentIdentity, scope: &DeploymentScope) {
        eprint!("{}", self.formatter.format_scope(&identity.name, scope));
    }

    async fn confirm(&self, confirmation: &Confirmation) -> Option<String> {
        match confirmation {
            Confirmation::YesNo => self.ask("\nProceed with destroy? [y/N]: ").await,
            Confirmation::Phrase(phrase) => {
                let prompt = format!(
                    "\n{} This destroys cloud infrastructure and cannot be undone.\nType '{}' to confirm: ",
                    "⚠".yellow(),
                    phrase.bold()
                );
                self.ask(&prompt).await
            }
        }
    }

    fn step_finished(&self, step: &TeardownStep) {
        let status = match step.status {
            StepStatus::Success => "done".green(),
            StepStatus::Error => "failed".red(),
            StepStatus::Skipped => "skipped".dimmed(),
        };
        eprintln!("   {}: {status}", step.step);
    }
}
