//! Completion scheduling: turn a burst of keystrokes into at most one
//! completion request per pause.
//!
//! Every local edit restarts the idle-window timer. When the timer fires
//! uncancelled, one request is issued carrying the document text and cursor
//! offset captured at fire time. A new edit during an in-flight request
//! restarts the idle timer for the next cycle but never cancels the network
//! call.
//!
//! Failures are deliberately silent: a completion that errors, comes back
//! empty, or misses the confidence bar is skipped without touching any
//! state — suggestions must never interrupt typing.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use coderoom_api::{CompletionProvider, CompletionRequest};
use tokio::sync::mpsc;

use crate::timer::ResettableTimer;

const NOTICE_CAPACITY: usize = 64;

/// Tuning knobs. Defaults match the production behavior; tests shrink the
/// intervals.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Quiescence window after the last edit before a request is issued.
    pub idle_window: Duration,
    /// Minimum trimmed document length worth completing.
    pub min_document_len: usize,
    /// A suggestion is published only when confidence strictly exceeds this.
    pub confidence_threshold: f64,
    /// How long a published suggestion stays up before auto-clearing.
    pub display_duration: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            idle_window: Duration::from_millis(600),
            min_document_len: 2,
            confidence_threshold: 0.5,
            display_duration: Duration::from_secs(6),
        }
    }
}

/// Notices emitted to the controller's event loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerNotice {
    /// A completion passed the confidence gate. `seq` increases with every
    /// issued request so late responses from older requests can be told
    /// apart from newer ones.
    SuggestionReady { seq: u64, suggestion: String },
    /// The display window for the suggestion published at `seq` elapsed.
    SuggestionExpired { seq: u64 },
}

/// Debounces local edits and drives the completion service.
pub struct CompletionScheduler {
    provider: Arc<dyn CompletionProvider>,
    config: SchedulerConfig,
    language: String,
    debounce: ResettableTimer,
    expiry: ResettableTimer,
    request_seq: Arc<AtomicU64>,
    notice_tx: mpsc::Sender<SchedulerNotice>,
    notice_rx: Option<mpsc::Receiver<SchedulerNotice>>,
}

impl CompletionScheduler {
    pub fn new(
        provider: Arc<dyn CompletionProvider>,
        language: impl Into<String>,
        config: SchedulerConfig,
    ) -> Self {
        let (notice_tx, notice_rx) = mpsc::channel(NOTICE_CAPACITY);
        Self {
            provider,
            config,
            language: language.into(),
            debounce: ResettableTimer::new(),
            expiry: ResettableTimer::new(),
            request_seq: Arc::new(AtomicU64::new(0)),
            notice_tx,
            notice_rx: Some(notice_rx),
        }
    }

    /// Take the notice receiver (can only be called once).
    pub fn take_notice_rx(&mut self) -> Option<mpsc::Receiver<SchedulerNotice>> {
        self.notice_rx.take()
    }

    /// Record a local edit, restarting the idle-window timer.
    ///
    /// Documents below the minimum length cancel the pending cycle instead
    /// of arming one — trivial input is never worth a request.
    pub fn record_edit(&mut self, content: &str, cursor: usize) {
        if content.trim().len() < self.config.min_document_len {
            self.debounce.cancel();
            return;
        }

        let provider = self.provider.clone();
        let notice_tx = self.notice_tx.clone();
        let request_seq = self.request_seq.clone();
        let threshold = self.config.confidence_threshold;
        let request = CompletionRequest {
            code: content.to_string(),
            cursor_position: cursor as u64,
            language: self.language.clone(),
        };

        self.debounce.schedule(self.config.idle_window, async move {
            // Detach the request: a later edit re-arms the debounce timer,
            // which must not cancel a call already on the wire.
            tokio::spawn(async move {
                let seq = request_seq.fetch_add(1, Ordering::Relaxed) + 1;
                match provider.get_completion(request).await {
                    Ok(response)
                        if !response.suggestion.is_empty()
                            && response.confidence > threshold =>
                    {
                        let _ = notice_tx
                            .send(SchedulerNotice::SuggestionReady {
                                seq,
                                suggestion: response.suggestion,
                            })
                            .await;
                    }
                    Ok(response) => {
                        log::debug!(
                            "completion skipped (confidence {:.2})",
                            response.confidence
                        );
                    }
                    Err(err) => log::debug!("completion request failed, skipped: {err}"),
                }
            });
        });
    }

    /// Arm the auto-clear timer for the suggestion published at `seq`.
    /// Re-arming for a newer suggestion replaces the pending expiry.
    pub fn schedule_expiry(&mut self, seq: u64) {
        let notice_tx = self.notice_tx.clone();
        self.expiry.schedule(self.config.display_duration, async move {
            let _ = notice_tx
                .send(SchedulerNotice::SuggestionExpired { seq })
                .await;
        });
    }

    /// Cancel a pending auto-clear (user dismissed the suggestion).
    pub fn cancel_expiry(&mut self) {
        self.expiry.cancel();
    }

    /// Cancel both timers. Requests already on the wire resolve into a
    /// closed channel and are ignored.
    pub fn shutdown(&mut self) {
        self.debounce.cancel();
        self.expiry.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use coderoom_api::{ApiError, CompletionResponse};
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;
    use tokio::time::timeout;

    /// Completion service fake with a scripted response.
    struct ScriptedCompletions {
        confidence: f64,
        suggestion: String,
        delay: Duration,
        fail: bool,
        calls: AtomicUsize,
        last_request: Mutex<Option<CompletionRequest>>,
    }

    impl ScriptedCompletions {
        fn new(confidence: f64, suggestion: &str) -> Arc<Self> {
            Arc::new(Self {
                confidence,
                suggestion: suggestion.to_string(),
                delay: Duration::ZERO,
                fail: false,
                calls: AtomicUsize::new(0),
                last_request: Mutex::new(None),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CompletionProvider for ScriptedCompletions {
        async fn get_completion(
            &self,
            request: CompletionRequest,
        ) -> Result<CompletionResponse, ApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_request.lock().unwrap() = Some(request);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.fail {
                return Err(ApiError::Http(500));
            }
            Ok(CompletionResponse {
                suggestion: self.suggestion.clone(),
                confidence: self.confidence,
            })
        }
    }

    fn quick_config() -> SchedulerConfig {
        SchedulerConfig {
            idle_window: Duration::from_millis(40),
            display_duration: Duration::from_millis(50),
            ..SchedulerConfig::default()
        }
    }

    #[tokio::test]
    async fn test_burst_coalesces_into_one_request() {
        let provider = ScriptedCompletions::new(0.9, "print(x)");
        let mut scheduler =
            CompletionScheduler::new(provider.clone(), "python", quick_config());
        let mut notices = scheduler.take_notice_rx().unwrap();

        // Edits arrive faster than the idle window.
        for content in ["x", "x =", "x = 1"] {
            scheduler.record_edit(content, content.len());
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let notice = timeout(Duration::from_secs(1), notices.recv()).await.unwrap();
        assert_eq!(
            notice,
            Some(SchedulerNotice::SuggestionReady {
                seq: 1,
                suggestion: "print(x)".to_string()
            })
        );
        assert_eq!(provider.calls(), 1);

        // The request carries the last edit's content and cursor.
        let request = provider.last_request.lock().unwrap().clone().unwrap();
        assert_eq!(request.code, "x = 1");
        assert_eq!(request.cursor_position, 5);
        assert_eq!(request.language, "python");
    }

    #[tokio::test]
    async fn test_short_document_issues_nothing() {
        let provider = ScriptedCompletions::new(0.9, "print(x)");
        let mut scheduler =
            CompletionScheduler::new(provider.clone(), "python", quick_config());

        scheduler.record_edit("x", 1);
        scheduler.record_edit("  \n", 3); // whitespace trims to nothing
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_short_edit_cancels_pending_cycle() {
        let provider = ScriptedCompletions::new(0.9, "print(x)");
        let mut scheduler =
            CompletionScheduler::new(provider.clone(), "python", quick_config());

        scheduler.record_edit("x = 1", 5);
        // Everything deleted before the window elapses: no request at all.
        scheduler.record_edit("", 0);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_low_confidence_is_silent() {
        let provider = ScriptedCompletions::new(0.4, "print(x)");
        let mut scheduler =
            CompletionScheduler::new(provider.clone(), "python", quick_config());
        let mut notices = scheduler.take_notice_rx().unwrap();

        scheduler.record_edit("x = 1", 5);
        assert!(timeout(Duration::from_millis(150), notices.recv())
            .await
            .is_err());
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_threshold_is_strict() {
        // Exactly at the bar is not past it.
        let provider = ScriptedCompletions::new(0.5, "print(x)");
        let mut scheduler = CompletionScheduler::new(provider, "python", quick_config());
        let mut notices = scheduler.take_notice_rx().unwrap();

        scheduler.record_edit("x = 1", 5);
        assert!(timeout(Duration::from_millis(150), notices.recv())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_empty_suggestion_is_silent() {
        let provider = ScriptedCompletions::new(0.9, "");
        let mut scheduler = CompletionScheduler::new(provider, "python", quick_config());
        let mut notices = scheduler.take_notice_rx().unwrap();

        scheduler.record_edit("x = 1", 5);
        assert!(timeout(Duration::from_millis(150), notices.recv())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_request_failure_is_silent() {
        let provider = Arc::new(ScriptedCompletions {
            confidence: 0.9,
            suggestion: "print(x)".to_string(),
            delay: Duration::ZERO,
            fail: true,
            calls: AtomicUsize::new(0),
            last_request: Mutex::new(None),
        });
        let mut scheduler =
            CompletionScheduler::new(provider.clone(), "python", quick_config());
        let mut notices = scheduler.take_notice_rx().unwrap();

        scheduler.record_edit("x = 1", 5);
        assert!(timeout(Duration::from_millis(150), notices.recv())
            .await
            .is_err());
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_in_flight_request_survives_new_edit() {
        let provider = Arc::new(ScriptedCompletions {
            confidence: 0.9,
            suggestion: "print(x)".to_string(),
            delay: Duration::from_millis(60),
            fail: false,
            calls: AtomicUsize::new(0),
            last_request: Mutex::new(None),
        });
        let config = SchedulerConfig {
            idle_window: Duration::from_millis(15),
            ..SchedulerConfig::default()
        };
        let mut scheduler = CompletionScheduler::new(provider.clone(), "python", config);
        let mut notices = scheduler.take_notice_rx().unwrap();

        scheduler.record_edit("a = 1", 5);
        tokio::time::sleep(Duration::from_millis(30)).await; // first request on the wire
        scheduler.record_edit("a = 2", 5);

        // Both cycles complete: the new edit restarted the idle timer but
        // did not cancel the in-flight call.
        let first = timeout(Duration::from_secs(1), notices.recv()).await.unwrap();
        let second = timeout(Duration::from_secs(1), notices.recv()).await.unwrap();
        assert!(matches!(
            first,
            Some(SchedulerNotice::SuggestionReady { seq: 1, .. })
        ));
        assert!(matches!(
            second,
            Some(SchedulerNotice::SuggestionReady { seq: 2, .. })
        ));
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test]
    async fn test_expiry_notice_fires() {
        let provider = ScriptedCompletions::new(0.9, "print(x)");
        let mut scheduler = CompletionScheduler::new(provider, "python", quick_config());
        let mut notices = scheduler.take_notice_rx().unwrap();

        scheduler.schedule_expiry(7);
        let notice = timeout(Duration::from_secs(1), notices.recv()).await.unwrap();
        assert_eq!(notice, Some(SchedulerNotice::SuggestionExpired { seq: 7 }));
    }

    #[tokio::test]
    async fn test_cancelled_expiry_never_fires() {
        let provider = ScriptedCompletions::new(0.9, "print(x)");
        let mut scheduler = CompletionScheduler::new(provider, "python", quick_config());
        let mut notices = scheduler.take_notice_rx().unwrap();

        scheduler.schedule_expiry(1);
        scheduler.cancel_expiry();
        assert!(timeout(Duration::from_millis(120), notices.recv())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_shutdown_cancels_pending_cycle() {
        let provider = ScriptedCompletions::new(0.9, "print(x)");
        let mut scheduler =
            CompletionScheduler::new(provider.clone(), "python", quick_config());

        scheduler.record_edit("x = 1", 5);
        scheduler.shutdown();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(provider.calls(), 0);
    }
}
