// Module: Progress
// Observers notified by the queue after each test and after each file.
// Delivery (push, polling, logs) is up to the implementation.

use tokio::sync::mpsc;
use tracing::info;

use crate::protocol::{TaskId, TestFileResult, TestResult};

pub trait ProgressObserver: Send + Sync {
    fn on_test_completed(&self, task_id: TaskId, result: &TestResult);

    /// Also called for stopped runs, with the same results the task snapshot published.
    fn on_file_completed(&self, task_id: TaskId, result: &TestFileResult);
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl ProgressObserver for NullObserver {
    fn on_test_completed(&self, _task_id: TaskId, _result: &TestResult) {}

    fn on_file_completed(&self, _task_id: TaskId, _result: &TestFileResult) {}
}

/// Writes every event to the tracing subscriber.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl ProgressObserver for TracingObserver {
    fn on_test_completed(&self, task_id: TaskId, result: &TestResult) {
        info!(
            task_id,
            position = result.position,
            url = %result.actual_url,
            success = result.success(),
            elapsed_ms = result.elapsed_ms,
            "Test completed"
        );
    }

    fn on_file_completed(&self, task_id: TaskId, result: &TestFileResult) {
        info!(
            task_id,
            file = %result.file_name,
            passed = result.total_passed,
            failed = result.total_failed,
            elapsed_ms = result.total_elapsed_ms,
            "File completed"
        );
    }
}

#[derive(Debug, Clone)]
pub enum ProgressEvent {
    TestCompleted { task_id: TaskId, result: TestResult },
    FileCompleted { task_id: TaskId, result: TestFileResult },
}

/// Forwards events into an unbounded channel, e.g. for a push transport.
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    sender: mpsc::UnboundedSender<ProgressEvent>,
}

impl ChannelObserver {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl ProgressObserver for ChannelObserver {
    fn on_test_completed(&self, task_id: TaskId, result: &TestResult) {
        // A dropped receiver only means nobody is listening anymore.
        let _ = self.sender.send(ProgressEvent::TestCompleted {
            task_id,
            result: result.clone(),
        });
    }

    fn on_file_completed(&self, task_id: TaskId, result: &TestFileResult) {
        let _ = self.sender.send(ProgressEvent::FileCompleted {
            task_id,
            result: result.clone(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_observer_forwards_events_in_order() {
        let (observer, mut receiver) = ChannelObserver::new();

        let test_result = TestResult {
            position: 4,
            ..Default::default()
        };
        observer.on_test_completed(7, &test_result);
        observer.on_file_completed(7, &TestFileResult::new("a.json", "DEV"));

        match receiver.recv().await {
            Some(ProgressEvent::TestCompleted { task_id, result }) => {
                assert_eq!(task_id, 7);
                assert_eq!(result.position, 4);
            }
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(matches!(
            receiver.recv().await,
            Some(ProgressEvent::FileCompleted { task_id: 7, .. })
        ));
    }

    #[test]
    fn test_channel_observer_tolerates_dropped_receiver() {
        let (observer, receiver) = ChannelObserver::new();
        drop(receiver);
        observer.on_test_completed(1, &TestResult::default());
    }
}
