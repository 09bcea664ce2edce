//! Deferred device reboot after credentials were saved.

use crate::command::{CommandLine, CommandRunner, Privilege};
use log::{error, info, warn};
use std::{sync::Arc, time::Duration};
use tokio::time::sleep;

/// Fires a reboot once a fixed delay has elapsed.
///
/// A scheduled reboot cannot be cancelled and nothing deduplicates
/// overlapping requests: every call to [`RebootScheduler::schedule`] ends in
/// its own reboot command.
pub struct RebootScheduler<R> {
    runner: Arc<R>,
    privilege: Privilege,
    delay: Duration,
    command_timeout: Duration,
}

impl<R> RebootScheduler<R>
where
    R: CommandRunner + Send + Sync + 'static,
{
    pub fn new(
        runner: Arc<R>,
        privilege: Privilege,
        delay: Duration,
        command_timeout: Duration,
    ) -> Self {
        Self {
            runner,
            privilege,
            delay,
            command_timeout,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn command(&self) -> CommandLine {
        self.privilege.command("reboot")
    }

    /// Spawn the delayed reboot and return immediately
    pub fn schedule(&self) {
        let runner = Arc::clone(&self.runner);
        let command = self.command();
        let delay = self.delay;
        let limit = self.command_timeout;

        info!("reboot in {}s", delay.as_secs());

        tokio::spawn(async move {
            sleep(delay).await;

            warn!("rebooting");
            let result = runner.run(&command, limit).await;
            if !result.success {
                error!("reboot failed: {}", result.error_text());
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandResult;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingRunner {
        log: Mutex<Vec<String>>,
    }

    impl CommandRunner for RecordingRunner {
        fn is_supported(&self) -> bool {
            true
        }

        async fn run(&self, command: &CommandLine, _limit: Duration) -> CommandResult {
            self.log.lock().unwrap().push(command.argv().join(" "));
            CommandResult::completed(0, String::new(), String::new())
        }
    }

    fn scheduler(
        runner: &Arc<RecordingRunner>,
        delay: Duration,
    ) -> RebootScheduler<RecordingRunner> {
        RebootScheduler::new(
            Arc::clone(runner),
            Privilege::Sudo,
            delay,
            Duration::from_secs(1),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn reboots_only_after_delay() {
        let runner = Arc::new(RecordingRunner::default());
        scheduler(&runner, Duration::from_secs(50)).schedule();

        sleep(Duration::from_secs(49)).await;
        assert!(runner.log.lock().unwrap().is_empty());

        sleep(Duration::from_secs(2)).await;
        assert_eq!(*runner.log.lock().unwrap(), vec!["sudo reboot"]);
    }

    #[tokio::test(start_paused = true)]
    async fn overlapping_requests_each_reboot() {
        let runner = Arc::new(RecordingRunner::default());
        let scheduler = scheduler(&runner, Duration::from_secs(50));

        scheduler.schedule();
        sleep(Duration::from_secs(10)).await;
        scheduler.schedule();

        sleep(Duration::from_secs(60)).await;
        assert_eq!(runner.log.lock().unwrap().len(), 2);
    }
}
