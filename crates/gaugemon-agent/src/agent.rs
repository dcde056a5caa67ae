use crate::config::AgentConfig;
use crate::snapshot::{Snapshot, SnapshotStore};
use crate::transport::Transport;
use gaugemon_collector::Collector;
use gaugemon_common::types::MetricRecord;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

pub const POLL_COUNT: &str = "PollCount";

/// Timing and fan-out of the agent loops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    pub poll_interval: Duration,
    pub report_interval: Duration,
    pub rate_limit: usize,
}

impl From<&AgentConfig> for Schedule {
    fn from(config: &AgentConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            report_interval: config.report_interval(),
            rate_limit: config.rate_limit,
        }
    }
}

type SharedCollector = Arc<Mutex<Box<dyn Collector>>>;

/// Poll loop, report loop and delivery worker pool.
pub struct Agent {
    schedule: Schedule,
    collectors: Vec<SharedCollector>,
    snapshot: SnapshotStore,
    poll_count: AtomicI64,
    transport: Arc<Transport>,
}

impl Agent {
    pub fn new(
        schedule: Schedule,
        collectors: Vec<Box<dyn Collector>>,
        transport: Transport,
    ) -> Self {
        Self {
            schedule,
            collectors: collectors
                .into_iter()
                .map(|c| Arc::new(Mutex::new(c)))
                .collect(),
            snapshot: SnapshotStore::new(),
            poll_count: AtomicI64::new(0),
            transport: Arc::new(transport),
        }
    }

    pub fn snapshot(&self) -> &SnapshotStore {
        &self.snapshot
    }

    /// Completed poll cycles.
    pub fn poll_count(&self) -> i64 {
        self.poll_count.load(Ordering::SeqCst)
    }

    /// Runs every collector concurrently, joins their output, appends
    /// `PollCount` and replaces the held snapshot.
    ///
    /// A failing collector only loses its own metrics for this cycle.
    pub async fn poll_once(&self) {
        let tasks: Vec<_> = self
            .collectors
            .iter()
            .map(|collector| {
                let collector = collector.clone();
                tokio::task::spawn_blocking(move || {
                    let mut collector = collector.lock().unwrap_or_else(PoisonError::into_inner);
                    let name = collector.name().to_string();
                    (name, collector.collect())
                })
            })
            .collect();

        let mut records = Vec::new();
        for task in tasks {
            match task.await {
                Ok((_, Ok(polled))) => records.extend(polled),
                Ok((name, Err(e))) => {
                    tracing::warn!(collector = %name, error = %e, "Collection failed")
                }
                Err(e) => tracing::warn!(error = %e, "Collector task aborted"),
            }
        }

        let count = self.poll_count.fetch_add(1, Ordering::SeqCst) + 1;
        records.push(MetricRecord::counter(POLL_COUNT, count));
        tracing::debug!(count = records.len(), poll = count, "Polled metrics");
        self.snapshot.replace(records);
    }

    /// Runs until `shutdown` is cancelled.
    ///
    /// On cancellation the poll and report loops stop; workers finish the
    /// batch they hold and exit once the queue is closed, but are not
    /// awaited.
    pub async fn run(self, shutdown: CancellationToken) -> anyhow::Result<()> {
        let agent = Arc::new(self);
        let schedule = agent.schedule;
        tracing::info!(
            poll_interval_secs = schedule.poll_interval.as_secs_f64(),
            report_interval_secs = schedule.report_interval.as_secs_f64(),
            workers = schedule.rate_limit,
            server = %agent.transport.url(),
            "Starting agent"
        );

        // Capacity 1 is the smallest tokio allows; the report loop blocks
        // as soon as one batch is waiting for a free worker.
        let (tx, rx) = mpsc::channel::<Snapshot>(1);
        let rx = Arc::new(tokio::sync::Mutex::new(rx));
        for id in 0..schedule.rate_limit.max(1) {
            tokio::spawn(worker(id, rx.clone(), agent.transport.clone()));
        }

        let poll = spawn_poll_loop(agent.clone(), shutdown.clone());
        let report = spawn_report_loop(agent.clone(), tx, shutdown.clone());

        shutdown.cancelled().await;
        tracing::info!("Shutting down agent");
        for handle in [poll, report] {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Agent loop ended abnormally");
            }
        }
        Ok(())
    }
}

fn spawn_poll_loop(agent: Arc<Agent>, shutdown: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = interval(agent.schedule.poll_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tick.tick() => agent.poll_once().await,
            }
        }
        tracing::debug!("Poll loop stopped");
    })
}

fn spawn_report_loop(
    agent: Arc<Agent>,
    queue: mpsc::Sender<Snapshot>,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let period = agent.schedule.report_interval;
        let mut tick = interval_at(Instant::now() + period, period);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tick.tick() => {}
            }
            let batch = agent.snapshot.current();
            tokio::select! {
                _ = shutdown.cancelled() => break,
                sent = queue.send(batch) => {
                    if sent.is_err() {
                        tracing::warn!("Delivery queue closed, stopping report loop");
                        break;
                    }
                }
            }
        }
        tracing::debug!("Report loop stopped");
    })
}

async fn worker(
    id: usize,
    queue: Arc<tokio::sync::Mutex<mpsc::Receiver<Snapshot>>>,
    transport: Arc<Transport>,
) {
    loop {
        let batch = queue.lock().await.recv().await;
        let Some(batch) = batch else {
            break;
        };
        if let Err(e) = transport.deliver(&batch).await {
            tracing::error!(
                worker = id,
                count = batch.len(),
                error = %e,
                "Dropping undelivered batch"
            );
        }
    }
    tracing::debug!(worker = id, "Delivery worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct Fixed(Vec<MetricRecord>);

    impl Collector for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }

        fn collect(&mut self) -> anyhow::Result<Vec<MetricRecord>> {
            Ok(self.0.clone())
        }
    }

    /// Succeeds on odd calls only.
    struct Flaky(Arc<AtomicUsize>);

    impl Collector for Flaky {
        fn name(&self) -> &str {
            "flaky"
        }

        fn collect(&mut self) -> anyhow::Result<Vec<MetricRecord>> {
            let n = self.0.fetch_add(1, Ordering::SeqCst);
            if n % 2 == 0 {
                Ok(vec![MetricRecord::gauge("Flaky", n as f64)])
            } else {
                anyhow::bail!("source unavailable")
            }
        }
    }

    fn agent(collectors: Vec<Box<dyn Collector>>) -> Agent {
        let schedule = Schedule {
            poll_interval: Duration::from_secs(1),
            report_interval: Duration::from_secs(1),
            rate_limit: 1,
        };
        Agent::new(schedule, collectors, Transport::new("127.0.0.1:9", None).unwrap())
    }

    fn ids(snapshot: &Snapshot) -> Vec<&str> {
        snapshot.iter().map(|r| r.id.as_str()).collect()
    }

    #[tokio::test]
    async fn test_poll_joins_sources_and_appends_poll_count() {
        let agent = agent(vec![
            Box::new(Fixed(vec![MetricRecord::gauge("A", 1.0)])),
            Box::new(Fixed(vec![MetricRecord::gauge("B", 2.0)])),
        ]);
        agent.poll_once().await;

        let snap = agent.snapshot().current();
        assert_eq!(ids(&snap), vec!["A", "B", POLL_COUNT]);
        assert_eq!(snap[2], MetricRecord::counter(POLL_COUNT, 1));
    }

    #[tokio::test]
    async fn test_failed_source_drops_only_its_metrics() {
        let calls = Arc::new(AtomicUsize::new(0));
        let agent = agent(vec![
            Box::new(Fixed(vec![MetricRecord::gauge("A", 1.0)])),
            Box::new(Flaky(calls.clone())),
        ]);

        agent.poll_once().await;
        assert_eq!(ids(&agent.snapshot().current()), vec!["A", "Flaky", POLL_COUNT]);

        // Second call fails: the stale Flaky value vanishes, the rest stays
        agent.poll_once().await;
        let snap = agent.snapshot().current();
        assert_eq!(ids(&snap), vec!["A", POLL_COUNT]);
        assert_eq!(snap[1].delta, Some(2));
        assert_eq!(agent.poll_count(), 2);
    }

    #[tokio::test]
    async fn test_report_loop_waits_for_queue_space() {
        let schedule = Schedule {
            poll_interval: Duration::from_secs(1),
            report_interval: Duration::from_millis(10),
            rate_limit: 1,
        };
        let transport = Transport::new("127.0.0.1:9", None).unwrap();
        let agent = Arc::new(Agent::new(schedule, Vec::new(), transport));
        let (tx, mut rx) = mpsc::channel::<Snapshot>(1);
        let shutdown = CancellationToken::new();
        let handle = spawn_report_loop(agent, tx, shutdown.clone());

        // Ten ticks pass, but only one batch fits
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());

        // The blocked send completes, then the loop blocks again
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[test]
    fn test_schedule_from_config() {
        let config = AgentConfig {
            rate_limit: 3,
            ..AgentConfig::default()
        };
        let schedule = Schedule::from(&config);
        assert_eq!(schedule.poll_interval, Duration::from_secs(2));
        assert_eq!(schedule.report_interval, Duration::from_secs(10));
        assert_eq!(schedule.rate_limit, 3);
    }
}
