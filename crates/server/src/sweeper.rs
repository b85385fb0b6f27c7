use std::sync::Arc;
use std::time::Duration;

use safepath_agent::AgentRegistry;
use tokio::task::JoinHandle;
use tracing::info;

const MAX_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Sweeps run at a quarter of the idle limit, at most once a minute.
pub fn sweep_interval(max_idle: Duration) -> Duration {
    (max_idle / 4).clamp(Duration::from_secs(1), MAX_SWEEP_INTERVAL)
}

pub async fn sweep_once(agents: &AgentRegistry, max_idle: Duration) -> usize {
    let mut evicted = 0;
    for (key, entry) in agents.entries() {
        let threads = entry.graph.store().evict_idle(max_idle).await;
        for thread_id in &threads {
            info!(
                event_name = "system.sweeper.thread_evicted",
                correlation_id = "sweeper",
                thread_id = %thread_id,
                agent = key,
                "idle thread evicted"
            );
        }
        evicted += threads.len();
    }
    evicted
}

pub fn spawn(agents: Arc<AgentRegistry>, max_idle: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(sweep_interval(max_idle));
        ticker.tick().await;
        loop {
            ticker.tick().await;
            sweep_once(&agents, max_idle).await;
        }
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::sweeper::{sweep_interval, sweep_once};
    use crate::test_support::scripted_registry;

    #[test]
    fn interval_is_bounded() {
        assert_eq!(sweep_interval(Duration::from_secs(3600)), Duration::from_secs(60));
        assert_eq!(sweep_interval(Duration::from_secs(40)), Duration::from_secs(10));
        assert_eq!(sweep_interval(Duration::from_secs(2)), Duration::from_secs(1));
    }

    #[tokio::test]
    async fn sweep_evicts_only_idle_threads() {
        let agents = scripted_registry(Vec::new());
        let graph = agents.graph("travel-chatbot-assistant").expect("graph");
        graph.open(None).await.expect("stale thread");
        tokio::time::sleep(Duration::from_millis(80)).await;
        let fresh = graph.open(None).await.expect("fresh thread").thread_id;

        let evicted = sweep_once(&agents, Duration::from_millis(50)).await;

        assert_eq!(evicted, 1);
        assert_eq!(graph.store().len().await, 1);
        assert!(graph.store().get(&fresh).await.is_some());
    }
}
