//! Wiring of the sampling pipeline and its lifecycle.

use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::ConfigService;
use crate::health_stats::HealthStats;
use crate::history::HistoryStore;
use crate::hub::{PublishHub, RoleFilter, Subscription};
use crate::process::{ProcessSource, UsageReader};
use crate::query::QueryApi;
use crate::sampler::{Inventory, InventorySlot, Sampler};
use crate::trend::TrendAnalyzer;

/// Extra time granted to an in-flight tick on stop.
const STOP_GRACE: Duration = Duration::from_secs(1);

struct Running {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// A configured monitor. Components are exposed for the HTTP layer.
pub struct Monitor {
    pub config: Arc<ConfigService>,
    pub store: Arc<HistoryStore>,
    pub analyzer: Arc<TrendAnalyzer>,
    pub hub: Arc<PublishHub>,
    pub health: Arc<HealthStats>,
    inventory: InventorySlot,
    sampler: Arc<Sampler>,
    running: Mutex<Option<Running>>,
}

impl Monitor {
    pub fn new(
        config: Arc<ConfigService>,
        source: Arc<dyn ProcessSource>,
        reader: Arc<dyn UsageReader>,
    ) -> Self {
        let capacity = config.current().config.history.capacity;
        let store = Arc::new(HistoryStore::new(capacity));
        let analyzer = Arc::new(TrendAnalyzer::new(Arc::clone(&store), Arc::clone(&config)));
        let hub = Arc::new(PublishHub::new());
        let health = Arc::new(HealthStats::new());
        let inventory: InventorySlot = Arc::new(RwLock::new(Arc::new(Inventory::default())));

        let sampler = Arc::new(Sampler::new(
            Arc::clone(&config),
            source,
            reader,
            Arc::clone(&store),
            Arc::clone(&analyzer),
            Arc::clone(&hub),
            Arc::clone(&health),
            Arc::clone(&inventory),
        ));

        Self {
            config,
            store,
            analyzer,
            hub,
            health,
            inventory,
            sampler,
            running: Mutex::new(None),
        }
    }

    pub fn query(&self) -> QueryApi {
        QueryApi::new(
            Arc::clone(&self.store),
            Arc::clone(&self.analyzer),
            Arc::clone(&self.inventory),
        )
    }

    pub fn sampler(&self) -> &Arc<Sampler> {
        &self.sampler
    }

    /// Registers a push subscriber seeded with the current snapshot.
    pub fn subscribe(&self, filter: RoleFilter) -> Subscription {
        let queue = self.config.current().config.publish.queue_capacity;
        let query = self.query();
        self.hub
            .subscribe_with(filter, queue, move || query.snapshot_messages())
    }

    /// Spawns the sampling loop. Calling it while running is a no-op.
    pub fn start(&self) {
        let mut running = match self.running.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        if running.is_some() {
            warn!("Monitor already running");
            return;
        }
        self.sampler.resume();
        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn(Arc::clone(&self.sampler).run(rx));
        *running = Some(Running { shutdown: tx, task });
        info!("Monitor started");
    }

    pub fn is_running(&self) -> bool {
        self.running.lock().map(|g| g.is_some()).unwrap_or(false)
    }

    /// Stops sampling, disconnects subscribers and discards history.
    ///
    /// A tick in progress is given its interval plus read timeout to finish;
    /// after that the loop and the tick are aborted. No sample is recorded
    /// once this returns.
    pub async fn stop(&self) {
        let running = match self.running.lock() {
            Ok(mut g) => g.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };

        if let Some(Running { shutdown, mut task }) = running {
            let sampling = self.config.current().config.sampling.clone();
            let bound = sampling.interval() + sampling.read_timeout() + STOP_GRACE;
            let _ = shutdown.send(true);
            match tokio::time::timeout(bound, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("Sampler task ended abnormally: {}", e),
                Err(_) => {
                    warn!(?bound, "Sampler did not stop in time, aborting");
                    task.abort();
                }
            }
        }

        self.sampler.halt();
        self.hub.close_all();
        self.store.clear();
        self.analyzer.clear();
        info!("Monitor stopped");
    }
}
