//! Shared test fixtures

use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Semaphore;

use shipd::app::options::AppOptions;
use shipd::app::state::AppState;
use shipd::deploy::executor::{CommandOutput, CommandRunner, Step};
use shipd::errors::AgentError;
use shipd::store::memory::MemoryStore;

/// Command runner whose builds wait at the `pull` step until the test opens the
/// gate, and whose `build` step fails or succeeds following a script.
pub struct GatedRunner {
    gate: Semaphore,
    outcomes: Mutex<VecDeque<bool>>,
    builds: AtomicUsize,
    restarts: AtomicUsize,
}

impl GatedRunner {
    pub fn new() -> Self {
        Self {
            gate: Semaphore::new(0),
            outcomes: Mutex::new(VecDeque::new()),
            builds: AtomicUsize::new(0),
            restarts: AtomicUsize::new(0),
        }
    }

    /// Queue the result of upcoming builds; unscripted builds succeed
    pub fn script(&self, outcomes: &[bool]) {
        self.outcomes.lock().unwrap().extend(outcomes);
    }

    /// Let `n` more builds past the pull step
    pub fn open(&self, n: usize) {
        self.gate.add_permits(n);
    }

    pub fn builds(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }

    pub fn restarts(&self) -> usize {
        self.restarts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CommandRunner for GatedRunner {
    async fn run(&self, step: &Step, _work_dir: &Path) -> Result<CommandOutput, AgentError> {
        let success = match step.name.as_str() {
            "pull" => {
                self.gate
                    .acquire()
                    .await
                    .map_err(|e| AgentError::Internal(e.to_string()))?
                    .forget();
                true
            }
            "build" => {
                self.builds.fetch_add(1, Ordering::SeqCst);
                self.outcomes.lock().unwrap().pop_front().unwrap_or(true)
            }
            "restart" => {
                self.restarts.fetch_add(1, Ordering::SeqCst);
                true
            }
            _ => true,
        };

        Ok(CommandOutput {
            exit_code: Some(if success { 0 } else { 1 }),
            output: format!("{} {}\n", step.name, if success { "ok" } else { "boom" }),
        })
    }
}

/// Application state over an in-memory store and a gated runner
pub fn app_state() -> (AppState, Arc<MemoryStore>, Arc<GatedRunner>) {
    let store = Arc::new(MemoryStore::new());
    let runner = Arc::new(GatedRunner::new());
    let state = AppState::with_parts(&AppOptions::default(), store.clone(), runner.clone());
    (state, store, runner)
}

/// Keep timestamps of consecutive pushes strictly increasing
pub async fn tick() {
    tokio::time::sleep(std::time::Duration::from_millis(2)).await;
}
