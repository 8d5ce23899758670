//! # Lease Runtime
//!
//! Runtime implementation for the checkout lease coordinator.
//!
//! This crate provides the [`Store`] that coordinates reducer execution and
//! effect handling for one page-scoped piece of state.
//!
//! ## Core Components
//!
//! - **Store**: Owns the state and runs the reducer for every action
//! - **Effect Executor**: Executes effect descriptions and feeds actions back to the reducer
//! - **Cancellation Registry**: Tracks cancellable effects (timers) by [`EffectId`]
//!
//! ## Example
//!
//! ```ignore
//! use lease_runtime::Store;
//!
//! let store = Store::new(initial_state, my_reducer, environment);
//!
//! // Send an action
//! store.send(Action::DoSomething).await?;
//!
//! // Read state
//! let value = store.state(|s| s.some_field).await;
//! ```

use futures::future::{BoxFuture, join_all};
use lease_core::{
    effect::{Effect, EffectId},
    reducer::Reducer,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::AbortHandle;

/// Error types for the Store runtime
pub mod error {
    use thiserror::Error;

    /// Errors that can occur during Store operations
    #[derive(Error, Debug)]
    pub enum StoreError {
        /// Store is shutting down and not accepting new actions
        ///
        /// This error is returned when `send()` is called after shutdown initiated.
        #[error("Store is shutting down")]
        ShutdownInProgress,

        /// Shutdown timed out waiting for effects to complete
        ///
        /// Some effects were still running when the timeout elapsed.
        #[error("Shutdown timed out with {0} effects still running")]
        ShutdownTimeout(usize),

        /// Timeout waiting for terminal action
        ///
        /// Returned by `send_and_wait_for` when the timeout expires before
        /// a matching action is received.
        #[error("Timeout waiting for action")]
        Timeout,

        /// Action broadcast channel closed
        #[error("Action broadcast channel closed")]
        ChannelClosed,
    }
}

pub use error::StoreError;
pub use store::Store;

/// Guard that decrements an atomic counter on drop (for shutdown tracking)
struct AtomicCounterGuard(Arc<AtomicUsize>);

impl Drop for AtomicCounterGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A running cancellable effect
struct Registration {
    generation: u64,
    handle: AbortHandle,
}

type Registry = Arc<Mutex<HashMap<EffectId, Registration>>>;

/// Store module - The runtime for reducers
pub mod store {
    use super::{
        Arc, AtomicBool, AtomicCounterGuard, AtomicU64, AtomicUsize, BoxFuture, Duration, Effect,
        EffectId, HashMap, MutexGuard, Ordering, PoisonError, Reducer, Registration, Registry,
        RwLock, StoreError, join_all,
    };
    use tokio::sync::broadcast;

    /// The Store - runtime coordinator for a reducer
    ///
    /// The Store manages:
    /// 1. State (behind `RwLock`; every reduction holds the write lock)
    /// 2. Reducer (business logic)
    /// 3. Environment (injected dependencies)
    /// 4. Effect execution (with feedback loop and cancellation)
    ///
    /// Because the reducer runs to completion under the write lock, any
    /// check-and-set a reducer performs is atomic with respect to every other
    /// action, however the actions race.
    pub struct Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E>,
    {
        state: Arc<RwLock<S>>,
        reducer: Arc<R>,
        environment: Arc<E>,
        shutdown: Arc<AtomicBool>,
        pending_effects: Arc<AtomicUsize>,
        registry: Registry,
        generation: Arc<AtomicU64>,
        /// Every action produced by an effect is broadcast here after it has
        /// been reduced.
        action_broadcast: broadcast::Sender<A>,
    }

    impl<S, A, E, R> Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E> + Send + Sync + 'static,
        A: Send + Clone + 'static,
        S: Send + Sync + 'static,
        E: Send + Sync + 'static,
    {
        /// Create a new store with initial state, reducer, and environment
        ///
        /// The action broadcast capacity defaults to 64.
        #[must_use]
        pub fn new(initial_state: S, reducer: R, environment: E) -> Self {
            Self::with_broadcast_capacity(initial_state, reducer, environment, 64)
        }

        /// Create a new store with a custom action broadcast capacity
        #[must_use]
        pub fn with_broadcast_capacity(
            initial_state: S,
            reducer: R,
            environment: E,
            capacity: usize,
        ) -> Self {
            let (action_broadcast, _) = broadcast::channel(capacity.max(1));

            Self {
                state: Arc::new(RwLock::new(initial_state)),
                reducer: Arc::new(reducer),
                environment: Arc::new(environment),
                shutdown: Arc::new(AtomicBool::new(false)),
                pending_effects: Arc::new(AtomicUsize::new(0)),
                registry: Arc::new(std::sync::Mutex::new(HashMap::new())),
                generation: Arc::new(AtomicU64::new(0)),
                action_broadcast,
            }
        }

        /// Send an action to the store
        ///
        /// 1. Acquires the write lock on state
        /// 2. Calls the reducer with (state, action, environment)
        /// 3. Dispatches the returned effects before releasing the lock
        ///
        /// `send()` returns once effects are dispatched, not when they finish.
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::ShutdownInProgress`] if the store is shutting down.
        #[tracing::instrument(skip(self, action), name = "store_send")]
        pub async fn send(&self, action: A) -> Result<(), StoreError> {
            if self.shutdown.load(Ordering::Acquire) {
                tracing::warn!("Rejected action: store is shutting down");
                metrics::counter!("store.shutdown.rejected_actions").increment(1);
                return Err(StoreError::ShutdownInProgress);
            }

            metrics::counter!("store.commands.total").increment(1);

            let mut state = self.state.write().await;
            tracing::trace!("Acquired write lock on state");

            let effects = self.reducer.reduce(&mut *state, action, &self.environment);
            tracing::trace!("Reducer completed, returned {} effects", effects.len());

            // Dispatched under the lock so a cancellation always lands after the
            // registrations made by earlier reductions.
            for effect in effects {
                self.execute_effect(effect);
            }

            Ok(())
        }

        /// Send an action and wait for a matching action produced by effects
        ///
        /// Subscribes to the action broadcast before sending, so a fast effect
        /// cannot slip past the observer.
        ///
        /// # Errors
        ///
        /// - [`StoreError::Timeout`]: no matching action within `timeout`
        /// - [`StoreError::ChannelClosed`]: the broadcast channel closed
        /// - [`StoreError::ShutdownInProgress`]: the store is shutting down
        pub async fn send_and_wait_for<F>(
            &self,
            action: A,
            predicate: F,
            timeout: Duration,
        ) -> Result<A, StoreError>
        where
            F: Fn(&A) -> bool,
        {
            let mut rx = self.action_broadcast.subscribe();

            self.send(action).await?;

            tokio::time::timeout(timeout, async {
                loop {
                    match rx.recv().await {
                        Ok(action) if predicate(&action) => return Ok(action),
                        Ok(_) => {},
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "Action observer lagged");
                        },
                        Err(broadcast::error::RecvError::Closed) => {
                            return Err(StoreError::ChannelClosed);
                        },
                    }
                }
            })
            .await
            .map_err(|_| StoreError::Timeout)?
        }

        /// Subscribe to every action produced by effects
        #[must_use]
        pub fn subscribe_actions(&self) -> broadcast::Receiver<A> {
            self.action_broadcast.subscribe()
        }

        /// Read current state via a closure
        ///
        /// ```ignore
        /// let remaining = store.state(|s| s.timer.remaining()).await;
        /// ```
        pub async fn state<F, T>(&self, f: F) -> T
        where
            F: FnOnce(&S) -> T,
        {
            let state = self.state.read().await;
            f(&*state)
        }

        /// Number of effects currently running (including pending timers)
        #[must_use]
        pub fn pending_effects(&self) -> usize {
            self.pending_effects.load(Ordering::Acquire)
        }

        /// Returns `true` if a cancellable effect is registered under `id`
        #[must_use]
        pub fn is_registered(&self, id: EffectId) -> bool {
            self.lock_registry().contains_key(&id)
        }

        /// Stop accepting actions, abort cancellable effects and wait for the rest
        ///
        /// Network calls already in flight are left to finish; whatever they
        /// produce is dropped because the store no longer accepts actions.
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::ShutdownTimeout`] if effects are still running
        /// when `timeout` elapses.
        pub async fn shutdown(&self, timeout: Duration) -> Result<(), StoreError> {
            tracing::info!("Initiating store shutdown");
            self.shutdown.store(true, Ordering::Release);

            for (id, registration) in self.lock_registry().drain() {
                tracing::debug!(effect_id = %id, "Aborting cancellable effect on shutdown");
                registration.handle.abort();
            }

            let wait = async {
                while self.pending_effects.load(Ordering::Acquire) > 0 {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            };

            if tokio::time::timeout(timeout, wait).await.is_err() {
                let pending = self.pending_effects.load(Ordering::Acquire);
                tracing::error!(pending_effects = pending, "Shutdown timeout");
                return Err(StoreError::ShutdownTimeout(pending));
            }

            tracing::info!("Store shutdown complete");
            Ok(())
        }

        fn lock_registry(&self) -> MutexGuard<'_, HashMap<EffectId, Registration>> {
            self.registry.lock().unwrap_or_else(PoisonError::into_inner)
        }

        /// Execute an effect without waiting for it
        fn execute_effect(&self, effect: Effect<A>) {
            match effect {
                Effect::None => {
                    metrics::counter!("store.effects.executed", "type" => "none").increment(1);
                },
                Effect::Parallel(effects) => {
                    metrics::counter!("store.effects.executed", "type" => "parallel").increment(1);
                    for effect in effects {
                        self.execute_effect(effect);
                    }
                },
                Effect::Cancel(id) => {
                    metrics::counter!("store.effects.executed", "type" => "cancel").increment(1);
                    self.cancel(id);
                },
                Effect::Cancellable { id, effect } => {
                    metrics::counter!("store.effects.executed", "type" => "cancellable")
                        .increment(1);
                    self.spawn_cancellable(id, *effect);
                },
                effect => {
                    let store = self.clone();
                    self.spawn_tracked(store.run_effect(effect));
                },
            }
        }

        /// Run an effect to completion, feeding produced actions back
        fn run_effect(self, effect: Effect<A>) -> BoxFuture<'static, ()> {
            Box::pin(async move {
                match effect {
                    Effect::None => {},
                    Effect::Future(fut) => {
                        metrics::counter!("store.effects.executed", "type" => "future")
                            .increment(1);
                        if let Some(action) = fut.await {
                            self.feed_back(action).await;
                        }
                    },
                    Effect::Delay { duration, action } => {
                        metrics::counter!("store.effects.executed", "type" => "delay").increment(1);
                        tokio::time::sleep(duration).await;
                        self.feed_back(*action).await;
                    },
                    Effect::Parallel(effects) => {
                        join_all(effects.into_iter().map(|e| self.clone().run_effect(e))).await;
                    },
                    Effect::Sequential(effects) => {
                        metrics::counter!("store.effects.executed", "type" => "sequential")
                            .increment(1);
                        for effect in effects {
                            self.clone().run_effect(effect).await;
                        }
                    },
                    effect @ (Effect::Cancellable { .. } | Effect::Cancel(_)) => {
                        self.execute_effect(effect);
                    },
                }
            })
        }

        fn spawn_tracked<F>(&self, fut: F) -> tokio::task::JoinHandle<()>
        where
            F: std::future::Future<Output = ()> + Send + 'static,
        {
            self.pending_effects.fetch_add(1, Ordering::SeqCst);
            let guard = AtomicCounterGuard(Arc::clone(&self.pending_effects));

            tokio::spawn(async move {
                let _guard = guard;
                fut.await;
            })
        }

        /// Spawn an effect that can be aborted through its id
        ///
        /// The task deregisters itself as soon as its cancellable part (the
        /// sleep or future) finishes, before feeding the produced action back.
        /// A reduction triggered by that action may therefore register a new
        /// effect under the same id without aborting the task that delivered it.
        fn spawn_cancellable(&self, id: EffectId, effect: Effect<A>) {
            let generation = self.generation.fetch_add(1, Ordering::Relaxed);
            let store = self.clone();

            // Held across spawn so the task cannot deregister before it is registered.
            let mut registry = self.lock_registry();

            let task = self.spawn_tracked(async move {
                let produced = match effect {
                    Effect::Delay { duration, action } => {
                        tokio::time::sleep(duration).await;
                        Some(*action)
                    },
                    Effect::Future(fut) => fut.await,
                    other => {
                        store.clone().run_effect(other).await;
                        None
                    },
                };

                store.deregister(id, generation);

                if let Some(action) = produced {
                    store.feed_back(action).await;
                }
            });

            tracing::trace!(effect_id = %id, generation, "Registered cancellable effect");
            if let Some(previous) = registry.insert(
                id,
                Registration {
                    generation,
                    handle: task.abort_handle(),
                },
            ) {
                tracing::debug!(effect_id = %id, "Replacing running cancellable effect");
                previous.handle.abort();
            }
        }

        fn deregister(&self, id: EffectId, generation: u64) {
            let mut registry = self.lock_registry();
            if registry
                .get(&id)
                .is_some_and(|registration| registration.generation == generation)
            {
                registry.remove(&id);
            }
        }

        fn cancel(&self, id: EffectId) {
            if let Some(registration) = self.lock_registry().remove(&id) {
                tracing::debug!(effect_id = %id, "Cancelling effect");
                registration.handle.abort();
            } else {
                tracing::trace!(effect_id = %id, "Cancel requested for idle effect");
            }
        }

        /// Reduce an action produced by an effect, then announce it
        ///
        /// Observers only hear about an action once its reduction is visible
        /// in state; actions dropped during shutdown are never announced.
        async fn feed_back(&self, action: A) {
            let observed = action.clone();

            match self.send(action).await {
                Ok(()) => {
                    let _ = self.action_broadcast.send(observed);
                },
                Err(error) => {
                    tracing::debug!(error = %error, "Dropped action produced by effect");
                },
            }
        }
    }

    impl<S, A, E, R> Clone for Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E>,
    {
        fn clone(&self) -> Self {
            Self {
                state: Arc::clone(&self.state),
                reducer: Arc::clone(&self.reducer),
                environment: Arc::clone(&self.environment),
                shutdown: Arc::clone(&self.shutdown),
                pending_effects: Arc::clone(&self.pending_effects),
                registry: Arc::clone(&self.registry),
                generation: Arc::clone(&self.generation),
                action_broadcast: self.action_broadcast.clone(),
            }
        }
    }
}
