use std::{
    future::Future,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard,
    },
    time::Duration,
};

use shared::{
    domain::{ComponentId, Params, Term},
    protocol::{CommandResponse, OperationSpec},
};
use tokio::{runtime::Handle, task::JoinHandle};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

pub mod command_queue;
pub mod config;
pub mod error;
pub mod events;
pub mod handler;
pub mod host;
pub mod prefetch;
pub mod registry;
pub mod transport;

pub use command_queue::{Command, CommandQueue, FailureOutcome};
pub use config::{load_settings, CommandRetryPolicy, RuntimeSettings};
pub use error::{RuntimeError, SettingsError, TransportError};
pub use events::{EventOutcome, EventRoute, Modifiers, MouseButton, OperationSpecNode, UiEvent};
pub use handler::{ActionHandler, ActionResult, HandlerRegistry, NextOperation};
pub use host::{LogNavigator, LogRenderer, Navigator, Renderer, RouteResolver, RouteTable};
pub use prefetch::{DomNode, NavigationOutcome, PrefetchCache, PrefetchEntry, PrefetchOutcome};
pub use registry::{ComponentEntry, ComponentRegistry, EntryPatch};
pub use transport::{DisconnectedTransport, HttpTransport, Transport};

/// A local state transition addressed to one mounted component.
#[derive(Debug, Clone, PartialEq)]
pub struct Action {
    pub name: String,
    pub params: Params,
    pub target: ComponentId,
}

impl Action {
    pub fn new(name: impl Into<String>, params: Params, target: ComponentId) -> Self {
        Self {
            name: name.into(),
            params,
            target,
        }
    }

    /// Resolves a spec whose target may be omitted. Omitted targets fall back
    /// to `default_target`.
    pub fn from_spec(spec: OperationSpec, default_target: &ComponentId) -> Self {
        Self {
            target: spec.target.unwrap_or_else(|| default_target.clone()),
            name: spec.name,
            params: spec.params,
        }
    }
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

pub struct RuntimeBuilder {
    settings: RuntimeSettings,
    handlers: HandlerRegistry,
    transport: Arc<dyn Transport>,
    renderer: Arc<dyn Renderer>,
    navigator: Arc<dyn Navigator>,
    routes: Option<Arc<dyn RouteResolver>>,
}

impl RuntimeBuilder {
    pub fn new(settings: RuntimeSettings) -> Self {
        Self {
            settings,
            handlers: HandlerRegistry::new(),
            transport: Arc::new(DisconnectedTransport),
            renderer: Arc::new(LogRenderer),
            navigator: Arc::new(LogNavigator),
            routes: None,
        }
    }

    pub fn handlers(mut self, handlers: HandlerRegistry) -> Self {
        self.handlers = handlers;
        self
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = transport;
        self
    }

    pub fn renderer(mut self, renderer: Arc<dyn Renderer>) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn navigator(mut self, navigator: Arc<dyn Navigator>) -> Self {
        self.navigator = navigator;
        self
    }

    /// Overrides the route table built from `settings.routes`.
    pub fn route_resolver(mut self, routes: Arc<dyn RouteResolver>) -> Self {
        self.routes = Some(routes);
        self
    }

    /// Must be called from within a tokio runtime; transport work is spawned
    /// onto it.
    pub fn build(self) -> Result<Runtime, RuntimeError> {
        let handle = Handle::try_current().map_err(|_| RuntimeError::NoAsyncRuntime)?;
        let routes = self
            .routes
            .unwrap_or_else(|| Arc::new(RouteTable::from_settings(&self.settings.routes)));

        let inner = Arc::new(RuntimeInner {
            registry: RwLock::new(ComponentRegistry::new()),
            queue: Mutex::new(CommandQueue::new(self.settings.max_command_attempts)),
            prefetch: Mutex::new(PrefetchCache::new(self.settings.prefetch_timeout())),
            handlers: self.handlers,
            transport: self.transport,
            renderer: self.renderer,
            navigator: self.navigator,
            routes,
            dispatch: Mutex::new(()),
            tasks: Mutex::new(Vec::new()),
            settling: AtomicUsize::new(0),
            retry_timer: Mutex::new(None),
            handle,
            settings: self.settings,
        });

        let runtime = Runtime { inner };
        if let CommandRetryPolicy::Interval { period_ms } = runtime.inner.settings.command_retry {
            runtime.start_retry_timer(Duration::from_millis(period_ms.max(1)));
        }

        info!(
            handlers = runtime.inner.handlers.len(),
            retry = ?runtime.inner.settings.command_retry,
            "client runtime ready"
        );
        Ok(runtime)
    }
}

pub(crate) struct RuntimeInner {
    pub(crate) settings: RuntimeSettings,
    pub(crate) registry: RwLock<ComponentRegistry>,
    pub(crate) queue: Mutex<CommandQueue>,
    pub(crate) prefetch: Mutex<PrefetchCache>,
    pub(crate) handlers: HandlerRegistry,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) renderer: Arc<dyn Renderer>,
    pub(crate) navigator: Arc<dyn Navigator>,
    pub(crate) routes: Arc<dyn RouteResolver>,
    /// Held for a whole action chain plus its render.
    dispatch: Mutex<()>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    /// Number of `settle` calls in progress; the retry timer idles meanwhile.
    settling: AtomicUsize,
    retry_timer: Mutex<Option<JoinHandle<()>>>,
    handle: Handle,
}

impl Drop for RuntimeInner {
    fn drop(&mut self) {
        if let Some(timer) = lock(&self.retry_timer).take() {
            timer.abort();
        }
    }
}

/// Cheap-to-clone handle over the registry, command queue and prefetch cache.
///
/// Action chains are serialized by a dispatch lock, whether they come from
/// the host or from a command response running on another worker thread.
/// No lock is ever held across an await point.
#[derive(Clone)]
pub struct Runtime {
    pub(crate) inner: Arc<RuntimeInner>,
}

impl Runtime {
    pub fn builder(settings: RuntimeSettings) -> RuntimeBuilder {
        RuntimeBuilder::new(settings)
    }

    pub fn settings(&self) -> &RuntimeSettings {
        &self.inner.settings
    }

    // Registry access.

    pub fn hydrate(&self, entries: impl IntoIterator<Item = (ComponentId, ComponentEntry)>) {
        write(&self.inner.registry).hydrate(entries);
    }

    pub fn mount(&self, cid: ComponentId, entry: ComponentEntry) {
        write(&self.inner.registry).set(cid, entry);
    }

    pub fn unmount(&self, cid: &ComponentId) -> Option<ComponentEntry> {
        write(&self.inner.registry).remove(cid)
    }

    pub fn get_entry(&self, cid: &ComponentId) -> Option<ComponentEntry> {
        read(&self.inner.registry).get(cid).cloned()
    }

    pub fn get_state(&self, cid: &ComponentId) -> Option<Term> {
        read(&self.inner.registry).get_state(cid).cloned()
    }

    pub fn get_emitted_context(&self, cid: &ComponentId) -> Option<Params> {
        read(&self.inner.registry).get_emitted_context(cid).cloned()
    }

    pub fn with_registry<R>(&self, f: impl FnOnce(&ComponentRegistry) -> R) -> R {
        f(&read(&self.inner.registry))
    }

    // Queue introspection.

    pub fn queue_size(&self) -> usize {
        lock(&self.inner.queue).size()
    }

    pub fn next_pending_command(&self) -> Option<Command> {
        lock(&self.inner.queue).get_next_pending().cloned()
    }

    pub fn commands(&self) -> Vec<Command> {
        lock(&self.inner.queue).items().to_vec()
    }

    pub fn with_prefetch_cache<R>(&self, f: impl FnOnce(&mut PrefetchCache) -> R) -> R {
        f(&mut lock(&self.inner.prefetch))
    }

    // Dispatch.

    /// Runs `action` and any chained actions, then renders once. A chain that
    /// ends in a command enqueues it and processes the queue.
    pub fn execute_action(&self, action: Action) -> Result<(), RuntimeError> {
        let _dispatch = lock(&self.inner.dispatch);
        self.run_action_chain(action)?;
        self.render();
        Ok(())
    }

    fn run_action_chain(&self, action: Action) -> Result<(), RuntimeError> {
        let limit = self.inner.settings.max_action_chain_depth;
        let mut current = action;
        let mut steps = 0usize;

        loop {
            steps += 1;
            if steps > limit {
                return Err(RuntimeError::ActionChainTooDeep {
                    limit,
                    action: current.name,
                    target: current.target,
                });
            }

            match self.apply_action(&current)? {
                None => return Ok(()),
                Some(NextOperation::Action(spec)) => {
                    current = Action::from_spec(spec, &current.target);
                }
                Some(NextOperation::Command(spec)) => {
                    let target = spec.target.clone().unwrap_or(current.target);
                    self.enqueue_command(spec, target)?;
                    self.process_commands();
                    return Ok(());
                }
            }
        }
    }

    /// One handler step: invoke, then replace state and emitted context.
    fn apply_action(&self, action: &Action) -> Result<Option<NextOperation>, RuntimeError> {
        let (module, state, params) = {
            let registry = read(&self.inner.registry);
            let entry = registry
                .get(&action.target)
                .ok_or_else(|| RuntimeError::ComponentNotFound(action.target.clone()))?;
            let mut params = registry.visible_context(&action.target);
            params.extend(action.params.iter().map(|(k, v)| (k.clone(), v.clone())));
            (entry.module.clone(), entry.state.clone(), params)
        };

        let handler = self
            .inner
            .handlers
            .get(&module)
            .ok_or_else(|| RuntimeError::HandlerNotFound(module.clone()))?;

        debug!(cid = %action.target, module = %module, action = %action.name, "executing action");
        let result = handler
            .invoke(&action.name, &state, &params)
            .map_err(|source| RuntimeError::Handler {
                module: module.clone(),
                action: action.name.clone(),
                source,
            })?;

        let stored = write(&self.inner.registry).merge(
            &action.target,
            EntryPatch {
                module: None,
                state: Some(result.new_state),
                emitted_context: Some(result.emitted_context),
            },
        );
        if !stored {
            return Err(RuntimeError::ComponentNotFound(action.target.clone()));
        }

        Ok(result.next)
    }

    fn render(&self) {
        let snapshot = read(&self.inner.registry).clone();
        self.inner.renderer.render(&snapshot);
    }

    /// Enqueues a command built from `spec` (target already resolved) and
    /// processes the queue once. Nothing is rendered.
    pub fn execute_command(&self, spec: OperationSpec, target: ComponentId) -> Result<Uuid, RuntimeError> {
        let id = self.enqueue_command(spec, target)?;
        self.process_commands();
        Ok(id)
    }

    fn enqueue_command(&self, spec: OperationSpec, target: ComponentId) -> Result<Uuid, RuntimeError> {
        let module = read(&self.inner.registry)
            .get(&target)
            .map(|entry| entry.module.clone())
            .ok_or_else(|| RuntimeError::ComponentNotFound(target.clone()))?;

        let command = Command::new(module, spec.name, spec.params, target);
        let id = command.id;
        debug!(command_id = %id, name = %command.name, cid = %command.target, "enqueued command");
        lock(&self.inner.queue).push(command);
        Ok(id)
    }

    /// Sends every pending command. No-op while the transport is disconnected.
    pub fn process_commands(&self) {
        if !self.inner.transport.is_connected() {
            debug!(queued = self.queue_size(), "transport disconnected, commands stay pending");
            return;
        }

        let payloads = lock(&self.inner.queue).take_pending();
        for payload in payloads {
            let runtime = self.clone();
            self.spawn(async move {
                let id = payload.id;
                let target = payload.target.clone();
                match runtime.inner.transport.send_command(payload).await {
                    Ok(response) => runtime.on_command_success(id, target, response),
                    Err(err) => runtime.on_command_failure(id, &err),
                }
            });
        }
    }

    /// Returns commands parked by `max_command_attempts` to pending and
    /// processes the queue.
    pub fn retry_failed_commands(&self) -> usize {
        let revived = lock(&self.inner.queue).retry_failed();
        if revived > 0 {
            self.process_commands();
        }
        revived
    }

    fn on_command_success(&self, id: Uuid, target: ComponentId, response: CommandResponse) {
        lock(&self.inner.queue).complete(id);
        debug!(command_id = %id, "command acknowledged");

        if let Some(next) = response.next_action {
            let action = Action::from_spec(next, &target);
            if let Err(err) = self.execute_action(action) {
                error!(command_id = %id, error = %err, "failed to apply command response");
            }
        }
    }

    fn on_command_failure(&self, id: Uuid, err: &TransportError) {
        let outcome = lock(&self.inner.queue).fail(id);
        match outcome {
            FailureOutcome::Requeued { fail_count } => {
                warn!(command_id = %id, fail_count, error = %err, "command failed, will retry");
            }
            FailureOutcome::Exhausted { fail_count } => {
                error!(command_id = %id, fail_count, error = %err, "command failed, giving up");
            }
            FailureOutcome::Unknown => {
                debug!(command_id = %id, "failure reported for a command no longer queued");
            }
        }
    }

    // Background work.

    pub(crate) fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let task = self.inner.handle.spawn(future);
        let mut tasks = lock(&self.inner.tasks);
        tasks.retain(|task| !task.is_finished());
        tasks.push(task);
    }

    fn start_retry_timer(&self, period: Duration) {
        let weak = Arc::downgrade(&self.inner);
        let timer = self.inner.handle.spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                if inner.settling.load(Ordering::SeqCst) > 0 {
                    continue;
                }
                Runtime { inner }.process_commands();
            }
        });
        *lock(&self.inner.retry_timer) = Some(timer);
    }

    /// Waits until every spawned transport task, including tasks spawned by
    /// their completions, has finished. The retry timer skips its ticks until
    /// this returns, so a transport that keeps failing cannot keep it busy.
    pub async fn settle(&self) {
        let _settling = SettlingGuard::enter(&self.inner.settling);
        loop {
            let pending: Vec<JoinHandle<()>> = lock(&self.inner.tasks).drain(..).collect();
            if pending.is_empty() {
                return;
            }
            for result in futures::future::join_all(pending).await {
                if let Err(err) = result {
                    error!(error = %err, "runtime task failed");
                }
            }
        }
    }
}

struct SettlingGuard<'a>(&'a AtomicUsize);

impl<'a> SettlingGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for SettlingGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
#[path = "tests/support.rs"]
pub(crate) mod test_support;

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
