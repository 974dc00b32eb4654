use std::any::Any;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::task::{Context, Poll};
use std::thread::{self, JoinHandle};

use indexmap::set::IndexSet;

use tokio::sync::{broadcast, oneshot};

use tokio_util::sync::CancellationToken;

use tracing::{debug, error, info, warn};

use sensinact::notification::Notification;

use crate::config::GatewayConfig;
use crate::error::{Error, ErrorKind, Result};
use crate::nexus::ModelNexus;
use crate::scope::{Scope, Scopes};
use crate::twin::Twin;
use crate::whiteboard::WhiteboardService;

// A unit of work executed on the gateway thread.
//
// Dropping a job without running it fails its promise.
type Job = Box<dyn FnOnce(&mut Worker) + Send>;

/// The state of the gateway thread.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ThreadState {
    /// The thread has been spawned but it is not consuming commands yet.
    Created,
    /// The thread is consuming commands.
    Running,
    /// The thread has stopped.
    Stopped,
}

impl ThreadState {
    const fn from_u8(state: u8) -> Self {
        match state {
            0 => Self::Created,
            1 => Self::Running,
            _ => Self::Stopped,
        }
    }
}

fn shutdown_error() -> Error {
    Error::new(
        ErrorKind::Shutdown,
        "The gateway stopped before the command completed",
    )
}

fn panic_error(payload: &(dyn Any + Send)) -> Error {
    let message = payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown cause");
    Error::new(ErrorKind::Panic, format!("The command panicked: {message}"))
}

/// The eventual result of a command.
///
/// A [`Promise`] is a [`Future`], so it can be awaited. Callers outside an
/// asynchronous context use [`Promise::wait`] instead.
pub struct Promise<T> {
    receiver: oneshot::Receiver<Result<T>>,
    done: Arc<AtomicBool>,
    cancellation_token: CancellationToken,
}

impl<T> std::fmt::Debug for Promise<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Promise")
            .field("done", &self.is_done())
            .finish_non_exhaustive()
    }
}

impl<T> Promise<T> {
    fn pending() -> (Self, oneshot::Sender<Result<T>>) {
        let (sender, receiver) = oneshot::channel();
        let promise = Self {
            receiver,
            done: Arc::new(AtomicBool::new(false)),
            cancellation_token: CancellationToken::new(),
        };
        (promise, sender)
    }

    fn failed(error: Error) -> Self {
        let (promise, sender) = Self::pending();
        let _ = sender.send(Err(error));
        promise.done.store(true, Ordering::Release);
        promise
    }

    /// Checks whether the command has completed.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    /// Cancels the command if it has not started yet.
    ///
    /// A command already running always runs to completion.
    pub fn cancel(&self) {
        self.cancellation_token.cancel();
    }

    /// Blocks the current thread until the command completes.
    ///
    /// # Errors
    ///
    /// An error is returned when the command fails, it has been cancelled
    /// or the gateway stopped before running it.
    ///
    /// # Panics
    ///
    /// This function panics when called within an asynchronous execution
    /// context. Await the promise there.
    pub fn wait(self) -> Result<T> {
        self.receiver
            .blocking_recv()
            .unwrap_or_else(|_| Err(shutdown_error()))
    }
}

impl<T> Future for Promise<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|result| result.unwrap_or_else(|_| Err(shutdown_error())))
    }
}

// Marks a promise as done once its job has run or has been dropped.
struct DoneGuard(Arc<AtomicBool>);

impl Drop for DoneGuard {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Release);
    }
}

// The state owned by the gateway thread.
struct Worker {
    nexus: ModelNexus,
    scopes: Scopes,
    notifications: broadcast::Sender<Notification>,
}

impl Worker {
    // Every handle vended by the command is invalidated before the result
    // is returned.
    fn run<T>(&mut self, command: impl FnOnce(&mut ModelNexus, Scope) -> Result<T>) -> Result<T> {
        let scope = self.scopes.open();
        let nexus = &mut self.nexus;
        let result = panic::catch_unwind(AssertUnwindSafe(|| command(nexus, scope)))
            .unwrap_or_else(|payload| Err(panic_error(&*payload)));
        self.scopes.close();
        result
    }

    fn publish(&mut self) {
        for notification in self.nexus.take_notifications() {
            // No subscribers.
            if self.notifications.send(notification).is_err() {
                break;
            }
        }
    }
}

fn work(
    mut worker: Worker,
    receiver: flume::Receiver<Job>,
    state: Arc<AtomicU8>,
    stopping: CancellationToken,
    _done: flume::Sender<()>,
) {
    state.store(ThreadState::Running as u8, Ordering::Release);
    debug!("Gateway thread started");

    while let Ok(job) = receiver.recv() {
        if stopping.is_cancelled() {
            drop(job);
            continue;
        }
        job(&mut worker);
    }

    state.store(ThreadState::Stopped as u8, Ordering::Release);
    debug!("Gateway thread stopped");
}

/// The gateway thread.
///
/// Every access to the twin is a command executed on a single dedicated
/// thread, one command at a time and in submission order. A command never
/// observes the changes of another command in progress.
///
/// Handles obtained during a command are only valid until that command
/// completes.
#[derive(Debug)]
pub struct GatewayThread {
    sender: Option<flume::Sender<Job>>,
    done: flume::Receiver<()>,
    handle: Option<JoinHandle<()>>,
    state: Arc<AtomicU8>,
    stopping: CancellationToken,
    notifications: broadcast::Sender<Notification>,
    config: GatewayConfig,
}

impl GatewayThread {
    /// Starts a [`GatewayThread`].
    ///
    /// # Errors
    ///
    /// An error is returned when the configuration is invalid or the thread
    /// cannot be spawned.
    pub fn start(config: GatewayConfig) -> Result<Self> {
        config.validate()?;

        let (sender, receiver) = flume::bounded(config.queue_capacity);
        let (done_sender, done) = flume::bounded(1);
        let (notifications, _) = broadcast::channel(config.notification_capacity);
        let state = Arc::new(AtomicU8::new(ThreadState::Created as u8));
        let stopping = CancellationToken::new();

        let worker = Worker {
            nexus: ModelNexus::new(config.system_provider),
            scopes: Scopes::new(),
            notifications: notifications.clone(),
        };

        let handle = {
            let state = Arc::clone(&state);
            let stopping = stopping.clone();
            thread::Builder::new()
                .name(config.thread_name.clone())
                .spawn(move || work(worker, receiver, state, stopping, done_sender))
                .map_err(|e| {
                    Error::new(
                        ErrorKind::Thread,
                        format!("Impossible to spawn the gateway thread: {e}"),
                    )
                })?
        };

        info!("Gateway thread `{}` spawned", config.thread_name);

        Ok(Self {
            sender: Some(sender),
            done,
            handle: Some(handle),
            state,
            stopping,
            notifications,
            config,
        })
    }

    /// Returns the [`ThreadState`].
    #[must_use]
    pub fn state(&self) -> ThreadState {
        ThreadState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Returns the [`GatewayConfig`].
    #[must_use]
    pub const fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Subscribes to the changes applied to the twin.
    ///
    /// The notifications of a command are published once the command
    /// has completed.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.notifications.subscribe()
    }

    /// Executes a command on the twin.
    ///
    /// The command is queued and runs after every command submitted
    /// before it. The returned [`Promise`] resolves with the result of the
    /// command.
    ///
    /// Panics inside the command become a failed promise, and the gateway
    /// keeps running.
    pub fn execute<T, F>(&self, command: F) -> Promise<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Twin<'_>) -> Result<T> + Send + 'static,
    {
        self.submit(move |nexus, scope| command(&mut Twin::new(nexus, scope)))
    }

    /// Registers a [`WhiteboardService`].
    ///
    /// Missing models, services and resources served by the handlers are
    /// created.
    pub fn add_whiteboard_service(&self, service: WhiteboardService) -> Promise<()> {
        self.submit(move |nexus, _| nexus.register_whiteboard_service(service))
    }

    /// Restricts the handlers of a [`WhiteboardService`] to the given
    /// providers. An empty set serves every provider.
    ///
    /// The promise resolves to `false` when the service is not registered.
    pub fn update_whiteboard_service<I, S>(&self, service_id: u64, providers: I) -> Promise<bool>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let providers: IndexSet<String> = providers.into_iter().map(Into::into).collect();
        self.submit(move |nexus, _| Ok(nexus.update_whiteboard_service(service_id, &providers)))
    }

    /// Removes a [`WhiteboardService`].
    ///
    /// The promise resolves to `false` when the service is not registered.
    pub fn remove_whiteboard_service(&self, service_id: u64) -> Promise<bool> {
        self.submit(move |nexus, _| Ok(nexus.remove_whiteboard_service(service_id)))
    }

    fn submit<T, F>(&self, command: F) -> Promise<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut ModelNexus, Scope) -> Result<T> + Send + 'static,
    {
        let Some(sender) = &self.sender else {
            return Promise::failed(Error::new(
                ErrorKind::Shutdown,
                "The gateway is not running",
            ));
        };

        let (promise, result_sender) = Promise::pending();
        let done = DoneGuard(Arc::clone(&promise.done));
        let cancellation_token = promise.cancellation_token.clone();

        let job: Job = Box::new(move |worker: &mut Worker| {
            let result = if cancellation_token.is_cancelled() {
                Err(Error::new(
                    ErrorKind::Cancelled,
                    "The command has been cancelled before starting",
                ))
            } else {
                worker.run(command)
            };
            drop(done);
            let _ = result_sender.send(result);
            worker.publish();
        });

        match sender.try_send(job) {
            Ok(()) => promise,
            Err(flume::TrySendError::Full(_)) => Promise::failed(Error::new(
                ErrorKind::QueueFull,
                format!(
                    "The command queue is full: `{}` commands are waiting",
                    self.config.queue_capacity
                ),
            )),
            Err(flume::TrySendError::Disconnected(_)) => Promise::failed(Error::new(
                ErrorKind::Shutdown,
                "The gateway is not running",
            )),
        }
    }

    /// Stops the gateway.
    ///
    /// The command in progress runs to completion, while queued commands
    /// fail with [`ErrorKind::Shutdown`]. The twin is dropped along with the
    /// gateway thread.
    ///
    /// Stopping an already stopped gateway does nothing.
    pub fn deactivate(&mut self) {
        let Some(sender) = self.sender.take() else {
            return;
        };
        self.stopping.cancel();
        drop(sender);

        let Some(handle) = self.handle.take() else {
            return;
        };

        match self.done.recv_timeout(self.config.shutdown_timeout) {
            Err(flume::RecvTimeoutError::Timeout) => {
                warn!(
                    "Gateway thread `{}` still running after `{:?}`, detaching it",
                    self.config.thread_name, self.config.shutdown_timeout
                );
            }
            _ => {
                if handle.join().is_err() {
                    error!("Gateway thread `{}` panicked", self.config.thread_name);
                } else {
                    info!("Gateway thread `{}` stopped", self.config.thread_name);
                }
            }
        }
    }
}

impl Drop for GatewayThread {
    fn drop(&mut self) {
        self.deactivate();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicI64, Ordering};
    use std::sync::{Arc, Mutex};
    use std::thread;
    use std::time::Duration;

    use chrono::{TimeDelta, Utc};

    use indexmap::IndexMap;

    use serial_test::serial;

    use sensinact::notification::{Address, Notification};
    use sensinact::resource::ActionParameter;
    use sensinact::timed::{GetLevel, TimedValue};
    use sensinact::value::{DataType, Value};

    use crate::config::GatewayConfig;
    use crate::error::{Error, ErrorKind};
    use crate::model::{ModelBuilder, ResourceBuilder, ServiceBuilder};
    use crate::twin::Resource;
    use crate::whiteboard::{
        ActMethod, GetBinding, GetMethod, Param, ResourcePath, SetMethod, WhiteboardService,
    };

    use super::{GatewayThread, ThreadState};

    fn start(config: GatewayConfig) -> GatewayThread {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
        GatewayThread::start(config).unwrap()
    }

    fn gateway() -> GatewayThread {
        start(GatewayConfig::new().system_provider(false))
    }

    fn provider_model() -> ModelBuilder {
        ModelBuilder::new("providerModel").with_service(
            ServiceBuilder::new("bar").with_resource(
                ResourceBuilder::new("foobar")
                    .with_type(DataType::Int)
                    .with_initial_value(42),
            ),
        )
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn execute_commands() {
        let gateway = start(GatewayConfig::new());

        let created = gateway
            .execute(|twin| {
                let _ = twin.models()?.create_model(provider_model())?;
                let provider = twin.create_provider("providerModel", "providerFoo")?;
                Ok(provider.name()?.to_owned())
            })
            .await
            .unwrap();
        assert_eq!(created, "providerFoo");

        let value = gateway
            .execute(|twin| twin.resource_value::<i32>("providerFoo", "bar", "foobar"))
            .await
            .unwrap();
        assert_eq!(value.and_then(|value| value.value), Some(42));

        // The system provider exists from startup.
        let version = gateway
            .execute(|twin| twin.resource_value::<f64>("sensiNact", "system", "version"))
            .await
            .unwrap();
        assert_eq!(version.and_then(|value| value.value), Some(0.1));

        assert_eq!(gateway.state(), ThreadState::Running);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn handles_expire_with_their_command() {
        let gateway = gateway();

        let resource: Resource = gateway
            .execute(|twin| {
                let _ = twin.models()?.create_model(provider_model())?;
                let _ = twin.create_provider("providerModel", "providerFoo")?;
                twin.resource("providerFoo", "bar", "foobar")?
                    .ok_or_else(|| Error::new(ErrorKind::NotFound, "foobar"))
            })
            .await
            .unwrap();
        assert!(!resource.is_valid());

        // Wrong: the handle belongs to a completed command.
        let error = gateway
            .execute(move |twin| resource.get_value::<i32>(twin, GetLevel::Weak))
            .await
            .map_err(|e| e.kind());
        assert_eq!(error, Err(ErrorKind::InvalidHandle));

        // A fresh handle works.
        let value = gateway
            .execute(|twin| {
                let resource = twin
                    .resource("providerFoo", "bar", "foobar")?
                    .ok_or_else(|| Error::new(ErrorKind::NotFound, "foobar"))?;
                resource.get_value::<i32>(twin, GetLevel::Weak)
            })
            .await
            .unwrap();
        assert_eq!(value.value, Some(42));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn failures_do_not_stop_the_thread() {
        let gateway = gateway();

        assert_eq!(
            gateway
                .execute(|twin| twin.create_provider("missingModel", "provider"))
                .await
                .map(|_| ())
                .map_err(|e| e.kind()),
            Err(ErrorKind::NotFound)
        );

        assert_eq!(
            gateway
                .execute(|_| -> crate::error::Result<()> { panic!("broken command") })
                .await,
            Err(Error::new(
                ErrorKind::Panic,
                "The command panicked: broken command"
            ))
        );

        // The next command still runs.
        assert_eq!(gateway.execute(|_| Ok(7)).await, Ok(7));
    }

    #[test]
    #[serial]
    fn commands_run_in_order() {
        let gateway = gateway();
        let order = Arc::new(Mutex::new(Vec::new()));

        let first = {
            let order = Arc::clone(&order);
            gateway.execute(move |_| {
                thread::sleep(Duration::from_millis(200));
                order.lock().unwrap().push(1);
                Ok(())
            })
        };
        let second = {
            let order = Arc::clone(&order);
            gateway.execute(move |_| {
                order.lock().unwrap().push(2);
                Ok(())
            })
        };

        // The second command waits for the first one.
        assert!(!second.is_done());
        second.wait().unwrap();
        assert!(first.is_done());
        first.wait().unwrap();

        assert_eq!(*order.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    #[serial]
    fn cancel_and_full_queue() {
        let mut gateway = start(GatewayConfig::new().system_provider(false).queue_capacity(1));
        let (started_sender, started) = flume::bounded(1);

        let blocking = gateway.execute(move |_| {
            let _ = started_sender.send(());
            thread::sleep(Duration::from_millis(200));
            Ok(1)
        });
        started.recv().unwrap();

        let queued = gateway.execute(|_| Ok(2));

        // Wrong: the queue holds a single command.
        assert_eq!(
            gateway.execute(|_| Ok(3)).wait().map_err(|e| e.kind()),
            Err(ErrorKind::QueueFull)
        );

        queued.cancel();
        assert_eq!(blocking.wait(), Ok(1));
        assert_eq!(
            queued.wait().map_err(|e| e.kind()),
            Err(ErrorKind::Cancelled)
        );

        gateway.deactivate();
    }

    #[test]
    #[serial]
    fn deactivate() {
        let mut gateway = start(
            GatewayConfig::new()
                .system_provider(false)
                .shutdown_timeout(Duration::from_secs(2)),
        );
        let (started_sender, started) = flume::bounded(1);

        let running = gateway.execute(move |_| {
            let _ = started_sender.send(());
            thread::sleep(Duration::from_millis(200));
            Ok("done")
        });
        started.recv().unwrap();
        let queued = gateway.execute(|_| Ok("never"));

        gateway.deactivate();
        assert_eq!(gateway.state(), ThreadState::Stopped);

        // The running command completes, the queued one is rejected.
        assert!(running.is_done());
        assert!(queued.is_done());
        assert_eq!(running.wait(), Ok("done"));
        assert_eq!(
            queued.wait().map_err(|e| e.kind()),
            Err(ErrorKind::Shutdown)
        );
        assert_eq!(
            gateway.execute(|_| Ok(())).wait(),
            Err(Error::new(ErrorKind::Shutdown, "The gateway is not running"))
        );

        // Stopping twice does nothing.
        gateway.deactivate();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn actions() {
        let gateway = gateway();

        gateway
            .add_whiteboard_service(
                WhiteboardService::new(1)
                    .act(
                        ActMethod::new(|call| {
                            let count: i64 = call.arg(0)?;
                            let label: String = call.arg(1)?;
                            Ok(Some(Value::from(format!("{label}:{count}"))))
                        })
                        .param(Param::named("count", DataType::Int))
                        .param(Param::named("label", DataType::String))
                        .returns(DataType::String)
                        .bind(ResourcePath::new("actModel", "control", "describe")),
                    )
                    .act(
                        ActMethod::new(|_| Ok(Some(Value::from(42))))
                            .returns(DataType::Int)
                            .bind(ResourcePath::new("actModel", "control", "constant")),
                    )
                    .act(
                        ActMethod::new(|call| {
                            let value: i64 = call.arg(0)?;
                            Ok(Some(Value::from(value * 2)))
                        })
                        .param(Param::positional(DataType::Int))
                        .returns(DataType::Int)
                        .bind(ResourcePath::new("actModel", "control", "double")),
                    ),
            )
            .await
            .unwrap();

        let (constant, described, doubled, parameters) = gateway
            .execute(|twin| {
                let _ = twin.create_provider("actModel", "actor")?;
                let constant = twin
                    .resource("actor", "control", "constant")?
                    .ok_or_else(|| Error::new(ErrorKind::NotFound, "constant"))?
                    .act(twin, IndexMap::<String, Value>::new())?;
                let describe = twin
                    .resource("actor", "control", "describe")?
                    .ok_or_else(|| Error::new(ErrorKind::NotFound, "describe"))?;
                let double = twin
                    .resource("actor", "control", "double")?
                    .ok_or_else(|| Error::new(ErrorKind::NotFound, "double"))?;

                // Arguments are converted to the declared types.
                let described = describe.act(
                    twin,
                    [("label", Value::from("lamp")), ("count", Value::from("3"))],
                )?;
                let doubled = double.act(twin, [("arg0", Value::from(21))])?;
                Ok((constant, described, doubled, describe.arguments()?.to_vec()))
            })
            .await
            .unwrap();

        assert_eq!(constant, Some(Value::Int(42)));
        assert_eq!(described, Some(Value::from("lamp:3")));
        assert_eq!(doubled, Some(Value::Int(42)));
        assert_eq!(
            parameters,
            vec![
                ActionParameter::new("count", DataType::Int),
                ActionParameter::new("label", DataType::String),
            ]
        );

        // Wrong: a missing argument.
        assert_eq!(
            gateway
                .execute(|twin| {
                    let double = twin
                        .resource("actor", "control", "double")?
                        .ok_or_else(|| Error::new(ErrorKind::NotFound, "double"))?;
                    double.act(twin, IndexMap::<String, Value>::new())
                })
                .await
                .map_err(|e| e.kind()),
            Err(ErrorKind::InvalidArgument)
        );

        // Without handlers, the action fails.
        assert!(gateway.remove_whiteboard_service(1).await.unwrap());
        assert_eq!(
            gateway
                .execute(|twin| {
                    let double = twin
                        .resource("actor", "control", "double")?
                        .ok_or_else(|| Error::new(ErrorKind::NotFound, "double"))?;
                    double.act(twin, [("arg0", Value::from(1))])
                })
                .await,
            Err(Error::new(
                ErrorKind::Handler,
                "No suitable whiteboard handler for `actModel/actor/control/double`"
            ))
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn pull_values() {
        let gateway = gateway();

        gateway
            .add_whiteboard_service(
                WhiteboardService::new(1).get(
                    GetMethod::new(|call| {
                        let cached = call.cached.clone().typed::<i64>()?.value;
                        let value = cached.map_or(1, |cached| cached * 2);
                        Ok(TimedValue::new(Value::from(value), Utc::now()))
                    })
                    .returns(DataType::Int)
                    .bind(
                        GetBinding::new(ResourcePath::new("pullModel", "data", "counter"))
                            .cache(Duration::from_secs(60)),
                    ),
                ),
            )
            .await
            .unwrap();

        let values = gateway
            .execute(|twin| {
                let _ = twin.create_provider("pullModel", "puller")?;
                let counter = twin
                    .resource("puller", "data", "counter")?
                    .ok_or_else(|| Error::new(ErrorKind::NotFound, "counter"))?;

                // Nothing cached yet: the getter is called.
                let first = counter.get_value::<i64>(twin, GetLevel::Normal)?.value;

                counter.set_value(twin, 42, None)?;
                let weak = counter.get_value::<i64>(twin, GetLevel::Weak)?.value;
                // The cached value is still fresh.
                let normal = counter.get_value::<i64>(twin, GetLevel::Normal)?.value;
                let strong = counter.get_value::<i64>(twin, GetLevel::Strong)?.value;
                let after = counter.get_value::<i64>(twin, GetLevel::Weak)?.value;
                Ok(vec![first, weak, normal, strong, after])
            })
            .await
            .unwrap();

        assert_eq!(
            values,
            vec![Some(1), Some(42), Some(42), Some(84), Some(84)]
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn failing_handlers() {
        let gateway = gateway();

        gateway
            .add_whiteboard_service(
                WhiteboardService::new(1)
                    .get(
                        GetMethod::new(|_| Err(Error::handler("boom")))
                            .returns(DataType::Int)
                            .bind(GetBinding::new(ResourcePath::new(
                                "pullModel", "data", "failing",
                            ))),
                    )
                    .get(
                        GetMethod::new(|_| panic!("handler panic"))
                            .returns(DataType::Int)
                            .bind(GetBinding::new(ResourcePath::new(
                                "pullModel", "data", "panicking",
                            ))),
                    ),
            )
            .await
            .unwrap();
        gateway
            .execute(|twin| twin.create_provider("pullModel", "puller").map(|_| ()))
            .await
            .unwrap();

        let read = |name: &'static str| {
            gateway.execute(move |twin| {
                twin.resource("puller", "data", name)?
                    .ok_or_else(|| Error::new(ErrorKind::NotFound, name))?
                    .get_value::<i64>(twin, GetLevel::Strong)
            })
        };

        assert_eq!(read("failing").await, Err(Error::handler("boom")));
        assert_eq!(
            read("panicking").await,
            Err(Error::new(
                ErrorKind::Panic,
                "The command panicked: handler panic"
            ))
        );

        // The gateway keeps serving commands.
        assert_eq!(
            gateway
                .execute(|twin| twin.provider("puller").map(|provider| provider.is_some()))
                .await,
            Ok(true)
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    #[serial]
    async fn cache_expiration() {
        let gateway = gateway();
        let pulls = Arc::new(AtomicI64::new(0));

        let counter = Arc::clone(&pulls);
        gateway
            .add_whiteboard_service(
                WhiteboardService::new(1).get(
                    GetMethod::new(move |_| {
                        let pull = counter.fetch_add(1, Ordering::SeqCst) + 1;
                        Ok(TimedValue::new(Value::from(pull), Utc::now()))
                    })
                    .returns(DataType::Int)
                    .bind(
                        GetBinding::new(ResourcePath::new("pullModel", "data", "pulls"))
                            .cache(Duration::from_secs(1)),
                    ),
                ),
            )
            .await
            .unwrap();
        gateway
            .execute(|twin| twin.create_provider("pullModel", "puller").map(|_| ()))
            .await
            .unwrap();

        let read = |level| {
            gateway.execute(move |twin| {
                twin.resource("puller", "data", "pulls")?
                    .ok_or_else(|| Error::new(ErrorKind::NotFound, "pulls"))?
                    .get_value::<i64>(twin, level)
            })
        };

        let first = read(GetLevel::Normal).await.unwrap();
        let second = read(GetLevel::Normal).await.unwrap();
        assert_eq!(first.value, Some(1));
        assert_eq!(first, second);

        tokio::time::sleep(Duration::from_millis(1100)).await;

        // An expired value is not refreshed by a weak read.
        assert_eq!(read(GetLevel::Weak).await.unwrap(), first);

        let third = read(GetLevel::Normal).await.unwrap();
        assert_eq!(third.value, Some(2));
        assert!(third.timestamp > first.timestamp);

        // A strong read always pulls.
        assert_eq!(read(GetLevel::Strong).await.unwrap().value, Some(3));
        assert_eq!(pulls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn push_values() {
        let gateway = gateway();

        gateway
            .add_whiteboard_service(
                WhiteboardService::new(1).set(
                    SetMethod::new(|call| {
                        let value = match call.cached.value() {
                            Some(cached) => Some(Value::from(format!("resource:{cached}"))),
                            None => call.new_value.value.clone(),
                        };
                        Ok(TimedValue::from_parts(value, call.new_value.timestamp))
                    })
                    .returns(DataType::String)
                    .bind(ResourcePath::new("pushModel", "data", "text")),
                ),
            )
            .await
            .unwrap();

        let first = Utc::now();
        let second = first + TimeDelta::seconds(1);
        let (value, metadata) = gateway
            .execute(move |twin| {
                let _ = twin.create_provider("pushModel", "pusher")?;
                let text = twin
                    .resource("pusher", "data", "text")?
                    .ok_or_else(|| Error::new(ErrorKind::NotFound, "text"))?;

                text.set_value(twin, "toto", Some(first))?;
                text.set_value(twin, "titi", Some(second))?;

                // No getter: the cached value is returned.
                let value = text.get_value::<String>(twin, GetLevel::Strong)?;
                Ok((value, text.metadata_values(twin)?))
            })
            .await
            .unwrap();

        assert_eq!(value, TimedValue::new("resource:toto".to_owned(), second));
        assert_eq!(metadata.get("externalSet"), Some(&Some(Value::Bool(true))));
        assert_eq!(metadata.get("externalGet"), Some(&Some(Value::Bool(false))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn notifications() {
        let gateway = gateway();
        let mut notifications = gateway.subscribe();

        let created = Utc::now();
        gateway
            .execute(move |twin| {
                let _ = twin.models()?.create_model(provider_model())?;
                let _ = twin.create_provider_at("providerModel", "providerFoo", created)?;
                Ok(())
            })
            .await
            .unwrap();

        assert_eq!(
            notifications.recv().await.unwrap(),
            Notification::ProviderAdded {
                address: Address::provider(
                    "https://eclipse.org/sensinact/providerModel",
                    "providerModel",
                    "providerFoo"
                ),
                timestamp: created,
            }
        );

        // Every following notification concerns the new provider.
        while let Ok(notification) = notifications.try_recv() {
            assert_eq!(notification.address().provider, "providerFoo");
        }
    }
}
