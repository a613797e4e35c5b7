//! Daemon wiring.
//!
//! [`Daemon`] owns the shared queues and builds the two workers around them: the
//! [`Scheduler`] (on its own thread) and the [`CommandProcessor`] (on the caller's
//! thread). [`run`] is the whole process: config → backend → socket → serve until quit.

use crate::clock::Clock;
use crate::command::{CommandChannel, CommandProcessor};
use crate::config::DaemonConfig;
use crate::device::DigitalPort;
use crate::error::{ChannelError, Result};
use crate::event::Event;
use crate::queues::EventQueues;
use crate::scheduler::Scheduler;
use crate::snapshot::DeviceStatus;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{error, info, warn};

pub struct Daemon {
    queues: Arc<EventQueues>,
    clock: Arc<dyn Clock>,
    processor: CommandProcessor,
    scheduler: Option<Scheduler>,
    worker: Option<JoinHandle<()>>,
}

impl Daemon {
    pub fn new(config: &DaemonConfig, port: Box<dyn DigitalPort>, clock: Arc<dyn Clock>) -> Self {
        let queues = Arc::new(EventQueues::new(config.input_queue_capacity));
        queues.publish_device_status(DeviceStatus {
            backend: port.name().to_string(),
            config: config.port.config.clone(),
            ..DeviceStatus::default()
        });
        let scheduler = Scheduler::new(
            port,
            Arc::clone(&queues),
            Arc::clone(&clock),
            config.port.config.clone(),
        )
        .with_poll_interval(config.poll_interval());
        let processor = CommandProcessor::new(Arc::clone(&queues), Arc::clone(&clock));

        Self {
            queues,
            clock,
            processor,
            scheduler: Some(scheduler),
            worker: None,
        }
    }

    pub fn queues(&self) -> Arc<EventQueues> {
        Arc::clone(&self.queues)
    }

    pub fn processor(&self) -> &CommandProcessor {
        &self.processor
    }

    /// Start the scheduler thread. Does nothing if it is already running.
    pub fn spawn_scheduler(&mut self) -> Result<()> {
        if let Some(scheduler) = self.scheduler.take() {
            let handle = thread::Builder::new()
                .name("digio-scheduler".to_string())
                .spawn(move || scheduler.run())?;
            self.worker = Some(handle);
        }
        Ok(())
    }

    /// Answer commands on `channel` until a `quit` has been carried out.
    ///
    /// If every controller disconnects first, a quit is scheduled on their behalf.
    pub fn serve(mut self, channel: &mut dyn CommandChannel) -> Result<()> {
        self.spawn_scheduler()?;

        match self.processor.serve(channel) {
            Ok(()) => {}
            Err(ChannelError::Disconnected) => {
                warn!("all controllers disconnected, stopping");
                self.queues.push_output_sorted(Event::quit(self.clock.now()));
            }
            Err(e) => {
                error!(error = %e, "command channel failed, stopping");
                self.queues.push_output_sorted(Event::quit(self.clock.now()));
                self.join();
                return Err(e.into());
            }
        }
        self.join();
        Ok(())
    }

    fn join(&mut self) {
        if let Some(handle) = self.worker.take() {
            if handle.join().is_err() {
                error!("scheduler thread panicked");
            }
        }
    }
}

/// Run the daemon described by `config` until a controller sends `quit`.
#[cfg(unix)]
pub fn run(config: &DaemonConfig) -> Result<()> {
    use crate::backends::open_port;
    use crate::channel::request_channel;
    use crate::clock::MonotonicClock;
    use crate::transport::SocketServer;

    config.validate()?;
    let port = open_port(&config.port)?;
    let daemon = Daemon::new(config, port, Arc::new(MonotonicClock::new()));

    let server = SocketServer::bind(&config.socket_path)?;
    let socket = server.path().to_path_buf();
    let (controller, mut receiver) = request_channel();
    server.spawn(controller)?;

    let result = daemon.serve(&mut receiver);
    let _ = std::fs::remove_file(&socket);
    info!("daemon exited");
    result
}
