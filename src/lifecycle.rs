//! Bring-up, teardown, and the power-off singleton.
//!
//! Mapping bus registers and enabling slave mode (clock divider, address,
//! delay count, new-slave bit) is out of scope — that is the caller's bus
//! glue. This module builds the pieces the core needs ([`Core::new`]),
//! lets the caller wire [`Core::on_bus_event`] into its own interrupt
//! handler, and then confirms the EC is actually present
//! ([`Lifecycle::probe`]) before the driver is usable.

use std::sync::{Arc, Mutex, OnceLock};
use std::thread::JoinHandle;

use crate::attention::SharedAttentionLine;
use crate::bus::BusPort;
use crate::commands;
use crate::config::Config;
use crate::dispatcher::{EventDispatcher, EventListener};
use crate::error::{Error, Result};
use crate::event_pool::EventPool;
use crate::packet::Request;
use crate::queue::Queues;
use crate::request_path::RequestPath;
use crate::state_machine::{BusEvent, SlaveStateMachine};
use crate::tag_pool::TagPool;

/// The assembled driver: everything [`crate::state_machine`],
/// [`crate::request_path`], and [`crate::dispatcher`] need to cooperate.
pub struct Core {
    state_machine: Mutex<SlaveStateMachine>,
    request_path: RequestPath,
    dispatcher: Arc<EventDispatcher>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Core {
    /// Build the queues, pools, dispatcher, and state machine, and start the
    /// dispatcher's worker thread. The bus is not yet confirmed to be
    /// present — call [`Lifecycle::probe`] with the result to handshake.
    #[must_use]
    pub fn new(config: Config, attention: SharedAttentionLine) -> Arc<Self> {
        let queues = Arc::new(Queues::new());
        let tag_pool = Arc::new(TagPool::new());
        let event_pool = Arc::new(EventPool::new());
        let dispatcher = Arc::new(EventDispatcher::new());

        let no_op = Request::no_op(commands::CONTROL, commands::CONTROL_NO_OP);
        let state_machine = SlaveStateMachine::new(
            config.slave_address,
            config.block_read_setup_us,
            Arc::clone(&queues),
            Arc::clone(&tag_pool),
            Arc::clone(&event_pool),
            Arc::clone(&dispatcher),
            Arc::clone(&attention),
            no_op,
        );

        let request_path = RequestPath::new(queues, tag_pool, attention, config);
        request_path.set_enabled(true);

        let worker_dispatcher = Arc::clone(&dispatcher);
        let worker_pool = Arc::clone(&event_pool);
        let handle = std::thread::spawn(move || worker_dispatcher.run(&worker_pool));

        Arc::new(Self {
            state_machine: Mutex::new(state_machine),
            request_path,
            dispatcher,
            worker: Mutex::new(Some(handle)),
        })
    }

    /// Feed one bus event into the state machine. Called from the bus
    /// interrupt handler; never sleeps, never blocks.
    pub fn on_bus_event(&self, bus: &mut dyn BusPort, ev: BusEvent) -> Option<u8> {
        self.state_machine
            .lock()
            .expect("state machine poisoned")
            .step(bus, ev)
    }

    pub fn submit(
        &self,
        cmd: u8,
        subcmd: u8,
        tx_payload: &[u8],
        rx_buffer: &mut [u8],
    ) -> Result<usize> {
        self.request_path.submit(cmd, subcmd, tx_payload, rx_buffer)
    }

    #[must_use]
    pub fn config(&self) -> Config {
        self.request_path.config()
    }

    pub fn add_event_listener(&self, listener: Arc<dyn EventListener>) {
        self.dispatcher.register(listener);
    }

    pub fn remove_event_listener(&self, listener: &Arc<dyn EventListener>) {
        self.dispatcher.unregister(listener);
    }
}

/// Owns a [`Core`] through its full lifecycle and exposes the operations an
/// embedder calls from board bring-up / power management code.
pub struct Lifecycle {
    core: Arc<Core>,
}

static GLOBAL: OnceLock<Arc<Core>> = OnceLock::new();

impl Lifecycle {
    /// Confirm the EC is present (`CONTROL.GET_FIRMWARE_VERSION`) and enable
    /// event reporting. `core` must already have its interrupt handler
    /// wired to [`Core::on_bus_event`], since this call blocks on a
    /// synchronous request. Fails with [`Error::Init`] if the EC never
    /// answers.
    pub fn probe(core: Arc<Core>) -> Result<Self> {
        core.config().validate()?;
        log::info!("probe: requesting firmware version to confirm EC presence");
        let mut version = [0u8; 4];
        core.submit(
            commands::CONTROL,
            commands::CONTROL_GET_FIRMWARE_VERSION,
            &[],
            &mut version,
        )
        .map_err(|_| Error::Init("no firmware-version response from EC"))?;
        log::info!(
            "probe: EC firmware v{}.{}",
            (u16::from(version[1]) << 8) | u16::from(version[0]),
            (u16::from(version[3]) << 8) | u16::from(version[2]),
        );

        core.submit(
            commands::SLEEP,
            commands::SLEEP_GLOBAL_CONFIG_EVENT_REPORT,
            &[commands::EVENT_REPORT_ENABLE],
            &mut [],
        )?;
        log::info!("probe: event reporting enabled");

        let _ = GLOBAL.set(Arc::clone(&core));
        Ok(Self { core })
    }

    #[must_use]
    pub fn core(&self) -> Arc<Core> {
        Arc::clone(&self.core)
    }

    pub fn suspend(&self) -> Result<()> {
        self.core.submit(
            commands::SLEEP,
            commands::SLEEP_GLOBAL_CONFIG_EVENT_REPORT,
            &[commands::EVENT_REPORT_DISABLE],
            &mut [],
        )?;
        self.core.submit(commands::SLEEP, commands::SLEEP_AP_SUSPEND, &[], &mut [])?;
        self.core.request_path.set_enabled(false);
        log::info!("suspend: event reporting disabled, bus suspended");
        Ok(())
    }

    pub fn resume(&self) -> Result<()> {
        self.core.request_path.set_enabled(true);
        self.core.submit(
            commands::SLEEP,
            commands::SLEEP_GLOBAL_CONFIG_EVENT_REPORT,
            &[commands::EVENT_REPORT_ENABLE],
            &mut [],
        )?;
        log::info!("resume: event reporting re-enabled");
        Ok(())
    }

    pub fn shutdown(self) -> Result<()> {
        self.core.submit(
            commands::SLEEP,
            commands::SLEEP_GLOBAL_CONFIG_EVENT_REPORT,
            &[commands::EVENT_REPORT_DISABLE],
            &mut [],
        )?;
        self.core.request_path.set_enabled(false);
        self.core.dispatcher.stop();
        if let Some(handle) = self.core.worker.lock().expect("worker handle poisoned").take() {
            let _ = handle.join();
        }
        log::info!("shutdown: event reporting disabled, worker stopped");
        Ok(())
    }
}

/// Fire-and-forget request telling the EC to power down the AP. Callable
/// from a shutdown context with no state of its own, via the global handle
/// registered by [`Lifecycle::probe`].
pub fn power_off() {
    let Some(core) = GLOBAL.get() else {
        log::warn!("power_off: driver not probed, ignoring");
        return;
    };
    let _ = core.submit(
        commands::SLEEP,
        commands::SLEEP_GLOBAL_CONFIG_EVENT_REPORT,
        &[commands::EVENT_REPORT_DISABLE],
        &mut [],
    );
    let _ = core.submit(commands::SLEEP, commands::SLEEP_AP_POWER_DOWN, &[], &mut []);
    log::info!("power_off: power-down request sent");
}
