use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serbus_bus::{BusError, LcmBus, MessageBus};
use serbus_serial::{wait, WaitOutcome, Waitable};
use tracing::debug;

use crate::cmd::{install_ctrlc_handler, ListenArgs};
use crate::exit::{bus_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::{print_frame, OutputFormat};

const POLL_INTERVAL: Duration = Duration::from_millis(250);

pub fn run(args: ListenArgs, format: OutputFormat) -> CliResult<i32> {
    let mut bus = LcmBus::connect(&args.lcm_url).map_err(|err| bus_error("bus connect failed", err))?;
    bus.subscribe(&args.channel)
        .map_err(|err| bus_error("subscribe failed", err))?;

    let shutdown = Arc::new(AtomicBool::new(false));
    install_ctrlc_handler(shutdown.clone())?;

    let limit = args.count.unwrap_or(usize::MAX);
    let mut printed = 0usize;

    while !shutdown.load(Ordering::SeqCst) && printed < limit {
        match wait(&[&bus as &dyn Waitable], Some(POLL_INTERVAL)) {
            Ok(WaitOutcome::Ready(_)) => {}
            Ok(WaitOutcome::TimedOut) => continue,
            Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(err) => {
                return Err(CliError::new(INTERNAL, format!("wait failed: {err}")));
            }
        }

        bus.dispatch_pending(|channel, frame| {
            if printed < limit {
                print_frame(channel, &frame, format);
                printed += 1;
            } else {
                debug!(channel, "dropping message past --count");
            }
            Ok::<(), BusError>(())
        })
        .map_err(|err| bus_error("receive failed", err))?;
    }

    Ok(SUCCESS)
}
