//! # Simple logging subscriber for debugging and demos.
//!
//! [`LogWriter`] prints events to stdout in a human-readable format.
//! This is primarily useful for development, debugging, and bench setups.
//!
//! ## Output format
//! ```text
//! [changed] controller=walk from=freeze
//! [advance-failed] controller=walk err="imu timeout"
//! [estop] controller=stand kind=failure
//! [estop-cleared]
//! [switch-rejected] controller=walk reason="estop_latched"
//! ```

use async_trait::async_trait;

use crate::events::{Event, EventKind};

use super::Subscribe;

/// Simple stdout logging subscriber.
///
/// Enabled via the `logging` feature. Not intended for production use —
/// implement a custom [`Subscribe`] for structured logging or telemetry.
pub struct LogWriter;

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        match e.kind {
            EventKind::ControllerChanged => {
                println!(
                    "[changed] controller={:?} from={:?}",
                    e.controller, e.from
                );
            }
            EventKind::SwitchRejected => {
                println!(
                    "[switch-rejected] controller={:?} reason={:?}",
                    e.controller, e.error
                );
            }
            EventKind::ControllerInitFailed => {
                println!(
                    "[init-failed] controller={:?} err={:?}",
                    e.controller, e.error
                );
            }
            EventKind::AdvanceFailed => {
                println!(
                    "[advance-failed] controller={:?} err={:?}",
                    e.controller, e.error
                );
            }
            EventKind::EmergencyStopped => {
                println!("[estop] controller={:?} kind={:?}", e.controller, e.estop);
            }
            EventKind::EmergencyStopCleared => {
                println!("[estop-cleared]");
            }
            EventKind::SubscriberOverflow => {
                println!("[subscriber-overflow] {:?}", e.error);
            }
            EventKind::SubscriberPanicked => {
                println!(
                    "[subscriber-panicked] subscriber={:?} info={:?}",
                    e.controller, e.error
                );
            }
        }
    }

    fn name(&self) -> &'static str {
        "log"
    }
}
