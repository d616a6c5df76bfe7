//! # Built-in failproof controller.
//!
//! [`FreezeController`] is the last link of the fallback chain: every tick it
//! overwrites the actuator command with the command type's safe default
//! (zero torques / freeze). It holds no tuning parameters, touches no
//! external resources, and none of its operations can fail.

use std::borrow::Cow;
use std::marker::PhantomData;
use std::time::Duration;

use async_trait::async_trait;

use crate::cell::{CommandCell, StateCell};
use crate::controllers::Controller;
use crate::error::ControllerError;

/// Failproof fallback writing `C::default()` every tick.
///
/// The command type's `Default` must be a safe-but-useless command for the
/// robot (e.g. zero torques with brakes engaged).
pub struct FreezeController<S, C> {
    name: Cow<'static, str>,
    command: CommandCell<C>,
    _state: PhantomData<StateCell<S>>,
}

impl<S, C> FreezeController<S, C> {
    /// Creates a freeze controller bound to the given command cell.
    ///
    /// The robot state is deliberately ignored; freezing must not depend on
    /// sensor data being sane.
    pub fn new(name: impl Into<Cow<'static, str>>, command: CommandCell<C>) -> Self {
        Self {
            name: name.into(),
            command,
            _state: PhantomData,
        }
    }
}

#[async_trait]
impl<S, C> Controller<S, C> for FreezeController<S, C>
where
    S: Send + Sync + 'static,
    C: Default + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn initialize(&mut self, _dt: Duration) -> Result<(), ControllerError> {
        Ok(())
    }

    async fn advance(&mut self) -> Result<(), ControllerError> {
        let mut command = self.command.write_exclusive().await;
        *command = C::default();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default, PartialEq)]
    struct Torques(Vec<f64>);

    #[tokio::test]
    async fn advance_writes_the_safe_default() {
        let command = CommandCell::new(Torques(vec![3.0, -1.5]));
        let mut freeze: FreezeController<(), Torques> =
            FreezeController::new("freeze", command.clone());

        freeze.initialize(Duration::from_millis(2)).await.unwrap();
        freeze.advance().await.unwrap();

        assert_eq!(*command.read_shared().await, Torques::default());
    }

    #[tokio::test]
    async fn operations_never_fail() {
        let command = CommandCell::new(Torques::default());
        let mut freeze: FreezeController<(), Torques> =
            FreezeController::new("freeze", command);

        assert!(freeze.initialize(Duration::from_millis(2)).await.is_ok());
        assert!(freeze.advance().await.is_ok());
        assert!(freeze.reset().await.is_ok());
        assert!(freeze.stop().await.is_ok());
    }
}
