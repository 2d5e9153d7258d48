//! Fault boundary around unit calls.

use super::Phase;
use crate::error::{EnsembleError, Result};
use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};

/// Run a unit operation, attributing its error or panic to `unit` and `phase`.
///
/// A returned error becomes [`EnsembleError::Lifecycle`]; a panic becomes
/// [`EnsembleError::Fault`] carrying the panic message.
pub fn guard<T, F>(unit: &str, phase: Phase, f: F) -> Result<T>
where
    F: FnOnce() -> anyhow::Result<T>,
{
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(source)) => Err(EnsembleError::lifecycle(unit, phase, source)),
        Err(payload) => Err(EnsembleError::Fault {
            unit: unit.to_string(),
            phase,
            message: panic_message(&*payload),
        }),
    }
}

/// Text of a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_carry_unit_and_phase() {
        let err = guard::<(), _>("Cache", Phase::Start, || anyhow::bail!("redis unreachable"))
            .unwrap_err();
        assert_eq!(err.to_string(), "Cache failed to start: redis unreachable");
        assert_eq!(err.unit(), Some("Cache"));
        assert_eq!(err.phase(), Some(Phase::Start));
    }

    #[test]
    fn panics_become_faults() {
        let err = guard::<(), _>("Cache", Phase::Finalize, || panic!("index {} out of range", 3))
            .unwrap_err();
        match err {
            EnsembleError::Fault { unit, phase, message } => {
                assert_eq!(unit, "Cache");
                assert_eq!(phase, Phase::Finalize);
                assert_eq!(message, "index 3 out of range");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn values_pass_through() {
        assert_eq!(guard("Cache", Phase::Load, || Ok(42)).unwrap(), 42);
    }
}
