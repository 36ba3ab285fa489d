use std::time::{Duration, Instant};

use thiserror::Error;

use crate::clock::Clock;

#[derive(Debug, Clone, Copy)]
pub struct SettleOptions {
    /// pause between two samples
    pub poll: Duration,
    /// how long the sampler must keep yielding the same value
    pub hold: Duration,
    /// overall deadline, measured from the first sample
    pub timeout: Duration,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("condition did not settle within {waited:?}")]
pub struct Elapsed {
    pub waited: Duration,
}

/// Polls `sample` until it has returned the same `Some` value continuously for
/// `hold`, returning that value. `None` resets the hold window and so does a
/// different value. Fails with [`Elapsed`] once `timeout` has passed.
pub fn wait_until_settled<T, F>(
    clock: &dyn Clock,
    options: SettleOptions,
    mut sample: F,
) -> Result<T, Elapsed>
where
    T: PartialEq,
    F: FnMut() -> Option<T>,
{
    let start = clock.now();
    let deadline = start + options.timeout;
    let mut held: Option<(T, Instant)> = None;

    loop {
        let now = clock.now();
        if now >= deadline {
            return Err(Elapsed {
                waited: now - start,
            });
        }

        held = match (sample(), held) {
            (Some(value), Some((previous, since))) if previous == value => Some((value, since)),
            (Some(value), _) => Some((value, now)),
            (None, _) => None,
        };

        let mut pause = options.poll;
        if let Some(since) = held.as_ref().map(|(_, since)| *since) {
            let stable_for = now - since;
            if stable_for < options.hold {
                pause = pause.min(options.hold - stable_for);
            } else if let Some((value, _)) = held {
                return Ok(value);
            }
        }
        pause = pause.min(deadline - now);
        clock.sleep(pause);
    }
}
