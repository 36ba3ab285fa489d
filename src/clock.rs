use std::{
    cell::{Cell, RefCell},
    time::{Duration, Instant},
};

/// Source of time for every polling loop in the crate.
pub trait Clock {
    fn now(&self) -> Instant;
    fn sleep(&self, duration: Duration);
}

/// Wall clock backed by `Instant` and a blocking thread sleep.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration)
    }
}

type Event = (Duration, Box<dyn FnMut()>);

/// Virtual clock: `sleep` advances time instantly and fires the actions
/// registered with [`ManualClock::at`] once their offset is reached.
pub struct ManualClock {
    origin: Instant,
    offset: Cell<Duration>,
    events: RefCell<Vec<Event>>,
}

impl ManualClock {
    pub fn new() -> Self {
        ManualClock {
            origin: Instant::now(),
            offset: Cell::new(Duration::ZERO),
            events: RefCell::new(vec![]),
        }
    }

    /// Time elapsed since the clock was created.
    pub fn elapsed(&self) -> Duration {
        self.offset.get()
    }

    /// Runs `action` the first time virtual time reaches `offset`.
    pub fn at(&self, offset: Duration, action: impl FnMut() + 'static) {
        self.events.borrow_mut().push((offset, Box::new(action)));
    }

    pub fn advance(&self, duration: Duration) {
        let target = self.offset.get() + duration;
        loop {
            // pop the earliest due event, release the borrow, then run it so
            // the action is free to schedule further events
            let next = {
                let mut events = self.events.borrow_mut();
                let due = events
                    .iter()
                    .enumerate()
                    .filter(|(_, (at, _))| *at <= target)
                    .min_by_key(|(_, (at, _))| *at)
                    .map(|(i, _)| i);
                due.map(|i| events.remove(i))
            };
            match next {
                Some((at, mut action)) => {
                    if at > self.offset.get() {
                        self.offset.set(at);
                    }
                    action();
                }
                None => break,
            }
        }
        self.offset.set(target);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.offset.get()
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration)
    }
}
