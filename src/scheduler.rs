use std::{
    str::FromStr,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use anyhow::{anyhow, Context};
use chrono::{DateTime, Local};
use cron::Schedule;
use tokio::time::sleep;

/// Cron schedule firing every day at `HH:MM` local time.
pub fn daily_schedule(hour_minute: &str) -> anyhow::Result<Schedule> {
    let (hour, minute) = hour_minute
        .trim()
        .split_once(':')
        .ok_or_else(|| anyhow!("run time {:?} is not in HH:MM format", hour_minute))?;
    let hour: u32 = hour
        .parse()
        .context(format!("invalid hour in {:?}", hour_minute))?;
    let minute: u32 = minute
        .parse()
        .context(format!("invalid minute in {:?}", hour_minute))?;
    if hour > 23 || minute > 59 {
        return Err(anyhow!("run time {:?} is out of range", hour_minute));
    }
    let expression = format!("0 {} {} * * *", minute, hour);
    Schedule::from_str(&expression).context(format!("invalid schedule {}", expression))
}

pub fn next_run(schedule: &Schedule, after: DateTime<Local>) -> anyhow::Result<DateTime<Local>> {
    schedule
        .after(&after)
        .next()
        .ok_or_else(|| anyhow!("schedule has no upcoming run after {}", after))
}

/// Runs `job` on a blocking worker every time `schedule` fires, until
/// `should_terminate` is raised. `tick` is the interval between checks.
pub async fn serve<F>(
    schedule: &Schedule,
    tick: Duration,
    should_terminate: Arc<AtomicBool>,
    job: F,
) -> anyhow::Result<()>
where
    F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
{
    let job = Arc::new(job);
    let mut next = next_run(schedule, Local::now())?;
    info!("next run at {}", next);

    while !should_terminate.load(Ordering::Relaxed) {
        if Local::now() >= next {
            let job = job.clone();
            match tokio::task::spawn_blocking(move || job()).await {
                Ok(Ok(())) => info!("scheduled run finished"),
                Ok(Err(e)) => error!("scheduled run failed: {:#}", e),
                Err(e) => error!("scheduled run aborted: {}", e),
            }
            next = next_run(schedule, Local::now())?;
            info!("next run at {}", next);
        }
        sleep(tick).await;
    }
    debug!("termination requested, leaving the scheduler");
    Ok(())
}
