use anyhow::Result;
use chrono::{Local, Utc};
use clap::Parser;
use std::sync::Arc;
use tokio::time::{sleep, Duration};

use step_tracker_rs::aggregate::local_date;
use step_tracker_rs::detector::StepDetectorConfig;
use step_tracker_rs::error::StepTrackerError;
use step_tracker_rs::sampler::MotionSampler;
use step_tracker_rs::session::{begin_tracking, end_tracking};
use step_tracker_rs::status::TrackerStatus;
use step_tracker_rs::store::{JsonFileStore, StepStore};

#[derive(Parser, Debug)]
#[command(name = "step_tracker")]
#[command(about = "Accelerometer step tracker - smoothed hysteresis detection with daily metrics", long_about = None)]
struct Args {
    /// Duration in seconds (0 = continuous)
    #[arg(value_name = "SECONDS", default_value = "0")]
    duration: u64,

    /// Sampling interval in milliseconds
    #[arg(long, default_value = "50")]
    interval_ms: u64,

    /// Signed-in user id (omit to count steps without persistence)
    #[arg(long)]
    user: Option<String>,

    /// Storage directory for daily records and profiles
    #[arg(long, default_value = "step_tracker_data")]
    store_dir: String,

    /// Generate synthetic walking data instead of reading the device sensor
    #[arg(long)]
    mock: bool,

    /// Print this month's step history and exit
    #[arg(long)]
    history: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let store = Arc::new(JsonFileStore::new(&args.store_dir));

    if args.history {
        let user = args.user.as_deref().ok_or(StepTrackerError::MissingIdentity)?;
        return print_history(store.as_ref(), user);
    }

    println!("[{}] Step Tracker RS Starting", ts_now());
    println!("  Duration: {} seconds (0=continuous)", args.duration);
    println!("  Interval: {} ms", args.interval_ms);
    println!("  User: {}", args.user.as_deref().unwrap_or("(none, in-memory only)"));
    println!("  Store Dir: {}", args.store_dir);
    println!("  Mock Sensor: {}", args.mock);

    std::fs::create_dir_all(&args.store_dir)?;

    let sampler = MotionSampler::new(args.interval_ms, args.mock);
    let mut subscription = sampler.start()?;
    let session = begin_tracking(args.user.clone(), store, StepDetectorConfig::default())?;

    let start = Utc::now();
    let mut last_status_update = Utc::now();

    println!("[{}] Tracking steps...", ts_now());

    loop {
        // Check if duration exceeded
        if args.duration > 0 {
            let elapsed = Utc::now().signed_duration_since(start);
            if elapsed.num_seconds() as u64 >= args.duration {
                println!("[{}] Duration reached, stopping...", ts_now());
                break;
            }
        }

        // Drain available samples
        while let Some(sample) = subscription.try_next() {
            let mut session = session.lock().unwrap();
            if let Some(aggregate) = session.handle_sample(&sample) {
                println!(
                    "[{}] Step {} of {}: {:.1} kcal, {:.3} km, {} active min ({:.0}%)",
                    ts_now(),
                    aggregate.steps,
                    aggregate.goal,
                    aggregate.kcal,
                    aggregate.distance_km,
                    aggregate.active_minutes,
                    aggregate.progress_percent(),
                );
            }
        }

        // Update live status every 2 seconds
        let now = Utc::now();
        if (now.signed_duration_since(last_status_update).num_seconds() as u64) >= 2 {
            let status_path = format!("{}/live_status.json", args.store_dir);
            let _ = build_status(&session.lock().unwrap(), &start).save(&status_path);
            last_status_update = now;
        }

        sleep(Duration::from_millis(1)).await;
    }

    // Release the sensor before ending the session so no further steps land
    subscription.cancel();

    let final_status = build_status(&session.lock().unwrap(), &start);
    end_tracking()?;

    let status_path = format!("{}/live_status_final.json", args.store_dir);
    let _ = final_status.save(&status_path);

    println!("\n=== Final Stats ===");
    println!("Samples seen: {}", final_status.samples_seen);
    println!("Steps: {} of {}", final_status.steps, final_status.goal);
    println!("Calories: {:.1} kcal", final_status.kcal);
    println!("Distance: {:.3} km", final_status.distance_km);
    println!("Active minutes: {}", final_status.active_minutes);
    println!("Goal progress: {:.0}%", final_status.progress_percent);

    Ok(())
}

fn build_status(
    session: &step_tracker_rs::session::TrackingSession,
    start: &chrono::DateTime<Utc>,
) -> TrackerStatus {
    let aggregate = session.aggregate();
    let uptime = Utc::now().signed_duration_since(*start).num_seconds().max(0) as u64;

    let mut status = TrackerStatus::new();
    status.state = session.state();
    status.steps = aggregate.steps;
    status.goal = aggregate.goal;
    status.kcal = aggregate.kcal;
    status.distance_km = aggregate.distance_km;
    status.active_minutes = aggregate.active_minutes;
    status.progress_percent = aggregate.progress_percent();
    status.filtered_magnitude = session.filtered_magnitude();
    status.samples_seen = session.samples_seen();
    status.uptime_seconds = uptime;
    status
}

fn print_history(store: &dyn StepStore, user: &str) -> Result<()> {
    let month_start = Local::now().format("%Y-%m-01").to_string();
    let today = local_date();

    let records = store.load_range(user, &month_start, &today)?;
    if records.is_empty() {
        println!("No step history for {} this month", user);
        return Ok(());
    }

    println!("Step history for {} ({} .. {})", user, month_start, today);
    for record in records {
        println!(
            "  {}  {:>6} steps  {:>7.1} kcal  {:>7.3} km  {:>3} min  {:>3.0}%",
            record.date,
            record.steps,
            record.kcal,
            record.distance_km,
            record.active_minutes,
            record.progress_percent(),
        );
    }
    Ok(())
}

fn ts_now() -> String {
    Utc::now().format("%H:%M:%S").to_string()
}
