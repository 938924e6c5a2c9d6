// Validates the configuration in a data directory and prints the run plan.
// Booking needs a site-specific PageDriver, wired in through
// `slotwatch_lib::bootstrap::run_with_driver`.

use std::path::PathBuf;

use slotwatch_domain::SystemClock;
use slotwatch_infrastructure::config::default_data_dir;

fn main() -> anyhow::Result<()> {
    let data_dir = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(default_data_dir);

    let plan = slotwatch_lib::bootstrap::prepare(&data_dir, &SystemClock)?;
    tracing::info!("🚀 SlotWatch plan ready");

    println!(
        "{} target(s), polling every {}s, window {}",
        plan.targets.len(),
        plan.config.polling_interval.as_secs(),
        if plan.config.window.enabled() {
            format!(
                "{:02}:00-{:02}:00 ({})",
                plan.config.window.start_hour(),
                plan.config.window.end_hour(),
                plan.config.window.offset()
            )
        } else {
            "always open".to_string()
        }
    );
    for target in &plan.targets {
        let slots: Vec<&str> = target.timeslots().iter().map(|t| t.as_str()).collect();
        println!("  {} {} [{}]", target.date(), target.source(), slots.join(", "));
    }
    Ok(())
}
