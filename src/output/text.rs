//! Human-readable text output

use super::{Outcome, RunReport};
use crate::util::time::format_rate;

/// Print the session results to the console
pub fn print_results(report: &RunReport) {
    println!("═══════════════════════════════════════════════════════════");
    println!("                    RUN RESULTS");
    println!("═══════════════════════════════════════════════════════════");
    println!();

    let ended = match report.outcome {
        Outcome::Completed => "completed",
        Outcome::Killed => "stopped and system closed",
        Outcome::Detached => "detached, run continues on the engine",
    };
    println!("Board: {}x{} ({})", report.height, report.width, report.mode);
    println!("Session: {}", ended);
    println!("Turn: {}", report.turn);
    if let Some(alive) = report.alive {
        println!("Alive cells: {}", alive);
    }
    println!();

    println!("Elapsed Time: {}", report.elapsed.human);
    println!(
        "Cell updates: {}/s",
        format_rate(report.cell_updates_per_sec)
    );
    if let Some(ref latency) = report.turn_latency {
        println!("Turn latency: {}", latency);
    }
    println!("═══════════════════════════════════════════════════════════");
}
