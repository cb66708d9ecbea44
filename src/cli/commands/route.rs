//! Route Command
//!
//! Show the candidate order for a task and each candidate's breaker state.
//! Never contacts an endpoint.

use crate::cli::ui::Output;
use crate::cli::util::{CommandContext, wants_json};
use crate::types::Result;

pub fn run(ctx: &CommandContext, task: &str, format: &str) -> Result<()> {
    let info = ctx.service.route_info(task)?;

    if wants_json(format) {
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }

    let output = Output::new();
    output.header(&format!("Route for '{}'", info.task));
    for (rank, id) in info.candidates.iter().enumerate() {
        let fast_path = ctx.service.router().primary() == Some(id)
            && ctx.service.router().is_fast_path(&info.task);
        let note = if fast_path { " (fast path)" } else { "" };
        println!("  {}. {}{}", rank + 1, id, note);
    }

    output.section("Health");
    for snapshot in &info.health {
        output.health(snapshot);
    }

    if let Some(escalator) = ctx.service.escalator() {
        let policy = escalator.policy();
        output.section("Escalation");
        output.field("threshold", &format!("{}", policy.auto_polish_threshold));
        output.field(
            "mode",
            if policy.soft_fallback { "soft" } else { "strict" },
        );
    }
    Ok(())
}
