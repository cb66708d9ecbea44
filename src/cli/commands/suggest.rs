//! Suggest Command
//!
//! Usage:
//!   modelroute suggest <task> "prompt" [--context key=value] [-f json]

use serde_json::Value;

use crate::cli::ui::Output;
use crate::cli::util::{CommandContext, parse_context, wants_json};
use crate::types::Result;

pub async fn run(
    ctx: &CommandContext,
    task: &str,
    prompt: &str,
    pairs: &[String],
    format: &str,
) -> Result<bool> {
    let mut context = parse_context(pairs)?;
    context.insert("prompt".to_string(), Value::from(prompt));

    let suggestion = ctx.service.suggest(task, &context).await?;
    let ok = suggestion.raw.get("ok").and_then(Value::as_bool).unwrap_or(false);

    if wants_json(format) {
        println!("{}", serde_json::to_string_pretty(&suggestion)?);
        return Ok(ok);
    }

    let output = Output::new();
    if ok {
        println!("{}", suggestion.suggestion);
        output.field("model", &suggestion.model);
    } else {
        let error = suggestion
            .raw
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("suggestion failed");
        output.error(error);
    }
    Ok(ok)
}
