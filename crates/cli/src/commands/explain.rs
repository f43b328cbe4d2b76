//! `cadence explain` — Run a tool failure through the recovery advisor.

use cadence_agent::ErrorRecovery;
use cadence_core::error::Failure;

pub fn run(
    tool: &str,
    kind: &str,
    lineage: Vec<String>,
    message: &str,
    args: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    let context: serde_json::Value = match args {
        Some(raw) => serde_json::from_str(raw).map_err(|e| format!("--args is not valid JSON: {e}"))?,
        None => serde_json::json!({}),
    };

    let failure = Failure::new(kind, message).with_lineage(lineage);
    let action = ErrorRecovery::new().handle_tool_error(tool, &failure, &context);

    println!("{}", serde_json::to_string_pretty(&action)?);
    Ok(())
}
