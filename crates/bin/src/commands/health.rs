use crate::startup::Stack;

/// Print the health report as JSON
pub fn run(stack: &Stack) -> anyhow::Result<()> {
    let report = stack.health_reporter().report();
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
