use anyhow::Context;
use tokio::io::AsyncBufReadExt;

/// Reads one trimmed line from stdin after printing `label`.
pub async fn read_line(label: &str) -> anyhow::Result<String> {
    print!("{label}: ");
    std::io::Write::flush(&mut std::io::stdout())?;
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let line = stdin
        .lines()
        .next_line()
        .await?
        .context("no input received")?;
    Ok(line.trim().to_string())
}

/// Uses `given` if present, otherwise prompts.
pub async fn value_or_prompt(given: Option<String>, label: &str) -> anyhow::Result<String> {
    match given.filter(|v| !v.trim().is_empty()) {
        Some(value) => Ok(value.trim().to_string()),
        None => read_line(label).await,
    }
}
