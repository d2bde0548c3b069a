use anyhow::Result;

#[cfg(feature = "clipboard")]
pub fn copy(command: &str) -> Result<()> {
    let mut clipboard = arboard::Clipboard::new()?;
    clipboard.set_text(command)?;
    tracing::info!("copied command to clipboard");
    Ok(())
}

#[cfg(not(feature = "clipboard"))]
pub fn copy(_command: &str) -> Result<()> {
    anyhow::bail!("built without clipboard support, rebuild with --features clipboard")
}
