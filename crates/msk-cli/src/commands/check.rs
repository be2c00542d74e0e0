use anyhow::{Context, Result};
use msk_calendar::codec;
use std::fs;
use tracing::info;

pub fn check(file: &str, diagnostic: bool) -> Result<()> {
    let raw = fs::read_to_string(file).with_context(|| format!("read calendar: {file}"))?;
    let cal = codec::decode(&raw).with_context(|| format!("decode calendar: {file}"))?;
    info!(calendar = %cal.name(), tz = %cal.timezone().id(), "calendar decoded");

    if diagnostic {
        print!("{}", cal.diagnostic());
    } else {
        println!("{}", codec::encode(&cal));
    }
    Ok(())
}
