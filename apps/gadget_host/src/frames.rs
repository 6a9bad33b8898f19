//! JSON-lines framing between the host process and the gadget.

use anyhow::Result;
use shared::protocol::{HostEnvelope, HostEvent};
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Decodes one stdin line. Blank lines carry nothing.
pub fn decode_line(line: &str) -> Option<Result<HostEnvelope, HostEvent>> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    Some(
        serde_json::from_str::<HostEnvelope>(line)
            .map_err(|err| HostEvent::Error(format!("Malformed message: {err}"))),
    )
}

pub async fn write_event<W>(out: &mut W, event: &HostEvent) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut line = serde_json::to_vec(event)?;
    line.push(b'\n');
    out.write_all(&line).await?;
    out.flush().await?;
    Ok(())
}
