//! `send`: deliver one message on a channel.

use std::time::Duration;

use ledgerlink_core::{ConnectionStatus, OutboundMessage};

use crate::cli::{GlobalOpts, SendArgs};
use crate::config::{self, Resolved};
use crate::error::CliError;

const CLOSE_GRACE: Duration = Duration::from_secs(5);

pub async fn handle(args: SendArgs, resolved: Resolved, global: &GlobalOpts) -> Result<(), CliError> {
    let rt = config::build_runtime(global, resolved)?;
    let channel = rt.channel(&args.path);

    let wait = Duration::from_secs(args.connect_timeout);
    let connected = tokio::time::timeout(wait, channel.connected())
        .await
        .unwrap_or(false);
    if !connected {
        let url = channel.url().path().to_owned();
        rt.shutdown().await;
        return Err(CliError::ChannelUnavailable {
            url,
            seconds: args.connect_timeout,
        });
    }

    let message = outbound(&args.message, args.raw);
    if !channel.send(message) {
        rt.shutdown().await;
        return Err(CliError::ChannelUnavailable {
            url: channel.url().path().to_owned(),
            seconds: args.connect_timeout,
        });
    }

    // Closing flushes the accepted frame; the final Disconnected marks the
    // end of the connection task.
    let mut status = channel.watch_status();
    rt.shutdown().await;
    let _ = tokio::time::timeout(
        CLOSE_GRACE,
        status.wait_for(|s| *s == ConnectionStatus::Disconnected),
    )
    .await;

    if !global.quiet {
        eprintln!("✓ Sent to {}", args.path);
    }
    Ok(())
}

/// JSON-looking bodies go out as JSON frames unless `raw` is set.
fn outbound(body: &str, raw: bool) -> OutboundMessage {
    if raw {
        return OutboundMessage::Text(body.to_owned());
    }
    serde_json::from_str::<serde_json::Value>(body)
        .map_or_else(|_| OutboundMessage::Text(body.to_owned()), OutboundMessage::Json)
}
