//! `listen`: subscribe to a channel and stream what arrives.

use ledgerlink_core::{ConnectionStatus, InboundMessage};
use tokio::sync::mpsc;

use crate::cli::{GlobalOpts, ListenArgs, OutputFormat};
use crate::config::{self, Resolved};
use crate::error::CliError;
use crate::output;

pub async fn handle(args: ListenArgs, resolved: Resolved, global: &GlobalOpts) -> Result<(), CliError> {
    let rt = config::build_runtime(global, resolved)?;
    let channel = rt.channel(&args.path);
    let color = output::should_color(&global.color);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let messages = channel.subscribe(move |msg: &InboundMessage| {
        let _ = tx.send(msg.clone());
    });
    let states = args.states.then(|| {
        let path = args.path.clone();
        channel.subscribe_connection_state(move |status: &ConnectionStatus| {
            eprintln!("{path}: {}", output::paint_status(*status, color));
        })
    });

    let mut received = 0_u64;
    loop {
        tokio::select! {
            biased;
            _ = tokio::signal::ctrl_c() => break,
            msg = rx.recv() => {
                let Some(msg) = msg else { break };
                output::print_output(&render_message(&global.output, &msg), global.quiet);
                received += 1;
                if args.count.is_some_and(|n| received >= n) {
                    break;
                }
            }
        }
    }

    messages.unsubscribe();
    if let Some(states) = states {
        states.unsubscribe();
    }
    rt.shutdown().await;
    tracing::debug!(received, "listen finished");
    Ok(())
}

/// One message per output record: text frames verbatim, JSON frames in the
/// selected format (compact for table and plain, so each is one line).
fn render_message(format: &OutputFormat, msg: &InboundMessage) -> String {
    match (msg, format) {
        (InboundMessage::Text(text), _) => text.clone(),
        (InboundMessage::Json(value), OutputFormat::Json) => output::render_json_pretty(value),
        (InboundMessage::Json(value), OutputFormat::Yaml) => {
            format!("---\n{}", output::render_yaml(value))
        }
        (InboundMessage::Json(value), _) => output::render_json_compact(value),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn json_frames_are_single_line_by_default() {
        let msg = InboundMessage::Json(json!({"type": "order.created", "id": 7}));
        assert_eq!(
            render_message(&OutputFormat::Table, &msg),
            r#"{"id":7,"type":"order.created"}"#
        );
    }

    #[test]
    fn text_frames_pass_through() {
        let msg = InboundMessage::Text("stock low".into());
        assert_eq!(render_message(&OutputFormat::Json, &msg), "stock low");
    }
}
