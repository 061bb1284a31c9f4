//! `request`: a REST call under the retry coordinator.
//!
//! The backend is probed first so the offline check reflects reality. An
//! unreachable backend parks the request in the offline queue; with
//! `--wait-online` the command keeps probing and drains the queue itself
//! once the backend answers again.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use serde_json::Value;
use tokio::time::MissedTickBehavior;

use ledgerlink_api::ApiClient;
use ledgerlink_core::{Realtime, RetryError};

use crate::cli::{GlobalOpts, HttpMethod, RequestArgs};
use crate::config::{self, Resolved};
use crate::error::CliError;
use crate::output;

type ResponseSlot = Arc<Mutex<Option<Value>>>;

impl HttpMethod {
    fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Delete => "DELETE",
        }
    }
}

pub async fn handle(args: RequestArgs, resolved: Resolved, global: &GlobalOpts) -> Result<(), CliError> {
    let body = request_body(args.method, args.data.as_deref())?;

    let base = resolved
        .realtime
        .api_base_url
        .parse()
        .map_err(|_| CliError::Validation {
            field: "api_url".into(),
            reason: format!("invalid URL: {}", resolved.realtime.api_base_url),
        })?;
    let client = ApiClient::new(base, resolved.token.as_ref(), &resolved.realtime.transport())?;
    let rt = config::build_runtime(global, resolved)?;

    let status = rt.monitor().probe().await;
    tracing::debug!(online = status.is_online(), quality = %status.connection_quality(), "pre-request probe");

    let description = format!("{} {}", args.method.as_str(), args.path);
    let mut options = rt
        .retry()
        .options::<ledgerlink_api::Error>()
        .description(description);
    if let Some(retries) = args.retries {
        options = options.max_attempts(retries);
    }
    if let Some(ms) = args.retry_delay_ms {
        options = options.delay(Duration::from_millis(ms));
    }

    let slot = ResponseSlot::default();
    let action = request_action(client, args.method, args.path.clone(), body, Arc::clone(&slot));

    let outcome = match rt.retry().execute_with_retry(action, options).await {
        Ok(()) => Ok(()),
        Err(RetryError::Queued { description }) => match args.wait_online {
            Some(secs) => {
                if !global.quiet {
                    eprintln!("… {description} queued, waiting up to {secs}s for the backend");
                }
                wait_and_drain(
                    &rt,
                    description,
                    Duration::from_secs(secs),
                    Duration::from_secs(args.probe_interval),
                )
                .await
            }
            None => Err(CliError::Queued { description }),
        },
        Err(e) => Err(e.into()),
    };
    rt.shutdown().await;
    outcome?;

    let value = slot
        .lock()
        .expect("response slot lock poisoned")
        .take()
        .unwrap_or(Value::Null);
    match args.method {
        HttpMethod::Delete => {
            if !global.quiet {
                eprintln!("✓ Deleted {}", args.path);
            }
        }
        HttpMethod::Get | HttpMethod::Post => {
            let out = output::render_single(&global.output, &value, output::render_json_pretty, plain_value);
            output::print_output(&out, global.quiet);
        }
    }
    Ok(())
}

fn request_body(method: HttpMethod, data: Option<&str>) -> Result<Option<Value>, CliError> {
    match (method, data) {
        (HttpMethod::Post, Some(data)) => Ok(Some(serde_json::from_str(data)?)),
        (HttpMethod::Post, None) => Ok(Some(Value::Object(serde_json::Map::new()))),
        (_, Some(_)) => Err(CliError::Validation {
            field: "data".into(),
            reason: "a request body is only sent with POST".into(),
        }),
        (_, None) => Ok(None),
    }
}

/// The retried (and possibly queued) unit of work. Each successful run
/// stores its response in `slot`.
fn request_action(
    client: ApiClient,
    method: HttpMethod,
    path: String,
    body: Option<Value>,
    slot: ResponseSlot,
) -> impl Fn() -> BoxFuture<'static, Result<(), ledgerlink_api::Error>> + Send + Sync + 'static {
    move || {
        let client = client.clone();
        let path = path.clone();
        let body = body.clone();
        let slot = Arc::clone(&slot);
        async move {
            let value = match method {
                HttpMethod::Get => client.get_json::<Value>(&path).await?,
                HttpMethod::Post => client.post_json::<Value>(&path, &body).await?,
                HttpMethod::Delete => {
                    client.delete(&path).await?;
                    Value::Null
                }
            };
            *slot.lock().expect("response slot lock poisoned") = Some(value);
            Ok::<(), ledgerlink_api::Error>(())
        }
        .boxed()
    }
}

/// Probe every `probe_every` and drain the offline queue each time the
/// backend answers, until the request completes, is dropped, or `wait`
/// runs out.
async fn wait_and_drain(
    rt: &Realtime,
    description: String,
    wait: Duration,
    probe_every: Duration,
) -> Result<(), CliError> {
    let deadline = tokio::time::sleep(wait);
    tokio::pin!(deadline);
    let mut probes = tokio::time::interval(probe_every);
    probes.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = tokio::signal::ctrl_c() => break,
            () = &mut deadline => break,
            _ = probes.tick() => {
                if !rt.monitor().probe().await.is_online() {
                    continue;
                }
                let report = rt.retry().process_retry_queue().await;
                tracing::debug!(?report, "drained offline queue");
                if report.succeeded > 0 {
                    return Ok(());
                }
                if rt.retry().queue_len() == 0 {
                    break;
                }
            }
        }
    }

    rt.retry().clear_queue();
    Err(CliError::Queued { description })
}

fn plain_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => output::render_json_compact(other),
    }
}
