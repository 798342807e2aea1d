use comfolink_session::{DisconnectReason, Session, SessionEvent};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use crate::cmd::ListenArgs;
use crate::exit::{io_error, session_error, CliError, CliResult, FAILURE, SUCCESS};
use crate::output::{print_message, OutputFormat};

pub async fn run(args: ListenArgs, format: OutputFormat) -> CliResult<i32> {
    let config = args.gateway.session_config().await?;
    let session = Session::spawn(config);
    let mut events = session.subscribe();

    let start = session
        .start_session(args.force)
        .await
        .map_err(|err| session_error("session start failed", err))?;
    info!(resumed = start.resumed, client_id = %session.identity().local, "session started");

    for sensor in &args.sensors {
        session
            .register_sensor(*sensor)
            .await
            .map_err(|err| session_error(&format!("sensor {sensor} registration failed"), err))?;
    }

    let outcome = receive(&args, &mut events, format).await;

    if let Err(err) = session.close_session().await {
        warn!(error = %err, "session close failed");
    }
    outcome
}

async fn receive(
    args: &ListenArgs,
    events: &mut tokio::sync::broadcast::Receiver<SessionEvent>,
    format: OutputFormat,
) -> CliResult<i32> {
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    let mut printed = 0usize;

    loop {
        tokio::select! {
            signal = &mut shutdown => {
                signal.map_err(|err| io_error("signal handler setup failed", err))?;
                info!("interrupted, closing session");
                return Ok(SUCCESS);
            }
            event = events.recv() => match event {
                Ok(SessionEvent::Receive(message)) => {
                    print_message(&message, format);
                    printed = printed.saturating_add(1);
                    if args.count.is_some_and(|count| printed >= count) {
                        return Ok(SUCCESS);
                    }
                }
                Ok(SessionEvent::Disconnect(DisconnectReason::OtherSession)) => {
                    warn!("gateway session taken over by another client");
                }
                Ok(SessionEvent::Disconnect(DisconnectReason::Disconnected)) => {
                    warn!("connection lost, reconnecting");
                }
                Ok(SessionEvent::Error(err)) => warn!(error = %err, "session error"),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "output fell behind, messages dropped");
                }
                Err(RecvError::Closed) => {
                    return Err(CliError::new(FAILURE, "session stopped unexpectedly"));
                }
            },
        }
    }
}
