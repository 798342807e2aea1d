use std::time::Duration;

use comfolink_session::kind::LIST_REGISTERED_APPS_CONFIRM;
use comfolink_session::{
    GatewayCodec, InboundMessage, MessageCodec, Session, SessionError, SessionEvent,
};
use tokio::sync::broadcast;

use crate::cmd::AppsArgs;
use crate::exit::{session_error, CliError, CliResult, SUCCESS, TIMEOUT};
use crate::output::{print_apps, OutputFormat};

pub async fn run(args: AppsArgs, format: OutputFormat) -> CliResult<i32> {
    let config = args.gateway.session_config().await?;
    let wait = config.start_timeout;
    let session = Session::spawn(config);
    let mut events = session.subscribe();

    session
        .start_session(args.force)
        .await
        .map_err(|err| session_error("session start failed", err))?;

    let outcome = list(&session, &mut events, wait).await;
    let _ = session.close_session().await;

    let apps = outcome?;
    print_apps(&apps, format);
    Ok(SUCCESS)
}

async fn list(
    session: &Session,
    events: &mut broadcast::Receiver<SessionEvent>,
    wait: Duration,
) -> CliResult<Vec<comfolink_session::RegisteredApp>> {
    session
        .list_registered_apps()
        .await
        .map_err(|err| session_error("list request failed", err))?;

    let confirm = tokio::time::timeout(wait, confirmation(events))
        .await
        .map_err(|_| CliError::new(TIMEOUT, format!("no app list after {wait:?}")))?
        .map_err(|err| session_error("list request failed", err))?;

    if !confirm.status.is_ok() {
        return Err(session_error(
            "list request failed",
            SessionError::RequestRejected(confirm.status),
        ));
    }
    GatewayCodec
        .decode_registered_apps(&confirm.payload)
        .map_err(|err| session_error("app list unreadable", err.into()))
}

async fn confirmation(
    events: &mut broadcast::Receiver<SessionEvent>,
) -> Result<InboundMessage, SessionError> {
    loop {
        match events.recv().await {
            Ok(SessionEvent::Receive(message)) if message.kind == LIST_REGISTERED_APPS_CONFIRM => {
                return Ok(message);
            }
            Ok(SessionEvent::Disconnect(_)) => return Err(SessionError::ConnectionLost),
            Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
            Err(broadcast::error::RecvError::Closed) => return Err(SessionError::Closed),
        }
    }
}
