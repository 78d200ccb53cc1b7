use std::convert::Infallible;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::{Json, debug_handler};
use tokio_stream::Stream;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, instrument};

use crate::controllers::jobs::models::RetriedBody;
use crate::domain::app_state::{AppEngine, AppState};
use crate::jobs::JobId;
use crate::jobs::progress::ProgressSnapshot;
use crate::{Error, Result};

fn parse_job_id(raw: &str) -> Result<JobId> {
    raw.parse()
        .map_err(|_| Error::bad_request(format!("invalid job id {raw}")))
}

#[instrument(skip(engine))]
#[debug_handler(state = AppState)]
pub(super) async fn get_job(
    State(engine): State<AppEngine>,
    Path(id): Path<String>,
) -> Result<Json<ProgressSnapshot>> {
    let job_id = parse_job_id(&id)?;
    Ok(Json(engine.snapshot(job_id)?))
}

/// Streams job progress as server-sent events: an initial snapshot, a
/// snapshot per coalesced signal plus any named update-job transitions,
/// terminating once the job is terminal.
#[instrument(skip(engine))]
#[debug_handler(state = AppState)]
pub(super) async fn job_events(
    State(engine): State<AppEngine>,
    Path(id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let job_id = parse_job_id(&id)?;
    let progress = engine.progress(job_id)?;

    let (tx, rx) = tokio::sync::mpsc::channel::<Result<Event, Infallible>>(16);
    tokio::spawn(async move {
        let mut signal = progress.subscribe();
        let mut cursor = 0usize;

        let snapshot = Event::default()
            .event("snapshot")
            .json_data(progress.snapshot());
        if let Ok(event) = snapshot
            && tx.send(Ok(event)).await.is_err()
        {
            return;
        }

        loop {
            let (events, next) = progress.events_since(cursor);
            cursor = next;
            for stream_event in events {
                let Ok(event) = Event::default()
                    .event(stream_event.name)
                    .json_data(stream_event.data)
                else {
                    continue;
                };
                if tx.send(Ok(event)).await.is_err() {
                    return;
                }
            }

            if progress.is_done() {
                debug!("Job terminal, closing event stream");
                return;
            }
            if signal.recv().await.is_none() {
                return;
            }
            let snapshot = Event::default()
                .event("snapshot")
                .json_data(progress.snapshot());
            if let Ok(event) = snapshot
                && tx.send(Ok(event)).await.is_err()
            {
                return;
            }
        }
    });

    Ok(Sse::new(ReceiverStream::new(rx)).keep_alive(KeepAlive::default()))
}

#[instrument(skip(engine))]
#[debug_handler(state = AppState)]
pub(super) async fn cancel_job(
    State(engine): State<AppEngine>,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    let job_id = parse_job_id(&id)?;
    engine.cancel(job_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(engine))]
#[debug_handler(state = AppState)]
pub(super) async fn retry_job(
    State(engine): State<AppEngine>,
    Path(id): Path<String>,
) -> Result<Json<RetriedBody>> {
    let job_id = parse_job_id(&id)?;
    let new_id = engine.retry_failed(job_id).await?;
    Ok(Json(RetriedBody { id: new_id }))
}
