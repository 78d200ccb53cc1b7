use axum::extract::State;
use axum::{Json, debug_handler};
use tracing::instrument;

use crate::controllers::dashboard::models::{DashboardBody, RecentUpdateBody};
use crate::db;
use crate::domain::app_state::{AppPool, AppState};
use crate::Result;

const RECENT_UPDATES: i64 = 10;

#[instrument(skip(pool))]
#[debug_handler(state = AppState)]
pub(super) async fn get_dashboard(State(pool): State<AppPool>) -> Result<Json<DashboardBody>> {
    let mut conn = pool.get()?;
    let instances = db::instances::count(&mut conn)?;
    let stats = db::mods::global_stats(&mut conn)?;
    let recent_updates: Vec<RecentUpdateBody> =
        db::events::recent_updates(&mut conn, RECENT_UPDATES)?
            .into_iter()
            .map(RecentUpdateBody::from)
            .collect();

    Ok(Json(DashboardBody {
        instances,
        tracked: stats.tracked,
        up_to_date: stats.up_to_date,
        outdated: stats.outdated,
        recent_updates,
    }))
}
