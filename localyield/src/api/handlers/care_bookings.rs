use crate::{
    AppState,
    api::{
        envelope::ApiResponse,
        models::{
            care_bookings::{
                BookingActor, BookingCreate, BookingResponse, BookingStatus, BookingStatusUpdate, BookingView, ListBookingsQuery,
                authorize_transition, total_estimate,
            },
            pagination::Page,
            users::CurrentUser,
        },
    },
    db::{
        handlers::{CareBookings, Repository, Users, care_bookings::BookingFilter},
        models::care_bookings::BookingCreateDBRequest,
    },
    errors::{Error, Result},
    types::{BookingId, abbrev_uuid},
};
use crate::api::extract::{Json, Path, Query};
use axum::extract::State;
use chrono::Utc;
use tracing::info;

#[utoipa::path(
    post,
    path = "/care-bookings",
    tag = "care-bookings",
    summary = "Request animal care",
    description = "Dates are inclusive. The estimate is the caregiver's current day rate times the number of days.",
    request_body = BookingCreate,
    responses(
        (status = 201, description = "Booking requested", body = BookingResponse),
        (status = 400, description = "Invalid dates or self-booking"),
        (status = 404, description = "No caregiver with that ID"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn create_booking(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(request): Json<BookingCreate>,
) -> Result<ApiResponse<BookingResponse>> {
    let valid = request.validate(current_user.id, Utc::now().date_naive())?;
    let caregiver_id = valid.caregiver_id;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut users = Users::new(&mut conn);
    let caregiver = users
        .get_by_id(caregiver_id)
        .await?
        .filter(|user| !user.is_suspended)
        .ok_or_else(|| Error::not_found("Caregiver", caregiver_id))?;
    let profile = users
        .get_caregiver_profile(caregiver.id)
        .await?
        .ok_or_else(|| Error::not_found("Caregiver", caregiver_id))?;

    let booking = CareBookings::new(&mut conn)
        .create(&BookingCreateDBRequest {
            owner_id: current_user.id,
            caregiver_id,
            start_date: valid.start_date,
            end_date: valid.end_date,
            animals: valid.animals,
            notes: valid.notes,
            rate_per_day: profile.rate_per_day,
            total_estimate: total_estimate(profile.rate_per_day, valid.days),
        })
        .await?;

    info!(booking_id = %abbrev_uuid(&booking.id), days = valid.days, "Care booking requested");
    Ok(ApiResponse::created(booking.into()))
}

#[utoipa::path(
    get,
    path = "/care-bookings",
    tag = "care-bookings",
    summary = "List my bookings",
    params(ListBookingsQuery),
    responses((status = 200, description = "A page of bookings", body = Page<BookingResponse>)),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn list_bookings(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(query): Query<ListBookingsQuery>,
) -> Result<ApiResponse<Page<BookingResponse>>> {
    let view = query.view.unwrap_or_default();
    let filter = BookingFilter {
        owner_id: (view == BookingView::Owner).then_some(current_user.id),
        caregiver_id: (view == BookingView::Caregiver).then_some(current_user.id),
        status: query.status,
        skip: query.page.offset(),
        limit: query.page.page_size(),
    };

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = CareBookings::new(&mut conn);
    let bookings = repo.list(&filter).await?;
    let total = repo.count(&filter).await?;

    let items = bookings.into_iter().map(BookingResponse::from).collect();
    Ok(ApiResponse::ok(Page::new(items, total, &query.page)))
}

#[utoipa::path(
    get,
    path = "/care-bookings/{id}",
    tag = "care-bookings",
    summary = "Get a booking",
    params(("id" = uuid::Uuid, Path, description = "Booking ID")),
    responses(
        (status = 200, description = "The booking", body = BookingResponse),
        (status = 404, description = "Booking not found"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn get_booking(State(state): State<AppState>, Path(id): Path<BookingId>, current_user: CurrentUser) -> Result<ApiResponse<BookingResponse>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let booking = CareBookings::new(&mut conn)
        .get_by_id(id)
        .await?
        .filter(|booking| BookingActor::for_booking(booking, current_user.id, current_user.is_admin()).is_some())
        .ok_or_else(|| Error::not_found("Booking", id))?;
    Ok(ApiResponse::ok(booking.into()))
}

#[utoipa::path(
    patch,
    path = "/care-bookings/{id}/status",
    tag = "care-bookings",
    summary = "Move a booking to a new status",
    params(("id" = uuid::Uuid, Path, description = "Booking ID")),
    request_body = BookingStatusUpdate,
    responses(
        (status = 200, description = "The updated booking", body = BookingResponse),
        (status = 400, description = "Completing before the end date"),
        (status = 403, description = "Caller may not make this change"),
        (status = 404, description = "Booking not found"),
        (status = 409, description = "Transition not allowed, or overlaps an accepted booking"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all, fields(booking_id = %abbrev_uuid(&id)))]
pub async fn update_booking_status(
    State(state): State<AppState>,
    Path(id): Path<BookingId>,
    current_user: CurrentUser,
    Json(request): Json<BookingStatusUpdate>,
) -> Result<ApiResponse<BookingResponse>> {
    let mut tx = state.db.begin().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = CareBookings::new(&mut tx);

    let booking = repo.lock(id).await?.ok_or_else(|| Error::not_found("Booking", id))?;
    let actor = BookingActor::for_booking(&booking, current_user.id, current_user.is_admin()).ok_or_else(|| Error::not_found("Booking", id))?;
    authorize_transition(&booking, request.status, actor, Utc::now().date_naive())?;

    if request.status == BookingStatus::Accepted {
        repo.lock_caregiver(booking.caregiver_id).await?;
        if repo
            .has_accepted_overlap(booking.caregiver_id, booking.start_date, booking.end_date, booking.id)
            .await?
        {
            return Err(Error::Conflict {
                message: "The caregiver already has an accepted booking overlapping these dates".to_string(),
            });
        }
    }

    let updated = repo.set_status(id, request.status).await?;
    tx.commit().await.map_err(|e| Error::Database(e.into()))?;

    info!(from = %booking.status, to = %updated.status, actor = ?actor, "Booking status changed");
    Ok(ApiResponse::ok(updated.into()))
}
