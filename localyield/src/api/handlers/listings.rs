//! Public search over product listings and caregivers.

use crate::{
    AppState,
    api::{
        envelope::ApiResponse,
        models::{
            pagination::Page,
            products::{ListingQuery, ListingResponse},
            users::{CaregiverListingResponse, CaregiverQuery},
        },
    },
    db::handlers::{Products, Users, products::ListingSearch},
    errors::{Error, Result},
    search::{self, Origin, SortOrder},
};
use crate::api::extract::Query;
use axum::extract::State;

#[utoipa::path(
    get,
    path = "/listings",
    tag = "listings",
    summary = "Search listings",
    description = "Active listings matching the text and category filters, optionally limited to a radius around a ZIP code.",
    params(ListingQuery),
    responses(
        (status = 200, description = "A page of listings", body = Page<ListingResponse>),
        (status = 400, description = "Malformed ZIP or radius"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn search_listings(State(state): State<AppState>, Query(query): Query<ListingQuery>) -> Result<ApiResponse<Page<ListingResponse>>> {
    let origin = Origin::from_query(query.zip.as_deref(), query.radius, &state.config.geo)?;
    let sort = SortOrder::resolve(query.sort, origin.as_ref());

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let candidates = Products::new(&mut conn)
        .search_listings(&ListingSearch {
            text: query.q.clone(),
            category: query.category.clone().filter(|c| !c.trim().is_empty()),
        })
        .await?;

    let ranked = search::rank(candidates, &state.zips, origin.as_ref(), sort);
    let page = query
        .page
        .slice(ranked)
        .map(|ranked| ListingResponse::new(ranked.item, ranked.distance_miles));
    Ok(ApiResponse::ok(page))
}

#[utoipa::path(
    get,
    path = "/caregivers",
    tag = "listings",
    summary = "Search caregivers",
    params(CaregiverQuery),
    responses(
        (status = 200, description = "A page of caregivers", body = Page<CaregiverListingResponse>),
        (status = 400, description = "Malformed ZIP or radius"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn search_caregivers(
    State(state): State<AppState>,
    Query(query): Query<CaregiverQuery>,
) -> Result<ApiResponse<Page<CaregiverListingResponse>>> {
    let origin = Origin::from_query(query.zip.as_deref(), query.radius, &state.config.geo)?;
    let sort = SortOrder::resolve(None, origin.as_ref());
    let service = query.service.as_deref().filter(|s| !s.trim().is_empty());

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let candidates = Users::new(&mut conn).list_caregivers(service).await?;

    let ranked = search::rank(candidates, &state.zips, origin.as_ref(), sort);
    let page = query
        .page
        .slice(ranked)
        .map(|ranked| CaregiverListingResponse::new(ranked.item, ranked.distance_miles));
    Ok(ApiResponse::ok(page))
}
