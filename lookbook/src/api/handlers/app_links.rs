//! HTTP handlers for store links.

use crate::{
    AppState,
    api::models::{
        SuccessResponse,
        app_links::{
            AppLinkEnvelope, AppLinkListResponse, AppLinkLookupResponse, AppLinkQuery, AppLinkResponse, AppLinkUpsert,
            AppLinksResponse, normalize_country,
        },
    },
    db::models::app_links::{AppLinkUpsertDBRequest, GLOBAL_COUNTRY},
    errors::{Error, Result},
    types::AppLinkId,
};
use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use url::Url;

/// Link for a platform and country, falling back to the platform's global link
#[utoipa::path(
    get,
    path = "/app-links",
    tag = "app-links",
    summary = "Get store links",
    description = "With `country`, returns that country's link or the `global` one with `fallback: true`. Without it, lists every link for the platform.",
    params(AppLinkQuery),
    responses(
        (status = 200, description = "Link or list of links", body = AppLinksResponse),
        (status = 404, description = "No link for the platform"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn get_app_links(State(state): State<AppState>, Query(query): Query<AppLinkQuery>) -> Result<Json<AppLinksResponse>> {
    let Some(country) = query.country.as_deref() else {
        let links = state.store.list_app_links(query.platform).await?;
        return Ok(Json(AppLinksResponse::List(AppLinkListResponse {
            success: true,
            links: links.into_iter().map(AppLinkResponse::from).collect(),
        })));
    };

    let country = normalize_country(Some(country));
    if let Some(link) = state.store.get_app_link(query.platform, &country).await? {
        return Ok(Json(AppLinksResponse::Lookup(AppLinkLookupResponse {
            success: true,
            link: link.into(),
            fallback: false,
        })));
    }

    let global = state
        .store
        .get_app_link(query.platform, GLOBAL_COUNTRY)
        .await?
        .ok_or_else(|| Error::NotFound {
            resource: "AppLink".to_string(),
            id: format!("{}/{country}", query.platform),
        })?;
    Ok(Json(AppLinksResponse::Lookup(AppLinkLookupResponse {
        success: true,
        link: global.into(),
        fallback: country != GLOBAL_COUNTRY,
    })))
}

#[utoipa::path(
    put,
    path = "/app-links",
    tag = "app-links",
    summary = "Create or replace a store link",
    request_body = AppLinkUpsert,
    responses(
        (status = 200, description = "Stored link", body = AppLinkEnvelope),
        (status = 400, description = "Invalid URL"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn upsert_app_link(State(state): State<AppState>, Json(data): Json<AppLinkUpsert>) -> Result<Json<AppLinkEnvelope>> {
    let valid = Url::parse(data.url.trim()).is_ok_and(|url| matches!(url.scheme(), "http" | "https"));
    if !valid {
        return Err(Error::BadRequest {
            message: "url must be an http(s) URL".to_string(),
        });
    }

    let link = state
        .store
        .upsert_app_link(&AppLinkUpsertDBRequest {
            platform: data.platform,
            country: normalize_country(data.country.as_deref()),
            url: data.url.trim().to_string(),
        })
        .await?;
    Ok(Json(AppLinkEnvelope {
        success: true,
        link: link.into(),
    }))
}

#[utoipa::path(
    delete,
    path = "/app-links/{id}",
    tag = "app-links",
    summary = "Delete a store link",
    params(("id" = uuid::Uuid, Path, description = "Link ID")),
    responses(
        (status = 200, description = "Link deleted", body = SuccessResponse),
        (status = 404, description = "Link not found"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn delete_app_link(State(state): State<AppState>, Path(id): Path<AppLinkId>) -> Result<Json<SuccessResponse>> {
    if !state.store.delete_app_link(id).await? {
        return Err(Error::NotFound {
            resource: "AppLink".to_string(),
            id: id.to_string(),
        });
    }
    Ok(Json(SuccessResponse::new("Link deleted")))
}
