//! Entity, search and association routes
//!
//! | Route | Verbs |
//! |---|---|
//! | `/api/{collection}` | GET, POST |
//! | `/api/{collection}/{id}` | GET, PUT, PATCH, DELETE |
//! | `/api/{collection}/{id}/graph` | GET |
//! | `/api/_search/{collection}?query=` | GET |
//! | `/api/{parent}/{id}/{association}` | GET, PUT |
//! | `/api/{parent}/{id}/{association}/{child}` | POST, DELETE |

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use serde::Deserialize;

use crate::api::{Alert, ApiError, AppState};
use crate::core::entity::Entity;
use crate::core::error::{ErrorKey, ResourceError, ResourceResult};
use crate::core::links::{self, Association};
use crate::core::service::ResourceService;
use crate::entities::{Address, CarPark, OpenHours, ParkingSpot, UserExtra};

/// Every route of the API
pub(super) fn all() -> Router<AppState> {
    let mut router = Router::new()
        .merge(entity_routes::<Address>())
        .merge(entity_routes::<CarPark>())
        .merge(entity_routes::<OpenHours>())
        .merge(entity_routes::<ParkingSpot>())
        .merge(entity_routes::<UserExtra>());

    for association in links::all() {
        router = router.merge(association_routes(association));
    }
    router
}

/// Run a service call on the blocking pool
async fn run_blocking<T, F>(state: &AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&ResourceService) -> ResourceResult<T> + Send + 'static,
    T: Send + 'static,
{
    let service = state.service.clone();
    tokio::task::spawn_blocking(move || f(&service))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .map_err(ApiError::from)
}

// =========================================================================
// Entity routes
// =========================================================================

fn entity_routes<E: Entity>() -> Router<AppState> {
    let collection = E::KIND.collection();
    Router::new()
        .route(
            &format!("/api/{}", collection),
            get(list::<E>).post(create::<E>),
        )
        .route(
            &format!("/api/{}/{{id}}", collection),
            get(fetch::<E>)
                .put(update::<E>)
                .patch(partial_update::<E>)
                .delete(remove::<E>),
        )
        .route(
            &format!("/api/{}/{{id}}/graph", collection),
            get(graph::<E>),
        )
        .route(
            &format!("/api/_search/{}", collection),
            get(search::<E>),
        )
}

/// POST /api/{collection}
async fn create<E: Entity>(
    State(state): State<AppState>,
    payload: Result<Json<E>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(entity) = payload?;
    let created = run_blocking(&state, move |s| s.create(entity)).await?;

    let id = created.id().get().unwrap_or_default();
    let location = format!("/api/{}/{}", E::KIND.collection(), id);
    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, location)],
        Extension(Alert::Created {
            entity: E::KIND,
            id,
        }),
        Json(created),
    )
        .into_response())
}

/// PUT /api/{collection}/{id}
async fn update<E: Entity>(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
    payload: Result<Json<E>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Path(id) = path?;
    let Json(entity) = payload?;
    let updated = run_blocking(&state, move |s| s.update(id, entity)).await?;

    Ok((
        Extension(Alert::Updated {
            entity: E::KIND,
            id,
        }),
        Json(updated),
    )
        .into_response())
}

/// PATCH /api/{collection}/{id}, accepting `application/merge-patch+json`
async fn partial_update<E: Entity>(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
    payload: Result<Json<E>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Path(id) = path?;
    let Json(patch) = payload?;
    let merged = run_blocking(&state, move |s| s.partial_update(id, patch)).await?;

    Ok((
        Extension(Alert::Updated {
            entity: E::KIND,
            id,
        }),
        Json(merged),
    )
        .into_response())
}

/// GET /api/{collection}
async fn list<E: Entity>(State(state): State<AppState>) -> Result<Json<Vec<E>>, ApiError> {
    Ok(Json(run_blocking(&state, |s| s.find_all::<E>()).await?))
}

/// GET /api/{collection}/{id}
async fn fetch<E: Entity>(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Json<E>, ApiError> {
    let Path(id) = path?;
    Ok(Json(run_blocking(&state, move |s| s.get::<E>(id)).await?))
}

/// GET /api/{collection}/{id}/graph - the entity with its direct children
async fn graph<E: Entity>(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Response, ApiError> {
    let Path(id) = path?;
    let aggregate = run_blocking(&state, move |s| {
        s.load_with_children(E::KIND, id)?
            .and_then(|graph| graph.aggregate(E::KIND, id))
            .ok_or_else(|| {
                ResourceError::not_found(E::KIND, ErrorKey::NotFound, format!("{} {} not found", E::KIND, id))
            })
    })
    .await?;
    Ok(Json(aggregate).into_response())
}

/// DELETE /api/{collection}/{id}
async fn remove<E: Entity>(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Response, ApiError> {
    let Path(id) = path?;
    run_blocking(&state, move |s| s.delete(E::KIND, id)).await?;

    Ok((
        StatusCode::NO_CONTENT,
        Extension(Alert::Deleted {
            entity: E::KIND,
            id,
        }),
    )
        .into_response())
}

#[derive(Debug, Deserialize)]
struct SearchParams {
    #[serde(default)]
    query: String,
}

/// GET /api/_search/{collection}?query=
async fn search<E: Entity>(
    State(state): State<AppState>,
    params: Result<Query<SearchParams>, QueryRejection>,
) -> Result<Json<Vec<E>>, ApiError> {
    let Query(params) = params?;
    let hits = run_blocking(&state, move |s| {
        s.search::<E>(&params.query).map(|hits| hits.collect::<Vec<_>>())
    })
    .await?;
    Ok(Json(hits))
}

// =========================================================================
// Association routes
// =========================================================================

fn association_routes(association: &'static Association) -> Router<AppState> {
    let base = format!(
        "/api/{}/{{id}}/{}",
        association.parent.collection(),
        association.segment
    );

    Router::new()
        .route(
            &base,
            get(
                move |state: State<AppState>, path: Result<Path<i64>, PathRejection>| {
                    children(association, state, path)
                },
            )
            .put(
                move |state: State<AppState>,
                      path: Result<Path<i64>, PathRejection>,
                      payload: Result<Json<Vec<i64>>, JsonRejection>| {
                    set_children(association, state, path, payload)
                },
            ),
        )
        .route(
            &format!("{}/{{child}}", base),
            post(
                move |state: State<AppState>, path: Result<Path<(i64, i64)>, PathRejection>| {
                    add_child(association, state, path)
                },
            )
            .delete(
                move |state: State<AppState>, path: Result<Path<(i64, i64)>, PathRejection>| {
                    remove_child(association, state, path)
                },
            ),
        )
}

/// GET /api/{parent}/{id}/{association}
async fn children(
    association: &'static Association,
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Response, ApiError> {
    let Path(parent) = path?;
    let nodes = run_blocking(&state, move |s| s.children(association, parent)).await?;
    Ok(Json(nodes).into_response())
}

/// PUT /api/{parent}/{id}/{association} with a JSON array of child ids
async fn set_children(
    association: &'static Association,
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
    payload: Result<Json<Vec<i64>>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Path(parent) = path?;
    let Json(ids) = payload?;
    let relinks = run_blocking(&state, move |s| s.set_children(association, parent, &ids)).await?;

    Ok((
        Extension(Alert::Updated {
            entity: association.parent,
            id: parent,
        }),
        Json(relinks),
    )
        .into_response())
}

/// POST /api/{parent}/{id}/{association}/{child}
async fn add_child(
    association: &'static Association,
    State(state): State<AppState>,
    path: Result<Path<(i64, i64)>, PathRejection>,
) -> Result<Response, ApiError> {
    let Path((parent, child)) = path?;
    let relinks = run_blocking(&state, move |s| s.add_child(association, parent, child)).await?;

    Ok((
        Extension(Alert::Updated {
            entity: association.parent,
            id: parent,
        }),
        Json(relinks),
    )
        .into_response())
}

/// DELETE /api/{parent}/{id}/{association}/{child}
async fn remove_child(
    association: &'static Association,
    State(state): State<AppState>,
    path: Result<Path<(i64, i64)>, PathRejection>,
) -> Result<Response, ApiError> {
    let Path((parent, child)) = path?;
    let relinks = run_blocking(&state, move |s| s.remove_child(association, parent, child)).await?;

    Ok((
        Extension(Alert::Updated {
            entity: association.parent,
            id: parent,
        }),
        Json(relinks),
    )
        .into_response())
}
