use actix_web::{
    HttpRequest, HttpResponse, delete, get, post, put,
    web::{self, Path},
};
use tracing::{Instrument, instrument};

use crate::{
    api::{
        rest::{ActionRequest, ActionResponse, AddResponse, ChartQuery, ChartResponse, ListRequest, ListResponse, PaginationQuery, ViewDescriptionResponse},
        state::AppState,
    },
    model::{
        apperror::ApplicationError,
        models::{ListInputType, PaginationInput},
    },
};

/**
 * Registers the routes. List routes come before the add route since `{view}` would also match `countries:list`.
 */
pub fn routes(config: &mut web::ServiceConfig) {
    config
        .service(view_list)
        .service(view_related_list)
        .service(view_action)
        .service(view_describe)
        .service(view_show)
        .service(view_add)
        .service(view_edit)
        .service(view_delete)
        .service(chart_get);
}

/**
 * Endpoint to describe the configuration of a view.
 */
#[instrument(skip(http_request, app_state), fields(service = "describeView", trace_id = get_trace_id(&http_request), result))]
#[get("/api/v1/views/{view}")]
pub async fn view_describe(path: Path<String>, http_request: HttpRequest, app_state: web::Data<AppState>) -> Result<HttpResponse, ApplicationError> {
    let view = app_state.entity_service.describe(&path.into_inner())?;
    Ok(HttpResponse::Ok().json(ViewDescriptionResponse::from(view)))
}

/**
 * Endpoint to list rows of a view.
 */
#[instrument(level = "info", skip(http_request, app_state), fields(service = "listView", trace_id = get_trace_id(&http_request), result))]
#[post("/api/v1/views/{view}:list")]
pub async fn view_list(
    path: Path<String>,
    http_request: HttpRequest,
    request_body: web::Json<ListRequest>,
    pagination: web::Query<PaginationQuery>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, ApplicationError> {
    let span = tracing::Span::current();
    let pagination_input = PaginationInput::from(pagination.into_inner());
    let list_input = ListInputType::from(request_body.into_inner());
    let output = app_state.entity_service.list(&path.into_inner(), list_input, pagination_input).instrument(span).await?;
    Ok(HttpResponse::Ok().json(ListResponse::from(output)))
}

/**
 * Endpoint to list the rows of a related view referencing a row.
 */
#[instrument(skip(http_request, app_state), fields(service = "listRelated", trace_id = get_trace_id(&http_request), result))]
#[post("/api/v1/views/{view}/{id}/related/{related}:list")]
pub async fn view_related_list(
    path: Path<(String, i64, String)>,
    http_request: HttpRequest,
    request_body: web::Json<ListRequest>,
    pagination: web::Query<PaginationQuery>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, ApplicationError> {
    let span = tracing::Span::current();
    let (view, id, related) = path.into_inner();
    let pagination_input = PaginationInput::from(pagination.into_inner());
    let list_input = ListInputType::from(request_body.into_inner());
    let output = app_state.entity_service.related(&view, id, &related, list_input, pagination_input).instrument(span).await?;
    Ok(HttpResponse::Ok().json(ListResponse::from(output)))
}

/**
 * Endpoint to show a row.
 */
#[instrument(skip(http_request, app_state), fields(service = "showView", trace_id = get_trace_id(&http_request), result))]
#[get("/api/v1/views/{view}/{id}")]
pub async fn view_show(path: Path<(String, i64)>, http_request: HttpRequest, app_state: web::Data<AppState>) -> Result<HttpResponse, ApplicationError> {
    let span = tracing::Span::current();
    let (view, id) = path.into_inner();
    let row = app_state.entity_service.show(&view, id).instrument(span).await?;
    Ok(HttpResponse::Ok().json(row))
}

/**
 * Endpoint to add a row.
 */
#[instrument(level = "info", skip(http_request, app_state, request_body), fields(service = "addView", trace_id = get_trace_id(&http_request), result))]
#[post("/api/v1/views/{view}")]
pub async fn view_add(
    path: Path<String>,
    http_request: HttpRequest,
    request_body: web::Json<serde_json::Map<String, serde_json::Value>>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, ApplicationError> {
    let span = tracing::Span::current();
    let id = app_state.entity_service.add(&path.into_inner(), &request_body).instrument(span).await?;
    Ok(HttpResponse::Created().json(AddResponse { id }))
}

/**
 * Endpoint to update a row.
 */
#[instrument(skip(http_request, app_state, request_body), fields(service = "editView", trace_id = get_trace_id(&http_request), result))]
#[put("/api/v1/views/{view}/{id}")]
pub async fn view_edit(
    path: Path<(String, i64)>,
    http_request: HttpRequest,
    request_body: web::Json<serde_json::Map<String, serde_json::Value>>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, ApplicationError> {
    let span = tracing::Span::current();
    let (view, id) = path.into_inner();
    app_state.entity_service.edit(&view, id, &request_body).instrument(span).await?;
    Ok(HttpResponse::Ok().finish())
}

/**
 * Endpoint to delete a row.
 */
#[instrument(skip(http_request, app_state), fields(service = "deleteView", trace_id = get_trace_id(&http_request), result))]
#[delete("/api/v1/views/{view}/{id}")]
pub async fn view_delete(path: Path<(String, i64)>, http_request: HttpRequest, app_state: web::Data<AppState>) -> Result<HttpResponse, ApplicationError> {
    let span = tracing::Span::current();
    let (view, id) = path.into_inner();
    app_state.entity_service.delete(&view, id).instrument(span).await?;
    Ok(HttpResponse::NoContent().finish())
}

/**
 * Endpoint to run an action on selected rows.
 */
#[instrument(skip(http_request, app_state), fields(service = "runAction", trace_id = get_trace_id(&http_request), result))]
#[post("/api/v1/views/{view}/actions/{action}")]
pub async fn view_action(path: Path<(String, String)>, http_request: HttpRequest, request_body: web::Json<ActionRequest>, app_state: web::Data<AppState>) -> Result<HttpResponse, ApplicationError> {
    let span = tracing::Span::current();
    let (view, action) = path.into_inner();
    let outcome = app_state.entity_service.run_action(&view, &action, &request_body.ids).instrument(span).await?;
    Ok(HttpResponse::Ok().json(ActionResponse::from(outcome)))
}

/**
 * Endpoint to retrieve the datasets of a chart.
 */
#[instrument(skip(http_request, app_state), fields(service = "getChart", trace_id = get_trace_id(&http_request), result))]
#[get("/api/v1/charts/{chart}")]
pub async fn chart_get(path: Path<String>, http_request: HttpRequest, query: web::Query<ChartQuery>, app_state: web::Data<AppState>) -> Result<HttpResponse, ApplicationError> {
    let span = tracing::Span::current();
    let output = app_state.chart_service.get_chart(&path.into_inner(), query.group_by.as_deref()).instrument(span).await?;
    Ok(HttpResponse::Ok().json(ChartResponse::from(output)))
}

/**
 * Retrieves the trace ID from the HTTP request headers.
 * If the trace ID is not present, a new UUID is generated.
 */
fn get_trace_id(http_request: &HttpRequest) -> String {
    http_request.headers().get("X-Trace-ID").and_then(|v| v.to_str().ok().map(std::string::ToString::to_string)).unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use actix_web::{App, http::StatusCode, test, test::TestRequest};
    use serde_json::json;

    use super::*;
    use crate::{
        dao::Store,
        model::derived::ProjectionContext,
        service::{charts::ChartService, entities::EntityService},
    };

    fn app_state() -> web::Data<AppState> {
        let store = Arc::new(Store::memory());
        let context = ProjectionContext { image_upload_url: "/static/uploads/".to_string() };
        web::Data::new(AppState::new(EntityService::new(store.clone(), context.clone()), ChartService::new(store, context)))
    }

    #[actix_web::test]
    async fn test_get_trace_id_exists() {
        let request = TestRequest::default().insert_header(("X-Trace-ID", "test")).to_http_request();
        let trace_id = get_trace_id(&request);
        assert_eq!(trace_id, "test");
    }

    #[actix_web::test]
    async fn test_get_trace_id_not_exists() {
        let request = TestRequest::default().to_http_request();
        let trace_id = get_trace_id(&request);
        assert!(!trace_id.is_empty());
    }

    #[actix_web::test]
    async fn test_add_then_list_countries() {
        let app = test::init_service(App::new().app_data(app_state()).configure(routes)).await;
        let request = TestRequest::post().uri("/api/v1/views/countries").set_json(json!({ "name": "Portugal" })).to_request();
        let response: serde_json::Value = test::call_and_read_body_json(&app, request).await;
        assert_eq!(response["id"], 1);

        let request = TestRequest::post().uri("/api/v1/views/countries").set_json(json!({ "name": "Portugal" })).to_request();
        let response = test::call_service(&app, request).await;
        assert_eq!(response.status(), StatusCode::CONFLICT);
        let body: serde_json::Value = test::read_body_json(response).await;
        assert_eq!(body["code"], 1004);

        let request = TestRequest::post().uri("/api/v1/views/countries:list?startIndex=0&pageSize=10").set_json(json!({})).to_request();
        let response: serde_json::Value = test::call_and_read_body_json(&app, request).await;
        assert_eq!(response["count"], 1);
        assert_eq!(response["rows"][0]["name"], "Portugal");
        assert_eq!(response["pagination"]["hasMoreElements"], false);
    }

    #[actix_web::test]
    async fn test_validation_error_lists_fields() {
        let app = test::init_service(App::new().app_data(app_state()).configure(routes)).await;
        let request = TestRequest::post().uri("/api/v1/views/countries").set_json(json!({ "name": 12 })).to_request();
        let response = test::call_service(&app, request).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: serde_json::Value = test::read_body_json(response).await;
        assert_eq!(body["fields"][0]["field"], "name");
        assert_eq!(body["fields"][0]["message"], "Expected text");
    }

    #[actix_web::test]
    async fn test_show_edit_delete() {
        let app = test::init_service(App::new().app_data(app_state()).configure(routes)).await;
        let request = TestRequest::post().uri("/api/v1/views/political_types").set_json(json!({ "name": "Democratic" })).to_request();
        assert_eq!(test::call_service(&app, request).await.status(), StatusCode::CREATED);
        let request = TestRequest::put().uri("/api/v1/views/political_types/1").set_json(json!({ "name": "Monarchy" })).to_request();
        assert_eq!(test::call_service(&app, request).await.status(), StatusCode::OK);
        let request = TestRequest::get().uri("/api/v1/views/political_types/1").to_request();
        let response: serde_json::Value = test::call_and_read_body_json(&app, request).await;
        assert_eq!(response["name"], "Monarchy");
        let request = TestRequest::delete().uri("/api/v1/views/political_types/1").to_request();
        assert_eq!(test::call_service(&app, request).await.status(), StatusCode::NO_CONTENT);
        let request = TestRequest::get().uri("/api/v1/views/political_types/1").to_request();
        assert_eq!(test::call_service(&app, request).await.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn test_not_permitted_and_describe() {
        let app = test::init_service(App::new().app_data(app_state()).configure(routes)).await;
        let request = TestRequest::post().uri("/api/v1/views/products_public").set_json(json!({ "name": "Chair" })).to_request();
        assert_eq!(test::call_service(&app, request).await.status(), StatusCode::METHOD_NOT_ALLOWED);
        let request = TestRequest::get().uri("/api/v1/views/products_public").to_request();
        let response: serde_json::Value = test::call_and_read_body_json(&app, request).await;
        assert_eq!(response["listWidget"], "block");
        assert_eq!(response["permissions"], json!(["can_list", "can_show"]));
    }

    #[actix_web::test]
    async fn test_action_and_chart() {
        let app = test::init_service(App::new().app_data(app_state()).configure(routes)).await;
        let request = TestRequest::post().uri("/api/v1/views/om_parents/actions/muldelete").set_json(json!({ "ids": [] })).to_request();
        let response: serde_json::Value = test::call_and_read_body_json(&app, request).await;
        assert_eq!(response["processed"], 0);

        let request = TestRequest::get().uri("/api/v1/charts/country_group_by?groupBy=country").to_request();
        let response: serde_json::Value = test::call_and_read_body_json(&app, request).await;
        assert_eq!(response["chartType"], "ColumnChart");
        assert_eq!(response["datasets"][0]["columns"][0], "Avg Unemployed");
        assert_eq!(response["datasets"][0]["rows"], json!([]));

        let request = TestRequest::get().uri("/api/v1/charts/country_group_by?groupBy=population").to_request();
        assert_eq!(test::call_service(&app, request).await.status(), StatusCode::BAD_REQUEST);
    }
}
