use crate::service::{charts::ChartService, entities::EntityService};

/**
* Represents the application state shared across the Actix web application.
*/
pub struct AppState {
    /**
     * The service for the generic list/show/add/edit/delete operations of the views.
     */
    pub entity_service: EntityService,
    /**
     * The service producing chart datasets.
     */
    pub chart_service: ChartService,
}

/**
 * Creates a new instance of `AppState`.
 *
 * # Arguments
 * `entity_service`: The service for the view operations.
 * `chart_service`: The service producing chart datasets.
 */
impl AppState {
    pub fn new(entity_service: EntityService, chart_service: ChartService) -> Self {
        AppState { entity_service, chart_service }
    }
}
