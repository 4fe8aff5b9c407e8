// Application state for HTTP handlers
use crate::application::filter_store::FilterStore;
use crate::application::orchestrator::ChartOrchestrator;
use crate::application::template::MissingParam;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: ChartOrchestrator,
    pub filters: FilterStore,
    pub missing_param: MissingParam,
}
