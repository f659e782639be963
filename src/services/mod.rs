pub mod component_locks;
pub mod dashboard_service;
pub mod history_service;
pub mod import_service;
pub mod legacy;
pub mod registry_service;
pub mod risk_event_service;

pub use component_locks::ComponentLocks;
pub use dashboard_service::DashboardService;
pub use history_service::HistoryService;
pub use import_service::ImportService;
pub use registry_service::RegistryService;
pub use risk_event_service::RiskEventService;
