pub mod ai_service;
pub mod export_service;
pub mod grading_service;
pub mod history_service;
pub mod report_service;
pub mod session_service;
