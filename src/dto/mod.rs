pub mod history_dto;
pub mod quiz_dto;
