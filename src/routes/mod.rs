pub mod export;
pub mod health;
pub mod history;
pub mod quiz;
