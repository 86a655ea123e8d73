pub mod api;
pub mod database;
pub mod email;
pub mod storage;
