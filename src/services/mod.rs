pub mod listing;
pub mod lock_table;
pub mod storage_service;
