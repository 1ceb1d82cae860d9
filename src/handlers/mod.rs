pub mod health_handlers;
pub mod s3_handlers;
