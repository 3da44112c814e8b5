pub mod console_logger;
pub mod headers;
