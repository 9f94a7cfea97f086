pub mod financial_validation;
pub mod http_client;
pub mod request_info;
pub mod validation;
