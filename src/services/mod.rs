pub mod captcha;
pub mod lifecycle;
pub mod notify;
pub mod rate_limit;
pub mod share_service;
pub mod storage;
pub mod upload_service;
