pub mod dispatch;
pub mod fare;
pub mod lifecycle;
