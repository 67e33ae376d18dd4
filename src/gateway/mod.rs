pub mod health_monitor;
pub mod proxy;
pub mod router;
