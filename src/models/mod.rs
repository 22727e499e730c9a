pub mod circuit_breaker;
pub mod health;
pub mod message;
pub mod sendgrid;
pub mod status;
pub mod template;
