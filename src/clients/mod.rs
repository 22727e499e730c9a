pub mod circuit_breaker;
pub mod health;
pub mod provider;
pub mod rbmq;
pub mod redis;
pub mod sendgrid;
pub mod smtp;
pub mod template;
