//! Redis adapters.

mod webhook_event_repository;

pub use webhook_event_repository::RedisWebhookEventRepository;
