//! # Subscriber configuration resolver.
//!
//! Merges declarative settings (queue, exchange, routing keys, flags) into
//! one immutable [`SubscriberConfig`] per subscriber. Defaults are applied
//! for the optional flags; queue, exchange, and routing key have no default
//! and missing them fails at construction time, not at first message.
//!
//! ## Defaults
//! - `auto_ack = true`
//! - `provide_channel = false`
//! - `durable = false`

use crate::error::ClientError;

/// Immutable per-subscriber configuration.
///
/// Resolved once at subscriber construction via
/// [`SubscriberConfig::builder`]; never mutated afterward, so it requires
/// no locking.
#[derive(Clone, Debug)]
pub struct SubscriberConfig {
    queue: String,
    exchange: String,
    routing_keys: Vec<String>,
    auto_ack: bool,
    provide_channel: bool,
    durable: bool,
}

impl SubscriberConfig {
    /// Starts a builder with the documented defaults.
    pub fn builder() -> SubscriberConfigBuilder {
        SubscriberConfigBuilder::default()
    }

    /// Queue name.
    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// Exchange name.
    pub fn exchange(&self) -> &str {
        &self.exchange
    }

    /// Routing keys the queue is bound under. Always non-empty.
    pub fn routing_keys(&self) -> &[String] {
        &self.routing_keys
    }

    /// Broker-side auto-acknowledgement on delivery.
    pub fn auto_ack(&self) -> bool {
        self.auto_ack
    }

    /// Whether the handler receives the subscriber's own channel lease.
    pub fn provide_channel(&self) -> bool {
        self.provide_channel
    }

    /// Queue durability flag, also applied to the exchange declare.
    pub fn durable(&self) -> bool {
        self.durable
    }
}

/// Builder for [`SubscriberConfig`].
///
/// `routing_key` may be called multiple times (a queue may bind several
/// keys), or `routing_keys` can supply them at once.
#[derive(Clone, Debug, Default)]
pub struct SubscriberConfigBuilder {
    queue: Option<String>,
    exchange: Option<String>,
    routing_keys: Vec<String>,
    auto_ack: Option<bool>,
    provide_channel: Option<bool>,
    durable: Option<bool>,
}

impl SubscriberConfigBuilder {
    /// Sets the queue name. Required.
    pub fn queue(mut self, queue: impl Into<String>) -> Self {
        self.queue = Some(queue.into());
        self
    }

    /// Sets the exchange name. Required.
    pub fn exchange(mut self, exchange: impl Into<String>) -> Self {
        self.exchange = Some(exchange.into());
        self
    }

    /// Adds one routing key. At least one is required.
    pub fn routing_key(mut self, key: impl Into<String>) -> Self {
        self.routing_keys.push(key.into());
        self
    }

    /// Adds several routing keys at once.
    pub fn routing_keys<I, K>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        self.routing_keys.extend(keys.into_iter().map(Into::into));
        self
    }

    /// Overrides `auto_ack` (default `true`).
    pub fn auto_ack(mut self, auto_ack: bool) -> Self {
        self.auto_ack = Some(auto_ack);
        self
    }

    /// Overrides `provide_channel` (default `false`).
    pub fn provide_channel(mut self, provide_channel: bool) -> Self {
        self.provide_channel = Some(provide_channel);
        self
    }

    /// Overrides `durable` (default `false`).
    pub fn durable(mut self, durable: bool) -> Self {
        self.durable = Some(durable);
        self
    }

    /// Resolves the final configuration.
    ///
    /// Fails with [`ClientError::Configuration`] if queue, exchange, or
    /// routing key is missing or empty.
    pub fn build(self) -> Result<SubscriberConfig, ClientError> {
        let queue = match self.queue {
            Some(q) if !q.is_empty() => q,
            _ => return Err(ClientError::Configuration { missing: "queue" }),
        };
        let exchange = match self.exchange {
            Some(e) if !e.is_empty() => e,
            _ => return Err(ClientError::Configuration { missing: "exchange" }),
        };
        if self.routing_keys.is_empty() || self.routing_keys.iter().any(String::is_empty) {
            return Err(ClientError::Configuration {
                missing: "routing key",
            });
        }

        Ok(SubscriberConfig {
            queue,
            exchange,
            routing_keys: self.routing_keys,
            auto_ack: self.auto_ack.unwrap_or(true),
            provide_channel: self.provide_channel.unwrap_or(false),
            durable: self.durable.unwrap_or(false),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ClientError;

    fn base() -> SubscriberConfigBuilder {
        SubscriberConfig::builder()
            .queue("q1")
            .exchange("ex1")
            .routing_key("rk1")
    }

    #[test]
    fn defaults_applied() {
        let cfg = base().build().expect("valid config");
        assert!(cfg.auto_ack());
        assert!(!cfg.provide_channel());
        assert!(!cfg.durable());
        assert_eq!(cfg.routing_keys(), ["rk1"]);
    }

    #[test]
    fn overrides_win() {
        let cfg = base()
            .auto_ack(false)
            .provide_channel(true)
            .durable(true)
            .build()
            .expect("valid config");
        assert!(!cfg.auto_ack());
        assert!(cfg.provide_channel());
        assert!(cfg.durable());
    }

    #[test]
    fn multiple_routing_keys_accumulate() {
        let cfg = base()
            .routing_key("rk2")
            .routing_keys(["rk3", "rk4"])
            .build()
            .expect("valid config");
        assert_eq!(cfg.routing_keys(), ["rk1", "rk2", "rk3", "rk4"]);
    }

    #[test]
    fn missing_queue_fails_at_construction() {
        let err = SubscriberConfig::builder()
            .exchange("ex1")
            .routing_key("rk1")
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            ClientError::Configuration { missing: "queue" }
        ));
    }

    #[test]
    fn missing_exchange_fails_at_construction() {
        let err = SubscriberConfig::builder()
            .queue("q1")
            .routing_key("rk1")
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            ClientError::Configuration {
                missing: "exchange"
            }
        ));
    }

    #[test]
    fn empty_routing_key_set_fails_at_construction() {
        let err = SubscriberConfig::builder()
            .queue("q1")
            .exchange("ex1")
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            ClientError::Configuration {
                missing: "routing key"
            }
        ));
    }
}
