//! Access token source.

/// Supplies the access token embedded in each connection URL.
///
/// Called once per connect attempt so a refreshed token is picked up on
/// the next reconnect. Refresh and storage are the provider's business.
pub trait TokenProvider: Send + Sync + 'static {
    fn access_token(&self) -> Option<String>;
}

/// A fixed token.
#[derive(Debug, Clone)]
pub struct StaticToken(pub String);

impl TokenProvider for StaticToken {
    fn access_token(&self) -> Option<String> {
        Some(self.0.clone())
    }
}

impl<F> TokenProvider for F
where
    F: Fn() -> Option<String> + Send + Sync + 'static,
{
    fn access_token(&self) -> Option<String> {
        self()
    }
}

/// Provider for anonymous connections.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoToken;

impl TokenProvider for NoToken {
    fn access_token(&self) -> Option<String> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn closure_provider_is_queried_each_time() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let provider = move || {
            let n = c.fetch_add(1, Ordering::SeqCst);
            Some(format!("tok-{n}"))
        };
        assert_eq!(provider.access_token().as_deref(), Some("tok-0"));
        assert_eq!(provider.access_token().as_deref(), Some("tok-1"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn static_and_anonymous() {
        assert_eq!(StaticToken("abc".into()).access_token().as_deref(), Some("abc"));
        assert!(NoToken.access_token().is_none());
    }
}
