//! Subscription lifetime handles.
//!
//! A [`Connection`] represents one subscription. It disconnects exactly once:
//! explicitly through [`Connection::disconnect`], or on drop. A [`Connector`]
//! owns many connections and disconnects all of them together, for callers
//! that tie a batch of subscriptions to one owner's lifetime.

use std::fmt;

/// RAII handle for one subscription.
///
/// Disconnecting is idempotent: the detach hook runs at most once, and a
/// disconnected handle is inert.
#[must_use = "dropping a Connection disconnects it"]
pub struct Connection {
    detach: Option<Box<dyn FnOnce()>>,
}

impl Connection {
    /// Wrap a detach hook.
    pub fn new(detach: impl FnOnce() + 'static) -> Self {
        Self {
            detach: Some(Box::new(detach)),
        }
    }

    /// A connection that is already disconnected.
    pub fn disconnected() -> Self {
        Self { detach: None }
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.detach.is_some()
    }

    /// Detach the sink. Further calls do nothing.
    pub fn disconnect(&mut self) {
        if let Some(detach) = self.detach.take() {
            detach();
        }
    }

    /// Wrap `self` with an extra hook that runs after the detach.
    pub fn with_teardown(mut self, teardown: impl FnOnce() + 'static) -> Self {
        let detach = self.detach.take();
        Self::new(move || {
            if let Some(detach) = detach {
                detach();
            }
            teardown();
        })
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("connected", &self.is_connected())
            .finish()
    }
}

/// Owner of a group of connections, disconnected together.
#[derive(Debug, Default)]
pub struct Connector {
    connections: Vec<Connection>,
}

impl Connector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of `connection`.
    pub fn connect(&mut self, connection: Connection) {
        self.connections.push(connection);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Disconnect everything, in connection order.
    pub fn disconnect(&mut self) {
        for mut connection in std::mem::take(&mut self.connections) {
            connection.disconnect();
        }
    }
}

impl Extend<Connection> for Connector {
    fn extend<I: IntoIterator<Item = Connection>>(&mut self, iter: I) {
        self.connections.extend(iter);
    }
}

impl Drop for Connector {
    fn drop(&mut self) {
        self.disconnect();
    }
}
